//! Simulation clock and day/night curves.
//!
//! This module provides:
//! - Time of day with a configurable day length
//! - The daytime growing window
//! - Daylight and transpiration curves derived from the hour

use serde::{Deserialize, Serialize};

use crate::config::ClockConfig;

/// Hours in a simulated day.
const HOURS_PER_DAY: f32 = 24.0;

/// Simulated time with a day/night cycle.
///
/// `time_of_day` is normalized: 0.0 = midnight, 0.5 = noon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimClock {
    /// Current time of day (0.0 to 1.0).
    time_of_day: f32,
    /// Number of complete days that have passed.
    day_count: u32,
    /// Total elapsed simulation seconds.
    total_seconds: f64,
    /// Window and curve settings.
    config: ClockConfig,
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new(ClockConfig::default())
    }
}

impl SimClock {
    /// Create a clock at the configured start hour.
    #[must_use]
    pub fn new(config: ClockConfig) -> Self {
        let time_of_day = (config.start_hour / HOURS_PER_DAY).rem_euclid(1.0);
        Self {
            time_of_day,
            day_count: 0,
            total_seconds: 0.0,
            config,
        }
    }

    /// Create a clock at a specific hour with default settings.
    #[must_use]
    pub fn at_hour(hour: f32) -> Self {
        let mut clock = Self::default();
        clock.set_hour(hour);
        clock
    }

    /// Jump to an hour of the current day (0.0 to 24.0).
    pub fn set_hour(&mut self, hour: f32) {
        self.time_of_day = (hour / HOURS_PER_DAY).rem_euclid(1.0);
    }

    /// Advance by `dt` real seconds.
    pub fn advance(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        self.total_seconds += f64::from(dt);
        self.time_of_day += dt / self.config.seconds_per_day;
        while self.time_of_day >= 1.0 {
            self.time_of_day -= 1.0;
            self.day_count += 1;
        }
    }

    /// Current time of day (0.0 to 1.0).
    #[must_use]
    pub fn time_of_day(&self) -> f32 {
        self.time_of_day
    }

    /// Current fractional hour (0.0 to 24.0).
    #[must_use]
    pub fn hour(&self) -> f32 {
        self.time_of_day * HOURS_PER_DAY
    }

    /// Number of complete days elapsed.
    #[must_use]
    pub fn day_count(&self) -> u32 {
        self.day_count
    }

    /// Total elapsed simulation seconds.
    #[must_use]
    pub fn total_seconds(&self) -> f64 {
        self.total_seconds
    }

    /// Whether the growing window is open.
    #[must_use]
    pub fn is_daytime(&self) -> bool {
        let hour = self.hour();
        hour >= self.config.day_start_hour && hour < self.config.day_end_hour
    }

    /// Daylight in `[0, 1]`: a half-sine across the window, zero at night.
    #[must_use]
    pub fn daylight(&self) -> f32 {
        if !self.is_daytime() {
            return 0.0;
        }
        let span = self.config.day_end_hour - self.config.day_start_hour;
        let t = (self.hour() - self.config.day_start_hour) / span;
        (t * std::f32::consts::PI).sin().max(0.0)
    }

    /// Transpiration factor: minimal at night, peaking at midday.
    #[must_use]
    pub fn transpiration_factor(&self) -> f32 {
        let floor = self.config.night_transpiration;
        floor + (1.0 - floor) * self.daylight()
    }

    /// Get a formatted time string (HH:MM).
    #[must_use]
    pub fn format_time(&self) -> String {
        let minutes = (self.hour() * 60.0) as u32;
        format!("{:02}:{:02}", minutes / 60 % 24, minutes % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_creation() {
        let clock = SimClock::default();
        assert!((clock.hour() - 6.0).abs() < 0.01);
        assert_eq!(clock.day_count(), 0);
        assert!(clock.is_daytime());
    }

    #[test]
    fn test_day_rollover() {
        let mut clock = SimClock::at_hour(23.0);
        clock.advance(120.0);
        assert_eq!(clock.day_count(), 1);
        assert!((clock.hour() - 1.0).abs() < 0.01);
        assert!((clock.total_seconds() - 120.0).abs() < 1e-6);
    }

    #[test]
    fn test_daytime_window() {
        assert!(!SimClock::at_hour(5.9).is_daytime());
        assert!(SimClock::at_hour(6.0).is_daytime());
        assert!(SimClock::at_hour(17.9).is_daytime());
        assert!(!SimClock::at_hour(18.0).is_daytime());
    }

    #[test]
    fn test_transpiration_curve() {
        let night = SimClock::at_hour(2.0).transpiration_factor();
        let morning = SimClock::at_hour(8.0).transpiration_factor();
        let noon = SimClock::at_hour(12.0).transpiration_factor();
        let evening = SimClock::at_hour(16.0).transpiration_factor();

        assert!((night - 0.1).abs() < 1e-6);
        assert!(morning > night);
        assert!(noon > morning);
        assert!(noon > evening);
        assert!((noon - 1.0).abs() < 1e-3);
        assert!((morning - evening).abs() < 1e-3);
    }

    #[test]
    fn test_format_time() {
        assert_eq!(SimClock::at_hour(13.5).format_time(), "13:30");
        assert_eq!(SimClock::at_hour(0.0).format_time(), "00:00");
    }
}
