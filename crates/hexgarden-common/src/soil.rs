//! Soil types and the physical constants they fix.

use serde::{Deserialize, Serialize};

/// Kind of soil a hex is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SoilType {
    /// Sandy, drains instantly and holds little.
    Desert,
    /// Balanced garden soil.
    #[default]
    Loam,
    /// Dense, holds the most water and drains slowly.
    Clay,
    /// Solid stone; no water at all.
    Rock,
    /// Worked loam, slightly looser and richer.
    Tilled,
    /// Impermeable block; never gains or gives water.
    Barrier,
}

impl SoilType {
    /// All soil types.
    pub const ALL: [Self; 6] = [
        Self::Desert,
        Self::Loam,
        Self::Clay,
        Self::Rock,
        Self::Tilled,
        Self::Barrier,
    ];

    /// Water capacity per m³ of soil, in volume units.
    #[must_use]
    pub const fn capacity_per_m3(self) -> f32 {
        match self {
            Self::Desert => 100_000.0,
            Self::Loam => 290_000.0,
            Self::Clay => 400_000.0,
            Self::Tilled => 320_000.0,
            Self::Rock | Self::Barrier => 0.0,
        }
    }

    /// Permeability in `[0, 1]`.
    #[must_use]
    pub const fn permeability(self) -> f32 {
        match self {
            Self::Desert => 1.0,
            Self::Loam => 0.5,
            Self::Clay => 0.15,
            Self::Tilled => 0.7,
            Self::Rock | Self::Barrier => 0.0,
        }
    }

    /// Whether this soil can hold water at all.
    #[must_use]
    pub fn holds_water(self) -> bool {
        self.capacity_per_m3() > 0.0
    }

    /// Whether this soil is excluded from flow entirely.
    #[must_use]
    pub const fn is_barrier(self) -> bool {
        matches!(self, Self::Barrier)
    }

    /// Get the display name of this soil.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Desert => "Desert",
            Self::Loam => "Loam",
            Self::Clay => "Clay",
            Self::Rock => "Rock",
            Self::Tilled => "Tilled",
            Self::Barrier => "Barrier",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_ordering() {
        assert!(SoilType::Desert.capacity_per_m3() < SoilType::Loam.capacity_per_m3());
        assert!(SoilType::Loam.capacity_per_m3() < SoilType::Clay.capacity_per_m3());
        for soil in SoilType::ALL {
            assert!(soil.capacity_per_m3() <= SoilType::Clay.capacity_per_m3());
        }
        assert!(!SoilType::Rock.holds_water());
        assert!(!SoilType::Barrier.holds_water());
    }

    #[test]
    fn test_permeability_bounds() {
        for soil in SoilType::ALL {
            let p = soil.permeability();
            assert!((0.0..=1.0).contains(&p), "{} out of range", soil.display_name());
        }
        assert!((SoilType::Desert.permeability() - 1.0).abs() < f32::EPSILON);
        assert!(SoilType::Barrier.is_barrier());
    }
}
