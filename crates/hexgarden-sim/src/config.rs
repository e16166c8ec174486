//! Simulation configuration.
//!
//! Every tuned constant lives here so it can be overridden from a TOML file.
//! Missing keys fall back to their defaults.

use std::fs;
use std::path::Path;

use hexgarden_common::{HexMetrics, SchemaVersion};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::nutrients::NutrientLevels;

/// Errors that can occur while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read file.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML.
    #[error("Failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to write TOML.
    #[error("Failed to serialize config TOML: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A value is out of range.
    #[error("Config validation error: {0}")]
    ValidationError(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Day/night cycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Real seconds per simulated day.
    pub seconds_per_day: f32,
    /// Hour the simulation starts at.
    pub start_hour: f32,
    /// First hour of the growing window.
    pub day_start_hour: f32,
    /// Hour the growing window closes.
    pub day_end_hour: f32,
    /// Transpiration factor outside the growing window.
    pub night_transpiration: f32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            seconds_per_day: 1440.0,
            start_hour: 6.0,
            day_start_hour: 6.0,
            day_end_hour: 18.0,
            night_transpiration: 0.1,
        }
    }
}

/// Water solver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterConfig {
    /// Base flow rate per second between neighbors.
    pub flow_rate: f32,
    /// Upper bound on the fraction of a gradient moved to one neighbor per tick.
    pub max_neighbor_share: f32,
    /// Extra multiplier for flow into the hex below (down = 1 + bias).
    pub gravity_bias: f32,
    /// Multiplier for flow into the hex above.
    pub capillary_damping: f32,
    /// Fraction of content lost per second into open space below.
    pub drain_rate: f32,
    /// Evaporation in volume units per m² of exposed surface per second at temperature 1.0.
    pub evaporation_rate: f32,
    /// Hard cap on forced addition, as a multiple of capacity.
    pub max_oversaturation: f32,
    /// Temperature given to newly placed cells.
    pub default_temperature: f32,
}

impl Default for WaterConfig {
    fn default() -> Self {
        Self {
            flow_rate: 0.5,
            max_neighbor_share: 0.125,
            gravity_bias: 1.0,
            capillary_damping: 0.2,
            drain_rate: 0.002,
            evaporation_rate: 20.0,
            max_oversaturation: 1.5,
            default_temperature: 0.5,
        }
    }
}

/// Nutrient model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NutrientConfig {
    /// Fraction of a crop's lifetime need applied per stage transition.
    pub stage_fraction: f32,
    /// Level a required nutrient must exceed before planting.
    pub min_threshold: f32,
    /// Level natural recovery drifts toward.
    pub baseline: f32,
    /// Recovery per second while below the baseline.
    pub recovery_rate: f32,
    /// Number of past crops remembered per hex.
    pub history_len: usize,
    /// Starting levels for ordinary soil.
    pub initial: NutrientLevels,
    /// Starting levels for tilled soil.
    pub tilled_initial: NutrientLevels,
}

impl Default for NutrientConfig {
    fn default() -> Self {
        Self {
            stage_fraction: 1.0 / 3.0,
            min_threshold: 0.1,
            baseline: 0.2,
            recovery_rate: 0.0005,
            history_len: 3,
            initial: NutrientLevels::new(0.6, 0.5, 0.5),
            tilled_initial: NutrientLevels::new(0.8, 0.6, 0.6),
        }
    }
}

/// Staged plant growth settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagedConfig {
    /// Water satisfaction needed for stomata to open.
    pub stomata_threshold: f32,
    /// Minimum real seconds between stage-transition attempts.
    pub attempt_interval: f32,
    /// Consumption multiplier while stunted.
    pub stunted_multiplier: f32,
    /// Seconds before a stunted plant retries.
    pub stunt_retry_interval: f32,
    /// Water bonus per sub-layer of root depth.
    pub depth_bonus: f32,
    /// Light kept per occupied sub-hex above a leaf.
    pub occlusion_factor: f32,
    /// How many sub-layers above a leaf are scanned for shade.
    pub light_scan_layers: u32,
    /// Nutrient depletion per unit of consumed water, relative to the crop's lifetime need.
    pub nutrient_per_water: f32,
    /// Largest sub-hex offset applied to leaves and fruit for variety (0 disables).
    pub jitter_radius: i32,
}

impl Default for StagedConfig {
    fn default() -> Self {
        Self {
            stomata_threshold: 0.3,
            attempt_interval: 1.0,
            stunted_multiplier: 0.1,
            stunt_retry_interval: 5.0,
            depth_bonus: 0.25,
            occlusion_factor: 0.7,
            light_scan_layers: 16,
            nutrient_per_water: 1.0e-6,
            jitter_radius: 1,
        }
    }
}

/// Organic (meristem) growth settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganicConfig {
    /// Chance per tick that a root point accumulates at night.
    pub night_root_growth_probability: f32,
    /// Energy spent per new root.
    pub root_energy_cost: f32,
    /// Energy spent per new stem or leaf.
    pub shoot_energy_cost: f32,
    /// Energy gained per second regardless of light.
    pub passive_energy_trickle: f32,
    /// Energy a shoot needs before it may accumulate (ignored while leafless).
    pub min_energy_gate: f32,
    /// Vertical radius, in sub-layers, of apical dominance.
    pub dominance_radius: u32,
    /// Chance that a lateral point grows a leaf rather than a stem.
    pub lateral_leaf_preference: f32,
    /// Fraction of the reservoir a root point needs to accumulate.
    pub min_root_water: f32,
    /// Fraction of the reservoir a shoot point needs to accumulate.
    pub min_shoot_water: f32,
    /// Growth potential decay per second of growth point age.
    pub age_decay: f32,
    /// Light kept per occupied sub-hex above a leaf.
    pub occlusion_factor: f32,
    /// How many sub-layers above a leaf are scanned for shade.
    pub light_scan_layers: u32,
    /// Weight of potential light when scoring shoot positions.
    pub light_weight: f32,
    /// Weight of outward spread when scoring shoot positions.
    pub spread_weight: f32,
    /// Penalty per stem directly above a candidate shoot position.
    pub crowding_weight: f32,
    /// Bonus for growing straight up.
    pub vertical_bonus: f32,
    /// Dominance given to a freshly attached growth point.
    pub child_dominance: f32,
    /// Rate per second at which internal nutrients track the soil under the roots.
    pub nutrient_uptake: f32,
    /// Nutrient depletion per unit of absorbed water, relative to the crop's lifetime need.
    pub nutrient_per_water: f32,
}

impl Default for OrganicConfig {
    fn default() -> Self {
        Self {
            night_root_growth_probability: 0.3,
            root_energy_cost: 0.15,
            shoot_energy_cost: 0.10,
            passive_energy_trickle: 0.002,
            min_energy_gate: 0.05,
            dominance_radius: 6,
            lateral_leaf_preference: 0.85,
            min_root_water: 0.05,
            min_shoot_water: 0.1,
            age_decay: 0.002,
            occlusion_factor: 0.7,
            light_scan_layers: 16,
            light_weight: 1.0,
            spread_weight: 0.4,
            crowding_weight: 0.3,
            vertical_bonus: 0.15,
            child_dominance: 0.8,
            nutrient_uptake: 0.5,
            nutrient_per_water: 1.0e-5,
        }
    }
}

/// Full simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed for jitter, tie-breaks and probabilistic growth.
    pub seed: u64,
    /// Config file schema version.
    pub version: SchemaVersion,
    /// Grid geometry.
    pub grid: HexMetrics,
    /// Day/night cycle.
    pub clock: ClockConfig,
    /// Water solver.
    pub water: WaterConfig,
    /// Nutrient model.
    pub nutrients: NutrientConfig,
    /// Staged growth.
    pub staged: StagedConfig,
    /// Organic growth.
    pub organic: OrganicConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 0x5EED_1234,
            version: SchemaVersion::CONFIG,
            grid: HexMetrics::default(),
            clock: ClockConfig::default(),
            water: WaterConfig::default(),
            nutrients: NutrientConfig::default(),
            staged: StagedConfig::default(),
            organic: OrganicConfig::default(),
        }
    }
}

fn check(ok: bool, message: &str) -> ConfigResult<()> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(message.to_string()))
    }
}

fn unit(value: f32) -> bool {
    (0.0..=1.0).contains(&value)
}

impl SimConfig {
    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        debug!("Loading sim config: {:?}", path);
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| {
            warn!("Rejected sim config {:?}: {}", path, e);
            e
        })
    }

    /// Serializes the configuration to TOML.
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks that every value is in range.
    pub fn validate(&self) -> ConfigResult<()> {
        check(
            SchemaVersion::CONFIG.can_read(&self.version),
            "unsupported config version",
        )?;
        check(self.grid.hex_size > 0.0, "grid.hex_size must be positive")?;
        check(self.grid.level_height > 0.0, "grid.level_height must be positive")?;
        check(self.grid.subdivision > 0, "grid.subdivision must be non-zero")?;
        check(self.grid.sub_levels > 0, "grid.sub_levels must be non-zero")?;
        check(self.clock.seconds_per_day > 0.0, "clock.seconds_per_day must be positive")?;
        check(
            self.clock.day_start_hour < self.clock.day_end_hour,
            "clock.day_start_hour must precede clock.day_end_hour",
        )?;
        check(
            self.water.max_neighbor_share > 0.0 && self.water.max_neighbor_share <= 0.5,
            "water.max_neighbor_share must be in (0, 0.5]",
        )?;
        check(self.water.max_oversaturation >= 1.0, "water.max_oversaturation must be >= 1")?;
        check(unit(self.nutrients.baseline), "nutrients.baseline must be in [0, 1]")?;
        check(self.nutrients.history_len > 0, "nutrients.history_len must be non-zero")?;
        check(unit(self.staged.stunted_multiplier), "staged.stunted_multiplier must be in [0, 1]")?;
        check(unit(self.staged.occlusion_factor), "staged.occlusion_factor must be in [0, 1]")?;
        check(self.staged.jitter_radius >= 0, "staged.jitter_radius must not be negative")?;
        check(
            unit(self.organic.night_root_growth_probability),
            "organic.night_root_growth_probability must be in [0, 1]",
        )?;
        check(
            unit(self.organic.lateral_leaf_preference),
            "organic.lateral_leaf_preference must be in [0, 1]",
        )?;
        check(unit(self.organic.occlusion_factor), "organic.occlusion_factor must be in [0, 1]")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = SimConfig::from_toml_str(
            r"
seed = 7

[staged]
stunt_retry_interval = 2.5

[organic]
night_root_growth_probability = 0.0
",
        )
        .expect("parse");
        assert_eq!(config.seed, 7);
        assert!((config.staged.stunt_retry_interval - 2.5).abs() < f32::EPSILON);
        assert!(config.organic.night_root_growth_probability.abs() < f32::EPSILON);
        assert_eq!(config.grid.subdivision, 10);
        assert!((config.staged.stunted_multiplier - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = SimConfig::from_toml_str("[grid]\nsubdivision = 0\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));

        let result = SimConfig::from_toml_str("[organic]\nnight_root_growth_probability = 1.5\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));

        let result = SimConfig::from_toml_str("seed = \"nope\"");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_roundtrip_through_file() {
        let mut config = SimConfig::default();
        config.seed = 99;
        config.water.drain_rate = 0.0;
        let text = config.to_toml_string().expect("serialize");

        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(text.as_bytes()).expect("write");

        let loaded = SimConfig::load(file.path()).expect("load");
        assert_eq!(loaded.seed, 99);
        assert!(loaded.water.drain_rate.abs() < f32::EPSILON);
    }

    #[test]
    fn test_missing_file() {
        let result = SimConfig::load(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }
}
