//! Per-hex nitrogen, phosphorus and potassium pools.
//!
//! Crops draw nutrients when they advance a stage (or continuously while
//! drinking), fixers put nitrogen back, and untouched soil drifts slowly
//! toward a low baseline. Each hex also remembers its last few crops so
//! rotation can be rewarded and monoculture penalized.

use std::collections::VecDeque;

use ahash::{AHashMap, AHashSet};
use crossbeam_channel::Sender;
use hexgarden_common::HexCoord3D;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::NutrientConfig;
use crate::events::{publish, SimEvent};

/// Nutrient levels of a hex, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NutrientLevels {
    /// Nitrogen
    pub nitrogen: f32,
    /// Phosphorus
    pub phosphorus: f32,
    /// Potassium
    pub potassium: f32,
}

impl NutrientLevels {
    /// Create levels, clamped to `[0, 1]`.
    #[must_use]
    pub fn new(nitrogen: f32, phosphorus: f32, potassium: f32) -> Self {
        Self {
            nitrogen,
            phosphorus,
            potassium,
        }
        .clamped()
    }

    /// Copy with every level clamped to `[0, 1]`.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            nitrogen: self.nitrogen.clamp(0.0, 1.0),
            phosphorus: self.phosphorus.clamp(0.0, 1.0),
            potassium: self.potassium.clamp(0.0, 1.0),
        }
    }

    /// Mean level; nitrogen is left out for crops that fix their own.
    #[must_use]
    pub fn average(&self, exclude_nitrogen: bool) -> f32 {
        if exclude_nitrogen {
            (self.phosphorus + self.potassium) / 2.0
        } else {
            (self.nitrogen + self.phosphorus + self.potassium) / 3.0
        }
    }
}

/// Partial nutrient addition; `None` leaves that nutrient alone.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NutrientAmounts {
    /// Nitrogen to add
    pub nitrogen: Option<f32>,
    /// Phosphorus to add
    pub phosphorus: Option<f32>,
    /// Potassium to add
    pub potassium: Option<f32>,
}

impl NutrientAmounts {
    /// The same amount of every nutrient, e.g. compost.
    #[must_use]
    pub fn balanced(amount: f32) -> Self {
        Self {
            nitrogen: Some(amount),
            phosphorus: Some(amount),
            potassium: Some(amount),
        }
    }

    /// Nitrogen only.
    #[must_use]
    pub fn nitrogen(amount: f32) -> Self {
        Self {
            nitrogen: Some(amount),
            ..Self::default()
        }
    }
}

/// Lifetime nutrient consumption of a crop. Negative means the crop fixes
/// that nutrient into the soil.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropNeeds {
    /// Nitrogen over the crop's life
    pub nitrogen: f32,
    /// Phosphorus over the crop's life
    pub phosphorus: f32,
    /// Potassium over the crop's life
    pub potassium: f32,
}

impl CropNeeds {
    const fn new(nitrogen: f32, phosphorus: f32, potassium: f32) -> Self {
        Self {
            nitrogen,
            phosphorus,
            potassium,
        }
    }

    /// Whether the crop puts nitrogen back.
    #[must_use]
    pub fn fixes_nitrogen(&self) -> bool {
        self.nitrogen < 0.0
    }

    /// Built-in needs of a known crop.
    #[must_use]
    pub fn lookup(crop: &str) -> Option<Self> {
        let needs = match crop {
            "tomato" => Self::new(0.30, 0.20, 0.25),
            "wheat" => Self::new(0.25, 0.10, 0.10),
            "corn" => Self::new(0.35, 0.15, 0.15),
            "lettuce" => Self::new(0.15, 0.05, 0.10),
            "carrot" => Self::new(0.10, 0.15, 0.20),
            "bean" => Self::new(-0.20, 0.10, 0.10),
            "clover" => Self::new(-0.25, 0.05, 0.05),
            "strawberry" => Self::new(0.15, 0.15, 0.20),
            "sapling" => Self::new(0.05, 0.03, 0.03),
            "fern" => Self::new(0.03, 0.02, 0.02),
            "vine" => Self::new(0.04, 0.03, 0.05),
            _ => return None,
        };
        Some(needs)
    }
}

/// Signed consumption: positive depletes, negative fixes.
fn apply_need(level: f32, need: f32, scale: f32) -> f32 {
    (level - need * scale).clamp(0.0, 1.0)
}

/// Nutrient state of one hex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutrientCell {
    /// Current levels
    pub levels: NutrientLevels,
    /// Recent crops, most recent first
    pub crop_history: VecDeque<String>,
}

impl NutrientCell {
    /// Create a cell with no history.
    #[must_use]
    pub fn new(levels: NutrientLevels) -> Self {
        Self {
            levels: levels.clamped(),
            crop_history: VecDeque::new(),
        }
    }
}

/// The nutrient operations plant simulations rely on.
pub trait NutrientPool {
    /// Creates a cell. Returns false if one already exists.
    fn add_hex(&mut self, coord: HexCoord3D, initial: Option<NutrientLevels>) -> bool;

    /// Drops a cell and its history. Returns false if there was none.
    fn remove_hex(&mut self, coord: HexCoord3D) -> bool;

    /// Current levels of a cell.
    fn nutrients(&self, coord: HexCoord3D) -> Option<NutrientLevels>;

    /// Applies one stage's worth of a crop's needs.
    fn deplete_nutrients(&mut self, coord: HexCoord3D, crop: &str, stage: usize) -> bool;

    /// Applies a crop's needs scaled by an externally supplied rate.
    fn deplete_continuous(&mut self, coord: HexCoord3D, crop: &str, scaled_delta: f32) -> bool;

    /// Adds nutrients, capped at 1.0.
    fn add_nutrients(&mut self, coord: HexCoord3D, amounts: NutrientAmounts) -> bool;

    /// Whether every nutrient the crop consumes is above the planting threshold.
    fn has_enough_nutrients(&self, coord: HexCoord3D, crop: &str) -> bool;

    /// Pushes a crop onto the hex's rotation history.
    fn record_crop_planting(&mut self, coord: HexCoord3D, crop: &str);

    /// Yield multiplier from the hex's recent crops.
    fn rotation_multiplier(&self, coord: HexCoord3D, crop: &str) -> f32;

    /// Drifts depleted cells toward the baseline.
    fn natural_recovery(&mut self, dt: f32);

    /// Lifetime needs of a crop, if known.
    fn crop_needs(&self, crop: &str) -> Option<CropNeeds> {
        CropNeeds::lookup(crop)
    }
}

/// Nutrient pools for every soil hex.
#[derive(Debug)]
pub struct NutrientSystem {
    config: NutrientConfig,
    cells: AHashMap<HexCoord3D, NutrientCell>,
    events: Sender<SimEvent>,
}

impl NutrientSystem {
    /// Create an empty system that reports changes on `events`.
    #[must_use]
    pub fn new(config: NutrientConfig, events: Sender<SimEvent>) -> Self {
        Self {
            config,
            cells: AHashMap::new(),
            events,
        }
    }

    /// Settings in use.
    #[must_use]
    pub fn config(&self) -> &NutrientConfig {
        &self.config
    }

    /// Raw cell access.
    #[must_use]
    pub fn cell(&self, coord: HexCoord3D) -> Option<&NutrientCell> {
        self.cells.get(&coord)
    }

    /// Number of tracked cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether no cells are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn notify(&self, coord: HexCoord3D, levels: NutrientLevels) {
        publish(&self.events, SimEvent::NutrientsChanged { coord, levels });
    }

    fn apply_needs(&mut self, coord: HexCoord3D, crop: &str, scale: f32) -> bool {
        let Some(needs) = CropNeeds::lookup(crop) else {
            return false;
        };
        let Some(cell) = self.cells.get_mut(&coord) else {
            return false;
        };
        let levels = &mut cell.levels;
        levels.nitrogen = apply_need(levels.nitrogen, needs.nitrogen, scale);
        levels.phosphorus = apply_need(levels.phosphorus, needs.phosphorus, scale);
        levels.potassium = apply_need(levels.potassium, needs.potassium, scale);
        let levels = *levels;
        self.notify(coord, levels);
        true
    }
}

impl NutrientPool for NutrientSystem {
    fn add_hex(&mut self, coord: HexCoord3D, initial: Option<NutrientLevels>) -> bool {
        if self.cells.contains_key(&coord) {
            return false;
        }
        let levels = initial.unwrap_or(self.config.initial);
        self.cells.insert(coord, NutrientCell::new(levels));
        true
    }

    fn remove_hex(&mut self, coord: HexCoord3D) -> bool {
        self.cells.remove(&coord).is_some()
    }

    fn nutrients(&self, coord: HexCoord3D) -> Option<NutrientLevels> {
        self.cells.get(&coord).map(|c| c.levels)
    }

    fn deplete_nutrients(&mut self, coord: HexCoord3D, crop: &str, stage: usize) -> bool {
        let applied = self.apply_needs(coord, crop, self.config.stage_fraction);
        if applied {
            debug!("Stage {} of {} depleted nutrients at {}", stage, crop, coord);
        }
        applied
    }

    fn deplete_continuous(&mut self, coord: HexCoord3D, crop: &str, scaled_delta: f32) -> bool {
        if !(scaled_delta > 0.0) {
            return false;
        }
        self.apply_needs(coord, crop, scaled_delta)
    }

    fn add_nutrients(&mut self, coord: HexCoord3D, amounts: NutrientAmounts) -> bool {
        let Some(cell) = self.cells.get_mut(&coord) else {
            return false;
        };
        let levels = &mut cell.levels;
        let bump = |level: f32, amount: Option<f32>| (level + amount.unwrap_or(0.0)).clamp(0.0, 1.0);
        levels.nitrogen = bump(levels.nitrogen, amounts.nitrogen);
        levels.phosphorus = bump(levels.phosphorus, amounts.phosphorus);
        levels.potassium = bump(levels.potassium, amounts.potassium);
        let levels = *levels;
        self.notify(coord, levels);
        true
    }

    fn has_enough_nutrients(&self, coord: HexCoord3D, crop: &str) -> bool {
        let Some(needs) = CropNeeds::lookup(crop) else {
            return true;
        };
        let Some(cell) = self.cells.get(&coord) else {
            return false;
        };
        let min = self.config.min_threshold;
        let ok = |need: f32, level: f32| need <= 0.0 || level > min;
        ok(needs.nitrogen, cell.levels.nitrogen)
            && ok(needs.phosphorus, cell.levels.phosphorus)
            && ok(needs.potassium, cell.levels.potassium)
    }

    fn record_crop_planting(&mut self, coord: HexCoord3D, crop: &str) {
        let history_len = self.config.history_len;
        if let Some(cell) = self.cells.get_mut(&coord) {
            cell.crop_history.push_front(crop.to_string());
            cell.crop_history.truncate(history_len);
        }
    }

    fn rotation_multiplier(&self, coord: HexCoord3D, crop: &str) -> f32 {
        let Some(cell) = self.cells.get(&coord) else {
            return 1.0;
        };
        let repeats = cell.crop_history.iter().filter(|c| c.as_str() == crop).count();
        let unique = cell
            .crop_history
            .iter()
            .map(String::as_str)
            .collect::<AHashSet<_>>()
            .len();
        (1.0 - 0.1 * repeats as f32 + 0.05 * unique as f32).max(0.5)
    }

    fn natural_recovery(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let baseline = self.config.baseline;
        let step = self.config.recovery_rate * dt;
        let recover = |level: f32| if level < baseline { (level + step).min(baseline) } else { level };
        for cell in self.cells.values_mut() {
            let levels = &mut cell.levels;
            levels.nitrogen = recover(levels.nitrogen);
            levels.phosphorus = recover(levels.phosphorus);
            levels.potassium = recover(levels.potassium);
        }
        trace!("Nutrient recovery over {} cells", self.cells.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use proptest::prelude::*;

    fn system() -> (NutrientSystem, EventBus) {
        let bus = EventBus::new(256);
        (NutrientSystem::new(NutrientConfig::default(), bus.sender()), bus)
    }

    const ORIGIN: HexCoord3D = HexCoord3D::new(0, 0, 0);

    #[test]
    fn test_default_initial_levels() {
        let (mut nutrients, _bus) = system();
        assert!(nutrients.add_hex(ORIGIN, None));
        assert!(!nutrients.add_hex(ORIGIN, None));
        let levels = nutrients.nutrients(ORIGIN).expect("cell");
        assert!((levels.nitrogen - 0.6).abs() < 1e-6);
        assert!((levels.phosphorus - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_stage_depletion() {
        let (mut nutrients, bus) = system();
        nutrients.add_hex(ORIGIN, None);
        assert!(nutrients.deplete_nutrients(ORIGIN, "tomato", 1));

        let levels = nutrients.nutrients(ORIGIN).expect("cell");
        assert!((levels.nitrogen - 0.5).abs() < 1e-5);
        assert!((levels.potassium - (0.5 - 0.25 / 3.0)).abs() < 1e-5);
        assert!(matches!(bus.drain().as_slice(), [SimEvent::NutrientsChanged { .. }]));
    }

    #[test]
    fn test_fixer_adds_nitrogen() {
        let (mut nutrients, _bus) = system();
        nutrients.add_hex(ORIGIN, None);
        let before = nutrients.nutrients(ORIGIN).expect("cell");
        nutrients.deplete_nutrients(ORIGIN, "bean", 0);
        let after = nutrients.nutrients(ORIGIN).expect("cell");

        assert!(after.nitrogen > before.nitrogen);
        assert!(after.phosphorus < before.phosphorus);
        assert!(after.potassium < before.potassium);
    }

    #[test]
    fn test_fixer_caps_at_one() {
        let (mut nutrients, _bus) = system();
        nutrients.add_hex(ORIGIN, Some(NutrientLevels::new(0.99, 0.5, 0.5)));
        nutrients.deplete_nutrients(ORIGIN, "clover", 0);
        assert!((nutrients.nutrients(ORIGIN).expect("cell").nitrogen - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_unknown_crop_and_missing_cell() {
        let (mut nutrients, _bus) = system();
        assert!(!nutrients.deplete_nutrients(ORIGIN, "tomato", 0));
        assert!(!nutrients.has_enough_nutrients(ORIGIN, "tomato"));
        assert!(nutrients.has_enough_nutrients(ORIGIN, "moonflower"));
        nutrients.add_hex(ORIGIN, None);
        assert!(!nutrients.deplete_nutrients(ORIGIN, "moonflower", 0));
        assert!((nutrients.rotation_multiplier(HexCoord3D::new(9, 9, 9), "tomato") - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_has_enough_ignores_fixed_nutrient() {
        let (mut nutrients, _bus) = system();
        nutrients.add_hex(ORIGIN, Some(NutrientLevels::new(0.0, 0.5, 0.5)));
        assert!(nutrients.has_enough_nutrients(ORIGIN, "bean"));
        assert!(!nutrients.has_enough_nutrients(ORIGIN, "tomato"));
        nutrients.add_hex(ORIGIN.above(), Some(NutrientLevels::new(0.5, 0.1, 0.5)));
        assert!(!nutrients.has_enough_nutrients(ORIGIN.above(), "bean"));
    }

    #[test]
    fn test_continuous_depletion_scales() {
        let (mut nutrients, _bus) = system();
        nutrients.add_hex(ORIGIN, None);
        assert!(nutrients.deplete_continuous(ORIGIN, "wheat", 0.1));
        let levels = nutrients.nutrients(ORIGIN).expect("cell");
        assert!((levels.nitrogen - 0.575).abs() < 1e-5);
        assert!(!nutrients.deplete_continuous(ORIGIN, "wheat", 0.0));
    }

    #[test]
    fn test_partial_addition() {
        let (mut nutrients, _bus) = system();
        nutrients.add_hex(ORIGIN, None);
        assert!(nutrients.add_nutrients(ORIGIN, NutrientAmounts::nitrogen(0.2)));
        let levels = nutrients.nutrients(ORIGIN).expect("cell");
        assert!((levels.nitrogen - 0.8).abs() < 1e-5);
        assert!((levels.phosphorus - 0.5).abs() < 1e-5);
        assert!(!nutrients.add_nutrients(ORIGIN.above(), NutrientAmounts::balanced(0.1)));
    }

    #[test]
    fn test_rotation_multiplier() {
        let (mut nutrients, _bus) = system();
        nutrients.add_hex(ORIGIN, None);
        assert!((nutrients.rotation_multiplier(ORIGIN, "tomato") - 1.0).abs() < 1e-6);

        nutrients.record_crop_planting(ORIGIN, "tomato");
        nutrients.record_crop_planting(ORIGIN, "tomato");
        nutrients.record_crop_planting(ORIGIN, "tomato");
        // 3 repeats, 1 unique
        assert!((nutrients.rotation_multiplier(ORIGIN, "tomato") - 0.75).abs() < 1e-6);

        nutrients.record_crop_planting(ORIGIN, "bean");
        nutrients.record_crop_planting(ORIGIN, "wheat");
        let history = &nutrients.cell(ORIGIN).expect("cell").crop_history;
        assert_eq!(history.len(), 3);
        assert_eq!(history.front().map(String::as_str), Some("wheat"));
        // 1 repeat, 3 unique
        assert!((nutrients.rotation_multiplier(ORIGIN, "tomato") - 1.05).abs() < 1e-6);
        assert!((nutrients.rotation_multiplier(ORIGIN, "corn") - 1.15).abs() < 1e-6);
    }

    #[test]
    fn test_recovery_toward_baseline() {
        let (mut nutrients, _bus) = system();
        nutrients.add_hex(ORIGIN, Some(NutrientLevels::new(0.1, 0.5, 0.19)));
        nutrients.natural_recovery(100.0);
        let levels = nutrients.nutrients(ORIGIN).expect("cell");
        assert!((levels.nitrogen - 0.15).abs() < 1e-5);
        assert!((levels.phosphorus - 0.5).abs() < 1e-6);
        assert!((levels.potassium - 0.2).abs() < 1e-6);

        nutrients.natural_recovery(10_000.0);
        let levels = nutrients.nutrients(ORIGIN).expect("cell");
        assert!((levels.nitrogen - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_crop_needs_table() {
        let (nutrients, _bus) = system();
        assert!(nutrients.crop_needs("bean").expect("known").fixes_nitrogen());
        assert!(!nutrients.crop_needs("corn").expect("known").fixes_nitrogen());
        assert!(nutrients.crop_needs("kelp").is_none());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Deplete(usize),
        Continuous(usize, f32),
        Add(f32, f32, f32),
        Recover(f32),
    }

    const CROPS: [&str; 6] = ["tomato", "bean", "clover", "corn", "carrot", "fern"];

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..CROPS.len()).prop_map(Op::Deplete),
            (0..CROPS.len(), 0.0f32..5.0).prop_map(|(c, s)| Op::Continuous(c, s)),
            (-1.0f32..1.0, -1.0f32..1.0, -1.0f32..1.0).prop_map(|(n, p, k)| Op::Add(n, p, k)),
            (0.0f32..1000.0).prop_map(Op::Recover),
        ]
    }

    proptest! {
        #[test]
        fn prop_levels_stay_in_unit_range(
            n in 0.0f32..=1.0,
            p in 0.0f32..=1.0,
            k in 0.0f32..=1.0,
            ops in proptest::collection::vec(op(), 1..40),
        ) {
            let (mut nutrients, _bus) = system();
            nutrients.add_hex(ORIGIN, Some(NutrientLevels::new(n, p, k)));
            for op in ops {
                match op {
                    Op::Deplete(c) => { nutrients.deplete_nutrients(ORIGIN, CROPS[c], 0); },
                    Op::Continuous(c, s) => { nutrients.deplete_continuous(ORIGIN, CROPS[c], s); },
                    Op::Add(n, p, k) => {
                        nutrients.add_nutrients(ORIGIN, NutrientAmounts {
                            nitrogen: Some(n),
                            phosphorus: Some(p),
                            potassium: Some(k),
                        });
                    },
                    Op::Recover(dt) => nutrients.natural_recovery(dt),
                }
                let levels = nutrients.nutrients(ORIGIN).expect("cell");
                for value in [levels.nitrogen, levels.phosphorus, levels.potassium] {
                    prop_assert!((0.0..=1.0).contains(&value));
                }
            }
        }

        #[test]
        fn prop_fixer_raises_nitrogen_below_cap(
            n in 0.0f32..0.9,
            p in 0.2f32..=1.0,
            k in 0.2f32..=1.0,
        ) {
            let (mut nutrients, _bus) = system();
            nutrients.add_hex(ORIGIN, Some(NutrientLevels::new(n, p, k)));
            nutrients.deplete_nutrients(ORIGIN, "bean", 1);
            let after = nutrients.nutrients(ORIGIN).expect("cell");
            prop_assert!(after.nitrogen > n);
            prop_assert!(after.phosphorus < p);
            prop_assert!(after.potassium < k);
        }
    }
}
