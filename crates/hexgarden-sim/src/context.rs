//! Shared state handed to the plant simulations each tick.
//!
//! Plants never own soil. They borrow the water table, the nutrient pool,
//! the occupancy index and the clock through [`GrowthContext`], and request
//! water through an [`UptakeLedger`] so that several plants drinking from
//! one hex are served from the same pre-tick volume.

use std::collections::BTreeMap;

use hexgarden_common::{HexCoord3D, HexMetrics, PlantId, SubHexCoord3D};
use tracing::trace;

use crate::nutrients::NutrientPool;
use crate::occupancy::OccupancyIndex;
use crate::time::SimClock;
use crate::water::WaterSimulation;

/// Borrowed simulation state for one plant tick.
pub struct GrowthContext<'a> {
    /// Soil water
    pub water: &'a mut WaterSimulation,
    /// Soil nutrients
    pub nutrients: &'a mut dyn NutrientPool,
    /// Sub-hex ownership
    pub occupancy: &'a mut OccupancyIndex,
    /// Time of day
    pub clock: &'a SimClock,
}

impl<'a> GrowthContext<'a> {
    /// Bundle the borrowed subsystems.
    pub fn new(
        water: &'a mut WaterSimulation,
        nutrients: &'a mut dyn NutrientPool,
        occupancy: &'a mut OccupancyIndex,
        clock: &'a SimClock,
    ) -> Self {
        Self {
            water,
            nutrients,
            occupancy,
            clock,
        }
    }

    /// Grid geometry.
    #[must_use]
    pub fn metrics(&self) -> HexMetrics {
        *self.water.metrics()
    }

    /// Whether a sub-hex lies inside placed soil.
    #[must_use]
    pub fn in_soil(&self, cell: SubHexCoord3D) -> bool {
        self.water.has_hex(self.metrics().parent_hex3d(cell))
    }

    /// Light reaching a sub-hex, in `[0, 1]`.
    ///
    /// Scans `scan_layers` sub-layers straight up. Soil anywhere in the scan
    /// blocks the light; each occupied sub-hex multiplies it by `occlusion`.
    #[must_use]
    pub fn light_at(&self, cell: SubHexCoord3D, occlusion: f32, scan_layers: u32) -> f32 {
        let metrics = self.metrics();
        let mut light = 1.0;
        for k in 1..=scan_layers as i32 {
            let above = cell.shifted(k);
            if self.water.has_hex(metrics.parent_hex3d(above)) {
                return 0.0;
            }
            if !self.occupancy.is_free(above) {
                light *= occlusion;
            }
        }
        light
    }
}

/// Two-phase water allocation between plants.
///
/// Demands are collected first; [`UptakeLedger::settle`] then serves every
/// hex once, splitting its water proportionally when demand exceeds supply.
#[derive(Debug, Default)]
pub struct UptakeLedger {
    demands: BTreeMap<HexCoord3D, Vec<(PlantId, f32)>>,
}

impl UptakeLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a plant's demand on a hex.
    pub fn request(&mut self, hex: HexCoord3D, plant: PlantId, volume: f32) {
        if volume > 0.0 {
            self.demands.entry(hex).or_default().push((plant, volume));
        }
    }

    /// Whether nothing was requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.demands.is_empty()
    }

    /// Removes the granted water from the soil and returns each plant's
    /// grants per hex.
    pub fn settle(self, water: &mut WaterSimulation) -> BTreeMap<PlantId, Vec<(HexCoord3D, f32)>> {
        let mut grants: BTreeMap<PlantId, Vec<(HexCoord3D, f32)>> = BTreeMap::new();
        for (hex, demands) in self.demands {
            let available = water.cell(hex).map_or(0.0, |c| c.content);
            let total: f32 = demands.iter().map(|(_, v)| v).sum();
            if available <= 0.0 || total <= 0.0 {
                continue;
            }
            let scale = (available / total).min(1.0);
            let taken = water.remove_water(hex, total * scale);
            trace!("Uptake at {}: {:.2} of {:.2} requested", hex, taken, total);
            for (plant, volume) in demands {
                grants.entry(plant).or_default().push((hex, volume * scale));
            }
        }
        grants
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::{NutrientConfig, WaterConfig};
    use crate::events::EventBus;
    use crate::nutrients::NutrientSystem;
    use hexgarden_common::{HexCoord, SoilType, SubHexCoord};

    /// A small plot with still water and a clock at noon.
    pub(crate) struct TestPlot {
        pub water: WaterSimulation,
        pub nutrients: NutrientSystem,
        pub occupancy: OccupancyIndex,
        pub clock: SimClock,
        pub bus: EventBus,
    }

    impl TestPlot {
        pub fn new() -> Self {
            let bus = EventBus::new(4096);
            let water_config = WaterConfig {
                drain_rate: 0.0,
                evaporation_rate: 0.0,
                flow_rate: 0.0,
                ..WaterConfig::default()
            };
            Self {
                water: WaterSimulation::new(HexMetrics::default(), water_config),
                nutrients: NutrientSystem::new(NutrientConfig::default(), bus.sender()),
                occupancy: OccupancyIndex::new(HexMetrics::default()),
                clock: SimClock::at_hour(12.0),
                bus,
            }
        }

        /// Places soil filled to `saturation`.
        pub fn soil(&mut self, coord: HexCoord3D, saturation: f32) {
            self.water.add_hex(coord, SoilType::Loam);
            self.nutrients.add_hex(coord, None);
            self.fill(coord, saturation);
        }

        /// Tops a cell up to `saturation`.
        pub fn fill(&mut self, coord: HexCoord3D, saturation: f32) {
            if let Some(info) = self.water.water_info(coord) {
                let missing = info.capacity * saturation - info.content;
                if missing > 0.0 {
                    self.water.add_water(coord, missing);
                }
            }
        }

        /// First sub-layer above the top of a column, at the hex center.
        pub fn origin(&self, hex: HexCoord) -> SubHexCoord3D {
            let top = self.water.top_of_column(hex).unwrap_or(-1);
            let layer = self.water.metrics().first_layer_of_level(top + 1);
            SubHexCoord::center_of(hex).at_layer(layer)
        }

        pub fn ctx(&mut self) -> GrowthContext<'_> {
            GrowthContext::new(&mut self.water, &mut self.nutrients, &mut self.occupancy, &self.clock)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WaterConfig;
    use hexgarden_common::SoilType;

    #[test]
    fn test_proportional_split() {
        let mut water = WaterSimulation::new(HexMetrics::default(), WaterConfig::default());
        let hex = HexCoord3D::new(0, 0, 0);
        water.add_hex(hex, SoilType::Loam);
        water.add_water(hex, 300.0);

        let a = PlantId::new();
        let b = PlantId::new();
        let mut ledger = UptakeLedger::new();
        ledger.request(hex, a, 400.0);
        ledger.request(hex, b, 200.0);
        let grants = ledger.settle(&mut water);

        assert!((grants[&a][0].1 - 200.0).abs() < 1e-3);
        assert!((grants[&b][0].1 - 100.0).abs() < 1e-3);
        assert!(water.cell(hex).expect("cell").content.abs() < 1e-3);
    }

    #[test]
    fn test_order_does_not_matter() {
        let hex = HexCoord3D::new(0, 0, 0);
        let a = PlantId::new();
        let b = PlantId::new();
        let run = |first: (PlantId, f32), second: (PlantId, f32)| {
            let mut water = WaterSimulation::new(HexMetrics::default(), WaterConfig::default());
            water.add_hex(hex, SoilType::Loam);
            water.add_water(hex, 50.0);
            let mut ledger = UptakeLedger::new();
            ledger.request(hex, first.0, first.1);
            ledger.request(hex, second.0, second.1);
            ledger.settle(&mut water)
        };
        let forward = run((a, 80.0), (b, 20.0));
        let backward = run((b, 20.0), (a, 80.0));
        assert!((forward[&a][0].1 - backward[&a][0].1).abs() < 1e-4);
        assert!((forward[&b][0].1 - backward[&b][0].1).abs() < 1e-4);
    }
}
