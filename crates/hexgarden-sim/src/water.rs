//! Cellular soil-water simulation.
//!
//! Each soil hex holds a volume of water bounded by its soil type's field
//! capacity. Every tick water moves down saturation gradients between
//! neighbors, drains into open space below, and evaporates from exposed
//! top cells.
//!
//! All outflows of a tick are computed from the state at the start of the
//! tick and recorded in a [`FlowLedger`]; the ledger is committed once at
//! the end, so the result does not depend on the order cells are visited.

use std::collections::BTreeSet;

use ahash::{AHashMap, AHashSet};
use hexgarden_common::{EdgeKey, HexCoord, HexCoord3D, HexMetrics, SoilType};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::WaterConfig;

/// Water state of one soil hex.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaterCell {
    /// Current water volume (>= 0).
    pub content: f32,
    /// Field capacity in volume units.
    pub capacity: f32,
    /// Permeability in `[0, 1]`.
    pub permeability: f32,
    /// Soil type the constants were derived from.
    pub soil_type: SoilType,
    /// Temperature in `[0, 1]`, scales evaporation.
    pub temperature: f32,
}

impl WaterCell {
    /// Create a dry cell for a hex of `volume` m³.
    #[must_use]
    pub fn new(soil_type: SoilType, volume: f32, temperature: f32) -> Self {
        Self {
            content: 0.0,
            capacity: volume * soil_type.capacity_per_m3(),
            permeability: soil_type.permeability(),
            soil_type,
            temperature: temperature.clamp(0.0, 1.0),
        }
    }

    /// Content over capacity; may exceed 1.0 after forced addition.
    #[must_use]
    pub fn saturation(&self) -> f32 {
        if self.capacity <= 0.0 {
            0.0
        } else {
            self.content / self.capacity
        }
    }

    /// Whether this cell takes part in flow at all.
    #[must_use]
    pub fn conducts(&self) -> bool {
        !self.soil_type.is_barrier() && self.capacity > 0.0
    }
}

/// Read-only snapshot of a cell for inspectors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaterInfo {
    /// Hex the info describes.
    pub coord: HexCoord3D,
    /// Current water volume.
    pub content: f32,
    /// Field capacity.
    pub capacity: f32,
    /// Content over capacity.
    pub saturation: f32,
    /// Permeability.
    pub permeability: f32,
    /// Soil type.
    pub soil_type: SoilType,
    /// Temperature.
    pub temperature: f32,
}

/// Direction of a flow edge relative to the source cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowDirection {
    Lateral,
    Down,
    Up,
}

/// Deferred per-cell deltas for one tick.
#[derive(Debug, Default)]
pub struct FlowLedger {
    deltas: AHashMap<HexCoord3D, f32>,
    removed: f64,
}

impl FlowLedger {
    /// Moves `volume` from `from` to `to`; `None` means the water leaves the grid.
    pub fn transfer(&mut self, from: HexCoord3D, to: Option<HexCoord3D>, volume: f32) {
        if volume <= 0.0 {
            return;
        }
        *self.deltas.entry(from).or_insert(0.0) -= volume;
        match to {
            Some(target) => *self.deltas.entry(target).or_insert(0.0) += volume,
            None => self.removed += f64::from(volume),
        }
    }

    /// Volume that left the grid this tick.
    #[must_use]
    pub fn removed(&self) -> f64 {
        self.removed
    }

    /// Applies every recorded delta at once.
    pub fn commit(self, cells: &mut AHashMap<HexCoord3D, WaterCell>) {
        for (coord, delta) in self.deltas {
            if let Some(cell) = cells.get_mut(&coord) {
                cell.content = (cell.content + delta).max(0.0);
            }
        }
    }
}

/// Soil water simulation over stacked hexes.
#[derive(Debug, Clone)]
pub struct WaterSimulation {
    metrics: HexMetrics,
    config: WaterConfig,
    cells: AHashMap<HexCoord3D, WaterCell>,
    barriers: AHashSet<EdgeKey>,
    columns: AHashMap<HexCoord, BTreeSet<i32>>,
}

impl WaterSimulation {
    /// Create an empty simulation.
    #[must_use]
    pub fn new(metrics: HexMetrics, config: WaterConfig) -> Self {
        Self {
            metrics,
            config,
            cells: AHashMap::new(),
            barriers: AHashSet::new(),
            columns: AHashMap::new(),
        }
    }

    /// Grid geometry.
    #[must_use]
    pub fn metrics(&self) -> &HexMetrics {
        &self.metrics
    }

    /// Adds a dry soil cell. Returns false if the hex is already soil.
    pub fn add_hex(&mut self, coord: HexCoord3D, soil_type: SoilType) -> bool {
        if self.cells.contains_key(&coord) {
            return false;
        }
        let cell = WaterCell::new(
            soil_type,
            self.metrics.hex_volume(),
            self.config.default_temperature,
        );
        self.cells.insert(coord, cell);
        self.columns.entry(coord.hex()).or_default().insert(coord.y);
        debug!("Water cell added at {} ({})", coord, soil_type.display_name());
        true
    }

    /// Removes a soil cell and its water. Returns false if there was none.
    pub fn remove_hex(&mut self, coord: HexCoord3D) -> bool {
        if self.cells.remove(&coord).is_none() {
            return false;
        }
        if let Some(levels) = self.columns.get_mut(&coord.hex()) {
            levels.remove(&coord.y);
            if levels.is_empty() {
                self.columns.remove(&coord.hex());
            }
        }
        // Barriers belong to the soil they were built on.
        self.barriers.retain(|edge| !edge.touches(coord));
        debug!("Water cell removed at {}", coord);
        true
    }

    /// Whether a soil cell exists.
    #[must_use]
    pub fn has_hex(&self, coord: HexCoord3D) -> bool {
        self.cells.contains_key(&coord)
    }

    /// Soil type of a cell.
    #[must_use]
    pub fn soil_type(&self, coord: HexCoord3D) -> Option<SoilType> {
        self.cells.get(&coord).map(|c| c.soil_type)
    }

    /// Raw cell access.
    #[must_use]
    pub fn cell(&self, coord: HexCoord3D) -> Option<&WaterCell> {
        self.cells.get(&coord)
    }

    /// All soil hexes, sorted.
    #[must_use]
    pub fn hexes(&self) -> Vec<HexCoord3D> {
        let mut out: Vec<_> = self.cells.keys().copied().collect();
        out.sort_unstable();
        out
    }

    /// Number of soil cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether there are no soil cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Highest soil level in a column.
    #[must_use]
    pub fn top_of_column(&self, hex: HexCoord) -> Option<i32> {
        self.columns.get(&hex).and_then(|levels| levels.last().copied())
    }

    /// Occupied soil levels of a column, bottom first.
    #[must_use]
    pub fn column_levels(&self, hex: HexCoord) -> Vec<i32> {
        self.columns
            .get(&hex)
            .map(|levels| levels.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether nothing sits directly above this cell.
    #[must_use]
    pub fn is_top_layer(&self, coord: HexCoord3D) -> bool {
        self.cells.contains_key(&coord) && !self.cells.contains_key(&coord.above())
    }

    /// Adds water, allowing saturation up to the configured oversaturation cap.
    ///
    /// Returns false for missing, barrier or zero-capacity cells, non-positive
    /// volumes, or when the cell is already at the cap.
    pub fn add_water(&mut self, coord: HexCoord3D, volume: f32) -> bool {
        if !(volume > 0.0) {
            return false;
        }
        let cap_factor = self.config.max_oversaturation;
        let Some(cell) = self.cells.get_mut(&coord) else {
            return false;
        };
        if !cell.conducts() {
            return false;
        }
        let room = cell.capacity * cap_factor - cell.content;
        if room <= 0.0 {
            return false;
        }
        cell.content += volume.min(room);
        trace!("Added {:.1} water at {}", volume.min(room), coord);
        true
    }

    /// Removes up to `volume` water; returns the amount actually removed.
    pub fn remove_water(&mut self, coord: HexCoord3D, volume: f32) -> f32 {
        if !(volume > 0.0) {
            return 0.0;
        }
        let Some(cell) = self.cells.get_mut(&coord) else {
            return 0.0;
        };
        let taken = volume.min(cell.content);
        cell.content -= taken;
        taken
    }

    /// Saturation of a cell, or 0.0 if there is no soil.
    #[must_use]
    pub fn saturation(&self, coord: HexCoord3D) -> f32 {
        self.cells.get(&coord).map_or(0.0, WaterCell::saturation)
    }

    /// Inspector snapshot of a cell.
    #[must_use]
    pub fn water_info(&self, coord: HexCoord3D) -> Option<WaterInfo> {
        self.cells.get(&coord).map(|cell| WaterInfo {
            coord,
            content: cell.content,
            capacity: cell.capacity,
            saturation: cell.saturation(),
            permeability: cell.permeability,
            soil_type: cell.soil_type,
            temperature: cell.temperature,
        })
    }

    /// Sets the temperature of a cell. Returns false if there is no soil.
    pub fn set_temperature(&mut self, coord: HexCoord3D, temperature: f32) -> bool {
        match self.cells.get_mut(&coord) {
            Some(cell) => {
                cell.temperature = temperature.clamp(0.0, 1.0);
                true
            },
            None => false,
        }
    }

    /// Sum of water over every cell.
    #[must_use]
    pub fn total_water(&self) -> f64 {
        self.cells.values().map(|c| f64::from(c.content)).sum()
    }

    /// Blocks flow between two adjacent hexes, in both directions.
    ///
    /// Returns false if the hexes are not adjacent or already blocked.
    pub fn add_edge_barrier(&mut self, a: HexCoord3D, b: HexCoord3D) -> bool {
        if !a.is_adjacent(b) {
            return false;
        }
        let inserted = self.barriers.insert(EdgeKey::new(a, b));
        if inserted {
            debug!("Edge barrier added between {} and {}", a, b);
        }
        inserted
    }

    /// Removes a barrier. Returns false if there was none.
    pub fn remove_edge_barrier(&mut self, a: HexCoord3D, b: HexCoord3D) -> bool {
        self.barriers.remove(&EdgeKey::new(a, b))
    }

    /// Whether flow between two hexes is blocked by a barrier.
    #[must_use]
    pub fn is_blocked(&self, a: HexCoord3D, b: HexCoord3D) -> bool {
        self.barriers.contains(&EdgeKey::new(a, b))
    }

    /// Number of edge barriers.
    #[must_use]
    pub fn barrier_count(&self) -> usize {
        self.barriers.len()
    }

    /// Advances the solver by `dt` seconds.
    pub fn tick(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let ledger = self.compute_flows(dt);
        trace!("Water tick: {:.1} volume left the grid", ledger.removed());
        ledger.commit(&mut self.cells);
    }

    /// Records every outflow of one tick against the current state.
    fn compute_flows(&self, dt: f32) -> FlowLedger {
        let mut ledger = FlowLedger::default();
        let mut sources: Vec<_> = self.cells.keys().copied().collect();
        sources.sort_unstable();

        let mut outflows: Vec<(Option<HexCoord3D>, f32)> = Vec::with_capacity(9);
        for coord in sources {
            let Some(cell) = self.cells.get(&coord) else {
                continue;
            };
            if !cell.conducts() || cell.content <= 0.0 {
                continue;
            }
            outflows.clear();

            let targets = coord
                .lateral_neighbors()
                .into_iter()
                .map(|n| (n, FlowDirection::Lateral))
                .chain([
                    (coord.below(), FlowDirection::Down),
                    (coord.above(), FlowDirection::Up),
                ]);

            for (target, direction) in targets {
                if self.is_blocked(coord, target) {
                    continue;
                }
                let volume = match self.cells.get(&target) {
                    Some(other) => self.neighbor_flow(cell, other, direction, dt),
                    None => self.open_drainage(cell, direction, dt),
                };
                if volume > 0.0 {
                    let to = self.cells.contains_key(&target).then_some(target);
                    outflows.push((to, volume));
                }
            }

            if !self.cells.contains_key(&coord.above()) {
                outflows.push((None, self.evaporation(cell, dt)));
            }

            let total: f32 = outflows.iter().map(|(_, v)| v).sum();
            let scale = if total > cell.content {
                cell.content / total
            } else {
                1.0
            };
            for &(to, volume) in &outflows {
                ledger.transfer(coord, to, volume * scale);
            }
        }
        ledger
    }

    fn neighbor_flow(&self, src: &WaterCell, dst: &WaterCell, direction: FlowDirection, dt: f32) -> f32 {
        if !dst.conducts() {
            return 0.0;
        }
        let gradient = src.saturation() - dst.saturation();
        if gradient <= 0.0 {
            return 0.0;
        }
        let permeability = (src.permeability + dst.permeability) * 0.5;
        let gravity = match direction {
            FlowDirection::Down => 1.0 + self.config.gravity_bias,
            FlowDirection::Up => self.config.capillary_damping,
            FlowDirection::Lateral => 1.0,
        };
        let share = (self.config.flow_rate * permeability * gravity * dt).min(self.config.max_neighbor_share);
        gradient * src.capacity.min(dst.capacity) * share
    }

    fn open_drainage(&self, src: &WaterCell, direction: FlowDirection, dt: f32) -> f32 {
        match direction {
            FlowDirection::Down => {
                let fraction = (src.permeability * self.config.drain_rate * dt).min(1.0);
                src.content * fraction
            },
            FlowDirection::Lateral => {
                let excess = src.content - src.capacity;
                if excess <= 0.0 {
                    return 0.0;
                }
                let share = (self.config.flow_rate * src.permeability * dt).min(self.config.max_neighbor_share);
                excess * share
            },
            FlowDirection::Up => 0.0,
        }
    }

    fn evaporation(&self, src: &WaterCell, dt: f32) -> f32 {
        let volume = self.config.evaporation_rate * src.temperature * self.metrics.hex_area() * dt;
        volume.min(src.content)
    }
}
