//! The garden plot as one object.
//!
//! [`Terrain`] owns every subsystem and is the single source of truth for
//! soil, water, nutrients and plants. Placement tools call its commands,
//! renderers and UI call its queries, and the host loop calls [`Terrain::tick`].

use glam::{Vec2, Vec3};
use hexgarden_common::{HexCoord3D, HexMetrics, PlantId, SoilType, SubHexCoord3D};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::SimConfig;
use crate::context::GrowthContext;
use crate::events::{EventBus, SimEvent};
use crate::nutrients::{CropNeeds, NutrientAmounts, NutrientLevels, NutrientPool, NutrientSystem};
use crate::occupancy::OccupancyIndex;
use crate::organic::{OrganicPlant, OrganicPlantRegistry, OrganicPlantSimulation};
use crate::staged::{StagedPlant, StagedPlantRegistry, StagedPlantSimulation, UprootedPlant};
use crate::time::SimClock;
use crate::water::{WaterInfo, WaterSimulation};

/// Capacity of the terrain's event bus.
const EVENT_CAPACITY: usize = 4096;

/// Lowest and highest level soil may start a column at.
const GROUND_LEVELS: std::ops::RangeInclusive<i32> = -1..=1;

/// Which simulation drives a plant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlantKind {
    /// Fixed growth stages
    Staged,
    /// Meristem growth
    Organic,
}

/// Read-only view of a plant for rendering and UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantSummary {
    /// Plant id
    pub id: PlantId,
    /// Plant type id
    pub type_id: String,
    /// Simulation driving the plant
    pub kind: PlantKind,
    /// Sub-hex the plant grows from
    pub origin: SubHexCoord3D,
    /// Soil hex under the origin
    pub soil_hex: HexCoord3D,
    /// Stage index (staged plants)
    pub stage: Option<usize>,
    /// Stage name (staged plants)
    pub stage_name: Option<String>,
    /// Health in `[0, 1]`
    pub health: f32,
    /// Whether the plant is blocked from advancing
    pub stunted: bool,
    /// Yield waiting to be harvested
    pub accumulated_yield: f32,
    /// Sub-hexes the plant occupies
    pub cells: usize,
}

impl PlantSummary {
    fn staged(plant: &StagedPlant, registry: &StagedPlantRegistry) -> Self {
        let stage_name = registry
            .get(&plant.type_id)
            .and_then(|t| t.stage(plant.stage))
            .map(|s| s.name.clone());
        Self {
            id: plant.id,
            type_id: plant.type_id.clone(),
            kind: PlantKind::Staged,
            origin: plant.origin,
            soil_hex: plant.soil_hex,
            stage: Some(plant.stage),
            stage_name,
            health: plant.health(),
            stunted: plant.stunted,
            accumulated_yield: plant.accumulated_yield,
            cells: plant.cells.len(),
        }
    }

    fn organic(plant: &OrganicPlant) -> Self {
        Self {
            id: plant.id,
            type_id: plant.type_id.clone(),
            kind: PlantKind::Organic,
            origin: plant.origin,
            soil_hex: plant.soil_hex,
            stage: None,
            stage_name: None,
            health: plant.health(),
            stunted: false,
            accumulated_yield: 0.0,
            cells: plant.components.len(),
        }
    }
}

/// Soil, water, nutrients and plants of one garden.
#[derive(Debug)]
pub struct Terrain {
    config: SimConfig,
    clock: SimClock,
    water: WaterSimulation,
    nutrients: NutrientSystem,
    occupancy: OccupancyIndex,
    staged: StagedPlantSimulation,
    organic: OrganicPlantSimulation,
    events: EventBus,
}

impl Terrain {
    /// Creates an empty terrain with the default plant types.
    #[must_use]
    pub fn new(config: SimConfig) -> Self {
        Self::with_registries(
            config,
            StagedPlantRegistry::with_defaults(),
            OrganicPlantRegistry::with_defaults(),
        )
    }

    /// Creates an empty terrain with custom plant types.
    #[must_use]
    pub fn with_registries(config: SimConfig, staged: StagedPlantRegistry, organic: OrganicPlantRegistry) -> Self {
        let events = EventBus::new(EVENT_CAPACITY);
        // Each simulation rolls its own stream.
        let staged_seed = config.seed;
        let organic_seed = config.seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
        Self {
            clock: SimClock::new(config.clock.clone()),
            water: WaterSimulation::new(config.grid, config.water.clone()),
            nutrients: NutrientSystem::new(config.nutrients.clone(), events.sender()),
            occupancy: OccupancyIndex::new(config.grid),
            staged: StagedPlantSimulation::new(config.staged.clone(), staged, staged_seed, events.sender()),
            organic: OrganicPlantSimulation::new(config.organic.clone(), organic, organic_seed, events.sender()),
            events,
            config,
        }
    }

    /// Configuration the terrain was built with.
    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Grid geometry.
    #[must_use]
    pub fn metrics(&self) -> &HexMetrics {
        self.water.metrics()
    }

    /// Time of day.
    #[must_use]
    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    /// Mutable clock, for jumping to a time of day.
    pub fn clock_mut(&mut self) -> &mut SimClock {
        &mut self.clock
    }

    /// Water table.
    #[must_use]
    pub fn water(&self) -> &WaterSimulation {
        &self.water
    }

    /// Sub-hex ownership.
    #[must_use]
    pub fn occupancy(&self) -> &OccupancyIndex {
        &self.occupancy
    }

    /// Staged crops.
    #[must_use]
    pub fn staged(&self) -> &StagedPlantSimulation {
        &self.staged
    }

    /// Organic plants.
    #[must_use]
    pub fn organic(&self) -> &OrganicPlantSimulation {
        &self.organic
    }

    /// Places soil on top of a column, or within the ground band when the
    /// column is empty.
    pub fn place_soil(&mut self, coord: HexCoord3D, soil: Option<SoilType>) -> bool {
        let allowed = match self.water.top_of_column(coord.hex()) {
            Some(top) => coord.y == top + 1,
            None => GROUND_LEVELS.contains(&coord.y),
        };
        if !allowed {
            trace!("Rejected soil at {}: not on top of its column", coord);
            return false;
        }
        if self.occupancy.any_in_hex(coord) {
            trace!("Rejected soil at {}: plants in the way", coord);
            return false;
        }

        let soil = soil.unwrap_or_default();
        if !self.water.add_hex(coord, soil) {
            return false;
        }
        let initial = (soil == SoilType::Tilled).then_some(self.config.nutrients.tilled_initial);
        self.nutrients.add_hex(coord, initial);
        debug!("Placed {} soil at {}", soil.display_name(), coord);
        self.events.publish(SimEvent::SoilPlaced { coord, soil });
        true
    }

    /// Removes the top hex of a column, along with any plant growing from it.
    pub fn remove_soil(&mut self, coord: HexCoord3D) -> bool {
        if self.water.top_of_column(coord.hex()) != Some(coord.y) {
            return false;
        }

        let mut ctx = GrowthContext::new(&mut self.water, &mut self.nutrients, &mut self.occupancy, &self.clock);
        let mut removed = self.staged.remove_plants_in(coord, &mut ctx);
        removed.extend(self.organic.remove_plants_in(coord, &mut ctx));

        self.water.remove_hex(coord);
        self.nutrients.remove_hex(coord);
        debug!("Removed soil at {} ({} plants lost)", coord, removed.len());
        self.events.publish(SimEvent::SoilRemoved { coord });
        true
    }

    /// Pours water into a hex.
    pub fn add_water(&mut self, coord: HexCoord3D, volume: f32) -> bool {
        self.water.add_water(coord, volume)
    }

    /// Fertilizes a hex.
    pub fn add_nutrients(&mut self, coord: HexCoord3D, amounts: NutrientAmounts) -> bool {
        self.nutrients.add_nutrients(coord, amounts)
    }

    /// Blocks water across the shared face of two hexes.
    pub fn add_edge_barrier(&mut self, a: HexCoord3D, b: HexCoord3D) -> bool {
        self.water.add_edge_barrier(a, b)
    }

    /// Opens a blocked face.
    pub fn remove_edge_barrier(&mut self, a: HexCoord3D, b: HexCoord3D) -> bool {
        self.water.remove_edge_barrier(a, b)
    }

    /// First sub-layer above the soil under a world position.
    #[must_use]
    pub fn origin_under(&self, world: Vec3) -> Option<SubHexCoord3D> {
        let metrics = self.water.metrics();
        let sub = metrics.world_to_sub_hex(Vec2::new(world.x, world.z));
        let top = self.water.top_of_column(sub.parent())?;
        Some(sub.at_layer(metrics.first_layer_of_level(top + 1)))
    }

    /// Plants a seed on the soil under `world`.
    ///
    /// Staged types win over organic ones with the same id.
    pub fn plant_seed(&mut self, type_id: &str, world: Vec3) -> Option<PlantId> {
        let origin = self.origin_under(world)?;
        let mut ctx = GrowthContext::new(&mut self.water, &mut self.nutrients, &mut self.occupancy, &self.clock);
        if self.staged.registry().contains(type_id) {
            self.staged.plant_seed(type_id, origin, &mut ctx)
        } else {
            self.organic.plant_seed(type_id, origin, &mut ctx)
        }
    }

    /// Harvests a plant. Organic plants yield nothing.
    pub fn harvest_plant(&mut self, id: PlantId) -> u32 {
        let now = self.clock.total_seconds();
        self.staged.harvest_plant(id, &mut self.occupancy, now)
    }

    /// Pulls a staged plant out for replanting elsewhere.
    pub fn uproot_plant(&mut self, id: PlantId) -> Option<UprootedPlant> {
        self.staged.uproot_plant(id, &mut self.occupancy)
    }

    /// Replants an uprooted plant on the soil under `world`.
    pub fn replant_plant(&mut self, snapshot: &UprootedPlant, world: Vec3) -> Option<PlantId> {
        let origin = self.origin_under(world)?;
        let mut ctx = GrowthContext::new(&mut self.water, &mut self.nutrients, &mut self.occupancy, &self.clock);
        self.staged.replant_plant(snapshot, origin, &mut ctx)
    }

    /// Removes any plant.
    pub fn remove_plant(&mut self, id: PlantId) -> bool {
        self.staged.remove_plant(id, &mut self.occupancy) || self.organic.remove_plant(id, &mut self.occupancy)
    }

    /// Every soil hex, sorted.
    #[must_use]
    pub fn all_hexes(&self) -> Vec<HexCoord3D> {
        self.water.hexes()
    }

    /// Water saturation of a hex; 0 when there is no soil.
    #[must_use]
    pub fn saturation(&self, coord: HexCoord3D) -> f32 {
        self.water.saturation(coord)
    }

    /// Water state of a hex.
    #[must_use]
    pub fn water_info(&self, coord: HexCoord3D) -> Option<WaterInfo> {
        self.water.water_info(coord)
    }

    /// Nutrient levels of a hex.
    #[must_use]
    pub fn nutrients(&self, coord: HexCoord3D) -> Option<NutrientLevels> {
        self.nutrients.nutrients(coord)
    }

    /// Every plant, staged first.
    #[must_use]
    pub fn all_plants(&self) -> Vec<PlantSummary> {
        let registry = self.staged.registry();
        self.staged
            .plants()
            .map(|p| PlantSummary::staged(p, registry))
            .chain(self.organic.plants().map(PlantSummary::organic))
            .collect()
    }

    /// Plant occupying the sub-hex at a world position.
    #[must_use]
    pub fn plant_at(&self, world: Vec3) -> Option<PlantSummary> {
        let cell = self.water.metrics().world_to_sub_hex3d(world);
        self.plant_at_cell(cell)
    }

    /// Plant occupying a sub-hex.
    #[must_use]
    pub fn plant_at_cell(&self, cell: SubHexCoord3D) -> Option<PlantSummary> {
        if let Some(plant) = self.staged.plant_at(cell, &self.occupancy) {
            return Some(PlantSummary::staged(plant, self.staged.registry()));
        }
        self.organic
            .plant_at(cell, &self.occupancy)
            .map(PlantSummary::organic)
    }

    /// Lifetime nutrient needs of a crop.
    #[must_use]
    pub fn crop_needs(&self, crop: &str) -> Option<CropNeeds> {
        self.nutrients.crop_needs(crop)
    }

    /// Yield multiplier for planting `crop` at a hex.
    #[must_use]
    pub fn rotation_multiplier(&self, coord: HexCoord3D, crop: &str) -> f32 {
        self.nutrients.rotation_multiplier(coord, crop)
    }

    /// Advances the whole garden by `dt` seconds.
    pub fn tick(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        self.clock.advance(dt);
        self.water.tick(dt);
        self.nutrients.natural_recovery(dt);

        let mut ctx = GrowthContext::new(&mut self.water, &mut self.nutrients, &mut self.occupancy, &self.clock);
        self.staged.tick(dt, &mut ctx);
        self.organic.tick(dt, &mut ctx);
    }

    /// Takes every pending event.
    pub fn drain_events(&self) -> Vec<SimEvent> {
        self.events.drain()
    }
}

impl Default for Terrain {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}
