//! Staged crop growth.
//!
//! This module provides:
//! - Plant types made of fixed growth stages, each with an occupation pattern
//! - Resource satisfaction (water, nutrients, sunlight) from the occupied cells
//! - Stage transitions that claim space atomically, with stunting on conflict
//! - Yield accrual, harvesting, uprooting and replanting

use std::collections::BTreeMap;

use ahash::AHashMap;
use crossbeam_channel::Sender;
use hexgarden_common::{
    HexCoord3D, HexGardenError, HexGardenResult, PlantId, SchemaVersion, SubHexCoord3D,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::config::StagedConfig;
use crate::context::{GrowthContext, UptakeLedger};
use crate::events::{publish, SimEvent};
use crate::nutrients::CropNeeds;
use crate::occupancy::{ComponentKind, OccupancyIndex};

/// One cell of a stage pattern, relative to the plant origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternCell {
    /// Sub-hex column offset
    pub dq: i32,
    /// Sub-hex row offset
    pub dr: i32,
    /// Sub-layer offset (negative = into the soil)
    pub dh: i32,
    /// What fills the cell
    pub kind: ComponentKind,
}

impl PatternCell {
    /// Create a pattern cell.
    #[must_use]
    pub const fn new(dq: i32, dr: i32, dh: i32, kind: ComponentKind) -> Self {
        Self { dq, dr, dh, kind }
    }

    /// Root cell straight below the origin.
    #[must_use]
    pub const fn root(dh: i32) -> Self {
        Self::new(0, 0, dh, ComponentKind::Root)
    }

    /// Stem cell straight above the origin.
    #[must_use]
    pub const fn stem(dh: i32) -> Self {
        Self::new(0, 0, dh, ComponentKind::Stem)
    }

    /// Leaf cell.
    #[must_use]
    pub const fn leaf(dq: i32, dr: i32, dh: i32) -> Self {
        Self::new(dq, dr, dh, ComponentKind::Leaf)
    }

    /// Fruit cell.
    #[must_use]
    pub const fn fruit(dq: i32, dr: i32, dh: i32) -> Self {
        Self::new(dq, dr, dh, ComponentKind::Fruit)
    }
}

/// Water, nutrient and sunlight levels, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Satisfaction {
    /// Water
    pub water: f32,
    /// Nutrients
    pub nutrients: f32,
    /// Sunlight
    pub sunlight: f32,
}

impl Satisfaction {
    /// Create a satisfaction triple.
    #[must_use]
    pub const fn new(water: f32, nutrients: f32, sunlight: f32) -> Self {
        Self {
            water,
            nutrients,
            sunlight,
        }
    }

    /// Whether every component is at least the matching minimum.
    #[must_use]
    pub fn meets(&self, minimums: &Self) -> bool {
        self.water >= minimums.water
            && self.nutrients >= minimums.nutrients
            && self.sunlight >= minimums.sunlight
    }

    /// Mean of the three components.
    #[must_use]
    pub fn health(&self) -> f32 {
        (self.water + self.nutrients + self.sunlight) / 3.0
    }
}

/// Definition of one growth stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowthStageDef {
    /// Stage name
    pub name: String,
    /// Cells occupied while in this stage
    pub pattern: Vec<PatternCell>,
    /// Growing seconds before the next stage is attempted
    pub duration: f32,
    /// Levels that count as fully satisfied (saturation, nutrient mean, light)
    pub requirements: Satisfaction,
    /// Satisfaction below which the stage does not grow
    pub minimums: Satisfaction,
    /// Water drawn per second at peak transpiration
    pub water_consumption: f32,
    /// Yield cap, if this stage produces
    pub harvest_yield: Option<f32>,
    /// Yield accrued per healthy daytime second
    pub yield_rate: f32,
}

impl GrowthStageDef {
    /// Create a stage with default requirements and minimums.
    #[must_use]
    pub fn new(name: &str, duration: f32) -> Self {
        Self {
            name: name.to_string(),
            pattern: Vec::new(),
            duration,
            requirements: Satisfaction::new(0.35, 0.4, 0.5),
            minimums: Satisfaction::new(0.3, 0.2, 0.3),
            water_consumption: 2.0,
            harvest_yield: None,
            yield_rate: 0.0,
        }
    }

    /// Set the occupation pattern.
    #[must_use]
    pub fn cells(mut self, cells: &[PatternCell]) -> Self {
        self.pattern = cells.to_vec();
        self
    }

    /// Set the levels that count as fully satisfied.
    #[must_use]
    pub fn requirements(mut self, water: f32, nutrients: f32, sunlight: f32) -> Self {
        self.requirements = Satisfaction::new(water, nutrients, sunlight);
        self
    }

    /// Set the minimum satisfaction for growth.
    #[must_use]
    pub fn minimums(mut self, water: f32, nutrients: f32, sunlight: f32) -> Self {
        self.minimums = Satisfaction::new(water, nutrients, sunlight);
        self
    }

    /// Set peak water consumption per second.
    #[must_use]
    pub fn consumption(mut self, water: f32) -> Self {
        self.water_consumption = water;
        self
    }

    /// Make the stage produce up to `cap`, accruing `rate` per second.
    #[must_use]
    pub fn yields(mut self, cap: f32, rate: f32) -> Self {
        self.harvest_yield = Some(cap);
        self.yield_rate = rate;
        self
    }
}

/// A staged plant type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedPlantType {
    /// Type id, also the crop id for nutrients
    pub id: String,
    /// Display name
    pub name: String,
    /// Stages in order; the last one is terminal
    pub stages: Vec<GrowthStageDef>,
    /// Whether harvesting removes the plant
    pub depletes_on_harvest: bool,
    /// Seconds between harvests of a continuous producer
    pub harvest_interval: f32,
}

impl StagedPlantType {
    /// Create a new plant type builder.
    #[must_use]
    pub fn builder(id: &str, name: &str) -> StagedPlantTypeBuilder {
        StagedPlantTypeBuilder::new(id, name)
    }

    /// Stage definition by index.
    #[must_use]
    pub fn stage(&self, index: usize) -> Option<&GrowthStageDef> {
        self.stages.get(index)
    }

    /// Whether a stage has no successor.
    #[must_use]
    pub fn is_terminal(&self, index: usize) -> bool {
        index + 1 >= self.stages.len()
    }
}

/// Builder for staged plant types.
#[derive(Debug)]
pub struct StagedPlantTypeBuilder {
    def: StagedPlantType,
}

impl StagedPlantTypeBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            def: StagedPlantType {
                id: id.to_string(),
                name: name.to_string(),
                stages: Vec::new(),
                depletes_on_harvest: true,
                harvest_interval: 0.0,
            },
        }
    }

    /// Append a stage.
    #[must_use]
    pub fn stage(mut self, stage: GrowthStageDef) -> Self {
        self.def.stages.push(stage);
        self
    }

    /// Keep the plant after harvest, allowing one harvest per `interval` seconds.
    #[must_use]
    pub fn continuous(mut self, interval: f32) -> Self {
        self.def.depletes_on_harvest = false;
        self.def.harvest_interval = interval;
        self
    }

    /// Build the plant type.
    #[must_use]
    pub fn build(self) -> StagedPlantType {
        self.def
    }
}

/// Registry of staged plant types.
#[derive(Debug, Clone, Default)]
pub struct StagedPlantRegistry {
    types: AHashMap<String, StagedPlantType>,
}

impl StagedPlantRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the default crops.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_defaults();
        registry
    }

    /// Register the default crops.
    pub fn register_defaults(&mut self) {
        use PatternCell as C;

        self.register(
            StagedPlantType::builder("tomato", "Tomato")
                .stage(
                    GrowthStageDef::new("seedling", 40.0)
                        .cells(&[C::root(-1), C::stem(0)])
                        .consumption(2.0),
                )
                .stage(
                    GrowthStageDef::new("sprout", 80.0)
                        .cells(&[
                            C::root(-1),
                            C::root(-2),
                            C::stem(0),
                            C::stem(1),
                            C::leaf(1, 0, 1),
                            C::leaf(-1, 0, 2),
                        ])
                        .consumption(5.0),
                )
                .stage(
                    GrowthStageDef::new("flowering", 120.0)
                        .cells(&[
                            C::root(-1),
                            C::root(-2),
                            C::root(-3),
                            C::new(1, 0, -2, ComponentKind::Root),
                            C::stem(0),
                            C::stem(1),
                            C::stem(2),
                            C::stem(3),
                            C::leaf(1, 0, 1),
                            C::leaf(-1, 0, 2),
                            C::leaf(0, 1, 3),
                            C::leaf(1, -1, 3),
                        ])
                        .consumption(8.0),
                )
                .stage(
                    GrowthStageDef::new("fruiting", 0.0)
                        .cells(&[
                            C::root(-1),
                            C::root(-2),
                            C::root(-3),
                            C::new(1, 0, -2, ComponentKind::Root),
                            C::stem(0),
                            C::stem(1),
                            C::stem(2),
                            C::stem(3),
                            C::leaf(1, 0, 1),
                            C::leaf(-1, 0, 2),
                            C::leaf(0, 1, 3),
                            C::leaf(1, -1, 3),
                            C::fruit(-1, 1, 1),
                            C::fruit(0, -1, 2),
                        ])
                        .consumption(10.0)
                        .yields(6.0, 0.02),
                )
                .build(),
        );

        self.register(
            StagedPlantType::builder("wheat", "Wheat")
                .stage(
                    GrowthStageDef::new("seedling", 30.0)
                        .cells(&[C::root(-1), C::stem(0)])
                        .requirements(0.3, 0.35, 0.6),
                )
                .stage(
                    GrowthStageDef::new("tillering", 60.0)
                        .cells(&[C::root(-1), C::root(-2), C::stem(0), C::stem(1), C::leaf(0, 0, 2)])
                        .requirements(0.3, 0.35, 0.6)
                        .consumption(3.0),
                )
                .stage(
                    GrowthStageDef::new("ripe", 0.0)
                        .cells(&[
                            C::root(-1),
                            C::root(-2),
                            C::root(-3),
                            C::stem(0),
                            C::stem(1),
                            C::stem(2),
                            C::fruit(0, 0, 3),
                        ])
                        .requirements(0.3, 0.35, 0.6)
                        .consumption(3.0)
                        .yields(3.0, 0.03),
                )
                .build(),
        );

        self.register(
            StagedPlantType::builder("bean", "Bean")
                .stage(
                    GrowthStageDef::new("seedling", 30.0)
                        .cells(&[C::root(-1), C::stem(0)])
                        .requirements(0.4, 0.3, 0.5),
                )
                .stage(
                    GrowthStageDef::new("climbing", 60.0)
                        .cells(&[
                            C::root(-1),
                            C::root(-2),
                            C::stem(0),
                            C::stem(1),
                            C::stem(2),
                            C::leaf(1, 0, 1),
                            C::leaf(-1, 0, 2),
                        ])
                        .requirements(0.4, 0.3, 0.5)
                        .consumption(4.0),
                )
                .stage(
                    GrowthStageDef::new("podding", 0.0)
                        .cells(&[
                            C::root(-1),
                            C::root(-2),
                            C::stem(0),
                            C::stem(1),
                            C::stem(2),
                            C::leaf(1, 0, 1),
                            C::leaf(-1, 0, 2),
                            C::fruit(0, 1, 2),
                        ])
                        .requirements(0.4, 0.3, 0.5)
                        .consumption(5.0)
                        .yields(4.0, 0.02),
                )
                .build(),
        );

        self.register(
            StagedPlantType::builder("lettuce", "Lettuce")
                .stage(
                    GrowthStageDef::new("seedling", 25.0)
                        .cells(&[C::root(-1), C::leaf(0, 0, 0)])
                        .requirements(0.45, 0.3, 0.3),
                )
                .stage(
                    GrowthStageDef::new("head", 0.0)
                        .cells(&[
                            C::root(-1),
                            C::root(-2),
                            C::leaf(0, 0, 0),
                            C::leaf(1, 0, 0),
                            C::leaf(-1, 0, 0),
                            C::leaf(0, 1, 0),
                            C::leaf(0, -1, 0),
                        ])
                        .requirements(0.45, 0.3, 0.3)
                        .consumption(3.0)
                        .yields(1.0, 0.01),
                )
                .build(),
        );

        self.register(
            StagedPlantType::builder("strawberry", "Strawberry")
                .stage(
                    GrowthStageDef::new("seedling", 40.0)
                        .cells(&[C::root(-1), C::leaf(0, 0, 0)])
                        .requirements(0.4, 0.35, 0.4),
                )
                .stage(
                    GrowthStageDef::new("runner", 90.0)
                        .cells(&[C::root(-1), C::root(-2), C::leaf(0, 0, 0), C::leaf(1, 0, 0), C::leaf(-1, 1, 0)])
                        .requirements(0.4, 0.35, 0.4)
                        .consumption(3.0),
                )
                .stage(
                    GrowthStageDef::new("fruiting", 0.0)
                        .cells(&[
                            C::root(-1),
                            C::root(-2),
                            C::leaf(0, 0, 0),
                            C::leaf(1, 0, 0),
                            C::leaf(-1, 1, 0),
                            C::fruit(0, 1, 0),
                            C::fruit(1, -1, 0),
                        ])
                        .requirements(0.4, 0.35, 0.4)
                        .consumption(4.0)
                        .yields(5.0, 0.03),
                )
                .continuous(120.0)
                .build(),
        );
    }

    /// Register a plant type, replacing any with the same id.
    pub fn register(&mut self, plant_type: StagedPlantType) {
        self.types.insert(plant_type.id.clone(), plant_type);
    }

    /// Look up a plant type.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&StagedPlantType> {
        self.types.get(id)
    }

    /// Whether a type is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.types.contains_key(id)
    }

    /// Registered type ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<_> = self.types.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

/// A planted staged crop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedPlant {
    /// Plant id
    pub id: PlantId,
    /// Plant type id
    pub type_id: String,
    /// Sub-hex just above the soil surface the plant grows from
    pub origin: SubHexCoord3D,
    /// Soil hex under the origin
    pub soil_hex: HexCoord3D,
    /// Current stage index
    pub stage: usize,
    /// Growing seconds spent in the current stage
    pub stage_timer: f32,
    /// Seconds until the next transition attempt is allowed
    pub attempt_cooldown: f32,
    /// Latest satisfaction
    pub satisfaction: Satisfaction,
    /// Whether the last transition was blocked
    pub stunted: bool,
    /// Plants holding the contested space
    pub blockers: Vec<PlantId>,
    /// Seconds spent stunted
    pub stunt_timer: f32,
    /// Consumption scale (reduced while stunted)
    pub consumption_multiplier: f32,
    /// Yield accrued in the current stage
    pub accumulated_yield: f32,
    /// Rotation multiplier captured at planting
    pub rotation_multiplier: f32,
    /// Whether the planting was recorded in the soil's crop history
    pub rotation_recorded: bool,
    /// Simulation time of the last harvest
    pub last_harvest: Option<f64>,
    /// Jittered patterns, cached per stage
    pub custom_patterns: BTreeMap<usize, Vec<PatternCell>>,
    /// Cells currently claimed
    pub cells: Vec<(SubHexCoord3D, ComponentKind)>,
}

impl StagedPlant {
    fn new(id: PlantId, type_id: &str, origin: SubHexCoord3D, soil_hex: HexCoord3D) -> Self {
        Self {
            id,
            type_id: type_id.to_string(),
            origin,
            soil_hex,
            stage: 0,
            stage_timer: 0.0,
            attempt_cooldown: 0.0,
            satisfaction: Satisfaction::default(),
            stunted: false,
            blockers: Vec::new(),
            stunt_timer: 0.0,
            consumption_multiplier: 1.0,
            accumulated_yield: 0.0,
            rotation_multiplier: 1.0,
            rotation_recorded: false,
            last_harvest: None,
            custom_patterns: BTreeMap::new(),
            cells: Vec::new(),
        }
    }

    /// Mean satisfaction.
    #[must_use]
    pub fn health(&self) -> f32 {
        self.satisfaction.health()
    }

    /// Claimed cells of one kind.
    pub fn cells_of_kind(&self, kind: ComponentKind) -> impl Iterator<Item = SubHexCoord3D> + '_ {
        self.cells.iter().filter(move |(_, k)| *k == kind).map(|(c, _)| *c)
    }

    /// Whether the current stage's yield is capped.
    fn yield_capped(&self, stage: &GrowthStageDef) -> bool {
        stage.harvest_yield.is_some_and(|cap| self.accumulated_yield >= cap)
    }
}

/// Serialized state of an uprooted plant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UprootedPlant {
    /// Snapshot schema version
    pub version: SchemaVersion,
    /// Plant type id
    pub type_id: String,
    /// Stage at uprooting
    pub stage: usize,
    /// Growing seconds in that stage
    pub stage_timer: f32,
    /// Accrued yield
    pub accumulated_yield: f32,
    /// Rotation multiplier from the original planting
    pub rotation_multiplier: f32,
    /// Whether the original planting reached the crop history
    pub rotation_recorded: bool,
    /// Time of the last harvest
    pub last_harvest: Option<f64>,
    /// Jittered patterns per stage
    pub custom_patterns: BTreeMap<usize, Vec<PatternCell>>,
}

impl UprootedPlant {
    /// Encode as JSON.
    pub fn to_json(&self) -> HexGardenResult<String> {
        serde_json::to_string(self).map_err(|e| HexGardenError::Serialization(e.to_string()))
    }

    /// Decode from JSON, rejecting snapshots from a newer schema.
    pub fn from_json(json: &str) -> HexGardenResult<Self> {
        let plant: Self =
            serde_json::from_str(json).map_err(|e| HexGardenError::Serialization(e.to_string()))?;
        if !SchemaVersion::PLANT_SNAPSHOT.can_read(&plant.version) {
            warn!(
                "Rejected uprooted {} snapshot with version {}",
                plant.type_id, plant.version
            );
            return Err(HexGardenError::VersionMismatch {
                expected: SchemaVersion::PLANT_SNAPSHOT.to_string(),
                actual: plant.version.to_string(),
            });
        }
        Ok(plant)
    }
}

/// Offsets a pattern onto the grid, dropping cells that contradict the soil:
/// roots must be in soil, everything else must be out of it.
fn resolve_pattern(
    ctx: &GrowthContext<'_>,
    origin: SubHexCoord3D,
    pattern: &[PatternCell],
) -> Vec<(SubHexCoord3D, ComponentKind)> {
    let metrics = ctx.metrics();
    let mut cells: Vec<(SubHexCoord3D, ComponentKind)> = Vec::with_capacity(pattern.len());
    for cell in pattern {
        let coord = metrics.offset_sub_hex3d(origin, cell.dq, cell.dr, cell.dh);
        let wants_soil = cell.kind == ComponentKind::Root;
        if ctx.in_soil(coord) != wants_soil {
            continue;
        }
        if cells.iter().all(|(c, _)| *c != coord) {
            cells.push((coord, cell.kind));
        }
    }
    cells
}

/// Randomly nudges leaves and fruit, keeping a cell in place when the nudge
/// would land in soil or on another cell of the pattern.
fn jitter_pattern(
    ctx: &GrowthContext<'_>,
    origin: SubHexCoord3D,
    pattern: &[PatternCell],
    radius: i32,
    rng: &mut fastrand::Rng,
) -> Vec<PatternCell> {
    let metrics = ctx.metrics();
    let mut out: Vec<PatternCell> = pattern.to_vec();
    if radius == 0 {
        return out;
    }
    for i in 0..out.len() {
        let cell = out[i];
        if !matches!(cell.kind, ComponentKind::Leaf | ComponentKind::Fruit) {
            continue;
        }
        let moved = PatternCell {
            dq: cell.dq + rng.i32(-radius..=radius),
            dr: cell.dr + rng.i32(-radius..=radius),
            ..cell
        };
        let collides = out
            .iter()
            .any(|c| c.dq == moved.dq && c.dr == moved.dr && c.dh == moved.dh);
        let coord = metrics.offset_sub_hex3d(origin, moved.dq, moved.dr, moved.dh);
        if !collides && !ctx.in_soil(coord) {
            out[i] = moved;
        }
    }
    out
}

/// Staged crop simulation.
#[derive(Debug)]
pub struct StagedPlantSimulation {
    config: StagedConfig,
    registry: StagedPlantRegistry,
    plants: BTreeMap<PlantId, StagedPlant>,
    rng: fastrand::Rng,
    events: Sender<SimEvent>,
}

impl StagedPlantSimulation {
    /// Create a simulation with the given plant types.
    #[must_use]
    pub fn new(config: StagedConfig, registry: StagedPlantRegistry, seed: u64, events: Sender<SimEvent>) -> Self {
        Self {
            config,
            registry,
            plants: BTreeMap::new(),
            rng: fastrand::Rng::with_seed(seed),
            events,
        }
    }

    /// Registered plant types.
    #[must_use]
    pub fn registry(&self) -> &StagedPlantRegistry {
        &self.registry
    }

    /// Look up a plant.
    #[must_use]
    pub fn plant(&self, id: PlantId) -> Option<&StagedPlant> {
        self.plants.get(&id)
    }

    /// All plants in id order.
    pub fn plants(&self) -> impl Iterator<Item = &StagedPlant> {
        self.plants.values()
    }

    /// Number of plants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plants.len()
    }

    /// Whether there are no plants.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plants.is_empty()
    }

    /// Soil hex a plant at `origin` would grow from, if there is soil under it.
    fn soil_under(ctx: &GrowthContext<'_>, origin: SubHexCoord3D) -> Option<HexCoord3D> {
        let below = origin.shifted(-1);
        if ctx.in_soil(origin) || !ctx.in_soil(below) {
            return None;
        }
        Some(ctx.metrics().parent_hex3d(below))
    }

    /// Plants a seed at `origin`, the sub-hex just above the soil surface.
    ///
    /// Fails for unknown types, missing soil, depleted nutrients or occupied space.
    pub fn plant_seed(&mut self, type_id: &str, origin: SubHexCoord3D, ctx: &mut GrowthContext<'_>) -> Option<PlantId> {
        let plant_type = self.registry.get(type_id)?;
        let origin = ctx.metrics().normalize_sub_hex3d(origin);
        let soil_hex = Self::soil_under(ctx, origin)?;
        if !ctx.nutrients.has_enough_nutrients(soil_hex, type_id) {
            debug!("Not enough nutrients at {} for {}", soil_hex, type_id);
            return None;
        }
        let first = plant_type.stage(0)?;
        let cells = resolve_pattern(ctx, origin, &first.pattern);

        let id = PlantId::new();
        if ctx.occupancy.try_claim_all(&cells, id).is_err() {
            debug!("Seed space at {} is occupied", origin);
            return None;
        }

        let mut plant = StagedPlant::new(id, type_id, origin, soil_hex);
        plant.rotation_multiplier = ctx.nutrients.rotation_multiplier(soil_hex, type_id);
        plant.cells = cells;
        debug!("Planted {} {} at {}", type_id, id, origin);
        publish(
            &self.events,
            SimEvent::PlantSeeded {
                plant_id: id,
                type_id: type_id.to_string(),
            },
        );
        self.plants.insert(id, plant);
        Some(id)
    }

    /// Advances every plant by `dt` seconds.
    pub fn tick(&mut self, dt: f32, ctx: &mut GrowthContext<'_>) {
        if dt <= 0.0 {
            return;
        }
        let daytime = ctx.clock.is_daytime();
        let transpiration = ctx.clock.transpiration_factor();
        let mut ledger = UptakeLedger::new();

        let Self {
            config,
            registry,
            plants,
            rng,
            events,
        } = self;

        for plant in plants.values_mut() {
            let Some(plant_type) = registry.get(&plant.type_id) else {
                continue;
            };
            let Some(stage) = plant_type.stage(plant.stage) else {
                continue;
            };

            plant.satisfaction = compute_satisfaction(plant, stage, ctx, config);
            let stomata_open = plant.satisfaction.water > config.stomata_threshold;
            let growable = daytime && stomata_open && plant.satisfaction.meets(&stage.minimums);

            if plant.stunted {
                plant.stunt_timer += dt;
                if plant.stunt_timer >= config.stunt_retry_interval {
                    trace!("{} retrying after stunting", plant.id);
                    plant.stunted = false;
                    plant.blockers.clear();
                    plant.stunt_timer = 0.0;
                    plant.consumption_multiplier = 1.0;
                    plant.attempt_cooldown = 0.0;
                }
            }

            if let Some(cap) = stage.harvest_yield {
                if growable && plant.accumulated_yield < cap {
                    let gained = stage.yield_rate * plant.rotation_multiplier * dt;
                    plant.accumulated_yield = (plant.accumulated_yield + gained).min(cap);
                }
            }

            if stomata_open && !plant.yield_capped(stage) {
                let demand = stage.water_consumption * transpiration * plant.consumption_multiplier * dt;
                request_root_water(&mut ledger, plant, ctx, demand);
            }

            if growable && !plant.stunted && !plant_type.is_terminal(plant.stage) {
                plant.stage_timer += dt;
                if plant.stage_timer >= stage.duration {
                    plant.attempt_cooldown -= dt;
                    if plant.attempt_cooldown <= 0.0 {
                        plant.attempt_cooldown = config.attempt_interval;
                        try_advance(plant, plant_type, ctx, config, rng, events);
                    }
                }
            }
        }

        let grants = ledger.settle(ctx.water);
        for (id, hexes) in grants {
            let Some(plant) = plants.get(&id) else {
                continue;
            };
            for (hex, volume) in hexes {
                ctx.nutrients
                    .deplete_continuous(hex, &plant.type_id, volume * config.nutrient_per_water);
            }
        }
    }

    /// Harvests a plant and returns the yield.
    ///
    /// Returns 0 when the plant is unknown, its stage does not produce, or a
    /// continuous producer was harvested less than an interval ago.
    pub fn harvest_plant(&mut self, id: PlantId, occupancy: &mut OccupancyIndex, now: f64) -> u32 {
        let Some(plant) = self.plants.get_mut(&id) else {
            return 0;
        };
        let Some(plant_type) = self.registry.get(&plant.type_id) else {
            return 0;
        };
        let Some(stage) = plant_type.stage(plant.stage) else {
            return 0;
        };
        let Some(cap) = stage.harvest_yield else {
            return 0;
        };
        if !plant_type.depletes_on_harvest {
            if let Some(last) = plant.last_harvest {
                if now - last < f64::from(plant_type.harvest_interval) {
                    return 0;
                }
            }
        }

        let amount = if stage.yield_rate > 0.0 {
            plant.accumulated_yield.floor()
        } else {
            (cap * plant.health()).floor()
        }
        .max(0.0) as u32;

        publish(&self.events, SimEvent::PlantHarvested { plant_id: id, amount });
        if plant_type.depletes_on_harvest {
            debug!("Harvested {} ({}) for {}, removing", id, plant.type_id, amount);
            self.remove_plant(id, occupancy);
        } else {
            debug!("Harvested {} ({}) for {}", id, plant.type_id, amount);
            plant.accumulated_yield = 0.0;
            plant.last_harvest = Some(now);
        }
        amount
    }

    /// Removes a plant and frees its cells.
    pub fn remove_plant(&mut self, id: PlantId, occupancy: &mut OccupancyIndex) -> bool {
        if self.plants.remove(&id).is_none() {
            return false;
        }
        occupancy.release_plant(id);
        publish(&self.events, SimEvent::PlantRemoved { plant_id: id });
        true
    }

    /// Removes every plant growing from or rooted in `hex`.
    pub fn remove_plants_in(&mut self, hex: HexCoord3D, ctx: &mut GrowthContext<'_>) -> Vec<PlantId> {
        let metrics = ctx.metrics();
        let doomed: Vec<PlantId> = self
            .plants
            .values()
            .filter(|p| {
                p.soil_hex == hex
                    || p.cells_of_kind(ComponentKind::Root)
                        .any(|c| metrics.parent_hex3d(c) == hex)
            })
            .map(|p| p.id)
            .collect();
        for id in &doomed {
            self.remove_plant(*id, ctx.occupancy);
        }
        doomed
    }

    /// Pulls a plant out of the world, returning its state for replanting.
    pub fn uproot_plant(&mut self, id: PlantId, occupancy: &mut OccupancyIndex) -> Option<UprootedPlant> {
        let plant = self.plants.get(&id)?;
        let snapshot = UprootedPlant {
            version: SchemaVersion::PLANT_SNAPSHOT,
            type_id: plant.type_id.clone(),
            stage: plant.stage,
            stage_timer: plant.stage_timer,
            accumulated_yield: plant.accumulated_yield,
            rotation_multiplier: plant.rotation_multiplier,
            rotation_recorded: plant.rotation_recorded,
            last_harvest: plant.last_harvest,
            custom_patterns: plant.custom_patterns.clone(),
        };
        debug!("Uprooted {} at stage {}", id, snapshot.stage);
        self.remove_plant(id, occupancy);
        Some(snapshot)
    }

    /// Replants an uprooted plant at a new origin under a fresh id.
    pub fn replant_plant(
        &mut self,
        snapshot: &UprootedPlant,
        origin: SubHexCoord3D,
        ctx: &mut GrowthContext<'_>,
    ) -> Option<PlantId> {
        if !SchemaVersion::PLANT_SNAPSHOT.can_read(&snapshot.version) {
            warn!("Cannot replant {} snapshot {}", snapshot.type_id, snapshot.version);
            return None;
        }
        let plant_type = self.registry.get(&snapshot.type_id)?;
        let stage = plant_type.stage(snapshot.stage)?;
        let origin = ctx.metrics().normalize_sub_hex3d(origin);
        let soil_hex = Self::soil_under(ctx, origin)?;
        let pattern = snapshot
            .custom_patterns
            .get(&snapshot.stage)
            .unwrap_or(&stage.pattern);
        let cells = resolve_pattern(ctx, origin, pattern);

        let id = PlantId::new();
        if ctx.occupancy.try_claim_all(&cells, id).is_err() {
            return None;
        }
        let mut plant = StagedPlant::new(id, &snapshot.type_id, origin, soil_hex);
        plant.stage = snapshot.stage;
        plant.stage_timer = snapshot.stage_timer;
        plant.accumulated_yield = snapshot.accumulated_yield.min(stage.harvest_yield.unwrap_or(0.0));
        plant.rotation_multiplier = snapshot.rotation_multiplier;
        plant.rotation_recorded = snapshot.rotation_recorded;
        plant.last_harvest = snapshot.last_harvest;
        plant.custom_patterns = snapshot.custom_patterns.clone();
        plant.cells = cells;
        debug!("Replanted {} as {} at {}", snapshot.type_id, id, origin);
        publish(
            &self.events,
            SimEvent::PlantSeeded {
                plant_id: id,
                type_id: snapshot.type_id.clone(),
            },
        );
        self.plants.insert(id, plant);
        Some(id)
    }

    /// Plant owning a sub-hex, if it is staged.
    #[must_use]
    pub fn plant_at(&self, cell: SubHexCoord3D, occupancy: &OccupancyIndex) -> Option<&StagedPlant> {
        occupancy.owner(cell).and_then(|o| self.plants.get(&o.plant))
    }
}

fn compute_satisfaction(
    plant: &StagedPlant,
    stage: &GrowthStageDef,
    ctx: &GrowthContext<'_>,
    config: &StagedConfig,
) -> Satisfaction {
    let metrics = ctx.metrics();
    let ratio = |value: f32, required: f32| {
        if required <= 0.0 {
            1.0
        } else {
            (value / required).clamp(0.0, 1.0)
        }
    };

    let roots: Vec<SubHexCoord3D> = plant.cells_of_kind(ComponentKind::Root).collect();
    let water = if roots.is_empty() {
        ctx.water.saturation(plant.soil_hex).min(1.0)
    } else {
        let total: f32 = roots
            .iter()
            .map(|cell| {
                let depth = (plant.origin.h - cell.h).max(1);
                let bonus = 1.0 + config.depth_bonus * (depth - 1) as f32;
                ctx.water.saturation(metrics.parent_hex3d(*cell)).min(1.0) * bonus
            })
            .sum();
        total / roots.len() as f32
    };

    let mut lit: Vec<SubHexCoord3D> = plant.cells_of_kind(ComponentKind::Leaf).collect();
    if lit.is_empty() {
        lit = plant.cells_of_kind(ComponentKind::Stem).collect();
    }
    if lit.is_empty() {
        lit.push(plant.origin);
    }
    let sunlight = lit
        .iter()
        .map(|cell| ctx.light_at(*cell, config.occlusion_factor, config.light_scan_layers))
        .sum::<f32>()
        / lit.len() as f32;

    let fixer = CropNeeds::lookup(&plant.type_id).is_some_and(|n| n.fixes_nitrogen());
    let nutrients = ctx
        .nutrients
        .nutrients(plant.soil_hex)
        .map_or(0.0, |levels| levels.average(fixer));

    Satisfaction::new(
        ratio(water, stage.requirements.water),
        ratio(nutrients, stage.requirements.nutrients),
        ratio(sunlight, stage.requirements.sunlight),
    )
}

/// Splits a plant's demand over the hexes its roots reach, by root count.
fn request_root_water(ledger: &mut UptakeLedger, plant: &StagedPlant, ctx: &GrowthContext<'_>, demand: f32) {
    if demand <= 0.0 {
        return;
    }
    let metrics = ctx.metrics();
    let mut per_hex: BTreeMap<HexCoord3D, u32> = BTreeMap::new();
    for cell in plant.cells_of_kind(ComponentKind::Root) {
        *per_hex.entry(metrics.parent_hex3d(cell)).or_insert(0) += 1;
    }
    if per_hex.is_empty() {
        per_hex.insert(plant.soil_hex, 1);
    }
    let total: u32 = per_hex.values().sum();
    for (hex, count) in per_hex {
        ledger.request(hex, plant.id, demand * count as f32 / total as f32);
    }
}

fn try_advance(
    plant: &mut StagedPlant,
    plant_type: &StagedPlantType,
    ctx: &mut GrowthContext<'_>,
    config: &StagedConfig,
    rng: &mut fastrand::Rng,
    events: &Sender<SimEvent>,
) {
    let next = plant.stage + 1;
    let Some(next_stage) = plant_type.stage(next) else {
        return;
    };
    let pattern = match plant.custom_patterns.get(&next) {
        Some(cached) => cached.clone(),
        None => {
            let jittered = jitter_pattern(ctx, plant.origin, &next_stage.pattern, config.jitter_radius, rng);
            plant.custom_patterns.insert(next, jittered.clone());
            jittered
        },
    };
    let cells = resolve_pattern(ctx, plant.origin, &pattern);

    match ctx.occupancy.try_claim_all(&cells, plant.id) {
        Ok(()) => {
            for (old, _) in &plant.cells {
                if cells.iter().all(|(c, _)| c != old) {
                    ctx.occupancy.release(*old);
                }
            }
            plant.cells = cells;
            plant.stage = next;
            plant.stage_timer = 0.0;
            plant.attempt_cooldown = 0.0;
            plant.accumulated_yield = 0.0;
            ctx.nutrients.deplete_nutrients(plant.soil_hex, &plant.type_id, next);
            if !plant.rotation_recorded {
                ctx.nutrients.record_crop_planting(plant.soil_hex, &plant.type_id);
                plant.rotation_recorded = true;
            }
            debug!("{} ({}) advanced to {}", plant.id, plant.type_id, next_stage.name);
            publish(
                events,
                SimEvent::StageAdvanced {
                    plant_id: plant.id,
                    stage: next,
                },
            );
        },
        Err(blockers) => {
            debug!("{} ({}) stunted by {:?}", plant.id, plant.type_id, blockers);
            plant.stunted = true;
            plant.stunt_timer = 0.0;
            plant.consumption_multiplier = config.stunted_multiplier;
            plant.blockers.clone_from(&blockers);
            publish(
                events,
                SimEvent::PlantStunted {
                    plant_id: plant.id,
                    blockers,
                },
            );
        },
    }
}
