//! Organic (meristem) plant growth.
//!
//! Plants grow one component at a time from growth points. Each point
//! accumulates potential while its conditions hold and, on reaching the
//! type's threshold, tries to place a new root, stem or leaf next to itself.
//!
//! ## Resource flow
//!
//! - Roots pull soil water into a bounded reservoir, with diminishing
//!   returns for several roots in one hex.
//! - Transpiration draws straight from the soil; whatever the soil cannot
//!   supply comes out of the reservoir.
//! - Leaves photosynthesize energy in daylight; a small trickle keeps a
//!   starving plant from dying outright.
//!
//! ## Apical dominance
//!
//! The highest shoot point grows at full strength. Shoot points within the
//! dominance radius below it are suppressed in proportion to how close they
//! are; lateral points resist at half strength.

use std::collections::BTreeMap;

use ahash::AHashMap;
use crossbeam_channel::Sender;
use glam::Vec2;
use hexgarden_common::{
    ComponentId, GrowthPointId, HexCoord3D, HexMetrics, PlantId, SubHexCoord3D, AXIAL_DIRECTIONS,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::OrganicConfig;
use crate::context::{GrowthContext, UptakeLedger};
use crate::events::{publish, SimEvent};
use crate::occupancy::{ComponentKind, OccupancyIndex, Occupant};

/// Kind of growth point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrowthPointKind {
    /// Extends the root system
    Root,
    /// Main shoot tip
    Shoot,
    /// Side bud; favors leaves
    Lateral,
}

/// An active meristem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthPoint {
    /// Point id
    pub id: GrowthPointId,
    /// Position (that of its host component)
    pub position: SubHexCoord3D,
    /// Kind
    pub kind: GrowthPointKind,
    /// Accumulated growth potential
    pub potential: f32,
    /// Seconds since creation
    pub age: f32,
    /// Dominance before apical suppression
    pub base_dominance: f32,
    /// Current dominance in `[0, 1]`
    pub dominance: f32,
    /// Host component
    pub component: ComponentId,
    /// Kind of the last component this point produced
    pub last_spawn: Option<ComponentKind>,
}

impl GrowthPoint {
    fn new(kind: GrowthPointKind, position: SubHexCoord3D, component: ComponentId, dominance: f32) -> Self {
        Self {
            id: GrowthPointId::new(),
            position,
            kind,
            potential: 0.0,
            age: 0.0,
            base_dominance: dominance,
            dominance,
            component,
            last_spawn: None,
        }
    }

    /// Whether this point grows above ground.
    #[must_use]
    pub fn is_shoot(&self) -> bool {
        matches!(self.kind, GrowthPointKind::Shoot | GrowthPointKind::Lateral)
    }
}

/// One root, stem or leaf cell of an organic plant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantComponent {
    /// Component id
    pub id: ComponentId,
    /// Root, stem or leaf
    pub kind: ComponentKind,
    /// Occupied sub-hex
    pub position: SubHexCoord3D,
    /// Seconds since growth
    pub age: f32,
    /// Health in `[0, 1]`
    pub health: f32,
    /// Size in `[0, 1]`
    pub size: f32,
    /// Growth points hosted here
    pub growth_points: Vec<GrowthPointId>,
}

impl PlantComponent {
    fn new(id: ComponentId, kind: ComponentKind, position: SubHexCoord3D) -> Self {
        Self {
            id,
            kind,
            position,
            age: 0.0,
            health: 1.0,
            size: 0.1,
            growth_points: Vec::new(),
        }
    }
}

/// Internal resource pools.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlantResources {
    /// Water in the reservoir
    pub water: f32,
    /// Nutrient level in `[0, 1]`
    pub nutrients: f32,
    /// Stored energy
    pub energy: f32,
}

/// A component placed when the seed goes in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeedPart {
    /// Component kind
    pub kind: ComponentKind,
    /// Sub-hex column offset from the origin
    pub dq: i32,
    /// Sub-hex row offset from the origin
    pub dr: i32,
    /// Sub-layer offset from the origin
    pub dh: i32,
}

impl SeedPart {
    /// Create a seed part.
    #[must_use]
    pub const fn new(kind: ComponentKind, dq: i32, dr: i32, dh: i32) -> Self {
        Self { kind, dq, dr, dh }
    }
}

/// An organic plant type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganicPlantType {
    /// Type id, also the crop id for nutrients
    pub id: String,
    /// Display name
    pub name: String,
    /// Components placed at planting
    pub seed: Vec<SeedPart>,
    /// Potential gained per second under ideal conditions
    pub base_growth_rate: f32,
    /// Potential needed to attempt growth
    pub growth_threshold: f32,
    /// Water drawn per second per √root at full saturation
    pub root_uptake_rate: f32,
    /// Water transpired per component per second at peak
    pub transpiration_rate: f32,
    /// Energy per second per fully lit, full-size, healthy leaf
    pub photosynthesis_rate: f32,
    /// Reservoir size
    pub max_water: f32,
    /// Energy cap
    pub max_energy: f32,
    /// Reservoir at planting
    pub initial_water: f32,
    /// Energy at planting
    pub initial_energy: f32,
    /// Most roots the plant may have
    pub max_roots: usize,
    /// Most leaves the plant may have
    pub max_leaves: usize,
    /// Most stems the plant may have
    pub max_stems: usize,
    /// Highest sub-layer above the origin a shoot may reach
    pub max_height: i32,
    /// Height at which new stems start carrying lateral buds
    pub branch_height: i32,
    /// Sub-layers between branching stems above `branch_height`
    pub branch_spacing: i32,
    /// Base chance that a shoot grows a leaf rather than a stem
    pub leaf_bias: f32,
    /// Strength of apical suppression in `[0, 1]`
    pub apical_strength: f32,
    /// Health gained per second when well supplied
    pub health_recovery: f32,
    /// Health lost per second in drought
    pub drought_damage: f32,
    /// Health lost per second by a leaf in deep shade
    pub shade_damage: f32,
    /// Health lost per second to age
    pub aging_rate: f32,
    /// Size gained per second while healthy
    pub size_growth: f32,
}

impl OrganicPlantType {
    /// Create a new plant type builder.
    #[must_use]
    pub fn builder(id: &str, name: &str) -> OrganicPlantTypeBuilder {
        OrganicPlantTypeBuilder::new(id, name)
    }

    fn limit(&self, kind: ComponentKind) -> usize {
        match kind {
            ComponentKind::Root => self.max_roots,
            ComponentKind::Leaf => self.max_leaves,
            ComponentKind::Stem => self.max_stems,
            ComponentKind::Fruit => 0,
        }
    }

    /// Whether a new stem at `height` carries lateral buds.
    #[must_use]
    pub fn branches_at(&self, height: i32) -> bool {
        height >= self.branch_height
            && self.branch_spacing > 0
            && (height - self.branch_height) % self.branch_spacing == 0
    }
}

/// Builder for organic plant types.
#[derive(Debug)]
pub struct OrganicPlantTypeBuilder {
    def: OrganicPlantType,
}

impl OrganicPlantTypeBuilder {
    /// Create a new builder with one root and one stem as the seed.
    #[must_use]
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            def: OrganicPlantType {
                id: id.to_string(),
                name: name.to_string(),
                seed: vec![
                    SeedPart::new(ComponentKind::Root, 0, 0, -1),
                    SeedPart::new(ComponentKind::Stem, 0, 0, 0),
                ],
                base_growth_rate: 0.08,
                growth_threshold: 1.0,
                root_uptake_rate: 3.0,
                transpiration_rate: 0.05,
                photosynthesis_rate: 0.05,
                max_water: 200.0,
                max_energy: 5.0,
                initial_water: 100.0,
                initial_energy: 1.0,
                max_roots: 16,
                max_leaves: 20,
                max_stems: 20,
                max_height: 24,
                branch_height: 6,
                branch_spacing: 4,
                leaf_bias: 0.5,
                apical_strength: 0.6,
                health_recovery: 0.01,
                drought_damage: 0.02,
                shade_damage: 0.01,
                aging_rate: 0.0002,
                size_growth: 0.01,
            },
        }
    }

    /// Set the seed components.
    #[must_use]
    pub fn seed(mut self, parts: &[SeedPart]) -> Self {
        self.def.seed = parts.to_vec();
        self
    }

    /// Set growth rate and threshold.
    #[must_use]
    pub fn growth(mut self, rate: f32, threshold: f32) -> Self {
        self.def.base_growth_rate = rate;
        self.def.growth_threshold = threshold;
        self
    }

    /// Set water handling.
    #[must_use]
    pub fn water(mut self, uptake: f32, transpiration: f32, capacity: f32) -> Self {
        self.def.root_uptake_rate = uptake;
        self.def.transpiration_rate = transpiration;
        self.def.max_water = capacity;
        self.def.initial_water = capacity * 0.5;
        self
    }

    /// Set energy handling.
    #[must_use]
    pub fn energy(mut self, photosynthesis: f32, capacity: f32, initial: f32) -> Self {
        self.def.photosynthesis_rate = photosynthesis;
        self.def.max_energy = capacity;
        self.def.initial_energy = initial;
        self
    }

    /// Set growth limits.
    #[must_use]
    pub fn limits(mut self, roots: usize, leaves: usize, stems: usize, height: i32) -> Self {
        self.def.max_roots = roots;
        self.def.max_leaves = leaves;
        self.def.max_stems = stems;
        self.def.max_height = height;
        self
    }

    /// Set where stems start branching and how often.
    #[must_use]
    pub fn branching(mut self, height: i32, spacing: i32) -> Self {
        self.def.branch_height = height;
        self.def.branch_spacing = spacing;
        self
    }

    /// Set leaf bias and apical strength.
    #[must_use]
    pub fn habit(mut self, leaf_bias: f32, apical_strength: f32) -> Self {
        self.def.leaf_bias = leaf_bias.clamp(0.0, 1.0);
        self.def.apical_strength = apical_strength.clamp(0.0, 1.0);
        self
    }

    /// Build the plant type.
    #[must_use]
    pub fn build(self) -> OrganicPlantType {
        self.def
    }
}

/// Registry of organic plant types.
#[derive(Debug, Clone, Default)]
pub struct OrganicPlantRegistry {
    types: AHashMap<String, OrganicPlantType>,
}

impl OrganicPlantRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the default types.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_defaults();
        registry
    }

    /// Register the default types.
    pub fn register_defaults(&mut self) {
        // Sapling - upright, slow, branches higher up
        self.register(
            OrganicPlantType::builder("sapling", "Sapling")
                .growth(0.08, 1.0)
                .water(3.0, 0.05, 200.0)
                .energy(0.05, 5.0, 1.0)
                .limits(24, 30, 30, 40)
                .branching(6, 4)
                .habit(0.45, 0.7)
                .build(),
        );

        // Fern - low and leafy
        self.register(
            OrganicPlantType::builder("fern", "Fern")
                .growth(0.12, 1.0)
                .water(2.0, 0.04, 120.0)
                .energy(0.06, 3.0, 0.8)
                .limits(10, 24, 8, 6)
                .branching(2, 2)
                .habit(0.75, 0.3)
                .build(),
        );

        // Vine - tall and thin, strongly apical
        self.register(
            OrganicPlantType::builder("vine", "Vine")
                .growth(0.15, 1.0)
                .water(2.5, 0.03, 150.0)
                .energy(0.04, 4.0, 1.0)
                .limits(12, 20, 50, 60)
                .branching(10, 6)
                .habit(0.35, 0.9)
                .build(),
        );
    }

    /// Register a plant type, replacing any with the same id.
    pub fn register(&mut self, plant_type: OrganicPlantType) {
        self.types.insert(plant_type.id.clone(), plant_type);
    }

    /// Look up a plant type.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&OrganicPlantType> {
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

/// A growing organic plant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganicPlant {
    /// Plant id
    pub id: PlantId,
    /// Plant type id
    pub type_id: String,
    /// Sub-hex just above the soil surface
    pub origin: SubHexCoord3D,
    /// Soil hex under the origin
    pub soil_hex: HexCoord3D,
    /// Components by id
    pub components: BTreeMap<ComponentId, PlantComponent>,
    /// Growth points by id
    pub growth_points: BTreeMap<GrowthPointId, GrowthPoint>,
    /// Internal pools
    pub resources: PlantResources,
    /// Light reaching each leaf at the last tick
    pub light: BTreeMap<ComponentId, f32>,
    /// Seconds since planting
    pub age: f32,
}

impl OrganicPlant {
    /// Number of components of one kind.
    #[must_use]
    pub fn count(&self, kind: ComponentKind) -> usize {
        self.components.values().filter(|c| c.kind == kind).count()
    }

    /// Reservoir fill in `[0, 1]`.
    #[must_use]
    pub fn water_fraction(&self, plant_type: &OrganicPlantType) -> f32 {
        if plant_type.max_water <= 0.0 {
            0.0
        } else {
            (self.resources.water / plant_type.max_water).clamp(0.0, 1.0)
        }
    }

    /// Mean component health.
    #[must_use]
    pub fn health(&self) -> f32 {
        if self.components.is_empty() {
            return 0.0;
        }
        self.components.values().map(|c| c.health).sum::<f32>() / self.components.len() as f32
    }

    /// Roots per soil hex.
    #[must_use]
    pub fn root_hexes(&self, metrics: &HexMetrics) -> BTreeMap<HexCoord3D, u32> {
        let mut out = BTreeMap::new();
        for c in self.components.values().filter(|c| c.kind == ComponentKind::Root) {
            *out.entry(metrics.parent_hex3d(c.position)).or_insert(0) += 1;
        }
        out
    }

    /// Planar world centroid of the stems.
    fn stem_centroid(&self, metrics: &HexMetrics) -> Vec2 {
        let stems: Vec<Vec2> = self
            .components
            .values()
            .filter(|c| c.kind == ComponentKind::Stem)
            .map(|c| metrics.sub_hex_to_world(c.position.sub))
            .collect();
        if stems.is_empty() {
            return metrics.sub_hex_to_world(self.origin.sub);
        }
        stems.iter().copied().sum::<Vec2>() / stems.len() as f32
    }

    fn add_point(&mut self, kind: GrowthPointKind, component: ComponentId, dominance: f32) {
        let Some(host) = self.components.get_mut(&component) else {
            return;
        };
        let point = GrowthPoint::new(kind, host.position, component, dominance);
        host.growth_points.push(point.id);
        self.growth_points.insert(point.id, point);
    }

    fn drop_component(&mut self, id: ComponentId) -> Option<PlantComponent> {
        let component = self.components.remove(&id)?;
        for point in &component.growth_points {
            self.growth_points.remove(point);
        }
        self.light.remove(&id);
        Some(component)
    }
}

/// Per-hex water requests of one plant: (uptake, transpiration).
type PlantRequests = BTreeMap<HexCoord3D, (f32, f32)>;

/// Organic plant simulation.
#[derive(Debug)]
pub struct OrganicPlantSimulation {
    config: OrganicConfig,
    registry: OrganicPlantRegistry,
    plants: BTreeMap<PlantId, OrganicPlant>,
    rng: fastrand::Rng,
    events: Sender<SimEvent>,
}

impl OrganicPlantSimulation {
    /// Create a simulation with the given plant types.
    #[must_use]
    pub fn new(config: OrganicConfig, registry: OrganicPlantRegistry, seed: u64, events: Sender<SimEvent>) -> Self {
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
    pub fn registry(&self) -> &OrganicPlantRegistry {
        &self.registry
    }

    /// Look up a plant.
    #[must_use]
    pub fn plant(&self, id: PlantId) -> Option<&OrganicPlant> {
        self.plants.get(&id)
    }

    /// All plants in id order.
    pub fn plants(&self) -> impl Iterator<Item = &OrganicPlant> {
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

    /// Components of a plant in id order.
    #[must_use]
    pub fn components_of(&self, id: PlantId) -> Vec<&PlantComponent> {
        self.plants
            .get(&id)
            .map(|p| p.components.values().collect())
            .unwrap_or_default()
    }

    /// Plant owning a sub-hex, if it is organic.
    #[must_use]
    pub fn plant_at(&self, cell: SubHexCoord3D, occupancy: &OccupancyIndex) -> Option<&OrganicPlant> {
        occupancy.owner(cell).and_then(|o| self.plants.get(&o.plant))
    }

    /// Plants a seed; every seed component must fit or nothing is placed.
    pub fn plant_seed(&mut self, type_id: &str, origin: SubHexCoord3D, ctx: &mut GrowthContext<'_>) -> Option<PlantId> {
        let plant_type = self.registry.get(type_id)?;
        let metrics = ctx.metrics();
        let origin = metrics.normalize_sub_hex3d(origin);
        let below = origin.shifted(-1);
        if ctx.in_soil(origin) || !ctx.in_soil(below) {
            return None;
        }
        let soil_hex = metrics.parent_hex3d(below);
        if !ctx.nutrients.has_enough_nutrients(soil_hex, type_id) {
            debug!("Not enough nutrients at {} for {}", soil_hex, type_id);
            return None;
        }

        let mut parts = Vec::with_capacity(plant_type.seed.len());
        for part in &plant_type.seed {
            let pos = metrics.offset_sub_hex3d(origin, part.dq, part.dr, part.dh);
            let wants_soil = part.kind == ComponentKind::Root;
            if ctx.in_soil(pos) != wants_soil || !ctx.occupancy.is_free(pos) {
                return None;
            }
            if parts.iter().any(|(p, _)| *p == pos) {
                return None;
            }
            parts.push((pos, part.kind));
        }

        let id = PlantId::new();
        let mut plant = OrganicPlant {
            id,
            type_id: type_id.to_string(),
            origin,
            soil_hex,
            components: BTreeMap::new(),
            growth_points: BTreeMap::new(),
            resources: PlantResources {
                water: plant_type.initial_water,
                nutrients: ctx.nutrients.nutrients(soil_hex).map_or(0.0, |l| l.average(false)),
                energy: plant_type.initial_energy,
            },
            light: BTreeMap::new(),
            age: 0.0,
        };
        for (pos, kind) in parts {
            let component = ComponentId::new();
            ctx.occupancy.claim(pos, Occupant::organic(id, component, kind));
            plant
                .components
                .insert(component, PlantComponent::new(component, kind, pos));
            match kind {
                ComponentKind::Root => plant.add_point(GrowthPointKind::Root, component, 1.0),
                ComponentKind::Stem => plant.add_point(GrowthPointKind::Shoot, component, 1.0),
                ComponentKind::Leaf | ComponentKind::Fruit => {},
            }
        }

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

    /// Removes a plant and frees its cells.
    pub fn remove_plant(&mut self, id: PlantId, occupancy: &mut OccupancyIndex) -> bool {
        if self.plants.remove(&id).is_none() {
            return false;
        }
        occupancy.release_plant(id);
        publish(&self.events, SimEvent::PlantRemoved { plant_id: id });
        true
    }

    /// Handles soil removal: plants growing from `hex` are removed, and other
    /// plants lose the roots they had in it.
    pub fn remove_plants_in(&mut self, hex: HexCoord3D, ctx: &mut GrowthContext<'_>) -> Vec<PlantId> {
        let metrics = ctx.metrics();
        let doomed: Vec<PlantId> = self
            .plants
            .values()
            .filter(|p| p.soil_hex == hex)
            .map(|p| p.id)
            .collect();
        for id in &doomed {
            self.remove_plant(*id, ctx.occupancy);
        }
        for plant in self.plants.values_mut() {
            let cut: Vec<ComponentId> = plant
                .components
                .values()
                .filter(|c| c.kind == ComponentKind::Root && metrics.parent_hex3d(c.position) == hex)
                .map(|c| c.id)
                .collect();
            for component in cut {
                if let Some(root) = plant.drop_component(component) {
                    ctx.occupancy.release(root.position);
                }
            }
        }
        doomed
    }

    /// Advances every plant by `dt` seconds.
    pub fn tick(&mut self, dt: f32, ctx: &mut GrowthContext<'_>) {
        if dt <= 0.0 {
            return;
        }
        let metrics = ctx.metrics();
        let transpiration = ctx.clock.transpiration_factor();

        let mut ledger = UptakeLedger::new();
        let mut requests: BTreeMap<PlantId, PlantRequests> = BTreeMap::new();
        for plant in self.plants.values() {
            let Some(plant_type) = self.registry.get(&plant.type_id) else {
                continue;
            };
            let plant_requests = water_requests(plant, plant_type, ctx, &metrics, transpiration, dt);
            for (hex, (uptake, transpired)) in &plant_requests {
                ledger.request(*hex, plant.id, uptake + transpired);
            }
            requests.insert(plant.id, plant_requests);
        }
        let grants = ledger.settle(ctx.water);

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
            let granted: BTreeMap<HexCoord3D, f32> = grants
                .get(&plant.id)
                .map(|g| g.iter().copied().collect())
                .unwrap_or_default();
            if let Some(plant_requests) = requests.get(&plant.id) {
                apply_water(plant, plant_type, plant_requests, &granted, ctx, config);
            }
            update_light(plant, ctx, config);
            update_energy(plant, plant_type, ctx, config, dt);
            update_nutrients(plant, ctx, &metrics, config, dt);
            apply_apical_dominance(plant, plant_type.apical_strength, config.dominance_radius);
            grow_points(plant, plant_type, ctx, config, rng, events, dt);
            update_components(plant, plant_type, ctx.occupancy, dt);
            plant.age += dt;
        }
    }
}

fn water_requests(
    plant: &OrganicPlant,
    plant_type: &OrganicPlantType,
    ctx: &GrowthContext<'_>,
    metrics: &HexMetrics,
    transpiration: f32,
    dt: f32,
) -> PlantRequests {
    let roots = plant.root_hexes(metrics);
    let total_roots: u32 = roots.values().sum();
    let mut out = PlantRequests::new();
    if total_roots == 0 {
        return out;
    }

    let mut uptake: BTreeMap<HexCoord3D, f32> = roots
        .iter()
        .map(|(hex, n)| {
            let saturation = ctx.water.saturation(*hex).min(1.0);
            (*hex, plant_type.root_uptake_rate * (*n as f32).sqrt() * saturation * dt)
        })
        .collect();
    let wanted: f32 = uptake.values().sum();
    let room = (plant_type.max_water - plant.resources.water).max(0.0);
    if wanted > room && wanted > 0.0 {
        let scale = room / wanted;
        uptake.values_mut().for_each(|v| *v *= scale);
    }

    let transpired = plant_type.transpiration_rate * plant.components.len() as f32 * transpiration * dt;
    for (hex, n) in roots {
        let share = transpired * n as f32 / total_roots as f32;
        out.insert(hex, (uptake.get(&hex).copied().unwrap_or(0.0), share));
    }
    out
}

fn apply_water(
    plant: &mut OrganicPlant,
    plant_type: &OrganicPlantType,
    requests: &PlantRequests,
    granted: &BTreeMap<HexCoord3D, f32>,
    ctx: &mut GrowthContext<'_>,
    config: &OrganicConfig,
) {
    let mut absorbed = 0.0;
    let mut shortfall = 0.0;
    for (hex, (uptake, transpired)) in requests {
        let asked = uptake + transpired;
        let got = granted.get(hex).copied().unwrap_or(0.0);
        let fraction = if asked > 0.0 { (got / asked).min(1.0) } else { 0.0 };
        let uptake_got = uptake * fraction;
        absorbed += uptake_got;
        shortfall += transpired * (1.0 - fraction);
        if uptake_got > 0.0 {
            ctx.nutrients
                .deplete_continuous(*hex, &plant.type_id, uptake_got * config.nutrient_per_water);
        }
    }
    plant.resources.water = (plant.resources.water + absorbed - shortfall).clamp(0.0, plant_type.max_water);
}

fn update_light(plant: &mut OrganicPlant, ctx: &GrowthContext<'_>, config: &OrganicConfig) {
    plant.light.clear();
    for c in plant.components.values().filter(|c| c.kind == ComponentKind::Leaf) {
        let light = ctx.light_at(c.position, config.occlusion_factor, config.light_scan_layers);
        plant.light.insert(c.id, light);
    }
}

fn update_energy(
    plant: &mut OrganicPlant,
    plant_type: &OrganicPlantType,
    ctx: &GrowthContext<'_>,
    config: &OrganicConfig,
    dt: f32,
) {
    let daylight = ctx.clock.daylight();
    let mut gained = config.passive_energy_trickle * dt;
    if daylight > 0.0 {
        let leaf_output: f32 = plant
            .components
            .values()
            .filter(|c| c.kind == ComponentKind::Leaf)
            .map(|c| plant.light.get(&c.id).copied().unwrap_or(0.0) * c.size * c.health)
            .sum();
        gained += plant_type.photosynthesis_rate * leaf_output * daylight * dt;
    }
    plant.resources.energy = (plant.resources.energy + gained).min(plant_type.max_energy);
}

fn update_nutrients(
    plant: &mut OrganicPlant,
    ctx: &GrowthContext<'_>,
    metrics: &HexMetrics,
    config: &OrganicConfig,
    dt: f32,
) {
    let roots = plant.root_hexes(metrics);
    let mut weighted = 0.0;
    let mut count = 0.0;
    for (hex, n) in roots {
        if let Some(levels) = ctx.nutrients.nutrients(hex) {
            weighted += levels.average(false) * n as f32;
            count += n as f32;
        }
    }
    if count > 0.0 {
        let soil = weighted / count;
        let rate = (config.nutrient_uptake * dt).min(1.0);
        plant.resources.nutrients += (soil - plant.resources.nutrients) * rate;
    }
}

/// Suppresses shoot points near the highest one.
pub fn apply_apical_dominance(plant: &mut OrganicPlant, strength: f32, radius: u32) {
    let dominant = plant
        .growth_points
        .values()
        .filter(|p| p.is_shoot())
        .max_by(|a, b| a.position.h.cmp(&b.position.h).then(b.id.cmp(&a.id)))
        .map(|p| (p.id, p.position.h));

    for point in plant.growth_points.values_mut() {
        point.dominance = point.base_dominance;
        let Some((dominant_id, top)) = dominant else {
            continue;
        };
        if !point.is_shoot() || point.id == dominant_id || radius == 0 {
            continue;
        }
        let distance = (top - point.position.h).unsigned_abs();
        if distance > radius {
            continue;
        }
        let proximity = 1.0 - distance as f32 / radius as f32;
        let resist = if point.kind == GrowthPointKind::Lateral { 0.5 } else { 1.0 };
        point.dominance = point.base_dominance * (1.0 - strength * resist * proximity).clamp(0.0, 1.0);
    }
}

fn grow_points(
    plant: &mut OrganicPlant,
    plant_type: &OrganicPlantType,
    ctx: &mut GrowthContext<'_>,
    config: &OrganicConfig,
    rng: &mut fastrand::Rng,
    events: &Sender<SimEvent>,
    dt: f32,
) {
    let daytime = ctx.clock.is_daytime();
    let daylight = ctx.clock.daylight();
    let gate = if plant.count(ComponentKind::Leaf) > 0 {
        config.min_energy_gate
    } else {
        0.0
    };
    let water = plant.water_fraction(plant_type);
    let nutrient_mult = 0.5 + 0.5 * plant.resources.nutrients.clamp(0.0, 1.0);
    let energy = plant.resources.energy;

    let ids: Vec<GrowthPointId> = plant.growth_points.keys().copied().collect();
    for id in ids {
        let Some(point) = plant.growth_points.get_mut(&id) else {
            continue;
        };
        point.age += dt;
        let (ready, light_mult) = match point.kind {
            GrowthPointKind::Root => {
                let awake = daytime || rng.f32() < config.night_root_growth_probability;
                (water >= config.min_root_water && awake, 1.0)
            },
            GrowthPointKind::Shoot | GrowthPointKind::Lateral => (
                daytime && water >= config.min_shoot_water && energy > gate,
                daylight,
            ),
        };
        if !ready {
            continue;
        }
        let rate = plant_type.base_growth_rate * water * nutrient_mult * light_mult * point.dominance
            / (1.0 + config.age_decay * point.age);
        point.potential += rate * dt;
        if point.potential < plant_type.growth_threshold {
            continue;
        }

        let snapshot = point.clone();
        let grown = attempt_growth(plant, plant_type, &snapshot, ctx, config, rng, events);
        if let Some(point) = plant.growth_points.get_mut(&id) {
            if grown {
                point.potential = 0.0;
            } else {
                point.potential *= 0.5;
            }
        }
    }
}

fn choose_kind(
    point: &GrowthPoint,
    plant_type: &OrganicPlantType,
    config: &OrganicConfig,
    rng: &mut fastrand::Rng,
) -> ComponentKind {
    let leaf_chance = match point.kind {
        GrowthPointKind::Root => return ComponentKind::Root,
        GrowthPointKind::Lateral => config.lateral_leaf_preference,
        GrowthPointKind::Shoot => match point.last_spawn {
            Some(ComponentKind::Stem) => (plant_type.leaf_bias + 0.3).min(1.0),
            Some(ComponentKind::Leaf) => (plant_type.leaf_bias - 0.3).max(0.0),
            _ => plant_type.leaf_bias,
        },
    };
    if rng.f32() < leaf_chance {
        ComponentKind::Leaf
    } else {
        ComponentKind::Stem
    }
}

fn attempt_growth(
    plant: &mut OrganicPlant,
    plant_type: &OrganicPlantType,
    point: &GrowthPoint,
    ctx: &mut GrowthContext<'_>,
    config: &OrganicConfig,
    rng: &mut fastrand::Rng,
    events: &Sender<SimEvent>,
) -> bool {
    let kind = choose_kind(point, plant_type, config, rng);
    let cost = if kind == ComponentKind::Root {
        config.root_energy_cost
    } else {
        config.shoot_energy_cost
    };
    if plant.resources.energy < cost || plant.count(kind) >= plant_type.limit(kind) {
        return false;
    }
    let Some(position) = choose_position(plant, plant_type, point, kind, ctx, config, rng) else {
        return false;
    };
    let Some(component) = place_component(plant, kind, position, ctx, events) else {
        return false;
    };

    match kind {
        ComponentKind::Root => plant.add_point(GrowthPointKind::Root, component, config.child_dominance),
        ComponentKind::Stem => {
            plant.add_point(GrowthPointKind::Shoot, component, config.child_dominance);
            if plant_type.branches_at(position.h - plant.origin.h) {
                plant.add_point(GrowthPointKind::Lateral, component, config.child_dominance);
                plant.add_point(GrowthPointKind::Lateral, component, config.child_dominance);
            }
        },
        ComponentKind::Leaf | ComponentKind::Fruit => {},
    }
    plant.resources.energy -= cost;
    if let Some(origin_point) = plant.growth_points.get_mut(&point.id) {
        origin_point.last_spawn = Some(kind);
    }
    trace!("{} grew a {} at {}", plant.id, kind.display_name(), position);
    publish(
        events,
        SimEvent::ComponentGrown {
            plant_id: plant.id,
            position,
        },
    );
    true
}

fn stems_above(cell: SubHexCoord3D, ctx: &GrowthContext<'_>, scan_layers: u32) -> usize {
    (1..=scan_layers as i32)
        .filter(|k| {
            ctx.occupancy
                .owner(cell.shifted(*k))
                .is_some_and(|o| o.kind == ComponentKind::Stem)
        })
        .count()
}

fn can_occupy(ctx: &GrowthContext<'_>, plant: PlantId, cell: SubHexCoord3D, kind: ComponentKind) -> bool {
    match ctx.occupancy.owner(cell) {
        None => true,
        Some(owner) => kind == ComponentKind::Stem && owner.plant == plant && owner.kind == ComponentKind::Leaf,
    }
}

fn choose_position(
    plant: &OrganicPlant,
    plant_type: &OrganicPlantType,
    point: &GrowthPoint,
    kind: ComponentKind,
    ctx: &GrowthContext<'_>,
    config: &OrganicConfig,
    rng: &mut fastrand::Rng,
) -> Option<SubHexCoord3D> {
    let metrics = ctx.metrics();
    let from = point.position;
    let around = |dh: i32| AXIAL_DIRECTIONS.map(|(dq, dr)| metrics.offset_sub_hex3d(from, dq, dr, dh));

    if kind == ComponentKind::Root {
        let mut candidates = vec![from.shifted(-1)];
        candidates.extend(around(0));
        candidates.extend(around(-1));
        return candidates
            .into_iter()
            .filter(|c| ctx.in_soil(*c) && ctx.occupancy.is_free(*c))
            .map(|c| {
                let score = ctx.water.saturation(metrics.parent_hex3d(c)) + rng.f32() * 0.05;
                (c, score)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(c, _)| c);
    }

    let straight_up = from.shifted(1);
    let mut candidates = Vec::with_capacity(13);
    if kind == ComponentKind::Stem {
        candidates.push(straight_up);
    }
    candidates.extend(around(1));
    if kind == ComponentKind::Leaf || point.kind == GrowthPointKind::Lateral {
        candidates.extend(around(0));
    }

    let centroid = plant.stem_centroid(&metrics);
    candidates
        .into_iter()
        .filter(|c| {
            c.h - plant.origin.h <= plant_type.max_height
                && !ctx.in_soil(*c)
                && can_occupy(ctx, plant.id, *c, kind)
        })
        .map(|c| {
            let light = ctx.light_at(c, config.occlusion_factor, config.light_scan_layers);
            let spread = ((metrics.sub_hex_to_world(c.sub) - centroid).length() / metrics.hex_size).min(1.0);
            let crowding = stems_above(c, ctx, config.light_scan_layers) as f32;
            let mut score = config.light_weight * light + config.spread_weight * spread
                - config.crowding_weight * crowding
                + rng.f32() * 0.01;
            if c == straight_up {
                score += config.vertical_bonus;
            }
            (c, score)
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(c, _)| c)
}

/// Places a component, letting a stem push the plant's own leaf aside.
fn place_component(
    plant: &mut OrganicPlant,
    kind: ComponentKind,
    position: SubHexCoord3D,
    ctx: &mut GrowthContext<'_>,
    events: &Sender<SimEvent>,
) -> Option<ComponentId> {
    if let Some(owner) = ctx.occupancy.owner(position).copied() {
        let own_leaf = owner.plant == plant.id && owner.kind == ComponentKind::Leaf;
        if kind != ComponentKind::Stem || !own_leaf {
            return None;
        }
        displace_leaf(plant, owner.component?, position, ctx, events);
    }
    let id = ComponentId::new();
    if !ctx.occupancy.claim(position, Occupant::organic(plant.id, id, kind)) {
        return None;
    }
    plant.components.insert(id, PlantComponent::new(id, kind, position));
    Some(id)
}

/// Moves a leaf to a free neighbor on its layer, or sheds it.
fn displace_leaf(
    plant: &mut OrganicPlant,
    leaf: ComponentId,
    from: SubHexCoord3D,
    ctx: &mut GrowthContext<'_>,
    events: &Sender<SimEvent>,
) {
    let metrics = ctx.metrics();
    ctx.occupancy.release(from);
    let target = AXIAL_DIRECTIONS
        .iter()
        .map(|(dq, dr)| metrics.offset_sub_hex3d(from, *dq, *dr, 0))
        .find(|c| ctx.occupancy.is_free(*c) && !ctx.in_soil(*c));

    let to = match target {
        Some(to) => {
            ctx.occupancy
                .claim(to, Occupant::organic(plant.id, leaf, ComponentKind::Leaf));
            if let Some(component) = plant.components.get_mut(&leaf) {
                component.position = to;
            }
            Some(to)
        },
        None => {
            plant.drop_component(leaf);
            None
        },
    };
    trace!("{} leaf pushed from {} to {:?}", plant.id, from, to);
    publish(
        events,
        SimEvent::LeafDisplaced {
            plant_id: plant.id,
            from,
            to,
        },
    );
}

fn update_components(plant: &mut OrganicPlant, plant_type: &OrganicPlantType, occupancy: &mut OccupancyIndex, dt: f32) {
    let water = plant.water_fraction(plant_type);
    let fed = plant.resources.energy > 0.0;
    let mut shed = Vec::new();

    for component in plant.components.values_mut() {
        component.age += dt;
        let mut delta = -plant_type.aging_rate;
        if water >= 0.3 && fed {
            delta += plant_type.health_recovery;
        }
        if water < 0.1 {
            delta -= plant_type.drought_damage;
        }
        if component.kind == ComponentKind::Leaf {
            let light = plant.light.get(&component.id).copied().unwrap_or(1.0);
            if light < 0.2 {
                delta -= plant_type.shade_damage;
            }
        }
        component.health = (component.health + delta * dt).clamp(0.0, 1.0);
        if component.health > 0.5 {
            component.size = (component.size + plant_type.size_growth * dt).min(1.0);
        }
        if component.kind == ComponentKind::Leaf && component.health <= 0.0 {
            shed.push(component.id);
        }
    }

    for id in shed {
        if let Some(leaf) = plant.drop_component(id) {
            if occupancy.owner(leaf.position).and_then(|o| o.component) == Some(id) {
                occupancy.release(leaf.position);
            }
            debug!("{} shed a leaf at {}", plant.id, leaf.position);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::TestPlot;
    use hexgarden_common::HexCoord;
    use proptest::prelude::*;

    fn sim(plot: &TestPlot, seed: u64) -> OrganicPlantSimulation {
        OrganicPlantSimulation::new(
            OrganicConfig::default(),
            OrganicPlantRegistry::with_defaults(),
            seed,
            plot.bus.sender(),
        )
    }

    fn garden() -> TestPlot {
        let mut plot = TestPlot::new();
        let center = HexCoord::new(0, 0);
        let mut hexes = vec![center];
        hexes.extend(center.neighbors());
        for hex in hexes {
            plot.soil(hex.at_level(-1), 0.7);
            plot.soil(hex.at_level(0), 0.7);
        }
        plot
    }

    fn assert_exclusive(sim: &OrganicPlantSimulation, occupancy: &OccupancyIndex) {
        let mut seen = ahash::AHashSet::new();
        for plant in sim.plants() {
            for component in plant.components.values() {
                assert!(seen.insert(component.position), "two components at {}", component.position);
                let owner = occupancy.owner(component.position).expect("occupied");
                assert_eq!(owner.plant, plant.id);
                assert_eq!(owner.component, Some(component.id));
            }
        }
        assert_eq!(seen.len(), occupancy.len());
    }

    #[test]
    fn test_seed_places_root_and_stem() {
        let mut plot = garden();
        let mut sim = sim(&plot, 1);
        let origin = plot.origin(HexCoord::new(0, 0));
        let id = sim.plant_seed("sapling", origin, &mut plot.ctx()).expect("planted");

        let plant = sim.plant(id).expect("plant");
        assert_eq!(plant.count(ComponentKind::Root), 1);
        assert_eq!(plant.count(ComponentKind::Stem), 1);
        assert_eq!(plant.growth_points.len(), 2);
        assert!(sim.plant_seed("fern", origin, &mut plot.ctx()).is_none());
        assert!(sim.plant_seed("oak", origin, &mut plot.ctx()).is_none());
        assert_exclusive(&sim, &plot.occupancy);
    }

    #[test]
    fn test_seed_needs_soil() {
        let mut plot = TestPlot::new();
        let mut sim = sim(&plot, 1);
        let origin = plot.origin(HexCoord::new(5, 5));
        assert!(sim.plant_seed("sapling", origin, &mut plot.ctx()).is_none());
        assert!(plot.occupancy.is_empty());
    }

    #[test]
    fn test_plant_grows_in_daylight() {
        let mut plot = garden();
        let mut sim = sim(&plot, 11);
        let id = sim
            .plant_seed("fern", plot.origin(HexCoord::new(0, 0)), &mut plot.ctx())
            .expect("planted");
        for _ in 0..600 {
            sim.tick(0.5, &mut plot.ctx());
        }
        let plant = sim.plant(id).expect("plant");
        assert!(plant.components.len() > 2, "only {} components", plant.components.len());
        assert!(plant.count(ComponentKind::Root) <= 10);
        assert!(plant.count(ComponentKind::Leaf) <= 24);
        for c in plant.components.values() {
            match c.kind {
                ComponentKind::Root => assert!(c.position.h < plant.origin.h),
                _ => assert!(c.position.h - plant.origin.h <= 6),
            }
        }
        assert_exclusive(&sim, &plot.occupancy);
    }

    #[test]
    fn test_roots_draw_soil_water() {
        let mut plot = garden();
        let mut sim = sim(&plot, 2);
        let id = sim
            .plant_seed("sapling", plot.origin(HexCoord::new(0, 0)), &mut plot.ctx())
            .expect("planted");
        let hex = HexCoord::new(0, 0).at_level(0);
        let before = plot.water.cell(hex).expect("cell").content;
        let reservoir = sim.plant(id).expect("plant").resources.water;
        sim.tick(1.0, &mut plot.ctx());
        assert!(plot.water.cell(hex).expect("cell").content < before);
        assert!(sim.plant(id).expect("plant").resources.water > reservoir);
    }

    #[test]
    fn test_night_blocks_shoots() {
        let mut plot = garden();
        plot.clock.set_hour(23.0);
        let mut sim = sim(&plot, 3);
        let id = sim
            .plant_seed("vine", plot.origin(HexCoord::new(0, 0)), &mut plot.ctx())
            .expect("planted");
        for _ in 0..50 {
            sim.tick(1.0, &mut plot.ctx());
        }
        let plant = sim.plant(id).expect("plant");
        for point in plant.growth_points.values().filter(|p| p.is_shoot()) {
            assert!(point.potential.abs() < f32::EPSILON);
        }
    }

    #[test]
    fn test_night_root_probability() {
        let mut plot = garden();
        plot.clock.set_hour(23.0);
        let config = OrganicConfig {
            night_root_growth_probability: 0.0,
            ..OrganicConfig::default()
        };
        let mut asleep = OrganicPlantSimulation::new(config, OrganicPlantRegistry::with_defaults(), 4, plot.bus.sender());
        let id = asleep
            .plant_seed("sapling", plot.origin(HexCoord::new(0, 0)), &mut plot.ctx())
            .expect("planted");
        for _ in 0..20 {
            asleep.tick(1.0, &mut plot.ctx());
        }
        let root_potential: f32 = asleep
            .plant(id)
            .expect("plant")
            .growth_points
            .values()
            .filter(|p| p.kind == GrowthPointKind::Root)
            .map(|p| p.potential)
            .sum();
        assert!(root_potential.abs() < f32::EPSILON);

        let mut plot = garden();
        plot.clock.set_hour(23.0);
        let config = OrganicConfig {
            night_root_growth_probability: 1.0,
            ..OrganicConfig::default()
        };
        let mut awake = OrganicPlantSimulation::new(config, OrganicPlantRegistry::with_defaults(), 4, plot.bus.sender());
        let id = awake
            .plant_seed("sapling", plot.origin(HexCoord::new(0, 0)), &mut plot.ctx())
            .expect("planted");
        awake.tick(1.0, &mut plot.ctx());
        let root_potential: f32 = awake
            .plant(id)
            .expect("plant")
            .growth_points
            .values()
            .filter(|p| p.kind == GrowthPointKind::Root)
            .map(|p| p.potential)
            .sum();
        assert!(root_potential > 0.0);
    }

    fn point_at(h: i32, kind: GrowthPointKind) -> GrowthPoint {
        let position = SubHexCoord3D::new(hexgarden_common::SubHexCoord::center_of(HexCoord::new(0, 0)), h);
        GrowthPoint::new(kind, position, ComponentId::new(), 1.0)
    }

    fn bare_plant(points: Vec<GrowthPoint>) -> OrganicPlant {
        OrganicPlant {
            id: PlantId::new(),
            type_id: "sapling".to_string(),
            origin: SubHexCoord3D::default(),
            soil_hex: HexCoord3D::new(0, 0, -1),
            components: BTreeMap::new(),
            growth_points: points.into_iter().map(|p| (p.id, p)).collect(),
            resources: PlantResources::default(),
            light: BTreeMap::new(),
            age: 0.0,
        }
    }

    #[test]
    fn test_apical_dominance() {
        let top = point_at(10, GrowthPointKind::Shoot);
        let near = point_at(8, GrowthPointKind::Shoot);
        let near_lateral = point_at(8, GrowthPointKind::Lateral);
        let far = point_at(2, GrowthPointKind::Shoot);
        let root = point_at(-3, GrowthPointKind::Root);
        let ids = [top.id, near.id, near_lateral.id, far.id, root.id];
        let mut plant = bare_plant(vec![top, near, near_lateral, far, root]);

        apply_apical_dominance(&mut plant, 0.6, 6);
        let dominance = |i: usize| plant.growth_points[&ids[i]].dominance;
        assert!((dominance(0) - 1.0).abs() < 1e-6);
        // proximity 1 - 2/6
        assert!((dominance(1) - (1.0 - 0.6 * (2.0 / 3.0))).abs() < 1e-5);
        assert!((dominance(2) - (1.0 - 0.3 * (2.0 / 3.0))).abs() < 1e-5);
        assert!(dominance(2) > dominance(1));
        assert!((dominance(3) - 1.0).abs() < 1e-6);
        assert!((dominance(4) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_stem_displaces_own_leaf_only() {
        let mut plot = garden();
        let mut sim = sim(&plot, 5);
        let origin = plot.origin(HexCoord::new(0, 0));
        let id = sim.plant_seed("sapling", origin, &mut plot.ctx()).expect("planted");
        let metrics = *plot.water.metrics();
        let sender = plot.bus.sender();

        // Own leaf right above the seed stem.
        let spot = origin.shifted(1);
        let mut plant = sim.plants.remove(&id).expect("plant");
        let leaf = place_component(&mut plant, ComponentKind::Leaf, spot, &mut plot.ctx(), &sender)
            .expect("leaf");
        let stem = place_component(&mut plant, ComponentKind::Stem, spot, &mut plot.ctx(), &sender)
            .expect("stem displaces leaf");
        assert_eq!(plot.occupancy.owner(spot).and_then(|o| o.component), Some(stem));
        let moved = plant.components[&leaf].position;
        assert_ne!(moved, spot);
        assert_eq!(moved.h, spot.h);
        assert_eq!(plot.occupancy.owner(moved).and_then(|o| o.component), Some(leaf));
        sim.plants.insert(id, plant);

        // Another plant's leaf blocks.
        let other_origin = metrics.offset_sub_hex3d(origin, 4, 0, 0);
        let other = sim.plant_seed("fern", other_origin, &mut plot.ctx()).expect("other");
        let contested = other_origin.shifted(1);
        let mut other_plant = sim.plants.remove(&other).expect("plant");
        place_component(&mut other_plant, ComponentKind::Leaf, contested, &mut plot.ctx(), &sender)
            .expect("leaf");
        sim.plants.insert(other, other_plant);

        let mut plant = sim.plants.remove(&id).expect("plant");
        assert!(place_component(&mut plant, ComponentKind::Stem, contested, &mut plot.ctx(), &sender).is_none());
        sim.plants.insert(id, plant);
        assert_exclusive(&sim, &plot.occupancy);
    }

    #[test]
    fn test_failed_growth_halves_potential() {
        let mut plot = garden();
        let mut registry = OrganicPlantRegistry::new();
        registry.register(
            OrganicPlantType::builder("stub", "Stub")
                .growth(10.0, 1.0)
                .limits(1, 0, 1, 0)
                .habit(0.0, 0.0)
                .build(),
        );
        let mut sim = OrganicPlantSimulation::new(OrganicConfig::default(), registry, 6, plot.bus.sender());
        let id = sim
            .plant_seed("stub", plot.origin(HexCoord::new(0, 0)), &mut plot.ctx())
            .expect("planted");
        sim.tick(0.4, &mut plot.ctx());
        let plant = sim.plant(id).expect("plant");
        assert_eq!(plant.components.len(), 2);
        for point in plant.growth_points.values() {
            assert!(point.potential > 0.0);
            assert!(point.potential < 1.0);
        }
    }

    #[test]
    fn test_dead_leaf_is_shed() {
        let mut plot = garden();
        let mut sim = sim(&plot, 8);
        let origin = plot.origin(HexCoord::new(0, 0));
        let id = sim.plant_seed("sapling", origin, &mut plot.ctx()).expect("planted");
        let sender = plot.bus.sender();
        let mut plant = sim.plants.remove(&id).expect("plant");
        let spot = plot.water.metrics().offset_sub_hex3d(origin, 1, 0, 0);
        let leaf = place_component(&mut plant, ComponentKind::Leaf, spot, &mut plot.ctx(), &sender)
            .expect("leaf");
        if let Some(c) = plant.components.get_mut(&leaf) {
            c.health = 0.0;
        }
        plant.resources.water = 0.0;
        sim.plants.insert(id, plant);

        sim.tick(0.1, &mut plot.ctx());
        assert!(!sim.plant(id).expect("plant").components.contains_key(&leaf));
        assert!(plot.occupancy.is_free(spot));
    }

    #[test]
    fn test_remove_plant_frees_cells() {
        let mut plot = garden();
        let mut sim = sim(&plot, 9);
        let id = sim
            .plant_seed("vine", plot.origin(HexCoord::new(0, 0)), &mut plot.ctx())
            .expect("planted");
        assert!(!plot.occupancy.is_empty());
        assert!(sim.remove_plant(id, &mut plot.occupancy));
        assert!(plot.occupancy.is_empty());
        assert!(!sim.remove_plant(id, &mut plot.occupancy));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        #[test]
        fn prop_occupancy_stays_exclusive(
            seed in 0u64..1000,
            offsets in proptest::collection::vec((-3i32..=3, -3i32..=3, 0usize..3), 1..4),
            ticks in 50usize..250,
        ) {
            let mut plot = garden();
            let mut sim = sim(&plot, seed);
            let metrics = *plot.water.metrics();
            let origin = plot.origin(HexCoord::new(0, 0));
            for (dq, dr, t) in offsets {
                let kind = ["sapling", "fern", "vine"][t];
                let at = metrics.offset_sub_hex3d(origin, dq * 2, dr * 2, 0);
                let _ = sim.plant_seed(kind, at, &mut plot.ctx());
            }
            for _ in 0..ticks {
                sim.tick(1.0, &mut plot.ctx());
            }
            assert_exclusive(&sim, &plot.occupancy);
        }
    }
}
