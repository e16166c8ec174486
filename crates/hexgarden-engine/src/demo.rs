//! Demo garden and tick loop.

use std::collections::BTreeMap;

use glam::Vec3;
use hexgarden_common::{HexCoord, SoilType};
use hexgarden_sim::{PlantSummary, SimConfig, SimEvent, Terrain};
use tracing::{debug, info, warn};

/// How the demo runs.
#[derive(Debug, Clone, Copy)]
pub struct DemoOptions {
    /// Seconds per tick
    pub tick: f32,
    /// Simulated days to run
    pub days: f32,
    /// Water poured on each surface hex every simulated hour
    pub hourly_watering: f32,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self {
            tick: 0.5,
            days: 1.0,
            hourly_watering: 4_000.0,
        }
    }
}

/// What the demo ended with.
#[derive(Debug, Default)]
pub struct DemoReport {
    /// Final plant states
    pub plants: Vec<PlantSummary>,
    /// Events seen, by name
    pub event_counts: BTreeMap<&'static str, usize>,
    /// Total harvested yield
    pub harvested: u32,
    /// Final clock reading
    pub time: String,
    /// Total water left in the soil
    pub water: f64,
}

impl DemoReport {
    /// Logs the report.
    pub fn log(&self) {
        info!("Finished at {} with {:.0} water in the soil", self.time, self.water);
        for (name, count) in &self.event_counts {
            info!("  {:>18}: {}", name, count);
        }
        for plant in &self.plants {
            info!(
                "  {} {:<10} stage {:<10} health {:.2} cells {}",
                plant.id,
                plant.type_id,
                plant.stage_name.as_deref().unwrap_or("-"),
                plant.health,
                plant.cells
            );
        }
        info!("Harvested {} in total", self.harvested);
    }
}

fn event_name(event: &SimEvent) -> &'static str {
    match event {
        SimEvent::NutrientsChanged { .. } => "nutrients_changed",
        SimEvent::SoilPlaced { .. } => "soil_placed",
        SimEvent::SoilRemoved { .. } => "soil_removed",
        SimEvent::PlantSeeded { .. } => "plant_seeded",
        SimEvent::StageAdvanced { .. } => "stage_advanced",
        SimEvent::PlantStunted { .. } => "plant_stunted",
        SimEvent::PlantHarvested { .. } => "plant_harvested",
        SimEvent::PlantRemoved { .. } => "plant_removed",
        SimEvent::ComponentGrown { .. } => "component_grown",
        SimEvent::LeafDisplaced { .. } => "leaf_displaced",
    }
}

/// Lays out a seven-hex bed, two levels deep, and plants it.
pub fn build_garden(terrain: &mut Terrain) {
    let center = HexCoord::new(0, 0);
    let mut bed = vec![center];
    bed.extend(center.neighbors());

    for hex in &bed {
        terrain.place_soil(hex.at_level(-1), Some(SoilType::Clay));
        terrain.place_soil(hex.at_level(0), Some(SoilType::Tilled));
        terrain.add_water(hex.at_level(-1), 120_000.0);
        terrain.add_water(hex.at_level(0), 90_000.0);
    }

    let crops = ["tomato", "wheat", "bean", "lettuce", "strawberry", "fern", "sapling"];
    for (hex, crop) in bed.iter().zip(crops) {
        let p = terrain.metrics().hex_to_world(*hex);
        match terrain.plant_seed(crop, Vec3::new(p.x, 0.0, p.y)) {
            Some(id) => debug!("Planted {} as {}", crop, id),
            None => warn!("Could not plant {} at {:?}", crop, hex),
        }
    }
}

/// Runs the demo garden.
pub fn run(config: SimConfig, options: DemoOptions) -> DemoReport {
    let mut terrain = Terrain::new(config);
    build_garden(&mut terrain);

    let mut report = DemoReport::default();
    let seconds_per_hour = terrain.config().clock.seconds_per_day / 24.0;
    let total = terrain.config().clock.seconds_per_day * options.days;
    let ticks = (total / options.tick).ceil() as usize;
    let mut since_watering = 0.0;

    for _ in 0..ticks {
        terrain.tick(options.tick);
        since_watering += options.tick;
        if since_watering >= seconds_per_hour {
            since_watering = 0.0;
            for hex in terrain.all_hexes() {
                if terrain.water().is_top_layer(hex) {
                    terrain.add_water(hex, options.hourly_watering);
                }
            }
            debug!("Watered the bed at {}", terrain.clock().format_time());
        }

        for event in terrain.drain_events() {
            *report.event_counts.entry(event_name(&event)).or_insert(0) += 1;
        }
    }

    // Pick whatever is ripe.
    let ripe: Vec<_> = terrain
        .all_plants()
        .into_iter()
        .filter(|p| p.accumulated_yield >= 1.0)
        .map(|p| p.id)
        .collect();
    for id in ripe {
        report.harvested += terrain.harvest_plant(id);
    }
    for event in terrain.drain_events() {
        *report.event_counts.entry(event_name(&event)).or_insert(0) += 1;
    }

    report.plants = terrain.all_plants();
    report.time = terrain.clock().format_time();
    report.water = terrain.water().total_water();
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_garden_runs() {
        let options = DemoOptions {
            tick: 2.0,
            days: 0.25,
            ..DemoOptions::default()
        };
        let report = run(SimConfig::default(), options);
        assert_eq!(report.event_counts.get("soil_placed"), Some(&14));
        assert!(report.event_counts.get("plant_seeded").copied().unwrap_or(0) >= 6);
        assert!(report.water > 0.0);
    }
}
