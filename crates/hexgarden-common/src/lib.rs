//! # Hexgarden Common
//!
//! Common types shared by every Hexgarden subsystem:
//! - Hex, stacked hex and sub-hex coordinates with boundary-crossing resolution
//! - ID types (PlantId, ComponentId, GrowthPointId)
//! - Soil types and their physical constants
//! - Schema versions for snapshots
//! - Common error types

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod coords;
pub mod error;
pub mod ids;
pub mod soil;
pub mod version;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::coords::*;
    pub use crate::error::*;
    pub use crate::ids::*;
    pub use crate::soil::*;
    pub use crate::version::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plant_id_generation() {
        let id1 = PlantId::new();
        let id2 = PlantId::new();
        assert_ne!(id1, id2);
        assert!(id1.is_valid());
        assert!(!PlantId::NULL.is_valid());
    }

    #[test]
    fn test_ids_share_counter() {
        let plant = PlantId::new();
        let component = ComponentId::new();
        let point = GrowthPointId::new();
        assert!(plant.raw() < component.raw());
        assert!(component.raw() < point.raw());
    }

    #[test]
    fn test_version_compatibility() {
        let minor = SchemaVersion::new(1, 1, 0);
        let major = SchemaVersion::new(2, 0, 0);

        assert!(SchemaVersion::PLANT_SNAPSHOT.can_read(&minor));
        assert!(!SchemaVersion::PLANT_SNAPSHOT.can_read(&major));
        assert_eq!(major.to_string(), "2.0.0");
    }

    #[test]
    fn test_sub_hex_keys_from_world() {
        let metrics = HexMetrics::default();
        let hex = HexCoord3D::new(1, 1, 0);
        let center = metrics.hex3d_center(hex);
        let sub = metrics.world_to_sub_hex3d(center);
        assert_eq!(metrics.parent_hex3d(sub), hex);
    }
}
