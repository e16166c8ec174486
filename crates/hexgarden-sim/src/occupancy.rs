//! Sub-hex occupancy shared by every plant.
//!
//! Each normalized [`SubHexCoord3D`] has at most one owner. Staged plants
//! claim whole stage patterns at once; organic plants claim one component
//! at a time.

use ahash::AHashMap;
use hexgarden_common::{ComponentId, HexCoord3D, HexMetrics, PlantId, SubHexCoord3D};
use serde::{Deserialize, Serialize};

/// What part of a plant fills a sub-hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    /// Below ground, draws water
    Root,
    /// Structural, above ground
    Stem,
    /// Catches light
    Leaf,
    /// Harvestable produce
    Fruit,
}

impl ComponentKind {
    /// Get the display name of this component kind.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Root => "Root",
            Self::Stem => "Stem",
            Self::Leaf => "Leaf",
            Self::Fruit => "Fruit",
        }
    }
}

/// Owner of one sub-hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupant {
    /// Owning plant
    pub plant: PlantId,
    /// Organic component, if the owner tracks components individually
    pub component: Option<ComponentId>,
    /// Kind of part filling the cell
    pub kind: ComponentKind,
}

impl Occupant {
    /// Occupant for a staged plant cell.
    #[must_use]
    pub const fn staged(plant: PlantId, kind: ComponentKind) -> Self {
        Self {
            plant,
            component: None,
            kind,
        }
    }

    /// Occupant for an organic component.
    #[must_use]
    pub const fn organic(plant: PlantId, component: ComponentId, kind: ComponentKind) -> Self {
        Self {
            plant,
            component: Some(component),
            kind,
        }
    }
}

/// Map from sub-hex to owner.
#[derive(Debug, Clone)]
pub struct OccupancyIndex {
    metrics: HexMetrics,
    cells: AHashMap<SubHexCoord3D, Occupant>,
    /// Owned sub-hexes per main hex
    per_hex: AHashMap<HexCoord3D, u32>,
}

impl OccupancyIndex {
    /// Create an empty index over the given grid.
    #[must_use]
    pub fn new(metrics: HexMetrics) -> Self {
        Self {
            metrics,
            cells: AHashMap::new(),
            per_hex: AHashMap::new(),
        }
    }

    fn count_in(&mut self, coord: SubHexCoord3D) {
        *self.per_hex.entry(self.metrics.parent_hex3d(coord)).or_insert(0) += 1;
    }

    fn count_out(&mut self, coord: SubHexCoord3D) {
        let hex = self.metrics.parent_hex3d(coord);
        if let Some(count) = self.per_hex.get_mut(&hex) {
            *count -= 1;
            if *count == 0 {
                self.per_hex.remove(&hex);
            }
        }
    }

    /// Owner of a sub-hex.
    #[must_use]
    pub fn owner(&self, coord: SubHexCoord3D) -> Option<&Occupant> {
        self.cells.get(&coord)
    }

    /// Whether nobody owns a sub-hex.
    #[must_use]
    pub fn is_free(&self, coord: SubHexCoord3D) -> bool {
        !self.cells.contains_key(&coord)
    }

    /// Claims a free sub-hex. Returns false if it is already owned.
    pub fn claim(&mut self, coord: SubHexCoord3D, occupant: Occupant) -> bool {
        if self.cells.contains_key(&coord) {
            return false;
        }
        self.cells.insert(coord, occupant);
        self.count_in(coord);
        true
    }

    /// Claims every cell or none.
    ///
    /// Cells already owned by `occupant`'s plant count as free. On conflict
    /// the distinct blocking plants are returned, sorted.
    pub fn try_claim_all(
        &mut self,
        cells: &[(SubHexCoord3D, ComponentKind)],
        plant: PlantId,
    ) -> Result<(), Vec<PlantId>> {
        let mut blockers: Vec<PlantId> = cells
            .iter()
            .filter_map(|(coord, _)| self.cells.get(coord))
            .map(|o| o.plant)
            .filter(|owner| *owner != plant)
            .collect();
        if !blockers.is_empty() {
            blockers.sort_unstable();
            blockers.dedup();
            return Err(blockers);
        }
        for &(coord, kind) in cells {
            if self.cells.insert(coord, Occupant::staged(plant, kind)).is_none() {
                self.count_in(coord);
            }
        }
        Ok(())
    }

    /// Releases a sub-hex. Returns the previous owner.
    pub fn release(&mut self, coord: SubHexCoord3D) -> Option<Occupant> {
        let previous = self.cells.remove(&coord)?;
        self.count_out(coord);
        Some(previous)
    }

    /// Releases every cell a plant owns. Returns how many were freed.
    pub fn release_plant(&mut self, plant: PlantId) -> usize {
        let owned: Vec<SubHexCoord3D> = self
            .cells
            .iter()
            .filter(|(_, o)| o.plant == plant)
            .map(|(c, _)| *c)
            .collect();
        for coord in &owned {
            self.release(*coord);
        }
        owned.len()
    }

    /// Every cell a plant owns, sorted.
    #[must_use]
    pub fn cells_of(&self, plant: PlantId) -> Vec<(SubHexCoord3D, ComponentKind)> {
        let mut out: Vec<_> = self
            .cells
            .iter()
            .filter(|(_, o)| o.plant == plant)
            .map(|(c, o)| (*c, o.kind))
            .collect();
        out.sort_unstable_by_key(|(c, _)| *c);
        out
    }

    /// Whether any sub-hex inside a main hex is owned.
    #[must_use]
    pub fn any_in_hex(&self, hex: HexCoord3D) -> bool {
        self.per_hex.contains_key(&hex)
    }

    /// Number of owned sub-hexes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether nothing is owned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
