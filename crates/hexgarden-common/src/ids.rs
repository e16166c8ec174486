//! ID types for plants, plant components and growth points.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter shared by every id kind, so ids never collide across kinds.
static ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_raw() -> u64 {
    ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Unique identifier for a planted plant (staged or organic).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlantId(u64);

impl PlantId {
    /// Creates a new unique plant ID.
    #[must_use]
    pub fn new() -> Self {
        Self(next_raw())
    }

    /// Creates a plant ID from a raw value (for deserialization).
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Null/invalid plant ID.
    pub const NULL: Self = Self(0);

    /// Checks if this is a valid (non-null) plant ID.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl Default for PlantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plant#{}", self.0)
    }
}

/// Unique identifier for a component (root, stem, leaf) of an organic plant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(u64);

impl ComponentId {
    /// Creates a new unique component ID.
    #[must_use]
    pub fn new() -> Self {
        Self(next_raw())
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl Default for ComponentId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a growth point (meristem).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GrowthPointId(u64);

impl GrowthPointId {
    /// Creates a new unique growth point ID.
    #[must_use]
    pub fn new() -> Self {
        Self(next_raw())
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl Default for GrowthPointId {
    fn default() -> Self {
        Self::new()
    }
}
