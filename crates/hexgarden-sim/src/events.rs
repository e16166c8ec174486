//! Event bus for simulation notifications.
//!
//! Subsystems receive a [`Sender`] at construction and publish into it;
//! collaborators drain the bus once per frame.

use crossbeam_channel::{bounded, Receiver, Sender};
use hexgarden_common::{HexCoord3D, PlantId, SoilType, SubHexCoord3D};
use serde::{Deserialize, Serialize};

use crate::nutrients::NutrientLevels;

/// Events published by the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimEvent {
    /// Nutrient levels of a hex changed
    NutrientsChanged {
        /// Hex that changed
        coord: HexCoord3D,
        /// Levels after the change
        levels: NutrientLevels,
    },
    /// Soil was placed
    SoilPlaced {
        /// Hex that was filled
        coord: HexCoord3D,
        /// Soil type
        soil: SoilType,
    },
    /// Soil was removed
    SoilRemoved {
        /// Hex that was cleared
        coord: HexCoord3D,
    },
    /// A seed was planted
    PlantSeeded {
        /// New plant
        plant_id: PlantId,
        /// Plant type
        type_id: String,
    },
    /// A staged plant moved to its next stage
    StageAdvanced {
        /// Plant
        plant_id: PlantId,
        /// New stage index
        stage: usize,
    },
    /// A staged plant could not claim its next pattern
    PlantStunted {
        /// Plant
        plant_id: PlantId,
        /// Plants that hold the contested space
        blockers: Vec<PlantId>,
    },
    /// A plant was harvested
    PlantHarvested {
        /// Plant
        plant_id: PlantId,
        /// Yield handed out
        amount: u32,
    },
    /// A plant left the world (harvest, uproot or removal)
    PlantRemoved {
        /// Plant
        plant_id: PlantId,
    },
    /// An organic plant grew a new component
    ComponentGrown {
        /// Plant
        plant_id: PlantId,
        /// Where the component was placed
        position: SubHexCoord3D,
    },
    /// A growing stem pushed a leaf out of its way
    LeafDisplaced {
        /// Plant
        plant_id: PlantId,
        /// Address the leaf was pushed from
        from: SubHexCoord3D,
        /// New address, or `None` if the leaf was shed
        to: Option<SubHexCoord3D>,
    },
}

/// Event bus for broadcasting events to subscribers.
#[derive(Debug)]
pub struct EventBus {
    /// Sender for broadcasting events
    sender: Sender<SimEvent>,
    /// Receiver for collecting events
    receiver: Receiver<SimEvent>,
    /// Channel capacity
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventBus {
    /// Creates a new event bus with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Publishes an event to the bus.
    pub fn publish(&self, event: SimEvent) {
        publish(&self.sender, event);
    }

    /// Drains all pending events.
    pub fn drain(&self) -> Vec<SimEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Returns the number of pending events.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Returns the channel capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Creates a new sender handle for publishing events.
    #[must_use]
    pub fn sender(&self) -> Sender<SimEvent> {
        self.sender.clone()
    }

    /// Creates an extra receiver; each event goes to exactly one receiver.
    #[must_use]
    pub fn receiver(&self) -> Receiver<SimEvent> {
        self.receiver.clone()
    }
}

/// Non-blocking send; if the bus is full the event is dropped.
pub(crate) fn publish(sender: &Sender<SimEvent>, event: SimEvent) {
    let _ = sender.try_send(event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_and_drain() {
        let bus = EventBus::new(4);
        bus.publish(SimEvent::SoilRemoved {
            coord: HexCoord3D::new(0, 0, 0),
        });
        assert_eq!(bus.pending_count(), 1);
        let events = bus.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_full_bus_drops() {
        let bus = EventBus::new(1);
        let sender = bus.sender();
        for _ in 0..3 {
            publish(
                &sender,
                SimEvent::PlantRemoved {
                    plant_id: PlantId::new(),
                },
            );
        }
        assert_eq!(bus.drain().len(), 1);
        assert_eq!(bus.capacity(), 1);
    }
}
