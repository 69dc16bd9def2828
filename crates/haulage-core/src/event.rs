//! Typed simulation events recorded into a fixed-capacity ring buffer.
//!
//! Events are emitted by the simulation as each phase runs, in the order the
//! underlying actions happened. The [`EventLog`] keeps the most recent ones
//! and drops the oldest when full. Any kind can be suppressed, in which case
//! it is neither stored nor counted.
//!
//! Every recorded event is also forwarded to `tracing` at debug level under
//! the `haulage::events` target.

use crate::fixed::Ticks;
use crate::id::{HaulerId, PlantId, ProductId, TaskId};
use crate::transport::AbandonReason;
use haulage_spatial::GridPosition;
use tracing::debug;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A simulation event. All events carry the tick at which they occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // -- Demand --
    DemandPosted {
        plant: PlantId,
        product: ProductId,
        quantity: u32,
        tick: Ticks,
    },
    DemandCleared {
        plant: PlantId,
        product: ProductId,
        tick: Ticks,
    },
    TaskOpened {
        task: TaskId,
        source: PlantId,
        target: PlantId,
        product: ProductId,
        quantity: u32,
        tick: Ticks,
    },
    TaskCancelled {
        task: TaskId,
        tick: Ticks,
    },

    // -- Production --
    RecipeStarted {
        plant: PlantId,
        tick: Ticks,
    },
    ItemConsumed {
        plant: PlantId,
        product: ProductId,
        quantity: u32,
        tick: Ticks,
    },
    ProductionAborted {
        plant: PlantId,
        tick: Ticks,
    },
    RecipeCompleted {
        plant: PlantId,
        tick: Ticks,
    },
    ItemProduced {
        plant: PlantId,
        product: ProductId,
        quantity: u32,
        tick: Ticks,
    },
    OutputBlocked {
        plant: PlantId,
        tick: Ticks,
    },

    // -- Transport --
    JobAccepted {
        hauler: HaulerId,
        source: PlantId,
        target: PlantId,
        product: ProductId,
        amount: u32,
        tick: Ticks,
    },
    JobAbandoned {
        hauler: HaulerId,
        reason: AbandonReason,
        tick: Ticks,
    },
    HaulerMoved {
        hauler: HaulerId,
        from: GridPosition,
        to: GridPosition,
        tick: Ticks,
    },
    HaulerArrived {
        hauler: HaulerId,
        at: GridPosition,
        tick: Ticks,
    },
    CargoLoaded {
        hauler: HaulerId,
        product: ProductId,
        quantity: u32,
        tick: Ticks,
    },
    CargoDelivered {
        hauler: HaulerId,
        target: PlantId,
        product: ProductId,
        quantity: u32,
        tick: Ticks,
    },
}

/// Discriminant tag for event types, used for suppression and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DemandPosted,
    DemandCleared,
    TaskOpened,
    TaskCancelled,
    RecipeStarted,
    ItemConsumed,
    ProductionAborted,
    RecipeCompleted,
    ItemProduced,
    OutputBlocked,
    JobAccepted,
    JobAbandoned,
    HaulerMoved,
    HaulerArrived,
    CargoLoaded,
    CargoDelivered,
}

const EVENT_KIND_COUNT: usize = 16;

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::DemandPosted { .. } => EventKind::DemandPosted,
            Event::DemandCleared { .. } => EventKind::DemandCleared,
            Event::TaskOpened { .. } => EventKind::TaskOpened,
            Event::TaskCancelled { .. } => EventKind::TaskCancelled,
            Event::RecipeStarted { .. } => EventKind::RecipeStarted,
            Event::ItemConsumed { .. } => EventKind::ItemConsumed,
            Event::ProductionAborted { .. } => EventKind::ProductionAborted,
            Event::RecipeCompleted { .. } => EventKind::RecipeCompleted,
            Event::ItemProduced { .. } => EventKind::ItemProduced,
            Event::OutputBlocked { .. } => EventKind::OutputBlocked,
            Event::JobAccepted { .. } => EventKind::JobAccepted,
            Event::JobAbandoned { .. } => EventKind::JobAbandoned,
            Event::HaulerMoved { .. } => EventKind::HaulerMoved,
            Event::HaulerArrived { .. } => EventKind::HaulerArrived,
            Event::CargoLoaded { .. } => EventKind::CargoLoaded,
            Event::CargoDelivered { .. } => EventKind::CargoDelivered,
        }
    }

    pub fn tick(&self) -> Ticks {
        match *self {
            Event::DemandPosted { tick, .. }
            | Event::DemandCleared { tick, .. }
            | Event::TaskOpened { tick, .. }
            | Event::TaskCancelled { tick, .. }
            | Event::RecipeStarted { tick, .. }
            | Event::ItemConsumed { tick, .. }
            | Event::ProductionAborted { tick, .. }
            | Event::RecipeCompleted { tick, .. }
            | Event::ItemProduced { tick, .. }
            | Event::OutputBlocked { tick, .. }
            | Event::JobAccepted { tick, .. }
            | Event::JobAbandoned { tick, .. }
            | Event::HaulerMoved { tick, .. }
            | Event::HaulerArrived { tick, .. }
            | Event::CargoLoaded { tick, .. }
            | Event::CargoDelivered { tick, .. } => tick,
        }
    }
}

impl EventKind {
    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// A pre-allocated ring buffer of events with per-kind suppression.
#[derive(Debug)]
pub struct EventLog {
    events: Vec<Option<Event>>,
    /// Next write position; the oldest entry once the log is full.
    head: usize,
    len: usize,
    total_written: u64,
    counts: [u64; EVENT_KIND_COUNT],
    suppressed: [bool; EVENT_KIND_COUNT],
}

impl EventLog {
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            total_written: 0,
            counts: [0; EVENT_KIND_COUNT],
            suppressed: [false; EVENT_KIND_COUNT],
        }
    }

    /// Record an event unless its kind is suppressed.
    pub fn emit(&mut self, event: Event) {
        let kind = event.kind();
        if self.suppressed[kind.index()] {
            return;
        }
        debug!(target: "haulage::events", tick = event.tick(), ?event);
        self.counts[kind.index()] += 1;
        self.events[self.head] = Some(event);
        self.head = (self.head + 1) % self.capacity();
        if self.len < self.capacity() {
            self.len += 1;
        }
        self.total_written += 1;
    }

    /// Stop recording `kind`. Already stored events of that kind stay.
    pub fn suppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = true;
    }

    pub fn unsuppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = false;
    }

    pub fn is_suppressed(&self, kind: EventKind) -> bool {
        self.suppressed[kind.index()]
    }

    pub fn capacity(&self) -> usize {
        self.events.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Events written since creation, including ones since overwritten.
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    pub fn dropped_count(&self) -> u64 {
        self.total_written.saturating_sub(self.capacity() as u64)
    }

    /// Events of `kind` written since creation.
    pub fn count(&self, kind: EventKind) -> u64 {
        self.counts[kind.index()]
    }

    /// Stored events, oldest first.
    pub fn iter(&self) -> EventIter<'_> {
        let start = if self.len < self.capacity() {
            0
        } else {
            self.head
        };
        EventIter {
            log: self,
            index: start,
            remaining: self.len,
        }
    }

    /// Stored events of one kind, oldest first.
    pub fn of_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.kind() == kind)
    }

    /// Drop stored events. Counters are kept.
    pub fn clear(&mut self) {
        for slot in &mut self.events {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(4096)
    }
}

pub struct EventIter<'a> {
    log: &'a EventLog,
    index: usize,
    remaining: usize,
}

impl<'a> Iterator for EventIter<'a> {
    type Item = &'a Event;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let event = self.log.events[self.index].as_ref();
        self.index = (self.index + 1) % self.log.capacity();
        self.remaining -= 1;
        event
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for EventIter<'_> {}
