//! Mobile transport units (haulers) and their five-state handling cycle.
//!
//! ```text
//! Idle -> MovingToSource -> Loading -> MovingToTarget -> Unloading -> Idle
//! ```
//!
//! A hauler walks the occupancy grid one cell per tick along a cached
//! breadth-first path. It counts as arrived once it stands on or next to the
//! destination plant's cell, since plants occupy their own cell.
//!
//! Every reference to a plant is a slotmap key resolved on each access. A key
//! that no longer resolves drops the job and puts the hauler back to `Idle`.
//! Under [`BrokerPolicy::Reserved`](crate::broker::BrokerPolicy::Reserved)
//! the dropped job's reservation is never released.

use crate::broker::{Broker, TransportJob};
use crate::id::{Occupant, PlantId, ProductId};
use crate::ledger::Ledger;
use crate::production::ProductionUnit;
use haulage_spatial::{GridPosition, OccupancyGrid};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use std::collections::VecDeque;
use tracing::trace;

/// The occupancy grid shared by plants and haulers.
pub type Grid = OccupancyGrid<Occupant>;

// ---------------------------------------------------------------------------
// State and step outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HaulState {
    #[default]
    Idle,
    MovingToSource,
    Loading,
    MovingToTarget,
    Unloading,
}

impl HaulState {
    pub(crate) fn tag(self) -> u8 {
        match self {
            HaulState::Idle => 0,
            HaulState::MovingToSource => 1,
            HaulState::Loading => 2,
            HaulState::MovingToTarget => 3,
            HaulState::Unloading => 4,
        }
    }
}

/// Why a hauler gave up on a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbandonReason {
    /// The source plant no longer exists.
    SourceMissing,
    /// The target plant no longer exists.
    TargetMissing,
}

/// What a hauler did during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaulStep {
    /// Idle and the broker had nothing to hand out.
    Waiting,
    /// Took a job and set off for the source.
    JobAccepted(TransportJob),
    /// Dropped its job and went back to idle.
    JobAbandoned {
        job: TransportJob,
        reason: AbandonReason,
    },
    /// Stepped one cell.
    Moved {
        from: GridPosition,
        to: GridPosition,
    },
    /// The next cell was taken. The cached path is discarded.
    Blocked { at: GridPosition },
    /// No route to the destination this tick.
    NoPath,
    /// Reached the destination; `state` is the handling state entered.
    Arrived { state: HaulState },
    /// Finished loading. `amount` may be zero.
    Loaded { product: ProductId, amount: u32 },
    /// Finished unloading. `amount` may be zero.
    Unloaded {
        target: PlantId,
        product: ProductId,
        amount: u32,
    },
}

/// Everything a hauler touches while it advances.
pub struct HaulContext<'a> {
    pub broker: &'a mut Broker,
    pub grid: &'a mut Grid,
    pub plants: &'a mut SlotMap<PlantId, ProductionUnit>,
}

// ---------------------------------------------------------------------------
// TransportUnit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TransportUnit {
    name: String,
    cargo: Ledger,
    state: HaulState,
    job: Option<TransportJob>,
    destination: Option<PlantId>,
    path: VecDeque<GridPosition>,
    cell: GridPosition,
}

impl TransportUnit {
    pub fn new(name: impl Into<String>, capacity: u32, cell: GridPosition) -> Self {
        Self {
            name: name.into(),
            cargo: Ledger::new(capacity),
            state: HaulState::Idle,
            job: None,
            destination: None,
            path: VecDeque::new(),
            cell,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> HaulState {
        self.state
    }

    pub fn cargo(&self) -> &Ledger {
        &self.cargo
    }

    pub fn cargo_mut(&mut self) -> &mut Ledger {
        &mut self.cargo
    }

    pub fn job(&self) -> Option<&TransportJob> {
        self.job.as_ref()
    }

    pub fn destination(&self) -> Option<PlantId> {
        self.destination
    }

    /// Remaining cells of the cached path, next step first.
    pub fn path(&self) -> impl ExactSizeIterator<Item = &GridPosition> + '_ {
        self.path.iter()
    }

    pub fn cell(&self) -> GridPosition {
        self.cell
    }

    pub(crate) fn set_cell(&mut self, cell: GridPosition) {
        self.cell = cell;
    }

    /// Advance the handling cycle by one tick.
    pub fn advance(&mut self, ctx: &mut HaulContext<'_>) -> HaulStep {
        match self.state {
            HaulState::Idle => self.request_job(ctx),
            HaulState::MovingToSource | HaulState::MovingToTarget => self.move_step(ctx),
            HaulState::Loading => self.load(ctx),
            HaulState::Unloading => self.unload(ctx),
        }
    }

    fn request_job(&mut self, ctx: &mut HaulContext<'_>) -> HaulStep {
        let plants = &*ctx.plants;
        let Some(job) = ctx.broker.assign(self.cell, self.cargo.remaining_capacity(), |id| {
            plants.get(id).map(ProductionUnit::cell)
        }) else {
            return HaulStep::Waiting;
        };

        if !plants.contains_key(job.source) {
            return HaulStep::JobAbandoned {
                job,
                reason: AbandonReason::SourceMissing,
            };
        }

        trace!(
            target: "haulage::transport",
            hauler = %self.name,
            product = job.product.0,
            amount = job.amount,
            "job accepted"
        );
        self.job = Some(job);
        self.destination = Some(job.source);
        self.path.clear();
        self.state = HaulState::MovingToSource;
        HaulStep::JobAccepted(job)
    }

    fn move_step(&mut self, ctx: &mut HaulContext<'_>) -> HaulStep {
        let dest = self
            .destination
            .and_then(|id| ctx.plants.get(id))
            .map(ProductionUnit::cell);
        let Some(dest) = dest else {
            let reason = if self.state == HaulState::MovingToSource {
                AbandonReason::SourceMissing
            } else {
                AbandonReason::TargetMissing
            };
            return self.abandon(reason);
        };

        if self.cell == dest || self.cell.is_adjacent(&dest) {
            self.path.clear();
            self.state = if self.state == HaulState::MovingToSource {
                HaulState::Loading
            } else {
                HaulState::Unloading
            };
            return HaulStep::Arrived { state: self.state };
        }

        if self.path.is_empty() {
            match ctx.grid.find_path(self.cell, dest) {
                Some(cells) if cells.len() > 1 => self.path.extend(cells.into_iter().skip(1)),
                _ => return HaulStep::NoPath,
            }
        }

        let Some(&next) = self.path.front() else {
            return HaulStep::NoPath;
        };
        // Replan next tick instead of waiting on a cell that may never clear.
        if ctx.grid.is_occupied(next) {
            self.path.clear();
            return HaulStep::Blocked { at: next };
        }
        if ctx.grid.move_occupant(self.cell, next).is_err() {
            self.path.clear();
            return HaulStep::Blocked { at: next };
        }

        self.path.pop_front();
        let from = self.cell;
        self.cell = next;
        HaulStep::Moved { from, to: next }
    }

    fn load(&mut self, ctx: &mut HaulContext<'_>) -> HaulStep {
        let Some(job) = self.job else {
            self.reset();
            return HaulStep::Waiting;
        };
        let Some(source) = ctx.plants.get_mut(job.source) else {
            return self.abandon(AbandonReason::SourceMissing);
        };

        let available = source.output().amount(job.product);
        let amount = available
            .min(self.cargo.remaining_capacity())
            .min(job.amount);
        let moved = amount > 0 && source.output_mut().transfer(&mut self.cargo, job.product, amount);
        let loaded = if moved { amount } else { 0 };
        trace!(
            target: "haulage::transport",
            hauler = %self.name,
            product = job.product.0,
            loaded,
            "loaded"
        );

        if !ctx.plants.contains_key(job.target) {
            return self.abandon(AbandonReason::TargetMissing);
        }
        self.destination = Some(job.target);
        self.path.clear();
        self.state = HaulState::MovingToTarget;
        HaulStep::Loaded {
            product: job.product,
            amount: loaded,
        }
    }

    fn unload(&mut self, ctx: &mut HaulContext<'_>) -> HaulStep {
        let Some(job) = self.job else {
            self.reset();
            return HaulStep::Waiting;
        };
        let Some(target) = ctx.plants.get_mut(job.target) else {
            return self.abandon(AbandonReason::TargetMissing);
        };

        let held = self.cargo.amount(job.product);
        let moved = held > 0 && self.cargo.transfer(target.input_mut(), job.product, held);
        let delivered = if moved { held } else { 0 };

        if let Some(task) = job.task {
            ctx.broker.complete_task_chunk(task, job.amount, delivered);
        }
        trace!(
            target: "haulage::transport",
            hauler = %self.name,
            product = job.product.0,
            delivered,
            "unloaded"
        );

        self.reset();
        HaulStep::Unloaded {
            target: job.target,
            product: job.product,
            amount: delivered,
        }
    }

    fn abandon(&mut self, reason: AbandonReason) -> HaulStep {
        let job = self.job;
        self.reset();
        match job {
            Some(job) => {
                trace!(target: "haulage::transport", hauler = %self.name, ?reason, "job abandoned");
                HaulStep::JobAbandoned { job, reason }
            }
            None => HaulStep::Waiting,
        }
    }

    fn reset(&mut self) {
        self.state = HaulState::Idle;
        self.job = None;
        self.destination = None;
        self.path.clear();
    }
}
