//! Supply/demand matching and transport job assignment.
//!
//! The broker keeps three registries:
//!
//! - **Suppliers**: which plants can produce which product. Append-only.
//! - **Demand**: at most one posting per (consumer, product). Reposting
//!   overwrites, clearing removes.
//! - **Tasks**: persisted transport work with a reservation counter.
//!
//! How haulers get work depends on the [`BrokerPolicy`] chosen when the
//! broker is built. [`BrokerPolicy::CostRanked`] scores every
//! (demand, supplier) pair and hands out the cheapest without reserving
//! anything, so two haulers asking in the same tick can get the same job.
//! [`BrokerPolicy::Reserved`] hands out persisted tasks first-found and
//! reserves capacity on them, but ignores distance.

use crate::fixed::{Fixed64, ratio};
use crate::id::{PlantId, ProductId, TaskId};
use haulage_spatial::GridPosition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::trace;

/// How transport work is handed out. Fixed for the lifetime of a broker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerPolicy {
    /// Stateless matching ranked by travel cost and demand size.
    #[default]
    CostRanked,
    /// Persisted tasks with capacity reservation, first-found.
    Reserved,
}

/// A unit of transport work handed to a hauler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportJob {
    /// Set when the job was drawn from a persisted task.
    pub task: Option<TaskId>,
    pub source: PlantId,
    pub target: PlantId,
    pub product: ProductId,
    pub amount: u32,
}

/// Persisted transport work under [`BrokerPolicy::Reserved`].
///
/// Invariant: `delivered + reserved <= requested`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportTask {
    pub id: TaskId,
    pub source: PlantId,
    pub target: PlantId,
    pub product: ProductId,
    pub requested: u32,
    pub reserved: u32,
    pub delivered: u32,
}

impl TransportTask {
    /// Quantity nobody has promised to carry yet.
    pub fn unreserved(&self) -> u32 {
        self.requested
            .saturating_sub(self.delivered)
            .saturating_sub(self.reserved)
    }
}

/// Ordering key for candidate jobs. Pairs with an unknown endpoint sort after
/// every pair that could be located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum JobRank {
    Located(Fixed64),
    Unlocated,
}

/// Weight applied to the demanded quantity when scoring a pairing.
pub fn demand_weight() -> Fixed64 {
    ratio(1, 10)
}

/// `travel - weight * quantity`, saturating at the bounds of [`Fixed64`].
fn score(travel: u64, quantity: u32, weight: Fixed64) -> Fixed64 {
    let pull = weight.saturating_mul(Fixed64::saturating_from_num(quantity));
    Fixed64::saturating_from_num(travel).saturating_sub(pull)
}

#[derive(Debug, Clone, Default)]
pub struct Broker {
    policy: BrokerPolicy,
    suppliers: BTreeMap<ProductId, Vec<PlantId>>,
    demands: BTreeMap<(PlantId, ProductId), u32>,
    tasks: BTreeMap<TaskId, TransportTask>,
    next_task: u64,
}

impl Broker {
    pub fn new(policy: BrokerPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    pub fn policy(&self) -> BrokerPolicy {
        self.policy
    }

    // -- Suppliers --

    /// Record that `supplier` can provide `product`. Idempotent.
    pub fn register_supplier(&mut self, supplier: PlantId, product: ProductId) {
        let list = self.suppliers.entry(product).or_default();
        if !list.contains(&supplier) {
            list.push(supplier);
        }
    }

    /// Suppliers of `product` in registration order.
    pub fn suppliers_of(&self, product: ProductId) -> &[PlantId] {
        self.suppliers.get(&product).map(Vec::as_slice).unwrap_or(&[])
    }

    // -- Demand --

    /// Post or overwrite the demand of `consumer` for `product`. Returns the
    /// previous posting. A zero quantity clears the posting.
    pub fn post_demand(
        &mut self,
        consumer: PlantId,
        product: ProductId,
        quantity: u32,
    ) -> Option<u32> {
        if quantity == 0 {
            return self.clear_demand(consumer, product);
        }
        self.demands.insert((consumer, product), quantity)
    }

    /// Remove a posting. Returns the quantity it held.
    pub fn clear_demand(&mut self, consumer: PlantId, product: ProductId) -> Option<u32> {
        self.demands.remove(&(consumer, product))
    }

    pub fn demand(&self, consumer: PlantId, product: ProductId) -> Option<u32> {
        self.demands.get(&(consumer, product)).copied()
    }

    /// All postings as (consumer, product, quantity).
    pub fn demands(&self) -> impl Iterator<Item = (PlantId, ProductId, u32)> + '_ {
        self.demands.iter().map(|(&(c, p), &q)| (c, p, q))
    }

    // -- Cost-ranked matching --

    /// Cheapest (demand, supplier) pairing for a hauler at `requester`.
    ///
    /// Score is `|requester, supplier| + |supplier, consumer| - k * demand`
    /// with Manhattan distances and `k = 0.1`. The lowest score wins; ties
    /// keep the first pairing in (consumer, product, supplier) order. Nothing
    /// is reserved.
    pub fn get_best_transport_job<F>(
        &self,
        requester: GridPosition,
        capacity: u32,
        locate: F,
    ) -> Option<TransportJob>
    where
        F: Fn(PlantId) -> Option<GridPosition>,
    {
        if capacity == 0 {
            return None;
        }
        let weight = demand_weight();
        let mut best: Option<(JobRank, TransportJob)> = None;

        for (&(consumer, product), &quantity) in &self.demands {
            let consumer_cell = locate(consumer);
            for &supplier in self.suppliers_of(product) {
                if supplier == consumer {
                    continue;
                }
                let rank = match (locate(supplier), consumer_cell) {
                    (Some(s), Some(c)) => {
                        let travel = u64::from(requester.manhattan_distance(&s))
                            + u64::from(s.manhattan_distance(&c));
                        JobRank::Located(score(travel, quantity, weight))
                    }
                    _ => JobRank::Unlocated,
                };
                if best.as_ref().is_none_or(|(b, _)| rank < *b) {
                    best = Some((
                        rank,
                        TransportJob {
                            task: None,
                            source: supplier,
                            target: consumer,
                            product,
                            amount: capacity.min(quantity),
                        },
                    ));
                }
            }
        }

        best.map(|(_, job)| job)
    }

    // -- Reserved tasks --

    /// Persist a new task and return its id.
    pub fn request_transport(
        &mut self,
        source: PlantId,
        target: PlantId,
        product: ProductId,
        quantity: u32,
    ) -> TaskId {
        let id = TaskId(self.next_task);
        self.next_task += 1;
        self.tasks.insert(
            id,
            TransportTask {
                id,
                source,
                target,
                product,
                requested: quantity,
                reserved: 0,
                delivered: 0,
            },
        );
        trace!(target: "haulage::broker", task = id.0, product = product.0, quantity, "task created");
        id
    }

    /// First task (in id order) that still has unreserved quantity.
    ///
    /// The capacity hint is accepted for symmetry with the cost-ranked path
    /// but does not filter; any contribution helps.
    pub fn get_available_task(&self, _capacity_hint: u32) -> Option<&TransportTask> {
        self.tasks.values().find(|t| t.unreserved() > 0)
    }

    /// Reserve up to `amount` on a task. Returns the quantity actually
    /// reserved, or `None` if the task is unknown or fully reserved.
    pub fn reserve_capacity(&mut self, task: TaskId, amount: u32) -> Option<u32> {
        let task = self.tasks.get_mut(&task)?;
        let reserved = amount.min(task.unreserved());
        if reserved == 0 {
            return None;
        }
        task.reserved += reserved;
        trace!(
            target: "haulage::broker",
            task = task.id.0,
            reserved,
            total_reserved = task.reserved,
            requested = task.requested,
            "capacity reserved"
        );
        Some(reserved)
    }

    /// Settle one hauler's share of a task: release its reservation and
    /// record what actually arrived. Fully delivered tasks are removed.
    pub fn complete_task_chunk(&mut self, task: TaskId, reserved: u32, delivered: u32) {
        let Some(entry) = self.tasks.get_mut(&task) else {
            return;
        };
        entry.reserved = entry.reserved.saturating_sub(reserved);
        entry.delivered = entry
            .delivered
            .saturating_add(delivered)
            .min(entry.requested);
        if entry.delivered >= entry.requested {
            self.tasks.remove(&task);
        }
    }

    pub fn remove_task(&mut self, task: TaskId) -> Option<TransportTask> {
        self.tasks.remove(&task)
    }

    /// Drop every task delivering `product` to `consumer`, typically once
    /// the consumer's demand is satisfied. In-flight chunks of a cancelled
    /// task still unload; settling them is a no-op.
    pub fn cancel_tasks_for(&mut self, consumer: PlantId, product: ProductId) -> Vec<TaskId> {
        let ids: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|t| t.target == consumer && t.product == product)
            .map(|t| t.id)
            .collect();
        for id in &ids {
            self.tasks.remove(id);
        }
        ids
    }

    pub fn task(&self, task: TaskId) -> Option<&TransportTask> {
        self.tasks.get(&task)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TransportTask> + '_ {
        self.tasks.values()
    }

    /// Open a task for every demand posting that has none yet, sourced from
    /// the registered supplier nearest the consumer. Returns the new ids.
    pub fn open_tasks_for_demand<F>(&mut self, locate: F) -> Vec<TaskId>
    where
        F: Fn(PlantId) -> Option<GridPosition>,
    {
        let mut wanted = Vec::new();
        for (&(consumer, product), &quantity) in &self.demands {
            let covered = self
                .tasks
                .values()
                .any(|t| t.target == consumer && t.product == product);
            if covered {
                continue;
            }
            let consumer_cell = locate(consumer);
            let nearest = self
                .suppliers_of(product)
                .iter()
                .copied()
                .filter(|s| *s != consumer)
                .min_by_key(|s| match (locate(*s), consumer_cell) {
                    (Some(a), Some(b)) => (0u8, a.manhattan_distance(&b)),
                    _ => (1u8, 0),
                });
            if let Some(source) = nearest {
                wanted.push((source, consumer, product, quantity));
            }
        }

        wanted
            .into_iter()
            .map(|(source, target, product, quantity)| {
                self.request_transport(source, target, product, quantity)
            })
            .collect()
    }

    // -- Dispatch --

    /// Hand a hauler at `requester` with `capacity` free space some work,
    /// using the active policy.
    pub fn assign<F>(
        &mut self,
        requester: GridPosition,
        capacity: u32,
        locate: F,
    ) -> Option<TransportJob>
    where
        F: Fn(PlantId) -> Option<GridPosition>,
    {
        match self.policy {
            BrokerPolicy::CostRanked => self.get_best_transport_job(requester, capacity, locate),
            BrokerPolicy::Reserved => {
                if capacity == 0 {
                    return None;
                }
                let task = self.get_available_task(capacity)?.clone();
                let amount = self.reserve_capacity(task.id, capacity)?;
                Some(TransportJob {
                    task: Some(task.id),
                    source: task.source,
                    target: task.target,
                    product: task.product,
                    amount,
                })
            }
        }
    }
}
