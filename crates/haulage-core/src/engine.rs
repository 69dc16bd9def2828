//! The simulation driver: owns every unit, the grid and the broker, and runs
//! the fixed phase order once per [`Simulation::step`].
//!
//! # Phases
//!
//! 1. **Demand** -- every plant posts or clears demand for its recipe
//!    inputs. Under the reserved policy, uncovered demand opens tasks.
//! 2. **Production** -- every plant advances its production cycle once.
//! 3. **Transport** -- every hauler advances its handling cycle once.
//! 4. **Bookkeeping** -- tick counter, state hash.
//!
//! Units are visited in slotmap order within each phase. Nothing runs in
//! parallel.

use crate::broker::{Broker, BrokerPolicy};
use crate::catalog::Catalog;
use crate::event::{Event, EventLog, EventKind};
use crate::fixed::Ticks;
use crate::id::{HaulerId, Occupant, PlantId};
use crate::production::{ProductionState, ProductionStep, ProductionUnit};
use crate::query::{HaulerSnapshot, PlantSnapshot};
use crate::sim::{SimConfig, SimState, StateHash};
use crate::transport::{Grid, HaulContext, HaulStep, TransportUnit};
use haulage_spatial::{GridPosition, SpatialError, WorldPosition};
use serde::{Deserialize, Serialize};
use slotmap::{Key, SecondaryMap, SlotMap};
use tracing::{debug, trace};

// ---------------------------------------------------------------------------
// Setup types
// ---------------------------------------------------------------------------

/// Where a new unit goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    Cell(GridPosition),
    /// Snapped to the cell containing this world position.
    World(WorldPosition),
}

/// Everything needed to place a production unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlantSpec {
    pub name: String,
    pub input_capacity: u32,
    pub output_capacity: u32,
    /// Recipe name in the catalog.
    pub recipe: Option<String>,
    pub placement: Placement,
}

impl PlantSpec {
    pub fn new(name: impl Into<String>, placement: Placement) -> Self {
        Self {
            name: name.into(),
            input_capacity: 0,
            output_capacity: 0,
            recipe: None,
            placement,
        }
    }

    pub fn capacities(mut self, input: u32, output: u32) -> Self {
        self.input_capacity = input;
        self.output_capacity = output;
        self
    }

    pub fn recipe(mut self, name: impl Into<String>) -> Self {
        self.recipe = Some(name.into());
        self
    }
}

/// Everything needed to place a transport unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaulerSpec {
    pub name: String,
    pub capacity: u32,
    pub placement: Placement,
}

impl HaulerSpec {
    pub fn new(name: impl Into<String>, capacity: u32, placement: Placement) -> Self {
        Self {
            name: name.into(),
            capacity,
            placement,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Grid(#[from] SpatialError),
    #[error("cannot place '{name}': {source}")]
    Placement { name: String, source: SpatialError },
    #[error("unknown recipe '{0}'")]
    UnknownRecipe(String),
    #[error("no plant with id {0:?}")]
    UnknownPlant(PlantId),
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Simulation {
    config: SimConfig,
    catalog: Catalog,
    sim_state: SimState,
    plants: SlotMap<PlantId, ProductionUnit>,
    haulers: SlotMap<HaulerId, TransportUnit>,
    grid: Grid,
    broker: Broker,
    events: EventLog,
    /// Plants whose last production step was blocked on output.
    blocked: SecondaryMap<PlantId, ()>,
    last_state_hash: u64,
}

impl Simulation {
    pub fn new(config: SimConfig, catalog: Catalog) -> Result<Self, SimError> {
        let grid = Grid::new(config.grid)?;
        Ok(Self {
            config,
            catalog,
            sim_state: SimState::default(),
            plants: SlotMap::with_key(),
            haulers: SlotMap::with_key(),
            grid,
            broker: Broker::new(config.broker_policy),
            events: EventLog::new(config.event_capacity),
            blocked: SecondaryMap::new(),
            last_state_hash: 0,
        })
    }

    // -----------------------------------------------------------------------
    // Unit management
    // -----------------------------------------------------------------------

    /// Place a production unit, claim its cell and register it as supplier
    /// of every output of its recipe.
    pub fn add_plant(&mut self, spec: PlantSpec) -> Result<PlantId, SimError> {
        let recipe = match &spec.recipe {
            Some(name) => Some(
                self.catalog
                    .recipe_by_name(name)
                    .ok_or_else(|| SimError::UnknownRecipe(name.clone()))?,
            ),
            None => None,
        };
        let cell = self.resolve(spec.placement);
        let id = self.plants.insert(ProductionUnit::new(
            spec.name.clone(),
            spec.input_capacity,
            spec.output_capacity,
            recipe.clone(),
            cell,
        ));
        if let Err(source) = self.grid.claim(cell, Occupant::Plant(id)) {
            self.plants.remove(id);
            return Err(SimError::Placement {
                name: spec.name,
                source,
            });
        }
        if let Some(recipe) = recipe {
            for product in recipe.output_products() {
                self.broker.register_supplier(id, product);
            }
        }
        debug!(target: "haulage::production", plant = %spec.name, %cell, "plant placed");
        Ok(id)
    }

    /// Place a transport unit and claim its cell.
    pub fn add_hauler(&mut self, spec: HaulerSpec) -> Result<HaulerId, SimError> {
        let cell = self.resolve(spec.placement);
        let id = self
            .haulers
            .insert(TransportUnit::new(spec.name.clone(), spec.capacity, cell));
        if let Err(source) = self.grid.claim(cell, Occupant::Hauler(id)) {
            self.haulers.remove(id);
            return Err(SimError::Placement {
                name: spec.name,
                source,
            });
        }
        debug!(target: "haulage::transport", hauler = %spec.name, %cell, "hauler placed");
        Ok(id)
    }

    /// Take a plant out of the world. Supplier registrations, demand and
    /// tasks naming it stay behind and fail to resolve from now on.
    pub fn remove_plant(&mut self, id: PlantId) -> Option<ProductionUnit> {
        let plant = self.plants.remove(id)?;
        if self.grid.occupant(plant.cell()) == Some(Occupant::Plant(id)) {
            self.grid.vacate(plant.cell());
        }
        self.blocked.remove(id);
        Some(plant)
    }

    /// Swap a plant's recipe. New outputs are registered as supply; old
    /// registrations stay.
    pub fn set_recipe(&mut self, id: PlantId, recipe: Option<&str>) -> Result<(), SimError> {
        let recipe = match recipe {
            Some(name) => Some(
                self.catalog
                    .recipe_by_name(name)
                    .ok_or_else(|| SimError::UnknownRecipe(name.to_string()))?,
            ),
            None => None,
        };
        let plant = self.plants.get_mut(id).ok_or(SimError::UnknownPlant(id))?;
        if let Some(recipe) = &recipe {
            for product in recipe.output_products() {
                self.broker.register_supplier(id, product);
            }
        }
        plant.set_recipe(recipe);
        Ok(())
    }

    fn resolve(&self, placement: Placement) -> GridPosition {
        match placement {
            Placement::Cell(cell) => cell,
            Placement::World(world) => self.grid.to_cell(world),
        }
    }

    // -----------------------------------------------------------------------
    // Stepping
    // -----------------------------------------------------------------------

    /// Run one tick through every phase.
    pub fn step(&mut self) {
        self.phase_demand();
        self.phase_production();
        self.phase_transport();
        self.phase_bookkeeping();
    }

    pub fn run(&mut self, ticks: Ticks) {
        for _ in 0..ticks {
            self.step();
        }
    }

    fn phase_demand(&mut self) {
        let tick = self.sim_state.tick;
        for (id, plant) in &self.plants {
            for (product, shortfall) in plant.shortfalls() {
                if shortfall > 0 {
                    let previous = self.broker.post_demand(id, product, shortfall);
                    if previous != Some(shortfall) {
                        self.events.emit(Event::DemandPosted {
                            plant: id,
                            product,
                            quantity: shortfall,
                            tick,
                        });
                    }
                } else if self.broker.clear_demand(id, product).is_some() {
                    self.events.emit(Event::DemandCleared {
                        plant: id,
                        product,
                        tick,
                    });
                    for task in self.broker.cancel_tasks_for(id, product) {
                        self.events.emit(Event::TaskCancelled { task, tick });
                    }
                }
            }
        }

        if self.broker.policy() == BrokerPolicy::Reserved {
            let plants = &self.plants;
            let opened = self
                .broker
                .open_tasks_for_demand(|id| plants.get(id).map(ProductionUnit::cell));
            for task in opened.into_iter().filter_map(|id| self.broker.task(id)) {
                self.events.emit(Event::TaskOpened {
                    task: task.id,
                    source: task.source,
                    target: task.target,
                    product: task.product,
                    quantity: task.requested,
                    tick,
                });
            }
        }
    }

    fn phase_production(&mut self) {
        let tick = self.sim_state.tick;
        for (id, plant) in &mut self.plants {
            let step = plant.advance();
            if step.state_changed() {
                trace!(
                    target: "haulage::production",
                    plant = %plant.name(),
                    from = ?step.before,
                    to = ?step.after,
                    "state change"
                );
            }
            record_production(&mut self.events, &mut self.blocked, id, &step, tick);
        }
    }

    fn phase_transport(&mut self) {
        let tick = self.sim_state.tick;
        let mut ctx = HaulContext {
            broker: &mut self.broker,
            grid: &mut self.grid,
            plants: &mut self.plants,
        };
        for (id, hauler) in &mut self.haulers {
            let step = hauler.advance(&mut ctx);
            record_haul(&mut self.events, id, hauler.cell(), step, tick);
        }
    }

    fn phase_bookkeeping(&mut self) {
        self.sim_state.tick += 1;
        self.last_state_hash = self.compute_state_hash();
    }

    /// Deterministic hash over tick, plants, haulers, demand and tasks.
    fn compute_state_hash(&self) -> u64 {
        let mut hasher = StateHash::new();
        hasher.write_u64(self.sim_state.tick);

        for (_, plant) in &self.plants {
            hasher.write_u8(plant.state().tag());
            hasher.write_u64(plant.remaining_ticks());
            hasher.write_i32(plant.cell().x);
            hasher.write_i32(plant.cell().y);
            for (product, qty) in plant.input().iter().chain(plant.output().iter()) {
                hasher.write_u32(product.0);
                hasher.write_u32(qty);
            }
            for entry in plant.buffer() {
                hasher.write_u32(entry.product.0);
                hasher.write_u32(entry.quantity);
            }
        }

        for (_, hauler) in &self.haulers {
            hasher.write_u8(hauler.state().tag());
            hasher.write_i32(hauler.cell().x);
            hasher.write_i32(hauler.cell().y);
            for (product, qty) in hauler.cargo().iter() {
                hasher.write_u32(product.0);
                hasher.write_u32(qty);
            }
        }

        for (consumer, product, qty) in self.broker.demands() {
            hasher.write_u64(consumer.data().as_ffi());
            hasher.write_u32(product.0);
            hasher.write_u32(qty);
        }
        for task in self.broker.tasks() {
            hasher.write_u64(task.id.0);
            hasher.write_u32(task.reserved);
            hasher.write_u32(task.delivered);
        }

        hasher.finish()
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn tick(&self) -> Ticks {
        self.sim_state.tick
    }

    /// Hash computed at the end of the last step; 0 before the first.
    pub fn state_hash(&self) -> u64 {
        self.last_state_hash
    }

    pub fn plant(&self, id: PlantId) -> Option<&ProductionUnit> {
        self.plants.get(id)
    }

    pub fn plant_mut(&mut self, id: PlantId) -> Option<&mut ProductionUnit> {
        self.plants.get_mut(id)
    }

    pub fn plants(&self) -> impl Iterator<Item = (PlantId, &ProductionUnit)> + '_ {
        self.plants.iter()
    }

    pub fn hauler(&self, id: HaulerId) -> Option<&TransportUnit> {
        self.haulers.get(id)
    }

    pub fn hauler_mut(&mut self, id: HaulerId) -> Option<&mut TransportUnit> {
        self.haulers.get_mut(id)
    }

    pub fn haulers(&self) -> impl Iterator<Item = (HaulerId, &TransportUnit)> + '_ {
        self.haulers.iter()
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    pub fn broker_mut(&mut self) -> &mut Broker {
        &mut self.broker
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn suppress_event(&mut self, kind: EventKind) {
        self.events.suppress(kind);
    }

    // -----------------------------------------------------------------------
    // Query API (read-only)
    // -----------------------------------------------------------------------

    pub fn snapshot_plant(&self, id: PlantId) -> Option<PlantSnapshot> {
        let plant = self.plants.get(id)?;
        Some(PlantSnapshot {
            id,
            name: plant.name().to_string(),
            state: plant.state(),
            remaining_ticks: plant.remaining_ticks(),
            cell: plant.cell(),
            input: plant.input().iter().collect(),
            input_capacity: plant.input().capacity(),
            output: plant.output().iter().collect(),
            output_capacity: plant.output().capacity(),
            blocked: plant.state() == ProductionState::Producing && self.blocked.contains_key(id),
        })
    }

    pub fn snapshot_all_plants(&self) -> Vec<PlantSnapshot> {
        self.plants
            .keys()
            .filter_map(|id| self.snapshot_plant(id))
            .collect()
    }

    pub fn snapshot_hauler(&self, id: HaulerId) -> Option<HaulerSnapshot> {
        let hauler = self.haulers.get(id)?;
        Some(HaulerSnapshot {
            id,
            name: hauler.name().to_string(),
            state: hauler.state(),
            cell: hauler.cell(),
            cargo: hauler.cargo().iter().collect(),
            capacity: hauler.cargo().capacity(),
            job: hauler.job().copied(),
            path_len: hauler.path().len(),
        })
    }

    pub fn snapshot_all_haulers(&self) -> Vec<HaulerSnapshot> {
        self.haulers
            .keys()
            .filter_map(|id| self.snapshot_hauler(id))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Event recording
// ---------------------------------------------------------------------------

fn record_production(
    events: &mut EventLog,
    blocked: &mut SecondaryMap<PlantId, ()>,
    plant: PlantId,
    step: &ProductionStep,
    tick: Ticks,
) {
    for entry in &step.consumed {
        events.emit(Event::ItemConsumed {
            plant,
            product: entry.product,
            quantity: entry.quantity,
            tick,
        });
    }
    if step.aborted {
        events.emit(Event::ProductionAborted { plant, tick });
    } else if step.after == ProductionState::Processing && step.before == ProductionState::Consuming {
        events.emit(Event::RecipeStarted { plant, tick });
    }

    if step.blocked {
        if blocked.insert(plant, ()).is_none() {
            events.emit(Event::OutputBlocked { plant, tick });
        }
    } else {
        blocked.remove(plant);
    }

    if step.before == ProductionState::Producing && step.after == ProductionState::Idle {
        events.emit(Event::RecipeCompleted { plant, tick });
        for entry in &step.produced {
            events.emit(Event::ItemProduced {
                plant,
                product: entry.product,
                quantity: entry.quantity,
                tick,
            });
        }
    }
}

fn record_haul(events: &mut EventLog, hauler: HaulerId, at: GridPosition, step: HaulStep, tick: Ticks) {
    let event = match step {
        HaulStep::Waiting | HaulStep::NoPath | HaulStep::Blocked { .. } => return,
        HaulStep::JobAccepted(job) => Event::JobAccepted {
            hauler,
            source: job.source,
            target: job.target,
            product: job.product,
            amount: job.amount,
            tick,
        },
        HaulStep::JobAbandoned { reason, .. } => Event::JobAbandoned {
            hauler,
            reason,
            tick,
        },
        HaulStep::Moved { from, to } => Event::HaulerMoved {
            hauler,
            from,
            to,
            tick,
        },
        HaulStep::Arrived { .. } => Event::HaulerArrived { hauler, at, tick },
        HaulStep::Loaded { product, amount } => Event::CargoLoaded {
            hauler,
            product,
            quantity: amount,
            tick,
        },
        HaulStep::Unloaded {
            target,
            product,
            amount,
        } => Event::CargoDelivered {
            hauler,
            target,
            product,
            quantity: amount,
            tick,
        },
    };
    events.emit(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn add_plant_claims_cell_and_registers_supply() {
        let mut sim = small_sim(crate::broker::BrokerPolicy::CostRanked);
        let mine = sim
            .add_plant(plant_at("mine", 2, 2).capacities(0, 50).recipe(MINE_ORE))
            .unwrap();
        let ore = sim.catalog().product_id(ORE).unwrap();

        assert_eq!(sim.grid().occupant(GridPosition::new(2, 2)), Some(Occupant::Plant(mine)));
        assert_eq!(sim.broker().suppliers_of(ore), &[mine]);
    }

    #[test]
    fn world_placement_snaps_to_cell() {
        let mut sim = small_sim(crate::broker::BrokerPolicy::CostRanked);
        let id = sim
            .add_hauler(HaulerSpec::new(
                "mule",
                10,
                Placement::World(WorldPosition::new(3, 5)),
            ))
            .unwrap();
        // cell_size 2
        assert_eq!(sim.hauler(id).unwrap().cell(), GridPosition::new(1, 2));
    }

    #[test]
    fn placing_on_occupied_cell_fails() {
        let mut sim = small_sim(crate::broker::BrokerPolicy::CostRanked);
        sim.add_plant(plant_at("a", 1, 1)).unwrap();
        let err = sim.add_plant(plant_at("b", 1, 1)).unwrap_err();
        assert!(matches!(err, SimError::Placement { ref name, .. } if name == "b"));
        assert_eq!(sim.plants().count(), 1);

        let err = sim
            .add_hauler(HaulerSpec::new("m", 5, Placement::Cell(GridPosition::new(99, 0))))
            .unwrap_err();
        assert!(matches!(
            err,
            SimError::Placement {
                source: SpatialError::OutOfBounds(_),
                ..
            }
        ));
        assert_eq!(sim.haulers().count(), 0);
    }

    #[test]
    fn unknown_recipe_is_rejected() {
        let mut sim = small_sim(crate::broker::BrokerPolicy::CostRanked);
        let err = sim
            .add_plant(plant_at("x", 0, 0).recipe("nope"))
            .unwrap_err();
        assert_eq!(err, SimError::UnknownRecipe("nope".into()));
        assert!(!sim.grid().is_occupied(GridPosition::new(0, 0)));
    }

    #[test]
    fn set_recipe_registers_new_outputs() {
        let mut sim = small_sim(crate::broker::BrokerPolicy::CostRanked);
        let p = sim.add_plant(plant_at("p", 0, 0).capacities(10, 10)).unwrap();
        let coal = sim.catalog().product_id(COAL).unwrap();
        assert!(sim.broker().suppliers_of(coal).is_empty());

        sim.set_recipe(p, Some(MINE_COAL)).unwrap();
        assert_eq!(sim.broker().suppliers_of(coal), &[p]);
        assert!(sim.set_recipe(p, Some("missing")).is_err());
    }

    #[test]
    fn demand_is_posted_then_cleared() {
        let mut sim = small_sim(crate::broker::BrokerPolicy::CostRanked);
        let mill = sim
            .add_plant(plant_at("mill", 5, 5).capacities(40, 40).recipe(SMELT))
            .unwrap();
        let ore = sim.catalog().product_id(ORE).unwrap();

        sim.step();
        assert_eq!(sim.broker().demand(mill, ore), Some(40));
        assert_eq!(sim.events().count(EventKind::DemandPosted), 2);

        assert!(sim.plant_mut(mill).unwrap().input_mut().add(ore, 20));
        sim.step();
        assert_eq!(sim.broker().demand(mill, ore), None);
        assert_eq!(sim.events().count(EventKind::DemandCleared), 1);
    }

    #[test]
    fn tick_and_hash_advance() {
        let (mut sim, _) = steel_line(crate::broker::BrokerPolicy::CostRanked, 1);
        assert_eq!(sim.tick(), 0);
        sim.step();
        let h1 = sim.state_hash();
        sim.run(5);
        assert_eq!(sim.tick(), 6);
        assert_ne!(sim.state_hash(), h1);
    }

    #[test]
    fn output_blocked_is_reported_once() {
        let mut sim = small_sim(crate::broker::BrokerPolicy::CostRanked);
        // Output capacity below one batch: blocked forever.
        let mine = sim
            .add_plant(plant_at("mine", 0, 0).capacities(0, 3).recipe(MINE_ORE))
            .unwrap();
        sim.run(20);
        assert_eq!(sim.events().count(EventKind::OutputBlocked), 1);
        assert!(sim.snapshot_plant(mine).unwrap().blocked);
    }

    #[test]
    fn removed_plant_frees_its_cell() {
        let mut sim = small_sim(crate::broker::BrokerPolicy::CostRanked);
        let p = sim.add_plant(plant_at("p", 3, 3)).unwrap();
        assert!(sim.remove_plant(p).is_some());
        assert!(!sim.grid().is_occupied(GridPosition::new(3, 3)));
        assert!(sim.plant(p).is_none());
        assert!(sim.remove_plant(p).is_none());
    }

    #[test]
    fn reserved_policy_opens_one_task_per_demand() {
        let (mut sim, line) = steel_line(crate::broker::BrokerPolicy::Reserved, 0);
        sim.step();
        let tasks: Vec<_> = sim.broker().tasks().collect();
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| t.target == line.mill));
        sim.step();
        assert_eq!(sim.broker().tasks().count(), 2);
        assert_eq!(sim.events().count(EventKind::TaskOpened), 2);
    }

    #[test]
    fn snapshots_cover_all_units() {
        let (sim, line) = steel_line(crate::broker::BrokerPolicy::CostRanked, 2);
        assert_eq!(sim.snapshot_all_plants().len(), 3);
        let haulers = sim.snapshot_all_haulers();
        assert_eq!(haulers.len(), 2);
        assert!(haulers.iter().all(|h| h.job.is_none() && h.cargo.is_empty()));
        let mill = sim.snapshot_plant(line.mill).unwrap();
        assert_eq!(mill.name, "mill");
        assert_eq!(mill.state, ProductionState::Idle);
    }

    #[test]
    fn huge_input_capacity_steps_without_panic() {
        let mut sim = small_sim(BrokerPolicy::CostRanked);
        sim.add_plant(plant_at("mine", 1, 1).capacities(0, 50).recipe(MINE_ORE))
            .unwrap();
        let mill = sim
            .add_plant(plant_at("mill", 8, 1).capacities(u32::MAX, 10).recipe(SMELT))
            .unwrap();
        sim.add_hauler(hauler_at("mule", 10, 4, 4)).unwrap();

        sim.run(30);
        assert_eq!(sim.tick(), 30);
        let ore = product(&sim, ORE);
        assert!(sim.broker().demand(mill, ore).is_some_and(|q| q > i32::MAX as u32));
        assert!(sim.events().count(EventKind::JobAccepted) > 0);
    }

    #[test]
    fn state_hash_covers_which_plant_posts_demand() {
        let build = |which: usize| {
            let mut sim = small_sim(BrokerPolicy::CostRanked);
            let a = sim.add_plant(plant_at("a", 1, 1).capacities(20, 10)).unwrap();
            let b = sim.add_plant(plant_at("b", 8, 8).capacities(20, 10)).unwrap();
            sim.set_recipe([a, b][which], Some(SMELT)).unwrap();
            sim.step();
            sim
        };
        let (first, second) = (build(0), build(1));
        assert_eq!(first.broker().demands().count(), 2);
        assert_eq!(second.broker().demands().count(), 2);
        assert_ne!(first.state_hash(), second.state_hash());
    }
}
