//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::broker::BrokerPolicy;
use crate::catalog::{Catalog, CatalogBuilder};
use crate::engine::{HaulerSpec, PlantSpec, Placement, Simulation};
use crate::fixed::Ticks;
use crate::id::{HaulerId, Occupant, PlantId, ProductId};
use crate::production::ProductionUnit;
use crate::recipe::RecipeEntry;
use crate::sim::SimConfig;
use crate::transport::TransportUnit;
use haulage_spatial::{GridConfig, GridPosition};
use std::collections::HashSet;

// ===========================================================================
// Catalog
// ===========================================================================

pub const ORE: &str = "ore";
pub const COAL: &str = "coal";
pub const STEEL: &str = "steel";

pub const MINE_ORE: &str = "mine_ore";
pub const MINE_COAL: &str = "mine_coal";
pub const SMELT: &str = "smelt";

/// Ore and coal mines (10 every 5 ticks) and a smelter
/// (4 ore + 2 coal -> 3 steel over 10 ticks).
pub fn steel_catalog() -> Catalog {
    let mut b = CatalogBuilder::new();
    let ore = b.register_product(ORE).unwrap();
    let coal = b.register_product(COAL).unwrap();
    let steel = b.register_product(STEEL).unwrap();
    b.register_recipe(MINE_ORE, vec![], vec![RecipeEntry::new(ore, 10)], 5)
        .unwrap();
    b.register_recipe(MINE_COAL, vec![], vec![RecipeEntry::new(coal, 10)], 5)
        .unwrap();
    b.register_recipe(
        SMELT,
        vec![RecipeEntry::new(ore, 4), RecipeEntry::new(coal, 2)],
        vec![RecipeEntry::new(steel, 3)],
        10,
    )
    .unwrap();
    b.build().unwrap()
}

pub fn product(sim: &Simulation, name: &str) -> ProductId {
    sim.catalog().product_id(name).unwrap()
}

// ===========================================================================
// Simulation builders
// ===========================================================================

/// 16x16 grid with 2-unit cells.
pub fn small_config(policy: BrokerPolicy) -> SimConfig {
    SimConfig {
        grid: GridConfig {
            width: 16,
            height: 16,
            cell_size: 2,
        },
        broker_policy: policy,
        event_capacity: 1024,
    }
}

pub fn small_sim(policy: BrokerPolicy) -> Simulation {
    Simulation::new(small_config(policy), steel_catalog()).unwrap()
}

pub fn plant_at(name: &str, x: i32, y: i32) -> PlantSpec {
    PlantSpec::new(name, Placement::Cell(GridPosition::new(x, y)))
}

pub fn hauler_at(name: &str, capacity: u32, x: i32, y: i32) -> HaulerSpec {
    HaulerSpec::new(name, capacity, Placement::Cell(GridPosition::new(x, y)))
}

/// Handles into a [`steel_line`].
#[derive(Debug, Clone)]
pub struct SteelLine {
    pub ore_mine: PlantId,
    pub coal_mine: PlantId,
    pub mill: PlantId,
    pub haulers: Vec<HaulerId>,
}

/// Two mines feeding one smelter, served by `haulers` haulers of capacity 10.
pub fn steel_line(policy: BrokerPolicy, haulers: usize) -> (Simulation, SteelLine) {
    let mut sim = small_sim(policy);
    let ore_mine = sim
        .add_plant(plant_at("ore_mine", 1, 1).capacities(0, 100).recipe(MINE_ORE))
        .unwrap();
    let coal_mine = sim
        .add_plant(plant_at("coal_mine", 1, 9).capacities(0, 100).recipe(MINE_COAL))
        .unwrap();
    let mill = sim
        .add_plant(plant_at("mill", 12, 5).capacities(40, 60).recipe(SMELT))
        .unwrap();
    let haulers = (0..haulers)
        .map(|i| {
            sim.add_hauler(hauler_at(&format!("mule_{i}"), 10, 6, 3 + i as i32))
                .unwrap()
        })
        .collect();
    let line = SteelLine {
        ore_mine,
        coal_mine,
        mill,
        haulers,
    };
    (sim, line)
}

// ===========================================================================
// Invariant checks
// ===========================================================================

/// Every ledger holds no more than its capacity.
pub fn assert_ledgers_within_capacity(sim: &Simulation) {
    for (_, plant) in sim.plants() {
        assert!(plant.input().total() <= plant.input().capacity(), "{}", plant.name());
        assert!(plant.output().total() <= plant.output().capacity(), "{}", plant.name());
    }
    for (_, hauler) in sim.haulers() {
        assert!(hauler.cargo().total() <= hauler.cargo().capacity(), "{}", hauler.name());
    }
}

/// Every unit stands on its own cell, and no cell holds two units.
pub fn assert_exclusive_occupancy(sim: &Simulation) {
    let mut seen = HashSet::new();
    for (id, plant) in sim.plants() {
        assert!(seen.insert(plant.cell()), "two units on {}", plant.cell());
        assert_eq!(sim.grid().occupant(plant.cell()), Some(Occupant::Plant(id)));
    }
    for (id, hauler) in sim.haulers() {
        assert!(seen.insert(hauler.cell()), "two units on {}", hauler.cell());
        assert_eq!(sim.grid().occupant(hauler.cell()), Some(Occupant::Hauler(id)));
    }
    assert_eq!(sim.grid().occupied_count(), seen.len());
    for (cell, occupant) in sim.grid().occupied_cells() {
        let at = match occupant {
            Occupant::Plant(id) => sim.plant(id).map(ProductionUnit::cell),
            Occupant::Hauler(id) => sim.hauler(id).map(TransportUnit::cell),
        };
        assert_eq!(at, Some(cell), "stale occupant on {cell}");
    }
}

/// Step until `done` holds, checking invariants every tick. Returns the tick
/// at which it first held.
pub fn run_until(
    sim: &mut Simulation,
    max_ticks: Ticks,
    mut done: impl FnMut(&Simulation) -> bool,
) -> Option<Ticks> {
    for _ in 0..max_ticks {
        sim.step();
        assert_ledgers_within_capacity(sim);
        assert_exclusive_occupancy(sim);
        if done(sim) {
            return Some(sim.tick());
        }
    }
    None
}
