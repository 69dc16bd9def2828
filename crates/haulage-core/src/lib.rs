//! Haulage Core -- a tick-driven supply chain simulation.
//!
//! Stationary production units turn inputs into outputs over time. Mobile
//! haulers walk an occupancy grid carrying goods between them. A broker
//! matches unmet demand against registered supply and hands out transport
//! work.
//!
//! # Tick Pipeline
//!
//! Each call to [`engine::Simulation::step`] advances the simulation by one
//! tick through the following phases:
//!
//! 1. **Demand** -- Plants post or clear demand for their recipe inputs.
//! 2. **Production** -- Plants advance their four-state production cycle.
//! 3. **Transport** -- Haulers take jobs, move, load and unload.
//! 4. **Bookkeeping** -- Increment the tick counter and compute the state hash.
//!
//! # Key Types
//!
//! - [`engine::Simulation`] -- Owns all units, the grid and the broker.
//! - [`ledger::Ledger`] -- Capacity-bounded product store.
//! - [`production::ProductionUnit`] -- Idle, Consuming, Processing, Producing.
//! - [`transport::TransportUnit`] -- Hauler with a cargo hold and a path.
//! - [`broker::Broker`] -- Supply, demand and transport tasks under one
//!   [`broker::BrokerPolicy`].
//! - [`catalog::Catalog`] -- Named products and recipes, frozen at startup.
//! - [`event::EventLog`] -- Ring buffer of typed simulation events.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic scoring.

pub mod broker;
pub mod catalog;
pub mod engine;
pub mod event;
pub mod fixed;
pub mod id;
pub mod ledger;
pub mod production;
pub mod query;
pub mod recipe;
pub mod sim;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use haulage_spatial as spatial;
