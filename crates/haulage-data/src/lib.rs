//! Scenario files for the haulage simulation.
//!
//! A scenario names products, recipes, plants and haulers, plus optional
//! grid and broker settings. [`load_scenario`] reads one from RON, TOML or
//! JSON (picked by file extension), resolves names and returns a
//! ready-to-run [`Scenario`].

pub mod loader;
pub mod schema;

pub use loader::{build_scenario, load_scenario, ScenarioError, Scenario};
