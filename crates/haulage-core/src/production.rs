//! Stationary production units and their four-state production cycle.
//!
//! ```text
//! Idle -> Consuming -> Processing -> Producing -> Idle
//! ```
//!
//! Each call to [`ProductionUnit::advance`] runs exactly one transition
//! check. Consumed inputs sit in an internal buffer as in-flight output until
//! the output ledger has room for all of it at once; while it does not the
//! unit stays in `Producing` and retries every tick.

use crate::fixed::Ticks;
use crate::id::ProductId;
use crate::ledger::Ledger;
use crate::recipe::{Recipe, RecipeEntry};
use haulage_spatial::GridPosition;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductionState {
    #[default]
    Idle,
    Consuming,
    Processing,
    Producing,
}

impl ProductionState {
    pub(crate) fn tag(self) -> u8 {
        match self {
            ProductionState::Idle => 0,
            ProductionState::Consuming => 1,
            ProductionState::Processing => 2,
            ProductionState::Producing => 3,
        }
    }
}

/// The outcome of a single tick for a production unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductionStep {
    pub before: ProductionState,
    pub after: ProductionState,
    /// Inputs removed from the input ledger this tick.
    pub consumed: Vec<RecipeEntry>,
    /// Outputs added to the output ledger this tick.
    pub produced: Vec<RecipeEntry>,
    /// Consumption failed part way; removed inputs are lost.
    pub aborted: bool,
    /// Output ledger could not take the finished batch.
    pub blocked: bool,
}

impl ProductionStep {
    pub fn state_changed(&self) -> bool {
        self.before != self.after
    }
}

// ---------------------------------------------------------------------------
// ProductionUnit
// ---------------------------------------------------------------------------

/// A stationary unit that turns inputs into outputs with a [`Recipe`].
#[derive(Debug, Clone)]
pub struct ProductionUnit {
    name: String,
    input: Ledger,
    output: Ledger,
    buffer: Vec<RecipeEntry>,
    recipe: Option<Arc<Recipe>>,
    state: ProductionState,
    remaining: Ticks,
    cell: GridPosition,
}

impl ProductionUnit {
    pub fn new(
        name: impl Into<String>,
        input_capacity: u32,
        output_capacity: u32,
        recipe: Option<Arc<Recipe>>,
        cell: GridPosition,
    ) -> Self {
        Self {
            name: name.into(),
            input: Ledger::new(input_capacity),
            output: Ledger::new(output_capacity),
            buffer: Vec::new(),
            recipe,
            state: ProductionState::Idle,
            remaining: 0,
            cell,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ProductionState {
        self.state
    }

    pub fn recipe(&self) -> Option<&Arc<Recipe>> {
        self.recipe.as_ref()
    }

    /// Swap the active recipe. An in-flight batch still completes with the
    /// outputs it was started with.
    pub fn set_recipe(&mut self, recipe: Option<Arc<Recipe>>) {
        self.recipe = recipe;
    }

    pub fn input(&self) -> &Ledger {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut Ledger {
        &mut self.input
    }

    pub fn output(&self) -> &Ledger {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut Ledger {
        &mut self.output
    }

    /// In-flight outputs between consumption and completion.
    pub fn buffer(&self) -> &[RecipeEntry] {
        &self.buffer
    }

    /// Ticks left in `Processing`.
    pub fn remaining_ticks(&self) -> Ticks {
        self.remaining
    }

    pub fn cell(&self) -> GridPosition {
        self.cell
    }

    pub(crate) fn set_cell(&mut self, cell: GridPosition) {
        self.cell = cell;
    }

    /// Per-input shortfall against the low-stock threshold.
    ///
    /// An input held below half the input capacity reports `capacity - held`;
    /// anything at or above the threshold reports zero, meaning any
    /// outstanding demand is satisfied.
    pub fn shortfalls(&self) -> Vec<(ProductId, u32)> {
        let Some(recipe) = &self.recipe else {
            return Vec::new();
        };
        let capacity = self.input.capacity();
        let mut out: Vec<(ProductId, u32)> = Vec::with_capacity(recipe.inputs.len());
        for entry in &recipe.inputs {
            if out.iter().any(|(p, _)| *p == entry.product) {
                continue;
            }
            let held = self.input.amount(entry.product);
            let shortfall = if (held as u64) * 2 < capacity as u64 {
                capacity - held
            } else {
                0
            };
            out.push((entry.product, shortfall));
        }
        out
    }

    /// Advance the production cycle by one tick.
    pub fn advance(&mut self) -> ProductionStep {
        let mut step = ProductionStep {
            before: self.state,
            after: self.state,
            ..Default::default()
        };
        let Some(recipe) = self.recipe.clone() else {
            return step;
        };

        match self.state {
            ProductionState::Idle => {
                if self.input.contains_all(&recipe.inputs) {
                    self.state = ProductionState::Consuming;
                }
            }
            ProductionState::Consuming => match self.input.consume(&recipe.inputs) {
                Ok(()) => {
                    step.consumed = recipe.inputs.clone();
                    self.buffer.clear();
                    self.buffer.extend_from_slice(&recipe.outputs);
                    self.remaining = recipe.duration;
                    self.state = ProductionState::Processing;
                }
                Err(failed_at) => {
                    step.consumed = recipe.inputs[..failed_at].to_vec();
                    step.aborted = true;
                    self.state = ProductionState::Idle;
                }
            },
            ProductionState::Processing => {
                self.remaining = self.remaining.saturating_sub(1);
                if self.remaining == 0 {
                    self.state = ProductionState::Producing;
                }
            }
            ProductionState::Producing => {
                if self.output.can_fit_all(&self.buffer) {
                    for entry in &self.buffer {
                        // can_fit_all guarantees room for every entry.
                        let added = self.output.add(entry.product, entry.quantity);
                        debug_assert!(added || entry.quantity == 0);
                    }
                    step.produced = std::mem::take(&mut self.buffer);
                    self.state = ProductionState::Idle;
                } else {
                    step.blocked = true;
                }
            }
        }

        step.after = self.state;
        step
    }
}
