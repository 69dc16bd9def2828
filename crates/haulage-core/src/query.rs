//! Read-only snapshots of simulation state.
//!
//! All types are owned copies, so they can outlive the borrow of the
//! simulation they came from (renderers, debug overlays, test assertions).

use crate::broker::TransportJob;
use crate::fixed::Ticks;
use crate::id::{HaulerId, PlantId, ProductId};
use crate::production::ProductionState;
use crate::transport::HaulState;
use haulage_spatial::GridPosition;

/// A copy of one production unit's observable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlantSnapshot {
    pub id: PlantId,
    pub name: String,
    pub state: ProductionState,
    /// Ticks left in `Processing`.
    pub remaining_ticks: Ticks,
    pub cell: GridPosition,
    /// Input ledger contents in product order.
    pub input: Vec<(ProductId, u32)>,
    pub input_capacity: u32,
    /// Output ledger contents in product order.
    pub output: Vec<(ProductId, u32)>,
    pub output_capacity: u32,
    /// Waiting in `Producing` for output space.
    pub blocked: bool,
}

/// A copy of one transport unit's observable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaulerSnapshot {
    pub id: HaulerId,
    pub name: String,
    pub state: HaulState,
    pub cell: GridPosition,
    pub cargo: Vec<(ProductId, u32)>,
    pub capacity: u32,
    pub job: Option<TransportJob>,
    /// Cells left on the cached path.
    pub path_len: usize,
}
