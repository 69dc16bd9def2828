use crate::id::ProductId;
use crate::recipe::RecipeEntry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A capacity-bounded store of product quantities owned by one unit.
///
/// Invariants: the sum of all held quantities never exceeds `capacity`, and
/// no product is ever stored with a quantity of zero. Every mutating call
/// either applies in full or leaves the ledger untouched (except
/// [`Ledger::consume`], which documents its own partial behaviour).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    stacks: BTreeMap<ProductId, u32>,
    capacity: u32,
}

impl Ledger {
    pub fn new(capacity: u32) -> Self {
        Self {
            stacks: BTreeMap::new(),
            capacity,
        }
    }

    /// Add `quantity` of `product`. Refused (returns false, no change) when the
    /// quantity is zero or the total would exceed capacity.
    #[must_use = "a refused add leaves the ledger unchanged"]
    pub fn add(&mut self, product: ProductId, quantity: u32) -> bool {
        if quantity == 0 || quantity > self.remaining_capacity() {
            return false;
        }
        *self.stacks.entry(product).or_insert(0) += quantity;
        true
    }

    /// Remove exactly `quantity` of `product`. Refused (returns false, no
    /// change) when the quantity is zero or more than is held.
    #[must_use = "a refused remove leaves the ledger unchanged"]
    pub fn remove(&mut self, product: ProductId, quantity: u32) -> bool {
        if quantity == 0 {
            return false;
        }
        let Some(held) = self.stacks.get_mut(&product) else {
            return false;
        };
        if *held < quantity {
            return false;
        }
        *held -= quantity;
        if *held == 0 {
            self.stacks.remove(&product);
        }
        true
    }

    /// Move `quantity` of `product` into `target`, all or nothing.
    ///
    /// If the target refuses the goods they are put back here and the call
    /// reports failure, so neither ledger changes.
    #[must_use = "a failed transfer leaves both ledgers unchanged"]
    pub fn transfer(&mut self, target: &mut Ledger, product: ProductId, quantity: u32) -> bool {
        if !self.remove(product, quantity) {
            return false;
        }
        if target.add(product, quantity) {
            return true;
        }
        // Capacity freed by the remove above, so this cannot be refused.
        let restored = self.add(product, quantity);
        debug_assert!(restored);
        false
    }

    /// True if every requirement is held in full.
    pub fn contains_all(&self, requirements: &[RecipeEntry]) -> bool {
        requirements
            .iter()
            .all(|r| self.amount(r.product) >= r.quantity)
    }

    /// Remove every requirement in order.
    ///
    /// Stops at the first removal that fails and returns its index in `Err`.
    /// Entries before that index stay removed; callers check
    /// [`Ledger::contains_all`] first in the same tick.
    pub fn consume(&mut self, requirements: &[RecipeEntry]) -> Result<(), usize> {
        for (i, r) in requirements.iter().enumerate() {
            if !self.remove(r.product, r.quantity) {
                return Err(i);
            }
        }
        Ok(())
    }

    /// True if all entries fit at once on top of what is already held.
    pub fn can_fit_all(&self, entries: &[RecipeEntry]) -> bool {
        let incoming: u64 = entries.iter().map(|e| e.quantity as u64).sum();
        incoming <= self.remaining_capacity() as u64
    }

    /// Held quantity of `product`; zero for products never seen.
    pub fn amount(&self, product: ProductId) -> u32 {
        self.stacks.get(&product).copied().unwrap_or(0)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Sum of held quantities across all products.
    pub fn total(&self) -> u32 {
        self.stacks.values().sum()
    }

    pub fn remaining_capacity(&self) -> u32 {
        self.capacity.saturating_sub(self.total())
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    /// Held (product, quantity) pairs in product order.
    pub fn iter(&self) -> impl Iterator<Item = (ProductId, u32)> + '_ {
        self.stacks.iter().map(|(&p, &q)| (p, q))
    }
}
