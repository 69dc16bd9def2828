use crate::fixed::Ticks;
use crate::id::ProductId;
use serde::{Deserialize, Serialize};

/// One (product, quantity) line of a recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeEntry {
    pub product: ProductId,
    pub quantity: u32,
}

impl RecipeEntry {
    pub fn new(product: ProductId, quantity: u32) -> Self {
        Self { product, quantity }
    }
}

/// Consumes a fixed set of inputs and produces a fixed set of outputs after a
/// fixed number of ticks.
///
/// Recipes are shared between units behind an `Arc` and never change once
/// built. A recipe with no inputs is an extraction recipe (mines, pumps).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,
    pub inputs: Vec<RecipeEntry>,
    pub outputs: Vec<RecipeEntry>,
    /// Ticks spent in processing per cycle.
    pub duration: Ticks,
}

impl Recipe {
    pub fn new(
        name: impl Into<String>,
        inputs: Vec<RecipeEntry>,
        outputs: Vec<RecipeEntry>,
        duration: Ticks,
    ) -> Self {
        Self {
            name: name.into(),
            inputs,
            outputs,
            duration,
        }
    }

    /// A zero-input recipe yielding `quantity` of `product` every `duration` ticks.
    pub fn extraction(
        name: impl Into<String>,
        product: ProductId,
        quantity: u32,
        duration: Ticks,
    ) -> Self {
        Self::new(name, Vec::new(), vec![RecipeEntry::new(product, quantity)], duration)
    }

    pub fn is_extraction(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Every distinct product this recipe yields, in declaration order.
    pub fn output_products(&self) -> impl Iterator<Item = ProductId> + '_ {
        self.outputs
            .iter()
            .enumerate()
            .filter(|(i, o)| !self.outputs[..*i].iter().any(|p| p.product == o.product))
            .map(|(_, o)| o.product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_has_no_inputs() {
        let r = Recipe::extraction("mine_iron", ProductId(0), 10, 60);
        assert!(r.is_extraction());
        assert_eq!(r.outputs, vec![RecipeEntry::new(ProductId(0), 10)]);
        assert_eq!(r.duration, 60);
    }

    #[test]
    fn output_products_are_deduplicated() {
        let r = Recipe::new(
            "odd",
            vec![RecipeEntry::new(ProductId(0), 1)],
            vec![
                RecipeEntry::new(ProductId(2), 1),
                RecipeEntry::new(ProductId(3), 1),
                RecipeEntry::new(ProductId(2), 4),
            ],
            5,
        );
        assert!(!r.is_extraction());
        let products: Vec<_> = r.output_products().collect();
        assert_eq!(products, vec![ProductId(2), ProductId(3)]);
    }
}
