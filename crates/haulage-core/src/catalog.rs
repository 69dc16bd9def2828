//! Named products and recipes, frozen before a run starts.
//!
//! The builder hands out dense ids in registration order. `build()`
//! validates recipe references and produces an immutable [`Catalog`] whose
//! recipes are shared with production units through `Arc`.

use crate::fixed::Ticks;
use crate::id::{ProductId, RecipeId};
use crate::recipe::{Recipe, RecipeEntry};
use std::collections::HashMap;
use std::sync::Arc;

/// Builder for constructing an immutable [`Catalog`].
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    products: Vec<String>,
    product_name_to_id: HashMap<String, ProductId>,
    recipes: Vec<Recipe>,
    recipe_name_to_id: HashMap<String, RecipeId>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a product. Names must be unique.
    pub fn register_product(&mut self, name: &str) -> Result<ProductId, CatalogError> {
        if self.product_name_to_id.contains_key(name) {
            return Err(CatalogError::DuplicateName {
                kind: "product",
                name: name.to_string(),
            });
        }
        let id = ProductId(self.products.len() as u32);
        self.products.push(name.to_string());
        self.product_name_to_id.insert(name.to_string(), id);
        Ok(id)
    }

    /// Register a recipe. Names must be unique.
    pub fn register_recipe(
        &mut self,
        name: &str,
        inputs: Vec<RecipeEntry>,
        outputs: Vec<RecipeEntry>,
        duration: Ticks,
    ) -> Result<RecipeId, CatalogError> {
        if self.recipe_name_to_id.contains_key(name) {
            return Err(CatalogError::DuplicateName {
                kind: "recipe",
                name: name.to_string(),
            });
        }
        let id = RecipeId(self.recipes.len() as u32);
        self.recipes.push(Recipe::new(name, inputs, outputs, duration));
        self.recipe_name_to_id.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn product_id(&self, name: &str) -> Option<ProductId> {
        self.product_name_to_id.get(name).copied()
    }

    /// Validate and freeze.
    pub fn build(self) -> Result<Catalog, CatalogError> {
        for recipe in &self.recipes {
            for entry in recipe.inputs.iter().chain(recipe.outputs.iter()) {
                if entry.product.0 as usize >= self.products.len() {
                    return Err(CatalogError::InvalidProductRef {
                        recipe: recipe.name.clone(),
                        product: entry.product,
                    });
                }
                if entry.quantity == 0 {
                    return Err(CatalogError::ZeroQuantity {
                        recipe: recipe.name.clone(),
                        product: entry.product,
                    });
                }
            }
        }

        Ok(Catalog {
            products: self.products,
            product_name_to_id: self.product_name_to_id,
            recipes: self.recipes.into_iter().map(Arc::new).collect(),
            recipe_name_to_id: self.recipe_name_to_id,
        })
    }
}

/// Immutable catalog. Frozen after `build()`.
#[derive(Debug, Clone)]
pub struct Catalog {
    products: Vec<String>,
    product_name_to_id: HashMap<String, ProductId>,
    recipes: Vec<Arc<Recipe>>,
    recipe_name_to_id: HashMap<String, RecipeId>,
}

impl Catalog {
    pub fn product_id(&self, name: &str) -> Option<ProductId> {
        self.product_name_to_id.get(name).copied()
    }

    pub fn product_name(&self, id: ProductId) -> Option<&str> {
        self.products.get(id.0 as usize).map(String::as_str)
    }

    pub fn recipe_id(&self, name: &str) -> Option<RecipeId> {
        self.recipe_name_to_id.get(name).copied()
    }

    /// Shared handle to a recipe.
    pub fn recipe(&self, id: RecipeId) -> Option<Arc<Recipe>> {
        self.recipes.get(id.0 as usize).cloned()
    }

    pub fn recipe_by_name(&self, name: &str) -> Option<Arc<Recipe>> {
        self.recipe_id(name).and_then(|id| self.recipe(id))
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }

    pub fn recipe_count(&self) -> usize {
        self.recipes.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },
    #[error("recipe '{recipe}' references unknown product {product:?}")]
    InvalidProductRef { recipe: String, product: ProductId },
    #[error("recipe '{recipe}' has a zero quantity of {product:?}")]
    ZeroQuantity { recipe: String, product: ProductId },
}
