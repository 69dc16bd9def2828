//! Serde structs for scenario files.
//!
//! These define the on-disk format for products, recipes, plants and
//! haulers. They are deserialized from RON, JSON or TOML and then resolved
//! into simulation types by the loader. Cross references are by name.

use haulage_core::broker::BrokerPolicy;
use haulage_spatial::GridConfig;
use serde::Deserialize;

// ===========================================================================
// Scenario
// ===========================================================================

/// A whole scenario file.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioData {
    #[serde(default)]
    pub grid: GridData,
    #[serde(default)]
    pub broker_policy: BrokerPolicy,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    pub products: Vec<String>,
    #[serde(default)]
    pub recipes: Vec<RecipeData>,
    #[serde(default)]
    pub plants: Vec<PlantData>,
    #[serde(default)]
    pub haulers: Vec<HaulerData>,
}

fn default_event_capacity() -> usize {
    4096
}

/// Grid dimensions. Any field left out takes the engine default.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct GridData {
    pub width: u32,
    pub height: u32,
    pub cell_size: u32,
}

impl Default for GridData {
    fn default() -> Self {
        let config = GridConfig::default();
        Self {
            width: config.width,
            height: config.height,
            cell_size: config.cell_size,
        }
    }
}

impl From<GridData> for GridConfig {
    fn from(data: GridData) -> Self {
        GridConfig {
            width: data.width,
            height: data.height,
            cell_size: data.cell_size,
        }
    }
}

// ===========================================================================
// Recipes
// ===========================================================================

/// A recipe entry, in short tuple form or with named fields.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EntryData {
    /// `("iron_ore", 1000)`
    Short(String, u32),
    Full { product: String, quantity: u32 },
}

impl EntryData {
    pub fn product(&self) -> &str {
        match self {
            EntryData::Short(product, _) | EntryData::Full { product, .. } => product,
        }
    }

    pub fn quantity(&self) -> u32 {
        match self {
            EntryData::Short(_, quantity) | EntryData::Full { quantity, .. } => *quantity,
        }
    }
}

/// A recipe definition. Extraction recipes leave `inputs` empty.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeData {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<EntryData>,
    pub outputs: Vec<EntryData>,
    pub duration: u64,
}

// ===========================================================================
// Units
// ===========================================================================

/// Where a unit stands: a grid cell, or a world position that gets snapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementData {
    Cell(i32, i32),
    World(i32, i32),
}

/// A production unit. Miners are plants whose recipe has no inputs.
#[derive(Debug, Clone, Deserialize)]
pub struct PlantData {
    pub name: String,
    #[serde(default)]
    pub input_capacity: u32,
    #[serde(default)]
    pub output_capacity: u32,
    #[serde(default)]
    pub recipe: Option<String>,
    pub at: PlacementData,
}

/// A transport unit.
#[derive(Debug, Clone, Deserialize)]
pub struct HaulerData {
    pub name: String,
    pub capacity: u32,
    pub at: PlacementData,
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipe_data_from_ron() {
        let ron = r#"
            (
                name: "steel",
                inputs: [("iron_ore", 1000), ("coal", 500)],
                outputs: [("steel", 800)],
                duration: 100,
            )
        "#;
        let recipe: RecipeData = ron::from_str(ron).unwrap();
        assert_eq!(recipe.inputs.len(), 2);
        assert_eq!(recipe.inputs[0], EntryData::Short("iron_ore".into(), 1000));
        assert_eq!(recipe.inputs[1].product(), "coal");
        assert_eq!(recipe.inputs[1].quantity(), 500);
        assert_eq!(recipe.duration, 100);
    }

    #[test]
    fn extraction_recipe_defaults_to_no_inputs() {
        let ron = r#"(name: "mine", outputs: [("coal", 5)], duration: 60)"#;
        let recipe: RecipeData = ron::from_str(ron).unwrap();
        assert!(recipe.inputs.is_empty());
    }

    #[test]
    fn plant_data_from_ron() {
        let ron = r#"
            (
                name: "SteelMill",
                input_capacity: 5000,
                output_capacity: 5000,
                recipe: Some("steel"),
                at: world(600, 400),
            )
        "#;
        let plant: PlantData = ron::from_str(ron).unwrap();
        assert_eq!(plant.recipe.as_deref(), Some("steel"));
        assert_eq!(plant.at, PlacementData::World(600, 400));
    }

    #[test]
    fn plant_data_defaults() {
        let ron = r#"(name: "Crate", at: cell(3, 4))"#;
        let plant: PlantData = ron::from_str(ron).unwrap();
        assert_eq!(plant.input_capacity, 0);
        assert_eq!(plant.output_capacity, 0);
        assert!(plant.recipe.is_none());
        assert_eq!(plant.at, PlacementData::Cell(3, 4));
    }

    #[test]
    fn scenario_data_from_json() {
        let json = r#"{
            "grid": { "width": 8, "height": 8 },
            "broker_policy": "reserved",
            "products": ["ore"],
            "haulers": [{ "name": "Mule", "capacity": 20, "at": { "cell": [1, 1] } }]
        }"#;
        let data: ScenarioData = serde_json::from_str(json).unwrap();
        assert_eq!(data.grid.width, 8);
        assert_eq!(data.grid.cell_size, GridConfig::default().cell_size);
        assert_eq!(data.broker_policy, BrokerPolicy::Reserved);
        assert_eq!(data.event_capacity, 4096);
        assert_eq!(data.haulers[0].at, PlacementData::Cell(1, 1));
        assert!(data.recipes.is_empty());
    }

    #[test]
    fn scenario_data_from_toml() {
        let toml_str = r#"
            products = ["ore", "ingot"]
            event_capacity = 64

            [grid]
            width = 12
            height = 10
            cell_size = 16

            [[recipes]]
            name = "smelt"
            inputs = [["ore", 2]]
            outputs = [{ product = "ingot", quantity = 1 }]
            duration = 4

            [[plants]]
            name = "Smelter"
            input_capacity = 10
            output_capacity = 10
            recipe = "smelt"
            at = { world = [100, 40] }
        "#;
        let data: ScenarioData = toml::from_str(toml_str).unwrap();
        assert_eq!(data.broker_policy, BrokerPolicy::CostRanked);
        assert_eq!(data.event_capacity, 64);
        assert_eq!(GridConfig::from(data.grid).cell_size, 16);
        assert_eq!(data.recipes[0].inputs[0], EntryData::Short("ore".into(), 2));
        assert_eq!(data.recipes[0].outputs[0].product(), "ingot");
        assert_eq!(data.plants[0].at, PlacementData::World(100, 40));
    }

    #[test]
    fn missing_placement_is_a_parse_error() {
        let ron = r#"(name: "Mule", capacity: 10)"#;
        assert!(ron::from_str::<HaulerData>(ron).is_err());
    }
}
