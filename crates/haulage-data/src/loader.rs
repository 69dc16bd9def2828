//! Resolution pipeline: reads a scenario file, resolves names, builds a
//! ready [`Simulation`].
//!
//! Format detection (RON/JSON/TOML) is by file extension. Resolution runs
//! in file order: products, recipes, plants, haulers. The first problem
//! found is returned; nothing is partially applied to the caller.

use crate::schema::{EntryData, PlacementData, ScenarioData};
use haulage_core::catalog::{CatalogBuilder, CatalogError};
use haulage_core::engine::{HaulerSpec, Placement, PlantSpec, SimError, Simulation};
use haulage_core::id::{HaulerId, PlantId};
use haulage_core::recipe::RecipeEntry;
use haulage_core::sim::SimConfig;
use haulage_spatial::{GridPosition, WorldPosition};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur while loading a scenario.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A name reference could not be resolved.
    #[error("unresolved {expected_kind} reference '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    #[error("duplicate {kind} name '{name}' in {file}")]
    DuplicateName {
        file: PathBuf,
        name: String,
        kind: &'static str,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Grid construction or unit placement failed.
    #[error(transparent)]
    Sim(#[from] SimError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported scenario file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, ScenarioError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(ScenarioError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// Deserialization
// ===========================================================================

/// Deserialize `content` in the given format. `file` is only used in errors.
pub fn deserialize_str<T: DeserializeOwned>(
    content: &str,
    format: Format,
    file: &Path,
) -> Result<T, ScenarioError> {
    let parse_error = |detail: String| ScenarioError::Parse {
        file: file.to_path_buf(),
        detail,
    };
    match format {
        Format::Ron => ron::from_str(content).map_err(|e| parse_error(e.to_string())),
        Format::Json => serde_json::from_str(content).map_err(|e| parse_error(e.to_string())),
        Format::Toml => toml::from_str(content).map_err(|e| parse_error(e.to_string())),
    }
}

/// Read a file and deserialize it according to its format (detected from extension).
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, ScenarioError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    deserialize_str(&content, format, path)
}

// ===========================================================================
// Name resolution helpers
// ===========================================================================

/// Look up a name in a map, returning an `UnresolvedRef` error if not found.
pub fn resolve_name<'a, V>(
    map: &'a BTreeMap<String, V>,
    name: &str,
    file: &Path,
    expected_kind: &'static str,
) -> Result<&'a V, ScenarioError> {
    map.get(name).ok_or_else(|| ScenarioError::UnresolvedRef {
        file: file.to_path_buf(),
        name: name.to_string(),
        expected_kind,
    })
}

/// Check whether a name already exists in a map, returning a `DuplicateName`
/// error if so.
pub fn check_duplicate<V>(
    map: &BTreeMap<String, V>,
    name: &str,
    file: &Path,
    kind: &'static str,
) -> Result<(), ScenarioError> {
    if map.contains_key(name) {
        return Err(ScenarioError::DuplicateName {
            file: file.to_path_buf(),
            name: name.to_string(),
            kind,
        });
    }
    Ok(())
}

// ===========================================================================
// Scenario
// ===========================================================================

/// A loaded scenario: the simulation plus the ids its units were given.
#[derive(Debug)]
pub struct Scenario {
    pub simulation: Simulation,
    pub plants: BTreeMap<String, PlantId>,
    pub haulers: BTreeMap<String, HaulerId>,
}

impl Scenario {
    pub fn plant(&self, name: &str) -> Option<PlantId> {
        self.plants.get(name).copied()
    }

    pub fn hauler(&self, name: &str) -> Option<HaulerId> {
        self.haulers.get(name).copied()
    }
}

/// Load and build a scenario from a RON, TOML or JSON file.
pub fn load_scenario(path: &Path) -> Result<Scenario, ScenarioError> {
    let data: ScenarioData = deserialize_file(path)?;
    build_scenario(data, path)
}

/// Resolve a parsed scenario into a [`Scenario`]. `file` is only used in errors.
pub fn build_scenario(data: ScenarioData, file: &Path) -> Result<Scenario, ScenarioError> {
    let mut products = BTreeMap::new();
    let mut builder = CatalogBuilder::new();
    for name in &data.products {
        check_duplicate(&products, name, file, "product")?;
        let id = builder.register_product(name)?;
        products.insert(name.clone(), id);
    }

    let mut recipes = BTreeMap::new();
    for recipe in &data.recipes {
        check_duplicate(&recipes, &recipe.name, file, "recipe")?;
        let resolve = |entries: &[EntryData]| -> Result<Vec<RecipeEntry>, ScenarioError> {
            entries
                .iter()
                .map(|e| {
                    let id = resolve_name(&products, e.product(), file, "product")?;
                    Ok(RecipeEntry::new(*id, e.quantity()))
                })
                .collect()
        };
        let inputs = resolve(&recipe.inputs)?;
        let outputs = resolve(&recipe.outputs)?;
        let id = builder.register_recipe(&recipe.name, inputs, outputs, recipe.duration)?;
        recipes.insert(recipe.name.clone(), id);
    }

    let config = SimConfig {
        grid: data.grid.into(),
        broker_policy: data.broker_policy,
        event_capacity: data.event_capacity,
    };
    let mut simulation = Simulation::new(config, builder.build()?)?;

    let mut plants = BTreeMap::new();
    for plant in &data.plants {
        check_duplicate(&plants, &plant.name, file, "plant")?;
        let mut spec = PlantSpec::new(&plant.name, placement(plant.at))
            .capacities(plant.input_capacity, plant.output_capacity);
        if let Some(recipe) = &plant.recipe {
            resolve_name(&recipes, recipe, file, "recipe")?;
            spec = spec.recipe(recipe);
        }
        let id = simulation.add_plant(spec)?;
        plants.insert(plant.name.clone(), id);
    }

    let mut haulers = BTreeMap::new();
    for hauler in &data.haulers {
        check_duplicate(&haulers, &hauler.name, file, "hauler")?;
        let spec = HaulerSpec::new(&hauler.name, hauler.capacity, placement(hauler.at));
        let id = simulation.add_hauler(spec)?;
        haulers.insert(hauler.name.clone(), id);
    }

    info!(
        target: "haulage::data",
        file = %file.display(),
        products = products.len(),
        recipes = recipes.len(),
        plants = plants.len(),
        haulers = haulers.len(),
        policy = ?data.broker_policy,
        "scenario loaded"
    );

    Ok(Scenario {
        simulation,
        plants,
        haulers,
    })
}

fn placement(at: PlacementData) -> Placement {
    match at {
        PlacementData::Cell(x, y) => Placement::Cell(GridPosition::new(x, y)),
        PlacementData::World(x, y) => Placement::World(WorldPosition::new(x, y)),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
