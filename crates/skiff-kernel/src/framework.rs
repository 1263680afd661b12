//! Framework bootstrap and project loading.
//!
//! A project is a directory anchored by a `skiff.toml` manifest. Bootstrap
//! reads the manifest through the module cache as `skiff:manifest` (so
//! pruning the cache forces a re-read from disk), seeds the
//! framework-internal `skiff:prelude` module, and hands back a fresh
//! [`Framework`] handle. The handle builds [`Project`]s on demand and
//! memoizes them per directory until [`Framework::clear_project_cache`] is
//! called.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use thiserror::Error;

use skiff_types::Value;

use crate::config::ReplConfig;
use crate::modules::{Module, ModuleCache, INTERNAL_PREFIX};

/// Manifest file name that anchors a project.
pub const MANIFEST_FILE: &str = "skiff.toml";

/// Cache key of the framework prelude module.
pub const PRELUDE_KEY: &str = "skiff:prelude";

/// Cache key the parsed manifest is registered under.
pub const MANIFEST_KEY: &str = "skiff:manifest";

/// Directory scanned for module files besides the project root.
const MODULES_DIR: &str = "modules";

/// Extension of skiff module files.
const MODULE_EXT: &str = "sk";

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Errors from bootstrapping the framework or loading a project.
#[derive(Debug, Error)]
pub enum FrameworkError {
    #[error(
        "no {MANIFEST_FILE} found at {0}; run skiff from within a project folder with a {MANIFEST_FILE} in it"
    )]
    ManifestMissing(PathBuf),

    #[error("invalid manifest {path}: {source}")]
    InvalidManifest {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("framework is not loaded")]
    NotLoaded,
}

/// The `[project]` table of the manifest.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProjectSection {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
}

/// Parsed `skiff.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub project: ProjectSection,
    /// Shell settings; see [`ReplConfig`].
    #[serde(default)]
    pub repl: ReplConfig,
}

impl Manifest {
    pub fn parse(path: &Path, source: &str) -> Result<Self, FrameworkError> {
        toml::from_str(source).map_err(|source| FrameworkError::InvalidManifest {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read and parse a manifest straight from disk, bypassing the cache.
    pub fn load(path: &Path) -> Result<Self, FrameworkError> {
        if !path.is_file() {
            return Err(FrameworkError::ManifestMissing(path.to_path_buf()));
        }
        let source = read(path)?;
        Self::parse(path, &source)
    }
}

/// The loaded framework root.
///
/// Every bootstrap produces a new handle with a new generation number.
/// Handles captured before a reload stay valid objects but are stale.
#[derive(Debug)]
pub struct Framework {
    manifest: Manifest,
    manifest_path: PathBuf,
    root: PathBuf,
    generation: u64,
    projects: Mutex<HashMap<PathBuf, Arc<Project>>>,
    loads: AtomicUsize,
}

impl Framework {
    /// Load the framework for the manifest at `manifest_path`.
    ///
    /// The manifest and the prelude are taken from `cache` when present and
    /// inserted into it otherwise.
    pub fn bootstrap(manifest_path: &Path, cache: &mut ModuleCache) -> Result<Arc<Framework>, FrameworkError> {
        if !manifest_path.is_file() {
            return Err(FrameworkError::ManifestMissing(manifest_path.to_path_buf()));
        }

        let manifest = match cache.get(MANIFEST_KEY) {
            Some(module) => Manifest::parse(manifest_path, &module.source)?,
            None => {
                let source = read(manifest_path)?;
                let manifest = Manifest::parse(manifest_path, &source)?;
                let exports = [
                    ("name".to_string(), opt_string(&manifest.project.name)),
                    ("version".to_string(), opt_string(&manifest.project.version)),
                ];
                cache.insert(
                    Module::new(MANIFEST_KEY, Some(manifest_path.to_path_buf()), source)
                        .with_exports(exports.into_iter().collect()),
                );
                manifest
            }
        };

        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        if !cache.contains(PRELUDE_KEY) {
            cache.insert(prelude_module(generation));
        }

        let root = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        tracing::debug!(manifest = %manifest_path.display(), generation, "framework bootstrapped");

        Ok(Arc::new(Framework {
            manifest,
            manifest_path: manifest_path.to_path_buf(),
            root,
            generation,
            projects: Mutex::new(HashMap::new()),
            loads: AtomicUsize::new(0),
        }))
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// How many projects this handle has built (cache misses).
    pub fn project_loads(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    /// The project rooted at `dir`, memoized per directory.
    pub fn load(&self, dir: &Path) -> Result<Arc<Project>, FrameworkError> {
        let mut projects = self.projects.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(project) = projects.get(dir) {
            return Ok(project.clone());
        }
        let project = Arc::new(Project::discover(&self.manifest, &self.manifest_path, dir)?);
        self.loads.fetch_add(1, Ordering::Relaxed);
        projects.insert(dir.to_path_buf(), project.clone());
        Ok(project)
    }

    /// Forget every memoized project.
    pub fn clear_project_cache(&self) {
        let mut projects = self.projects.lock().unwrap_or_else(|e| e.into_inner());
        tracing::debug!(count = projects.len(), "clearing project cache");
        projects.clear();
    }

    /// The `framework` value seen from skiff code.
    pub fn to_value(&self) -> Value {
        Value::record([
            ("name", Value::from("skiff")),
            ("version", Value::from(env!("CARGO_PKG_VERSION"))),
            ("generation", Value::Int(self.generation as i64)),
            ("manifest", Value::from(self.manifest_path.display().to_string())),
        ])
    }
}

/// The current project.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
    pub root: PathBuf,
    pub manifest_path: PathBuf,
    /// Module files found in the root and `modules/`, relative to the root.
    pub modules: Vec<PathBuf>,
}

impl Project {
    fn discover(manifest: &Manifest, manifest_path: &Path, dir: &Path) -> Result<Self, FrameworkError> {
        let name = manifest.project.name.clone().unwrap_or_else(|| {
            dir.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "skiff".to_string())
        });

        let mut modules = module_files(dir, dir)?;
        let modules_dir = dir.join(MODULES_DIR);
        if modules_dir.is_dir() {
            modules.extend(module_files(dir, &modules_dir)?);
        }
        modules.sort();

        Ok(Project {
            name,
            version: manifest.project.version.clone(),
            description: manifest.project.description.clone(),
            root: dir.to_path_buf(),
            manifest_path: manifest_path.to_path_buf(),
            modules,
        })
    }

    /// The `project` value seen from skiff code.
    pub fn to_value(&self) -> Value {
        Value::record([
            ("name", Value::from(self.name.as_str())),
            ("version", opt_string(&self.version)),
            ("description", opt_string(&self.description)),
            ("root", Value::from(self.root.display().to_string())),
            (
                "modules",
                Value::List(
                    self.modules
                        .iter()
                        .map(|m| Value::from(m.display().to_string()))
                        .collect(),
                ),
            ),
        ])
    }
}

/// Cache key for a file-backed module.
pub fn module_key(path: &Path) -> String {
    path.display().to_string()
}

fn prelude_module(generation: u64) -> Module {
    let exports = [
        ("name".to_string(), Value::from("skiff")),
        ("version".to_string(), Value::from(env!("CARGO_PKG_VERSION"))),
        ("generation".to_string(), Value::Int(generation as i64)),
        ("internal_prefix".to_string(), Value::from(INTERNAL_PREFIX)),
    ];
    Module::new(PRELUDE_KEY, None, "").with_exports(exports.into_iter().collect())
}

fn module_files(root: &Path, dir: &Path) -> Result<Vec<PathBuf>, FrameworkError> {
    let entries = std::fs::read_dir(dir).map_err(|source| FrameworkError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut found = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == MODULE_EXT) {
            let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
            found.push(relative);
        }
    }
    Ok(found)
}

fn read(path: &Path) -> Result<String, FrameworkError> {
    std::fs::read_to_string(path).map_err(|source| FrameworkError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn opt_string(value: &Option<String>) -> Value {
    value.as_deref().map(Value::from).unwrap_or(Value::Null)
}
