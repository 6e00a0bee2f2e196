//! Process-wide language registry
//!
//! Maps language keys, aliases and file extensions to the factory pair that
//! produces build and execution managers. Built-in languages register
//! through the same public [`register`] function plugins use; there is no
//! privileged initialization path. Lookups are read-locked so concurrent
//! resolution during registration is safe.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use tracing::debug;

use crate::compiler::BuildManager;
use crate::errors::JudgeError;
use crate::executer::{ExecutionConfig, ExecutionManager};
use crate::languages::LanguageConfig;

/// Produces a build manager for one submission's source text
pub type BuildFactory =
    Arc<dyn Fn(String, LanguageConfig) -> Box<dyn BuildManager> + Send + Sync>;

/// Produces an execution manager for one built artifact
pub type ExecFactory = Arc<
    dyn Fn(crate::compiler::BuildArtifact, ExecutionConfig) -> Box<dyn ExecutionManager>
        + Send
        + Sync,
>;

pub fn build_factory<F>(f: F) -> BuildFactory
where
    F: Fn(String, LanguageConfig) -> Box<dyn BuildManager> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn exec_factory<F>(f: F) -> ExecFactory
where
    F: Fn(crate::compiler::BuildArtifact, ExecutionConfig) -> Box<dyn ExecutionManager>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// One registered language
#[derive(Clone)]
pub struct Registration {
    pub key: String,
    pub aliases: Vec<String>,
    pub extensions: Vec<String>,
    pub config: LanguageConfig,
    pub build_factory: BuildFactory,
    pub exec_factory: ExecFactory,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("key", &self.key)
            .field("aliases", &self.aliases)
            .field("extensions", &self.extensions)
            .finish()
    }
}

#[derive(Default)]
struct RegistryInner {
    /// key and alias lookups, lowercased
    names: HashMap<String, Arc<Registration>>,
    /// extension lookups, without leading dot
    extensions: HashMap<String, Arc<Registration>>,
}

static REGISTRY: OnceLock<RwLock<RegistryInner>> = OnceLock::new();

fn registry() -> &'static RwLock<RegistryInner> {
    REGISTRY.get_or_init(|| RwLock::new(RegistryInner::default()))
}

/// Register a language, silently overwriting colliding keys, aliases and
/// extensions (plugin-friendly: the last registration wins).
pub fn register(registration: Registration) {
    let entry = Arc::new(registration);
    let mut inner = registry().write().expect("registry lock poisoned");
    insert(&mut inner, entry);
}

/// Register a language, failing with [`JudgeError::Conflict`] if any key,
/// alias or extension is already taken.
pub fn register_strict(registration: Registration) -> Result<(), JudgeError> {
    let entry = Arc::new(registration);
    let mut inner = registry().write().expect("registry lock poisoned");

    for name in names_of(&entry) {
        if inner.names.contains_key(&name) {
            return Err(JudgeError::Conflict(name));
        }
    }
    for ext in extensions_of(&entry) {
        if inner.extensions.contains_key(&ext) {
            return Err(JudgeError::Conflict(format!(".{}", ext)));
        }
    }

    insert(&mut inner, entry);
    Ok(())
}

/// Resolve an identifier: exact key, then alias, then file extension.
pub fn resolve(identifier: &str) -> Result<Arc<Registration>, JudgeError> {
    let inner = registry().read().expect("registry lock poisoned");
    let lowered = identifier.to_lowercase();

    if let Some(entry) = inner.names.get(&lowered) {
        return Ok(entry.clone());
    }
    let ext = lowered.trim_start_matches('.');
    if let Some(entry) = inner.extensions.get(ext) {
        return Ok(entry.clone());
    }
    Err(JudgeError::UnknownLanguage(identifier.to_string()))
}

/// Resolve a language from a source file name by its extension.
pub fn resolve_by_filename(path: &str) -> Result<Arc<Registration>, JudgeError> {
    let ext = std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| JudgeError::UnknownLanguage(path.to_string()))?;
    resolve(ext)
}

/// All registered language keys (no aliases), for diagnostics.
pub fn registered_languages() -> Vec<String> {
    let inner = registry().read().expect("registry lock poisoned");
    let mut keys: Vec<String> = inner
        .names
        .values()
        .map(|entry| entry.key.clone())
        .collect();
    keys.sort();
    keys.dedup();
    keys
}

fn insert(inner: &mut RegistryInner, entry: Arc<Registration>) {
    debug!("registering language {:?}", entry.key);
    for name in names_of(&entry) {
        inner.names.insert(name, entry.clone());
    }
    for ext in extensions_of(&entry) {
        inner.extensions.insert(ext, entry.clone());
    }
}

fn names_of(entry: &Registration) -> Vec<String> {
    std::iter::once(&entry.key)
        .chain(entry.aliases.iter())
        .map(|s| s.to_lowercase())
        .collect()
}

fn extensions_of(entry: &Registration) -> Vec<String> {
    entry
        .extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .collect()
}
