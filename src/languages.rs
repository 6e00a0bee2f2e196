//! Language configuration
//!
//! Each supported language is a small bundle of configuration consumed by
//! the generic Compiled/Interpreted build and execution managers: no
//! per-language subclassing, only different commands. Built-in languages
//! live in `files/languages.toml` (embedded at compile time) and register
//! themselves through the same public registry API plugins use.

use std::collections::HashMap;

use anyhow::Context;
use serde::Deserialize;

use crate::compiler::{CompiledBuildManager, InterpretedBuildManager};
use crate::executer::{CompiledExecutionManager, InterpretedExecutionManager};
use crate::registry::{self, Registration};

/// Whether a language needs a separate compile step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageKind {
    Compiled,
    Interpreted,
}

/// Configuration for a supported programming language
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    /// Name of the source file inside the build workspace (e.g. "main.py")
    pub source_file: String,
    /// Compile command (None for interpreted languages)
    pub compile_command: Option<Vec<String>>,
    /// Static syntax check command (e.g. `gcc -fsyntax-only main.c`,
    /// `python3 -m py_compile main.py`); None skips the check
    pub syntax_check_command: Option<Vec<String>>,
    /// Command that runs the built artifact, relative to the workspace
    pub run_command: Vec<String>,
}

impl LanguageConfig {
    pub fn kind(&self) -> LanguageKind {
        if self.compile_command.is_some() {
            LanguageKind::Compiled
        } else {
            LanguageKind::Interpreted
        }
    }
}

/// Raw TOML configuration for a language
#[derive(Debug, Deserialize)]
struct RawLanguageConfig {
    source_file: String,
    compile_command: Option<String>,
    syntax_check_command: Option<String>,
    run_command: String,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    extensions: Vec<String>,
}

/// Register the built-in languages from the embedded configuration table.
///
/// Idempotent: re-registration overwrites the previous entries.
pub fn register_builtin_languages() -> anyhow::Result<()> {
    let content = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/languages.toml"));
    register_languages_from_toml(content)
}

/// Register languages from a TOML table (the `LANGUAGES_CONFIG` override
/// path in the binary goes through here too).
pub fn register_languages_from_toml(content: &str) -> anyhow::Result<()> {
    let raw_configs: HashMap<String, RawLanguageConfig> =
        toml::from_str(content).context("failed to parse language configuration")?;

    for (name, raw) in raw_configs {
        let config = LanguageConfig {
            source_file: raw.source_file,
            compile_command: raw.compile_command.as_deref().map(into_command),
            syntax_check_command: raw.syntax_check_command.as_deref().map(into_command),
            run_command: into_command(&raw.run_command),
        };

        let registration = registration_for(&name, config, raw.aliases, raw.extensions);
        registry::register(registration);
    }
    Ok(())
}

/// Build a [`Registration`] wiring the generic managers for `config`.
pub fn registration_for(
    key: &str,
    config: LanguageConfig,
    aliases: Vec<String>,
    extensions: Vec<String>,
) -> Registration {
    let factories = match config.kind() {
        LanguageKind::Compiled => (
            registry::build_factory(|source, config| {
                Box::new(CompiledBuildManager::new(source, config))
            }),
            registry::exec_factory(|artifact, config| {
                Box::new(CompiledExecutionManager::new(artifact, config))
            }),
        ),
        LanguageKind::Interpreted => (
            registry::build_factory(|source, config| {
                Box::new(InterpretedBuildManager::new(source, config))
            }),
            registry::exec_factory(|artifact, config| {
                Box::new(InterpretedExecutionManager::new(artifact, config))
            }),
        ),
    };

    Registration {
        key: key.to_lowercase(),
        aliases,
        extensions,
        config,
        build_factory: factories.0,
        exec_factory: factories.1,
    }
}

fn into_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_compile_command() {
        let interpreted = LanguageConfig {
            source_file: "main.py".into(),
            compile_command: None,
            syntax_check_command: None,
            run_command: vec!["python3".into(), "main.py".into()],
        };
        assert_eq!(interpreted.kind(), LanguageKind::Interpreted);

        let compiled = LanguageConfig {
            compile_command: Some(vec!["gcc".into(), "main.c".into()]),
            source_file: "main.c".into(),
            syntax_check_command: None,
            run_command: vec!["./main".into()],
        };
        assert_eq!(compiled.kind(), LanguageKind::Compiled);
    }

    #[test]
    fn test_embedded_table_parses() {
        let content = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/languages.toml"));
        let raw: HashMap<String, RawLanguageConfig> = toml::from_str(content).unwrap();
        assert!(raw.contains_key("python"));
        assert!(raw.contains_key("c"));
        assert!(raw["python"].aliases.contains(&"py".to_string()));
    }

    #[test]
    fn test_into_command_splits_whitespace() {
        assert_eq!(
            into_command("gcc -o main main.c"),
            vec!["gcc", "-o", "main", "main.c"]
        );
    }
}
