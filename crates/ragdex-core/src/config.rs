//! Layered configuration and path helpers.
//!
//! Uses Figment to merge built-in defaults, `ragdex.toml`, `ragdex.<env>.toml`
//! and `RAGDEX_*` env vars (`__` separates nested keys, e.g.
//! `RAGDEX_RETRIEVAL__SIMILARITY_TOP_K=4`).
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub max_tokens: usize,
    pub overlap_percent: f32,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { max_tokens: 256, overlap_percent: 0.2 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Fan-out of each summary level in a tree index.
    pub num_children: usize,
    pub max_keywords_per_chunk: usize,
    pub embed_dim: usize,
    pub embed_batch_size: usize,
    pub show_progress: bool,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self { num_children: 10, max_keywords_per_chunk: 10, embed_dim: 256, embed_batch_size: 64, show_progress: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub similarity_top_k: usize,
    pub child_branch_factor: usize,
    pub max_keywords_per_query: usize,
    pub num_chunks_per_query: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { similarity_top_k: 2, child_branch_factor: 1, max_keywords_per_query: 10, num_chunks_per_query: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub persist_dir: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self { persist_dir: "./storage".to_string() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub chunking: ChunkingSettings,
    pub index: IndexSettings,
    pub retrieval: RetrievalSettings,
    pub storage: StorageSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_tokens == 0 {
            return Err(Error::InvalidConfig("chunking.max_tokens must be > 0".into()));
        }
        if !(0.0..1.0).contains(&self.chunking.overlap_percent) {
            return Err(Error::InvalidConfig(format!(
                "chunking.overlap_percent must be in [0, 1), got {}",
                self.chunking.overlap_percent
            )));
        }
        if self.index.num_children < 2 {
            return Err(Error::InvalidConfig("index.num_children must be >= 2".into()));
        }
        if self.index.embed_dim == 0 {
            return Err(Error::InvalidConfig("index.embed_dim must be > 0".into()));
        }
        if self.retrieval.child_branch_factor == 0 {
            return Err(Error::InvalidConfig("retrieval.child_branch_factor must be >= 1".into()));
        }
        Ok(())
    }

    /// `storage.persist_dir` with `~` and env vars expanded.
    pub fn persist_dir(&self) -> PathBuf { expand_path(&self.storage.persist_dir) }
}

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::from_figment(Self::layered(Path::new("."), &env_name))
    }

    /// Same layering as [`Config::load`], reading TOML files from `dir`.
    pub fn load_from(dir: &Path, env_name: &str) -> Result<Self> {
        Self::from_figment(Self::layered(dir, env_name))
    }

    fn layered(dir: &Path, env_name: &str) -> Figment {
        let env_name = match env_name {
            "development" => "dev",
            "production" => "prod",
            "testing" => "test",
            other => other,
        };
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("ragdex.toml")))
            .merge(Toml::file(dir.join(format!("ragdex.{env_name}.toml"))))
            .merge(Env::prefixed("RAGDEX_").split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config = Self { figment };
        config.settings()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("failed to get '{key}': {e}")))
    }

    /// The full typed settings, validated.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(format!("failed to extract settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
