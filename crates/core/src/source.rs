//! Migration source: a directory of YAML manifests, one per migration.
//!
//! A manifest looks like:
//!
//! ```yaml
//! # 20260825093011_add_users_table.yaml
//! id: 20260825093011_add_users_table
//! prev_id: 20260820121530_init      # null (or omitted) for the first one
//! description: "add users table"
//! up:
//!   - CREATE TABLE users (id INT64 NOT NULL, name STRING(64)) PRIMARY KEY (id)
//! down:
//!   - DROP TABLE users
//! ```
//!
//! Loading returns the unordered set; ordering and its diagnostics belong to
//! [`MigrationChain::build`]. Generation appends to the chain: the new
//! skeleton's `prev_id` is the current tail, so a directory that cannot be
//! ordered cannot be extended either.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Deserialize;

use crate::chain::{ChainError, MigrationChain};
use crate::migration::{Migration, MigrationId, SchemaOp};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Cannot access `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse migration manifest `{path}`")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Duplicate migration id `{id}` (second definition in `{path}`)")]
    DuplicateId { id: MigrationId, path: PathBuf },

    #[error("Migration description must not be empty")]
    EmptyDescription,

    #[error("Existing migrations cannot be ordered: {0}")]
    Unordered(#[from] ChainError),
}

/// On-disk manifest shape. Statement lists must be present (possibly empty);
/// an empty list is a no-op direction.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    id: String,
    #[serde(default)]
    prev_id: Option<String>,
    #[serde(default)]
    description: Option<String>,
    up: Vec<String>,
    down: Vec<String>,
}

impl Manifest {
    fn into_migration(self) -> Migration {
        Migration {
            id: MigrationId::new(self.id),
            prev_id: self.prev_id.map(MigrationId::new),
            description: self.description,
            up: SchemaOp::from_statements(self.up),
            down: SchemaOp::from_statements(self.down),
        }
    }
}

/// Directory of migration manifests (`*.yaml` / `*.yml`).
#[derive(Debug, Clone)]
pub struct MigrationDir {
    path: PathBuf,
}

impl MigrationDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every manifest in the directory. Files are visited in path order
    /// so diagnostics are deterministic; the returned set is unordered.
    pub fn load(&self) -> Result<Vec<Migration>, SourceError> {
        let entries = fs::read_dir(&self.path).map_err(|source| SourceError::Io { path: self.path.clone(), source })?;

        let mut manifest_paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| SourceError::Io { path: self.path.clone(), source })?;
            let path = entry.path();
            if matches!(path.extension().and_then(|e| e.to_str()), Some("yaml" | "yml")) {
                manifest_paths.push(path);
            }
        }
        manifest_paths.sort();

        let mut seen: HashSet<MigrationId> = HashSet::with_capacity(manifest_paths.len());
        let mut migrations = Vec::with_capacity(manifest_paths.len());
        for path in manifest_paths {
            let raw = fs::read_to_string(&path).map_err(|source| SourceError::Io { path: path.clone(), source })?;
            let manifest: Manifest =
                serde_yaml::from_str(&raw).map_err(|source| SourceError::Parse { path: path.clone(), source })?;
            let migration = manifest.into_migration();
            if !seen.insert(migration.id.clone()) {
                return Err(SourceError::DuplicateId { id: migration.id, path });
            }
            migrations.push(migration);
        }

        tracing::debug!("Loaded {} migration manifest(s) from `{}`", migrations.len(), self.path.display());
        Ok(migrations)
    }

    /// Write a skeleton manifest whose predecessor is the current chain tail
    /// and return its path. The id is `<UTC %Y%m%d%H%M%S>_<slug>`, bumped
    /// with a numeric suffix on collision.
    pub fn generate(&self, description: &str) -> Result<PathBuf, SourceError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(SourceError::EmptyDescription);
        }

        fs::create_dir_all(&self.path).map_err(|source| SourceError::Io { path: self.path.clone(), source })?;
        let chain = MigrationChain::build(self.load()?)?;
        let prev_id = chain.last().map(|migration| migration.id.clone());

        let slug = slugify(description);
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        let mut id = format!("{stamp}_{slug}");
        let mut path = self.path.join(format!("{id}.yaml"));
        let mut bump = 1u32;
        while path.exists() || chain.position_of(&MigrationId::new(id.clone())).is_some() {
            id = format!("{stamp}_{slug}_{bump}");
            path = self.path.join(format!("{id}.yaml"));
            bump += 1;
        }

        // The tail id is hand-authorable text; everything echoed into the
        // skeleton is double-quoted.
        let prev_line = match &prev_id {
            Some(prev) => format!("prev_id: {}", yaml_quote(prev.as_str())),
            None => "prev_id: null".to_string(),
        };
        let body = format!(
            "# Migration manifest. Fill in the forward and backward statement lists.\n\
             id: {id}\n\
             {prev_line}\n\
             description: {description}\n\
             up: []\n\
             down: []\n",
            id = yaml_quote(&id),
            description = yaml_quote(description),
        );
        fs::write(&path, body).map_err(|source| SourceError::Io { path: path.clone(), source })?;

        tracing::info!("Generated migration skeleton `{}`", path.display());
        Ok(path)
    }
}

/// Lowercased ASCII alphanumerics, everything else collapsed to `_`.
fn slugify(description: &str) -> String {
    let mut slug = String::with_capacity(description.len());
    for ch in description.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('_') && !slug.is_empty() {
            slug.push('_');
        }
    }
    let slug = slug.trim_end_matches('_');
    if slug.is_empty() {
        "migration".to_string()
    } else {
        slug.to_string()
    }
}

/// Double-quoted YAML scalar.
fn yaml_quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n");
    format!("\"{escaped}\"")
}
