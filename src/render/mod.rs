//! Target emitters
//!
//! Each backend turns one validated entity plus its compiled actions into a
//! map of relative file paths to file contents. Emitters are pure: they
//! never touch the filesystem, and regenerating from the same input yields
//! byte-identical output.

pub mod python;
pub mod rust;
pub mod sql;
pub mod typescript;

use crate::compile::CompiledAction;
use crate::spec::Entity;
use crate::validate::Ir;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Relative path → generated content
pub type FileMap = BTreeMap<String, String>;

/// The closed set of code-generation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Sql,
    Python,
    TypeScript,
    Rust,
}

impl Backend {
    pub const ALL: [Backend; 4] = [
        Backend::Sql,
        Backend::Python,
        Backend::TypeScript,
        Backend::Rust,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Sql => "sql",
            Backend::Python => "python",
            Backend::TypeScript => "typescript",
            Backend::Rust => "rust",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A feature the selected backend cannot represent. Emission fails rather
/// than silently dropping semantics.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{backend} emitter, {entity}{}: {detail}", .action.as_ref().map(|a| format!(" (action {})", a)).unwrap_or_default())]
pub struct EmissionError {
    pub backend: Backend,
    pub entity: String,
    pub action: Option<String>,
    pub detail: String,
}

impl EmissionError {
    pub(crate) fn new(backend: Backend, entity: &str, detail: String) -> Self {
        EmissionError {
            backend,
            entity: entity.to_string(),
            action: None,
            detail,
        }
    }

    pub(crate) fn with_action(mut self, action: &str) -> Self {
        self.action = Some(action.to_string());
        self
    }
}

/// Emit one entity for one backend. File names are namespaced by backend
/// and entity, so merging the maps of a whole batch never collides.
pub fn emit_entity(
    backend: Backend,
    ir: &Ir,
    entity: &Entity,
    actions: &[CompiledAction],
) -> Result<FileMap, EmissionError> {
    match backend {
        Backend::Sql => sql::emit_entity(ir, entity, actions),
        Backend::Python => python::emit_entity(ir, entity, actions),
        Backend::TypeScript => typescript::emit_entity(ir, entity, actions),
        Backend::Rust => rust::emit_entity(ir, entity, actions),
    }
}

/// Batch-level support files a backend needs exactly once, independent of
/// any entity (the SQL backend's shared composite result type)
pub fn emit_prelude(backend: Backend) -> FileMap {
    match backend {
        Backend::Sql => sql::prelude(),
        Backend::Python | Backend::TypeScript | Backend::Rust => FileMap::new(),
    }
}

/// Provenance line placed at the top of every generated file: the entity
/// content hash only, never a timestamp, so regeneration is idempotent
pub(crate) fn provenance(entity: &Entity) -> String {
    format!("generated for {}.{} ({})", entity.schema, entity.name, entity.hash())
}
