//! Entity tree + flat catalogs (spec §3).
//!
//! `Codebase` is the tree root; `Module` and `File` form the tree beneath it;
//! `Author` and `Commit` are flat catalogs keyed independently. Every entity
//! carries a free-form metadata bag, matching the "dynamic attribute bags"
//! design note (spec §9): a keyed store rather than ad hoc struct fields for
//! anything not promoted to a first-class column.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stable handle into the fact store. Distinct scopes never collide because
/// each carries its own namespace tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityId {
    Codebase,
    Module(String),
    File(String),
    Author(String),
    Commit(String),
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityId::Codebase => write!(f, "codebase"),
            EntityId::Module(n) => write!(f, "module:{n}"),
            EntityId::File(p) => write!(f, "file:{p}"),
            EntityId::Author(e) => write!(f, "author:{e}"),
            EntityId::Commit(h) => write!(f, "commit:{h}"),
        }
    }
}

/// Free-form metadata value. Anything not promoted to a typed signal lives
/// here (spec §9: "dynamic attribute bags ... prefer tagged-union values
/// over string-keyed dictionaries-of-anything").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    List(Vec<String>),
}

pub type Metadata = BTreeMap<String, MetaValue>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Codebase {
    pub root: String,
    pub meta: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub meta: Metadata,
}

/// Case-folding for email identity (spec §1 Non-goals: "cryptographic
/// identity of authors beyond case-folded email equality").
pub fn fold_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    /// Project-relative path, forward slashes (spec §3 invariant).
    pub rel_path: String,
    pub language: Option<String>,
    pub content_hash: String,
    pub size_bytes: u64,
    pub meta: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub email_folded: String,
    pub meta: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub short_hash: String,
    pub author_email_folded: String,
    pub timestamp: i64,
    pub message: String,
    pub meta: Metadata,
}

/// Normalize a path to the project-relative, forward-slash form required by
/// spec §6 ("Path normalization: relative to root, forward slashes").
pub fn normalize_rel_path(root: &std::path::Path, abs: &std::path::Path) -> String {
    let rel = abs.strip_prefix(root).unwrap_or(abs);
    rel.to_string_lossy().replace('\\', "/")
}
