use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Name of the sub-object owned by the repository stats ingestor.
pub const GITHUB_FIELD: &str = "github";

pub type PackageName = String;

/// Full record set, ordered by package name so serialized output is stable.
pub type PackageData = BTreeMap<PackageName, PackageRecord>;

/// Normalized repository stats per package, as written to `github-data`.
pub type GithubBatch = BTreeMap<PackageName, GithubStats>;

/// Logical entities persisted in the key-value store. Each one expands into
/// one or more physical keys through [`crate::KeyAliaser`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LogicalKey {
    PackageList,
    PackageData,
    Package(PackageName),
    RepoMappings,
    LastUpdated,
    GithubData,
    GithubLastUpdated,
}

impl LogicalKey {
    pub fn as_key(&self) -> String {
        match self {
            LogicalKey::PackageList => "package-list".into(),
            LogicalKey::PackageData => "package-data".into(),
            LogicalKey::Package(name) => format!("package-{name}"),
            LogicalKey::RepoMappings => "repo-mappings".into(),
            LogicalKey::LastUpdated => "last-updated".into(),
            LogicalKey::GithubData => "github-data".into(),
            LogicalKey::GithubLastUpdated => "github-last-updated".into(),
        }
    }
}

impl fmt::Display for LogicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_key())
    }
}

/// Repository statistics attached to a record under [`GITHUB_FIELD`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubStats {
    pub stars: u64,
    pub forks: u64,
    pub issues: u64,
    pub watchers: u64,
    #[serde(rename = "updatedAt", alias = "updated_at")]
    pub updated_at: DateTime<Utc>,
}

/// Merged metrics document for one package.
///
/// The registry score payload is opaque and kept as-is. The `github`
/// sub-object is owned by a different writer and only ever replaced whole.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageRecord(Map<String, Value>);

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("score payload must be a JSON object, got {0}")]
pub struct NotAnObject(&'static str);

impl PackageRecord {
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn github(&self) -> Option<&Value> {
        self.0.get(GITHUB_FIELD)
    }

    pub fn has_github(&self) -> bool {
        self.github().is_some_and(|v| !v.is_null())
    }

    /// Replaces the `github` sub-object, leaving every other field untouched.
    pub fn set_github(&mut self, github: Value) {
        self.0.insert(GITHUB_FIELD.to_string(), github);
    }

    pub fn take_github(&mut self) -> Option<Value> {
        self.0.remove(GITHUB_FIELD)
    }
}

impl TryFrom<Value> for PackageRecord {
    type Error = NotAnObject;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(PackageRecord(map)),
            Value::Null => Err(NotAnObject("null")),
            Value::Bool(_) => Err(NotAnObject("a boolean")),
            Value::Number(_) => Err(NotAnObject("a number")),
            Value::String(_) => Err(NotAnObject("a string")),
            Value::Array(_) => Err(NotAnObject("an array")),
        }
    }
}

impl From<PackageRecord> for Value {
    fn from(record: PackageRecord) -> Self {
        Value::Object(record.0)
    }
}

/// Ordered list of tracked package names. Duplicates are never introduced by
/// [`PackageList::add`], though a wholesale replacement may carry them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageList(Vec<PackageName>);

impl PackageList {
    pub fn new(packages: Vec<PackageName>) -> Self {
        PackageList(packages)
    }

    pub fn as_slice(&self) -> &[PackageName] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackageName> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Names in list order with later duplicates dropped.
    pub fn unique(&self) -> Vec<&PackageName> {
        let mut seen = HashSet::new();
        self.0.iter().filter(|p| seen.insert(p.as_str())).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|p| p == name)
    }

    /// Appends `name` unless already present. Returns whether it was added.
    pub fn add(&mut self, name: &str) -> bool {
        if self.contains(name) {
            return false;
        }
        self.0.push(name.to_string());
        true
    }

    /// Removes every occurrence of `name`. Returns whether anything was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|p| p != name);
        self.0.len() != before
    }
}

impl<S: Into<String>> FromIterator<S> for PackageList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        PackageList(iter.into_iter().map(Into::into).collect())
    }
}

/// Package name to `owner/repo` identifier. Packages without an entry are
/// skipped by the stats ingestor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoMappings(IndexMap<PackageName, String>);

impl RepoMappings {
    pub fn get(&self, package: &str) -> Option<&str> {
        self.0.get(package).map(String::as_str)
    }

    pub fn insert(&mut self, package: &str, repo: &str) {
        self.0.insert(package.to_string(), repo.to_string());
    }

    /// Merges `other` into this mapping; entries in `other` win.
    pub fn merge(&mut self, other: RepoMappings) {
        self.0.extend(other.0);
    }

    pub fn remove(&mut self, package: &str) -> bool {
        self.0.shift_remove(package).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PackageName, &String)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RepoMappings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        RepoMappings(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
