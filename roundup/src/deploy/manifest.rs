//! Dependency manifest, lock file and frozen resolution.
//!
//! The manifest declares direct requirements; the lock pins the complete
//! package set. Resolution never re-resolves: it only checks that the lock
//! still describes the manifest and returns the pinned set.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;

use roundup_shared::{RoundupError, RoundupResult};
use serde::{Deserialize, Serialize};

/// Lock format version this build understands.
pub const LOCK_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Manifest {
    pub project: Project,
    /// Direct requirements, `name = "requirement"`.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Project {
    pub name: String,
    pub version: String,
}

impl Manifest {
    pub fn load(path: &Path) -> RoundupResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RoundupError::Config(format!("cannot read manifest {}: {e}", path.display()))
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> RoundupResult<Self> {
        Ok(toml::from_str(text)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Lockfile {
    pub version: u32,
    pub root: LockRoot,
    #[serde(default, rename = "package")]
    pub packages: Vec<LockedPackage>,
}

/// The project itself as recorded at lock time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LockRoot {
    pub name: String,
    pub version: String,
    /// Manifest requirements the lock was produced from.
    #[serde(default)]
    pub requires: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedPackage {
    pub name: String,
    pub version: String,
    /// Tree digest of the package, `sha256:<hex>`.
    pub checksum: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl LockedPackage {
    /// Directory name in the package store.
    pub fn store_name(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

impl Lockfile {
    pub fn load(path: &Path) -> RoundupResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RoundupError::Config(format!("cannot read lock file {}: {e}", path.display()))
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> RoundupResult<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// The pinned package set for a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub project: String,
    /// Packages to install, sorted by name. Never contains the project.
    pub packages: Vec<LockedPackage>,
}

fn mismatch(msg: impl Into<String>) -> RoundupError {
    RoundupError::ResolutionMismatch(msg.into())
}

/// Check that `lock` agrees with `manifest` and return the locked set.
///
/// Fails with [`RoundupError::ResolutionMismatch`] when the lock has an
/// unsupported version, was produced for another project or another set of
/// requirements, misses a referenced package, lists a package twice, or
/// carries a package nothing depends on.
pub fn resolve_frozen(manifest: &Manifest, lock: &Lockfile) -> RoundupResult<Resolution> {
    if lock.version != LOCK_VERSION {
        return Err(mismatch(format!(
            "unsupported lock version {} (expected {LOCK_VERSION})",
            lock.version
        )));
    }

    if lock.root.name != manifest.project.name {
        return Err(mismatch(format!(
            "lock file is for project '{}', manifest declares '{}'",
            lock.root.name, manifest.project.name
        )));
    }

    if lock.root.requires != manifest.dependencies {
        return Err(mismatch(describe_requirement_drift(
            &manifest.dependencies,
            &lock.root.requires,
        )));
    }

    let mut by_name: BTreeMap<&str, &LockedPackage> = BTreeMap::new();
    for package in &lock.packages {
        if package.name == lock.root.name {
            return Err(mismatch(format!(
                "project '{}' must not be locked as its own dependency",
                package.name
            )));
        }
        if by_name.insert(package.name.as_str(), package).is_some() {
            return Err(mismatch(format!("package '{}' is locked twice", package.name)));
        }
    }

    let mut reachable: BTreeSet<&str> = BTreeSet::new();
    let mut queue: VecDeque<(&str, &str)> = manifest
        .dependencies
        .keys()
        .map(|name| (name.as_str(), lock.root.name.as_str()))
        .collect();

    while let Some((name, required_by)) = queue.pop_front() {
        if !reachable.insert(name) {
            continue;
        }
        let package = by_name.get(name).ok_or_else(|| {
            mismatch(format!(
                "package '{name}' required by '{required_by}' is not in the lock file"
            ))
        })?;
        for dep in &package.dependencies {
            queue.push_back((dep.as_str(), package.name.as_str()));
        }
    }

    if let Some(stale) = by_name.keys().find(|name| !reachable.contains(*name)) {
        return Err(mismatch(format!(
            "locked package '{stale}' is not required by the project"
        )));
    }

    Ok(Resolution {
        project: lock.root.name.clone(),
        packages: by_name.into_values().cloned().collect(),
    })
}

fn describe_requirement_drift(
    manifest: &BTreeMap<String, String>,
    locked: &BTreeMap<String, String>,
) -> String {
    let mut drift = Vec::new();
    for (name, req) in manifest {
        match locked.get(name) {
            None => drift.push(format!("'{name}' added")),
            Some(old) if old != req => drift.push(format!("'{name}' changed {old} -> {req}")),
            Some(_) => {}
        }
    }
    for name in locked.keys().filter(|name| !manifest.contains_key(*name)) {
        drift.push(format!("'{name}' removed"));
    }
    format!("manifest requirements differ from lock: {}", drift.join(", "))
}
