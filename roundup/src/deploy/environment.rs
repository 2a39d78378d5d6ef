//! Stage 1: install a frozen package set into an isolated environment.
//!
//! Layout of an installed environment:
//!
//! ```text
//! <env>/
//!   bin/<tool>              linked from lib/<pkg>/bin/, executable
//!   lib/<pkg>/...           verbatim copy of the store entry
//!   lib/<pkg>/RECORD        only when pre-compilation is enabled
//!   roundup-env.json        install record with the tree digest
//! ```
//!
//! Installation happens in `<env>.partial` and is renamed into place only
//! after every package is installed, so a failed install leaves nothing.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use roundup_shared::constants::env_files;
use roundup_shared::{RoundupError, RoundupResult};
use serde::{Deserialize, Serialize};

use super::manifest::{LockedPackage, Resolution};
use super::tree::{
    copy_tree, file_sha256, files, remove_if_exists, set_executable, staging_path, tree_digest,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
    pub checksum: String,
}

/// Contents of `roundup-env.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRecord {
    pub project: String,
    pub packages: Vec<InstalledPackage>,
    /// Tree digest of the environment, excluding this record.
    pub digest: String,
    pub precompiled: bool,
    pub installed_at: DateTime<Utc>,
}

/// An installed environment directory.
#[derive(Debug, Clone)]
pub struct Environment {
    root: PathBuf,
    record: InstallRecord,
}

impl Environment {
    /// Open an environment by reading its install record.
    pub fn open(root: &Path) -> RoundupResult<Self> {
        let record_path = root.join(env_files::INSTALL_RECORD);
        let text = fs::read_to_string(&record_path).map_err(|e| {
            RoundupError::NotFound(format!(
                "install record {}: {e}",
                record_path.display()
            ))
        })?;
        Ok(Self {
            root: root.to_path_buf(),
            record: serde_json::from_str(&text)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn record(&self) -> &InstallRecord {
        &self.record
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.root.join(env_files::BIN_DIR)
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.root.join(env_files::LIB_DIR)
    }

    pub fn package_names(&self) -> Vec<&str> {
        self.record.packages.iter().map(|p| p.name.as_str()).collect()
    }

    /// Digest of the environment as it is on disk now.
    pub fn current_digest(&self) -> RoundupResult<String> {
        environment_digest(&self.root)
    }
}

fn environment_digest(root: &Path) -> RoundupResult<String> {
    tree_digest(root, &[env_files::INSTALL_RECORD])
}

/// Install every package of `resolution` from `store` into `env_dir`.
///
/// An existing environment at `env_dir` is replaced only when the new one
/// is complete.
pub fn install_environment(
    resolution: &Resolution,
    store: &Path,
    env_dir: &Path,
    precompile: bool,
) -> RoundupResult<Environment> {
    let staging = staging_path(env_dir);
    remove_if_exists(&staging)?;

    let installed = populate(resolution, store, &staging, precompile).and_then(|record| {
        remove_if_exists(env_dir)?;
        fs::rename(&staging, env_dir)?;
        Ok(record)
    });

    match installed {
        Ok(record) => {
            tracing::info!(
                env = %env_dir.display(),
                packages = record.packages.len(),
                digest = %record.digest,
                precompiled = record.precompiled,
                "Installed environment"
            );
            Ok(Environment {
                root: env_dir.to_path_buf(),
                record,
            })
        }
        Err(e) => {
            if let Err(cleanup) = remove_if_exists(&staging) {
                tracing::warn!(
                    staging = %staging.display(),
                    error = %cleanup,
                    "Failed to remove partial environment"
                );
            }
            Err(e)
        }
    }
}

fn populate(
    resolution: &Resolution,
    store: &Path,
    staging: &Path,
    precompile: bool,
) -> RoundupResult<InstallRecord> {
    let bin_dir = staging.join(env_files::BIN_DIR);
    let lib_dir = staging.join(env_files::LIB_DIR);
    fs::create_dir_all(&bin_dir)?;
    fs::create_dir_all(&lib_dir)?;

    let mut bin_owners: BTreeMap<String, String> = BTreeMap::new();
    let mut packages = Vec::with_capacity(resolution.packages.len());

    for package in &resolution.packages {
        let target = lib_dir.join(&package.name);
        install_package(package, store, &target)?;
        if precompile {
            write_package_record(&target)?;
        }
        link_binaries(package, &target, &bin_dir, &mut bin_owners)?;

        packages.push(InstalledPackage {
            name: package.name.clone(),
            version: package.version.clone(),
            checksum: package.checksum.clone(),
        });
    }

    let record = InstallRecord {
        project: resolution.project.clone(),
        packages,
        digest: environment_digest(staging)?,
        precompiled: precompile,
        installed_at: Utc::now(),
    };
    fs::write(
        staging.join(env_files::INSTALL_RECORD),
        serde_json::to_vec_pretty(&record)?,
    )?;
    Ok(record)
}

/// Verify a store entry against its locked checksum and copy it.
fn install_package(package: &LockedPackage, store: &Path, target: &Path) -> RoundupResult<()> {
    let source = store.join(package.store_name());
    if !source.is_dir() {
        return Err(RoundupError::Storage(format!(
            "package {} {} not found in store {}",
            package.name,
            package.version,
            store.display()
        )));
    }

    let actual = tree_digest(&source, &[])?;
    if actual != package.checksum {
        return Err(RoundupError::ChecksumMismatch {
            package: package.store_name(),
            expected: package.checksum.clone(),
            actual,
        });
    }

    let copied = copy_tree(&source, target)?;
    tracing::debug!(package = %package.name, version = %package.version, files = copied, "Installed package");
    Ok(())
}

/// Write `RECORD`: one `path,sha256=<hex>` line per file of the package.
fn write_package_record(package_dir: &Path) -> RoundupResult<()> {
    let mut lines = String::new();
    for (relative, path) in files(package_dir)? {
        if relative == env_files::PACKAGE_RECORD {
            continue;
        }
        lines.push_str(&format!("{relative},sha256={}\n", file_sha256(&path)?));
    }
    fs::write(package_dir.join(env_files::PACKAGE_RECORD), lines)?;
    Ok(())
}

/// Expose the files in the package's `bin/` through the environment `bin/`.
fn link_binaries(
    package: &LockedPackage,
    package_dir: &Path,
    bin_dir: &Path,
    owners: &mut BTreeMap<String, String>,
) -> RoundupResult<()> {
    let package_bin = package_dir.join(env_files::BIN_DIR);
    if !package_bin.is_dir() {
        return Ok(());
    }

    let mut entries = fs::read_dir(&package_bin)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(owner) = owners.insert(name.clone(), package.name.clone()) {
            return Err(RoundupError::Storage(format!(
                "executable '{name}' is provided by both '{owner}' and '{}'",
                package.name
            )));
        }

        let link = bin_dir.join(&name);
        if fs::hard_link(entry.path(), &link).is_err() {
            fs::copy(entry.path(), &link)?;
        }
        set_executable(&link)?;
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_install_contains_exactly_locked_set() {
        let tmp = TempDir::new().unwrap();
        let store = tmp.path().join("store");
        let resolution = sample_resolution(&store);
        let env_dir = tmp.path().join("env");

        let env = install_environment(&resolution, &store, &env_dir, false).unwrap();

        assert_eq!(env.package_names(), ["http", "web"]);
        let mut installed: Vec<_> = fs::read_dir(env.lib_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        installed.sort();
        assert_eq!(installed, ["http", "web"]);
        assert!(!env.lib_dir().join("roundup").exists());
        assert!(env.bin_dir().join("serve").is_file());
        assert!(!staging_path(&env_dir).exists());
        assert_eq!(env.current_digest().unwrap(), env.record().digest);
        assert!(!env.lib_dir().join("web").join("RECORD").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_binaries_are_executable() {
        let tmp = TempDir::new().unwrap();
        let store = tmp.path().join("store");
        let resolution = sample_resolution(&store);
        let env = install_environment(&resolution, &store, &tmp.path().join("env"), false).unwrap();
        assert!(crate::deploy::tree::is_executable(&env.bin_dir().join("serve")).unwrap());
    }

    #[test]
    fn test_open_reads_record() {
        let tmp = TempDir::new().unwrap();
        let store = tmp.path().join("store");
        let resolution = sample_resolution(&store);
        let env_dir = tmp.path().join("env");
        let installed = install_environment(&resolution, &store, &env_dir, true).unwrap();

        let opened = Environment::open(&env_dir).unwrap();
        assert_eq!(opened.record(), installed.record());
        assert!(opened.record().precompiled);
        assert_eq!(opened.record().project, "roundup");
    }

    #[test]
    fn test_precompile_writes_records() {
        let tmp = TempDir::new().unwrap();
        let store = tmp.path().join("store");
        let resolution = sample_resolution(&store);
        let env = install_environment(&resolution, &store, &tmp.path().join("env"), true).unwrap();

        let record = fs::read_to_string(env.lib_dir().join("web").join("RECORD")).unwrap();
        let paths: Vec<_> = record.lines().map(|l| l.split(',').next().unwrap()).collect();
        assert_eq!(paths, ["bin/serve", "web/__init__.py"]);
        assert!(record.lines().all(|l| l.contains(",sha256=")));
    }

    #[test]
    fn test_checksum_mismatch_leaves_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = tmp.path().join("store");
        let resolution = sample_resolution(&store);
        fs::write(store.join("http-0.4.1/http/core.py"), "tampered\n").unwrap();
        let env_dir = tmp.path().join("env");

        let err = install_environment(&resolution, &store, &env_dir, false).unwrap_err();
        assert!(matches!(err, RoundupError::ChecksumMismatch { ref package, .. } if package == "http-0.4.1"));
        assert!(!env_dir.exists());
        assert!(!staging_path(&env_dir).exists());
    }

    #[test]
    fn test_missing_store_entry() {
        let tmp = TempDir::new().unwrap();
        let store = tmp.path().join("store");
        let resolution = sample_resolution(&store);
        fs::remove_dir_all(store.join("web-1.2.0")).unwrap();

        let err = install_environment(&resolution, &store, &tmp.path().join("env"), false)
            .unwrap_err();
        assert!(matches!(err, RoundupError::Storage(_)));
    }

    #[test]
    fn test_failed_reinstall_keeps_previous_environment() {
        let tmp = TempDir::new().unwrap();
        let store = tmp.path().join("store");
        let resolution = sample_resolution(&store);
        let env_dir = tmp.path().join("env");
        let first = install_environment(&resolution, &store, &env_dir, false).unwrap();

        fs::write(store.join("web-1.2.0/web/__init__.py"), "changed\n").unwrap();
        assert!(install_environment(&resolution, &store, &env_dir, false).is_err());

        let kept = Environment::open(&env_dir).unwrap();
        assert_eq!(kept.record().digest, first.record().digest);
    }

    #[test]
    fn test_open_missing_record() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            Environment::open(tmp.path()),
            Err(RoundupError::NotFound(_))
        ));
    }
}
