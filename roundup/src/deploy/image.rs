//! Stage 2: assemble the runtime image from an installed environment.
//!
//! ```text
//! <image>/
//!   opt/roundup/env/   environment, copied verbatim and digest-checked
//!   app/               application source tree
//!   config.json        Env / ExposedPorts / Cmd / WorkingDir
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use roundup_shared::constants::{env_files, image_paths, network};
use roundup_shared::{RoundupError, RoundupResult};
use serde::{Deserialize, Serialize};

use super::environment::Environment;
use super::tree::{copy_tree, remove_if_exists, staging_path};

/// Empty JSON object, as used for exposed port entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

/// Runtime configuration of an image, using OCI config field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageConfig {
    /// `KEY=value` entries.
    pub env: Vec<String>,
    /// `<port>/tcp` keys.
    pub exposed_ports: BTreeMap<String, Empty>,
    pub cmd: Vec<String>,
    pub working_dir: String,
}

impl ImageConfig {
    /// Config for the service listening on `port`.
    pub fn for_service(port: u16, cmd: Vec<String>) -> Self {
        let mut exposed_ports = BTreeMap::new();
        exposed_ports.insert(format!("{port}/tcp"), Empty {});
        Self {
            env: vec![format!(
                "PATH={}/{}:{}",
                image_paths::ENV_DIR,
                env_files::BIN_DIR,
                image_paths::SYSTEM_PATH
            )],
            exposed_ports,
            cmd,
            working_dir: image_paths::APP_DIR.to_string(),
        }
    }

    /// Value of `key` in [`ImageConfig::env`].
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env.iter().find_map(|entry| {
            let (k, v) = entry.split_once('=')?;
            (k == key).then_some(v)
        })
    }

    pub fn path_entries(&self) -> Vec<&str> {
        self.env_var("PATH")
            .map(|path| path.split(':').filter(|p| !p.is_empty()).collect())
            .unwrap_or_default()
    }

    /// Numeric ports from [`ImageConfig::exposed_ports`].
    pub fn ports(&self) -> Vec<u16> {
        self.exposed_ports
            .keys()
            .filter_map(|key| key.split('/').next()?.parse().ok())
            .collect()
    }
}

/// Default launch command for the service.
pub fn service_command(port: u16) -> Vec<String> {
    vec![
        "roundup".into(),
        "--host".into(),
        network::DEFAULT_HOST.into(),
        "--port".into(),
        port.to_string(),
    ]
}

/// An assembled image root.
#[derive(Debug, Clone)]
pub struct Image {
    root: PathBuf,
    config: ImageConfig,
}

impl Image {
    pub fn open(root: &Path) -> RoundupResult<Self> {
        let path = root.join(image_paths::CONFIG_FILE);
        let text = fs::read_to_string(&path).map_err(|e| {
            RoundupError::NotFound(format!("image config {}: {e}", path.display()))
        })?;
        Ok(Self {
            root: root.to_path_buf(),
            config: serde_json::from_str(&text)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &ImageConfig {
        &self.config
    }

    /// Host path of an absolute path inside the image.
    pub fn host_path(&self, image_path: &str) -> PathBuf {
        self.root.join(image_path.trim_start_matches('/'))
    }

    pub fn env_dir(&self) -> PathBuf {
        self.host_path(image_paths::ENV_DIR)
    }

    pub fn app_dir(&self) -> PathBuf {
        self.host_path(&self.config.working_dir)
    }
}

/// Inputs of the assembly stage.
#[derive(Debug, Clone)]
pub struct AssembleRequest<'a> {
    pub env_dir: &'a Path,
    pub source_dir: &'a Path,
    pub image_dir: &'a Path,
    pub port: u16,
    pub cmd: Vec<String>,
}

/// Copy the environment and source tree into a fresh image root.
///
/// Only the environment and the source are copied. The copied environment
/// must hash to the digest recorded at install time.
pub fn assemble_image(request: AssembleRequest<'_>) -> RoundupResult<Image> {
    let env = Environment::open(request.env_dir)
        .map_err(|e| RoundupError::Copy(format!("environment is not installed: {e}")))?;
    if !request.source_dir.is_dir() {
        return Err(RoundupError::Copy(format!(
            "source tree {} does not exist",
            request.source_dir.display()
        )));
    }

    let staging = staging_path(request.image_dir);
    remove_if_exists(&staging)?;

    let config = ImageConfig::for_service(request.port, request.cmd);
    let assembled = populate(&env, request.source_dir, &staging, &config).and_then(|()| {
        remove_if_exists(request.image_dir)?;
        fs::rename(&staging, request.image_dir)?;
        Ok(())
    });

    if let Err(e) = assembled {
        if let Err(cleanup) = remove_if_exists(&staging) {
            tracing::warn!(staging = %staging.display(), error = %cleanup, "Failed to remove partial image");
        }
        return Err(e);
    }

    tracing::info!(
        image = %request.image_dir.display(),
        port = request.port,
        cmd = ?config.cmd,
        "Assembled image"
    );
    Ok(Image {
        root: request.image_dir.to_path_buf(),
        config,
    })
}

fn populate(
    env: &Environment,
    source_dir: &Path,
    staging: &Path,
    config: &ImageConfig,
) -> RoundupResult<()> {
    let image_env = staging.join(image_paths::ENV_DIR.trim_start_matches('/'));
    copy_tree(env.root(), &image_env).map_err(|e| copy_error("environment", e))?;

    let copied = Environment::open(&image_env).map_err(|e| copy_error("environment", e))?;
    let actual = copied.current_digest()?;
    if actual != env.record().digest {
        return Err(RoundupError::Copy(format!(
            "environment does not match its install record: recorded {}, copied {actual}",
            env.record().digest
        )));
    }

    let app = staging.join(config.working_dir.trim_start_matches('/'));
    let files = copy_tree(source_dir, &app).map_err(|e| copy_error("source tree", e))?;
    tracing::debug!(files, "Copied source tree");

    fs::write(
        staging.join(image_paths::CONFIG_FILE),
        serde_json::to_vec_pretty(config)?,
    )?;
    Ok(())
}

fn copy_error(what: &str, e: RoundupError) -> RoundupError {
    RoundupError::Copy(format!("failed to copy {what}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::environment::install_environment;
    use crate::deploy::environment::testing::sample_resolution;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        env_dir: PathBuf,
        source_dir: PathBuf,
        image_dir: PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let store = tmp.path().join("store");
        let resolution = sample_resolution(&store);
        let env_dir = tmp.path().join("env");
        install_environment(&resolution, &store, &env_dir, false).unwrap();

        let source_dir = tmp.path().join("src");
        fs::create_dir_all(source_dir.join("app")).unwrap();
        fs::write(source_dir.join("app/main.py"), "print('hi')\n").unwrap();

        Fixture {
            image_dir: tmp.path().join("image"),
            env_dir,
            source_dir,
            _tmp: tmp,
        }
    }

    fn request(f: &Fixture) -> AssembleRequest<'_> {
        AssembleRequest {
            env_dir: &f.env_dir,
            source_dir: &f.source_dir,
            image_dir: &f.image_dir,
            port: network::DEFAULT_PORT,
            cmd: service_command(network::DEFAULT_PORT),
        }
    }

    #[test]
    fn test_assemble_layout() {
        let f = fixture();
        let image = assemble_image(request(&f)).unwrap();

        assert!(image.env_dir().join("bin/serve").is_file());
        assert!(image.app_dir().join("app/main.py").is_file());
        assert!(!f.image_dir.join("store").exists());
        assert!(!staging_path(&f.image_dir).exists());

        let env = Environment::open(&image.env_dir()).unwrap();
        assert_eq!(env.current_digest().unwrap(), env.record().digest);
    }

    #[test]
    fn test_config_contract() {
        let f = fixture();
        assemble_image(request(&f)).unwrap();
        let image = Image::open(&f.image_dir).unwrap();
        let config = image.config();

        assert_eq!(config.ports(), [5477]);
        assert_eq!(config.exposed_ports.len(), 1);
        assert_eq!(config.path_entries()[0], "/opt/roundup/env/bin");
        assert!(config.path_entries().contains(&"/usr/bin"));
        assert_eq!(config.cmd, ["roundup", "--host", "0.0.0.0", "--port", "5477"]);
        assert_eq!(config.working_dir, "/app");

        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(f.image_dir.join("config.json")).unwrap()).unwrap();
        assert_eq!(raw["ExposedPorts"], serde_json::json!({"5477/tcp": {}}));
        assert_eq!(raw["WorkingDir"], "/app");
    }

    #[test]
    fn test_missing_environment_is_copy_error() {
        let f = fixture();
        fs::remove_file(f.env_dir.join(env_files::INSTALL_RECORD)).unwrap();
        let err = assemble_image(request(&f)).unwrap_err();
        assert!(matches!(err, RoundupError::Copy(_)));
        assert!(!f.image_dir.exists());
    }

    #[test]
    fn test_missing_source_is_copy_error() {
        let f = fixture();
        fs::remove_dir_all(&f.source_dir).unwrap();
        let err = assemble_image(request(&f)).unwrap_err();
        assert!(matches!(err, RoundupError::Copy(_)));
        assert!(!f.image_dir.exists());
    }

    #[test]
    fn test_tampered_environment_is_rejected() {
        let f = fixture();
        fs::write(f.env_dir.join("lib/http/http/core.py"), "tampered\n").unwrap();
        let err = assemble_image(request(&f)).unwrap_err();
        assert!(matches!(err, RoundupError::Copy(ref m) if m.contains("does not match")));
        assert!(!f.image_dir.exists());
        assert!(!staging_path(&f.image_dir).exists());
    }

    #[test]
    fn test_env_var_lookup() {
        let config = ImageConfig::for_service(8080, service_command(8080));
        assert!(config.env_var("PATH").unwrap().starts_with("/opt/roundup/env/bin:"));
        assert_eq!(config.env_var("HOME"), None);
        assert_eq!(config.ports(), [8080]);
    }
}
