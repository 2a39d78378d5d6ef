//! Process-wide constants shared by the service and the image builder.

/// Network defaults for the service process.
pub mod network {
    /// Port the service listens on inside the image.
    pub const DEFAULT_PORT: u16 = 5477;

    /// Bind address inside the image (all interfaces).
    pub const DEFAULT_HOST: &str = "0.0.0.0";

    /// Route prefix for the savings API.
    pub const DEFAULT_API_PREFIX: &str = "/blackrock/challenge/v1";
}

/// Environment variables read by the binaries.
pub mod envs {
    pub const HOST: &str = "ROUNDUP_HOST";
    pub const PORT: &str = "ROUNDUP_PORT";
    pub const API_PREFIX: &str = "ROUNDUP_API_PREFIX";
    pub const MAX_BODY_BYTES: &str = "ROUNDUP_MAX_BODY_BYTES";
    pub const JOB_RETENTION_SECS: &str = "ROUNDUP_JOB_RETENTION_SECS";
    pub const LOG_DIR: &str = "ROUNDUP_LOG_DIR";

    /// Enables pre-compilation of install records during dependency install.
    pub const PRECOMPILE: &str = "ROUNDUP_PRECOMPILE";
}

/// Fixed locations inside an assembled image root.
pub mod image_paths {
    /// Where the dependency environment is transplanted.
    pub const ENV_DIR: &str = "/opt/roundup/env";

    /// Where the application source tree is copied.
    pub const APP_DIR: &str = "/app";

    /// System search path appended after the environment's `bin/`.
    pub const SYSTEM_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

    /// Image configuration file, relative to the image root.
    pub const CONFIG_FILE: &str = "config.json";
}

/// File names inside an environment directory.
pub mod env_files {
    pub const INSTALL_RECORD: &str = "roundup-env.json";
    pub const PACKAGE_RECORD: &str = "RECORD";
    pub const BIN_DIR: &str = "bin";
    pub const LIB_DIR: &str = "lib";
}
