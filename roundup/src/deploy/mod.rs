//! Two-stage image build and launch.
//!
//! ```text
//! Stage 1 (dependency resolution):  resolve ── install   → <env>/
//! Stage 2 (runtime assembly):       assemble              → <image>/
//!                                   launch                → process
//! ```
//!
//! Stages run strictly in order through the pipeline executor; a failure in
//! stage 1 means no image directory is ever created.

pub mod environment;
pub mod image;
pub mod launch;
pub mod manifest;
mod tree;

pub use environment::{Environment, InstallRecord, InstalledPackage, install_environment};
pub use image::{AssembleRequest, Image, ImageConfig, assemble_image, service_command};
pub use launch::{DEFAULT_SETTLE, LaunchedProcess, launch, resolve_program, spawn};
pub use manifest::{
    LOCK_VERSION, LockRoot, LockedPackage, Lockfile, Manifest, Project, Resolution,
    resolve_frozen,
};
pub use tree::tree_digest;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use roundup_shared::constants::{envs, network};
use roundup_shared::{RoundupError, RoundupResult};
use tokio::sync::Mutex;

use crate::pipeline::{
    BoxedTask, ExecutionPlan, PipelineExecutor, PipelineMetrics, PipelineTask, Stage,
};

/// Inputs and outputs of a build.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOptions {
    pub manifest: PathBuf,
    pub lock: PathBuf,
    /// Offline package store, one `<name>-<version>/` directory per package.
    pub store: PathBuf,
    pub source: PathBuf,
    pub env_dir: PathBuf,
    pub image_dir: PathBuf,
    pub port: u16,
    pub precompile: bool,
    /// Image `Cmd`. Defaults to [`service_command`] for `port`.
    pub command: Option<Vec<String>>,
}

impl BuildOptions {
    /// Conventional layout under a project directory: `roundup.toml`,
    /// `roundup.lock`, `packages/`, `src/`, with outputs in `build/`.
    pub fn for_project(project: &Path) -> Self {
        let build = project.join("build");
        Self {
            manifest: project.join("roundup.toml"),
            lock: project.join("roundup.lock"),
            store: project.join("packages"),
            source: project.join("src"),
            env_dir: build.join("env"),
            image_dir: build.join("image"),
            port: network::DEFAULT_PORT,
            precompile: precompile_from_env(),
            command: None,
        }
    }

    pub fn launch_command(&self) -> Vec<String> {
        self.command
            .clone()
            .unwrap_or_else(|| service_command(self.port))
    }
}

/// Whether `ROUNDUP_PRECOMPILE` asks for pre-compilation.
pub fn precompile_from_env() -> bool {
    precompile_enabled(std::env::var(envs::PRECOMPILE).ok().as_deref())
}

/// `1` and `true` (any case) enable pre-compilation.
pub fn precompile_enabled(value: Option<&str>) -> bool {
    matches!(value.map(str::trim), Some(v) if v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Load the manifest and lock and check that they agree.
pub fn resolve(options: &BuildOptions) -> RoundupResult<Resolution> {
    let manifest = Manifest::load(&options.manifest)?;
    let lock = Lockfile::load(&options.lock)?;
    resolve_frozen(&manifest, &lock)
}

/// Stage 1 on its own.
pub fn install(options: &BuildOptions) -> RoundupResult<Environment> {
    let resolution = resolve(options)?;
    install_environment(
        &resolution,
        &options.store,
        &options.env_dir,
        options.precompile,
    )
}

/// Stage 2 on its own, against an environment installed earlier.
pub fn assemble(options: &BuildOptions) -> RoundupResult<Image> {
    assemble_image(AssembleRequest {
        env_dir: &options.env_dir,
        source_dir: &options.source,
        image_dir: &options.image_dir,
        port: options.port,
        cmd: options.launch_command(),
    })
}

// ============================================================================
// BUILD PIPELINE
// ============================================================================

struct BuildContext {
    options: BuildOptions,
    resolution: Option<Resolution>,
    environment: Option<Environment>,
    image: Option<Image>,
}

type BuildCtx = Arc<Mutex<BuildContext>>;

/// Result of a full build.
#[derive(Debug)]
pub struct BuildReport {
    pub environment: Environment,
    pub image: Image,
    pub metrics: PipelineMetrics,
}

/// Run blocking filesystem work off the async workers.
async fn blocking<T, F>(f: F) -> RoundupResult<T>
where
    F: FnOnce() -> RoundupResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RoundupError::Internal(format!("build task panicked: {e}")))?
}

struct ResolveTask;

#[async_trait]
impl PipelineTask<BuildCtx> for ResolveTask {
    async fn run(self: Box<Self>, ctx: BuildCtx) -> RoundupResult<()> {
        let options = ctx.lock().await.options.clone();
        let resolution = blocking(move || resolve(&options)).await?;
        tracing::info!(
            project = %resolution.project,
            packages = resolution.packages.len(),
            "Lock file agrees with manifest"
        );
        ctx.lock().await.resolution = Some(resolution);
        Ok(())
    }

    fn name(&self) -> &str {
        "resolve"
    }
}

struct InstallTask;

#[async_trait]
impl PipelineTask<BuildCtx> for InstallTask {
    async fn run(self: Box<Self>, ctx: BuildCtx) -> RoundupResult<()> {
        let (options, resolution) = {
            let mut ctx = ctx.lock().await;
            let resolution = ctx
                .resolution
                .take()
                .ok_or_else(|| RoundupError::Internal("resolve task must run first".into()))?;
            (ctx.options.clone(), resolution)
        };

        let environment = blocking(move || {
            install_environment(
                &resolution,
                &options.store,
                &options.env_dir,
                options.precompile,
            )
        })
        .await?;

        ctx.lock().await.environment = Some(environment);
        Ok(())
    }

    fn name(&self) -> &str {
        "install"
    }
}

struct AssembleTask;

#[async_trait]
impl PipelineTask<BuildCtx> for AssembleTask {
    async fn run(self: Box<Self>, ctx: BuildCtx) -> RoundupResult<()> {
        let options = {
            let ctx = ctx.lock().await;
            if ctx.environment.is_none() {
                return Err(RoundupError::Internal("install task must run first".into()));
            }
            ctx.options.clone()
        };

        let image = blocking(move || assemble(&options)).await?;
        ctx.lock().await.image = Some(image);
        Ok(())
    }

    fn name(&self) -> &str {
        "assemble"
    }
}

fn build_plan() -> ExecutionPlan<BuildCtx> {
    let stages: Vec<Stage<BoxedTask<BuildCtx>>> = vec![
        // Stage 1: dependency resolution
        Stage::sequential(vec![Box::new(ResolveTask), Box::new(InstallTask)]),
        // Stage 2: runtime assembly
        Stage::sequential(vec![Box::new(AssembleTask)]),
    ];
    ExecutionPlan::new(stages)
}

/// Run both build stages.
pub async fn build(options: BuildOptions) -> RoundupResult<BuildReport> {
    let ctx: BuildCtx = Arc::new(Mutex::new(BuildContext {
        options,
        resolution: None,
        environment: None,
        image: None,
    }));

    let metrics = PipelineExecutor::execute("build", build_plan(), ctx.clone()).await?;
    metrics.log_tasks();

    let mut ctx = ctx.lock().await;
    let environment = ctx
        .environment
        .take()
        .ok_or_else(|| RoundupError::Internal("build finished without environment".into()))?;
    let image = ctx
        .image
        .take()
        .ok_or_else(|| RoundupError::Internal("build finished without image".into()))?;

    Ok(BuildReport {
        environment,
        image,
        metrics,
    })
}
