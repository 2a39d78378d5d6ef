//! `roundup-build`: install the environment, assemble the image, launch it.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use roundup::deploy::{self, BuildOptions, DEFAULT_SETTLE, Image};
use roundup::runtime::init_logging;

#[derive(Debug, Parser)]
#[command(name = "roundup-build", version, about = "Two-stage Roundup image builder")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Stage 1: install locked dependencies into the environment directory.
    Install(PathArgs),
    /// Stage 2: copy the environment and source into the image directory.
    Assemble(PathArgs),
    /// Run both stages.
    Build(PathArgs),
    /// Launch an assembled image and wait for it to exit.
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct PathArgs {
    /// Project directory holding roundup.toml, roundup.lock, packages/ and src/.
    #[arg(long, default_value = ".")]
    project: PathBuf,

    #[arg(long)]
    manifest: Option<PathBuf>,

    #[arg(long)]
    lock: Option<PathBuf>,

    /// Offline package store.
    #[arg(long)]
    store: Option<PathBuf>,

    /// Application source tree.
    #[arg(long)]
    source: Option<PathBuf>,

    #[arg(long)]
    env_dir: Option<PathBuf>,

    #[arg(long)]
    image_dir: Option<PathBuf>,

    /// Port exposed by the image and passed to the service.
    #[arg(long)]
    port: Option<u16>,

    /// Image command, split on whitespace (default: the roundup service).
    #[arg(long)]
    cmd: Option<String>,

    /// Write RECORD files during install (also `ROUNDUP_PRECOMPILE=1`).
    #[arg(long)]
    precompile: bool,
}

impl PathArgs {
    fn into_options(self) -> BuildOptions {
        let mut options = BuildOptions::for_project(&self.project);
        if let Some(path) = self.manifest {
            options.manifest = path;
        }
        if let Some(path) = self.lock {
            options.lock = path;
        }
        if let Some(path) = self.store {
            options.store = path;
        }
        if let Some(path) = self.source {
            options.source = path;
        }
        if let Some(path) = self.env_dir {
            options.env_dir = path;
        }
        if let Some(path) = self.image_dir {
            options.image_dir = path;
        }
        if let Some(port) = self.port {
            options.port = port;
        }
        if let Some(cmd) = self.cmd {
            options.command = Some(cmd.split_whitespace().map(str::to_string).collect());
        }
        options.precompile |= self.precompile;
        options
    }
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Assembled image directory.
    #[arg(long, default_value = "build/image")]
    image: PathBuf,

    /// How long the process must stay up to count as started, in milliseconds.
    #[arg(long)]
    settle_ms: Option<u64>,

    /// Command overriding the image's `Cmd`.
    #[arg(last = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(None, "roundup-build")?;

    match cli.command {
        Command::Install(args) => {
            let options = args.into_options();
            let env = tokio::task::spawn_blocking(move || deploy::install(&options)).await??;
            println!("{}", env.root().display());
        }
        Command::Assemble(args) => {
            let options = args.into_options();
            let image = tokio::task::spawn_blocking(move || deploy::assemble(&options)).await??;
            println!("{}", image.root().display());
        }
        Command::Build(args) => {
            let report = deploy::build(args.into_options()).await?;
            tracing::info!(
                total_us = report.metrics.total_duration_us as u64,
                image = %report.image.root().display(),
                "Build finished"
            );
            println!("{}", report.image.root().display());
        }
        Command::Run(args) => {
            let code = run(args).await?;
            std::process::exit(code);
        }
    }
    Ok(())
}

async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let image = Image::open(&args.image)
        .with_context(|| format!("no image at {}", args.image.display()))?;
    let settle = args
        .settle_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_SETTLE);
    let command = (!args.command.is_empty()).then_some(args.command.as_slice());

    let mut process = deploy::launch(&image, command, settle).await?;
    tracing::info!(
        pid = process.pid(),
        program = %process.program().display(),
        "Process started"
    );

    let status = tokio::select! {
        status = process.wait() => status?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(pid = process.pid(), "Interrupted, stopping process");
            process.kill().await?;
            process.wait().await?
        }
    };
    tracing::info!(%status, "Process exited");
    Ok(exit_code(status))
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
