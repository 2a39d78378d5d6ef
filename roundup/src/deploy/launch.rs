//! Process launch from an assembled image.
//!
//! The image is a directory, not a container: the launcher maps the image's
//! `PATH` onto host paths under the image root, so `/opt/roundup/env/bin` is
//! searched before the image's system directories.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use roundup_shared::{RoundupError, RoundupResult};
use tokio::process::{Child, Command};

use super::image::Image;
use super::tree::is_executable;
use crate::util::is_process_alive;

/// How long a launched process must survive to count as started.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(500);

/// Find `program` along the image `PATH`, first match wins.
///
/// Programs containing `/` are taken as paths inside the image, relative
/// ones against the working directory.
pub fn resolve_program(image: &Image, program: &str) -> RoundupResult<PathBuf> {
    if program.is_empty() {
        return Err(RoundupError::Launch("empty command".into()));
    }

    if program.contains('/') {
        let path = if program.starts_with('/') {
            image.host_path(program)
        } else {
            image.app_dir().join(program)
        };
        if is_executable_file(&path) {
            return Ok(path);
        }
        return Err(RoundupError::Launch(format!(
            "program '{program}' not found in image {}",
            image.root().display()
        )));
    }

    image
        .config()
        .path_entries()
        .into_iter()
        .map(|dir| image.host_path(dir).join(program))
        .find(|candidate| is_executable_file(candidate))
        .ok_or_else(|| {
            RoundupError::Launch(format!(
                "program '{program}' not found on image PATH {}",
                image.config().env_var("PATH").unwrap_or_default()
            ))
        })
}

fn is_executable_file(path: &Path) -> bool {
    path.is_file() && is_executable(path).unwrap_or(false)
}

/// A running process started from an image.
#[derive(Debug)]
pub struct LaunchedProcess {
    child: Child,
    pid: u32,
    program: PathBuf,
}

impl LaunchedProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn is_alive(&self) -> bool {
        is_process_alive(self.pid)
    }

    /// Wait for the process to exit.
    pub async fn wait(&mut self) -> RoundupResult<ExitStatus> {
        Ok(self.child.wait().await?)
    }

    pub async fn kill(&mut self) -> RoundupResult<()> {
        Ok(self.child.kill().await?)
    }
}

/// Spawn the image command, or `command` when given.
///
/// The child runs in the image working directory with the image
/// environment applied and `PATH` mapped onto the image root.
pub fn spawn(image: &Image, command: Option<&[String]>) -> RoundupResult<LaunchedProcess> {
    let command = command.unwrap_or(image.config().cmd.as_slice());
    let (program, args) = command
        .split_first()
        .ok_or_else(|| RoundupError::Launch("image has no command".into()))?;
    let resolved = resolve_program(image, program)?;

    let path = image
        .config()
        .path_entries()
        .into_iter()
        .map(|dir| image.host_path(dir))
        .collect::<Vec<_>>();
    let path = std::env::join_paths(path)
        .map_err(|e| RoundupError::Launch(format!("invalid image PATH: {e}")))?;

    let mut cmd = Command::new(&resolved);
    cmd.args(args)
        .current_dir(image.app_dir())
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .env_clear();
    for entry in &image.config().env {
        match entry.split_once('=') {
            Some(("PATH", _)) | None => {}
            Some((key, value)) => {
                cmd.env(key, value);
            }
        }
    }
    cmd.env("PATH", path);

    let child = cmd.spawn().map_err(|e| {
        RoundupError::Launch(format!("failed to spawn {}: {e}", resolved.display()))
    })?;
    let pid = child
        .id()
        .ok_or_else(|| RoundupError::Launch("process exited before it was tracked".into()))?;

    tracing::info!(pid, program = %resolved.display(), args = ?args, "Launched process");
    Ok(LaunchedProcess {
        child,
        pid,
        program: resolved,
    })
}

/// Spawn the image command and require it to stay up for `settle`.
pub async fn launch(
    image: &Image,
    command: Option<&[String]>,
    settle: Duration,
) -> RoundupResult<LaunchedProcess> {
    let mut process = spawn(image, command)?;
    tokio::time::sleep(settle).await;

    if let Some(status) = process.child.try_wait()? {
        return Err(RoundupError::Launch(format!(
            "{} exited during start-up with {status}",
            process.program.display()
        )));
    }
    if !process.is_alive() {
        return Err(RoundupError::Launch(format!(
            "process {} disappeared during start-up",
            process.pid
        )));
    }
    Ok(process)
}
