use crate::model::LocalApp;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("empty command")]
    EmptyCommand,
    #[error("path does not exist: {}", .0.display())]
    MissingPath(PathBuf),
    #[error("failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Starts `command` detached from the launcher; its exit is not awaited.
pub fn launch_command(command: &str, args: &[String]) -> Result<(), LaunchError> {
    let trimmed = command.trim();
    if trimmed.is_empty() {
        return Err(LaunchError::EmptyCommand);
    }

    let candidate = Path::new(trimmed);
    if looks_like_path(trimmed) && !candidate.exists() {
        return Err(LaunchError::MissingPath(candidate.to_path_buf()));
    }

    Command::new(trimmed)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
        .map_err(|source| LaunchError::Spawn {
            command: trimmed.to_string(),
            source,
        })
}

pub fn launch_app(app: &LocalApp) -> Result<(), LaunchError> {
    log::info!("launching {}", app.name);
    launch_command(&app.command, &app.args)
}

pub trait AppLauncher {
    fn launch(&self, app: &LocalApp) -> Result<(), LaunchError>;
}

pub struct ProcessLauncher;

impl AppLauncher for ProcessLauncher {
    fn launch(&self, app: &LocalApp) -> Result<(), LaunchError> {
        launch_app(app)
    }
}

fn looks_like_path(command: &str) -> bool {
    command.contains('/') || command.contains('\\')
}
