//! The only place that talks to the sound server.
//!
//! Everything goes through [`CommandRunner`], so tests swap in an in-memory
//! server and nothing else in the crate spawns processes.

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use tracing::debug;

use crate::error::ExternalCallFailure;
use crate::plan::NodeSpec;
use crate::types::ModuleId;

/// Runs one control command and returns its stdout.
pub trait CommandRunner: Send + Sync {
    fn run(&self, args: &[String]) -> Result<String, ExternalCallFailure>;
}

/// Runs the real `pactl` binary, argv style.
#[derive(Debug, Clone)]
pub struct PactlRunner {
    program: PathBuf,
}

impl PactlRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn describe(&self, args: &[String]) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(args.iter().cloned());
        parts.join(" ")
    }
}

impl Default for PactlRunner {
    fn default() -> Self {
        Self::new("pactl")
    }
}

impl CommandRunner for PactlRunner {
    fn run(&self, args: &[String]) -> Result<String, ExternalCallFailure> {
        let command = self.describe(args);
        debug!(%command, "running");

        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| ExternalCallFailure::Spawn {
                command: command.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ExternalCallFailure::NonZeroExit {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Typed mutations on top of a runner.
#[derive(Clone)]
pub struct ModuleControl {
    runner: Arc<dyn CommandRunner>,
}

impl ModuleControl {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    /// Load the module backing `node` and return the index the server assigned.
    pub fn load_module(&self, node: &NodeSpec) -> Result<ModuleId, ExternalCallFailure> {
        let mut args = vec!["load-module".to_string(), node.kind.module_name().to_string()];
        args.extend(node.module_arguments());

        let stdout = self.runner.run(&args)?;
        let index = stdout.trim();
        if index.is_empty() || !index.chars().all(|c| c.is_ascii_digit()) {
            return Err(ExternalCallFailure::MalformedOutput {
                command: args.join(" "),
                output: stdout,
            });
        }

        debug!(node = %node.name, kind = %node.kind, id = index, "module loaded");
        Ok(ModuleId(index.to_string()))
    }

    pub fn unload_module(&self, id: &ModuleId) -> Result<(), ExternalCallFailure> {
        self.runner
            .run(&["unload-module".to_string(), id.0.clone()])
            .map(|_| ())
    }

    /// One percentage per channel, or a single value for all channels.
    pub fn set_sink_volume(&self, device: &str, percents: &[u32]) -> Result<(), ExternalCallFailure> {
        let mut args = vec!["set-sink-volume".to_string(), device.to_string()];
        args.extend(percents.iter().map(|p| format!("{p}%")));
        self.runner.run(&args).map(|_| ())
    }

    pub fn set_default_sink(&self, name: &str) -> Result<(), ExternalCallFailure> {
        self.runner
            .run(&["set-default-sink".to_string(), name.to_string()])
            .map(|_| ())
    }

    pub fn set_card_profile(&self, card: &str, profile: &str) -> Result<(), ExternalCallFailure> {
        self.runner
            .run(&[
                "set-card-profile".to_string(),
                card.to_string(),
                profile.to_string(),
            ])
            .map(|_| ())
    }
}
