//! Service launch specification.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{GroundworkError, GroundworkResult};

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_keep_alive() -> u64 {
    300
}

/// The immutable runtime configuration under which the service starts.
///
/// Declared in the build manifest, embedded in the image manifest at build
/// time, consumed at container start. Never changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceLaunchSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Bind host; all interfaces by default.
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Keep-alive budget for long-running responses, in seconds. A policy
    /// knob: too small drops slow responses mid-flight, it never loses data.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// Working directory, relative to the service root.
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    /// Carried-forward dependency locations, relative to the service root.
    /// Prepended to the child's `PATH` at spawn; without this wiring the
    /// service cannot resolve its dependencies at start time.
    #[serde(default)]
    pub module_path: Vec<PathBuf>,
    #[serde(default)]
    pub env: Vec<(String, String)>,
    /// Optional numeric uid the supervisor switches to before exec.
    #[serde(default)]
    pub run_as: Option<String>,
}

impl ServiceLaunchSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            host: default_host(),
            port: default_port(),
            keep_alive_secs: default_keep_alive(),
            workdir: None,
            module_path: Vec::new(),
            env: Vec::new(),
            run_as: None,
        }
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// The endpoint the service binds.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The endpoint a local readiness probe should connect to. Wildcard
    /// binds are probed over loopback.
    pub fn probe_addr(&self) -> String {
        match self.host.as_str() {
            "0.0.0.0" | "::" => format!("127.0.0.1:{}", self.port),
            host => format!("{}:{}", host, self.port),
        }
    }

    pub fn sanitize(&self) -> GroundworkResult<()> {
        if self.command.is_empty() {
            return Err(GroundworkError::Config("launch command is empty".into()));
        }
        if self.host.is_empty() {
            return Err(GroundworkError::Config("launch host is empty".into()));
        }
        if self.port == 0 {
            return Err(GroundworkError::Config("launch port must be non-zero".into()));
        }
        if self.keep_alive_secs == 0 {
            return Err(GroundworkError::Config(
                "keep-alive budget must be at least one second".into(),
            ));
        }
        for entry in &self.module_path {
            if entry.is_absolute() {
                return Err(GroundworkError::Config(format!(
                    "module path entry {} must be relative to the service root",
                    entry.display()
                )));
            }
        }
        if let Some(user) = &self.run_as
            && user.parse::<u32>().is_err()
        {
            return Err(GroundworkError::Config(format!(
                "run_as must be a numeric uid, got '{}'",
                user
            )));
        }
        Ok(())
    }
}
