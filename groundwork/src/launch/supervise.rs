//! Service process supervision.
//!
//! Spawns the service under its launch spec and enforces the keep-alive
//! budget on long-running transport operations. The budget's failure mode is
//! a timeout error surfaced to the caller, never a silent hang.

use std::future::Future;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use super::spec::ServiceLaunchSpec;
use crate::errors::{GroundworkError, GroundworkResult};
use crate::util::{is_process_alive, kill_process};

/// Handle to a spawned service process.
pub struct ServiceHandle {
    child: Child,
    pid: u32,
}

impl ServiceHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_alive(&self) -> bool {
        is_process_alive(self.pid)
    }

    /// Stop the service with SIGKILL and reap it.
    pub fn stop(&mut self) -> GroundworkResult<()> {
        kill_process(self.pid);
        self.child.wait()?;
        Ok(())
    }

    /// Block until the service exits, returning its exit code if any.
    pub fn wait(&mut self) -> GroundworkResult<Option<i32>> {
        let status = self.child.wait()?;
        Ok(status.code())
    }
}

/// Spawn the service process under `spec`, rooted at `service_root`.
///
/// The carried-forward dependency locations in `spec.module_path` are
/// resolved against the root and prepended to the child's `PATH`; the bind
/// contract is exported via `SERVICE_HOST` / `SERVICE_PORT` /
/// `SERVICE_KEEP_ALIVE_SECS`.
pub fn spawn_service(
    spec: &ServiceLaunchSpec,
    service_root: &Path,
) -> GroundworkResult<ServiceHandle> {
    spec.sanitize()?;

    let workdir = match &spec.workdir {
        Some(dir) => service_root.join(dir),
        None => service_root.to_path_buf(),
    };
    if !workdir.is_dir() {
        return Err(GroundworkError::Launch(format!(
            "working directory {} does not exist",
            workdir.display()
        )));
    }

    let mut cmd = Command::new(&spec.command);
    cmd.args(&spec.args).current_dir(&workdir);

    if !spec.module_path.is_empty() {
        let mut entries: Vec<String> = spec
            .module_path
            .iter()
            .map(|p| service_root.join(p).display().to_string())
            .collect();
        if let Ok(path) = std::env::var("PATH") {
            entries.push(path);
        }
        cmd.env("PATH", entries.join(":"));
    }

    cmd.env("SERVICE_HOST", &spec.host)
        .env("SERVICE_PORT", spec.port.to_string())
        .env("SERVICE_KEEP_ALIVE_SECS", spec.keep_alive_secs.to_string());
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }

    // Pass RUST_LOG through so a Rust service inherits log filtering.
    if let Ok(rust_log) = std::env::var("RUST_LOG") {
        cmd.env("RUST_LOG", rust_log);
    }

    if let Some(user) = &spec.run_as {
        apply_run_as(&mut cmd, user)?;
    }

    // Null stdio: the service owns its own logging, and piping here would
    // tie its lifetime to this handle.
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::null());

    let child = cmd.spawn().map_err(|e| {
        let err_msg = format!("failed to spawn service '{}': {}", spec.command, e);
        tracing::error!("{}", err_msg);
        GroundworkError::Launch(err_msg)
    })?;

    let pid = child.id();
    tracing::info!(
        pid = pid,
        command = %spec.command,
        addr = %spec.bind_addr(),
        keep_alive_secs = spec.keep_alive_secs,
        "service started"
    );

    Ok(ServiceHandle { child, pid })
}

#[cfg(unix)]
fn apply_run_as(cmd: &mut Command, user: &str) -> GroundworkResult<()> {
    use std::os::unix::process::CommandExt;

    // sanitize() guarantees a numeric uid.
    let uid: u32 = user
        .parse()
        .map_err(|_| GroundworkError::Config(format!("run_as must be a numeric uid, got '{}'", user)))?;
    cmd.uid(uid);
    Ok(())
}

#[cfg(not(unix))]
fn apply_run_as(_cmd: &mut Command, _user: &str) -> GroundworkResult<()> {
    Err(GroundworkError::Config(
        "run_as is only supported on Unix".into(),
    ))
}

/// Keep-alive budget for long-running transport operations.
#[derive(Debug, Clone, Copy)]
pub struct KeepAlive {
    budget: Duration,
}

impl KeepAlive {
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }

    pub fn from_spec(spec: &ServiceLaunchSpec) -> Self {
        Self::new(spec.keep_alive())
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Run `fut` under the keep-alive budget.
    ///
    /// A future that outlives the budget is terminated with
    /// [`GroundworkError::Timeout`].
    pub async fn guard<F>(&self, fut: F) -> GroundworkResult<F::Output>
    where
        F: Future,
    {
        tokio::time::timeout(self.budget, fut)
            .await
            .map_err(|_| GroundworkError::Timeout {
                budget_secs: self.budget.as_secs(),
            })
    }
}

/// Wait until `addr` accepts TCP connections, bounded by `keep_alive`.
pub async fn await_ready(addr: &str, keep_alive: KeepAlive) -> GroundworkResult<()> {
    keep_alive
        .guard(async {
            loop {
                match tokio::net::TcpStream::connect(addr).await {
                    Ok(_) => return,
                    Err(_) => tokio::time::sleep(Duration::from_millis(100)).await,
                }
            }
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_allows_responses_within_budget() {
        let keep_alive = KeepAlive::new(Duration::from_secs(300));

        let value = keep_alive
            .guard(async {
                tokio::time::sleep(Duration::from_secs(250)).await;
                42
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_terminates_over_budget_responses() {
        let keep_alive = KeepAlive::new(Duration::from_secs(300));

        let err = keep_alive
            .guard(async {
                tokio::time::sleep(Duration::from_secs(400)).await;
            })
            .await
            .unwrap_err();

        assert!(matches!(err, GroundworkError::Timeout { budget_secs: 300 }));
    }

    #[tokio::test]
    async fn test_await_ready_connects_to_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        await_ready(&addr, KeepAlive::new(Duration::from_secs(5)))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_ready_times_out_without_listener() {
        // Reserved port with no listener; connects are refused immediately,
        // so the probe loop spins on the paused clock until the budget ends.
        let err = await_ready("127.0.0.1:1", KeepAlive::new(Duration::from_secs(3)))
            .await
            .unwrap_err();

        assert!(matches!(err, GroundworkError::Timeout { .. }));
    }

    #[test]
    fn test_spawn_and_stop_service() {
        let temp_dir = TempDir::new().unwrap();
        let mut spec = ServiceLaunchSpec::new("/bin/sh");
        spec.args = vec!["-c".to_string(), "sleep 30".to_string()];

        let mut handle = spawn_service(&spec, temp_dir.path()).unwrap();
        assert!(handle.is_alive());

        handle.stop().unwrap();
        assert!(!handle.is_alive());
    }

    #[test]
    fn test_spawn_missing_workdir_fails() {
        let temp_dir = TempDir::new().unwrap();
        let mut spec = ServiceLaunchSpec::new("/bin/sh");
        spec.workdir = Some("no-such-dir".into());

        let err = spawn_service(&spec, temp_dir.path()).unwrap_err();
        assert!(matches!(err, GroundworkError::Launch(_)));
    }

    #[test]
    fn test_spawn_exports_bind_contract() {
        let temp_dir = TempDir::new().unwrap();
        let out_path = temp_dir.path().join("env.txt");
        let mut spec = ServiceLaunchSpec::new("/bin/sh");
        spec.args = vec![
            "-c".to_string(),
            format!(
                "echo $SERVICE_HOST:$SERVICE_PORT:$SERVICE_KEEP_ALIVE_SECS > {}",
                out_path.display()
            ),
        ];
        spec.module_path = vec!["deps/bin".into()];

        let mut handle = spawn_service(&spec, temp_dir.path()).unwrap();
        handle.wait().unwrap();

        let contents = std::fs::read_to_string(&out_path).unwrap();
        assert_eq!(contents.trim(), "0.0.0.0:8000:300");
    }
}
