//! Provision-then-launch orchestration.
//!
//! Runs at container start: open the database, reconcile required
//! capabilities (fatal on failure, before the service ever starts), then
//! start the service and wait for its endpoint to accept connections within
//! the keep-alive budget. Provisioning is idempotent, so a restart that
//! races an earlier interrupted run is safe.

use crate::db::Database;
use crate::errors::GroundworkResult;
use crate::launch::{KeepAlive, ServiceHandle, await_ready, spawn_service};
use crate::options::BootstrapOptions;
use crate::provision::{ProvisionReport, Provisioner, resolve_capabilities};

pub struct Bootstrap {
    options: BootstrapOptions,
}

impl Bootstrap {
    pub fn new(options: BootstrapOptions) -> GroundworkResult<Self> {
        options.sanitize()?;
        Ok(Self { options })
    }

    /// Provision the database without starting the service.
    pub fn provision(&self) -> GroundworkResult<ProvisionReport> {
        let db = Database::open(&self.options.db_path)?;
        let capabilities = resolve_capabilities(&self.options.capabilities)?;
        Provisioner::new(db, capabilities)
            .with_session(self.options.session.clone())
            .run()
    }

    /// Full bootstrap: provision, then launch and wait for readiness.
    ///
    /// Any provisioning error aborts before the service binds its port; the
    /// container exits unhealthy instead of serving against an unprepared
    /// database.
    pub async fn run(&self) -> GroundworkResult<ServiceHandle> {
        let report = self.provision()?;
        tracing::info!(
            installed = report.installed(),
            already_present = report.already_present(),
            "database provisioned"
        );

        let mut handle = spawn_service(&self.options.launch, &self.options.service_root)?;

        let keep_alive = KeepAlive::from_spec(&self.options.launch);
        if let Err(e) = await_ready(&self.options.launch.probe_addr(), keep_alive).await {
            // The service never bound its endpoint; don't leave it running.
            let _ = handle.stop();
            return Err(e);
        }

        tracing::info!(addr = %self.options.launch.bind_addr(), "service ready");
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GroundworkError;
    use crate::launch::ServiceLaunchSpec;
    use crate::provision::function_present;
    use tempfile::TempDir;

    fn options(temp_dir: &TempDir) -> BootstrapOptions {
        BootstrapOptions {
            db_path: temp_dir.path().join("svc.db"),
            capabilities: vec![
                "uuid-generation".to_string(),
                "vector-similarity".to_string(),
            ],
            session: Default::default(),
            service_root: temp_dir.path().to_path_buf(),
            launch: ServiceLaunchSpec::new("svc"),
        }
    }

    #[test]
    fn test_provision_installs_required_capabilities() {
        let temp_dir = TempDir::new().unwrap();
        let bootstrap = Bootstrap::new(options(&temp_dir)).unwrap();

        let report = bootstrap.provision().unwrap();
        assert_eq!(report.installed(), 2);

        let db = Database::open(&temp_dir.path().join("svc.db")).unwrap();
        assert_eq!(db.installed_capabilities().unwrap().len(), 2);
        // Re-ensure on the fresh connection: functions register per
        // connection, and provisioning is safe to repeat.
        let report = Provisioner::new(db.clone(), crate::provision::default_capabilities())
            .run()
            .unwrap();
        assert_eq!(report.already_present(), 0);
        let conn = db.conn();
        assert!(function_present(&conn, "uuid4").unwrap());
    }

    #[test]
    fn test_unknown_capability_rejected_up_front() {
        let temp_dir = TempDir::new().unwrap();
        let mut opts = options(&temp_dir);
        opts.capabilities.push("quantum-entanglement".to_string());

        let err = Bootstrap::new(opts).unwrap_err();
        assert!(matches!(err, GroundworkError::Config(_)));
    }

    #[tokio::test]
    async fn test_run_stops_service_that_never_binds() {
        let temp_dir = TempDir::new().unwrap();
        let mut opts = options(&temp_dir);
        // A service that sleeps without ever listening.
        opts.launch = ServiceLaunchSpec::new("/bin/sh");
        opts.launch.args = vec!["-c".to_string(), "sleep 30".to_string()];
        opts.launch.keep_alive_secs = 1;
        opts.launch.port = 59999;

        let err = Bootstrap::new(opts).unwrap().run().await.unwrap_err();
        assert!(matches!(err, GroundworkError::Timeout { .. }));
    }
}
