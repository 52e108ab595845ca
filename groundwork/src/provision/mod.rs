//! Environment provisioner.
//!
//! Reconciles a required capability set against a live database before the
//! schema-owning service connects. The run order is fixed:
//!
//! 1. Capabilities, in declared order. Any install failure is fatal and the
//!    dependent service must not start.
//! 2. Descriptive annotations: non-fatal, logged and ignored.
//! 3. Advisory session defaults: non-fatal, logged and ignored.
//!
//! Every step is idempotent, so the provisioner is safe to re-run at every
//! container start; there is no reliance on an external one-shot trigger.
//! The persistent `capabilities` registry records what was installed and at
//! which version, and reconciliation consults both the registry and a live
//! presence probe.

mod builtin;
mod capability;
mod session;

pub use builtin::{
    UUID_GENERATION, VECTOR_SIMILARITY, builtin, default_capabilities, uuid_generation,
    vector_similarity,
};
pub use capability::{Capability, Ensured, function_present};
pub use session::SessionDefaults;

use std::path::Path;
use std::time::{Duration, Instant};

use crate::db::Database;
use crate::errors::{GroundworkError, GroundworkResult};

/// Outcome of a full provisioning run.
#[derive(Debug)]
pub struct ProvisionReport {
    /// Per-capability outcomes in declared order.
    pub outcomes: Vec<(String, Ensured)>,
    pub duration: Duration,
}

impl ProvisionReport {
    pub fn installed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, e)| *e == Ensured::Installed)
            .count()
    }

    pub fn already_present(&self) -> usize {
        self.outcomes.len() - self.installed()
    }
}

/// Reconciles required capabilities against a database.
pub struct Provisioner {
    db: Database,
    capabilities: Vec<Capability>,
    session: SessionDefaults,
}

impl Provisioner {
    pub fn new(db: Database, capabilities: Vec<Capability>) -> Self {
        Self {
            db,
            capabilities,
            session: SessionDefaults::default(),
        }
    }

    pub fn with_session(mut self, session: SessionDefaults) -> Self {
        self.session = session;
        self
    }

    /// Reconcile a single capability.
    ///
    /// A capability that is live on the connection and registered at a
    /// sufficient version is left alone. A missing registry row is
    /// backfilled (capability installed out of band). Anything else, absent
    /// or registered at a stale version, triggers the install action, which
    /// must itself be idempotent.
    pub fn ensure(&self, cap: &Capability) -> GroundworkResult<Ensured> {
        let registered = self.db.capability_version(cap.name())?;
        let present = {
            let conn = self.db.conn();
            cap.probe(&conn)?
        };

        if present && registered.is_none_or(|v| v >= cap.version()) {
            if registered.is_none() {
                self.db.record_capability(cap.name(), cap.version())?;
            }
            tracing::debug!(capability = cap.name(), "capability already present");
            return Ok(Ensured::AlreadyPresent);
        }

        {
            let conn = self.db.conn();
            cap.install(&conn).map_err(|e| GroundworkError::Capability {
                name: cap.name().to_string(),
                reason: e.to_string(),
            })?;
        }
        self.db.record_capability(cap.name(), cap.version())?;

        tracing::info!(
            capability = cap.name(),
            version = cap.version(),
            "installed capability"
        );
        Ok(Ensured::Installed)
    }

    /// Run the full provisioning sequence.
    pub fn run(&self) -> GroundworkResult<ProvisionReport> {
        let start = Instant::now();
        let mut outcomes = Vec::with_capacity(self.capabilities.len());

        for cap in &self.capabilities {
            let outcome = self.ensure(cap)?;
            self.annotate(cap);
            outcomes.push((cap.name().to_string(), outcome));
        }

        self.session.apply(&self.db);

        let report = ProvisionReport {
            outcomes,
            duration: start.elapsed(),
        };
        tracing::info!(
            capabilities = report.outcomes.len(),
            installed = report.installed(),
            duration_ms = report.duration.as_millis() as u64,
            "provisioning complete"
        );
        Ok(report)
    }

    fn annotate(&self, cap: &Capability) {
        if cap.note().is_empty() {
            return;
        }
        if let Err(e) = self.db.record_annotation(cap.name(), cap.note()) {
            tracing::warn!(
                capability = cap.name(),
                error = %e,
                "annotation failed; continuing"
            );
        }
    }
}

/// Open `db_path` and ensure the named built-in capabilities are present.
///
/// Convenience entry point shared by the CLI and the bootstrap orchestrator.
pub fn provision_database(
    db_path: &Path,
    names: &[String],
    session: SessionDefaults,
) -> GroundworkResult<ProvisionReport> {
    let capabilities = resolve_capabilities(names)?;
    let db = Database::open(db_path)?;
    Provisioner::new(db, capabilities)
        .with_session(session)
        .run()
}

/// Map capability names to built-in definitions.
pub fn resolve_capabilities(names: &[String]) -> GroundworkResult<Vec<Capability>> {
    names
        .iter()
        .map(|name| {
            builtin(name)
                .ok_or_else(|| GroundworkError::Config(format!("unknown capability '{}'", name)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn failing_install(_conn: &Connection) -> GroundworkResult<()> {
        Err(GroundworkError::Database("disk full".into()))
    }

    fn never_present(_conn: &Connection) -> GroundworkResult<bool> {
        Ok(false)
    }

    #[test]
    fn test_both_absent_installs_both() {
        let db = Database::open_in_memory().unwrap();
        let provisioner = Provisioner::new(db.clone(), default_capabilities());

        let report = provisioner.run().unwrap();

        assert_eq!(report.installed(), 2);
        assert_eq!(report.already_present(), 0);
        let conn = db.conn();
        assert!(function_present(&conn, "uuid4").unwrap());
        assert!(function_present(&conn, "vec_distance_cos").unwrap());
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let provisioner = Provisioner::new(db.clone(), default_capabilities());

        provisioner.run().unwrap();
        let before = db.installed_capabilities().unwrap();

        let report = provisioner.run().unwrap();

        assert_eq!(report.installed(), 0);
        assert_eq!(report.already_present(), 2);
        assert_eq!(db.installed_capabilities().unwrap(), before);
    }

    #[test]
    fn test_only_missing_capability_installed() {
        let db = Database::open_in_memory().unwrap();

        // uuid-generation is already present before the run.
        Provisioner::new(db.clone(), vec![uuid_generation()])
            .run()
            .unwrap();

        let report = Provisioner::new(db.clone(), default_capabilities())
            .run()
            .unwrap();

        assert_eq!(
            report.outcomes,
            vec![
                (UUID_GENERATION.to_string(), Ensured::AlreadyPresent),
                (VECTOR_SIMILARITY.to_string(), Ensured::Installed),
            ]
        );
    }

    #[test]
    fn test_stale_registry_version_triggers_reinstall() {
        let db = Database::open_in_memory().unwrap();
        let provisioner = Provisioner::new(db.clone(), vec![uuid_generation()]);
        provisioner.run().unwrap();

        // Simulate a registry row from an older deployment.
        db.record_capability(UUID_GENERATION, 0).unwrap();

        let outcome = provisioner.ensure(&uuid_generation()).unwrap();
        assert_eq!(outcome, Ensured::Installed);
        assert_eq!(db.capability_version(UUID_GENERATION).unwrap(), Some(1));
    }

    #[test]
    fn test_present_but_unregistered_backfills_registry() {
        let db = Database::open_in_memory().unwrap();
        {
            let conn = db.conn();
            uuid_generation().install(&conn).unwrap();
        }

        let provisioner = Provisioner::new(db.clone(), vec![uuid_generation()]);
        let outcome = provisioner.ensure(&uuid_generation()).unwrap();

        assert_eq!(outcome, Ensured::AlreadyPresent);
        assert_eq!(db.capability_version(UUID_GENERATION).unwrap(), Some(1));
    }

    #[test]
    fn test_install_failure_is_fatal() {
        let db = Database::open_in_memory().unwrap();
        let broken = Capability::new("broken", 1, never_present, failing_install);
        let provisioner = Provisioner::new(db.clone(), vec![uuid_generation(), broken]);

        let err = provisioner.run().unwrap_err();

        assert!(matches!(
            err,
            GroundworkError::Capability { ref name, .. } if name == "broken"
        ));
        // The failed capability must not appear in the registry.
        assert_eq!(db.capability_version("broken").unwrap(), None);
    }

    #[test]
    fn test_annotation_failure_is_not_fatal() {
        let db = Database::open_in_memory().unwrap();
        {
            let conn = db.conn();
            conn.execute_batch("DROP TABLE annotations").unwrap();
        }

        let report = Provisioner::new(db, default_capabilities()).run().unwrap();
        assert_eq!(report.installed(), 2);
    }

    #[test]
    fn test_resolve_capabilities_rejects_unknown() {
        let err = resolve_capabilities(&["geo-distance".to_string()]).unwrap_err();
        assert!(matches!(err, GroundworkError::Config(_)));
    }
}
