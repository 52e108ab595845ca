//! Advisory session defaults.
//!
//! Applied after capability installation. Failures must not block startup;
//! they are logged at warn and ignored.

use serde::{Deserialize, Serialize};

use crate::db::Database;

/// Persistent application id stamped into the database header ("GRWK").
pub const APPLICATION_ID: i32 = 0x4752_574B;

/// Connection defaults applied at the tail of a provisioning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDefaults {
    /// Application id written to the database header, identifying the
    /// database as belonging to this deployment.
    #[serde(default)]
    pub application_id: Option<i32>,
    /// Advisory PRAGMA settings, applied in order.
    #[serde(default)]
    pub pragmas: Vec<(String, String)>,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            application_id: Some(APPLICATION_ID),
            pragmas: vec![("temp_store".to_string(), "memory".to_string())],
        }
    }
}

impl SessionDefaults {
    /// No defaults at all; the provisioner skips this step entirely.
    pub fn none() -> Self {
        Self {
            application_id: None,
            pragmas: Vec::new(),
        }
    }

    /// Apply the defaults. Never fails; each individual failure is logged
    /// and skipped.
    pub fn apply(&self, db: &Database) {
        let conn = db.conn();

        if let Some(id) = self.application_id
            && let Err(e) = conn.pragma_update(None, "application_id", id)
        {
            tracing::warn!(error = %e, "failed to set application_id; continuing");
        }

        for (name, value) in &self.pragmas {
            if let Err(e) = conn.pragma_update(None, name, value) {
                tracing::warn!(
                    pragma = %name,
                    value = %value,
                    error = %e,
                    "advisory session default failed; continuing"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_sets_application_id() {
        let db = Database::open_in_memory().unwrap();
        SessionDefaults::default().apply(&db);

        let conn = db.conn();
        let id: i32 = conn
            .query_row("PRAGMA application_id", [], |row| row.get(0))
            .unwrap();
        assert_eq!(id, APPLICATION_ID);
    }

    #[test]
    fn test_apply_tolerates_bad_pragma() {
        let db = Database::open_in_memory().unwrap();
        let defaults = SessionDefaults {
            application_id: None,
            pragmas: vec![("no such pragma".to_string(), "1".to_string())],
        };
        // Must not panic or error.
        defaults.apply(&db);
    }
}
