//! Capability definitions.

use rusqlite::Connection;

use crate::db::db_err;
use crate::errors::GroundworkResult;

/// Outcome of reconciling one capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensured {
    /// The capability was missing (or registered at a stale version) and has
    /// been installed.
    Installed,
    /// The capability was already present at a sufficient version.
    AlreadyPresent,
}

impl std::fmt::Display for Ensured {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ensured::Installed => write!(f, "installed"),
            Ensured::AlreadyPresent => write!(f, "already present"),
        }
    }
}

type ProbeFn = fn(&Connection) -> GroundworkResult<bool>;
type InstallFn = fn(&Connection) -> GroundworkResult<()>;

/// A named feature the database must support before the service starts.
///
/// The install action must be safe to run when the capability is already
/// present: function registration replaces any previous definition, so
/// re-execution is a no-op rather than an error.
#[derive(Clone)]
pub struct Capability {
    name: String,
    version: i64,
    note: String,
    probe: ProbeFn,
    install: InstallFn,
}

impl Capability {
    pub fn new(
        name: impl Into<String>,
        version: i64,
        probe: ProbeFn,
        install: InstallFn,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            note: String::new(),
            probe,
            install,
        }
    }

    /// Attach a descriptive annotation recorded alongside the install.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn note(&self) -> &str {
        &self.note
    }

    /// Check whether the capability is live on this connection.
    pub fn probe(&self, conn: &Connection) -> GroundworkResult<bool> {
        (self.probe)(conn)
    }

    /// Run the install action.
    pub fn install(&self, conn: &Connection) -> GroundworkResult<()> {
        (self.install)(conn)
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish()
    }
}

/// Presence probe for SQL functions: true when `name` appears in the
/// connection's function list.
pub fn function_present(conn: &Connection, name: &str) -> GroundworkResult<bool> {
    db_err!(conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM pragma_function_list WHERE name = ?1)",
        [name],
        |row| row.get(0),
    ))
}
