//! Bootstrap schema.
//!
//! Only the explicitly declared bootstrap objects live here: the versioned
//! capability registry and the annotations table. Everything else in the
//! database belongs to the downstream service.

pub const SCHEMA_VERSION: i32 = 1;

const SCHEMA_VERSION_TABLE: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);
";

const CAPABILITIES_TABLE: &str = "
CREATE TABLE IF NOT EXISTS capabilities (
    name TEXT PRIMARY KEY,
    version INTEGER NOT NULL,
    installed_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

const ANNOTATIONS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS annotations (
    subject TEXT PRIMARY KEY,
    note TEXT NOT NULL,
    created_at TEXT NOT NULL
);
";

pub fn all_schemas() -> [&'static str; 3] {
    [SCHEMA_VERSION_TABLE, CAPABILITIES_TABLE, ANNOTATIONS_TABLE]
}
