//! SQL migration definitions for the incident database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed within a transaction.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: incidents table",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- IT-support incident records
CREATE TABLE IF NOT EXISTS incidents (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    incident_number   TEXT NOT NULL UNIQUE,
    created_at        TEXT NOT NULL,
    status            TEXT NOT NULL,
    priority          TEXT NOT NULL,
    category          TEXT NOT NULL,
    subcategory       TEXT NOT NULL,
    system_name       TEXT NOT NULL,
    module            TEXT NOT NULL,
    short_description TEXT NOT NULL,
    description       TEXT NOT NULL,
    resolution        TEXT NOT NULL,
    assigned_to       TEXT NOT NULL,
    updated_at        TEXT NOT NULL,
    error_code        TEXT NOT NULL,
    affected_version  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_incidents_number ON incidents(incident_number);
CREATE INDEX IF NOT EXISTS idx_incidents_error_code ON incidents(error_code);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
