//! libSQL incident store.
//!
//! [`IncidentStore`] wraps a local libSQL database holding the `incidents`
//! table the pipeline searches. Every connection or statement failure maps to
//! [`IncidentScoutError::StoreUnavailable`], which is fatal to a pipeline run
//! and never triggers the web-search fallback.

mod migrations;

use std::path::Path;

use libsql::{Connection, Database, params, params_from_iter};

use incidentscout_shared::{IncidentRecord, IncidentScoutError, Result, StructuredQuery};

/// Primary storage handle wrapping a libSQL database.
pub struct IncidentStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl IncidentStore {
    /// Open or create a database at `path`, applying pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| IncidentScoutError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| IncidentScoutError::StoreUnavailable(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| IncidentScoutError::StoreUnavailable(e.to_string()))?;

        let store = Self { db, conn };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    IncidentScoutError::StoreUnavailable(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Schema introspection
    // -----------------------------------------------------------------------

    /// Column names of `table`, for validating generated queries before
    /// execution.
    pub async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(&format!("PRAGMA table_info({table})"), params![])
            .await
            .map_err(|e| IncidentScoutError::StoreUnavailable(e.to_string()))?;

        let mut columns = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => {
                    // PRAGMA table_info: (cid, name, type, notnull, dflt_value, pk)
                    let name: String = row
                        .get(1)
                        .map_err(|e| IncidentScoutError::StoreUnavailable(e.to_string()))?;
                    columns.push(name);
                }
                Ok(None) => break,
                Err(e) => return Err(IncidentScoutError::StoreUnavailable(e.to_string())),
            }
        }
        Ok(columns)
    }

    // -----------------------------------------------------------------------
    // Incident operations
    // -----------------------------------------------------------------------

    /// Insert one incident record (used by `db seed` and tests).
    pub async fn insert_incident(&self, record: &IncidentRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO incidents (incident_number, created_at, status, priority, category,
                   subcategory, system_name, module, short_description, description, resolution,
                   assigned_to, updated_at, error_code, affected_version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    record.incident_number.as_str(),
                    record.created_at.as_str(),
                    record.status.as_str(),
                    record.priority.as_str(),
                    record.category.as_str(),
                    record.subcategory.as_str(),
                    record.system_name.as_str(),
                    record.module.as_str(),
                    record.short_description.as_str(),
                    record.description.as_str(),
                    record.resolution.as_str(),
                    record.assigned_to.as_str(),
                    record.updated_at.as_str(),
                    record.error_code.as_str(),
                    record.affected_version.as_str(),
                ],
            )
            .await
            .map_err(|e| IncidentScoutError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    /// Execute a structured search and return matching rows in query order.
    ///
    /// The query must already be validated against the schema; this only
    /// renders and runs it. Returns an empty vector on zero matches.
    pub async fn execute_search(&self, query: &StructuredQuery) -> Result<Vec<IncidentRecord>> {
        let sql = query.sql();
        tracing::debug!(%sql, terms = query.terms.len(), "executing structured search");

        let mut rows = self
            .conn
            .query(&sql, params_from_iter(query.params()))
            .await
            .map_err(|e| IncidentScoutError::StoreUnavailable(e.to_string()))?;

        // A row-fetch error must surface, not read as end-of-results: an
        // empty vector selects the web-search fallback downstream, and an
        // execution failure may never do that.
        let mut records = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => records.push(row_to_record(&row)),
                Ok(None) => break,
                Err(e) => return Err(IncidentScoutError::StoreUnavailable(e.to_string())),
            }
        }
        Ok(records)
    }
}

/// Convert a database row to an [`IncidentRecord`].
///
/// Column order follows [`IncidentRecord::FIELD_NAMES`]; NULLs collapse to
/// empty strings since every field is an opaque string to the pipeline.
fn row_to_record(row: &libsql::Row) -> IncidentRecord {
    let text = |i: i32| row.get::<String>(i).unwrap_or_default();
    IncidentRecord {
        incident_number: text(0),
        created_at: text(1),
        status: text(2),
        priority: text(3),
        category: text(4),
        subcategory: text(5),
        system_name: text(6),
        module: text(7),
        short_description: text(8),
        description: text(9),
        resolution: text(10),
        assigned_to: text(11),
        updated_at: text(12),
        error_code: text(13),
        affected_version: text(14),
    }
}
