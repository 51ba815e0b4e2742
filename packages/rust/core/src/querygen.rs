//! Query-build stage.
//!
//! The query shape is fixed in code, never generated by the completion
//! service: every extracted term must match (case-insensitive substring)
//! in at least one of the four search columns, newest incidents first,
//! at most five rows. The build stage persists the query to the
//! `generated_query` slot before returning; the exec stage reads it back
//! from there rather than trusting any in-memory value.

use incidentscout_handoff::{HandoffStore, Slot};
use incidentscout_shared::{
    INCIDENT_TABLE, IncidentScoutError, KeywordSet, ORDER_COLUMN, RESULT_LIMIT, Result,
    SEARCH_COLUMNS, StructuredQuery,
};
use tracing::info;

/// Build the fixed-shape structured query for a keyword set.
pub fn build_query(keywords: &KeywordSet) -> StructuredQuery {
    StructuredQuery {
        table: INCIDENT_TABLE.to_string(),
        columns: SEARCH_COLUMNS.iter().map(|c| c.to_string()).collect(),
        terms: keywords.terms().to_vec(),
        order_column: ORDER_COLUMN.to_string(),
        limit: RESULT_LIMIT,
    }
}

/// Build the query and persist it to the handoff store.
///
/// The slot carries the query fields plus the rendered SQL, so the artifact
/// is inspectable on its own; readers deserialize the fields and ignore the
/// rendering.
pub fn build_and_persist(handoff: &HandoffStore, keywords: &KeywordSet) -> Result<StructuredQuery> {
    let query = build_query(keywords);

    let mut value = serde_json::to_value(&query)
        .map_err(|e| IncidentScoutError::validation(format!("serialize query: {e}")))?;
    if let serde_json::Value::Object(map) = &mut value {
        map.insert("sql".into(), serde_json::Value::String(query.sql()));
    }
    handoff.write_json(Slot::GeneratedQuery, &value)?;

    info!(terms = query.terms.len(), "structured query persisted");
    Ok(query)
}

/// Reject a query that references anything outside the live incident schema.
///
/// `schema_columns` comes from store introspection. A mismatch means the
/// persisted query cannot be trusted and must not reach the store.
pub fn validate_query(query: &StructuredQuery, schema_columns: &[String]) -> Result<()> {
    if query.table != INCIDENT_TABLE {
        return Err(IncidentScoutError::query_invalid(format!(
            "unexpected table '{}'",
            query.table
        )));
    }

    for column in query.columns.iter().chain(std::iter::once(&query.order_column)) {
        if !schema_columns.contains(column) {
            return Err(IncidentScoutError::query_invalid(format!(
                "column '{column}' is not in the incident schema"
            )));
        }
    }

    if query.limit == 0 || query.limit > RESULT_LIMIT {
        return Err(IncidentScoutError::query_invalid(format!(
            "limit {} outside 1..={RESULT_LIMIT}",
            query.limit
        )));
    }

    Ok(())
}
