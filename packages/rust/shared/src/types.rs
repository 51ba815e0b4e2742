//! Core domain types for the IncidentScout pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The one logical table the pipeline searches.
pub const INCIDENT_TABLE: &str = "incidents";

/// Fixed set of text columns every keyword is matched against.
/// The query-build stage must never reference anything outside the incident
/// schema, and keyword matching is restricted to exactly these four.
pub const SEARCH_COLUMNS: [&str; 4] = [
    "short_description",
    "description",
    "resolution",
    "error_code",
];

/// Result-ordering column (descending) for structured searches.
pub const ORDER_COLUMN: &str = "incident_number";

/// Maximum rows a structured search may return.
pub const RESULT_LIMIT: u32 = 5;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
///
/// Every run gets its own handoff-slot namespace keyed by this ID, so
/// concurrent runs never overwrite each other's intermediate artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// KeywordSet
// ---------------------------------------------------------------------------

/// Ordered sequence of extracted search terms.
///
/// Order is extraction order and duplicates are preserved; downstream stages
/// decide what to do with them. An empty set is valid and degrades the
/// structured search to "no hits".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeywordSet(pub Vec<String>);

impl KeywordSet {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn terms(&self) -> &[String] {
        &self.0
    }
}

impl From<Vec<String>> for KeywordSet {
    fn from(terms: Vec<String>) -> Self {
        Self(terms)
    }
}

// ---------------------------------------------------------------------------
// StructuredQuery
// ---------------------------------------------------------------------------

/// A generated parameterized search expression over the incident table.
///
/// The shape is fixed, not learned: each term is matched case-insensitively
/// as a substring against every column in `columns` (OR within a term), and
/// term groups are AND-combined (every term must match somewhere). Results
/// are ordered by `order_column` descending and capped at `limit`.
///
/// Serialized as JSON into the `generated_query` handoff slot; the exec stage
/// depends on that persisted form, not on any in-memory value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredQuery {
    /// Target table name.
    pub table: String,
    /// Columns each term is matched against.
    pub columns: Vec<String>,
    /// Search terms, in keyword-extraction order.
    pub terms: Vec<String>,
    /// Descending sort column.
    pub order_column: String,
    /// Maximum number of rows to return.
    pub limit: u32,
}

impl StructuredQuery {
    /// Render the parameterized SQL for this query.
    ///
    /// An empty term list renders a match-nothing predicate: an empty
    /// KeywordSet must yield zero hits, not the whole table.
    pub fn sql(&self) -> String {
        let predicate = if self.terms.is_empty() {
            "1 = 0".to_string()
        } else {
            let groups: Vec<String> = (1..=self.terms.len())
                .map(|i| {
                    let alternatives: Vec<String> = self
                        .columns
                        .iter()
                        .map(|col| format!("LOWER({col}) LIKE LOWER(?{i})"))
                        .collect();
                    format!("({})", alternatives.join(" OR "))
                })
                .collect();
            groups.join(" AND ")
        };

        format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {} DESC LIMIT {}",
            IncidentRecord::FIELD_NAMES.join(", "),
            self.table,
            predicate,
            self.order_column,
            self.limit,
        )
    }

    /// Positional parameter values for [`StructuredQuery::sql`]:
    /// one `%term%` substring pattern per term.
    pub fn params(&self) -> Vec<String> {
        self.terms.iter().map(|t| format!("%{t}%")).collect()
    }
}

// ---------------------------------------------------------------------------
// IncidentRecord
// ---------------------------------------------------------------------------

/// One matched incident row — the fixed 15-field mapping of the store schema.
///
/// All fields are opaque strings except that `incident_number` is unique and
/// the timestamps are orderable RFC 3339 text. Immutable once fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub incident_number: String,
    pub created_at: String,
    pub status: String,
    pub priority: String,
    pub category: String,
    pub subcategory: String,
    pub system_name: String,
    pub module: String,
    pub short_description: String,
    pub description: String,
    pub resolution: String,
    pub assigned_to: String,
    pub updated_at: String,
    pub error_code: String,
    pub affected_version: String,
}

impl IncidentRecord {
    /// Schema field names, in the order `SELECT` lists and row mapping use.
    pub const FIELD_NAMES: [&'static str; 15] = [
        "incident_number",
        "created_at",
        "status",
        "priority",
        "category",
        "subcategory",
        "system_name",
        "module",
        "short_description",
        "description",
        "resolution",
        "assigned_to",
        "updated_at",
        "error_code",
        "affected_version",
    ];

    /// Field values in [`IncidentRecord::FIELD_NAMES`] order, for rendering.
    pub fn field_values(&self) -> [&str; 15] {
        [
            &self.incident_number,
            &self.created_at,
            &self.status,
            &self.priority,
            &self.category,
            &self.subcategory,
            &self.system_name,
            &self.module,
            &self.short_description,
            &self.description,
            &self.resolution,
            &self.assigned_to,
            &self.updated_at,
            &self.error_code,
            &self.affected_version,
        ]
    }
}

// ---------------------------------------------------------------------------
// StructuredResult
// ---------------------------------------------------------------------------

/// Ordered sequence of matched incidents, tagged with the query that
/// produced it. `records` may be empty but is never absent; the explicit
/// empty-vs-populated distinction drives the fallback branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredResult {
    /// The query that produced these records.
    pub query: StructuredQuery,
    /// Matched rows, in the query's declared order.
    pub records: Vec<IncidentRecord>,
}

impl StructuredResult {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

// ---------------------------------------------------------------------------
// Knowledge types
// ---------------------------------------------------------------------------

/// Qualitative confidence label for an external knowledge source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReliabilityTier {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for ReliabilityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        };
        write!(f, "{label}")
    }
}

/// Structured remediation guidance extracted from an external source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Remediation {
    /// Root-cause analysis derived from the source.
    #[serde(default)]
    pub root_cause: String,
    /// Recommended actions, ranked most-promising first.
    #[serde(default)]
    pub recommended_actions: Vec<String>,
    /// Example implementation (code or configuration), when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
    /// Alternative approaches with their trade-offs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternatives: Option<String>,
}

/// One external finding from the knowledge gateway, annotated by the
/// completion service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    /// Source locator (URL).
    pub locator: String,
    /// When the document was retrieved.
    pub retrieved_at: DateTime<Utc>,
    /// Reliability tier for the source.
    pub reliability: ReliabilityTier,
    /// Stated rationale for the tier.
    pub reliability_rationale: String,
    /// Content-type tag (official documentation, technical blog, forum
    /// post, academic paper, other).
    pub content_type: String,
    /// Key points extracted from the source.
    #[serde(default)]
    pub key_points: Vec<String>,
    /// Verbatim quotations from the source.
    #[serde(default)]
    pub quotations: Vec<String>,
    /// Structured remediation sub-block.
    #[serde(default)]
    pub remediation: Remediation,
}

/// Ordered sequence of external findings (possibly empty). Persisted to the
/// `knowledge_results` slot whenever the fallback branch runs, even when
/// nothing was found.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeResult {
    pub documents: Vec<KnowledgeDocument>,
}

impl KnowledgeResult {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }
}

// ---------------------------------------------------------------------------
// Run notes
// ---------------------------------------------------------------------------

/// A degradation recorded during a run and surfaced in the final report.
///
/// Notes never abort the run; they document what a stage recovered from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunNote {
    /// The completion service returned unusable keyword output; the run
    /// proceeded with an empty KeywordSet.
    ExtractionDegraded { detail: String },
    /// The knowledge gateway was unreachable; the run proceeded with an
    /// empty KnowledgeResult.
    KnowledgeGatewayUnavailable { detail: String },
    /// A handoff slot could not be read in any encoding; the report was
    /// generated from the remaining readable artifacts.
    ArtifactReadFailure { slot: String, detail: String },
}

impl RunNote {
    /// Human-readable rendering for the report's notes section.
    pub fn describe(&self) -> String {
        match self {
            Self::ExtractionDegraded { detail } => {
                format!("Keyword extraction degraded; continued with no keywords ({detail})")
            }
            Self::KnowledgeGatewayUnavailable { detail } => {
                format!("External knowledge gateway unavailable; no external information was gathered ({detail})")
            }
            Self::ArtifactReadFailure { slot, detail } => {
                format!("Could not read handoff artifact '{slot}' in any encoding ({detail})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let s = id.to_string();
        let parsed: RunId = s.parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn keyword_set_preserves_order_and_duplicates() {
        let ks = KeywordSet::from(vec![
            "SAP ERP".to_string(),
            "FB01".to_string(),
            "SAP ERP".to_string(),
        ]);
        assert_eq!(ks.len(), 3);
        assert_eq!(ks.terms()[0], "SAP ERP");
        assert_eq!(ks.terms()[2], "SAP ERP");
    }

    #[test]
    fn query_sql_shape() {
        let query = StructuredQuery {
            table: INCIDENT_TABLE.into(),
            columns: SEARCH_COLUMNS.iter().map(|c| c.to_string()).collect(),
            terms: vec!["SAP ERP".into(), "F5003".into()],
            order_column: ORDER_COLUMN.into(),
            limit: RESULT_LIMIT,
        };

        let sql = query.sql();
        assert!(sql.contains("FROM incidents"));
        assert!(sql.contains("LOWER(short_description) LIKE LOWER(?1)"));
        assert!(sql.contains("LOWER(error_code) LIKE LOWER(?2)"));
        assert!(sql.contains(") AND ("));
        assert!(sql.ends_with("ORDER BY incident_number DESC LIMIT 5"));

        assert_eq!(query.params(), vec!["%SAP ERP%", "%F5003%"]);
    }

    #[test]
    fn empty_terms_match_nothing() {
        let query = StructuredQuery {
            table: INCIDENT_TABLE.into(),
            columns: SEARCH_COLUMNS.iter().map(|c| c.to_string()).collect(),
            terms: vec![],
            order_column: ORDER_COLUMN.into(),
            limit: RESULT_LIMIT,
        };
        assert!(query.sql().contains("WHERE 1 = 0"));
        assert!(query.params().is_empty());
    }

    #[test]
    fn query_json_roundtrip() {
        let query = StructuredQuery {
            table: INCIDENT_TABLE.into(),
            columns: vec!["description".into()],
            terms: vec!["消費税".into()],
            order_column: ORDER_COLUMN.into(),
            limit: 5,
        };
        let json = serde_json::to_string(&query).expect("serialize");
        let parsed: StructuredQuery = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, query);
    }

    #[test]
    fn record_fields_align() {
        let record = IncidentRecord {
            incident_number: "INC00042".into(),
            error_code: "F5003".into(),
            ..Default::default()
        };
        let values = record.field_values();
        assert_eq!(values.len(), IncidentRecord::FIELD_NAMES.len());
        assert_eq!(values[0], "INC00042");
        assert_eq!(values[13], "F5003");
        assert_eq!(IncidentRecord::FIELD_NAMES[13], "error_code");
    }

    #[test]
    fn structured_result_serializes_records_as_array() {
        let result = StructuredResult {
            query: StructuredQuery {
                table: INCIDENT_TABLE.into(),
                columns: vec![],
                terms: vec![],
                order_column: ORDER_COLUMN.into(),
                limit: 5,
            },
            records: vec![],
        };
        let json = serde_json::to_value(&result).expect("serialize");
        assert!(json["records"].is_array());
        assert_eq!(json["records"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn reliability_tier_display() {
        assert_eq!(ReliabilityTier::High.to_string(), "high");
        assert_eq!(ReliabilityTier::Low.to_string(), "low");
    }

    #[test]
    fn run_note_describes_slot() {
        let note = RunNote::ArtifactReadFailure {
            slot: "structured_results".into(),
            detail: "invalid JSON".into(),
        };
        assert!(note.describe().contains("structured_results"));
    }
}
