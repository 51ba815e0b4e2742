//! Markdown report rendering and persistence.
//!
//! Two fixed layouts: the incident-detail report (structured search hit) and
//! the external-knowledge report (fallback branch). Rendering is pure; the
//! write path owns the deterministic naming and the one persist retry.
//!
//! Verbatim rule: every incident field is reproduced exactly as stored —
//! no escaping, truncation, elision, or paraphrase, whatever the length.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{info, warn};

use incidentscout_shared::{
    IncidentRecord, IncidentScoutError, KeywordSet, KnowledgeResult, Result, RunNote,
    StructuredResult,
};

// ---------------------------------------------------------------------------
// Incident-detail layout
// ---------------------------------------------------------------------------

/// Render the report for a non-empty structured result.
///
/// Layout: overview, original query, a per-record field table reproducing all
/// fifteen fields, and a resolution section quoting each stored resolution.
pub fn render_incident_report(
    query: &str,
    result: &StructuredResult,
    notes: &[RunNote],
) -> String {
    let mut out = String::new();

    out.push_str("# Incident research report\n\n");

    out.push_str("## Overview\n\n");
    let _ = writeln!(
        out,
        "{} matching incident record(s) were found in the structured incident database.\n",
        result.len()
    );

    push_query_section(&mut out, query);

    out.push_str("## Incident record details\n\n");
    for record in &result.records {
        push_record_table(&mut out, record);
    }

    out.push_str("## Resolution\n\n");
    for record in &result.records {
        let _ = writeln!(out, "### {}\n", record.incident_number);
        out.push_str(&record.resolution);
        out.push_str("\n\n");
    }

    push_notes_section(&mut out, notes);
    out
}

/// One record as a field/value table. Values are inserted exactly as stored.
fn push_record_table(out: &mut String, record: &IncidentRecord) {
    let _ = writeln!(out, "### {}\n", record.incident_number);
    out.push_str("| Field | Value |\n|---|---|\n");
    for (name, value) in IncidentRecord::FIELD_NAMES
        .iter()
        .zip(record.field_values())
    {
        let _ = writeln!(out, "| {name} | {value} |");
    }
    out.push('\n');
}

// ---------------------------------------------------------------------------
// External-knowledge layout
// ---------------------------------------------------------------------------

/// Render the report for the fallback branch.
///
/// Layout: overview, original query, per-source analysis with reliability
/// tier, aggregated root-cause analysis, ranked recommendations, example
/// implementation, and alternative approaches.
pub fn render_knowledge_report(
    query: &str,
    result: &KnowledgeResult,
    notes: &[RunNote],
) -> String {
    let mut out = String::new();

    out.push_str("# Incident research report\n\n");

    out.push_str("## Overview\n\n");
    if result.is_empty() {
        out.push_str(
            "No matching incident records were found in the structured incident database, \
             and no external information was found.\n\n",
        );
    } else {
        let _ = writeln!(
            out,
            "No matching incident records were found in the structured incident database. \
             {} external source(s) were gathered instead.\n",
            result.len()
        );
    }

    push_query_section(&mut out, query);

    if !result.is_empty() {
        out.push_str("## External source analysis\n\n");
        for (i, doc) in result.documents.iter().enumerate() {
            let _ = writeln!(out, "### Source {}: {}\n", i + 1, doc.locator);
            let _ = writeln!(out, "- Retrieved: {}", doc.retrieved_at.to_rfc3339());
            let _ = writeln!(
                out,
                "- Reliability: {} — {}",
                doc.reliability, doc.reliability_rationale
            );
            let _ = writeln!(out, "- Content type: {}\n", doc.content_type);

            if !doc.key_points.is_empty() {
                out.push_str("#### Key points\n\n");
                for point in &doc.key_points {
                    let _ = writeln!(out, "- {point}");
                }
                out.push('\n');
            }

            if !doc.quotations.is_empty() {
                out.push_str("#### Quotations\n\n");
                for quote in &doc.quotations {
                    let _ = writeln!(out, "> {quote}");
                }
                out.push('\n');
            }
        }

        out.push_str("## Root-cause analysis\n\n");
        for doc in &result.documents {
            if !doc.remediation.root_cause.is_empty() {
                let _ = writeln!(out, "{}\n", doc.remediation.root_cause);
            }
        }

        out.push_str("## Recommended actions\n\n");
        let mut rank = 0;
        for doc in &result.documents {
            for action in &doc.remediation.recommended_actions {
                rank += 1;
                let _ = writeln!(out, "{rank}. {action}");
            }
        }
        out.push('\n');

        if let Some(example) = result
            .documents
            .iter()
            .find_map(|d| d.remediation.example.as_deref())
        {
            out.push_str("## Example implementation\n\n");
            let _ = writeln!(out, "```\n{example}\n```\n");
        }

        let alternatives: Vec<&str> = result
            .documents
            .iter()
            .filter_map(|d| d.remediation.alternatives.as_deref())
            .collect();
        if !alternatives.is_empty() {
            out.push_str("## Alternative approaches\n\n");
            for alt in alternatives {
                let _ = writeln!(out, "{alt}\n");
            }
        }
    }

    push_notes_section(&mut out, notes);
    out
}

// ---------------------------------------------------------------------------
// Shared sections
// ---------------------------------------------------------------------------

fn push_query_section(out: &mut String, query: &str) {
    out.push_str("## Original query\n\n");
    out.push_str(query);
    out.push_str("\n\n");
}

fn push_notes_section(out: &mut String, notes: &[RunNote]) {
    if notes.is_empty() {
        return;
    }
    out.push_str("## Run notes\n\n");
    for note in notes {
        let _ = writeln!(out, "- {}", note.describe());
    }
    out.push('\n');
}

// ---------------------------------------------------------------------------
// Naming & persistence
// ---------------------------------------------------------------------------

/// Longest topic fragment carried into a report file name.
const MAX_TOPIC_LEN: usize = 24;

/// Derive the short topic keyword for the report file name.
///
/// The first keyword that survives ASCII-alphanumeric filtering wins;
/// a query with no usable keyword falls back to `incident`.
pub fn topic_keyword(keywords: &KeywordSet) -> String {
    for term in keywords.terms() {
        let cleaned: String = term
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(MAX_TOPIC_LEN)
            .collect();
        if !cleaned.is_empty() {
            return cleaned;
        }
    }
    "incident".to_string()
}

/// Deterministic report file name: `report_YYYYMMDD_<topic>.md`.
pub fn report_file_name(date: NaiveDate, topic: &str) -> String {
    format!("report_{}_{topic}.md", date.format("%Y%m%d"))
}

/// Write the report under `reports_dir`, overwrite permitted.
///
/// On a failed write the persist is retried exactly once with the alternate
/// strategy (topic-less ASCII name); a second failure surfaces
/// `ReportPersist`, which is fatal to the run. Returns the path written.
pub fn write_report(
    reports_dir: &Path,
    date: NaiveDate,
    topic: &str,
    content: &str,
) -> Result<PathBuf> {
    std::fs::create_dir_all(reports_dir)
        .map_err(|e| IncidentScoutError::io(reports_dir, e))?;

    let primary = reports_dir.join(report_file_name(date, topic));
    match std::fs::write(&primary, content) {
        Ok(()) => {
            info!(path = %primary.display(), "report written");
            return Ok(primary);
        }
        Err(e) => {
            warn!(path = %primary.display(), error = %e, "report write failed, retrying with fallback name");
        }
    }

    let fallback = reports_dir.join(format!("report_{}.md", date.format("%Y%m%d")));
    std::fs::write(&fallback, content).map_err(|e| {
        IncidentScoutError::report_persist(format!(
            "both write attempts failed under {}: {e}",
            reports_dir.display()
        ))
    })?;

    info!(path = %fallback.display(), "report written via fallback name");
    Ok(fallback)
}
