//! Report stage.
//!
//! The final stage rebuilds its inputs from the handoff store rather than
//! from in-memory values, so a report can be produced for any run whose
//! slots survive. Every read goes through the encoding-fallback discipline;
//! a slot that cannot be read in any encoding becomes a run note and the
//! report is generated from whatever remains readable. Only a failed persist
//! (after its one retry) is fatal here.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::warn;

use incidentscout_handoff::{HandoffStore, Slot};
use incidentscout_report::{
    render_incident_report, render_knowledge_report, topic_keyword, write_report,
};
use incidentscout_shared::{
    IncidentRecord, IncidentScoutError, KeywordSet, KnowledgeResult, Result, RunNote,
    StructuredResult,
};

use crate::querygen;

/// Generate and persist the final report for a run.
///
/// `fallback_ran` is the branch decision made at query execution; it selects
/// the layout (incident detail vs external knowledge). Returns the path the
/// report was written to.
pub fn write_run_report(
    handoff: &HandoffStore,
    reports_dir: &Path,
    date: NaiveDate,
    keywords: &KeywordSet,
    fallback_ran: bool,
    mut notes: Vec<RunNote>,
) -> Result<PathBuf> {
    let query = match handoff.read_text(Slot::OriginalQuery) {
        Ok(text) => text,
        Err(e) => {
            push_read_note(&mut notes, Slot::OriginalQuery, e);
            String::new()
        }
    };

    let content = if fallback_ran {
        let knowledge = match handoff.read_json::<KnowledgeResult>(Slot::KnowledgeResults) {
            Ok(knowledge) => knowledge,
            Err(e) => {
                push_read_note(&mut notes, Slot::KnowledgeResults, e);
                KnowledgeResult::default()
            }
        };
        render_knowledge_report(&query, &knowledge, &notes)
    } else {
        let records = match handoff.read_json::<Vec<IncidentRecord>>(Slot::StructuredResults) {
            Ok(records) => records,
            Err(e) => {
                push_read_note(&mut notes, Slot::StructuredResults, e);
                vec![]
            }
        };
        let result = StructuredResult {
            query: querygen::build_query(keywords),
            records,
        };
        render_incident_report(&query, &result, &notes)
    };

    write_report(reports_dir, date, &topic_keyword(keywords), &content)
}

fn push_read_note(notes: &mut Vec<RunNote>, slot: Slot, error: IncidentScoutError) {
    warn!(slot = slot.name(), error = %error, "handoff artifact unreadable, continuing");
    let detail = match error {
        IncidentScoutError::ArtifactRead { message, .. } => message,
        other => other.to_string(),
    };
    notes.push(RunNote::ArtifactReadFailure {
        slot: slot.name().to_string(),
        detail,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use incidentscout_shared::RunId;
    use uuid::Uuid;

    fn test_handoff() -> (HandoffStore, PathBuf) {
        let base = std::env::temp_dir().join(format!("is_reporting_{}", Uuid::now_v7()));
        let handoff = HandoffStore::create(&base.join("handoff"), &RunId::new()).unwrap();
        (handoff, base.join("reports"))
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 15).unwrap()
    }

    #[test]
    fn renders_incident_layout_from_slots() {
        let (handoff, reports) = test_handoff();
        handoff
            .write_text(Slot::OriginalQuery, "FB01で消費税が自動計算されない")
            .unwrap();
        let records = vec![IncidentRecord {
            incident_number: "INC00042".into(),
            resolution: "OB40で割当を確認してください。".into(),
            ..Default::default()
        }];
        handoff.write_json(Slot::StructuredResults, &records).unwrap();

        let keywords = KeywordSet::from(vec!["FB01".into()]);
        let path = write_run_report(&handoff, &reports, date(), &keywords, false, vec![]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("FB01で消費税が自動計算されない"));
        assert!(content.contains("INC00042"));
        assert!(content.contains("OB40で割当を確認してください。"));
        assert!(path.file_name().unwrap().to_str().unwrap().contains("FB01"));
    }

    #[test]
    fn corrupt_results_slot_still_produces_a_report() {
        let (handoff, reports) = test_handoff();
        handoff.write_text(Slot::OriginalQuery, "query").unwrap();
        // Not valid JSON under any decoding
        std::fs::write(handoff.slot_path(Slot::StructuredResults), [0xFF, 0xFE, 0x00, 0x7B])
            .unwrap();

        let keywords = KeywordSet::from(vec!["FB01".into()]);
        let path = write_run_report(&handoff, &reports, date(), &keywords, false, vec![]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("## Run notes"));
        assert!(content.contains("structured_results"));
    }

    #[test]
    fn missing_knowledge_slot_degrades_to_empty() {
        let (handoff, reports) = test_handoff();
        handoff.write_text(Slot::OriginalQuery, "query").unwrap();

        let keywords = KeywordSet::default();
        let path = write_run_report(&handoff, &reports, date(), &keywords, true, vec![]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("no external information was found"));
        assert!(content.contains("knowledge_results"));
    }
}
