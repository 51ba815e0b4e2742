//! Run orchestration.
//!
//! One run walks the fixed state machine
//! `Start → KeywordExtracted → QueryBuilt → QueryExecuted →
//! {KnowledgeGathered | KnowledgeSkipped} → ReportWritten → Done`.
//! The single branch condition is the structured record count: exactly zero
//! rows routes through the knowledge fallback, one or more skips it. Errors
//! never select the branch; a stage either degrades in place (recording a
//! run note) or aborts the whole run.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::{debug, error, info, instrument};

use incidentscout_handoff::{HandoffStore, Slot};
use incidentscout_llm::CompletionService;
use incidentscout_search::KnowledgeGateway;
use incidentscout_shared::{INCIDENT_TABLE, KeywordSet, Result, RunId, RunNote};
use incidentscout_store::IncidentStore;

use crate::{keywords, knowledge, querygen, reporting};

/// Everything a run needs beyond its collaborator services.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The user's incident query, verbatim.
    pub query: String,
    /// Path of the structured incident database.
    pub db_path: PathBuf,
    /// Root directory for per-run handoff namespaces.
    pub handoff_root: PathBuf,
    /// Directory reports are written into.
    pub reports_dir: PathBuf,
    /// Run date: report naming and the knowledge freshness filter.
    pub run_date: NaiveDate,
}

/// Stages of one run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Start,
    KeywordExtracted,
    QueryBuilt,
    QueryExecuted,
    KnowledgeGathered,
    KnowledgeSkipped,
    ReportWritten,
    Done,
}

impl PipelineState {
    /// Short label for progress display and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Start => "starting",
            Self::KeywordExtracted => "keywords extracted",
            Self::QueryBuilt => "query built",
            Self::QueryExecuted => "query executed",
            Self::KnowledgeGathered => "external knowledge gathered",
            Self::KnowledgeSkipped => "external knowledge skipped",
            Self::ReportWritten => "report written",
            Self::Done => "done",
        }
    }
}

/// Observer for run progress; the CLI renders these, tests stay silent.
pub trait ProgressReporter: Send + Sync {
    fn on_state(&self, state: PipelineState);
}

/// No-op progress reporter.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn on_state(&self, _state: PipelineState) {}
}

/// Outcome summary of a completed run.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: RunId,
    pub report_path: PathBuf,
    pub keywords: KeywordSet,
    pub record_count: usize,
    pub knowledge_count: usize,
    pub fallback_ran: bool,
    pub notes: Vec<RunNote>,
    pub elapsed: Duration,
}

/// Execute one full pipeline run.
#[instrument(skip_all, fields(query_len = config.query.len()))]
pub async fn run_pipeline<C, G, P>(
    config: &PipelineConfig,
    completion: &C,
    gateway: &G,
    progress: &P,
) -> Result<RunReport>
where
    C: CompletionService,
    G: KnowledgeGateway,
    P: ProgressReporter,
{
    let started = Instant::now();
    let run_id = RunId::new();
    info!(%run_id, "pipeline run started");

    let mut state = PipelineState::Start;
    progress.on_state(state);

    let handoff = HandoffStore::create(&config.handoff_root, &run_id)?;
    handoff.write_text(Slot::OriginalQuery, &config.query)?;

    let mut notes: Vec<RunNote> = Vec::new();

    // Keyword extraction: degrades, never aborts.
    let (keywords, note) = keywords::extract_keywords(completion, &config.query).await;
    notes.extend(note);
    state = advance(state, PipelineState::KeywordExtracted, progress);

    // Query build: fixed shape, persisted before the stage returns.
    querygen::build_and_persist(&handoff, &keywords)?;
    state = advance(state, PipelineState::QueryBuilt, progress);

    // Query execution: reads the persisted query back, validates it against
    // the live schema, and records the definitive match count. Store
    // unavailability here aborts the run.
    let store = IncidentStore::open(&config.db_path).await.map_err(|e| {
        error!(stage = "query execution", error = %e, "run aborted");
        e
    })?;
    let query = handoff.read_json(Slot::GeneratedQuery)?;
    let schema = store.table_columns(INCIDENT_TABLE).await?;
    querygen::validate_query(&query, &schema)?;
    let records = store.execute_search(&query).await?;
    info!(count = records.len(), "structured search complete");
    handoff.write_json(Slot::StructuredResults, &records)?;
    state = advance(state, PipelineState::QueryExecuted, progress);

    // The branch: exactly zero records routes to external knowledge.
    let fallback_ran = records.is_empty();
    let knowledge_count = if fallback_ran {
        let (result, note) =
            knowledge::gather_knowledge(completion, gateway, &keywords, config.run_date).await;
        notes.extend(note);
        handoff.write_json(Slot::KnowledgeResults, &result)?;
        state = advance(state, PipelineState::KnowledgeGathered, progress);
        result.len()
    } else {
        debug!("structured hits present, skipping knowledge gathering");
        state = advance(state, PipelineState::KnowledgeSkipped, progress);
        0
    };

    // Report: rebuilt from the handoff slots, not in-memory values.
    let report_path = reporting::write_run_report(
        &handoff,
        &config.reports_dir,
        config.run_date,
        &keywords,
        fallback_ran,
        notes.clone(),
    )
    .map_err(|e| {
        error!(stage = "report", error = %e, "run aborted");
        e
    })?;
    state = advance(state, PipelineState::ReportWritten, progress);

    let _ = advance(state, PipelineState::Done, progress);
    let elapsed = started.elapsed();
    info!(%run_id, ?elapsed, report = %report_path.display(), "pipeline run finished");

    Ok(RunReport {
        run_id,
        report_path,
        keywords,
        record_count: records.len(),
        knowledge_count,
        fallback_ran,
        notes,
        elapsed,
    })
}

fn advance<P: ProgressReporter>(from: PipelineState, to: PipelineState, progress: &P) -> PipelineState {
    debug!(from = from.label(), to = to.label(), "state transition");
    progress.on_state(to);
    to
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use incidentscout_search::RankedDocument;
    use incidentscout_shared::{IncidentRecord, IncidentScoutError};
    use uuid::Uuid;

    const ANNOTATION_JSON: &str = r#"{
        "reliability": "medium",
        "reliability_rationale": "community forum with accepted answer",
        "content_type": "forum post",
        "key_points": ["F5003 means missing tax account assignment"],
        "quotations": ["Check transaction OB40."],
        "remediation": {
            "root_cause": "Tax account determination is not configured.",
            "recommended_actions": ["Review OB40", "Correct FTXP"]
        }
    }"#;

    /// Completion fake that answers the extraction role with a fixed keyword
    /// list and every other role with a fixed annotation.
    struct ScriptedCompletion {
        keyword_output: &'static str,
    }

    impl CompletionService for ScriptedCompletion {
        async fn complete(&self, role: &str, _input: &str) -> Result<String> {
            if role == keywords::EXTRACTION_ROLE {
                Ok(self.keyword_output.to_string())
            } else {
                Ok(ANNOTATION_JSON.to_string())
            }
        }
    }

    struct FixedGateway(Vec<RankedDocument>);

    impl KnowledgeGateway for FixedGateway {
        async fn search(
            &self,
            _keywords: &[String],
            _published_after: NaiveDate,
        ) -> Result<Vec<RankedDocument>> {
            Ok(self.0.clone())
        }
    }

    struct DownGateway;

    impl KnowledgeGateway for DownGateway {
        async fn search(
            &self,
            _keywords: &[String],
            _published_after: NaiveDate,
        ) -> Result<Vec<RankedDocument>> {
            Err(IncidentScoutError::KnowledgeUnavailable("HTTP 503".into()))
        }
    }

    fn test_config(base: &std::path::Path, query: &str) -> PipelineConfig {
        PipelineConfig {
            query: query.to_string(),
            db_path: base.join("incidents.db"),
            handoff_root: base.join("handoff"),
            reports_dir: base.join("reports"),
            run_date: NaiveDate::from_ymd_opt(2025, 4, 15).unwrap(),
        }
    }

    fn test_base() -> PathBuf {
        std::env::temp_dir().join(format!("is_pipeline_{}", Uuid::now_v7()))
    }

    fn sample_incident() -> IncidentRecord {
        IncidentRecord {
            incident_number: "INC00042".into(),
            created_at: "2025-04-01T09:30:00+09:00".into(),
            status: "解決済み".into(),
            priority: "高".into(),
            category: "財務会計".into(),
            subcategory: "伝票登録".into(),
            system_name: "SAP ERP".into(),
            module: "FI-GL".into(),
            short_description: "FB01で消費税が自動計算されない".into(),
            description: "FB01の伝票登録時に消費税が自動計算されません。".into(),
            resolution: "OB40で税コードの割当を確認してください。".into(),
            assigned_to: "佐藤".into(),
            updated_at: "2025-04-02T15:00:00+09:00".into(),
            error_code: "F5003".into(),
            affected_version: "ECC 6.0".into(),
        }
    }

    async fn seed_store(config: &PipelineConfig) {
        let store = IncidentStore::open(&config.db_path).await.unwrap();
        store.insert_incident(&sample_incident()).await.unwrap();
    }

    fn one_doc() -> Vec<RankedDocument> {
        vec![RankedDocument {
            locator: "https://community.sap.com/t5/f5003".into(),
            title: Some("F5003 tax determination".into()),
            published_at: None,
            excerpt: "The F5003 error occurs when tax accounts are unassigned.".into(),
        }]
    }

    #[tokio::test]
    async fn database_hit_skips_fallback() {
        let base = test_base();
        let config = test_config(&base, "FB01で消費税が自動計算されません");
        seed_store(&config).await;

        let completion = ScriptedCompletion { keyword_output: "F5003" };
        let report = run_pipeline(&config, &completion, &FixedGateway(one_doc()), &SilentProgress)
            .await
            .unwrap();

        assert!(!report.fallback_ran);
        assert_eq!(report.record_count, 1);
        assert_eq!(report.knowledge_count, 0);
        assert!(report.notes.is_empty());

        let content = std::fs::read_to_string(&report.report_path).unwrap();
        assert!(content.contains("INC00042"));
        assert!(content.contains("OB40で税コードの割当を確認してください。"));
        assert!(!content.contains("External source analysis"));

        // knowledge_results is only written when the fallback ran
        let handoff = HandoffStore::open(&config.handoff_root, &report.run_id).unwrap();
        assert!(handoff.exists(Slot::StructuredResults));
        assert!(!handoff.exists(Slot::KnowledgeResults));
    }

    #[tokio::test]
    async fn zero_rows_routes_through_knowledge_fallback() {
        let base = test_base();
        let config = test_config(&base, "未知のエラーXYZ-9999について");
        seed_store(&config).await;

        let completion = ScriptedCompletion { keyword_output: "XYZ-9999" };
        let report = run_pipeline(&config, &completion, &FixedGateway(one_doc()), &SilentProgress)
            .await
            .unwrap();

        assert!(report.fallback_ran);
        assert_eq!(report.record_count, 0);
        assert_eq!(report.knowledge_count, 1);

        let content = std::fs::read_to_string(&report.report_path).unwrap();
        assert!(content.contains("External source analysis"));
        assert!(content.contains("https://community.sap.com/t5/f5003"));
        assert!(content.contains("Review OB40"));

        let handoff = HandoffStore::open(&config.handoff_root, &report.run_id).unwrap();
        assert!(handoff.exists(Slot::KnowledgeResults));
    }

    #[tokio::test]
    async fn gateway_outage_on_fallback_still_produces_report() {
        let base = test_base();
        let config = test_config(&base, "未知のエラーXYZ-9999について");
        seed_store(&config).await;

        let completion = ScriptedCompletion { keyword_output: "XYZ-9999" };
        let report = run_pipeline(&config, &completion, &DownGateway, &SilentProgress)
            .await
            .unwrap();

        assert!(report.fallback_ran);
        assert_eq!(report.knowledge_count, 0);
        assert!(report
            .notes
            .iter()
            .any(|n| matches!(n, RunNote::KnowledgeGatewayUnavailable { .. })));

        let content = std::fs::read_to_string(&report.report_path).unwrap();
        assert!(content.contains("no external information was found"));
        assert!(content.contains("## Run notes"));
    }

    #[tokio::test]
    async fn unavailable_store_aborts_without_report() {
        let base = test_base();
        let mut config = test_config(&base, "FB01の問い合わせ");
        // A directory is not a usable database file
        std::fs::create_dir_all(base.join("not-a-db")).unwrap();
        config.db_path = base.join("not-a-db");

        let completion = ScriptedCompletion { keyword_output: "FB01" };
        let err = run_pipeline(&config, &completion, &FixedGateway(one_doc()), &SilentProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, IncidentScoutError::StoreUnavailable(_)));
        assert!(!config.reports_dir.exists());
    }

    #[tokio::test]
    async fn degraded_extraction_searches_nothing_and_falls_back() {
        let base = test_base();
        let config = test_config(&base, "???");
        seed_store(&config).await;

        // Prose instead of a keyword list parses to an empty set
        let completion = ScriptedCompletion {
            keyword_output: "I'm sorry, I could not find any meaningful keywords in this query \
                             because it does not describe a concrete technical incident at all.",
        };
        let report = run_pipeline(&config, &completion, &FixedGateway(vec![]), &SilentProgress)
            .await
            .unwrap();

        // Empty keyword set matches nothing, so the run takes the fallback
        assert!(report.keywords.is_empty());
        assert_eq!(report.record_count, 0);
        assert!(report.fallback_ran);
        assert!(report
            .notes
            .iter()
            .any(|n| matches!(n, RunNote::ExtractionDegraded { .. })));
    }

    #[tokio::test]
    async fn slots_record_every_stage() {
        let base = test_base();
        let config = test_config(&base, "FB01で消費税が自動計算されません");
        seed_store(&config).await;

        let completion = ScriptedCompletion { keyword_output: "F5003" };
        let report = run_pipeline(&config, &completion, &FixedGateway(vec![]), &SilentProgress)
            .await
            .unwrap();

        let handoff = HandoffStore::open(&config.handoff_root, &report.run_id).unwrap();
        assert_eq!(
            handoff.read_text(Slot::OriginalQuery).unwrap(),
            "FB01で消費税が自動計算されません"
        );

        let query: incidentscout_shared::StructuredQuery =
            handoff.read_json(Slot::GeneratedQuery).unwrap();
        assert_eq!(query.terms, ["F5003"]);

        let records: Vec<IncidentRecord> = handoff.read_json(Slot::StructuredResults).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].incident_number, "INC00042");
    }
}
