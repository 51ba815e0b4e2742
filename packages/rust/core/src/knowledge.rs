//! Knowledge-gathering stage (the fallback branch).
//!
//! Runs only when the structured search matched nothing. Documents come from
//! the [`KnowledgeGateway`] with a published-after freshness filter; each is
//! then annotated by the completion service with a reliability tier,
//! rationale, key points, quotations, and remediation guidance. A gateway
//! outage is never fatal: the stage records a run note and yields an empty
//! result so the report can state that nothing was found.

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use incidentscout_llm::CompletionService;
use incidentscout_search::{KnowledgeGateway, RankedDocument};
use incidentscout_shared::{
    KeywordSet, KnowledgeDocument, KnowledgeResult, ReliabilityTier, Remediation, RunNote,
};

/// System instruction for the per-document annotation call.
pub const ANNOTATION_ROLE: &str = "\
You are an IT incident research analyst. You receive one web source
(URL, title, and a content excerpt) gathered for an unresolved incident.
Assess it and respond with ONLY a JSON object, no prose and no code fences:
{
  \"reliability\": \"high\" | \"medium\" | \"low\",
  \"reliability_rationale\": \"why this tier (official docs rate high, vendor or well-known technical blogs medium, forums and unverified posts low; note when another gathered source corroborates a claim)\",
  \"content_type\": \"official documentation\" | \"technical blog\" | \"forum post\" | \"academic paper\" | \"other\",
  \"key_points\": [\"...\"],
  \"quotations\": [\"verbatim sentences copied from the excerpt\"],
  \"remediation\": {
    \"root_cause\": \"...\",
    \"recommended_actions\": [\"most promising first\"],
    \"example\": \"code or configuration example, or null\",
    \"alternatives\": \"alternative approaches and their trade-offs, or null\"
  }
}";

/// Excerpt length cap passed to the annotation call.
const MAX_EXCERPT_LEN: usize = 6000;

#[derive(Debug, Deserialize)]
struct AnnotationPayload {
    reliability: ReliabilityTier,
    #[serde(default)]
    reliability_rationale: String,
    #[serde(default)]
    content_type: String,
    #[serde(default)]
    key_points: Vec<String>,
    #[serde(default)]
    quotations: Vec<String>,
    #[serde(default)]
    remediation: Remediation,
}

/// Gather and annotate external knowledge for the given keywords.
///
/// `published_after` is the freshness filter; callers pass the run date, so
/// only documents published on or after that day qualify. Ranking order
/// from the gateway is preserved.
pub async fn gather_knowledge<C, G>(
    completion: &C,
    gateway: &G,
    keywords: &KeywordSet,
    published_after: NaiveDate,
) -> (KnowledgeResult, Option<RunNote>)
where
    C: CompletionService,
    G: KnowledgeGateway,
{
    let ranked = match gateway.search(keywords.terms(), published_after).await {
        Ok(ranked) => ranked,
        Err(e) => {
            warn!(error = %e, "knowledge gateway unavailable");
            return (
                KnowledgeResult::default(),
                Some(RunNote::KnowledgeGatewayUnavailable {
                    detail: e.to_string(),
                }),
            );
        }
    };

    info!(count = ranked.len(), "external documents gathered");

    let mut documents = Vec::with_capacity(ranked.len());
    for doc in ranked {
        documents.push(annotate_document(completion, doc).await);
    }

    (KnowledgeResult { documents }, None)
}

/// Annotate one ranked document via the completion service.
///
/// An annotation failure (call error or unparsable output) never drops the
/// document: it is kept with a low-reliability placeholder annotation so the
/// report still cites the source.
async fn annotate_document<C: CompletionService>(
    completion: &C,
    doc: RankedDocument,
) -> KnowledgeDocument {
    let excerpt = truncate_chars(&doc.excerpt, MAX_EXCERPT_LEN);
    let input = format!(
        "URL: {}\nTitle: {}\n\n{excerpt}",
        doc.locator,
        doc.title.as_deref().unwrap_or("(untitled)"),
    );

    let payload = match completion.complete(ANNOTATION_ROLE, &input).await {
        Ok(output) => parse_annotation(&output),
        Err(e) => {
            warn!(locator = %doc.locator, error = %e, "annotation call failed");
            None
        }
    };

    let payload = payload.unwrap_or_else(|| AnnotationPayload {
        reliability: ReliabilityTier::Low,
        reliability_rationale: "annotation unavailable; source not independently assessed".into(),
        content_type: "other".into(),
        key_points: vec![],
        quotations: vec![],
        remediation: Remediation::default(),
    });

    KnowledgeDocument {
        locator: doc.locator,
        retrieved_at: Utc::now(),
        reliability: payload.reliability,
        reliability_rationale: payload.reliability_rationale,
        content_type: payload.content_type,
        key_points: payload.key_points,
        quotations: payload.quotations,
        remediation: payload.remediation,
    }
}

/// Parse annotation output, tolerating code fences the role forbids anyway.
fn parse_annotation(output: &str) -> Option<AnnotationPayload> {
    let trimmed = output.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);

    match serde_json::from_str(body) {
        Ok(payload) => Some(payload),
        Err(e) => {
            warn!(error = %e, "annotation output was not valid JSON");
            None
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use incidentscout_shared::{IncidentScoutError, Result};

    const ANNOTATION_JSON: &str = r#"{
        "reliability": "medium",
        "reliability_rationale": "community forum with accepted answer",
        "content_type": "forum post",
        "key_points": ["F5003 means missing tax account assignment"],
        "quotations": ["Check transaction OB40."],
        "remediation": {
            "root_cause": "Tax account determination is not configured.",
            "recommended_actions": ["Review OB40", "Correct FTXP"],
            "example": null,
            "alternatives": null
        }
    }"#;

    struct FixedCompletion(&'static str);

    impl CompletionService for FixedCompletion {
        async fn complete(&self, _role: &str, _input: &str) -> Result<String> {
            Ok(self.0.to_string())
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

    fn ranked(locator: &str) -> RankedDocument {
        RankedDocument {
            locator: locator.into(),
            title: Some("F5003 tax determination".into()),
            published_at: None,
            excerpt: "The F5003 error occurs when tax accounts are unassigned.".into(),
        }
    }

    fn keywords() -> KeywordSet {
        KeywordSet::from(vec!["SAP ERP".into(), "F5003".into()])
    }

    fn run_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 15).unwrap()
    }

    #[tokio::test]
    async fn annotates_gathered_documents() {
        let completion = FixedCompletion(ANNOTATION_JSON);
        let gateway = FixedGateway(vec![ranked("https://a.example"), ranked("https://b.example")]);

        let (result, note) = gather_knowledge(&completion, &gateway, &keywords(), run_date()).await;

        assert!(note.is_none());
        assert_eq!(result.len(), 2);
        assert_eq!(result.documents[0].locator, "https://a.example");
        assert_eq!(result.documents[0].reliability, ReliabilityTier::Medium);
        assert_eq!(
            result.documents[0].remediation.recommended_actions,
            ["Review OB40", "Correct FTXP"]
        );
    }

    #[tokio::test]
    async fn gateway_outage_yields_empty_result_and_note() {
        let completion = FixedCompletion(ANNOTATION_JSON);
        let (result, note) =
            gather_knowledge(&completion, &DownGateway, &keywords(), run_date()).await;

        assert!(result.is_empty());
        assert!(matches!(note, Some(RunNote::KnowledgeGatewayUnavailable { .. })));
    }

    #[tokio::test]
    async fn unparsable_annotation_keeps_source_at_low_tier() {
        let completion = FixedCompletion("I could not assess this source.");
        let gateway = FixedGateway(vec![ranked("https://a.example")]);

        let (result, note) = gather_knowledge(&completion, &gateway, &keywords(), run_date()).await;

        assert!(note.is_none());
        assert_eq!(result.len(), 1);
        assert_eq!(result.documents[0].reliability, ReliabilityTier::Low);
        assert!(result.documents[0].reliability_rationale.contains("annotation unavailable"));
    }

    #[test]
    fn parse_annotation_strips_code_fences() {
        let fenced = format!("```json\n{ANNOTATION_JSON}\n```");
        let payload = parse_annotation(&fenced).expect("fenced JSON parses");
        assert_eq!(payload.content_type, "forum post");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("消費税計算", 3), "消費税");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
