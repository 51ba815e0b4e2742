//! Keyword-extraction stage.

use incidentscout_llm::{CompletionService, parse_keyword_list};
use incidentscout_shared::{KeywordSet, RunNote};
use tracing::{info, warn};

/// System instruction for the extraction call. The role constrains output to
/// a flat comma-separated list so [`parse_keyword_list`] can recover terms
/// deterministically.
pub const EXTRACTION_ROLE: &str = "\
You are a search keyword extractor for IT incident management.
Given a user's incident description, extract the important search terms:
product and system names, module names, transaction codes, error codes,
and symptom phrases. Keep terms in the language they appear in.
Respond with ONLY a comma-separated list of keywords, nothing else.
Example: SAP ERP, 財務会計, FB01, 伝票登録, 消費税, 自動計算";

/// Extract search keywords from the user's query.
///
/// Never fails: an unreachable completion service or unusable output degrades
/// to an empty [`KeywordSet`] plus a run note, and the pipeline continues
/// (an empty set searches as match-nothing downstream).
pub async fn extract_keywords<C: CompletionService>(
    completion: &C,
    query: &str,
) -> (KeywordSet, Option<RunNote>) {
    let output = match completion.complete(EXTRACTION_ROLE, query).await {
        Ok(output) => output,
        Err(e) => {
            warn!(error = %e, "keyword extraction call failed");
            return (
                KeywordSet::default(),
                Some(RunNote::ExtractionDegraded {
                    detail: e.to_string(),
                }),
            );
        }
    };

    let keywords = parse_keyword_list(&output);
    if keywords.is_empty() {
        warn!("keyword extraction produced no usable terms");
        return (
            keywords,
            Some(RunNote::ExtractionDegraded {
                detail: "completion output contained no usable keyword list".to_string(),
            }),
        );
    }

    info!(count = keywords.len(), "keywords extracted");
    (keywords, None)
}
