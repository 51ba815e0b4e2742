//! Text completion service — the one opaque capability the pipeline leans on.
//!
//! [`CompletionService`] models a language model as a function from a
//! role/instruction plus input text to generated text. Everything
//! "intelligent" in the pipeline (keyword quality, reliability scoring) is
//! bounded by this capability; nothing else hard-codes it. The production
//! implementation speaks the OpenAI-compatible `chat/completions` protocol.

use serde::Deserialize;

use incidentscout_shared::{CompletionConfig, IncidentScoutError, KeywordSet, Result};

/// Opaque text-completion capability.
///
/// `role` is the system instruction defining the task; `input` is the text to
/// operate on. Implementations must not retry internally — retry and backoff
/// are the caller's collaborator concern.
pub trait CompletionService: Send + Sync {
    fn complete(
        &self,
        role: &str,
        input: &str,
    ) -> impl Future<Output = Result<String>> + Send;
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Completion client for OpenAI-compatible chat-completions endpoints.
pub struct HttpCompletionClient {
    endpoint: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl HttpCompletionClient {
    /// Build a client from config, resolving the API key from its env var.
    pub fn from_config(config: &CompletionConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            IncidentScoutError::config(format!(
                "completion API key not found. Set the {} environment variable.",
                config.api_key_env
            ))
        })?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("incidentscout/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| IncidentScoutError::Completion(format!("client build: {e}")))?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            client,
        })
    }
}

impl CompletionService for HttpCompletionClient {
    async fn complete(&self, role: &str, input: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": role },
                { "role": "user", "content": input },
            ],
            "temperature": 0.2,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| IncidentScoutError::Completion(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(IncidentScoutError::Completion(format!(
                "HTTP {status}: {}",
                truncate_chars(&detail, MAX_ERROR_DETAIL_CHARS)
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| IncidentScoutError::Completion(format!("invalid response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| IncidentScoutError::Completion("empty choices".into()))?;

        tracing::debug!(chars = content.len(), "completion received");
        Ok(content)
    }
}

/// Longest error-body excerpt carried into a completion error message.
const MAX_ERROR_DETAIL_CHARS: usize = 200;

/// Truncate to at most `max` characters, on a char boundary.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ---------------------------------------------------------------------------
// Keyword list parsing
// ---------------------------------------------------------------------------

/// Upper bound on a plausible single keyword; longer fragments mean the
/// model returned prose instead of a list.
const MAX_TERM_LEN: usize = 80;

/// Parse a completion's keyword output into a [`KeywordSet`].
///
/// The extraction role asks for a comma-separated list; both ASCII and
/// ideographic commas are accepted, as are newline-separated lists with
/// optional bullet markers. Order is preserved and duplicates are kept.
/// Unusable output (prose, refusals, over-long fragments) yields an empty
/// set — never an error, so downstream degrades to "no hits".
pub fn parse_keyword_list(output: &str) -> KeywordSet {
    let terms: Vec<String> = output
        .split(['\n', ',', '、', '，'])
        .map(|t| t.trim().trim_start_matches(['-', '*', '•']).trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    if terms.iter().any(|t| t.chars().count() > MAX_TERM_LEN) {
        return KeywordSet::default();
    }

    KeywordSet(terms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_list() {
        let ks = parse_keyword_list("SAP ERP, 財務会計, FB01, 伝票登録, 消費税, 自動計算");
        assert_eq!(ks.len(), 6);
        assert_eq!(ks.terms()[0], "SAP ERP");
        assert_eq!(ks.terms()[2], "FB01");
    }

    #[test]
    fn parses_ideographic_commas_and_bullets() {
        let ks = parse_keyword_list("SAP ERP、財務会計\n- F5003");
        assert_eq!(ks.terms(), ["SAP ERP", "財務会計", "F5003"]);
    }

    #[test]
    fn preserves_order_and_duplicates() {
        let ks = parse_keyword_list("FB01, SAP, FB01");
        assert_eq!(ks.terms(), ["FB01", "SAP", "FB01"]);
    }

    #[test]
    fn prose_output_is_unusable() {
        let prose = "I'm sorry, but I cannot extract keywords from this query because \
                     the text does not appear to describe a technical incident at all.";
        assert!(parse_keyword_list(prose).is_empty());
    }

    #[test]
    fn empty_output_yields_empty_set() {
        assert!(parse_keyword_list("").is_empty());
        assert!(parse_keyword_list("  \n ,, ").is_empty());
    }

    #[test]
    fn error_detail_truncates_multibyte_bodies_safely() {
        // 250 three-byte characters: any byte-indexed cut near 200 would
        // land inside a character
        let body = "認証に失敗しました。".repeat(25);
        assert!(!body.is_char_boundary(MAX_ERROR_DETAIL_CHARS));

        let detail = truncate_chars(&body, MAX_ERROR_DETAIL_CHARS);
        assert_eq!(detail.chars().count(), MAX_ERROR_DETAIL_CHARS);
        assert!(body.starts_with(detail));

        let short = "invalid api key";
        assert_eq!(truncate_chars(short, MAX_ERROR_DETAIL_CHARS), short);
    }

    #[test]
    fn chat_response_deserializes() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":"SAP ERP, FB01"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content, "SAP ERP, FB01");
    }
}
