//! External knowledge gateway — keyword search over the public web.
//!
//! [`KnowledgeGateway`] is the capability interface the fallback branch calls
//! when the structured store has no matching incident. The production
//! implementation targets an Exa-style keyword search API with a
//! published-after freshness filter. Transport failures map to
//! `KnowledgeUnavailable`, which the knowledge stage recovers from with an
//! empty result set; it is never fatal to the run.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use incidentscout_shared::{IncidentScoutError, KnowledgeGatewayConfig, Result};

/// One ranked document returned by the gateway, before annotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedDocument {
    /// Source locator (URL).
    pub locator: String,
    /// Document title, when the source exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Publish time reported by the source, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// Content excerpt for annotation.
    #[serde(default)]
    pub excerpt: String,
}

/// Keyword-based external search capability.
pub trait KnowledgeGateway: Send + Sync {
    /// Search for documents matching `keywords`, restricted to results
    /// published on or after `published_after`. Returned order is the
    /// gateway's ranking.
    fn search(
        &self,
        keywords: &[String],
        published_after: NaiveDate,
    ) -> impl Future<Output = Result<Vec<RankedDocument>>> + Send;
}

// ---------------------------------------------------------------------------
// Exa-style HTTP client
// ---------------------------------------------------------------------------

/// HTTP client for Exa-compatible keyword search endpoints.
pub struct ExaSearchClient {
    endpoint: String,
    api_key: String,
    max_results: u32,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ExaResponse {
    #[serde(default)]
    results: Vec<ExaResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExaResult {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    published_date: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

impl ExaSearchClient {
    /// Build a client from config, resolving the API key from its env var.
    pub fn from_config(config: &KnowledgeGatewayConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            IncidentScoutError::config(format!(
                "knowledge gateway API key not found. Set the {} environment variable.",
                config.api_key_env
            ))
        })?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("incidentscout/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| IncidentScoutError::KnowledgeUnavailable(format!("client build: {e}")))?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key,
            max_results: config.max_results,
            client,
        })
    }
}

impl KnowledgeGateway for ExaSearchClient {
    async fn search(
        &self,
        keywords: &[String],
        published_after: NaiveDate,
    ) -> Result<Vec<RankedDocument>> {
        let body = serde_json::json!({
            "query": keywords.join(" "),
            "type": "keyword",
            "numResults": self.max_results,
            "startPublishedDate": published_after.format("%Y-%m-%d").to_string(),
            "contents": { "text": true },
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| IncidentScoutError::KnowledgeUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IncidentScoutError::KnowledgeUnavailable(format!(
                "HTTP {status}"
            )));
        }

        let parsed: ExaResponse = response
            .json()
            .await
            .map_err(|e| IncidentScoutError::KnowledgeUnavailable(format!("invalid response: {e}")))?;

        let documents = parsed
            .results
            .into_iter()
            .map(|r| RankedDocument {
                locator: r.url,
                title: r.title,
                published_at: r
                    .published_date
                    .as_deref()
                    .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
                    .map(|d| d.with_timezone(&Utc)),
                excerpt: r.text.unwrap_or_default(),
            })
            .collect();

        Ok(documents)
    }
}
