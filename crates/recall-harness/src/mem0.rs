//! Hosted Mem0 fact memory over its REST API.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | add | `POST /v1/memories/` with `{messages, user_id}` |
//! | search | `POST /v1/memories/search/` with `{query, user_id, limit}` |
//! | get_all | `GET /v1/memories/?user_id=<subject>` |
//!
//! Requests authenticate with `Authorization: Token <key>`. List responses
//! may be a bare array or `{"results": [...]}`; each item carries its text
//! in `memory` (or `text`) and an optional relevance `score`.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use recall_harness_core::error::RecallError;
use recall_harness_core::models::{FactAck, FactHit, FactInput, FactRecord};
use recall_harness_core::store::FactMemory;

use crate::config::FactsConfig;
use crate::http;

const MAX_RETRIES: u32 = 2;

pub struct Mem0FactMemory {
    client: Client,
    base_url: String,
    api_key: String,
}

impl Mem0FactMemory {
    pub fn new(base_url: &str, api_key: String, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: http::client(timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Build from config, reading the key from `facts.api_key_env`.
    ///
    /// A missing or empty key is a configuration error.
    pub fn from_config(config: &FactsConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                RecallError::config(format!(
                    "{} not set (required by facts.provider = \"mem0\")",
                    config.api_key_env
                ))
            })?;
        Self::new(&config.base_url, api_key, config.timeout_secs)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth(&self) -> String {
        format!("Token {}", self.api_key)
    }
}

fn parse_hits(json: &Value) -> Result<Vec<FactHit>> {
    Ok(http::list_items(json, "results")?
        .iter()
        .filter_map(|item| {
            http::text_field(item, &["memory", "text"]).map(|text| FactHit {
                text: text.to_string(),
                confidence: item.get("score").and_then(|s| s.as_f64()),
            })
        })
        .collect())
}

fn parse_records(json: &Value) -> Result<Vec<FactRecord>> {
    Ok(http::list_items(json, "results")?
        .iter()
        .filter_map(|item| http::text_field(item, &["memory", "text"]))
        .map(|text| FactRecord {
            text: text.to_string(),
        })
        .collect())
}

#[async_trait]
impl FactMemory for Mem0FactMemory {
    async fn add(&self, input: FactInput, subject: &str) -> Result<FactAck> {
        let body = json!({
            "messages": input.into_messages(),
            "user_id": subject,
        });
        let request = self
            .client
            .post(self.url("/v1/memories/"))
            .header("Authorization", self.auth())
            .json(&body);
        let detail = http::send_json(request, "Mem0 add", MAX_RETRIES).await?;
        Ok(FactAck {
            backend: "mem0".to_string(),
            detail,
        })
    }

    async fn search(&self, text: &str, subject: &str, limit: usize) -> Result<Vec<FactHit>> {
        let body = json!({
            "query": text,
            "user_id": subject,
            "limit": limit,
        });
        let request = self
            .client
            .post(self.url("/v1/memories/search/"))
            .header("Authorization", self.auth())
            .json(&body);
        let json = http::send_json(request, "Mem0 search", MAX_RETRIES).await?;
        let mut hits = parse_hits(&json)?;
        hits.truncate(limit);
        Ok(hits)
    }

    async fn get_all(&self, subject: &str) -> Result<Vec<FactRecord>> {
        let request = self
            .client
            .get(self.url("/v1/memories/"))
            .query(&[("user_id", subject)])
            .header("Authorization", self.auth());
        let json = http::send_json(request, "Mem0 get_all", MAX_RETRIES).await?;
        parse_records(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wrapped_search_results() {
        let json = json!({
            "results": [
                { "id": "1", "memory": "Prefers green tea", "score": 0.82 },
                { "id": "2", "text": "Lives in Lisbon" },
                { "id": "3" }
            ]
        });
        let hits = parse_hits(&json).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].confidence, Some(0.82));
        assert_eq!(hits[1].text, "Lives in Lisbon");
        assert_eq!(hits[1].confidence, None);
    }

    #[test]
    fn parses_bare_list_records() {
        let json = json!([{ "memory": "a" }, { "memory": "b" }]);
        assert_eq!(parse_records(&json).unwrap().len(), 2);
    }

    #[test]
    fn missing_key_is_configuration_error() {
        let config = FactsConfig {
            provider: "mem0".into(),
            api_key_env: "RECALL_TEST_SURELY_UNSET_MEM0_KEY".into(),
            ..FactsConfig::default()
        };
        let err = Mem0FactMemory::from_config(&config).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<RecallError>(),
            Some(RecallError::Configuration(_))
        ));
    }

    #[test]
    fn trims_trailing_slash() {
        let mem0 = Mem0FactMemory::new("https://api.mem0.ai/", "k".into(), 5).unwrap();
        assert_eq!(mem0.url("/v1/memories/"), "https://api.mem0.ai/v1/memories/");
        assert_eq!(mem0.auth(), "Token k");
    }
}
