//! Letta archival memory over its REST API.
//!
//! [`LettaArchival::connect`] probes `GET /v1/health/`, then resolves the
//! configured agent by name (`GET /v1/agents`), creating it with
//! `POST /v1/agents` when missing. Passages live under
//! `/v1/agents/{id}/archival`; core memory blocks under
//! `/v1/agents/{id}/memory`.
//!
//! A failed probe or agent lookup is reported as
//! [`RecallError::BackendUnavailable`]; the harness then runs without
//! archival instead of failing.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

use recall_harness_core::error::RecallError;
use recall_harness_core::models::ArchivalPassage;
use recall_harness_core::store::ArchivalMemory;

use crate::config::ArchivalConfig;
use crate::http;

const MAX_RETRIES: u32 = 1;

pub struct LettaArchival {
    client: Client,
    base_url: String,
    agent_id: String,
}

impl LettaArchival {
    /// Probe the server and resolve the agent.
    pub async fn connect(config: &ArchivalConfig) -> Result<Self> {
        let unavailable = |e: anyhow::Error| -> anyhow::Error {
            RecallError::unavailable("archival", format!("{:#}", e)).into()
        };

        let client = http::client(config.timeout_secs)?;
        let base_url = config.base_url.trim_end_matches('/').to_string();

        http::send_json(
            client.get(format!("{}/v1/health/", base_url)),
            "Letta health",
            0,
        )
        .await
        .map_err(unavailable)?;

        let agent_id = resolve_agent(&client, &base_url, config)
            .await
            .map_err(unavailable)?;
        info!(agent = %config.agent_name, id = %agent_id, "archival memory connected");

        Ok(Self {
            client,
            base_url,
            agent_id,
        })
    }

    fn archival_url(&self) -> String {
        format!("{}/v1/agents/{}/archival", self.base_url, self.agent_id)
    }
}

async fn resolve_agent(client: &Client, base_url: &str, config: &ArchivalConfig) -> Result<String> {
    let name = config.agent_name.as_str();
    let agents = http::send_json(
        client.get(format!("{}/v1/agents", base_url)),
        "Letta list agents",
        MAX_RETRIES,
    )
    .await?;

    if let Some(id) = find_agent(&agents, name)? {
        return Ok(id);
    }

    debug!(agent = %name, "creating archival agent");
    let created = http::send_json(
        client
            .post(format!("{}/v1/agents", base_url))
            .json(&create_agent_payload(config)),
        "Letta create agent",
        MAX_RETRIES,
    )
    .await?;
    agent_id(&created).ok_or_else(|| anyhow!("Letta create agent: response has no id"))
}

fn create_agent_payload(config: &ArchivalConfig) -> Value {
    json!({
        "name": config.agent_name,
        "system": config.system,
        "memory_blocks": config.memory_blocks,
    })
}

fn agent_id(agent: &Value) -> Option<String> {
    agent.get("id").and_then(|v| v.as_str()).map(str::to_string)
}

fn find_agent(agents: &Value, name: &str) -> Result<Option<String>> {
    Ok(http::list_items(agents, "agents")?
        .iter()
        .find(|a| a.get("name").and_then(|n| n.as_str()) == Some(name))
        .and_then(agent_id))
}

fn parse_passages(json: &Value) -> Result<Vec<ArchivalPassage>> {
    Ok(http::list_items(json, "passages")?
        .iter()
        .filter_map(|p| http::text_field(p, &["text", "content"]))
        .map(|text| ArchivalPassage {
            text: text.to_string(),
        })
        .collect())
}

#[async_trait]
impl ArchivalMemory for LettaArchival {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<ArchivalPassage>> {
        let request = self
            .client
            .get(self.archival_url())
            .query(&[("query", query.to_string()), ("limit", limit.to_string())]);
        let json = http::send_json(request, "Letta archival search", MAX_RETRIES).await?;
        let mut passages = parse_passages(&json)?;
        passages.truncate(limit);
        Ok(passages)
    }

    async fn insert(&self, text: &str) -> Result<()> {
        let request = self
            .client
            .post(self.archival_url())
            .json(&json!({ "text": text }));
        http::send_json(request, "Letta archival insert", MAX_RETRIES).await?;
        Ok(())
    }

    async fn core_memory(&self) -> Result<Option<Value>> {
        let request = self
            .client
            .get(format!("{}/v1/agents/{}/memory", self.base_url, self.agent_id));
        let json = http::send_json(request, "Letta core memory", MAX_RETRIES).await?;
        Ok((!json.is_null()).then_some(json))
    }
}
