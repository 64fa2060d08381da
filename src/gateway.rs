//! Boundary to the external AI agents.
//!
//! The agents answer with an untyped `result` payload. Everything the
//! pipeline reads from it goes through [`GenerationPayload`] or
//! [`SchedulingPayload`], which report each expected field as present,
//! absent or malformed instead of failing the whole reply.
use crate::config::AgentsConfig;
use crate::model::{char_count, Platform, PostingOutcome, PostingStatus, Script, Scripts, TrendInsights, TrendItem};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use tracing::{debug, info, instrument, warn};

/// Reply envelope shared by both agents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<AgentResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AgentReply {
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            response: Some(AgentResponse {
                result: Some(result),
                message: None,
            }),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            response: None,
            error: Some(error.into()),
        }
    }

    pub fn result(&self) -> Option<&Value> {
        self.response.as_ref().and_then(|r| r.result.as_ref())
    }

    /// `error` first, then `response.message`.
    pub fn failure_message(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or_else(|| self.response.as_ref().and_then(|r| r.message.as_deref()))
            .filter(|m| !m.trim().is_empty())
    }
}

/// Runs one instruction against one agent. `Err` means the call itself blew
/// up; an agent-reported failure comes back as `Ok` with `success == false`.
#[async_trait]
pub trait AgentGateway: Send + Sync {
    async fn invoke(&self, instruction: &str, agent_id: &str) -> Result<AgentReply>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    Present(T),
    Absent,
    Malformed,
}

impl<T> Field<T> {
    pub fn present(self) -> Option<T> {
        match self {
            Field::Present(v) => Some(v),
            Field::Absent | Field::Malformed => None,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Field::Malformed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationPayload {
    pub trend_summary: Field<TrendInsights>,
    pub scripts: Field<Scripts>,
}

impl GenerationPayload {
    pub fn from_result(result: Option<&Value>) -> Self {
        let Some(obj) = result_object(result) else {
            return Self {
                trend_summary: Field::Absent,
                scripts: Field::Absent,
            };
        };
        Self {
            trend_summary: field(&obj, "trend_summary", parse_trend_insights),
            scripts: field(&obj, "scripts", parse_scripts),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulingPayload {
    pub posting_results: Field<Vec<PostingOutcome>>,
    pub summary: Field<String>,
}

impl SchedulingPayload {
    pub fn from_result(result: Option<&Value>) -> Self {
        let Some(obj) = result_object(result) else {
            return Self {
                posting_results: Field::Absent,
                summary: Field::Absent,
            };
        };
        Self {
            posting_results: field(&obj, "posting_results", parse_posting_results),
            summary: field(&obj, "summary", |v| v.as_str().map(str::to_string)),
        }
    }
}

/// Some agents hand back the result object as a JSON-encoded string.
fn result_object(result: Option<&Value>) -> Option<Map<String, Value>> {
    match result? {
        Value::Object(obj) => Some(obj.clone()),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(obj)) => Some(obj),
            _ => None,
        },
        _ => None,
    }
}

fn field<T>(obj: &Map<String, Value>, key: &str, parse: impl Fn(&Value) -> Option<T>) -> Field<T> {
    match obj.get(key) {
        None | Some(Value::Null) => Field::Absent,
        Some(value) => match parse(value) {
            Some(parsed) => Field::Present(parsed),
            None => {
                warn!(field = key, "agent payload field has unexpected shape");
                Field::Malformed
            }
        },
    }
}

fn text(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn text_list(obj: &Map<String, Value>, key: &str) -> Vec<String> {
    obj.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_trend_insights(value: &Value) -> Option<TrendInsights> {
    let obj = value.as_object()?;
    let trends = obj
        .get("trends")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(|t| TrendItem {
                    topic: text(t, "topic"),
                    description: text(t, "description"),
                    hashtags: text_list(t, "hashtags"),
                    platforms: text_list(t, "platforms")
                        .iter()
                        .filter_map(|p| Platform::parse_platform(p))
                        .collect(),
                    content_angles: text_list(t, "content_angles"),
                })
                .collect()
        })
        .unwrap_or_default();
    Some(TrendInsights {
        summary: text(obj, "summary"),
        trends,
    })
}

fn parse_scripts(value: &Value) -> Option<Scripts> {
    let obj = value.as_object()?;
    let scripts = obj
        .iter()
        .filter_map(|(key, raw)| {
            let Some(platform) = Platform::parse_platform(key) else {
                debug!(key = %key, "ignoring script for unknown platform");
                return None;
            };
            let script = raw.as_object()?;
            let content = text(script, "content");
            let character_count = script
                .get("character_count")
                .and_then(Value::as_u64)
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or_else(|| char_count(&content));
            Some((
                platform,
                Script {
                    content,
                    hashtags: text_list(script, "hashtags"),
                    format: text(script, "format"),
                    character_count,
                },
            ))
        })
        .collect();
    Some(scripts)
}

fn parse_posting_results(value: &Value) -> Option<Vec<PostingOutcome>> {
    let rows = value.as_array()?;
    Some(
        rows.iter()
            .filter_map(Value::as_object)
            .map(|row| PostingOutcome {
                platform: text(row, "platform"),
                status: PostingStatus::from_agent(&text(row, "status")),
                message: text(row, "message"),
                post_url: row
                    .get("post_url")
                    .and_then(Value::as_str)
                    .filter(|u| !u.trim().is_empty())
                    .map(str::to_string),
            })
            .collect(),
    )
}

/// HTTP adapter for the agent endpoint: `POST {endpoint}` with
/// `{"message", "agent_id"}`.
#[derive(Clone)]
pub struct HttpAgentGateway {
    http: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl fmt::Debug for HttpAgentGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpAgentGateway")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl HttpAgentGateway {
    pub fn new(endpoint: Url, api_key: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent("contentflow/0.1")
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            endpoint,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn from_config(cfg: &AgentsConfig) -> Result<Self> {
        let endpoint = Url::parse(&cfg.endpoint).context("invalid agent endpoint URL")?;
        Self::new(endpoint, Some(cfg.api_key.clone()))
    }
}

#[async_trait]
impl AgentGateway for HttpAgentGateway {
    #[instrument(skip_all, fields(agent_id = %agent_id))]
    async fn invoke(&self, instruction: &str, agent_id: &str) -> Result<AgentReply> {
        let body = json!({ "message": instruction, "agent_id": agent_id });
        let mut request = self.http.post(self.endpoint.clone()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        info!(url = %self.endpoint, "invoking agent");
        let res = request.send().await.context("failed to reach agent endpoint")?;
        let status = res.status();
        let raw = res.text().await.context("failed to read agent response")?;
        debug!(%status, body = %raw, "agent response");

        match serde_json::from_str::<AgentReply>(&raw) {
            Ok(reply) if status.is_success() || !reply.success => Ok(reply),
            Ok(_) => {
                warn!(%status, "agent reported success with an error status");
                Err(anyhow!("agent endpoint error {}: {}", status, raw))
            }
            Err(err) if status.is_success() => {
                Err(anyhow!(err).context("invalid agent response JSON"))
            }
            Err(_) => {
                warn!(%status, "agent endpoint error");
                Err(anyhow!("agent endpoint error {}: {}", status, raw))
            }
        }
    }
}
