// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tool invocation boundary.
//!
//! `ToolRouter::call` is the single entry point for every transport. Requests
//! name a tool and carry JSON arguments; responses are either
//! `{"ok": true, "result": ...}` or `{"ok": false, "error": {...}}`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, ErrorDescriptor, Result};
use crate::services::pipeline::{Pipeline, MAX_WEEKS};

/// Default `weeks` when the caller leaves it out.
pub const DEFAULT_WEEKS: u32 = 4;

#[derive(Debug, Clone, Deserialize)]
pub struct ToolRequest {
    /// Echoed back on the response, if present.
    #[serde(default)]
    pub id: Option<Value>,
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescriptor>,
}

impl ToolResponse {
    pub fn success(result: Value) -> Self {
        Self {
            id: None,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(err: &AppError) -> Self {
        Self {
            id: None,
            ok: false,
            result: None,
            error: Some(ErrorDescriptor::from(err)),
        }
    }

    fn with_id(mut self, id: Option<Value>) -> Self {
        self.id = id;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WeeksArgs {
    #[serde(default = "default_weeks")]
    weeks: u32,
}

fn default_weeks() -> u32 {
    DEFAULT_WEEKS
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ActivityArgs {
    activity_id: u64,
}

fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T> {
    // A missing arguments object behaves like `{}`.
    let arguments = if arguments.is_null() {
        json!({})
    } else {
        arguments
    };
    serde_json::from_value(arguments).map_err(|e| AppError::BadRequest(e.to_string()))
}

/// Dispatches tool calls to the pipeline.
#[derive(Clone)]
pub struct ToolRouter {
    pipeline: Arc<Pipeline>,
    shutdown: CancellationToken,
}

impl ToolRouter {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop starting weather lookups once `shutdown` is cancelled.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn definitions() -> Vec<ToolDefinition> {
        let weeks_schema = json!({
            "type": "object",
            "properties": {
                "weeks": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_WEEKS,
                    "default": DEFAULT_WEEKS,
                    "description": "Number of ISO weeks to cover, ending with the current week"
                }
            },
            "required": []
        });

        vec![
            ToolDefinition {
                name: "get_recent_activities",
                description: "List Strava activities from the last N weeks, oldest first.",
                input_schema: weeks_schema.clone(),
            },
            ToolDefinition {
                name: "get_weather_for_activity",
                description: "Historical weather at the start location of one activity \
                    on its local calendar date.",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "activity_id": {
                            "type": "integer",
                            "description": "Strava activity ID"
                        }
                    },
                    "required": ["activity_id"]
                }),
            },
            ToolDefinition {
                name: "get_weekly_summaries",
                description: "Weekly distance, pace and elevation correlated with weather \
                    conditions, plus activities that could not be enriched.",
                input_schema: weeks_schema,
            },
            ToolDefinition {
                name: "list_tools",
                description: "Describe the available tools.",
                input_schema: json!({ "type": "object", "properties": {}, "required": [] }),
            },
        ]
    }

    /// Handle one request.
    pub async fn call(&self, request: ToolRequest) -> ToolResponse {
        match self.execute(&request.tool, request.arguments).await {
            Ok(result) => ToolResponse::success(result).with_id(request.id),
            Err(err) => ToolResponse::failure(&err).with_id(request.id),
        }
    }

    /// Run the named tool, keeping the typed error for transports that map
    /// it onto their own status codes.
    pub async fn execute(&self, tool: &str, arguments: Value) -> Result<Value> {
        let result = self.dispatch(tool, arguments).await;
        if let Err(err) = &result {
            tracing::warn!(tool, code = err.code(), error = %err, "Tool call failed");
        }
        result
    }

    /// Handle one request given as raw JSON text.
    pub async fn call_raw(&self, raw: &str) -> ToolResponse {
        match serde_json::from_str::<ToolRequest>(raw) {
            Ok(request) => self.call(request).await,
            Err(e) => {
                let err = AppError::BadRequest(format!("Malformed tool request: {}", e));
                ToolResponse::failure(&err)
            }
        }
    }

    async fn dispatch(&self, tool: &str, arguments: Value) -> Result<Value> {
        tracing::debug!(tool, "Tool call");

        let result = match tool {
            "get_recent_activities" => {
                let args: WeeksArgs = parse_args(arguments)?;
                let activities = self.pipeline.recent_activities(args.weeks).await?;
                to_value(&activities)?
            }
            "get_weather_for_activity" => {
                let args: ActivityArgs = parse_args(arguments)?;
                let enriched = self.pipeline.weather_for_activity(args.activity_id).await?;
                to_value(&enriched)?
            }
            "get_weekly_summaries" => {
                let args: WeeksArgs = parse_args(arguments)?;
                let cancel = self.shutdown.child_token();
                let report = self.pipeline.run(args.weeks, &cancel).await?;
                to_value(&report)?
            }
            "list_tools" => to_value(&Self::definitions())?,
            other => return Err(AppError::NotFound(format!("Unknown tool: {}", other))),
        };

        Ok(result)
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| AppError::Internal(e.into()))
}
