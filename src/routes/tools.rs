// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP shim over the tool router.

use crate::error::{AppError, Result};
use crate::tools::{ToolResponse, ToolRouter};
use crate::AppState;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tools", get(list_tools))
        .route("/tools/{name}", post(call_tool))
}

async fn list_tools() -> Result<Json<ToolResponse>> {
    let definitions =
        serde_json::to_value(ToolRouter::definitions()).map_err(|e| AppError::Internal(e.into()))?;
    Ok(Json(ToolResponse::success(definitions)))
}

/// Run one tool. The body is the arguments object and may be empty.
async fn call_tool(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: axum::body::Bytes,
) -> Response {
    let arguments = if body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => value,
            Err(e) => {
                return AppError::BadRequest(format!("Invalid JSON body: {}", e)).into_response()
            }
        }
    };

    match state.tools.execute(&name, arguments).await {
        Ok(result) => Json(ToolResponse::success(result)).into_response(),
        Err(err) => err.into_response(),
    }
}
