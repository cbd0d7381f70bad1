//! The HTTP surface.
//!
//! `POST /mcp` carries one JSON-RPC request or a batch; `DELETE /mcp`
//! terminates the named session; `GET /mcp/sse` upgrades to server-sent
//! events; `GET /api/health` is the liveness probe.

use std::convert::Infallible;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use cyfr_core::{AuthMethod, Context, ErrorCode, RequestId};
use futures::StreamExt;
use serde_json::{Value, json};
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use crate::PROTOCOL_VERSION;
use crate::auth_gate::{self, SESSION_HEADER};
use crate::jsonrpc::{Decoded, RpcResponse};
use crate::sse::SseRecord;
use crate::state::AppState;

/// SSE keep-alive interval.
const KEEP_ALIVE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(15);

/// Build the axum application.
#[must_use]
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/mcp", axum::routing::post(handle_mcp).delete(handle_delete))
        .route("/mcp/sse", get(handle_sse))
        .route("/api/health", get(handle_health))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_health() -> impl IntoResponse {
    axum::Json(json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}))
}

fn common_headers(request_id: &RequestId) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(PROTOCOL_VERSION) {
        headers.insert("mcp-protocol-version", value);
    }
    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        headers.insert("x-request-id", value);
    }
    headers
}

fn rpc_error_response(
    status: StatusCode,
    request_id: &RequestId,
    id: &Value,
    code: ErrorCode,
    message: &str,
) -> Response {
    let body = RpcResponse::error(id, code, message).into_value();
    (status, common_headers(request_id), axum::Json(body)).into_response()
}

async fn handle_mcp(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let request_id = RequestId::new();
    let services = &state.services;

    let parsed: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(e) => {
            return rpc_error_response(
                StatusCode::BAD_REQUEST,
                &request_id,
                &Value::Null,
                ErrorCode::InvalidRequest,
                &format!("body is not JSON: {e}"),
            );
        },
    };

    let (elements, batch) = match &parsed {
        Value::Array(items) if items.is_empty() => {
            return rpc_error_response(
                StatusCode::BAD_REQUEST,
                &request_id,
                &Value::Null,
                ErrorCode::InvalidRequest,
                "empty batch",
            );
        },
        Value::Array(items) => (items.clone(), true),
        other => (vec![other.clone()], false),
    };

    let decoded: Vec<Decoded> = elements.iter().map(Decoded::from_value).collect();
    let primary_method = decoded.iter().find_map(Decoded::method).map(str::to_string);

    // Authentication gate.
    let gate = match auth_gate::authenticate(
        services,
        &headers,
        None,
        primary_method.as_deref(),
        request_id.clone(),
    ) {
        Ok(outcome) => outcome,
        Err(rejection) => {
            return rpc_error_response(
                StatusCode::from_u16(rejection.status).unwrap_or(StatusCode::UNAUTHORIZED),
                &request_id,
                &Value::Null,
                rejection.code,
                &rejection.message,
            );
        },
    };
    let ctx = gate.ctx;

    // Envelope request log: started before any handler runs.
    let primary_call = decoded.iter().find_map(|element| match element {
        Decoded::Request { method, params, .. } if method == "tools/call" => Some((
            params["name"].as_str().map(str::to_string),
            params["arguments"]["action"].as_str().map(str::to_string),
        )),
        _ => None,
    });
    services.request_log.started(
        &ctx,
        primary_method.as_deref(),
        primary_call.as_ref().and_then(|(tool, _)| tool.as_deref()),
        primary_call.as_ref().and_then(|(_, action)| action.as_deref()),
        &parsed,
    );
    let started = Instant::now();

    let mut responses: Vec<Value> = Vec::new();
    let mut new_session: Option<String> = None;
    let mut failed = false;

    for element in decoded {
        match element {
            Decoded::Invalid => {
                failed = true;
                responses.push(
                    RpcResponse::error(
                        &Value::Null,
                        ErrorCode::InvalidRequest,
                        "invalid JSON-RPC envelope",
                    )
                    .into_value(),
                );
            },
            Decoded::Notification { method, .. } => {
                debug!(method, "notification acknowledged");
            },
            Decoded::Request { id, method, params } => {
                // Session gate: everything but initialize needs identity.
                if ctx.auth_method == AuthMethod::None && method != "initialize" {
                    failed = true;
                    responses.push(
                        RpcResponse::error(
                            &id,
                            ErrorCode::SessionRequired,
                            "initialize first or present credentials",
                        )
                        .into_value(),
                    );
                    continue;
                }
                let entry =
                    dispatch_request(&state, &ctx, &id, &method, &params, &mut new_session)
                        .await;
                if entry.as_value().get("error").is_some() {
                    failed = true;
                }
                // Fan the response out to the session's SSE subscribers.
                if let Some(token) = ctx.session_id.as_deref().or(new_session.as_deref()) {
                    services.sse.publish(token, entry.as_value().to_string());
                }
                responses.push(entry.into_value());
            },
        }
    }

    let duration_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
    let response_payload = if batch {
        Value::Array(responses.clone())
    } else {
        responses.first().cloned().unwrap_or(Value::Null)
    };
    if failed {
        services
            .request_log
            .failed(&ctx, &response_payload, duration_ms)
            .await;
    } else {
        services
            .request_log
            .completed(&ctx, &response_payload, duration_ms)
            .await;
    }

    let mut response_headers = common_headers(&request_id);
    if let Some(token) = &new_session
        && let Ok(value) = HeaderValue::from_str(token)
    {
        response_headers.insert(SESSION_HEADER, value);
    }

    if responses.is_empty() {
        // All-notification input: nothing to return.
        return (StatusCode::ACCEPTED, response_headers).into_response();
    }
    // A lone session_required error is an HTTP-level 400, not a normal
    // JSON-RPC exchange.
    let status = if !batch
        && response_payload["error"]["code"] == ErrorCode::SessionRequired.code()
    {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    (status, response_headers, axum::Json(response_payload)).into_response()
}

#[allow(clippy::too_many_lines)]
async fn dispatch_request(
    state: &AppState,
    ctx: &Context,
    id: &Value,
    method: &str,
    params: &Value,
    new_session: &mut Option<String>,
) -> RpcResponse {
    let services = &state.services;
    match method {
        "initialize" => {
            // Reuse a live session; mint one otherwise.
            let token = match &ctx.session_id {
                Some(token) => token.clone(),
                None => match services.sessions.create(
                    &ctx.user_id,
                    None,
                    Some("mcp".to_string()),
                    vec!["*".to_string()],
                ) {
                    Ok(session) => {
                        *new_session = Some(session.id.clone());
                        session.id
                    },
                    Err(e) => {
                        return RpcResponse::error(
                            id,
                            ErrorCode::InternalError,
                            &format!("session creation failed: {e}"),
                        );
                    },
                },
            };
            services
                .audit
                .record(ctx, "session_initialized", json!({"session": "present"}))
                .await;
            debug!(session = %token, "initialized");
            RpcResponse::result(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {"listChanged": false}, "resources": {}},
                    "serverInfo": {
                        "name": "cyfr-server",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            )
        },
        "ping" => RpcResponse::result(id, json!({})),
        "tools/list" => RpcResponse::result(id, json!({"tools": state.router.descriptors()})),
        "resources/list" => {
            RpcResponse::result(id, json!({"resources": state.router.resources()}))
        },
        "tools/call" => {
            let Some(tool) = params.get("name").and_then(Value::as_str) else {
                return RpcResponse::error(
                    id,
                    ErrorCode::InvalidParams,
                    "tools/call requires params.name",
                );
            };
            let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
            match crate::router::ToolRouter::handle(&state.router, tool, ctx, args).await {
                Ok(result) => RpcResponse::result(
                    id,
                    json!({
                        "content": [{
                            "type": "text",
                            "text": result.to_string(),
                        }],
                        "structuredContent": result,
                        "isError": false,
                    }),
                ),
                Err(e) => RpcResponse::error(id, e.code, &e.message),
            }
        },
        other => RpcResponse::error(
            id,
            ErrorCode::MethodNotFound,
            &format!("unknown method: {other}"),
        ),
    }
}

async fn handle_delete(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let request_id = RequestId::new();
    let Some(token) = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    else {
        return rpc_error_response(
            StatusCode::BAD_REQUEST,
            &request_id,
            &Value::Null,
            ErrorCode::SessionRequired,
            "DELETE /mcp requires MCP-Session-Id",
        );
    };
    match state.services.sessions.terminate(&token) {
        Ok(()) => {
            state.services.sse.remove(&token);
            (StatusCode::ACCEPTED, common_headers(&request_id)).into_response()
        },
        Err(e) => rpc_error_response(
            StatusCode::NOT_FOUND,
            &request_id,
            &Value::Null,
            ErrorCode::SessionExpired,
            &e.to_string(),
        ),
    }
}

async fn handle_sse(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let request_id = RequestId::new();
    let Some(token) = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    else {
        return rpc_error_response(
            StatusCode::BAD_REQUEST,
            &request_id,
            &Value::Null,
            ErrorCode::SessionRequired,
            "SSE requires MCP-Session-Id",
        );
    };
    if let Err(e) = state.services.sessions.get(&token) {
        return rpc_error_response(
            StatusCode::NOT_FOUND,
            &request_id,
            &Value::Null,
            ErrorCode::SessionExpired,
            &e.to_string(),
        );
    }

    let last_event_id: u64 = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0);

    let hub = &state.services.sse;
    // Subscribe first so no event published between replay and listen is
    // lost; duplicates are filtered by id below.
    let receiver = hub.subscribe(&token);
    let replayed = hub.since(&token, last_event_id);
    let replay_high_water = replayed.last().map_or(last_event_id, |record| record.id);

    let to_event = |record: SseRecord| -> Result<Event, Infallible> {
        Ok(Event::default().id(record.id.to_string()).data(record.data))
    };

    let replay_stream = futures::stream::iter(replayed.into_iter().map(to_event));
    let live_stream = BroadcastStream::new(receiver).filter_map(move |item| {
        let event = match item {
            Ok(record) if record.id > replay_high_water => Some(to_event(record)),
            // Replayed already, or the subscriber lagged out of the ring.
            _ => None,
        };
        futures::future::ready(event)
    });

    let mut response = Sse::new(replay_stream.chain(live_stream))
        .keep_alive(
            KeepAlive::new()
                .interval(KEEP_ALIVE_INTERVAL)
                .text("keep-alive"),
        )
        .into_response();
    response
        .headers_mut()
        .extend(common_headers(&request_id));
    response
        .headers_mut()
        .insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}
