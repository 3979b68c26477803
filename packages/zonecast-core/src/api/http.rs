//! HTTP route handlers.
//!
//! All handlers are thin - they hand the request path to the factory and the
//! resulting action to the queue or the pipeline.

use axum::{
    extract::State,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::action::{Action, ActionOutput};
use crate::api::response::{data_response, StatusEnvelope};
use crate::api::AppState;
use crate::pipeline::Completion;
use crate::protocol_constants::{HEADER_SESSION_ID, HEADER_UPDATE_ID, OPTION_SESSION_ID};

const NOT_READY_MESSAGE: &str = "System is not ready to receive requests!";

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
///
/// GET paths that miss both prefixes still go through the factory, so they
/// are answered with the "not found" envelope rather than a bare 404.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/zonecast/controller/{action}",
            get(handle_action).options(handle_options),
        )
        .route(
            "/zonecast/data/{action}",
            get(handle_action).options(handle_options),
        )
        .fallback(handle_fallback)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Any origin may call the API; browser clients need to read the version
/// and session headers of returnable responses.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([HEADER_SESSION_ID, HEADER_UPDATE_ID])
        .expose_headers([HEADER_SESSION_ID, HEADER_UPDATE_ID])
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_action(State(state): State<AppState>, uri: Uri) -> Response {
    dispatch(&state, &uri).await
}

/// Plain `OPTIONS` never executes the action; CORS preflights are answered
/// by the CORS layer before they get here.
async fn handle_options() -> StatusCode {
    StatusCode::OK
}

async fn handle_fallback(State(state): State<AppState>, method: Method, uri: Uri) -> Response {
    if method != Method::GET {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    dispatch(&state, &uri).await
}

/// Resolves, validates and runs (or queues) one request.
async fn dispatch(state: &AppState, uri: &Uri) -> Response {
    let path = uri.path();
    let query = uri.query();

    if !state.is_ready() {
        return StatusEnvelope::new(path, query, "", NOT_READY_MESSAGE, true).into_response();
    }

    let Some(mut action) = state.factory.create_from_path(path, query) else {
        log::warn!("[Server] No action for request: {}", path);
        let msg = format!("Action for request '{}' not found!", path);
        return StatusEnvelope::new(path, query, "", msg, true).into_response();
    };
    let name = action.kind().name();

    if action.is_stackable() {
        return enqueue(state, action, path, query);
    }

    let returnable = action.is_returnable();
    match state.pipeline.execute(&mut action).await {
        Ok(Completion::Completed { output, update_id }) if returnable => {
            let session_id = action.base().options().get(OPTION_SESSION_ID);
            if let Some(session_id) = session_id {
                state.pipeline.context().sessions.touch(session_id);
            }
            data_response(payload(output), update_id, session_id)
        }
        Ok(Completion::Completed { output, .. }) => {
            let msg = match output {
                ActionOutput::Message(msg) => msg,
                _ => format!("Request '{}' was executed!", path),
            };
            StatusEnvelope::new(path, query, name, msg, false).into_response()
        }
        Ok(Completion::Failed) => {
            StatusEnvelope::new(path, query, name, action.base().error_text(), true).into_response()
        }
        Err(fatal) => {
            state.lifecycle.crash(&fatal);
            StatusEnvelope::new(path, query, name, fatal.to_string(), true).into_response()
        }
    }
}

fn enqueue(state: &AppState, mut action: Action, path: &str, query: Option<&str>) -> Response {
    let name = action.kind().name();
    if !state.pipeline.validate(&mut action) {
        let msg = format!(
            "Error while executing request: {}",
            action.base().error_text()
        );
        return StatusEnvelope::new(path, query, name, msg, true).into_response();
    }

    match state.queue.enqueue(action) {
        Ok(_) => {
            let msg = format!("Request '{}' was added to queue!", path);
            StatusEnvelope::new(path, query, name, msg, false).into_response()
        }
        Err(e) => StatusEnvelope::new(path, query, name, e.to_string(), true).into_response(),
    }
}

fn payload(output: ActionOutput) -> Value {
    match output {
        ActionOutput::Data(value) => value,
        ActionOutput::Message(msg) => Value::String(msg),
        ActionOutput::Done => Value::Null,
    }
}
