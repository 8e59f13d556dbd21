//! Path completion route: the Directory Lookup Service over HTTP.

use crate::state::AppState;
use axum::extract::{Json, State};
use std::sync::Arc;
use tracing::debug;
use webterm_core::cwd;
use webterm_types::{CompleteRequest, CompleteResponse};

/// POST /api/complete - complete a path prefix against a working directory.
pub async fn complete(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CompleteRequest>,
) -> Json<CompleteResponse> {
    let working_dir = cwd::resolve(req.cwd.as_deref());
    let suggestions =
        webterm_core::complete::complete(&req.prefix, &working_dir, state.config.max_suggestions);
    debug!(
        target: "webterm::complete",
        "{:?} in {} -> {} candidates", req.prefix, working_dir.display(), suggestions.len()
    );
    Json(CompleteResponse { suggestions })
}
