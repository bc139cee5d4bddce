//! List Matching Routes
//!
//! HTTP endpoints for depositing and matching hash lists.
//!
//! Endpoints (relative to the configured path prefix):
//! - PUT upload?name=<token> - Deposit a hash list, returns the match link
//! - PUT match?name=<token> - Match hashes against a deposit, returns a bitmask
//!
//! Request bodies are bare streams of 8-byte big-endian hashes.

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Query, State},
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::put,
    Router,
};
use futures::StreamExt;

use crate::codec::{CodecError, HashDecoder};
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::upload::StoreError;

/// Shown to anything that is not the command-line client
pub const BROWSER_NOTICE: &str =
    "Sorry, you need to use the command-line program to access this server.";

// ============================================================================
// Router
// ============================================================================

/// Create the list matching router, mounted under `prefix`
pub fn router(prefix: &str) -> Router<AppState> {
    Router::new()
        .route(
            &format!("{}upload", prefix),
            put(deposit_hashes).fallback(browser_notice),
        )
        .route(
            &format!("{}match", prefix),
            put(match_hashes).fallback(browser_notice),
        )
        // The hash decoder enforces its own record ceiling
        .layer(DefaultBodyLimit::disable())
}

// ============================================================================
// Handlers
// ============================================================================

/// PUT {prefix}upload?name=<token>
///
/// Store the body's hashes under `name`. Responds `204 No Content` with a
/// `Location` header pointing at the match endpoint for the same name.
async fn deposit_hashes(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
    uri: Uri,
    body: Body,
) -> Result<Response> {
    let name = upload_name(&params)?;

    // Cheap early rejection; `deposit` re-checks under the store lock
    if state.store().stored_len(name).is_some() {
        return Err(StoreError::NameTaken.into());
    }

    let hashes = read_hashes(body, state.config().limits.max_request_hashes).await?;
    let receipt = state.store().deposit(name, hashes)?;

    tracing::info!(
        sequence = receipt.sequence,
        hashes = receipt.stored,
        evicted = receipt.evicted,
        expires_at = %receipt.expires_at,
        "Upload stored"
    );

    let location = match_location(&state.config().server.path_prefix, uri.query());
    Ok((StatusCode::NO_CONTENT, [(header::LOCATION, location)]).into_response())
}

/// PUT {prefix}match?name=<token>
///
/// Match the body's hashes against the upload stored under `name`. Responds
/// `200 OK` with one bit per submitted hash, most-significant bit first.
async fn match_hashes(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
    body: Body,
) -> Result<Response> {
    let name = upload_name(&params)?;

    match state.store().stored_len(name) {
        None => return Err(StoreError::NotFound.into()),
        Some(0) => return Err(StoreError::EmptyUpload.into()),
        Some(_) => {}
    }

    let needles = read_hashes(body, state.config().limits.max_request_hashes).await?;
    let mask = state.store().query(name, &needles)?;

    tracing::debug!(
        needles = needles.len(),
        matched = mask.iter().map(|b| b.count_ones()).sum::<u32>(),
        "Match complete"
    );

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/octet-stream")],
        mask,
    )
        .into_response())
}

/// Fallback for browsers and other non-PUT requests
pub async fn browser_notice() -> &'static str {
    BROWSER_NOTICE
}

// ============================================================================
// Helpers
// ============================================================================

/// Exactly one `name` parameter is required
fn upload_name(params: &[(String, String)]) -> Result<&str> {
    let mut names = params
        .iter()
        .filter(|(key, _)| key == "name")
        .map(|(_, value)| value.as_str());

    match (names.next(), names.next()) {
        (Some(name), None) => Ok(name),
        _ => Err(AppError::BadRequest("need a name arg".to_string())),
    }
}

/// Decode the request body as it streams in
///
/// Nothing touches the store until the whole body has been read, so a client
/// that disconnects midway leaves no trace.
async fn read_hashes(body: Body, max_records: usize) -> std::result::Result<Vec<u64>, CodecError> {
    let mut decoder = HashDecoder::new(max_records);
    let mut stream = body.into_data_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| CodecError::Body(e.to_string()))?;
        decoder.feed(&chunk)?;
    }

    decoder.finish()
}

/// The deposit's own query string, pointed at the match endpoint
fn match_location(prefix: &str, query: Option<&str>) -> String {
    match query {
        Some(query) if !query.is_empty() => format!("{}match?{}", prefix, query),
        _ => format!("{}match", prefix),
    }
}
