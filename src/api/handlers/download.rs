use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use std::sync::Arc;

use super::{bridge_error, relay_error, resolve_error};
use crate::api::response::ApiError;
use crate::AppState;

/// Stream an archived file back to the requester.
/// Route: GET /download/:file_id
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<Response, ApiError> {
    let record = state
        .registry
        .resolve_record(&file_id)
        .map_err(|e| {
            tracing::error!(file_id = %file_id, error = %e, "Metadata store lookup failed");
            ApiError::internal("Failed to look up file")
        })?
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    // Download paths expire, so resolve on every request.
    let mut resolved = state
        .bridge
        .resolve_download_url(record.archive_message_id)
        .await
        .map_err(bridge_error)?
        .map_err(resolve_error)?;
    resolved.file_name = record.display_name.clone();
    if resolved.content_type.is_none() {
        resolved.content_type = record.mime_type.clone();
    }

    let relayed = state.relay.relay(&resolved).await.map_err(relay_error)?;

    tracing::debug!(
        file_id = %file_id,
        content_type = %relayed.content_type,
        content_length = ?relayed.content_length,
        "Relaying file"
    );

    let mut response = Response::new(Body::from_stream(relayed.body));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        relayed
            .content_type
            .parse()
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );

    if let Some(length) = relayed.content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }

    if let Ok(value) = content_disposition(&relayed.file_name).parse() {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    Ok(response)
}

/// `attachment; filename="..."`, adding an RFC 5987 `filename*` parameter when
/// the name is not plain ASCII.
pub fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if fallback == file_name {
        format!("attachment; filename=\"{fallback}\"")
    } else {
        format!(
            "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
            urlencoding::encode(file_name)
        )
    }
}
