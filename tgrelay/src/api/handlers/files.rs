use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument, warn};

use crate::AppState;
use crate::errors::{Error, Result};

fn not_found(name: &str) -> Error {
    Error::NotFound {
        resource: "File".to_string(),
        id: name.to_string(),
    }
}

#[utoipa::path(
    get,
    path = "/file/{name}",
    tag = "files",
    summary = "Download file",
    description = "Stream a stored file back from Telegram. Files on the block list are reported as missing.",
    params(("name" = String, Path, description = "`{file_id}.{extension}` as returned by the upload")),
    responses(
        (status = 200, description = "File content, typed by the requested extension"),
        (status = 404, description = "Unknown or blocked file", body = String),
        (status = 500, description = "Telegram download failed")
    )
)]
#[instrument(skip(state))]
pub async fn get_file(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response> {
    let file_id = name.rsplit_once('.').map_or(name.as_str(), |(id, _)| id);
    if file_id.is_empty() {
        return Err(not_found(&name));
    }

    if let Some(store) = &state.store {
        match store.get(&name).await {
            Ok(Some(record)) if record.is_blocked() => {
                debug!("File is on the block list");
                return Err(not_found(&name));
            }
            Ok(_) => {}
            // Serving isn't gated on the store being reachable
            Err(e) => warn!(error = %e, "Metadata lookup failed"),
        }
    }

    let file_path = match state.telegram.get_file_path(file_id).await {
        Ok(Some(path)) => path,
        Ok(None) => return Err(not_found(&name)),
        Err(e) => {
            warn!(error = %e, "getFile failed");
            return Err(not_found(&name));
        }
    };

    let upstream = state.telegram.download(&file_path).await?;
    let content_type = mime_guess::from_path(&name).first_or_octet_stream();
    let upstream_len = upstream.content_length();

    let mut response = (
        [(header::CONTENT_TYPE, content_type.to_string())],
        Body::from_stream(upstream.bytes_stream()),
    )
        .into_response();
    if let Some(len) = upstream_len {
        response.headers_mut().insert(header::CONTENT_LENGTH, len.into());
    }

    Ok(response)
}
