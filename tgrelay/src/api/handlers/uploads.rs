use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartRejection},
    http::{HeaderMap, header},
};
use chrono::Utc;
use metrics::counter;
use tracing::{info, instrument, warn};

use crate::AppState;
use crate::api::models::uploads::UploadResponseItem;
use crate::config::Config;
use crate::errors::{Error, Result};
use crate::notifications::{FileNotice, send_upload_notification};
use crate::store::FileRecord;
use crate::telegram::{SendOutcome, UploadedFile, extract_file_id};

const DEFAULT_MIME: &str = "application/octet-stream";

/// Pull the `file` field out of the form. Other fields are ignored.
async fn read_file_field(multipart: &mut Multipart) -> Result<Option<UploadedFile>> {
    while let Some(field) = multipart.next_field().await.map_err(|e| Error::BadRequest {
        message: format!("Failed to parse multipart data: {e}"),
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let name = field.file_name().unwrap_or("file").to_string();
        let mime_type = match field.content_type() {
            Some(ct) if ct != DEFAULT_MIME => ct.to_string(),
            // Browsers send octet-stream for types they don't know, the name is a better hint
            _ => mime_guess::from_path(&name).first_raw().unwrap_or(DEFAULT_MIME).to_string(),
        };
        let content = field.bytes().await.map_err(|e| Error::BadRequest {
            message: format!("Failed to read uploaded file: {e}"),
        })?;

        return Ok(Some(UploadedFile::new(name, mime_type, content)));
    }

    Ok(None)
}

/// Origin that `src` paths are resolved against in links sent to Telegram.
pub(crate) fn request_origin(config: &Config, headers: &HeaderMap) -> Option<String> {
    if let Some(public_url) = &config.public_url {
        return Some(public_url.as_str().trim_end_matches('/').to_string());
    }

    let host = headers.get(header::HOST)?.to_str().ok()?;
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("http");

    Some(format!("{scheme}://{host}"))
}

#[utoipa::path(
    post,
    path = "/upload",
    tag = "files",
    summary = "Upload file",
    description = "Store a file in the configured Telegram chat. Images are sent as photos, \
                   falling back to documents when Telegram rejects them.",
    request_body(content_type = "multipart/form-data", description = "Form with a single `file` field"),
    responses(
        (status = 200, description = "File stored", body = Vec<UploadResponseItem>),
        (status = 500, description = "No file in the form, or Telegram rejected the upload", body = crate::errors::ErrorBody)
    )
)]
#[instrument(skip_all)]
pub async fn upload_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<Vec<UploadResponseItem>>> {
    let mut multipart = multipart.map_err(|e| {
        tracing::debug!(error = %e, "Request is not a multipart form");
        Error::NoFileUploaded
    })?;

    let file = read_file_field(&mut multipart).await?.ok_or(Error::NoFileUploaded)?;
    let kind = file.kind();

    info!(
        file_name = %file.name,
        mime_type = %file.mime_type,
        size = file.size_bytes,
        method = kind.method(),
        "Relaying upload to Telegram"
    );

    let payload = match state.telegram.send_file(kind, &file).await {
        SendOutcome::Success { payload } => payload,
        SendOutcome::Failure {
            status_code: Some(_),
            message,
        } => {
            counter!("tgrelay_uploads_total", "outcome" => "rejected").increment(1);
            return Err(Error::UploadFailed { message });
        }
        SendOutcome::Failure { status_code: None, message } => {
            counter!("tgrelay_uploads_total", "outcome" => "unreachable").increment(1);
            return Err(Error::NetworkError { message });
        }
    };

    let file_id = extract_file_id(&payload).ok_or_else(|| {
        counter!("tgrelay_uploads_total", "outcome" => "missing_file_id").increment(1);
        Error::MissingFileId
    })?;

    let key = format!("{}.{}", file_id, file.extension());
    let src = format!("/file/{key}");
    let url = match request_origin(&state.config, &headers) {
        Some(origin) => format!("{origin}{src}"),
        None => src.clone(),
    };

    if let Some(store) = &state.store
        && let Err(e) = store.put(&key, &FileRecord::new(&file, Utc::now())).await
    {
        warn!(error = %e, %key, "Failed to record upload metadata");
    }

    if let Some(chat_id) = state.config.notification_chat_id() {
        let notice = FileNotice {
            file_name: &file.name,
            mime_type: &file.mime_type,
            size_bytes: file.size_bytes,
            file_id: &file_id,
            url: &url,
        };
        if let Err(e) = send_upload_notification(&state.telegram, &state.config.notifications, chat_id, &notice).await {
            warn!(error = %e, %file_id, "Failed to send upload notification");
        }
    }

    counter!("tgrelay_uploads_total", "outcome" => "success").increment(1);
    info!(%file_id, %src, "Upload stored");

    Ok(Json(vec![UploadResponseItem { src }]))
}
