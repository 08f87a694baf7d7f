//! OpenAPI document served at `/openapi.json` and rendered at `/docs`.

use utoipa::OpenApi;

use crate::api;
use crate::errors;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "tgrelay",
        description = "Stores uploaded files in a Telegram chat and serves them back by file id."
    ),
    paths(
        api::handlers::uploads::upload_file,
        api::handlers::files::get_file,
        api::handlers::webhook::telegram_webhook,
        api::handlers::healthz,
    ),
    components(schemas(api::models::uploads::UploadResponseItem, errors::ErrorBody)),
    tags(
        (name = "files", description = "Upload files to the storage chat and download them again."),
        (name = "telegram", description = "Endpoints called by Telegram itself."),
        (name = "health", description = "Liveness probe."),
    )
)]
pub struct ApiDoc;
