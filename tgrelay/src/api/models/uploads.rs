use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One entry of the upload response array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UploadResponseItem {
    /// Path the file is served under, `/file/{file_id}.{extension}`
    #[schema(example = "/file/AgACAgQAAxkDAAIB.png")]
    pub src: String,
}
