use axum::Json;
use serde::Serialize;

use crate::build_info;

#[derive(Serialize)]
pub struct VersionResponse {
    pub version: String,
}

pub async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: build_info::VERSION.to_string(),
    })
}
