use actix_web::{web, HttpResponse};
use mime_guess::from_path;
use rust_embed::RustEmbed;

use crate::core::errors::ApiError;

#[derive(RustEmbed)]
#[folder = "static"]
struct Assets;

pub fn serve_static(path: &str) -> Result<HttpResponse, ApiError> {
    let file_path = path.trim_start_matches('/');

    let file = Assets::get(file_path)
        .ok_or_else(|| ApiError::NotFound(format!("{} not found", file_path)))?;

    let mime = from_path(file_path).first_or_octet_stream();

    Ok(HttpResponse::Ok()
        .content_type(mime.as_ref())
        .body(file.data.into_owned()))
}

pub async fn static_file(path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    serve_static(&path.into_inner())
}
