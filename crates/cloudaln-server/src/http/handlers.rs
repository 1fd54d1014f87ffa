//! File server request handlers.

use std::io;
use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path as UrlPath, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};

use cloudaln_core::random_token;

use super::{append_extension, parse_shard_index, FileServerState};

/// Suffix length for temporary upload files.
const TEMP_SUFFIX_LEN: usize = 16;

/// Fallback for paths outside the served namespace.
pub async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Stream a reference or read file.
pub async fn get_file(
    State(state): State<Arc<FileServerState>>,
    UrlPath(name): UrlPath<String>,
) -> Response {
    let Some(path) = state.resolve(&name) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match File::open(&path).await {
        Ok(file) => {
            info!(name = %name, path = %path.display(), "Serving file");
            (StatusCode::OK, Body::from_stream(ReaderStream::new(file))).into_response()
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(name = %name, path = %path.display(), "Requested file does not exist");
            StatusCode::NOT_FOUND.into_response()
        }
        Err(e) => {
            error!(name = %name, path = %path.display(), error = %e, "Failed to open file");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Store an alignment result for a shard.
///
/// The body goes to a temporary sibling first and is renamed into place
/// only once fully written, so readers never see a partial result.
pub async fn put_file(
    State(state): State<Arc<FileServerState>>,
    UrlPath(name): UrlPath<String>,
    body: Body,
) -> StatusCode {
    let Some(target) = parse_shard_index(&name).and_then(|index| state.result_path(index)) else {
        return StatusCode::NOT_FOUND;
    };

    let temp = append_extension(&target, &random_token(TEMP_SUFFIX_LEN));

    let written = match write_body(&temp, body).await {
        Ok(written) => written,
        Err(e) => {
            error!(name = %name, path = %temp.display(), error = %e, "Failed to write upload");
            tokio::fs::remove_file(&temp).await.ok();
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    if let Err(e) = tokio::fs::rename(&temp, &target).await {
        error!(name = %name, path = %target.display(), error = %e, "Failed to move upload into place");
        tokio::fs::remove_file(&temp).await.ok();
        return StatusCode::INTERNAL_SERVER_ERROR;
    }

    info!(name = %name, path = %target.display(), bytes = written, "Stored result");
    StatusCode::CREATED
}

async fn write_body(path: &Path, body: Body) -> io::Result<u64> {
    let mut file = File::create(path).await?;
    let mut stream = body.into_data_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}
