//! Service HTTP routes
//!
//! Handlers for CSV upload, chunked upload, report polling, and health.
//! Error bodies follow the dashboard contract: `{"error": "..."}` with
//! the matching status code.

use std::path::{Path as FsPath, PathBuf};

use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::SharedState;
use crate::jobs::{self, JobState};
use crate::report::AnalysisReport;

type ApiError = (StatusCode, Json<Value>);

fn bad_request(msg: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": msg })))
}

fn server_error(msg: String) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": msg })),
    )
}

fn spool_path(state: &SharedState, file_id: &str) -> PathBuf {
    FsPath::new(&state.config.upload_dir).join(format!("{}.csv", file_id))
}

/// Serialize a report with the job id injected alongside the summary
fn with_file_id(report: &AnalysisReport, file_id: &str) -> Result<Value, ApiError> {
    let mut value = serde_json::to_value(report)
        .map_err(|e| server_error(format!("Analysis failed: {}", e)))?;
    if let Value::Object(map) = &mut value {
        map.insert("file_id".to_string(), Value::String(file_id.to_string()));
    }
    Ok(value)
}

/// POST /upload - single-shot CSV upload, synchronous first-pass analysis
pub async fn upload(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut uploaded: Option<(String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(&format!("Malformed multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or_default().to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| bad_request(&format!("Failed to read upload: {}", e)))?;
            uploaded = Some((filename, data));
        }
    }

    let Some((filename, data)) = uploaded else {
        return Err(bad_request("No file uploaded"));
    };
    if filename.is_empty() {
        return Err(bad_request("No file selected"));
    }
    if !filename.to_lowercase().ends_with(".csv") {
        return Err(bad_request("Only CSV files are accepted"));
    }

    let file_id = Uuid::new_v4().to_string();
    let path = spool_path(&state, &file_id);
    tokio::fs::write(&path, &data)
        .await
        .map_err(|e| server_error(format!("Analysis failed: {}", e)))?;

    info!(
        "Upload {} ({} bytes) -> job {}",
        filename,
        data.len(),
        file_id
    );

    let report = jobs::submit(&state.jobs, &file_id, &path, &state.config)
        .await
        .map_err(|e| server_error(format!("Analysis failed: {:#}", e)))?;

    Ok(Json(with_file_id(&report, &file_id)?))
}

/// POST /upload_chunk - chunked upload with a fast first-chunk preview
///
/// Chunk zero runs the capped pass on whatever was just written so the
/// dashboard has numbers while the rest of the file is still in flight.
/// The final chunk hands the whole spool file to the background run.
pub async fn upload_chunk(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut data: Option<Bytes> = None;
    let mut chunk_index = 0usize;
    let mut total_chunks = 1usize;
    let mut file_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(&format!("Malformed multipart body: {}", e)))?
    {
        match field.name() {
            Some("file") => {
                data = Some(field.bytes().await.map_err(|e| {
                    bad_request(&format!("Failed to read upload: {}", e))
                })?);
            }
            Some("chunkIndex") => {
                chunk_index = read_text(field).await?.trim().parse().unwrap_or(0);
            }
            Some("totalChunks") => {
                total_chunks = read_text(field).await?.trim().parse().unwrap_or(1);
            }
            Some("fileId") => {
                let text = read_text(field).await?;
                if !text.is_empty() {
                    file_id = Some(text);
                }
            }
            _ => {}
        }
    }

    let Some(data) = data else {
        return Err(bad_request("No file uploaded"));
    };

    // Ids are always UUIDs we handed out; anything else is rejected so a
    // crafted fileId cannot escape the spool directory.
    let file_id = match file_id {
        Some(id) => Uuid::parse_str(&id)
            .map_err(|_| bad_request("Invalid file id"))?
            .to_string(),
        None => Uuid::new_v4().to_string(),
    };
    let path = spool_path(&state, &file_id);

    append_chunk(&path, &data, chunk_index == 0)
        .await
        .map_err(|e| server_error(format!("Upload failed: {}", e)))?;

    let mut response = json!({ "file_id": file_id, "status": "chunk_received" });

    if chunk_index == 0 {
        state.jobs.set(&file_id, JobState::Uploading).await;
        let report = jobs::run_capped(path.clone(), state.config.clone())
            .await
            .map_err(|e| server_error(format!("Upload failed: {:#}", e)))?;

        // The preview saw only the first chunk, so it is partial whenever
        // more chunks are coming.
        let forced_partial = total_chunks > 1 || report.summary.is_partial;
        let mut value = with_file_id(&report, &file_id)?;
        if let Some(flag) = value.pointer_mut("/summary/is_partial") {
            *flag = Value::Bool(forced_partial);
        }
        response = value;
    }

    if chunk_index + 1 >= total_chunks {
        jobs::spawn_full(
            state.jobs.clone(),
            file_id.clone(),
            path,
            state.config.clone(),
        )
        .await;
        if let Value::Object(map) = &mut response {
            map.insert("status".to_string(), json!("upload_complete"));
        }
    }

    Ok(Json(response))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| bad_request(&format!("Malformed multipart field: {}", e)))
}

/// Chunk zero truncates any stale spool file, later chunks append.
async fn append_chunk(path: &FsPath, data: &[u8], first: bool) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut options = tokio::fs::OpenOptions::new();
    if first {
        options.create(true).write(true).truncate(true);
    } else {
        options.create(true).append(true);
    }
    let mut file = options.open(path).await?;
    file.write_all(data).await?;
    file.flush().await?;
    Ok(())
}

/// GET /full_report/{file_id} - poll the background run
pub async fn full_report(
    State(state): State<SharedState>,
    Path(file_id): Path<String>,
) -> Response {
    match state.jobs.get(&file_id).await {
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Task not found" })),
        )
            .into_response(),
        Some(JobState::Done(report)) => Json(&*report).into_response(),
        Some(JobState::Error(msg)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": msg })),
        )
            .into_response(),
        Some(pending) => (
            StatusCode::ACCEPTED,
            Json(json!({ "status": pending.status_str() })),
        )
            .into_response(),
    }
}

/// GET /api/health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "engine": format!("MuleWatch v{}", env!("CARGO_PKG_VERSION")),
        "detectors": ["cycle", "fan_in_fan_out", "layered_shell"],
    }))
}
