use crate::config::AppConfig;
use crate::errors::ApiError;
use crate::SharedState;
use axum::extract::{Multipart, Path as UrlPath, State};
use axum::Json;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

pub const MAX_BATCH_FILES: usize = 10;

#[derive(Debug, Error)]
enum UploadError {
    #[error("File type not allowed. Allowed types: {0}")]
    BadExtension(String),
    #[error("File too large. Maximum size: {0}MB")]
    TooLarge(usize),
    #[error("File upload failed")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
enum DeleteError {
    #[error("File not found")]
    NotFound,
    #[error("Access denied")]
    Forbidden,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_size: usize,
    pub content_type: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct UploadedFile {
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_size: usize,
}

#[derive(Debug, Serialize)]
pub struct FailedFile {
    pub filename: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct BatchUploadResponse {
    pub uploaded_count: usize,
    pub failed_count: usize,
    pub uploaded_files: Vec<UploadedFile>,
    pub failed_files: Vec<FailedFile>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub filename: String,
}

struct StoredFile {
    filename: String,
    original_filename: String,
    file_path: String,
    file_size: usize,
}

/// POST /upload - store one medical imaging file and return the generated
/// path for use in later predict requests.
pub async fn upload_file(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {}", e)))?
    {
        let Some(original) = field.file_name().map(|name| name.to_string()) else {
            continue;
        };
        let content_type = field.content_type().map(|ct| ct.to_string());
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read file body: {}", e)))?;

        let stored = save_upload(&state.config, &original, &data)
            .await
            .map_err(map_upload_error)?;

        info!("File uploaded successfully: {}", stored.filename);
        return Ok(Json(UploadResponse {
            filename: stored.filename,
            original_filename: stored.original_filename,
            file_path: stored.file_path,
            file_size: stored.file_size,
            content_type,
            message: "File uploaded successfully".to_string(),
        }));
    }

    Err(ApiError::bad_request("No file field in request"))
}

/// POST /upload/batch - store up to 10 files, partitioning results per
/// file; one bad file never aborts the rest.
pub async fn upload_batch(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<BatchUploadResponse>, ApiError> {
    // Collect every part before writing anything so an oversized batch is
    // rejected without touching the disk.
    let mut parts: Vec<(String, axum::body::Bytes)> = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {}", e)))?
    {
        let Some(original) = field.file_name().map(|name| name.to_string()) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read file body: {}", e)))?;
        parts.push((original, data));
    }

    check_batch_size(parts.len())?;

    let mut uploaded_files = Vec::new();
    let mut failed_files = Vec::new();

    for (original, data) in parts {
        match save_upload(&state.config, &original, &data).await {
            Ok(stored) => uploaded_files.push(UploadedFile {
                filename: stored.filename,
                original_filename: stored.original_filename,
                file_path: stored.file_path,
                file_size: stored.file_size,
            }),
            Err(err) => {
                error!("Failed to upload {}: {}", original, err);
                failed_files.push(FailedFile {
                    filename: original,
                    error: err.to_string(),
                });
            }
        }
    }

    Ok(Json(BatchUploadResponse {
        uploaded_count: uploaded_files.len(),
        failed_count: failed_files.len(),
        uploaded_files,
        failed_files,
    }))
}

/// DELETE /upload/{filename} - remove a stored file. The resolved path is
/// prefix-checked against the upload root so traversal names can never
/// delete outside it.
pub async fn delete_file(
    State(state): State<SharedState>,
    UrlPath(filename): UrlPath<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let resolved = resolve_in_root(&state.config.upload_dir, &filename)
        .await
        .map_err(|err| match err {
            DeleteError::NotFound => ApiError::not_found("File not found"),
            DeleteError::Forbidden => ApiError::forbidden("Access denied"),
        })?;

    tokio::fs::remove_file(&resolved)
        .await
        .map_err(|e| ApiError::internal(anyhow::anyhow!("Failed to delete {}: {}", filename, e)))?;

    info!("File deleted: {}", filename);
    Ok(Json(DeleteResponse {
        message: "File deleted successfully".to_string(),
        filename,
    }))
}

/// Batch pre-count guard; an oversized batch is rejected before any file
/// is written.
pub fn check_batch_size(count: usize) -> Result<(), ApiError> {
    if count > MAX_BATCH_FILES {
        return Err(ApiError::bad_request(format!(
            "Maximum {} files per batch upload",
            MAX_BATCH_FILES
        )));
    }
    Ok(())
}

fn map_upload_error(err: UploadError) -> ApiError {
    match err {
        UploadError::BadExtension(_) => ApiError::bad_request(err.to_string()),
        UploadError::TooLarge(_) => ApiError::payload_too_large(err.to_string()),
        UploadError::Io(e) => ApiError::internal(anyhow::anyhow!("File upload failed: {}", e)),
    }
}

async fn save_upload(
    config: &AppConfig,
    original: &str,
    data: &[u8],
) -> Result<StoredFile, UploadError> {
    let name = base_name(original);
    let ext = matched_extension(name, &config.allowed_extensions)
        .ok_or_else(|| UploadError::BadExtension(config.allowed_extensions.join(", ")))?;

    if data.len() > config.max_upload_size {
        return Err(UploadError::TooLarge(config.max_upload_size / (1024 * 1024)));
    }

    tokio::fs::create_dir_all(&config.upload_dir).await?;

    let filename = unique_filename(name, ext);
    let file_path = config.upload_dir.join(&filename);
    tokio::fs::write(&file_path, data).await?;

    Ok(StoredFile {
        filename,
        original_filename: original.to_string(),
        file_path: file_path.to_string_lossy().into_owned(),
        file_size: data.len(),
    })
}

/// Canonicalizes `root`/`filename` and rejects any result that escapes the
/// canonical root.
async fn resolve_in_root(root: &Path, filename: &str) -> Result<PathBuf, DeleteError> {
    let root = tokio::fs::canonicalize(root)
        .await
        .map_err(|_| DeleteError::NotFound)?;
    let resolved = tokio::fs::canonicalize(root.join(filename))
        .await
        .map_err(|_| DeleteError::NotFound)?;

    if !resolved.starts_with(&root) {
        return Err(DeleteError::Forbidden);
    }
    Ok(resolved)
}

/// Strips any directory components a client may have smuggled into the
/// multipart filename.
fn base_name(original: &str) -> &str {
    Path::new(original)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload")
}

/// Case-insensitive suffix match against the allow-list. Longest suffix
/// wins so `.nii.gz` is preferred over a plain `.gz` entry.
fn matched_extension<'a>(filename: &str, allowed: &'a [String]) -> Option<&'a str> {
    let lower = filename.to_ascii_lowercase();
    allowed
        .iter()
        .filter(|ext| lower.ends_with(ext.as_str()))
        .max_by_key(|ext| ext.len())
        .map(|ext| ext.as_str())
}

/// `<stem>_<uuid><ext>`; the embedded UUID makes concurrent uploads of
/// identically named files collision-free.
fn unique_filename(name: &str, ext: &str) -> String {
    let stem = &name[..name.len() - ext.len()];
    format!("{}_{}{}", stem, Uuid::new_v4().simple(), ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_extensions;

    fn allowed() -> Vec<String> {
        parse_extensions(".dcm,.nii,.nii.gz,.jpg,.jpeg,.png,.csv,.json")
    }

    fn test_config(dir: PathBuf) -> AppConfig {
        AppConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            upload_dir: dir,
            max_upload_size: 1024,
            allowed_extensions: allowed(),
            cors_origins: vec![],
            model_path: "models/none.onnx".to_string(),
            model_version: "v1.0.0".to_string(),
        }
    }

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("alzdetect_{}_{}", tag, Uuid::new_v4().simple()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn batch_size_guard_allows_ten_rejects_eleven() {
        use axum::http::StatusCode;
        use axum::response::IntoResponse;

        assert!(check_batch_size(0).is_ok());
        assert!(check_batch_size(MAX_BATCH_FILES).is_ok());

        let response = check_batch_size(MAX_BATCH_FILES + 1)
            .unwrap_err()
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn extension_allow_list() {
        let allowed = allowed();
        assert!(matched_extension("scan.dcm", &allowed).is_some());
        assert!(matched_extension("SCAN.DCM", &allowed).is_some());
        assert!(matched_extension("brain.nii.gz", &allowed).is_some());
        assert!(matched_extension("notes.exe", &allowed).is_none());
        assert!(matched_extension("archive.gz", &allowed).is_none());
        assert!(matched_extension("no_extension", &allowed).is_none());
    }

    #[test]
    fn multi_part_extension_wins_over_short_suffix() {
        let allowed = parse_extensions(".gz,.nii.gz");
        assert_eq!(matched_extension("brain.nii.gz", &allowed), Some(".nii.gz"));
    }

    #[test]
    fn unique_filenames_differ_and_keep_extension() {
        let a = unique_filename("scan.dcm", ".dcm");
        let b = unique_filename("scan.dcm", ".dcm");
        assert_ne!(a, b);
        assert!(a.starts_with("scan_"));
        assert!(a.ends_with(".dcm"));
        assert!(b.ends_with(".dcm"));
    }

    #[test]
    fn base_name_strips_directories() {
        assert_eq!(base_name("../../etc/passwd.png"), "passwd.png");
        assert_eq!(base_name("dir/scan.dcm"), "scan.dcm");
        assert_eq!(base_name("scan.dcm"), "scan.dcm");
    }

    #[tokio::test]
    async fn save_rejects_bad_extension_and_oversize() {
        let dir = scratch_dir("reject");
        let config = test_config(dir.clone());

        match save_upload(&config, "tool.exe", b"MZ").await {
            Err(UploadError::BadExtension(_)) => {}
            _ => panic!("expected BadExtension"),
        }

        let big = vec![0u8; 2048];
        match save_upload(&config, "scan.dcm", &big).await {
            Err(UploadError::TooLarge(_)) => {}
            _ => panic!("expected TooLarge"),
        }

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn save_writes_under_upload_dir() {
        let dir = scratch_dir("save");
        let config = test_config(dir.clone());

        let stored = save_upload(&config, "scan.dcm", b"DICM").await.unwrap();
        assert_eq!(stored.original_filename, "scan.dcm");
        assert_eq!(stored.file_size, 4);
        assert!(dir.join(&stored.filename).exists());

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn traversal_names_never_resolve_outside_root() {
        let dir = scratch_dir("traversal");
        std::fs::write(dir.join("keep.dcm"), b"DICM").unwrap();

        assert!(resolve_in_root(&dir, "keep.dcm").await.is_ok());

        match resolve_in_root(&dir, "../../../../etc/passwd").await {
            Err(DeleteError::Forbidden) | Err(DeleteError::NotFound) => {}
            Ok(path) => panic!("traversal resolved to {:?}", path),
        }

        match resolve_in_root(&dir, "missing.dcm").await {
            Err(DeleteError::NotFound) => {}
            other => panic!("expected NotFound, got {:?}", other),
        }

        std::fs::remove_dir_all(dir).ok();
    }
}
