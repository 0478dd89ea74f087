use anyhow::Context;
use std::env;
use std::path::PathBuf;

pub const PROJECT_NAME: &str = "AlzheimerAI Detection Platform";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_ALLOWED_EXTENSIONS: &str = ".dcm,.nii,.nii.gz,.jpg,.jpeg,.png,.csv,.json";
const DEFAULT_MAX_UPLOAD_SIZE: usize = 500 * 1024 * 1024; // 500MB
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000,http://localhost:8000";

/// Runtime configuration, read once at startup from the environment
/// (a .env file is honored via dotenv). Only the PostgreSQL credentials
/// are mandatory; everything else has a default.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: String,
    pub upload_dir: PathBuf,
    pub max_upload_size: usize,
    pub allowed_extensions: Vec<String>,
    pub cors_origins: Vec<String>,
    pub model_path: String,
    pub model_version: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let max_upload_size = match env::var("MAX_UPLOAD_SIZE") {
            Ok(raw) => raw
                .parse::<usize>()
                .context("MAX_UPLOAD_SIZE must be a byte count")?,
            Err(_) => DEFAULT_MAX_UPLOAD_SIZE,
        };

        let allowed_extensions = parse_extensions(
            &env::var("ALLOWED_EXTENSIONS").unwrap_or_else(|_| DEFAULT_ALLOWED_EXTENSIONS.to_string()),
        );

        let cors_origins = parse_list(
            &env::var("BACKEND_CORS_ORIGINS").unwrap_or_else(|_| DEFAULT_CORS_ORIGINS.to_string()),
        );

        Ok(AppConfig {
            listen_addr: env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            upload_dir: PathBuf::from(
                env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads/medical_images".to_string()),
            ),
            max_upload_size,
            allowed_extensions,
            cors_origins,
            model_path: env::var("MODEL_PATH")
                .unwrap_or_else(|_| "models/alzheimer_model.onnx".to_string()),
            model_version: env::var("MODEL_VERSION").unwrap_or_else(|_| "v1.0.0".to_string()),
        })
    }

    /// PostgreSQL connection URL from the PG_* variables. Kept separate from
    /// `from_env` so tests can build an `AppConfig` without credentials set.
    pub fn pg_url_from_env() -> Result<String, anyhow::Error> {
        let host_name = env::var("PG_HOST").context("PG_HOST must be set")?;
        let user_name = env::var("PG_USERNAME").context("PG_USERNAME must be set")?;
        let password = env::var("PG_PASSWORD").context("PG_PASSWORD must be set")?;
        let db_name = env::var("PG_DBNAME").context("PG_DBNAME must be set")?;
        let port: u16 = 5432;

        Ok(format!(
            "postgresql://{}:{}@{}:{}/{}",
            user_name, password, host_name, port, db_name
        ))
    }
}

/// Splits a comma-separated value list, dropping empty entries.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
        .collect()
}

/// Splits a comma-separated extension list, normalizing each entry to a
/// lowercase dotted suffix.
pub fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|ext| ext.trim().to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .map(|ext| {
            if ext.starts_with('.') {
                ext
            } else {
                format!(".{}", ext)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_extension_list() {
        let exts = parse_extensions(".dcm, .nii.gz,PNG, jpg ,");
        assert_eq!(exts, vec![".dcm", ".nii.gz", ".png", ".jpg"]);
    }

    #[test]
    fn parses_origin_list() {
        let origins = parse_list(" http://localhost:3000, https://app.example.org ,");
        assert_eq!(origins, vec!["http://localhost:3000", "https://app.example.org"]);
    }

    #[test]
    fn default_extensions_cover_medical_formats() {
        let exts = parse_extensions(DEFAULT_ALLOWED_EXTENSIONS);
        assert!(exts.contains(&".dcm".to_string()));
        assert!(exts.contains(&".nii.gz".to_string()));
        assert!(!exts.contains(&".exe".to_string()));
    }
}
