//! Model artifact discovery.

use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Result, SentimentError};

/// Source of candidate model files
pub trait ArtifactRepository {
    /// Candidate model paths, most recent first
    fn list_candidates(&self) -> Result<Vec<PathBuf>>;

    /// Most recent candidate
    fn select_latest(&self) -> Result<PathBuf> {
        self.list_candidates()?.into_iter().next().ok_or_else(|| {
            SentimentError::ArtifactMissing("No trained models found".to_string())
        })
    }
}

/// Directory of model files ordered by modification time
#[derive(Debug, Clone)]
pub struct ModelDirectory {
    dir: PathBuf,
    extension: String,
}

impl ModelDirectory {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn has_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case(&self.extension))
    }
}

impl ArtifactRepository for ModelDirectory {
    fn list_candidates(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.is_dir() {
            return Err(SentimentError::ArtifactMissing(format!(
                "Models directory not found: {:?}",
                self.dir
            )));
        }

        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            SentimentError::ArtifactMissing(format!("Failed to read {:?}: {}", self.dir, e))
        })?;

        let mut candidates: Vec<(SystemTime, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && self.has_extension(path))
            .map(|path| {
                let modified = std::fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (modified, path)
            })
            .collect();

        // Newest first, name as tie-breaker for a stable order
        candidates.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        debug!("Found {} model candidates in {:?}", candidates.len(), self.dir);
        Ok(candidates.into_iter().map(|(_, path)| path).collect())
    }
}

/// Resolved model and label encoder locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub encoder: PathBuf,
}

/// Resolve artifact paths, falling back to the newest model in the models
/// directory and the co-located label encoder.
pub fn resolve_artifacts(
    model: Option<PathBuf>,
    encoder: Option<PathBuf>,
    config: &Config,
) -> Result<ArtifactPaths> {
    let model = match model {
        Some(path) => path,
        None => {
            let repository = ModelDirectory::new(&config.models_dir, &config.model_extension);
            let latest = repository.select_latest()?;
            info!("Using most recent model: {:?}", latest);
            latest
        }
    };

    let encoder = encoder.unwrap_or_else(|| config.default_encoder_path());
    if !encoder.exists() {
        return Err(SentimentError::ArtifactMissing(format!(
            "Label encoder not found at {:?}",
            encoder
        )));
    }

    Ok(ArtifactPaths { model, encoder })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;
    use tempfile::tempdir;

    fn touch(path: &Path, modified: SystemTime) {
        let file = File::create(path).unwrap();
        file.set_modified(modified).unwrap();
    }

    #[test]
    fn test_newest_first() {
        let dir = tempdir().unwrap();
        let base = SystemTime::now() - Duration::from_secs(3600);

        touch(&dir.path().join("old.onnx"), base);
        touch(&dir.path().join("new.onnx"), base + Duration::from_secs(600));
        touch(&dir.path().join("mid.onnx"), base + Duration::from_secs(300));
        touch(&dir.path().join("notes.txt"), base + Duration::from_secs(900));

        let repo = ModelDirectory::new(dir.path(), "onnx");
        let names: Vec<String> = repo
            .list_candidates()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["new.onnx", "mid.onnx", "old.onnx"]);
        assert_eq!(repo.select_latest().unwrap(), dir.path().join("new.onnx"));
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempdir().unwrap();
        let repo = ModelDirectory::new(dir.path(), "onnx");
        assert!(repo.list_candidates().unwrap().is_empty());
        assert!(matches!(
            repo.select_latest(),
            Err(SentimentError::ArtifactMissing(_))
        ));
    }

    #[test]
    fn test_missing_directory() {
        let repo = ModelDirectory::new("/nonexistent/models", "onnx");
        assert!(matches!(
            repo.list_candidates(),
            Err(SentimentError::ArtifactMissing(_))
        ));
    }

    #[test]
    fn test_resolve_defaults() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("emotion.onnx"), SystemTime::now());
        std::fs::write(dir.path().join("label_encoder.json"), "[\"01_neutral\"]").unwrap();

        let config = Config {
            models_dir: dir.path().to_path_buf(),
            ..Config::default()
        };

        let paths = resolve_artifacts(None, None, &config).unwrap();
        assert_eq!(paths.model, dir.path().join("emotion.onnx"));
        assert_eq!(paths.encoder, dir.path().join("label_encoder.json"));
    }

    #[test]
    fn test_resolve_explicit_model_missing_encoder() {
        let dir = tempdir().unwrap();
        let config = Config {
            models_dir: dir.path().to_path_buf(),
            ..Config::default()
        };

        let result = resolve_artifacts(Some(dir.path().join("given.onnx")), None, &config);
        assert!(matches!(result, Err(SentimentError::ArtifactMissing(_))));
    }
}
