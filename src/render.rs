//! Downstream renderers: consumers of `{key, generated_content}` pairs.

use crate::error::ApiError;
use crate::types::EntityKey;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub trait ContentRenderer {
    fn render(&self, key: &EntityKey, content: &str) -> Result<(), ApiError>;
}

#[derive(Serialize)]
struct RenderedDocument<'a> {
    key: String,
    category: &'a str,
    name: &'a str,
    generated_content: &'a str,
}

/// Writes one JSON document per entity into a directory.
pub struct OutputDirRenderer {
    dir: PathBuf,
}

impl OutputDirRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<category>:<name>.json`, with path separators in the name replaced.
    pub fn path_for(&self, key: &EntityKey) -> PathBuf {
        let file = format!("{}.json", key).replace(['/', '\\'], "_");
        self.dir.join(file)
    }
}

impl ContentRenderer for OutputDirRenderer {
    fn render(&self, key: &EntityKey, content: &str) -> Result<(), ApiError> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            ApiError::RenderFailed(format!("cannot create {}: {}", self.dir.display(), e))
        })?;
        let document = RenderedDocument {
            key: key.to_string(),
            category: key.category(),
            name: key.name(),
            generated_content: content,
        };
        let body = serde_json::to_vec_pretty(&document)
            .map_err(|e| ApiError::RenderFailed(e.to_string()))?;
        let path = self.path_for(key);
        fs::write(&path, body)
            .map_err(|e| ApiError::RenderFailed(format!("cannot write {}: {}", path.display(), e)))
    }
}
