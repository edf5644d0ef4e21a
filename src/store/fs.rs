use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use tokio::fs;

use crate::error::{AppError, Result};
use crate::models::{ArchivedArticle, ArticleRecord};

use super::ArticleStore;

/// Filesystem-backed article store.
///
/// One JSON document per article under `YYYY/M/D/<article_id>.json`,
/// dated by archive time (not publish time). Writes overwrite, so a
/// retried archive of the same article lands on the same key.
pub struct FsArticleStore {
    root: PathBuf,
}

impl FsArticleStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store key for an article archived today.
    pub fn key_for(article_id: &str) -> String {
        let now = Utc::now();
        format!(
            "{}/{}/{}/{}.json",
            now.year(),
            now.month(),
            now.day(),
            sanitize_id(article_id)
        )
    }
}

#[async_trait]
impl ArticleStore for FsArticleStore {
    async fn save(&self, article: &ArticleRecord) -> Result<String> {
        let key = Self::key_for(&article.article_id);
        let path = self.root.join(&key);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Archive(e.to_string()))?;
        }

        let body = serde_json::to_vec_pretty(article)?;
        fs::write(&path, body)
            .await
            .map_err(|e| AppError::Archive(e.to_string()))?;

        Ok(key)
    }

    async fn list(&self) -> Result<Vec<ArchivedArticle>> {
        let mut articles = Vec::new();
        if !self.root.exists() {
            return Ok(articles);
        }

        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir)
                .await
                .map_err(|e| AppError::Archive(e.to_string()))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| AppError::Archive(e.to_string()))?
            {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                } else if path.extension().is_some_and(|ext| ext == "json") {
                    match read_archived(&self.root, &path).await {
                        Ok(article) => articles.push(article),
                        Err(e) => {
                            tracing::warn!("skipping unreadable archive entry {:?}: {}", path, e)
                        }
                    }
                }
            }
        }

        articles.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(articles)
    }
}

async fn read_archived(root: &Path, path: &Path) -> Result<ArchivedArticle> {
    let bytes = fs::read(path)
        .await
        .map_err(|e| AppError::Archive(e.to_string()))?;
    let article: ArticleRecord = serde_json::from_slice(&bytes)?;
    let key = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/");
    Ok(ArchivedArticle { key, article })
}

/// Feed guids can contain path separators (arXiv-style oai ids); keep
/// them from escaping the day directory.
fn sanitize_id(article_id: &str) -> String {
    article_id.replace(['/', '\\'], "_")
}
