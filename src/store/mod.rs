mod fs;

pub use fs::FsArticleStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ArchivedArticle, ArticleRecord};

/// Durable, content-addressed archive of article bodies and metadata.
///
/// Keys are derived from the archive date and the article id, never from
/// the content, so re-archiving the same article on retry overwrites the
/// same object instead of duplicating it. That idempotency is what makes
/// the orchestrator's re-delivery-on-failure behavior safe.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Archive one article, returning its store key.
    async fn save(&self, article: &ArticleRecord) -> Result<String>;

    /// Every archived article with its key, for bulk export.
    async fn list(&self) -> Result<Vec<ArchivedArticle>>;
}
