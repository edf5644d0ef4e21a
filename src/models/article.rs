use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One article extracted from a feed, ready to be archived.
///
/// Articles are not persisted by the registry; they exist only between
/// extraction and the archive write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleRecord {
    /// Stable identifier from the source entry (guid), unique within a feed.
    pub article_id: String,
    /// Source-reported publish time, Unix seconds. Compared against the
    /// feed checkpoint to decide what is new.
    pub published_at: i64,
    /// Archived verbatim.
    pub body: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// An archived article as read back from the store listing.
#[derive(Debug, Clone)]
pub struct ArchivedArticle {
    /// Store key, `YYYY/M/D/<article_id>.json`.
    pub key: String,
    pub article: ArticleRecord,
}
