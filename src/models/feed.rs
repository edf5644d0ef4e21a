use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One registered feed as stored in the registry.
///
/// `attributes` is open-schema: feeds carry arbitrary extra metadata
/// (category, priority, ...) whose keys are not known at compile time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedRecord {
    pub url: String,
    /// Unix timestamp (seconds) of the newest article already archived.
    /// 0 means "ingest everything".
    pub checkpoint: i64,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

/// A partial update to a feed record.
///
/// Only the keys present are written: a missing `checkpoint` leaves the
/// stored value alone, and attribute keys absent from `attributes` are
/// never touched or deleted.
#[derive(Debug, Clone, Default)]
pub struct FeedPatch {
    pub checkpoint: Option<i64>,
    pub attributes: BTreeMap<String, Value>,
}

/// A feed as supplied by callers (CLI arguments or a feeds JSON file).
///
/// Accepts the short field names (`u`, `dt`) used by legacy feed lists.
/// Any key other than the URL and checkpoint lands in `attributes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedDescriptor {
    #[serde(default, alias = "u")]
    pub url: String,
    #[serde(default, alias = "dt", skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<i64>,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

/// Outcome of one orchestrator pass over a feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub articles_found: usize,
    pub articles_archived: usize,
}

impl IngestSummary {
    pub fn merge(&mut self, other: IngestSummary) {
        self.articles_found += other.articles_found;
        self.articles_archived += other.articles_archived;
    }
}

/// Outcome of a batch registry upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub new_items: usize,
    pub updated_items: usize,
}
