use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use feed_rs::model::Entry;
use feed_rs::parser;
use reqwest::Client;

use crate::error::Result;
use crate::models::ArticleRecord;

/// Extraction collaborator: pulls a feed and returns only the articles
/// published strictly after the caller's checkpoint.
#[async_trait]
pub trait Extract: Send + Sync {
    /// `Ok(None)` means the feed could not be parsed; the caller treats
    /// that as "no new articles", not as a fatal error.
    async fn extract(&self, url: &str, checkpoint: i64) -> Result<Option<Vec<ArticleRecord>>>;
}

pub struct FeedExtractor {
    client: Client,
}

impl FeedExtractor {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("feed-archiver/1.0")
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }
}

#[async_trait]
impl Extract for FeedExtractor {
    async fn extract(&self, url: &str, checkpoint: i64) -> Result<Option<Vec<ArticleRecord>>> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch feed: HTTP {}", response.status()).into());
        }

        let bytes = response.bytes().await?;
        let feed = match parser::parse(&bytes[..]) {
            Ok(feed) => feed,
            Err(e) => {
                tracing::warn!("failed to parse feed {}: {}", url, e);
                return Ok(None);
            }
        };

        Ok(Some(newer_than(
            articles_from_entries(feed.entries),
            checkpoint,
        )))
    }
}

/// Map feed entries to article records, skipping malformed ones.
///
/// An entry without an id cannot be archived idempotently, and one
/// without any date cannot be compared to the checkpoint; both are
/// skipped rather than failing the feed.
fn articles_from_entries(entries: Vec<Entry>) -> Vec<ArticleRecord> {
    entries
        .into_iter()
        .filter_map(|entry| {
            if entry.id.is_empty() {
                tracing::warn!("skipping feed entry with no id");
                return None;
            }

            let Some(published) = entry.published.or(entry.updated) else {
                tracing::warn!("skipping feed entry {} with no publish date", entry.id);
                return None;
            };

            // Try content first, then fall back to summary
            let body = entry
                .content
                .as_ref()
                .and_then(|c| c.body.clone())
                .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()))
                .unwrap_or_default();

            let mut metadata = BTreeMap::new();
            if let Some(title) = entry.title {
                metadata.insert("title".to_string(), title.content);
            }
            if let Some(link) = entry.links.first() {
                metadata.insert("url".to_string(), link.href.clone());
            }
            if let Some(author) = entry.authors.first() {
                metadata.insert("author".to_string(), author.name.clone());
            }

            Some(ArticleRecord {
                article_id: entry.id,
                published_at: published.timestamp(),
                body,
                metadata,
            })
        })
        .collect()
}

/// The dedup boundary: strictly newer than the checkpoint, preserving
/// feed order. An article published exactly at the checkpoint has
/// already been archived.
pub fn newer_than(articles: Vec<ArticleRecord>, checkpoint: i64) -> Vec<ArticleRecord> {
    articles
        .into_iter()
        .filter(|article| article.published_at > checkpoint)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(id: &str, published_at: i64) -> ArticleRecord {
        ArticleRecord {
            article_id: id.to_string(),
            published_at,
            body: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_checkpoint_boundary_is_strict() {
        let articles = vec![
            article("a", 900),
            article("b", 1000),
            article("c", 1100),
            article("d", 1500),
        ];

        let new: Vec<i64> = newer_than(articles, 1000)
            .into_iter()
            .map(|a| a.published_at)
            .collect();
        assert_eq!(new, vec![1100, 1500]);
    }

    #[test]
    fn test_zero_checkpoint_takes_everything() {
        let articles = vec![article("a", 1), article("b", 2)];
        assert_eq!(newer_than(articles, 0).len(), 2);
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>test</title>
  <item>
    <guid>entry-1</guid>
    <title>Dated</title>
    <link>https://example.org/1</link>
    <pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate>
    <description>hello</description>
  </item>
  <item>
    <guid>entry-2</guid>
    <title>No date</title>
    <description>undated</description>
  </item>
</channel></rss>"#;

        let feed = parser::parse(xml.as_bytes()).unwrap();
        let articles = articles_from_entries(feed.entries);

        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].article_id, "entry-1");
        assert_eq!(articles[0].body, "hello");
        assert_eq!(
            articles[0].metadata.get("title").map(String::as_str),
            Some("Dated")
        );
        assert_eq!(
            articles[0].metadata.get("url").map(String::as_str),
            Some("https://example.org/1")
        );
    }
}
