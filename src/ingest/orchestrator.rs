use futures::stream::{self, StreamExt};

use crate::db::FeedRegistry;
use crate::error::Result;
use crate::feed::Extract;
use crate::models::{FeedPatch, IngestSummary};
use crate::store::ArticleStore;

/// Runs the per-feed ingest pass: load checkpoint, extract new articles,
/// archive them, then advance the checkpoint.
///
/// Correctness rests on two properties rather than locking: the archive
/// is idempotent (same article, same key) and the checkpoint only ever
/// moves forward. A fully failed pass leaves the checkpoint untouched so
/// the next scheduled run re-delivers the whole batch.
pub struct IngestOrchestrator<E, S> {
    registry: FeedRegistry,
    extractor: E,
    store: S,
    archive_concurrency: usize,
    feed_concurrency: usize,
}

impl<E: Extract, S: ArticleStore> IngestOrchestrator<E, S> {
    pub fn new(
        registry: FeedRegistry,
        extractor: E,
        store: S,
        archive_concurrency: usize,
        feed_concurrency: usize,
    ) -> Self {
        Self {
            registry,
            extractor,
            store,
            archive_concurrency: archive_concurrency.max(1),
            feed_concurrency: feed_concurrency.max(1),
        }
    }

    pub fn registry(&self) -> &FeedRegistry {
        &self.registry
    }

    /// One pass for a single feed, loading its checkpoint from the
    /// registry (absent feed means checkpoint 0).
    pub async fn ingest_feed(&self, url: &str) -> Result<IngestSummary> {
        let checkpoint = self
            .registry
            .get(url)
            .await?
            .map(|record| record.checkpoint)
            .unwrap_or(0);
        self.ingest_from(url, checkpoint).await
    }

    /// One pass for a single feed from an explicit checkpoint.
    pub async fn ingest_from(&self, url: &str, checkpoint: i64) -> Result<IngestSummary> {
        // Extract: failures here only mean "no new articles this run"
        let articles = match self.extractor.extract(url, checkpoint).await {
            Ok(Some(articles)) => articles,
            Ok(None) => {
                tracing::warn!("no extraction result for {}, treating as no new articles", url);
                Vec::new()
            }
            Err(e) => {
                tracing::warn!("extraction failed for {}: {}", url, e);
                Vec::new()
            }
        };

        let articles_found = articles.len();
        if articles_found == 0 {
            tracing::debug!("no new articles for {}", url);
            return Ok(IngestSummary::default());
        }

        // Archive: saves are independent and idempotent, so they run in a
        // bounded pool and a failed article never aborts its siblings
        let archived: Vec<i64> = stream::iter(articles)
            .map(|article| async move {
                match self.store.save(&article).await {
                    Ok(key) => {
                        tracing::debug!("archived {} as {}", article.article_id, key);
                        Some(article.published_at)
                    }
                    Err(e) => {
                        tracing::warn!("failed to archive article {}: {}", article.article_id, e);
                        None
                    }
                }
            })
            .buffer_unordered(self.archive_concurrency)
            .filter_map(|published_at| async move { published_at })
            .collect()
            .await;

        let articles_archived = archived.len();

        // Advance: only after the archive join, and only if something
        // durably landed; max() keeps the checkpoint monotonic even if a
        // collaborator returns articles at or before the old checkpoint
        if let Some(max_published) = archived.into_iter().max() {
            let new_checkpoint = checkpoint.max(max_published);
            let patch = FeedPatch {
                checkpoint: Some(new_checkpoint),
                ..Default::default()
            };
            if let Err(e) = self.registry.upsert(url, patch).await {
                tracing::error!(
                    "archived {} articles for {} but failed to advance checkpoint, \
                     they will be re-delivered next run: {}",
                    articles_archived,
                    url,
                    e
                );
            }
        }

        Ok(IngestSummary {
            articles_found,
            articles_archived,
        })
    }

    /// One pass over every registered feed, feeds processed concurrently.
    /// A failing feed is logged and never blocks the others.
    pub async fn ingest_all(&self) -> Result<IngestSummary> {
        let feeds = self.registry.all().await?;
        tracing::info!("ingesting {} feeds", feeds.len());

        let summaries: Vec<IngestSummary> = stream::iter(feeds)
            .map(|feed| async move {
                match self.ingest_from(&feed.url, feed.checkpoint).await {
                    Ok(summary) => {
                        tracing::info!(
                            "{}: found {}, archived {}",
                            feed.url,
                            summary.articles_found,
                            summary.articles_archived
                        );
                        summary
                    }
                    Err(e) => {
                        tracing::warn!("ingest failed for {}: {}", feed.url, e);
                        IngestSummary::default()
                    }
                }
            })
            .buffer_unordered(self.feed_concurrency)
            .collect()
            .await;

        let mut total = IngestSummary::default();
        for summary in summaries {
            total.merge(summary);
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use async_trait::async_trait;

    use crate::error::AppError;
    use crate::feed::newer_than;
    use crate::models::ArticleRecord;
    use crate::store::FsArticleStore;

    fn article(id: &str, published_at: i64) -> ArticleRecord {
        ArticleRecord {
            article_id: id.to_string(),
            published_at,
            body: format!("body {id}"),
            metadata: BTreeMap::new(),
        }
    }

    /// Returns a fixed article list, filtered like the real collaborator.
    struct StubExtractor {
        articles: Vec<ArticleRecord>,
    }

    #[async_trait]
    impl Extract for StubExtractor {
        async fn extract(&self, _url: &str, checkpoint: i64) -> Result<Option<Vec<ArticleRecord>>> {
            Ok(Some(newer_than(self.articles.clone(), checkpoint)))
        }
    }

    /// Hands back whatever it was given without applying the checkpoint
    /// filter, like a buggy collaborator re-delivering old articles.
    struct UnfilteredExtractor {
        articles: Vec<ArticleRecord>,
    }

    #[async_trait]
    impl Extract for UnfilteredExtractor {
        async fn extract(&self, _url: &str, _checkpoint: i64) -> Result<Option<Vec<ArticleRecord>>> {
            Ok(Some(self.articles.clone()))
        }
    }

    struct FailingExtractor;

    #[async_trait]
    impl Extract for FailingExtractor {
        async fn extract(&self, _url: &str, _checkpoint: i64) -> Result<Option<Vec<ArticleRecord>>> {
            Err(anyhow::anyhow!("connection refused").into())
        }
    }

    struct FailingStore;

    #[async_trait]
    impl ArticleStore for FailingStore {
        async fn save(&self, _article: &ArticleRecord) -> Result<String> {
            Err(AppError::Archive("store offline".to_string()))
        }

        async fn list(&self) -> Result<Vec<crate::models::ArchivedArticle>> {
            Ok(Vec::new())
        }
    }

    async fn registry(dir: &tempfile::TempDir) -> FeedRegistry {
        let path = dir.path().join("registry.db");
        FeedRegistry::new(path.to_str().unwrap()).await.unwrap()
    }

    const FEED: &str = "https://example.org/rss";

    #[tokio::test]
    async fn test_fresh_feed_advances_checkpoint_to_max_published() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = StubExtractor {
            articles: vec![article("a", 10), article("b", 20), article("c", 30)],
        };
        let store = FsArticleStore::new(dir.path().join("archive"));
        let orchestrator =
            IngestOrchestrator::new(registry(&dir).await, extractor, store, 4, 2);

        let summary = orchestrator.ingest_feed(FEED).await.unwrap();
        assert_eq!(summary.articles_found, 3);
        assert_eq!(summary.articles_archived, 3);

        let record = orchestrator.registry().get(FEED).await.unwrap().unwrap();
        assert_eq!(record.checkpoint, 30);
    }

    #[tokio::test]
    async fn test_redelivered_articles_archive_to_same_keys() {
        let dir = tempfile::tempdir().unwrap();
        let archive_root = dir.path().join("archive");
        let extractor = UnfilteredExtractor {
            articles: vec![article("a", 10), article("b", 20), article("c", 30)],
        };
        let store = FsArticleStore::new(&archive_root);
        let orchestrator =
            IngestOrchestrator::new(registry(&dir).await, extractor, store, 4, 2);

        orchestrator.ingest_feed(FEED).await.unwrap();
        // second run: collaborator re-delivers all three
        let summary = orchestrator.ingest_feed(FEED).await.unwrap();
        assert_eq!(summary.articles_archived, 3);

        // idempotent archive: still exactly three objects
        let listed = FsArticleStore::new(&archive_root).list().await.unwrap();
        assert_eq!(listed.len(), 3);

        // checkpoint re-set to 30, monotonicity intact
        let record = orchestrator.registry().get(FEED).await.unwrap().unwrap();
        assert_eq!(record.checkpoint, 30);
    }

    #[tokio::test]
    async fn test_all_archives_failing_leaves_checkpoint_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = StubExtractor {
            articles: vec![article("a", 500)],
        };
        let orchestrator =
            IngestOrchestrator::new(registry(&dir).await, extractor, FailingStore, 4, 2);

        orchestrator
            .registry()
            .upsert(
                FEED,
                FeedPatch {
                    checkpoint: Some(100),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let summary = orchestrator.ingest_feed(FEED).await.unwrap();
        assert_eq!(summary.articles_found, 1);
        assert_eq!(summary.articles_archived, 0);

        let record = orchestrator.registry().get(FEED).await.unwrap().unwrap();
        assert_eq!(record.checkpoint, 100);
    }

    #[tokio::test]
    async fn test_stale_articles_never_move_checkpoint_backwards() {
        let dir = tempfile::tempdir().unwrap();
        // misbehaving collaborator returns an article older than the checkpoint
        let extractor = UnfilteredExtractor {
            articles: vec![article("old", 50)],
        };
        let store = FsArticleStore::new(dir.path().join("archive"));
        let orchestrator =
            IngestOrchestrator::new(registry(&dir).await, extractor, store, 4, 2);

        orchestrator
            .registry()
            .upsert(
                FEED,
                FeedPatch {
                    checkpoint: Some(100),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        orchestrator.ingest_feed(FEED).await.unwrap();

        let record = orchestrator.registry().get(FEED).await.unwrap().unwrap();
        assert_eq!(record.checkpoint, 100);
    }

    #[tokio::test]
    async fn test_extraction_failure_is_no_new_articles() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArticleStore::new(dir.path().join("archive"));
        let orchestrator =
            IngestOrchestrator::new(registry(&dir).await, FailingExtractor, store, 4, 2);

        let summary = orchestrator.ingest_feed(FEED).await.unwrap();
        assert_eq!(summary, IngestSummary::default());
        // feed record is not even created
        assert!(orchestrator.registry().get(FEED).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ingest_all_covers_every_registered_feed() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = StubExtractor {
            articles: vec![article("a", 10), article("b", 20)],
        };
        let store = FsArticleStore::new(dir.path().join("archive"));
        let orchestrator =
            IngestOrchestrator::new(registry(&dir).await, extractor, store, 4, 2);

        orchestrator
            .registry()
            .upsert("https://a.example/rss", FeedPatch::default())
            .await
            .unwrap();
        orchestrator
            .registry()
            .upsert(
                "https://b.example/rss",
                FeedPatch {
                    checkpoint: Some(15),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let total = orchestrator.ingest_all().await.unwrap();
        // feed a sees both articles, feed b only the one past its checkpoint
        assert_eq!(total.articles_found, 3);
        assert_eq!(total.articles_archived, 3);

        let a = orchestrator
            .registry()
            .get("https://a.example/rss")
            .await
            .unwrap()
            .unwrap();
        let b = orchestrator
            .registry()
            .get("https://b.example/rss")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.checkpoint, 20);
        assert_eq!(b.checkpoint, 20);
    }
}
