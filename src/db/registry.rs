use std::collections::BTreeMap;
use std::sync::OnceLock;

use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{FeedDescriptor, FeedPatch, FeedRecord, UpsertSummary};

use super::schema::SCHEMA;

/// Whether an upsert created a new record or merged into an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// The feed-state registry: one record per feed URL, holding the dedup
/// checkpoint plus arbitrary feed-supplied attributes.
///
/// The registry is a dumb merge-store. It does not enforce checkpoint
/// monotonicity; callers (the orchestrator) pass values already known to
/// be >= the stored one.
pub struct FeedRegistry {
    conn: Connection,
    // partition-key column name, discovered once from the live schema
    key_attribute: OnceLock<String>,
}

impl FeedRegistry {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self {
            conn,
            key_attribute: OnceLock::new(),
        })
    }

    /// The registry's partition-key attribute name.
    ///
    /// Discovered from the deployed table rather than hardcoded, since the
    /// registry may be provisioned with a different key column. Cached for
    /// the life of this registry instance.
    pub async fn key_attribute(&self) -> Result<String> {
        if let Some(name) = self.key_attribute.get() {
            return Ok(name.clone());
        }

        let name = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("PRAGMA table_info(feeds)")?;
                let mut rows = stmt.query([])?;
                while let Some(row) = rows.next()? {
                    let pk: i64 = row.get(5)?;
                    if pk > 0 {
                        return Ok(Some(row.get::<_, String>(1)?));
                    }
                }
                Ok(None)
            })
            .await?;

        match name {
            Some(name) => Ok(self.key_attribute.get_or_init(|| name).clone()),
            None => Err(AppError::Schema(
                "feeds table has no primary key column".to_string(),
            )),
        }
    }

    pub async fn get(&self, url: &str) -> Result<Option<FeedRecord>> {
        let key = self.key_attribute().await?;
        let url = url.to_string();
        let record = self
            .conn
            .call(move |conn| {
                let feed = conn
                    .query_row(
                        &format!(r#"SELECT "{key}", checkpoint FROM feeds WHERE "{key}" = ?1"#),
                        params![url],
                        |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
                    )
                    .optional()?;

                let Some((url, checkpoint)) = feed else {
                    return Ok(None);
                };

                let mut stmt = conn
                    .prepare("SELECT name, value FROM feed_attributes WHERE feed_url = ?1")?;
                let rows = stmt.query_map(params![url], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;

                let mut attributes = BTreeMap::new();
                for row in rows {
                    let (name, raw) = row?;
                    attributes.insert(name, decode_attribute(raw));
                }

                Ok(Some(FeedRecord {
                    url,
                    checkpoint,
                    attributes,
                }))
            })
            .await?;
        Ok(record)
    }

    /// All registered feeds with their attributes.
    pub async fn all(&self) -> Result<Vec<FeedRecord>> {
        let feeds = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT url, checkpoint FROM feeds ORDER BY url")?;
                let mut feeds = stmt
                    .query_map([], |row| {
                        Ok(FeedRecord {
                            url: row.get(0)?,
                            checkpoint: row.get(1)?,
                            attributes: BTreeMap::new(),
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                let mut stmt = conn
                    .prepare("SELECT feed_url, name, value FROM feed_attributes")?;
                let rows = stmt.query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?;

                let mut by_url: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();
                for row in rows {
                    let (url, name, raw) = row?;
                    by_url.entry(url).or_default().insert(name, decode_attribute(raw));
                }
                for feed in &mut feeds {
                    if let Some(attributes) = by_url.remove(&feed.url) {
                        feed.attributes = attributes;
                    }
                }

                Ok(feeds)
            })
            .await?;
        Ok(feeds)
    }

    /// Insert-if-absent, else partial merge.
    ///
    /// Only keys present in the patch are written: an absent `checkpoint`
    /// leaves the stored one alone, and attribute keys the patch does not
    /// mention are never overwritten or deleted. A supplied `checkpoint`
    /// replaces the stored value verbatim. Applying the same patch twice
    /// yields the same final state.
    pub async fn upsert(&self, url: &str, patch: FeedPatch) -> Result<UpsertOutcome> {
        let key = self.key_attribute().await?;
        let url = url.to_string();
        let checkpoint = patch.checkpoint;

        // serialize attribute values up front so JSON errors surface as
        // AppError::Json instead of dying inside the connection closure
        let mut attributes = Vec::with_capacity(patch.attributes.len());
        for (name, value) in &patch.attributes {
            attributes.push((name.clone(), serde_json::to_string(value)?));
        }

        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                let exists: bool = tx.query_row(
                    &format!(r#"SELECT COUNT(*) FROM feeds WHERE "{key}" = ?1"#),
                    params![url],
                    |row| row.get::<_, i64>(0).map(|n| n > 0),
                )?;

                if !exists {
                    tx.execute(
                        &format!(r#"INSERT INTO feeds ("{key}", checkpoint) VALUES (?1, ?2)"#),
                        params![url, checkpoint.unwrap_or(0)],
                    )?;
                } else if let Some(checkpoint) = checkpoint {
                    tx.execute(
                        &format!(
                            r#"UPDATE feeds SET checkpoint = ?2, updated_at = datetime('now') WHERE "{key}" = ?1"#
                        ),
                        params![url, checkpoint],
                    )?;
                } else {
                    tx.execute(
                        &format!(
                            r#"UPDATE feeds SET updated_at = datetime('now') WHERE "{key}" = ?1"#
                        ),
                        params![url],
                    )?;
                }

                for (name, value) in &attributes {
                    tx.execute(
                        r#"INSERT INTO feed_attributes (feed_url, name, value) VALUES (?1, ?2, ?3)
                           ON CONFLICT(feed_url, name) DO UPDATE SET value = excluded.value"#,
                        params![url, name, value],
                    )?;
                }

                tx.commit()?;

                Ok(if exists {
                    UpsertOutcome::Updated
                } else {
                    UpsertOutcome::Created
                })
            })
            .await?;
        Ok(outcome)
    }

    /// Upsert a batch of feed descriptors.
    ///
    /// Per-feed failures are logged and skipped so one bad feed never
    /// blocks the rest; only a schema-discovery failure aborts the batch.
    pub async fn upsert_batch(&self, feeds: &[FeedDescriptor]) -> Result<UpsertSummary> {
        // resolve the key attribute once before touching any record
        self.key_attribute().await?;

        let mut summary = UpsertSummary::default();
        for feed in feeds {
            if feed.url.is_empty() {
                tracing::warn!("skipping feed descriptor with no url: {:?}", feed.attributes);
                continue;
            }
            if let Err(e) = url::Url::parse(&feed.url) {
                tracing::warn!("skipping feed with malformed url {}: {}", feed.url, e);
                continue;
            }

            let patch = FeedPatch {
                checkpoint: feed.checkpoint,
                attributes: feed.attributes.clone(),
            };

            match self.upsert(&feed.url, patch).await {
                Ok(UpsertOutcome::Created) => summary.new_items += 1,
                Ok(UpsertOutcome::Updated) => summary.updated_items += 1,
                Err(e) => tracing::error!("failed to upsert feed {}: {}", feed.url, e),
            }
        }
        Ok(summary)
    }
}

fn decode_attribute(raw: String) -> Value {
    match serde_json::from_str(&raw) {
        Ok(value) => value,
        // pre-JSON rows are kept readable as plain strings
        Err(_) => Value::String(raw),
    }
}
