pub const SCHEMA: &str = r#"
-- feed registry, keyed by feed URL
CREATE TABLE IF NOT EXISTS feeds (
    url TEXT PRIMARY KEY,
    checkpoint INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- open-schema feed attributes, one row per key
-- names and values are always bound as parameters, so arbitrary keys
-- (reserved words included) are stored without escaping trouble
CREATE TABLE IF NOT EXISTS feed_attributes (
    feed_url TEXT NOT NULL REFERENCES feeds(url) ON DELETE CASCADE,
    name TEXT NOT NULL,
    value TEXT NOT NULL,
    UNIQUE(feed_url, name)
);

CREATE INDEX IF NOT EXISTS idx_feed_attributes_url ON feed_attributes(feed_url);
"#;
