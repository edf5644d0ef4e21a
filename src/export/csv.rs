use std::path::Path;

use tokio::fs;

use crate::error::Result;
use crate::store::ArticleStore;

/// Flatten every archived article into a single CSV file for offline
/// analysis. Consumes only the store's listing interface.
pub async fn export_csv<S: ArticleStore>(store: &S, output: &Path) -> Result<usize> {
    let articles = store.list().await?;

    let mut out = String::from("key,article_id,published_at,body,metadata\n");
    for archived in &articles {
        let metadata = serde_json::to_string(&archived.article.metadata)?;
        out.push_str(&format!(
            "{},{},{},{},{}\n",
            csv_field(&archived.key),
            csv_field(&archived.article.article_id),
            archived.article.published_at,
            csv_field(&archived.article.body),
            csv_field(&metadata),
        ));
    }

    fs::write(output, out).await?;
    tracing::info!("exported {} archived articles to {:?}", articles.len(), output);
    Ok(articles.len())
}

/// RFC 4180 quoting: wrap fields containing separators or quotes, double
/// embedded quotes.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::models::ArticleRecord;
    use crate::store::FsArticleStore;

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[tokio::test]
    async fn test_export_writes_one_row_per_article() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArticleStore::new(dir.path().join("archive"));

        for (id, published_at) in [("a-1", 100), ("a-2", 200)] {
            let mut metadata = BTreeMap::new();
            metadata.insert("title".to_string(), format!("Title, with comma {id}"));
            store
                .save(&ArticleRecord {
                    article_id: id.to_string(),
                    published_at,
                    body: format!("body {id}"),
                    metadata,
                })
                .await
                .unwrap();
        }

        let output = dir.path().join("consolidated.csv");
        let count = export_csv(&store, &output).await.unwrap();
        assert_eq!(count, 2);

        let content = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "key,article_id,published_at,body,metadata");
        assert!(lines[1].contains("a-1"));
        assert!(lines[2].contains("a-2"));
    }
}
