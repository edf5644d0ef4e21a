mod article;
mod feed;

pub use article::{ArchivedArticle, ArticleRecord};
pub use feed::{FeedDescriptor, FeedPatch, FeedRecord, IngestSummary, UpsertSummary};
