mod extractor;

pub use extractor::{newer_than, Extract, FeedExtractor};
