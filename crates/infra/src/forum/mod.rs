pub mod scrape;

pub use scrape::{ForumError, ForumScraper, parse_comment_tree};
