pub mod client;

pub use client::{DisqusClient, DisqusCredentials, DisqusError, RequestOptions, ThreadPost, ThreadSummary};
