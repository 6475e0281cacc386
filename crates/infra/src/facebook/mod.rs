pub mod graph;

pub use graph::{FacebookClient, FacebookCredentials, FacebookError, FacebookPost};
