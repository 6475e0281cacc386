pub mod disqus;
pub mod facebook;
pub mod forum;
pub mod oauth;
pub mod store;
