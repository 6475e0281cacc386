pub mod platform;
pub mod thread_ids;
