pub mod comments;
pub mod ledger;
pub mod message;
pub mod ports;
pub mod registry;
pub mod sync;
pub mod tree;
