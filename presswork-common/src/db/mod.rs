//! Database initialization and retry helpers

pub mod init;
pub mod retry;

pub use init::*;
pub use retry::*;
