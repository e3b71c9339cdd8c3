//! # Presswork department terminal
//!
//! Client side of the workflow: keeps one department's view of pending reprint
//! requests consistent with the server through two delivery paths feeding one
//! reconciliation function:
//! - push: SSE events from `GET /events` ([`push`])
//! - poll: periodic authoritative refetch ([`poller`])
//!
//! Also exposes the command surface ([`client`]) used by the terminal binary.

pub mod client;
pub mod cues;
pub mod error;
pub mod poller;
pub mod push;
pub mod view;

pub use client::ServerClient;
pub use error::{TerminalError, TerminalResult};
pub use view::{Applied, Reconciler, TerminalView, Update};
