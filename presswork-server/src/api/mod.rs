//! HTTP API handlers for presswork-server
//!
//! Command surface for department terminals plus the SSE push channel.

pub mod activities;
pub mod health;
pub mod reprints;
pub mod sse;

pub use activities::activity_routes;
pub use health::health_routes;
pub use reprints::reprint_routes;
pub use sse::event_routes;
