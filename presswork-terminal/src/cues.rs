//! User-facing cues for notification categories
//!
//! Sound playback lives outside this crate; the terminal only decides which
//! cue to fire.

use presswork_common::events::NotificationCategory;
use tracing::info;

/// Receiver of `dispatch(category)` calls
pub trait CueDispatcher: Send + Sync {
    fn dispatch(&self, category: NotificationCategory);
}

/// Cue dispatcher that writes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCues;

impl CueDispatcher for LogCues {
    fn dispatch(&self, category: NotificationCategory) {
        let cue = match category {
            NotificationCategory::NewActivity => "chime",
            NotificationCategory::ReturnAlert => "alert",
            NotificationCategory::Update => "tick",
            NotificationCategory::Success => "success",
        };
        info!(category = %category, cue, "Cue");
    }
}
