//! Message formatting utilities for client display.

use hiroba_shared::time::timestamp_to_clock_time;

use crate::state::{BOT_NICKNAME, ConnectionState, ERROR_NICKNAME, LogEntry, SYSTEM_NICKNAME};

/// Message formatter for client display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format one log entry as a terminal line
    ///
    /// # Arguments
    ///
    /// * `entry` - The log entry to format
    /// * `current_nickname` - The local user's nickname (to mark as "me")
    ///
    /// # Returns
    ///
    /// A formatted string ending with a newline
    pub fn format_entry(entry: &LogEntry, current_nickname: &str) -> String {
        let time = timestamp_to_clock_time(entry.time);
        match entry.nickname.as_str() {
            SYSTEM_NICKNAME => format!("[{}] * {}\n", time, entry.text),
            BOT_NICKNAME => format!("[{}] ~ {}\n", time, entry.text),
            ERROR_NICKNAME => format!("[{}] ! {}\n", time, entry.text),
            nickname if nickname == current_nickname => {
                format!("[{}] @{} (me): {}\n", time, nickname, entry.text)
            }
            nickname => format!("[{}] @{}: {}\n", time, nickname, entry.text),
        }
    }

    /// Format a connection state change for the status line
    pub fn format_state(state: &ConnectionState) -> String {
        match state {
            ConnectionState::Connecting => "-- connecting --\n".to_string(),
            ConnectionState::Connected => "-- connected --\n".to_string(),
            ConnectionState::Disconnected(reason) => format!("-- disconnected: {} --\n", reason),
            ConnectionState::Errored(reason) => format!("-- connection error: {} --\n", reason),
        }
    }
}
