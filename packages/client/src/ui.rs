//! UI utilities for the terminal client.

use std::io::Write;

/// Redisplay the prompt after printing a message
pub fn redisplay_prompt(nickname: &str) {
    print!("{}> ", nickname);
    std::io::stdout().flush().ok();
}
