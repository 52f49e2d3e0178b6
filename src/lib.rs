pub mod checker;
pub mod compilers;
pub mod config;
pub mod database;
pub mod error;
pub mod heartbeat;
pub mod judge;
pub mod models;
pub mod sandbox;
pub mod scoring;
pub mod testing;
pub mod workdir;
pub mod worker;

pub fn create_timestamp() -> String {
    use chrono::{SecondsFormat, Utc};
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Cuts `text` to at most `max_len` bytes without splitting a character
pub fn truncate_utf8(mut text: String, max_len: usize) -> String {
    if text.len() > max_len {
        let mut end = max_len;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}
