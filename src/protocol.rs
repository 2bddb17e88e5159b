//! Wire-format helpers shared by the server and the client.
//!
//! Every notice the server emits follows one of three literal shapes
//! (`[Server message (HH:MM:SS)] ...`, `[<name> (HH:MM:SS)] ...`, or the
//! whisper variant); building them in one place keeps the timestamp and
//! bracket formatting from drifting between call sites.

use chrono::Local;

/// Current local time formatted as `HH:MM:SS`, as used in every bracketed
/// message prefix.
pub fn now_hms() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// `[Server message (HH:MM:SS)] <text>`
pub fn server_message(text: impl std::fmt::Display) -> String {
    format!("[Server message ({})] {}", now_hms(), text)
}

/// `[<name> (HH:MM:SS)] <text>`
pub fn user_message(name: &str, text: &str) -> String {
    format!("[{} ({})] {}", name, now_hms(), text)
}

/// `[<sender> whispers to you: (HH:MM:SS)] <text>`
pub fn whisper_message(sender: &str, text: &str) -> String {
    format!("[{} whispers to you: ({})] {}", sender, now_hms(), text)
}
