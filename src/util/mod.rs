//! Text utilities shared by the merge path and the command-line front end.
//!
//! - **Cleaning**: reduce feed-supplied HTML fields to plain single-line text
//! - **Display**: convert HTML bodies to wrapped text for reading
//! - **Width**: unicode-aware truncation for terminal listings

mod text;

pub use text::{
    clean, fix_mojibake, strip_control_chars, to_display_format, truncate_to_width, DISPLAY_WIDTH,
};
