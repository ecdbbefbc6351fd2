//! Presentation of message text

pub mod lines;

pub use lines::{
    classify, classify_line, format_message, has_arabic, Direction, LineKind, LineRendering,
    MessageView,
};
