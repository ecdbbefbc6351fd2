//! Terminal front end pieces: input draft, command parsing and conversation rendering

pub mod command;
pub mod composer;
pub mod render;

pub use command::Command;
pub use composer::Composer;
pub use render::Theme;
