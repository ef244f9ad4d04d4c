pub mod commands;
pub mod editor;
pub mod history;

pub use commands::{Command, Direction};
pub use editor::{ChangeEvent, ChangeEvents, Editor};
pub use history::CommandLog;
