//! Undo/Redo command log.
//!
//! A linear history with a cursor: entries before the cursor are done,
//! entries after it can be redone. Pushing after an undo drops the redo
//! tail.
//!
//! Multi-step gestures use **batching**: commands pushed between
//! `begin_batch` and the matching `end_batch` are applied live and folded
//! into one `Group` entry, so a single undo reverts the whole gesture.

use crate::commands::{Command, Direction};
use rcs_core::{DocumentContext, Result};

/// Default maximum undo depth.
pub const DEFAULT_MAX_DEPTH: usize = 256;

#[derive(Debug)]
pub struct CommandLog {
    entries: Vec<Command>,
    cursor: usize,
    /// Maximum undo depth.
    max_depth: usize,
    /// Batch nesting depth (0 = not batching).
    batch_depth: usize,
    batch_label: String,
    /// Commands applied during the current batch.
    batch: Vec<Command>,
    /// Cursor position of the last save, if still reachable.
    clean: Option<usize>,
}

impl CommandLog {
    pub fn new(max_depth: usize) -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
            max_depth: max_depth.max(1),
            batch_depth: 0,
            batch_label: String::new(),
            batch: Vec::new(),
            clean: Some(0),
        }
    }

    /// Apply `cmd` and record it. On error nothing is recorded and the
    /// document is unchanged.
    pub fn push(&mut self, ctx: &mut DocumentContext, cmd: Command) -> Result<()> {
        cmd.apply(ctx, Direction::Forward)?;
        log::debug!("applied `{}`", cmd.label());
        if self.batch_depth > 0 {
            self.batch.push(cmd);
        } else {
            self.record(cmd);
        }
        Ok(())
    }

    fn record(&mut self, cmd: Command) {
        self.entries.truncate(self.cursor);
        if self.clean.is_some_and(|c| c > self.cursor) {
            self.clean = None;
        }
        self.entries.push(cmd);
        self.cursor += 1;
        if self.entries.len() > self.max_depth {
            self.entries.remove(0);
            self.cursor -= 1;
            self.clean = self.clean.and_then(|c| c.checked_sub(1));
        }
    }

    /// Start a batch group. Nested calls join the outermost batch.
    pub fn begin_batch(&mut self, label: &str) {
        if self.batch_depth == 0 {
            self.batch_label = label.to_string();
            self.batch.clear();
        }
        self.batch_depth += 1;
    }

    /// End a batch group. When the outermost batch closes, the commands
    /// applied during it become one entry. Empty batches leave no trace.
    pub fn end_batch(&mut self) {
        if self.batch_depth == 0 {
            return;
        }
        self.batch_depth -= 1;
        if self.batch_depth == 0 && !self.batch.is_empty() {
            let commands = std::mem::take(&mut self.batch);
            let label = std::mem::take(&mut self.batch_label);
            let entry = if commands.len() == 1 {
                commands.into_iter().next().unwrap_or_else(|| Command::group(label, Vec::new()))
            } else {
                Command::group(label, commands)
            };
            self.record(entry);
        }
    }

    /// Revert everything applied in the open batch and close it.
    pub fn cancel_batch(&mut self, ctx: &mut DocumentContext) -> Result<()> {
        self.batch_depth = 0;
        self.batch_label.clear();
        let commands = std::mem::take(&mut self.batch);
        for cmd in commands.iter().rev() {
            cmd.apply(ctx, Direction::Inverse)?;
        }
        Ok(())
    }

    pub fn is_batching(&self) -> bool {
        self.batch_depth > 0
    }

    /// Undo the command before the cursor. Returns its label, or `None`
    /// when there is nothing to undo.
    pub fn undo(&mut self, ctx: &mut DocumentContext) -> Result<Option<String>> {
        let Some(cmd) = self.cursor.checked_sub(1).and_then(|i| self.entries.get(i)) else {
            return Ok(None);
        };
        cmd.apply(ctx, Direction::Inverse)?;
        let label = cmd.label();
        self.cursor -= 1;
        log::debug!("undid `{label}`");
        Ok(Some(label))
    }

    /// Redo the command at the cursor.
    pub fn redo(&mut self, ctx: &mut DocumentContext) -> Result<Option<String>> {
        let Some(cmd) = self.entries.get(self.cursor) else {
            return Ok(None);
        };
        cmd.apply(ctx, Direction::Forward)?;
        let label = cmd.label();
        self.cursor += 1;
        log::debug!("redid `{label}`");
        Ok(Some(label))
    }

    /// The command the next `undo` would revert.
    pub fn peek_undo(&self) -> Option<&Command> {
        self.entries.get(self.cursor.checked_sub(1)?)
    }

    /// The command the next `redo` would apply.
    pub fn peek_redo(&self) -> Option<&Command> {
        self.entries.get(self.cursor)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    pub fn undo_label(&self) -> Option<String> {
        self.peek_undo().map(Command::label)
    }

    pub fn redo_label(&self) -> Option<String> {
        self.peek_redo().map(Command::label)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget all history; the current state becomes clean.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
        self.batch_depth = 0;
        self.batch.clear();
        self.clean = Some(0);
    }

    pub fn mark_clean(&mut self) {
        self.clean = Some(self.cursor);
    }

    /// Whether the document matches its last saved state.
    pub fn is_clean(&self) -> bool {
        self.clean == Some(self.cursor)
    }
}

impl Default for CommandLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}
