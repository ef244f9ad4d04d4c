//! Editing session: one open sheet plus its history.
//!
//! The `Editor` is the single writer of a `DocumentContext`. Every
//! mutation goes through the command log; views learn what changed by
//! draining `ChangeEvent`s after each call.

use crate::commands::Command;
use crate::history::{CommandLog, DEFAULT_MAX_DEPTH};
use rcs_core::emitter::generate;
use rcs_core::keys::background_key;
use rcs_core::lint::check_backgrounds;
use rcs_core::{
    CharacterRecord, Diagnostic, DocumentContext, FieldId, FieldKind, FontRecord, GenerationOptions,
    Geometry, ImageEntry, Map, PropValue, Result, SheetArchive, SheetError, Value,
};
use smallvec::SmallVec;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// What changed, so dependent views know what to refresh.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Fields,
    Pages { count: usize },
    CurrentPage(usize),
    Images,
    Characters,
    Code,
    History,
    /// New diagnostics are available from `Editor::warnings`.
    Warnings,
}

pub type ChangeEvents = SmallVec<[ChangeEvent; 8]>;

pub struct Editor {
    ctx: DocumentContext,
    log: CommandLog,
    current_page: usize,
    options: GenerationOptions,
    code: String,
    /// Code was typed or imported by hand since the last generation.
    code_edited: bool,
    fonts: Vec<FontRecord>,
    passthrough: Map<String, Value>,
    path: Option<PathBuf>,
    warnings: Vec<Diagnostic>,
    events: ChangeEvents,
}

impl Editor {
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_DEPTH)
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            ctx: DocumentContext::new(),
            log: CommandLog::new(max_depth),
            current_page: 0,
            options: GenerationOptions::default(),
            code: String::new(),
            code_edited: false,
            fonts: Vec::new(),
            passthrough: Map::new(),
            path: None,
            warnings: Vec::new(),
            events: SmallVec::new(),
        }
    }

    // ─── Accessors ───────────────────────────────────────────────────────

    pub fn context(&self) -> &DocumentContext {
        &self.ctx
    }

    pub fn log(&self) -> &CommandLog {
        &self.log
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn set_current_page(&mut self, page: usize) -> Result<()> {
        if page >= self.ctx.pages().len() {
            return Err(SheetError::UnknownPage(page));
        }
        if page != self.current_page {
            self.current_page = page;
            self.emit(ChangeEvent::CurrentPage(page));
        }
        Ok(())
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    /// Generation options are settings, not document edits: no undo step.
    pub fn set_options(&mut self, options: GenerationOptions) {
        self.options = options;
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn is_code_edited(&self) -> bool {
        self.code_edited
    }

    /// Replace the code text by hand.
    pub fn set_code(&mut self, code: impl Into<String>) {
        self.code = code.into();
        self.code_edited = true;
        self.emit(ChangeEvent::Code);
    }

    pub fn fonts(&self) -> &[FontRecord] {
        &self.fonts
    }

    pub fn add_font(&mut self, font: FontRecord) {
        self.fonts.push(font);
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_modified(&self) -> bool {
        !self.log.is_clean()
    }

    /// Diagnostics from the last background change, generation, save or load.
    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    /// Drain the queued change events.
    pub fn take_events(&mut self) -> ChangeEvents {
        std::mem::take(&mut self.events)
    }

    /// Bytes for an `image://rcs/<key>` request from the preview.
    pub fn provide_image(&self, key: &str) -> Option<&[u8]> {
        self.ctx.provide_image(key)
    }

    fn emit(&mut self, event: ChangeEvent) {
        if !self.events.contains(&event) {
            self.events.push(event);
        }
    }

    // ─── Command plumbing ────────────────────────────────────────────────

    fn run(&mut self, cmd: Command) -> Result<()> {
        let mut touched = ChangeEvents::new();
        collect_events(&cmd, &mut touched);
        self.log.push(&mut self.ctx, cmd)?;
        self.after_change(touched);
        Ok(())
    }

    fn after_change(&mut self, touched: ChangeEvents) {
        let backgrounds_touched = touched
            .iter()
            .any(|e| matches!(e, ChangeEvent::Images | ChangeEvent::Pages { .. }));
        for event in touched {
            let event = match event {
                ChangeEvent::Pages { .. } => ChangeEvent::Pages {
                    count: self.ctx.pages().len(),
                },
                other => other,
            };
            self.emit(event);
        }
        let last = self.ctx.pages().len() - 1;
        if self.current_page > last {
            self.current_page = last;
            self.emit(ChangeEvent::CurrentPage(last));
        }
        if backgrounds_touched {
            self.warnings = check_backgrounds(self.ctx.pages(), self.ctx.images());
            if !self.warnings.is_empty() {
                self.emit(ChangeEvent::Warnings);
            }
        }
        self.emit(ChangeEvent::History);
    }

    pub fn undo(&mut self) -> Result<Option<String>> {
        let mut touched = ChangeEvents::new();
        if let Some(cmd) = self.log.peek_undo() {
            collect_events(cmd, &mut touched);
        }
        let label = self.log.undo(&mut self.ctx)?;
        if label.is_some() {
            self.after_change(touched);
        }
        Ok(label)
    }

    pub fn redo(&mut self) -> Result<Option<String>> {
        let mut touched = ChangeEvents::new();
        if let Some(cmd) = self.log.peek_redo() {
            collect_events(cmd, &mut touched);
        }
        let label = self.log.redo(&mut self.ctx)?;
        if label.is_some() {
            self.after_change(touched);
        }
        Ok(label)
    }

    pub fn can_undo(&self) -> bool {
        self.log.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.log.can_redo()
    }

    pub fn begin_batch(&mut self, label: &str) {
        self.log.begin_batch(label);
    }

    pub fn end_batch(&mut self) {
        self.log.end_batch();
    }

    // ─── Pages ───────────────────────────────────────────────────────────

    /// Insert a page after the current one and make it current.
    pub fn add_page(&mut self) -> Result<usize> {
        let at = self.current_page + 1;
        self.run(Command::add_page(&self.ctx, at)?)?;
        self.set_current_page(at)?;
        Ok(at)
    }

    pub fn delete_page(&mut self, index: usize) -> Result<()> {
        self.run(Command::delete_page(&self.ctx, index)?)
    }

    /// Use `bytes` as the background of the current page.
    ///
    /// The image gets a fresh `<uuid>_background_<page>.jpg` key. Size
    /// mismatches with other pages are reported through `warnings`.
    pub fn set_background(&mut self, bytes: Vec<u8>, label: &str) -> Result<String> {
        let page = self.current_page;
        let prefix = Uuid::new_v4().simple().to_string();
        let key = background_key(&prefix, page);
        let entry = ImageEntry::new(key.clone(), bytes, label, true);
        self.run(Command::set_background(&self.ctx, page, entry)?)?;
        Ok(key)
    }

    // ─── Fields ──────────────────────────────────────────────────────────

    /// Add a field on the current page (or inside `parent`).
    pub fn add_field(&mut self, kind: FieldKind, parent: Option<FieldId>) -> Result<FieldId> {
        self.add_field_on(kind, self.current_page, parent)
    }

    pub fn add_field_on(
        &mut self,
        kind: FieldKind,
        page: usize,
        parent: Option<FieldId>,
    ) -> Result<FieldId> {
        let (cmd, id) = Command::add_field(&mut self.ctx, kind, page, parent)?;
        self.run(cmd)?;
        Ok(id)
    }

    pub fn delete_field(&mut self, id: FieldId) -> Result<()> {
        self.run(Command::delete_field(&self.ctx, id)?)
    }

    /// Delete several fields as one undo step. Fields already removed with
    /// an earlier ancestor are skipped.
    pub fn delete_fields(&mut self, ids: &[FieldId]) -> Result<()> {
        self.log.begin_batch("delete fields");
        let mut result = Ok(());
        for id in ids {
            if !self.ctx.tree().contains(*id) {
                continue;
            }
            result = Command::delete_field(&self.ctx, *id).and_then(|cmd| self.run(cmd));
            if result.is_err() {
                break;
            }
        }
        if result.is_err() {
            self.log.cancel_batch(&mut self.ctx)?;
        } else {
            self.log.end_batch();
        }
        result
    }

    pub fn set_property(
        &mut self,
        id: FieldId,
        key: &str,
        value: impl Into<PropValue>,
    ) -> Result<()> {
        self.run(Command::set_property(&self.ctx, id, key, value.into())?)
    }

    pub fn set_geometry(&mut self, id: FieldId, geometry: Geometry) -> Result<()> {
        self.run(Command::set_geometry(&self.ctx, id, geometry)?)
    }

    pub fn rename_field(&mut self, old: FieldId, new: &str) -> Result<FieldId> {
        let new = FieldId::intern(new);
        self.run(Command::rename_field(&self.ctx, old, new)?)?;
        Ok(new)
    }

    /// Renumber every field `field_1..field_n` in tree order.
    pub fn reset_all_ids(&mut self) -> Result<Vec<(FieldId, FieldId)>> {
        let cmd = Command::reset_ids(&self.ctx);
        let pairs = match &cmd {
            Command::ResetIds { pairs, .. } => pairs.clone(),
            _ => Vec::new(),
        };
        if !pairs.is_empty() {
            self.run(cmd)?;
        }
        Ok(pairs)
    }

    // ─── Images ──────────────────────────────────────────────────────────

    pub fn import_image(
        &mut self,
        key: &str,
        bytes: Vec<u8>,
        label: &str,
        is_background: bool,
    ) -> Result<()> {
        let entry = ImageEntry::new(key, bytes, label, is_background);
        self.run(Command::import_image(&self.ctx, entry)?)
    }

    pub fn remove_image(&mut self, key: &str) -> Result<()> {
        self.run(Command::remove_image(&self.ctx, key)?)
    }

    // ─── Characters ──────────────────────────────────────────────────────

    pub fn add_character(&mut self, name: &str) -> Result<usize> {
        let index = self.ctx.characters().len();
        self.run(Command::add_character(&self.ctx, index, CharacterRecord::new(name)))?;
        Ok(index)
    }

    pub fn remove_character(&mut self, index: usize) -> Result<()> {
        self.run(Command::remove_character(&self.ctx, index)?)
    }

    /// Give a field the same value in every character record.
    pub fn set_on_characters(&mut self, id: FieldId, value: &str) -> Result<()> {
        self.run(Command::set_on_characters(&self.ctx, id, value)?)
    }

    // ─── Code ────────────────────────────────────────────────────────────

    /// Regenerate the code text. Hand edits are kept unless
    /// `overwrite_edits` is set; returns whether the code was replaced.
    pub fn generate_code(&mut self, overwrite_edits: bool) -> bool {
        if self.code_edited && !overwrite_edits {
            return false;
        }
        let generation = generate(&self.ctx, &self.options);
        self.code = generation.code;
        self.code_edited = false;
        self.warnings = generation.warnings;
        self.emit(ChangeEvent::Code);
        if !self.warnings.is_empty() {
            self.emit(ChangeEvent::Warnings);
        }
        true
    }

    /// Write the code text to a `.qml` file.
    pub fn export_code(&self, path: &Path) -> Result<()> {
        fs::write(path, &self.code)?;
        Ok(())
    }

    /// Replace the code text with a file's contents.
    pub fn import_code(&mut self, path: &Path) -> Result<()> {
        let code = fs::read_to_string(path)?;
        self.set_code(code);
        Ok(())
    }

    // ─── Persistence ─────────────────────────────────────────────────────

    /// Snapshot of the session as an archive.
    pub fn to_archive(&self) -> SheetArchive {
        SheetArchive {
            context: self.ctx.clone(),
            code: self.code.clone(),
            options: self.options.clone(),
            fonts: self.fonts.clone(),
            passthrough: self.passthrough.clone(),
        }
    }

    /// Save to `path` (`.rcs` is appended when missing) and remember it.
    /// A session that never produced code gets freshly generated code first.
    pub fn save_as(&mut self, path: &Path) -> Result<PathBuf> {
        let generated = self.code.is_empty() && self.generate_code(true);
        let (written, diags) = self.to_archive().save(path)?;
        self.path = Some(written.clone());
        self.log.mark_clean();
        if !generated {
            self.warnings.clear();
        }
        self.warnings.extend(diags);
        if !self.warnings.is_empty() {
            self.emit(ChangeEvent::Warnings);
        }
        self.emit(ChangeEvent::History);
        Ok(written)
    }

    /// Save to the remembered path.
    pub fn save(&mut self) -> Result<PathBuf> {
        let path = self.path.clone().ok_or_else(|| {
            SheetError::Io(io::Error::new(io::ErrorKind::NotFound, "sheet has not been saved yet"))
        })?;
        self.save_as(&path)
    }

    /// Replace the session with an archive from disk. On error the current
    /// session is untouched.
    pub fn open(&mut self, path: &Path) -> Result<()> {
        let (archive, diags) = SheetArchive::load(path)?;
        self.ctx = archive.context;
        self.code = archive.code;
        self.options = archive.options;
        self.fonts = archive.fonts;
        self.passthrough = archive.passthrough;
        self.path = Some(path.to_path_buf());
        self.code_edited = false;
        self.current_page = 0;
        self.log.clear();
        self.warnings = diags;
        for event in [
            ChangeEvent::Fields,
            ChangeEvent::Pages {
                count: self.ctx.pages().len(),
            },
            ChangeEvent::CurrentPage(0),
            ChangeEvent::Images,
            ChangeEvent::Characters,
            ChangeEvent::Code,
            ChangeEvent::History,
        ] {
            self.emit(event);
        }
        if !self.warnings.is_empty() {
            self.emit(ChangeEvent::Warnings);
        }
        Ok(())
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}

/// Views a command touches, in either direction.
fn collect_events(cmd: &Command, out: &mut ChangeEvents) {
    let mut add = |event: ChangeEvent| {
        if !out.contains(&event) {
            out.push(event);
        }
    };
    match cmd {
        Command::AddPage { .. } | Command::DeletePage { .. } => {
            add(ChangeEvent::Pages { count: 0 });
            add(ChangeEvent::Fields);
        }
        Command::AddField { .. }
        | Command::DeleteField { .. }
        | Command::SetProperty { .. }
        | Command::SetGeometry { .. } => add(ChangeEvent::Fields),
        Command::RenameField { .. } | Command::ResetIds { .. } => {
            add(ChangeEvent::Fields);
            add(ChangeEvent::Characters);
        }
        Command::SetBackground { .. } => {
            add(ChangeEvent::Pages { count: 0 });
            add(ChangeEvent::Images);
        }
        Command::ImportImage { .. } | Command::RemoveImage { .. } => add(ChangeEvent::Images),
        Command::SetOnCharacters { .. }
        | Command::AddCharacter { .. }
        | Command::RemoveCharacter { .. } => add(ChangeEvent::Characters),
        Command::Group { commands, .. } => {
            for child in commands {
                collect_events(child, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_page_follows_current() {
        let mut editor = Editor::new();
        assert_eq!(editor.add_page().unwrap(), 1);
        assert_eq!(editor.current_page(), 1);
        editor.set_current_page(0).unwrap();
        assert_eq!(editor.add_page().unwrap(), 1);
        assert_eq!(editor.context().pages().len(), 3);
    }

    #[test]
    fn events_describe_changes() {
        let mut editor = Editor::new();
        let id = editor.add_field(FieldKind::Checkbox, None).unwrap();
        let events = editor.take_events();
        assert!(events.contains(&ChangeEvent::Fields));
        assert!(events.contains(&ChangeEvent::History));
        assert!(editor.take_events().is_empty());

        editor.set_on_characters(id, "x").unwrap();
        assert!(editor.take_events().contains(&ChangeEvent::Characters));
    }

    #[test]
    fn deleting_current_page_clamps_it() {
        let mut editor = Editor::new();
        editor.add_page().unwrap();
        editor.delete_page(1).unwrap();
        assert_eq!(editor.current_page(), 0);
        assert!(editor.take_events().contains(&ChangeEvent::CurrentPage(0)));
    }

    #[test]
    fn hand_edits_survive_generation_unless_forced() {
        let mut editor = Editor::new();
        editor.set_code("Item {}");
        assert!(!editor.generate_code(false));
        assert_eq!(editor.code(), "Item {}");
        assert!(editor.generate_code(true));
        assert!(editor.code().starts_with("import QtQuick"));
        assert!(!editor.is_code_edited());
    }

    #[test]
    fn background_keys_carry_page() {
        let mut editor = Editor::new();
        editor.add_page().unwrap();
        let key = editor.set_background(vec![1, 2, 3], "scan.png").unwrap();
        assert!(key.ends_with("_background_1.jpg"));
        assert_eq!(editor.context().pages().background(1), Some(key.as_str()));
        assert_eq!(editor.provide_image("x_background_1.jpg"), Some(&[1u8, 2, 3][..]));
        // Not a decodable image.
        assert!(editor.warnings().iter().any(|d| d.rule == "undecodable-background"));
    }

    #[test]
    fn save_without_path_fails() {
        let mut editor = Editor::new();
        assert!(matches!(editor.save(), Err(SheetError::Io(_))));
    }

    #[test]
    fn delete_fields_skips_descendants() {
        let mut editor = Editor::new();
        let table = editor.add_field(FieldKind::Table, None).unwrap();
        let cell = editor.add_field(FieldKind::TextInput, Some(table)).unwrap();
        let other = editor.add_field(FieldKind::Button, None).unwrap();
        editor.delete_fields(&[table, cell, other]).unwrap();
        assert!(editor.context().tree().is_empty());
        editor.undo().unwrap();
        assert_eq!(editor.context().tree().len(), 3);
    }
}
