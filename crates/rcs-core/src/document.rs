//! DocumentContext: the whole editable state of a sheet.
//!
//! Owns the field tree, the pages, the image store and the character
//! records, and performs the cascades that span more than one of them.
//! Every method validates before it mutates.

use crate::characters::{CharacterRecord, CharacterSheet};
use crate::error::{Result, SheetError};
use crate::id::FieldId;
use crate::images::{ImageEntry, ImageStore};
use crate::keys::{BACKGROUND_MARKER, background_ordinal, key_prefix};
use crate::lint::{Diagnostic, lint_document};
use crate::model::{Field, FieldKind, Geometry, PropValue};
use crate::pages::{Page, PageCollection};
use crate::tree::{FieldTree, Subtree};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Everything needed to put a removed page back.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedPage {
    pub index: usize,
    pub page: Page,
    /// Subtrees rooted on the page, in ascending slot order.
    pub subtrees: Vec<Subtree>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DocumentContext {
    tree: FieldTree,
    pages: PageCollection,
    images: ImageStore,
    characters: CharacterSheet,
}

impl DocumentContext {
    /// An empty sheet with one blank page.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tree(&self) -> &FieldTree {
        &self.tree
    }

    pub fn pages(&self) -> &PageCollection {
        &self.pages
    }

    pub fn images(&self) -> &ImageStore {
        &self.images
    }

    pub fn characters(&self) -> &CharacterSheet {
        &self.characters
    }

    pub fn field(&self, id: FieldId) -> Result<&Field> {
        self.tree.get(id).ok_or(SheetError::UnknownField(id))
    }

    fn check_page(&self, page: usize) -> Result<()> {
        if page < self.pages.len() {
            Ok(())
        } else {
            Err(SheetError::UnknownPage(page))
        }
    }

    // ─── Fields ──────────────────────────────────────────────────────────

    /// Build a field with a fresh id without inserting it.
    pub fn create_field(
        &mut self,
        kind: FieldKind,
        page: usize,
        parent: Option<FieldId>,
    ) -> Result<Field> {
        self.check_page(page)?;
        self.tree.create_field(kind, page, parent)
    }

    pub fn add_field(
        &mut self,
        kind: FieldKind,
        page: usize,
        parent: Option<FieldId>,
    ) -> Result<FieldId> {
        let field = self.create_field(kind, page, parent)?;
        let id = field.id;
        self.tree.insert(field, None)?;
        log::debug!("added {kind} field {id} on page {page}");
        Ok(id)
    }

    /// Insert a captured subtree at its recorded slot.
    pub fn insert_subtree(&mut self, subtree: &Subtree) -> Result<()> {
        if let Some(bad) = subtree.fields.iter().find(|f| f.page >= self.pages.len()) {
            return Err(SheetError::UnknownPage(bad.page));
        }
        if let [root] = subtree.fields.as_slice() {
            return self.tree.insert(root.clone(), Some(subtree.slot));
        }
        self.tree.restore(subtree)
    }

    pub fn remove_field(&mut self, id: FieldId) -> Result<Vec<FieldId>> {
        self.tree.remove_field(id)
    }

    pub fn set_property(&mut self, id: FieldId, key: &str, value: PropValue) -> Result<PropValue> {
        self.tree.set_property(id, key, value)
    }

    pub fn set_geometry(&mut self, id: FieldId, geometry: Geometry) -> Result<Geometry> {
        self.tree.set_geometry(id, geometry)
    }

    /// Rename one field, carrying character values along.
    pub fn rename_field(&mut self, old: FieldId, new: FieldId) -> Result<()> {
        self.tree.rename(old, new)?;
        if old != new {
            self.characters.remap_ids(&HashMap::from([(old, new)]));
        }
        Ok(())
    }

    pub fn remap_ids(&mut self, mapping: &HashMap<FieldId, FieldId>) -> Result<()> {
        self.tree.remap_ids(mapping)?;
        self.characters.remap_ids(mapping);
        Ok(())
    }

    pub fn plan_reset_ids(&self) -> Vec<(FieldId, FieldId)> {
        self.tree.plan_reset_ids()
    }

    pub fn reset_all_ids(&mut self) -> Result<HashMap<FieldId, FieldId>> {
        let mapping = self.tree.reset_all_ids()?;
        self.characters.remap_ids(&mapping);
        Ok(mapping)
    }

    // ─── Pages ───────────────────────────────────────────────────────────

    /// Insert a blank page; fields on `at` and later move along.
    pub fn insert_page(&mut self, at: usize) -> Result<usize> {
        self.pages.add_page(at)?;
        self.tree.shift_pages_up(at);
        self.check_pages()?;
        Ok(at)
    }

    /// Capture what removing page `index` would take away.
    pub fn capture_page(&self, index: usize) -> Result<RemovedPage> {
        if self.pages.len() <= 1 {
            return Err(SheetError::CannotRemoveLastPage);
        }
        let page = self.pages.get(index).ok_or(SheetError::UnknownPage(index))?.clone();
        let subtrees = self
            .tree
            .roots_on_page(index)
            .into_iter()
            .map(|id| self.tree.subtree(id))
            .collect::<Result<Vec<_>>>()?;
        Ok(RemovedPage { index, page, subtrees })
    }

    /// Remove a page with its fields; fields on later pages move up one.
    pub fn remove_page(&mut self, index: usize) -> Result<RemovedPage> {
        let removed = self.capture_page(index)?;
        for subtree in &removed.subtrees {
            self.tree.remove_field(subtree.root().id)?;
        }
        self.pages.remove_page(index)?;
        self.tree.shift_pages_down(index);
        self.check_pages()?;
        log::debug!("removed page {index} with {} root field(s)", removed.subtrees.len());
        Ok(removed)
    }

    pub fn restore_page(&mut self, removed: &RemovedPage) -> Result<()> {
        self.pages.insert(removed.index, removed.page.clone())?;
        self.tree.shift_pages_up(removed.index);
        for subtree in &removed.subtrees {
            self.tree.restore(subtree)?;
        }
        self.check_pages()
    }

    pub fn set_background(&mut self, page: usize, key: Option<String>) -> Result<Option<String>> {
        self.pages.set_background(page, key)
    }

    pub(crate) fn ensure_pages(&mut self, len: usize) {
        self.pages.ensure_len(len);
    }

    /// Every field sits on an existing page under a valid parent.
    pub fn check_pages(&self) -> Result<()> {
        self.tree.validate(self.pages.len())
    }

    // ─── Images ──────────────────────────────────────────────────────────

    pub fn insert_image(&mut self, entry: ImageEntry) -> Result<()> {
        self.images.insert(entry)
    }

    pub fn insert_image_at(&mut self, ordinal: usize, entry: ImageEntry) -> Result<()> {
        self.images.insert_at(ordinal, entry)
    }

    pub fn remove_image(&mut self, key: &str) -> Result<(usize, ImageEntry)> {
        self.images.remove_by_key(key)
    }

    /// Bytes for an `image://rcs/<key>` request.
    ///
    /// A key carrying `_background_<n>` resolves to page n's background
    /// whatever its prefix; anything else is a direct store lookup.
    pub fn provide_image(&self, key: &str) -> Option<&[u8]> {
        if key.contains(BACKGROUND_MARKER)
            && let Ok(page) = usize::try_from(background_ordinal(key))
            && let Some(bg) = self.pages.background(page)
            && let Some(entry) = self.images.get(bg)
        {
            return Some(&entry.bytes);
        }
        self.images.get(key).map(|e| e.bytes.as_slice())
    }

    /// Prefix shared by background keys, taken from the first page that
    /// has one.
    pub fn background_prefix(&self) -> Option<&str> {
        self.pages.iter().find_map(|p| p.background.as_deref()).map(key_prefix)
    }

    // ─── Characters ──────────────────────────────────────────────────────

    pub fn insert_character(&mut self, index: usize, record: CharacterRecord) -> usize {
        self.characters.insert(index, record)
    }

    pub fn remove_character(&mut self, index: usize) -> Result<CharacterRecord> {
        self.characters.remove(index)
    }

    pub fn set_character_value(
        &mut self,
        index: usize,
        id: FieldId,
        value: Option<Value>,
    ) -> Result<Option<Value>> {
        self.field(id)?;
        self.characters.set_value(index, id, value)
    }

    pub fn set_on_characters(
        &mut self,
        id: FieldId,
        value: &str,
    ) -> Result<Vec<(usize, Option<Value>)>> {
        self.field(id)?;
        Ok(self.characters.set_on_all(id, value))
    }

    /// Character values stored under ids that `pairs` would rename onto
    /// but that no renamed field vacates. A rename overwrites them.
    pub fn displaced_values(&self, pairs: &[(FieldId, FieldId)]) -> Vec<(usize, FieldId, Value)> {
        let vacated: HashSet<FieldId> = pairs.iter().map(|(old, _)| *old).collect();
        let mut out = Vec::new();
        for (index, record) in self.characters.iter().enumerate() {
            for (_, new) in pairs.iter().filter(|(_, new)| !vacated.contains(new)) {
                if let Some(value) = record.values.get(new.as_str()) {
                    out.push((index, *new, value.clone()));
                }
            }
        }
        out
    }

    /// Put back values captured by `displaced_values`.
    pub fn restore_displaced(&mut self, values: &[(usize, FieldId, Value)]) -> Result<()> {
        for (index, id, value) in values {
            self.characters.set_value(*index, *id, Some(value.clone()))?;
        }
        Ok(())
    }

    pub(crate) fn set_characters(&mut self, sheet: CharacterSheet) {
        self.characters = sheet;
    }

    pub(crate) fn tree_mut(&mut self) -> &mut FieldTree {
        &mut self.tree
    }

    /// Soft inconsistencies worth reporting.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        lint_document(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn three_pages() -> DocumentContext {
        let mut ctx = DocumentContext::new();
        ctx.insert_page(1).unwrap();
        ctx.insert_page(2).unwrap();
        ctx
    }

    #[test]
    fn add_field_checks_page() {
        let mut ctx = DocumentContext::new();
        let err = ctx.add_field(FieldKind::TextInput, 1, None).unwrap_err();
        assert!(matches!(err, SheetError::UnknownPage(1)));
        assert!(ctx.tree().is_empty());
    }

    #[test]
    fn removing_a_page_cascades() {
        let mut ctx = three_pages();
        let a = ctx.add_field(FieldKind::TextInput, 0, None).unwrap();
        let b = ctx.add_field(FieldKind::Table, 1, None).unwrap();
        let b_child = ctx.add_field(FieldKind::Checkbox, 1, Some(b)).unwrap();
        let c = ctx.add_field(FieldKind::Button, 2, None).unwrap();

        let removed = ctx.remove_page(1).unwrap();
        assert_eq!(ctx.pages().len(), 2);
        assert_eq!(removed.subtrees.len(), 1);
        assert!(ctx.tree().get(b).is_none());
        assert!(ctx.tree().get(b_child).is_none());
        assert_eq!(ctx.field(a).unwrap().page, 0);
        assert_eq!(ctx.field(c).unwrap().page, 1);
    }

    #[test]
    fn restore_page_is_exact() {
        let mut ctx = three_pages();
        ctx.add_field(FieldKind::TextInput, 1, None).unwrap();
        ctx.add_field(FieldKind::Button, 0, None).unwrap();
        ctx.add_field(FieldKind::Image, 1, None).unwrap();
        ctx.add_field(FieldKind::Checkbox, 2, None).unwrap();
        ctx.set_background(1, Some("x_background_1.jpg".into())).unwrap();
        let before = ctx.clone();

        let removed = ctx.remove_page(1).unwrap();
        ctx.restore_page(&removed).unwrap();
        assert_eq!(ctx, before);
    }

    #[test]
    fn inserting_a_page_shifts_later_fields() {
        let mut ctx = three_pages();
        let f = ctx.add_field(FieldKind::TextArea, 1, None).unwrap();
        ctx.insert_page(1).unwrap();
        assert_eq!(ctx.field(f).unwrap().page, 2);
    }

    #[test]
    fn last_page_stays() {
        let mut ctx = DocumentContext::new();
        assert!(matches!(ctx.capture_page(0), Err(SheetError::CannotRemoveLastPage)));
    }

    #[test]
    fn provider_resolves_page_backgrounds() {
        let mut ctx = three_pages();
        ctx.insert_image(ImageEntry::new("abc_background_1.jpg", b"one".to_vec(), "", true))
            .unwrap();
        ctx.insert_image(ImageEntry::new("logo.png", b"logo".to_vec(), "", false))
            .unwrap();
        ctx.set_background(1, Some("abc_background_1.jpg".into())).unwrap();

        assert_eq!(ctx.provide_image("zzz_background_1.jpg"), Some(&b"one"[..]));
        assert_eq!(ctx.provide_image("logo.png"), Some(&b"logo"[..]));
        assert_eq!(ctx.provide_image("abc_background_2.jpg"), None);
        assert_eq!(ctx.background_prefix(), Some("abc"));
    }

    #[test]
    fn renaming_moves_character_values() {
        let mut ctx = DocumentContext::new();
        let id = ctx.add_field(FieldKind::TextInput, 0, None).unwrap();
        ctx.insert_character(0, CharacterRecord::new("Aria"));
        ctx.set_character_value(0, id, Some("12".into())).unwrap();

        let hp = FieldId::intern("hp");
        ctx.rename_field(id, hp).unwrap();
        assert_eq!(ctx.characters().value(0, ctx.field(hp).unwrap()).unwrap(), "12");
    }
}
