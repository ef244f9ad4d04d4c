//! Reversible sheet commands.
//!
//! Every mutation of a `DocumentContext` is a `Command` variant holding both
//! the forward data and whatever is needed to invert it, captured when the
//! command is built. Constructors validate against the current document, so
//! a command that exists can be applied; `apply` runs it either way.

use rcs_core::{
    CharacterRecord, DocumentContext, FieldId, FieldKind, Geometry, ImageEntry, PropValue,
    RemovedPage, Result, SheetError, Subtree, Value,
};
use std::collections::HashMap;

/// Which way to run a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Inverse,
}

impl Direction {
    pub fn flip(self) -> Self {
        match self {
            Direction::Forward => Direction::Inverse,
            Direction::Inverse => Direction::Forward,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Insert a blank page at `at`.
    AddPage { at: usize },
    DeletePage { removed: RemovedPage },
    /// Insert a single new field.
    AddField { subtree: Subtree },
    /// Remove a field with its descendants.
    DeleteField { subtree: Subtree },
    /// Point a page at a background, optionally adding the image first.
    SetBackground {
        page: usize,
        key: Option<String>,
        image: Option<ImageEntry>,
        previous: Option<String>,
    },
    SetProperty {
        id: FieldId,
        key: String,
        value: PropValue,
        previous: PropValue,
    },
    SetGeometry {
        id: FieldId,
        geometry: Geometry,
        previous: Geometry,
    },
    /// Store one value for a field in every character record.
    SetOnCharacters {
        id: FieldId,
        value: String,
        previous: Vec<(usize, Option<Value>)>,
    },
    /// `displaced` holds stale character values the new id overwrites.
    RenameField {
        old: FieldId,
        new: FieldId,
        displaced: Vec<(usize, FieldId, Value)>,
    },
    /// `(old, new)` pairs of a sequential renumbering.
    ResetIds {
        pairs: Vec<(FieldId, FieldId)>,
        displaced: Vec<(usize, FieldId, Value)>,
    },
    ImportImage { entry: ImageEntry },
    RemoveImage { entry: ImageEntry, ordinal: usize },
    AddCharacter { index: usize, record: CharacterRecord },
    RemoveCharacter { index: usize, record: CharacterRecord },
    /// Several commands undone as one step.
    Group { label: String, commands: Vec<Command> },
}

impl Command {
    // ─── Constructors ────────────────────────────────────────────────────

    pub fn add_page(ctx: &DocumentContext, at: usize) -> Result<Self> {
        if at > ctx.pages().len() {
            return Err(SheetError::UnknownPage(at));
        }
        Ok(Command::AddPage { at })
    }

    pub fn delete_page(ctx: &DocumentContext, index: usize) -> Result<Self> {
        Ok(Command::DeletePage {
            removed: ctx.capture_page(index)?,
        })
    }

    /// Allocates the new field's id, so the id is stable across redo.
    /// Returns the command together with that id.
    pub fn add_field(
        ctx: &mut DocumentContext,
        kind: FieldKind,
        page: usize,
        parent: Option<FieldId>,
    ) -> Result<(Self, FieldId)> {
        let field = ctx.create_field(kind, page, parent)?;
        let id = field.id;
        let slot = match parent {
            Some(p) => ctx.tree().children_of(p).len(),
            None => ctx.tree().roots().len(),
        };
        let cmd = Command::AddField {
            subtree: Subtree {
                slot,
                fields: vec![field],
            },
        };
        Ok((cmd, id))
    }

    pub fn delete_field(ctx: &DocumentContext, id: FieldId) -> Result<Self> {
        Ok(Command::DeleteField {
            subtree: ctx.tree().subtree(id)?,
        })
    }

    /// Use `image` (added to the store) as the background of `page`.
    pub fn set_background(ctx: &DocumentContext, page: usize, image: ImageEntry) -> Result<Self> {
        let previous = ctx
            .pages()
            .get(page)
            .ok_or(SheetError::UnknownPage(page))?
            .background
            .clone();
        if ctx.images().contains(&image.key) {
            return Err(SheetError::DuplicateImageKey(image.key));
        }
        Ok(Command::SetBackground {
            page,
            key: Some(image.key.clone()),
            image: Some(image),
            previous,
        })
    }

    /// Point `page` at an image already in the store, or clear it.
    pub fn use_background(ctx: &DocumentContext, page: usize, key: Option<String>) -> Result<Self> {
        let previous = ctx
            .pages()
            .get(page)
            .ok_or(SheetError::UnknownPage(page))?
            .background
            .clone();
        if let Some(k) = &key
            && !ctx.images().contains(k)
        {
            return Err(SheetError::UnknownImageKey(k.clone()));
        }
        Ok(Command::SetBackground {
            page,
            key,
            image: None,
            previous,
        })
    }

    pub fn set_property(
        ctx: &DocumentContext,
        id: FieldId,
        key: &str,
        value: PropValue,
    ) -> Result<Self> {
        // Validate on a scratch copy so the document stays untouched.
        let mut probe = ctx.field(id)?.clone();
        let previous = probe.set_property(key, value.clone())?;
        Ok(Command::SetProperty {
            id,
            key: key.to_string(),
            value,
            previous,
        })
    }

    pub fn set_geometry(ctx: &DocumentContext, id: FieldId, geometry: Geometry) -> Result<Self> {
        let previous = ctx.field(id)?.geometry;
        if !geometry.is_valid() {
            return Err(SheetError::InvalidGeometry(id));
        }
        Ok(Command::SetGeometry { id, geometry, previous })
    }

    pub fn set_on_characters(ctx: &DocumentContext, id: FieldId, value: &str) -> Result<Self> {
        ctx.field(id)?;
        let previous = ctx
            .characters()
            .iter()
            .enumerate()
            .map(|(i, r)| (i, r.values.get(id.as_str()).cloned()))
            .collect();
        Ok(Command::SetOnCharacters {
            id,
            value: value.to_string(),
            previous,
        })
    }

    pub fn rename_field(ctx: &DocumentContext, old: FieldId, new: FieldId) -> Result<Self> {
        ctx.field(old)?;
        if old != new && ctx.tree().contains(new) {
            return Err(SheetError::DuplicateField(new));
        }
        let displaced = if old == new {
            Vec::new()
        } else {
            ctx.displaced_values(&[(old, new)])
        };
        Ok(Command::RenameField { old, new, displaced })
    }

    pub fn reset_ids(ctx: &DocumentContext) -> Self {
        let pairs = ctx.plan_reset_ids();
        let displaced = ctx.displaced_values(&pairs);
        Command::ResetIds { pairs, displaced }
    }

    pub fn import_image(ctx: &DocumentContext, entry: ImageEntry) -> Result<Self> {
        if ctx.images().contains(&entry.key) {
            return Err(SheetError::DuplicateImageKey(entry.key));
        }
        Ok(Command::ImportImage { entry })
    }

    pub fn remove_image(ctx: &DocumentContext, key: &str) -> Result<Self> {
        let ordinal = ctx
            .images()
            .position(key)
            .ok_or_else(|| SheetError::UnknownImageKey(key.to_string()))?;
        let entry = ctx
            .images()
            .iter()
            .nth(ordinal)
            .cloned()
            .ok_or(SheetError::UnknownImageIndex(ordinal))?;
        Ok(Command::RemoveImage { entry, ordinal })
    }

    pub fn add_character(ctx: &DocumentContext, index: usize, record: CharacterRecord) -> Self {
        Command::AddCharacter {
            index: index.min(ctx.characters().len()),
            record,
        }
    }

    pub fn remove_character(ctx: &DocumentContext, index: usize) -> Result<Self> {
        let record = ctx
            .characters()
            .get(index)
            .cloned()
            .ok_or(SheetError::UnknownCharacter(index))?;
        Ok(Command::RemoveCharacter { index, record })
    }

    pub fn group(label: impl Into<String>, commands: Vec<Command>) -> Self {
        Command::Group {
            label: label.into(),
            commands,
        }
    }

    // ─── Execution ───────────────────────────────────────────────────────

    /// Run the command. On error the document is left as it was.
    pub fn apply(&self, ctx: &mut DocumentContext, dir: Direction) -> Result<()> {
        use Direction::{Forward, Inverse};
        match (self, dir) {
            (Command::AddPage { at }, Forward) => ctx.insert_page(*at).map(drop),
            (Command::AddPage { at }, Inverse) => ctx.remove_page(*at).map(drop),

            (Command::DeletePage { removed }, Forward) => ctx.remove_page(removed.index).map(drop),
            (Command::DeletePage { removed }, Inverse) => ctx.restore_page(removed),

            (Command::AddField { subtree }, Forward)
            | (Command::DeleteField { subtree }, Inverse) => ctx.insert_subtree(subtree),
            (Command::AddField { subtree }, Inverse)
            | (Command::DeleteField { subtree }, Forward) => {
                ctx.remove_field(subtree.root().id).map(drop)
            }

            (
                Command::SetBackground {
                    page, key, image, ..
                },
                Forward,
            ) => {
                ctx.pages().get(*page).ok_or(SheetError::UnknownPage(*page))?;
                if let Some(entry) = image {
                    ctx.insert_image(entry.clone())?;
                }
                ctx.set_background(*page, key.clone()).map(drop)
            }
            (
                Command::SetBackground {
                    page, image, previous, ..
                },
                Inverse,
            ) => {
                ctx.set_background(*page, previous.clone())?;
                if let Some(entry) = image {
                    ctx.remove_image(&entry.key)?;
                }
                Ok(())
            }

            (Command::SetProperty { id, key, value, .. }, Forward) => {
                ctx.set_property(*id, key, value.clone()).map(drop)
            }
            (Command::SetProperty { id, key, previous, .. }, Inverse) => {
                ctx.set_property(*id, key, previous.clone()).map(drop)
            }

            (Command::SetGeometry { id, geometry, .. }, Forward) => {
                ctx.set_geometry(*id, *geometry).map(drop)
            }
            (Command::SetGeometry { id, previous, .. }, Inverse) => {
                ctx.set_geometry(*id, *previous).map(drop)
            }

            (Command::SetOnCharacters { id, value, .. }, Forward) => {
                ctx.set_on_characters(*id, value).map(drop)
            }
            (Command::SetOnCharacters { id, previous, .. }, Inverse) => {
                for (index, value) in previous {
                    ctx.set_character_value(*index, *id, value.clone())?;
                }
                Ok(())
            }

            (Command::RenameField { old, new, .. }, Forward) => ctx.rename_field(*old, *new),
            (Command::RenameField { old, new, displaced }, Inverse) => {
                ctx.rename_field(*new, *old)?;
                ctx.restore_displaced(displaced)
            }

            (Command::ResetIds { pairs, .. }, Forward) => {
                let mapping: HashMap<FieldId, FieldId> = pairs.iter().copied().collect();
                ctx.remap_ids(&mapping)
            }
            (Command::ResetIds { pairs, displaced }, Inverse) => {
                let mapping: HashMap<FieldId, FieldId> =
                    pairs.iter().map(|(old, new)| (*new, *old)).collect();
                ctx.remap_ids(&mapping)?;
                ctx.restore_displaced(displaced)
            }

            (Command::ImportImage { entry }, Forward) => ctx.insert_image(entry.clone()),
            (Command::ImportImage { entry }, Inverse) => ctx.remove_image(&entry.key).map(drop),

            (Command::RemoveImage { entry, .. }, Forward) => ctx.remove_image(&entry.key).map(drop),
            (Command::RemoveImage { entry, ordinal }, Inverse) => {
                ctx.insert_image_at(*ordinal, entry.clone())
            }

            (Command::AddCharacter { index, record }, Forward)
            | (Command::RemoveCharacter { index, record }, Inverse) => {
                ctx.insert_character(*index, record.clone());
                Ok(())
            }
            (Command::AddCharacter { index, .. }, Inverse)
            | (Command::RemoveCharacter { index, .. }, Forward) => {
                ctx.remove_character(*index).map(drop)
            }

            (Command::Group { commands, .. }, Forward) => apply_all(ctx, commands.iter(), Forward),
            (Command::Group { commands, .. }, Inverse) => {
                apply_all(ctx, commands.iter().rev(), Inverse)
            }
        }
    }

    /// Short description for undo/redo menus.
    pub fn label(&self) -> String {
        match self {
            Command::AddPage { .. } => "add page".into(),
            Command::DeletePage { removed } => format!("delete page {}", removed.index),
            Command::AddField { subtree } => format!("add {}", subtree.root().kind()),
            Command::DeleteField { subtree } => format!("delete {}", subtree.root().id),
            Command::SetBackground { page, .. } => format!("set background of page {page}"),
            Command::SetProperty { id, key, .. } => format!("set {key} of {id}"),
            Command::SetGeometry { id, .. } => format!("move {id}"),
            Command::SetOnCharacters { id, .. } => format!("set {id} on all characters"),
            Command::RenameField { old, new, .. } => format!("rename {old} to {new}"),
            Command::ResetIds { .. } => "reset ids".into(),
            Command::ImportImage { entry } => format!("import {}", entry.key),
            Command::RemoveImage { entry, .. } => format!("remove {}", entry.key),
            Command::AddCharacter { record, .. } => format!("add character {}", record.name),
            Command::RemoveCharacter { record, .. } => format!("remove character {}", record.name),
            Command::Group { label, .. } => label.clone(),
        }
    }
}

/// Apply commands in order; on failure roll back the ones already applied.
fn apply_all<'a>(
    ctx: &mut DocumentContext,
    commands: impl Iterator<Item = &'a Command>,
    dir: Direction,
) -> Result<()> {
    let mut done: Vec<&Command> = Vec::new();
    for cmd in commands {
        if let Err(err) = cmd.apply(ctx, dir) {
            for applied in done.iter().rev() {
                if let Err(rollback) = applied.apply(ctx, dir.flip()) {
                    log::warn!("rollback of `{}` failed: {rollback}", applied.label());
                }
            }
            return Err(err);
        }
        done.push(cmd);
    }
    Ok(())
}
