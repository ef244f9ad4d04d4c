//! `.rcs` archive codec.
//!
//! An archive is one JSON object holding the field tree, the code text,
//! the generation options, fonts, images (base64) and character records.
//! Keys this version does not know are carried through unchanged.
//!
//! Page backgrounds are stored as one `background` entry per page. On
//! load the entries are ordered by the page ordinal embedded in their key
//! and each background entry creates the next page.

use crate::characters::{CharacterRecord, CharacterSheet};
use crate::document::DocumentContext;
use crate::emitter::GenerationOptions;
use crate::error::{Result, SheetError};
use crate::id::FieldId;
use crate::images::{ImageEntry, ImageRecord};
use crate::keys::{background_key, background_ordinal, with_background_ordinal};
use crate::lint::Diagnostic;
use crate::model::Field;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// File suffix of sheet archives.
pub const EXTENSION: &str = "rcs";

const LOADED_LABEL: &str = "from rcs file";

/// Highest page count a field record may open without a background.
const MAX_FIELD_PAGES: usize = 4096;

/// An embedded font.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontRecord {
    pub name: String,
    /// Base64 font payload.
    #[serde(default)]
    pub data: String,
}

/// A complete sheet document as stored on disk.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SheetArchive {
    pub context: DocumentContext,
    /// Generated or hand-edited QML.
    pub code: String,
    pub options: GenerationOptions,
    pub fonts: Vec<FontRecord>,
    /// Top-level keys this version does not interpret.
    pub passthrough: Map<String, Value>,
}

fn default_scale() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TreeData {
    #[serde(default)]
    items: Vec<Map<String, Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawArchive {
    #[serde(default)]
    data: TreeData,
    #[serde(default)]
    qml: String,
    #[serde(rename = "additionnalCode", default)]
    additional_code: String,
    #[serde(rename = "additionnalImport", default)]
    additional_import: String,
    #[serde(rename = "fixedScale", default = "default_scale")]
    fixed_scale: f64,
    #[serde(rename = "additionnalCodeTop", default = "default_true")]
    additional_code_top: bool,
    #[serde(default)]
    flickable: bool,
    #[serde(default)]
    fonts: Vec<FontRecord>,
    #[serde(default)]
    background: Vec<ImageRecord>,
    #[serde(default)]
    characters: Vec<CharacterRecord>,
    #[serde(flatten)]
    passthrough: Map<String, Value>,
}

/// Order in which `background` entries are replayed on load.
///
/// Entries compare by embedded page ordinal; when both ordinals are 0 the
/// keys decide.
pub fn load_order(a: &ImageRecord, b: &ImageRecord) -> Ordering {
    let (oa, ob) = (background_ordinal(&a.key), background_ordinal(&b.key));
    if oa != 0 || ob != 0 {
        oa.cmp(&ob)
    } else {
        a.key.cmp(&b.key)
    }
}

impl SheetArchive {
    pub fn new(context: DocumentContext) -> Self {
        Self {
            context,
            ..Default::default()
        }
    }

    // ─── Encoding ────────────────────────────────────────────────────────

    /// Serialize to JSON, with notes about anything left out.
    pub fn to_json(&self) -> Result<(String, Vec<Diagnostic>)> {
        let (background, diags) = self.background_records();
        let raw = RawArchive {
            data: TreeData {
                items: self.field_records(),
            },
            qml: self.code.clone(),
            additional_code: self.options.additional_code.clone(),
            additional_import: self.options.additional_import.clone(),
            fixed_scale: self.options.fixed_scale,
            additional_code_top: self.options.additional_code_top,
            flickable: self.options.flickable,
            fonts: self.fonts.clone(),
            background,
            characters: self.context.characters().records().to_vec(),
            passthrough: self.passthrough.clone(),
        };
        Ok((serde_json::to_string_pretty(&raw)?, diags))
    }

    fn field_records(&self) -> Vec<Map<String, Value>> {
        let tree = self.context.tree();
        tree.roots().iter().map(|id| nested_record(&self.context, *id)).collect()
    }

    /// One entry per page in page order, then every other image.
    fn background_records(&self) -> (Vec<ImageRecord>, Vec<Diagnostic>) {
        let ctx = &self.context;
        let prefix = ctx.background_prefix().unwrap_or("page").to_string();
        let mut used = HashSet::new();
        let mut records = Vec::new();
        let mut diags = Vec::new();

        for (i, page) in ctx.pages().iter().enumerate() {
            let entry = page.background.as_deref().and_then(|k| ctx.images().get(k));
            let record = match entry {
                Some(entry) => ImageRecord {
                    key: with_background_ordinal(&entry.key, i),
                    is_bg: true,
                    ..ImageRecord::from_entry(entry)
                },
                None => ImageRecord {
                    key: background_key(&prefix, i),
                    bin: String::new(),
                    is_bg: true,
                    label: String::new(),
                },
            };
            records.push(record);
        }

        let referenced: HashSet<&str> = ctx
            .pages()
            .iter()
            .filter_map(|p| p.background.as_deref())
            .collect();
        let mut others = Vec::new();
        for entry in ctx.images().iter() {
            if referenced.contains(entry.key.as_str()) {
                continue;
            }
            if entry.is_background {
                log::warn!("background image `{}` belongs to no page, not saved", entry.key);
                diags.push(Diagnostic::info(
                    entry.key.clone(),
                    "orphan-background",
                    "background image is not used by any page and was not saved".to_string(),
                ));
                continue;
            }
            others.push(ImageRecord::from_entry(entry));
        }

        // Page entries first so their canonical names win any clash.
        for record in records.iter_mut().chain(others.iter_mut()) {
            let mut key = record.key.clone();
            let mut n = 1;
            while used.contains(&key) {
                key = format!("{}.{n}", record.key);
                n += 1;
            }
            used.insert(key.clone());
            record.key = key;
        }
        records.extend(others);
        (records, diags)
    }

    /// Write to `path`, appending `.rcs` when missing. The file is replaced
    /// atomically. Returns the path written.
    pub fn save(&self, path: &Path) -> Result<(PathBuf, Vec<Diagnostic>)> {
        let path = with_extension(path);
        let (text, diags) = self.to_json()?;
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, text)?;
        if let Err(err) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
        log::debug!("saved sheet to {}", path.display());
        Ok((path, diags))
    }

    // ─── Decoding ────────────────────────────────────────────────────────

    /// Parse an archive. Any structural problem fails the whole load.
    pub fn from_json(text: &str) -> Result<(Self, Vec<Diagnostic>)> {
        let raw: RawArchive = serde_json::from_str(text)?;
        Self::from_raw(raw).map_err(|err| match err {
            SheetError::MalformedArchive(_) => err,
            other => SheetError::MalformedArchive(other.to_string()),
        })
    }

    fn from_raw(raw: RawArchive) -> Result<(Self, Vec<Diagnostic>)> {
        let mut ctx = DocumentContext::new();

        let mut entries = raw.background;
        entries.sort_by(load_order);
        let mut page = 0;
        for record in entries {
            let bytes = record.decode()?;
            if record.is_bg {
                if page > 0 {
                    ctx.insert_page(page)?;
                }
                if !bytes.is_empty() {
                    ctx.set_background(page, Some(record.key.clone()))?;
                }
                page += 1;
            }
            if bytes.is_empty() && record.is_bg {
                continue;
            }
            let label = if record.label.is_empty() {
                LOADED_LABEL.to_string()
            } else {
                record.label
            };
            ctx.insert_image(ImageEntry::new(record.key, bytes, label, record.is_bg))?;
        }

        let mut fields = Vec::new();
        for item in &raw.data.items {
            flatten_record(item, None, &mut fields)?;
        }
        if let Some(last) = fields.iter().map(|f| f.page).max() {
            let limit = ctx.pages().len().max(MAX_FIELD_PAGES);
            let len = last
                .checked_add(1)
                .filter(|len| *len <= limit)
                .ok_or_else(|| {
                    SheetError::MalformedArchive(format!("field page {last} out of range"))
                })?;
            ctx.ensure_pages(len);
        }
        for field in fields {
            ctx.tree_mut().insert(field, None)?;
        }
        ctx.check_pages()?;
        ctx.set_characters(CharacterSheet::from_records(raw.characters));

        let diags = ctx.diagnostics();
        let archive = SheetArchive {
            context: ctx,
            code: raw.qml,
            options: GenerationOptions {
                flickable: raw.flickable,
                fixed_scale: raw.fixed_scale,
                additional_code: raw.additional_code,
                additional_code_top: raw.additional_code_top,
                additional_import: raw.additional_import,
            },
            fonts: raw.fonts,
            passthrough: raw.passthrough,
        };
        Ok((archive, diags))
    }

    /// Read an archive from disk.
    pub fn load(path: &Path) -> Result<(Self, Vec<Diagnostic>)> {
        let text = fs::read_to_string(path)?;
        let loaded = Self::from_json(&text)?;
        log::debug!("loaded sheet from {}", path.display());
        Ok(loaded)
    }
}

/// `path` with the archive suffix, unless it already has it.
pub fn with_extension(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|e| e == EXTENSION) {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_owned();
        name.push(".");
        name.push(EXTENSION);
        PathBuf::from(name)
    }
}

fn nested_record(ctx: &DocumentContext, id: FieldId) -> Map<String, Value> {
    let tree = ctx.tree();
    let mut record = tree.get(id).map(Field::to_record).unwrap_or_default();
    let children = tree.children_of(id);
    if !children.is_empty() {
        let items = children
            .iter()
            .map(|c| Value::Object(nested_record(ctx, *c)))
            .collect();
        record.insert("children".into(), Value::Array(items));
    }
    record
}

/// Parent-first list of the fields in a nested record.
fn flatten_record(
    record: &Map<String, Value>,
    parent: Option<FieldId>,
    out: &mut Vec<Field>,
) -> Result<()> {
    let field = Field::from_record(record, parent)?;
    let id = field.id;
    out.push(field);
    match record.get("children") {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Array(children)) => {
            for child in children {
                let child = child.as_object().ok_or_else(|| {
                    SheetError::MalformedArchive(format!("child of `{id}` is not an object"))
                })?;
                flatten_record(child, Some(id), out)?;
            }
            Ok(())
        }
        Some(_) => Err(SheetError::MalformedArchive(format!("`children` of `{id}` is not a list"))),
    }
}
