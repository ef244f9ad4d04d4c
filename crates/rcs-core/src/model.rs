//! Field data model for character sheets.
//!
//! A field is one placeable element on a page. Every field carries the
//! common presentation properties plus a statically typed property block
//! selected by its kind. Property access by string key (used by inspectors,
//! bulk edits and the archive) is validated against the kind's schema.
//! Unknown keys found in archives live in `extra` and are written back
//! untouched.

use crate::error::{Result, SheetError};
use crate::id::FieldId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

// ─── Property values ─────────────────────────────────────────────────────

/// A property value as exchanged with inspectors and archives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl PropValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            PropValue::Bool(b) => Value::Bool(*b),
            PropValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            PropValue::Text(s) => Value::String(s.clone()),
        }
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(PropValue::Bool(*b)),
            Value::Number(n) => n.as_f64().map(PropValue::Number),
            Value::String(s) => Some(PropValue::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Bool(b) => write!(f, "{b}"),
            PropValue::Number(n) => write!(f, "{n}"),
            PropValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for PropValue {
    fn from(s: &str) -> Self {
        PropValue::Text(s.to_string())
    }
}

impl From<bool> for PropValue {
    fn from(b: bool) -> Self {
        PropValue::Bool(b)
    }
}

impl From<f64> for PropValue {
    fn from(n: f64) -> Self {
        PropValue::Number(n)
    }
}

// ─── Kinds ───────────────────────────────────────────────────────────────

/// The field kinds a sheet can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    TextInput,
    TextArea,
    Table,
    Image,
    FunctionButton,
    WebPage,
    Checkbox,
    Button,
}

impl FieldKind {
    pub const ALL: [FieldKind; 8] = [
        FieldKind::TextInput,
        FieldKind::TextArea,
        FieldKind::Table,
        FieldKind::Image,
        FieldKind::FunctionButton,
        FieldKind::WebPage,
        FieldKind::Checkbox,
        FieldKind::Button,
    ];

    /// Archive name of the kind.
    pub fn name(self) -> &'static str {
        match self {
            FieldKind::TextInput => "text_input",
            FieldKind::TextArea => "text_area",
            FieldKind::Table => "table",
            FieldKind::Image => "image",
            FieldKind::FunctionButton => "function_button",
            FieldKind::WebPage => "web_page",
            FieldKind::Checkbox => "checkbox",
            FieldKind::Button => "button",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Only tables hold child fields.
    pub fn is_container(self) -> bool {
        matches!(self, FieldKind::Table)
    }

    /// Kind-specific property keys, in emission order.
    pub fn property_keys(self) -> &'static [&'static str] {
        match self {
            FieldKind::TextInput => &["placeholder", "clipped"],
            FieldKind::TextArea => &["wrap"],
            FieldKind::Table => &["rows", "columns", "header"],
            FieldKind::Image => &["source", "keepAspect"],
            FieldKind::FunctionButton => &["command"],
            FieldKind::WebPage => &["url"],
            FieldKind::Checkbox => &["checked"],
            FieldKind::Button => &["message"],
        }
    }

    pub fn accepts(self, key: &str) -> bool {
        COMMON_KEYS.contains(&key) || self.property_keys().contains(&key)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Geometry ────────────────────────────────────────────────────────────

/// Position and size in sheet coordinates (background pixels).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Geometry {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Geometry {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.width >= 0.0 && self.height >= 0.0
    }
}

// ─── Properties ──────────────────────────────────────────────────────────

/// Horizontal text alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

impl TextAlign {
    pub fn name(self) -> &'static str {
        match self {
            TextAlign::Left => "left",
            TextAlign::Center => "center",
            TextAlign::Right => "right",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "left" => Some(TextAlign::Left),
            "center" => Some(TextAlign::Center),
            "right" => Some(TextAlign::Right),
            _ => None,
        }
    }
}

/// Keys shared by every field kind.
pub const COMMON_KEYS: [&str; 9] = [
    "label",
    "value",
    "tooltip",
    "bgColor",
    "textColor",
    "fontFamily",
    "fontSize",
    "textAlign",
    "readOnly",
];

/// Presentation properties shared by every field.
#[derive(Debug, Clone, PartialEq)]
pub struct CommonProps {
    pub label: String,
    pub value: String,
    pub tooltip: String,
    pub bg_color: String,
    pub text_color: String,
    pub font_family: String,
    pub font_size: f64,
    pub text_align: TextAlign,
    pub read_only: bool,
}

impl Default for CommonProps {
    fn default() -> Self {
        Self {
            label: String::new(),
            value: String::new(),
            tooltip: String::new(),
            bg_color: "transparent".to_string(),
            text_color: "#000000".to_string(),
            font_family: String::new(),
            font_size: 11.0,
            text_align: TextAlign::Left,
            read_only: false,
        }
    }
}

/// Kind-specific properties. The variant decides the field's kind.
#[derive(Debug, Clone, PartialEq)]
pub enum KindProps {
    TextInput { placeholder: String, clipped: bool },
    TextArea { wrap: bool },
    Table { rows: u32, columns: u32, header: bool },
    Image { source: String, keep_aspect: bool },
    FunctionButton { command: String },
    WebPage { url: String },
    Checkbox { checked: bool },
    Button { message: String },
}

impl KindProps {
    /// Default property block for a kind.
    pub fn for_kind(kind: FieldKind) -> Self {
        match kind {
            FieldKind::TextInput => KindProps::TextInput {
                placeholder: String::new(),
                clipped: false,
            },
            FieldKind::TextArea => KindProps::TextArea { wrap: true },
            FieldKind::Table => KindProps::Table {
                rows: 1,
                columns: 1,
                header: true,
            },
            FieldKind::Image => KindProps::Image {
                source: String::new(),
                keep_aspect: true,
            },
            FieldKind::FunctionButton => KindProps::FunctionButton {
                command: String::new(),
            },
            FieldKind::WebPage => KindProps::WebPage { url: String::new() },
            FieldKind::Checkbox => KindProps::Checkbox { checked: false },
            FieldKind::Button => KindProps::Button {
                message: String::new(),
            },
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            KindProps::TextInput { .. } => FieldKind::TextInput,
            KindProps::TextArea { .. } => FieldKind::TextArea,
            KindProps::Table { .. } => FieldKind::Table,
            KindProps::Image { .. } => FieldKind::Image,
            KindProps::FunctionButton { .. } => FieldKind::FunctionButton,
            KindProps::WebPage { .. } => FieldKind::WebPage,
            KindProps::Checkbox { .. } => FieldKind::Checkbox,
            KindProps::Button { .. } => FieldKind::Button,
        }
    }
}

// ─── Field ───────────────────────────────────────────────────────────────

/// A single field placed on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub id: FieldId,
    pub page: usize,
    pub parent: Option<FieldId>,
    pub geometry: Geometry,
    pub common: CommonProps,
    pub props: KindProps,
    /// Archive keys this version does not understand.
    pub extra: BTreeMap<String, Value>,
}

impl Field {
    pub fn new(id: FieldId, kind: FieldKind, page: usize) -> Self {
        Self {
            id,
            page,
            parent: None,
            geometry: Geometry::default(),
            common: CommonProps::default(),
            props: KindProps::for_kind(kind),
            extra: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> FieldKind {
        self.props.kind()
    }

    /// Read a property by key.
    pub fn property(&self, key: &str) -> Result<PropValue> {
        let c = &self.common;
        let value: PropValue = match key {
            "label" => c.label.as_str().into(),
            "value" => c.value.as_str().into(),
            "tooltip" => c.tooltip.as_str().into(),
            "bgColor" => c.bg_color.as_str().into(),
            "textColor" => c.text_color.as_str().into(),
            "fontFamily" => c.font_family.as_str().into(),
            "fontSize" => c.font_size.into(),
            "textAlign" => c.text_align.name().into(),
            "readOnly" => c.read_only.into(),
            _ => return self.kind_property(key),
        };
        Ok(value)
    }

    fn kind_property(&self, key: &str) -> Result<PropValue> {
        let value: PropValue = match (&self.props, key) {
            (KindProps::TextInput { placeholder, .. }, "placeholder") => {
                placeholder.as_str().into()
            }
            (KindProps::TextInput { clipped, .. }, "clipped") => (*clipped).into(),
            (KindProps::TextArea { wrap }, "wrap") => (*wrap).into(),
            (KindProps::Table { rows, .. }, "rows") => f64::from(*rows).into(),
            (KindProps::Table { columns, .. }, "columns") => f64::from(*columns).into(),
            (KindProps::Table { header, .. }, "header") => (*header).into(),
            (KindProps::Image { source, .. }, "source") => source.as_str().into(),
            (KindProps::Image { keep_aspect, .. }, "keepAspect") => (*keep_aspect).into(),
            (KindProps::FunctionButton { command }, "command") => command.as_str().into(),
            (KindProps::WebPage { url }, "url") => url.as_str().into(),
            (KindProps::Checkbox { checked }, "checked") => (*checked).into(),
            (KindProps::Button { message }, "message") => message.as_str().into(),
            _ => {
                return Err(SheetError::InvalidPropertyForKind {
                    kind: self.kind(),
                    key: key.to_string(),
                });
            }
        };
        Ok(value)
    }

    /// Write a property by key and return the previous value.
    ///
    /// The key must belong to the field's kind and the value must have the
    /// expected type; on error the field is unchanged.
    pub fn set_property(&mut self, key: &str, value: PropValue) -> Result<PropValue> {
        let previous = self.property(key)?;
        let c = &mut self.common;
        match key {
            "label" => c.label = text(key, value)?,
            "value" => c.value = text(key, value)?,
            "tooltip" => c.tooltip = text(key, value)?,
            "bgColor" => c.bg_color = text(key, value)?,
            "textColor" => c.text_color = text(key, value)?,
            "fontFamily" => c.font_family = text(key, value)?,
            "fontSize" => {
                let size = number(key, value)?;
                if !size.is_finite() || size <= 0.0 {
                    return Err(SheetError::InvalidPropertyValue {
                        key: key.to_string(),
                        expected: "a positive number",
                    });
                }
                c.font_size = size;
            }
            "textAlign" => {
                c.text_align = value
                    .as_text()
                    .and_then(TextAlign::from_name)
                    .ok_or_else(|| SheetError::InvalidPropertyValue {
                        key: key.to_string(),
                        expected: "one of left, center, right",
                    })?;
            }
            "readOnly" => c.read_only = boolean(key, value)?,
            _ => self.set_kind_property(key, value)?,
        }
        Ok(previous)
    }

    fn set_kind_property(&mut self, key: &str, value: PropValue) -> Result<()> {
        let kind = self.kind();
        match (&mut self.props, key) {
            (KindProps::TextInput { placeholder, .. }, "placeholder") => {
                *placeholder = text(key, value)?;
            }
            (KindProps::TextInput { clipped, .. }, "clipped") => *clipped = boolean(key, value)?,
            (KindProps::TextArea { wrap }, "wrap") => *wrap = boolean(key, value)?,
            (KindProps::Table { rows, .. }, "rows") => *rows = count(key, value)?,
            (KindProps::Table { columns, .. }, "columns") => *columns = count(key, value)?,
            (KindProps::Table { header, .. }, "header") => *header = boolean(key, value)?,
            (KindProps::Image { source, .. }, "source") => *source = text(key, value)?,
            (KindProps::Image { keep_aspect, .. }, "keepAspect") => {
                *keep_aspect = boolean(key, value)?;
            }
            (KindProps::FunctionButton { command }, "command") => *command = text(key, value)?,
            (KindProps::WebPage { url }, "url") => *url = text(key, value)?,
            (KindProps::Checkbox { checked }, "checked") => *checked = boolean(key, value)?,
            (KindProps::Button { message }, "message") => *message = text(key, value)?,
            _ => {
                return Err(SheetError::InvalidPropertyForKind {
                    kind,
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }

    /// All schema properties in a stable order: common keys, then kind keys.
    pub fn properties(&self) -> Vec<(&'static str, PropValue)> {
        COMMON_KEYS
            .iter()
            .chain(self.kind().property_keys())
            .filter_map(|key| self.property(key).ok().map(|v| (*key, v)))
            .collect()
    }

    // ─── Archive records ─────────────────────────────────────────────────

    /// Flat archive record of this field, without children.
    pub fn to_record(&self) -> Map<String, Value> {
        let mut record = Map::new();
        for (key, value) in &self.extra {
            record.insert(key.clone(), value.clone());
        }
        record.insert("id".into(), Value::String(self.id.as_str().to_string()));
        record.insert("type".into(), Value::String(self.kind().name().to_string()));
        record.insert("page".into(), Value::from(self.page));
        let g = &self.geometry;
        for (key, v) in [("x", g.x), ("y", g.y), ("width", g.width), ("height", g.height)] {
            record.insert(key.into(), PropValue::Number(v).to_json());
        }
        for (key, value) in self.properties() {
            record.insert(key.into(), value.to_json());
        }
        record
    }

    /// Rebuild a field from an archive record. `children` is not consumed.
    pub fn from_record(record: &Map<String, Value>, parent: Option<FieldId>) -> Result<Self> {
        let id = record
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("field record without `id`"))?;
        let kind_name = record
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed(&format!("field `{id}` without `type`")))?;
        let kind = FieldKind::from_name(kind_name)
            .ok_or_else(|| malformed(&format!("field `{id}` has unknown type `{kind_name}`")))?;
        let page = match record.get("page").and_then(Value::as_u64) {
            Some(page) => usize::try_from(page)
                .map_err(|_| malformed(&format!("field `{id}` has page {page} out of range")))?,
            None => 0,
        };

        let mut field = Field::new(FieldId::intern(id), kind, page);
        field.parent = parent;
        let coord = |key: &str| record.get(key).and_then(Value::as_f64).unwrap_or(0.0);
        field.geometry = Geometry::new(coord("x"), coord("y"), coord("width"), coord("height"));
        if !field.geometry.is_valid() {
            return Err(SheetError::InvalidGeometry(field.id));
        }

        for (key, value) in record {
            match key.as_str() {
                "id" | "type" | "page" | "x" | "y" | "width" | "height" | "children" => {}
                k if kind.accepts(k) => {
                    let prop = PropValue::from_json(value)
                        .ok_or_else(|| malformed(&format!("field `{id}`: `{k}` is not a scalar")))?;
                    field.set_property(k, prop)?;
                }
                _ => {
                    field.extra.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(field)
    }
}

fn malformed(msg: &str) -> SheetError {
    SheetError::MalformedArchive(msg.to_string())
}

fn text(key: &str, value: PropValue) -> Result<String> {
    match value {
        PropValue::Text(s) => Ok(s),
        _ => Err(SheetError::InvalidPropertyValue {
            key: key.to_string(),
            expected: "text",
        }),
    }
}

fn number(key: &str, value: PropValue) -> Result<f64> {
    value.as_number().ok_or_else(|| SheetError::InvalidPropertyValue {
        key: key.to_string(),
        expected: "a number",
    })
}

fn boolean(key: &str, value: PropValue) -> Result<bool> {
    value.as_bool().ok_or_else(|| SheetError::InvalidPropertyValue {
        key: key.to_string(),
        expected: "true or false",
    })
}

fn count(key: &str, value: PropValue) -> Result<u32> {
    match value.as_number() {
        Some(n) if n >= 0.0 && n.fract() == 0.0 && n <= f64::from(u32::MAX) => Ok(n as u32),
        _ => Err(SheetError::InvalidPropertyValue {
            key: key.to_string(),
            expected: "a non-negative integer",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table() -> Field {
        Field::new(FieldId::intern("inventory"), FieldKind::Table, 0)
    }

    #[test]
    fn set_property_returns_previous() {
        let mut f = table();
        let prev = f.set_property("rows", PropValue::Number(4.0)).unwrap();
        assert_eq!(prev, PropValue::Number(1.0));
        assert_eq!(f.property("rows").unwrap(), PropValue::Number(4.0));
    }

    #[test]
    fn key_outside_kind_is_rejected() {
        let mut f = table();
        let err = f.set_property("url", "https://example.org".into()).unwrap_err();
        assert!(matches!(err, SheetError::InvalidPropertyForKind { .. }));
        assert!(f.property("url").is_err());
    }

    #[test]
    fn wrong_value_type_leaves_field_unchanged() {
        let mut f = table();
        let before = f.clone();
        assert!(f.set_property("rows", PropValue::Number(-2.0)).is_err());
        assert!(f.set_property("label", PropValue::Bool(true)).is_err());
        assert!(f.set_property("textAlign", "justify".into()).is_err());
        assert!(f.set_property("fontSize", PropValue::Number(0.0)).is_err());
        assert_eq!(f, before);
    }

    #[test]
    fn record_roundtrip_keeps_unknown_keys() {
        let mut f = Field::new(FieldId::intern("name"), FieldKind::TextInput, 1);
        f.geometry = Geometry::new(10.0, 20.5, 100.0, 24.0);
        f.set_property("label", "Name".into()).unwrap();
        f.set_property("clipped", true.into()).unwrap();

        let mut record = f.to_record();
        record.insert("formula".into(), Value::String("=1+1".into()));
        let back = Field::from_record(&record, None).unwrap();

        assert_eq!(back.geometry, f.geometry);
        assert_eq!(back.common, f.common);
        assert_eq!(back.props, f.props);
        assert_eq!(back.extra.get("formula"), Some(&Value::String("=1+1".into())));
        assert_eq!(back.to_record(), record);
    }

    #[test]
    fn record_with_unknown_type_is_malformed() {
        let mut record = Map::new();
        record.insert("id".into(), Value::String("x".into()));
        record.insert("type".into(), Value::String("slider".into()));
        assert!(matches!(
            Field::from_record(&record, None),
            Err(SheetError::MalformedArchive(_))
        ));
    }
}
