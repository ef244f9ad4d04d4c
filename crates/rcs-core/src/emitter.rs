//! Emitter: DocumentContext → QML sheet description.
//!
//! Output is a pure function of the document and the options: fields are
//! walked in tree order, backgrounds in page order, and nothing else feeds
//! the text, so the same snapshot always yields the same bytes.

use crate::document::DocumentContext;
use crate::id::FieldId;
use crate::keys::{BACKGROUND_MARKER, key_prefix};
use crate::lint::{Diagnostic, background_sizes, check_backgrounds, dominant_size};
use crate::model::{Field, KindProps, TextAlign};
use std::collections::{HashMap, HashSet};
use std::fmt::Write;

/// Object ids the document skeleton uses itself.
const RESERVED_IDS: [&str; 2] = ["root", "imagebg"];

/// Switches that shape the generated document.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    /// Scrollable root sized by the background instead of a fixed item.
    pub flickable: bool,
    /// Scale applied to a flickable sheet.
    pub fixed_scale: f64,
    /// User code injected into the root element.
    pub additional_code: String,
    /// Inject `additional_code` before the body rather than after.
    pub additional_code_top: bool,
    /// Extra import line.
    pub additional_import: String,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            flickable: false,
            fixed_scale: 1.0,
            additional_code: String::new(),
            additional_code_top: true,
            additional_import: String::new(),
        }
    }
}

/// Generated text plus whatever was worth warning about on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub code: String,
    pub warnings: Vec<Diagnostic>,
}

/// Background that drives the layout.
struct ImageLayout {
    width: u32,
    height: u32,
    prefix: String,
}

/// Generate the QML description of a sheet.
#[must_use]
pub fn generate(ctx: &DocumentContext, options: &GenerationOptions) -> Generation {
    let mut warnings = check_backgrounds(ctx.pages(), ctx.images());
    let names = object_ids(ctx, &mut warnings);
    let layout = image_layout(ctx);
    let mut out = String::with_capacity(4096);

    out.push_str("import QtQuick 2.4\n");
    out.push_str("import QtQuick.Layouts 1.3\n");
    out.push_str("import QtQuick.Controls 2.3\n");
    out.push_str("import Rolisteam 1.0\n");
    out.push_str("import \"qrc:/resources/qml/\"\n");
    if !options.additional_import.is_empty() {
        let _ = writeln!(out, "{}", options.additional_import);
    }
    out.push('\n');

    if options.flickable {
        out.push_str("Flickable {\n");
        out.push_str("    id: root\n");
        if layout.is_some() {
            out.push_str("    contentWidth: imagebg.width\n");
            out.push_str("    contentHeight: imagebg.height\n");
        }
        out.push_str("    boundsBehavior: Flickable.StopAtBounds\n");
    } else {
        out.push_str("Item {\n");
        out.push_str("    id: root\n");
    }
    if layout.is_some() {
        out.push_str("    property alias realscale: imagebg.realscale\n");
    }
    out.push_str("    focus: true\n");
    out.push_str("    property int page: 0\n");
    let _ = writeln!(out, "    property int maxPage: {}", ctx.pages().len().saturating_sub(1));
    out.push_str("    onPageChanged: {\n");
    out.push_str("        page = page > maxPage ? maxPage : page < 0 ? 0 : page\n");
    out.push_str("    }\n");
    if options.additional_code_top {
        emit_user_code(&mut out, &options.additional_code);
    }
    out.push_str("    Keys.onLeftPressed: --page\n");
    out.push_str("    Keys.onRightPressed: ++page\n");
    out.push_str("    signal rollDiceCmd(string cmd, bool alias)\n");
    out.push_str("    signal showText(string text)\n");
    out.push_str("    MouseArea {\n");
    out.push_str("        anchors.fill: parent\n");
    out.push_str("        onClicked: root.focus = true\n");
    out.push_str("    }\n");

    match &layout {
        Some(bg) => {
            let (w, h) = (f64::from(bg.width), f64::from(bg.height));
            out.push_str("    Image {\n");
            out.push_str("        id: imagebg\n");
            out.push_str("        objectName: \"imagebg\"\n");
            let _ = writeln!(out, "        property real iratio: {}", format_num(w / h));
            let _ = writeln!(out, "        property real iratiobis: {}", format_num(h / w));
            if options.flickable {
                let _ = writeln!(
                    out,
                    "        property real realscale: {}",
                    format_num(options.fixed_scale)
                );
                out.push_str("        width: sourceSize.width * realscale\n");
                out.push_str("        height: sourceSize.height * realscale\n");
            } else {
                let _ = writeln!(out, "        property real realscale: width / {}", bg.width);
                out.push_str(concat!(
                    "        width: (parent.width > parent.height * iratio)",
                    " ? iratio * parent.height : parent.width\n",
                ));
                out.push_str(concat!(
                    "        height: (parent.width > parent.height * iratio)",
                    " ? parent.height : iratiobis * parent.width\n",
                ));
            }
            let _ = writeln!(
                out,
                "        source: \"image://rcs/{}{BACKGROUND_MARKER}%1.jpg\".arg(root.page)",
                escape(&bg.prefix)
            );
            emit_fields(&mut out, ctx, &names, 2);
            out.push_str("    }\n");
        }
        None => {
            let scale = if options.flickable { options.fixed_scale } else { 1.0 };
            let _ = writeln!(out, "    property real realscale: {}", format_num(scale));
            emit_fields(&mut out, ctx, &names, 1);
        }
    }

    if !options.additional_code_top {
        emit_user_code(&mut out, &options.additional_code);
    }
    out.push_str("}\n");

    Generation { code: out, warnings }
}

fn image_layout(ctx: &DocumentContext) -> Option<ImageLayout> {
    let sizes = background_sizes(ctx.pages(), ctx.images());
    let (width, height) = dominant_size(&sizes)?;
    if width == 0 || height == 0 {
        return None;
    }
    let prefix = sizes
        .iter()
        .rev()
        .find(|(_, size)| *size == (width, height))
        .and_then(|(page, _)| ctx.pages().background(*page))
        .map(key_prefix)
        .unwrap_or_default()
        .to_string();
    Some(ImageLayout { width, height, prefix })
}

fn emit_user_code(out: &mut String, code: &str) {
    if code.is_empty() {
        return;
    }
    for line in code.lines() {
        if line.is_empty() {
            out.push('\n');
        } else {
            let _ = writeln!(out, "    {line}");
        }
    }
}

/// QML object id of every field, unique within the document. Ids that
/// clash once sanitized get a numeric suffix, first come first served in
/// tree order.
fn object_ids(ctx: &DocumentContext, warnings: &mut Vec<Diagnostic>) -> HashMap<FieldId, String> {
    let mut taken: HashSet<String> = RESERVED_IDS.iter().map(|s| (*s).to_string()).collect();
    let mut names = HashMap::new();
    for id in ctx.tree().walk() {
        let base = sanitize_ident(id.as_str());
        let mut name = base.clone();
        let mut n = 2;
        while taken.contains(&name) {
            name = format!("{base}_{n}");
            n += 1;
        }
        if name != base {
            warnings.push(Diagnostic::info(
                id.as_str(),
                "object-id-renamed",
                format!("`{base}` is already taken, emitted as `{name}`"),
            ));
        }
        taken.insert(name.clone());
        names.insert(id, name);
    }
    names
}

fn emit_fields(
    out: &mut String,
    ctx: &DocumentContext,
    names: &HashMap<FieldId, String>,
    depth: usize,
) {
    for id in ctx.tree().roots() {
        emit_field(out, ctx, names, *id, depth, true);
    }
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("    ");
    }
}

fn line(out: &mut String, depth: usize, text: &str) {
    indent(out, depth);
    out.push_str(text);
    out.push('\n');
}

fn emit_field(
    out: &mut String,
    ctx: &DocumentContext,
    names: &HashMap<FieldId, String>,
    id: FieldId,
    depth: usize,
    is_root: bool,
) {
    let (Some(field), Some(name)) = (ctx.tree().get(id), names.get(&id)) else {
        return;
    };
    let inner = depth + 1;
    line(out, depth, &format!("{} {{", element_type(&field.props)));
    line(out, inner, &format!("id: {name}"));

    let g = &field.geometry;
    for (name, v) in [("x", g.x), ("y", g.y), ("width", g.width), ("height", g.height)] {
        line(out, inner, &format!("{name}: {}*root.realscale", format_num(v)));
    }
    if is_root {
        line(out, inner, &format!("visible: root.page == {}", field.page));
    }

    emit_kind_props(out, field, inner);
    emit_common_props(out, field, inner);

    for child in ctx.tree().children_of(id) {
        emit_field(out, ctx, names, *child, inner, false);
    }
    line(out, depth, "}");
}

fn element_type(props: &KindProps) -> &'static str {
    match props {
        KindProps::TextInput { .. } => "TextInputField",
        KindProps::TextArea { .. } => "TextAreaField",
        KindProps::Table { .. } => "TableField",
        KindProps::Image { .. } => "ImageField",
        KindProps::FunctionButton { .. } => "DiceButton",
        KindProps::WebPage { .. } => "WebView",
        KindProps::Checkbox { .. } => "CheckBoxField",
        KindProps::Button { .. } => "Button",
    }
}

fn emit_kind_props(out: &mut String, field: &Field, depth: usize) {
    let c = &field.common;
    match &field.props {
        KindProps::TextInput { placeholder, clipped } => {
            line(out, depth, &format!("text: {}", quoted(&c.value)));
            if !placeholder.is_empty() {
                line(out, depth, &format!("placeholderText: {}", quoted(placeholder)));
            }
            line(out, depth, &format!("clippedText: {clipped}"));
        }
        KindProps::TextArea { wrap } => {
            line(out, depth, &format!("text: {}", quoted(&c.value)));
            let mode = if *wrap { "TextEdit.Wrap" } else { "TextEdit.NoWrap" };
            line(out, depth, &format!("wrapMode: {mode}"));
        }
        KindProps::Table { rows, columns, header } => {
            line(out, depth, &format!("rows: {rows}"));
            line(out, depth, &format!("columns: {columns}"));
            line(out, depth, &format!("header: {header}"));
        }
        KindProps::Image { source, keep_aspect } => {
            line(out, depth, &format!("source: {}", quoted(source)));
            let mode = if *keep_aspect { "Image.PreserveAspectFit" } else { "Image.Stretch" };
            line(out, depth, &format!("fillMode: {mode}"));
        }
        KindProps::FunctionButton { command } => {
            line(out, depth, &format!("text: {}", quoted(&c.label)));
            line(out, depth, &format!("command: {}", quoted(command)));
            line(out, depth, "onClicked: root.rollDiceCmd(command, false)");
        }
        KindProps::WebPage { url } => {
            line(out, depth, &format!("url: {}", quoted(url)));
        }
        KindProps::Checkbox { checked } => {
            line(out, depth, &format!("text: {}", quoted(&c.label)));
            line(out, depth, &format!("checked: {checked}"));
        }
        KindProps::Button { message } => {
            line(out, depth, &format!("text: {}", quoted(&c.label)));
            line(out, depth, &format!("onClicked: root.showText({})", quoted(message)));
        }
    }
}

fn emit_common_props(out: &mut String, field: &Field, depth: usize) {
    let c = &field.common;
    line(out, depth, &format!("color: {}", quoted(&c.bg_color)));
    line(out, depth, &format!("textColor: {}", quoted(&c.text_color)));
    if !c.font_family.is_empty() {
        line(out, depth, &format!("font.family: {}", quoted(&c.font_family)));
    }
    line(out, depth, &format!("font.pointSize: {}", format_num(c.font_size)));
    let align = match c.text_align {
        TextAlign::Left => "Text.AlignLeft",
        TextAlign::Center => "Text.AlignHCenter",
        TextAlign::Right => "Text.AlignRight",
    };
    line(out, depth, &format!("hAlign: {align}"));
    line(out, depth, &format!("readOnly: {}", c.read_only));
    if !c.tooltip.is_empty() {
        line(out, depth, &format!("ToolTip.text: {}", quoted(&c.tooltip)));
    }
}

fn quoted(s: &str) -> String {
    format!("\"{}\"", escape(s))
}

/// Escape a string for a QML double-quoted literal.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

/// Turn a field id into a valid QML object id.
fn sanitize_ident(id: &str) -> String {
    let mut out: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if !out.starts_with(|c: char| c.is_ascii_lowercase() || c == '_') {
        out.insert(0, '_');
    }
    out
}

/// Format a float without trailing zeros for compact output.
fn format_num(n: f64) -> String {
    if n == n.floor() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n:.4}")
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::ImageEntry;
    use crate::model::{FieldKind, Geometry, PropValue};
    use pretty_assertions::assert_eq;

    fn sample() -> DocumentContext {
        let mut ctx = DocumentContext::new();
        ctx.insert_page(1).unwrap();
        let name = ctx.add_field(FieldKind::TextInput, 0, None).unwrap();
        ctx.set_geometry(name, Geometry::new(10.0, 20.5, 120.0, 24.0)).unwrap();
        ctx.set_property(name, "value", "Say \"hi\"".into()).unwrap();
        let table = ctx.add_field(FieldKind::Table, 1, None).unwrap();
        ctx.add_field(FieldKind::Checkbox, 1, Some(table)).unwrap();
        ctx
    }

    #[test]
    fn absolute_layout_without_backgrounds() {
        let code = generate(&sample(), &GenerationOptions::default()).code;
        assert!(code.starts_with("import QtQuick 2.4\n"));
        assert!(code.contains("Item {\n    id: root\n"));
        assert!(code.contains("    property real realscale: 1\n"));
        assert!(code.contains("    property int maxPage: 1\n"));
        assert!(!code.contains("imagebg"));
        assert!(code.ends_with("}\n"));
    }

    #[test]
    fn flickable_uses_fixed_scale() {
        let options = GenerationOptions {
            flickable: true,
            fixed_scale: 2.5,
            ..Default::default()
        };
        let code = generate(&sample(), &options).code;
        assert!(code.contains("Flickable {\n"));
        assert!(code.contains("    property real realscale: 2.5\n"));
    }

    #[test]
    fn fields_carry_geometry_and_page() {
        let code = generate(&sample(), &GenerationOptions::default()).code;
        assert!(code.contains("    TextInputField {\n        id: field_1\n"));
        assert!(code.contains("        x: 10*root.realscale\n"));
        assert!(code.contains("        y: 20.5*root.realscale\n"));
        assert!(code.contains("        visible: root.page == 0\n"));
        assert!(code.contains("        text: \"Say \\\"hi\\\"\"\n"));
    }

    #[test]
    fn table_children_are_nested() {
        let code = generate(&sample(), &GenerationOptions::default()).code;
        let table = code.find("TableField {").unwrap();
        let child = code.find("        CheckBoxField {").unwrap();
        assert!(child > table);
        // Children inherit visibility from their table.
        let child_block = &code[child..];
        let end = child_block.find("        }\n").unwrap();
        assert!(!child_block[..end].contains("visible:"));
    }

    #[test]
    fn image_driven_layout() {
        let mut ctx = sample();
        let mut entry = ImageEntry::new("abc_background_0.jpg", vec![], "", true);
        entry.size = Some((800, 600));
        ctx.insert_image(entry).unwrap();
        ctx.set_background(0, Some("abc_background_0.jpg".into())).unwrap();

        let code = generate(&ctx, &GenerationOptions::default()).code;
        assert!(code.contains("    property alias realscale: imagebg.realscale\n"));
        assert!(code.contains("        property real iratio: 1.3333\n"));
        assert!(code.contains("        property real iratiobis: 0.75\n"));
        assert!(code.contains("        property real realscale: width / 800\n"));
        assert!(code.contains("source: \"image://rcs/abc_background_%1.jpg\".arg(root.page)\n"));
        assert!(code.contains("        TextInputField {\n"));
    }

    #[test]
    fn user_code_placement() {
        let mut options = GenerationOptions {
            additional_code: "property int hp: 3".into(),
            additional_import: "import Extra 1.0".into(),
            ..Default::default()
        };
        let top = generate(&sample(), &options).code;
        assert!(top.contains("import \"qrc:/resources/qml/\"\nimport Extra 1.0\n"));
        assert!(top.find("property int hp").unwrap() < top.find("Keys.onLeftPressed").unwrap());

        options.additional_code_top = false;
        let bottom = generate(&sample(), &options).code;
        assert!(bottom.ends_with("    property int hp: 3\n}\n"));
    }

    #[test]
    fn generation_is_deterministic() {
        let ctx = sample();
        let options = GenerationOptions::default();
        assert_eq!(generate(&ctx, &options), generate(&ctx, &options));
    }

    #[test]
    fn property_changes_show_up() {
        let mut ctx = sample();
        let id = ctx.tree().roots()[0];
        ctx.set_property(id, "textAlign", PropValue::from("center")).unwrap();
        let code = generate(&ctx, &GenerationOptions::default()).code;
        assert!(code.contains("hAlign: Text.AlignHCenter"));
    }

    #[test]
    fn identifiers_are_sanitized() {
        assert_eq!(sanitize_ident("field_1"), "field_1");
        assert_eq!(sanitize_ident("Hit Points"), "_Hit_Points");
        assert_eq!(sanitize_ident("2nd-slot"), "_2nd_slot");
    }

    #[test]
    fn clashing_ids_get_unique_object_ids() {
        let mut ctx = DocumentContext::new();
        let a = ctx.add_field(FieldKind::TextInput, 0, None).unwrap();
        let b = ctx.add_field(FieldKind::TextInput, 0, None).unwrap();
        let c = ctx.add_field(FieldKind::Button, 0, None).unwrap();
        ctx.rename_field(a, FieldId::intern("hit points")).unwrap();
        ctx.rename_field(b, FieldId::intern("hit_points")).unwrap();
        ctx.rename_field(c, FieldId::intern("root")).unwrap();

        let generation = generate(&ctx, &GenerationOptions::default());
        let code = &generation.code;
        assert_eq!(code.matches("id: hit_points\n").count(), 1);
        assert_eq!(code.matches("id: hit_points_2\n").count(), 1);
        assert_eq!(code.matches("id: root\n").count(), 1);
        assert!(code.contains("id: root_2\n"));
        let renamed: Vec<_> = generation
            .warnings
            .iter()
            .filter(|d| d.rule == "object-id-renamed")
            .map(|d| d.subject.as_str())
            .collect();
        assert_eq!(renamed, vec!["hit_points", "root"]);
    }

    #[test]
    fn numbers_are_compact() {
        assert_eq!(format_num(3.0), "3");
        assert_eq!(format_num(0.5), "0.5");
        assert_eq!(format_num(1.0 / 3.0), "0.3333");
    }
}
