//! Small parsers over keys and literals, built on `winnow` 0.7.
//!
//! - background image keys: `<prefix>_background_<page>.jpg`
//! - counter-derived field ids: `field_<n>`
//! - property literals typed on a command line: `true`, `12.5`, `"text"`

use crate::id::FIELD_PREFIX;
use crate::model::PropValue;
use winnow::ascii::{digit1, float};
use winnow::combinator::{alt, delimited, eof, preceded, terminated};
use winnow::prelude::*;
use winnow::token::{rest, take_till};

/// Marker between the prefix and the page ordinal of a background key.
pub const BACKGROUND_MARKER: &str = "_background_";

/// Build the key of a page background image.
pub fn background_key(prefix: &str, page: usize) -> String {
    format!("{prefix}{BACKGROUND_MARKER}{page}.jpg")
}

/// Prefix of an image key: everything before the first `_`.
pub fn key_prefix(key: &str) -> &str {
    key.split('_').next().unwrap_or(key)
}

fn ordinal(input: &mut &str) -> ModalResult<i32> {
    preceded(BACKGROUND_MARKER, digit1)
        .map(|digits: &str| digits.parse::<i32>().unwrap_or(0))
        .parse_next(input)
}

/// Page ordinal embedded in an image key.
///
/// Matches like `.*_background_(\d+).*`: the last marker followed by digits
/// wins. Returns `-1` without a match and `0` when the digits overflow.
pub fn background_ordinal(key: &str) -> i32 {
    let mut found = -1;
    for (pos, _) in key.match_indices(BACKGROUND_MARKER) {
        let mut input = &key[pos..];
        if let Ok(n) = ordinal.parse_next(&mut input) {
            found = n;
        }
    }
    found
}

/// Rewrite the ordinal of a background key, keeping prefix and suffix.
/// Keys without an ordinal get a fresh `<prefix>_background_<page>.jpg` name.
pub fn with_background_ordinal(key: &str, page: usize) -> String {
    let Some(pos) = key.rfind(BACKGROUND_MARKER) else {
        return background_key(key_prefix(key), page);
    };
    let digits_start = pos + BACKGROUND_MARKER.len();
    let tail = &key[digits_start..];
    let digits_len = tail.chars().take_while(char::is_ascii_digit).count();
    if digits_len == 0 {
        return background_key(key_prefix(key), page);
    }
    format!("{}{page}{}", &key[..digits_start], &tail[digits_len..])
}

fn serial(input: &mut &str) -> ModalResult<u64> {
    terminated(
        preceded((FIELD_PREFIX, '_'), digit1.try_map(str::parse::<u64>)),
        eof,
    )
    .parse_next(input)
}

/// Serial number of a `field_<n>` id.
pub fn field_serial(id: &str) -> Option<u64> {
    let mut input = id;
    serial.parse_next(&mut input).ok()
}

fn literal(input: &mut &str) -> ModalResult<PropValue> {
    alt((
        terminated("true", eof).value(PropValue::Bool(true)),
        terminated("false", eof).value(PropValue::Bool(false)),
        terminated(float, eof)
            .verify(|n: &f64| n.is_finite())
            .map(PropValue::Number),
        terminated(delimited('"', take_till(0.., '"'), '"'), eof)
            .map(|s: &str| PropValue::Text(s.to_string())),
        rest.map(|s: &str| PropValue::Text(s.to_string())),
    ))
    .parse_next(input)
}

/// Interpret user-typed text as a property value.
pub fn parse_literal(text: &str) -> PropValue {
    let mut input = text.trim();
    literal
        .parse_next(&mut input)
        .unwrap_or_else(|_| PropValue::Text(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinal_from_generated_key() {
        assert_eq!(background_ordinal("3f2a_background_2.jpg"), 2);
        assert_eq!(background_ordinal("{a-b}_background_10.jpg"), 10);
    }

    #[test]
    fn ordinal_absent_or_overflowing() {
        assert_eq!(background_ordinal("portrait.png"), -1);
        assert_eq!(background_ordinal("x_background_.jpg"), -1);
        assert_eq!(background_ordinal("x_background_99999999999.jpg"), 0);
    }

    #[test]
    fn ordinal_last_marker_wins() {
        assert_eq!(background_ordinal("a_background_1_background_4.jpg"), 4);
        assert_eq!(background_ordinal("a_background_1_background_x.jpg"), 1);
    }

    #[test]
    fn rewrite_ordinal_keeps_prefix_and_suffix() {
        assert_eq!(with_background_ordinal("abc_background_3.jpg", 1), "abc_background_1.jpg");
        assert_eq!(with_background_ordinal("logo.png", 0), "logo.png_background_0.jpg");
    }

    #[test]
    fn serial_parsing() {
        assert_eq!(field_serial("field_7"), Some(7));
        assert_eq!(field_serial("field_7b"), None);
        assert_eq!(field_serial("fields_7"), None);
        assert_eq!(field_serial("hp"), None);
    }

    #[test]
    fn literal_parsing() {
        assert_eq!(parse_literal("true"), PropValue::Bool(true));
        assert_eq!(parse_literal("12.5"), PropValue::Number(12.5));
        assert_eq!(parse_literal("\"12\""), PropValue::Text("12".into()));
        assert_eq!(parse_literal("Strength"), PropValue::Text("Strength".into()));
        assert_eq!(parse_literal("truest"), PropValue::Text("truest".into()));
    }

    #[test]
    fn key_prefix_splits_on_underscore() {
        assert_eq!(key_prefix("abc_background_0.jpg"), "abc");
        assert_eq!(key_prefix("plain"), "plain");
    }
}
