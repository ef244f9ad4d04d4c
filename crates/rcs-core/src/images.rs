//! Image store: keyed binary payloads for page backgrounds and assets.
//!
//! Entries keep their insertion order, which is the ordinal used by
//! `remove_at` and the order images are written to archives.

use crate::error::{Result, SheetError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::ImageReader;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Pixel size from the image header, or `None` when the bytes are not a
/// decodable image.
pub fn probe_size(bytes: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageEntry {
    pub key: String,
    pub bytes: Vec<u8>,
    /// Where the image came from (file name, "from PDF", ...).
    pub label: String,
    pub is_background: bool,
    pub size: Option<(u32, u32)>,
}

impl ImageEntry {
    pub fn new(
        key: impl Into<String>,
        bytes: Vec<u8>,
        label: impl Into<String>,
        is_background: bool,
    ) -> Self {
        let size = probe_size(&bytes);
        Self {
            key: key.into(),
            bytes,
            label: label.into(),
            is_background,
            size,
        }
    }
}

/// Archive form of an image entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub key: String,
    /// Base64 payload; empty for a page without background.
    #[serde(default)]
    pub bin: String,
    #[serde(rename = "isBg", default)]
    pub is_bg: bool,
    #[serde(default)]
    pub label: String,
}

impl ImageRecord {
    pub fn from_entry(entry: &ImageEntry) -> Self {
        Self {
            key: entry.key.clone(),
            bin: STANDARD.encode(&entry.bytes),
            is_bg: entry.is_background,
            label: entry.label.clone(),
        }
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        Ok(STANDARD.decode(self.bin.trim())?)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageStore {
    entries: Vec<ImageEntry>,
}

impl ImageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.key == key)
    }

    pub fn get(&self, key: &str) -> Option<&ImageEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageEntry> {
        self.entries.iter()
    }

    /// Unknown keys are not backgrounds.
    pub fn is_background(&self, key: &str) -> bool {
        self.get(key).is_some_and(|e| e.is_background)
    }

    pub fn insert(&mut self, entry: ImageEntry) -> Result<()> {
        let at = self.entries.len();
        self.insert_at(at, entry)
    }

    /// Insert at an ordinal, clamped to the end of the store.
    pub fn insert_at(&mut self, ordinal: usize, entry: ImageEntry) -> Result<()> {
        if self.contains(&entry.key) {
            return Err(SheetError::DuplicateImageKey(entry.key));
        }
        let at = ordinal.min(self.entries.len());
        self.entries.insert(at, entry);
        Ok(())
    }

    pub fn remove_by_key(&mut self, key: &str) -> Result<(usize, ImageEntry)> {
        let at = self
            .position(key)
            .ok_or_else(|| SheetError::UnknownImageKey(key.to_string()))?;
        Ok((at, self.entries.remove(at)))
    }

    pub fn remove_at(&mut self, ordinal: usize) -> Result<ImageEntry> {
        if ordinal >= self.entries.len() {
            return Err(SheetError::UnknownImageIndex(ordinal));
        }
        Ok(self.entries.remove(ordinal))
    }

    pub fn serialize_all(&self) -> Vec<ImageRecord> {
        self.entries.iter().map(ImageRecord::from_entry).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::new_rgb8(width, height)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn probes_header_size() {
        assert_eq!(probe_size(&png(12, 7)), Some((12, 7)));
        assert_eq!(probe_size(b"not an image"), None);
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let mut store = ImageStore::new();
        store.insert(ImageEntry::new("a", png(1, 1), "a.png", false)).unwrap();
        let err = store.insert(ImageEntry::new("a", vec![], "", true)).unwrap_err();
        assert!(matches!(err, SheetError::DuplicateImageKey(k) if k == "a"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_and_reinsert_keeps_ordinal() {
        let mut store = ImageStore::new();
        for key in ["a", "b", "c"] {
            store.insert(ImageEntry::new(key, vec![1], key, false)).unwrap();
        }
        let before = store.clone();
        let (at, entry) = store.remove_by_key("b").unwrap();
        assert_eq!(at, 1);
        store.insert_at(at, entry).unwrap();
        assert_eq!(store, before);

        assert!(matches!(store.remove_at(3), Err(SheetError::UnknownImageIndex(3))));
        assert!(matches!(store.remove_by_key("z"), Err(SheetError::UnknownImageKey(_))));
    }

    #[test]
    fn background_flag() {
        let mut store = ImageStore::new();
        store.insert(ImageEntry::new("bg", vec![], "", true)).unwrap();
        store.insert(ImageEntry::new("logo", vec![], "", false)).unwrap();
        assert!(store.is_background("bg"));
        assert!(!store.is_background("logo"));
        assert!(!store.is_background("missing"));
    }

    #[test]
    fn records_carry_base64() {
        let mut store = ImageStore::new();
        store.insert(ImageEntry::new("k", b"abc".to_vec(), "file", true)).unwrap();
        let records = store.serialize_all();
        assert_eq!(records[0].bin, "YWJj");
        assert!(records[0].is_bg);
        assert_eq!(records[0].decode().unwrap(), b"abc");
    }
}
