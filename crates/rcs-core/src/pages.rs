//! The ordered page list.
//!
//! Page indices are positions in the list, so they stay contiguous from 0
//! by construction. Which fields sit on a page is recorded on the fields
//! themselves; cascades live in `DocumentContext`.

use crate::error::{Result, SheetError};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    /// Key of the background image in the image store.
    pub background: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageCollection {
    pages: Vec<Page>,
}

impl PageCollection {
    /// A collection holding a single blank page.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pages: vec![Page::default()],
        }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Page> {
        self.pages.iter()
    }

    pub fn background(&self, index: usize) -> Option<&str> {
        self.get(index)?.background.as_deref()
    }

    /// Insert a blank page at `at` (`at == len` appends) and return its index.
    pub fn add_page(&mut self, at: usize) -> Result<usize> {
        self.insert(at, Page::default())?;
        Ok(at)
    }

    pub(crate) fn insert(&mut self, at: usize, page: Page) -> Result<()> {
        if at > self.pages.len() {
            return Err(SheetError::UnknownPage(at));
        }
        self.pages.insert(at, page);
        Ok(())
    }

    pub fn remove_page(&mut self, index: usize) -> Result<Page> {
        if self.pages.len() <= 1 {
            return Err(SheetError::CannotRemoveLastPage);
        }
        if index >= self.pages.len() {
            return Err(SheetError::UnknownPage(index));
        }
        Ok(self.pages.remove(index))
    }

    /// Point a page at another background key and return the previous one.
    /// The image store is not touched.
    pub fn set_background(&mut self, index: usize, key: Option<String>) -> Result<Option<String>> {
        let page = self.pages.get_mut(index).ok_or(SheetError::UnknownPage(index))?;
        Ok(std::mem::replace(&mut page.background, key))
    }

    /// Grow the collection with blank pages until it holds `len` pages.
    pub(crate) fn ensure_len(&mut self, len: usize) {
        if self.pages.len() < len {
            self.pages.resize_with(len, Page::default);
        }
    }
}

impl Default for PageCollection {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_one_page() {
        let pages = PageCollection::new();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages.background(0), None);
    }

    #[test]
    fn last_page_cannot_be_removed() {
        let mut pages = PageCollection::new();
        assert!(matches!(pages.remove_page(0), Err(SheetError::CannotRemoveLastPage)));
        pages.add_page(1).unwrap();
        assert!(matches!(pages.remove_page(5), Err(SheetError::UnknownPage(5))));
        pages.remove_page(0).unwrap();
        assert_eq!(pages.len(), 1);
    }

    #[test]
    fn insert_keeps_order() {
        let mut pages = PageCollection::new();
        pages.set_background(0, Some("a".into())).unwrap();
        pages.add_page(1).unwrap();
        pages.add_page(0).unwrap();
        assert_eq!(pages.background(1), Some("a"));
        assert!(matches!(pages.add_page(9), Err(SheetError::UnknownPage(9))));
    }

    #[test]
    fn set_background_returns_previous() {
        let mut pages = PageCollection::new();
        assert_eq!(pages.set_background(0, Some("a".into())).unwrap(), None);
        assert_eq!(pages.set_background(0, Some("b".into())).unwrap(), Some("a".into()));
        assert!(pages.set_background(3, None).is_err());
    }
}
