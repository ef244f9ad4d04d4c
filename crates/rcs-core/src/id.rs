use lasso::{Spur, ThreadedRodeo};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

/// Global string interner for field ids.
static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::default);

/// Prefix used for counter-allocated field names (`field_1`, `field_2`, …).
pub const FIELD_PREFIX: &str = "field";

/// A lightweight, interned identifier for fields in a sheet.
/// Internally a `Spur` index, so it is `Copy` and hashes in O(1).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldId(Spur);

impl FieldId {
    /// Intern a string as a FieldId, or return existing if already interned.
    pub fn intern(s: &str) -> Self {
        FieldId(INTERNER.get_or_intern(s))
    }

    /// Resolve back to a string slice.
    pub fn as_str(&self) -> &'static str {
        INTERNER.resolve(&self.0)
    }

    /// The counter-derived name for serial `n`.
    pub fn from_serial(n: u64) -> Self {
        Self::intern(&format!("{FIELD_PREFIX}_{n}"))
    }

    /// The serial number if this id has the `field_<n>` shape.
    pub fn serial(&self) -> Option<u64> {
        crate::keys::field_serial(self.as_str())
    }
}

// Ordered by text so sorted output never depends on interning order.
impl PartialOrd for FieldId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FieldId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl fmt::Debug for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.as_str())
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FieldId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(FieldId::intern(&s))
    }
}
