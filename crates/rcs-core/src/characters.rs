//! Per-player character records.
//!
//! A record stores an entry per field id. Entries are kept as the archive
//! wrote them: either a bare string or an object whose `value` member holds
//! the text. Fields without an entry show the field's own `value` property.
//! Record keys other than `name` and `values` pass through untouched.

use crate::error::{Result, SheetError};
use crate::id::FieldId;
use crate::model::Field;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CharacterRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CharacterRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Text stored for `key`, if the entry has a string leaf.
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.values.get(key)? {
            Value::String(text) => Some(text),
            Value::Object(entry) => entry.get("value").and_then(Value::as_str),
            _ => None,
        }
    }

    /// Store `text` for `key` and return the whole previous entry. Object
    /// entries keep their other members.
    pub fn set_text(&mut self, key: &str, text: &str) -> Option<Value> {
        let previous = self.values.get(key).cloned();
        match self.values.get_mut(key) {
            Some(Value::Object(entry)) => {
                entry.insert("value".into(), Value::from(text));
            }
            _ => {
                self.values.insert(key.to_string(), Value::from(text));
            }
        }
        previous
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CharacterSheet {
    records: Vec<CharacterRecord>,
}

impl CharacterSheet {
    pub fn from_records(records: Vec<CharacterRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CharacterRecord> {
        self.records.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CharacterRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[CharacterRecord] {
        &self.records
    }

    /// Insert a record at `index` (clamped to the end).
    pub fn insert(&mut self, index: usize, record: CharacterRecord) -> usize {
        let at = index.min(self.records.len());
        self.records.insert(at, record);
        at
    }

    pub fn remove(&mut self, index: usize) -> Result<CharacterRecord> {
        if index >= self.records.len() {
            return Err(SheetError::UnknownCharacter(index));
        }
        Ok(self.records.remove(index))
    }

    /// Text shown for `field` in record `index`.
    pub fn value(&self, index: usize, field: &Field) -> Result<String> {
        let record = self.get(index).ok_or(SheetError::UnknownCharacter(index))?;
        Ok(record
            .text(field.id.as_str())
            .map_or_else(|| field.common.value.clone(), str::to_string))
    }

    /// Replace (or clear with `None`) one record's raw entry, returning the
    /// previous one.
    pub fn set_value(
        &mut self,
        index: usize,
        id: FieldId,
        value: Option<Value>,
    ) -> Result<Option<Value>> {
        let record = self
            .records
            .get_mut(index)
            .ok_or(SheetError::UnknownCharacter(index))?;
        let key = id.as_str().to_string();
        Ok(match value {
            Some(v) => record.values.insert(key, v),
            None => record.values.remove(&key),
        })
    }

    /// Set a text on every record. Returns `(record, previous entry)` pairs.
    pub fn set_on_all(&mut self, id: FieldId, text: &str) -> Vec<(usize, Option<Value>)> {
        self.records
            .iter_mut()
            .enumerate()
            .map(|(i, r)| (i, r.set_text(id.as_str(), text)))
            .collect()
    }

    pub(crate) fn remap_ids(&mut self, mapping: &HashMap<FieldId, FieldId>) {
        let renames: HashMap<&str, &str> = mapping
            .iter()
            .map(|(o, n)| (o.as_str(), n.as_str()))
            .collect();
        for record in &mut self.records {
            let (moved, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut record.values)
                .into_iter()
                .partition(|(k, _)| renames.contains_key(k.as_str()));
            // Renamed values overwrite stale ones already under the new id.
            record.values = kept.into_iter().collect();
            for (k, mut v) in moved {
                if let Some(new) = renames.get(k.as_str()) {
                    if let Value::Object(entry) = &mut v
                        && entry.get("id").and_then(Value::as_str) == Some(k.as_str())
                    {
                        entry.insert("id".into(), Value::from(*new));
                    }
                    record.values.insert((*new).to_string(), v);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldKind;

    #[test]
    fn missing_value_falls_back_to_field() {
        let mut field = Field::new(FieldId::intern("hp"), FieldKind::TextInput, 0);
        field.common.value = "10".into();
        let mut sheet = CharacterSheet::default();
        sheet.insert(0, CharacterRecord::new("Aria"));
        assert_eq!(sheet.value(0, &field).unwrap(), "10");
        sheet.set_value(0, field.id, Some("7".into())).unwrap();
        assert_eq!(sheet.value(0, &field).unwrap(), "7");
        assert!(matches!(sheet.value(1, &field), Err(SheetError::UnknownCharacter(1))));
    }

    #[test]
    fn set_on_all_reports_previous_values() {
        let id = FieldId::intern("level");
        let mut sheet = CharacterSheet::default();
        sheet.insert(0, CharacterRecord::new("A"));
        sheet.insert(1, CharacterRecord::new("B"));
        sheet.set_value(1, id, Some("3".into())).unwrap();

        let previous = sheet.set_on_all(id, "5");
        assert_eq!(previous, vec![(0, None), (1, Some(Value::from("3")))]);
        assert!(sheet.iter().all(|r| r.text("level") == Some("5")));
    }

    #[test]
    fn remap_moves_values() {
        let old = FieldId::intern("str_old");
        let new = FieldId::intern("str_new");
        let mut sheet = CharacterSheet::default();
        sheet.insert(0, CharacterRecord::new("A"));
        sheet.set_value(0, old, Some("18".into())).unwrap();
        sheet.remap_ids(&HashMap::from([(old, new)]));
        assert_eq!(sheet.get(0).unwrap().text("str_new"), Some("18"));
        assert!(!sheet.get(0).unwrap().values.contains_key("str_old"));
    }

    #[test]
    fn object_entries_keep_their_members() {
        let id = FieldId::intern("hp_obj");
        let mut record: CharacterRecord = serde_json::from_value(serde_json::json!({
            "name": "A",
            "idSheet": "x1",
            "values": { "hp_obj": { "id": "hp_obj", "value": "3", "formula": "1d6" } }
        }))
        .unwrap();
        assert_eq!(record.text("hp_obj"), Some("3"));
        assert_eq!(record.extra["idSheet"], "x1");

        let previous = record.set_text("hp_obj", "4");
        assert_eq!(previous.unwrap()["value"], "3");
        assert_eq!(record.values["hp_obj"]["formula"], "1d6");

        let mut sheet = CharacterSheet::from_records(vec![record]);
        let renamed = FieldId::intern("hp_obj_2");
        sheet.remap_ids(&HashMap::from([(id, renamed)]));
        let entry = &sheet.get(0).unwrap().values["hp_obj_2"];
        assert_eq!(entry["id"], "hp_obj_2");
        assert_eq!(entry["value"], "4");
    }

    #[test]
    fn non_text_entries_fall_back_to_field() {
        let mut field = Field::new(FieldId::intern("flag"), FieldKind::Checkbox, 0);
        field.common.value = "0".into();
        let mut sheet = CharacterSheet::default();
        let mut record = CharacterRecord::new("A");
        record.values.insert("flag".into(), Value::from(true));
        sheet.insert(0, record);
        assert_eq!(sheet.value(0, &field).unwrap(), "0");
    }
}
