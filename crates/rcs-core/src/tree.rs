//! The field tree: every field of a sheet, across all pages.
//!
//! Fields live in one arena keyed by id. Containment is kept in an ordered
//! root list plus a children index (parent id → ordered child ids), so
//! cascades and reinsertion are index lookups rather than pointer walks.
//! Only tables contain children, and a child always sits on its table's
//! page.

use crate::error::{Result, SheetError};
use crate::id::FieldId;
use crate::model::{Field, FieldKind, Geometry, PropValue};
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};

type ChildList = SmallVec<[FieldId; 4]>;

/// A detached copy of a field and its descendants, in pre-order.
///
/// `slot` is the position the subtree root held among its siblings, so the
/// subtree can be reinserted exactly where it was.
#[derive(Debug, Clone, PartialEq)]
pub struct Subtree {
    pub slot: usize,
    pub fields: Vec<Field>,
}

impl Subtree {
    pub fn root(&self) -> &Field {
        &self.fields[0]
    }

    pub fn ids(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.fields.iter().map(|f| f.id)
    }
}

#[derive(Debug, Clone)]
pub struct FieldTree {
    fields: HashMap<FieldId, Field>,
    roots: Vec<FieldId>,
    /// No entry is kept for a field without children.
    children: HashMap<FieldId, ChildList>,
    /// Next candidate for `field_<n>` ids.
    next_serial: u64,
}

impl FieldTree {
    #[must_use]
    pub fn new() -> Self {
        Self {
            fields: HashMap::new(),
            roots: Vec::new(),
            children: HashMap::new(),
            next_serial: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, id: FieldId) -> bool {
        self.fields.contains_key(&id)
    }

    pub fn get(&self, id: FieldId) -> Option<&Field> {
        self.fields.get(&id)
    }

    fn get_mut(&mut self, id: FieldId) -> Result<&mut Field> {
        self.fields.get_mut(&id).ok_or(SheetError::UnknownField(id))
    }

    /// Top-level fields in document order.
    pub fn roots(&self) -> &[FieldId] {
        &self.roots
    }

    /// Direct children of a field in document order.
    pub fn children_of(&self, id: FieldId) -> &[FieldId] {
        self.children.get(&id).map(|c| c.as_slice()).unwrap_or(&[])
    }

    /// Every field id, depth-first, parents before children.
    pub fn walk(&self) -> Vec<FieldId> {
        let mut out = Vec::with_capacity(self.fields.len());
        for root in &self.roots {
            self.collect_preorder(*root, &mut out);
        }
        out
    }

    fn collect_preorder(&self, id: FieldId, out: &mut Vec<FieldId>) {
        out.push(id);
        for child in self.children_of(id) {
            self.collect_preorder(*child, out);
        }
    }

    /// All fields anchored to `page`, depth-first.
    pub fn fields_on_page(&self, page: usize) -> Vec<FieldId> {
        self.walk()
            .into_iter()
            .filter(|id| self.fields[id].page == page)
            .collect()
    }

    /// Top-level fields anchored to `page`, in document order.
    pub fn roots_on_page(&self, page: usize) -> Vec<FieldId> {
        self.roots
            .iter()
            .copied()
            .filter(|id| self.fields[id].page == page)
            .collect()
    }

    pub fn fields_of_kind(&self, kind: FieldKind) -> Vec<FieldId> {
        self.walk()
            .into_iter()
            .filter(|id| self.fields[id].kind() == kind)
            .collect()
    }

    // ─── Creation ────────────────────────────────────────────────────────

    /// Reserve a fresh `field_<n>` id.
    pub fn allocate_id(&mut self) -> FieldId {
        loop {
            let id = FieldId::from_serial(self.next_serial);
            self.next_serial += 1;
            if !self.contains(id) {
                return id;
            }
        }
    }

    /// Build a new, not yet inserted field with a fresh id.
    ///
    /// A child inherits its table's page regardless of `page`.
    pub fn create_field(
        &mut self,
        kind: FieldKind,
        page: usize,
        parent: Option<FieldId>,
    ) -> Result<Field> {
        let page = match parent {
            Some(p) => {
                let table = self.get(p).ok_or(SheetError::UnknownField(p))?;
                if !table.kind().is_container() {
                    return Err(SheetError::InvalidParent {
                        parent: p,
                        child: FieldId::from_serial(self.next_serial),
                    });
                }
                table.page
            }
            None => page,
        };
        let mut field = Field::new(self.allocate_id(), kind, page);
        field.parent = parent;
        Ok(field)
    }

    /// Insert a single field at `slot` among its siblings (appended when
    /// `None` or out of range).
    pub fn insert(&mut self, field: Field, slot: Option<usize>) -> Result<()> {
        if self.contains(field.id) {
            return Err(SheetError::DuplicateField(field.id));
        }
        if !field.geometry.is_valid() {
            return Err(SheetError::InvalidGeometry(field.id));
        }
        if let Some(p) = field.parent {
            let table = self.get(p).ok_or(SheetError::UnknownField(p))?;
            if !table.kind().is_container() || table.page != field.page {
                return Err(SheetError::InvalidParent {
                    parent: p,
                    child: field.id,
                });
            }
        }
        self.insert_unchecked(field, slot);
        Ok(())
    }

    fn insert_unchecked(&mut self, field: Field, slot: Option<usize>) {
        let id = field.id;
        if let Some(n) = id.serial() {
            self.next_serial = self.next_serial.max(n + 1);
        }
        match field.parent {
            Some(p) => {
                let list = self.children.entry(p).or_default();
                let at = slot.unwrap_or(list.len()).min(list.len());
                list.insert(at, id);
            }
            None => {
                let at = slot.unwrap_or(self.roots.len()).min(self.roots.len());
                self.roots.insert(at, id);
            }
        }
        self.fields.insert(id, field);
    }

    // ─── Removal & restoration ───────────────────────────────────────────

    /// Position of a field among its siblings.
    pub fn slot_of(&self, id: FieldId) -> Option<usize> {
        let field = self.get(id)?;
        match field.parent {
            Some(p) => self.children_of(p).iter().position(|c| *c == id),
            None => self.roots.iter().position(|c| *c == id),
        }
    }

    /// Capture a field and its descendants without touching the tree.
    pub fn subtree(&self, id: FieldId) -> Result<Subtree> {
        let slot = self.slot_of(id).ok_or(SheetError::UnknownField(id))?;
        let mut ids = Vec::new();
        self.collect_preorder(id, &mut ids);
        Ok(Subtree {
            slot,
            fields: ids.iter().map(|i| self.fields[i].clone()).collect(),
        })
    }

    /// Remove a field and, first, all of its descendants.
    ///
    /// Returns the removed ids in removal order (deepest first, the field
    /// itself last).
    pub fn remove_field(&mut self, id: FieldId) -> Result<Vec<FieldId>> {
        let parent = self.get(id).ok_or(SheetError::UnknownField(id))?.parent;
        let mut order = Vec::new();
        self.collect_preorder(id, &mut order);
        order.reverse();

        match parent {
            Some(p) => {
                if let Some(list) = self.children.get_mut(&p) {
                    list.retain(|c| *c != id);
                    if list.is_empty() {
                        self.children.remove(&p);
                    }
                }
            }
            None => self.roots.retain(|c| *c != id),
        }
        for removed in &order {
            self.fields.remove(removed);
            self.children.remove(removed);
        }
        log::debug!("removed {} field(s) under {id}", order.len());
        Ok(order)
    }

    /// Reinsert a captured subtree where it was taken from.
    pub fn restore(&mut self, subtree: &Subtree) -> Result<()> {
        let Some(root) = subtree.fields.first() else {
            return Ok(());
        };
        if let Some(clash) = subtree.ids().find(|id| self.contains(*id)) {
            return Err(SheetError::DuplicateField(clash));
        }
        if let Some(p) = root.parent
            && !self.contains(p)
        {
            return Err(SheetError::UnknownField(p));
        }
        self.insert_unchecked(root.clone(), Some(subtree.slot));
        for field in &subtree.fields[1..] {
            self.insert_unchecked(field.clone(), None);
        }
        Ok(())
    }

    // ─── Mutation ────────────────────────────────────────────────────────

    /// Set a property by key, returning the previous value.
    pub fn set_property(&mut self, id: FieldId, key: &str, value: PropValue) -> Result<PropValue> {
        self.get_mut(id)?.set_property(key, value)
    }

    /// Replace a field's geometry, returning the previous one.
    pub fn set_geometry(&mut self, id: FieldId, geometry: Geometry) -> Result<Geometry> {
        if !geometry.is_valid() {
            return Err(SheetError::InvalidGeometry(id));
        }
        let field = self.get_mut(id)?;
        Ok(std::mem::replace(&mut field.geometry, geometry))
    }

    /// Fields on `from` and later pages move one page down the list.
    pub(crate) fn shift_pages_up(&mut self, from: usize) {
        for field in self.fields.values_mut() {
            if field.page >= from {
                field.page += 1;
            }
        }
    }

    /// Fields after `removed` move one page up the list.
    pub(crate) fn shift_pages_down(&mut self, removed: usize) {
        for field in self.fields.values_mut() {
            if field.page > removed {
                field.page -= 1;
            }
        }
    }

    // ─── Identity ────────────────────────────────────────────────────────

    /// Rename fields atomically. Ids missing from `mapping` keep their name.
    ///
    /// The result must stay a bijection: two fields may not end up with the
    /// same id. Parent links and sibling order are preserved.
    pub fn remap_ids(&mut self, mapping: &HashMap<FieldId, FieldId>) -> Result<()> {
        if let Some(missing) = mapping.keys().find(|id| !self.contains(**id)) {
            return Err(SheetError::UnknownField(*missing));
        }
        let map = |id: FieldId| mapping.get(&id).copied().unwrap_or(id);

        let mut seen = HashSet::with_capacity(self.fields.len());
        for id in self.fields.keys() {
            let target = map(*id);
            if !seen.insert(target) {
                return Err(SheetError::DuplicateField(target));
            }
        }

        let fields = self
            .fields
            .drain()
            .map(|(id, mut field)| {
                field.id = map(id);
                field.parent = field.parent.map(map);
                (field.id, field)
            })
            .collect();
        let children = self
            .children
            .drain()
            .map(|(parent, list)| (map(parent), list.into_iter().map(map).collect()))
            .collect();
        self.fields = fields;
        self.children = children;
        for root in &mut self.roots {
            *root = map(*root);
        }
        for id in mapping.values() {
            if let Some(n) = id.serial() {
                self.next_serial = self.next_serial.max(n + 1);
            }
        }
        Ok(())
    }

    /// Rename a single field.
    pub fn rename(&mut self, old: FieldId, new: FieldId) -> Result<()> {
        if !self.contains(old) {
            return Err(SheetError::UnknownField(old));
        }
        if old == new {
            return Ok(());
        }
        if self.contains(new) {
            return Err(SheetError::DuplicateField(new));
        }
        self.remap_ids(&HashMap::from([(old, new)]))
    }

    /// The renaming `reset_all_ids` would perform: depth-first order,
    /// numbered from `field_1`. Fields already carrying their target are
    /// left out.
    pub fn plan_reset_ids(&self) -> Vec<(FieldId, FieldId)> {
        self.walk()
            .into_iter()
            .enumerate()
            .map(|(i, id)| (id, FieldId::from_serial(i as u64 + 1)))
            .filter(|(old, new)| old != new)
            .collect()
    }

    /// Give every field a fresh sequential id, keeping all relationships.
    pub fn reset_all_ids(&mut self) -> Result<HashMap<FieldId, FieldId>> {
        let mapping: HashMap<_, _> = self.plan_reset_ids().into_iter().collect();
        self.remap_ids(&mapping)?;
        self.next_serial = self.fields.len() as u64 + 1;
        Ok(mapping)
    }

    // ─── Validation ──────────────────────────────────────────────────────

    /// Check every structural invariant against a sheet of `page_count`
    /// pages.
    pub fn validate(&self, page_count: usize) -> Result<()> {
        let mut graph: DiGraphMap<FieldId, ()> = DiGraphMap::with_capacity(self.len(), self.len());
        for field in self.fields.values() {
            if field.page >= page_count {
                return Err(SheetError::UnknownPage(field.page));
            }
            graph.add_node(field.id);
            if let Some(p) = field.parent {
                let table = self.get(p).ok_or(SheetError::UnknownField(p))?;
                if !table.kind().is_container() || table.page != field.page {
                    return Err(SheetError::InvalidParent {
                        parent: p,
                        child: field.id,
                    });
                }
                graph.add_edge(p, field.id, ());
            }
        }
        if let Err(cycle) = toposort(&graph, None) {
            let child = cycle.node_id();
            let parent = self.fields[&child].parent.unwrap_or(child);
            return Err(SheetError::InvalidParent { parent, child });
        }
        let linked = self.roots.len() + self.children.values().map(SmallVec::len).sum::<usize>();
        if linked != self.fields.len() {
            return Err(SheetError::MalformedArchive(format!(
                "{} fields but {linked} containment links",
                self.fields.len()
            )));
        }
        Ok(())
    }
}

impl Default for FieldTree {
    fn default() -> Self {
        Self::new()
    }
}

// The id counter is bookkeeping, not document state.
impl PartialEq for FieldTree {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields && self.roots == other.roots && self.children == other.children
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn add(tree: &mut FieldTree, kind: FieldKind, page: usize, parent: Option<FieldId>) -> FieldId {
        let field = tree.create_field(kind, page, parent).unwrap();
        let id = field.id;
        tree.insert(field, None).unwrap();
        id
    }

    #[test]
    fn ids_are_sequential_and_unique() {
        let mut tree = FieldTree::new();
        let a = add(&mut tree, FieldKind::TextInput, 0, None);
        let b = add(&mut tree, FieldKind::Checkbox, 0, None);
        assert_eq!(a.as_str(), "field_1");
        assert_eq!(b.as_str(), "field_2");
    }

    #[test]
    fn allocation_skips_taken_names() {
        let mut tree = FieldTree::new();
        let a = add(&mut tree, FieldKind::TextInput, 0, None);
        tree.rename(a, FieldId::from_serial(2)).unwrap();
        let b = add(&mut tree, FieldKind::TextInput, 0, None);
        assert_eq!(b.as_str(), "field_3");
    }

    #[test]
    fn child_takes_table_page() {
        let mut tree = FieldTree::new();
        let table = add(&mut tree, FieldKind::Table, 2, None);
        let cell = add(&mut tree, FieldKind::TextInput, 0, Some(table));
        assert_eq!(tree.get(cell).unwrap().page, 2);
        assert_eq!(tree.children_of(table), &[cell]);
    }

    #[test]
    fn only_tables_contain_children() {
        let mut tree = FieldTree::new();
        let input = add(&mut tree, FieldKind::TextInput, 0, None);
        let err = tree.create_field(FieldKind::Checkbox, 0, Some(input)).unwrap_err();
        assert!(matches!(err, SheetError::InvalidParent { .. }));
    }

    #[test]
    fn remove_cascades_deepest_first() {
        let mut tree = FieldTree::new();
        let table = add(&mut tree, FieldKind::Table, 0, None);
        let c1 = add(&mut tree, FieldKind::TextInput, 0, Some(table));
        let c2 = add(&mut tree, FieldKind::Checkbox, 0, Some(table));
        let other = add(&mut tree, FieldKind::Button, 0, None);

        let removed = tree.remove_field(table).unwrap();
        assert_eq!(removed, vec![c2, c1, table]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.roots(), &[other]);
        assert!(tree.children_of(table).is_empty());
    }

    #[test]
    fn restore_puts_subtree_back_in_place() {
        let mut tree = FieldTree::new();
        let first = add(&mut tree, FieldKind::Button, 0, None);
        let table = add(&mut tree, FieldKind::Table, 0, None);
        add(&mut tree, FieldKind::TextInput, 0, Some(table));
        add(&mut tree, FieldKind::Checkbox, 0, Some(table));
        add(&mut tree, FieldKind::Button, 0, None);
        let before = tree.clone();

        let captured = tree.subtree(table).unwrap();
        assert_eq!(captured.slot, 1);
        tree.remove_field(table).unwrap();
        tree.restore(&captured).unwrap();

        assert_eq!(tree, before);
        assert_eq!(tree.roots()[0], first);
    }

    #[test]
    fn unknown_field_errors() {
        let mut tree = FieldTree::new();
        let ghost = FieldId::intern("ghost");
        assert!(matches!(tree.remove_field(ghost), Err(SheetError::UnknownField(_))));
        assert!(matches!(
            tree.set_property(ghost, "label", "x".into()),
            Err(SheetError::UnknownField(_))
        ));
    }

    #[test]
    fn negative_geometry_is_rejected() {
        let mut tree = FieldTree::new();
        let id = add(&mut tree, FieldKind::TextInput, 0, None);
        let err = tree.set_geometry(id, Geometry::new(0.0, 0.0, -1.0, 5.0)).unwrap_err();
        assert!(matches!(err, SheetError::InvalidGeometry(_)));
    }

    #[test]
    fn reset_ids_is_a_bijection_preserving_links() {
        let mut tree = FieldTree::new();
        let table = add(&mut tree, FieldKind::Table, 1, None);
        let cell = add(&mut tree, FieldKind::TextInput, 1, Some(table));
        let lone = add(&mut tree, FieldKind::Image, 0, None);
        tree.rename(table, FieldId::intern("stats")).unwrap();
        tree.rename(cell, FieldId::intern("str")).unwrap();
        tree.rename(lone, FieldId::intern("portrait")).unwrap();

        let mapping = tree.reset_all_ids().unwrap();
        assert_eq!(mapping.len(), 3);
        let stats = mapping[&FieldId::intern("stats")];
        let strength = mapping[&FieldId::intern("str")];
        assert_eq!(stats.as_str(), "field_1");
        assert_eq!(strength.as_str(), "field_2");
        assert_eq!(tree.get(strength).unwrap().parent, Some(stats));
        assert_eq!(tree.get(strength).unwrap().page, 1);
        assert_eq!(tree.children_of(stats), &[strength]);
        tree.validate(2).unwrap();
    }

    #[test]
    fn remap_rejects_collisions() {
        let mut tree = FieldTree::new();
        let a = add(&mut tree, FieldKind::TextInput, 0, None);
        let b = add(&mut tree, FieldKind::TextInput, 0, None);
        let before = tree.clone();
        let err = tree.remap_ids(&HashMap::from([(a, b)])).unwrap_err();
        assert!(matches!(err, SheetError::DuplicateField(_)));
        assert_eq!(tree, before);
    }

    #[test]
    fn remap_swaps_names() {
        let mut tree = FieldTree::new();
        let a = add(&mut tree, FieldKind::TextInput, 0, None);
        let b = add(&mut tree, FieldKind::Checkbox, 0, None);
        tree.remap_ids(&HashMap::from([(a, b), (b, a)])).unwrap();
        assert_eq!(tree.get(a).unwrap().kind(), FieldKind::Checkbox);
        assert_eq!(tree.roots(), &[b, a]);
    }

    #[test]
    fn validate_flags_out_of_range_pages() {
        let mut tree = FieldTree::new();
        add(&mut tree, FieldKind::TextInput, 3, None);
        assert!(matches!(tree.validate(2), Err(SheetError::UnknownPage(3))));
        tree.validate(4).unwrap();
    }
}
