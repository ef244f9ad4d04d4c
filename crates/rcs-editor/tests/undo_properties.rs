//! Property-based tests for the command log.
//!
//! Verifies:
//! 1. Undoing every step of a random edit sequence restores the empty sheet
//! 2. Redoing them all afterwards reproduces the edited sheet
//! 3. A rejected edit changes neither the document nor the history

use proptest::prelude::*;
use rcs_core::{DocumentContext, FieldId, FieldKind, Geometry};
use rcs_editor::Editor;

#[derive(Debug, Clone)]
enum Op {
    AddField { kind: usize, page: usize, parent: Option<usize> },
    DeleteField(usize),
    SetLabel(usize, String),
    Move(usize, Geometry),
    Rename(usize, u8),
    ResetIds,
    AddPage,
    DeletePage(usize),
    AddCharacter(String),
    RemoveCharacter(usize),
    SetOnCharacters(usize, String),
    ImportImage(u8),
    RemoveImage(usize),
}

// ── Strategy helpers ──────────────────────────────────────────────────

fn arb_geometry() -> impl Strategy<Value = Geometry> {
    (0.0..500.0f64, 0.0..500.0f64, -5.0..200.0f64, 0.0..200.0f64)
        .prop_map(|(x, y, w, h)| Geometry::new(x, y, w, h))
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..FieldKind::ALL.len(), 0..4usize, proptest::option::of(0..8usize))
            .prop_map(|(kind, page, parent)| Op::AddField { kind, page, parent }),
        (0..8usize).prop_map(Op::DeleteField),
        (0..8usize, "[a-z]{0,6}").prop_map(|(i, s)| Op::SetLabel(i, s)),
        (0..8usize, arb_geometry()).prop_map(|(i, g)| Op::Move(i, g)),
        (0..8usize, any::<u8>()).prop_map(|(i, n)| Op::Rename(i, n)),
        Just(Op::ResetIds),
        prop_oneof![Just(Op::AddPage), (0..4usize).prop_map(Op::DeletePage)],
        prop_oneof![
            "[A-Z][a-z]{0,4}".prop_map(Op::AddCharacter),
            (0..3usize).prop_map(Op::RemoveCharacter),
            (0..8usize, "[0-9]{1,2}").prop_map(|(i, s)| Op::SetOnCharacters(i, s)),
        ],
        prop_oneof![(0..4u8).prop_map(Op::ImportImage), (0..4usize).prop_map(Op::RemoveImage)],
    ]
}

fn pick(editor: &Editor, i: usize) -> Option<FieldId> {
    let ids = editor.context().tree().walk();
    if ids.is_empty() { None } else { Some(ids[i % ids.len()]) }
}

/// Apply one op; rejected edits are part of the exercise.
fn run(editor: &mut Editor, op: &Op) {
    let pages = editor.context().pages().len();
    let _ = match op {
        Op::AddField { kind, page, parent } => {
            let parent = parent.and_then(|p| pick(editor, p));
            editor
                .add_field_on(FieldKind::ALL[*kind], page % pages, parent)
                .map(drop)
        }
        Op::DeleteField(i) => match pick(editor, *i) {
            Some(id) => editor.delete_field(id),
            None => Ok(()),
        },
        Op::SetLabel(i, label) => match pick(editor, *i) {
            Some(id) => editor.set_property(id, "label", label.as_str()),
            None => Ok(()),
        },
        Op::Move(i, geometry) => match pick(editor, *i) {
            Some(id) => editor.set_geometry(id, *geometry),
            None => Ok(()),
        },
        Op::Rename(i, n) => match pick(editor, *i) {
            // Even targets reuse counter ids so renames collide with stale values.
            Some(id) if n % 2 == 0 => {
                editor.rename_field(id, &format!("field_{}", n / 16)).map(drop)
            }
            Some(id) => editor.rename_field(id, &format!("alias_{n}")).map(drop),
            None => Ok(()),
        },
        Op::ResetIds => editor.reset_all_ids().map(drop),
        Op::AddPage => editor.add_page().map(drop),
        Op::DeletePage(i) => editor.delete_page(*i),
        Op::AddCharacter(name) => editor.add_character(name).map(drop),
        Op::RemoveCharacter(i) => editor.remove_character(*i),
        Op::SetOnCharacters(i, value) => match pick(editor, *i) {
            Some(id) => editor.set_on_characters(id, value),
            None => Ok(()),
        },
        Op::ImportImage(n) => {
            editor.import_image(&format!("token_{n}.png"), vec![*n; 16], "token", false)
        }
        Op::RemoveImage(i) => {
            let key = editor.context().images().iter().nth(*i).map(|e| e.key.clone());
            match key {
                Some(key) => editor.remove_image(&key),
                None => Ok(()),
            }
        }
    };
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn undo_all_then_redo_all(ops in proptest::collection::vec(arb_op(), 1..40)) {
        let mut editor = Editor::new();
        for op in &ops {
            run(&mut editor, op);
        }
        let edited = editor.context().clone();

        let mut steps = 0;
        while editor.can_undo() {
            prop_assert!(editor.undo().is_ok());
            steps += 1;
        }
        prop_assert_eq!(editor.context(), &DocumentContext::new());

        for _ in 0..steps {
            prop_assert!(editor.redo().is_ok());
        }
        prop_assert!(!editor.can_redo());
        prop_assert_eq!(editor.context(), &edited);
    }

    #[test]
    fn rejected_edit_changes_nothing(
        ops in proptest::collection::vec(arb_op(), 0..20),
        op in arb_op(),
    ) {
        let mut editor = Editor::new();
        for op in &ops {
            run(&mut editor, op);
        }
        let before = editor.context().clone();
        let depth = editor.log().len();
        let cursor = editor.log().cursor();

        run(&mut editor, &op);
        if editor.log().cursor() == cursor && editor.log().len() == depth {
            prop_assert_eq!(editor.context(), &before);
        }
    }
}
