use proptest::prelude::*;
use techcode::history::History;

#[derive(Debug, Clone)]
enum Op {
    Commit(u8),
    Undo,
    Redo,
    Restore(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<u8>().prop_map(Op::Commit),
        2 => Just(Op::Undo),
        2 => Just(Op::Redo),
        1 => (0usize..12).prop_map(Op::Restore),
    ]
}

proptest! {
    #[test]
    fn cursor_always_points_into_the_timeline(ops in prop::collection::vec(op(), 0..60)) {
        let mut history = History::new();
        // Reference model: versions plus cursor.
        let mut versions: Vec<String> = Vec::new();
        let mut cursor: Option<usize> = None;

        for op in ops {
            match op {
                Op::Commit(n) => {
                    let code = format!("v{}", n);
                    let index = history.commit(code.clone(), Some("edit".to_string()));
                    versions.truncate(cursor.map_or(0, |c| c + 1));
                    versions.push(code);
                    cursor = Some(versions.len() - 1);
                    prop_assert_eq!(index, versions.len() - 1);
                }
                Op::Undo => {
                    let moved = history.undo().map(str::to_string);
                    match cursor {
                        Some(c) if c > 0 => {
                            cursor = Some(c - 1);
                            prop_assert_eq!(moved.as_deref(), Some(versions[c - 1].as_str()));
                        }
                        _ => {
                            prop_assert_eq!(moved, None);
                        }
                    }
                }
                Op::Redo => {
                    let moved = history.redo().map(str::to_string);
                    match cursor {
                        Some(c) if c + 1 < versions.len() => {
                            cursor = Some(c + 1);
                            prop_assert_eq!(moved.as_deref(), Some(versions[c + 1].as_str()));
                        }
                        _ => {
                            prop_assert_eq!(moved, None);
                        }
                    }
                }
                Op::Restore(i) => {
                    if let Some(code) = history.entry(i).map(|e| e.code.clone()) {
                        let len_before = history.len();
                        let index = history.restore_branch(code.clone());
                        versions.truncate(cursor.map_or(0, |c| c + 1));
                        versions.push(code.clone());
                        cursor = Some(versions.len() - 1);
                        prop_assert_eq!(index, versions.len() - 1);
                        prop_assert!(history.len() <= len_before + 1);
                        prop_assert_eq!(history.current(), Some(code.as_str()));
                    }
                }
            }

            prop_assert_eq!(history.len(), versions.len());
            prop_assert_eq!(history.index(), cursor);
            prop_assert_eq!(history.is_empty(), cursor.is_none());
            if let Some(c) = cursor {
                prop_assert!(c < history.len());
                prop_assert_eq!(history.current(), Some(versions[c].as_str()));
            }
            prop_assert_eq!(history.can_undo(), matches!(cursor, Some(c) if c > 0));
            prop_assert_eq!(history.can_redo(), matches!(cursor, Some(c) if c + 1 < versions.len()));
        }
    }
}
