use std::collections::HashMap;

use super::document::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Removed => "removed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    pub kind: ChangeKind,
    pub doc: Document,
    /// Position in the previous snapshot; `None` for added documents.
    pub old_index: Option<usize>,
    /// Position in this snapshot; `None` for removed documents.
    pub new_index: Option<usize>,
}

/// Result set of a query at one point in time, plus what changed since the
/// snapshot delivered before it on the same listener.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuerySnapshot {
    pub docs: Vec<Document>,
    pub changes: Vec<DocumentChange>,
}

impl QuerySnapshot {
    /// A first snapshot: every document counts as added.
    pub fn initial(docs: Vec<Document>) -> Self {
        Self::diff(&[], docs)
    }

    pub fn diff(previous: &[Document], docs: Vec<Document>) -> Self {
        let old_positions: HashMap<&str, (usize, &Document)> = previous
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id.as_str(), (i, d)))
            .collect();
        let current_ids: HashMap<&str, usize> = docs
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id.as_str(), i))
            .collect();

        let mut changes = Vec::new();
        for (old_index, old) in previous.iter().enumerate() {
            if !current_ids.contains_key(old.id.as_str()) {
                changes.push(DocumentChange {
                    kind: ChangeKind::Removed,
                    doc: old.clone(),
                    old_index: Some(old_index),
                    new_index: None,
                });
            }
        }
        for (new_index, doc) in docs.iter().enumerate() {
            match old_positions.get(doc.id.as_str()) {
                None => changes.push(DocumentChange {
                    kind: ChangeKind::Added,
                    doc: doc.clone(),
                    old_index: None,
                    new_index: Some(new_index),
                }),
                Some((old_index, old)) => {
                    if old.data != doc.data || old.update_time != doc.update_time {
                        changes.push(DocumentChange {
                            kind: ChangeKind::Modified,
                            doc: doc.clone(),
                            old_index: Some(*old_index),
                            new_index: Some(new_index),
                        });
                    }
                }
            }
        }
        Self { docs, changes }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn doc(id: &str, title: &str) -> Document {
        let now = Utc::now();
        Document {
            id: id.into(),
            collection: "boards".into(),
            data: json!({ "title": title }).as_object().cloned().unwrap(),
            create_time: now,
            update_time: now,
        }
    }

    #[test]
    fn initial_snapshot_reports_everything_added() {
        let snap = QuerySnapshot::initial(vec![doc("a", "A"), doc("b", "B")]);
        assert_eq!(snap.len(), 2);
        assert!(snap.changes.iter().all(|c| c.kind == ChangeKind::Added));
        assert_eq!(snap.changes[1].new_index, Some(1));
    }

    #[test]
    fn diff_detects_add_modify_remove() {
        let a = doc("a", "A");
        let b = doc("b", "B");
        let previous = vec![a.clone(), b.clone()];

        let mut b2 = doc("b", "B2");
        b2.update_time = b.update_time + Duration::seconds(1);
        let c = doc("c", "C");
        let snap = QuerySnapshot::diff(&previous, vec![b2.clone(), c.clone()]);

        let kinds: Vec<_> = snap
            .changes
            .iter()
            .map(|ch| (ch.kind, ch.doc.id.as_str()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (ChangeKind::Removed, "a"),
                (ChangeKind::Modified, "b"),
                (ChangeKind::Added, "c"),
            ]
        );
    }

    #[test]
    fn identical_result_sets_have_no_changes() {
        let docs = vec![doc("a", "A")];
        let snap = QuerySnapshot::diff(&docs, docs.clone());
        assert!(snap.changes.is_empty());
    }
}
