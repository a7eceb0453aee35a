//! Live subscription over a standing query.
//!
//! The query is re-evaluated on a fixed interval and each result set is diffed
//! against the previous one. Documents that appear are `Added`, documents whose
//! `updateTime` moved are `Modified` and documents that drop out of the result
//! set are `Removed`. The first evaluation reports everything as `Added`.
//!
//! The query window starts at process start-up, so every poll returns all
//! matching requests seen since then and the snapshot grows with them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

use crate::error::Result;
use crate::firestore::{DocumentStore, SubscriptionQuery};
use crate::model::{ChangeKind, Document, DocumentChange};

/// Produces batches of document changes for a subscription query.
pub struct SnapshotListener {
    store: Arc<dyn DocumentStore>,
    query: SubscriptionQuery,
    interval: Interval,
    snapshot: HashMap<String, Document>
}

impl SnapshotListener {
    pub fn new(store: Arc<dyn DocumentStore>, query: SubscriptionQuery, poll_interval: Duration) -> Self {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            store,
            query,
            interval,
            snapshot: HashMap::new()
        }
    }

    pub fn query(&self) -> &SubscriptionQuery {
        &self.query
    }

    /// Waits for the next non-empty batch of changes.
    ///
    /// Cancel safe: the snapshot only moves once a query result is in hand.
    pub async fn next_batch(&mut self) -> Result<Vec<DocumentChange>> {
        loop {
            self.interval.tick().await;
            let documents = self.store.run_query(&self.query).await?;
            let changes = self.apply(documents);
            if !changes.is_empty() {
                tracing::debug!(changes = changes.len(), "Snapshot changed");
                return Ok(changes);
            }
        }
    }

    fn apply(&mut self, documents: Vec<Document>) -> Vec<DocumentChange> {
        let changes = diff_snapshots(&self.snapshot, &documents);
        self.snapshot = documents
            .into_iter()
            .map(|doc| (doc.name.clone(), doc))
            .collect();
        changes
    }
}

/// Changes that turn `previous` into `current`.
///
/// Removals come first, then additions and modifications in query order.
pub fn diff_snapshots(previous: &HashMap<String, Document>, current: &[Document]) -> Vec<DocumentChange> {
    let current_names: HashSet<&str> = current.iter().map(|doc| doc.name.as_str()).collect();
    let mut removed: Vec<&Document> = previous
        .values()
        .filter(|doc| !current_names.contains(doc.name.as_str()))
        .collect();
    removed.sort_by(|a, b| a.name.cmp(&b.name));

    let mut changes: Vec<DocumentChange> = removed
        .into_iter()
        .map(|doc| DocumentChange {
            kind: ChangeKind::Removed,
            document: doc.clone()
        })
        .collect();

    for doc in current {
        let kind = match previous.get(&doc.name) {
            None => ChangeKind::Added,
            Some(before) if before.update_time != doc.update_time || before.fields != doc.fields => {
                ChangeKind::Modified
            }
            Some(_) => continue
        };
        changes.push(DocumentChange {
            kind,
            document: doc.clone()
        });
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::{Map, json};
    use std::sync::Mutex;

    fn doc(id: &str, update_time: &str) -> Document {
        let mut fields = Map::new();
        fields.insert("method".to_string(), json!("POST"));
        Document::new(
            format!("projects/demo/databases/(default)/documents/requests/{id}"),
            fields,
            Some(update_time.to_string())
        )
    }

    fn snapshot(docs: &[Document]) -> HashMap<String, Document> {
        docs.iter().map(|d| (d.name.clone(), d.clone())).collect()
    }

    fn kinds(changes: &[DocumentChange]) -> Vec<(ChangeKind, &str)> {
        changes
            .iter()
            .map(|c| (c.kind, c.document.id.as_str()))
            .collect()
    }

    #[test]
    fn test_first_snapshot_is_all_added() {
        let current = vec![doc("b", "t1"), doc("a", "t1")];
        let changes = diff_snapshots(&HashMap::new(), &current);
        assert_eq!(
            kinds(&changes),
            vec![(ChangeKind::Added, "b"), (ChangeKind::Added, "a")]
        );
    }

    #[test]
    fn test_unchanged_snapshot_is_empty() {
        let docs = vec![doc("a", "t1")];
        assert!(diff_snapshots(&snapshot(&docs), &docs).is_empty());
    }

    #[test]
    fn test_modified_and_removed() {
        let previous = snapshot(&[doc("a", "t1"), doc("b", "t1"), doc("c", "t1")]);
        let current = vec![doc("d", "t2"), doc("a", "t2"), doc("c", "t1")];

        let changes = diff_snapshots(&previous, &current);
        assert_eq!(
            kinds(&changes),
            vec![
                (ChangeKind::Removed, "b"),
                (ChangeKind::Added, "d"),
                (ChangeKind::Modified, "a")
            ]
        );
    }

    #[test]
    fn test_diff_large_snapshot() {
        let docs: Vec<Document> = (0..5000).map(|i| doc(&format!("r{i}"), "t1")).collect();
        let previous = snapshot(&docs);
        let current = &docs[1..];

        let changes = diff_snapshots(&previous, current);
        assert_eq!(kinds(&changes), vec![(ChangeKind::Removed, "r0")]);
    }

    struct ScriptedStore {
        results: Mutex<Vec<Vec<Document>>>
    }

    #[async_trait]
    impl DocumentStore for ScriptedStore {
        async fn get_document(&self, _collection: &str, _id: &str) -> Result<Option<Document>> {
            Ok(None)
        }

        async fn run_query(&self, _query: &SubscriptionQuery) -> Result<Vec<Document>> {
            let mut results = self.results.lock().unwrap();
            if results.len() > 1 {
                Ok(results.remove(0))
            } else {
                Ok(results[0].clone())
            }
        }
    }

    #[tokio::test]
    async fn test_next_batch_skips_quiet_polls() {
        let store = Arc::new(ScriptedStore {
            results: Mutex::new(vec![
                vec![],
                vec![],
                vec![doc("a", "t1")],
                vec![doc("a", "t1")],
                vec![doc("a", "t2"), doc("b", "t1")]
            ])
        });
        let query = SubscriptionQuery::new("requests", Utc::now(), "orders");
        let mut listener = SnapshotListener::new(store, query, Duration::from_millis(1));

        let first = listener.next_batch().await.unwrap();
        assert_eq!(kinds(&first), vec![(ChangeKind::Added, "a")]);

        let second = listener.next_batch().await.unwrap();
        assert_eq!(
            kinds(&second),
            vec![(ChangeKind::Modified, "a"), (ChangeKind::Added, "b")]
        );
        assert_eq!(listener.query().collection, "requests");
    }
}
