/*!
Reconciliation of the known id set against the remote catalog.

Queries get more expensive at each tier, and a run stops at the first one
that settles the question:

1. count check: same total as last run means nothing new;
2. window query: companies launched since the last run's watermark;
3. full enumeration, one query per partition.
*/

use std::collections::{BTreeSet, HashSet};

use tracing::info;

use crate::radar::{
    catalog::Catalog,
    entity::Entity,
    error::TransportError,
    state_manager::KnownState,
};

/// Which tier ended the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionPath {
    /// No previous state: baseline recorded, nothing reported
    Seeded,
    /// Count matched the stored total
    Unchanged,
    /// Window query found new ids
    Window,
    /// Window query found nothing and the count did not grow
    WindowEmpty,
    /// Full enumeration was authoritative
    FullFetch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// New entities, one per id, in the order the catalog returned them
    pub new_entities: Vec<Entity>,
    /// Previously known ids plus everything seen this run
    pub known_ids: BTreeSet<String>,
    pub current_count: u64,
    pub path: DetectionPath,
}

pub struct DetectionEngine {
    catalog: Box<dyn Catalog>,
}

impl DetectionEngine {
    pub fn new(catalog: Box<dyn Catalog>) -> Self {
        Self { catalog }
    }

    /// Enumerate everything and treat it as already known. Never reports new entities.
    pub async fn seed(&self) -> Result<Detection, TransportError> {
        info!("Seeding - fetching all companies to establish baseline...");
        let all = self.catalog.fetch_all_partitioned().await?;
        let current_count = self.catalog.fetch_count().await?;
        let known_ids: BTreeSet<String> = all.iter().filter_map(Entity::id).collect();
        info!("Seed complete: {} unique companies", known_ids.len());

        Ok(Detection {
            new_entities: Vec::new(),
            known_ids,
            current_count,
            path: DetectionPath::Seeded,
        })
    }

    pub async fn detect_new(
        &self,
        state: Option<&KnownState>,
        force_full: bool,
    ) -> Result<Detection, TransportError> {
        let Some(state) = state else {
            return self.seed().await;
        };

        let stored_count = state.total_count;
        let current_count = self.catalog.fetch_count().await?;

        if current_count == stored_count && !force_full {
            info!("Count unchanged ({}) - no new companies", current_count);
            return Ok(unchanged(state, current_count, DetectionPath::Unchanged));
        }

        if current_count != stored_count {
            info!(
                "Count changed: {} -> {} (delta: {:+})",
                stored_count,
                current_count,
                current_count as i64 - stored_count as i64
            );
        }

        if force_full {
            info!("Full fetch forced");
        } else if state.last_run_timestamp > 0 {
            let recent = self.catalog.fetch_since(state.last_run_timestamp).await?;
            let new_entities = unseen(recent, &state.known_ids);

            if !new_entities.is_empty() {
                info!("Found {} new companies via timestamp query", new_entities.len());
                let mut known_ids = state.known_ids.clone();
                known_ids.extend(new_entities.iter().filter_map(Entity::id));
                return Ok(Detection {
                    new_entities,
                    known_ids,
                    current_count,
                    path: DetectionPath::Window,
                });
            }

            if current_count <= stored_count {
                // shrinkage is not tracked; ids are never removed
                return Ok(unchanged(state, current_count, DetectionPath::WindowEmpty));
            }
            info!("Count increased but no new IDs via timestamp - falling back to full fetch");
        }

        info!("Running full fetch to find new companies...");
        let all = self.catalog.fetch_all_partitioned().await?;
        let mut known_ids = state.known_ids.clone();
        known_ids.extend(all.iter().filter_map(Entity::id));
        let new_entities = unseen(all, &state.known_ids);

        if new_entities.is_empty() {
            info!("Full fetch complete - no genuinely new companies found");
        } else {
            info!("Found {} new companies via full fetch", new_entities.len());
        }

        Ok(Detection {
            new_entities,
            known_ids,
            current_count,
            path: DetectionPath::FullFetch,
        })
    }
}

fn unchanged(state: &KnownState, current_count: u64, path: DetectionPath) -> Detection {
    Detection {
        new_entities: Vec::new(),
        known_ids: state.known_ids.clone(),
        current_count,
        path,
    }
}

/// Entities whose id is not in `known`, first occurrence per id. Records
/// without an id are dropped.
fn unseen(entities: Vec<Entity>, known: &BTreeSet<String>) -> Vec<Entity> {
    let mut seen = HashSet::new();
    entities
        .into_iter()
        .filter(|entity| match entity.id() {
            Some(id) => !known.contains(&id) && seen.insert(id),
            None => false,
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::radar::entity::entity;
    use async_trait::async_trait;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// In-memory catalog with call counters
    #[derive(Default)]
    pub(crate) struct FakeCatalog {
        pub(crate) count: Mutex<u64>,
        pub(crate) window: Mutex<Vec<Entity>>,
        pub(crate) all: Mutex<Vec<Entity>>,
        pub(crate) calls: Mutex<Vec<&'static str>>,
        pub(crate) fail_count: Mutex<bool>,
    }

    impl FakeCatalog {
        pub(crate) fn new(count: u64, window: &[&str], all: &[&str]) -> Arc<Self> {
            let catalog = Self::default();
            *catalog.count.lock().unwrap() = count;
            *catalog.window.lock().unwrap() = records(window);
            *catalog.all.lock().unwrap() = records(all);
            Arc::new(catalog)
        }

        pub(crate) fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    pub(crate) fn records(ids: &[&str]) -> Vec<Entity> {
        ids.iter()
            .map(|id| entity(json!({"objectID": id, "name": format!("Company {id}")})))
            .collect()
    }

    pub(crate) struct SharedCatalog(pub(crate) Arc<FakeCatalog>);

    #[async_trait]
    impl Catalog for SharedCatalog {
        async fn fetch_count(&self) -> Result<u64, TransportError> {
            self.0.calls.lock().unwrap().push("count");
            if *self.0.fail_count.lock().unwrap() {
                return Err(TransportError::Status {
                    status: 502,
                    body: "bad gateway".to_string(),
                });
            }
            Ok(*self.0.count.lock().unwrap())
        }

        async fn fetch_since(&self, _timestamp: i64) -> Result<Vec<Entity>, TransportError> {
            self.0.calls.lock().unwrap().push("since");
            Ok(self.0.window.lock().unwrap().clone())
        }

        async fn fetch_all_partitioned(&self) -> Result<Vec<Entity>, TransportError> {
            self.0.calls.lock().unwrap().push("all");
            Ok(self.0.all.lock().unwrap().clone())
        }
    }

    fn engine(catalog: &Arc<FakeCatalog>) -> DetectionEngine {
        DetectionEngine::new(Box::new(SharedCatalog(catalog.clone())))
    }

    fn state(known: &[&str], total_count: u64) -> KnownState {
        KnownState::new(
            known.iter().map(|s| s.to_string()).collect(),
            total_count,
            Utc::now(),
        )
    }

    fn ids(detection: &Detection) -> Vec<String> {
        detection.new_entities.iter().filter_map(Entity::id).collect()
    }

    fn set(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn first_run_seeds_without_reporting() {
        let catalog = FakeCatalog::new(3, &[], &["a", "b", "c", "b"]);
        let detection = engine(&catalog).detect_new(None, false).await.unwrap();

        assert_eq!(detection.path, DetectionPath::Seeded);
        assert!(detection.new_entities.is_empty());
        assert_eq!(detection.known_ids, set(&["a", "b", "c"]));
        assert_eq!(detection.current_count, 3);
        assert_eq!(catalog.calls(), vec!["all", "count"]);
    }

    #[tokio::test]
    async fn seeding_skips_records_without_ids() {
        let catalog = FakeCatalog::new(2, &[], &["a"]);
        catalog.all.lock().unwrap().push(entity(json!({"name": "Anonymous"})));
        let detection = engine(&catalog).seed().await.unwrap();
        assert_eq!(detection.known_ids, set(&["a"]));
    }

    #[tokio::test]
    async fn unchanged_count_short_circuits() {
        // window and full fetch would both report "z" if they were consulted
        let catalog = FakeCatalog::new(2, &["z"], &["a", "b", "z"]);
        let stored = state(&["a", "b"], 2);

        let detection = engine(&catalog).detect_new(Some(&stored), false).await.unwrap();

        assert_eq!(detection.path, DetectionPath::Unchanged);
        assert!(detection.new_entities.is_empty());
        assert_eq!(detection.known_ids, stored.known_ids);
        assert_eq!(catalog.calls(), vec!["count"]);
    }

    #[tokio::test]
    async fn window_query_finds_new_companies_without_fallback() {
        let catalog = FakeCatalog::new(102, &["x1", "x2"], &[]);
        let known: Vec<String> = (0..100).map(|i| format!("k{i}")).collect();
        let known_refs: Vec<&str> = known.iter().map(String::as_str).collect();
        let stored = state(&known_refs, 100);

        let detection = engine(&catalog).detect_new(Some(&stored), false).await.unwrap();

        assert_eq!(detection.path, DetectionPath::Window);
        assert_eq!(ids(&detection), vec!["x1", "x2"]);
        assert_eq!(detection.current_count, 102);
        assert_eq!(detection.known_ids.len(), 102);
        assert_eq!(catalog.calls(), vec!["count", "since"]);
    }

    #[tokio::test]
    async fn window_ignores_known_ids_and_duplicates() {
        let catalog = FakeCatalog::new(4, &["a", "c", "c", "d"], &[]);
        let stored = state(&["a", "b"], 2);

        let detection = engine(&catalog).detect_new(Some(&stored), false).await.unwrap();

        assert_eq!(ids(&detection), vec!["c", "d"]);
        assert_eq!(detection.known_ids, set(&["a", "b", "c", "d"]));
    }

    #[tokio::test]
    async fn first_duplicate_supplies_the_payload() {
        let catalog = FakeCatalog::new(2, &[], &[]);
        *catalog.window.lock().unwrap() = vec![
            entity(json!({"objectID": "c", "name": "First"})),
            entity(json!({"objectID": "c", "name": "Second"})),
        ];
        let stored = state(&["a"], 1);

        let detection = engine(&catalog).detect_new(Some(&stored), false).await.unwrap();

        assert_eq!(detection.new_entities.len(), 1);
        assert_eq!(detection.new_entities[0].name(), "First");
    }

    #[tokio::test]
    async fn shrinking_count_is_not_a_removal() {
        let catalog = FakeCatalog::new(99, &[], &["a"]);
        let stored = state(&["a", "b"], 100);

        let detection = engine(&catalog).detect_new(Some(&stored), false).await.unwrap();

        assert_eq!(detection.path, DetectionPath::WindowEmpty);
        assert!(detection.new_entities.is_empty());
        assert_eq!(detection.current_count, 99);
        assert_eq!(detection.known_ids, set(&["a", "b"]));
        assert_eq!(catalog.calls(), vec!["count", "since"]);
    }

    #[tokio::test]
    async fn growing_count_with_empty_window_falls_back() {
        let catalog = FakeCatalog::new(4, &["a"], &["a", "b", "c", "d"]);
        let stored = state(&["a", "b"], 2);

        let detection = engine(&catalog).detect_new(Some(&stored), false).await.unwrap();

        assert_eq!(detection.path, DetectionPath::FullFetch);
        assert_eq!(ids(&detection), vec!["c", "d"]);
        assert_eq!(detection.known_ids, set(&["a", "b", "c", "d"]));
        assert_eq!(catalog.calls(), vec!["count", "since", "all"]);
    }

    #[tokio::test]
    async fn force_full_skips_the_window() {
        let catalog = FakeCatalog::new(2, &["w"], &["a", "b", "c"]);
        let stored = state(&["a", "b"], 2);

        let detection = engine(&catalog).detect_new(Some(&stored), true).await.unwrap();

        assert_eq!(detection.path, DetectionPath::FullFetch);
        assert_eq!(ids(&detection), vec!["c"]);
        assert_eq!(catalog.calls(), vec!["count", "all"]);
    }

    #[tokio::test]
    async fn missing_watermark_goes_straight_to_full_fetch() {
        let catalog = FakeCatalog::new(3, &["w"], &["a", "c"]);
        let mut stored = state(&["a"], 1);
        stored.last_run_timestamp = 0;

        let detection = engine(&catalog).detect_new(Some(&stored), false).await.unwrap();

        assert_eq!(ids(&detection), vec!["c"]);
        assert_eq!(catalog.calls(), vec!["count", "all"]);
    }

    #[tokio::test]
    async fn ids_vanishing_remotely_stay_known() {
        let catalog = FakeCatalog::new(3, &[], &["c", "d", "e"]);
        let stored = state(&["a", "b"], 2);
        let mut stored_no_window = stored.clone();
        stored_no_window.last_run_timestamp = 0;

        let detection = engine(&catalog)
            .detect_new(Some(&stored_no_window), false)
            .await
            .unwrap();

        assert_eq!(detection.known_ids, set(&["a", "b", "c", "d", "e"]));
    }

    #[tokio::test]
    async fn known_ids_are_never_reported_again() {
        let catalog = FakeCatalog::new(5, &["a", "b"], &["a", "b", "c"]);
        let stored = state(&["a", "b", "c"], 3);

        let detection = engine(&catalog).detect_new(Some(&stored), false).await.unwrap();

        assert!(detection.new_entities.is_empty());
        assert_eq!(detection.path, DetectionPath::FullFetch);
    }

    #[tokio::test]
    async fn count_failure_propagates() {
        let catalog = FakeCatalog::new(0, &[], &[]);
        *catalog.fail_count.lock().unwrap() = true;
        let stored = state(&["a"], 1);

        let err = engine(&catalog).detect_new(Some(&stored), false).await.unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 502, .. }));
    }
}
