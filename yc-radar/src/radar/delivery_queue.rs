/*!
Durable queue of companies whose webhook failed on an earlier run
*/

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::radar::{
    entity::Entity,
    error::StateError,
    notifier::{DeliveryReport, Notifier},
    state_manager::{read_if_exists, write_json_atomic},
};

pub struct DeliveryQueue {
    path: PathBuf,
}

impl DeliveryQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pending raw records, or `None` if nothing is queued
    pub fn load(&self) -> Result<Option<Vec<Entity>>, StateError> {
        let Some(content) = read_if_exists(&self.path)? else {
            return Ok(None);
        };
        let pending: Vec<Entity> = serde_json::from_str(&content).map_err(|source| StateError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(pending))
    }

    /// Replace the queued batch. An empty batch removes the file.
    pub fn replace(&self, pending: &[Entity]) -> Result<(), StateError> {
        if pending.is_empty() {
            return self.clear();
        }
        write_json_atomic(&self.path, &pending)?;
        warn!("Saved {} pending webhook payloads to {}", pending.len(), self.path.display());
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StateError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Cleared pending webhook file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StateError::io(&self.path, e)),
        }
    }

    /// Retry everything queued by earlier runs. Whatever still fails becomes
    /// the new queue; if everything went through the queue file is removed.
    pub async fn drain_pending(&self, notifier: &Notifier) -> Result<DeliveryReport, StateError> {
        let Some(pending) = self.load()? else {
            return Ok(DeliveryReport::default());
        };
        if pending.is_empty() {
            self.clear()?;
            return Ok(DeliveryReport::default());
        }

        info!("Retrying pending webhooks ({} companies)...", pending.len());
        let report = notifier.deliver_all(&pending).await;
        if report.all_sent() {
            self.clear()?;
            info!("All pending webhooks delivered");
        } else {
            self.replace(&report.failed)?;
            warn!(
                "Retried pending: {} sent, {} still failing",
                report.sent,
                report.failed.len()
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radar::entity::entity;
    use crate::radar::notifier::tests::{RecordingSink, notifier};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn queue() -> (tempfile::TempDir, DeliveryQueue) {
        let dir = tempfile::tempdir().unwrap();
        let queue = DeliveryQueue::new(dir.path().join("pending_webhook.json"));
        (dir, queue)
    }

    #[test]
    fn replace_and_load_keep_raw_records() {
        let (_dir, queue) = queue();
        let batch = vec![entity(json!({"objectID": "1", "custom": {"k": "v"}}))];
        queue.replace(&batch).unwrap();
        assert_eq!(queue.load().unwrap(), Some(batch));
    }

    #[test]
    fn replacing_with_nothing_removes_the_file() {
        let (_dir, queue) = queue();
        queue.replace(&[entity(json!({"objectID": "1"}))]).unwrap();
        queue.replace(&[]).unwrap();
        assert!(!queue.path().exists());
        assert_eq!(queue.load().unwrap(), None);
    }

    #[test]
    fn corrupt_queue_is_reported() {
        let (_dir, queue) = queue();
        std::fs::write(queue.path(), "not json").unwrap();
        assert!(matches!(queue.load(), Err(StateError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn drain_without_queue_sends_nothing() {
        let (_dir, queue) = queue();
        let sink = Arc::new(RecordingSink::default());
        let report = queue.drain_pending(&notifier(sink.clone())).await.unwrap();
        assert_eq!(report, DeliveryReport::default());
        assert!(sink.attempts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn successful_drain_removes_queue() {
        let (_dir, queue) = queue();
        queue
            .replace(&[entity(json!({"objectID": "1"})), entity(json!({"objectID": "2"}))])
            .unwrap();
        let sink = Arc::new(RecordingSink::default());

        let report = queue.drain_pending(&notifier(sink.clone())).await.unwrap();

        assert_eq!(report.sent, 2);
        assert!(!queue.path().exists());
        assert_eq!(sink.delivered_ids(), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn partial_drain_keeps_only_the_failing_subset() {
        let (_dir, queue) = queue();
        let batch = vec![
            entity(json!({"objectID": "1"})),
            entity(json!({"objectID": "2"})),
            entity(json!({"objectID": "3"})),
        ];
        queue.replace(&batch).unwrap();
        let sink = Arc::new(RecordingSink::default());
        sink.fail_always("2");

        let report = queue.drain_pending(&notifier(sink)).await.unwrap();

        assert_eq!(report.sent, 2);
        assert_eq!(queue.load().unwrap(), Some(vec![batch[1].clone()]));
    }

    #[tokio::test]
    async fn empty_queue_file_is_cleared() {
        let (_dir, queue) = queue();
        std::fs::write(queue.path(), "[]").unwrap();
        let sink = Arc::new(RecordingSink::default());
        queue.drain_pending(&notifier(sink)).await.unwrap();
        assert!(!queue.path().exists());
    }
}
