// Background execution of moderation passes.
//
// Comment creation hands a job to the queue and returns to the user right
// away. A dispatcher task pulls jobs off a bounded channel and runs each pass
// in its own task, with a semaphore capping how many run at once. Each pass is
// still a plain sequence of detector calls; there is no fan-out inside a pass.

use super::comment_store::CommentStore;
use super::detector::DetectorVerdict;
use super::moderation_models::{Comment, RequestMeta};
use super::moderation_service::ModerationService;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle, JoinSet};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Moderation queue is full")]
    Full,

    #[error("Moderation queue is closed")]
    Closed,
}

/// A freshly created comment waiting to be judged.
#[derive(Debug, Clone)]
pub struct ModerationJob {
    pub comment: Comment,
    pub request: RequestMeta,
    /// Comments written by an admin are never moderated.
    pub is_admin: bool,
}

pub struct ModerationQueue {
    sender: mpsc::Sender<ModerationJob>,
    dispatcher: JoinHandle<()>,
}

impl ModerationQueue {
    /// Spawn the dispatcher. Must be called from within a Tokio runtime.
    pub fn start<S: CommentStore + 'static>(
        service: Arc<ModerationService<S>>,
        workers: usize,
        capacity: usize,
    ) -> Self {
        let (sender, mut receiver) = mpsc::channel::<ModerationJob>(capacity.max(1));
        let permits = Arc::new(Semaphore::new(workers.max(1)));

        let dispatcher = tokio::spawn(async move {
            tracing::info!(workers, capacity, "Moderation queue started");
            let mut passes = JoinSet::new();
            let mut accepting = true;

            // Finished passes are reaped as they complete, so a panic is
            // logged right away even when no further job arrives.
            loop {
                tokio::select! {
                    job = receiver.recv(), if accepting => {
                        let Some(job) = job else {
                            accepting = false;
                            continue;
                        };

                        let permit = match Arc::clone(&permits).acquire_owned().await {
                            Ok(permit) => permit,
                            Err(e) => {
                                tracing::error!("Moderation worker pool closed: {}", e);
                                accepting = false;
                                continue;
                            }
                        };

                        let service = Arc::clone(&service);
                        passes.spawn(async move {
                            let _permit = permit;
                            run_job(&service, job).await;
                        });
                    }
                    Some(finished) = passes.join_next(), if !passes.is_empty() => {
                        log_join_result(finished);
                    }
                    else => break,
                }
            }
            tracing::info!("Moderation queue stopped");
        });

        Self { sender, dispatcher }
    }

    /// Hand a job to the queue without waiting for it to run.
    ///
    /// Admin jobs are accepted and dropped. A full or closed queue is
    /// reported to the caller, which should log it.
    pub fn submit(&self, job: ModerationJob) -> Result<(), QueueError> {
        if job.is_admin {
            tracing::debug!(comment_id = job.comment.id, "Skipping moderation for admin comment");
            return Ok(());
        }

        self.sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full,
            TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    /// Like `submit`, but waits for room in the queue instead of rejecting.
    /// For batch callers that are not serving a user request.
    pub async fn enqueue(&self, job: ModerationJob) -> Result<(), QueueError> {
        if job.is_admin {
            tracing::debug!(comment_id = job.comment.id, "Skipping moderation for admin comment");
            return Ok(());
        }

        self.sender.send(job).await.map_err(|_| QueueError::Closed)
    }

    /// Stop accepting jobs and wait for every queued and running pass to finish.
    pub async fn shutdown(self) {
        drop(self.sender);
        if let Err(e) = self.dispatcher.await {
            tracing::error!("Moderation dispatcher failed: {}", e);
        }
    }
}

async fn run_job<S: CommentStore>(service: &ModerationService<S>, job: ModerationJob) {
    let ModerationJob {
        mut comment,
        request,
        ..
    } = job;

    let report = service.moderate(&mut comment, &request).await;
    let unavailable: Vec<&str> = report
        .verdicts
        .iter()
        .filter(|record| matches!(record.verdict, DetectorVerdict::Error(_)))
        .map(|record| record.detector.as_str())
        .collect();

    tracing::info!(
        comment_id = report.comment_id,
        state = %report.state,
        blocked_by = ?report.blocked_by,
        unavailable = ?unavailable,
        persist_failures = report.persist_failures,
        "Moderation pass finished"
    );
}

fn log_join_result(result: Result<(), JoinError>) {
    if let Err(e) = result {
        tracing::error!("Moderation pass aborted: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::comment_store::StoreError;
    use crate::core::moderation::detector::{Detector, DetectorError};
    use crate::core::moderation::moderation_models::{DetectorInput, Site, User};
    use async_trait::async_trait;
    use dashmap::DashMap;

    #[derive(Default)]
    struct RecordingStore {
        saved: DashMap<u64, Comment>,
    }

    #[async_trait]
    impl CommentStore for RecordingStore {
        async fn update_comment(&self, comment: &Comment) -> Result<(), StoreError> {
            self.saved.insert(comment.id, comment.clone());
            Ok(())
        }

        async fn fetch_user_for_comment(&self, _comment: &Comment) -> Result<User, StoreError> {
            Ok(User::default())
        }

        async fn find_site(&self, _name: &str) -> Result<Option<Site>, StoreError> {
            Ok(None)
        }

        async fn find_comment(&self, id: u64) -> Result<Option<Comment>, StoreError> {
            Ok(self.saved.get(&id).map(|c| c.clone()))
        }
    }

    /// Flags anything containing "spam" and crashes on "boom".
    struct SpamWordDetector;

    #[async_trait]
    impl Detector for SpamWordDetector {
        fn name(&self) -> &str {
            "SpamWord"
        }

        async fn check(&self, input: &DetectorInput<'_>) -> Result<bool, DetectorError> {
            if input.content == "boom" {
                panic!("detector crashed");
            }
            Ok(!input.content.contains("spam"))
        }
    }

    fn job(id: u64, content: &str, is_admin: bool) -> ModerationJob {
        ModerationJob {
            comment: Comment {
                id,
                content: content.to_string(),
                ..Default::default()
            },
            request: RequestMeta::default(),
            is_admin,
        }
    }

    fn service(store: Arc<RecordingStore>) -> Arc<ModerationService<Arc<RecordingStore>>> {
        Arc::new(ModerationService::new(store, false).with_detector(Box::new(SpamWordDetector)))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn queued_jobs_are_moderated_before_shutdown_returns() {
        let store = Arc::new(RecordingStore::default());
        let queue = ModerationQueue::start(service(Arc::clone(&store)), 2, 16);

        queue.submit(job(1, "spam here", false)).unwrap();
        queue.submit(job(2, "friendly words", false)).unwrap();
        queue.submit(job(3, "more spam", false)).unwrap();
        queue.shutdown().await;

        assert!(store.saved.get(&1).unwrap().is_pending);
        assert!(store.saved.get(&3).unwrap().is_pending);
        assert!(store.saved.get(&2).is_none());
    }

    #[tokio::test]
    async fn admin_jobs_are_skipped() {
        let store = Arc::new(RecordingStore::default());
        let queue = ModerationQueue::start(service(Arc::clone(&store)), 1, 4);

        queue.submit(job(1, "spam from admin", true)).unwrap();
        queue.shutdown().await;

        assert!(store.saved.is_empty());
    }

    #[tokio::test]
    async fn enqueue_waits_for_room() {
        let store = Arc::new(RecordingStore::default());
        let queue = ModerationQueue::start(service(Arc::clone(&store)), 1, 1);

        for id in 1..=5 {
            queue.enqueue(job(id, "spam", false)).await.unwrap();
        }
        queue.shutdown().await;

        assert_eq!(store.saved.len(), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_pass_does_not_stall_the_queue() {
        let store = Arc::new(RecordingStore::default());
        let queue = ModerationQueue::start(service(Arc::clone(&store)), 1, 4);

        queue.submit(job(1, "boom", false)).unwrap();
        // Let the crashed pass be reaped while the queue sits idle.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        queue.submit(job(2, "spam", false)).unwrap();
        queue.shutdown().await;

        assert!(store.saved.get(&1).is_none());
        assert!(store.saved.get(&2).unwrap().is_pending);
    }

    #[tokio::test]
    async fn full_queue_rejects_submission() {
        let store = Arc::new(RecordingStore::default());
        let queue = ModerationQueue::start(service(Arc::clone(&store)), 1, 1);

        // The current-thread runtime has not polled the dispatcher yet.
        queue.submit(job(1, "spam", false)).unwrap();
        let rejected = queue.submit(job(2, "spam", false));
        assert!(matches!(rejected, Err(QueueError::Full)));

        queue.shutdown().await;
        assert!(store.saved.get(&1).is_some());
    }
}
