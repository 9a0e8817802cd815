//! Runs pending jobs from the job list against a [`Storage`]-backed queue.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use indexsync_client::IndexingClient;
use indexsync_shared::{JobRecord, Result};
use indexsync_storage::Storage;
use tracing::{debug, error, info, warn};

use crate::job::{ACTION_JOB, ActionJob, CycleOutcome};

/// Result of handling one job from the job list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRun {
    /// The drain job ran one cycle.
    Ran { job: JobRecord, outcome: CycleOutcome },
    /// A job this worker does not know how to run; it was discarded.
    Unknown(JobRecord),
}

/// Single-process job runner. Owns the database handle and the drain job.
pub struct Worker {
    storage: Arc<Storage>,
    job: ActionJob,
}

impl Worker {
    pub fn new(storage: Arc<Storage>, client: Arc<dyn IndexingClient>) -> Self {
        let job = ActionJob::new(storage.clone(), client, storage.clone(), storage.clone());
        Self { storage, job }
    }

    /// Make sure a non-empty queue has a pending drain run.
    ///
    /// Covers entries written by producers that enqueued without scheduling.
    /// Returns `true` if a run was added by this call.
    pub async fn ensure_scheduled(&self) -> Result<bool> {
        if self.storage.queue_len().await? == 0 {
            return Ok(false);
        }
        let added = self.storage.add_job(ACTION_JOB).await?;
        if added {
            debug!("scheduled drain run for existing queue entries");
        }
        Ok(added)
    }

    /// Take the oldest pending job and run it. `Ok(None)` when nothing is due.
    ///
    /// The job row id doubles as the run id reported in heartbeats. The row is
    /// gone once taken, so a failed cycle is always put back; an extra run on
    /// an empty queue just ends idle.
    pub async fn run_pending(&self) -> Result<Option<JobRun>> {
        let Some(job) = self.storage.take_next_job().await? else {
            return Ok(None);
        };

        if job.job_class != ACTION_JOB {
            warn!(job_class = %job.job_class, id = job.id, "discarding unknown job");
            return Ok(Some(JobRun::Unknown(job)));
        }

        match self.job.run(job.id).await {
            Ok(outcome) => Ok(Some(JobRun::Ran { job, outcome })),
            Err(e) => {
                if let Err(resched) = self.storage.add_job(ACTION_JOB).await {
                    warn!(error = %resched, "could not reschedule after failed run");
                }
                Err(e)
            }
        }
    }

    /// Run jobs until `shutdown` resolves.
    ///
    /// A cycle in progress always completes; shutdown is observed between
    /// jobs. When nothing is due, or a job fails, the queue is checked for
    /// stranded entries and the loop waits `poll_interval` before looking again.
    pub async fn run_forever<F>(&self, poll_interval: Duration, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        self.ensure_scheduled().await?;
        info!(poll_interval_ms = poll_interval.as_millis() as u64, "worker started");

        loop {
            let idle = match self.run_pending().await {
                Ok(Some(_)) => false,
                Ok(None) => true,
                Err(e) => {
                    error!(error = %e, "job failed");
                    true
                }
            };

            if idle {
                match self.ensure_scheduled().await {
                    Ok(true) => continue,
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "could not check queue for pending entries"),
                }
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            } else {
                tokio::select! {
                    biased;
                    _ = &mut shutdown => break,
                    _ = tokio::task::yield_now() => {}
                }
            }
        }

        info!("worker stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::job::CycleReport;
    use crate::queue::schedule_action;
    use indexsync_client::{ClientOptions, HttpIndexingClient};
    use indexsync_shared::AccessOp;
    use url::Url;
    use uuid::Uuid;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_storage() -> Arc<Storage> {
        let path = std::env::temp_dir().join(format!("indexsync_worker_{}.db", Uuid::now_v7()));
        Arc::new(Storage::open(&path).await.expect("open test db"))
    }

    fn http_client(server: &MockServer) -> Arc<dyn IndexingClient> {
        let base = Url::parse(&server.uri()).unwrap();
        Arc::new(HttpIndexingClient::new(&base, &ClientOptions::default()).unwrap())
    }

    #[tokio::test]
    async fn drains_scheduled_actions_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/deleteUser"))
            .and(body_json(serde_json::json!({"userId": "alice"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/updateAccess"))
            .and(body_json(serde_json::json!({
                "op": "grant",
                "userIds": ["bob"],
                "sourceId": "doc1"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let storage = test_storage().await;
        schedule_action(
            &storage,
            &Action::DeleteUserId {
                user_id: "alice".into(),
            },
        )
        .await
        .unwrap();
        schedule_action(
            &storage,
            &Action::UpdateAccessSourceId {
                op: AccessOp::Grant,
                user_ids: ["bob".to_string()].into(),
                source_id: "doc1".into(),
            },
        )
        .await
        .unwrap();
        storage
            .enqueue("delete_provider_id", Some(r#"{"provider":"files"}"#))
            .await
            .unwrap();

        let worker = Worker::new(storage.clone(), http_client(&server));

        let first = worker.run_pending().await.unwrap();
        assert!(matches!(
            first,
            Some(JobRun::Ran {
                outcome: CycleOutcome::Rescheduled(CycleReport {
                    fetched: 3,
                    dispatched: 2,
                    rejected: 1,
                    removed: 3,
                }),
                ..
            })
        ));
        assert_eq!(storage.queue_len().await.unwrap(), 0);

        let second = worker.run_pending().await.unwrap();
        assert!(matches!(
            second,
            Some(JobRun::Ran {
                outcome: CycleOutcome::Idle,
                ..
            })
        ));
        assert!(worker.run_pending().await.unwrap().is_none());

        let beat = storage.last_heartbeat(ACTION_JOB).await.unwrap().unwrap();
        assert_eq!(beat.job_class, ACTION_JOB);
    }

    #[tokio::test]
    async fn backend_outage_keeps_entries_for_the_next_run() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let storage = test_storage().await;
        schedule_action(
            &storage,
            &Action::DeleteProviderId {
                provider_id: "files".into(),
            },
        )
        .await
        .unwrap();

        let worker = Worker::new(storage.clone(), http_client(&server));
        let err = worker.run_pending().await.unwrap_err();

        assert!(err.is_remote());
        assert_eq!(storage.queue_len().await.unwrap(), 1);
        let jobs = storage.list_jobs().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_class, ACTION_JOB);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_the_drain_job_scheduled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/deleteUser"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let db_path = std::env::temp_dir().join(format!("indexsync_worker_{}.db", Uuid::now_v7()));
        let storage = Arc::new(Storage::open(&db_path).await.unwrap());
        schedule_action(
            &storage,
            &Action::DeleteUserId {
                user_id: "alice".into(),
            },
        )
        .await
        .unwrap();

        // A second connection hides the queue table for one cycle.
        let db = libsql::Builder::new_local(&db_path).build().await.unwrap();
        let side = db.connect().unwrap();
        side.execute("ALTER TABLE action_queue RENAME TO action_queue_hidden", libsql::params![])
            .await
            .unwrap();

        let worker = Worker::new(storage.clone(), http_client(&server));
        assert!(worker.run_pending().await.is_err());

        side.execute("ALTER TABLE action_queue_hidden RENAME TO action_queue", libsql::params![])
            .await
            .unwrap();

        let jobs = storage.list_jobs().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_class, ACTION_JOB);

        let run = worker.run_pending().await.unwrap();
        assert!(matches!(
            run,
            Some(JobRun::Ran {
                outcome: CycleOutcome::Rescheduled(CycleReport { dispatched: 1, .. }),
                ..
            })
        ));
        assert_eq!(storage.queue_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn run_forever_picks_up_unscheduled_entries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/deleteProvider"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let storage = test_storage().await;
        let worker = Worker::new(storage.clone(), http_client(&server));

        let producer = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            storage
                .enqueue("delete_provider_id", Some(r#"{"providerId":"files"}"#))
                .await
                .unwrap();
        };
        let (ran, ()) = tokio::join!(
            worker.run_forever(
                Duration::from_millis(10),
                tokio::time::sleep(Duration::from_millis(300)),
            ),
            producer,
        );

        ran.unwrap();
        assert_eq!(storage.queue_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ensure_scheduled_only_for_a_non_empty_queue() {
        let server = MockServer::start().await;
        let storage = test_storage().await;
        let worker = Worker::new(storage.clone(), http_client(&server));

        assert!(!worker.ensure_scheduled().await.unwrap());
        assert!(storage.list_jobs().await.unwrap().is_empty());

        storage
            .enqueue("delete_user_id", Some(r#"{"userId":"alice"}"#))
            .await
            .unwrap();
        assert!(worker.ensure_scheduled().await.unwrap());
        assert!(!worker.ensure_scheduled().await.unwrap());
        assert_eq!(storage.list_jobs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_jobs_are_discarded() {
        let server = MockServer::start().await;
        let storage = test_storage().await;
        storage.add_job("ReindexJob").await.unwrap();

        let worker = Worker::new(storage.clone(), http_client(&server));
        let run = worker.run_pending().await.unwrap();

        assert!(matches!(run, Some(JobRun::Unknown(job)) if job.job_class == "ReindexJob"));
        assert!(storage.list_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_forever_drains_then_stops_on_shutdown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/deleteSources"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let storage = test_storage().await;
        storage
            .enqueue("delete_source_ids", Some(r#"{"sourceIds":["s1"]}"#))
            .await
            .unwrap();

        let worker = Worker::new(storage.clone(), http_client(&server));
        worker
            .run_forever(
                Duration::from_millis(10),
                tokio::time::sleep(Duration::from_millis(200)),
            )
            .await
            .unwrap();

        assert_eq!(storage.queue_len().await.unwrap(), 0);
        assert!(storage.list_jobs().await.unwrap().is_empty());
    }
}
