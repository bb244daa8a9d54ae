//! Background jobs: mirror progress polling with push-mirror promotion,
//! multi-sync pulls, and the startup file index.
//!
//! Each job runs at most once at a time. A tick that fires while the
//! previous run is still going is skipped rather than queued.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, ServerError};
use crate::indexer::RepoFileIndexer;
use crate::mirror::MirrorComponent;
use crate::multisync::{MultiSyncComponent, SyncPeer};
use crate::types::RepoType;

/// In-process guard that lets only one run of a job proceed
pub struct SingleFlight {
    name: &'static str,
    lock: Mutex<()>,
}

impl SingleFlight {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            lock: Mutex::new(()),
        }
    }

    /// Run `job` unless another run holds the guard. Returns whether it ran.
    pub async fn run(&self, job: impl Future<Output = Result<()>>) -> bool {
        let Ok(_guard) = self.lock.try_lock() else {
            debug!(job = self.name, "Previous run still in progress, skipping");
            return false;
        };
        if let Err(e) = job.await {
            warn!(job = self.name, error = %e, "Job failed");
        }
        true
    }
}

#[derive(Clone, Copy, Debug)]
enum Job {
    MirrorChecks,
    MultiSync,
}

pub struct Jobs {
    mirrors: Arc<MirrorComponent>,
    multi_sync: Arc<MultiSyncComponent>,
    indexer: Arc<RepoFileIndexer>,
    peer: Arc<dyn SyncPeer>,
    index_concurrency: usize,
    mirror_flight: SingleFlight,
    sync_flight: SingleFlight,
    index_flight: SingleFlight,
}

impl Jobs {
    pub fn new(
        mirrors: Arc<MirrorComponent>,
        multi_sync: Arc<MultiSyncComponent>,
        indexer: Arc<RepoFileIndexer>,
        peer: Arc<dyn SyncPeer>,
        index_concurrency: usize,
    ) -> Self {
        Self {
            mirrors,
            multi_sync,
            indexer,
            peer,
            index_concurrency,
            mirror_flight: SingleFlight::new("mirror-checks"),
            sync_flight: SingleFlight::new("multi-sync"),
            index_flight: SingleFlight::new("index-batch"),
        }
    }

    /// Poll mirror progress, then promote finished mirrors to push mirrors.
    /// A failed progress poll does not hold back promotion.
    pub async fn run_mirror_checks(&self) -> bool {
        self.mirror_flight
            .run(async {
                if let Err(e) = self.mirrors.check_mirror_progress().await {
                    warn!(error = %e, "Mirror progress check failed");
                }
                self.mirrors.create_push_mirror_for_finished_mirror_task().await
            })
            .await
    }

    pub async fn run_multi_sync(&self) -> bool {
        self.sync_flight
            .run(self.multi_sync.sync_as_client(self.peer.as_ref()))
            .await
    }

    /// Index every repository of every type from the start
    pub async fn run_index_all(&self) -> bool {
        self.index_flight
            .run(async {
                for repo_type in [RepoType::Model, RepoType::Dataset, RepoType::Code] {
                    self.indexer.index_batch(repo_type, 0, self.index_concurrency).await?;
                }
                Ok::<_, ServerError>(())
            })
            .await
    }

    async fn run(&self, job: Job) -> bool {
        match job {
            Job::MirrorChecks => self.run_mirror_checks().await,
            Job::MultiSync => self.run_multi_sync().await,
        }
    }

    /// Start the periodic jobs and the one-shot index. Cancelling `cancel`
    /// stops the periodic loops after their current run.
    pub fn spawn(
        self: &Arc<Self>,
        mirror_interval: Duration,
        sync_interval: Option<Duration>,
        cancel: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        let mut handles = vec![self.spawn_periodic(Job::MirrorChecks, mirror_interval, cancel.clone())];
        match sync_interval {
            Some(period) => handles.push(self.spawn_periodic(Job::MultiSync, period, cancel)),
            None => info!("Multi-sync disabled"),
        }

        let jobs = self.clone();
        handles.push(tokio::spawn(async move {
            jobs.run_index_all().await;
            info!("Startup file index complete");
        }));
        handles
    }

    fn spawn_periodic(self: &Arc<Self>, job: Job, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let jobs = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(?job, interval_secs = period.as_secs(), "Job started");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!(?job, "Job shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        jobs.run(job).await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MultiSyncConfig;
    use crate::db::entities::repository_file;
    use crate::db::store::{create_repository, find_user, NewRepository};
    use crate::mirror::tests::{fixture, request};
    use crate::mirrorserver::MirrorTaskStatus;
    use crate::testutil::MockSyncPeer;
    use crate::types::MirrorStatus;
    use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, IntoActiveModel, PaginatorTrait, Set};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_single_flight_skips_overlapping_run() {
        let flight = SingleFlight::new("test");
        let (tx, rx) = oneshot::channel::<()>();

        let first = flight.run(async {
            rx.await.ok();
            Ok(())
        });
        let second = async {
            tokio::task::yield_now().await;
            let ran = flight.run(async { Ok(()) }).await;
            tx.send(()).ok();
            ran
        };

        let (first_ran, second_ran) = tokio::join!(first, second);
        assert!(first_ran);
        assert!(!second_ran);

        assert!(flight.run(async { Ok(()) }).await);
    }

    #[tokio::test]
    async fn test_single_flight_releases_after_failure() {
        let flight = SingleFlight::new("test");
        assert!(flight.run(async { Err(ServerError::Internal("boom".to_string())) }).await);
        assert!(flight.run(async { Ok(()) }).await);
    }

    #[tokio::test]
    async fn test_jobs_drive_components() {
        let fx = fixture().await;
        let db = fx.db.clone();
        let git = fx.git.clone();
        let backend = fx.backend.clone();

        let created = fx
            .component
            .create_mirror_repo(request(fx.source_id, "someone", "done"))
            .await
            .unwrap();
        backend.set_task(created.mirror_task_id, MirrorTaskStatus::Finished);

        let owner = find_user(&db, "AIWizards").await.unwrap().unwrap();
        create_repository(&db, NewRepository::new(owner.id, RepoType::Dataset, "AIWizards", "local"))
            .await
            .unwrap();
        git.add_file(RepoType::Dataset, "AIWizards", "local", "data/train.csv", 10, None);

        let peer = Arc::new(MockSyncPeer::new(5));
        peer.publish(1, RepoType::Code, "peer/tool");

        let multi_sync = Arc::new(MultiSyncComponent::new(
            db.clone(),
            MultiSyncConfig {
                enabled: true,
                ..MultiSyncConfig::default()
            },
        ));
        let jobs = Jobs::new(
            Arc::new(fx.component),
            multi_sync.clone(),
            Arc::new(RepoFileIndexer::new(db.clone(), git.clone())),
            peer,
            4,
        );

        assert!(jobs.run_mirror_checks().await);
        assert_eq!(backend.push_mirrors.lock().unwrap().len(), 1);

        assert!(jobs.run_multi_sync().await);
        assert_eq!(multi_sync.current_version().await.unwrap(), 1);

        assert!(jobs.run_index_all().await);
        let files = repository_file::Entity::find().count(db.as_ref()).await.unwrap();
        assert_eq!(files, 1);
    }

    #[tokio::test]
    async fn test_promotion_runs_when_progress_poll_fails() {
        let fx = fixture().await;
        let db = fx.db.clone();
        let backend = fx.backend.clone();

        let done = fx
            .component
            .create_mirror_repo(request(fx.source_id, "someone", "done"))
            .await
            .unwrap();
        let broken = fx
            .component
            .create_mirror_repo(request(fx.source_id, "someone", "broken"))
            .await
            .unwrap();
        backend.set_task(done.mirror_task_id, MirrorTaskStatus::Finished);

        let mut active = done.clone().into_active_model();
        active.status = Set(MirrorStatus::Finished.as_str().to_string());
        active.progress = Set(100);
        active.update(db.as_ref()).await.unwrap();
        // a still-pollable row that no longer decodes
        db.execute_unprepared(&format!("UPDATE mirrors SET priority = 'high' WHERE id = {}", broken.id))
            .await
            .unwrap();

        let jobs = Jobs::new(
            Arc::new(fx.component),
            Arc::new(MultiSyncComponent::new(db.clone(), MultiSyncConfig::default())),
            Arc::new(RepoFileIndexer::new(db.clone(), fx.git.clone())),
            Arc::new(MockSyncPeer::new(5)),
            2,
        );

        assert!(jobs.run_mirror_checks().await);
        let pushes = backend.push_mirrors.lock().unwrap().clone();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].name, "hf_model_someone_done");
    }

    #[tokio::test]
    async fn test_spawned_jobs_stop_on_cancel() {
        let fx = fixture().await;
        let db = fx.db.clone();
        let git = fx.git.clone();
        let jobs = Arc::new(Jobs::new(
            Arc::new(fx.component),
            Arc::new(MultiSyncComponent::new(db.clone(), MultiSyncConfig::default())),
            Arc::new(RepoFileIndexer::new(db, git)),
            Arc::new(MockSyncPeer::new(5)),
            2,
        ));

        let cancel = CancellationToken::new();
        let handles = jobs.spawn(Duration::from_millis(10), Some(Duration::from_millis(10)), cancel.clone());
        assert_eq!(handles.len(), 3);

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
