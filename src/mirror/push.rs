use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, Set};

use super::MirrorComponent;
use crate::db::entities::mirror;
use crate::db::store::now_secs;
use crate::error::Result;
use crate::mirrorserver::{CreatePushMirrorRequest, MirrorTaskStatus};
use crate::types::MirrorStatus;

impl MirrorComponent {
    /// Create a push mirror for every mirror that is finished locally and
    /// whose inbound task has finished. Safe to re-run: only mirrors still
    /// flagged as not promoted are considered.
    pub async fn create_push_mirror_for_finished_mirror_task(&self) -> Result<()> {
        // incomplete mirrors are still missing LFS objects
        let pending = mirror::Entity::find()
            .filter(mirror::Column::Status.eq(MirrorStatus::Finished.as_str()))
            .filter(mirror::Column::PushMirrorCreated.eq(false))
            .order_by_asc(mirror::Column::Id)
            .all(self.db.as_ref())
            .await?;

        for m in pending {
            let mirror_id = m.id;
            match self.promote(m).await {
                Ok(true) => tracing::info!(mirror_id, "Created push mirror"),
                Ok(false) => {}
                Err(e) => tracing::error!(mirror_id, error = %e, "Failed to create push mirror"),
            }
        }
        Ok(())
    }

    async fn promote(&self, m: mirror::Model) -> Result<bool> {
        let task = self.backend.get_mirror_task_info(m.mirror_task_id).await?;
        if task.status != MirrorTaskStatus::Finished {
            return Ok(false);
        }

        self.backend
            .create_push_mirror(&CreatePushMirrorRequest {
                name: m.local_repo_path.clone(),
                push_url: m.push_url.clone(),
                username: m.push_username.clone(),
                access_token: m.push_access_token.clone(),
                interval: self.config.push_mirror_interval.clone(),
            })
            .await?;

        let mut active = m.into_active_model();
        active.push_mirror_created = Set(true);
        active.updated_at = Set(now_secs());
        active.update(self.db.as_ref()).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{fixture, request};
    use super::*;
    use crate::testutil::fake_oid;
    use crate::types::RepoType;

    #[tokio::test]
    async fn test_only_finished_mirrors_are_promoted_once() {
        let fx = fixture().await;
        let done = fx
            .component
            .create_mirror_repo(request(fx.source_id, "someone", "done"))
            .await
            .unwrap();
        let busy = fx
            .component
            .create_mirror_repo(request(fx.source_id, "someone", "busy"))
            .await
            .unwrap();
        fx.backend.set_task(done.mirror_task_id, MirrorTaskStatus::Finished);
        fx.backend.set_task(busy.mirror_task_id, MirrorTaskStatus::Running);
        fx.component.check_mirror_progress().await.unwrap();

        fx.component.create_push_mirror_for_finished_mirror_task().await.unwrap();
        fx.component.create_push_mirror_for_finished_mirror_task().await.unwrap();

        let pushes = fx.backend.push_mirrors.lock().unwrap().clone();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].name, "hf_model_someone_done");
        assert_eq!(pushes[0].push_url, done.push_url);
        assert_eq!(pushes[0].username, "mirror-bot");
        assert_eq!(pushes[0].access_token, "push-secret");
        assert_eq!(pushes[0].interval, "8h0m0s");

        let done = mirror::Entity::find_by_id(done.id).one(fx.db.as_ref()).await.unwrap().unwrap();
        assert!(done.push_mirror_created);
        let busy = mirror::Entity::find_by_id(busy.id).one(fx.db.as_ref()).await.unwrap().unwrap();
        assert!(!busy.push_mirror_created);
    }

    #[tokio::test]
    async fn test_backend_failure_skips_to_next_mirror() {
        let fx = fixture().await;
        let rejected = fx
            .component
            .create_mirror_repo(request(fx.source_id, "someone", "rejected"))
            .await
            .unwrap();
        let unknown = fx
            .component
            .create_mirror_repo(request(fx.source_id, "someone", "unknown"))
            .await
            .unwrap();
        let accepted = fx
            .component
            .create_mirror_repo(request(fx.source_id, "someone", "accepted"))
            .await
            .unwrap();
        for m in [&rejected, &accepted] {
            fx.backend.set_task(m.mirror_task_id, MirrorTaskStatus::Finished);
        }
        fx.backend.fail_push("hf_model_someone_rejected");
        fx.backend.fail_task(unknown.mirror_task_id);
        fx.component.check_mirror_progress().await.unwrap();

        fx.component.create_push_mirror_for_finished_mirror_task().await.unwrap();

        let flags: Vec<bool> = mirror::Entity::find()
            .order_by_asc(mirror::Column::Id)
            .all(fx.db.as_ref())
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.push_mirror_created)
            .collect();
        assert_eq!(flags, vec![false, false, true]);
    }

    #[tokio::test]
    async fn test_incomplete_mirror_waits_for_lfs_objects() {
        let fx = fixture().await;
        let partial = fx
            .component
            .create_mirror_repo(request(fx.source_id, "someone", "partial"))
            .await
            .unwrap();
        let (first, second) = (fake_oid(1), fake_oid(2));
        fx.git.add_file(RepoType::Model, "AIWizards", "partial", "a.bin", 10, Some(&first));
        fx.git.add_file(RepoType::Model, "AIWizards", "partial", "b.bin", 10, Some(&second));
        fx.storage.put_lfs(&first);
        fx.backend.set_task(partial.mirror_task_id, MirrorTaskStatus::Finished);

        fx.component.check_mirror_progress().await.unwrap();
        fx.component.create_push_mirror_for_finished_mirror_task().await.unwrap();

        let m = mirror::Entity::find_by_id(partial.id).one(fx.db.as_ref()).await.unwrap().unwrap();
        assert_eq!(m.mirror_status(), Some(MirrorStatus::Incomplete));
        assert_eq!(m.progress, 50);
        assert!(!m.push_mirror_created);
        assert!(fx.backend.push_mirrors.lock().unwrap().is_empty());

        fx.storage.put_lfs(&second);
        fx.component.check_mirror_progress().await.unwrap();
        fx.component.create_push_mirror_for_finished_mirror_task().await.unwrap();

        let m = mirror::Entity::find_by_id(partial.id).one(fx.db.as_ref()).await.unwrap().unwrap();
        assert_eq!(m.mirror_status(), Some(MirrorStatus::Finished));
        assert!(m.push_mirror_created);
        assert_eq!(fx.backend.push_mirrors.lock().unwrap().len(), 1);
    }
}
