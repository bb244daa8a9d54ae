use crate::mirrorserver::MirrorTaskStatus;
use crate::types::{MirrorStatus, SyncStatus};

/// Map a backend task state and measured progress onto the mirror row and
/// its repository.
///
/// A finished task whose LFS objects have not all landed is `Incomplete`,
/// which the repository shows as failed until a later poll reaches 100.
pub fn map_task_status(task: MirrorTaskStatus, progress: i32) -> (MirrorStatus, SyncStatus) {
    match task {
        MirrorTaskStatus::Queued => (MirrorStatus::Waiting, SyncStatus::Pending),
        MirrorTaskStatus::Running => (MirrorStatus::Running, SyncStatus::InProgress),
        MirrorTaskStatus::Failed => (MirrorStatus::Failed, SyncStatus::Failed),
        MirrorTaskStatus::Finished if progress >= 100 => (MirrorStatus::Finished, SyncStatus::Completed),
        MirrorTaskStatus::Finished => (MirrorStatus::Incomplete, SyncStatus::Failed),
    }
}

/// `floor(existing / total * 100)`; an empty set counts as complete
pub fn progress_percent(existing: usize, total: usize) -> i32 {
    if total == 0 {
        return 100;
    }
    (existing.min(total) * 100 / total) as i32
}
