//! Shared fixtures for unit tests: an in-memory database and hand-written
//! fakes for the git server, mirror backend and sync peer.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use sea_orm::DatabaseConnection;

use crate::db::init_database;
use crate::error::{Result, ServerError};
use crate::gitserver::{
    CreateGitRepoRequest, GitRepoInfo, GitServer, TreeEntry, TreeRequest, ENTRY_TYPE_DIR, ENTRY_TYPE_FILE,
};
use crate::mirrorserver::{
    CreateMirrorRequest, CreatePushMirrorRequest, MirrorServer, MirrorTaskInfo, MirrorTaskStatus,
};
use crate::multisync::{PeerFile, PeerRepo, SyncPeer, SyncVersion, SyncVersionPage};
use crate::storage::{lfs_relative_path, StorageBackend, StorageError, StorageResult};
use crate::types::RepoType;

pub async fn memory_db() -> DatabaseConnection {
    init_database("sqlite::memory:").await.unwrap()
}

/// Deterministic 64-char oid for test LFS objects
pub fn fake_oid(seed: usize) -> String {
    format!("{:064x}", seed + 0xabcdef)
}

fn repo_key(repo_type: RepoType, namespace: &str, name: &str) -> String {
    format!("{}/{}", repo_type.git_owner(namespace), name)
}

#[derive(Default)]
pub struct MockGitServer {
    /// (repo key, dir) -> entries of that dir
    trees: Mutex<HashMap<(String, String), Vec<TreeEntry>>>,
    failing: Mutex<HashSet<String>>,
    pub created: Mutex<Vec<CreateGitRepoRequest>>,
    pub info_calls: AtomicUsize,
}

impl MockGitServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file, creating any missing parent directory entries
    pub fn add_file(&self, repo_type: RepoType, namespace: &str, name: &str, path: &str, size: i64, oid: Option<&str>) {
        let key = repo_key(repo_type, namespace, name);
        let mut trees = self.trees.lock().unwrap();

        let mut parent = String::new();
        let segments: Vec<&str> = path.split('/').collect();
        for (i, segment) in segments.iter().enumerate() {
            let full = if parent.is_empty() {
                segment.to_string()
            } else {
                format!("{}/{}", parent, segment)
            };
            let is_last = i == segments.len() - 1;
            let listing = trees.entry((key.clone(), parent.clone())).or_default();
            if !listing.iter().any(|e| e.path == full) {
                listing.push(TreeEntry {
                    name: segment.to_string(),
                    path: full.clone(),
                    entry_type: (if is_last { ENTRY_TYPE_FILE } else { ENTRY_TYPE_DIR }).to_string(),
                    size: if is_last { size } else { 0 },
                    sha: format!("sha-{}", full),
                    lfs_relative_path: if is_last {
                        oid.and_then(lfs_relative_path).unwrap_or_default()
                    } else {
                        String::new()
                    },
                });
            }
            parent = full;
        }
    }

    pub fn fail_repo(&self, repo_type: RepoType, namespace: &str, name: &str) {
        self.failing.lock().unwrap().insert(repo_key(repo_type, namespace, name));
    }
}

#[async_trait]
impl GitServer for MockGitServer {
    async fn get_repo_file_tree(&self, req: &TreeRequest) -> Result<Vec<TreeEntry>> {
        let key = repo_key(req.repo_type, &req.namespace, &req.name);
        if self.failing.lock().unwrap().contains(&key) {
            return Err(ServerError::GitServer(format!("tree of {} unavailable", key)));
        }
        Ok(self
            .trees
            .lock()
            .unwrap()
            .get(&(key, req.path.clone()))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_repo_info(&self, repo_type: RepoType, namespace: &str, name: &str) -> Result<GitRepoInfo> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        let key = repo_key(repo_type, namespace, name);
        Ok(GitRepoInfo {
            http_clone_url: format!("https://git.example.com/{}.git", key),
            ssh_clone_url: format!("git@git.example.com:{}.git", key),
            default_branch: "main".to_string(),
        })
    }

    async fn create_repo(&self, req: &CreateGitRepoRequest) -> Result<GitRepoInfo> {
        self.created.lock().unwrap().push(req.clone());
        self.get_repo_info(req.repo_type, &req.namespace, &req.name).await
    }
}

pub struct MockMirrorServer {
    next_task_id: AtomicI64,
    tasks: Mutex<HashMap<i64, MirrorTaskInfo>>,
    failing_tasks: Mutex<HashSet<i64>>,
    failing_push: Mutex<HashSet<String>>,
    pub reject_create: AtomicBool,
    pub created: Mutex<Vec<CreateMirrorRequest>>,
    pub push_mirrors: Mutex<Vec<CreatePushMirrorRequest>>,
}

impl MockMirrorServer {
    pub fn new() -> Self {
        Self {
            next_task_id: AtomicI64::new(100),
            tasks: Mutex::new(HashMap::new()),
            failing_tasks: Mutex::new(HashSet::new()),
            failing_push: Mutex::new(HashSet::new()),
            reject_create: AtomicBool::new(false),
            created: Mutex::new(Vec::new()),
            push_mirrors: Mutex::new(Vec::new()),
        }
    }

    pub fn set_task(&self, task_id: i64, status: MirrorTaskStatus) {
        self.tasks.lock().unwrap().insert(
            task_id,
            MirrorTaskInfo {
                status,
                message: format!("task {} {:?}", task_id, status),
            },
        );
    }

    pub fn fail_task(&self, task_id: i64) {
        self.failing_tasks.lock().unwrap().insert(task_id);
    }

    pub fn fail_push(&self, name: &str) {
        self.failing_push.lock().unwrap().insert(name.to_string());
    }
}

#[async_trait]
impl MirrorServer for MockMirrorServer {
    async fn create_mirror_repo(&self, req: &CreateMirrorRequest) -> Result<i64> {
        if self.reject_create.load(Ordering::SeqCst) {
            return Err(ServerError::MirrorBackend("mirror creation rejected".to_string()));
        }
        let task_id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
        self.created.lock().unwrap().push(req.clone());
        self.set_task(task_id, MirrorTaskStatus::Queued);
        Ok(task_id)
    }

    async fn get_mirror_task_info(&self, task_id: i64) -> Result<MirrorTaskInfo> {
        if self.failing_tasks.lock().unwrap().contains(&task_id) {
            return Err(ServerError::MirrorBackend(format!("task {} unavailable", task_id)));
        }
        self.tasks
            .lock()
            .unwrap()
            .get(&task_id)
            .cloned()
            .ok_or_else(|| ServerError::MirrorBackend(format!("task {} not found", task_id)))
    }

    async fn create_push_mirror(&self, req: &CreatePushMirrorRequest) -> Result<()> {
        if self.failing_push.lock().unwrap().contains(&req.name) {
            return Err(ServerError::MirrorBackend(format!("push mirror for {} rejected", req.name)));
        }
        self.push_mirrors.lock().unwrap().push(req.clone());
        Ok(())
    }
}

/// A peer serving a fixed catalog, paged like the real endpoint
pub struct MockSyncPeer {
    versions: Mutex<Vec<SyncVersion>>,
    page_size: usize,
    /// (repo type, peer path) -> metadata
    repos: Mutex<HashMap<(String, String), PeerRepo>>,
    files: Mutex<HashMap<String, Vec<PeerFile>>>,
    pub fail_latest: AtomicBool,
    pub latest_calls: AtomicUsize,
    pub info_calls: AtomicUsize,
    /// Milliseconds every `file_list` call takes
    pub file_list_delay_ms: AtomicU64,
}

impl MockSyncPeer {
    pub fn new(page_size: usize) -> Self {
        Self {
            versions: Mutex::new(Vec::new()),
            page_size,
            repos: Mutex::new(HashMap::new()),
            files: Mutex::new(HashMap::new()),
            fail_latest: AtomicBool::new(false),
            latest_calls: AtomicUsize::new(0),
            info_calls: AtomicUsize::new(0),
            file_list_delay_ms: AtomicU64::new(0),
        }
    }

    /// Publish a repository under a new version number
    pub fn publish(&self, version: i64, repo_type: RepoType, path: &str) {
        self.versions.lock().unwrap().push(SyncVersion {
            version,
            source_id: 1,
            repo_path: path.to_string(),
            repo_type: repo_type.as_str().to_string(),
            last_modified_at: "2024-05-01T00:00:00Z".to_string(),
            change_log: String::new(),
        });
        let (_, name) = path.split_once('/').unwrap_or(("", path));
        self.repos.lock().unwrap().insert(
            (repo_type.as_str().to_string(), path.to_string()),
            PeerRepo {
                path: path.to_string(),
                nickname: name.to_string(),
                description: format!("{} from peer", name),
                default_branch: "main".to_string(),
                user: crate::multisync::PeerUser {
                    nickname: "Peer Owner".to_string(),
                    email: "owner@peer.example.com".to_string(),
                },
                base_model: if repo_type == RepoType::Model {
                    Some("base/llm".to_string())
                } else {
                    None
                },
                ..Default::default()
            },
        );
    }

    pub fn set_repo(&self, repo_type: RepoType, repo: PeerRepo) {
        self.repos
            .lock()
            .unwrap()
            .insert((repo_type.as_str().to_string(), repo.path.clone()), repo);
    }

    /// Drop a repository's metadata so info calls for it fail
    pub fn forget(&self, repo_type: RepoType, path: &str) {
        self.repos
            .lock()
            .unwrap()
            .remove(&(repo_type.as_str().to_string(), path.to_string()));
    }

    pub fn set_files(&self, path: &str, files: Vec<PeerFile>) {
        self.files.lock().unwrap().insert(path.to_string(), files);
    }

    async fn info(&self, repo_type: &str, v: &SyncVersion) -> Result<PeerRepo> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        self.repos
            .lock()
            .unwrap()
            .get(&(repo_type.to_string(), v.repo_path.clone()))
            .cloned()
            .ok_or_else(|| ServerError::Peer(format!("{} {} not found", repo_type, v.repo_path)))
    }
}

#[async_trait]
impl SyncPeer for MockSyncPeer {
    async fn latest(&self, cursor: i64) -> Result<SyncVersionPage> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_latest.load(Ordering::SeqCst) {
            return Err(ServerError::Peer("peer unreachable".to_string()));
        }
        let mut after: Vec<SyncVersion> = self
            .versions
            .lock()
            .unwrap()
            .iter()
            .filter(|v| v.version > cursor)
            .cloned()
            .collect();
        after.sort_by_key(|v| v.version);
        let has_more = after.len() > self.page_size;
        after.truncate(self.page_size);
        Ok(SyncVersionPage {
            versions: after,
            has_more,
        })
    }

    async fn model_info(&self, v: &SyncVersion) -> Result<PeerRepo> {
        self.info("model", v).await
    }

    async fn dataset_info(&self, v: &SyncVersion) -> Result<PeerRepo> {
        self.info("dataset", v).await
    }

    async fn code_info(&self, v: &SyncVersion) -> Result<PeerRepo> {
        self.info("code", v).await
    }

    async fn read_me_data(&self, v: &SyncVersion) -> Result<String> {
        Ok(format!("# {}", v.repo_path))
    }

    async fn file_list(&self, v: &SyncVersion) -> Result<Vec<PeerFile>> {
        let delay = self.file_list_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(&v.repo_path)
            .cloned()
            .unwrap_or_default())
    }
}

/// In-memory blob store with injectable failures
#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<BTreeMap<(String, String), Bytes>>,
    broken: Mutex<HashSet<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an LFS object under its sharded key
    pub fn put_lfs(&self, oid: &str) {
        let key = lfs_relative_path(oid).unwrap();
        self.objects
            .lock()
            .unwrap()
            .insert((crate::storage::namespaces::LFS.to_string(), key), Bytes::from_static(b"lfs"));
    }

    /// Make every lookup of this oid fail with a non-404 error
    pub fn break_lfs(&self, oid: &str) {
        self.broken.lock().unwrap().insert(lfs_relative_path(oid).unwrap());
    }

    fn check(&self, key: &str) -> StorageResult<()> {
        if self.broken.lock().unwrap().contains(key) {
            return Err(StorageError::Other(format!("backend unavailable for {}", key)));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn put(&self, namespace: &str, key: &str, data: Bytes) -> StorageResult<()> {
        self.check(key)?;
        self.objects
            .lock()
            .unwrap()
            .insert((namespace.to_string(), key.to_string()), data);
        Ok(())
    }

    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        self.check(key)?;
        Ok(self
            .objects
            .lock()
            .unwrap()
            .contains_key(&(namespace.to_string(), key.to_string())))
    }

    async fn presigned_url(&self, namespace: &str, key: &str, _expires_in: Duration) -> StorageResult<String> {
        self.check(key)?;
        Ok(format!("memory://{}/{}", namespace, key))
    }
}
