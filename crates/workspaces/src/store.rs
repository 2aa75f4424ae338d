//! In-memory workspace registry with directory lifecycle and TTL expiry.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use {
    tokio::{
        sync::{Mutex, Notify, RwLock},
        task::JoinHandle,
    },
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    types::{CreateOptions, Workspace},
};

/// Default workspace TTL: 10 minutes.
pub const DEFAULT_TIMEOUT_MS: u64 = 600_000;

/// Sweeper poll interval when no workspace has a pending deadline.
const IDLE_POLL_MS: u64 = 60_000;

/// Default base directory for workspace roots: `<tmp>/vibebox`.
#[must_use]
pub fn default_base_dir() -> PathBuf {
    std::env::temp_dir().join("vibebox")
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Registry of live workspaces.
///
/// Single owner of the id→workspace map and of directory existence: every
/// workspace directory is created by [`create`](Self::create) and removed by
/// [`teardown`](Self::teardown), either explicitly or from the expiry
/// sweeper. Construct a fresh store per test for isolation; there is no
/// ambient global registry.
pub struct WorkspaceStore {
    base_dir: PathBuf,
    workspaces: RwLock<HashMap<String, Workspace>>,
    sweeper_handle: Mutex<Option<JoinHandle<()>>>,
    wake_notify: Arc<Notify>,
    running: RwLock<bool>,
}

impl WorkspaceStore {
    /// Create a store rooting all workspaces under `base_dir`.
    pub fn new(base_dir: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            base_dir,
            workspaces: RwLock::new(HashMap::new()),
            sweeper_handle: Mutex::new(None),
            wake_notify: Arc::new(Notify::new()),
            running: RwLock::new(false),
        })
    }

    /// Provision a new workspace: fresh id, directory created recursively,
    /// metadata registered, expiry armed.
    pub async fn create(&self, options: CreateOptions) -> Result<Workspace> {
        let id = uuid::Uuid::new_v4().to_string();
        let root_path = self.base_dir.join(&id);

        tokio::fs::create_dir_all(&root_path)
            .await
            .map_err(|source| Error::Provisioning {
                path: root_path.clone(),
                source,
            })?;

        let workspace = Workspace {
            id: id.clone(),
            root_path,
            created_at: now_ms(),
            timeout_ms: options.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
            reserved_ports: options.ports,
        };

        self.workspaces
            .write()
            .await
            .insert(id, workspace.clone());

        // Wake the sweeper so it picks up the new deadline.
        self.wake_notify.notify_one();

        info!(
            id = %workspace.id,
            path = %workspace.root_path.display(),
            timeout_ms = workspace.timeout_ms,
            "workspace created"
        );
        Ok(workspace)
    }

    /// Pure lookup, no side effects.
    pub async fn get(&self, id: &str) -> Option<Workspace> {
        self.workspaces.read().await.get(id).cloned()
    }

    /// All currently registered workspaces.
    pub async fn list_active(&self) -> Vec<Workspace> {
        self.workspaces.read().await.values().cloned().collect()
    }

    /// Remove the registry entry and the directory tree. Idempotent: a
    /// no-op when the id is already gone.
    ///
    /// The entry is dropped before the directory is removed so expiry fires
    /// exactly once even when removal fails; a failed removal is logged and
    /// the directory may leak.
    pub async fn teardown(&self, id: &str) {
        let Some(workspace) = self.workspaces.write().await.remove(id) else {
            return;
        };

        if let Err(e) = tokio::fs::remove_dir_all(&workspace.root_path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(
                id,
                path = %workspace.root_path.display(),
                error = %e,
                "failed to remove workspace directory"
            );
        }

        info!(id, "workspace torn down");
    }

    /// Start the expiry sweeper loop.
    pub async fn start(self: &Arc<Self>) {
        *self.running.write().await = true;

        let store = Arc::clone(self);
        let handle = tokio::spawn(async move {
            store.sweep_loop().await;
        });

        *self.sweeper_handle.lock().await = Some(handle);
    }

    /// Stop the expiry sweeper. Pending deadlines are abandoned, not fired.
    pub async fn stop(&self) {
        *self.running.write().await = false;
        self.wake_notify.notify_one();

        let mut handle = self.sweeper_handle.lock().await;
        if let Some(h) = handle.take() {
            h.abort();
        }
        debug!("workspace sweeper stopped");
    }

    // ── Internal ────────────────────────────────────────────────────────

    async fn sweep_loop(self: &Arc<Self>) {
        loop {
            if !*self.running.read().await {
                break;
            }

            let sleep_ms = self.ms_until_next_expiry().await;

            if sleep_ms > 0 {
                let notify = Arc::clone(&self.wake_notify);
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_millis(sleep_ms)) => {},
                    () = notify.notified() => {
                        continue;
                    },
                }
            }

            if !*self.running.read().await {
                break;
            }

            self.teardown_expired().await;
        }
    }

    async fn ms_until_next_expiry(&self) -> u64 {
        let workspaces = self.workspaces.read().await;
        let now = now_ms();
        workspaces
            .values()
            .map(|w| w.expires_at().saturating_sub(now))
            .min()
            .unwrap_or(IDLE_POLL_MS)
    }

    async fn teardown_expired(&self) {
        let now = now_ms();
        let expired: Vec<String> = {
            let workspaces = self.workspaces.read().await;
            workspaces
                .values()
                .filter(|w| w.expires_at() <= now)
                .map(|w| w.id.clone())
                .collect()
        };

        // A workspace can expire while a command still runs against it; the
        // command is left alone and its filesystem ops fail at the OS level.
        for id in expired {
            debug!(id = %id, "workspace expired");
            self.teardown(&id).await;
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, Arc<WorkspaceStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkspaceStore::new(dir.path().join("workspaces"));
        (dir, store)
    }

    #[test]
    fn test_default_base_dir_under_tmp() {
        let dir = default_base_dir();
        assert!(dir.starts_with(std::env::temp_dir()));
        assert!(dir.ends_with("vibebox"));
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (_dir, store) = test_store();
        let ws = store.create(CreateOptions::default()).await.unwrap();

        assert!(ws.root_path.is_dir());
        assert_eq!(ws.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert!(ws.reserved_ports.is_empty());

        let found = store.get(&ws.id).await.unwrap();
        assert_eq!(found.id, ws.id);
        assert_eq!(found.root_path, ws.root_path);
    }

    #[tokio::test]
    async fn test_create_with_options() {
        let (_dir, store) = test_store();
        let ws = store
            .create(CreateOptions {
                timeout_ms: Some(30_000),
                ports: vec![3000, 8080],
            })
            .await
            .unwrap();

        assert_eq!(ws.timeout_ms, 30_000);
        assert_eq!(ws.reserved_ports, vec![3000, 8080]);
    }

    #[tokio::test]
    async fn test_get_unknown_returns_none() {
        let (_dir, store) = test_store();
        assert!(store.get("no-such-workspace").await.is_none());
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let (_dir, store) = test_store();
        let a = store.create(CreateOptions::default()).await.unwrap();
        let b = store.create(CreateOptions::default()).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_ne!(a.root_path, b.root_path);
    }

    #[tokio::test]
    async fn test_list_active() {
        let (_dir, store) = test_store();
        assert!(store.list_active().await.is_empty());

        let a = store.create(CreateOptions::default()).await.unwrap();
        let b = store.create(CreateOptions::default()).await.unwrap();
        let mut ids: Vec<String> = store
            .list_active()
            .await
            .into_iter()
            .map(|w| w.id)
            .collect();
        ids.sort();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_teardown_removes_entry_and_directory() {
        let (_dir, store) = test_store();
        let ws = store.create(CreateOptions::default()).await.unwrap();

        store.teardown(&ws.id).await;
        assert!(store.get(&ws.id).await.is_none());
        assert!(!ws.root_path.exists());
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let (_dir, store) = test_store();
        let ws = store.create(CreateOptions::default()).await.unwrap();

        store.teardown(&ws.id).await;
        store.teardown(&ws.id).await;
        store.teardown("never-existed").await;
        assert!(store.get(&ws.id).await.is_none());
    }

    #[tokio::test]
    async fn test_provisioning_failure() {
        let dir = tempfile::tempdir().unwrap();
        // Base dir is a file, so creating any workspace directory fails.
        let base = dir.path().join("blocked");
        std::fs::write(&base, b"not a directory").unwrap();

        let store = WorkspaceStore::new(base);
        let err = store.create(CreateOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::Provisioning { .. }));
    }

    #[tokio::test]
    async fn test_expiry_tears_down_workspace() {
        let (_dir, store) = test_store();
        store.start().await;

        let ws = store
            .create(CreateOptions {
                timeout_ms: Some(50),
                ports: Vec::new(),
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(store.get(&ws.id).await.is_none());
        assert!(!ws.root_path.exists());
        store.stop().await;
    }

    #[tokio::test]
    async fn test_expiry_leaves_live_workspaces_alone() {
        let (_dir, store) = test_store();
        store.start().await;

        let short = store
            .create(CreateOptions {
                timeout_ms: Some(50),
                ports: Vec::new(),
            })
            .await
            .unwrap();
        let long = store.create(CreateOptions::default()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(store.get(&short.id).await.is_none());
        assert!(store.get(&long.id).await.is_some());
        assert!(long.root_path.is_dir());
        store.stop().await;
    }
}
