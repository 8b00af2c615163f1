//! Persisted module policies
//!
//! Each module owns one [`PolicyStore`] backed by `<settings_dir>/<module>.json`.
//! Readers take an `Arc` snapshot; writers clone the current policy, apply and
//! validate their change, swap it in and rewrite the file in full.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use crate::models::Policy;
use crate::utils::errors::Result;
use crate::utils::logging::log_settings_operation;

/// In-memory policy of one module with its durable copy
pub struct PolicyStore<P: Policy> {
    module: &'static str,
    path: PathBuf,
    current: RwLock<Arc<P>>,
}

impl<P: Policy> PolicyStore<P> {
    /// Load the policy of `module` from `dir`.
    ///
    /// A missing file is created with defaults. An unreadable or malformed
    /// file, or one whose values are out of range, is logged and the defaults
    /// are used without overwriting it.
    pub async fn load(dir: &Path, module: &'static str) -> Self {
        let path = dir.join(format!("{}.json", module));
        let policy = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<P>(&raw) {
                Ok(policy) => match policy.validate() {
                    Ok(()) => {
                        info!(module = module, path = %path.display(), "Loaded module settings");
                        policy
                    }
                    Err(e) => {
                        log_settings_operation(module, "validate", false, Some(&e.to_string()));
                        P::default()
                    }
                },
                Err(e) => {
                    log_settings_operation(module, "parse", false, Some(&e.to_string()));
                    P::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let policy = P::default();
                match write_atomic(&path, &policy).await {
                    Ok(()) => info!(module = module, path = %path.display(), "Created default module settings"),
                    Err(e) => log_settings_operation(module, "create", false, Some(&e.to_string())),
                }
                policy
            }
            Err(e) => {
                log_settings_operation(module, "read", false, Some(&e.to_string()));
                P::default()
            }
        };

        Self::with_policy(path, module, policy)
    }

    /// Store seeded with `policy`, persisting to `path` on mutation
    pub fn with_policy(path: PathBuf, module: &'static str, policy: P) -> Self {
        Self {
            module,
            path,
            current: RwLock::new(Arc::new(policy)),
        }
    }

    pub fn module(&self) -> &'static str {
        self.module
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Immutable snapshot of the current policy
    pub async fn snapshot(&self) -> Arc<P> {
        self.current.read().await.clone()
    }

    /// Apply `change` to a copy of the policy.
    ///
    /// On success the copy replaces the current policy and is written to disk;
    /// on error nothing changes. A failed write is logged and does not undo the
    /// in-memory update.
    pub async fn update<T>(&self, change: impl FnOnce(&mut P) -> Result<T>) -> Result<T> {
        let mut current = self.current.write().await;
        let mut next = P::clone(&current);
        let outcome = change(&mut next)?;

        let next = Arc::new(next);
        *current = next.clone();

        match write_atomic(&self.path, next.as_ref()).await {
            Ok(()) => log_settings_operation(self.module, "save", true, None),
            Err(e) => log_settings_operation(self.module, "save", false, Some(&e.to_string())),
        }

        Ok(outcome)
    }
}

/// Write `policy` to a temporary sibling and rename it over `path`
async fn write_atomic<P: Policy>(path: &Path, policy: &P) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let json = serde_json::to_string_pretty(policy)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        warn!(path = %path.display(), error = %e, "Rename of settings file failed");
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    debug!(path = %path.display(), "Settings file written");
    Ok(())
}
