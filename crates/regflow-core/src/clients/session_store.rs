//! Filesystem cookie persistence, one directory per task.

use async_trait::async_trait;
use regflow_models::{CookieRecord, SessionCookies};
use regflow_traits::{Result, SessionStore};
use std::path::PathBuf;

pub struct FsSessionStore {
    root: PathBuf,
}

impl FsSessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn cookies_path(&self, task_id: &str) -> PathBuf {
        self.root.join(task_id).join("cookies.json")
    }
}

#[async_trait]
impl SessionStore for FsSessionStore {
    async fn load(&self, task_id: &str) -> Result<Option<SessionCookies>> {
        let path = self.cookies_path(task_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn save(&self, task_id: &str, cookies: &[CookieRecord]) -> Result<()> {
        let path = self.cookies_path(task_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let snapshot = SessionCookies::new(task_id, cookies.to_vec());
        std::fs::write(path, serde_json::to_string_pretty(&snapshot)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSessionStore::new(dir.path());

        assert!(store.load("t1").await.unwrap().is_none());

        store
            .save(
                "t1",
                &[CookieRecord {
                    name: "session".to_string(),
                    value: "v".to_string(),
                    domain: ".cursor.sh".to_string(),
                    path: "/".to_string(),
                    expires: -1.0,
                    http_only: true,
                    secure: true,
                    same_site: Default::default(),
                }],
            )
            .await
            .unwrap();

        let loaded = store.load("t1").await.unwrap().unwrap();
        assert_eq!(loaded.task_id, "t1");
        assert_eq!(loaded.cookies.len(), 1);
        assert_eq!(loaded.cookies[0].name, "session");
    }
}
