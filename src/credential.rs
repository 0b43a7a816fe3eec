//! 凭据存储：cookies 文件的保存、过期与复用
//!
//! 文件 mtime 即新鲜度，超过 TTL（默认 7 天）视为失效并删除。

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::browser::WorkerSession;
use crate::core::WorkerError;
use crate::extract::is_authenticated;

/// 凭据文件默认有效期
pub const CREDENTIAL_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// 凭据文件当前状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtifactState {
    Missing,
    /// 已过期（inspect 时已删除）
    Expired,
    Empty,
    Fresh,
}

/// ensure_logged_in 实际走的路径
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginPath {
    FreshLogin,
    Restored,
    AlreadyAuthenticated,
}

#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
    ttl: Duration,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ttl: CREDENTIAL_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 检查凭据文件；过期文件在这里删除
    pub fn inspect(&self) -> ArtifactState {
        let meta = match std::fs::metadata(&self.path) {
            Ok(m) => m,
            Err(_) => return ArtifactState::Missing,
        };
        let age = meta
            .modified()
            .ok()
            .and_then(|t| SystemTime::now().duration_since(t).ok())
            .unwrap_or(Duration::ZERO);
        if age > self.ttl {
            tracing::info!(path = %self.path.display(), "cookies 已过期（超过7天），需要重新登录");
            match std::fs::remove_file(&self.path) {
                Ok(()) => tracing::info!("已删除过期 cookies 文件"),
                Err(e) => tracing::warn!("删除过期 cookies 文件失败: {}", e),
            }
            return ArtifactState::Expired;
        }
        if meta.len() == 0 {
            ArtifactState::Empty
        } else {
            ArtifactState::Fresh
        }
    }

    pub fn load(&self) -> Result<Vec<u8>, WorkerError> {
        Ok(std::fs::read(&self.path)?)
    }

    /// 覆盖写入凭据
    pub fn save(&self, blob: &[u8]) -> Result<(), WorkerError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, blob)?;
        Ok(())
    }

    /// 检查当前页的登录状态，必要时重新登录或注入已保存的凭据
    pub async fn ensure_logged_in(
        &self,
        session: &mut dyn WorkerSession,
        login_url: &str,
    ) -> Result<LoginPath, WorkerError> {
        let header = session.login_marker().await?;
        let page_authenticated = is_authenticated(&header);
        let artifact = self.inspect();

        let need_login = !page_authenticated
            || matches!(artifact, ArtifactState::Missing | ArtifactState::Expired);

        if need_login {
            session.login(login_url).await?;
            let blob = session.export_credentials().await?;
            self.save(&blob)?;
            tracing::info!(path = %self.path.display(), "登录成功，cookies 已保存");
            Ok(LoginPath::FreshLogin)
        } else if artifact == ArtifactState::Fresh {
            let blob = self.load()?;
            session.import_credentials(&blob).await?;
            tracing::info!("使用已有的 cookies 登录成功");
            Ok(LoginPath::Restored)
        } else {
            tracing::info!("检测到已登录状态");
            Ok(LoginPath::AlreadyAuthenticated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::Post;
    use async_trait::async_trait;
    use filetime::FileTime;

    #[derive(Default)]
    struct ScriptedSession {
        header: String,
        logins: usize,
        imported: Vec<Vec<u8>>,
    }

    #[async_trait]
    impl WorkerSession for ScriptedSession {
        async fn navigate(&mut self, _url: &str) -> Result<(), WorkerError> {
            Ok(())
        }
        async fn login_marker(&mut self) -> Result<String, WorkerError> {
            Ok(self.header.clone())
        }
        async fn login(&mut self, _login_url: &str) -> Result<(), WorkerError> {
            self.logins += 1;
            Ok(())
        }
        async fn export_credentials(&mut self) -> Result<Vec<u8>, WorkerError> {
            Ok(b"[{\"name\":\"sid\",\"value\":\"new\"}]".to_vec())
        }
        async fn import_credentials(&mut self, blob: &[u8]) -> Result<(), WorkerError> {
            self.imported.push(blob.to_vec());
            Ok(())
        }
        async fn first_post(&mut self, _listing_url: &str) -> Result<Post, WorkerError> {
            unreachable!()
        }
        async fn reply(&mut self, _content: &str) -> Result<String, WorkerError> {
            unreachable!()
        }
        async fn check_in(&mut self, _url: &str) -> Result<String, WorkerError> {
            unreachable!()
        }
        async fn user_info(&mut self, _url: &str) -> Result<String, WorkerError> {
            unreachable!()
        }
        fn close(&mut self) {}
    }

    fn logged_in() -> ScriptedSession {
        ScriptedSession {
            header: "<div>欢迎 | 退出</div>".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_artifact_forces_login() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("cookies"));
        let mut session = logged_in();

        let path = store.ensure_logged_in(&mut session, "/login").await.unwrap();
        assert_eq!(path, LoginPath::FreshLogin);
        assert_eq!(session.logins, 1);
        assert!(std::fs::read(store.path()).unwrap().starts_with(b"[{"));
    }

    #[tokio::test]
    async fn test_expired_artifact_removed_and_relogin() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("cookies"));
        std::fs::write(store.path(), b"old").unwrap();
        let eight_days_ago = SystemTime::now() - Duration::from_secs(8 * 24 * 3600);
        filetime::set_file_mtime(store.path(), FileTime::from_system_time(eight_days_ago)).unwrap();

        assert_eq!(store.inspect(), ArtifactState::Expired);
        assert!(!store.path().exists());

        std::fs::write(store.path(), b"old").unwrap();
        filetime::set_file_mtime(store.path(), FileTime::from_system_time(eight_days_ago)).unwrap();
        let mut session = logged_in();
        let path = store.ensure_logged_in(&mut session, "/login").await.unwrap();
        assert_eq!(path, LoginPath::FreshLogin);
        assert_eq!(session.logins, 1);
        assert!(session.imported.is_empty());
        assert_ne!(std::fs::read(store.path()).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_fresh_artifact_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("cookies"));
        std::fs::write(store.path(), b"saved").unwrap();
        let six_days_ago = SystemTime::now() - Duration::from_secs(6 * 24 * 3600);
        filetime::set_file_mtime(store.path(), FileTime::from_system_time(six_days_ago)).unwrap();

        let mut session = logged_in();
        let path = store.ensure_logged_in(&mut session, "/login").await.unwrap();
        assert_eq!(path, LoginPath::Restored);
        assert_eq!(session.logins, 0);
        assert_eq!(session.imported, vec![b"saved".to_vec()]);
    }

    #[tokio::test]
    async fn test_logged_out_page_overrides_fresh_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("cookies"));
        std::fs::write(store.path(), b"saved").unwrap();

        let mut session = ScriptedSession {
            header: "<div>登录 | 注册</div>".into(),
            ..Default::default()
        };
        let path = store.ensure_logged_in(&mut session, "/login").await.unwrap();
        assert_eq!(path, LoginPath::FreshLogin);
        assert_eq!(session.logins, 1);
    }

    #[tokio::test]
    async fn test_empty_artifact_with_authenticated_page() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("cookies"));
        std::fs::write(store.path(), b"").unwrap();

        let mut session = logged_in();
        let path = store.ensure_logged_in(&mut session, "/login").await.unwrap();
        assert_eq!(path, LoginPath::AlreadyAuthenticated);
        assert_eq!(session.logins, 0);
        assert!(session.imported.is_empty());
    }
}
