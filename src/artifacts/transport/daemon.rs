//! TCP daemon serving every repository below a root directory over `bit://`
//!
//! Each accepted connection runs one conversation in its own task. With an
//! access token configured, requests must carry it (as a token or as the
//! password of basic credentials) or they get an `ERR` packet back.

use crate::artifacts::core::errors::BitError;
use crate::artifacts::transport::protocol::ServiceRequest;
use crate::artifacts::transport::server::{ServedRepository, serve};
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct Daemon {
    root: Arc<Path>,
    token: Option<Arc<str>>,
}

impl Daemon {
    pub fn new(root: PathBuf, token: Option<String>) -> Self {
        Self {
            root: root.into(),
            token: token.map(Into::into),
        }
    }

    pub async fn bind(addr: &str) -> anyhow::Result<TcpListener> {
        TcpListener::bind(addr)
            .await
            .map_err(|error| BitError::TransportFailure(format!("cannot listen on {addr}: {error}")).into())
    }

    /// Accept connections until the listener fails
    pub async fn run(self, listener: TcpListener) -> anyhow::Result<()> {
        tracing::info!(
            target: "bit::daemon",
            addr = ?listener.local_addr().ok(),
            root = ?self.root,
            "daemon listening"
        );

        loop {
            let (socket, peer) = listener.accept().await?;
            let daemon = self.clone();

            tokio::spawn(async move {
                if let Err(error) = serve(socket, |request| daemon.open(request, peer)).await {
                    tracing::warn!(target: "bit::daemon", %peer, %error, "connection failed");
                }
            });
        }
    }

    fn open(&self, request: &ServiceRequest, peer: SocketAddr) -> anyhow::Result<ServedRepository> {
        if let Some(token) = &self.token
            && request.credentials.secret() != Some(token.as_ref())
        {
            tracing::warn!(target: "bit::daemon", %peer, path = %request.path, "access denied");
            return Err(BitError::TransportFailure("access denied".to_string()).into());
        }

        let relative = Path::new(request.path.trim_start_matches('/'));
        if !relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
        {
            return Err(BitError::TransportFailure(format!(
                "invalid repository path '{}'",
                request.path
            ))
            .into());
        }

        tracing::debug!(target: "bit::daemon", %peer, service = %request.service, path = %request.path, "request");
        ServedRepository::open(&self.root.join(relative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::transport::credentials::Credentials;
    use crate::artifacts::transport::protocol::Service;
    use assert_fs::TempDir;
    use rstest::rstest;

    fn peer() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 40000))
    }

    fn request(path: &str, credentials: Credentials) -> ServiceRequest {
        ServiceRequest {
            service: Service::UploadPack,
            path: path.to_string(),
            credentials,
        }
    }

    fn root_with_repository() -> TempDir {
        let root = TempDir::new().unwrap();
        let git_dir = root.path().join("repo").join(".git");
        std::fs::create_dir_all(&git_dir).unwrap();
        std::fs::write(git_dir.join("HEAD"), "ref: refs/heads/master\n").unwrap();
        root
    }

    #[rstest]
    #[case::no_credentials(Credentials::NoAuth, false)]
    #[case::wrong_token(Credentials::Token("nope".into()), false)]
    #[case::right_token(Credentials::Token("s3cret".into()), true)]
    #[case::password(Credentials::UsernamePassword { username: "ann".into(), password: "s3cret".into() }, true)]
    fn tokens_gate_access(#[case] credentials: Credentials, #[case] allowed: bool) {
        let root = root_with_repository();
        let daemon = Daemon::new(root.path().to_path_buf(), Some("s3cret".to_string()));

        let result = daemon.open(&request("repo", credentials), peer());
        assert_eq!(result.is_ok(), allowed);
    }

    #[rstest]
    #[case("../escape")]
    #[case("repo/../../escape")]
    fn paths_cannot_leave_the_root(#[case] path: &str) {
        let root = root_with_repository();
        let daemon = Daemon::new(root.path().to_path_buf(), None);

        let error = daemon.open(&request(path, Credentials::NoAuth), peer()).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<BitError>(),
            Some(BitError::TransportFailure(_))
        ));
    }

    #[test]
    fn repositories_resolve_below_the_root() {
        let root = root_with_repository();
        let daemon = Daemon::new(root.path().to_path_buf(), None);

        let served = daemon.open(&request("/repo", Credentials::NoAuth), peer()).unwrap();
        assert_eq!(served.git_dir(), root.path().join("repo").join(".git"));
    }
}
