//! In-cluster service account credentials.

use std::path::{Path, PathBuf};

use url::Url;

use super::kubernetes::ClientBuildError;

/// Where the kubelet mounts the pod's service account.
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

const HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";
const PORT_ENV: &str = "KUBERNETES_SERVICE_PORT";

#[derive(Debug, Clone)]
pub struct InClusterConfig {
    pub api_server: Url,
    pub token: String,
    pub ca_cert_pem: Vec<u8>,
    /// Namespace the pod runs in, when mounted.
    pub namespace: Option<String>,
}

impl InClusterConfig {
    /// Load from the standard service account mount and service env vars.
    pub fn load() -> Result<Self, ClientBuildError> {
        let host = std::env::var(HOST_ENV).map_err(|_| ClientBuildError::MissingEnv(HOST_ENV))?;
        let port = std::env::var(PORT_ENV).map_err(|_| ClientBuildError::MissingEnv(PORT_ENV))?;
        Self::load_from(Path::new(SERVICE_ACCOUNT_DIR), &host, &port)
    }

    /// Load credentials from `dir` for the API server at `host:port`.
    pub fn load_from(dir: &Path, host: &str, port: &str) -> Result<Self, ClientBuildError> {
        let api_server = api_server_url(host, port)?;

        let token = read(dir.join("token"))?;
        let token = String::from_utf8_lossy(&token).trim().to_string();
        let ca_cert_pem = read(dir.join("ca.crt"))?;
        let namespace = read(dir.join("namespace"))
            .ok()
            .map(|ns| String::from_utf8_lossy(&ns).trim().to_string())
            .filter(|ns| !ns.is_empty());

        Ok(Self {
            api_server,
            token,
            ca_cert_pem,
            namespace,
        })
    }
}

fn api_server_url(host: &str, port: &str) -> Result<Url, ClientBuildError> {
    // IPv6 service hosts need brackets.
    let raw = if host.contains(':') && !host.starts_with('[') {
        format!("https://[{host}]:{port}")
    } else {
        format!("https://{host}:{port}")
    };
    Url::parse(&raw).map_err(|e| ClientBuildError::InvalidUrl(format!("{raw}: {e}")))
}

fn read(path: PathBuf) -> Result<Vec<u8>, ClientBuildError> {
    std::fs::read(&path).map_err(|source| ClientBuildError::ReadFile { path, source })
}
