//! REST client creating `Rensv` objects.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, instrument};
use url::Url;

use rensv_core::{AppliedResource, ApplyError, Applier, Task};

use super::in_cluster::InClusterConfig;
use super::resource::{Rensv, Status};

#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("failed to read {}: {source}", .path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid API server URL: {0}")]
    InvalidUrl(String),

    #[error("invalid CA certificate: {0}")]
    Certificate(String),

    #[error("failed to build HTTP client: {0}")]
    Http(String),
}

/// Where and how resources are created.
#[derive(Debug, Clone)]
pub struct KubeConfig {
    pub api_server: Url,
    pub token: Option<String>,
    pub ca_cert_pem: Option<Vec<u8>>,
    pub namespace: String,
    pub api_group: String,
    pub api_version: String,
    pub resource: String,
    pub kind: String,
    pub timeout: Duration,
}

impl KubeConfig {
    /// Unauthenticated config for `api_server` with the default resource coordinates.
    pub fn new(api_server: Url) -> Self {
        Self {
            api_server,
            token: None,
            ca_cert_pem: None,
            namespace: "default".to_string(),
            api_group: "rensv.eccnetlab.io".to_string(),
            api_version: "v1".to_string(),
            resource: "rensvs".to_string(),
            kind: "Rensv".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Config using the pod's service account.
    pub fn in_cluster() -> Result<Self, ClientBuildError> {
        Ok(Self::from(InClusterConfig::load()?))
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_api_group(mut self, group: impl Into<String>, version: impl Into<String>) -> Self {
        self.api_group = group.into();
        self.api_version = version.into();
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>, kind: impl Into<String>) -> Self {
        self.resource = resource.into();
        self.kind = kind.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `apiVersion` field value, e.g. `rensv.eccnetlab.io/v1`.
    pub fn group_version(&self) -> String {
        format!("{}/{}", self.api_group, self.api_version)
    }

    /// Collection URL the objects are POSTed to.
    pub fn collection_url(&self) -> Result<Url, ClientBuildError> {
        let path = format!(
            "apis/{}/{}/namespaces/{}/{}",
            self.api_group, self.api_version, self.namespace, self.resource
        );
        let mut base = self.api_server.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        base.join(&path)
            .map_err(|e| ClientBuildError::InvalidUrl(format!("{path}: {e}")))
    }
}

impl From<InClusterConfig> for KubeConfig {
    fn from(in_cluster: InClusterConfig) -> Self {
        Self {
            token: Some(in_cluster.token),
            ca_cert_pem: Some(in_cluster.ca_cert_pem),
            ..Self::new(in_cluster.api_server)
        }
    }
}

/// Creates one `Rensv` object per task.
#[derive(Debug, Clone)]
pub struct KubeApplier {
    client: reqwest::Client,
    collection_url: Url,
    config: KubeConfig,
}

impl KubeApplier {
    pub fn new(config: KubeConfig) -> Result<Self, ClientBuildError> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("rensv-relay/", env!("CARGO_PKG_VERSION")));

        if let Some(pem) = &config.ca_cert_pem {
            let cert = reqwest::Certificate::from_pem(pem)
                .map_err(|e| ClientBuildError::Certificate(e.to_string()))?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| ClientBuildError::Http(e.to_string()))?;

        Ok(Self {
            client,
            collection_url: config.collection_url()?,
            config,
        })
    }
}

#[async_trait]
impl Applier for KubeApplier {
    #[instrument(skip(self, task), fields(server_name = %task.server_name, namespace = %self.config.namespace))]
    async fn apply(&self, task: &Task) -> Result<AppliedResource, ApplyError> {
        let body = Rensv::for_task(task, self.config.group_version(), &self.config.kind);

        let mut request = self.client.post(self.collection_url.clone()).json(&body);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApplyError::transport(e.to_string()))?;
        let status = response.status();
        debug!(%status, "API server responded");

        if status.is_success() {
            let created: Rensv = response
                .json()
                .await
                .map_err(|e| ApplyError::Decode(e.to_string()))?;
            return Ok(AppliedResource {
                name: if created.metadata.name.is_empty() {
                    task.server_name.clone()
                } else {
                    created.metadata.name
                },
                namespace: created
                    .metadata
                    .namespace
                    .unwrap_or_else(|| self.config.namespace.clone()),
                uid: created.metadata.uid,
                resource_version: created.metadata.resource_version,
            });
        }

        let text = response.text().await.unwrap_or_default();
        Err(classify(status, &text, &task.server_name))
    }
}

fn classify(status: StatusCode, body: &str, name: &str) -> ApplyError {
    let message = serde_json::from_str::<Status>(body)
        .ok()
        .map(|s| s.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        StatusCode::CONFLICT => ApplyError::Conflict {
            name: name.to_string(),
        },
        s if s.is_client_error() => ApplyError::Rejected {
            status: s.as_u16(),
            message,
        },
        s => ApplyError::Server {
            status: s.as_u16(),
            message,
        },
    }
}
