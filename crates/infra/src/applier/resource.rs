//! Wire types of the `Rensv` custom resource.

use serde::{Deserialize, Serialize};

use rensv_core::Task;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RensvSpec {
    pub document_root: String,
    pub server_name: String,
}

/// One virtual-server resource as sent to and returned by the API server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rensv {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: RensvSpec,
}

impl Rensv {
    /// Build the resource for `task`; the object is named after the server name.
    pub fn for_task(task: &Task, api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            metadata: ObjectMeta {
                name: task.server_name.clone(),
                ..Default::default()
            },
            spec: RensvSpec {
                document_root: task.document_root.clone(),
                server_name: task.server_name.clone(),
            },
        }
    }
}

/// Body of a failed API call (`kind: Status`).
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Status {
    #[serde(default)]
    pub message: String,
}
