use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::{ExplorerError, MutationOp, Result};
use crate::remote::{CreateRequest, Entry, RemoteFs};
use crate::tree::path;

/// JSON body returned by every `/api/files` endpoint.
#[derive(Debug, Default, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    files: Option<Vec<Entry>>,
    #[serde(default)]
    error: Option<String>,
}

/// [`RemoteFs`] over the workspace server's REST API.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemote {
    /// Create a client for the server at `base_url` (e.g. `http://localhost:5000`).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ExplorerError::InvalidUrl(base_url.to_string()));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    fn files_url(&self) -> String {
        format!("{}/api/files", self.base_url)
    }

    fn resource_url(&self, target: &str) -> String {
        format!("{}/{}", self.files_url(), encode_path(target))
    }

    async fn mutate(
        &self,
        op: MutationOp,
        target: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<()> {
        call(request)
            .await
            .map(|_| ())
            .map_err(|message| ExplorerError::MutationFailed {
                op,
                path: target.to_string(),
                message,
            })
    }
}

#[async_trait]
impl RemoteFs for HttpRemote {
    async fn list(&self, dir: &str) -> Result<Vec<Entry>> {
        // The server addresses its root as the empty path.
        let query = if path::is_root(dir) { "" } else { dir };
        let request = self.client.get(self.files_url()).query(&[("path", query)]);
        let response = call(request)
            .await
            .map_err(|message| ExplorerError::FetchFailed {
                path: dir.to_string(),
                message,
            })?;
        Ok(response.files.unwrap_or_default())
    }

    async fn create(&self, request: &CreateRequest) -> Result<()> {
        let parent = if path::is_root(&request.parent) {
            ""
        } else {
            request.parent.as_str()
        };
        let body = json!({
            "path": parent,
            "name": request.name,
            "is_dir": request.kind.is_dir(),
            "content": request.content.clone().unwrap_or_default(),
        });
        let target = path::join(&request.parent, &request.name);
        let builder = self.client.post(self.files_url()).json(&body);
        self.mutate(MutationOp::Create, &target, builder).await
    }

    async fn rename(&self, target: &str, new_name: &str) -> Result<()> {
        let builder = self
            .client
            .patch(self.resource_url(target))
            .json(&json!({ "new_name": new_name }));
        self.mutate(MutationOp::Rename, target, builder).await
    }

    async fn delete(&self, target: &str) -> Result<()> {
        let builder = self.client.delete(self.resource_url(target));
        self.mutate(MutationOp::Delete, target, builder).await
    }
}

/// Send a request and turn any failure into the server's message.
async fn call(request: reqwest::RequestBuilder) -> std::result::Result<ApiResponse, String> {
    let response = request.send().await.map_err(|e| e.to_string())?;
    let status = response.status();
    let body = response.text().await.map_err(|e| e.to_string())?;
    let parsed = serde_json::from_str::<ApiResponse>(&body);
    if status.is_success() {
        let parsed = parsed.map_err(|e| format!("malformed response: {}", e))?;
        match parsed.error {
            Some(message) => Err(message),
            None => Ok(parsed),
        }
    } else {
        Err(parsed
            .ok()
            .and_then(|r| r.error)
            .unwrap_or_else(|| format!("server returned {}", status)))
    }
}

/// Percent-encode each segment of a normalized path, keeping separators.
fn encode_path(target: &str) -> String {
    target
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
