//! Management-plane pull.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use crate::config::validation::management_url;

/// Opaque call writing a bundle into `out_dir`.
///
/// Any error fails the pull; partial output is cleaned up by the caller.
pub trait ManagementPlane: Send + Sync + 'static {
    fn pull(&self, host: &str, out_dir: &Path) -> impl Future<Output = Result<usize, String>> + Send;
}

/// Bundle body served by the management plane.
#[derive(Debug, Deserialize)]
struct BundleBody {
    files: BTreeMap<String, Value>,
}

/// Pulls bundles over HTTP.
///
/// `GET <host>/v1/bundle` returns `{ "files": { "<name>": <json> } }`;
/// each entry is written to `<out_dir>/<name>`.
#[derive(Debug, Clone)]
pub struct HttpPuller {
    client: reqwest::Client,
}

impl HttpPuller {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("config-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl ManagementPlane for HttpPuller {
    async fn pull(&self, host: &str, out_dir: &Path) -> Result<usize, String> {
        let url = management_url(host)
            .and_then(|base| base.join("v1/bundle"))
            .map_err(|e| format!("invalid management host `{}`: {}", host, e))?;

        tracing::debug!(url = %url, "Pulling bundle");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| format!("request to {} failed: {}", url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("management plane returned {}", status));
        }
        let body: BundleBody = response
            .json()
            .await
            .map_err(|e| format!("invalid bundle body: {}", e))?;

        let mut files = Vec::with_capacity(body.files.len());
        for (name, content) in body.files {
            if !is_plain_file_name(&name) {
                return Err(format!("refusing bundle file name `{}`", name));
            }
            let bytes = serde_json::to_vec_pretty(&content).map_err(|e| e.to_string())?;
            files.push((name, bytes));
        }

        // No await from here on: a cancelled pull must not leave writes in flight.
        for (name, bytes) in &files {
            std::fs::write(out_dir.join(name), bytes).map_err(|e| format!("write {}: {}", name, e))?;
        }
        Ok(files.len())
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}
