use tracing::{info, warn};

use crate::error::Result;
use crate::firestore::Firestore;
use crate::github::{GitHubClient, PublishRequest, RemoteDocument};
use crate::model::Category;

/// Where rendered documents are published.
pub trait ContentStore {
    async fn fetch_remote(&self, path: &str, branch: &str) -> Result<RemoteDocument>;
    async fn publish(&self, req: &PublishRequest<'_>) -> Result<()>;
    fn public_url(&self, path: &str) -> String;
}

/// Where the public URL of a fresh publish is recorded.
pub trait ConfigStore {
    async fn upsert_config(&self, config_type: &str, data_url: &str) -> Result<()>;
}

impl ContentStore for GitHubClient {
    async fn fetch_remote(&self, path: &str, branch: &str) -> Result<RemoteDocument> {
        GitHubClient::fetch_remote(self, path, branch).await
    }

    async fn publish(&self, req: &PublishRequest<'_>) -> Result<()> {
        GitHubClient::publish(self, req).await
    }

    fn public_url(&self, path: &str) -> String {
        GitHubClient::public_url(self, path)
    }
}

impl ConfigStore for Firestore {
    async fn upsert_config(&self, config_type: &str, data_url: &str) -> Result<()> {
        Firestore::upsert_config(self, config_type, data_url).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Remote content already matches.
    Unchanged,
    /// New content committed and the config entry updated.
    Published { url: String },
    /// Content differs but the driver has no recorder (dry run).
    Pending,
}

/// Compare, publish and record one category at a time. Without a recorder
/// nothing is written.
pub struct Driver<'a, S, C> {
    store: &'a S,
    recorder: Option<&'a C>,
    branch: &'a str,
}

impl<'a, S: ContentStore, C: ConfigStore> Driver<'a, S, C> {
    pub fn new(store: &'a S, recorder: Option<&'a C>, branch: &'a str) -> Self {
        Self {
            store,
            recorder,
            branch,
        }
    }

    pub async fn sync(&self, category: Category, rendered: &str) -> Result<Outcome> {
        let path = category.repo_path();
        let remote = self.store.fetch_remote(path, self.branch).await?;

        if !has_changed(rendered, remote.content.as_deref()) {
            info!("No changes in {} data", category.label().to_lowercase());
            return Ok(Outcome::Unchanged);
        }

        let Some(recorder) = self.recorder else {
            warn!("{} data changed; dry run, not publishing", category.label());
            return Ok(Outcome::Pending);
        };

        let message = commit_message(category, &remote);
        self.store
            .publish(&PublishRequest {
                path,
                content: rendered,
                message: &message,
                branch: self.branch,
                sha: remote.sha.as_deref(),
            })
            .await?;

        let url = self.store.public_url(path);
        recorder.upsert_config(category.config_type(), &url).await?;
        Ok(Outcome::Published { url })
    }
}

/// Trimmed text comparison; an absent remote counts as empty.
fn has_changed(local: &str, remote: Option<&str>) -> bool {
    local.trim() != remote.unwrap_or_default().trim()
}

fn commit_message(category: Category, remote: &RemoteDocument) -> String {
    let verb = if remote.exists() { "Update" } else { "Add" };
    format!("{} {} data", verb, category.label().to_lowercase())
}
