//! Read and write a single file through the GitHub contents API.
//!
//! `GET /repos/{owner}/{repo}/contents/{path}` yields the current text and
//! blob sha; `PUT` to the same URL commits new base64 content, carrying the
//! prior sha when the file already exists.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Result, SyncError};

const CLIENT_USER_AGENT: &str = concat!("air_data_sync/", env!("CARGO_PKG_VERSION"));
const GITHUB_ACCEPT: &str = "application/vnd.github+json";

/// Currently published state of a file. Both fields are `None` when the file
/// does not exist yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteDocument {
    pub content: Option<String>,
    pub sha: Option<String>,
}

impl RemoteDocument {
    pub fn exists(&self) -> bool {
        self.sha.is_some()
    }
}

pub struct PublishRequest<'a> {
    pub path: &'a str,
    pub content: &'a str,
    pub message: &'a str,
    pub branch: &'a str,
    /// Sha of the file being replaced; `None` creates the file.
    pub sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    content: Option<String>,
    sha: Option<String>,
    download_url: Option<String>,
}

/// What a contents GET told us, before any follow-up download.
#[derive(Debug, PartialEq, Eq)]
enum Contents {
    Absent,
    Inline { content: String, sha: Option<String> },
    /// No inline content (large files); text lives at `download_url`.
    Download { url: String, sha: Option<String> },
    /// 200 with neither content nor download link.
    Empty { sha: Option<String> },
}

pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    owner: String,
    repo: String,
    token: String,
}

impl GitHubClient {
    pub fn new(api_url: &str, owner: &str, repo: &str, token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(CLIENT_USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            token: token.to_string(),
        })
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_url,
            self.owner,
            self.repo,
            path.trim_start_matches('/')
        )
    }

    /// Public GitHub Pages URL of a published path.
    pub fn public_url(&self, path: &str) -> String {
        pages_url(&self.owner, &self.repo, path)
    }

    /// Current content and sha of `path` on `branch`. A 404 means the file
    /// does not exist and is not an error.
    pub async fn fetch_remote(&self, path: &str, branch: &str) -> Result<RemoteDocument> {
        let url = self.contents_url(path);
        debug!("GET {} (ref {})", url, branch);
        let response = self
            .http
            .get(&url)
            .query(&[("ref", branch)])
            .bearer_auth(&self.token)
            .header(ACCEPT, GITHUB_ACCEPT)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        let doc = match interpret_contents(status, &body)? {
            Contents::Absent => {
                info!("{} does not exist on {}", path, branch);
                RemoteDocument::default()
            }
            Contents::Inline { content, sha } => RemoteDocument {
                content: Some(content),
                sha,
            },
            Contents::Download { url, sha } => {
                debug!("Following download_url for {}", path);
                let content = self.download(&url).await?;
                RemoteDocument {
                    content: Some(content),
                    sha,
                }
            }
            Contents::Empty { sha } => RemoteDocument { content: None, sha },
        };
        if let Some(sha) = &doc.sha {
            info!("Remote {} at sha {}", path, sha);
        }
        Ok(doc)
    }

    async fn download(&self, url: &str) -> Result<String> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        check_download_status(status, body)
    }

    /// Commit `content` to `path`. Succeeds on 200/201 only.
    pub async fn publish(&self, req: &PublishRequest<'_>) -> Result<()> {
        let url = self.contents_url(req.path);
        let payload = put_payload(req);
        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.token)
            .header(ACCEPT, GITHUB_ACCEPT)
            .json(&payload)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        check_put_status(status, body)?;
        info!("Uploaded {} to {}", req.path, req.branch);
        Ok(())
    }
}

/// `https://<owner>.github.io/<repo>/<path>`
pub fn pages_url(owner: &str, repo: &str, path: &str) -> String {
    format!(
        "https://{}.github.io/{}/{}",
        owner,
        repo,
        path.trim_start_matches('/')
    )
}

fn interpret_contents(status: u16, body: &str) -> Result<Contents> {
    match status {
        404 => Ok(Contents::Absent),
        200 => {
            let parsed: ContentsResponse = serde_json::from_str(body)
                .map_err(|e| SyncError::Decode(format!("contents response: {}", e)))?;
            match parsed.content.filter(|c| !c.trim().is_empty()) {
                Some(encoded) => Ok(Contents::Inline {
                    content: decode_content(&encoded)?,
                    sha: parsed.sha,
                }),
                None => match parsed.download_url.filter(|u| !u.is_empty()) {
                    Some(url) => Ok(Contents::Download {
                        url,
                        sha: parsed.sha,
                    }),
                    None => Ok(Contents::Empty { sha: parsed.sha }),
                },
            }
        }
        _ => Err(SyncError::Publish {
            status,
            body: body.to_string(),
        }),
    }
}

/// GitHub wraps base64 at 60 columns; line breaks are dropped before decoding.
fn decode_content(encoded: &str) -> Result<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64
        .decode(compact)
        .map_err(|e| SyncError::Decode(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| SyncError::Decode(e.to_string()))
}

fn put_payload(req: &PublishRequest<'_>) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "message": req.message,
        "content": BASE64.encode(req.content.as_bytes()),
        "branch": req.branch,
    });
    if let Some(sha) = req.sha {
        payload["sha"] = serde_json::Value::String(sha.to_string());
    }
    payload
}

/// The raw download must answer 200; its body is the file text.
fn check_download_status(status: u16, body: String) -> Result<String> {
    match status {
        200 => Ok(body),
        _ => Err(SyncError::Publish { status, body }),
    }
}

fn check_put_status(status: u16, body: String) -> Result<()> {
    match status {
        200 | 201 => Ok(()),
        _ => Err(SyncError::Publish { status, body }),
    }
}
