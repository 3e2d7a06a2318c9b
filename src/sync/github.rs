use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

use super::{RemoteState, RemoteStore, SyncError};

const GITHUB_API: &str = "https://api.github.com";
const DATA_FILE: &str = "todo-data.json";
const ACCEPT: &str = "application/vnd.github.v3+json";

/// Stores the full state as a single JSON file in a GitHub repository via
/// the contents API. The last-seen blob sha is remembered so updates PUT
/// against the right revision.
pub struct GitHubStore {
    token: Option<String>,
    owner: Option<String>,
    repo: Option<String>,
    file_sha: Option<String>,
    http: Client,
}

impl GitHubStore {
    pub fn new() -> Result<Self, SyncError> {
        // GitHub rejects requests without a user agent.
        let http = Client::builder().user_agent("wick").build()?;
        Ok(Self {
            token: None,
            owner: None,
            repo: None,
            file_sha: None,
            http,
        })
    }

    /// `repo` is `owner/name`.
    pub fn configure(&mut self, token: &str, repo: &str) {
        self.token = Some(token.to_string());
        if let Some((owner, name)) = repo.split_once('/') {
            self.owner = Some(owner.to_string());
            self.repo = Some(name.to_string());
        }
    }

    fn credentials(&self) -> Result<(&str, String), SyncError> {
        match (&self.token, &self.owner, &self.repo) {
            (Some(token), Some(owner), Some(repo)) => Ok((
                token.as_str(),
                format!("{}/repos/{}/{}", GITHUB_API, owner, repo),
            )),
            _ => Err(SyncError::NotConfigured),
        }
    }

    /// Probe the repository, mapping the interesting failure modes.
    pub async fn test_connection(&self) -> Result<(), SyncError> {
        let (token, repo_url) = self.credentials()?;
        let resp = self
            .http
            .get(&repo_url)
            .bearer_auth(token)
            .header("Accept", ACCEPT)
            .send()
            .await?;
        let status = resp.status();
        match status {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(SyncError::NotFound),
            StatusCode::UNAUTHORIZED => Err(SyncError::Auth),
            s => Err(SyncError::Remote {
                status: s.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            }),
        }
    }
}

impl RemoteStore for GitHubStore {
    fn is_configured(&self) -> bool {
        self.token.is_some() && self.owner.is_some() && self.repo.is_some()
    }

    /// Fetch the remote state. `Ok(None)` both when nothing is configured
    /// and when the data file doesn't exist yet.
    async fn load(&mut self) -> Result<Option<RemoteState>, SyncError> {
        if !self.is_configured() {
            return Ok(None);
        }
        let (token, repo_url) = self.credentials()?;
        let url = format!("{}/contents/{}", repo_url, DATA_FILE);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .header("Accept", ACCEPT)
            .send()
            .await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(SyncError::Auth);
        }
        if !status.is_success() {
            return Err(SyncError::Remote {
                status: status.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }

        let file: Value = resp.json().await?;
        self.file_sha = file
            .get("sha")
            .and_then(Value::as_str)
            .map(str::to_string);
        // The API wraps base64 content in newlines.
        let encoded: String = file
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or("")
            .split_whitespace()
            .collect();
        let raw = BASE64.decode(encoded.as_bytes())?;
        let state: RemoteState = serde_json::from_slice(&raw)?;
        log::info!("Loaded remote state: {} tasks", state.tasks.len());
        Ok(Some(state))
    }

    /// PUT the state file, carrying the last-seen sha when updating an
    /// existing file. Safe to retry: re-running a successful save writes the
    /// same content again.
    async fn save(&mut self, state: &RemoteState) -> Result<(), SyncError> {
        let (token, repo_url) = self.credentials()?;
        let url = format!("{}/contents/{}", repo_url, DATA_FILE);

        let encoded = BASE64.encode(serde_json::to_vec_pretty(state)?);
        let mut body = json!({
            "message": format!("Update todo data - {}", state.exported_at),
            "content": encoded,
        });
        if let Some(sha) = &self.file_sha {
            body["sha"] = json!(sha);
        }

        let resp = self
            .http
            .put(&url)
            .bearer_auth(token)
            .header("Accept", ACCEPT)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(SyncError::Auth);
        }
        if !status.is_success() {
            let message = resp
                .json::<Value>()
                .await
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_default();
            return Err(SyncError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        let result: Value = resp.json().await?;
        self.file_sha = result
            .pointer("/content/sha")
            .and_then(Value::as_str)
            .map(str::to_string);
        log::info!("Saved remote state: {} tasks", state.tasks.len());
        Ok(())
    }
}
