//! HTTP adapters: the GitHub Contents API as a [`ContentsTransport`] and
//! published JSON files as a [`DefaultsSource`].

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use overlay_engine::{
    CommitInfo, ContentsTransport, DefaultsError, DefaultsSource, PutRequest, RemoteDocument, TransportError,
};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::{DefaultsConfig, RemoteConfig};

const USER_AGENT: &str = "airose-studio";
const TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    #[serde(default)]
    content: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    commit: CommitResponse,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

pub struct GithubContents {
    agent: ureq::Agent,
    api_base: String,
    owner: String,
    repo: String,
    token: Option<String>,
}

impl GithubContents {
    pub fn new(
        api_base: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(TIMEOUT).build(),
            api_base: api_base.into(),
            owner: owner.into(),
            repo: repo.into(),
            token,
        }
    }

    pub fn from_config(remote: &RemoteConfig) -> Self {
        Self::new(&remote.api_base, &remote.owner, &remote.repo, remote.token())
    }

    fn url(&self, path: &str) -> String {
        contents_url(&self.api_base, &self.owner, &self.repo, path)
    }

    fn authorize(&self, request: ureq::Request) -> ureq::Request {
        let request = request
            .set("Accept", "application/vnd.github+json")
            .set("User-Agent", USER_AGENT);
        match &self.token {
            Some(token) => request.set("Authorization", &format!("Bearer {token}")),
            None => request,
        }
    }
}

impl std::fmt::Debug for GithubContents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubContents")
            .field("api_base", &self.api_base)
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

pub fn contents_url(api_base: &str, owner: &str, repo: &str, path: &str) -> String {
    format!(
        "{}/repos/{owner}/{repo}/contents/{}",
        api_base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Decodes the API's base64 payload, which arrives wrapped at 60 columns.
pub fn decode_content(raw: &str) -> Result<String, String> {
    let compact: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD.decode(compact).map_err(|e| format!("invalid base64 content: {e}"))?;
    String::from_utf8(bytes).map_err(|e| format!("content is not UTF-8: {e}"))
}

/// Maps an HTTP failure onto the transport contract. A stale sha shows up
/// as 409, or as 422 with a message about the sha.
pub fn classify_status(status: u16, message: String) -> TransportError {
    match status {
        409 => TransportError::Conflict,
        422 if message.to_ascii_lowercase().contains("sha") => TransportError::Conflict,
        _ => TransportError::Failed { status: Some(status), message },
    }
}

fn error_message(status: u16, response: ureq::Response) -> String {
    let body = response.into_string().unwrap_or_default();
    serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.message)
        .unwrap_or_else(|_| if body.trim().is_empty() { format!("HTTP {status}") } else { body })
}

fn transport_failure(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Status(status, response) => classify_status(status, error_message(status, response)),
        ureq::Error::Transport(t) => TransportError::Failed { status: None, message: t.to_string() },
    }
}

impl ContentsTransport for GithubContents {
    fn fetch(&self, path: &str, branch: &str) -> Result<Option<RemoteDocument>, TransportError> {
        let request = self.authorize(self.agent.get(&self.url(path))).query("ref", branch);
        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(404, _)) => {
                debug!(path, "remote file missing");
                return Ok(None);
            }
            Err(e) => return Err(transport_failure(e)),
        };

        let body: ContentsResponse = response
            .into_json()
            .map_err(|e| TransportError::Failed { status: None, message: e.to_string() })?;
        let content =
            decode_content(&body.content).map_err(|message| TransportError::Failed { status: None, message })?;
        Ok(Some(RemoteDocument { content, sha: body.sha }))
    }

    fn put(&self, request: &PutRequest) -> Result<CommitInfo, TransportError> {
        let mut payload = json!({
            "message": request.message,
            "content": STANDARD.encode(request.content.as_bytes()),
            "branch": request.branch,
        });
        if let Some(sha) = &request.sha {
            payload["sha"] = json!(sha);
        }

        let response = self
            .authorize(self.agent.put(&self.url(&request.path)))
            .send_json(payload)
            .map_err(transport_failure)?;
        let body: PutResponse = response
            .into_json()
            .map_err(|e| TransportError::Failed { status: None, message: e.to_string() })?;
        Ok(CommitInfo { sha: body.commit.sha, url: body.commit.html_url })
    }
}

/// Reads `<base_url>/<collection>.json` from the published site.
pub struct HttpDefaults {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpDefaults {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { agent: ureq::AgentBuilder::new().timeout(TIMEOUT).build(), base_url: base_url.into() }
    }

    /// `None` when no base URL is configured; callers then keep the bundled
    /// defaults.
    pub fn from_config(config: &DefaultsConfig) -> Option<Self> {
        let base_url = config.base_url.as_deref().map(str::trim).filter(|url| !url.is_empty())?;
        Some(Self::new(base_url))
    }

    fn url(&self, collection: &str) -> String {
        format!("{}/{collection}.json", self.base_url.trim_end_matches('/'))
    }
}

impl DefaultsSource for HttpDefaults {
    fn fetch(&self, collection: &str) -> Result<String, DefaultsError> {
        let url = self.url(collection);
        let response = self
            .agent
            .get(&url)
            .set("User-Agent", USER_AGENT)
            .call()
            .map_err(|e| DefaultsError::Unavailable(format!("{url}: {e}")))?;
        response.into_string().map_err(|e| DefaultsError::Unavailable(format!("{url}: {e}")))
    }
}
