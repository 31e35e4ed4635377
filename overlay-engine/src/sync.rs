use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::item::Item;

/// A file as it currently exists on the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDocument {
    pub content: String,
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PutRequest {
    pub path: String,
    pub message: String,
    pub content: String,
    pub sha: Option<String>,
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The sha we sent no longer matches the remote head.
    #[error("remote file changed since it was read")]
    Conflict,
    #[error("{message}")]
    Failed { status: Option<u16>, message: String },
}

/// Read/write access to versioned files on a remote.
pub trait ContentsTransport {
    /// `Ok(None)` means the file does not exist yet.
    fn fetch(&self, path: &str, branch: &str) -> Result<Option<RemoteDocument>, TransportError>;
    fn put(&self, request: &PutRequest) -> Result<CommitInfo, TransportError>;
}

impl<T: ContentsTransport + ?Sized> ContentsTransport for &T {
    fn fetch(&self, path: &str, branch: &str) -> Result<Option<RemoteDocument>, TransportError> {
        (**self).fetch(path, branch)
    }

    fn put(&self, request: &PutRequest) -> Result<CommitInfo, TransportError> {
        (**self).put(request)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("remote kept changing, gave up after {attempts} attempts")]
    Conflict { attempts: u32 },
    #[error("{0}")]
    Transport(String),
    #[error("could not encode document: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Fetching,
    Encoding,
    Committing,
    ConflictRetry,
    Success,
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub path: String,
    pub states: Vec<SyncState>,
    pub attempts: u32,
    pub commit: CommitInfo,
}

const MAX_ATTEMPTS: u32 = 2;

pub fn document_path(prefix: &str, key: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{key}.json")
    } else {
        format!("{prefix}/{key}.json")
    }
}

/// Pretty `{"<key>": [...]}` with a trailing newline.
pub fn encode_document(key: &str, items: &[Item]) -> Result<String, serde_json::Error> {
    let mut doc = Map::new();
    doc.insert(key.to_string(), serde_json::to_value(items)?);
    let mut body = serde_json::to_string_pretty(&Value::Object(doc))?;
    body.push('\n');
    Ok(body)
}

pub fn commit_message(key: &str) -> String {
    format!("Update {key} from studio editor")
}

/// Publishes a collection's merged view as one file on the remote. Local
/// overlay state is never read or written here.
#[derive(Debug, Clone)]
pub struct RemoteSync<T> {
    transport: T,
    branch: String,
    path_prefix: String,
}

impl<T: ContentsTransport> RemoteSync<T> {
    pub fn new(transport: T, branch: impl Into<String>, path_prefix: impl Into<String>) -> Self {
        Self { transport, branch: branch.into(), path_prefix: path_prefix.into() }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    fn current_sha(&self, path: &str) -> Result<Option<String>, SyncError> {
        let remote = self
            .transport
            .fetch(path, &self.branch)
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        Ok(remote.map(|doc| doc.sha))
    }

    pub fn publish(&self, key: &str, items: &[Item]) -> Result<SyncReport, SyncError> {
        let path = document_path(&self.path_prefix, key);
        let mut states = vec![SyncState::Idle, SyncState::Fetching];

        let sha = self.current_sha(&path)?;
        states.push(SyncState::Encoding);
        let content = encode_document(key, items)?;

        let mut request = PutRequest {
            path: path.clone(),
            message: commit_message(key),
            content,
            sha,
            branch: self.branch.clone(),
        };

        let mut attempts = 0;
        loop {
            states.push(SyncState::Committing);
            attempts += 1;
            match self.transport.put(&request) {
                Ok(commit) => {
                    states.push(SyncState::Success);
                    info!(path = %path, attempts, sha = %commit.sha, "published");
                    return Ok(SyncReport { path, states, attempts, commit });
                }
                Err(TransportError::Conflict) if attempts < MAX_ATTEMPTS => {
                    states.push(SyncState::ConflictRetry);
                    debug!(path = %path, "sha conflict, refetching");
                    request.sha = self.current_sha(&path)?;
                }
                Err(TransportError::Conflict) => {
                    warn!(path = %path, attempts, "conflict persisted");
                    return Err(SyncError::Conflict { attempts });
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "publish failed");
                    return Err(SyncError::Transport(e.to_string()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::*;

    #[derive(Default)]
    struct FakeTransport {
        shas: RefCell<VecDeque<Option<String>>>,
        responses: RefCell<VecDeque<Result<CommitInfo, TransportError>>>,
        puts: RefCell<Vec<PutRequest>>,
        fetches: RefCell<u32>,
    }

    impl FakeTransport {
        fn new(shas: Vec<Option<&str>>, responses: Vec<Result<CommitInfo, TransportError>>) -> Self {
            Self {
                shas: RefCell::new(shas.into_iter().map(|s| s.map(String::from)).collect()),
                responses: RefCell::new(responses.into()),
                ..Self::default()
            }
        }
    }

    impl ContentsTransport for FakeTransport {
        fn fetch(&self, _path: &str, _branch: &str) -> Result<Option<RemoteDocument>, TransportError> {
            *self.fetches.borrow_mut() += 1;
            let sha = self.shas.borrow_mut().pop_front().flatten();
            Ok(sha.map(|sha| RemoteDocument { content: "{}".into(), sha }))
        }

        fn put(&self, request: &PutRequest) -> Result<CommitInfo, TransportError> {
            self.puts.borrow_mut().push(request.clone());
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or(Err(TransportError::Failed { status: None, message: "no script".into() }))
        }
    }

    fn commit(sha: &str) -> CommitInfo {
        CommitInfo { sha: sha.into(), url: None }
    }

    fn items() -> Vec<Item> {
        vec![Item::new().with("slug", "p1").with("title", "Rain")]
    }

    #[test]
    fn test_first_try_success() {
        let fake = FakeTransport::new(vec![Some("abc")], vec![Ok(commit("c1"))]);
        let sync = RemoteSync::new(&fake, "main", "data");

        let report = sync.publish("poems", &items()).unwrap();
        assert_eq!(report.attempts, 1);
        assert_eq!(report.path, "data/poems.json");
        assert_eq!(
            report.states,
            vec![
                SyncState::Idle,
                SyncState::Fetching,
                SyncState::Encoding,
                SyncState::Committing,
                SyncState::Success
            ]
        );
        let puts = fake.puts.borrow();
        assert_eq!(puts[0].sha.as_deref(), Some("abc"));
        assert_eq!(puts[0].message, "Update poems from studio editor");
        assert_eq!(puts[0].branch, "main");
    }

    #[test]
    fn test_single_conflict_retries_with_fresh_sha() {
        let fake = FakeTransport::new(
            vec![Some("old"), Some("new")],
            vec![Err(TransportError::Conflict), Ok(commit("c2"))],
        );
        let sync = RemoteSync::new(&fake, "main", "data");

        let report = sync.publish("poems", &items()).unwrap();
        assert_eq!(report.attempts, 2);
        assert!(report.states.contains(&SyncState::ConflictRetry));
        assert_eq!(report.commit.sha, "c2");

        let puts = fake.puts.borrow();
        assert_eq!(puts.len(), 2);
        assert_eq!(puts[1].sha.as_deref(), Some("new"));
        // body encoded once and reused
        assert_eq!(puts[0].content, puts[1].content);
    }

    #[test]
    fn test_second_conflict_is_fatal() {
        let fake = FakeTransport::new(
            vec![Some("a"), Some("b"), Some("c")],
            vec![Err(TransportError::Conflict), Err(TransportError::Conflict), Ok(commit("never"))],
        );
        let sync = RemoteSync::new(&fake, "main", "data");

        let err = sync.publish("poems", &items()).unwrap_err();
        assert!(matches!(err, SyncError::Conflict { attempts: 2 }));
        assert_eq!(fake.puts.borrow().len(), 2);
        assert_eq!(*fake.fetches.borrow(), 2);
    }

    #[test]
    fn test_missing_file_is_created() {
        let fake = FakeTransport::new(vec![None], vec![Ok(commit("c1"))]);
        let sync = RemoteSync::new(&fake, "main", "/data/");

        let report = sync.publish("blogs", &[]).unwrap();
        assert_eq!(report.path, "data/blogs.json");
        assert!(fake.puts.borrow()[0].sha.is_none());
    }

    #[test]
    fn test_other_failure_keeps_raw_message() {
        let fake = FakeTransport::new(
            vec![Some("a")],
            vec![Err(TransportError::Failed { status: Some(401), message: "Bad credentials".into() })],
        );
        let sync = RemoteSync::new(&fake, "main", "data");

        let err = sync.publish("poems", &items()).unwrap_err();
        assert_eq!(err.to_string(), "Bad credentials");
        assert_eq!(fake.puts.borrow().len(), 1);
    }

    #[test]
    fn test_encode_document() {
        let body = encode_document("poems", &items()).unwrap();
        assert!(body.ends_with("}\n"));
        let parsed: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["poems"][0]["slug"], "p1");
        assert_eq!(document_path("", "albums"), "albums.json");
    }
}
