//! Purpose: Provide an HTTP client for the cardfile REST API and event stream.
//! Exports: `RemoteClient`, `RemoteEvents`.
//! Role: Transport client that mirrors the record service operations remotely.
//! Invariants: Base URLs resolve to http/https with no path, query, or fragment.
//! Invariants: Non-2xx responses surface the server's error envelope when present.
//! Invariants: The event stream is line-delimited JSON; update signals carry no payload.

use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::core::error::{Error, ErrorKind};
use crate::core::item::{Item, ItemDraft};
use crate::core::notify::Update;

type ApiResult<T> = Result<T, Error>;

#[derive(Clone)]
pub struct RemoteClient {
    inner: Arc<RemoteClientInner>,
}

struct RemoteClientInner {
    base_url: Url,
    agent: ureq::Agent,
}

/// Blocking reader over `GET /api/events`. Each call waits for the next
/// `update` line; `Ok(None)` means the server closed the stream.
pub struct RemoteEvents {
    reader: Option<BufReader<Box<dyn std::io::Read + Send + Sync>>>,
}

#[derive(Deserialize)]
struct EventLine {
    event: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: RemoteError,
}

#[derive(Deserialize)]
struct RemoteError {
    kind: String,
    message: Option<String>,
    hint: Option<String>,
    id: Option<String>,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let agent = ureq::AgentBuilder::new().build();
        Ok(Self {
            inner: Arc::new(RemoteClientInner { base_url, agent }),
        })
    }

    /// Bound blocking reads; useful for tests and scripted callers. Streams
    /// opened afterwards inherit the timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout_read(timeout).build();
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.agent = agent;
        } else {
            self.inner = Arc::new(RemoteClientInner {
                base_url: self.inner.base_url.clone(),
                agent,
            });
        }
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn list_items(&self) -> ApiResult<Vec<Item>> {
        let url = build_url(&self.inner.base_url, &["api", "items"])?;
        self.request_json::<ItemDraft, _>("GET", &url, None)
    }

    pub fn create_item(&self, draft: &ItemDraft) -> ApiResult<Item> {
        let url = build_url(&self.inner.base_url, &["api", "items"])?;
        self.request_json("POST", &url, Some(draft))
    }

    pub fn update_item(&self, id: &str, draft: &ItemDraft) -> ApiResult<Item> {
        let url = build_url(&self.inner.base_url, &["api", "items", id])?;
        self.request_json("PUT", &url, Some(draft))
            .map_err(|err| err.with_id(id))
    }

    pub fn delete_item(&self, id: &str) -> ApiResult<()> {
        let url = build_url(&self.inner.base_url, &["api", "items", id])?;
        let _confirmation: Value = self
            .request_json::<ItemDraft, _>("DELETE", &url, None)
            .map_err(|err| err.with_id(id))?;
        Ok(())
    }

    /// Redundant client-side emission; converges on the same broadcast as
    /// server-side mutation signals.
    pub fn emit_update(&self) -> ApiResult<()> {
        let url = build_url(&self.inner.base_url, &["api", "events"])?;
        let _confirmation: Value = self.request_json::<ItemDraft, _>("POST", &url, None)?;
        Ok(())
    }

    pub fn events(&self) -> ApiResult<RemoteEvents> {
        let url = build_url(&self.inner.base_url, &["api", "events"])?;
        let response = self
            .inner
            .agent
            .request("GET", url.as_str())
            .set("Accept", "application/jsonl")
            .call();
        match response {
            Ok(resp) => Ok(RemoteEvents {
                reader: Some(BufReader::new(resp.into_reader())),
            }),
            Err(ureq::Error::Status(code, resp)) => Err(parse_error_response(code, resp)),
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Connectivity)
                .with_message("request failed")
                .with_source(err)),
        }
    }

    fn request_json<T, R>(&self, method: &str, url: &Url, body: Option<&T>) -> ApiResult<R>
    where
        T: serde::Serialize,
        R: DeserializeOwned,
    {
        let request = self
            .inner
            .agent
            .request(method, url.as_str())
            .set("Accept", "application/json");
        let response = match body {
            None => request.call(),
            Some(body) => {
                let payload = serde_json::to_string(body).map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to encode request json")
                        .with_source(err)
                })?;
                request
                    .set("Content-Type", "application/json")
                    .send_string(&payload)
            }
        };

        match response {
            Ok(resp) => read_json_response(resp),
            Err(ureq::Error::Status(code, resp)) => Err(parse_error_response(code, resp)),
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Connectivity)
                .with_message("request failed")
                .with_source(err)),
        }
    }
}

impl RemoteEvents {
    /// Wait for the next update signal, skipping blanks and non-update
    /// events (the connect-time `hello` line included).
    pub fn next_update(&mut self) -> ApiResult<Option<Update>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        loop {
            let mut line = String::new();
            let bytes = reader.read_line(&mut line).map_err(|err| {
                Error::new(ErrorKind::Connectivity)
                    .with_message("failed to read event stream")
                    .with_source(err)
            })?;
            if bytes == 0 {
                return Ok(None);
            }
            if line.trim().is_empty() {
                continue;
            }
            let event: EventLine = serde_json::from_str(&line).map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("invalid event stream json")
                    .with_source(err)
            })?;
            if event.event == "update" {
                return Ok(Some(Update));
            }
        }
    }

    pub fn cancel(&mut self) {
        self.reader = None;
    }
}

fn normalize_base_url(raw: String) -> ApiResult<Url> {
    let mut url = Url::parse(&raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid base url")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::new(ErrorKind::Usage).with_message("base url must use http or https"));
    }
    if url.path() != "/" && !url.path().is_empty() {
        return Err(Error::new(ErrorKind::Usage).with_message("base url must not include a path"));
    }
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn build_url(base_url: &Url, segments: &[&str]) -> ApiResult<Url> {
    let mut url = base_url.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| Error::new(ErrorKind::Usage).with_message("base url cannot be a base"))?;
        path.clear();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

fn read_json_response<R>(response: ureq::Response) -> ApiResult<R>
where
    R: DeserializeOwned,
{
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::Connectivity)
            .with_message("failed to read response body")
            .with_source(err)
    })?;
    serde_json::from_str(&body).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("invalid response json")
            .with_source(err)
    })
}

fn parse_error_response(status: u16, response: ureq::Response) -> Error {
    let body = response.into_string().unwrap_or_default();
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
        return error_from_remote(envelope.error);
    }
    let kind = error_kind_from_status(status);
    Error::new(kind).with_message(format!("remote error status {status}"))
}

fn error_from_remote(remote: RemoteError) -> Error {
    let kind = parse_error_kind(&remote.kind);
    let mut err = Error::new(kind);
    if let Some(message) = remote.message {
        err = err.with_message(message);
    }
    if let Some(hint) = remote.hint {
        err = err.with_hint(hint);
    }
    if let Some(id) = remote.id {
        err = err.with_id(id);
    }
    err
}

fn parse_error_kind(kind: &str) -> ErrorKind {
    match kind {
        "Internal" => ErrorKind::Internal,
        "Usage" => ErrorKind::Usage,
        "Validation" => ErrorKind::Validation,
        "NotFound" => ErrorKind::NotFound,
        "Connectivity" => ErrorKind::Connectivity,
        "Io" => ErrorKind::Io,
        _ => ErrorKind::Internal,
    }
}

fn error_kind_from_status(status: u16) -> ErrorKind {
    match status {
        400 | 413 | 422 => ErrorKind::Validation,
        404 => ErrorKind::NotFound,
        503 => ErrorKind::Connectivity,
        500..=599 => ErrorKind::Internal,
        _ => ErrorKind::Io,
    }
}
