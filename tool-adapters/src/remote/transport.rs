//! Transports carrying JSON-RPC messages to a tool server.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use hyper::body::to_bytes;
use hyper::header::{ACCEPT, CONTENT_TYPE};
use hyper::{Body, Request, Uri};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{AdapterError, AdapterResult};
use crate::http_client::{RemoteClient, remote_client};
use crate::remote::protocol::{RpcRequest, RpcResponse};

/// Moves requests to a server and brings responses back.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Sends a request and waits for the response with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Transport`] when the server cannot be reached
    /// and [`AdapterError::Protocol`] when its answer is malformed.
    async fn call(&self, request: RpcRequest) -> AdapterResult<RpcResponse>;

    /// Sends a notification; no response is expected.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Transport`] when the server cannot be reached.
    async fn notify(&self, notification: RpcRequest) -> AdapterResult<()>;
}

fn decode_response(raw: &str) -> AdapterResult<Option<RpcResponse>> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|err| AdapterError::protocol(format!("invalid JSON from server: {err}")))?;
    // Server-initiated requests and notifications are not ours to answer.
    if value.get("method").is_some() {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|err| AdapterError::protocol(format!("invalid JSON-RPC response: {err}")))
}

fn encode(request: &RpcRequest) -> AdapterResult<String> {
    serde_json::to_string(request)
        .map_err(|err| AdapterError::protocol(format!("cannot encode request: {err}")))
}

/// Child process speaking newline-delimited JSON-RPC on stdin and stdout.
///
/// The process is started on first use and killed when the transport is
/// dropped. Writes are serialised over the single pipe; a reader task routes
/// each response to the caller waiting on its id, so a slow request does not
/// hold up the others.
pub struct StdioTransport {
    command: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    process: Mutex<Option<StdioProcess>>,
}

/// Callers waiting for a response, by request id.
#[derive(Default)]
struct Routes {
    closed: bool,
    waiters: HashMap<u64, oneshot::Sender<RpcResponse>>,
}

type Pending = Arc<StdMutex<Routes>>;

fn routes(pending: &Pending) -> std::sync::MutexGuard<'_, Routes> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

struct StdioProcess {
    _child: Child,
    stdin: ChildStdin,
    pending: Pending,
    reader: JoinHandle<()>,
}

impl StdioProcess {
    fn is_running(&self) -> bool {
        !routes(&self.pending).closed
    }
}

impl Drop for StdioProcess {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Removes a waiter that gave up, for example on timeout.
struct Waiter {
    pending: Pending,
    id: u64,
}

impl Drop for Waiter {
    fn drop(&mut self) {
        routes(&self.pending).waiters.remove(&self.id);
    }
}

async fn route_responses(mut stdout: Lines<BufReader<ChildStdout>>, pending: Pending) {
    loop {
        let line = match stdout.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "read from tool server failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match decode_response(&line) {
            Ok(Some(response)) => {
                let waiter = response
                    .id
                    .and_then(|id| routes(&pending).waiters.remove(&id));
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.send(response);
                    }
                    None => debug!(id = ?response.id, "no caller waiting for response"),
                }
            }
            Ok(None) => debug!(line = %line, "skipping unrelated server message"),
            Err(err) => warn!(error = %err, "skipping unreadable server message"),
        }
    }
    // Dropping the senders wakes every caller still waiting.
    let mut routes = routes(&pending);
    routes.closed = true;
    routes.waiters.clear();
}

impl fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdioTransport")
            .field("command", &self.command)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

impl StdioTransport {
    /// Describes the process to launch.
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<String>, env: BTreeMap<String, String>) -> Self {
        Self {
            command: command.into(),
            args,
            env,
            process: Mutex::new(None),
        }
    }

    fn spawn(&self) -> AdapterResult<StdioProcess> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                AdapterError::transport(format!("cannot start `{}`: {err}", self.command))
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(AdapterError::transport("child process has no stdio pipes"));
        };
        debug!(command = %self.command, "tool server process started");
        let pending = Pending::default();
        let reader = tokio::spawn(route_responses(
            BufReader::new(stdout).lines(),
            Arc::clone(&pending),
        ));
        Ok(StdioProcess {
            _child: child,
            stdin,
            pending,
            reader,
        })
    }

    async fn write_line(stdin: &mut ChildStdin, request: &RpcRequest) -> AdapterResult<()> {
        let mut line = encode(request)?;
        line.push('\n');
        let failed = |err: std::io::Error| {
            AdapterError::transport(format!("write to tool server failed: {err}"))
        };
        stdin.write_all(line.as_bytes()).await.map_err(failed)?;
        stdin.flush().await.map_err(failed)
    }

    /// Writes `request`, registering a waiter first when it carries an id.
    async fn submit(
        &self,
        request: &RpcRequest,
    ) -> AdapterResult<Option<(oneshot::Receiver<RpcResponse>, Waiter)>> {
        let mut guard = self.process.lock().await;
        if !guard.as_ref().is_some_and(StdioProcess::is_running) {
            *guard = Some(self.spawn()?);
        }
        let Some(process) = guard.as_mut() else {
            return Err(AdapterError::transport("tool server is not running"));
        };

        let waiting = match request.id {
            Some(id) => {
                let (sender, receiver) = oneshot::channel();
                let mut routes = routes(&process.pending);
                if routes.closed {
                    return Err(AdapterError::transport("tool server closed its output"));
                }
                routes.waiters.insert(id, sender);
                let waiter = Waiter {
                    pending: Arc::clone(&process.pending),
                    id,
                };
                Some((receiver, waiter))
            }
            None => None,
        };

        if let Err(err) = Self::write_line(&mut process.stdin, request).await {
            // Start afresh on the next call.
            *guard = None;
            return Err(err);
        }
        Ok(waiting)
    }

    async fn send(&self, request: &RpcRequest) -> AdapterResult<Option<RpcResponse>> {
        let Some((receiver, _waiter)) = self.submit(request).await? else {
            return Ok(None);
        };
        receiver
            .await
            .map(Some)
            .map_err(|_| AdapterError::transport("tool server closed its output"))
    }
}

#[async_trait]
impl RpcTransport for StdioTransport {
    async fn call(&self, request: RpcRequest) -> AdapterResult<RpcResponse> {
        self.send(&request)
            .await?
            .ok_or_else(|| AdapterError::protocol("request was sent without an id"))
    }

    async fn notify(&self, notification: RpcRequest) -> AdapterResult<()> {
        let notification = RpcRequest {
            id: None,
            ..notification
        };
        self.send(&notification).await.map(|_| ())
    }
}

/// JSON-RPC over HTTP POST.
pub struct HttpTransport {
    client: RemoteClient,
    endpoint: Uri,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Creates a transport posting to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] when the URL does not parse.
    pub fn new(url: &str) -> AdapterResult<Self> {
        let endpoint = url
            .parse::<Uri>()
            .map_err(|err| AdapterError::configuration(format!("invalid endpoint `{url}`: {err}")))?;
        Ok(Self {
            client: remote_client(),
            endpoint,
        })
    }

    async fn post(&self, request: &RpcRequest) -> AdapterResult<String> {
        let body = encode(request)?;
        let request = Request::post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json, text/event-stream")
            .body(Body::from(body))
            .map_err(|err| AdapterError::transport(format!("failed to build request: {err}")))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|err| AdapterError::transport(format!("request to {} failed: {err}", self.endpoint)))?;
        let status = response.status();
        let bytes = to_bytes(response.into_body())
            .await
            .map_err(|err| AdapterError::transport(format!("failed to read response: {err}")))?;
        let text = String::from_utf8_lossy(&bytes).into_owned();

        if !status.is_success() {
            return Err(AdapterError::transport(format!(
                "{} returned {status}: {}",
                self.endpoint,
                text.trim()
            )));
        }
        Ok(text)
    }
}

/// Picks the JSON payload out of a plain or event-stream body.
fn response_payload(body: &str) -> &str {
    let events: Vec<&str> = body
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .filter(|data| !data.is_empty())
        .collect();
    events.last().copied().unwrap_or(body)
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(&self, request: RpcRequest) -> AdapterResult<RpcResponse> {
        let body = self.post(&request).await?;
        decode_response(response_payload(&body))?
            .ok_or_else(|| AdapterError::protocol("server answered with a request"))
    }

    async fn notify(&self, notification: RpcRequest) -> AdapterResult<()> {
        self.post(&notification).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use serde_json::json;

    #[test]
    fn event_stream_bodies_yield_their_last_data_line() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\n";
        assert_eq!(response_payload(body), "{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}");
        assert_eq!(response_payload("{\"id\":2}"), "{\"id\":2}");
    }

    #[test]
    fn server_requests_are_not_responses() {
        assert_eq!(decode_response(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap(), None);
        let response = decode_response(r#"{"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(response.result, Some(json!({"ok": true})));
        assert!(decode_response("not json").is_err());
    }

    #[test]
    fn rejects_unparsable_urls() {
        assert!(matches!(
            HttpTransport::new("http://exa mple.com"),
            Err(AdapterError::Configuration { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stdio_round_trip_skips_unrelated_lines() {
        let script = r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  [ -z "$id" ] && continue
  echo '{"jsonrpc":"2.0","method":"notifications/progress"}'
  echo "{\"jsonrpc\":\"2.0\",\"id\":$id,\"result\":{\"echo\":$id}}"
done
"#;
        let transport = StdioTransport::new(
            "sh",
            vec!["-c".to_owned(), script.to_owned()],
            BTreeMap::new(),
        );

        transport
            .notify(RpcRequest::notification("notifications/initialized", None))
            .await
            .unwrap();
        for id in [7, 8] {
            let response = transport.call(RpcRequest::call(id, "ping", None)).await.unwrap();
            assert_eq!(response.id, Some(id));
            assert_eq!(response.result, Some(json!({"echo": id})));
        }
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn an_unanswered_request_does_not_block_its_siblings() {
        // Answers every request except id 1.
        let script = r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  [ -z "$id" ] && continue
  [ "$id" = 1 ] && continue
  echo "{\"jsonrpc\":\"2.0\",\"id\":$id,\"result\":{\"echo\":$id}}"
done
"#;
        let transport = Arc::new(StdioTransport::new(
            "sh",
            vec!["-c".to_owned(), script.to_owned()],
            BTreeMap::new(),
        ));

        let stuck = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { transport.call(RpcRequest::call(1, "slow", None)).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        let answered = tokio::time::timeout(
            Duration::from_secs(5),
            transport.call(RpcRequest::call(2, "fast", None)),
        )
        .await
        .expect("sibling request waited behind the unanswered one")
        .unwrap();
        assert_eq!(answered.result, Some(json!({"echo": 2})));
        assert!(!stuck.is_finished());

        stuck.abort();
        let _ = stuck.await;
        let process = transport.process.lock().await;
        let waiting = process.as_ref().map(|process| routes(&process.pending).waiters.len());
        assert_eq!(waiting, Some(0));
    }

    #[tokio::test]
    async fn missing_programs_are_transport_errors() {
        let transport = StdioTransport::new("/nonexistent/tool-server", Vec::new(), BTreeMap::new());
        let err = transport.call(RpcRequest::call(1, "initialize", None)).await.unwrap_err();
        assert!(matches!(err, AdapterError::Transport { .. }));
    }
}
