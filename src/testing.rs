//! Fixtures shared by the unit tests: contexts, scripted model clients,
//! canned tools and a tiny HTTP responder.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    runtime::Handle,
};

use crate::{
    config::Limits,
    error::{BlockError, ErrorKind},
    llm::{ChatRequest, ChatResponse, LlmClient},
    runtime::{Channel, Context, Services},
    tools::{Tool, ToolError},
};

pub fn test_context(input: Value) -> Arc<Context> {
    test_context_with(input, Services::default())
}

pub fn test_context_with(
    input: Value,
    services: Services,
) -> Arc<Context> {
    test_context_with_limits(input, services, Limits::default())
}

pub fn test_context_with_limits(
    input: Value,
    services: Services,
    limits: Limits,
) -> Arc<Context> {
    let channel = Arc::new(Channel::new(64, 64, Handle::current()));
    Arc::new(Context::new("test-exec", input, Map::new(), Vec::new(), channel, services, limits))
}

#[derive(Default)]
struct Script {
    responses: VecDeque<Result<ChatResponse, BlockError>>,
    requests: Vec<ChatRequest>,
}

/// Model client replaying canned responses in order.
#[derive(Clone, Default)]
pub struct ScriptedLlm {
    script: Arc<Mutex<Script>>,
}

impl ScriptedLlm {
    pub fn new(responses: Vec<Result<ChatResponse, BlockError>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                responses: responses.into(),
                requests: Vec::new(),
            })),
        }
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.script.lock().unwrap().requests.clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(
        &self,
        request: ChatRequest,
    ) -> Result<ChatResponse, BlockError> {
        let mut script = self.script.lock().unwrap();
        script.requests.push(request);
        script.responses.pop_front().unwrap_or_else(|| Err(BlockError::new(ErrorKind::Permanent, "script exhausted")))
    }
}

/// Returns its arguments.
pub struct EchoTool {
    name: String,
}

impl EchoTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Echo the arguments back"
    }

    async fn execute(
        &self,
        arguments: Value,
    ) -> Result<Value, ToolError> {
        Ok(arguments)
    }
}

/// Always fails with the same error.
pub struct FailingTool {
    name: String,
    error: ToolError,
}

impl FailingTool {
    pub fn new(
        name: &str,
        message: &str,
        kind: Option<ErrorKind>,
    ) -> Self {
        Self {
            name: name.to_string(),
            error: ToolError {
                kind,
                ..ToolError::new(message)
            },
        }
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        _arguments: Value,
    ) -> Result<Value, ToolError> {
        Err(self.error.clone())
    }
}

/// Replays canned results in order, then fails permanently.
pub struct ScriptedTool {
    name: String,
    results: Mutex<VecDeque<Result<Value, ToolError>>>,
}

impl ScriptedTool {
    pub fn new(
        name: &str,
        results: Vec<Result<Value, ToolError>>,
    ) -> Self {
        Self {
            name: name.to_string(),
            results: Mutex::new(results.into()),
        }
    }
}

#[async_trait]
impl Tool for ScriptedTool {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        _arguments: Value,
    ) -> Result<Value, ToolError> {
        self.results.lock().unwrap().pop_front().unwrap_or_else(|| Err(ToolError::new("script exhausted").with_kind(ErrorKind::Permanent)))
    }
}

/// Sleeps, then returns `"slept"`.
pub struct SleepTool {
    name: String,
    delay: Duration,
}

impl SleepTool {
    pub fn new(
        name: &str,
        delay: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            delay,
        }
    }
}

#[async_trait]
impl Tool for SleepTool {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        _arguments: Value,
    ) -> Result<Value, ToolError> {
        tokio::time::sleep(self.delay).await;
        Ok(json!("slept"))
    }
}

pub struct PanicTool {
    name: String,
}

impl PanicTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Tool for PanicTool {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        _arguments: Value,
    ) -> Result<Value, ToolError> {
        panic!("tool blew up");
    }
}

/// Tracks the highest number of concurrent invocations.
pub struct CountingTool {
    name: String,
    delay: Duration,
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl CountingTool {
    pub fn new(
        name: &str,
        delay: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            delay,
            current: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn peak(&self) -> Arc<AtomicUsize> {
        self.peak.clone()
    }
}

#[async_trait]
impl Tool for CountingTool {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        _arguments: Value,
    ) -> Result<Value, ToolError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(json!(now))
    }
}

/// Canned reply of [`http_responder`].
pub struct TestResponse {
    status: u16,
    body: String,
    headers: Vec<(String, String)>,
}

impl TestResponse {
    pub fn new(
        status: u16,
        body: &str,
    ) -> Self {
        Self {
            status,
            body: body.to_string(),
            headers: Vec::new(),
        }
    }

    pub fn header(
        mut self,
        name: &str,
        value: &str,
    ) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    fn encode(&self) -> String {
        let mut out = format!("HTTP/1.1 {} Test\r\nContent-Length: {}\r\nConnection: close\r\n", self.status, self.body.len());
        for (name, value) in &self.headers {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str("\r\n");
        out.push_str(&self.body);
        out
    }
}

/// Serve `responses` in order, one per connection. Returns the base url.
pub async fn http_responder(responses: Vec<TestResponse>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        for response in responses {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            read_request(&mut socket).await;
            let _ = socket.write_all(response.encode().as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });
    format!("http://{addr}/hook")
}

/// Consume the head and the `Content-Length` body of one request.
async fn read_request(socket: &mut tokio::net::TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let Ok(n) = socket.read(&mut chunk).await else {
            return;
        };
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        let Some(head_end) = text.find("\r\n\r\n") else {
            continue;
        };
        let length = text[..head_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length").then(|| value.trim().parse::<usize>().ok()).flatten()
            })
            .unwrap_or(0);
        if buf.len() >= head_end + 4 + length {
            return;
        }
    }
}
