//! # Request task
//!
//! The unit of work for one HTTP exchange. A task runs start to finish on a
//! single worker thread:
//!
//! 1. **Validate**: only `POST` with a non-empty body reaches the model.
//! 2. **Process**: fetch the worker's runner from its [`ModelSlot`] and run it.
//! 3. **Respond**: status, headers and body go back through the
//!    [`ResponseWriter`].
//! 4. **Log**: one access-log line with the byte length of the body.
//!
//! Success bodies are a JSON array of records. Failure bodies are a single
//! JSON string; clients depend on that difference.

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::Full;
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE, DATE, LAST_MODIFIED, REFERER, SERVER, USER_AGENT};
use hyper::{HeaderMap, Method, Response, StatusCode, Version};
use textpool_core::{ModelConfig, ModelRunner, SERVER_IDENTIFIER};
use tokio::sync::oneshot;

use crate::access_log::AccessLog;
use crate::pool::WorkerContext;
use crate::slot::ModelSlot;

pub type ResponseBody = Full<Bytes>;

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// The parts of a request that outlive body collection: what the task
/// needs to validate it and what the access log prints.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    pub path: String,
    pub version: Version,
    pub client: Option<SocketAddr>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestInfo {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            version: Version::HTTP_11,
            client: None,
            referrer: None,
            user_agent: None,
        }
    }

    pub fn from_parts(parts: &hyper::http::request::Parts, client: Option<SocketAddr>) -> Self {
        let referrer = header_str(&parts.headers, REFERER.as_str()).or_else(|| header_str(&parts.headers, "referrer"));
        Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            version: parts.version,
            client,
            referrer,
            user_agent: header_str(&parts.headers, USER_AGENT.as_str()),
        }
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// A request with its fully collected body. An absent body is empty.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub info: RequestInfo,
    pub body: Bytes,
}

/// Hands the finished response back to the transport.
pub trait ResponseWriter: Send {
    fn write(self: Box<Self>, response: Response<ResponseBody>) -> std::io::Result<()>;
}

/// Writes into the connection task awaiting this exchange.
pub struct OneshotWriter(pub oneshot::Sender<Response<ResponseBody>>);

impl ResponseWriter for OneshotWriter {
    fn write(self: Box<Self>, response: Response<ResponseBody>) -> std::io::Result<()> {
        self.0.send(response).map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "client connection closed before the response was written",
            )
        })
    }
}

/// Status and body decided for one exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: String,
    pub allow_post: bool,
}

impl Reply {
    pub fn not_post() -> Self {
        Self {
            status: StatusCode::METHOD_NOT_ALLOWED,
            body: "Not POST.\n".to_string(),
            allow_post: true,
        }
    }

    pub fn empty_post() -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: "Empty POST.\n".to_string(),
            allow_post: false,
        }
    }

    pub fn busy() -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: "Busy.\n".to_string(),
            allow_post: false,
        }
    }

    fn extracted(json: String) -> Self {
        Self {
            status: StatusCode::OK,
            body: json,
            allow_post: false,
        }
    }

    /// 500 with the message encoded as a JSON string.
    pub(crate) fn failed(diagnostic: &str) -> Self {
        let message = format!("Unable to extract: {diagnostic}");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: serde_json::Value::String(message).to_string(),
            allow_post: false,
        }
    }
}

pub struct RequestTask {
    exchange: Exchange,
    writer: Box<dyn ResponseWriter>,
    model: Arc<ModelConfig>,
    access_log: AccessLog,
}

impl RequestTask {
    pub fn new(
        exchange: Exchange,
        writer: Box<dyn ResponseWriter>,
        model: Arc<ModelConfig>,
        access_log: AccessLog,
    ) -> Self {
        Self {
            exchange,
            writer,
            model,
            access_log,
        }
    }

    /// Runs the task on the calling worker. Never panics outward and never
    /// returns an error: every failure is answered or logged here.
    pub fn execute<R: ModelRunner>(self, worker: &mut WorkerContext<R>) {
        let RequestTask {
            exchange,
            writer,
            model,
            access_log,
        } = self;

        let started = Utc::now();
        let reply = process(&exchange, &mut worker.slot, &model);
        deliver(reply, started, writer, &access_log, &worker.name, &exchange.info);
    }

    pub(crate) fn into_parts(self) -> (Exchange, Box<dyn ResponseWriter>, AccessLog) {
        (self.exchange, self.writer, self.access_log)
    }
}

/// Validation and model invocation. Returns what to answer; writes nothing.
pub fn process<R: ModelRunner>(exchange: &Exchange, slot: &mut ModelSlot<R>, model: &ModelConfig) -> Reply {
    if exchange.info.method != Method::POST {
        return Reply::not_post();
    }
    if exchange.body.is_empty() {
        return Reply::empty_post();
    }

    let text = String::from_utf8_lossy(&exchange.body);
    match extract(slot, model, &text) {
        Ok(json) => Reply::extracted(json),
        Err(diagnostic) => {
            tracing::debug!("Extraction failed: {diagnostic}");
            Reply::failed(&diagnostic)
        }
    }
}

fn extract<R: ModelRunner>(slot: &mut ModelSlot<R>, model: &ModelConfig, text: &str) -> Result<String, String> {
    let runner = slot
        .get_or_init(model)
        .map_err(|reason| format!("Unable to initialize model runner.\nCaused by: {reason}"))?;

    let records = match std::panic::catch_unwind(AssertUnwindSafe(|| runner.run(text))) {
        Ok(Ok(Some(records))) => records,
        Ok(Ok(None)) => return Err("Model processing results are nil.".to_string()),
        Ok(Err(e)) => return Err(error_chain(&e)),
        Err(panic) => {
            let reason = format!("model runner panicked: {}", panic_message(panic.as_ref()));
            tracing::error!("{reason}; retiring the runner on this worker");
            slot.poison(reason.clone());
            return Err(reason);
        }
    };

    serde_json::to_string(&records).map_err(|e| format!("Unable to encode results: {e}"))
}

/// Builds the response, hands it to the writer, then logs the access line.
/// A failed write abandons the request without an access line.
pub(crate) fn deliver(
    reply: Reply,
    started: DateTime<Utc>,
    writer: Box<dyn ResponseWriter>,
    access_log: &AccessLog,
    worker: &str,
    info: &RequestInfo,
) {
    let status = reply.status;
    let bytes = reply.body.len();

    match writer.write(build_response(reply, started)) {
        Ok(()) => access_log.record(worker, info, status, bytes),
        Err(e) => tracing::error!("Request failed: {}", error_chain(&e)),
    }
}

pub fn build_response(reply: Reply, started: DateTime<Utc>) -> Response<ResponseBody> {
    let mut response = Response::new(Full::new(Bytes::from(reply.body)));
    *response.status_mut() = reply.status;

    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers.insert(SERVER, HeaderValue::from_static(SERVER_IDENTIFIER));
    if let Ok(date) = HeaderValue::from_str(&started.format(HTTP_DATE_FORMAT).to_string()) {
        headers.insert(DATE, date.clone());
        headers.insert(LAST_MODIFIED, date);
    }
    if reply.allow_post {
        headers.insert(ALLOW, HeaderValue::from_static("POST"));
    }
    response
}

/// Renders an error and its `source()` chain, one cause per line.
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        out.push_str("\nCaused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
