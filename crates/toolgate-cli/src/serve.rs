// crates/toolgate-cli/src/serve.rs
// ============================================================================
// Module: Line Protocol Server
// Description: Reads commands from a line stream and writes JSON responses.
// Purpose: Drive the dispatcher from stdin with one task per command.
// Dependencies: serde, serde_json, thiserror, tokio, toolgate-core, toolgate-dispatch
// ============================================================================

//! ## Overview
//! Each input line has the form `<identity> <command> [payload]`. A payload
//! starting with `@` is a file reference; anything else is free text. Every
//! line is dispatched on its own task, so a slow tool never holds up other
//! identities, and responses are written as JSON lines as they complete. The
//! `line` field correlates a response with its request.
//!
//! Blank lines are skipped. Lines that do not parse, are not UTF-8, or exceed
//! [`MAX_LINE_BYTES`] are answered with a `malformed_request` error and never
//! reach the dispatcher. At most one line's worth of bytes is buffered.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use toolgate_core::Artifact;
use toolgate_core::FileRef;
use toolgate_core::Identity;
use toolgate_core::KeyStore;
use toolgate_core::Payload;
use toolgate_core::UsageMeter;
use toolgate_dispatch::DispatchError;
use toolgate_dispatch::Dispatcher;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted request line length in bytes.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Bytes buffered per read: the line limit plus a CRLF terminator.
const LINE_READ_LIMIT: u64 = MAX_LINE_BYTES as u64 + 2;

/// Prefix marking a payload as a file reference.
const FILE_PAYLOAD_PREFIX: char = '@';

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Requester identity.
    pub identity: Identity,
    /// Command label as received.
    pub command: String,
    /// Command payload.
    pub payload: Payload,
}

/// Request parse errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The line lacks an identity or command.
    #[error("expected `<identity> <command> [payload]`")]
    MissingFields,
    /// The line exceeds [`MAX_LINE_BYTES`].
    #[error("request line exceeds {MAX_LINE_BYTES} bytes")]
    TooLong,
    /// A file payload named no path.
    #[error("file payload requires a path after `@`")]
    EmptyFilePath,
    /// The line is not valid UTF-8.
    #[error("request line is not valid UTF-8")]
    InvalidUtf8,
}

/// Parses one request line. Returns `Ok(None)` for blank lines.
///
/// # Errors
///
/// Returns [`RequestError`] when the line is too long or incomplete.
pub fn parse_request(line: &str) -> Result<Option<Request>, RequestError> {
    if line.len() > MAX_LINE_BYTES {
        return Err(RequestError::TooLong);
    }
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (identity, rest) = line.split_once(char::is_whitespace).ok_or(RequestError::MissingFields)?;
    let rest = rest.trim_start();
    let (command, payload) = match rest.split_once(char::is_whitespace) {
        Some((command, payload)) => (command, payload.trim()),
        None => (rest, ""),
    };
    if command.is_empty() {
        return Err(RequestError::MissingFields);
    }
    let payload = if payload.is_empty() {
        Payload::Empty
    } else if let Some(path) = payload.strip_prefix(FILE_PAYLOAD_PREFIX) {
        if path.is_empty() {
            return Err(RequestError::EmptyFilePath);
        }
        Payload::File(FileRef {
            path: PathBuf::from(path),
            name: None,
        })
    } else {
        Payload::Text(payload.to_string())
    };
    Ok(Some(Request {
        identity: Identity::new(identity),
        command: command.to_string(),
        payload,
    }))
}

// ============================================================================
// SECTION: Responses
// ============================================================================

/// One JSON response line.
#[derive(Debug, Serialize)]
pub struct Response {
    /// 1-based input line number.
    pub line: u64,
    /// Requester identity, when the line parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    /// Command label, when the line parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Outcome.
    #[serde(flatten)]
    pub body: ResponseBody,
}

/// Response outcome.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResponseBody {
    /// The handler produced an artifact.
    Ok {
        /// Handler output.
        artifact: Artifact,
    },
    /// The command did not produce an artifact.
    Error {
        /// Failure details.
        error: ErrorBody,
    },
}

/// Failure details.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Stable error kind label.
    pub kind: &'static str,
    /// Tool failure code, for handler failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable message.
    pub message: String,
}

impl From<&DispatchError> for ErrorBody {
    fn from(error: &DispatchError) -> Self {
        let code = match error {
            DispatchError::HandlerFailed {
                cause,
            } => Some(cause.code.clone()),
            _ => None,
        };
        Self {
            kind: error.kind(),
            code,
            message: error.to_string(),
        }
    }
}

impl Response {
    /// Builds a response for a dispatched request.
    fn dispatched(line: u64, request: &Request, result: Result<Artifact, DispatchError>) -> Self {
        let body = match result {
            Ok(artifact) => ResponseBody::Ok {
                artifact,
            },
            Err(err) => ResponseBody::Error {
                error: ErrorBody::from(&err),
            },
        };
        Self {
            line,
            identity: Some(request.identity.as_str().to_string()),
            command: Some(request.command.clone()),
            body,
        }
    }

    /// Builds a response for a line that did not parse.
    fn malformed(line: u64, error: &RequestError) -> Self {
        Self {
            line,
            identity: None,
            command: None,
            body: ResponseBody::Error {
                error: ErrorBody {
                    kind: "malformed_request",
                    code: None,
                    message: error.to_string(),
                },
            },
        }
    }
}

// ============================================================================
// SECTION: Serve Loop
// ============================================================================

/// Serve loop errors.
#[derive(Debug, Error)]
pub enum ServeError {
    /// Reading requests failed.
    #[error("input error: {0}")]
    Input(String),
    /// Writing responses failed.
    #[error("output error: {0}")]
    Output(String),
}

/// Serve loop statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeSummary {
    /// Requests handed to the dispatcher.
    pub dispatched: u64,
    /// Lines rejected before dispatch.
    pub malformed: u64,
}

/// Serves requests from `reader` until end of input, writing responses to
/// `writer`. Returns once every dispatched command has answered.
///
/// # Errors
///
/// Returns [`ServeError`] when the input cannot be read or the output cannot
/// be written.
pub async fn serve_lines<S, U, R, W>(
    dispatcher: Arc<Dispatcher<S, U>>,
    reader: R,
    writer: &mut W,
) -> Result<ServeSummary, ServeError>
where
    S: KeyStore + Send + Sync + 'static,
    U: UsageMeter + Send + Sync + 'static,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (sender, receiver) = mpsc::unbounded_channel();
    let (read_result, write_result) =
        tokio::join!(read_requests(dispatcher, reader, sender), write_responses(receiver, writer));
    let summary = read_result?;
    write_result?;
    Ok(summary)
}

/// One input line, bounded by [`MAX_LINE_BYTES`].
enum RawLine {
    /// Line bytes without the terminator.
    Line(Vec<u8>),
    /// The line was over the limit; its bytes were discarded.
    TooLong,
}

/// Reads the next line without buffering more than [`LINE_READ_LIMIT`]
/// bytes. Returns `None` at end of input.
async fn next_raw_line<R>(reader: &mut R) -> io::Result<Option<RawLine>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    if (&mut *reader).take(LINE_READ_LIMIT).read_until(b'\n', &mut buf).await? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if buf.len() > MAX_LINE_BYTES {
        // Skip the rest of the oversized line in bounded chunks.
        loop {
            buf.clear();
            let read = (&mut *reader).take(LINE_READ_LIMIT).read_until(b'\n', &mut buf).await?;
            if read == 0 || buf.last() == Some(&b'\n') {
                break;
            }
        }
        return Ok(Some(RawLine::TooLong));
    }
    if buf.len() > MAX_LINE_BYTES {
        return Ok(Some(RawLine::TooLong));
    }
    Ok(Some(RawLine::Line(buf)))
}

/// Decodes and parses one raw line.
fn parse_raw_line(raw: RawLine) -> Result<Option<Request>, RequestError> {
    match raw {
        RawLine::Line(bytes) => {
            let line = String::from_utf8(bytes).map_err(|_| RequestError::InvalidUtf8)?;
            parse_request(&line)
        }
        RawLine::TooLong => Err(RequestError::TooLong),
    }
}

/// Reads lines and spawns one dispatch task per request.
///
/// Lines that are oversized, not UTF-8, or incomplete are answered with
/// `malformed_request`; only I/O failures on the input stop the loop.
async fn read_requests<S, U, R>(
    dispatcher: Arc<Dispatcher<S, U>>,
    mut reader: R,
    sender: mpsc::UnboundedSender<Response>,
) -> Result<ServeSummary, ServeError>
where
    S: KeyStore + Send + Sync + 'static,
    U: UsageMeter + Send + Sync + 'static,
    R: AsyncBufRead + Unpin,
{
    let mut summary = ServeSummary::default();
    let mut number = 0u64;
    while let Some(raw) =
        next_raw_line(&mut reader).await.map_err(|err| ServeError::Input(err.to_string()))?
    {
        number += 1;
        let request = match parse_raw_line(raw) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(err) => {
                summary.malformed += 1;
                // The receiver is drained until every sender is dropped.
                let _ = sender.send(Response::malformed(number, &err));
                continue;
            }
        };
        summary.dispatched += 1;
        let dispatcher = Arc::clone(&dispatcher);
        let sender = sender.clone();
        tokio::spawn(async move {
            let result =
                dispatcher.handle(&request.identity, &request.command, request.payload.clone()).await;
            // The writer outlives this sender.
            let _ = sender.send(Response::dispatched(number, &request, result));
        });
    }
    Ok(summary)
}

/// Writes responses as JSON lines until every sender is gone.
async fn write_responses<W>(
    mut receiver: mpsc::UnboundedReceiver<Response>,
    writer: &mut W,
) -> Result<(), ServeError>
where
    W: AsyncWrite + Unpin,
{
    let mut failure = None;
    while let Some(response) = receiver.recv().await {
        if failure.is_some() {
            continue;
        }
        if let Err(err) = write_response(writer, &response).await {
            failure = Some(err);
        }
    }
    failure.map_or(Ok(()), Err)
}

/// Serializes and flushes one response line.
async fn write_response<W>(writer: &mut W, response: &Response) -> Result<(), ServeError>
where
    W: AsyncWrite + Unpin,
{
    let mut bytes =
        serde_json::to_vec(response).map_err(|err| ServeError::Output(err.to_string()))?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await.map_err(|err| ServeError::Output(err.to_string()))?;
    writer.flush().await.map_err(|err| ServeError::Output(err.to_string()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
