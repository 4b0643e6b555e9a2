//! Minimal single threaded HTTP server with a typed route table.
//!
//! One connection at a time, one request per connection. That is a feature:
//! capture and replay monopolize the process anyway, so a waiting client is
//! simply queued in the listen backlog until the line work is done.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// Requests bigger than this are rejected outright.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed request. Header names are lowercased; the query string is split
/// into `key=value` pairs and anything else in it is ignored.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl Request {
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// The body as JSON, or `None` when it is empty or not valid JSON.
    pub fn json_body(&self) -> Option<serde_json::Value> {
        if self.body.trim().is_empty() {
            return None;
        }
        serde_json::from_str(&self.body).ok()
    }
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("malformed request line")]
    BadRequestLine,
    #[error("unsupported method {0:?}")]
    UnknownMethod(String),
    #[error("malformed header line")]
    BadHeader,
    #[error("request body exceeds {} bytes", MAX_BODY_BYTES)]
    BodyTooLarge,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Reads one HTTP/1.x request off `reader`.
pub fn parse_request<R: BufRead>(reader: &mut R) -> Result<Request, RequestError> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let mut parts = line.split_whitespace();
    let method_raw = parts.next().ok_or(RequestError::BadRequestLine)?;
    let target = parts.next().ok_or(RequestError::BadRequestLine)?;
    let method = method_raw
        .parse::<Method>()
        .map_err(|_| RequestError::UnknownMethod(method_raw.to_string()))?;
    let (path, query) = split_target(target);

    let mut headers = BTreeMap::new();
    loop {
        line.clear();
        reader.read_line(&mut line)?;
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            break;
        }
        match trimmed.split_once(':') {
            Some((name, value)) => {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
            None => return Err(RequestError::BadHeader),
        }
    }

    let content_length = headers
        .get("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    if content_length > MAX_BODY_BYTES {
        return Err(RequestError::BodyTooLarge);
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body)?;

    Ok(Request {
        method,
        path,
        query,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

fn split_target(target: &str) -> (String, BTreeMap<String, String>) {
    match target.split_once('?') {
        Some((path, query)) => (path.to_string(), parse_query(query)),
        None => (target.to_string(), BTreeMap::new()),
    }
}

fn parse_query(query: &str) -> BTreeMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[derive(Debug)]
pub struct Response {
    status: u16,
    content_type: &'static str,
    body: String,
}

impl Response {
    pub fn json<T: Serialize>(value: &T) -> Result<Response, HandlerError> {
        let body = serde_json::to_string(value).map_err(|e| HandlerError::Internal(e.to_string()))?;
        Ok(Response {
            status: 200,
            content_type: "application/json",
            body,
        })
    }

    pub fn html<S: Into<String>>(body: S) -> Response {
        Response {
            status: 200,
            content_type: "text/html",
            body: body.into(),
        }
    }

    pub fn not_found() -> Response {
        Response {
            status: 404,
            content_type: "text/html",
            body: "<h1>404 Not Found</h1>".to_string(),
        }
    }

    fn error(status: u16, message: &str) -> Response {
        Response {
            status,
            content_type: "application/json",
            body: serde_json::json!({ "error": message }).to_string(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write!(
            writer,
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            self.status,
            reason(self.status),
            self.content_type,
            self.body.len(),
            self.body
        )
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "",
    }
}

/// Errors a handler may return; each maps to a JSON error response.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl HandlerError {
    fn into_response(self) -> Response {
        match self {
            HandlerError::BadRequest(msg) => Response::error(400, &msg),
            HandlerError::Internal(msg) => Response::error(500, &msg),
        }
    }
}

pub type Handler<S> = fn(&mut S, &Request) -> Result<Response, HandlerError>;

#[derive(Debug, Error, PartialEq)]
pub enum RouterError {
    #[error("route path must be absolute: {0:?}")]
    InvalidPath(String),
    #[error("duplicate route: {method} {path}")]
    Duplicate { method: Method, path: String },
}

/// Route table keyed on method and exact path.
///
/// Registration is the point where mistakes surface: a relative path or a
/// second handler for the same key is rejected right away, not at request
/// time.
pub struct Router<S> {
    routes: BTreeMap<(Method, String), Handler<S>>,
}

impl<S> Router<S> {
    pub fn new() -> Self {
        Router {
            routes: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, method: Method, path: &str, handler: Handler<S>) -> Result<(), RouterError> {
        if !path.starts_with('/') || path.contains(char::is_whitespace) {
            return Err(RouterError::InvalidPath(path.to_string()));
        }
        let key = (method, path.to_string());
        if self.routes.contains_key(&key) {
            return Err(RouterError::Duplicate {
                method,
                path: path.to_string(),
            });
        }
        self.routes.insert(key, handler);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn dispatch(&self, state: &mut S, request: &Request) -> Response {
        match self.routes.get(&(request.method, request.path.clone())) {
            Some(handler) => match handler(state, request) {
                Ok(response) => response,
                Err(err) => {
                    log::warn!("{} {} failed: {}", request.method, request.path, err);
                    err.into_response()
                }
            },
            None => Response::not_found(),
        }
    }
}

impl<S> Default for Router<S> {
    fn default() -> Self {
        Router::new()
    }
}

/// Accept loop. Never returns except on listener failure.
///
/// Handlers run on this thread with exclusive access to `state`, so a
/// request that captures for two seconds holds up the next client for two
/// seconds. Per-connection errors are logged and do not stop the loop.
pub fn serve<S>(listener: TcpListener, router: &Router<S>, state: &mut S) -> io::Result<()> {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                if let Err(err) = serve_once(stream, router, state) {
                    log::debug!("connection error: {}", err);
                }
            }
            Err(err) => log::warn!("accept failed: {}", err),
        }
    }
    Ok(())
}

/// Handles exactly one connection: read a request, dispatch, write, close.
pub fn serve_once<S>(stream: TcpStream, router: &Router<S>, state: &mut S) -> io::Result<()> {
    let peer = stream.peer_addr()?;
    log::debug!("client connected from {}", peer);

    let mut reader = BufReader::new(stream.try_clone()?);
    let mut stream = stream;
    let request = match parse_request(&mut reader) {
        Ok(request) => request,
        Err(err) => {
            log::debug!("rejected request from {}: {}", peer, err);
            return Response::error(400, &err.to_string()).write_to(&mut stream);
        }
    };

    let response = router.dispatch(state, &request);
    log::info!(
        "{} {} -> {} ({} bytes)",
        request.method,
        request.path,
        response.status(),
        response.body().len()
    );
    response.write_to(&mut stream)
}
