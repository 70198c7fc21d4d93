//! Loopback receiver for the authorization redirect.
//!
//! Listens on `127.0.0.1` on an ephemeral port and waits for the browser to
//! be redirected back with `?code=...&state=...` (or `?error=...`).

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use url::Url;

use crate::error::{AttachError, Result};

const SUCCESS_PAGE: &str = "<html><body><p>Authorization complete. You may close this window.</p></body></html>";
const FAILURE_PAGE: &str = "<html><body><p>Authorization failed. Check the terminal for details.</p></body></html>";

/// How long an accepted connection may stay silent before it is dropped.
///
/// Browsers may open a speculative connection and never send on it.
const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// What the redirect carried.
#[derive(Debug, PartialEq, Eq)]
pub enum Redirect {
    /// An authorization code whose `state` matched.
    Code(String),
    /// A request unrelated to the flow (e.g. `/favicon.ico`).
    Unrelated,
}

pub struct LoopbackReceiver {
    listener: TcpListener,
    addr: SocketAddr,
    read_timeout: Duration,
}

impl LoopbackReceiver {
    pub fn bind() -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .map_err(|e| AttachError::AuthGrant(format!("cannot listen for redirect: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| AttachError::AuthGrant(format!("cannot listen for redirect: {e}")))?;
        Ok(Self {
            listener,
            addr,
            read_timeout: READ_TIMEOUT,
        })
    }

    /// Change how long an idle connection is waited on.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// The redirect URI to register in the authorization request.
    pub fn redirect_uri(&self) -> String {
        format!("http://{}:{}/", self.addr.ip(), self.addr.port())
    }

    /// Block until the browser delivers the authorization code.
    pub fn wait_for_code(&self, expected_state: &str) -> Result<String> {
        for stream in self.listener.incoming() {
            let mut stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    tracing::debug!(error = %e, "Failed to accept redirect connection");
                    continue;
                }
            };

            let request_line = match read_request_line(&stream, self.read_timeout) {
                Ok(line) => line,
                Err(e) => {
                    tracing::debug!(error = %e, "Dropping silent or broken redirect connection");
                    continue;
                }
            };
            match parse_redirect(&request_line, expected_state) {
                Ok(Redirect::Code(code)) => {
                    respond(&mut stream, "200 OK", SUCCESS_PAGE);
                    return Ok(code);
                }
                Ok(Redirect::Unrelated) => {
                    respond(&mut stream, "404 Not Found", "");
                }
                Err(e) => {
                    respond(&mut stream, "400 Bad Request", FAILURE_PAGE);
                    return Err(e);
                }
            }
        }
        Err(AttachError::AuthGrant(
            "redirect listener closed before authorization completed".into(),
        ))
    }
}

fn read_request_line(stream: &TcpStream, timeout: Duration) -> std::io::Result<String> {
    stream.set_read_timeout(Some(timeout))?;
    let mut line = String::new();
    BufReader::new(stream).read_line(&mut line)?;
    if line.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed before a request line",
        ));
    }
    Ok(line)
}

fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(e) = stream.write_all(response.as_bytes()) {
        tracing::debug!(error = %e, "Failed to answer redirect request");
    }
}

/// Interpret the request line of a redirect (`GET /?code=..&state=.. HTTP/1.1`).
pub fn parse_redirect(request_line: &str, expected_state: &str) -> Result<Redirect> {
    let target = request_line.split_whitespace().nth(1).unwrap_or("");
    let url = Url::parse(&format!("http://127.0.0.1{target}"))
        .map_err(|e| AttachError::AuthGrant(format!("malformed redirect: {e}")))?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(AttachError::AuthGrant(format!(
            "authorization server returned '{error}'"
        )));
    }
    if code.is_none() && state.is_none() {
        return Ok(Redirect::Unrelated);
    }
    if state.as_deref() != Some(expected_state) {
        return Err(AttachError::AuthGrant(
            "state mismatch in authorization redirect".into(),
        ));
    }
    code.filter(|c| !c.is_empty())
        .map(Redirect::Code)
        .ok_or_else(|| AttachError::AuthGrant("redirect carried no authorization code".into()))
}
