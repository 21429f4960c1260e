//! HTTP message structure validation
//!
//! A single-pass state machine that consumes an HTTP request message
//! character by character, enforcing request-line / header / body
//! structure and Content-Length-bounded body consumption. A marker stack
//! models the request scope as a pushdown discipline: one request marker
//! is pushed when validation starts and popped only on acceptance, which
//! keeps the stack activity observable in the transition trace.
//!
//! Chunked transfer encoding, trailers, and multipart bodies are not
//! handled; a message relying on them is rejected by structure.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Bottom-of-stack sentinel.
const STACK_BOTTOM: char = '$';
/// Marker pushed for the request scope.
const REQUEST_MARKER: char = 'R';

/// States of the validation machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidatorState {
    Start,
    Method,
    Space1,
    Uri,
    Space2,
    Version,
    RequestLineCr,
    Headers,
    HeaderName,
    HeaderColon,
    HeaderValue,
    HeaderCr,
    Body,
    Accept,
    Error,
}

impl fmt::Display for ValidatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValidatorState::Start => "start",
            ValidatorState::Method => "method",
            ValidatorState::Space1 => "space1",
            ValidatorState::Uri => "uri",
            ValidatorState::Space2 => "space2",
            ValidatorState::Version => "version",
            ValidatorState::RequestLineCr => "request-line-cr",
            ValidatorState::Headers => "headers",
            ValidatorState::HeaderName => "header-name",
            ValidatorState::HeaderColon => "header-colon",
            ValidatorState::HeaderValue => "header-value",
            ValidatorState::HeaderCr => "header-cr",
            ValidatorState::Body => "body",
            ValidatorState::Accept => "accept",
            ValidatorState::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// Outer validation verdict.
///
/// `Incomplete` means the message ended before the terminating blank
/// line was observed; `Invalid` covers structural violations and
/// malformed or unsatisfied Content-Length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationResult {
    Valid,
    Invalid,
    Incomplete,
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationResult::Valid => write!(f, "valid"),
            ValidationResult::Invalid => write!(f, "invalid"),
            ValidationResult::Incomplete => write!(f, "incomplete"),
        }
    }
}

/// One transition record; `input` is `None` for epsilon actions such as
/// marker pushes and the end-of-input acceptance decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    pub state: ValidatorState,
    pub input: Option<char>,
    pub stack_top: String,
    pub action: String,
}

/// Stack-disciplined HTTP structure validator.
///
/// One instance serves one logical validation at a time; every call to
/// [`Self::run`] or [`Self::validate`] resets all mutable fields first,
/// so calls are independent.
#[derive(Debug, Default)]
pub struct HttpValidator {
    state: ValidatorState,
    stack: Vec<char>,
    trace: Vec<TraceRecord>,

    last_was_cr: bool,
    consecutive_crlfs: u8,
    headers_closed: bool,
    errored: bool,

    headers: HashMap<String, String>,
    current_header_name: String,
    current_header_value: String,

    /// `None` while unknown; known once the header section closes with a
    /// content-length header recorded.
    content_length: Option<usize>,
    body_bytes: usize,
}

impl Default for ValidatorState {
    fn default() -> Self {
        ValidatorState::Start
    }
}

impl HttpValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a message, layering the Incomplete distinction over the
    /// engine's accept/reject.
    pub fn validate(&mut self, message: &str) -> ValidationResult {
        let accepted = self.run(message);

        if accepted {
            ValidationResult::Valid
        } else if self.errored || self.headers_closed {
            ValidationResult::Invalid
        } else {
            // Input ran out before the terminating blank line.
            ValidationResult::Incomplete
        }
    }

    /// Run the engine over the full message. Returns the raw
    /// accept/reject decision.
    pub fn run(&mut self, message: &str) -> bool {
        self.reset();
        self.push_marker(REQUEST_MARKER, "start request");

        for c in message.chars() {
            if !self.step(c) {
                debug!(state = %self.state, "message rejected mid-stream");
                return false;
            }
        }

        self.finish()
    }

    /// Header table recorded by the last run (lower-cased names, trimmed
    /// values; last write wins on duplicate names).
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Transition trace of the last run.
    pub fn trace(&self) -> &[TraceRecord] {
        &self.trace
    }

    pub fn state(&self) -> ValidatorState {
        self.state
    }

    pub fn body_bytes(&self) -> usize {
        self.body_bytes
    }

    fn reset(&mut self) {
        self.state = ValidatorState::Start;
        self.stack.clear();
        self.stack.push(STACK_BOTTOM);
        self.trace.clear();
        self.last_was_cr = false;
        self.consecutive_crlfs = 0;
        self.headers_closed = false;
        self.errored = false;
        self.headers.clear();
        self.current_header_name.clear();
        self.current_header_value.clear();
        self.content_length = None;
        self.body_bytes = 0;
    }

    /// Consume one character; false means the machine entered Error.
    fn step(&mut self, c: char) -> bool {
        match self.state {
            ValidatorState::Start => {
                if is_method_char(c) {
                    self.state = ValidatorState::Method;
                    self.log(Some(c), "begin method");
                } else {
                    return self.fail(c, "expected method");
                }
                self.clear_crlf_tracking();
            }

            ValidatorState::Method => {
                if is_method_char(c) {
                    self.log(Some(c), "method char");
                } else if c == ' ' {
                    self.state = ValidatorState::Space1;
                    self.log(Some(c), "method complete");
                } else {
                    return self.fail(c, "invalid method char");
                }
                self.clear_crlf_tracking();
            }

            ValidatorState::Space1 => {
                if is_uri_char(c) {
                    self.state = ValidatorState::Uri;
                    self.log(Some(c), "begin uri");
                } else {
                    return self.fail(c, "expected uri");
                }
                self.clear_crlf_tracking();
            }

            ValidatorState::Uri => {
                if is_uri_char(c) {
                    self.log(Some(c), "uri char");
                } else if c == ' ' {
                    self.state = ValidatorState::Space2;
                    self.log(Some(c), "uri complete");
                } else {
                    return self.fail(c, "invalid uri char");
                }
                self.clear_crlf_tracking();
            }

            ValidatorState::Space2 => {
                if is_version_char(c) {
                    self.state = ValidatorState::Version;
                    self.log(Some(c), "begin version");
                } else {
                    return self.fail(c, "expected version");
                }
                self.clear_crlf_tracking();
            }

            ValidatorState::Version => {
                if is_version_char(c) {
                    self.log(Some(c), "version char");
                } else if c == '\r' {
                    self.state = ValidatorState::RequestLineCr;
                    self.last_was_cr = true;
                    self.log(Some(c), "request line cr");
                } else {
                    return self.fail(c, "invalid version char");
                }
            }

            ValidatorState::RequestLineCr => {
                if c == '\n' {
                    self.state = ValidatorState::Headers;
                    self.current_header_name.clear();
                    self.current_header_value.clear();
                    self.consecutive_crlfs = 1;
                    self.last_was_cr = false;
                    self.log(Some(c), "request line complete");
                } else {
                    return self.fail(c, "expected lf after cr");
                }
            }

            ValidatorState::Headers => {
                if c == '\r' {
                    self.last_was_cr = true;
                    self.log(Some(c), "cr in headers");
                } else if c == '\n' && self.last_was_cr {
                    self.consecutive_crlfs += 1;
                    self.last_was_cr = false;
                    self.log(Some(c), "crlf in headers");

                    if self.consecutive_crlfs == 2 {
                        self.headers_closed = true;
                        self.state = ValidatorState::Body;
                        self.log(None, "headers complete");
                        if !self.resolve_content_length() {
                            return self.fail_epsilon("invalid content-length");
                        }
                    }
                } else if c.is_ascii_alphabetic() {
                    self.consecutive_crlfs = 0;
                    self.last_was_cr = false;
                    self.state = ValidatorState::HeaderName;
                    self.current_header_name.clear();
                    self.current_header_value.clear();
                    self.current_header_name.push(c.to_ascii_lowercase());
                    self.log(Some(c), "begin header name");
                } else {
                    return self.fail(c, "invalid header start");
                }
            }

            ValidatorState::HeaderName => {
                if c == ':' {
                    self.state = ValidatorState::HeaderColon;
                    while self
                        .current_header_name
                        .ends_with(|ch: char| ch.is_ascii_whitespace())
                    {
                        self.current_header_name.pop();
                    }
                    self.log(Some(c), "header name complete");
                } else if c.is_ascii_alphanumeric() || c == '-' {
                    self.current_header_name.push(c.to_ascii_lowercase());
                    self.log(Some(c), "header name char");
                } else {
                    return self.fail(c, "invalid header name char");
                }
                self.clear_crlf_tracking();
            }

            ValidatorState::HeaderColon => {
                if c == ' ' {
                    self.log(Some(c), "skip space after colon");
                    self.last_was_cr = false;
                } else if c == '\r' {
                    // Empty header value is allowed.
                    self.current_header_value.clear();
                    self.state = ValidatorState::HeaderCr;
                    self.last_was_cr = true;
                    self.log(Some(c), "empty header value");
                } else {
                    self.state = ValidatorState::HeaderValue;
                    self.current_header_value.push(c);
                    self.last_was_cr = false;
                    self.log(Some(c), "begin header value");
                }
            }

            ValidatorState::HeaderValue => {
                if c == '\r' {
                    self.state = ValidatorState::HeaderCr;
                    self.last_was_cr = true;
                    self.log(Some(c), "header value cr");
                } else {
                    self.current_header_value.push(c);
                    self.last_was_cr = false;
                    self.log(Some(c), "header value char");
                }
            }

            ValidatorState::HeaderCr => {
                if c == '\n' && self.last_was_cr {
                    while self
                        .current_header_value
                        .ends_with(|ch: char| ch == ' ' || ch == '\t')
                    {
                        self.current_header_value.pop();
                    }
                    let action = format!(
                        "store header {}: {}",
                        self.current_header_name, self.current_header_value
                    );
                    self.headers.insert(
                        self.current_header_name.clone(),
                        self.current_header_value.clone(),
                    );
                    self.state = ValidatorState::Headers;
                    self.last_was_cr = false;
                    self.consecutive_crlfs = 1;
                    self.log(Some(c), &action);
                } else {
                    return self.fail(c, "expected lf after cr in header");
                }
            }

            ValidatorState::Body => {
                self.body_bytes += 1;
                self.last_was_cr = false;
                self.log(Some(c), "body byte");
            }

            ValidatorState::Accept | ValidatorState::Error => {
                return self.fail(c, "input past final state");
            }
        }

        true
    }

    /// End-of-input acceptance decision, evaluated once.
    fn finish(&mut self) -> bool {
        match self.state {
            ValidatorState::Body => match self.content_length {
                Some(declared) => {
                    if self.body_bytes == declared {
                        self.accept("body length matched")
                    } else {
                        self.log(None, "body length mismatch");
                        self.state = ValidatorState::Error;
                        false
                    }
                }
                // Unknown length: end of input terminates the body.
                None => self.accept("end of input terminates body"),
            },
            ValidatorState::Headers if self.consecutive_crlfs == 2 => self.accept("no body"),
            _ => {
                self.log(None, "input exhausted before message complete");
                self.state = ValidatorState::Error;
                false
            }
        }
    }

    fn accept(&mut self, why: &str) -> bool {
        self.state = ValidatorState::Accept;
        self.log(None, why);
        self.pop_marker("end request");
        true
    }

    /// Parse a recorded content-length header. Absent header means
    /// unknown length; a present but unparsable value is a hard failure.
    fn resolve_content_length(&mut self) -> bool {
        match self.headers.get("content-length") {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(len) => {
                    self.content_length = Some(len);
                    true
                }
                Err(_) => false,
            },
            None => {
                self.content_length = None;
                true
            }
        }
    }

    fn fail(&mut self, c: char, why: &str) -> bool {
        self.log(Some(c), why);
        self.state = ValidatorState::Error;
        self.errored = true;
        false
    }

    fn fail_epsilon(&mut self, why: &str) -> bool {
        self.log(None, why);
        self.state = ValidatorState::Error;
        self.errored = true;
        false
    }

    fn clear_crlf_tracking(&mut self) {
        self.last_was_cr = false;
        self.consecutive_crlfs = 0;
    }

    fn push_marker(&mut self, marker: char, action: &str) {
        self.stack.push(marker);
        self.log(None, &format!("{} (push {})", action, marker));
    }

    fn pop_marker(&mut self, action: &str) {
        if self.stack.last().copied().unwrap_or(STACK_BOTTOM) != STACK_BOTTOM {
            let marker = self.stack.pop().unwrap_or(STACK_BOTTOM);
            self.log(None, &format!("{} (pop {})", action, marker));
        } else {
            self.log(None, &format!("{} (pop failed)", action));
        }
    }

    fn stack_top(&self) -> String {
        self.stack
            .last()
            .map(|c| c.to_string())
            .unwrap_or_default()
    }

    fn log(&mut self, input: Option<char>, action: &str) {
        self.trace.push(TraceRecord {
            state: self.state,
            input,
            stack_top: self.stack_top(),
            action: action.to_string(),
        });
    }
}

fn is_method_char(c: char) -> bool {
    c.is_ascii_uppercase()
}

fn is_uri_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '-' | '_' | '?' | '=' | '&' | '%')
}

fn is_version_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '/')
}
