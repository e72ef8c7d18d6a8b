//! JSONL request decoding, routing and response framing.
//!
//! Requests arrive one per line:
//!
//! ```json
//! {"id":1,"body":{"command":"execute","lang":"python3","source":"1+1"}}
//! {"id":2,"body":{"command":"restart_kernel"}}
//! ```
//!
//! and each produces exactly one response line echoing the request id:
//!
//! ```json
//! {"id":1,"body":"<div class=\"jp-Cell jp-CodeCell\">...</div>\n","status":"ok"}
//! {"id":2,"body":"","status":"ok"}
//! ```
//!
//! Kernel start and restart failures come back with `"status":"error"` and an
//! `error` object naming the failure kind.

mod errors;
mod request;
mod response;
mod router;

pub use self::errors::DecodeError;
pub use self::request::{Command, Request};
pub use self::response::{
    ErrorDetail, ErrorKind, Response, ResponseStatus, ResponseWriter, WriteError,
};
pub use self::router::CommandDispatcher;
pub(crate) use self::request::trim_trailing_whitespace;
