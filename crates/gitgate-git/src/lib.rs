//! Git smart HTTP plumbing for gitgate
//!
//! Translates gateway requests into the CGI calling convention of an external
//! protocol backend (`git http-backend`), parses its CGI response, installs
//! the push-logging hook into repositories and reads the resulting log.

pub mod backend;
pub mod cgi;
pub mod error;
pub mod hook;
pub mod http;
pub mod pushlog;

pub use backend::{HttpBackend, ProtocolBackend};
pub use cgi::{parse_cgi_response, CgiResponse};
pub use error::{Error, Result};
pub use http::{CgiRequest, Endpoint, Service};
pub use pushlog::{parse_push_log, PushLogEntry, RefUpdate};
