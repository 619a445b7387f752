#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Reflow Remote
//!
//! Client side of reading from a remote cluster:
//!
//! - [`RemoteTransport`]: the seam to the HTTP client, with [`HttpTransport`]
//!   as the `reqwest` implementation
//! - [`probe`] / [`probe_with_retries`]: version detection
//! - [`RemoteScrollSource`]: initial search and scroll continuation with
//!   retries on rejection
//! - [`RemoteError`]: rejection, status, protocol mismatch and size-bound
//!   failures
//! - [`RequestContext`]: headers propagated into spawned transport calls

pub mod client;
pub mod context;
pub mod error;
pub mod response;
pub mod scroll;
pub mod transport;
pub mod version;

pub use client::{DEFAULT_MAX_RESPONSE_BYTES, HttpTransport, HttpTransportConfig};
pub use context::{RequestContext, spawn_in_context};
pub use error::{RemoteError, TOO_LARGE_MESSAGE, TransportError};
pub use scroll::{Hit, RemoteScrollSource, RemoteSearch, RetryCounter, ScrollPage};
pub use transport::{RemoteRequest, RemoteResponse, RemoteTransport};
pub use version::{probe, probe_with_retries, version_request};
