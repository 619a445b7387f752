//! Version probe of a remote cluster.

use http::Method;
use reflow_resilience::{BackoffPolicy, retry_with_backoff};
use semver::Version;
use serde::Deserialize;

use crate::error::RemoteError;
use crate::response::decode;
use crate::transport::{RemoteRequest, RemoteTransport};

/// Root endpoint response. Only the version number is read; every other
/// field is ignored so newer remotes keep parsing.
#[derive(Debug, Deserialize)]
pub(crate) struct MainResponse {
    pub(crate) version: VersionInfo,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VersionInfo {
    pub(crate) number: Version,
}

/// The request that asks the remote for its version.
#[must_use]
pub fn version_request() -> RemoteRequest {
    RemoteRequest::new(Method::GET, "/")
}

/// Ask the remote for its version once.
pub async fn probe(transport: &dyn RemoteTransport) -> Result<Version, RemoteError> {
    let response = transport.perform(version_request()).await?;
    let main: MainResponse = decode(response)?;
    tracing::debug!(version = %main.version.number, "resolved remote version");
    Ok(main.version.number)
}

/// [`probe`], retrying rejections with the delays of `policy`.
///
/// Other failures are returned at once. When `policy` runs out, the last
/// rejection is returned.
pub async fn probe_with_retries(
    policy: &BackoffPolicy,
    transport: &dyn RemoteTransport,
) -> Result<Version, RemoteError> {
    retry_with_backoff(
        policy,
        RemoteError::is_rejection,
        |error| tracing::warn!(%error, "remote rejected version probe, retrying"),
        || probe(transport),
    )
    .await
}
