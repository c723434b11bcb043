use thiserror::Error;

/// Errors surfaced by the proxy gateway client.
///
/// Display messages are user-facing: the orchestrator forwards them to the
/// notifier verbatim.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// 404, or a well-formed response with no usable result (e.g. an empty
    /// geocode array). The message is endpoint-specific.
    #[error("{0}")]
    NotFound(String),

    #[error("authorization failed, check the API key configured on the proxy")]
    AuthFailure,

    #[error("request limit exceeded, try again later")]
    RateLimited,

    #[error("proxy or upstream service unavailable (status {status}), try again later")]
    UpstreamUnavailable { status: u16 },

    /// A 2xx response that was not JSON, or JSON that does not match the
    /// expected shape.
    #[error("unexpected response format: {0}")]
    UnexpectedFormat(String),

    /// Transport-level failure from the underlying HTTP client.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Any other non-2xx status, carrying the upstream message when one
    /// could be extracted from the body.
    #[error("{context} failed: {message}")]
    Generic {
        context: &'static str,
        message: String,
    },
}

/// Errors from the platform geolocation capability. All are terminal for a
/// single resolution attempt; naming failures are handled separately and
/// never surface through this type.
#[derive(Debug, Error)]
pub enum LocationError {
    #[error("location access was denied")]
    PermissionDenied,

    #[error("location information is unavailable")]
    PositionUnavailable,

    #[error("timed out waiting for a location fix")]
    Timeout,

    #[error("no geolocation capability is available")]
    Unsupported,

    #[error("location error: {0}")]
    Unknown(String),
}
