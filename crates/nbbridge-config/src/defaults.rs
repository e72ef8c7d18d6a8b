/// Default log filter expression used by the server.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Python interpreter used to host Jupyter kernels when none is configured.
pub const DEFAULT_PYTHON: &str = "python3";

/// Default log filter expression used by the server.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the server.
#[must_use]
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Default handling of malformed request lines.
#[must_use]
pub fn default_decode_policy() -> crate::decode::DecodePolicy {
    crate::decode::DecodePolicy::Skip
}
