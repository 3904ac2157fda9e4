use chrono::{DateTime, FixedOffset};

/// One raw log line, newline and carriage return stripped.
pub type RawLine = Vec<u8>;

/// Structured result of parsing one access-log line.
///
/// A `Record` is either fully populated by the parser or not constructed at
/// all; there are no partially filled records in the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Request timestamp, reinterpreted in the configured fixed offset.
    pub timestamp: DateTime<FixedOffset>,
    /// URL path of the request line, query string and host stripped.
    pub path: String,
    /// HTTP method token, leading quote stripped.
    pub method: String,
    /// Scheme as recorded by the upstream proxy ("http" or "https").
    pub scheme: String,
    /// Three-digit status code, kept as text because it is a categorical tag.
    pub status: String,
    /// Response body size in bytes; unparsable input degrades to 0.
    pub bytes_sent: u64,
    /// Upstream response time in seconds; `-` or garbage degrades to 0.
    pub upstream_time: f64,
    /// Total request time in seconds; `-` or garbage degrades to 0.
    pub request_time: f64,
}
