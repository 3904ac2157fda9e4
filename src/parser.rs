//! Access-log line parser: turns one raw line into a [`Record`] or a typed
//! parse failure.
//!
//! The grammar covers the proxy log format
//! `$remote_addr $http_x_forwarded_for $remote_user [$time_local] $scheme
//! "$request" $status $body_bytes_sent "$http_referer" "$http_user_agent"
//! "$gzip_ratio" $upstream_response_time $request_time`.
//!
//! Structural fields (timestamp, request line, URL) define record identity
//! and reject the line when unparsable. Numeric measurement fields degrade
//! to zero instead: a zeroed metric is less harmful than dropping an
//! otherwise valid record.

use std::sync::LazyLock;

use chrono::{FixedOffset, NaiveDateTime};
use http::Uri;
use regex::Regex;
use tokio::sync::mpsc::{Receiver, Sender};
use tracing::warn;

use crate::record::{RawLine, Record};

/// `$time_local` format. The trailing `+0000` is literal placeholder text
/// written by the proxy, not an authoritative zone; the parsed timestamp is
/// reinterpreted in the configured offset.
const TIME_LOCAL_FORMAT: &str = "%d/%b/%Y:%H:%M:%S +0000";

/// Compiled once and shared by every parse call; no per-call state.
///
/// `$body_bytes_sent` is captured as `\S+` rather than `\d+` so that a
/// garbage byte count degrades to 0 instead of rejecting the whole line.
static LINE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"([\d\.]+)\s+([^ \[]+)\s+([^ \[]+)\s+\[([^\]]+)\]\s+([a-z]+)\s+"([^"]+)"\s+(\d{3})\s+(\S+)\s+"([^"]+)"\s+"(.*?)"\s+"([\d\.-]+)"\s+([\d\.-]+)\s+([\d\.-]+)"#,
    )
    .expect("access-log pattern is a valid regex")
});

/// Typed parse failure, carrying the offending input for diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The line does not match the access-log grammar at all.
    #[error("line does not match access-log grammar: {0:?}")]
    MalformedLine(String),

    /// `$time_local` did not parse with the expected format.
    #[error("unparsable time_local {field:?}: {reason}")]
    BadTimestamp { field: String, reason: String },

    /// The quoted request line has fewer than method/url/protocol tokens.
    #[error("request line has too few tokens: {0:?}")]
    BadRequestLine(String),

    /// The request URL token is not a parsable URI.
    #[error("unparsable request url {url:?}: {reason}")]
    BadUrl { url: String, reason: String },
}

/// Stateless line parser; the zone is fixed at construction time.
#[derive(Debug, Clone, Copy)]
pub struct LineParser {
    zone: FixedOffset,
}

impl LineParser {
    pub fn new(zone: FixedOffset) -> Self {
        Self { zone }
    }

    /// Parse one raw line into a `Record`.
    ///
    /// Pure and idempotent: the same bytes always yield the same record.
    pub fn parse(&self, raw: &[u8]) -> Result<Record, ParseError> {
        let line = String::from_utf8_lossy(raw);
        let caps = LINE_PATTERN
            .captures(&line)
            .ok_or_else(|| ParseError::MalformedLine(line.to_string()))?;

        let time_local = &caps[4];
        let naive = NaiveDateTime::parse_from_str(time_local, TIME_LOCAL_FORMAT).map_err(
            |err| ParseError::BadTimestamp {
                field: time_local.to_string(),
                reason: err.to_string(),
            },
        )?;
        let timestamp = naive
            .and_local_timezone(self.zone)
            .single()
            .ok_or_else(|| ParseError::BadTimestamp {
                field: time_local.to_string(),
                reason: "ambiguous local time".to_string(),
            })?;

        let request = &caps[6];
        let tokens: Vec<&str> = request.split(' ').collect();
        if tokens.len() < 3 {
            return Err(ParseError::BadRequestLine(request.to_string()));
        }
        let method = tokens[0].trim_start_matches('"').to_string();
        let uri: Uri = tokens[1].parse().map_err(|err: http::uri::InvalidUri| {
            ParseError::BadUrl {
                url: tokens[1].to_string(),
                reason: err.to_string(),
            }
        })?;

        Ok(Record {
            timestamp,
            path: uri.path().to_string(),
            method,
            scheme: caps[5].to_string(),
            status: caps[7].to_string(),
            bytes_sent: caps[8].parse().unwrap_or(0),
            upstream_time: caps[12].parse().unwrap_or(0.0),
            request_time: caps[13].parse().unwrap_or(0.0),
        })
    }
}

/// Parse stage: drain raw lines until the source closes its channel, skip
/// malformed input with one diagnostic each, forward records downstream.
pub async fn run(parser: LineParser, mut rx: Receiver<RawLine>, tx: Sender<Record>) {
    while let Some(line) = rx.recv().await {
        match parser.parse(&line) {
            Ok(record) => {
                if tx.send(record).await.is_err() {
                    break; // sink gone
                }
            }
            Err(err) => warn!(error = %err, "skipping malformed line"),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const SAMPLE: &str = "10.0.0.1 - - [10/Nov/2016:00:01:02 +0000] http \"GET /foo?x=1 HTTP/1.1\" 200 1024 \"-\" \"-\" \"-\" 0.010 0.020";

    fn parser() -> LineParser {
        LineParser::new(FixedOffset::east_opt(8 * 3600).unwrap())
    }

    #[test]
    fn parses_well_formed_line() {
        let record = parser().parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(record.path, "/foo");
        assert_eq!(record.method, "GET");
        assert_eq!(record.scheme, "http");
        assert_eq!(record.status, "200");
        assert_eq!(record.bytes_sent, 1024);
        assert_eq!(record.upstream_time, 0.010);
        assert_eq!(record.request_time, 0.020);
        let expected = FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2016, 11, 10, 0, 1, 2)
            .unwrap();
        assert_eq!(record.timestamp, expected);
    }

    #[test]
    fn parse_is_idempotent() {
        let first = parser().parse(SAMPLE.as_bytes()).unwrap();
        let second = parser().parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn strips_host_and_query_from_absolute_url() {
        let line = SAMPLE.replace("/foo?x=1", "http://example.com/bar?q=1");
        let record = parser().parse(line.as_bytes()).unwrap();
        assert_eq!(record.path, "/bar");
    }

    #[test]
    fn rejects_line_not_matching_grammar() {
        let err = parser().parse(b"garbage that is not a log line").unwrap_err();
        assert!(matches!(err, ParseError::MalformedLine(_)));
    }

    #[test]
    fn rejects_unparsable_timestamp() {
        let line = SAMPLE.replace("10/Nov/2016", "99/Nov/2016");
        let err = parser().parse(line.as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::BadTimestamp { .. }));
    }

    #[test]
    fn rejects_short_request_line() {
        let line = SAMPLE.replace("GET /foo?x=1 HTTP/1.1", "PING");
        let err = parser().parse(line.as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::BadRequestLine(_)));
    }

    #[test]
    fn rejects_unparsable_url() {
        let line = SAMPLE.replace("/foo?x=1", ":not-a-url");
        let err = parser().parse(line.as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::BadUrl { .. }));
    }

    #[test]
    fn non_numeric_bytes_sent_degrades_to_zero() {
        let line = SAMPLE.replace(" 1024 ", " oops ");
        let record = parser().parse(line.as_bytes()).unwrap();
        assert_eq!(record.bytes_sent, 0);
        assert_eq!(record.status, "200");
    }

    #[test]
    fn dash_measurements_degrade_to_zero() {
        let line = SAMPLE.replace("0.010 0.020", "- -");
        let record = parser().parse(line.as_bytes()).unwrap();
        assert_eq!(record.upstream_time, 0.0);
        assert_eq!(record.request_time, 0.0);
    }

    #[test]
    fn negative_bytes_sent_degrades_to_zero() {
        let line = SAMPLE.replace(" 1024 ", " -5 ");
        let record = parser().parse(line.as_bytes()).unwrap();
        assert_eq!(record.bytes_sent, 0);
    }
}
