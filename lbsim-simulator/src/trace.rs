//! Trace loading.
//!
//! A trace is a text file with one request per line:
//!
//! ```text
//! "2024-03-01T12:00:00.250Z","0.125"
//! ```
//!
//! The first field is an RFC 3339 timestamp, the second the service time in
//! seconds. Quotes and surrounding whitespace are optional and any further
//! fields are ignored. Lines that do not parse are skipped and counted.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use lbsim_core::request::Request;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("Trace source {} unavailable: {source}", .path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read trace: {0}")]
    Read(#[from] io::Error),
}

#[derive(Debug, Error, PartialEq)]
enum RecordError {
    #[error("expected at least 2 fields, found {0}")]
    FieldCount(usize),
    #[error("invalid timestamp {0:?}")]
    Timestamp(String),
    #[error("invalid service time {0:?}")]
    ServiceTime(String),
    #[error("record is not valid UTF-8")]
    Encoding,
}

/// Requests in file order, plus the number of records that were skipped.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    requests: Vec<Request>,
    skipped: usize,
}

impl Trace {
    pub fn new(requests: Vec<Request>) -> Self {
        Self {
            requests,
            skipped: 0,
        }
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    pub fn into_requests(self) -> Vec<Request> {
        self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Records that failed to parse.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Time between the first and last recorded arrival.
    pub fn span(&self) -> Duration {
        match (self.requests.first(), self.requests.last()) {
            (Some(first), Some(last)) => (last.original_start_time - first.original_start_time)
                .to_std()
                .unwrap_or_default(),
            _ => Duration::ZERO,
        }
    }
}

/// Opens and parses a trace file.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_trace(path: impl AsRef<Path>) -> Result<Trace, TraceError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| TraceError::SourceUnavailable {
        path: path.to_path_buf(),
        source,
    })?;
    let trace = parse_trace(BufReader::new(file))?;
    info!(
        requests = trace.len(),
        skipped = trace.skipped(),
        span_secs = trace.span().as_secs_f64(),
        "Trace loaded"
    );
    Ok(trace)
}

/// Parses trace records from any buffered reader.
pub fn parse_trace<R: BufRead>(mut reader: R) -> Result<Trace, TraceError> {
    let mut trace = Trace::default();
    let mut raw = Vec::new();
    let mut line_number = 0;
    loop {
        raw.clear();
        if reader.read_until(b'\n', &mut raw)? == 0 {
            break;
        }
        line_number += 1;

        let parsed = std::str::from_utf8(&raw)
            .map_err(|_| RecordError::Encoding)
            .and_then(|line| {
                if line.trim().is_empty() {
                    Ok(None)
                } else {
                    parse_record(line).map(Some)
                }
            });
        match parsed {
            Ok(None) => {}
            Ok(Some((original_start_time, service_latency))) => {
                let id = trace.requests.len() as u64;
                trace
                    .requests
                    .push(Request::new(id, original_start_time, service_latency));
            }
            Err(reason) => {
                trace.skipped += 1;
                debug!(line = line_number, %reason, "Skipping trace record");
            }
        }
    }
    Ok(trace)
}

fn parse_record(line: &str) -> Result<(DateTime<Utc>, Duration), RecordError> {
    let fields: Vec<&str> = line.split(',').map(unquote).collect();
    if fields.len() < 2 {
        return Err(RecordError::FieldCount(fields.len()));
    }

    let timestamp = DateTime::parse_from_rfc3339(fields[0])
        .map_err(|_| RecordError::Timestamp(fields[0].to_string()))?
        .with_timezone(&Utc);

    let latency = fields[1]
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| RecordError::ServiceTime(fields[1].to_string()))?;

    Ok((timestamp, latency))
}

fn unquote(field: &str) -> &str {
    field.trim().trim_matches('"')
}
