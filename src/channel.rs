//! Request/response framing over a live session.
//!
//! A request is the space-joined command tokens, an optional ` cos=`
//! suffix, and a forced `; id` tail so the sentinel reliably reappears.
//! The response is every line up to (excluding) one exactly equal to the
//! sentinel; lines starting with `***` are remote error text and are
//! collected separately for classification.

use std::io::{self, BufRead, Write};

use regex::Regex;
use tracing::debug;

use crate::error::{HpssError, Result};
use crate::session::Session;

/// Remote error/status marker.
const ERROR_MARKER: &str = "***";

/// Known-benign remote conditions, checked in order, first match wins.
/// A match collapses the whole response to "no data" instead of an error.
const BENIGN_PATTERNS: [&str; 6] = [
    r"getFile: no valid checksum for",
    r"no data at hierarchy level",
    r"ls:.+HPSS_ENOENT",
    r"Background stage failed with error -5",
    r"setting nameserver attributes.+HPSS_EACCES",
    r"stage: No such file or directory",
];

/// The compiled benign-pattern table, kept apart from the collection
/// logic so it can be tested on its own.
pub(crate) struct ErrorFilter {
    patterns: Vec<Regex>,
}

impl ErrorFilter {
    pub(crate) fn new() -> Self {
        Self {
            patterns: BENIGN_PATTERNS
                .iter()
                .map(|p| Regex::new(p).unwrap())
                .collect(),
        }
    }

    pub(crate) fn is_benign(&self, message: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(message))
    }
}

/// Builds the wire form of one command.
pub(crate) fn compose(tokens: &[&str], cos: Option<u32>) -> String {
    let mut command = tokens.join(" ");
    if let Some(cos) = cos {
        command.push_str(&format!(" cos={cos}"));
    }
    command.push_str("; id");
    command
}

/// Reads one line, failing on EOF, with trailing whitespace trimmed.
pub(crate) fn read_line_trimmed<R: BufRead>(reader: &mut R) -> io::Result<String> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "hsi closed the stream",
        ));
    }
    Ok(line.trim_end().to_string())
}

#[derive(Debug)]
pub(crate) struct RawResponse {
    pub(crate) lines: Vec<String>,
    pub(crate) error: Option<String>,
}

/// Collects response lines until the sentinel. Only a line exactly equal
/// to the sentinel ends the read; a line merely containing it does not.
pub(crate) fn collect<R: BufRead>(reader: &mut R, sentinel: &str) -> io::Result<RawResponse> {
    let mut lines = Vec::new();
    let mut error: Option<String> = None;
    loop {
        let line = read_line_trimmed(reader)?;
        if line == sentinel {
            break;
        }
        if line.starts_with(ERROR_MARKER) {
            match error {
                Some(ref mut buf) => {
                    buf.push('\n');
                    buf.push_str(&line);
                }
                None => error = Some(line),
            }
        } else {
            lines.push(line);
        }
    }
    Ok(RawResponse { lines, error })
}

/// Issues one command and returns its classified response.
///
/// Exactly one command is in flight at a time; this blocks until the
/// sentinel returns. No timeout is enforced: a hung remote command
/// blocks the caller.
pub(crate) fn run(
    session: &mut Session,
    filter: &ErrorFilter,
    tokens: &[&str],
    cos: Option<u32>,
) -> Result<Vec<String>> {
    let command = compose(tokens, cos);
    debug!(command = %command, "issuing hsi command");
    writeln!(session.stdin, "{command}")?;
    session.stdin.flush()?;

    let response = collect(&mut session.stdout, &session.sentinel)?;
    match response.error {
        None => Ok(response.lines),
        Some(message) if filter.is_benign(&message) => {
            debug!(message = %message, "benign remote condition, empty result");
            Ok(Vec::new())
        }
        Some(message) => Err(HpssError::Protocol { message, command }),
    }
}

#[cfg(test)]
#[path = "../tests/unit/channel.rs"]
mod tests;
