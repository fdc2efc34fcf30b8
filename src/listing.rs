//! Parses `ls` response lines into typed metadata records.
//!
//! Two fixed column layouts exist, told apart by token count. The basic
//! layout (plain enumeration) carries ten tokens:
//!
//! ```text
//! -rw-r--r-- 1 alice staff 1024 Jan 02 03:04:05 2024 /archive/file.txt
//! ```
//!
//! The extended layout inserts a class-of-service column and a
//! storage-level column between group and size, and may be followed by a
//! storage block listing one line per tier plus optional tape positions.
//! The block starts at a line whose first character is `S` and ends at a
//! blank line.

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Medium {
    Disk,
    Tape,
}

/// Physical location of a tape copy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TapePosition {
    pub volume: String,
    pub section: u64,
    pub offset: u64,
}

/// One storage hierarchy level of a file. Level 0 is the disk cache,
/// levels 1+ are tape copies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageTier {
    pub level: u32,
    pub medium: Medium,
    /// Bytes held at this level; 0 when the remote reports no data here.
    pub bytes: u64,
    pub position: Option<TapePosition>,
}

/// Metadata for one archive entry.
#[derive(Clone, Debug)]
pub struct Stat {
    pub name: String,
    pub kind: EntryKind,
    /// Permission bits parsed from the nine symbolic mode characters.
    pub mode: u32,
    pub nlink: u32,
    pub owner: String,
    pub group: String,
    pub size: u64,
    pub time: DateTime<Utc>,
    pub cos: Option<u32>,
    pub level: Option<String>,
    /// Storage tiers in ascending level order. Empty for directories.
    pub storage: Vec<StorageTier>,
}

impl Stat {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn can_read(&self) -> bool {
        self.mode & 0o400 != 0
    }

    pub fn can_write(&self) -> bool {
        self.mode & 0o200 != 0
    }

    fn tier_holds_all(&self, level: usize) -> bool {
        self.storage
            .get(level)
            .is_some_and(|tier| tier.bytes == self.size)
    }

    /// True when the disk cache holds a full copy. Directories are always
    /// on disk.
    pub fn on_disk(&self) -> bool {
        self.is_dir() || self.tier_holds_all(0)
    }

    /// True when the first tape level holds a full copy. Directories are
    /// always on tape.
    pub fn on_tape(&self) -> bool {
        self.is_dir() || self.tier_holds_all(1)
    }

    /// True when both tracked tape levels hold a full copy. Directories
    /// are always migrated.
    pub fn is_migrated(&self) -> bool {
        self.is_dir() || (self.tier_holds_all(1) && self.tier_holds_all(2))
    }

    /// Tape location of the copy at `level`, if one was reported.
    pub fn tape_position(&self, level: usize) -> Option<&TapePosition> {
        self.storage.get(level).and_then(|tier| tier.position.as_ref())
    }
}

/// Converts the nine symbolic permission characters (after the kind
/// character) into bits: every non-`-` position contributes a 1.
fn mode_bits(mode: &str) -> u32 {
    let mut bits = 0;
    for c in mode.chars().skip(1) {
        bits <<= 1;
        if c != '-' {
            bits += 1;
        }
    }
    bits
}

fn parse_time(tokens: &[&str]) -> Option<DateTime<Utc>> {
    let joined = tokens.join(" ");
    let naive = NaiveDateTime::parse_from_str(&joined, "%b %d %H:%M:%S %Y").ok()?;
    Some(naive.and_utc())
}

/// Entry name: the row's last token, reduced to its final `/` segment.
fn name_from_token(token: &str) -> String {
    token.rsplit('/').next().unwrap_or(token).to_string()
}

const BASIC_TOKENS: usize = 10;
const EXTENDED_TOKENS: usize = 12;

fn parse_row(line: &str) -> Option<Stat> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.is_empty() {
        return None;
    }
    if tokens.len() < BASIC_TOKENS {
        debug!(line, "short listing row skipped");
        return None;
    }

    let mode = tokens[0];
    let kind = if mode.starts_with('d') {
        EntryKind::Dir
    } else {
        EntryKind::File
    };
    let extended = tokens.len() >= EXTENDED_TOKENS;

    let (cos, level, size_idx) = if extended {
        let cos = tokens[4].parse::<u32>().ok();
        (cos, Some(tokens[5].to_ascii_lowercase()), 6)
    } else {
        (None, None, 4)
    };

    let nlink = tokens[1].parse::<u32>().ok();
    let size = tokens[size_idx].parse::<u64>().ok();
    let time = parse_time(&tokens[size_idx + 1..size_idx + 5]);
    let (Some(nlink), Some(size), Some(time)) = (nlink, size, time) else {
        debug!(line, "unparseable listing row skipped");
        return None;
    };

    Some(Stat {
        name: name_from_token(tokens[tokens.len() - 1]),
        kind,
        mode: mode_bits(mode),
        nlink,
        owner: tokens[2].to_string(),
        group: tokens[3].to_string(),
        size,
        time,
        cos,
        level,
        storage: Vec::new(),
    })
}

/// Parses the storage-block and row grammar for one listing response.
pub(crate) struct ListingParser {
    tier: Regex,
    position: Regex,
}

impl ListingParser {
    pub(crate) fn new() -> Self {
        Self {
            tier: Regex::new(
                r"(\d+)\s+\((tape|disk)\)\s+\d+\s+\d+\s+(\d+|\(no data at this level\))",
            )
            .unwrap(),
            position: Regex::new(r"Pos:\s+(\d+)\+(\d+)\s+PV\s+List:\s+(\S+)").unwrap(),
        }
    }

    fn push_tier(&self, stat: &mut Stat, line: &str) {
        if let Some(caps) = self.tier.captures(line) {
            let level = caps[1].parse().unwrap_or(0);
            let medium = if &caps[2] == "tape" {
                Medium::Tape
            } else {
                Medium::Disk
            };
            let bytes = caps[3].parse().unwrap_or(0);
            stat.storage.push(StorageTier {
                level,
                medium,
                bytes,
                position: None,
            });
        } else if let Some(caps) = self.position.captures(line) {
            let position = TapePosition {
                volume: caps[3].to_string(),
                section: caps[1].parse().unwrap_or(0),
                offset: caps[2].parse().unwrap_or(0),
            };
            if let Some(tier) = stat.storage.last_mut() {
                tier.position = Some(position);
            }
        }
    }

    /// Parses a full listing response in input order. Empty input yields
    /// an empty vector.
    pub(crate) fn parse(&self, lines: &[String]) -> Vec<Stat> {
        let mut result: Vec<Stat> = Vec::new();
        let mut in_storage = false;
        for line in lines {
            if in_storage {
                if line.is_empty() {
                    in_storage = false;
                } else if let Some(stat) = result.last_mut() {
                    self.push_tier(stat, line);
                }
            } else if line.starts_with('S') {
                in_storage = true;
            } else if let Some(stat) = parse_row(line) {
                result.push(stat);
            }
        }
        result
    }
}

#[cfg(test)]
#[path = "../tests/unit/listing.rs"]
mod tests;
