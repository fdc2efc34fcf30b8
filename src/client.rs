//! Public operations facade for the archive.
//!
//! Every call resolves its path against the configured subtree, runs one
//! remote command through the persistent session (plus one guard read for
//! directory-aware operations), and parses the response where needed.
//! The streaming variants (`get_pipe`, `put_pipe`, `get_stream`) are the
//! only data paths decoupled from the command protocol.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, ExitStatus, Stdio};

use regex::Regex;
use tracing::debug;

use crate::channel::{self, ErrorFilter};
use crate::config::HpssConfig;
use crate::error::{HpssError, Result};
use crate::listing::{ListingParser, Stat};
use crate::path;
use crate::session::{self, SessionManager};

/// Client for a remote HPSS archive, driven through a persistent hsi
/// child-process session.
///
/// Calls are synchronous and strictly serial: one command in flight,
/// every call blocks until its response is complete. The session is
/// created on first use and rebuilt transparently when the child process
/// died or the owning process forked. Not safe to share across threads;
/// use one client per worker.
pub struct HpssClient {
    sessions: SessionManager,
    filter: ErrorFilter,
    listing: ListingParser,
    annotation: Regex,
}

impl HpssClient {
    /// Creates a client. Fails when the configured executable or keytab
    /// does not exist.
    pub fn new(config: HpssConfig) -> Result<Self> {
        if !config.binary.exists() {
            return Err(HpssError::Precondition(format!(
                "hsi binary '{}' does not exist",
                config.binary.display()
            )));
        }
        if !config.keytab.exists() {
            return Err(HpssError::Precondition(format!(
                "keytab '{}' does not exist",
                config.keytab.display()
            )));
        }
        Ok(Self {
            sessions: SessionManager::new(config),
            filter: ErrorFilter::new(),
            listing: ListingParser::new(),
            annotation: Regex::new(r"Annotation:\s+(.+)").unwrap(),
        })
    }

    /// One-shot probe of whether the remote accepts connections,
    /// independent of the session.
    pub fn ping(&self) -> bool {
        session::ping(self.sessions.config())
    }

    fn resolve(&self, path: &str) -> String {
        path::resolve(&self.sessions.config().base_dir, path)
    }

    /// Display form of a path: remote root + subtree + cleaned path.
    /// Connects if no session exists yet.
    pub fn absolute(&mut self, p: &str) -> Result<String> {
        let base_dir = self.sessions.config().base_dir.clone();
        let root = self.sessions.ensure_ready()?.root.clone();
        Ok(path::absolute(&root, &base_dir, p))
    }

    fn run(&mut self, tokens: &[&str], cos: Option<u32>) -> Result<Vec<String>> {
        let session = self.sessions.ensure_ready()?;
        let result = channel::run(session, &self.filter, tokens, cos);
        if matches!(result, Err(HpssError::Io(_))) {
            // Broken pipe mid-command; reconnect on the next call.
            self.sessions.invalidate();
        }
        result
    }

    fn stat_inner(&mut self, p: &str, mtime: bool) -> Result<Option<Stat>> {
        let full = self.resolve(p);
        let mut tokens = vec!["ls", "-aldDNX"];
        if mtime {
            tokens.push("-Tm");
        }
        tokens.push(&full);
        let lines = self.run(&tokens, None)?;
        Ok(self.listing.parse(&lines).into_iter().next())
    }

    /// Extended metadata for exactly one path, or `None` when nothing
    /// came back. A non-existent path and a benign-suppressed error are
    /// indistinguishable: both are "no data".
    pub fn stat(&mut self, p: &str) -> Result<Option<Stat>> {
        self.stat_inner(p, false)
    }

    /// Like [`stat`](Self::stat) but reporting the modification time.
    pub fn stat_mtime(&mut self, p: &str) -> Result<Option<Stat>> {
        self.stat_inner(p, true)
    }

    pub fn exists(&mut self, p: &str) -> Result<bool> {
        Ok(self.stat(p)?.is_some())
    }

    fn stat_dir_guard(&mut self, p: &str) -> Result<bool> {
        Ok(self.stat(p)?.is_some_and(|s| s.is_dir()))
    }

    /// Names in a directory, optionally filtered by a pattern anchored at
    /// the start of the name. Empty when the path is absent or not a
    /// directory.
    pub fn read_dir(&mut self, p: &str, pattern: Option<&Regex>) -> Result<Vec<String>> {
        Ok(self
            .read_dir_kinds(p, pattern)?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    /// Like [`read_dir`](Self::read_dir), with each name paired with
    /// whether it is a directory.
    pub fn read_dir_kinds(
        &mut self,
        p: &str,
        pattern: Option<&Regex>,
    ) -> Result<Vec<(String, bool)>> {
        if !self.stat_dir_guard(p)? {
            return Ok(Vec::new());
        }
        let full = self.resolve(p);
        let lines = self.run(&["ls", "-alNO", &full], None)?;
        let mut entries = Vec::new();
        for line in &lines {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let Some(last) = tokens.last() else {
                continue;
            };
            let name = last.rsplit('/').next().unwrap_or(last).to_string();
            if !name_matches(pattern, &name) {
                continue;
            }
            entries.push((name, tokens[0].starts_with('d')));
        }
        Ok(entries)
    }

    /// Full metadata records (with storage tiers) for a directory's
    /// entries. Empty when the path is absent or not a directory.
    pub fn stat_dir(&mut self, p: &str, pattern: Option<&Regex>) -> Result<Vec<Stat>> {
        if !self.stat_dir_guard(p)? {
            return Ok(Vec::new());
        }
        let full = self.resolve(p);
        let lines = self.run(&["ls", "-alDNOX", &full], None)?;
        Ok(self
            .listing
            .parse(&lines)
            .into_iter()
            .filter(|s| name_matches(pattern, &s.name))
            .collect())
    }

    /// Creates a directory, optionally with its parents.
    pub fn mkdir(&mut self, p: &str, parents: bool) -> Result<()> {
        let full = self.resolve(p);
        let mut tokens = vec!["mkdir"];
        if parents {
            tokens.push("-p");
        }
        tokens.push(&full);
        self.run(&tokens, None).map(|_| ())
    }

    pub fn rmdir(&mut self, p: &str) -> Result<()> {
        let full = self.resolve(p);
        self.run(&["rmdir", &full], None).map(|_| ())
    }

    pub fn delete(&mut self, p: &str) -> Result<()> {
        let full = self.resolve(p);
        self.run(&["delete", &full], None).map(|_| ())
    }

    pub fn rename(&mut self, old: &str, new: &str, force: bool) -> Result<()> {
        let old_full = self.resolve(old);
        let new_full = self.resolve(new);
        let mut tokens = vec!["mv"];
        if force {
            tokens.push("-f");
        }
        tokens.push(&old_full);
        tokens.push(&new_full);
        self.run(&tokens, None).map(|_| ())
    }

    /// Changes permissions; numeric and symbolic modes are both accepted
    /// by the remote.
    pub fn chmod(&mut self, mode: &str, p: &str) -> Result<()> {
        let full = self.resolve(p);
        self.run(&["chmod", mode, &full], None).map(|_| ())
    }

    /// Hard-links `source` to `dest`.
    pub fn link(&mut self, source: &str, dest: &str) -> Result<()> {
        let source_full = self.resolve(source);
        let dest_full = self.resolve(dest);
        self.run(&["ln", &source_full, &dest_full], None).map(|_| ())
    }

    /// Attaches a free-text note to an entry. Double quotes are reduced
    /// to single quotes so the remote's quoting survives.
    pub fn annotate(&mut self, p: &str, text: &str) -> Result<()> {
        let text = text.replace('"', "'");
        let quoted = format!("\"{text}\"");
        let full = self.resolve(p);
        self.run(&["annotate", "-A", &quoted, &full], None)
            .map(|_| ())
    }

    /// Reads back an entry's note, if any.
    pub fn annotation(&mut self, p: &str) -> Result<Option<String>> {
        let full = self.resolve(p);
        let lines = self.run(&["ls", "-Ad", &full], None)?;
        for line in &lines {
            if let Some(caps) = self.annotation.captures(line) {
                return Ok(Some(caps[1].trim_end().to_string()));
            }
        }
        Ok(None)
    }

    /// Total bytes used under a path.
    pub fn disk_usage(&mut self, p: &str) -> Result<u64> {
        let full = self.resolve(p);
        let lines = self.run(&["du", "-n", "-s", &full], None)?;
        lines
            .get(2)
            .and_then(|line| line.split_whitespace().next())
            .and_then(|token| token.parse().ok())
            .ok_or_else(|| HpssError::Protocol {
                message: "unexpected du response".to_string(),
                command: format!("du -n -s {full}"),
            })
    }

    fn guarded_stat(&mut self, p: &str) -> Result<Stat> {
        self.stat(p)?.ok_or_else(|| {
            HpssError::Precondition(format!("remote path '{p}' does not exist"))
        })
    }

    /// Retrieves a remote file or directory.
    ///
    /// A remote directory is copied recursively into `local`, which must
    /// already be a local directory. A remote file lands inside `local`
    /// when that is a directory, otherwise `local` is the exact
    /// destination. Transfers always verify checksums.
    pub fn get(&mut self, remote: &str, local: &Path) -> Result<()> {
        let stat = self.guarded_stat(remote)?;
        let full = self.resolve(remote);
        let lpath = local.to_string_lossy();
        if stat.is_dir() {
            if !local.is_dir() {
                return Err(HpssError::Precondition(format!(
                    "local path '{}' is not a directory",
                    local.display()
                )));
            }
            self.run(&["lcd", lpath.as_ref()], None)?;
            self.run(&["get", "-R", "-c", "on", &full], None)?;
        } else if local.is_dir() {
            self.run(&["lcd", lpath.as_ref()], None)?;
            self.run(&["get", "-c", "on", &full], None)?;
        } else {
            self.run(&["get", "-c", "on", lpath.as_ref(), ":", &full], None)?;
        }
        Ok(())
    }

    /// Stores a local file or directory (recursively), creating md5
    /// checksums as it goes.
    pub fn put(&mut self, local: &Path, remote: &str, cos: Option<u32>) -> Result<()> {
        let full = self.resolve(remote);
        let lpath = local.to_string_lossy();
        let mut tokens = vec!["put", "-c", "on", "-H", "md5"];
        if local.is_dir() {
            tokens.push("-R");
        }
        tokens.push(lpath.as_ref());
        tokens.push(":");
        tokens.push(&full);
        self.run(&tokens, cos).map(|_| ())
    }

    /// Retrieves a remote file into a pre-created local named pipe.
    pub fn get_pipe(&mut self, remote: &str, pipe: &Path) -> Result<()> {
        let full = self.resolve(remote);
        let lpath = pipe.to_string_lossy();
        self.run(&["get", "-c", "on", lpath.as_ref(), ":", &full], None)
            .map(|_| ())
    }

    /// Streams a local named pipe into the archive. The local path must
    /// be a FIFO.
    pub fn put_pipe(&mut self, pipe: &Path, remote: &str, cos: Option<u32>) -> Result<()> {
        if !is_fifo(pipe) {
            return Err(HpssError::Precondition(format!(
                "'{}' is not a fifo",
                pipe.display()
            )));
        }
        let full = self.resolve(remote);
        let reader = format!("\"| cat {}\"", pipe.display());
        self.run(
            &["put", "-c", "on", "-H", "md5", &reader, ":", &full],
            cos,
        )
        .map(|_| ())
    }

    /// Stages a file to disk cache, waiting for completion; directories
    /// are staged recursively.
    pub fn stage(&mut self, p: &str) -> Result<()> {
        let stat = self.guarded_stat(p)?;
        let full = self.resolve(p);
        let mut tokens = vec!["stage", "-w"];
        if stat.is_dir() {
            tokens.push("-R");
        }
        tokens.push(&full);
        self.run(&tokens, None).map(|_| ())
    }

    /// Purges the disk-cache copy; directories are purged recursively.
    pub fn purge(&mut self, p: &str) -> Result<()> {
        let stat = self.guarded_stat(p)?;
        let full = self.resolve(p);
        let mut tokens = vec!["purge"];
        if stat.is_dir() {
            tokens.push("-R");
        }
        tokens.push(&full);
        self.run(&tokens, None).map(|_| ())
    }

    /// Migrates data toward tape; `force` overrides the remote's
    /// eligibility heuristics. Directories are migrated recursively.
    pub fn migrate(&mut self, p: &str, force: bool) -> Result<()> {
        let stat = self.guarded_stat(p)?;
        let full = self.resolve(p);
        let mut tokens = vec!["migrate"];
        if stat.is_dir() {
            tokens.push("-R");
        }
        if force {
            tokens.push("-F");
        }
        tokens.push(&full);
        self.run(&tokens, None).map(|_| ())
    }

    /// Creates (or refreshes) md5 checksums; directories recurse.
    pub fn create_checksum(&mut self, p: &str) -> Result<()> {
        let stat = self.guarded_stat(p)?;
        let full = self.resolve(p);
        let mut tokens = vec!["hashcreate"];
        if stat.is_dir() {
            tokens.push("-R");
        }
        tokens.push("-H");
        tokens.push("md5");
        tokens.push(&full);
        self.run(&tokens, None).map(|_| ())
    }

    /// The stored checksum for a file: `None` for directories, absent
    /// paths, and files without one; else the leading 32-character hash.
    pub fn checksum(&mut self, p: &str) -> Result<Option<String>> {
        match self.stat(p)? {
            None => return Ok(None),
            Some(stat) if stat.is_dir() => return Ok(None),
            Some(_) => {}
        }
        let full = self.resolve(p);
        let lines = self.run(&["hashlist", &full], None)?;
        let Some(first) = lines.first() else {
            return Ok(None);
        };
        if first.starts_with("(none)") {
            return Ok(None);
        }
        Ok(first.get(0..32).map(|hash| hash.to_string()))
    }

    /// Verifies the stored checksum against the data. `None` when no
    /// checksum is set (or the target is a directory), else whether the
    /// remote reported a match.
    pub fn verify_checksum(&mut self, p: &str) -> Result<Option<bool>> {
        if self.checksum(p)?.is_none() {
            return Ok(None);
        }
        let full = self.resolve(p);
        let lines = self.run(&["hashverify", &full], None)?;
        Ok(Some(
            lines.first().is_some_and(|line| line.ends_with("OK")),
        ))
    }

    /// Opens a remote file as a byte stream.
    ///
    /// Returns `None` for anything but a plain file. The transfer runs in
    /// a dedicated one-shot child process outside the session, so it
    /// bypasses the sentinel protocol entirely; no staging is attempted
    /// first. Backpressure is pipe blocking: read to drain.
    pub fn get_stream(&mut self, remote: &str) -> Result<Option<ByteStream>> {
        match self.stat(remote)? {
            Some(stat) if stat.is_file() => {}
            _ => return Ok(None),
        }
        let full = self.resolve(remote);
        debug!(path = %full, "spawning one-shot stream transfer");
        let mut child = session::session_command(self.sessions.config(), "-q")
            .args(["get", "-c", "on", "-", ":"])
            .arg(&full)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdout = child.stdout.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "stream stdout unavailable")
        })?;
        Ok(Some(ByteStream { child, stdout }))
    }
}

/// Live output of a one-shot stream transfer.
///
/// Reaping the detached child is the caller's responsibility: call
/// [`wait`](Self::wait) after draining, or the process stays a zombie on
/// hosts that do not reap automatically.
pub struct ByteStream {
    child: Child,
    stdout: ChildStdout,
}

impl ByteStream {
    /// Process id of the transfer child.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Waits for the transfer process to exit.
    pub fn wait(mut self) -> io::Result<ExitStatus> {
        drop(self.stdout);
        self.child.wait()
    }
}

impl Read for ByteStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stdout.read(buf)
    }
}

fn name_matches(pattern: Option<&Regex>, name: &str) -> bool {
    match pattern {
        None => true,
        Some(p) => p.find(name).is_some_and(|m| m.start() == 0),
    }
}

#[cfg(unix)]
fn is_fifo(path: &Path) -> bool {
    use std::os::unix::fs::FileTypeExt;

    std::fs::metadata(path)
        .map(|m| m.file_type().is_fifo())
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_fifo(_path: &Path) -> bool {
    false
}
