//! Owns the persistent hsi child process.
//!
//! A session is established lazily, checked for staleness before every
//! command, and rebuilt transparently when the child died or the owning
//! process forked. The connect loop retries at a fixed interval,
//! unboundedly unless the configuration caps it.

use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};

use tracing::{debug, warn};

use crate::channel::read_line_trimmed;
use crate::config::HpssConfig;
use crate::error::{HpssError, Result};

/// Combined probe issued right after spawn. The first response line
/// carries the remote root, the fifth becomes the sentinel.
const HANDSHAKE_PROBE: &str = "pwd;lpwd;glob;idletime -1;id";

/// Length of the `pwd0: ` label preceding the remote root.
const ROOT_LABEL_LEN: usize = 6;

#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) child: Child,
    pub(crate) stdin: BufWriter<ChildStdin>,
    pub(crate) stdout: BufReader<ChildStdout>,
    /// Process id this session was created in. A mismatch means the
    /// caller forked and the session belongs to the parent.
    pub(crate) owner_pid: u32,
    /// Remote root learned at handshake, used only for display paths.
    pub(crate) root: String,
    /// End-of-response marker for all subsequent commands.
    pub(crate) sentinel: String,
}

impl Drop for Session {
    fn drop(&mut self) {
        // After a fork the child belongs to the parent process.
        if self.owner_pid != std::process::id() {
            return;
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Session {
    fn connect(config: &HpssConfig) -> io::Result<Session> {
        debug!(binary = %config.binary.display(), "spawning hsi session");
        let mut child = session_command(config, "-P")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        match handshake(&mut child) {
            Ok((stdin, stdout, root, sentinel)) => {
                debug!(root = %root, sentinel = %sentinel, "hsi session established");
                Ok(Session {
                    child,
                    stdin,
                    stdout,
                    owner_pid: std::process::id(),
                    root,
                    sentinel,
                })
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(e)
            }
        }
    }
}

/// Base invocation with authentication flags. `mode` is `-P` (pipe mode,
/// sessions and probes) or `-q` (quiet, one-shot transfers).
pub(crate) fn session_command(config: &HpssConfig, mode: &str) -> Command {
    let mut cmd = Command::new(&config.binary);
    cmd.arg(mode)
        .args(["-A", "keytab"])
        .arg("-k")
        .arg(&config.keytab)
        .arg("-l")
        .arg(&config.username);
    cmd
}

type HandshakeStreams = (
    BufWriter<ChildStdin>,
    BufReader<ChildStdout>,
    String,
    String,
);

fn handshake(child: &mut Child) -> io::Result<HandshakeStreams> {
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "hsi stdin unavailable"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "hsi stdout unavailable"))?;
    if let Some(stderr) = child.stderr.take() {
        if let Err(e) = std::thread::Builder::new()
            .name("hpss-stderr".to_string())
            .spawn(move || stderr_loop(stderr))
        {
            warn!(error = %e, "spawn hsi stderr thread failed");
        }
    }

    let mut stdin = BufWriter::new(stdin);
    let mut stdout = BufReader::new(stdout);

    writeln!(stdin, "{HANDSHAKE_PROBE}")?;
    stdin.flush()?;

    let first = read_line_trimmed(&mut stdout)?;
    let root = first
        .get(ROOT_LABEL_LEN..)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("malformed handshake line: {first:?}"),
            )
        })?
        .to_string();
    for _ in 0..3 {
        read_line_trimmed(&mut stdout)?;
    }
    let sentinel = read_line_trimmed(&mut stdout)?;

    Ok((stdin, stdout, root, sentinel))
}

fn stderr_loop(stderr: ChildStderr) {
    let mut reader = BufReader::new(stderr);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let trimmed = line.trim_end();
                if !trimmed.is_empty() {
                    warn!("hsi: {}", trimmed);
                }
            }
        }
    }
}

pub(crate) struct SessionManager {
    config: HpssConfig,
    session: Option<Session>,
}

impl SessionManager {
    pub(crate) fn new(config: HpssConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    pub(crate) fn config(&self) -> &HpssConfig {
        &self.config
    }

    /// Drops the current session so the next command reconnects.
    pub(crate) fn invalidate(&mut self) {
        self.session = None;
    }

    /// Returns a live session, connecting (and retrying) as needed.
    ///
    /// Never hands out a half-initialized or stale session. With the
    /// default unbounded retry policy this blocks until a handshake
    /// succeeds.
    pub(crate) fn ensure_ready(&mut self) -> Result<&mut Session> {
        if self
            .session
            .as_ref()
            .is_some_and(|s| s.owner_pid != std::process::id())
        {
            debug!("session belongs to a forked parent, discarding");
            self.session = None;
        }

        let mut dead = false;
        if let Some(session) = self.session.as_mut() {
            match session.child.try_wait() {
                Ok(None) => {}
                Ok(Some(status)) => {
                    warn!(status = ?status, "hsi process exited unexpectedly");
                    dead = true;
                }
                Err(e) => {
                    warn!(error = %e, "hsi liveness check failed");
                    dead = true;
                }
            }
        }
        if dead {
            self.session = None;
        }

        let mut attempts = 0u32;
        while self.session.is_none() {
            match Session::connect(&self.config) {
                Ok(session) => self.session = Some(session),
                Err(e) => {
                    attempts = attempts.saturating_add(1);
                    if let Some(limit) = self.config.connect_attempts {
                        if attempts >= limit {
                            return Err(HpssError::Connection(format!(
                                "giving up after {attempts} attempts: {e}"
                            )));
                        }
                    }
                    warn!(
                        error = %e,
                        retry_in = ?self.config.connect_retry,
                        "cannot connect to hsi, will retry"
                    );
                    std::thread::sleep(self.config.connect_retry);
                }
            }
        }

        self.session
            .as_mut()
            .ok_or_else(|| HpssError::Connection("session unavailable".to_string()))
    }
}

/// One-shot reachability probe, outside any session.
pub(crate) fn ping(config: &HpssConfig) -> bool {
    let output = session_command(config, "-P").arg("pwd").output();
    match output {
        Ok(output) => output.status.success() && output.stdout.starts_with(b"pwd0"),
        Err(e) => {
            debug!(error = %e, "ping spawn failed");
            false
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/session.rs"]
mod tests;
