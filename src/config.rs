use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HSI_BINARY: &str = "/usr/local/bin/hsi";
const DEFAULT_CONNECT_RETRY: Duration = Duration::from_secs(30);

/// Configuration for an archive client.
///
/// Credentials are explicit: the keytab path and username must be supplied
/// by the caller, never inferred from the environment.
#[derive(Clone, Debug)]
pub struct HpssConfig {
    /// Path to the hsi executable.
    pub binary: PathBuf,
    /// Keytab credential file passed via `-A keytab -k`.
    pub keytab: PathBuf,
    /// Identity passed via `-l`.
    pub username: String,
    /// Remote subtree all operational paths are resolved under.
    pub base_dir: String,
    /// Delay between connect attempts.
    pub connect_retry: Duration,
    /// Connect attempt limit. `None` retries forever, the default.
    pub connect_attempts: Option<u32>,
}

impl HpssConfig {
    pub fn new(
        base_dir: impl Into<String>,
        keytab: impl Into<PathBuf>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_HSI_BINARY),
            keytab: keytab.into(),
            username: username.into(),
            base_dir: base_dir.into(),
            connect_retry: DEFAULT_CONNECT_RETRY,
            connect_attempts: None,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_connect_retry(mut self, delay: Duration) -> Self {
        self.connect_retry = delay;
        self
    }

    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = Some(attempts);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HpssConfig::new("archive", "/etc/creds.keytab", "alice");
        assert_eq!(config.binary, PathBuf::from(DEFAULT_HSI_BINARY));
        assert_eq!(config.connect_retry, Duration::from_secs(30));
        assert!(config.connect_attempts.is_none());
    }

    #[test]
    fn test_builders() {
        let config = HpssConfig::new("archive", "/etc/creds.keytab", "alice")
            .with_binary("/opt/hsi/bin/hsi")
            .with_connect_retry(Duration::from_millis(50))
            .with_connect_attempts(3);
        assert_eq!(config.binary, PathBuf::from("/opt/hsi/bin/hsi"));
        assert_eq!(config.connect_retry, Duration::from_millis(50));
        assert_eq!(config.connect_attempts, Some(3));
    }
}
