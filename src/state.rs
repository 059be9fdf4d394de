/// Per-host persisted state
///
/// Every host (or HE tunnel id) owns up to three one-line files inside the
/// state directory:
/// - `<host>-dnsip`: last IPv4 address published for the host
/// - `<host>-dnsdate`: epoch seconds of the last successful publish
/// - `<host>-dnserr`: lockout reason; its presence blocks all updates
///
/// Reads are forgiving (missing or empty files mean "absent"), writes are
/// not: a write that cannot be completed, flushed to disk and renamed into
/// place is reported as a `StateError`, which the daemon treats as fatal.
use std::fs;
use std::io::{self, Write};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

const IP_SUFFIX: &str = "-dnsip";
const DATE_SUFFIX: &str = "-dnsdate";
const ERR_SUFFIX: &str = "-dnserr";
const TMP_SUFFIX: &str = ".tmp";

/// Lock reason recorded when a `-dnserr` file exists but is empty.
pub const UNKNOWN_LOCK_REASON: &str = "unknown";

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to flush {} to disk; possible corruption: {source}", path.display())]
    Sync { path: PathBuf, source: io::Error },
}

/// Reads and writes the per-host state files in one directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the state directory if needed and return a store rooted there.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StateError> {
        let store = Self::new(dir);
        fs::create_dir_all(&store.dir).map_err(|source| StateError::Write {
            path: store.dir.clone(),
            source,
        })?;
        Ok(store)
    }

    /// Platform cache directory used when no state directory is configured.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("dyndnsd"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Last published IP, or `None` if the file is missing, empty or not a
    /// valid dotted quad.
    pub fn read_ip(&self, host: &str) -> Result<Option<Ipv4Addr>, StateError> {
        let Some(line) = self.read_line(host, IP_SUFFIX)? else {
            log::info!("No existing {}{}.", host, IP_SUFFIX);
            return Ok(None);
        };
        match line.parse::<Ipv4Addr>() {
            Ok(ip) => Ok(Some(ip)),
            Err(_) => {
                log::warn!("{}{} is corrupt: [{}]", host, IP_SUFFIX, line);
                Ok(None)
            }
        }
    }

    /// Epoch seconds of the last publish, `0` when unknown.
    pub fn read_date(&self, host: &str) -> Result<u64, StateError> {
        let Some(line) = self.read_line(host, DATE_SUFFIX)? else {
            log::info!("No existing {}{}. Assuming date == 0.", host, DATE_SUFFIX);
            return Ok(0);
        };
        // Negative or garbled dates collapse to 0 so the host gets refreshed.
        Ok(line.parse::<u64>().unwrap_or(0))
    }

    /// Lockout reason if the host has been locked out, `None` otherwise.
    pub fn read_lock_reason(&self, host: &str) -> Result<Option<String>, StateError> {
        let path = self.path_for(host, ERR_SUFFIX);
        if !path.exists() {
            return Ok(None);
        }
        match self.read_line(host, ERR_SUFFIX)? {
            Some(reason) => Ok(Some(reason)),
            None => {
                log::info!(
                    "{}{} is empty. Assuming error: [{}].",
                    host,
                    ERR_SUFFIX,
                    UNKNOWN_LOCK_REASON
                );
                Ok(Some(UNKNOWN_LOCK_REASON.to_string()))
            }
        }
    }

    pub fn write_ip(&self, host: &str, ip: Ipv4Addr) -> Result<(), StateError> {
        self.write_file(host, IP_SUFFIX, &ip.to_string())
    }

    pub fn write_date(&self, host: &str, epoch: u64) -> Result<(), StateError> {
        self.write_file(host, DATE_SUFFIX, &epoch.to_string())
    }

    pub fn write_lock_reason(&self, host: &str, reason: &str) -> Result<(), StateError> {
        self.write_file(host, ERR_SUFFIX, reason)
    }

    fn path_for(&self, host: &str, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}{}", host, suffix))
    }

    /// First line of the file, trimmed. Missing and empty files both map to `None`.
    fn read_line(&self, host: &str, suffix: &str) -> Result<Option<String>, StateError> {
        let path = self.path_for(host, suffix);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StateError::Read { path, source }),
        };
        let line = content.lines().next().unwrap_or("").trim();
        if line.is_empty() {
            Ok(None)
        } else {
            Ok(Some(line.to_string()))
        }
    }

    /// Replace the whole file: write a sibling `.tmp`, fsync it, then rename
    /// it over the target so readers see either the old or the new value.
    fn write_file(&self, host: &str, suffix: &str, contents: &str) -> Result<(), StateError> {
        let path = self.path_for(host, suffix);
        let tmp = self.path_for(host, &format!("{}{}", suffix, TMP_SUFFIX));

        let mut file = fs::File::create(&tmp).map_err(|source| StateError::Write {
            path: tmp.clone(),
            source,
        })?;
        writeln!(file, "{}", contents).map_err(|source| StateError::Write {
            path: tmp.clone(),
            source,
        })?;
        file.sync_all().map_err(|source| StateError::Sync {
            path: tmp.clone(),
            source,
        })?;
        drop(file);

        fs::rename(&tmp, &path).map_err(|source| StateError::Write { path, source })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, StateStore) {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_ip_round_trip() {
        let (_dir, store) = store();
        let ip: Ipv4Addr = "203.0.113.5".parse().unwrap();

        store.write_ip("foo.example.org", ip).unwrap();

        assert_eq!(store.read_ip("foo.example.org").unwrap(), Some(ip));
        let raw = fs::read_to_string(store.dir().join("foo.example.org-dnsip")).unwrap();
        assert_eq!(raw, "203.0.113.5\n");
    }

    #[test]
    fn test_missing_files_are_absent() {
        let (_dir, store) = store();

        assert_eq!(store.read_ip("nothing.example.org").unwrap(), None);
        assert_eq!(store.read_date("nothing.example.org").unwrap(), 0);
        assert_eq!(store.read_lock_reason("nothing.example.org").unwrap(), None);
    }

    #[test]
    fn test_empty_files_are_absent() {
        let (dir, store) = store();
        fs::write(dir.path().join("empty.example.org-dnsip"), "").unwrap();
        fs::write(dir.path().join("empty.example.org-dnsdate"), "\n").unwrap();

        assert_eq!(store.read_ip("empty.example.org").unwrap(), None);
        assert_eq!(store.read_date("empty.example.org").unwrap(), 0);
    }

    #[test]
    fn test_corrupt_ip_is_absent() {
        let (dir, store) = store();
        fs::write(dir.path().join("bad.example.org-dnsip"), "300.1.2.3\n").unwrap();

        assert_eq!(store.read_ip("bad.example.org").unwrap(), None);
    }

    #[test]
    fn test_date_round_trip_and_garbage() {
        let (dir, store) = store();
        store.write_date("foo.example.org", 1_700_000_000).unwrap();
        assert_eq!(store.read_date("foo.example.org").unwrap(), 1_700_000_000);

        fs::write(dir.path().join("neg.example.org-dnsdate"), "-5\n").unwrap();
        assert_eq!(store.read_date("neg.example.org").unwrap(), 0);
    }

    #[test]
    fn test_lock_reason() {
        let (dir, store) = store();
        store.write_lock_reason("foo.example.org", "notfqdn").unwrap();
        assert_eq!(
            store.read_lock_reason("foo.example.org").unwrap().as_deref(),
            Some("notfqdn")
        );

        fs::write(dir.path().join("blank.example.org-dnserr"), "").unwrap();
        assert_eq!(
            store.read_lock_reason("blank.example.org").unwrap().as_deref(),
            Some(UNKNOWN_LOCK_REASON)
        );
    }

    #[test]
    fn test_write_overwrites_previous_contents() {
        let (_dir, store) = store();
        store.write_ip("foo.example.org", Ipv4Addr::new(192, 0, 2, 100)).unwrap();
        store.write_ip("foo.example.org", Ipv4Addr::new(192, 0, 2, 1)).unwrap();

        assert_eq!(
            store.read_ip("foo.example.org").unwrap(),
            Some(Ipv4Addr::new(192, 0, 2, 1))
        );
    }

    #[test]
    fn test_write_leaves_no_temporary_file() {
        let (dir, store) = store();
        store.write_ip("foo.example.org", Ipv4Addr::new(192, 0, 2, 1)).unwrap();
        store.write_ip("foo.example.org", Ipv4Addr::new(192, 0, 2, 2)).unwrap();

        let mut names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, ["foo.example.org-dnsip"]);
        assert_eq!(
            fs::read_to_string(dir.path().join("foo.example.org-dnsip")).unwrap(),
            "192.0.2.2\n"
        );
    }

    #[test]
    fn test_stale_temporary_file_does_not_shadow_state() {
        let (dir, store) = store();
        store.write_date("foo.example.org", 1_700_000_000).unwrap();
        fs::write(dir.path().join("foo.example.org-dnsdate.tmp"), "").unwrap();

        assert_eq!(store.read_date("foo.example.org").unwrap(), 1_700_000_000);
        store.write_date("foo.example.org", 1_700_000_060).unwrap();
        assert_eq!(store.read_date("foo.example.org").unwrap(), 1_700_000_060);
        assert!(!dir.path().join("foo.example.org-dnsdate.tmp").exists());
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("does-not-exist"));

        let err = store.write_date("foo.example.org", 1).unwrap_err();
        assert!(matches!(err, StateError::Write { .. }));
    }

    #[test]
    fn test_open_creates_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");

        let store = StateStore::open(&nested).unwrap();
        store.write_ip("h.example.org", Ipv4Addr::new(198, 51, 100, 7)).unwrap();

        assert!(nested.join("h.example.org-dnsip").exists());
    }
}
