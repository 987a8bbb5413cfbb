//! Append-only audit streams on disk.
//!
//! Two families of streams exist. Resource streams are keyed by the content
//! hash of a log and follow that data across every policy that touched it.
//! Instance streams are keyed by (fingerprint, instance) and hold the
//! compliance record of one authorization relationship.

use crate::chain::{ChainReport, verify_records};
use crate::error::{AuditError, AuditResult};
use crate::record::{AuditEntry, AuditRecord};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use ucon_core::{Clock, ContentHash, FileLock, Fingerprint, InstanceId, KeyedLocks, SystemClock};

/// Directory holding generated trusted applications, relative to the root
pub const GENERATED_DIR: &str = "generated_tas";

/// Identifies one audit stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamId {
    /// Lifetime history of one log artifact
    Resource(ContentHash),
    /// Compliance record of one instance
    Instance {
        /// Policy class
        fingerprint: Fingerprint,
        /// Instance under it
        instance: InstanceId,
    },
}

impl StreamId {
    /// Stream file path relative to the repository root
    #[must_use]
    pub fn relative_path(&self) -> PathBuf {
        match self {
            StreamId::Resource(hash) => Path::new("audit")
                .join("resources")
                .join(format!("{}.jsonl", hash)),
            StreamId::Instance {
                fingerprint,
                instance,
            } => Path::new(GENERATED_DIR)
                .join(fingerprint.to_hex())
                .join("audit")
                .join(format!("{}.jsonl", instance)),
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamId::Resource(hash) => write!(f, "resource:{}", hash),
            StreamId::Instance {
                fingerprint,
                instance,
            } => write!(f, "instance:{}/{}", fingerprint, instance),
        }
    }
}

/// Audit streams rooted at a repository directory
pub struct AuditLog {
    root: PathBuf,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks,
}

impl fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLog").field("root", &self.root).finish()
    }
}

impl AuditLog {
    /// Create with the wall clock
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_clock(root, Arc::new(SystemClock))
    }

    /// Create with an injected clock
    #[must_use]
    pub fn with_clock(root: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            root: root.into(),
            clock,
            locks: KeyedLocks::new(),
        }
    }

    /// Repository root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a stream file
    #[must_use]
    pub fn path(&self, stream: &StreamId) -> PathBuf {
        self.root.join(stream.relative_path())
    }

    /// Append one record. Appends to the same stream are serialized across
    /// threads and processes; distinct streams proceed independently.
    ///
    /// # Errors
    ///
    /// Returns error if the stream cannot be locked, read or written
    pub fn append(&self, stream: &StreamId, entry: AuditEntry) -> AuditResult<AuditRecord> {
        let path = self.path(stream);
        let key = stream.to_string();
        self.locks.with_lock(&key, || {
            let _flock = FileLock::acquire(lock_path(&path))?;
            let (sequence, prev_hash) = match last_record(&path)? {
                Some(last) => (last.sequence + 1, last.hash),
                None => (0, ContentHash::zero()),
            };
            let record = AuditRecord::seal(entry, sequence, self.clock.now(), prev_hash)?;

            let mut line = serde_json::to_vec(&record).map_err(ucon_core::CoreError::from)?;
            line.push(b'\n');
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| AuditError::io(&path, e))?;
            file.write_all(&line).map_err(|e| AuditError::io(&path, e))?;
            file.sync_data().map_err(|e| AuditError::io(&path, e))?;

            tracing::debug!(
                stream = %stream,
                sequence,
                operation = %record.operation,
                allowed = record.allowed,
                "audit record appended"
            );
            Ok(record)
        })
    }

    /// All records of a stream in write order; empty if it does not exist
    ///
    /// # Errors
    ///
    /// Returns error on I/O failure or an undecodable line
    pub fn read(&self, stream: &StreamId) -> AuditResult<Vec<AuditRecord>> {
        read_records(&self.path(stream))
    }

    /// Re-walk the hash chain of a stream
    ///
    /// # Errors
    ///
    /// Returns error on I/O failure or the first chain violation
    pub fn verify(&self, stream: &StreamId) -> AuditResult<ChainReport> {
        verify_records(&self.read(stream)?)
    }
}

fn lock_path(stream_path: &Path) -> PathBuf {
    let mut name = stream_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    stream_path.with_file_name(name)
}

fn read_records(path: &Path) -> AuditResult<Vec<AuditRecord>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(AuditError::io(path, e)),
    };
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| AuditError::Corrupt {
                line: i + 1,
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Bytes read per step when scanning a stream backwards
const TAIL_CHUNK: u64 = 4096;

/// Last non-blank line of the file, read from the end
fn last_line(path: &Path) -> io::Result<Option<Vec<u8>>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut end = file.metadata()?.len();
    let mut tail: Vec<u8> = Vec::new();
    while end > 0 {
        let start = end.saturating_sub(TAIL_CHUNK);
        let mut chunk = vec![0; usize::try_from(end - start).unwrap_or(0)];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut chunk)?;
        chunk.extend_from_slice(&tail);
        tail = chunk;
        end = start;

        let line = tail
            .iter()
            .rposition(|b| !b.is_ascii_whitespace())
            .and_then(|last| {
                tail[..last]
                    .iter()
                    .rposition(|&b| b == b'\n')
                    .map(|newline| tail[newline + 1..=last].to_vec())
            });
        if line.is_some() {
            return Ok(line);
        }
    }
    let whole = tail.trim_ascii();
    Ok((!whole.is_empty()).then(|| whole.to_vec()))
}

fn last_record(path: &Path) -> AuditResult<Option<AuditRecord>> {
    let Some(line) = last_line(path).map_err(|e| AuditError::io(path, e))? else {
        return Ok(None);
    };
    match serde_json::from_slice(&line) {
        Ok(record) => Ok(Some(record)),
        // full read reports the offending line number
        Err(_) => Ok(read_records(path)?.pop()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordKind;
    use chrono::{TimeZone, Utc};
    use std::thread;
    use ucon_core::FixedClock;

    fn log(dir: &Path) -> AuditLog {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()));
        AuditLog::with_clock(dir, clock)
    }

    #[test]
    fn test_stream_paths() {
        let fp = Fingerprint::of_canonical(b"x");
        let instance = StreamId::Instance {
            fingerprint: fp,
            instance: InstanceId::new(2),
        };
        assert_eq!(
            instance.relative_path(),
            PathBuf::from(format!("generated_tas/{}/audit/02.jsonl", fp))
        );
        let hash = ContentHash::compute(b"log");
        assert_eq!(
            StreamId::Resource(hash).relative_path(),
            PathBuf::from(format!("audit/resources/{}.jsonl", hash))
        );
    }

    #[test]
    fn test_append_chains_records() {
        let dir = tempfile::tempdir().unwrap();
        let audit = log(dir.path());
        let stream = StreamId::Resource(ContentHash::compute(b"log"));

        let first = audit
            .append(&stream, AuditEntry::decision("access-log", "pubk1", "it", true))
            .unwrap();
        let second = audit
            .append(
                &stream,
                AuditEntry::decision("access-log", "pubk2", "fr", false).with_reason("unauthorized"),
            )
            .unwrap();

        assert_eq!(first.sequence, 0);
        assert_eq!(first.prev_hash, ContentHash::zero());
        assert_eq!(second.sequence, 1);
        assert_eq!(second.prev_hash, first.hash);

        let records = audit.read(&stream).unwrap();
        assert_eq!(records, vec![first, second.clone()]);
        let report = audit.verify(&stream).unwrap();
        assert_eq!(report.records, 2);
        assert_eq!(report.head, second.hash);
    }

    #[test]
    fn test_missing_stream_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let audit = log(dir.path());
        let stream = StreamId::Resource(ContentHash::compute(b"none"));
        assert!(audit.read(&stream).unwrap().is_empty());
        assert_eq!(audit.verify(&stream).unwrap().records, 0);
    }

    #[test]
    fn test_streams_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let audit = log(dir.path());
        let a = StreamId::Resource(ContentHash::compute(b"a"));
        let b = StreamId::Instance {
            fingerprint: Fingerprint::of_canonical(b"fp"),
            instance: InstanceId::FIRST,
        };
        audit.append(&a, AuditEntry::submission("alice")).unwrap();
        let rb = audit
            .append(&b, AuditEntry::decision("get-policy", "bob", "it", true))
            .unwrap();
        assert_eq!(rb.sequence, 0);
        assert_eq!(audit.read(&a).unwrap()[0].kind, RecordKind::Submission);
    }

    #[test]
    fn test_tampering_on_disk_detected() {
        let dir = tempfile::tempdir().unwrap();
        let audit = log(dir.path());
        let stream = StreamId::Resource(ContentHash::compute(b"log"));
        for _ in 0..3 {
            audit
                .append(&stream, AuditEntry::decision("access-log", "pubk1", "it", true))
                .unwrap();
        }
        let path = audit.path(&stream);
        let content = fs::read_to_string(&path).unwrap();
        fs::write(&path, content.replacen("\"allowed\":true", "\"allowed\":false", 1)).unwrap();
        assert!(matches!(
            audit.verify(&stream).unwrap_err(),
            AuditError::BrokenChain { sequence: 0, .. }
        ));
    }

    #[test]
    fn test_last_record_reads_tail_of_long_stream() {
        let dir = tempfile::tempdir().unwrap();
        let audit = log(dir.path());
        let stream = StreamId::Resource(ContentHash::compute(b"long"));
        let mut head = None;
        for i in 0..200 {
            let record = audit
                .append(
                    &stream,
                    AuditEntry::decision("access-log", &format!("actor{}", i), "it", true),
                )
                .unwrap();
            assert_eq!(record.sequence, i);
            head = Some(record);
        }
        let path = audit.path(&stream);
        assert!(fs::metadata(&path).unwrap().len() > 4 * TAIL_CHUNK);
        assert_eq!(last_record(&path).unwrap(), head);
        assert_eq!(audit.verify(&stream).unwrap().records, 200);
    }

    #[test]
    fn test_last_record_ignores_trailing_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let audit = log(dir.path());
        let stream = StreamId::Resource(ContentHash::compute(b"blank"));
        audit.append(&stream, AuditEntry::submission("alice")).unwrap();
        let second = audit.append(&stream, AuditEntry::submission("bob")).unwrap();

        let path = audit.path(&stream);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"\n  \n").unwrap();
        assert_eq!(last_record(&path).unwrap(), Some(second.clone()));

        let third = audit.append(&stream, AuditEntry::submission("carol")).unwrap();
        assert_eq!(third.sequence, 2);
        assert_eq!(third.prev_hash, second.hash);
        assert!(last_record(&dir.path().join("absent.jsonl")).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_tail_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        let audit = log(dir.path());
        let stream = StreamId::Resource(ContentHash::compute(b"corrupt"));
        audit.append(&stream, AuditEntry::submission("alice")).unwrap();
        let path = audit.path(&stream);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{not json\n").unwrap();
        assert!(matches!(
            audit.append(&stream, AuditEntry::submission("bob")).unwrap_err(),
            AuditError::Corrupt { line: 2, .. }
        ));
    }

    #[test]
    fn test_concurrent_appends_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let audit = Arc::new(log(dir.path()));
        let stream = StreamId::Resource(ContentHash::compute(b"shared"));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let audit = Arc::clone(&audit);
                thread::spawn(move || {
                    audit
                        .append(
                            &stream,
                            AuditEntry::decision("access-log", &format!("actor{}", i), "it", true),
                        )
                        .unwrap()
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let records = audit.read(&stream).unwrap();
        assert_eq!(records.len(), 16);
        let sequences: Vec<u64> = records.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, (0..16).collect::<Vec<_>>());
        assert_eq!(audit.verify(&stream).unwrap().records, 16);
    }
}
