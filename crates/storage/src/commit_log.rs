//! Append-only commit log for persistent stores
//!
//! Every successful mutation appends the resulting record. Reopening the
//! store replays the log in order; the last record per identity wins.
//!
//! ## Record Format
//!
//! ```text
//! ┌──────────┬──────────┬───────────────────────────┬──────────┐
//! │ len: u32 │ fmt: u8  │ VersionedRecord (msgpack) │ crc: u32 │
//! └──────────┴──────────┴───────────────────────────┴──────────┘
//! ```
//!
//! `len` counts everything after itself (format byte, body, checksum). The
//! CRC32 covers the format byte and the body. All integers little-endian.
//!
//! A torn record at the very end of the file (short read or checksum
//! failure on the final frame) is truncated away on open. A damaged record
//! followed by more data is reported as corruption.
//!
//! Appends always start at the end of the last complete frame: a failed
//! write is cut back before returning, and stray bytes past that point are
//! truncated before the next frame goes out.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use docstore_core::{DocStoreError, Result, VersionedRecord};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of the log inside the storage directory
pub const COMMIT_LOG_FILE_NAME: &str = "commits.log";

/// Current record format version
pub const RECORD_FORMAT_VERSION: u8 = 1;

/// Length prefix + format byte + checksum
const FRAME_OVERHEAD: usize = 4 + 1 + 4;

/// Why a frame could not be decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Not enough bytes for a complete frame
    InsufficientData,
    /// Stored and computed checksums differ
    ChecksumMismatch {
        /// CRC stored in the frame
        expected: u32,
        /// CRC computed over the frame contents
        computed: u32,
    },
    /// Structurally invalid frame (bad length, unknown format, bad body)
    InvalidFormat(String),
}

/// Serialize one record into a frame
pub fn encode_record(record: &VersionedRecord) -> Result<Vec<u8>> {
    let body =
        rmp_serde::to_vec_named(record).map_err(|e| DocStoreError::Serialization(e.to_string()))?;

    let mut payload = Vec::with_capacity(1 + body.len());
    payload.push(RECORD_FORMAT_VERSION);
    payload.extend_from_slice(&body);
    let crc = crc32fast::hash(&payload);

    let total_len = payload.len() + 4;
    let mut frame = Vec::with_capacity(4 + total_len);
    frame.write_u32::<LittleEndian>(total_len as u32)?;
    frame.extend_from_slice(&payload);
    frame.write_u32::<LittleEndian>(crc)?;
    Ok(frame)
}

/// Decode one frame from the front of `bytes`
///
/// Returns the record and the number of bytes consumed.
pub fn decode_record(bytes: &[u8]) -> std::result::Result<(VersionedRecord, usize), FrameError> {
    if bytes.len() < 4 {
        return Err(FrameError::InsufficientData);
    }

    let length = LittleEndian::read_u32(&bytes[0..4]) as usize;
    if length < FRAME_OVERHEAD - 4 {
        return Err(FrameError::InvalidFormat(format!(
            "frame length {} below minimum",
            length
        )));
    }
    if bytes.len() < 4 + length {
        return Err(FrameError::InsufficientData);
    }

    let frame = &bytes[4..4 + length];
    let payload = &frame[..length - 4];
    let stored_crc = LittleEndian::read_u32(&frame[length - 4..]);
    let computed_crc = crc32fast::hash(payload);
    if stored_crc != computed_crc {
        return Err(FrameError::ChecksumMismatch {
            expected: stored_crc,
            computed: computed_crc,
        });
    }

    if payload[0] != RECORD_FORMAT_VERSION {
        return Err(FrameError::InvalidFormat(format!(
            "unknown record format {}",
            payload[0]
        )));
    }

    let record: VersionedRecord = rmp_serde::from_slice(&payload[1..])
        .map_err(|e| FrameError::InvalidFormat(e.to_string()))?;
    Ok((record, 4 + length))
}

/// Append-only log of committed records
pub struct CommitLog {
    path: PathBuf,
    file: Mutex<LogFile>,
}

struct LogFile {
    file: File,
    /// End of the last complete frame
    end: u64,
}

impl CommitLog {
    /// Open (or create) the log in `dir` and return every valid record in it
    ///
    /// A torn tail is truncated so later appends start on a frame boundary.
    pub fn open(dir: &Path) -> Result<(Self, Vec<VersionedRecord>)> {
        let path = dir.join(COMMIT_LOG_FILE_NAME);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;

        let (records, valid_end) = Self::replay(&buffer)?;
        if valid_end < buffer.len() {
            warn!(
                target: "docstore::store",
                path = %path.display(),
                discarded = buffer.len() - valid_end,
                "Discarding torn commit log tail"
            );
            file.set_len(valid_end as u64)?;
        }

        debug!(target: "docstore::store", path = %path.display(), records = records.len(), "Commit log replayed");

        Ok((
            CommitLog {
                path,
                file: Mutex::new(LogFile {
                    file,
                    end: valid_end as u64,
                }),
            },
            records,
        ))
    }

    /// Decode all frames; returns the records and the end of the valid prefix
    fn replay(buffer: &[u8]) -> Result<(Vec<VersionedRecord>, usize)> {
        let mut records = Vec::new();
        let mut offset = 0;

        while offset < buffer.len() {
            let remaining = &buffer[offset..];
            match decode_record(remaining) {
                Ok((record, consumed)) => {
                    records.push(record);
                    offset += consumed;
                }
                Err(FrameError::InsufficientData) => break,
                Err(FrameError::ChecksumMismatch { expected, computed }) => {
                    let length = LittleEndian::read_u32(&remaining[0..4]) as usize;
                    if offset + 4 + length == buffer.len() {
                        break;
                    }
                    return Err(DocStoreError::Corruption(format!(
                        "commit log checksum mismatch at offset {}: stored {:#010x}, computed {:#010x}",
                        offset, expected, computed
                    )));
                }
                Err(FrameError::InvalidFormat(msg)) => {
                    return Err(DocStoreError::Corruption(format!(
                        "invalid commit log record at offset {}: {}",
                        offset, msg
                    )));
                }
            }
        }

        Ok((records, offset))
    }

    /// Append one record
    ///
    /// # Errors
    ///
    /// `Io` if the frame could not be written. The log is left ending on
    /// the previous frame boundary.
    pub fn append(&self, record: &VersionedRecord) -> Result<()> {
        let frame = encode_record(record)?;
        let mut log = self.file.lock();

        let on_disk = log.file.metadata()?.len();
        if on_disk != log.end {
            warn!(
                target: "docstore::store",
                path = %self.path.display(),
                discarded = on_disk.saturating_sub(log.end),
                "Truncating bytes past the last complete commit log record"
            );
            log.file.set_len(log.end)?;
        }

        if let Err(e) = log.file.write_all(&frame) {
            warn!(
                target: "docstore::store",
                path = %self.path.display(),
                error = %e,
                "Commit log append failed; rolling back partial record"
            );
            log.file.set_len(log.end)?;
            return Err(e.into());
        }
        log.end += frame.len() as u64;
        Ok(())
    }

    /// Flush buffered writes to the OS
    pub fn flush(&self) -> Result<()> {
        self.file.lock().file.flush()?;
        Ok(())
    }
}
