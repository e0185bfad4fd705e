use crate::tail::TailMismatch;

/// Conditions detected while decoding or verifying a journal record.
///
/// Corruption detection is advisory: nothing is repaired in place, the caller
/// decides whether to stop at the record or scan past it.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// Magic, version, record kind or a header field is not what this codec
    /// writes.
    #[error("record format mismatch at offset 0x{rec_start:x}: {reason}")]
    FormatMismatch { rec_start: u64, reason: String },

    /// The tail disagrees with the header or with the checksum of the
    /// header and xid bytes.
    #[error("bad record tail at offset 0x{rec_start:x}: {mismatch} mismatch")]
    TailCorruption {
        rec_start: u64,
        mismatch: TailMismatch,
    },

    /// The input ended before the whole record was read. Usually the torn end
    /// of a journal rather than bit-level corruption.
    #[error("truncated record at offset 0x{rec_start:x}: {rec_offs} of {rec_size} bytes available")]
    TruncatedInput {
        rec_start: u64,
        rec_offs: usize,
        rec_size: usize,
    },

    /// An xid longer than [`MAX_XID_SIZE`](crate::MAX_XID_SIZE) was handed to
    /// the encoder. Such a record could never be read back.
    #[error("xid of {xid_size} bytes exceeds the limit of {max} bytes")]
    XidTooLarge { xid_size: usize, max: u64 },

    /// `decode` was asked to continue past the bytes it has actually read.
    #[error("cannot resume record at offset 0x{rec_start:x} from byte {rec_offs}, only {decoded} bytes were decoded")]
    OffsetMismatch {
        rec_start: u64,
        rec_offs: usize,
        decoded: usize,
    },

    #[error("journal io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type JournalResult<T> = Result<T, JournalError>;
