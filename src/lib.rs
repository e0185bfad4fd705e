//! Commit and abort markers for a crash-recoverable write-ahead journal.
//!
//! [`TxnRec`] is the record codec: it writes a marker into disk-block aligned
//! buffers, possibly across several calls, reads it back from a byte source,
//! and verifies the record tail. [`Journal`] and [`recover`] build a
//! single-file journal on top of it.

mod bins;
mod checksum;
mod error;
mod file_lock;
mod header;
mod id;
mod jrec;
mod journal;
mod recovery;
mod tail;
mod txn_rec;

pub use checksum::{Checksum, Crc64};
pub use error::{JournalError, JournalResult};
pub use header::{
    RecordHeader, TxnHeader, JOURNAL_VERSION, MAX_XID_SIZE, RECORD_KIND_TXN, RECORD_MAGIC,
    REC_HDR_SIZE, TXN_HDR_SIZE,
};
pub use id::Rid;
pub use jrec::{size_dblks, JournalRecord, DBLK_SIZE};
pub use journal::{CorruptionPolicy, Journal, Setting};
pub use recovery::{recover, RecoveryResult, TxnMarker};
pub use tail::{RecordTail, TailMismatch, REC_TAIL_SIZE};
pub use txn_rec::{RecordState, TxnRec};
