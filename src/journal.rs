use crate::bins::{SliceExt, SliceMutExt};
use crate::checksum::{Checksum, Crc64};
use crate::header::JOURNAL_VERSION;
use crate::id::Rid;
use crate::jrec::{JournalRecord, DBLK_SIZE};
use crate::recovery::recover;
use crate::txn_rec::TxnRec;
use anyhow::anyhow;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

/// The file header takes the whole first disk block, records start right after.
pub(crate) const JOURNAL_HEADER_SIZE: usize = DBLK_SIZE;

const JOURNAL_FILE_MAGIC: &[u8; 8] = b"txnjrnl\0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptionPolicy {
    /// Treat the journal as ending at the first damaged record.
    #[default]
    Stop,
    /// Report the damaged record and keep scanning at the next disk block.
    Skip,
}

#[derive(Debug, Clone)]
pub struct Setting {
    /// Size of the in-memory write buffer, in disk blocks.
    pub buffer_dblks: usize,
    /// Flush and fsync after every appended marker.
    pub flush_on_append: bool,
    pub corruption_policy: CorruptionPolicy,
}

impl std::default::Default for Setting {
    fn default() -> Self {
        Self {
            buffer_dblks: 32,
            flush_on_append: true,
            corruption_policy: CorruptionPolicy::Stop,
        }
    }
}

impl Setting {
    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        if self.buffer_dblks == 0 {
            return Err(anyhow!("write buffer must hold at least one disk block"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct JournalHeader {
    pub(crate) version: u16,
    pub(crate) serial: u64,
    pub(crate) first_rid: Rid,
}

impl JournalHeader {
    pub(crate) fn decode(buff: &[u8]) -> Option<Self> {
        if buff[0..8].cmp(JOURNAL_FILE_MAGIC).is_ne() {
            return None;
        }
        let version = buff[8..10].read_u16();
        let serial = buff[10..18].read_u64();
        let first_rid = Rid::new(buff[18..26].read_u64());

        let stored_checksum = buff[26..34].read_u64();
        let mut checksum = Crc64::new();
        checksum.add_data(&buff[0..26]);
        if stored_checksum != checksum.value() {
            return None;
        }

        Some(JournalHeader {
            version,
            serial,
            first_rid,
        })
    }

    pub(crate) fn encode(&self, buff: &mut [u8]) {
        assert_eq!(JOURNAL_HEADER_SIZE, buff.len());
        buff[0..8].copy_from_slice(JOURNAL_FILE_MAGIC);
        buff[8..10].put_u16(self.version);
        buff[10..18].put_u64(self.serial);
        buff[18..26].put_u64(self.first_rid.get());
        let mut checksum = Crc64::new();
        checksum.add_data(&buff[0..26]);
        buff[26..34].put_u64(checksum.value());
        buff[34..].fill(0);
    }
}

/// Append-only journal of commit and abort markers.
pub struct Journal {
    f: Mutex<File>,
    serial: u64,
    setting: Setting,

    internal: Mutex<JournalInternal>,
}

struct JournalInternal {
    buffer: Vec<u8>,
    offset_end: usize,
    // file position of `buffer[0]`
    file_offset: u64,
    next_rid: Rid,
    // set after a failed write; the buffer and the file tail are unknown
    poisoned: bool,
}

impl JournalInternal {
    fn check_poisoned(&self) -> anyhow::Result<()> {
        if self.poisoned {
            return Err(anyhow!("journal is unusable after a failed write"));
        }
        Ok(())
    }
}

impl Journal {
    /// Opens the journal at `path`, creating it when missing. Existing markers
    /// are scanned and dropped; use [`recover`] to replay them.
    pub fn open(path: &Path, setting: Setting) -> anyhow::Result<Self> {
        Ok(recover(path, setting, |_| Ok(()))?.journal)
    }

    pub(crate) fn new(
        f: File,
        header: &JournalHeader,
        setting: Setting,
        end_offset: u64,
        next_rid: Rid,
    ) -> Self {
        let buffer = vec![0u8; setting.buffer_dblks * DBLK_SIZE];
        Journal {
            f: Mutex::new(f),
            serial: header.serial,
            setting,

            internal: Mutex::new(JournalInternal {
                buffer,
                offset_end: 0,
                file_offset: end_offset,
                next_rid,
                poisoned: false,
            }),
        }
    }

    /// Appends a commit (`commit == true`) or abort marker for `xid` and
    /// returns the rid assigned to it.
    ///
    /// An xid over [`MAX_XID_SIZE`](crate::MAX_XID_SIZE) is refused without
    /// touching the journal. Any write failure poisons the journal: the
    /// marker is not acknowledged and every later append, `sync` or
    /// `shutdown` fails, so nothing written behind a torn record is ever
    /// flushed.
    pub fn append_txn(&self, commit: bool, xid: &[u8]) -> anyhow::Result<Rid> {
        let mut internal = self.internal.lock();
        internal.check_poisoned()?;
        let rid = internal.next_rid;
        let next_rid = rid
            .next()
            .ok_or_else(|| anyhow!("rid space exhausted at {rid}"))?;

        let mut rec = TxnRec::<Crc64>::new();
        rec.reset(commit, self.serial, rid, xid)?;

        if let Err(err) = self.write_marker(&mut internal, &mut rec) {
            internal.poisoned = true;
            log::error!("journal_write_error rid={rid} err={err}");
            return Err(err);
        }
        internal.next_rid = next_rid;

        log::debug!(
            "journal_appended rid={rid} commit={commit} xid_size={} dblks={}",
            xid.len(),
            rec.size_dblks()
        );

        Ok(rid)
    }

    fn write_marker(
        &self,
        internal: &mut JournalInternal,
        rec: &mut TxnRec<'_, Crc64>,
    ) -> anyhow::Result<()> {
        self.write_record(internal, rec, &mut Crc64::new())?;
        if self.setting.flush_on_append {
            Self::flush(&mut self.f.lock(), internal)?;
        }
        Ok(())
    }

    fn write_record<R: JournalRecord>(
        &self,
        internal: &mut JournalInternal,
        rec: &mut R,
        checksum: &mut R::Checksum,
    ) -> anyhow::Result<()> {
        let size_dblks = rec.size_dblks();
        let mut rec_offs_dblks = 0;
        while rec_offs_dblks < size_dblks {
            let free_dblks = (internal.buffer.len() - internal.offset_end) / DBLK_SIZE;
            if free_dblks == 0 {
                Self::flush(&mut self.f.lock(), internal)?;
                continue;
            }

            let offset_end = internal.offset_end;
            let n = rec.encode(
                &mut internal.buffer[offset_end..],
                rec_offs_dblks,
                free_dblks,
                checksum,
            );
            if n == 0 {
                return Err(anyhow!(
                    "record rid={} made no progress at dblk {rec_offs_dblks}",
                    rec.rid()
                ));
            }
            internal.offset_end += n * DBLK_SIZE;
            rec_offs_dblks += n;
        }

        Ok(())
    }

    /// Writes every buffered marker to disk.
    pub fn sync(&self) -> anyhow::Result<()> {
        let mut internal = self.internal.lock();
        internal.check_poisoned()?;
        if let Err(err) = Self::flush(&mut self.f.lock(), &mut internal) {
            internal.poisoned = true;
            log::error!("journal_write_error err={err}");
            return Err(err);
        }
        Ok(())
    }

    fn flush(f: &mut File, internal: &mut JournalInternal) -> anyhow::Result<()> {
        if internal.offset_end == 0 {
            return Ok(());
        }

        f.seek(SeekFrom::Start(internal.file_offset))?;
        f.write_all(&internal.buffer[..internal.offset_end])?;
        f.sync_all()?;
        log::debug!(
            "journal_flushed offset={} len={}",
            internal.file_offset,
            internal.offset_end
        );

        internal.file_offset += internal.offset_end as u64;
        internal.offset_end = 0;
        Ok(())
    }

    /// Rid the next appended marker will get.
    pub fn next_rid(&self) -> Rid {
        self.internal.lock().next_rid
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn shutdown(self) -> anyhow::Result<()> {
        let mut internal = self.internal.into_inner();
        internal.check_poisoned()?;
        let mut f = self.f.into_inner();
        Self::flush(&mut f, &mut internal)
    }
}

pub(crate) fn new_journal_header() -> JournalHeader {
    JournalHeader {
        version: JOURNAL_VERSION,
        serial: 1,
        first_rid: Rid::new(1),
    }
}
