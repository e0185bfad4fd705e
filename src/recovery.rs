use crate::checksum::Crc64;
use crate::error::{JournalError, JournalResult};
use crate::file_lock::FileLock;
use crate::header::{RecordHeader, JOURNAL_VERSION, RECORD_KIND_TXN, RECORD_MAGIC, REC_HDR_SIZE};
use crate::id::Rid;
use crate::jrec::{JournalRecord, DBLK_SIZE};
use crate::journal::{
    new_journal_header, CorruptionPolicy, Journal, JournalHeader, Setting, JOURNAL_HEADER_SIZE,
};
use crate::txn_rec::TxnRec;
use anyhow::anyhow;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A verified commit or abort marker found in the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxnMarker {
    pub rid: Rid,
    pub commit: bool,
    pub xid: Vec<u8>,
    /// File position of the record.
    pub offset: u64,
}

pub struct RecoveryResult {
    pub journal: Journal,
    pub next_rid: Rid,
    pub recovered: usize,
    /// Positions of damaged records passed over under [`CorruptionPolicy::Skip`].
    pub corrupted: Vec<u64>,
}

/// Opens the journal at `path` (creating it when missing) and hands every
/// verified marker to `f` in journal order. Anything after the last valid
/// record is cut off so new markers are appended right behind it.
pub fn recover(
    path: &Path,
    setting: Setting,
    mut f: impl FnMut(&TxnMarker) -> anyhow::Result<()>,
) -> anyhow::Result<RecoveryResult> {
    setting.validate()?;

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?
        .lock_exclusive()?;
    if !file.metadata()?.is_file() {
        return Err(anyhow!("journal is not a regular file"));
    }

    let header = load_journal_header(&mut file)?;
    log::debug!("journal_header_loaded header={header:?}");

    let scan = scan(&mut file, &header, setting.corruption_policy, &mut f)?;

    let len = file.metadata()?.len();
    if len > scan.end_offset {
        log::warn!(
            "journal_truncated from={} to={} dropped={}",
            len,
            scan.end_offset,
            len - scan.end_offset
        );
        file.set_len(scan.end_offset)?;
        file.sync_all()?;
    }

    log::debug!(
        "journal_recovered markers={} next_rid={} corrupted={}",
        scan.recovered,
        scan.next_rid,
        scan.corrupted.len()
    );

    let journal = Journal::new(file, &header, setting, scan.end_offset, scan.next_rid);
    Ok(RecoveryResult {
        journal,
        next_rid: scan.next_rid,
        recovered: scan.recovered,
        corrupted: scan.corrupted,
    })
}

fn load_journal_header(f: &mut File) -> anyhow::Result<JournalHeader> {
    let mut buff = [0u8; JOURNAL_HEADER_SIZE];

    if f.metadata()?.len() < JOURNAL_HEADER_SIZE as u64 {
        let header = new_journal_header();
        header.encode(&mut buff);
        f.seek(SeekFrom::Start(0))?;
        f.write_all(&buff)?;
        f.set_len(JOURNAL_HEADER_SIZE as u64)?;
        f.sync_all()?;
        return Ok(header);
    }

    f.seek(SeekFrom::Start(0))?;
    f.read_exact(&mut buff)?;
    let header = JournalHeader::decode(&buff).ok_or_else(|| anyhow!("corrupted journal header"))?;
    if header.version != JOURNAL_VERSION {
        return Err(anyhow!("unsupported journal version: {}", header.version));
    }

    Ok(header)
}

struct Scan {
    end_offset: u64,
    next_rid: Rid,
    recovered: usize,
    corrupted: Vec<u64>,
}

fn scan<F>(
    f: &mut File,
    header: &JournalHeader,
    policy: CorruptionPolicy,
    callback: &mut F,
) -> anyhow::Result<Scan>
where
    F: FnMut(&TxnMarker) -> anyhow::Result<()>,
{
    let len = f.metadata()?.len();
    let mut reader = BufReader::new(f);
    let mut rec = TxnRec::<Crc64>::new();

    let mut result = Scan {
        end_offset: JOURNAL_HEADER_SIZE as u64,
        next_rid: header.first_rid,
        recovered: 0,
        corrupted: vec![],
    };

    let mut pos = JOURNAL_HEADER_SIZE as u64;
    // set while looking for the next record boundary after a damaged record
    let mut resyncing = false;
    while pos + REC_HDR_SIZE as u64 <= len {
        reader.seek(SeekFrom::Start(pos))?;
        let mut buff = [0u8; REC_HDR_SIZE];
        reader.read_exact(&mut buff)?;
        let hdr = RecordHeader::decode(&buff);

        // unwritten space, or a record left over from an older use of the file
        if hdr.magic != RECORD_MAGIC || hdr.serial != header.serial {
            if resyncing {
                pos += DBLK_SIZE as u64;
                continue;
            }
            log::debug!(
                "journal_scan_end offset={pos} magic=0x{:08x} serial={}",
                hdr.magic,
                hdr.serial
            );
            break;
        }

        let decoded = match hdr.kind {
            RECORD_KIND_TXN => read_txn(&mut rec, &hdr, &mut reader, pos),
            kind => Err(JournalError::FormatMismatch {
                rec_start: pos,
                reason: format!("unknown record kind 0x{kind:02x}"),
            }),
        };

        match decoded {
            Ok(marker) => {
                let after = marker
                    .rid
                    .next()
                    .ok_or_else(|| anyhow!("rid space exhausted at offset {pos}"))?;
                callback(&marker)?;
                result.next_rid = std::cmp::max(result.next_rid, after);
                result.recovered += 1;
                pos += (rec.size_dblks() * DBLK_SIZE) as u64;
                result.end_offset = pos;
                resyncing = false;
            }
            Err(err @ JournalError::TruncatedInput { .. }) => {
                log::debug!("journal_scan_end offset={pos} err={err}");
                break;
            }
            Err(
                err @ (JournalError::FormatMismatch { .. } | JournalError::TailCorruption { .. }),
            ) => match policy {
                CorruptionPolicy::Stop => {
                    log::warn!("journal_corrupted policy=stop err={err}");
                    break;
                }
                CorruptionPolicy::Skip => {
                    log::warn!("journal_corrupted policy=skip err={err}");
                    result.corrupted.push(pos);
                    pos += DBLK_SIZE as u64;
                    resyncing = true;
                }
            },
            Err(err) => return Err(err.into()),
        }
    }

    Ok(result)
}

fn read_txn<R: Read>(
    rec: &mut TxnRec<'_, Crc64>,
    hdr: &RecordHeader,
    src: &mut R,
    rec_start: u64,
) -> JournalResult<TxnMarker> {
    let mut rec_offs = 0;
    let commit = rec.decode(hdr, src, &mut rec_offs, rec_start)?;
    rec.check_rec_tail(rec_start)?;
    Ok(TxnMarker {
        rid: rec.rid(),
        commit,
        xid: rec.get_xid().to_vec(),
        offset: rec_start,
    })
}
