use crate::checksum::{Checksum, Crc64};
use crate::error::{JournalError, JournalResult};
use crate::header::{
    RecordHeader, TxnHeader, MAX_XID_SIZE, RECORD_KIND_TXN, REC_HDR_SIZE, TXN_HDR_SIZE,
};
use crate::id::Rid;
use crate::jrec::{read_fill, size_dblks, JournalRecord, CLEAN_CHAR, DBLK_SIZE};
use crate::tail::{RecordTail, REC_TAIL_SIZE};
use std::fmt;
use std::io::Read;
use std::marker::PhantomData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Idle,
    Encoding,
    Encoded,
    Decoding,
    Decoded,
    Verified,
    /// The marker was rejected; only `reset` or a fresh decode at offset 0
    /// leaves this state.
    Failed,
}

/// The xid bytes of a marker. Encoding borrows them from the caller, decoding
/// reads them into a buffer owned by the record.
#[derive(Debug)]
enum Xid<'a> {
    Borrowed(&'a [u8]),
    Owned(Vec<u8>),
}

impl Xid<'_> {
    fn as_slice(&self) -> &[u8] {
        match self {
            Xid::Borrowed(xid) => xid,
            Xid::Owned(xid) => xid,
        }
    }
}

/// A commit or abort marker closing a transaction in the journal.
///
/// One instance is reused for many markers: [`TxnRec::reset`] prepares it for
/// encoding, [`JournalRecord::decode`] fills it from a journal. Both directions
/// keep an explicit byte cursor so a record can be written into, or read from,
/// any number of fragments.
///
/// Layout: `[txn header (33)][xid][tail (28)]`, see [`TxnHeader`] and
/// [`RecordTail`].
pub struct TxnRec<'a, C = Crc64> {
    hdr: TxnHeader,
    hdr_raw: [u8; TXN_HDR_SIZE],
    xid: Xid<'a>,
    tail: RecordTail,
    tail_raw: [u8; REC_TAIL_SIZE],
    tail_sealed: bool,
    cursor: usize,
    state: RecordState,
    _checksum: PhantomData<fn() -> C>,
}

impl<'a, C: Checksum + Default> TxnRec<'a, C> {
    pub fn new() -> Self {
        let hdr = TxnHeader {
            rhdr: RecordHeader::new(RECORD_KIND_TXN, 0, Rid::default()),
            commit: false,
            xid_size: 0,
        };
        let mut hdr_raw = [0u8; TXN_HDR_SIZE];
        hdr.encode(&mut hdr_raw);

        Self {
            hdr,
            hdr_raw,
            xid: Xid::Borrowed(&[]),
            tail: RecordTail::new(&hdr.rhdr, 0),
            tail_raw: [0u8; REC_TAIL_SIZE],
            tail_sealed: false,
            cursor: 0,
            state: RecordState::Idle,
            _checksum: PhantomData,
        }
    }

    /// Prepares the record for encoding a new marker. `xid` is borrowed, not
    /// copied, and must stay untouched until the last `encode` call.
    ///
    /// An xid longer than [`MAX_XID_SIZE`] is refused and leaves the record
    /// `Failed`, so `encode` writes nothing.
    pub fn reset(
        &mut self,
        commit: bool,
        serial: u64,
        rid: Rid,
        xid: &'a [u8],
    ) -> JournalResult<()> {
        self.clean();
        if xid.len() as u64 > MAX_XID_SIZE {
            self.state = RecordState::Failed;
            return Err(JournalError::XidTooLarge {
                xid_size: xid.len(),
                max: MAX_XID_SIZE,
            });
        }

        self.hdr = TxnHeader {
            rhdr: RecordHeader::new(RECORD_KIND_TXN, serial, rid),
            commit,
            xid_size: xid.len() as u64,
        };
        self.hdr.encode(&mut self.hdr_raw);
        self.xid = Xid::Borrowed(xid);
        self.tail = RecordTail::new(&self.hdr.rhdr, 0);
        Ok(())
    }

    /// Drops any decoded xid and partial progress, returning to `Idle`.
    pub fn clean(&mut self) {
        self.xid = Xid::Borrowed(&[]);
        self.tail_sealed = false;
        self.cursor = 0;
        self.state = RecordState::Idle;
    }

    pub fn get_xid(&self) -> &[u8] {
        self.xid.as_slice()
    }

    pub fn is_commit(&self) -> bool {
        self.hdr.commit
    }

    pub fn serial(&self) -> u64 {
        self.hdr.rhdr.serial
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    /// Record bytes encoded or decoded so far.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn body_size(&self) -> usize {
        TXN_HDR_SIZE + self.hdr.xid_size as usize
    }

    fn truncated(&self, rec_start: u64) -> JournalError {
        JournalError::TruncatedInput {
            rec_start,
            rec_offs: self.cursor,
            rec_size: self.rec_size(),
        }
    }

    /// The error a rejected record keeps reporting until it is restarted.
    fn rejected(&self, rec_start: u64) -> JournalError {
        match TxnHeader::decode(&self.hdr_raw, rec_start)
            .and_then(|txn| txn.rhdr.validate(rec_start))
        {
            Err(err) => err,
            Ok(()) => JournalError::FormatMismatch {
                rec_start,
                reason: "record was rejected, decode it again from the start".to_string(),
            },
        }
    }

    fn owned_xid(&mut self) -> &mut Vec<u8> {
        if let Xid::Borrowed(_) = self.xid {
            self.xid = Xid::Owned(Vec::new());
        }
        match &mut self.xid {
            Xid::Owned(buff) => buff,
            Xid::Borrowed(_) => unreachable!("xid buffer was just made owned"),
        }
    }

    fn start_decode(&mut self, hdr: &RecordHeader, rec_start: u64) -> JournalResult<()> {
        hdr.validate(rec_start)?;
        if hdr.kind != RECORD_KIND_TXN {
            return Err(JournalError::FormatMismatch {
                rec_start,
                reason: format!("record kind 0x{:02x} is not a transaction marker", hdr.kind),
            });
        }

        // keep the previous allocation around for the next xid
        let mut buff = match std::mem::replace(&mut self.xid, Xid::Borrowed(&[])) {
            Xid::Owned(buff) => buff,
            Xid::Borrowed(_) => Vec::new(),
        };
        buff.clear();
        self.xid = Xid::Owned(buff);

        self.hdr = TxnHeader {
            rhdr: *hdr,
            commit: false,
            xid_size: 0,
        };
        hdr.encode(&mut self.hdr_raw[..REC_HDR_SIZE]);
        self.tail_sealed = false;
        self.cursor = REC_HDR_SIZE;
        self.state = RecordState::Decoding;
        Ok(())
    }
}

impl<C: Checksum + Default> Default for TxnRec<'_, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Checksum + Default> JournalRecord for TxnRec<'_, C> {
    type Checksum = C;

    fn encode(
        &mut self,
        buff: &mut [u8],
        rec_offs_dblks: usize,
        max_size_dblks: usize,
        checksum: &mut C,
    ) -> usize {
        let rec_size = self.rec_size();
        let start = rec_offs_dblks * DBLK_SIZE;
        let capacity = std::cmp::min(max_size_dblks, buff.len() / DBLK_SIZE) * DBLK_SIZE;
        if start >= rec_size || capacity == 0 || self.state == RecordState::Failed {
            return 0;
        }

        let body_size = self.body_size();
        let end = std::cmp::min(rec_size, start + capacity);
        let mut pos = start;
        let mut written = 0;

        if pos < TXN_HDR_SIZE {
            let n = std::cmp::min(TXN_HDR_SIZE, end) - pos;
            let src = &self.hdr_raw[pos..pos + n];
            buff[..n].copy_from_slice(src);
            checksum.add_data(src);
            pos += n;
            written += n;
        }

        if pos < end && pos < body_size {
            let from = pos - TXN_HDR_SIZE;
            let n = std::cmp::min(body_size, end) - pos;
            let src = &self.xid.as_slice()[from..from + n];
            buff[written..written + n].copy_from_slice(src);
            checksum.add_data(src);
            pos += n;
            written += n;
        }

        // the tail carries the checksum of everything before it
        if pos >= body_size && !self.tail_sealed {
            self.tail.checksum = checksum.value();
            self.tail.encode(&mut self.tail_raw);
            self.tail_sealed = true;
        }

        if pos < end {
            let from = pos - body_size;
            let n = end - pos;
            buff[written..written + n].copy_from_slice(&self.tail_raw[from..from + n]);
            pos += n;
            written += n;
        }

        self.cursor = pos;
        if pos == rec_size {
            let padded = size_dblks(written) * DBLK_SIZE;
            buff[written..padded].fill(CLEAN_CHAR);
            self.state = RecordState::Encoded;
        } else {
            self.state = RecordState::Encoding;
        }

        size_dblks(written)
    }

    /// Returns whether the marker is a commit once the whole record is read.
    ///
    /// When `src` runs dry first, `TruncatedInput` is returned and the partial
    /// progress is kept in both the record and `rec_offs`; calling again with
    /// the same `rec_offs` once more bytes are available continues from there.
    /// A smaller `rec_offs` rewinds to that byte of the record, with `src`
    /// positioned to match. `rec_offs == 0` always starts over.
    ///
    /// A header rejected as `FormatMismatch` leaves the record `Failed`: later
    /// calls report the same error until it is decoded again from the start.
    /// The tail is read but not judged, see [`JournalRecord::check_rec_tail`].
    fn decode<R: Read>(
        &mut self,
        hdr: &RecordHeader,
        src: &mut R,
        rec_offs: &mut usize,
        rec_start: u64,
    ) -> JournalResult<bool> {
        if *rec_offs == 0 {
            self.start_decode(hdr, rec_start)?;
            *rec_offs = self.cursor;
        } else {
            let decoded = match self.state {
                RecordState::Decoding | RecordState::Decoded | RecordState::Verified => {
                    self.cursor
                }
                RecordState::Failed => return Err(self.rejected(rec_start)),
                RecordState::Idle | RecordState::Encoding | RecordState::Encoded => 0,
            };
            if *rec_offs > decoded {
                return Err(JournalError::OffsetMismatch {
                    rec_start,
                    rec_offs: *rec_offs,
                    decoded,
                });
            }
            if *rec_offs < self.cursor {
                self.cursor = *rec_offs;
                self.tail_sealed = false;
                self.state = RecordState::Decoding;
            }
        }

        if self.cursor < TXN_HDR_SIZE {
            let mut filled = self.cursor;
            let result = read_fill(src, &mut self.hdr_raw, &mut filled);
            self.cursor = filled;
            *rec_offs = self.cursor;
            result?;
            if self.cursor < TXN_HDR_SIZE {
                return Err(self.truncated(rec_start));
            }

            // a rewind may have re-read part of the generic header as well
            let parsed = TxnHeader::decode(&self.hdr_raw, rec_start)
                .and_then(|txn| txn.rhdr.validate(rec_start).map(|()| txn));
            match parsed {
                Ok(txn) => self.hdr = txn,
                Err(err) => {
                    self.state = RecordState::Failed;
                    return Err(err);
                }
            }
            let xid_size = self.hdr.xid_size as usize;
            self.owned_xid().resize(xid_size, 0);
        }

        let body_size = self.body_size();
        if self.cursor < body_size {
            let mut filled = self.cursor - TXN_HDR_SIZE;
            let result = read_fill(src, self.owned_xid(), &mut filled);
            self.cursor = TXN_HDR_SIZE + filled;
            *rec_offs = self.cursor;
            result?;
            if self.cursor < body_size {
                return Err(self.truncated(rec_start));
            }
        }

        let rec_size = self.rec_size();
        if self.cursor < rec_size {
            let mut filled = self.cursor - body_size;
            let result = read_fill(src, &mut self.tail_raw, &mut filled);
            self.cursor = body_size + filled;
            *rec_offs = self.cursor;
            result?;
            if self.cursor < rec_size {
                return Err(self.truncated(rec_start));
            }

            self.tail = RecordTail::decode(&self.tail_raw);
            self.tail_sealed = true;
            self.state = RecordState::Decoded;
        }

        Ok(self.hdr.commit)
    }

    /// Verifies the tail against the header and a checksum recomputed over
    /// the header and xid bytes. Only meaningful on a complete record.
    fn check_rec_tail(&mut self, rec_start: u64) -> JournalResult<()> {
        if self.state == RecordState::Failed {
            return Err(self.rejected(rec_start));
        }
        if !self.tail_sealed || self.cursor != self.rec_size() {
            return Err(self.truncated(rec_start));
        }

        let mut checksum = C::default();
        checksum.add_data(&self.hdr_raw);
        checksum.add_data(self.xid.as_slice());

        let mismatch = self.tail.check(&self.hdr.rhdr, checksum.value());
        if !mismatch.is_empty() {
            return Err(JournalError::TailCorruption {
                rec_start,
                mismatch,
            });
        }

        if self.state == RecordState::Decoded {
            self.state = RecordState::Verified;
        }
        Ok(())
    }

    fn rec_size(&self) -> usize {
        self.body_size() + REC_TAIL_SIZE
    }

    /// Markers never carry message data.
    #[inline]
    fn data_size(&self) -> usize {
        0
    }

    fn xid_size(&self) -> usize {
        self.hdr.xid_size as usize
    }

    #[inline]
    fn rid(&self) -> Rid {
        self.hdr.rhdr.rid
    }
}

impl<C> fmt::Display for TxnRec<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "txn_rec: {} rid={} serial={} xid_size={}",
            if self.hdr.commit { "commit" } else { "abort" },
            self.hdr.rhdr.rid,
            self.hdr.rhdr.serial,
            self.hdr.xid_size
        )
    }
}

impl<C> fmt::Debug for TxnRec<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxnRec")
            .field("hdr", &self.hdr)
            .field("xid", &self.xid)
            .field("tail", &self.tail)
            .field("cursor", &self.cursor)
            .field("state", &self.state)
            .finish()
    }
}
