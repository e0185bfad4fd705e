use crate::bins::{SliceExt, SliceMutExt};
use crate::error::{JournalError, JournalResult};
use crate::id::Rid;

pub const RECORD_MAGIC: u32 = u32::from_be_bytes(*b"JRNL");
pub const JOURNAL_VERSION: u16 = 1;

pub const RECORD_KIND_TXN: u8 = 0x03;

pub const REC_HDR_SIZE: usize = 24;
pub const TXN_HDR_SIZE: usize = REC_HDR_SIZE + 1 + 8;

/// Upper bound on a decoded xid length. Anything larger is treated as a
/// damaged header instead of being allocated.
pub const MAX_XID_SIZE: u64 = 1 << 20;

const TXN_ABORT: u8 = 0;
const TXN_COMMIT: u8 = 1;

/// Header common to every journal record kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub magic: u32,
    pub version: u16,
    pub kind: u8,
    pub flags: u8,
    pub serial: u64,
    pub rid: Rid,
}

impl RecordHeader {
    pub fn new(kind: u8, serial: u64, rid: Rid) -> Self {
        Self {
            magic: RECORD_MAGIC,
            version: JOURNAL_VERSION,
            kind,
            flags: 0,
            serial,
            rid,
        }
    }

    /// Parses the raw header fields without judging them; see [`Self::validate`].
    pub fn decode(buff: &[u8]) -> Self {
        assert_eq!(REC_HDR_SIZE, buff.len());
        Self {
            magic: buff[0..4].read_u32(),
            version: buff[4..6].read_u16(),
            kind: buff[6],
            flags: buff[7],
            serial: buff[8..16].read_u64(),
            rid: Rid::from_be_bytes(buff[16..24].try_into().unwrap()),
        }
    }

    pub fn encode(&self, buff: &mut [u8]) {
        assert_eq!(REC_HDR_SIZE, buff.len());
        buff[0..4].put_u32(self.magic);
        buff[4..6].put_u16(self.version);
        buff[6] = self.kind;
        buff[7] = self.flags;
        buff[8..16].put_u64(self.serial);
        buff[16..24].copy_from_slice(&self.rid.to_be_bytes());
    }

    pub fn validate(&self, rec_start: u64) -> JournalResult<()> {
        if self.magic != RECORD_MAGIC {
            return Err(JournalError::FormatMismatch {
                rec_start,
                reason: format!("bad magic 0x{:08x}", self.magic),
            });
        }
        if self.version != JOURNAL_VERSION {
            return Err(JournalError::FormatMismatch {
                rec_start,
                reason: format!("unsupported version {}", self.version),
            });
        }
        Ok(())
    }
}

/// Header of a commit or abort marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxnHeader {
    pub rhdr: RecordHeader,
    pub commit: bool,
    pub xid_size: u64,
}

impl TxnHeader {
    pub fn encode(&self, buff: &mut [u8]) {
        assert_eq!(TXN_HDR_SIZE, buff.len());
        self.rhdr.encode(&mut buff[..REC_HDR_SIZE]);
        buff[REC_HDR_SIZE] = if self.commit { TXN_COMMIT } else { TXN_ABORT };
        buff[REC_HDR_SIZE + 1..].put_u64(self.xid_size);
    }

    pub fn decode(buff: &[u8], rec_start: u64) -> JournalResult<Self> {
        assert_eq!(TXN_HDR_SIZE, buff.len());
        let rhdr = RecordHeader::decode(&buff[..REC_HDR_SIZE]);
        let commit = match buff[REC_HDR_SIZE] {
            TXN_COMMIT => true,
            TXN_ABORT => false,
            flag => {
                return Err(JournalError::FormatMismatch {
                    rec_start,
                    reason: format!("invalid commit flag 0x{flag:02x}"),
                })
            }
        };
        let xid_size = buff[REC_HDR_SIZE + 1..].read_u64();
        if xid_size > MAX_XID_SIZE {
            return Err(JournalError::FormatMismatch {
                rec_start,
                reason: format!("xid size {xid_size} exceeds {MAX_XID_SIZE}"),
            });
        }
        Ok(Self {
            rhdr,
            commit,
            xid_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_txn_header() {
        let hdr = TxnHeader {
            rhdr: RecordHeader::new(RECORD_KIND_TXN, 10, Rid::new(1001)),
            commit: true,
            xid_size: 3,
        };
        let mut buff = [0u8; TXN_HDR_SIZE];
        hdr.encode(&mut buff);
        assert_eq!(
            &[
                b'J', b'R', b'N', b'L', // magic
                0x00, 0x01, // version
                0x03, // kind
                0x00, // flags
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0a, // serial
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0xe9, // rid
                0x01, // commit
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, // xid size
            ],
            buff.as_slice()
        );

        let decoded = TxnHeader::decode(&buff, 0).unwrap();
        assert_eq!(hdr, decoded);
    }

    #[test]
    fn test_validate_header() {
        let hdr = RecordHeader::new(RECORD_KIND_TXN, 1, Rid::new(1));
        assert!(hdr.validate(0).is_ok());

        let bad_magic = RecordHeader {
            magic: 0xdeadbeef,
            ..hdr
        };
        assert!(matches!(
            bad_magic.validate(0x80),
            Err(JournalError::FormatMismatch { rec_start: 0x80, .. })
        ));

        let bad_version = RecordHeader { version: 9, ..hdr };
        assert!(matches!(
            bad_version.validate(0),
            Err(JournalError::FormatMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_bad_fields() {
        let hdr = TxnHeader {
            rhdr: RecordHeader::new(RECORD_KIND_TXN, 1, Rid::new(7)),
            commit: false,
            xid_size: 0,
        };
        let mut buff = [0u8; TXN_HDR_SIZE];
        hdr.encode(&mut buff);

        let mut bad_flag = buff;
        bad_flag[REC_HDR_SIZE] = 0x81;
        assert!(matches!(
            TxnHeader::decode(&bad_flag, 0),
            Err(JournalError::FormatMismatch { .. })
        ));

        let mut huge_xid = buff;
        huge_xid[REC_HDR_SIZE + 1..].put_u64(MAX_XID_SIZE + 1);
        assert!(matches!(
            TxnHeader::decode(&huge_xid, 0),
            Err(JournalError::FormatMismatch { .. })
        ));
    }
}
