use crate::bins::{SliceExt, SliceMutExt};
use crate::header::RecordHeader;
use crate::id::Rid;
use std::fmt;
use std::ops::BitOr;

pub const REC_TAIL_SIZE: usize = 4 + 8 + 8 + 8;

/// Trailer closing every record. It repeats the identity of the header so a
/// torn or overwritten record is caught even when its header looks intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordTail {
    pub xmagic: u32,
    pub checksum: u64,
    pub serial: u64,
    pub rid: Rid,
}

impl RecordTail {
    pub fn new(hdr: &RecordHeader, checksum: u64) -> Self {
        Self {
            xmagic: !hdr.magic,
            checksum,
            serial: hdr.serial,
            rid: hdr.rid,
        }
    }

    pub fn decode(buff: &[u8]) -> Self {
        assert_eq!(REC_TAIL_SIZE, buff.len());
        Self {
            xmagic: buff[0..4].read_u32(),
            checksum: buff[4..12].read_u64(),
            serial: buff[12..20].read_u64(),
            rid: Rid::from_be_bytes(buff[20..28].try_into().unwrap()),
        }
    }

    pub fn encode(&self, buff: &mut [u8]) {
        assert_eq!(REC_TAIL_SIZE, buff.len());
        buff[0..4].put_u32(self.xmagic);
        buff[4..12].put_u64(self.checksum);
        buff[12..20].put_u64(self.serial);
        buff[20..28].copy_from_slice(&self.rid.to_be_bytes());
    }

    pub fn check(&self, hdr: &RecordHeader, checksum: u64) -> TailMismatch {
        let mut mismatch = TailMismatch::NONE;
        if self.xmagic != !hdr.magic {
            mismatch = mismatch | TailMismatch::MAGIC;
        }
        if self.serial != hdr.serial {
            mismatch = mismatch | TailMismatch::SERIAL;
        }
        if self.rid != hdr.rid {
            mismatch = mismatch | TailMismatch::RID;
        }
        if self.checksum != checksum {
            mismatch = mismatch | TailMismatch::CHECKSUM;
        }
        mismatch
    }
}

/// Set of tail fields that disagree with the record they close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TailMismatch(u8);

impl TailMismatch {
    pub const NONE: Self = Self(0);
    pub const MAGIC: Self = Self(1 << 0);
    pub const SERIAL: Self = Self(1 << 1);
    pub const RID: Self = Self(1 << 2);
    pub const CHECKSUM: Self = Self(1 << 3);

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for TailMismatch {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for TailMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::MAGIC, "magic"),
            (Self::SERIAL, "serial"),
            (Self::RID, "rid"),
            (Self::CHECKSUM, "checksum"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    f.write_str(",")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}
