use crate::checksum::Checksum;
use crate::error::JournalResult;
use crate::header::RecordHeader;
use crate::id::Rid;
use std::io::{ErrorKind, Read};

/// Disk block: the unit the journal allocates, aligns and writes in.
pub const DBLK_SIZE: usize = 128;

/// Fill byte for the unused remainder of a record's last disk block.
pub(crate) const CLEAN_CHAR: u8 = 0xff;

#[inline]
pub fn size_dblks(size: usize) -> usize {
    size.div_ceil(DBLK_SIZE)
}

/// Operations every journal record kind provides to the journal writer and
/// the recovery scan.
pub trait JournalRecord {
    type Checksum: Checksum;

    /// Writes the part of the record starting at disk block `rec_offs_dblks`
    /// into `buff`, using at most `max_size_dblks` disk blocks. Header and
    /// body bytes are fed to `checksum` in order; the same accumulator must be
    /// passed for every call of one record. Returns the number of disk blocks
    /// used, or 0 when nothing could be written.
    fn encode(
        &mut self,
        buff: &mut [u8],
        rec_offs_dblks: usize,
        max_size_dblks: usize,
        checksum: &mut Self::Checksum,
    ) -> usize;

    /// Reads the rest of a record whose generic header `hdr` was already read
    /// by the caller. `rec_offs` counts the record bytes consumed so far and
    /// must be 0 on the first call.
    fn decode<R: Read>(
        &mut self,
        hdr: &RecordHeader,
        src: &mut R,
        rec_offs: &mut usize,
        rec_start: u64,
    ) -> JournalResult<bool>;

    fn check_rec_tail(&mut self, rec_start: u64) -> JournalResult<()>;

    fn rec_size(&self) -> usize;
    fn data_size(&self) -> usize;
    fn xid_size(&self) -> usize;
    fn rid(&self) -> Rid;

    fn size_dblks(&self) -> usize {
        size_dblks(self.rec_size())
    }
}

/// Reads into `buff[*filled..]` until it is full or the source is exhausted.
/// `filled` is kept up to date even when an error is returned.
pub(crate) fn read_fill<R: Read>(
    src: &mut R,
    buff: &mut [u8],
    filled: &mut usize,
) -> std::io::Result<()> {
    while *filled < buff.len() {
        match src.read(&mut buff[*filled..]) {
            Ok(0) => break,
            Ok(n) => *filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
