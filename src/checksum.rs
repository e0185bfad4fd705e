/// Incremental checksum over an ordered byte stream.
///
/// Feeding `a` then `b` must give the same value as feeding `a ++ b` in one
/// call, since records are checksummed across several encode calls.
pub trait Checksum {
    fn add_data(&mut self, data: &[u8]);
    fn value(&self) -> u64;
}

const CRC64_SEED: u64 = 0x1d0f;

/// CRC-64 accumulator, the checksum used by the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc64 {
    crc: u64,
}

impl Crc64 {
    pub fn new() -> Self {
        Self { crc: CRC64_SEED }
    }
}

impl Default for Crc64 {
    fn default() -> Self {
        Self::new()
    }
}

impl Checksum for Crc64 {
    #[inline]
    fn add_data(&mut self, data: &[u8]) {
        self.crc = crc64::crc64(self.crc, data);
    }

    #[inline]
    fn value(&self) -> u64 {
        self.crc
    }
}
