use std::fmt;

/// Record id. Assigned monotonically by the journal, unique per record.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rid(u64);

impl Rid {
    #[inline]
    pub const fn new(rid: u64) -> Self {
        Self(rid)
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }

    /// The following rid, `None` once the rid space is used up.
    #[inline]
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }

    #[inline]
    pub(crate) fn from_be_bytes(rid: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(rid))
    }

    #[inline]
    pub(crate) fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}
