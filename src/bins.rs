//! Big-endian field access on byte slices. Every multi-byte field of the
//! journal is stored in network order.

pub(crate) trait SliceExt {
    fn read_u16(&self) -> u16;
    fn read_u32(&self) -> u32;
    fn read_u64(&self) -> u64;
}

pub(crate) trait SliceMutExt {
    fn put_u16(&mut self, val: u16);
    fn put_u32(&mut self, val: u32);
    fn put_u64(&mut self, val: u64);
}

macro_rules! be_field {
    ($ty:ty, $read:ident, $put:ident) => {
        fn $read(buff: &[u8]) -> $ty {
            let mut raw = [0u8; std::mem::size_of::<$ty>()];
            raw.copy_from_slice(&buff[..std::mem::size_of::<$ty>()]);
            <$ty>::from_be_bytes(raw)
        }

        fn $put(buff: &mut [u8], val: $ty) {
            buff[..std::mem::size_of::<$ty>()].copy_from_slice(&val.to_be_bytes());
        }
    };
}

be_field!(u16, be_u16, put_be_u16);
be_field!(u32, be_u32, put_be_u32);
be_field!(u64, be_u64, put_be_u64);

impl SliceExt for [u8] {
    fn read_u16(&self) -> u16 {
        be_u16(self)
    }
    fn read_u32(&self) -> u32 {
        be_u32(self)
    }
    fn read_u64(&self) -> u64 {
        be_u64(self)
    }
}

impl SliceMutExt for [u8] {
    fn put_u16(&mut self, val: u16) {
        put_be_u16(self, val)
    }
    fn put_u32(&mut self, val: u32) {
        put_be_u32(self, val)
    }
    fn put_u64(&mut self, val: u64) {
        put_be_u64(self, val)
    }
}
