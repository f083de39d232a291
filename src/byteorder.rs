pub trait WriteBytesLe {
    fn write_le(&self, dst: &mut Vec<u8>);
}

pub trait WriteBytesBe {
    fn write_be(&self, dst: &mut Vec<u8>);
}

macro_rules! impl_num_le_be {
    ($($t:ty),+) => { $(
        impl WriteBytesLe for $t { #[inline] fn write_le(&self, dst: &mut Vec<u8>) { dst.extend_from_slice(&self.to_le_bytes()); }}
        impl WriteBytesBe for $t { #[inline] fn write_be(&self, dst: &mut Vec<u8>) { dst.extend_from_slice(&self.to_be_bytes()); }}
    )+ }
}

impl_num_le_be!(u8, u16, i16, u32, i32);

impl<T: WriteBytesLe, const N: usize> WriteBytesLe for [T; N] {
    #[inline]
    fn write_le(&self, dst: &mut Vec<u8>) {
        self.iter().for_each(|item| item.write_le(dst));
    }
}

impl<T: WriteBytesBe, const N: usize> WriteBytesBe for [T; N] {
    #[inline]
    fn write_be(&self, dst: &mut Vec<u8>) {
        self.iter().for_each(|item| item.write_be(dst));
    }
}

#[cfg(test)]
mod tests {
    use crate::byteorder::{WriteBytesBe, WriteBytesLe};
    use subdecd_macros::ToBytes;

    #[derive(ToBytes)]
    struct Header {
        magic: [u8; 2],
        size: u32,
        height: i32,
    }

    #[test]
    fn derived_header_byte_order() {
        let header = Header {
            magic: *b"BM",
            size: 0x0102_0304,
            height: -2,
        };

        let mut le = Vec::new();
        let mut be = Vec::new();
        header.write_le(&mut le);
        header.write_be(&mut be);

        assert_eq!(
            le,
            [b'B', b'M', 0x04, 0x03, 0x02, 0x01, 0xFE, 0xFF, 0xFF, 0xFF]
        );
        assert_eq!(
            be,
            [b'B', b'M', 0x01, 0x02, 0x03, 0x04, 0xFF, 0xFF, 0xFF, 0xFE]
        );
    }
}
