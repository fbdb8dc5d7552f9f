// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Portable scalar encoding.
//!
//! Every on-disk section records the byte order it was written in with a
//! single flag byte. Readers honor the flag, so a container written on a
//! big-endian machine opens unchanged on a little-endian one.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};

/// Byte order of an encoded section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Little,
    Big,
}

macro_rules! port_scalar {
    (
        $put:ident, $get:ident, $ty:ty,
        $put_le:ident, $put_be:ident, $get_le:ident, $get_be:ident
    ) => {
        pub fn $put(self, buf: &mut impl BufMut, value: $ty) {
            match self {
                ByteOrder::Little => buf.$put_le(value),
                ByteOrder::Big => buf.$put_be(value),
            }
        }

        pub fn $get(self, buf: &mut impl Buf) -> Result<$ty> {
            ensure(buf, std::mem::size_of::<$ty>())?;
            Ok(match self {
                ByteOrder::Little => buf.$get_le(),
                ByteOrder::Big => buf.$get_be(),
            })
        }
    };
}

impl ByteOrder {
    /// Byte order of the running machine.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    /// The flag byte stored in section headers.
    pub const fn flag(self) -> u8 {
        match self {
            ByteOrder::Little => 0,
            ByteOrder::Big => 1,
        }
    }

    /// Parses a header flag byte.
    pub fn from_flag(flag: u8) -> Result<Self> {
        match flag {
            0 => Ok(ByteOrder::Little),
            1 => Ok(ByteOrder::Big),
            other => Err(Error::ByteOrderFlag(other)),
        }
    }

    port_scalar!(put_u16, get_u16, u16, put_u16_le, put_u16, get_u16_le, get_u16);
    port_scalar!(put_u32, get_u32, u32, put_u32_le, put_u32, get_u32_le, get_u32);
    port_scalar!(put_i32, get_i32, i32, put_i32_le, put_i32, get_i32_le, get_i32);
    port_scalar!(put_u64, get_u64, u64, put_u64_le, put_u64, get_u64_le, get_u64);
    port_scalar!(put_i64, get_i64, i64, put_i64_le, put_i64, get_i64_le, get_i64);
    port_scalar!(put_f64, get_f64, f64, put_f64_le, put_f64, get_f64_le, get_f64);
}

/// Reads a single byte, independent of byte order.
pub fn get_u8(buf: &mut impl Buf) -> Result<u8> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

/// Fails with [`Error::Truncated`] unless `needed` bytes remain.
pub fn ensure(buf: &impl Buf, needed: usize) -> Result<()> {
    let available = buf.remaining();
    if available < needed {
        return Err(Error::Truncated { needed, available });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_round_trip() {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            assert_eq!(ByteOrder::from_flag(order.flag()).unwrap(), order);
        }
        assert!(ByteOrder::from_flag(7).is_err());
    }

    #[test]
    fn big_endian_layout() {
        let mut buf = Vec::new();
        ByteOrder::Big.put_u32(&mut buf, 0x0102_0304);
        assert_eq!(buf, [1, 2, 3, 4]);

        let mut buf = Vec::new();
        ByteOrder::Little.put_u32(&mut buf, 0x0102_0304);
        assert_eq!(buf, [4, 3, 2, 1]);
    }

    #[test]
    fn truncated_read_is_an_error() {
        let data = [0u8; 3];
        let mut cursor = &data[..];
        let err = ByteOrder::Little.get_f64(&mut cursor).unwrap_err();
        assert!(matches!(err, Error::Truncated { needed: 8, available: 3 }));
    }
}
