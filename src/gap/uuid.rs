use std::fmt::{Debug, Display, Formatter};
use std::num::NonZeroU128;
use std::str::FromStr;

use crate::{Error, Result};

const SHIFT: u32 = u128::BITS - u32::BITS;
const BASE: u128 = 0x00000000_0000_1000_8000_00805F9B34FB;
const MASK_16: u128 = !((u16::MAX as u128) << SHIFT);
const MASK_32: u128 = !((u32::MAX as u128) << SHIFT);

/// 16-, 32-, or 128-bit UUID ([Vol 3] Part B, Section 2.5.1).
///
/// All UUIDs are stored in their 128-bit form, so values parsed from strings
/// compare equal regardless of letter case or whether the SIG short form was
/// used.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Uuid(NonZeroU128);

impl Uuid {
    /// Creates a UUID from a `u128`.
    #[inline]
    #[must_use]
    pub const fn new(v: u128) -> Option<Self> {
        match NonZeroU128::new(v) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Creates a UUID from an assigned 16-bit SIG value.
    ///
    /// # Panics
    ///
    /// Panics if `v` is zero.
    #[inline]
    #[must_use]
    pub const fn from_u16(v: u16) -> Self {
        assert!(v != 0, "zero 16-bit UUID");
        match Self::new((v as u128) << SHIFT | BASE) {
            Some(u) => u,
            None => unreachable!(),
        }
    }

    /// Converts an assigned 16-bit Bluetooth SIG UUID to `u16`. This is
    /// mutually exclusive with `as_u32` and `as_u128`.
    #[inline]
    #[must_use]
    pub fn as_u16(self) -> Option<u16> {
        #[allow(clippy::cast_possible_truncation)]
        let v = (self.0.get() >> SHIFT) as u16;
        (self.0.get() & MASK_16 == BASE && v > 0).then_some(v)
    }

    /// Converts an assigned 32-bit Bluetooth SIG UUID to `u32`. This is
    /// mutually exclusive with `as_u16` and `as_u128`.
    #[inline]
    #[must_use]
    pub fn as_u32(self) -> Option<u32> {
        let v = (self.0.get() >> SHIFT) as u32;
        (self.0.get() & MASK_32 == BASE && v > u32::from(u16::MAX)).then_some(v)
    }

    /// Converts an unassigned UUID to `u128`. This is mutually exclusive with
    /// `as_u16` and `as_u32`.
    #[inline]
    #[must_use]
    pub fn as_u128(self) -> Option<u128> {
        (self.0.get() & MASK_32 != BASE).then_some(self.0.get())
    }

    /// Returns the full 128-bit value.
    #[inline(always)]
    #[must_use]
    pub const fn get(self) -> u128 {
        self.0.get()
    }

    /// Parses a string of hex digits, rejecting signs and other characters
    /// that `from_str_radix` would otherwise accept.
    fn parse_hex(s: &str) -> Option<u128> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u128::from_str_radix(s, 16).ok()
    }
}

impl FromStr for Uuid {
    type Err = Error;

    /// Parses the canonical `8-4-4-4-12` form, 32 hex digits without hyphens,
    /// or 4/8 digit SIG short forms. A zero short form is rejected.
    fn from_str(s: &str) -> Result<Self> {
        let v = match s.len() {
            4 | 8 => (Self::parse_hex(s))
                .filter(|&v| v != 0)
                .map(|v| v << SHIFT | BASE),
            32 => Self::parse_hex(s),
            36 => {
                let b = s.as_bytes();
                if s.is_ascii() && [8, 13, 18, 23].iter().all(|&i| b[i] == b'-') {
                    let hex = [&s[..8], &s[9..13], &s[14..18], &s[19..23], &s[24..]].concat();
                    Self::parse_hex(&hex)
                } else {
                    None
                }
            }
            _ => None,
        };
        v.and_then(Self::new)
            .ok_or_else(|| Error::InvalidUuid(s.to_owned()))
    }
}

impl TryFrom<&str> for Uuid {
    type Error = Error;

    #[inline]
    fn try_from(s: &str) -> Result<Self> {
        s.parse()
    }
}

impl From<Uuid> for u128 {
    #[inline]
    fn from(u: Uuid) -> Self {
        u.0.get()
    }
}

impl Debug for Uuid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(v) = self.as_u16() {
            write!(f, "{v:#06X}")
        } else if let Some(v) = self.as_u32() {
            write!(f, "{v:#010X}")
        } else {
            Display::fmt(self, f)
        }
    }
}

impl Display for Uuid {
    /// Formats SIG-assigned UUIDs in their short form and all others in the
    /// upper-case canonical form.
    #[allow(clippy::cast_possible_truncation)]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(v) = self.as_u16() {
            return write!(f, "{v:04X}");
        }
        if let Some(v) = self.as_u32() {
            return write!(f, "{v:08X}");
        }
        let v = self.0.get();
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:04X}-{:012X}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            (v & ((1 << 48) - 1)) as u64
        )
    }
}

#[cfg(test)]
mod tests {
    use matches::assert_matches;

    use super::*;

    const INK: &str = "A07498CA-AD5B-474E-940D-16F1FBE7E8CD";

    #[test]
    fn parse_case_insensitive() {
        let upper: Uuid = INK.parse().unwrap();
        let lower: Uuid = INK.to_lowercase().parse().unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.to_string(), INK);
        assert_eq!(lower.to_string(), INK);
        assert_eq!(upper.get(), 0xA07498CA_AD5B_474E_940D_16F1FBE7E8CD);
        let flat: Uuid = INK.replace('-', "").parse().unwrap();
        assert_eq!(flat, upper);
    }

    #[test]
    fn short_forms() {
        let battery: Uuid = "2a19".parse().unwrap();
        assert_eq!(battery, Uuid::from_u16(0x2A19));
        assert_eq!(battery.as_u16(), Some(0x2A19));
        assert_eq!(battery.as_u32(), None);
        assert_eq!(battery.as_u128(), None);
        assert_eq!(battery.to_string(), "2A19");
        assert_eq!(format!("{battery:?}"), "0x2A19");

        let long: Uuid = "00002A19-0000-1000-8000-00805F9B34FB".parse().unwrap();
        assert_eq!(long, battery);

        let sig32: Uuid = "12345678".parse().unwrap();
        assert_eq!(sig32.as_u32(), Some(0x1234_5678));
        assert_eq!(sig32.to_string(), "12345678");
    }

    #[test]
    fn invalid() {
        for s in [
            "",
            "+2A1",
            "2A1",
            "xyz0",
            "0000",
            "00000000",
            "A07498CA_AD5B_474E_940D_16F1FBE7E8CD",
            "A07498CA-AD5B-474E-940D-16F1FBE7E8C",
            "00000000-0000-0000-0000-000000000000",
        ] {
            assert_matches!(s.parse::<Uuid>(), Err(Error::InvalidUuid(_)));
        }
    }
}
