//! Format codes: the persisted tags naming the printable kind of a value.
//!
//! The numeric values are the wire contract between the pass and the
//! runtime and must never be renumbered.

/// Printable kind of a value.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatCode {
    F64 = 1,
    F32 = 2,
    I16 = 3,
    /// C `long int` on a 64-bit target.
    Long = 4,
    I64 = 5,
    I32 = 6,
    I8 = 7,
    U8 = 8,
    U16 = 9,
    /// C `long unsigned int` on a 64-bit target.
    ULong = 10,
    U64 = 11,
    U32 = 12,
    Pointer = 13,
    Void = 14,
    Array = 15,
    Union = 16,
    Struct = 17,
    NonInspectable = 18,
}

impl FormatCode {
    /// Convert a raw i32 to a FormatCode.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::F64),
            2 => Some(Self::F32),
            3 => Some(Self::I16),
            4 => Some(Self::Long),
            5 => Some(Self::I64),
            6 => Some(Self::I32),
            7 => Some(Self::I8),
            8 => Some(Self::U8),
            9 => Some(Self::U16),
            10 => Some(Self::ULong),
            11 => Some(Self::U64),
            12 => Some(Self::U32),
            13 => Some(Self::Pointer),
            14 => Some(Self::Void),
            15 => Some(Self::Array),
            16 => Some(Self::Union),
            17 => Some(Self::Struct),
            18 => Some(Self::NonInspectable),
            _ => None,
        }
    }

    /// Codes 1..=12 are directly printable scalar kinds.
    pub fn is_scalar(value: i32) -> bool {
        (1..=12).contains(&value)
    }

    /// Byte width of one element of this scalar kind, as read from memory.
    /// Matches the C widths of the formats: `long` variants are 8 bytes on
    /// the 64-bit targets this system assumes.
    pub fn scalar_width(value: i32) -> Option<usize> {
        match value {
            1 => Some(8),
            2 => Some(4),
            3 => Some(2),
            4 => Some(8),
            5 => Some(8),
            6 => Some(4),
            7 => Some(1),
            8 => Some(1),
            9 => Some(2),
            10 => Some(8),
            11 => Some(8),
            12 => Some(4),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_i32() {
        for raw in 1..=18 {
            let code = FormatCode::from_i32(raw).expect("valid code");
            assert_eq!(code as i32, raw);
        }
        assert_eq!(FormatCode::from_i32(0), None);
        assert_eq!(FormatCode::from_i32(19), None);
    }

    #[test]
    fn scalar_range_is_one_through_twelve() {
        for raw in 1..=12 {
            assert!(FormatCode::is_scalar(raw));
            assert!(FormatCode::scalar_width(raw).is_some());
        }
        for raw in [0, 13, 14, 15, 16, 17, 18] {
            assert!(!FormatCode::is_scalar(raw));
            assert!(FormatCode::scalar_width(raw).is_none());
        }
    }
}
