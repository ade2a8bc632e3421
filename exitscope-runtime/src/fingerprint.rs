//! Polynomial-31 array fingerprint.
//!
//! The fingerprint is the stable scalar proxy for an array's contents used
//! in transcripts; its numerical semantics are a compatibility contract and
//! are preserved bit-for-bit, including one quirk: floating-point elements
//! are truncated to i32 *before* the ×100 precision scaling, and a
//! truncated value of zero short-circuits to a zero contribution. This
//! conflates "element reads as zero" with "slot is empty" (an element of
//! 0.5 contributes 0), but transcripts produced by older builds depend on
//! it, so it stays.
//!
//! All accumulator arithmetic wraps at 32 bits, matching the C `int`
//! overflow behavior of the reference transcripts.

use tracing::warn;

use exitscope_protocol::FormatCode;

use crate::memory::Memory;

/// Precision factor applied to floating-point elements.
const FP_PRECISION: i32 = 100;

/// Fingerprint of `size` consecutive scalars of kind `format` at `addr`.
/// The accumulator starts at 1.
pub fn hashcode_1d(mem: &dyn Memory, addr: u64, size: i64, format: i32) -> i32 {
    let width = match FormatCode::scalar_width(format) {
        Some(width) => width as u64,
        None => return 1,
    };
    let mut acc: i32 = 1;
    for i in 0..size.max(0) {
        let elem = addr.wrapping_add(i as u64 * width);
        let contribution = element_contribution(mem, elem, format);
        acc = acc.wrapping_mul(31).wrapping_add(contribution);
    }
    acc
}

/// Fingerprint of `total` elements walked with pointer increment `step`:
/// the sum of the 1-D fingerprints of each `step`-sized slice. The
/// accumulator starts at 0.
pub fn hashcode(mem: &dyn Memory, addr: u64, total: i64, step: i64, format: i32) -> i32 {
    if !FormatCode::is_scalar(format) {
        warn!(format, "not an array of scalar type, fingerprint is 0");
        return 0;
    }
    if step <= 0 {
        warn!(step, "non-positive array step, fingerprint is 0");
        return 0;
    }
    let width = FormatCode::scalar_width(format).unwrap_or(1) as u64;
    let mut acc: i32 = 0;
    let mut i: i64 = 0;
    while i < total {
        let slice = addr.wrapping_add(i as u64 * width);
        acc = acc.wrapping_add(hashcode_1d(mem, slice, step, format));
        i += step;
    }
    acc
}

fn element_contribution(mem: &dyn Memory, addr: u64, format: i32) -> i32 {
    match format {
        1 => float_contribution(mem.read_f64(addr).unwrap_or(0.0)),
        2 => float_contribution(mem.read_f32(addr).unwrap_or(0.0) as f64),
        3 => mem.read_i16(addr).unwrap_or(0) as i32,
        4 | 5 => mem.read_i64(addr).unwrap_or(0) as i32,
        6 => mem.read_i32(addr).unwrap_or(0),
        7 => mem.read_i8(addr).unwrap_or(0) as i32,
        8 => mem.read_u8(addr).unwrap_or(0) as i32,
        9 => mem.read_u16(addr).unwrap_or(0) as i32,
        10 | 11 => mem.read_u64(addr).unwrap_or(0) as i32,
        12 => mem.read_u32(addr).unwrap_or(0) as i32,
        _ => 0,
    }
}

fn float_contribution(value: f64) -> i32 {
    let truncated = value as i32;
    if truncated == 0 {
        0
    } else {
        truncated.wrapping_mul(FP_PRECISION)
    }
}
