//! Unsigned LEB128 lengths.
//!
//! Decoding accepts only the shortest encoding of a value, so every length
//! has exactly one byte representation.

use crate::error::{Error, Result};

/// Longest encoding of a `u64`.
const MAX_LEN: usize = 10;

pub fn write(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Read a varint from the front of `input`, returning the value and the
/// number of bytes consumed.
pub fn read(input: &[u8]) -> Result<(u64, usize)> {
    let mut value: u64 = 0;

    for (i, &byte) in input.iter().enumerate().take(MAX_LEN) {
        let payload = u64::from(byte & 0x7f);
        if i == MAX_LEN - 1 && payload > 1 {
            return Err(Error::malformed("varint overflows 64 bits"));
        }
        value |= payload << (7 * i);

        if byte & 0x80 == 0 {
            // A trailing zero group means a shorter encoding existed.
            if i > 0 && byte == 0 {
                return Err(Error::malformed("non-canonical varint"));
            }
            return Ok((value, i + 1));
        }
    }

    if input.len() >= MAX_LEN {
        Err(Error::malformed("varint longer than 10 bytes"))
    } else {
        Err(Error::malformed("truncated varint"))
    }
}
