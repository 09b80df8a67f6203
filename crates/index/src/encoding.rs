//! Order-preserving byte encoding for index keys.
//!
//! `encode_key` turns a composite `&[Value]` into a `Vec<u8>` such that
//! `memcmp(encode_key(a), encode_key(b))` agrees with the logical ordering
//! of `a` and `b` column by column. The `btree` crate never sees a `Value`;
//! it only ever compares the bytes this module produces.
//!
//! Fixed-width types (integers, floats, bools, timestamps) encode to a
//! constant number of bytes per tag, so no separator is needed between
//! them. Variable-width types (`Bytes`, `String`) escape any `0x00` byte in
//! the payload as `0x00 0xFF` and terminate with `0x00 0x00`, the classic
//! escaped-NUL-terminator trick for keeping byte-string comparison
//! order-preserving across composite key boundaries.

use types::Value;

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_UINT: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_TIME: u8 = 5;
const TAG_BYTES: u8 = 6;
const TAG_STRING: u8 = 7;

/// Encodes one composite key (one value per indexed column) into an
/// order-preserving byte string.
pub fn encode_key(values: &[Value]) -> Vec<u8> {
    let mut out = Vec::new();
    for v in values {
        encode_value_into(v, &mut out);
    }
    out
}

/// Encodes a single column value, appending to `out`.
pub fn encode_value_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(if *b { 1 } else { 0 });
        }
        Value::Int(i) => {
            out.push(TAG_INT);
            out.extend_from_slice(&encode_signed(*i));
        }
        Value::UInt(u) => {
            out.push(TAG_UINT);
            out.extend_from_slice(&u.to_be_bytes());
        }
        Value::Float(f) => {
            out.push(TAG_FLOAT);
            out.extend_from_slice(&encode_float(*f));
        }
        Value::Time(t) => {
            out.push(TAG_TIME);
            out.extend_from_slice(&encode_signed(*t));
        }
        Value::Bytes(b) => {
            out.push(TAG_BYTES);
            escape_and_terminate(b, out);
        }
        Value::String(s) => {
            out.push(TAG_STRING);
            escape_and_terminate(s.as_bytes(), out);
        }
    }
}

/// A single-value key, for point lookups on a single-column index.
pub fn encode_value(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_value_into(value, &mut out);
    out
}

fn encode_signed(i: i64) -> [u8; 8] {
    ((i as u64) ^ 0x8000_0000_0000_0000).to_be_bytes()
}

/// IEEE-754 order-preserving float encoding: flip the sign bit for
/// non-negative numbers, flip every bit for negative numbers. This maps
/// the float's natural order onto the unsigned integer order of the
/// resulting bit pattern (NaN is not meaningfully ordered either way and
/// is not expected as an index key).
fn encode_float(f: f64) -> [u8; 8] {
    let bits = f.to_bits();
    let mapped = if f.is_sign_negative() {
        !bits
    } else {
        bits | 0x8000_0000_0000_0000
    };
    mapped.to_be_bytes()
}

fn escape_and_terminate(bytes: &[u8], out: &mut Vec<u8>) {
    for &b in bytes {
        if b == 0x00 {
            out.push(0x00);
            out.push(0xFF);
        } else {
            out.push(b);
        }
    }
    out.push(0x00);
    out.push(0x00);
}
