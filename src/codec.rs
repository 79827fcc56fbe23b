//! Order-preserving byte encoding for index keys (C1, spec.md §4.1).
//!
//! Every encoder produces a byte sequence whose unsigned lexicographic
//! order matches the natural order of the decoded value. Integers flip
//! their sign bit before a plain big-endian encode; varchar is copied
//! verbatim plus a NUL terminator so that a string sorts before any
//! proper extension of itself.

/// One-byte type discriminant prefixing every encoded column inside an
/// index tuple. Mirrors the original `enum CODE_TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TypeTag {
    RowId = 1,
    Int32 = 2,
    Uint32 = 3,
    Int64 = 4,
    Uint64 = 5,
    Float = 6,
    Varchar = 7,
    Invalid = 255,
}

impl TypeTag {
    pub fn from_u8(b: u8) -> TypeTag {
        match b {
            1 => TypeTag::RowId,
            2 => TypeTag::Int32,
            3 => TypeTag::Uint32,
            4 => TypeTag::Int64,
            5 => TypeTag::Uint64,
            6 => TypeTag::Float,
            7 => TypeTag::Varchar,
            // A type tag that doesn't round-trip through an encoder we
            // wrote is a corrupted key, not a recoverable condition.
            other => panic!("invalid key type tag: {}", other),
        }
    }
}

const INT32_SIGN: u32 = 0x8000_0000;
const INT64_SIGN: u64 = 0x8000_0000_0000_0000;

/// 4 big-endian bytes, most significant byte first.
pub fn encode_u32(buf: &mut [u8], u: u32) {
    buf[0..4].copy_from_slice(&u.to_be_bytes());
}

pub fn decode_u32(buf: &[u8]) -> u32 {
    u32::from_be_bytes(buf[0..4].try_into().unwrap())
}

/// XOR the sign bit then encode as u32; yields a bytewise ordering
/// identical to signed numerical order across the full range.
pub fn encode_i32(buf: &mut [u8], i: i32) {
    encode_u32(buf, (i as u32) ^ INT32_SIGN);
}

pub fn decode_i32(buf: &[u8]) -> i32 {
    (decode_u32(buf) ^ INT32_SIGN) as i32
}

/// 8 big-endian bytes, most significant byte first.
pub fn encode_u64(buf: &mut [u8], u: u64) {
    buf[0..8].copy_from_slice(&u.to_be_bytes());
}

pub fn decode_u64(buf: &[u8]) -> u64 {
    u64::from_be_bytes(buf[0..8].try_into().unwrap())
}

pub fn encode_i64(buf: &mut [u8], i: i64) {
    encode_u64(buf, (i as u64) ^ INT64_SIGN);
}

pub fn decode_i64(buf: &[u8]) -> i64 {
    (decode_u64(buf) ^ INT64_SIGN) as i64
}

/// Copy `payload` then a single NUL terminator into `buf`. `buf` must
/// have room for `payload.len() + 1` bytes. The terminator is what
/// makes a prefix sort before its proper extensions.
pub fn encode_varchar(buf: &mut [u8], payload: &[u8]) {
    let len = payload.len();
    buf[0..len].copy_from_slice(payload);
    buf[len] = 0;
}

/// Decode a NUL-terminated varchar payload out of `src` into `out`,
/// returning the payload length. `src` and `out` are always distinct
/// buffers: the original `DecodeVarchar` aliased its source and
/// destination through `strcpy_s(buf, maxlen, buf)`, a bug (spec.md
/// §9, "Open questions"); a two-buffer signature makes it impossible
/// to reintroduce.
pub fn decode_varchar(src: &[u8], out: &mut [u8]) -> usize {
    let len = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    out[0..len].copy_from_slice(&src[0..len]);
    len
}

/// IEEE-754 bit pattern through the integer path. Not strictly
/// order-preserving for negative floats (spec.md §4.1); callers must
/// not rely on range ordering over this encoding, only equality.
pub fn encode_f32_bits(buf: &mut [u8], f: f32) {
    encode_u32(buf, f.to_bits());
}

pub fn decode_f32_bits(buf: &[u8]) -> f32 {
    f32::from_bits(decode_u32(buf))
}

#[cfg(test)]
#[path = "codec_test.rs"]
mod codec_test;
