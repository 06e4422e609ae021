//! Field-level encoder/decoder: a single info-area value under one of the
//! five on-wire encodings, prefixed by a one-byte type/length header.

use crate::error::{Error, ErrorKind, ErrorSource};
use crate::hex;

/// Maximum number of bytes the encoded payload of a field may occupy; the
/// type/length byte's low 6 bits can express at most this much.
pub const MAX_ENCODED_LEN: usize = 63;

/// A generous upper bound on a decoded field's textual value. The largest
/// real payload (63 encoded bytes of 6-bit ASCII) decodes to 84 characters;
/// this cap leaves headroom for hand-authored custom fields.
pub const MAX_FIELD_VALUE_LEN: usize = 256;

const TERMINATOR: u8 = 0xC1;
const SIX_BIT_BASE: u8 = 0x20;

/// The encoding of a single info-area field. `Auto` and `Preserve` are
/// meta-encodings: valid as encoder *input*, never produced by a decoder
/// and never stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Encoding {
    /// Present but zero-length.
    #[default]
    Empty,
    Binary,
    BcdPlus,
    SixBitAscii,
    Text,
    /// Encoder-only: try SixBitAscii, BcdPlus, Binary, Text in that order.
    Auto,
    /// Encoder-only: keep the field's current real encoding (or `Auto` if
    /// the field currently has no real encoding).
    Preserve,
}

impl Encoding {
    fn is_real(self) -> bool {
        matches!(
            self,
            Encoding::Empty | Encoding::Binary | Encoding::BcdPlus | Encoding::SixBitAscii | Encoding::Text
        )
    }

    fn code(self) -> Option<u8> {
        match self {
            Encoding::Binary => Some(0b00),
            Encoding::BcdPlus => Some(0b01),
            Encoding::SixBitAscii => Some(0b10),
            Encoding::Text | Encoding::Empty => Some(0b11),
            Encoding::Auto | Encoding::Preserve => None,
        }
    }

    fn from_code(code: u8) -> Result<Encoding, Error> {
        match code {
            0b00 => Ok(Encoding::Binary),
            0b01 => Ok(Encoding::BcdPlus),
            0b10 => Ok(Encoding::SixBitAscii),
            0b11 => Ok(Encoding::Text),
            _ => Err(Error::new(ErrorKind::BadEnc, ErrorSource::General)),
        }
    }
}

/// A decoded info-area value: the encoding it was stored under, plus its
/// textual value (hex string for `Binary`).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Field {
    pub enc: Encoding,
    pub val: String,
}

impl Default for Field {
    fn default() -> Self {
        Field {
            enc: Encoding::Empty,
            val: String::new(),
        }
    }
}

impl Field {
    pub fn new(enc: Encoding, val: impl Into<String>) -> Self {
        Field { enc, val: val.into() }
    }

    pub fn empty() -> Self {
        Field::default()
    }

    pub fn text(val: impl Into<String>) -> Self {
        Field::new(Encoding::Text, val)
    }
}

/// Decodes one type/length byte plus its payload. Returns the field and the
/// number of bytes consumed from `buf` (1 + payload length), or `None` when
/// `buf` begins with the terminator.
pub fn decode_field(buf: &[u8], area: ErrorSource, index: usize) -> Result<Option<(Field, usize)>, Error> {
    if buf.is_empty() {
        return Err(Error::with_index(ErrorKind::TooSmall, area, index));
    }
    let typelen = buf[0];
    if typelen == TERMINATOR {
        return Ok(None);
    }

    let code = typelen >> 6;
    let len = (typelen & 0x3F) as usize;
    let enc = Encoding::from_code(code).map_err(|_| Error::with_index(ErrorKind::BadEnc, area, index))?;

    if buf.len() < 1 + len {
        return Err(Error::with_index(ErrorKind::TooSmall, area, index));
    }
    let data = &buf[1..1 + len];

    if len == 0 {
        return Ok(Some((Field::new(Encoding::Empty, ""), 1)));
    }

    let val = match enc {
        Encoding::Binary => hex::bin2hexstr(data),
        Encoding::BcdPlus => decode_bcdplus(data),
        Encoding::SixBitAscii => decode_sixbit(data),
        Encoding::Text => decode_text(data, area, index)?,
        Encoding::Empty | Encoding::Auto | Encoding::Preserve => unreachable!(),
    };

    Ok(Some((Field::new(enc, val), 1 + len)))
}

fn decode_text(data: &[u8], area: ErrorSource, index: usize) -> Result<String, Error> {
    for &b in data {
        if !(0x20..=0x7E).contains(&b) {
            return Err(Error::with_index(ErrorKind::NonPrint, area, index));
        }
    }
    Ok(String::from_utf8_lossy(data).into_owned())
}

fn decode_bcdplus(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for &byte in data {
        for nibble in [byte >> 4, byte & 0x0F] {
            let c = match nibble {
                0x0..=0x9 => (b'0' + nibble) as char,
                0xA => ' ',
                0xB => '-',
                0xC => '.',
                _ => '?',
            };
            out.push(c);
        }
    }
    trim_trailing_spaces(&mut out);
    out
}

fn decode_sixbit(data: &[u8]) -> String {
    let len6 = data.len();
    let full_len = (len6 * 4) / 3;
    let mut out = String::with_capacity(full_len);

    let mut i6 = 0usize;
    for i in 0..full_len {
        if i6 > len6 {
            break;
        }
        let byte = i % 4;
        let six = match byte {
            0 => {
                let v = data.get(i6).copied().unwrap_or(0) & 0x3F;
                v
            }
            1 => {
                let lo = data.get(i6).copied().unwrap_or(0) >> 6;
                let hi = data.get(i6 + 1).copied().unwrap_or(0) << 2;
                i6 += 1;
                (lo | hi) & 0x3F
            }
            2 => {
                let lo = data.get(i6).copied().unwrap_or(0) >> 4;
                let hi = data.get(i6 + 1).copied().unwrap_or(0) << 4;
                i6 += 1;
                (lo | hi) & 0x3F
            }
            3 => {
                let v = data.get(i6).copied().unwrap_or(0) >> 2;
                i6 += 1;
                v & 0x3F
            }
            _ => unreachable!(),
        };
        out.push((six + SIX_BIT_BASE) as char);
    }
    trim_trailing_spaces(&mut out);
    out
}

fn trim_trailing_spaces(s: &mut String) {
    while s.ends_with(' ') {
        s.pop();
    }
}

/// Encodes a field. `enc` may be `Auto` or `Preserve`; both resolve to one
/// of the four real encodings before any bytes are emitted. `current_enc`
/// is the field's prior real encoding, consulted only by `Preserve`. Returns
/// the encoded bytes together with the real encoding that was actually used,
/// so callers can persist it (important for `Auto`, whose outcome depends on
/// the value).
pub fn encode_field(
    val: &str,
    enc: Encoding,
    current_enc: Encoding,
    area: ErrorSource,
    index: usize,
) -> Result<(Vec<u8>, Encoding), Error> {
    if val.is_empty() {
        return Ok((vec![0x00], Encoding::Empty));
    }
    if val.len() > MAX_FIELD_VALUE_LEN {
        return Err(Error::with_index(ErrorKind::TooBig, area, index));
    }

    let resolved = match enc {
        Encoding::Preserve => {
            if current_enc.is_real() && current_enc != Encoding::Empty {
                current_enc
            } else {
                Encoding::Auto
            }
        }
        other => other,
    };

    match resolved {
        Encoding::Auto => encode_auto(val, area, index),
        Encoding::Binary => encode_binary(val, area, index).map(|b| (b, Encoding::Binary)),
        Encoding::BcdPlus => encode_bcdplus(val, area, index).map(|b| (b, Encoding::BcdPlus)),
        Encoding::SixBitAscii => encode_sixbit(val, area, index).map(|b| (b, Encoding::SixBitAscii)),
        Encoding::Text => encode_text(val, area, index).map(|b| (b, Encoding::Text)),
        Encoding::Empty => Ok((vec![0x00], Encoding::Empty)),
        Encoding::Preserve => unreachable!(),
    }
}

/// Builds a raw binary-encoded field directly from bytes, bypassing the
/// hex-string API boundary (the source's "binary from bytes" entry point).
pub fn encode_field_binary(bytes: &[u8], area: ErrorSource, index: usize) -> Result<Vec<u8>, Error> {
    if bytes.len() > MAX_ENCODED_LEN {
        return Err(Error::with_index(ErrorKind::TooBig, area, index));
    }
    let mut out = Vec::with_capacity(1 + bytes.len());
    out.push((0b00u8 << 6) | bytes.len() as u8);
    out.extend_from_slice(bytes);
    Ok(out)
}

fn encode_auto(val: &str, area: ErrorSource, index: usize) -> Result<(Vec<u8>, Encoding), Error> {
    if let Ok(v) = encode_sixbit(val, area, index) {
        return Ok((v, Encoding::SixBitAscii));
    }
    if let Ok(v) = encode_bcdplus(val, area, index) {
        return Ok((v, Encoding::BcdPlus));
    }
    if let Ok(v) = encode_binary(val, area, index) {
        return Ok((v, Encoding::Binary));
    }
    encode_text(val, area, index)
        .map(|b| (b, Encoding::Text))
        .map_err(|_| Error::with_index(ErrorKind::AutoEnc, area, index))
}

fn encode_binary(val: &str, area: ErrorSource, index: usize) -> Result<Vec<u8>, Error> {
    if !hex::is_strict_hex(val.as_bytes()) {
        return Err(Error::with_index(ErrorKind::Range, area, index));
    }
    let bytes = hex::hexstr2bin(val, false)?;
    if bytes.len() > MAX_ENCODED_LEN {
        return Err(Error::with_index(ErrorKind::TooBig, area, index));
    }
    let mut out = Vec::with_capacity(1 + bytes.len());
    out.push((0b00u8 << 6) | bytes.len() as u8);
    out.extend_from_slice(&bytes);
    Ok(out)
}

fn encode_bcdplus(val: &str, area: ErrorSource, index: usize) -> Result<Vec<u8>, Error> {
    let chars: Vec<u8> = val.bytes().collect();
    if !chars.iter().all(|&c| matches!(c, b'0'..=b'9' | b' ' | b'-' | b'.')) {
        return Err(Error::with_index(ErrorKind::Range, area, index));
    }

    let nibble = |c: u8| -> u8 {
        match c {
            b'0'..=b'9' => c - b'0',
            b' ' => 0xA,
            b'-' => 0xB,
            b'.' => 0xC,
            _ => unreachable!(),
        }
    };

    let mut padded = chars;
    if padded.len() % 2 != 0 {
        padded.push(b' ');
    }
    let byte_len = padded.len() / 2;
    if byte_len > MAX_ENCODED_LEN {
        return Err(Error::with_index(ErrorKind::TooBig, area, index));
    }

    let mut out = Vec::with_capacity(1 + byte_len);
    out.push((0b01u8 << 6) | byte_len as u8);
    for pair in padded.chunks(2) {
        out.push((nibble(pair[0]) << 4) | nibble(pair[1]));
    }
    Ok(out)
}

fn encode_sixbit(val: &str, area: ErrorSource, index: usize) -> Result<Vec<u8>, Error> {
    if !val.bytes().all(|c| (0x20..=0x5F).contains(&c)) {
        return Err(Error::with_index(ErrorKind::Range, area, index));
    }

    let chars: Vec<u8> = val.bytes().map(|c| c - SIX_BIT_BASE).collect();
    let byte_len = (chars.len() * 3 + 3) / 4;
    if byte_len > MAX_ENCODED_LEN {
        return Err(Error::with_index(ErrorKind::TooBig, area, index));
    }

    let mut packed = vec![0u8; byte_len];
    for (i, &six) in chars.iter().enumerate() {
        let bit_off = i * 6;
        let byte_idx = bit_off / 8;
        let bit_idx = bit_off % 8;
        packed[byte_idx] |= six << bit_idx;
        if bit_idx > 2 {
            if let Some(next) = packed.get_mut(byte_idx + 1) {
                *next |= six >> (8 - bit_idx);
            }
        }
    }

    let mut out = Vec::with_capacity(1 + byte_len);
    out.push((0b10u8 << 6) | byte_len as u8);
    out.extend_from_slice(&packed);
    Ok(out)
}

fn encode_text(val: &str, area: ErrorSource, index: usize) -> Result<Vec<u8>, Error> {
    if !val.bytes().all(|c| (0x20..=0x7E).contains(&c)) {
        return Err(Error::with_index(ErrorKind::NonPrint, area, index));
    }
    let mut bytes = val.as_bytes().to_vec();
    // A length-1 Text field would collide with the 0xC1 terminator byte
    // (encoding Text, length 1), so pad it to length 2 with a NUL.
    if bytes.len() == 1 {
        bytes.push(0x00);
    }
    if bytes.len() > MAX_ENCODED_LEN {
        return Err(Error::with_index(ErrorKind::TooBig, area, index));
    }
    let mut out = Vec::with_capacity(1 + bytes.len());
    out.push((0b11u8 << 6) | bytes.len() as u8);
    out.extend_from_slice(&bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src() -> ErrorSource {
        ErrorSource::General
    }

    #[test]
    fn empty_text_encodes_to_single_zero_byte() {
        let (bytes, enc) = encode_field("", Encoding::Text, Encoding::Empty, src(), 0).unwrap();
        assert_eq!(bytes, vec![0x00]);
        assert_eq!(enc, Encoding::Empty);
    }

    #[test]
    fn length_one_text_is_padded_to_two() {
        let (encoded, enc) = encode_field("A", Encoding::Text, Encoding::Empty, src(), 0).unwrap();
        assert_eq!(encoded, vec![0xC2, b'A', 0x00]);
        assert_eq!(enc, Encoding::Text);
        let (field, consumed) = decode_field(&encoded, src(), 0).unwrap().unwrap();
        assert_eq!(consumed, 3);
        assert_eq!(field.val, "A\u{0}");
    }

    #[test]
    fn bcdplus_round_trips_after_trailing_space_strip() {
        let (encoded, _) = encode_field("123", Encoding::BcdPlus, Encoding::Empty, src(), 0).unwrap();
        let (field, _) = decode_field(&encoded, src(), 0).unwrap().unwrap();
        assert_eq!(field.val, "123");
        assert_eq!(field.enc, Encoding::BcdPlus);
    }

    #[test]
    fn sixbit_round_trips_for_each_remainder() {
        for s in ["IPMI", "IPM", "IP", "I"] {
            let (encoded, _) = encode_field(s, Encoding::SixBitAscii, Encoding::Empty, src(), 0).unwrap();
            let (field, _) = decode_field(&encoded, src(), 0).unwrap().unwrap();
            assert_eq!(field.val, s, "mismatch for input {s:?}");
        }
    }

    #[test]
    fn auto_selects_sixbit_for_ipmi() {
        let (encoded, enc) = encode_field("IPMI", Encoding::Auto, Encoding::Empty, src(), 0).unwrap();
        assert_eq!(enc, Encoding::SixBitAscii);
        assert_eq!(encoded[0] >> 6, 0b10);
        assert_eq!(encoded[0] & 0x3F, 3);
    }

    #[test]
    fn auto_selects_bcdplus_for_dashed_digits() {
        let (encoded, enc) = encode_field("12-34", Encoding::Auto, Encoding::Empty, src(), 0).unwrap();
        assert_eq!(enc, Encoding::BcdPlus);
        assert_eq!(encoded[0] >> 6, 0b01);
        assert_eq!(encoded[0] & 0x3F, 3);
    }

    #[test]
    fn auto_selects_binary_for_hex_looking_string() {
        let (encoded, enc) = encode_field("DEADBEEF", Encoding::Auto, Encoding::Empty, src(), 0).unwrap();
        assert_eq!(enc, Encoding::Binary);
        assert_eq!(encoded[0] >> 6, 0b00);
        assert_eq!(encoded[0] & 0x3F, 4);
    }

    #[test]
    fn auto_falls_back_to_text() {
        let (encoded, enc) = encode_field("Hello, world", Encoding::Auto, Encoding::Empty, src(), 0).unwrap();
        assert_eq!(enc, Encoding::Text);
        assert_eq!(encoded[0] >> 6, 0b11);
    }

    #[test]
    fn terminator_is_recognized() {
        assert!(decode_field(&[0xC1], src(), 0).unwrap().is_none());
    }

    #[test]
    fn decode_text_rejects_non_printable() {
        let buf = [0xC2, 0x01, 0x02];
        assert_eq!(
            decode_field(&buf, src(), 0).unwrap_err().kind,
            ErrorKind::NonPrint
        );
    }
}
