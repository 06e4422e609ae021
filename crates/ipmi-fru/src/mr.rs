//! The Multirecord (MR) area: a sequence of independently checksummed
//! records, each headed by a 5-byte `{type, eol_ver, len, data_cksum,
//! hdr_cksum}` header. The Management Access record (type 0x03) is decoded
//! into its seven typed subtypes; every other record type passes through
//! as an opaque blob.

use crate::checksum;
use crate::error::{Error, ErrorKind, ErrorSource};
use crate::hex;

/// Size of an MR record header in bytes.
pub const HEADER_LEN: usize = 5;
const VERSION: u8 = 2;
const EOL_BIT: u8 = 0x80;
const VER_MASK: u8 = 0x07;

/// Table 16-2: Management Access Record.
pub const MGMT_ACCESS_TYPE: u8 = 0x03;

/// Table 16-2, MultiRecord Area Record Types, kept only for presentation
/// (naming unsupported record types in `Display`/JSON output); decoding
/// never branches on anything but [`MGMT_ACCESS_TYPE`].
pub fn record_type_name(rec_type: u8) -> &'static str {
    match rec_type {
        0x00 => "power supply information",
        0x01 => "dc output",
        0x02 => "dc load",
        0x03 => "management access record",
        0x04 => "base compatibility record",
        0x05 => "extended compatibility record",
        0x06 => "asf fixed smbus device record",
        0x07 => "asf legacy device alerts record",
        0x08 => "asf remote control record",
        0x09 => "extended dc output",
        0x0A => "extended dc load",
        0x0B..=0x0F => "nvme record",
        0xC0..=0xFF => "oem record",
        _ => "reserved",
    }
}

/// Table 18-6's seven Management Access Record subtypes, with their
/// per-type minimum and maximum value lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ManagementSubtype {
    SystemUrl = 1,
    SystemName = 2,
    SystemPing = 3,
    ComponentUrl = 4,
    ComponentName = 5,
    ComponentPing = 6,
    SystemUuid = 7,
}

impl ManagementSubtype {
    pub const ALL: [ManagementSubtype; 7] = [
        ManagementSubtype::SystemUrl,
        ManagementSubtype::SystemName,
        ManagementSubtype::SystemPing,
        ManagementSubtype::ComponentUrl,
        ManagementSubtype::ComponentName,
        ManagementSubtype::ComponentPing,
        ManagementSubtype::SystemUuid,
    ];

    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(ManagementSubtype::SystemUrl),
            2 => Some(ManagementSubtype::SystemName),
            3 => Some(ManagementSubtype::SystemPing),
            4 => Some(ManagementSubtype::ComponentUrl),
            5 => Some(ManagementSubtype::ComponentName),
            6 => Some(ManagementSubtype::ComponentPing),
            7 => Some(ManagementSubtype::SystemUuid),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// `(min, max)` value length in bytes, per Table 18-6.
    fn bounds(self) -> (usize, usize) {
        match self {
            ManagementSubtype::SystemUrl => (16, 256),
            ManagementSubtype::SystemName => (8, 64),
            ManagementSubtype::SystemPing => (8, 64),
            ManagementSubtype::ComponentUrl => (16, 256),
            ManagementSubtype::ComponentName => (8, 256),
            ManagementSubtype::ComponentPing => (8, 64),
            ManagementSubtype::SystemUuid => (16, 16),
        }
    }
}

/// A decoded Management Access record. The six string subtypes carry their
/// value verbatim; `SystemUuid` carries a canonical non-dashed hex string
/// with the SMBIOS byte-swap already undone.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ManagementRecord {
    SystemUrl(String),
    SystemName(String),
    SystemPing(String),
    ComponentUrl(String),
    ComponentName(String),
    ComponentPing(String),
    SystemUuid(String),
}

impl ManagementRecord {
    fn subtype(&self) -> ManagementSubtype {
        match self {
            ManagementRecord::SystemUrl(_) => ManagementSubtype::SystemUrl,
            ManagementRecord::SystemName(_) => ManagementSubtype::SystemName,
            ManagementRecord::SystemPing(_) => ManagementSubtype::SystemPing,
            ManagementRecord::ComponentUrl(_) => ManagementSubtype::ComponentUrl,
            ManagementRecord::ComponentName(_) => ManagementSubtype::ComponentName,
            ManagementRecord::ComponentPing(_) => ManagementSubtype::ComponentPing,
            ManagementRecord::SystemUuid(_) => ManagementSubtype::SystemUuid,
        }
    }

    fn from_parts(subtype: ManagementSubtype, value: String) -> Self {
        match subtype {
            ManagementSubtype::SystemUrl => ManagementRecord::SystemUrl(value),
            ManagementSubtype::SystemName => ManagementRecord::SystemName(value),
            ManagementSubtype::SystemPing => ManagementRecord::SystemPing(value),
            ManagementSubtype::ComponentUrl => ManagementRecord::ComponentUrl(value),
            ManagementSubtype::ComponentName => ManagementRecord::ComponentName(value),
            ManagementSubtype::ComponentPing => ManagementRecord::ComponentPing(value),
            ManagementSubtype::SystemUuid => ManagementRecord::SystemUuid(value),
        }
    }

    fn value(&self) -> &str {
        match self {
            ManagementRecord::SystemUrl(v)
            | ManagementRecord::SystemName(v)
            | ManagementRecord::SystemPing(v)
            | ManagementRecord::ComponentUrl(v)
            | ManagementRecord::ComponentName(v)
            | ManagementRecord::ComponentPing(v) => v,
            ManagementRecord::SystemUuid(v) => v,
        }
    }
}

/// How a `Raw` multirecord's payload is represented in the decoded model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RawEncoding {
    Binary,
    Text,
}

/// One decoded multirecord entry: a typed Management Access record, or an
/// opaque passthrough for any other record type. A `Raw` payload is held as
/// text when every byte is printable ASCII, else as an uppercase hex string.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Record {
    Management(ManagementRecord),
    Raw { rec_type: u8, enc: RawEncoding, data: String },
}

impl Record {
    pub fn record_type(&self) -> u8 {
        match self {
            Record::Management(_) => MGMT_ACCESS_TYPE,
            Record::Raw { rec_type, .. } => *rec_type,
        }
    }

    /// Builds a `Raw` record from payload bytes, choosing `Text` if every
    /// byte is printable ASCII, else `Binary` (hex-encoded).
    fn raw_from_bytes(rec_type: u8, data: &[u8]) -> Record {
        if data.iter().all(|&b| (0x20..=0x7E).contains(&b)) {
            Record::Raw { rec_type, enc: RawEncoding::Text, data: String::from_utf8_lossy(data).into_owned() }
        } else {
            Record::Raw { rec_type, enc: RawEncoding::Binary, data: hex::bin2hexstr(data) }
        }
    }

    /// Builds a `SystemUuid` record from a dashed or non-dashed hex UUID
    /// string, applying the SMBIOS byte swap on the `time_low`/`time_mid`/
    /// `time_hi_and_version` fields.
    pub fn system_uuid(uuid_str: &str) -> Result<Record, Error> {
        let raw = parse_uuid(uuid_str)?;
        let swapped = swap_uuid(raw);
        Ok(Record::Management(ManagementRecord::SystemUuid(hex::bin2hexstr(&swapped))))
    }

    /// Returns the canonical (non-dashed, swap-undone) UUID hex string, if
    /// this is a `SystemUuid` record.
    pub fn as_uuid(&self) -> Option<&str> {
        match self {
            Record::Management(ManagementRecord::SystemUuid(s)) => Some(s),
            _ => None,
        }
    }
}

/// Parses a 32-hex-digit UUID (with or without dashes) into 16 raw bytes in
/// the order a client would type them (big-endian / RFC 4122 field order).
fn parse_uuid(s: &str) -> Result<[u8; 16], Error> {
    let cleaned: String = s.chars().filter(|&c| c != '-').collect();
    if cleaned.len() != 32 {
        return Err(Error::new(ErrorKind::BadData, ErrorSource::General));
    }
    let bytes = hex::hexstr2bin(&cleaned, false)?;
    let mut out = [0u8; 16];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Applies (and, being an involution, also undoes) the SMBIOS-style
/// byte-swap to the first three fields of a 16-byte UUID: `time_low` (4
/// bytes), `time_mid` (2 bytes), `time_hi_and_version` (2 bytes). The
/// remaining 8 bytes (clock sequence and node) are untouched.
fn swap_uuid(mut raw: [u8; 16]) -> [u8; 16] {
    raw[0..4].reverse();
    raw[4..6].reverse();
    raw[6..8].reverse();
    raw
}

fn header_checksum(type_id: u8, eol_ver: u8, len: u8, rec_checksum: u8) -> u8 {
    checksum::checksum(&[type_id, eol_ver, len, rec_checksum])
}

/// Encodes one record (header + body), without the end-of-list bit; callers
/// (area-level encode) set `FRU_MR_EOL` on the last record of a non-empty
/// list.
pub fn encode_record(record: &Record, index: usize) -> Result<Vec<u8>, Error> {
    let (rec_type, data) = match record {
        Record::Management(mgmt) => {
            let subtype = mgmt.subtype();
            let (min, max) = subtype.bounds();
            let value = mgmt.value();
            let body: Vec<u8> = if matches!(subtype, ManagementSubtype::SystemUuid) {
                parse_uuid(value).map(|raw| swap_uuid(raw).to_vec())?
            } else {
                value.as_bytes().to_vec()
            };
            if body.len() < min || body.len() > max {
                return Err(Error::with_index(ErrorKind::MgmtRecordBad, ErrorSource::Area(crate::model::AreaTag::Mr), index));
            }
            let mut data = Vec::with_capacity(1 + body.len());
            data.push(subtype.code());
            data.extend_from_slice(&body);
            (MGMT_ACCESS_TYPE, data)
        }
        Record::Raw { rec_type, enc, data } => {
            let body = match enc {
                RawEncoding::Text => {
                    if !data.bytes().all(|c| (0x20..=0x7E).contains(&c)) {
                        return Err(Error::with_index(ErrorKind::NonPrint, ErrorSource::Area(crate::model::AreaTag::Mr), index));
                    }
                    data.as_bytes().to_vec()
                }
                RawEncoding::Binary => hex::hexstr2bin(data, false)?,
            };
            (*rec_type, body)
        }
    };

    if data.len() > u8::MAX as usize {
        return Err(Error::with_index(ErrorKind::TooBig, ErrorSource::Area(crate::model::AreaTag::Mr), index));
    }

    let len = data.len() as u8;
    let rec_checksum = checksum::checksum(&data);
    let eol_ver = VERSION & VER_MASK;
    let hdr_checksum = header_checksum(rec_type, eol_ver, len, rec_checksum);

    let mut out = Vec::with_capacity(HEADER_LEN + data.len());
    out.push(rec_type);
    out.push(eol_ver);
    out.push(len);
    out.push(rec_checksum);
    out.push(hdr_checksum);
    out.extend_from_slice(&data);
    Ok(out)
}

/// Sets (or clears) the end-of-list bit on an already-encoded record's
/// `eol_ver` byte and recomputes the header checksum.
pub fn set_eol(encoded: &mut [u8], eol: bool) {
    let type_id = encoded[0];
    let mut eol_ver = encoded[1] & VER_MASK;
    if eol {
        eol_ver |= EOL_BIT;
    }
    encoded[1] = eol_ver;
    let len = encoded[2];
    let rec_checksum = encoded[3];
    encoded[4] = header_checksum(type_id, eol_ver, len, rec_checksum);
}

/// Decodes one record starting at `buf[0]`. Returns the record, whether its
/// `EOL` bit was set, and the number of bytes consumed.
pub fn decode_record(
    buf: &[u8],
    ignore_rver: bool,
    ignore_rhcksum: bool,
    ignore_rdcksum: bool,
    ignore_mdl: bool,
    index: usize,
) -> Result<(Record, bool, usize), Error> {
    let src = ErrorSource::Area(crate::model::AreaTag::Mr);
    if buf.len() < HEADER_LEN {
        return Err(Error::with_index(ErrorKind::TooSmall, src, index));
    }
    let rec_type = buf[0];
    let eol_ver = buf[1];
    let len = buf[2] as usize;
    let rec_checksum = buf[3];
    let hdr_checksum = buf[4];

    if (eol_ver & VER_MASK) != VERSION && !ignore_rver {
        return Err(Error::with_index(ErrorKind::BadData, src, index));
    }
    if !ignore_rhcksum && !checksum::verify(&[rec_type, eol_ver, buf[2], rec_checksum, hdr_checksum]) {
        return Err(Error::with_index(ErrorKind::DataChecksum, src, index));
    }
    if buf.len() < HEADER_LEN + len {
        return Err(Error::with_index(ErrorKind::TooSmall, src, index));
    }
    let data = &buf[HEADER_LEN..HEADER_LEN + len];
    if !ignore_rdcksum && checksum::checksum(data) != rec_checksum {
        return Err(Error::with_index(ErrorKind::DataChecksum, src, index));
    }

    let record = if rec_type == MGMT_ACCESS_TYPE && !data.is_empty() {
        let subtype_byte = data[0];
        let body = &data[1..];
        match ManagementSubtype::from_u8(subtype_byte) {
            Some(subtype) => {
                let (min, max) = subtype.bounds();
                if !ignore_mdl && (body.len() < min || body.len() > max) {
                    return Err(Error::with_index(ErrorKind::MgmtRecordBad, src, index));
                }
                let value = if matches!(subtype, ManagementSubtype::SystemUuid) && body.len() == 16 {
                    let mut raw = [0u8; 16];
                    raw.copy_from_slice(body);
                    hex::bin2hexstr(&swap_uuid(raw))
                } else if matches!(subtype, ManagementSubtype::SystemUuid) {
                    hex::bin2hexstr(body)
                } else {
                    std::str::from_utf8(body)
                        .map_err(|_| Error::with_index(ErrorKind::BadData, src, index))?
                        .to_string()
                };
                Record::Management(ManagementRecord::from_parts(subtype, value))
            }
            None => Record::raw_from_bytes(rec_type, data),
        }
    } else {
        Record::raw_from_bytes(rec_type, data)
    };

    Ok((record, eol_ver & EOL_BIT != 0, HEADER_LEN + len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_record_round_trips() {
        let rec = Record::Raw { rec_type: 0x09, enc: RawEncoding::Binary, data: "01020304".into() };
        let encoded = encode_record(&rec, 0).unwrap();
        let (decoded, eol, consumed) = decode_record(&encoded, false, false, false, false, 0).unwrap();
        assert_eq!(decoded, rec);
        assert!(!eol);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn raw_record_with_printable_payload_decodes_as_text() {
        let rec = Record::Raw { rec_type: 0x0B, enc: RawEncoding::Text, data: "hello".into() };
        let encoded = encode_record(&rec, 0).unwrap();
        let (decoded, _, _) = decode_record(&encoded, false, false, false, false, 0).unwrap();
        assert_eq!(decoded, rec);
    }

    #[test]
    fn eol_bit_is_set_and_checksum_recomputed() {
        let rec = Record::Raw { rec_type: 0x01, enc: RawEncoding::Binary, data: "AA".into() };
        let mut encoded = encode_record(&rec, 0).unwrap();
        set_eol(&mut encoded, true);
        let (_, eol, _) = decode_record(&encoded, false, false, false, false, 0).unwrap();
        assert!(eol);
    }

    #[test]
    fn system_uuid_round_trips_with_swap() {
        let uuid = "01234567-89AB-CDEF-0123-456789ABCDEF";
        let rec = Record::system_uuid(uuid).unwrap();
        let encoded = encode_record(&rec, 0).unwrap();
        // Table 18-6 worked example: the on-wire bytes have time_low/time_mid/
        // time_hi_and_version byte-swapped relative to the input string.
        assert_eq!(
            &encoded[HEADER_LEN + 1..],
            &[0x67, 0x45, 0x23, 0x01, 0xAB, 0x89, 0xEF, 0xCD, 0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF]
        );
        let (decoded, _, _) = decode_record(&encoded, false, false, false, false, 0).unwrap();
        assert_eq!(decoded.record_type(), MGMT_ACCESS_TYPE);
        assert_eq!(decoded.as_uuid().unwrap().to_uppercase(), uuid.replace('-', ""));
    }

    #[test]
    fn mgmt_record_rejects_undersized_value() {
        let rec = Record::Management(ManagementRecord::SystemName("x".into()));
        assert_eq!(
            encode_record(&rec, 0).unwrap_err().kind,
            ErrorKind::MgmtRecordBad
        );
    }

    #[test]
    fn unknown_mgmt_subtype_decodes_as_raw() {
        let mut data = vec![0x03, 0x02, 0x02, 0, 0, 0xFF, 0x01];
        let cksum = checksum::checksum(&data[5..]);
        data[3] = cksum;
        data[4] = header_checksum(data[0], data[1], data[2], data[3]);
        let (decoded, _, _) = decode_record(&data, false, false, false, false, 0).unwrap();
        assert!(matches!(decoded, Record::Raw { rec_type: 0x03, .. }));
    }
}
