//! The file-level container: the 8-byte header, area placement/ordering,
//! and the top-level `load`/`save` entry points.

use chrono::Utc;

use crate::area;
use crate::checksum;
use crate::error::{Error, ErrorKind, ErrorSource};
use crate::model::{AreaTag, Fru};
use crate::mr;

const BLOCK_SZ: usize = 8;
const HEADER_LEN: usize = 8;
const HEADER_VERSION: u8 = 1;

/// The library's self-imposed file size cap (relaxable with
/// [`DecodeFlags::IGNORE_BIG`]).
pub const MAX_FILE_SIZE: usize = 64 * 1024;

bitflags::bitflags! {
    /// Decoder leniency switches. Each bit relaxes exactly one check that
    /// would otherwise fail the load; none of them affect encoding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DecodeFlags: u32 {
        const IGNORE_FILE_VERSION          = 1 << 0;
        const IGNORE_AREA_VERSION          = 1 << 1;
        const IGNORE_RECORD_VERSION        = 1 << 2;
        const IGNORE_FILE_HEADER_CHECKSUM  = 1 << 3;
        const IGNORE_AREA_CHECKSUM         = 1 << 4;
        const IGNORE_RECORD_HEADER_CHECKSUM = 1 << 5;
        const IGNORE_RECORD_DATA_CHECKSUM  = 1 << 6;
        const IGNORE_AREA_EOF              = 1 << 7;
        const IGNORE_MISSING_EOL           = 1 << 8;
        const IGNORE_MR_DATA_LENGTH        = 1 << 9;
        const IGNORE_BIG                   = 1 << 10;
    }
}

/// Loads a FRU file from `buf` with no leniency flags.
pub fn load(buf: &[u8]) -> Result<Fru, Error> {
    load_with_flags(buf, DecodeFlags::empty())
}

/// Loads a FRU file from `buf`, relaxing the checks named by `flags`.
pub fn load_with_flags(buf: &[u8], flags: DecodeFlags) -> Result<Fru, Error> {
    let gen = ErrorSource::General;
    log::trace!("loading {} bytes with flags {flags:?}", buf.len());

    if buf.len() > MAX_FILE_SIZE && !flags.contains(DecodeFlags::IGNORE_BIG) {
        return Err(Error::new(ErrorKind::TooBig, gen));
    }
    if buf.len() < HEADER_LEN {
        return Err(Error::new(ErrorKind::TooSmall, gen));
    }

    let ver_rsvd = buf[0];
    let pad = buf[6];
    if (ver_rsvd != HEADER_VERSION || pad != 0) && !flags.contains(DecodeFlags::IGNORE_FILE_VERSION) {
        return Err(Error::new(ErrorKind::HeaderVersion, gen));
    }
    if !flags.contains(DecodeFlags::IGNORE_FILE_HEADER_CHECKSUM) && !checksum::verify(&buf[0..HEADER_LEN]) {
        return Err(Error::new(ErrorKind::HeaderChecksum, gen));
    }

    let offsets: [u8; 5] = [buf[1], buf[2], buf[3], buf[4], buf[5]];

    let mut fru = Fru::new();
    let mut present = [false; 5];
    let mut seen_offsets: Vec<(u8, AreaTag)> = Vec::new();

    for area_tag in AreaTag::ALL {
        let offset_blocks = offsets[area_tag.index()];
        if offset_blocks == 0 {
            continue;
        }
        for &(other_off, other_tag) in &seen_offsets {
            if other_off == offset_blocks {
                return Err(Error::new(ErrorKind::DuplicateArea, ErrorSource::Area(area_tag)));
            }
            let _ = other_tag;
        }
        seen_offsets.push((offset_blocks, area_tag));

        let start = offset_blocks as usize * BLOCK_SZ;
        if start >= buf.len() {
            return Err(Error::new(ErrorKind::HeaderBadPointer, ErrorSource::Area(area_tag)));
        }
        let limit = area_limit(&offsets, area_tag, buf.len());
        let end = (start + limit).min(buf.len());
        let area_bytes = &buf[start..end];

        log::debug!("decoding {area_tag} area at block {offset_blocks} ({} bytes)", area_bytes.len());

        match area_tag {
            AreaTag::Internal => {
                fru.internal = area::decode_internal(area_bytes, flags.contains(DecodeFlags::IGNORE_AREA_VERSION))?;
            }
            AreaTag::Chassis => {
                fru.chassis = area::decode_chassis(
                    area_bytes,
                    flags.contains(DecodeFlags::IGNORE_AREA_VERSION),
                    flags.contains(DecodeFlags::IGNORE_AREA_CHECKSUM),
                    flags.contains(DecodeFlags::IGNORE_AREA_EOF),
                )?;
            }
            AreaTag::Board => {
                fru.board = area::decode_board(
                    area_bytes,
                    flags.contains(DecodeFlags::IGNORE_AREA_VERSION),
                    flags.contains(DecodeFlags::IGNORE_AREA_CHECKSUM),
                    flags.contains(DecodeFlags::IGNORE_AREA_EOF),
                )?;
            }
            AreaTag::Product => {
                fru.product = area::decode_product(
                    area_bytes,
                    flags.contains(DecodeFlags::IGNORE_AREA_VERSION),
                    flags.contains(DecodeFlags::IGNORE_AREA_CHECKSUM),
                    flags.contains(DecodeFlags::IGNORE_AREA_EOF),
                )?;
            }
            AreaTag::Mr => {
                fru.mr = decode_mr_area(area_bytes, flags)?;
            }
        }
        present[area_tag.index()] = true;
    }

    let mut order = AreaTag::ALL;
    order.sort_by_key(|&t| if present[t.index()] { offsets[t.index()] } else { 0 });
    fru.set_order_and_presence(order, present);

    Ok(fru)
}

/// Computes the byte distance from `area`'s own offset to the closest
/// following area's offset (by block number, not on-disk order), or to the
/// end of the buffer if `area` is the last one.
fn area_limit(offsets: &[u8; 5], area: AreaTag, total_len: usize) -> usize {
    let my_offset = offsets[area.index()];
    let next = AreaTag::ALL
        .into_iter()
        .filter(|&t| t != area && offsets[t.index()] > my_offset)
        .map(|t| offsets[t.index()])
        .min();
    match next {
        Some(n) => (n as usize) * BLOCK_SZ - (my_offset as usize) * BLOCK_SZ,
        None => total_len - (my_offset as usize) * BLOCK_SZ,
    }
}

fn decode_mr_area(buf: &[u8], flags: DecodeFlags) -> Result<Vec<mr::Record>, Error> {
    let src = ErrorSource::Area(AreaTag::Mr);
    let mut records = Vec::new();
    let mut offset = 0;
    let mut index = 0;
    let mut saw_eol = false;

    while offset < buf.len() {
        match mr::decode_record(
            &buf[offset..],
            flags.contains(DecodeFlags::IGNORE_RECORD_VERSION),
            flags.contains(DecodeFlags::IGNORE_RECORD_HEADER_CHECKSUM),
            flags.contains(DecodeFlags::IGNORE_RECORD_DATA_CHECKSUM),
            flags.contains(DecodeFlags::IGNORE_MR_DATA_LENGTH),
            index,
        ) {
            Ok((record, eol, consumed)) => {
                records.push(record);
                offset += consumed;
                index += 1;
                if eol {
                    saw_eol = true;
                    break;
                }
            }
            Err(e) => return Err(e),
        }
    }

    if !records.is_empty() && !saw_eol && !flags.contains(DecodeFlags::IGNORE_MISSING_EOL) {
        return Err(Error::new(ErrorKind::NoTerminator, src));
    }

    Ok(records)
}

/// Encodes `fru` into a binary FRU file.
pub fn save(fru: &Fru) -> Result<Vec<u8>, Error> {
    let gen = ErrorSource::General;
    let now = Utc::now();

    let mut areas: Vec<(AreaTag, Vec<u8>)> = Vec::new();
    for &tag in fru.order() {
        if !fru.is_present(tag) {
            continue;
        }
        let encoded = match tag {
            AreaTag::Internal => area::encode_internal(&fru.internal)?,
            AreaTag::Chassis => area::encode_chassis(&fru.chassis)?,
            AreaTag::Board => area::encode_board(&fru.board, now)?,
            AreaTag::Product => area::encode_product(&fru.product)?,
            AreaTag::Mr => encode_mr_area(&fru.mr, gen)?,
        };
        areas.push((tag, encoded));
    }

    let mut offsets = [0u8; 5];
    let mut cursor_blocks: usize = 1; // header occupies block 0
    for (tag, encoded) in &areas {
        let blocks = encoded.len() / BLOCK_SZ;
        if cursor_blocks > u8::MAX as usize {
            return Err(Error::new(ErrorKind::TooBig, gen));
        }
        offsets[tag.index()] = cursor_blocks as u8;
        cursor_blocks += blocks;
    }

    let mut out = vec![0u8; HEADER_LEN];
    out[0] = HEADER_VERSION;
    for tag in AreaTag::ALL {
        out[1 + tag.index()] = offsets[tag.index()];
    }
    out[6] = 0;
    out[7] = checksum::checksum(&out[0..7]);

    for (_, encoded) in &areas {
        out.extend_from_slice(encoded);
    }

    if out.len() > MAX_FILE_SIZE {
        return Err(Error::new(ErrorKind::TooBig, gen));
    }

    Ok(out)
}

fn encode_mr_area(records: &[mr::Record], src: ErrorSource) -> Result<Vec<u8>, Error> {
    if records.is_empty() {
        return Err(Error::new(ErrorKind::NoData, src));
    }
    let mut out = Vec::new();
    let last = records.len() - 1;
    for (i, record) in records.iter().enumerate() {
        let mut encoded = mr::encode_record(record, i)?;
        if i == last {
            mr::set_eol(&mut encoded, true);
        }
        out.extend_from_slice(&encoded);
    }
    let target = ((out.len() + BLOCK_SZ - 1) / BLOCK_SZ) * BLOCK_SZ;
    out.resize(target, 0);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InsertPosition;

    fn sample_fru() -> Fru {
        let mut fru = Fru::new();
        fru.enable(AreaTag::Chassis, InsertPosition::Last).unwrap();
        fru.set_field(AreaTag::Chassis, 0, crate::field::Encoding::Text, "PN-1").unwrap();
        fru.set_field(AreaTag::Chassis, 1, crate::field::Encoding::Text, "SN-1").unwrap();
        fru.enable(AreaTag::Board, InsertPosition::Last).unwrap();
        for i in 0..5 {
            fru.set_field(AreaTag::Board, i, crate::field::Encoding::Text, "X").unwrap();
        }
        fru.enable(AreaTag::Mr, InsertPosition::Last).unwrap();
        fru.add_mr(0, mr::Record::Raw { rec_type: 0x09, enc: mr::RawEncoding::Binary, data: "010203".into() }).unwrap();
        fru
    }

    #[test]
    fn save_then_load_round_trips() {
        let fru = sample_fru();
        let bytes = save(&fru).unwrap();
        assert!(bytes.len() % BLOCK_SZ == 0);
        assert!(bytes.len() <= MAX_FILE_SIZE);
        let loaded = load(&bytes).unwrap();
        assert!(loaded.is_present(AreaTag::Chassis));
        assert!(loaded.is_present(AreaTag::Board));
        assert!(loaded.is_present(AreaTag::Mr));
        assert_eq!(loaded.get_field(AreaTag::Chassis, 0).unwrap().val, "PN-1");
        assert_eq!(loaded.mr.len(), 1);
    }

    #[test]
    fn header_checksum_is_verified() {
        let fru = sample_fru();
        let mut bytes = save(&fru).unwrap();
        bytes[7] ^= 0x01;
        assert_eq!(load(&bytes).unwrap_err().kind, ErrorKind::HeaderChecksum);
        assert!(load_with_flags(&bytes, DecodeFlags::IGNORE_FILE_HEADER_CHECKSUM).is_ok());
    }

    #[test]
    fn empty_mr_area_is_rejected_at_save() {
        let mut fru = Fru::new();
        fru.enable(AreaTag::Mr, InsertPosition::Last).unwrap();
        assert_eq!(save(&fru).unwrap_err().kind, ErrorKind::NoData);
    }

    #[test]
    fn oversized_file_is_rejected_at_save() {
        let mut fru = Fru::new();
        fru.enable(AreaTag::Internal, InsertPosition::Last).unwrap();
        fru.internal.data = "AB".repeat(MAX_FILE_SIZE);
        assert_eq!(save(&fru).unwrap_err().kind, ErrorKind::TooBig);
    }

    #[test]
    fn oversized_file_is_accepted_with_ignore_big_on_load() {
        let mut fru = Fru::new();
        fru.enable(AreaTag::Internal, InsertPosition::Last).unwrap();
        fru.internal.data = "AB".repeat(MAX_FILE_SIZE / 2);
        // Hand-assemble: encode the oversized area directly, bypassing the
        // save()-side cap, to exercise the load()-side IGNORE_BIG flag.
        let encoded_area = area::encode_internal(&fru.internal).unwrap();
        let mut buf = vec![0u8; HEADER_LEN];
        buf[0] = HEADER_VERSION;
        buf[1] = 1;
        buf[7] = checksum::checksum(&buf[0..7]);
        buf.extend_from_slice(&encoded_area);
        assert!(buf.len() > MAX_FILE_SIZE);
        assert_eq!(load(&buf).unwrap_err().kind, ErrorKind::TooBig);
        assert!(load_with_flags(&buf, DecodeFlags::IGNORE_BIG).is_ok());
    }
}
