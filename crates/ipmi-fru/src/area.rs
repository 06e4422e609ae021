//! Codec for the Internal-Use area and the three generic info areas
//! (Chassis, Board, Product): block alignment, the mandatory-field walk,
//! the custom-field tail terminated by `0xC1`, and the area checksum.

use chrono::{DateTime, Utc};

use crate::error::{Error, ErrorKind, ErrorSource};
use crate::field::{self, Field};
use crate::hex;
use crate::model::{fru_epoch, AreaTag, BoardArea, BoardDate, ChassisArea, InternalArea, ProductArea};

pub const BLOCK_SZ: usize = 8;
const VERSION: u8 = 1;

/// Rounds `bytes` up to the next whole number of 8-byte blocks.
pub fn blocks_for(bytes: usize) -> usize {
    (bytes + BLOCK_SZ - 1) / BLOCK_SZ
}

fn pad_to_block(buf: &mut Vec<u8>) {
    let target = blocks_for(buf.len()) * BLOCK_SZ;
    buf.resize(target, 0);
}

/// Decodes the Internal Use area: a version byte followed by an opaque
/// payload, the whole area sized by the distance to the next area (it
/// carries no size field or checksum of its own).
pub fn decode_internal(data: &[u8], ignore_aver: bool) -> Result<InternalArea, Error> {
    let src = ErrorSource::Area(AreaTag::Internal);
    if data.is_empty() {
        return Err(Error::new(ErrorKind::TooSmall, src));
    }
    if data[0] & 0x0F != VERSION && !ignore_aver {
        return Err(Error::new(ErrorKind::AreaVersion, src));
    }
    Ok(InternalArea { data: hex::bin2hexstr(&data[1..]) })
}

/// Encodes the Internal Use area, block-padded with zero bytes.
pub fn encode_internal(area: &InternalArea) -> Result<Vec<u8>, Error> {
    let src = ErrorSource::Area(AreaTag::Internal);
    if !hex::is_strict_hex(area.data.as_bytes()) {
        return Err(Error::new(ErrorKind::NonHex, src));
    }
    let payload = hex::hexstr2bin(&area.data, false)?;
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(VERSION);
    out.extend_from_slice(&payload);
    pad_to_block(&mut out);
    Ok(out)
}

fn decode_mandatory_fields(
    data: &[u8],
    count: usize,
    area: ErrorSource,
) -> Result<(Vec<Field>, usize), Error> {
    let mut fields = Vec::with_capacity(count);
    let mut offset = 0;
    for i in 0..count {
        let (field, consumed) = field::decode_field(&data[offset..], area, i)?
            .ok_or_else(|| Error::with_index(ErrorKind::NoTerminator, area, i))?;
        fields.push(field);
        offset += consumed;
    }
    Ok((fields, offset))
}

fn decode_custom_fields(data: &[u8], area: ErrorSource, ignore_aeof: bool) -> Result<Vec<Field>, Error> {
    let mut fields = Vec::new();
    let mut offset = 0;
    let mut index = 0;
    loop {
        if data[offset..].is_empty() {
            return if ignore_aeof { Ok(fields) } else { Err(Error::with_index(ErrorKind::NoTerminator, area, index)) };
        }
        match field::decode_field(&data[offset..], area, index)? {
            None => return Ok(fields),
            Some((field, consumed)) => {
                fields.push(field);
                offset += consumed;
                index += 1;
            }
        }
    }
}

fn encode_fields(fields: &[&Field], area: ErrorSource) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    for (i, f) in fields.iter().enumerate() {
        let (bytes, _) = field::encode_field(&f.val, f.enc, f.enc, area, i)?;
        out.extend_from_slice(&bytes);
    }
    Ok(out)
}

/// Finishes an info area body (header + fields + custom tail, no
/// terminator/checksum yet) by appending the `0xC1` terminator, padding to
/// a block boundary, writing the real block count into `body[1]`, and
/// appending the trailing checksum byte.
fn finish_area(mut body: Vec<u8>) -> Vec<u8> {
    body.push(0xC1);
    // Pad so that, once the trailing checksum byte is appended, the area's
    // total size is a whole number of 8-byte blocks.
    let total_with_cksum = blocks_for(body.len() + 1) * BLOCK_SZ;
    body.resize(total_with_cksum - 1, 0);
    body[1] = (total_with_cksum / BLOCK_SZ) as u8;
    let cksum = crate::checksum::checksum(&body);
    body.push(cksum);
    body
}

/// Decodes the Chassis Information Area.
pub fn decode_chassis(data: &[u8], ignore_aver: bool, ignore_acksum: bool, ignore_aeof: bool) -> Result<ChassisArea, Error> {
    let src = ErrorSource::Area(AreaTag::Chassis);
    let (blocks, chassis_type, rest) = decode_info_header(data, src, ignore_aver, ignore_acksum)?;
    let _ = blocks;
    let (mandatory, consumed) = decode_mandatory_fields(rest, ChassisArea::FIELD_COUNT, src)?;
    let custom = decode_custom_fields(&rest[consumed..], src, ignore_aeof)?;
    Ok(ChassisArea {
        chassis_type,
        part_number: mandatory[0].clone(),
        serial: mandatory[1].clone(),
        custom,
    })
}

pub fn encode_chassis(area: &ChassisArea) -> Result<Vec<u8>, Error> {
    let src = ErrorSource::Area(AreaTag::Chassis);
    let mut body = vec![VERSION, 0, area.chassis_type];
    body.extend_from_slice(&encode_fields(&[&area.part_number, &area.serial], src)?);
    let custom_refs: Vec<&Field> = area.custom.iter().collect();
    body.extend_from_slice(&encode_fields(&custom_refs, src)?);
    Ok(finish_area(body))
}

/// Decodes the Product Information Area (identical layout to Chassis, save
/// for the field count and the `langtype` meaning a language code).
pub fn decode_product(data: &[u8], ignore_aver: bool, ignore_acksum: bool, ignore_aeof: bool) -> Result<ProductArea, Error> {
    let src = ErrorSource::Area(AreaTag::Product);
    let (_, lang, rest) = decode_info_header(data, src, ignore_aver, ignore_acksum)?;
    let (mandatory, consumed) = decode_mandatory_fields(rest, ProductArea::FIELD_COUNT, src)?;
    let custom = decode_custom_fields(&rest[consumed..], src, ignore_aeof)?;
    Ok(ProductArea {
        lang,
        manufacturer: mandatory[0].clone(),
        product_name: mandatory[1].clone(),
        model_part_number: mandatory[2].clone(),
        version: mandatory[3].clone(),
        serial: mandatory[4].clone(),
        asset_tag: mandatory[5].clone(),
        fru_file_id: mandatory[6].clone(),
        custom,
    })
}

pub fn encode_product(area: &ProductArea) -> Result<Vec<u8>, Error> {
    let src = ErrorSource::Area(AreaTag::Product);
    let mut body = vec![VERSION, 0, area.lang];
    body.extend_from_slice(&encode_fields(
        &[
            &area.manufacturer,
            &area.product_name,
            &area.model_part_number,
            &area.version,
            &area.serial,
            &area.asset_tag,
            &area.fru_file_id,
        ],
        src,
    )?);
    let custom_refs: Vec<&Field> = area.custom.iter().collect();
    body.extend_from_slice(&encode_fields(&custom_refs, src)?);
    Ok(finish_area(body))
}

/// Decodes the Board Information Area, whose header carries an extra
/// 3-byte manufacturing-date field ahead of the mandatory fields.
pub fn decode_board(data: &[u8], ignore_aver: bool, ignore_acksum: bool, ignore_aeof: bool) -> Result<BoardArea, Error> {
    let src = ErrorSource::Area(AreaTag::Board);
    let (_, lang, rest) = decode_info_header(data, src, ignore_aver, ignore_acksum)?;
    if rest.len() < 3 {
        return Err(Error::new(ErrorKind::TooSmall, src));
    }
    let minutes = u32::from_le_bytes([rest[0], rest[1], rest[2], 0]);
    let date = if minutes == 0 {
        BoardDate::Unspecified
    } else {
        BoardDate::Fixed(fru_epoch() + chrono::Duration::minutes(minutes as i64))
    };

    let (mandatory, consumed) = decode_mandatory_fields(&rest[3..], BoardArea::FIELD_COUNT, src)?;
    let custom = decode_custom_fields(&rest[3 + consumed..], src, ignore_aeof)?;
    Ok(BoardArea {
        lang,
        date,
        manufacturer: mandatory[0].clone(),
        product_name: mandatory[1].clone(),
        serial: mandatory[2].clone(),
        part_number: mandatory[3].clone(),
        fru_file_id: mandatory[4].clone(),
        custom,
    })
}

/// Encodes the Board Information Area. `now` resolves `BoardDate::Auto`
/// and is supplied by the caller (one `Utc::now()` per save, for
/// consistency across the whole file).
pub fn encode_board(area: &BoardArea, now: DateTime<Utc>) -> Result<Vec<u8>, Error> {
    let src = ErrorSource::Area(AreaTag::Board);
    let minutes: u32 = match area.date {
        BoardDate::Unspecified => 0,
        BoardDate::Auto | BoardDate::Fixed(_) => {
            let when = match area.date {
                BoardDate::Fixed(dt) => dt,
                _ => now,
            };
            let delta = when.signed_duration_since(fru_epoch()).num_minutes();
            if delta < 1 || delta > 0x00FF_FFFF {
                return Err(Error::new(ErrorKind::BoardDate, src));
            }
            delta as u32
        }
    };

    let mut body = vec![VERSION, 0, area.lang];
    body.extend_from_slice(&minutes.to_le_bytes()[0..3]);
    body.extend_from_slice(&encode_fields(
        &[
            &area.manufacturer,
            &area.product_name,
            &area.serial,
            &area.part_number,
            &area.fru_file_id,
        ],
        src,
    )?);
    let custom_refs: Vec<&Field> = area.custom.iter().collect();
    body.extend_from_slice(&encode_fields(&custom_refs, src)?);
    Ok(finish_area(body))
}

/// Validates and strips the common 3-byte info-area header
/// (`ver`/`blocks`/`langtype`), returning `(blocks, langtype, rest)` where
/// `rest` is the area's declared size minus the header and minus the
/// trailing checksum byte.
fn decode_info_header(
    data: &[u8],
    src: ErrorSource,
    ignore_aver: bool,
    ignore_acksum: bool,
) -> Result<(usize, u8, &[u8]), Error> {
    const HEADER_LEN: usize = 3;
    if data.len() < HEADER_LEN {
        return Err(Error::new(ErrorKind::TooSmall, src));
    }
    if data[0] & 0x0F != VERSION && !ignore_aver {
        return Err(Error::new(ErrorKind::AreaVersion, src));
    }
    let blocks = data[1] as usize;
    let total_len = blocks * BLOCK_SZ;
    if total_len == 0 || data.len() < total_len {
        return Err(Error::new(ErrorKind::HeaderBadPointer, src));
    }
    if !ignore_acksum && !crate::checksum::verify(&data[..total_len]) {
        return Err(Error::new(ErrorKind::AreaChecksum, src));
    }
    let langtype = data[2];
    Ok((blocks, langtype, &data[HEADER_LEN..total_len - 1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_use_round_trips() {
        let area = InternalArea { data: "DEADBEEF".into() };
        let encoded = encode_internal(&area).unwrap();
        assert_eq!(encoded.len() % BLOCK_SZ, 0);
        let decoded = decode_internal(&encoded, false).unwrap();
        assert_eq!(decoded.data, "DEADBEEF");
    }

    #[test]
    fn chassis_round_trips_with_custom_fields() {
        let mut area = ChassisArea {
            chassis_type: 0x17,
            part_number: Field::text("PN-001"),
            serial: Field::text("SN-001"),
            custom: vec![Field::text("extra")],
        };
        let encoded = encode_chassis(&area).unwrap();
        assert_eq!(encoded.len() % BLOCK_SZ, 0);
        let decoded = decode_chassis(&encoded, false, false, false).unwrap();
        assert_eq!(decoded.chassis_type, area.chassis_type);
        assert_eq!(decoded.part_number.val, "PN-001");
        assert_eq!(decoded.serial.val, "SN-001");
        assert_eq!(decoded.custom.len(), 1);
        assert_eq!(decoded.custom[0].val, "extra");
        area.custom.clear();
    }

    #[test]
    fn board_date_round_trips() {
        let area = BoardArea {
            lang: 0,
            date: BoardDate::Fixed(fru_epoch() + chrono::Duration::minutes(1000)),
            manufacturer: Field::text("Acme"),
            product_name: Field::text("Widget"),
            serial: Field::text("SN"),
            part_number: Field::text("PN"),
            fru_file_id: Field::empty(),
            custom: vec![],
        };
        let encoded = encode_board(&area, Utc::now()).unwrap();
        let decoded = decode_board(&encoded, false, false, false).unwrap();
        assert_eq!(decoded.date, area.date);
        assert_eq!(decoded.manufacturer.val, "Acme");
    }

    #[test]
    fn unspecified_board_date_encodes_as_zero() {
        let area = BoardArea {
            lang: 0,
            date: BoardDate::Unspecified,
            manufacturer: Field::empty(),
            product_name: Field::empty(),
            serial: Field::empty(),
            part_number: Field::empty(),
            fru_file_id: Field::empty(),
            custom: vec![],
        };
        let encoded = encode_board(&area, Utc::now()).unwrap();
        assert_eq!(&encoded[3..6], &[0, 0, 0]);
        let decoded = decode_board(&encoded, false, false, false).unwrap();
        assert_eq!(decoded.date, BoardDate::Unspecified);
    }

    #[test]
    fn corrupted_area_checksum_is_rejected() {
        let area = ChassisArea {
            chassis_type: 1,
            part_number: Field::text("A"),
            serial: Field::text("B"),
            custom: vec![],
        };
        let mut encoded = encode_chassis(&area).unwrap();
        let last = encoded.len() - 1;
        encoded[last] ^= 0xFF;
        assert_eq!(
            decode_chassis(&encoded, false, false, false).unwrap_err().kind,
            ErrorKind::AreaChecksum
        );
    }
}
