//! The decoded FRU model: areas, ordering, lifecycle, and the public
//! record-level operations (get/add/delete on fields, custom fields and
//! multirecord records).

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{Error, ErrorKind, ErrorSource};
use crate::field::{Encoding, Field};
use crate::mr::Record;

/// Tags the five FRU areas. Discriminants match the byte offsets of the
/// corresponding pointer fields in the file header (§ file format) and
/// must be preserved for interoperability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AreaTag {
    Internal = 0,
    Chassis = 1,
    Board = 2,
    Product = 3,
    Mr = 4,
}

impl AreaTag {
    pub const ALL: [AreaTag; 5] = [
        AreaTag::Internal,
        AreaTag::Chassis,
        AreaTag::Board,
        AreaTag::Product,
        AreaTag::Mr,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for AreaTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AreaTag::Internal => "internal",
            AreaTag::Chassis => "chassis",
            AreaTag::Board => "board",
            AreaTag::Product => "product",
            AreaTag::Mr => "multirecord",
        };
        f.write_str(s)
    }
}

/// Where to insert an area being enabled, relative to the areas already
/// enabled in `order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    First,
    Last,
    /// Insert in the natural `AreaTag` order relative to other present areas.
    Auto,
    /// Insert immediately after `AreaTag` if it is present; falls back to
    /// `Auto` otherwise.
    After(AreaTag),
}

pub(crate) fn fru_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1996, 1, 1, 0, 0, 0).unwrap()
}

/// The board area's manufacturing date/time: unspecified, auto-substituted
/// at save time with the current UTC time, or a fixed timestamp. This
/// collapses the source's `{tv: timestamp, tv_auto: bool}` pair into one
/// tri-state value (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BoardDate {
    Unspecified,
    Auto,
    Fixed(DateTime<Utc>),
}

impl Default for BoardDate {
    fn default() -> Self {
        BoardDate::Unspecified
    }
}

pub const MAX_CUSTOM_FIELDS: usize = 64;

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InternalArea {
    /// Uppercase hex string, even length; empty when the area carries no
    /// payload bytes.
    pub data: String,
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChassisArea {
    pub chassis_type: u8,
    pub part_number: Field,
    pub serial: Field,
    pub custom: Vec<Field>,
}

impl ChassisArea {
    pub(crate) fn mandatory(&self, index: usize) -> Result<&Field, Error> {
        match index {
            0 => Ok(&self.part_number),
            1 => Ok(&self.serial),
            _ => Err(Error::with_index(ErrorKind::NoField, ErrorSource::Area(AreaTag::Chassis), index)),
        }
    }

    pub(crate) fn mandatory_mut(&mut self, index: usize) -> Result<&mut Field, Error> {
        match index {
            0 => Ok(&mut self.part_number),
            1 => Ok(&mut self.serial),
            _ => Err(Error::with_index(ErrorKind::NoField, ErrorSource::Area(AreaTag::Chassis), index)),
        }
    }

    pub(crate) const FIELD_COUNT: usize = 2;
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoardArea {
    pub lang: u8,
    pub date: BoardDate,
    pub manufacturer: Field,
    pub product_name: Field,
    pub serial: Field,
    pub part_number: Field,
    pub fru_file_id: Field,
    pub custom: Vec<Field>,
}

impl BoardArea {
    pub(crate) fn mandatory(&self, index: usize) -> Result<&Field, Error> {
        match index {
            0 => Ok(&self.manufacturer),
            1 => Ok(&self.product_name),
            2 => Ok(&self.serial),
            3 => Ok(&self.part_number),
            4 => Ok(&self.fru_file_id),
            _ => Err(Error::with_index(ErrorKind::NoField, ErrorSource::Area(AreaTag::Board), index)),
        }
    }

    pub(crate) fn mandatory_mut(&mut self, index: usize) -> Result<&mut Field, Error> {
        match index {
            0 => Ok(&mut self.manufacturer),
            1 => Ok(&mut self.product_name),
            2 => Ok(&mut self.serial),
            3 => Ok(&mut self.part_number),
            4 => Ok(&mut self.fru_file_id),
            _ => Err(Error::with_index(ErrorKind::NoField, ErrorSource::Area(AreaTag::Board), index)),
        }
    }

    pub(crate) const FIELD_COUNT: usize = 5;
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProductArea {
    pub lang: u8,
    pub manufacturer: Field,
    pub product_name: Field,
    pub model_part_number: Field,
    pub version: Field,
    pub serial: Field,
    pub asset_tag: Field,
    pub fru_file_id: Field,
    pub custom: Vec<Field>,
}

impl ProductArea {
    pub(crate) fn mandatory(&self, index: usize) -> Result<&Field, Error> {
        match index {
            0 => Ok(&self.manufacturer),
            1 => Ok(&self.product_name),
            2 => Ok(&self.model_part_number),
            3 => Ok(&self.version),
            4 => Ok(&self.serial),
            5 => Ok(&self.asset_tag),
            6 => Ok(&self.fru_file_id),
            _ => Err(Error::with_index(ErrorKind::NoField, ErrorSource::Area(AreaTag::Product), index)),
        }
    }

    pub(crate) fn mandatory_mut(&mut self, index: usize) -> Result<&mut Field, Error> {
        match index {
            0 => Ok(&mut self.manufacturer),
            1 => Ok(&mut self.product_name),
            2 => Ok(&mut self.model_part_number),
            3 => Ok(&mut self.version),
            4 => Ok(&mut self.serial),
            5 => Ok(&mut self.asset_tag),
            6 => Ok(&mut self.fru_file_id),
            _ => Err(Error::with_index(ErrorKind::NoField, ErrorSource::Area(AreaTag::Product), index)),
        }
    }

    pub(crate) const FIELD_COUNT: usize = 7;
}

/// The owned, decoded FRU record. Created by [`Fru::new`] (all areas
/// disabled) or by [`crate::file::load`] (populated from a buffer).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Fru {
    pub internal: InternalArea,
    pub chassis: ChassisArea,
    pub board: BoardArea,
    pub product: ProductArea,
    pub mr: Vec<Record>,
    present: [bool; 5],
    order: [AreaTag; 5],
}

impl Default for Fru {
    fn default() -> Self {
        Fru::new()
    }
}

impl Fru {
    /// Creates an empty instance: every area absent, default natural order.
    pub fn new() -> Self {
        Fru {
            internal: InternalArea::default(),
            chassis: ChassisArea::default(),
            board: BoardArea::default(),
            product: ProductArea::default(),
            mr: Vec::new(),
            present: [false; 5],
            order: AreaTag::ALL,
        }
    }

    pub fn is_present(&self, area: AreaTag) -> bool {
        self.present[area.index()]
    }

    pub fn order(&self) -> &[AreaTag; 5] {
        &self.order
    }

    /// Rebuilds `present`/`order` from scratch; used by the file decoder,
    /// which determines on-disk order from area offsets rather than
    /// incrementally enabling areas.
    pub(crate) fn set_order_and_presence(&mut self, order: [AreaTag; 5], present: [bool; 5]) {
        self.order = order;
        self.present = present;
    }

    fn present_sequence(&self) -> Vec<AreaTag> {
        self.order.iter().copied().filter(|a| self.present[a.index()]).collect()
    }

    fn rebuild_order(&mut self, present_sequence: Vec<AreaTag>) {
        let absent: Vec<AreaTag> = AreaTag::ALL
            .into_iter()
            .filter(|a| !present_sequence.contains(a))
            .collect();
        let mut order = [AreaTag::Internal; 5];
        for (slot, tag) in order.iter_mut().zip(absent.into_iter().chain(present_sequence)) {
            *slot = tag;
        }
        self.order = order;
    }

    /// Inserts an absent area into `order` at `position` and marks it present.
    pub fn enable(&mut self, area: AreaTag, position: InsertPosition) -> Result<(), Error> {
        if self.present[area.index()] {
            return Err(Error::new(ErrorKind::AreaEnabled, ErrorSource::Area(area)));
        }

        let mut seq = self.present_sequence();
        let insert_at = match position {
            InsertPosition::First => 0,
            InsertPosition::Last => seq.len(),
            InsertPosition::Auto => seq.iter().filter(|&&a| a < area).count(),
            InsertPosition::After(after) => match seq.iter().position(|&a| a == after) {
                Some(pos) => pos + 1,
                None => seq.iter().filter(|&&a| a < area).count(),
            },
        };
        seq.insert(insert_at, area);
        self.present[area.index()] = true;
        self.rebuild_order(seq);
        Ok(())
    }

    /// Removes an area from the present set; its data is retained and will
    /// reappear unchanged if the area is re-enabled.
    pub fn disable(&mut self, area: AreaTag) -> Result<(), Error> {
        if !self.present[area.index()] {
            return Err(Error::new(ErrorKind::AreaDisabled, ErrorSource::Area(area)));
        }
        let mut seq = self.present_sequence();
        seq.retain(|&a| a != area);
        self.present[area.index()] = false;
        self.rebuild_order(seq);
        Ok(())
    }

    /// `disable` then `enable` at the new position.
    pub fn move_area(&mut self, area: AreaTag, position: InsertPosition) -> Result<(), Error> {
        self.disable(area)?;
        self.enable(area, position)
    }

    fn check_enabled(&self, area: AreaTag) -> Result<(), Error> {
        if self.present[area.index()] {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::AreaDisabled, ErrorSource::Area(area)))
        }
    }

    /// Returns the borrowed mandatory field at `index` within `area`
    /// (§3's per-area field list order).
    pub fn get_field(&self, area: AreaTag, index: usize) -> Result<&Field, Error> {
        self.check_enabled(area)?;
        match area {
            AreaTag::Chassis => self.chassis.mandatory(index),
            AreaTag::Board => self.board.mandatory(index),
            AreaTag::Product => self.product.mandatory(index),
            AreaTag::Internal | AreaTag::Mr => {
                Err(Error::new(ErrorKind::AreaNotSupported, ErrorSource::Area(area)))
            }
        }
    }

    /// Sets the mandatory field at `index`, resolving `enc` (which may be
    /// `Auto`/`Preserve`) against the field's current encoding.
    pub fn set_field(&mut self, area: AreaTag, index: usize, enc: Encoding, value: &str) -> Result<(), Error> {
        self.check_enabled(area)?;
        let slot = match area {
            AreaTag::Chassis => self.chassis.mandatory_mut(index)?,
            AreaTag::Board => self.board.mandatory_mut(index)?,
            AreaTag::Product => self.product.mandatory_mut(index)?,
            AreaTag::Internal | AreaTag::Mr => {
                return Err(Error::new(ErrorKind::AreaNotSupported, ErrorSource::Area(area)))
            }
        };
        // Encode now, so failures surface at set_field() time rather than
        // silently at save() time; the resolved encoding is whatever the
        // encoder actually used, which matters for Auto/Preserve.
        let (_, resolved_enc) = crate::field::encode_field(value, enc, slot.enc, ErrorSource::Area(area), index)?;
        slot.val = value.to_string();
        slot.enc = resolved_enc;
        Ok(())
    }

    fn custom_list_mut(&mut self, area: AreaTag) -> Result<&mut Vec<Field>, Error> {
        match area {
            AreaTag::Chassis => Ok(&mut self.chassis.custom),
            AreaTag::Board => Ok(&mut self.board.custom),
            AreaTag::Product => Ok(&mut self.product.custom),
            AreaTag::Internal | AreaTag::Mr => {
                Err(Error::new(ErrorKind::AreaNotSupported, ErrorSource::Area(area)))
            }
        }
    }

    fn custom_list(&self, area: AreaTag) -> Result<&Vec<Field>, Error> {
        match area {
            AreaTag::Chassis => Ok(&self.chassis.custom),
            AreaTag::Board => Ok(&self.board.custom),
            AreaTag::Product => Ok(&self.product.custom),
            AreaTag::Internal | AreaTag::Mr => {
                Err(Error::new(ErrorKind::AreaNotSupported, ErrorSource::Area(area)))
            }
        }
    }

    /// Inserts a custom field at `index`, appending when `index` exceeds
    /// the list's current length. `field.enc` is resolved against itself
    /// (an `Auto`/`Preserve` input has no prior real encoding to preserve),
    /// the same way `set_field` resolves a mandatory field.
    pub fn add_custom(&mut self, area: AreaTag, index: usize, field: Field) -> Result<(), Error> {
        self.check_enabled(area)?;
        let list_len = self.custom_list(area)?.len();
        if list_len >= MAX_CUSTOM_FIELDS {
            return Err(Error::new(ErrorKind::TooBig, ErrorSource::Area(area)));
        }
        let (_, resolved_enc) = crate::field::encode_field(&field.val, field.enc, field.enc, ErrorSource::Area(area), index)?;
        let resolved = Field::new(resolved_enc, field.val);
        let list = self.custom_list_mut(area)?;
        let at = index.min(list.len());
        list.insert(at, resolved);
        Ok(())
    }

    pub fn get_custom(&self, area: AreaTag, index: usize) -> Result<&Field, Error> {
        self.check_enabled(area)?;
        self.custom_list(area)?
            .get(index)
            .ok_or_else(|| Error::with_index(ErrorKind::NoField, ErrorSource::Area(area), index))
    }

    pub fn delete_custom(&mut self, area: AreaTag, index: usize) -> Result<Field, Error> {
        self.check_enabled(area)?;
        let list = self.custom_list_mut(area)?;
        if index >= list.len() {
            return Err(Error::with_index(ErrorKind::NoField, ErrorSource::Area(area), index));
        }
        Ok(list.remove(index))
    }

    pub fn add_mr(&mut self, index: usize, record: Record) -> Result<(), Error> {
        self.check_enabled(AreaTag::Mr)?;
        let at = index.min(self.mr.len());
        self.mr.insert(at, record);
        Ok(())
    }

    pub fn get_mr(&self, index: usize) -> Result<&Record, Error> {
        self.check_enabled(AreaTag::Mr)?;
        self.mr
            .get(index)
            .ok_or_else(|| Error::with_index(ErrorKind::NoRecord, ErrorSource::Area(AreaTag::Mr), index))
    }

    /// Finds the next record of `rec_type` at or after `*index`, advancing
    /// `*index` to one past the match on success.
    pub fn find_mr(&self, rec_type: u8, index: &mut usize) -> Result<&Record, Error> {
        self.check_enabled(AreaTag::Mr)?;
        for (i, rec) in self.mr.iter().enumerate().skip(*index) {
            if rec.record_type() == rec_type {
                *index = i + 1;
                return Ok(rec);
            }
        }
        Err(Error::new(ErrorKind::NoRecord, ErrorSource::Area(AreaTag::Mr)))
    }

    pub fn replace_mr(&mut self, index: usize, record: Record) -> Result<(), Error> {
        self.check_enabled(AreaTag::Mr)?;
        let slot = self
            .mr
            .get_mut(index)
            .ok_or_else(|| Error::with_index(ErrorKind::NoRecord, ErrorSource::Area(AreaTag::Mr), index))?;
        *slot = record;
        Ok(())
    }

    pub fn delete_mr(&mut self, index: usize) -> Result<Record, Error> {
        self.check_enabled(AreaTag::Mr)?;
        if index >= self.mr.len() {
            return Err(Error::with_index(ErrorKind::NoRecord, ErrorSource::Area(AreaTag::Mr), index));
        }
        Ok(self.mr.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_instance_has_every_area_disabled() {
        let fru = Fru::new();
        for area in AreaTag::ALL {
            assert!(!fru.is_present(area));
        }
    }

    #[test]
    fn enable_last_appends_to_present_suffix() {
        let mut fru = Fru::new();
        fru.enable(AreaTag::Board, InsertPosition::Last).unwrap();
        fru.enable(AreaTag::Chassis, InsertPosition::Last).unwrap();
        let seq = fru.present_sequence();
        assert_eq!(seq, vec![AreaTag::Board, AreaTag::Chassis]);
        // Absent areas cluster at the front of order.
        let order = fru.order();
        assert_eq!(&order[2..], &[AreaTag::Board, AreaTag::Chassis]);
    }

    #[test]
    fn double_enable_fails() {
        let mut fru = Fru::new();
        fru.enable(AreaTag::Chassis, InsertPosition::Last).unwrap();
        assert_eq!(
            fru.enable(AreaTag::Chassis, InsertPosition::Last).unwrap_err().kind,
            ErrorKind::AreaEnabled
        );
    }

    #[test]
    fn disable_absent_fails() {
        let mut fru = Fru::new();
        assert_eq!(
            fru.disable(AreaTag::Chassis).unwrap_err().kind,
            ErrorKind::AreaDisabled
        );
    }

    #[test]
    fn disable_then_enable_preserves_data() {
        let mut fru = Fru::new();
        fru.enable(AreaTag::Chassis, InsertPosition::Last).unwrap();
        fru.set_field(AreaTag::Chassis, 0, Encoding::Text, "PN-1").unwrap();
        fru.disable(AreaTag::Chassis).unwrap();
        fru.enable(AreaTag::Chassis, InsertPosition::Last).unwrap();
        assert_eq!(fru.get_field(AreaTag::Chassis, 0).unwrap().val, "PN-1");
    }

    #[test]
    fn mutating_disabled_area_fails_without_mutation() {
        let mut fru = Fru::new();
        assert_eq!(
            fru.set_field(AreaTag::Chassis, 0, Encoding::Text, "x").unwrap_err().kind,
            ErrorKind::AreaDisabled
        );
    }

    #[test]
    fn add_custom_out_of_range_appends() {
        let mut fru = Fru::new();
        fru.enable(AreaTag::Board, InsertPosition::Last).unwrap();
        fru.add_custom(AreaTag::Board, 999, Field::text("a")).unwrap();
        fru.add_custom(AreaTag::Board, 999, Field::text("b")).unwrap();
        assert_eq!(fru.get_custom(AreaTag::Board, 0).unwrap().val, "a");
        assert_eq!(fru.get_custom(AreaTag::Board, 1).unwrap().val, "b");
    }
}
