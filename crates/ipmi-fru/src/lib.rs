//! Read, write and manipulate IPMI Platform Management FRU Information
//! Storage records (IPMI FRU Information Storage Definition v1.0, rev 1.3).
//!
//! The entry points are [`file::load`]/[`file::load_with_flags`] (binary ->
//! [`model::Fru`]) and [`file::save`] ([`model::Fru`] -> binary). Once
//! loaded, [`model::Fru`] exposes area enable/disable/move and field/record
//! get/set/add/delete operations.

pub mod area;
pub mod checksum;
pub mod error;
pub mod field;
pub mod file;
pub mod hex;
pub mod model;
pub mod mr;

pub use error::{last_error, clear_error, Error, ErrorKind, ErrorSource, Result};
pub use field::{Encoding, Field};
pub use file::{load, load_with_flags, save, DecodeFlags, MAX_FILE_SIZE};
pub use model::{AreaTag, BoardArea, BoardDate, ChassisArea, Fru, InsertPosition, InternalArea, ProductArea};
pub use mr::{ManagementRecord, ManagementSubtype, RawEncoding, Record};
