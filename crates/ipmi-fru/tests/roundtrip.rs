use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;

use ipmi_fru::{AreaTag, BoardDate, DecodeFlags, Encoding, Field, Fru, InsertPosition, ManagementRecord, Record};

fn fru_epoch() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(1996, 1, 1, 0, 0, 0).unwrap()
}

fn minimal_board_fru() -> Fru {
    let mut fru = Fru::new();
    fru.enable(AreaTag::Board, InsertPosition::Last).unwrap();
    fru.board.lang = 25;
    fru.board.date = BoardDate::Auto;
    fru
}

/// S1 — an instance with only the board area enabled and every mandatory
/// field left empty saves to exactly two 8-byte blocks.
#[test]
fn empty_minimal_fru_is_two_blocks() {
    let fru = minimal_board_fru();
    let bytes = ipmi_fru::save(&fru).unwrap();
    assert_eq!(bytes.len(), 16);
    assert_eq!(bytes[0], 1); // header version
    assert_eq!(bytes[1], 0); // internal offset, absent
    assert_eq!(bytes[3], 1); // board offset, block 1
    assert_eq!(&[bytes[2], bytes[4], bytes[5]], &[0, 0, 0]); // chassis/product/mr offsets
}

/// S3 — a SystemUUID management record round-trips through save/load with
/// the SMBIOS byte swap and the end-of-list bit set.
#[test]
fn system_uuid_mr_round_trips_through_save_load() {
    let uuid = "01234567-89AB-CDEF-0123-456789ABCDEF";
    let mut fru = Fru::new();
    fru.enable(AreaTag::Mr, InsertPosition::Last).unwrap();
    fru.add_mr(0, Record::system_uuid(uuid).unwrap()).unwrap();

    let bytes = ipmi_fru::save(&fru).unwrap();
    let loaded = ipmi_fru::load(&bytes).unwrap();
    assert_eq!(loaded.mr.len(), 1);
    assert_eq!(loaded.mr[0].as_uuid().unwrap().to_uppercase(), uuid.replace('-', ""));
}

/// S4 — board manufacturing date boundary: one minute past the FRU epoch,
/// and the zero/unspecified sentinel.
#[test]
fn board_date_boundaries() {
    let mut fru = Fru::new();
    fru.enable(AreaTag::Board, InsertPosition::Last).unwrap();
    fru.board.date = BoardDate::Fixed(fru_epoch() + chrono::Duration::minutes(1));
    let bytes = ipmi_fru::save(&fru).unwrap();
    let board_start = 8; // header occupies block 0, board starts at block 1
    assert_eq!(&bytes[board_start + 3..board_start + 6], &[0x01, 0x00, 0x00]);

    let mut unspec = Fru::new();
    unspec.enable(AreaTag::Board, InsertPosition::Last).unwrap();
    unspec.board.date = BoardDate::Unspecified;
    let bytes = ipmi_fru::save(&unspec).unwrap();
    assert_eq!(&bytes[board_start + 3..board_start + 6], &[0x00, 0x00, 0x00]);
}

/// S5 — `Auto` encoding picks the first encoding in the SixBitAscii ->
/// BcdPlus -> Binary -> Text chain that can represent the value.
#[test]
fn auto_encoding_picks_expected_codec_per_value() {
    let mut fru = Fru::new();
    fru.enable(AreaTag::Board, InsertPosition::Last).unwrap();

    fru.add_custom(AreaTag::Board, 0, Field::new(Encoding::Auto, "IPMI")).unwrap();
    assert_eq!(fru.get_custom(AreaTag::Board, 0).unwrap().enc, Encoding::SixBitAscii);

    fru.add_custom(AreaTag::Board, 1, Field::new(Encoding::Auto, "12-34")).unwrap();
    assert_eq!(fru.get_custom(AreaTag::Board, 1).unwrap().enc, Encoding::BcdPlus);

    fru.add_custom(AreaTag::Board, 2, Field::new(Encoding::Auto, "DEADBEEF")).unwrap();
    assert_eq!(fru.get_custom(AreaTag::Board, 2).unwrap().enc, Encoding::Binary);

    fru.add_custom(AreaTag::Board, 3, Field::new(Encoding::Auto, "Hello, world")).unwrap();
    assert_eq!(fru.get_custom(AreaTag::Board, 3).unwrap().enc, Encoding::Text);
}

/// S6 — a corrupted chassis-area checksum is rejected by default and
/// accepted under `IGNORE_AREA_CHECKSUM`.
#[test]
fn corrupted_chassis_checksum_is_rejected_then_tolerated() {
    let mut fru = Fru::new();
    fru.enable(AreaTag::Chassis, InsertPosition::Last).unwrap();
    fru.set_field(AreaTag::Chassis, 0, Encoding::Text, "PN-1").unwrap();
    fru.set_field(AreaTag::Chassis, 1, Encoding::Text, "SN-1").unwrap();

    let mut bytes = ipmi_fru::save(&fru).unwrap();
    let chassis_start = 8; // header at block 0, chassis at block 1
    let chassis_len = bytes.len() - chassis_start;
    bytes[chassis_start + chassis_len - 1] ^= 0xFF;

    let err = ipmi_fru::load(&bytes).unwrap_err();
    assert_eq!(err.kind, ipmi_fru::ErrorKind::AreaChecksum);
    assert_eq!(err.source, ipmi_fru::ErrorSource::Area(AreaTag::Chassis));

    let loaded = ipmi_fru::load_with_flags(&bytes, DecodeFlags::IGNORE_AREA_CHECKSUM).unwrap();
    assert!(loaded.is_present(AreaTag::Chassis));
}

/// Round-trip law 2: a strictly-valid buffer re-saves byte-identical under
/// the area order the decoder reconstructed.
#[test]
fn strict_buffer_resaves_byte_identical() {
    let mut fru = Fru::new();
    fru.enable(AreaTag::Chassis, InsertPosition::Last).unwrap();
    fru.set_field(AreaTag::Chassis, 0, Encoding::Text, "PN-1").unwrap();
    fru.set_field(AreaTag::Chassis, 1, Encoding::Text, "SN-1").unwrap();
    fru.enable(AreaTag::Product, InsertPosition::Last).unwrap();
    for i in 0..7 {
        fru.set_field(AreaTag::Product, i, Encoding::Text, "X").unwrap();
    }

    let original = ipmi_fru::save(&fru).unwrap();
    let decoded = ipmi_fru::load(&original).unwrap();
    let resaved = ipmi_fru::save(&decoded).unwrap();
    assert_eq!(resaved, original);
}

/// All five areas present; order reconstructed from on-disk offsets, and
/// every mandatory field survives the round trip.
#[test]
fn full_five_area_round_trip() {
    let mut fru = Fru::new();
    fru.enable(AreaTag::Internal, InsertPosition::Last).unwrap();
    fru.internal.data = "CAFEBABE".into();
    fru.enable(AreaTag::Chassis, InsertPosition::Last).unwrap();
    fru.set_field(AreaTag::Chassis, 0, Encoding::Text, "PN-1").unwrap();
    fru.set_field(AreaTag::Chassis, 1, Encoding::Text, "SN-1").unwrap();
    fru.enable(AreaTag::Board, InsertPosition::Last).unwrap();
    fru.set_field(AreaTag::Board, 0, Encoding::Text, "ACME").unwrap();
    for i in 1..5 {
        fru.set_field(AreaTag::Board, i, Encoding::Text, "X").unwrap();
    }
    fru.enable(AreaTag::Product, InsertPosition::Last).unwrap();
    for i in 0..7 {
        fru.set_field(AreaTag::Product, i, Encoding::Text, "Y").unwrap();
    }
    fru.enable(AreaTag::Mr, InsertPosition::Last).unwrap();
    fru.add_mr(0, Record::system_uuid("01234567-89AB-CDEF-0123-456789ABCDEF").unwrap()).unwrap();

    let bytes = ipmi_fru::save(&fru).unwrap();
    let loaded = ipmi_fru::load(&bytes).unwrap();
    assert_eq!(*loaded.order(), [AreaTag::Internal, AreaTag::Chassis, AreaTag::Board, AreaTag::Product, AreaTag::Mr]);
    assert_eq!(loaded.internal.data, "CAFEBABE");
    assert_eq!(loaded.get_field(AreaTag::Chassis, 0).unwrap().val, "PN-1");
    assert_eq!(loaded.get_field(AreaTag::Board, 0).unwrap().val, "ACME");
    assert_eq!(loaded.mr.len(), 1);
    assert!(matches!(&loaded.mr[0], Record::Management(ManagementRecord::SystemUuid(_))));
}
