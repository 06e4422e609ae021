use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use ipmi_fru::{AreaTag, DecodeFlags, Encoding, Fru, RawEncoding, Record};

#[derive(Debug, Parser)]
#[command(name = "frutool", about = "Read, write and edit IPMI FRU Information Storage records")]
struct Args {
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Decode a binary FRU file and print it as text or JSON.
    Decode(DecodeArgs),
    /// Build a binary FRU file from a JSON template.
    Encode(EncodeArgs),
    /// Load a FRU file, apply one or more field/record edits, and re-emit it.
    Set(SetArgs),
}

#[derive(Debug, Parser)]
struct DecodeArgs {
    file: PathBuf,
    #[arg(long)]
    json: bool,
    #[arg(long)]
    ignore_checksums: bool,
    #[arg(long)]
    ignore_version: bool,
    #[arg(long)]
    relaxed: bool,
}

#[derive(Debug, Parser)]
struct EncodeArgs {
    template: PathBuf,
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Debug, Parser)]
struct SetArgs {
    file: PathBuf,
    #[arg(short, long)]
    output: PathBuf,
    #[arg(long = "set")]
    sets: Vec<String>,
    #[arg(long)]
    mr_uuid: Option<String>,
    #[arg(long)]
    board_date_unspec: bool,
    #[arg(long)]
    board_date: Option<String>,
    #[arg(long)]
    json: bool,
    #[arg(long)]
    text: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.quiet {
        log::LevelFilter::Error
    } else {
        match args.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };
    env_logger::Builder::new().filter_level(level).init();

    let result = match args.cmd {
        Command::Decode(a) => decode(a),
        Command::Encode(a) => encode(a),
        Command::Set(a) => set(a),
    };

    if let Err(e) = &result {
        eprintln!("frutool: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

fn leniency_flags(ignore_checksums: bool, ignore_version: bool, relaxed: bool) -> DecodeFlags {
    let mut flags = DecodeFlags::empty();
    if ignore_checksums {
        flags |= DecodeFlags::IGNORE_FILE_HEADER_CHECKSUM
            | DecodeFlags::IGNORE_AREA_CHECKSUM
            | DecodeFlags::IGNORE_RECORD_HEADER_CHECKSUM
            | DecodeFlags::IGNORE_RECORD_DATA_CHECKSUM;
    }
    if ignore_version {
        flags |= DecodeFlags::IGNORE_FILE_VERSION | DecodeFlags::IGNORE_AREA_VERSION | DecodeFlags::IGNORE_RECORD_VERSION;
    }
    if relaxed {
        flags |= DecodeFlags::IGNORE_AREA_EOF | DecodeFlags::IGNORE_MISSING_EOL | DecodeFlags::IGNORE_MR_DATA_LENGTH;
    }
    flags
}

fn decode(args: DecodeArgs) -> Result<()> {
    let buf = std::fs::read(&args.file).with_context(|| format!("reading {}", args.file.display()))?;
    let flags = leniency_flags(args.ignore_checksums, args.ignore_version, args.relaxed);
    let fru = ipmi_fru::load_with_flags(&buf, flags).map_err(|e| anyhow!("{e}"))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&fru)?);
    } else {
        print_text(&fru);
    }
    Ok(())
}

fn encode(args: EncodeArgs) -> Result<()> {
    let text = std::fs::read_to_string(&args.template).with_context(|| format!("reading {}", args.template.display()))?;
    let fru: Fru = serde_json::from_str(&text).context("parsing FRU JSON template")?;
    let bytes = ipmi_fru::save(&fru).map_err(|e| anyhow!("{e}"))?;
    std::fs::write(&args.output, bytes).with_context(|| format!("writing {}", args.output.display()))?;
    Ok(())
}

fn set(args: SetArgs) -> Result<()> {
    let raw = std::fs::read(&args.file).with_context(|| format!("reading {}", args.file.display()))?;
    let mut fru = load_binary_or_json(&raw)?;

    for assignment in &args.sets {
        apply_set(&mut fru, assignment)?;
    }

    if let Some(uuid) = &args.mr_uuid {
        set_mr_uuid(&mut fru, uuid)?;
    }

    if args.board_date_unspec {
        fru.board.date = ipmi_fru::BoardDate::Unspecified;
    } else if let Some(date) = &args.board_date {
        fru.board.date = ipmi_fru::BoardDate::Fixed(parse_board_date(date)?);
    }

    if args.json {
        std::fs::write(&args.output, serde_json::to_vec_pretty(&fru)?)?;
    } else if args.text {
        let mut out = Vec::new();
        print_text_to(&fru, &mut out);
        std::fs::write(&args.output, out)?;
    } else {
        let bytes = ipmi_fru::save(&fru).map_err(|e| anyhow!("{e}"))?;
        std::fs::write(&args.output, bytes)?;
    }
    Ok(())
}

fn load_binary_or_json(raw: &[u8]) -> Result<Fru> {
    if let Ok(text) = std::str::from_utf8(raw) {
        if let Ok(fru) = serde_json::from_str::<Fru>(text) {
            return Ok(fru);
        }
    }
    ipmi_fru::load(raw).map_err(|e| anyhow!("{e}"))
}

fn parse_board_date(s: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    let naive = chrono::NaiveDateTime::parse_from_str(s, "%d/%m/%Y %H:%M")
        .with_context(|| format!("expected DD/MM/YYYY HH:MM, got {s:?}"))?;
    Ok(chrono::DateTime::from_naive_utc_and_offset(naive, chrono::Utc))
}

fn set_mr_uuid(fru: &mut Fru, uuid: &str) -> Result<()> {
    let record = Record::system_uuid(uuid).map_err(|e| anyhow!("{e}"))?;
    let mut index = 0;
    match fru.find_mr(ipmi_fru::ManagementSubtype::SystemUuid as u8, &mut index) {
        Ok(_) => {
            fru.replace_mr(index - 1, record).map_err(|e| anyhow!("{e}"))?;
        }
        Err(_) => {
            fru.add_mr(usize::MAX, record).map_err(|e| anyhow!("{e}"))?;
        }
    }
    Ok(())
}

/// Parses `[<enc>:]<area>.<field>=<val>` and `[<enc>:]<area>.custom[.<n>]=<val>`.
fn apply_set(fru: &mut Fru, assignment: &str) -> Result<()> {
    let (lhs, value) = assignment.split_once('=').ok_or_else(|| anyhow!("expected <area>.<field>=<val>, got {assignment:?}"))?;

    let (enc, lhs) = match lhs.split_once(':') {
        Some((enc_str, rest)) => (parse_encoding(enc_str)?, rest),
        None => (Encoding::Preserve, lhs),
    };

    let mut parts = lhs.split('.');
    let area_str = parts.next().ok_or_else(|| anyhow!("missing area in {assignment:?}"))?;
    let field_str = parts.next().ok_or_else(|| anyhow!("missing field in {assignment:?}"))?;
    let area = parse_area(area_str)?;

    if field_str == "custom" || field_str.starts_with("custom.") {
        let index = match field_str.strip_prefix("custom.") {
            Some(n) => n.parse::<usize>().context("custom field index")?,
            None => usize::MAX,
        };
        fru.add_custom(area, index, ipmi_fru::Field::new(enc, value)).map_err(|e| anyhow!("{e}"))?;
        return Ok(());
    }

    let index = mandatory_field_index(area, field_str)?;
    fru.set_field(area, index, enc, value).map_err(|e| anyhow!("{e}"))?;
    Ok(())
}

fn parse_encoding(s: &str) -> Result<Encoding> {
    Ok(match s.to_ascii_lowercase().as_str() {
        "binary" => Encoding::Binary,
        "bcdplus" => Encoding::BcdPlus,
        "sixbit" | "6bit" => Encoding::SixBitAscii,
        "text" => Encoding::Text,
        "auto" => Encoding::Auto,
        other => bail!("unknown encoding {other:?}"),
    })
}

fn parse_area(s: &str) -> Result<AreaTag> {
    Ok(match s.to_ascii_lowercase().as_str() {
        "chassis" => AreaTag::Chassis,
        "board" => AreaTag::Board,
        "product" => AreaTag::Product,
        other => bail!("unknown or unsupported area {other:?}"),
    })
}

fn mandatory_field_index(area: AreaTag, name: &str) -> Result<usize> {
    let index = match (area, name) {
        (AreaTag::Chassis, "part_number") => 0,
        (AreaTag::Chassis, "serial") => 1,
        (AreaTag::Board, "manufacturer") => 0,
        (AreaTag::Board, "product_name") => 1,
        (AreaTag::Board, "serial") => 2,
        (AreaTag::Board, "part_number") => 3,
        (AreaTag::Board, "fru_file_id") => 4,
        (AreaTag::Product, "manufacturer") => 0,
        (AreaTag::Product, "product_name") => 1,
        (AreaTag::Product, "model_part_number") => 2,
        (AreaTag::Product, "version") => 3,
        (AreaTag::Product, "serial") => 4,
        (AreaTag::Product, "asset_tag") => 5,
        (AreaTag::Product, "fru_file_id") => 6,
        _ => bail!("unknown field {name:?} for {area} area"),
    };
    Ok(index)
}

fn print_text(fru: &Fru) {
    let mut out = Vec::new();
    print_text_to(fru, &mut out);
    print!("{}", String::from_utf8_lossy(&out));
}

fn print_text_to(fru: &Fru, out: &mut Vec<u8>) {
    use std::io::Write;
    for area in AreaTag::ALL {
        if !fru.is_present(area) {
            continue;
        }
        let _ = writeln!(out, "[{area}]");
        match area {
            AreaTag::Internal => {
                let _ = writeln!(out, "  data = {}", fru.internal.data);
            }
            AreaTag::Chassis => {
                let _ = writeln!(out, "  type = {}", fru.chassis.chassis_type);
                let _ = writeln!(out, "  part_number = {}", fru.chassis.part_number.val);
                let _ = writeln!(out, "  serial = {}", fru.chassis.serial.val);
                for (i, f) in fru.chassis.custom.iter().enumerate() {
                    let _ = writeln!(out, "  custom.{i} = {}", f.val);
                }
            }
            AreaTag::Board => {
                let _ = writeln!(out, "  date = {:?}", fru.board.date);
                let _ = writeln!(out, "  manufacturer = {}", fru.board.manufacturer.val);
                let _ = writeln!(out, "  product_name = {}", fru.board.product_name.val);
                let _ = writeln!(out, "  serial = {}", fru.board.serial.val);
                let _ = writeln!(out, "  part_number = {}", fru.board.part_number.val);
                let _ = writeln!(out, "  fru_file_id = {}", fru.board.fru_file_id.val);
                for (i, f) in fru.board.custom.iter().enumerate() {
                    let _ = writeln!(out, "  custom.{i} = {}", f.val);
                }
            }
            AreaTag::Product => {
                let _ = writeln!(out, "  manufacturer = {}", fru.product.manufacturer.val);
                let _ = writeln!(out, "  product_name = {}", fru.product.product_name.val);
                let _ = writeln!(out, "  model_part_number = {}", fru.product.model_part_number.val);
                let _ = writeln!(out, "  version = {}", fru.product.version.val);
                let _ = writeln!(out, "  serial = {}", fru.product.serial.val);
                let _ = writeln!(out, "  asset_tag = {}", fru.product.asset_tag.val);
                let _ = writeln!(out, "  fru_file_id = {}", fru.product.fru_file_id.val);
                for (i, f) in fru.product.custom.iter().enumerate() {
                    let _ = writeln!(out, "  custom.{i} = {}", f.val);
                }
            }
            AreaTag::Mr => {
                for (i, rec) in fru.mr.iter().enumerate() {
                    let rendered = match rec {
                        Record::Management(mgmt) => format!("{mgmt:?}"),
                        Record::Raw { enc: RawEncoding::Text, data, .. } => format!("text \"{data}\""),
                        Record::Raw { enc: RawEncoding::Binary, data, .. } => format!("hex {data}"),
                    };
                    let _ = writeln!(out, "  [{i}] type=0x{:02X} {rendered}", rec.record_type());
                }
            }
        }
    }
}
