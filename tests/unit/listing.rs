use crate::listing::{EntryKind, ListingParser, Medium};
use chrono::{TimeZone, Utc};

fn parse(lines: &[&str]) -> Vec<crate::listing::Stat> {
    let lines: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
    ListingParser::new().parse(&lines)
}

#[test]
fn basic_row_parses_to_file_entry() {
    let stats = parse(&[
        "-rw-r--r-- 1 alice staff 1024 Jan 02 03:04:05 2024 /root/file.txt",
    ]);
    assert_eq!(stats.len(), 1);
    let stat = &stats[0];
    assert_eq!(stat.name, "file.txt");
    assert_eq!(stat.kind, EntryKind::File);
    assert_eq!(stat.owner, "alice");
    assert_eq!(stat.group, "staff");
    assert_eq!(stat.size, 1024);
    assert_eq!(stat.nlink, 1);
    assert_eq!(stat.mode, 0o644);
    assert!(stat.can_read());
    assert!(stat.can_write());
    assert!(stat.cos.is_none());
    assert!(stat.level.is_none());
    assert_eq!(
        stat.time,
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    );
}

#[test]
fn extended_row_with_storage_block() {
    let stats = parse(&[
        "-rw-r----- 1 alice staff 4001 DISK 2048 Jun 30 12:00:00 2023 /archive/big.dat",
        "Storage  VV  Stripe",
        "  Level  Count Width  Bytes at Level",
        "-------------------------------------",
        "  0 (disk)   1    1   2048",
        "  1 (tape)   1    1   2048",
        "      Pos:  3+128  PV List: XV004800",
        "  2 (tape)   1    1   (no data at this level)",
        "",
    ]);
    assert_eq!(stats.len(), 1);
    let stat = &stats[0];
    assert_eq!(stat.name, "big.dat");
    assert_eq!(stat.cos, Some(4001));
    assert_eq!(stat.level.as_deref(), Some("disk"));
    assert_eq!(stat.size, 2048);
    assert_eq!(stat.mode, 0o640);

    assert_eq!(stat.storage.len(), 3);
    assert_eq!(stat.storage[0].medium, Medium::Disk);
    assert_eq!(stat.storage[0].bytes, 2048);
    assert_eq!(stat.storage[1].medium, Medium::Tape);
    assert_eq!(stat.storage[2].bytes, 0);

    // tier 0 and 1 hold full copies, tier 2 holds nothing
    assert!(stat.on_disk());
    assert!(stat.on_tape());
    assert!(!stat.is_migrated());

    let pos = stat.tape_position(1).expect("tape position");
    assert_eq!(pos.volume, "XV004800");
    assert_eq!(pos.section, 3);
    assert_eq!(pos.offset, 128);
    assert!(stat.tape_position(0).is_none());
    assert!(stat.tape_position(2).is_none());
}

#[test]
fn fully_migrated_file() {
    let stats = parse(&[
        "-rw-r--r-- 1 a b 4001 TAPE 512 Jan 02 03:04:05 2024 /archive/cold.bin",
        "Storage  VV  Stripe",
        "  0 (disk)   1    1   (no data at this level)",
        "  1 (tape)   1    1   512",
        "  2 (tape)   1    1   512",
        "",
    ]);
    let stat = &stats[0];
    assert_eq!(stat.level.as_deref(), Some("tape"));
    assert!(!stat.on_disk());
    assert!(stat.on_tape());
    assert!(stat.is_migrated());
}

#[test]
fn directories_are_always_resident() {
    let stats = parse(&[
        "drwxr-xr-x 2 alice staff 512 Jan 02 03:04:05 2024 /archive/data",
    ]);
    let stat = &stats[0];
    assert_eq!(stat.kind, EntryKind::Dir);
    assert_eq!(stat.name, "data");
    assert!(stat.storage.is_empty());
    assert!(stat.on_disk());
    assert!(stat.on_tape());
    assert!(stat.is_migrated());
    assert!(stat.tape_position(1).is_none());
}

#[test]
fn multiple_entries_keep_input_order() {
    let stats = parse(&[
        "drwxr-xr-x 2 a b 512 Jan 02 03:04:05 2024 /archive/sub",
        "-rw-r--r-- 1 a b 4001 DISK 10 Jan 02 03:04:05 2024 /archive/one",
        "Storage  VV  Stripe",
        "  0 (disk)   1    1   10",
        "",
        "-rw-r--r-- 1 a b 4001 DISK 20 Jan 02 03:04:05 2024 /archive/two",
        "Storage  VV  Stripe",
        "  0 (disk)   1    1   20",
        "",
    ]);
    let names: Vec<&str> = stats.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["sub", "one", "two"]);
    assert_eq!(stats[1].storage.len(), 1);
    assert_eq!(stats[2].storage[0].bytes, 20);
}

#[test]
fn junk_rows_are_skipped() {
    let stats = parse(&[
        "",
        "not a listing row",
        "-rw-r--r-- 1 a b not-a-size Jan 02 03:04:05 2024 /x",
        "-rw-r--r-- 1 a b 7 Jan 02 03:04:05 2024 /archive/ok",
    ]);
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].name, "ok");
}

#[test]
fn empty_input_yields_empty_output() {
    assert!(parse(&[]).is_empty());
}
