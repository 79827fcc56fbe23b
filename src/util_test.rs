use std::{
    fs,
    io::{Read, Seek, SeekFrom, Write},
};

use super::*;

#[test]
fn test_open_file_rw() {
    // case 1: invalid parent directory.
    let fd = open_file_w("", false);
    assert!(fd.is_err());

    // case 2: valid file, reuse: false, fresh create.
    let mut path = std::env::temp_dir();
    path.push("nvmdb.util.open_file_rw.txt");
    let file = path.as_path().to_str().unwrap().to_string();

    fs::remove_file(&file).ok();

    let mut fd = open_file_w(&file, false).expect("open-write");
    fd.write_all(b"hello world").expect("write failed");
    fd.seek(SeekFrom::Start(1)).expect("seek failed");
    fd.write_all(b"i world").expect("write failed");

    let txt = fs::read(&file).expect("read failed");
    assert_eq!(std::str::from_utf8(&txt).unwrap(), "hello worldi world");

    // case 3: reuse: false again recreates (truncates the stale file).
    let mut fd = open_file_w(&file, false).expect("open-write");
    fd.write_all(b"fresh").expect("write failed");
    let txt = fs::read(&file).expect("read failed");
    assert_eq!(std::str::from_utf8(&txt).unwrap(), "fresh");

    // case 4: reuse: true appends.
    let mut fd = open_file_w(&file, true).expect("open-write");
    fd.write_all(b" more").expect("write failed");
    let txt = fs::read(&file).expect("read failed");
    assert_eq!(std::str::from_utf8(&txt).unwrap(), "fresh more");

    // case 5: read file, read-only handle rejects writes.
    let mut fd = open_file_r(&file).expect("open-read");
    let mut buf = [0_u8; 10];
    fd.read_exact(&mut buf).expect("read failed");
    assert_eq!(std::str::from_utf8(&buf).unwrap(), "fresh more");

    fd.seek(SeekFrom::Start(0)).expect("seek failed");
    assert!(fd.write_all(b"x").is_err());

    fs::remove_file(&file).ok();
}

#[test]
fn test_try_convert_int() {
    let n: Result<u8, Error> = try_convert_int::<i32, u8>(10, "u8");
    assert_eq!(n.unwrap(), 10u8);

    let n: Result<u8, Error> = try_convert_int::<i32, u8>(300, "u8");
    assert!(n.is_err());
}

#[test]
fn test_read_buffer() {
    let mut path = std::env::temp_dir();
    path.push("nvmdb.util.read_buffer.txt");
    let file = path.as_path().to_str().unwrap().to_string();
    fs::remove_file(&file).ok();

    let mut fd = open_file_w(&file, false).expect("open-write");
    fd.write_all(b"0123456789").expect("write failed");

    let buf = read_buffer(&mut fd, 2, 4, "test").expect("read_buffer");
    assert_eq!(buf, b"2345");

    let err = read_buffer(&mut fd, 2, 100, "test").expect_err("expected partial read");
    assert!(matches!(err, Error::PartialRead(_, _, _)));

    fs::remove_file(&file).ok();
}
