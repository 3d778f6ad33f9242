use std::fs::File;

#[cfg(unix)]
pub fn file_read_at_exact(file: &File, pos: u64, buf: &mut [u8]) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;

    file.read_exact_at(buf, pos)
}

#[cfg(windows)]
pub fn file_read_at_exact(file: &File, mut pos: u64, mut buf: &mut [u8]) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;

    while !buf.is_empty() {
        match file.seek_read(buf, pos) {
            Ok(0) => break,
            Ok(n) => {
                buf = &mut buf[n..];
                pos += n as u64;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    if !buf.is_empty() {
        return Err(std::io::ErrorKind::UnexpectedEof.into());
    }
    Ok(())
}

/// Writes at most `buf.len()` bytes at `pos` in a single call and returns the
/// number of bytes the OS accepted.
///
/// A short write is reported to the caller rather than retried, so that the
/// completion of a submitted request can be checked against its length.
#[cfg(unix)]
pub fn file_write_once_at(file: &File, pos: u64, buf: &[u8]) -> std::io::Result<usize> {
    use std::os::unix::fs::FileExt;

    loop {
        match file.write_at(buf, pos) {
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            res => return res,
        }
    }
}

#[cfg(windows)]
pub fn file_write_once_at(file: &File, pos: u64, buf: &[u8]) -> std::io::Result<usize> {
    use std::os::windows::fs::FileExt;

    loop {
        match file.seek_write(buf, pos) {
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            res => return res,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_write_and_read() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("test.bin");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&path)
            .expect("create file");

        for i in 0..10u64 {
            let n = file_write_once_at(&file, i * 8, b"abcdefgh").expect("write_once_at");
            assert_eq!(n, 8);
        }
        assert_eq!(file_write_once_at(&file, 80, b"xy").expect("write_once_at"), 2);

        let mut buf = [0u8; 4];
        for pos in (0..80).step_by(8) {
            file_read_at_exact(&file, pos, &mut buf).expect("read_at");
            assert_eq!(&buf, b"abcd");
        }
        let err = file_read_at_exact(&file, 80, &mut buf).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }
}
