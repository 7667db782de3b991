use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// New complete lines read past a byte offset.
#[derive(Debug)]
pub struct TailRead {
    pub lines: Vec<String>,
    /// Byte position just past the last consumed line terminator. Never less
    /// than the offset that was passed in.
    pub new_offset: u64,
}

/// Read everything appended after `offset`, split into complete lines.
///
/// A trailing fragment without its newline is left for the next pass: the
/// writer may be mid-append, and half a JSON object is worse than a late one.
/// Blank lines are dropped. Bytes are decoded lossily as UTF-8.
pub fn read_from_offset(path: &Path, offset: u64) -> std::io::Result<TailRead> {
    let mut file = std::fs::File::open(path)?;
    let len = file.metadata()?.len();

    // Journals are append-only; a shorter file than our cursor means someone
    // else rewrote it. Hold position rather than re-ingest garbage.
    if len <= offset {
        return Ok(TailRead {
            lines: Vec::new(),
            new_offset: offset,
        });
    }

    file.seek(SeekFrom::Start(offset))?;
    let mut buf = Vec::with_capacity((len - offset) as usize);
    file.read_to_end(&mut buf)?;

    let Some(last_newline) = buf.iter().rposition(|&b| b == b'\n') else {
        return Ok(TailRead {
            lines: Vec::new(),
            new_offset: offset,
        });
    };

    let complete = &buf[..=last_newline];
    let lines = String::from_utf8_lossy(complete)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    Ok(TailRead {
        lines,
        new_offset: offset + last_newline as u64 + 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_appended_lines_incrementally() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("s.jsonl");
        std::fs::write(&path, "{\"a\":1}\n{\"b\":2}\n").unwrap();

        let first = read_from_offset(&path, 0).unwrap();
        assert_eq!(first.lines, vec!["{\"a\":1}", "{\"b\":2}"]);

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"c\":3}\n").unwrap();

        let second = read_from_offset(&path, first.new_offset).unwrap();
        assert_eq!(second.lines, vec!["{\"c\":3}"]);
        assert_eq!(
            second.new_offset,
            std::fs::metadata(&path).unwrap().len()
        );
    }

    #[test]
    fn partial_trailing_line_waits_for_its_newline() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("s.jsonl");
        std::fs::write(&path, "{\"a\":1}\n{\"част").unwrap();

        let read = read_from_offset(&path, 0).unwrap();
        assert_eq!(read.lines, vec!["{\"a\":1}"]);
        assert_eq!(read.new_offset, "{\"a\":1}\n".len() as u64);

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all("ично\":2}\n".as_bytes()).unwrap();

        let rest = read_from_offset(&path, read.new_offset).unwrap();
        assert_eq!(rest.lines, vec!["{\"частично\":2}"]);
    }

    #[test]
    fn shrunken_file_holds_position() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("s.jsonl");
        std::fs::write(&path, "{\"a\":1}\n").unwrap();

        let read = read_from_offset(&path, 100).unwrap();
        assert!(read.lines.is_empty());
        assert_eq!(read.new_offset, 100);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("s.jsonl");
        std::fs::write(&path, "{\"a\":1}\n\n  \n{\"b\":2}\n").unwrap();

        let read = read_from_offset(&path, 0).unwrap();
        assert_eq!(read.lines.len(), 2);
    }
}
