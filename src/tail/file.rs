//! A single followed file: offset, identity and the unterminated tail.

use std::fs::{self, File, Metadata};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Where reading begins when a file is first seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Start {
    Beginning,
    End,
    /// Replay the last N complete lines.
    Tail(usize),
}

pub(super) struct TailedFile {
    path: PathBuf,
    identity: Option<u64>,
    offset: u64,
    partial: Vec<u8>,
}

impl TailedFile {
    /// Open `path` and return any lines the start mode replays.
    pub fn open(path: &Path, start: Start) -> io::Result<(Self, Vec<String>)> {
        let metadata = fs::metadata(path)?;
        let mut file = Self {
            path: path.to_path_buf(),
            identity: identity(&metadata),
            offset: 0,
            partial: Vec::new(),
        };

        let lines = match start {
            Start::End => {
                file.offset = metadata.len();
                Vec::new()
            }
            Start::Beginning => file.read_new()?,
            Start::Tail(n) => {
                let mut lines = file.read_new()?;
                let skip = lines.len().saturating_sub(n);
                lines.drain(..skip);
                lines
            }
        };
        Ok((file, lines))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Complete lines appended since the last read.
    ///
    /// A shrink or a new inode at the same path starts over from offset 0.
    pub fn read_new(&mut self) -> io::Result<Vec<String>> {
        let metadata = fs::metadata(&self.path)?;
        let identity = identity(&metadata);
        if identity != self.identity || metadata.len() < self.offset {
            crate::debug!("tail"; "{} was truncated or replaced", self.path.display());
            self.identity = identity;
            self.offset = 0;
            self.partial.clear();
        }
        if metadata.len() == self.offset {
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.offset))?;
        let read = file.read_to_end(&mut self.partial)?;
        self.offset += read as u64;

        Ok(take_lines(&mut self.partial))
    }
}

/// Split off every newline-terminated line, leaving the remainder in `buf`.
fn take_lines(buf: &mut Vec<u8>) -> Vec<String> {
    let Some(last) = buf.iter().rposition(|&b| b == b'\n') else {
        return Vec::new();
    };
    let complete: Vec<u8> = buf.drain(..=last).collect();
    complete[..complete.len() - 1]
        .split(|&b| b == b'\n')
        .map(|line| {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            String::from_utf8_lossy(line).into_owned()
        })
        .collect()
}

#[cfg(unix)]
fn identity(metadata: &Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(metadata.ino())
}

#[cfg(not(unix))]
fn identity(_metadata: &Metadata) -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_lines() {
        let mut buf = b"a\r\nb\n\nrest".to_vec();
        assert_eq!(take_lines(&mut buf), ["a", "b", ""]);
        assert_eq!(buf, b"rest");

        assert!(take_lines(&mut buf).is_empty());
        assert_eq!(buf, b"rest");

        buf.extend_from_slice(b"\n");
        assert_eq!(take_lines(&mut buf), ["rest"]);
        assert!(buf.is_empty());
    }
}
