//! File type: a thin wrapper over a host file handle with `read(size)`,
//! `readline`, `write(buf)`, `tell`, `flush`, `close`; `len` is the file
//! size via `stat`.
//!
//! Host I/O errors never become Rust `Err`s that propagate out of the VM: a
//! failed `open` returns `NIL`, and a read past EOF returns an empty
//! string. `FileObj` itself stores `io::Result`-free state; the fallible
//! host calls happen at the call sites in `crate::builtins` and the method
//! table, which translate I/O errors into those sentinel values.

use std::{
    fs::File,
    io::{BufRead, BufReader, Read, Seek, Write},
};

#[derive(Debug)]
pub struct FileObj {
    pub path: String,
    pub mode: String,
    reader: Option<BufReader<File>>,
    writer: Option<File>,
    closed: bool,
}

impl FileObj {
    pub fn open(path: &str, mode: &str) -> std::io::Result<Self> {
        let (reader, writer) = match mode {
            "r" => (Some(BufReader::new(File::open(path)?)), None),
            "w" => (None, Some(File::create(path)?)),
            "a" => (None, Some(std::fs::OpenOptions::new().create(true).append(true).open(path)?)),
            other => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("unsupported file mode '{other}'"),
                ));
            }
        };
        Ok(Self { path: path.to_owned(), mode: mode.to_owned(), reader, writer, closed: false })
    }

    pub fn read(&mut self, size: Option<usize>) -> String {
        let Some(reader) = self.reader.as_mut() else { return String::new() };
        let mut buf = String::new();
        match size {
            Some(n) => {
                let mut limited = reader.take(n as u64);
                let _ = limited.read_to_string(&mut buf);
            }
            None => {
                let _ = reader.read_to_string(&mut buf);
            }
        }
        buf
    }

    /// Returns `None` at EOF (never an empty-but-present line); the VM
    /// maps that to `NIL`, while a genuinely blank line comes back as
    /// `Some(String::new())` then `"\n"`.
    pub fn readline(&mut self) -> Option<String> {
        let reader = self.reader.as_mut()?;
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line),
            Err(_) => None,
        }
    }

    pub fn write(&mut self, data: &str) -> bool {
        let Some(writer) = self.writer.as_mut() else { return false };
        writer.write_all(data.as_bytes()).is_ok()
    }

    pub fn tell(&mut self) -> u64 {
        if let Some(reader) = self.reader.as_mut() {
            reader.stream_position().unwrap_or(0)
        } else if let Some(writer) = self.writer.as_mut() {
            writer.stream_position().unwrap_or(0)
        } else {
            0
        }
    }

    pub fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }

    pub fn close(&mut self) {
        self.closed = true;
        self.reader = None;
        self.writer = None;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn byte_len(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }
}
