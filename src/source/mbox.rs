//! Streaming mbox reader.
//!
//! Messages are delimited by `From ` separator lines; the file is read one
//! line at a time so archives far larger than memory stream in constant
//! space. `>From ` quoting (mboxrd) is unescaped. Message indexes within
//! the file are part of the origin so positions stay stable across runs.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::RawRecord;

pub struct MboxStream {
    reader: BufReader<File>,
    origin_base: String,
    index: u64,
    current: Vec<u8>,
    in_message: bool,
    done: bool,
}

impl MboxStream {
    pub fn open(path: &Path, origin_base: &str) -> Result<Self, String> {
        let file = File::open(path).map_err(|e| format!("cannot open mbox: {e}"))?;
        Ok(Self {
            reader: BufReader::new(file),
            origin_base: origin_base.to_string(),
            index: 0,
            current: Vec::new(),
            in_message: false,
            done: false,
        })
    }

    fn emit(&mut self) -> Option<RawRecord> {
        if !self.in_message {
            return None;
        }
        self.in_message = false;
        let raw = std::mem::take(&mut self.current);
        let origin = format!("{}::msg:{}", self.origin_base, self.index);
        self.index += 1;
        if raw.iter().all(|b| b.is_ascii_whitespace()) {
            return Some(RawRecord::Corrupt {
                origin,
                reason: "empty mbox entry".to_string(),
            });
        }
        Some(RawRecord::Mail { raw, origin })
    }
}

impl Iterator for MboxStream {
    type Item = RawRecord;

    fn next(&mut self) -> Option<RawRecord> {
        if self.done {
            return None;
        }
        loop {
            let mut line = Vec::new();
            let read = match self.reader.read_until(b'\n', &mut line) {
                Ok(n) => n,
                Err(e) => {
                    self.done = true;
                    let pending = self.emit();
                    return pending.or(Some(RawRecord::Corrupt {
                        origin: self.origin_base.clone(),
                        reason: format!("read error: {e}"),
                    }));
                }
            };
            if read == 0 {
                self.done = true;
                return self.emit();
            }

            if line.starts_with(b"From ") {
                let finished = self.emit();
                self.in_message = true;
                if finished.is_some() {
                    return finished;
                }
                continue; // separator line itself is not part of the message
            }

            if self.in_message {
                // mboxrd quoting: ">From " at line start was escaped on write
                if line.starts_with(b">From ") {
                    self.current.extend_from_slice(&line[1..]);
                } else {
                    self.current.extend_from_slice(&line);
                }
            }
            // Preamble before the first separator is ignored
        }
    }
}
