//! Backward line iteration over a seekable byte source.

use std::collections::VecDeque;
use std::io::{self, Read, Seek, SeekFrom};

/// Yields the lines of a reader last-first, reading fixed-size chunks
/// backward from the end. Only as much of the source as the consumer pulls
/// is ever read.
///
/// Lines are returned without their `\n` (and without a trailing `\r`). A
/// trailing newline at end of file does not produce an empty line.
pub struct ReverseLines<R> {
    reader: R,
    chunk_size: usize,
    /// Bytes not yet read, i.e. everything before `pos`.
    pos: u64,
    /// Most recently read bytes that may still hold newlines; starts at `pos`.
    head: Vec<u8>,
    /// Newline-free chunks following `head`, oldest first. Together they are
    /// the end of the line currently being assembled; they are joined once,
    /// when that line is emitted.
    tail: VecDeque<Vec<u8>>,
    started: bool,
    done: bool,
}

impl<R: Read + Seek> ReverseLines<R> {
    pub fn new(mut reader: R, chunk_size: usize) -> io::Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        Ok(Self {
            reader,
            chunk_size: chunk_size.max(1),
            pos: len,
            head: Vec::new(),
            tail: VecDeque::new(),
            started: false,
            done: false,
        })
    }

    /// Read the chunk before `pos` into `head`, parking the old `head` in
    /// `tail`.
    fn read_chunk(&mut self) -> io::Result<()> {
        let take = (self.chunk_size as u64).min(self.pos);
        self.pos -= take;
        self.reader.seek(SeekFrom::Start(self.pos))?;
        let mut chunk = vec![0u8; take as usize];
        self.reader.read_exact(&mut chunk)?;

        let parked = std::mem::replace(&mut self.head, chunk);
        if !parked.is_empty() {
            self.tail.push_front(parked);
        }
        Ok(())
    }

    /// `first` followed by every parked chunk.
    fn assemble(&mut self, mut first: Vec<u8>) -> Vec<u8> {
        let extra: usize = self.tail.iter().map(Vec::len).sum();
        first.reserve(extra);
        for chunk in self.tail.drain(..) {
            first.extend_from_slice(&chunk);
        }
        first
    }

    fn next_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        if self.done {
            return Ok(None);
        }
        if !self.started {
            self.started = true;
            // Drop a single trailing newline so it does not yield an empty line.
            while self.head.is_empty() && self.pos > 0 {
                self.read_chunk()?;
            }
            if self.head.last() == Some(&b'\n') {
                self.head.pop();
            }
        }

        loop {
            if let Some(nl) = self.head.iter().rposition(|&b| b == b'\n') {
                let start = self.head.split_off(nl + 1);
                self.head.pop();
                let line = self.assemble(start);
                return Ok(Some(trim_cr(line)));
            }
            if self.pos == 0 {
                self.done = true;
                let start = std::mem::take(&mut self.head);
                let line = self.assemble(start);
                if line.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(trim_cr(line)));
            }
            self.read_chunk()?;
        }
    }
}

fn trim_cr(mut line: Vec<u8>) -> Vec<u8> {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    line
}

impl<R: Read + Seek> Iterator for ReverseLines<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_line() {
            Ok(Some(line)) => Some(Ok(line)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
