//! Incremental svndiff decoder.

use std::io::Read;

use crate::error::{malformed, DeltaError};
use crate::svndiff::{MAGIC, MAX_VERSION};
use crate::window::{DeltaWindow, Instruction};

/// Push-mode svndiff parser.
///
/// Bytes arrive in arbitrary chunks (network reads, base64 cdata fragments);
/// complete windows are handed back as soon as they can be parsed. Call
/// [`SvndiffDecoder::finish`] at end-of-stream to detect truncation.
pub struct SvndiffDecoder {
    buf: Vec<u8>,
    start: usize,
    version: Option<u8>,
    windows_seen: u64,
}

impl SvndiffDecoder {
    pub fn new() -> SvndiffDecoder {
        SvndiffDecoder {
            buf: Vec::new(),
            start: 0,
            version: None,
            windows_seen: 0,
        }
    }

    /// The stream version, once the header has been seen.
    pub fn version(&self) -> Option<u8> {
        self.version
    }

    /// Feed a chunk; returns every window that became complete.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<DeltaWindow>, DeltaError> {
        self.buf.extend_from_slice(data);
        let mut windows = Vec::new();

        if self.version.is_none() {
            if self.buf.len() - self.start < 4 {
                return Ok(windows);
            }
            let head = &self.buf[self.start..self.start + 4];
            if head[..3] != MAGIC {
                return Err(malformed("stream does not begin with 'SVN'"));
            }
            let version = head[3];
            if version > MAX_VERSION {
                return Err(DeltaError::UnsupportedVersion(version));
            }
            self.version = Some(version);
            self.start += 4;
        }

        while let Some((window, used)) = self.try_parse_window()? {
            self.start += used;
            self.windows_seen += 1;
            windows.push(window);
        }

        // Reclaim consumed space so long streams stay bounded by one window.
        if self.start > 0 {
            self.buf.drain(..self.start);
            self.start = 0;
        }
        Ok(windows)
    }

    /// Signal end-of-stream. Fails if the stream stopped mid-header or
    /// mid-window.
    pub fn finish(&self) -> Result<u64, DeltaError> {
        if self.version.is_none() || self.start < self.buf.len() {
            return Err(DeltaError::UnexpectedEof);
        }
        Ok(self.windows_seen)
    }

    fn try_parse_window(&self) -> Result<Option<(DeltaWindow, usize)>, DeltaError> {
        let data = &self.buf[self.start..];
        let mut cur = Cursor { data, pos: 0 };

        let source_offset = match cur.varint()? {
            Some(v) => v,
            None => return Ok(None),
        };
        let Some(source_len) = cur.varint_usize()? else {
            return Ok(None);
        };
        let Some(target_len) = cur.varint_usize()? else {
            return Ok(None);
        };
        let Some(ins_len) = cur.varint_usize()? else {
            return Ok(None);
        };
        let Some(new_len) = cur.varint_usize()? else {
            return Ok(None);
        };

        if data.len() - cur.pos < ins_len.saturating_add(new_len) {
            return Ok(None);
        }
        let ins_section = &data[cur.pos..cur.pos + ins_len];
        let new_section = &data[cur.pos + ins_len..cur.pos + ins_len + new_len];
        let used = cur.pos + ins_len + new_len;

        let version = self.version.unwrap_or(0);
        let ins_bytes;
        let new_data;
        if version >= 1 {
            ins_bytes = inflate_section(ins_section)?;
            new_data = inflate_section(new_section)?;
        } else {
            ins_bytes = ins_section.to_vec();
            new_data = new_section.to_vec();
        }

        let instructions = parse_instructions(&ins_bytes)?;
        let window = DeltaWindow {
            source_offset,
            source_len,
            target_len,
            instructions,
            new_data,
        };
        window.validate()?;
        Ok(Some((window, used)))
    }
}

impl Default for SvndiffDecoder {
    fn default() -> Self {
        SvndiffDecoder::new()
    }
}

/// Decode one complete svndiff byte stream.
pub fn decode(bytes: &[u8]) -> Result<Vec<DeltaWindow>, DeltaError> {
    let mut decoder = SvndiffDecoder::new();
    let windows = decoder.push(bytes)?;
    decoder.finish()?;
    Ok(windows)
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    /// `Ok(None)` means the buffer ran out mid-integer.
    fn varint(&mut self) -> Result<Option<u64>, DeltaError> {
        let mut value: u64 = 0;
        let mut count = 0;
        loop {
            let Some(&b) = self.data.get(self.pos) else {
                return Ok(None);
            };
            self.pos += 1;
            count += 1;
            if count > 10 {
                return Err(malformed("integer too large"));
            }
            value = value
                .checked_mul(128)
                .ok_or_else(|| malformed("integer too large"))?
                | u64::from(b & 0x7f);
            if b & 0x80 == 0 {
                return Ok(Some(value));
            }
        }
    }

    fn varint_usize(&mut self) -> Result<Option<usize>, DeltaError> {
        match self.varint()? {
            Some(v) => usize::try_from(v)
                .map(Some)
                .map_err(|_| malformed("length does not fit in memory")),
            None => Ok(None),
        }
    }
}

fn parse_instructions(bytes: &[u8]) -> Result<Vec<Instruction>, DeltaError> {
    let mut cur = Cursor { data: bytes, pos: 0 };
    let mut out = Vec::new();
    while cur.pos < bytes.len() {
        let op = bytes[cur.pos];
        cur.pos += 1;
        let mut len = usize::from(op & 0x3f);
        if len == 0 {
            len = cur
                .varint_usize()?
                .ok_or_else(|| malformed("truncated instruction length"))?;
        }
        let ins = match op >> 6 {
            0 => {
                let offset = cur
                    .varint_usize()?
                    .ok_or_else(|| malformed("truncated source-copy offset"))?;
                Instruction::SourceCopy { offset, len }
            }
            1 => {
                let offset = cur
                    .varint_usize()?
                    .ok_or_else(|| malformed("truncated target-copy offset"))?;
                Instruction::TargetCopy { offset, len }
            }
            2 => Instruction::NewData { len },
            _ => return Err(malformed("reserved instruction opcode")),
        };
        out.push(ins);
    }
    Ok(out)
}

/// Svndiff-1 section: a varint original length, then either the raw bytes
/// (when nothing was saved) or a zlib stream.
fn inflate_section(section: &[u8]) -> Result<Vec<u8>, DeltaError> {
    if section.is_empty() {
        return Ok(Vec::new());
    }
    let mut cur = Cursor { data: section, pos: 0 };
    let orig_len = cur
        .varint_usize()?
        .ok_or_else(|| malformed("truncated section length"))?;
    let rest = &section[cur.pos..];
    if rest.len() == orig_len {
        return Ok(rest.to_vec());
    }
    let mut out = Vec::with_capacity(orig_len);
    flate2::read::ZlibDecoder::new(rest)
        .read_to_end(&mut out)
        .map_err(|e| malformed(format!("bad compressed section: {e}")))?;
    if out.len() != orig_len {
        return Err(malformed(format!(
            "compressed section inflates to {} bytes, header says {}",
            out.len(),
            orig_len
        )));
    }
    Ok(out)
}
