//! Svndiff encoder (version 0) and a simple window producer.

use std::io::Write;

use crate::error::{malformed, DeltaError};
use crate::svndiff::{write_varint, MAGIC};
use crate::window::{DeltaWindow, Instruction, DEFAULT_WINDOW_SIZE};

/// Serializes delta windows as a version-0 svndiff stream.
pub struct SvndiffWriter<W: Write> {
    out: W,
    header_written: bool,
}

impl<W: Write> SvndiffWriter<W> {
    pub fn new(out: W) -> SvndiffWriter<W> {
        SvndiffWriter {
            out,
            header_written: false,
        }
    }

    fn ensure_header(&mut self) -> Result<(), DeltaError> {
        if !self.header_written {
            self.out.write_all(&MAGIC)?;
            self.out.write_all(&[0])?;
            self.header_written = true;
        }
        Ok(())
    }

    pub fn write_window(&mut self, window: &DeltaWindow) -> Result<(), DeltaError> {
        if window.target_len == 0 {
            return Err(malformed("refusing to emit an empty window"));
        }
        window.validate()?;
        self.ensure_header()?;

        let mut ins = Vec::new();
        for i in &window.instructions {
            encode_instruction(&mut ins, i);
        }

        let mut head = Vec::with_capacity(24);
        write_varint(&mut head, window.source_offset);
        write_varint(&mut head, window.source_len as u64);
        write_varint(&mut head, window.target_len as u64);
        write_varint(&mut head, ins.len() as u64);
        write_varint(&mut head, window.new_data.len() as u64);

        self.out.write_all(&head)?;
        self.out.write_all(&ins)?;
        self.out.write_all(&window.new_data)?;
        Ok(())
    }

    /// Flush and hand back the underlying writer. An empty delta still gets
    /// its header, so the stream is always well formed.
    pub fn into_inner(mut self) -> Result<W, DeltaError> {
        self.ensure_header()?;
        self.out.flush()?;
        Ok(self.out)
    }
}

fn encode_instruction(out: &mut Vec<u8>, ins: &Instruction) {
    let (kind, len, offset) = match *ins {
        Instruction::SourceCopy { offset, len } => (0u8, len, Some(offset)),
        Instruction::TargetCopy { offset, len } => (1, len, Some(offset)),
        Instruction::NewData { len } => (2, len, None),
    };
    if len > 0 && len < 64 {
        out.push((kind << 6) | len as u8);
    } else {
        out.push(kind << 6);
        write_varint(out, len as u64);
    }
    if let Some(offset) = offset {
        write_varint(out, offset as u64);
    }
}

/// Encode a sequence of windows into one svndiff byte stream.
pub fn encode(windows: &[DeltaWindow]) -> Result<Vec<u8>, DeltaError> {
    let mut writer = SvndiffWriter::new(Vec::new());
    for w in windows {
        writer.write_window(w)?;
    }
    writer.into_inner()
}

/// Produce windows turning `source` into `target`.
///
/// The partition is simple: aligned windows of at most
/// [`DEFAULT_WINDOW_SIZE`] bytes, each reusing the longest common prefix of
/// its source view and falling back to new data for the rest. The line-level
/// diff algorithm that would produce tighter deltas is a black box upstream
/// of this crate; correctness only requires that applying the result to
/// `source` yields `target`.
pub fn delta_windows(source: &[u8], target: &[u8]) -> Vec<DeltaWindow> {
    let mut windows = Vec::new();
    let mut offset = 0usize;
    while offset < target.len() {
        let t_end = (offset + DEFAULT_WINDOW_SIZE).min(target.len());
        let chunk = &target[offset..t_end];
        let s_end = (offset + DEFAULT_WINDOW_SIZE).min(source.len());
        let source_view = if offset < source.len() {
            &source[offset..s_end]
        } else {
            &[][..]
        };

        let common = chunk
            .iter()
            .zip(source_view.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let mut instructions = Vec::new();
        let mut new_data = Vec::new();
        if common > 0 {
            instructions.push(Instruction::SourceCopy {
                offset: 0,
                len: common,
            });
        }
        if common < chunk.len() {
            instructions.push(Instruction::NewData {
                len: chunk.len() - common,
            });
            new_data.extend_from_slice(&chunk[common..]);
        }

        windows.push(DeltaWindow {
            source_offset: offset as u64,
            source_len: if common > 0 { source_view.len() } else { 0 },
            target_len: chunk.len(),
            instructions,
            new_data,
        });
        offset = t_end;
    }
    windows
}
