//! Delta windows and their instructions.

use crate::error::{malformed, DeltaError};

/// Maximum target-view size the encoder aims for per window.
pub const DEFAULT_WINDOW_SIZE: usize = 100 * 1024;

/// One instruction inside a delta window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// Copy `len` bytes starting at `offset` within the window's source view.
    SourceCopy { offset: usize, len: usize },
    /// Copy `len` bytes starting at `offset` within the target text already
    /// produced *by this window*. `offset + len` may run past the current
    /// cursor, which repeats the copied range (run-length patterns).
    TargetCopy { offset: usize, len: usize },
    /// Append the next `len` bytes of the window's new-data bank.
    NewData { len: usize },
}

impl Instruction {
    pub fn len(&self) -> usize {
        match *self {
            Instruction::SourceCopy { len, .. }
            | Instruction::TargetCopy { len, .. }
            | Instruction::NewData { len } => len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One window of an svndiff stream.
///
/// The concatenation of the target views of all windows, in order, is the
/// resulting file. Source views are non-decreasing across windows so a
/// streaming source can serve them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeltaWindow {
    /// Offset of the source view within the source stream.
    pub source_offset: u64,
    /// Length of the source view; zero for full-text windows.
    pub source_len: usize,
    /// Number of bytes this window produces.
    pub target_len: usize,
    /// Instructions, interpreted in order.
    pub instructions: Vec<Instruction>,
    /// The new-data bank referenced by `NewData` instructions.
    pub new_data: Vec<u8>,
}

impl DeltaWindow {
    /// Validate the internal consistency rules every window must satisfy.
    pub fn validate(&self) -> Result<(), DeltaError> {
        let mut cursor = 0usize;
        let mut consumed_new = 0usize;
        for ins in &self.instructions {
            match *ins {
                Instruction::SourceCopy { offset, len } => {
                    if offset.checked_add(len).map_or(true, |end| end > self.source_len) {
                        return Err(malformed(format!(
                            "source copy [{}, +{}) exceeds source view of {} bytes",
                            offset, len, self.source_len
                        )));
                    }
                }
                Instruction::TargetCopy { offset, len } => {
                    if offset >= cursor {
                        return Err(malformed(format!(
                            "target copy offset {} is not before cursor {}",
                            offset, cursor
                        )));
                    }
                    let _ = len;
                }
                Instruction::NewData { len } => {
                    consumed_new += len;
                }
            }
            cursor = cursor
                .checked_add(ins.len())
                .ok_or_else(|| malformed("target view length overflow"))?;
        }
        if cursor != self.target_len {
            return Err(malformed(format!(
                "instructions produce {} bytes, window declares {}",
                cursor, self.target_len
            )));
        }
        if consumed_new != self.new_data.len() {
            return Err(malformed(format!(
                "instructions consume {} new-data bytes, window carries {}",
                consumed_new,
                self.new_data.len()
            )));
        }
        Ok(())
    }

    /// Materialize this window's target view given its source view bytes.
    pub fn apply(&self, source_view: &[u8]) -> Result<Vec<u8>, DeltaError> {
        if source_view.len() != self.source_len {
            return Err(malformed(format!(
                "source view is {} bytes, window expects {}",
                source_view.len(),
                self.source_len
            )));
        }
        self.validate()?;
        let mut out = Vec::with_capacity(self.target_len);
        let mut new_pos = 0usize;
        for ins in &self.instructions {
            match *ins {
                Instruction::SourceCopy { offset, len } => {
                    out.extend_from_slice(&source_view[offset..offset + len]);
                }
                Instruction::TargetCopy { offset, len } => {
                    // May overlap the bytes it is producing.
                    for i in 0..len {
                        let b = out[offset + i];
                        out.push(b);
                    }
                }
                Instruction::NewData { len } => {
                    out.extend_from_slice(&self.new_data[new_pos..new_pos + len]);
                    new_pos += len;
                }
            }
        }
        Ok(out)
    }
}

/// Represent plain full-text content as a sequence of new-data windows.
///
/// Used when a server hands back a full text where the receiver expects a
/// delta stream.
pub fn fulltext_windows(content: &[u8]) -> Vec<DeltaWindow> {
    if content.is_empty() {
        return Vec::new();
    }
    content
        .chunks(DEFAULT_WINDOW_SIZE)
        .map(|chunk| DeltaWindow {
            source_offset: 0,
            source_len: 0,
            target_len: chunk.len(),
            instructions: vec![Instruction::NewData { len: chunk.len() }],
            new_data: chunk.to_vec(),
        })
        .collect()
}
