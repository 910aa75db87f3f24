//! Maps failure offsets and diagnostic lines onto the raw fragment.

use crate::execution::ExecutionResult;

/// Line start offsets (in characters) of a fragment's raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineTable {
    starts: Vec<usize>,
    len: usize,
}

/// A location inside the fragment; line and column are 0-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl LineTable {
    pub fn new(raw: &str) -> Self {
        let mut starts = vec![0];
        let mut len = 0;
        for (i, ch) in raw.chars().enumerate() {
            if ch == '\n' {
                starts.push(i + 1);
            }
            len = i + 1;
        }
        Self { starts, len }
    }

    pub fn line_count(&self) -> usize {
        self.starts.len()
    }

    /// Line and column owning `offset`. Offsets past the end land on the
    /// last line.
    pub fn map_offset(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.len);
        let line = match self.starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        (line, offset - self.starts[line])
    }

    /// Clamp a fragment-relative line; lines outside the fragment map to
    /// the first line.
    pub fn map_line(&self, line: i64) -> usize {
        if line < 0 || line as usize >= self.starts.len() {
            0
        } else {
            line as usize
        }
    }
}

pub fn map_failure(offset: usize, message: &str, table: &LineTable) -> MappedError {
    let (line, column) = table.map_offset(offset);
    MappedError { line, column, message: message.to_string() }
}

/// Locate an execution failure. `None` for successes and for failures that
/// carry no offset.
pub fn locate(result: &ExecutionResult, table: &LineTable) -> Option<MappedError> {
    match result {
        ExecutionResult::Failure { offset: Some(offset), message } => {
            Some(map_failure(*offset, message, table))
        }
        _ => None,
    }
}
