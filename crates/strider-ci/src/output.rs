//! Append-only output buffers.

use serde::{Deserialize, Serialize};

/// Accumulated stdout, stderr and their arrival-ordered merge.
///
/// Used both per job (everything the job produced, including synthetic
/// messages) and per spawned process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputBuffers {
    pub stdout: String,
    pub stderr: String,
    pub stdmerged: String,
}

impl OutputBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stdout chunk to both stdout and merged.
    pub fn push_stdout(&mut self, chunk: &str) {
        self.stdout.push_str(chunk);
        self.stdmerged.push_str(chunk);
    }

    /// Append a stderr chunk to both stderr and merged.
    pub fn push_stderr(&mut self, chunk: &str) {
        self.stderr.push_str(chunk);
        self.stdmerged.push_str(chunk);
    }

    pub fn is_empty(&self) -> bool {
        self.stdmerged.is_empty()
    }
}
