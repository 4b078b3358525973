use std::path::PathBuf;

pub const DEFAULT_CHUNK_SIZE: usize = 50;

/// Options for a [`crate::Source`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceOptions {
    /// Upper bound on the bytes carried by one chunk. Zero falls back to
    /// [`DEFAULT_CHUNK_SIZE`].
    pub chunk_size: usize,
    /// Directory trimmed from every emitted file's directory. Computed from
    /// the patterns when absent.
    pub base: Option<PathBuf>,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            base: None,
        }
    }
}

impl SourceOptions {
    pub fn effective_chunk_size(&self) -> usize {
        if self.chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            self.chunk_size
        }
    }
}

/// Options for a [`crate::Sink`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SinkOptions {
    /// Remove the whole destination root before the first write.
    pub clean: bool,
    /// Replace files that already exist. When false an existing file is an
    /// error and is left untouched.
    pub overwrite: bool,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            clean: false,
            overwrite: true,
        }
    }
}
