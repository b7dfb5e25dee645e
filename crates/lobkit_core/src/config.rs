//! Large object configuration.

use std::path::PathBuf;

/// Smallest in-memory buffer a byte store uses.
pub const MIN_BUFFER_SIZE: usize = 4096;
/// Largest in-memory buffer a byte store uses.
pub const MAX_BUFFER_SIZE: usize = 32 * 1024;

/// Configuration shared by all large objects of a session.
#[derive(Debug, Clone)]
pub struct LobConfig {
    /// Buffer size for stores created without initial data.
    pub default_buffer_size: usize,

    /// Lower clamp for derived buffer sizes.
    pub min_buffer_size: usize,

    /// Upper clamp for derived buffer sizes.
    pub max_buffer_size: usize,

    /// File name prefix for overflow files.
    pub overflow_prefix: String,

    /// File name suffix for overflow files.
    pub overflow_suffix: String,

    /// Directory for overflow files (`None` = system temp dir).
    pub overflow_dir: Option<PathBuf>,

    /// Number of characters a UTF-8 decoder buffers per fill.
    pub reader_buffer_chars: usize,
}

impl Default for LobConfig {
    fn default() -> Self {
        Self {
            default_buffer_size: MIN_BUFFER_SIZE,
            min_buffer_size: MIN_BUFFER_SIZE,
            max_buffer_size: MAX_BUFFER_SIZE,
            overflow_prefix: "lob".to_string(),
            overflow_suffix: ".tmp".to_string(),
            overflow_dir: None,
            reader_buffer_chars: 8 * 1024,
        }
    }
}

impl LobConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the buffer size for stores created empty.
    #[must_use]
    pub const fn default_buffer_size(mut self, size: usize) -> Self {
        self.default_buffer_size = size;
        self
    }

    /// Sets the overflow directory.
    #[must_use]
    pub fn overflow_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.overflow_dir = Some(dir.into());
        self
    }

    /// Sets the overflow file prefix and suffix.
    #[must_use]
    pub fn overflow_names(mut self, prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        self.overflow_prefix = prefix.into();
        self.overflow_suffix = suffix.into();
        self
    }

    /// Sets the decoder buffer size in characters.
    #[must_use]
    pub const fn reader_buffer_chars(mut self, chars: usize) -> Self {
        self.reader_buffer_chars = chars;
        self
    }

    /// Returns the buffer size for a store starting with `initial_len` bytes.
    ///
    /// `None` means the size is unknown and the default applies. The result
    /// is always clamped to `[min_buffer_size, max_buffer_size]`.
    #[must_use]
    pub fn buffer_size_for(&self, initial_len: Option<usize>) -> usize {
        initial_len
            .unwrap_or(self.default_buffer_size)
            .clamp(self.min_buffer_size, self.max_buffer_size)
    }
}
