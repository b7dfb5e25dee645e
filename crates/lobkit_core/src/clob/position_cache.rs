//! Single-entry character to byte position cache.

/// The last translated (character position, byte position) pair.
///
/// Character positions are 1-based, byte positions 0-based. Since every
/// character takes at least one byte, `byte_pos >= char_pos - 1` always
/// holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionCache {
    char_pos: u64,
    byte_pos: u64,
}

impl Default for PositionCache {
    fn default() -> Self {
        Self {
            char_pos: 1,
            byte_pos: 0,
        }
    }
}

impl PositionCache {
    /// Returns the cached character position.
    #[must_use]
    pub fn char_pos(&self) -> u64 {
        self.char_pos
    }

    /// Returns the byte position of the cached character.
    #[must_use]
    pub fn byte_pos(&self) -> u64 {
        self.byte_pos
    }

    /// Records a new mapping.
    pub fn update(&mut self, char_pos: u64, byte_pos: u64) {
        debug_assert!(char_pos >= 1 && byte_pos >= char_pos - 1);
        self.char_pos = char_pos;
        self.byte_pos = byte_pos;
    }

    /// Forgets the mapping, going back to the first character.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_and_reset() {
        let mut cache = PositionCache::default();
        assert_eq!((cache.char_pos(), cache.byte_pos()), (1, 0));

        cache.update(10, 25);
        assert_eq!((cache.char_pos(), cache.byte_pos()), (10, 25));

        cache.reset();
        assert_eq!(cache, PositionCache::default());
    }
}
