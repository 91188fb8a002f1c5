use crate::constants::DEFAULT_MAX_MESSAGE_SIZE;

/// Decoder settings, passed explicitly to every input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Keep the bytes of unrecognised slices so that re-sending a value
    /// reproduces them.
    pub preserve_slices: bool,
    /// Largest message accepted by the incremental message decoder.
    pub max_message_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            preserve_slices: true,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl StreamConfig {
    pub fn with_preserve_slices(mut self, preserve_slices: bool) -> Self {
        self.preserve_slices = preserve_slices;
        self
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }
}
