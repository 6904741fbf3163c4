//! Line accumulation for the serial command stream.

use heapless::Vec;

/// Size of the receive buffer. One slot is kept free, as a C string terminator would need it, so
/// the longest accepted line is [`MAX_LINE_LEN`] bytes.
pub const LINE_CAPACITY: usize = 64;
pub const MAX_LINE_LEN: usize = LINE_CAPACITY - 1;

/// What happened to a byte fed into a [`CommandLine`].
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Feed {
    /// The byte was buffered, or was a terminator with nothing buffered.
    Pending,
    /// A terminator ended a non-empty line. The line stays buffered until [`CommandLine::clear`].
    Complete,
    /// The line grew past [`MAX_LINE_LEN`]. The buffer was emptied, and this byte and the rest of
    /// the line up to the next terminator are discarded.
    Overflow,
    /// The byte belongs to a line that already overflowed and was discarded.
    Discarded,
}

/// Bounded buffer that collects bytes until a `\n` or `\r` terminator.
#[derive(Debug, Default)]
pub struct CommandLine {
    buffer: Vec<u8, LINE_CAPACITY>,
    discarding: bool,
}

impl CommandLine {
    pub const fn new() -> CommandLine {
        CommandLine {
            buffer: Vec::new(),
            discarding: false,
        }
    }

    pub fn feed(&mut self, byte: u8) -> Feed {
        if byte == b'\n' || byte == b'\r' {
            if self.discarding {
                self.discarding = false;
                return Feed::Discarded;
            }
            return if self.buffer.is_empty() {
                Feed::Pending
            } else {
                Feed::Complete
            };
        }
        if self.discarding {
            return Feed::Discarded;
        }
        if self.buffer.len() >= MAX_LINE_LEN || self.buffer.push(byte).is_err() {
            self.buffer.clear();
            self.discarding = true;
            return Feed::Overflow;
        }
        Feed::Pending
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Empties the buffer and ends any discard in progress.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }
}
