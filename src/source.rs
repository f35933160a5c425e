//! Pull-based content reading for the DATA phase.

use crate::message::RawMessage;

/// A source of message bytes consumed in caller-sized chunks.
///
/// Each call hands back at most `max` bytes and advances an internal
/// cursor; an empty slice means the source is exhausted. Reading never
/// blocks and never fails, and calling again after exhaustion keeps
/// returning an empty slice.
pub trait ContentSource {
    fn next_chunk(&mut self, max: usize) -> &[u8];
}

impl ContentSource for RawMessage {
    fn next_chunk(&mut self, max: usize) -> &[u8] {
        let take = usize::min(max, self.remaining());
        let start = self.cursor;
        self.cursor += take;

        &self.data[start..start + take]
    }
}
