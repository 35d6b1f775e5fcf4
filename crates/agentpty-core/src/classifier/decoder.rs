use encoding_rs::{CoderResult, Decoder, UTF_8};

/// Incremental UTF-8 decoder.
///
/// A multi-byte character split across two PTY reads is held back until the
/// rest arrives instead of turning into replacement characters. One decoder
/// per session; never shared.
pub struct StreamDecoder {
    inner: Decoder,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self {
            inner: UTF_8.new_decoder_without_bom_handling(),
        }
    }

    /// Decode the next chunk, carrying incomplete sequences to the next call
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let capacity = self
            .inner
            .max_utf8_buffer_length(chunk.len())
            .unwrap_or(chunk.len() * 3 + 4);
        let mut out = String::with_capacity(capacity);
        let mut consumed = 0;

        loop {
            let (result, read, _had_errors) =
                self.inner
                    .decode_to_string(&chunk[consumed..], &mut out, false);
            consumed += read;
            match result {
                CoderResult::InputEmpty => break,
                CoderResult::OutputFull => out.reserve(chunk.len() - consumed + 16),
            }
        }

        out
    }
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}
