use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidPayload,
}

/// A type for reading server-sent events from a chunk stream.
pub struct Sse {
    buf: String,
    // Bytes of a UTF-8 sequence split across two chunks.
    pending_bytes: Vec<u8>,
    chunks: Chunks,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: String::new(),
            pending_bytes: Vec::new(),
            chunks,
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // There may be complete events left from the previous chunk.
            if let Some(event) = self.try_parse_event() {
                return Ok(Some(event));
            }

            let Some(bytes) =
                self.chunks.next_chunk().await.map_err(Error::ChunksError)?
            else {
                // Abort if no more data available.
                return Ok(None);
            };
            self.push_bytes(&bytes)?;
        }
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.pending_bytes.extend_from_slice(bytes);
        let valid_len = match str::from_utf8(&self.pending_bytes) {
            Ok(s) => s.len(),
            // An incomplete sequence at the end, wait for more bytes.
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(_) => return Err(Error::InvalidPayload),
        };
        let rest = self.pending_bytes.split_off(valid_len);
        let valid = std::mem::replace(&mut self.pending_bytes, rest);
        let Ok(s) = String::from_utf8(valid) else {
            return Err(Error::InvalidPayload);
        };
        self.buf.push_str(&s);

        // Normalize `cr lf` into `lf`. A trailing `cr` is kept until its
        // `lf` arrives.
        if self.buf.contains("\r\n") {
            self.buf = self.buf.replace("\r\n", "\n");
        }
        Ok(())
    }

    fn try_parse_event(&mut self) -> Option<String> {
        // event         = *( comment / field ) end-of-line
        // field         = 1*name-char [ colon [ space ] *any-char ] end-of-line
        // comment       = colon *any-char end-of-line
        loop {
            let eol_idx = self.buf.find("\n\n")?;

            let mut data: Option<String> = None;
            for line in self.buf[0..eol_idx].lines() {
                if line.starts_with(':') {
                    continue;
                }
                let (name, value) = line.split_once(':').unwrap_or((line, ""));
                let value = value.strip_prefix(' ').unwrap_or(value);
                // `event`, `id`, `retry` and unknown fields are ignored.
                if name != "data" {
                    continue;
                }
                let data = data.get_or_insert_default();
                if !data.is_empty() {
                    data.push('\n');
                }
                data.push_str(value);
            }

            // Consume the bytes from the buffer.
            self.buf.drain(0..eol_idx + 2);

            // Events with only comments carry nothing, keep looking.
            if data.is_some() {
                return data;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[tokio::test]
    async fn test_normal_events() {
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(b"data: hello\n\ndata: bye\n\n")].into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "bye");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_fields_are_ignored() {
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(
                b"event: message\nx-trace: 42\nbare\ndata: hello\n\n",
            )]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_crlf_split_across_chunks() {
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(b"data:"),
                Bytes::from_static(b" hello\r\n\r"),
                Bytes::from_static(b"\n: keep-alive\r\n\r\n"),
            ]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_split_utf8_sequence() {
        let bytes = "data: xin chào\n\n".as_bytes();
        let split_at = bytes.len() - 4;
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::copy_from_slice(&bytes[..split_at]),
                Bytes::copy_from_slice(&bytes[split_at..]),
            ]
            .into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "xin chào");
    }

    #[tokio::test]
    async fn test_invalid_data() {
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(b"data: \xff\xfe\n\n")].into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap_err(), Error::InvalidPayload);

        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(b"data: incomplete\n")].into(),
        );
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap(), None);
    }
}
