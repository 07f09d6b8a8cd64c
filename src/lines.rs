//! Line reading that survives bytes which are not UTF-8

use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Newline-delimited reader decoding each line lossily.
///
/// Unlike [`tokio::io::Lines`], a line with invalid UTF-8 is returned with
/// replacement characters instead of ending the stream. `next_line` is
/// cancel-safe: a partially read line is kept for the next call.
pub struct LossyLines<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> LossyLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// Next line without its terminator, `None` at end of stream
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 && self.buf.is_empty() {
            return Ok(None);
        }

        let mut end = self.buf.len();
        if self.buf[..end].ends_with(b"\n") {
            end -= 1;
        }
        if self.buf[..end].ends_with(b"\r") {
            end -= 1;
        }
        let line = String::from_utf8_lossy(&self.buf[..end]).into_owned();
        self.buf.clear();
        Ok(Some(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_invalid_utf8_does_not_end_stream() {
        let input: &[u8] = b"first\nbad \xff\xfe line\r\nlast";
        let mut lines = LossyLines::new(BufReader::new(input));

        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("first"));
        assert_eq!(
            lines.next_line().await.unwrap().as_deref(),
            Some("bad \u{fffd}\u{fffd} line")
        );
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("last"));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_lines_are_returned() {
        let input: &[u8] = b"\n\nx\n";
        let mut lines = LossyLines::new(BufReader::new(input));

        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("x"));
        assert_eq!(lines.next_line().await.unwrap(), None);
    }
}
