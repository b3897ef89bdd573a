//! Line codec: field escaping, frame encoding, and byte-level decoding.
//!
//! Decoding is a small state machine fed one byte at a time
//! ([`FrameDecoder::push`]). [`read_frame`] drives it from any buffered async
//! reader, consuming exactly the bytes of one line and leaving the rest in
//! the reader's buffer for the next call.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::warn;

/// Separates fields within a line.
pub const DELIMITER: u8 = b',';

/// Makes the following byte literal.
pub const ESCAPE: u8 = b'\\';

/// Ends a line.
pub const TERMINATOR: u8 = b'\n';

/// Errors from reading a frame off a byte stream.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("connection closed mid-frame ({buffered} bytes buffered, no terminator)")]
    Truncated { buffered: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Terminal status of a list-style exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// `done`: the exchange succeeded and no more records follow.
    Done,
    /// `fail`: the daemon rejected the command.
    Fail,
}

/// One decoded protocol line.
///
/// Always holds at least one field: an empty line decodes to a single empty
/// field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    fields: Vec<String>,
}

impl Frame {
    /// Build a frame from already-decoded fields.
    ///
    /// An empty field list is normalised to one empty field so that
    /// [`Frame::first`] is always defined.
    pub fn new(fields: Vec<String>) -> Self {
        if fields.is_empty() {
            return Self {
                fields: vec![String::new()],
            };
        }
        Self { fields }
    }

    /// The leading field: a status token or the first column of a record.
    pub fn first(&self) -> &str {
        &self.fields[0]
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<String> {
        self.fields
    }

    /// Classify this frame by its first field only.
    ///
    /// A record whose later fields happen to read `done` is still data.
    pub fn terminal(&self) -> Option<Terminal> {
        match self.first() {
            "done" => Some(Terminal::Done),
            "fail" => Some(Terminal::Fail),
            _ => None,
        }
    }

    /// Fields after the status token, re-escaped and joined with the
    /// delimiter, so a comma inside a field stays distinguishable from a
    /// field boundary.
    pub fn detail(&self) -> String {
        self.fields[1..]
            .iter()
            .map(|field| escape_field(field))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Incremental decoder for one frame at a time.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    fields: Vec<Vec<u8>>,
    current: Vec<u8>,
    escaping: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte. Returns the completed frame when `b` is an unescaped
    /// terminator, after which the decoder is ready for the next line.
    pub fn push(&mut self, b: u8) -> Option<Frame> {
        if self.escaping {
            self.escaping = false;
            self.current.push(b);
            return None;
        }

        match b {
            ESCAPE => self.escaping = true,
            DELIMITER => {
                let field = std::mem::take(&mut self.current);
                self.fields.push(field);
            }
            TERMINATOR => {
                let field = std::mem::take(&mut self.current);
                self.fields.push(field);
                return Some(self.finish());
            }
            _ => self.current.push(b),
        }
        None
    }

    /// Bytes of the line accepted so far, excluding escape markers.
    pub fn buffered(&self) -> usize {
        self.fields.iter().map(Vec::len).sum::<usize>() + self.current.len()
    }

    /// Whether a line is partially decoded.
    pub fn in_progress(&self) -> bool {
        self.escaping || !self.current.is_empty() || !self.fields.is_empty()
    }

    fn finish(&mut self) -> Frame {
        let fields = std::mem::take(&mut self.fields)
            .into_iter()
            .map(field_to_string)
            .collect();
        Frame::new(fields)
    }
}

fn field_to_string(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            warn!("field is not valid UTF-8, decoding lossily");
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    }
}

/// Decode every complete frame in `bytes`, ignoring any unterminated tail.
pub fn decode_all(bytes: &[u8]) -> Vec<Frame> {
    let mut decoder = FrameDecoder::new();
    bytes.iter().filter_map(|&b| decoder.push(b)).collect()
}

/// Read exactly one frame from `reader`.
///
/// Bytes after the terminator stay buffered in `reader`. Fails with
/// [`FrameError::Truncated`] if the stream ends before a terminator.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, FrameError>
where
    R: AsyncBufRead + Unpin,
{
    let mut decoder = FrameDecoder::new();
    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Err(FrameError::Truncated {
                buffered: decoder.buffered(),
            });
        }

        let mut consumed = 0;
        let mut frame = None;
        for &b in buf {
            consumed += 1;
            if let Some(done) = decoder.push(b) {
                frame = Some(done);
                break;
            }
        }
        reader.consume(consumed);

        if let Some(frame) = frame {
            return Ok(frame);
        }
    }
}

/// Prefix every delimiter, escape, and terminator byte in `field` with an
/// escape so it decodes back to itself.
pub fn escape_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        if matches!(c, '\\' | ',' | '\n') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Encode fields into one wire line.
///
/// Fields are joined with the delimiter. With `trailing_delimiter` one more
/// delimiter follows the last field. With `escape` each field passes through
/// [`escape_field`] first; without it fields are written verbatim.
pub fn encode<S: AsRef<str>>(fields: &[S], trailing_delimiter: bool, escape: bool) -> Vec<u8> {
    let mut line = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            line.push(DELIMITER as char);
        }
        if escape {
            line.push_str(&escape_field(field.as_ref()));
        } else {
            line.push_str(field.as_ref());
        }
    }
    if trailing_delimiter {
        line.push(DELIMITER as char);
    }
    line.push(TERMINATOR as char);
    line.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fields(frame: &Frame) -> Vec<&str> {
        frame.fields().iter().map(String::as_str).collect()
    }

    #[test]
    fn test_decode_escaped_delimiter_and_backslash() {
        let frames = decode_all(b"a\\,b,c\\\\d\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(fields(&frames[0]), vec!["a,b", "c\\d"]);
    }

    #[test]
    fn test_escaped_newline_is_data() {
        let frames = decode_all(b"multi\\\nline,x\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(fields(&frames[0]), vec!["multi\nline", "x"]);
    }

    #[test]
    fn test_escape_applies_to_exactly_one_byte() {
        let frames = decode_all(b"\\ab,\\\\,\\q\n");
        assert_eq!(fields(&frames[0]), vec!["ab", "\\", "q"]);
    }

    #[test]
    fn test_empty_line_is_one_empty_field() {
        let frames = decode_all(b"\n");
        assert_eq!(fields(&frames[0]), vec![""]);
    }

    #[test]
    fn test_empty_fields_are_kept() {
        let frames = decode_all(b",a,,\n");
        assert_eq!(fields(&frames[0]), vec!["", "a", "", ""]);
    }

    #[test]
    fn test_decoder_resets_between_lines() {
        let frames = decode_all(b"dev1,Lamp\ndev2,Fan\ndone\n");
        assert_eq!(frames.len(), 3);
        assert_eq!(fields(&frames[1]), vec!["dev2", "Fan"]);
        assert_eq!(frames[2].terminal(), Some(Terminal::Done));
    }

    #[test]
    fn test_unterminated_tail_is_ignored_by_decode_all() {
        let frames = decode_all(b"done\ndev1,La");
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_decoder_tracks_partial_line() {
        let mut decoder = FrameDecoder::new();
        assert!(!decoder.in_progress());
        for &b in b"ab,c" {
            assert!(decoder.push(b).is_none());
        }
        assert!(decoder.in_progress());
        assert_eq!(decoder.buffered(), 3);
    }

    #[test]
    fn test_non_ascii_bytes_pass_through() {
        let frames = decode_all("Lüfter,Küche\n".as_bytes());
        assert_eq!(fields(&frames[0]), vec!["Lüfter", "Küche"]);
    }

    #[test]
    fn test_terminal_is_first_field_only() {
        let record = Frame::new(vec!["dev3".into(), "done".into()]);
        assert_eq!(record.terminal(), None);

        let fail = Frame::new(vec!["fail".into(), "no such device".into()]);
        assert_eq!(fail.terminal(), Some(Terminal::Fail));
        assert_eq!(fail.detail(), "no such device");
    }

    #[test]
    fn test_detail_keeps_field_boundaries() {
        let escaped_comma = &decode_all(b"fail,a\\,b\n")[0];
        let two_fields = &decode_all(b"fail,a,b\n")[0];
        assert_eq!(escaped_comma.detail(), "a\\,b");
        assert_eq!(two_fields.detail(), "a,b");
        assert_ne!(escaped_comma.detail(), two_fields.detail());
    }

    #[test]
    fn test_frame_new_normalises_empty() {
        let frame = Frame::new(Vec::new());
        assert_eq!(frame.first(), "");
        assert_eq!(frame.fields().len(), 1);
    }

    #[test]
    fn test_encode_verbatim() {
        let line = encode(&["list-actions", "dev1"], false, false);
        assert_eq!(line, b"list-actions,dev1\n");
    }

    #[test]
    fn test_encode_trailing_delimiter() {
        let line = encode(&["action-run", "dev1", "a1", "5", "on"], true, false);
        assert_eq!(line, b"action-run,dev1,a1,5,on,\n");
    }

    #[test]
    fn test_encode_escapes_special_bytes() {
        let line = encode(&["say", "hi, there\\\n"], false, true);
        assert_eq!(line, b"say,hi\\, there\\\\\\\n\n");
    }

    #[test]
    fn test_escaped_encode_decodes_to_same_fields() {
        let original = vec!["a,b", "c\\d", "line\nbreak", ""];
        let frames = decode_all(&encode(&original, false, true));
        assert_eq!(frames.len(), 1);
        assert_eq!(fields(&frames[0]), original);
    }

    #[tokio::test]
    async fn test_read_frame_leaves_remaining_bytes_buffered() {
        let mut reader: &[u8] = b"dev1,Lamp\ndone\n";
        let first = read_frame(&mut reader).await.unwrap();
        assert_eq!(fields(&first), vec!["dev1", "Lamp"]);
        assert_eq!(reader, b"done\n");

        let second = read_frame(&mut reader).await.unwrap();
        assert_eq!(second.terminal(), Some(Terminal::Done));
    }

    #[tokio::test]
    async fn test_read_frame_truncated() {
        let mut reader: &[u8] = b"dev1,La";
        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, FrameError::Truncated { buffered: 6 }));
    }

    #[tokio::test]
    async fn test_read_frame_on_closed_stream() {
        let mut reader: &[u8] = b"";
        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, FrameError::Truncated { buffered: 0 }));
    }

    #[tokio::test]
    async fn test_read_frame_across_small_reads() {
        let data: &[u8] = b"x\\,y,z\n";
        let mut reader = tokio::io::BufReader::with_capacity(2, data);
        let frame = read_frame(&mut reader).await.unwrap();
        assert_eq!(fields(&frame), vec!["x,y", "z"]);
    }
}
