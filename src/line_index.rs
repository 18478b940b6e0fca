//! Line/offset index - (line, column) to byte offset in UTF-8 text
//!
//! The text-format parser reports locations as (line, column) pairs where
//! the column counts characters; anchors need absolute byte offsets. The
//! index is built once per buffer and is immutable afterwards. Lines are
//! 1-indexed and columns 0-indexed, the usual text-editor coordinates.

/// Immutable index over one UTF-8 buffer.
#[derive(Debug)]
pub struct LineIndex<'a> {
    text: &'a str,
    // Byte offset of the first byte of each line.
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut line_starts = vec![0];
        for (i, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { text, line_starts }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Byte offset of the character at (line, column).
    ///
    /// `line` is 1-indexed, `column` is a 0-indexed *character* position;
    /// multi-byte UTF-8 sequences count as one column. A column equal to the
    /// line's character length addresses the line terminator. Out-of-bounds
    /// coordinates return `None`.
    pub fn byte_offset(&self, line: u32, column: u32) -> Option<usize> {
        if line == 0 {
            return None;
        }
        let start = *self.line_starts.get(line as usize - 1)?;
        let end = self
            .line_starts
            .get(line as usize)
            .map(|next| next - 1) // exclude the newline itself
            .unwrap_or(self.text.len());
        let line_text = &self.text[start..end];

        if column == 0 {
            return Some(start);
        }
        let mut remaining = column as usize;
        for (byte_idx, _) in line_text.char_indices() {
            if remaining == 0 {
                return Some(start + byte_idx);
            }
            remaining -= 1;
        }
        // Column one past the last character addresses the end of the line.
        if remaining == 0 {
            Some(start + line_text.len())
        } else {
            None
        }
    }

    /// The `length` characters starting at (line, column), possibly spanning
    /// line boundaries. `None` if the start is out of bounds or fewer than
    /// `length` characters remain.
    pub fn substring(&self, line: u32, column: u32, length: usize) -> Option<&'a str> {
        let start = self.byte_offset(line, column)?;
        let mut chars = self.text[start..].char_indices();
        for _ in 0..length {
            chars.next()?;
        }
        let end = start + chars.next().map(|(i, _)| i).unwrap_or(self.text.len() - start);
        Some(&self.text[start..end])
    }
}
