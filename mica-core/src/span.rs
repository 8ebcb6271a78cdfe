//! Source positions and spans.

/// Identifier of a source file within one compilation unit.
///
/// The core pipeline compiles a single buffer at a time, so this is
/// usually `FileId(0)`, but diagnostics carry it so that an embedding
/// host compiling several units can tell spans apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileId(pub u32);

/// A byte range within a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub file: FileId,
    /// Byte offset of the first character.
    pub start: u32,
    /// Byte offset one past the last character.
    pub end: u32,
}

impl Span {
    pub fn new(file: FileId, start: u32, end: u32) -> Span {
        Span { file, start, end }
    }

    /// Zero-width span at a single byte offset.
    pub fn point(file: FileId, at: u32) -> Span {
        Span { file, start: at, end: at }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn merge(self, other: Span) -> Span {
        Span {
            file: self.file,
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// The source text this span covers.
    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        &source[self.start as usize..self.end as usize]
    }

    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_covers_both_spans() {
        let a = Span::new(FileId(0), 4, 8);
        let b = Span::new(FileId(0), 6, 12);
        let m = a.merge(b);
        assert_eq!((m.start, m.end), (4, 12));
    }

    #[test]
    fn text_slices_the_source() {
        let src = "let x = 1";
        let s = Span::new(FileId(0), 4, 5);
        assert_eq!(s.text(src), "x");
    }
}
