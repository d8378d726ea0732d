use std::{
    fmt,
    fs,
    io,
    path::{Path, PathBuf},
    rc::Rc,
};

/// A source file (or REPL line) that has been loaded into memory.
///
/// `Source` is the thing every [`Span`] ultimately points back into;
/// keeping it behind an `Rc` lets every token, AST node, and diagnostic
/// share one copy of the program text instead of cloning substrings.
#[derive(Debug, PartialEq, Eq)]
pub struct Source {
    pub contents: String,
    pub path: PathBuf,
}

impl Source {
    /// Wraps a string as a `Source`, pointing at a given path.
    pub fn new(contents: &str, path: &Path) -> Rc<Source> {
        Rc::new(Source { contents: contents.to_string(), path: path.to_owned() })
    }

    /// Reads a file off disk into a `Source`.
    pub fn path(path: &Path) -> io::Result<Rc<Source>> {
        let contents = fs::read_to_string(path)?;
        Ok(Source::new(&contents, path))
    }

    /// Builds a `Source` with no backing file, e.g. a REPL line.
    pub fn source(contents: &str) -> Rc<Source> {
        Source::new(contents, &PathBuf::from("<script>"))
    }
}

/// A half-open byte range `[offset, offset + length)` into a [`Source`].
///
/// Line numbers are not stored directly; they are recovered on demand by
/// counting `\n` bytes up to `offset`, matching the scanner's own line
/// counter (§8 property 1: `max(token.line)` is the LF count + 1).
#[derive(Debug, Clone)]
pub struct Span {
    pub source: Rc<Source>,
    pub offset: usize,
    pub length: usize,
}

impl PartialEq for Span {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.source, &other.source)
            && self.offset == other.offset
            && self.length == other.length
    }
}
impl Eq for Span {}

impl Span {
    pub fn new(source: &Rc<Source>, offset: usize, length: usize) -> Span {
        Span { source: Rc::clone(source), offset, length }
    }

    /// A zero-width span pointing at a single byte offset, used for EOF.
    pub fn point(source: &Rc<Source>, offset: usize) -> Span {
        Span { source: Rc::clone(source), offset, length: 0 }
    }

    /// Spans the union of two spans from the same source.
    pub fn combine(a: &Span, b: &Span) -> Span {
        assert!(Rc::ptr_eq(&a.source, &b.source), "can't combine spans from different sources");
        let offset = a.offset.min(b.offset);
        let end = (a.offset + a.length).max(b.offset + b.length);
        Span::new(&a.source, offset, end - offset)
    }

    pub fn contents(&self) -> &str {
        &self.source.contents[self.offset..self.offset + self.length]
    }

    /// 1-indexed line on which this span starts.
    pub fn line(&self) -> usize {
        self.source.contents[..self.offset].matches('\n').count() + 1
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}]", self.line())
    }
}

/// An `item` paired with the `Span` it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned<T> {
    pub item: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(item: T, span: Span) -> Spanned<T> {
        Spanned { item, span }
    }
}
