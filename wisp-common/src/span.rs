use std::{
    fmt::{Display, Formatter, Result},
    rc::Rc,
    usize,
};

use crate::source::Source;

/// A range of a `Source`, used to point error messages and debug
/// output back at the text that produced them.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Span {
    source: Option<Rc<Source>>,
    offset: usize,
    length: usize,
}

impl Span {
    pub fn new(source: &Rc<Source>, offset: usize, length: usize) -> Span {
        Span { source: Some(Rc::clone(source)), offset, length }
    }

    /// A `Span` pointing at a single byte.
    pub fn point(source: &Rc<Source>, offset: usize) -> Span {
        Span { source: Some(Rc::clone(source)), offset, length: 1 }
    }

    /// An empty `Span`, absorbed by any other `Span` under `combine`.
    pub fn empty() -> Span {
        Span { source: None, offset: 0, length: usize::MAX }
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_none()
    }

    /// The smallest `Span` that contains both `a` and `b`.
    pub fn combine(a: &Span, b: &Span) -> Span {
        if a.is_empty() {
            return b.clone();
        }
        if b.is_empty() {
            return a.clone();
        }

        if a.source != b.source {
            panic!("can't combine two spans from separate sources");
        }

        let offset = a.offset.min(b.offset);
        let end = (a.offset + a.length).max(b.offset + b.length);
        Span::new(a.source.as_ref().unwrap(), offset, end - offset)
    }

    pub fn join(mut spans: Vec<Span>) -> Span {
        let mut combined = match spans.pop() {
            Some(span) => span,
            None => return Span::empty(),
        };

        while let Some(span) = spans.pop() {
            combined = Span::combine(&combined, &span);
        }

        combined
    }

    pub fn contents(&self) -> String {
        if self.is_empty() {
            panic!("an empty span has no contents");
        }
        self.source.as_ref().unwrap().contents[self.offset..(self.offset + self.length)]
            .to_string()
    }

    fn line_indices(&self) -> Option<((usize, usize), (usize, usize))> {
        if self.is_empty() {
            panic!("an empty span has no line indices");
        }

        let start = self.offset;
        let end = self.offset + self.length;
        let contents = &self.source.as_ref().unwrap().contents;

        let start_lines: Vec<&str> = contents[..=start.min(contents.len() - 1)].lines().collect();
        let end_lines: Vec<&str> = contents[..=end.min(contents.len() - 1)].lines().collect();

        let start_line = start_lines.len().saturating_sub(1);
        let end_line = end_lines.len().saturating_sub(1);

        let start_col = start_lines.last()?.len().saturating_sub(1);
        let end_col = end_lines.last()?.len().saturating_sub(1);

        Some(((start_line, start_col), (end_line, end_col)))
    }
}

impl Display for Span {
    /// Renders a caret-underlined snippet, e.g.:
    /// ```plain
    /// Line 1:4
    ///   |
    /// 1 | (+ 1 foo)
    ///   |    ^^^
    /// ```
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        if self.is_empty() {
            panic!("can't display an empty span");
        }

        let lines: Vec<&str> = self.source.as_ref().unwrap().contents.lines().collect();
        let ((start_line, start_col), (end_line, _end_col)) = match self.line_indices() {
            Some(li) => li,
            None => return Ok(()),
        };

        let readable_start_line = (start_line + 1).to_string();
        let readable_end_line = (end_line + 1).to_string();
        let padding = readable_end_line.len();

        let location = format!("Line {}:{}", readable_start_line, start_col + 1);
        let separator = format!("{} |", " ".repeat(padding));

        writeln!(f, "{}", location)?;
        writeln!(f, "{}", separator)?;

        if start_line == end_line {
            let l = lines.get(end_line).copied().unwrap_or("");
            writeln!(f, "{} | {}", readable_end_line, l)?;
            writeln!(
                f,
                "{} | {}{}",
                " ".repeat(padding),
                " ".repeat(start_col),
                "^".repeat(self.length.max(1)),
            )
        } else {
            let formatted = lines[start_line..=end_line.min(lines.len().saturating_sub(1))]
                .iter()
                .enumerate()
                .map(|(i, l)| {
                    let readable_line_no = (start_line + i + 1).to_string();
                    let partial_padding = " ".repeat(padding - readable_line_no.len());
                    format!("{}{} > {}", partial_padding, readable_line_no, l)
                })
                .collect::<Vec<String>>()
                .join("\n");

            writeln!(f, "{}", formatted)?;
            writeln!(f, "{}", separator)
        }
    }
}

/// Pairs an item with the `Span` it was parsed from.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Spanned<T> {
    pub item: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(item: T, span: Span) -> Spanned<T> {
        Spanned { item, span }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> {
        Spanned { item: f(self.item), span: self.span }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn combination() {
        let source = Source::source("heck, that's awesome");
        let a = Span::new(&source, 0, 5);
        let b = Span::new(&source, 11, 2);

        assert_eq!(Span::combine(&a, &b), Span::new(&source, 0, 13));
    }

    #[test]
    fn span_and_contents() {
        let source = Source::source("hello, this is some text!");
        let spans = vec![
            Span::new(&source, 0, 8),
            Span::new(&source, 7, 5),
            Span::new(&source, 12, 4),
        ];
        let result = Span::new(&source, 0, 16);

        assert_eq!(Span::join(spans).contents(), result.contents());
    }
}
