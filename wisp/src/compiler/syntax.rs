use std::fmt;

use wisp_common::Span;

/// A location in source code with an optional hint, attached to a
/// `Syntax` error. Most errors carry exactly one note; a handful
/// (mismatched delimiters) carry two, one per paren.
#[derive(Debug, PartialEq, Eq)]
pub struct Note {
    pub span: Span,
    pub hint: Option<String>,
}

impl Note {
    pub fn new(span: Span) -> Note {
        Note { span, hint: None }
    }

    pub fn with_hint(span: Span, hint: &str) -> Note {
        Note { span, hint: Some(hint.to_string()) }
    }
}

/// A compile-time error: malformed syntax, an unresolved name, or a
/// bytecode limit (jump offset, argument count) blown past. Raised by
/// the lexer, parser, resolver, and bytecode builder alike.
#[derive(Debug, PartialEq, Eq)]
pub struct Syntax {
    pub reason: String,
    pub notes: Vec<Note>,
}

impl Syntax {
    pub fn error(reason: &str, span: &Span) -> Syntax {
        Syntax { reason: reason.to_string(), notes: vec![Note::new(span.clone())] }
    }

    pub fn error_with_hint(reason: &str, span: &Span, hint: &str) -> Syntax {
        Syntax { reason: reason.to_string(), notes: vec![Note::with_hint(span.clone(), hint)] }
    }

    pub fn error_no_note(reason: &str) -> Syntax {
        Syntax { reason: reason.to_string(), notes: vec![] }
    }

    pub fn add_note(mut self, note: Note) -> Self {
        self.notes.push(note);
        self
    }
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for note in self.notes.iter() {
            write!(f, "{}", note.span)?;
            if let Some(hint) = &note.hint {
                writeln!(f, "note: {}", hint)?;
            }
        }
        write!(f, "Syntax Error: {}", self.reason)
    }
}

impl std::error::Error for Syntax {}

#[cfg(test)]
mod test {
    use super::*;
    use wisp_common::Source;

    #[test]
    fn error_mentions_reason() {
        let source = Source::source("(+ 1 foo)");
        let error = Syntax::error("unresolved name 'foo'", &Span::new(&source, 5, 3));
        let rendered = format!("{}", error);
        assert!(rendered.ends_with("Syntax Error: unresolved name 'foo'"));
    }
}
