use std::fmt;

use wisp_common::Span;

/// The category of a runtime error, used both for `Display` and so
/// callers (e.g. the REPL) can match on what went wrong without
/// string-sniffing the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Type,
    Conversion,
    Arity,
    Runtime,
    Resource,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Type => "Type",
            Kind::Conversion => "Conversion",
            Kind::Arity => "Arity",
            Kind::Runtime => "Runtime",
            Kind::Resource => "Resource",
        };
        write!(f, "{}", name)
    }
}

/// A runtime error: a kind, a message, and the call-stack spans
/// collected while unwinding, most recent call first by the time
/// `Display` walks them in reverse.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    kind: Kind,
    message: String,
    spans: Vec<Span>,
}

impl Trace {
    pub fn error(kind: Kind, message: impl Into<String>) -> Trace {
        Trace { kind, message: message.into(), spans: vec![] }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Appends a call site's span while the VM unwinds the call stack.
    pub fn add_context(&mut self, span: Span) {
        self.spans.push(span);
    }

    pub fn type_error(tag: &str, reason: &str) -> Trace {
        Trace::error(Kind::Type, format!("expected {}, {}", tag, reason))
    }

    pub fn conversion_error(from: &str, to: &str) -> Trace {
        Trace::error(Kind::Conversion, format!("can't convert {} to {}", from, to))
    }

    pub fn arity_error(expected: usize, got: usize) -> Trace {
        Trace::error(Kind::Arity, format!("expected {} argument(s), got {}", expected, got))
    }

    pub fn division_by_zero() -> Trace {
        Trace::error(Kind::Runtime, "division by zero")
    }

    pub fn resource_exhausted(reason: &str) -> Trace {
        Trace::error(Kind::Resource, reason)
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Traceback, most recent call last:")?;
        for span in self.spans.iter().rev() {
            fmt::Display::fmt(span, f)?;
        }
        write!(f, "Runtime {} Error: {}", self.kind, self.message)
    }
}

impl std::error::Error for Trace {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_mentions_kind_and_message() {
        let trace = Trace::division_by_zero();
        let rendered = trace.to_string();
        assert!(rendered.contains("Runtime Error"));
        assert!(rendered.contains("division by zero"));
    }

    #[test]
    fn context_spans_render_most_recent_first() {
        let mut trace = Trace::error(Kind::Type, "bad argument");
        trace.add_context(Span::empty());
        trace.add_context(Span::empty());
        assert_eq!(trace.spans.len(), 2);
    }
}
