use std::fmt::{Display, Formatter, Result};

/// A literal value as it comes out of the lexer, before it has been
/// interned into a `Context`'s immediates pool or allocated on the
/// heap. Mirrors the subset of `wisp`'s value tags that can appear as
/// source-text literals (Pair, Function, Box, and RawPointer are never
/// literals — they only ever arise from evaluation).
#[derive(Debug, Clone, PartialEq, proptest_derive::Arbitrary)]
pub enum Lit {
    Integer(i32),
    Float(f64),
    Complex(f64, f64),
    Character(char),
    String(String),
    Symbol(String),
    Boolean(bool),
    Null,
}

impl Display for Lit {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Lit::Integer(n) => write!(f, "{}", n),
            Lit::Float(n) => write!(f, "{}", n),
            Lit::Complex(re, im) => write!(f, "{}+{}i", re, im),
            Lit::Character(c) => write!(f, "{}", c),
            Lit::String(s) => write!(f, "{}", s),
            Lit::Symbol(s) => write!(f, "{}", s),
            Lit::Boolean(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            Lit::Null => write!(f, "null"),
        }
    }
}
