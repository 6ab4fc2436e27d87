//! On-disk bytecode persistence (spec.md §6): a text header of
//! immediates (one tag byte plus a textual rendering per line), the
//! literal separator line `@Section:Program`, then the raw program
//! byte buffer. Optional — only the `wisp run-bytecode` CLI
//! subcommand consumes it; nothing in the VM or compiler depends on
//! this module existing.

use std::fmt;
use std::io::{self, BufRead, BufReader, Read, Write};

use crate::vm::context::Context;
use crate::vm::heap::{Heap, Pointer, Tag};

const SEPARATOR: &[u8] = b"@Section:Program\n";

#[derive(Debug)]
pub enum PersistError {
    Io(io::Error),
    Format(String),
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistError::Io(e) => write!(f, "{}", e),
            PersistError::Format(message) => write!(f, "malformed bytecode file: {}", message),
        }
    }
}

impl std::error::Error for PersistError {}

impl From<io::Error> for PersistError {
    fn from(e: io::Error) -> PersistError {
        PersistError::Io(e)
    }
}

fn render_immediate(heap: &Heap, ptr: Pointer) -> (u8, String) {
    match heap.tag(ptr) {
        Tag::Integer => (0, heap.read_integer(ptr).to_string()),
        Tag::Float => (1, heap.read_float(ptr).to_string()),
        Tag::Complex => {
            let (re, im) = heap.read_complex(ptr);
            (2, format!("{} {}", re, im))
        }
        Tag::Character => (3, heap.read_character(ptr).to_string()),
        Tag::String => (4, heap.read_string(ptr).to_string()),
        Tag::Symbol => (5, heap.read_string(heap.symbol_name(ptr)).to_string()),
        Tag::Boolean => (6, heap.read_boolean(ptr).to_string()),
        Tag::Null => (7, String::new()),
        other => panic!("persist: immediate slot holds a non-literal tag {:?}", other),
    }
}

fn materialize_immediate(heap: &mut Heap, tag: u8, text: &str) -> Result<Pointer, PersistError> {
    let bad = |what: &str| PersistError::Format(format!("invalid {} literal {:?}", what, text));
    Ok(match tag {
        0 => heap.alloc_integer(text.parse().map_err(|_| bad("Integer"))?),
        1 => heap.alloc_float(text.parse().map_err(|_| bad("Float"))?),
        2 => {
            let mut parts = text.split_whitespace();
            let re: f64 = parts.next().ok_or_else(|| bad("Complex"))?.parse().map_err(|_| bad("Complex"))?;
            let im: f64 = parts.next().ok_or_else(|| bad("Complex"))?.parse().map_err(|_| bad("Complex"))?;
            heap.alloc_complex(re, im)
        }
        3 => heap.alloc_character(text.chars().next().ok_or_else(|| bad("Character"))?),
        4 => heap.alloc_string(text),
        5 => {
            let name = heap.alloc_string(text);
            heap.alloc_symbol(name)
        }
        6 => heap.alloc_boolean(text.parse().map_err(|_| bad("Boolean"))?),
        7 => heap.alloc_null(),
        other => return Err(PersistError::Format(format!("unknown immediate tag byte {}", other))),
    })
}

/// Writes every immediate `ctx` currently knows about plus the whole
/// program buffer (the part a fresh `run-bytecode` invocation would
/// need to replay it end to end) to `writer`.
pub fn save(ctx: &Context, writer: &mut impl Write) -> Result<(), PersistError> {
    for &immediate in &ctx.immediates {
        let (tag, text) = render_immediate(ctx.heap(), immediate);
        writer.write_all(&[tag])?;
        writer.write_all(text.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.write_all(SEPARATOR)?;
    writer.write_all(&ctx.code)?;
    Ok(())
}

/// Loads a bytecode file into `ctx`, re-interning its immediates and
/// appending its program buffer, then runs every segment the buffer
/// contains (one per top-level `Exit`) in order, returning each
/// segment's result.
pub fn load(ctx: &mut Context, reader: &mut impl Read) -> Result<Vec<Pointer>, PersistError> {
    let mut reader = BufReader::new(reader);
    let mut immediates = Vec::new();

    loop {
        let mut tag_byte = [0u8; 1];
        reader.read_exact(&mut tag_byte)?;
        if tag_byte[0] == SEPARATOR[0] {
            let mut rest = Vec::new();
            reader.read_until(b'\n', &mut rest)?;
            break;
        }

        let mut text_bytes = Vec::new();
        reader.read_until(b'\n', &mut text_bytes)?;
        if text_bytes.last() == Some(&b'\n') {
            text_bytes.pop();
        }
        let text = String::from_utf8(text_bytes).map_err(|_| PersistError::Format("non-UTF8 immediate".into()))?;
        immediates.push(materialize_immediate(ctx.heap_mut(), tag_byte[0], &text)?);
    }

    let mut code = Vec::new();
    reader.read_to_end(&mut code)?;

    let entry = ctx.append_raw(code, immediates);
    ctx.run_segments_from(entry).map_err(|trace| PersistError::Format(trace.to_string()))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use wisp_common::Source;

    use super::*;

    #[test]
    fn save_then_load_runs_every_segment_in_order() {
        let mut ctx = Context::new();
        crate::kernel::install(&mut ctx);
        ctx.exec(Source::source("(def x 10)")).unwrap();
        ctx.exec(Source::source("(+ x 1)")).unwrap();

        let mut buffer = Vec::new();
        save(&ctx, &mut buffer).unwrap();

        let mut fresh = Context::new();
        crate::kernel::install(&mut fresh);
        let results = load(&mut fresh, &mut Cursor::new(buffer)).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(fresh.heap().read_integer(results[1]), 11);
    }
}
