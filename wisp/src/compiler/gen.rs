use wisp_common::{Lit, Opcode, Spanned};

use crate::compiler::syntax::Syntax;
use crate::construct::{Ast, SymbolTable};

/// A fully assembled program: one flat instruction buffer plus the
/// deduplicated pool of literal immediates it indexes into. Lambda
/// bodies live inline in the same buffer — `PushLambda` and friends
/// carry the bytecode address to jump to on `Call`, and the builder
/// emits an unconditional `Jump` ahead of every lambda body so normal
/// control flow steps over it.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub code: Vec<u8>,
    pub immediates: Vec<Lit>,
}

impl Program {
    fn emit(&mut self, opcode: Opcode) {
        self.code.push(opcode as u8);
    }

    fn emit_u16(&mut self, value: u16) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }

    /// Dedups by value: re-emits the index of an existing entry if
    /// `lit` has already been interned, matching the Context-level
    /// immediates pool's dedup-by-value rule for everything but
    /// symbols (symbols are deduped by identity at intern time, before
    /// they ever reach here as a `Lit::Symbol`).
    fn index_immediate(&mut self, lit: Lit) -> Result<u16, Syntax> {
        if let Some(index) = self.immediates.iter().position(|existing| existing == &lit) {
            return Ok(index as u16);
        }

        let index = self.immediates.len();
        if index > u16::MAX as usize {
            return Err(Syntax::error_no_note(
                "too many distinct literals in one program (immediates pool overflowed u16)",
            ));
        }

        self.immediates.push(lit);
        Ok(index as u16)
    }

    /// Emits a jump opcode with a placeholder operand, returning the
    /// buffer offset of that operand so it can be patched once the
    /// jump target is known.
    fn emit_jump(&mut self, opcode: Opcode) -> usize {
        self.emit(opcode);
        let patch_at = self.code.len();
        self.emit_u16(0);
        patch_at
    }

    fn patch_jump(&mut self, patch_at: usize) -> Result<(), Syntax> {
        let target = self.code.len();
        if target > u16::MAX as usize {
            return Err(Syntax::error_no_note("jump target overflowed a u16 program offset"));
        }
        let bytes = (target as u16).to_le_bytes();
        self.code[patch_at..patch_at + 2].copy_from_slice(&bytes);
        Ok(())
    }
}

pub fn compile_program(forms: &[Spanned<Ast>], symbols: &SymbolTable) -> Result<Program, Syntax> {
    let mut program = Program::default();
    compile_statements(forms, &mut program, symbols, 0)?;
    program.emit(Opcode::Exit);
    Ok(program)
}

/// Compiles a sequence of statements. Every statement, `def` included,
/// leaves exactly one value on the operand stack (`def`'s own codegen
/// pushes a null after installing its local via `Store`), so every
/// statement is treated uniformly here: non-final ones are followed
/// by a `Discard`; the sequence's own value is whatever the final
/// statement leaves behind.
///
/// `let_depth` counts the `let` frames currently open around this
/// sequence within the enclosing function (reset to 0 at each
/// `lambda`/top level, incremented for a `let` body) — `recur` needs
/// it to unwind exactly that many frames before jumping back.
fn compile_statements(
    body: &[Spanned<Ast>],
    program: &mut Program,
    symbols: &SymbolTable,
    let_depth: u32,
) -> Result<(), Syntax> {
    if body.is_empty() {
        program.emit(Opcode::PushNull);
        return Ok(());
    }

    for (i, form) in body.iter().enumerate() {
        compile_expr(form, program, symbols, let_depth)?;
        let is_last = i + 1 == body.len();
        if !is_last {
            program.emit(Opcode::Discard);
        }
    }
    Ok(())
}

fn compile_body(
    body: &[Spanned<Ast>],
    program: &mut Program,
    symbols: &SymbolTable,
    let_depth: u32,
) -> Result<(), Syntax> {
    compile_statements(body, program, symbols, let_depth)
}

fn compile_expr(
    form: &Spanned<Ast>,
    program: &mut Program,
    symbols: &SymbolTable,
    let_depth: u32,
) -> Result<(), Syntax> {
    match &form.item {
        Ast::Literal(lit) => compile_literal(lit, program),

        Ast::Symbol { slot, .. } => {
            let (frame_dist, offset) = slot.get().expect("unresolved symbol reached codegen");
            emit_load(frame_dist, offset, program);
            Ok(())
        }

        Ast::Quote(inner) => compile_quoted(inner, program, symbols),

        Ast::If { cond, then, otherwise } => {
            compile_expr(cond, program, symbols, let_depth)?;
            let else_patch = program.emit_jump(Opcode::JumpIfFalse);
            compile_expr(then, program, symbols, let_depth)?;
            let end_patch = program.emit_jump(Opcode::Jump);
            program.patch_jump(else_patch)?;
            match otherwise {
                Some(otherwise) => compile_expr(otherwise, program, symbols, let_depth)?,
                None => program.emit(Opcode::PushNull),
            }
            program.patch_jump(end_patch)?;
            Ok(())
        }

        Ast::Def { value, .. } => {
            compile_expr(value, program, symbols, let_depth)?;
            program.emit(Opcode::Store);
            program.emit(Opcode::PushNull);
            Ok(())
        }

        Ast::Set { slot, value, .. } => {
            compile_expr(value, program, symbols, let_depth)?;
            let (frame_dist, offset) = slot.get().expect("unresolved set target reached codegen");
            program.emit(Opcode::Rebind);
            program.emit_u16(frame_dist);
            program.emit_u16(offset);
            program.emit(Opcode::PushNull);
            Ok(())
        }

        Ast::Lambda { params, variadic, docstring, body } => {
            let skip_patch = program.emit_jump(Opcode::Jump);
            let entry = program.code.len();
            // A lambda body starts a fresh function: no enclosing
            // `let` frame needs unwinding by a `recur` directly inside
            // it, so let_depth resets to 0 here.
            compile_body(body, program, symbols, 0)?;
            program.emit(Opcode::Return);
            program.patch_jump(skip_patch)?;

            if entry > u16::MAX as usize {
                return Err(Syntax::error_no_note("lambda entry address overflowed a u16"));
            }
            if params.len() > 255 {
                return Err(Syntax::error_no_note("lambda has more than 255 parameters"));
            }

            match (variadic.is_some(), docstring) {
                (true, _) => {
                    program.emit(Opcode::PushVariadicLambda);
                    program.emit_u16(entry as u16);
                    program.emit_u16(params.len() as u16);
                }
                (false, Some(text)) => {
                    let index = program.index_immediate(Lit::String(text.clone()))?;
                    program.emit(Opcode::PushDocumentedLambda);
                    program.emit_u16(entry as u16);
                    program.emit_u16(params.len() as u16);
                    program.emit_u16(index);
                }
                (false, None) => {
                    program.emit(Opcode::PushLambda);
                    program.emit_u16(entry as u16);
                    program.emit_u16(params.len() as u16);
                }
            }
            Ok(())
        }

        Ast::Let { bindings, body } => {
            program.emit(Opcode::EnterLet);
            for (_, _, value) in bindings {
                compile_expr(value, program, symbols, let_depth)?;
                program.emit(Opcode::Store);
            }
            compile_body(body, program, symbols, let_depth + 1)?;
            program.emit(Opcode::ExitLet);
            Ok(())
        }

        Ast::Begin(items) => compile_body(items, program, symbols, let_depth),

        Ast::Namespace { body, .. } => compile_body(body, program, symbols, let_depth),

        Ast::And(items) => compile_and(items, program, symbols, let_depth),
        Ast::Or(items) => compile_or(items, program, symbols, let_depth),

        Ast::Recur(args) => {
            for arg in args {
                compile_expr(arg, program, symbols, let_depth)?;
            }
            if args.len() > 255 {
                return Err(Syntax::error_no_note("recur called with more than 255 arguments"));
            }
            // Arguments are evaluated while any enclosing `let`
            // frames are still live (they may reference let-bound
            // locals); only once they're safely on the operand stack
            // do we unwind those frames, so the VM lands back at the
            // function's own frame before re-entering its top.
            for _ in 0..let_depth {
                program.emit(Opcode::ExitLet);
            }
            program.emit(Opcode::Recur);
            program.emit_u16(args.len() as u16);
            Ok(())
        }

        Ast::Call { callee, args } => {
            for arg in args {
                compile_expr(arg, program, symbols, let_depth)?;
            }
            compile_expr(callee, program, symbols, let_depth)?;
            if args.len() > 255 {
                return Err(Syntax::error_no_note("call has more than 255 arguments"));
            }
            program.emit(Opcode::Call);
            program.emit_u16(args.len() as u16);
            Ok(())
        }

        // Only reachable unquoted when the resolver is bypassed
        // (compile_program is always preceded by resolve in practice);
        // kept as a defensive match arm rather than a `_` wildcard so
        // adding a new `Ast` variant can't silently skip codegen.
        Ast::DottedList { .. } => Err(Syntax::error_no_note(
            "a dotted list can only appear inside 'quote'",
        )),
    }
}

fn emit_load(frame_dist: u16, offset: u16, program: &mut Program) {
    match frame_dist {
        0 if offset <= u8::MAX as u16 => {
            program.emit(Opcode::Load0Fast);
            program.emit_u16(offset);
        }
        1 if offset <= u8::MAX as u16 => {
            program.emit(Opcode::Load1Fast);
            program.emit_u16(offset);
        }
        0 => {
            program.emit(Opcode::Load0);
            program.emit_u16(offset);
        }
        1 => {
            program.emit(Opcode::Load1);
            program.emit_u16(offset);
        }
        2 => {
            program.emit(Opcode::Load2);
            program.emit_u16(offset);
        }
        _ => {
            program.emit(Opcode::Load);
            program.emit_u16(frame_dist);
            program.emit_u16(offset);
        }
    }
}

fn compile_literal(lit: &Lit, program: &mut Program) -> Result<(), Syntax> {
    match lit {
        Lit::Integer(i) if *i >= i16::MIN as i32 && *i <= i16::MAX as i32 => {
            program.emit(Opcode::PushI);
            program.emit_u16(*i as u16);
        }
        Lit::Null => program.emit(Opcode::PushNull),
        Lit::Boolean(true) => program.emit(Opcode::PushTrue),
        Lit::Boolean(false) => program.emit(Opcode::PushFalse),
        other => {
            let index = program.index_immediate(other.clone())?;
            program.emit(Opcode::PushImmediate);
            program.emit_u16(index);
        }
    }
    Ok(())
}

fn compile_quoted(datum: &Spanned<Ast>, program: &mut Program, symbols: &SymbolTable) -> Result<(), Syntax> {
    // A quoted symbol evaluates to the symbol itself rather than
    // triggering a variable lookup; everything else quoted is just
    // its own literal value.
    match &datum.item {
        Ast::Symbol { name, .. } => {
            let index = program.index_immediate(Lit::Symbol(symbols.name(*name).to_string()))?;
            program.emit(Opcode::PushImmediate);
            program.emit_u16(index);
            Ok(())
        }
        Ast::Literal(lit) => compile_literal(lit, program),
        Ast::DottedList { elements, tail } => compile_dotted_list(elements, tail, program, symbols),
        _ => compile_expr(datum, program, symbols, 0),
    }
}

/// Builds the runtime pair chain for a quoted `(a b . c)`: `cons(a,
/// cons(b, c))`. Each element (and the tail) is itself quoted data, so
/// it's compiled through `compile_quoted`, not `compile_expr`.
fn compile_dotted_list(
    elements: &[Spanned<Ast>],
    tail: &Spanned<Ast>,
    program: &mut Program,
    symbols: &SymbolTable,
) -> Result<(), Syntax> {
    match elements.split_first() {
        None => compile_quoted(tail, program, symbols),
        Some((head, rest)) => {
            compile_quoted(head, program, symbols)?;
            compile_dotted_list(rest, tail, program, symbols)?;
            program.emit(Opcode::Cons);
            Ok(())
        }
    }
}

/// `(and a b c)`: evaluates left to right, stopping and returning the
/// first falsy value; if every value is truthy, returns the last.
/// Each test is duplicated with `Dup` so `JumpIfFalse` can consume the
/// copy while leaving the original as the short-circuit result.
fn compile_and(items: &[Spanned<Ast>], program: &mut Program, symbols: &SymbolTable, let_depth: u32) -> Result<(), Syntax> {
    match items.split_first() {
        None => {
            program.emit(Opcode::PushTrue);
            Ok(())
        }
        Some((head, [])) => compile_expr(head, program, symbols, let_depth),
        Some((head, rest)) => {
            compile_expr(head, program, symbols, let_depth)?;
            program.emit(Opcode::Dup);
            let short_circuit = program.emit_jump(Opcode::JumpIfFalse);
            program.emit(Opcode::Discard);
            compile_and(rest, program, symbols, let_depth)?;
            program.patch_jump(short_circuit)?;
            Ok(())
        }
    }
}

/// `(or a b c)`: evaluates left to right, stopping and returning the
/// first truthy value; if every value is falsy, returns the last.
fn compile_or(items: &[Spanned<Ast>], program: &mut Program, symbols: &SymbolTable, let_depth: u32) -> Result<(), Syntax> {
    match items.split_first() {
        None => {
            program.emit(Opcode::PushFalse);
            Ok(())
        }
        Some((head, [])) => compile_expr(head, program, symbols, let_depth),
        Some((head, rest)) => {
            compile_expr(head, program, symbols, let_depth)?;
            program.emit(Opcode::Dup);
            let keep_head = program.emit_jump(Opcode::JumpIfFalse);
            let short_circuit = program.emit_jump(Opcode::Jump);
            program.patch_jump(keep_head)?;
            program.emit(Opcode::Discard);
            compile_or(rest, program, symbols, let_depth)?;
            program.patch_jump(short_circuit)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lex::Lexer;
    use crate::compiler::parse::Parser;
    use crate::compiler::resolve::resolve;
    use crate::construct::{Scope, SymbolTable};
    use wisp_common::Source;

    fn compile(src: &str) -> Program {
        let mut symbols = SymbolTable::new();
        let tokens = Lexer::lex(Source::source(src)).unwrap();
        let forms = Parser::parse_program(tokens, &mut symbols).unwrap();
        let mut scope = Scope::new(None);
        resolve(&forms, &mut scope).unwrap();
        compile_program(&forms, &symbols).unwrap()
    }

    #[test]
    fn repeated_float_literal_shares_one_immediate_slot() {
        let program = compile("(begin 3.14 3.14 3.14)");
        assert_eq!(program.immediates.len(), 1);
    }

    #[test]
    fn repeated_string_literal_shares_one_immediate_slot() {
        let program = compile("(begin \"hi\" \"hi\")");
        assert_eq!(program.immediates.len(), 1);
    }

    #[test]
    fn distinct_literals_get_distinct_immediate_slots() {
        let program = compile("(begin 1.5 2.5 \"a\" \"b\")");
        assert_eq!(program.immediates.len(), 4);
    }

    #[test]
    fn index_immediate_reuses_the_index_of_an_equal_value() {
        let mut program = Program::default();
        let a = program.index_immediate(Lit::Float(1.0)).unwrap();
        let b = program.index_immediate(Lit::Float(2.0)).unwrap();
        let c = program.index_immediate(Lit::Float(1.0)).unwrap();
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(program.immediates.len(), 2);
    }

    proptest::proptest! {
        #[test]
        fn index_immediate_dedups_any_repeated_float(
            values in proptest::collection::vec(-1000.0f64..1000.0, 1..10)
        ) {
            let mut program = Program::default();
            let mut indices = Vec::new();
            for v in &values {
                indices.push(program.index_immediate(Lit::Float(*v)).unwrap());
            }
            let before = program.immediates.len();
            for (i, v) in values.iter().enumerate() {
                let again = program.index_immediate(Lit::Float(*v)).unwrap();
                proptest::prop_assert_eq!(again, indices[i]);
            }
            proptest::prop_assert_eq!(program.immediates.len(), before);
        }
    }
}
