use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use wisp_common::{Lit, Opcode, Source};

use crate::compiler::{self, Program, Syntax};
use crate::construct::{Scope, SharedSymbol, SymbolTable};
use crate::vm::frame::{FrameArena, FrameId};
use crate::vm::gc;
use crate::vm::heap::{Heap, Invocation, Pointer};
use crate::vm::roots::{Persistent, PersistentRoots};
use crate::vm::trace::Trace;

/// A native function: takes the `Context` it's running in (so it can
/// allocate, recurse back into the VM, or read/write globals) plus
/// the index of its first argument on the operand stack and how many
/// it was called with. Arguments are read through `Context::arg`
/// rather than handed over as an owned slice or a borrowed one: a
/// native may call back into the VM (`Function::call`, a nested
/// `exec`), and that nested execution has its own GC checkpoints that
/// know nothing about a slice of `Pointer`s sitting in a Rust local.
/// Leaving the arguments as a live window into `operand_stack` instead
/// means the GC's existing `operand_stack` root keeps them valid for
/// the native's whole body, same as it does for everything else on
/// the stack.
pub type NativeFn = Rc<dyn Fn(&mut Context, usize, usize) -> Result<Pointer, Trace>>;

/// Either phase of `exec` can fail: compiling the new source, or
/// running the bytecode it produced.
#[derive(Debug)]
pub enum ExecError {
    Syntax(Syntax),
    Trace(Trace),
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::Syntax(syntax) => write!(f, "{}", syntax),
            ExecError::Trace(trace) => write!(f, "{}", trace),
        }
    }
}

impl std::error::Error for ExecError {}

/// One entry on the VM's call stack. Function calls and `let` bodies
/// share this stack (matching the opcode semantics: `EnterLet`/
/// `ExitLet` are a pseudo call/return with no return address) — `kind`
/// distinguishes which kind of frame `Return`/`ExitLet`/`Recur` are
/// allowed to act on.
pub(crate) struct CallFrame {
    pub kind: CallFrameKind,
    /// The environment this frame's locals live in.
    pub env: FrameId,
}

pub(crate) enum CallFrameKind {
    /// A `let` frame: popped by `ExitLet`, skipped over by `Recur`
    /// (which emits one `ExitLet` per enclosing `let` before jumping).
    Let,
    /// A function call: `return_ip` is where to resume the caller,
    /// `entry`/`required_arity`/`variadic` are what `Recur` needs to
    /// re-enter this same invocation without growing the call stack.
    Call { return_ip: usize, entry: usize, required_arity: u16, variadic: bool },
}

const DEFAULT_HEAP_BUDGET: usize = 64 * 1024 * 1024;

/// The embeddable interpreter. Owns the value heap, the
/// environment-frame arena, a single ever-growing compiled program
/// buffer (`exec` always appends, never replaces — existing `Function`
/// values hold absolute offsets into it), and the symbol table /
/// top-level scope the compiler resolves against, so that successive
/// `exec` calls see each other's top-level `def`s.
pub struct Context {
    pub(crate) heap: Heap,
    pub(crate) frames: FrameArena,
    pub(crate) global: FrameId,
    pub(crate) code: Vec<u8>,
    pub(crate) immediates: Vec<Pointer>,
    pub(crate) operand_stack: Vec<Pointer>,
    pub(crate) call_stack: Vec<CallFrame>,
    pub(crate) natives: Vec<NativeFn>,
    persistent: Rc<RefCell<PersistentRoots>>,
    symbols: SymbolTable,
    global_scope: Scope,
    pub(crate) null: Pointer,
    pub(crate) truthy: Pointer,
    pub(crate) falsy: Pointer,
    heap_budget: usize,
}

impl Context {
    pub fn new() -> Context {
        Context::with_heap_budget(DEFAULT_HEAP_BUDGET)
    }

    /// As `new`, but with an explicit ceiling on heap bytes before a
    /// collection is forced. Mostly useful for exercising the
    /// collector and the `Resource` error path in tests without
    /// allocating tens of megabytes of garbage first.
    pub fn with_heap_budget(heap_budget: usize) -> Context {
        let mut heap = Heap::new(256);
        let null = heap.alloc_null();
        let truthy = heap.alloc_boolean(true);
        let falsy = heap.alloc_boolean(false);
        let mut frames = FrameArena::new();
        let global = frames.alloc(None);

        Context {
            heap,
            frames,
            global,
            code: Vec::new(),
            immediates: Vec::new(),
            operand_stack: Vec::new(),
            call_stack: Vec::new(),
            natives: Vec::new(),
            persistent: Rc::new(RefCell::new(PersistentRoots::new())),
            symbols: SymbolTable::new(),
            global_scope: Scope::new(None),
            null,
            truthy,
            falsy,
            heap_budget,
        }
    }

    pub fn null(&self) -> Pointer {
        self.null
    }

    pub fn truthy(&self) -> Pointer {
        self.truthy
    }

    pub fn falsy(&self) -> Pointer {
        self.falsy
    }

    pub fn boolean(&self, value: bool) -> Pointer {
        if value { self.truthy } else { self.falsy }
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Current operand-stack depth — exposed for the spec's
    /// operand-stack-balance property (every well-formed top-level
    /// expression leaves this unchanged).
    pub fn operand_stack_len(&self) -> usize {
        self.operand_stack.len()
    }

    /// The environment a `Load`/`Store`/`Rebind` at frame distance 0
    /// currently resolves against: the innermost live call or `let`
    /// frame, or the top-level frame if none is active.
    pub(crate) fn current_env(&self) -> FrameId {
        self.call_stack.last().map(|frame| frame.env).unwrap_or(self.global)
    }

    /// Only the `false` boolean singleton is falsy; everything else,
    /// including `null`, is truthy.
    pub(crate) fn is_truthy(&self, value: Pointer) -> bool {
        !(self.heap.tag(value) == crate::vm::heap::Tag::Boolean && !self.heap.read_boolean(value))
    }

    /// Reads argument `i` (0-indexed) of a native call whose window
    /// starts at operand-stack index `base`. See `NativeFn`'s doc for
    /// why this reads through the stack rather than an owned copy.
    pub fn arg(&self, base: usize, i: usize) -> Pointer {
        self.operand_stack[base + i]
    }

    /// Pins `value` so the GC won't reclaim it even if nothing else on
    /// a root path references it — for native code that wants to hold
    /// a value across a call that might allocate.
    pub fn pin(&self, value: Pointer) -> Persistent {
        Persistent::new(self.persistent.clone(), value)
    }

    /// Compiles `source` against this context's persistent symbol
    /// table and top-level scope, appends the result to the program
    /// buffer, and runs just the newly appended tail.
    pub fn exec(&mut self, source: Rc<Source>) -> Result<Pointer, ExecError> {
        let program =
            compiler::compile(source, &mut self.symbols, &mut self.global_scope).map_err(ExecError::Syntax)?;
        let entry = self.append_program(&program);
        self.run_from(entry).map_err(ExecError::Trace)
    }

    /// Registers a native function as a global, binding `name` at the
    /// same local offset in both the compile-time scope and the
    /// runtime global frame so a later `Load0Fast 0` style reference
    /// compiled against this scope finds it in the live frame.
    pub fn define_native(&mut self, name: &str, required_arity: u16, body: NativeFn) {
        let symbol = self.symbols.intern(name);
        let offset = self.global_scope.bind(symbol);
        let index = self.natives.len() as u32;
        self.natives.push(body);
        let function = self.heap.alloc_function(
            required_arity,
            Invocation::Native(index),
            self.global.0,
            Pointer::NULL,
        );
        let slot = self.frames.get_mut(self.global).push_local(function);
        debug_assert_eq!(slot as usize, offset);
    }

    /// As `define_native`, but for a builtin that accepts `minimum_arity`
    /// or more arguments (`+`, `list`, `print`, ...). `Context::arg`
    /// still addresses arguments by position; the native reads `argc`
    /// itself to know how many were actually passed.
    pub fn define_native_variadic(&mut self, name: &str, minimum_arity: u16, body: NativeFn) {
        let symbol = self.symbols.intern(name);
        let offset = self.global_scope.bind(symbol);
        let index = self.natives.len() as u32;
        self.natives.push(body);
        let function = self.heap.alloc_function(
            minimum_arity,
            Invocation::NativeVariadic(index),
            self.global.0,
            Pointer::NULL,
        );
        let slot = self.frames.get_mut(self.global).push_local(function);
        debug_assert_eq!(slot as usize, offset);
    }

    /// Binds `value` directly as a new top-level global. Behaviorally
    /// equivalent to compiling `(def name value)` against the global
    /// scope — which is exactly what it does at the `Scope`/`Frame`
    /// level — without re-entering the lexer/parser for a value the
    /// host already holds as a `Pointer`.
    pub fn set_global(&mut self, name: &str, value: Pointer) {
        let symbol = self.symbols.intern(name);
        let offset = self.global_scope.bind(symbol);
        let slot = self.frames.get_mut(self.global).push_local(value);
        debug_assert_eq!(slot as usize, offset);
    }

    /// Resolves `name` against the top-level scope and loads its
    /// slot, or `None` if no such global has ever been bound.
    pub fn get_global(&self, name: &str) -> Option<Pointer> {
        let symbol = self.symbols.get(name)?;
        let (frame_dist, offset) = self.global_scope.resolve(symbol)?;
        debug_assert_eq!(frame_dist, 0, "the global scope has no parent");
        self.frames.get(self.global).locals.get(offset as usize).copied()
    }

    pub(crate) fn intern(&mut self, name: &str) -> SharedSymbol {
        self.symbols.intern(name)
    }

    pub fn symbol_name(&self, symbol: SharedSymbol) -> &str {
        self.symbols.name(symbol)
    }

    fn materialize(&mut self, lit: &Lit) -> Pointer {
        match lit {
            Lit::Integer(i) => self.heap.alloc_integer(*i),
            Lit::Float(f) => self.heap.alloc_float(*f),
            Lit::Complex(re, im) => self.heap.alloc_complex(*re, *im),
            Lit::Character(c) => self.heap.alloc_character(*c),
            Lit::String(s) => self.heap.alloc_string(s),
            Lit::Symbol(s) => {
                let text = self.heap.alloc_string(s);
                self.heap.alloc_symbol(text)
            }
            Lit::Boolean(b) => self.boolean(*b),
            Lit::Null => self.null,
        }
    }

    /// Appends `program`'s code and immediates to this context's
    /// buffers, rewriting every address the compiler emitted relative
    /// to `program`'s own start so it instead points into the shared
    /// buffer. Returns the absolute offset its first instruction now
    /// lives at.
    fn append_program(&mut self, program: &Program) -> usize {
        let immediates = program.immediates.iter().map(|lit| self.materialize(lit)).collect();
        self.append_raw(program.code.clone(), immediates)
    }

    /// As `append_program`, but for code/immediates that didn't come
    /// from freshly compiling a `Program` — the `persist` module's
    /// `run-bytecode` loader uses this directly, having already
    /// reconstructed `immediates` as heap `Pointer`s itself.
    pub(crate) fn append_raw(&mut self, code: Vec<u8>, immediates: Vec<Pointer>) -> usize {
        let code_base = self.code.len();
        let immediate_base = self.immediates.len() as u32;
        self.immediates.extend(immediates);

        let mut rebased = code;
        let mut ip = 0;
        while ip < rebased.len() {
            let opcode = Opcode::from_byte(rebased[ip]);
            match opcode {
                Opcode::Jump | Opcode::JumpIfFalse => {
                    rebase_u16_at(&mut rebased, ip + 1, code_base as u32);
                }
                Opcode::PushLambda | Opcode::PushVariadicLambda => {
                    rebase_u16_at(&mut rebased, ip + 1, code_base as u32);
                    // second u16 (parameter count) is not an address.
                }
                Opcode::PushDocumentedLambda => {
                    rebase_u16_at(&mut rebased, ip + 1, code_base as u32);
                    // second u16 (parameter count) is not an address.
                    rebase_u16_at(&mut rebased, ip + 5, immediate_base);
                }
                Opcode::PushImmediate => {
                    rebase_u16_at(&mut rebased, ip + 1, immediate_base);
                }
                _ => {}
            }
            ip += 1 + opcode.operand_len();
        }

        self.code.extend_from_slice(&rebased);
        code_base
    }

    /// Clears the operand and call stacks, the recovery spec.md §7
    /// asks a host (REPL, `dofile`) to perform after a runtime error
    /// leaves them in an unspecified state, before accepting more
    /// input.
    pub fn reset(&mut self) {
        self.operand_stack.clear();
        self.call_stack.clear();
    }

    /// Forces a collection now. Exposed for hosts that want to
    /// collect at a point they know is safe (e.g. between REPL
    /// inputs) rather than only reactively under allocation pressure.
    pub fn collect_garbage(&mut self) {
        let active_frames: Vec<FrameId> = self.call_stack.iter().map(|frame| frame.env).collect();
        let mut singletons = [self.null, self.truthy, self.falsy];
        gc::collect(
            &mut self.heap,
            &mut self.frames,
            gc::Roots {
                operand_stack: &mut self.operand_stack,
                active_frames: &active_frames,
                global_frame: self.global,
                immediates: &mut self.immediates,
                persistent: &mut self.persistent.borrow_mut(),
                singletons: &mut singletons,
            },
        );
        self.null = singletons[0];
        self.truthy = singletons[1];
        self.falsy = singletons[2];
    }

    /// Runs a collection if the heap has grown past budget, erroring
    /// with a fatal `Resource` trace if it's still over budget
    /// afterward. Called before every allocation in the interpreter
    /// loop.
    pub(crate) fn ensure_heap_budget(&mut self) -> Result<(), Trace> {
        if (self.heap.len() as usize) < self.heap_budget {
            return Ok(());
        }
        self.collect_garbage();
        if (self.heap.len() as usize) < self.heap_budget {
            Ok(())
        } else {
            Err(Trace::resource_exhausted("heap exceeded its budget and a collection did not reclaim enough"))
        }
    }
}

impl Default for Context {
    fn default() -> Context {
        Context::new()
    }
}

fn rebase_u16_at(code: &mut [u8], at: usize, base: u32) {
    let value = u16::from_le_bytes([code[at], code[at + 1]]);
    let rebased = value as u32 + base;
    code[at..at + 2].copy_from_slice(&(rebased as u16).to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(text: &str) -> Rc<Source> {
        Source::source(text)
    }

    #[test]
    fn exec_returns_last_expression_value() {
        let mut ctx = Context::new();
        let result = ctx.exec(source("5")).expect("a bare literal should compile and run");
        assert_eq!(ctx.heap().read_integer(result), 5);
    }

    #[test]
    fn set_global_then_get_global_round_trips() {
        let mut ctx = Context::new();
        let value = ctx.heap_mut().alloc_integer(42);
        ctx.set_global("answer", value);
        let got = ctx.get_global("answer").expect("answer should be bound");
        assert_eq!(ctx.heap().read_integer(got), 42);
    }

    #[test]
    fn successive_exec_calls_share_top_level_defs() {
        let mut ctx = Context::new();
        ctx.exec(source("(def x 10)")).expect("first exec should succeed");
        let result = ctx.exec(source("x")).expect("second exec should see x");
        assert_eq!(ctx.heap().read_integer(result), 10);
    }
}
