use wisp_common::Opcode;

use crate::vm::context::{CallFrame, CallFrameKind, Context};
use crate::vm::frame::FrameId;
use crate::vm::heap::{Invocation, Pointer, Tag};
use crate::vm::trace::Trace;

impl Context {
    /// Runs the program buffer starting at `entry` until an `Exit`
    /// opcode is reached, returning the value it leaves on the
    /// operand stack.
    pub(crate) fn run_from(&mut self, entry: usize) -> Result<Pointer, Trace> {
        let mut ip = entry;
        loop {
            if let Some(result) = self.step(&mut ip)? {
                return Ok(result);
            }
        }
    }

    /// Runs consecutive `Exit`-terminated segments starting at `entry`
    /// until the program buffer is exhausted, collecting each
    /// segment's result in order. Grounded on spec.md §6's
    /// `run-bytecode` description: a loaded buffer is executed "at
    /// successive entry points until the buffer is exhausted",
    /// distinct from `run_from`, which stops at the first `Exit`.
    pub(crate) fn run_segments_from(&mut self, entry: usize) -> Result<Vec<Pointer>, Trace> {
        let mut results = Vec::new();
        let mut ip = entry;
        while ip < self.code.len() {
            if let Some(result) = self.step(&mut ip)? {
                results.push(result);
            }
        }
        Ok(results)
    }

    /// Invokes `function` with `args` and runs it to completion,
    /// whether it's a native or a bytecode closure — for kernel
    /// builtins (`map`, `filter`, `fold`, `apply`) that need to call
    /// back into the language from native Rust. A bytecode callee
    /// resumes the same dispatch loop `run_from` uses, just stopping
    /// once its call frame (and only its call frame) has popped,
    /// rather than at the next `Exit`.
    pub(crate) fn call_value(&mut self, function: Pointer, args: &[Pointer]) -> Result<Pointer, Trace> {
        if self.heap.tag(function) != Tag::Function {
            return Err(Trace::type_error("Function", "call target is not callable"));
        }
        let argc = args.len();
        let invocation = self.heap.function_invocation(function);
        let required_arity = self.heap.function_required_arity(function) as usize;
        let definition_env = self.heap.function_definition_env(function);

        match invocation {
            Invocation::Native(index) => {
                if argc != required_arity {
                    return Err(Trace::arity_error(required_arity, argc));
                }
                let base = self.operand_stack.len();
                self.operand_stack.extend_from_slice(args);
                let native = self.natives[index as usize].clone();
                let result = native(self, base, argc)?;
                self.operand_stack.truncate(base);
                Ok(result)
            }
            Invocation::NativeVariadic(index) => {
                if argc < required_arity {
                    return Err(Trace::arity_error(required_arity, argc));
                }
                let base = self.operand_stack.len();
                self.operand_stack.extend_from_slice(args);
                let native = self.natives[index as usize].clone();
                let result = native(self, base, argc)?;
                self.operand_stack.truncate(base);
                Ok(result)
            }
            Invocation::Bytecode { entry } => {
                if argc != required_arity {
                    return Err(Trace::arity_error(required_arity, argc));
                }
                self.run_call(args, required_arity, false, entry, definition_env)
            }
            Invocation::BytecodeVariadic { entry } => {
                if argc < required_arity {
                    return Err(Trace::arity_error(required_arity, argc));
                }
                self.run_call(args, required_arity, true, entry, definition_env)
            }
        }
    }

    /// Pushes one bytecode call frame and drives the dispatch loop
    /// until exactly that frame (and any it transitively pushes) has
    /// returned, then hands back the value it left behind. `return_ip`
    /// is never read — nothing outside `call_value` resumes at it, so
    /// it's a placeholder.
    fn run_call(
        &mut self,
        args: &[Pointer],
        required_arity: usize,
        variadic: bool,
        entry: u32,
        definition_env: u32,
    ) -> Result<Pointer, Trace> {
        let depth = self.call_stack.len();
        self.operand_stack.extend_from_slice(args);
        self.enter_call(args.len(), required_arity, variadic, entry, definition_env, 0);
        let mut ip = entry as usize;
        loop {
            if let Some(result) = self.step(&mut ip)? {
                // A nested bytecode call body may itself `Exit`
                // only if it's the top-level program, which can't
                // happen here — but if it somehow did, surface it.
                return Ok(result);
            }
            if self.call_stack.len() <= depth {
                return Ok(self.operand_stack.pop().expect("call left nothing on the operand stack"));
            }
        }
    }

    /// Executes a single instruction at `*ip`, advancing it past the
    /// instruction's operands. Returns `Some(value)` only for `Exit`,
    /// which halts the whole program; every other opcode returns
    /// `None` and leaves `*ip` pointing at the next instruction.
    /// `ensure_heap_budget` runs first so nothing an opcode allocates
    /// can observe a mid-instruction collection.
    fn step(&mut self, ip: &mut usize) -> Result<Option<Pointer>, Trace> {
        self.ensure_heap_budget()?;

        let opcode = Opcode::from_byte(self.code[*ip]);
        *ip += 1;

        match opcode {
            Opcode::Exit => return Ok(Some(self.operand_stack.pop().unwrap_or(self.null))),
            Opcode::Noop => {}

            Opcode::PushNull => self.operand_stack.push(self.null),
            Opcode::PushTrue => self.operand_stack.push(self.truthy),
            Opcode::PushFalse => self.operand_stack.push(self.falsy),

            Opcode::PushI => {
                let bits = self.read_u16(*ip);
                *ip += 2;
                let ptr = self.heap.alloc_integer(bits as i16 as i32);
                self.operand_stack.push(ptr);
            }

            Opcode::PushImmediate => {
                let index = self.read_u16(*ip) as usize;
                *ip += 2;
                self.operand_stack.push(self.immediates[index]);
            }

            Opcode::Dup => {
                let top = *self.operand_stack.last().expect("Dup on an empty operand stack");
                self.operand_stack.push(top);
            }

            Opcode::Discard | Opcode::Pop => {
                self.operand_stack.pop().expect("Discard/Pop on an empty operand stack");
            }

            Opcode::Jump => {
                *ip = self.read_u16(*ip) as usize;
            }

            Opcode::JumpIfFalse => {
                let target = self.read_u16(*ip) as usize;
                *ip += 2;
                let value = self.operand_stack.pop().expect("JumpIfFalse on an empty operand stack");
                if !self.is_truthy(value) {
                    *ip = target;
                }
            }

            Opcode::Load => {
                let frame_dist = self.read_u16(*ip);
                let offset = self.read_u16(*ip + 2);
                *ip += 4;
                self.push_load(frame_dist, offset);
            }
            Opcode::Load0 | Opcode::Load0Fast => {
                let offset = self.read_u16(*ip);
                *ip += 2;
                self.push_load(0, offset);
            }
            Opcode::Load1 | Opcode::Load1Fast => {
                let offset = self.read_u16(*ip);
                *ip += 2;
                self.push_load(1, offset);
            }
            Opcode::Load2 => {
                let offset = self.read_u16(*ip);
                *ip += 2;
                self.push_load(2, offset);
            }

            Opcode::Store => {
                let value = self.operand_stack.pop().expect("Store on an empty operand stack");
                let env = self.current_env();
                self.frames.get_mut(env).push_local(value);
            }

            Opcode::Rebind => {
                let frame_dist = self.read_u16(*ip);
                let offset = self.read_u16(*ip + 2) as usize;
                *ip += 4;
                let value = self.operand_stack.pop().expect("Rebind on an empty operand stack");
                let target = self.walk(frame_dist);
                self.frames.get_mut(target).locals[offset] = value;
            }

            Opcode::PushLambda => {
                let entry = self.read_u16(*ip) as u32;
                let arity = self.read_u16(*ip + 2);
                *ip += 4;
                let env = self.current_env().0;
                let function = self.heap.alloc_function(arity, Invocation::Bytecode { entry }, env, Pointer::NULL);
                self.operand_stack.push(function);
            }

            Opcode::PushVariadicLambda => {
                let entry = self.read_u16(*ip) as u32;
                let arity = self.read_u16(*ip + 2);
                *ip += 4;
                let env = self.current_env().0;
                let function =
                    self.heap.alloc_function(arity, Invocation::BytecodeVariadic { entry }, env, Pointer::NULL);
                self.operand_stack.push(function);
            }

            Opcode::PushDocumentedLambda => {
                let entry = self.read_u16(*ip) as u32;
                let arity = self.read_u16(*ip + 2);
                let doc_index = self.read_u16(*ip + 4) as usize;
                *ip += 6;
                let env = self.current_env().0;
                let docstring = self.immediates[doc_index];
                let function = self.heap.alloc_function(arity, Invocation::Bytecode { entry }, env, docstring);
                self.operand_stack.push(function);
            }

            Opcode::EnterLet => {
                let env = self.frames.alloc(Some(self.current_env()));
                self.call_stack.push(CallFrame { kind: CallFrameKind::Let, env });
            }

            Opcode::ExitLet => match self.call_stack.pop() {
                Some(CallFrame { kind: CallFrameKind::Let, .. }) => {}
                _ => panic!("ExitLet with no matching EnterLet on the call stack"),
            },

            Opcode::Cons => {
                let cdr = self.operand_stack.pop().expect("Cons missing cdr");
                let car = self.operand_stack.pop().expect("Cons missing car");
                let pair = self.heap.alloc_pair(car, cdr);
                self.operand_stack.push(pair);
            }

            Opcode::Car => {
                let pair = self.operand_stack.pop().expect("Car on an empty operand stack");
                if self.heap.tag(pair) != Tag::Pair {
                    return Err(Trace::type_error("Pair", "car expects a pair"));
                }
                self.operand_stack.push(self.heap.car(pair));
            }

            Opcode::Cdr => {
                let pair = self.operand_stack.pop().expect("Cdr on an empty operand stack");
                if self.heap.tag(pair) != Tag::Pair {
                    return Err(Trace::type_error("Pair", "cdr expects a pair"));
                }
                self.operand_stack.push(self.heap.cdr(pair));
            }

            Opcode::IsNull => {
                let value = self.operand_stack.pop().expect("IsNull on an empty operand stack");
                let is_null = self.heap.tag(value) == Tag::Null;
                self.operand_stack.push(self.boolean(is_null));
            }

            Opcode::Call => {
                let argc = self.read_u16(*ip) as usize;
                *ip += 2;
                self.dispatch_call(argc, ip)?;
            }

            Opcode::Return => match self.call_stack.pop() {
                Some(CallFrame { kind: CallFrameKind::Call { return_ip, .. }, .. }) => *ip = return_ip,
                _ => panic!("Return with no matching call frame on the call stack"),
            },

            Opcode::Recur => {
                let argc = self.read_u16(*ip) as usize;
                *ip += 2;
                self.dispatch_recur(argc, ip)?;
            }
        }
        Ok(None)
    }

    fn read_u16(&self, at: usize) -> u16 {
        u16::from_le_bytes([self.code[at], self.code[at + 1]])
    }

    fn walk(&self, frame_dist: u16) -> FrameId {
        let mut env = self.current_env();
        for _ in 0..frame_dist {
            env = self.frames.get(env).parent.expect("frame_dist exceeds the live scope depth");
        }
        env
    }

    fn push_load(&mut self, frame_dist: u16, offset: u16) {
        let env = self.walk(frame_dist);
        let value = self.frames.get(env).locals[offset as usize];
        self.operand_stack.push(value);
    }

    /// Copies `argc` already-evaluated arguments starting at operand
    /// stack index `base` into `env`'s locals: `required_arity` of
    /// them verbatim, and (if `variadic`) the rest folded right to
    /// left into a single trailing list.
    fn bind_args(&mut self, env: FrameId, base: usize, argc: usize, required_arity: usize, variadic: bool) {
        for i in 0..required_arity {
            let value = self.operand_stack[base + i];
            self.frames.get_mut(env).push_local(value);
        }
        if variadic {
            let mut rest = self.null;
            for i in (required_arity..argc).rev() {
                let value = self.operand_stack[base + i];
                rest = self.heap.alloc_pair(value, rest);
            }
            self.frames.get_mut(env).push_local(rest);
        }
    }

    fn dispatch_call(&mut self, argc: usize, ip: &mut usize) -> Result<(), Trace> {
        let callee = self.operand_stack.pop().expect("Call missing its callee");
        if self.heap.tag(callee) != Tag::Function {
            return Err(Trace::type_error("Function", "call target is not callable"));
        }

        let invocation = self.heap.function_invocation(callee);
        let required_arity = self.heap.function_required_arity(callee) as usize;
        let definition_env = self.heap.function_definition_env(callee);

        match invocation {
            Invocation::Native(index) => {
                if argc != required_arity {
                    return Err(Trace::arity_error(required_arity, argc));
                }
                let base = self.operand_stack.len() - argc;
                let native = self.natives[index as usize].clone();
                let result = native(self, base, argc)?;
                self.operand_stack.truncate(base);
                self.operand_stack.push(result);
            }
            Invocation::NativeVariadic(index) => {
                if argc < required_arity {
                    return Err(Trace::arity_error(required_arity, argc));
                }
                let base = self.operand_stack.len() - argc;
                let native = self.natives[index as usize].clone();
                let result = native(self, base, argc)?;
                self.operand_stack.truncate(base);
                self.operand_stack.push(result);
            }
            Invocation::Bytecode { entry } => {
                if argc != required_arity {
                    return Err(Trace::arity_error(required_arity, argc));
                }
                self.enter_call(argc, required_arity, false, entry, definition_env, *ip);
                *ip = entry as usize;
            }
            Invocation::BytecodeVariadic { entry } => {
                if argc < required_arity {
                    return Err(Trace::arity_error(required_arity, argc));
                }
                self.enter_call(argc, required_arity, true, entry, definition_env, *ip);
                *ip = entry as usize;
            }
        }
        Ok(())
    }

    fn enter_call(
        &mut self,
        argc: usize,
        required_arity: usize,
        variadic: bool,
        entry: u32,
        definition_env: u32,
        return_ip: usize,
    ) {
        let base = self.operand_stack.len() - argc;
        let env = self.frames.alloc(Some(FrameId(definition_env)));
        self.call_stack.push(CallFrame {
            kind: CallFrameKind::Call { return_ip, entry: entry as usize, required_arity: required_arity as u16, variadic },
            env,
        });
        self.bind_args(env, base, argc, required_arity, variadic);
        self.operand_stack.truncate(base);
    }

    fn dispatch_recur(&mut self, argc: usize, ip: &mut usize) -> Result<(), Trace> {
        let (entry, required_arity, variadic, env) = match self.call_stack.last() {
            Some(CallFrame { kind: CallFrameKind::Call { entry, required_arity, variadic, .. }, env }) => {
                (*entry, *required_arity as usize, *variadic, *env)
            }
            _ => panic!("recur with no enclosing function call frame"),
        };

        let arity_ok = if variadic { argc >= required_arity } else { argc == required_arity };
        if !arity_ok {
            return Err(Trace::arity_error(required_arity, argc));
        }

        let base = self.operand_stack.len() - argc;
        self.frames.get_mut(env).locals.clear();
        self.bind_args(env, base, argc, required_arity, variadic);
        self.operand_stack.truncate(base);
        *ip = entry;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use wisp_common::Source;

    use crate::vm::context::Context;

    fn source(text: &str) -> Rc<Source> {
        Source::source(text)
    }

    #[test]
    fn arithmetic_free_literal_runs_to_completion() {
        let mut ctx = Context::new();
        let result = ctx.exec(source("(if false 1 2)")).expect("if should compile and run");
        assert_eq!(ctx.heap().read_integer(result), 2);
    }

    #[test]
    fn def_binds_a_value_visible_to_later_statements() {
        let mut ctx = Context::new();
        let result = ctx.exec(source("(begin (def x 5) x)")).expect("def/load should round-trip");
        assert_eq!(ctx.heap().read_integer(result), 5);
    }

    #[test]
    fn let_binding_shadows_without_leaking_into_the_parent_scope() {
        let mut ctx = Context::new();
        ctx.exec(source("(def x 1)")).unwrap();
        let result = ctx.exec(source("(begin (let ((x 2)) x) x)")).expect("let should not leak its binding");
        assert_eq!(ctx.heap().read_integer(result), 1);
    }

    #[test]
    fn lambda_call_returns_its_body_value_and_closes_over_its_environment() {
        let mut ctx = Context::new();
        let result = ctx
            .exec(source("(begin (def n 3) ((lambda (a) (if a n 0)) true))"))
            .expect("call should run and see the enclosing def");
        assert_eq!(ctx.heap().read_integer(result), 3);
    }

    #[test]
    fn nested_lambda_calls_leave_the_operand_stack_balanced() {
        let mut ctx = Context::new();
        let result = ctx
            .exec(source("(((lambda (a) (lambda (b) (if a b a))) true) 9)"))
            .expect("currying two nested calls should run");
        assert_eq!(ctx.heap().read_integer(result), 9);
        ctx.exec(source("5")).expect("operand stack should be empty between top-level execs");
    }

    #[test]
    fn recur_reuses_the_call_frame_instead_of_growing_the_call_stack() {
        let mut ctx = Context::new();
        ctx.exec(source("(def count (lambda (n) (if n (recur false) 7)))")).unwrap();
        let result = ctx.exec(source("(count true)")).expect("a single recur step should run");
        assert_eq!(ctx.heap().read_integer(result), 7);
    }

    #[test]
    fn calling_a_non_function_is_a_type_error() {
        let mut ctx = Context::new();
        let err = ctx.exec(source("(5 1 2)")).expect_err("calling an integer should fail");
        assert!(matches!(err, crate::vm::context::ExecError::Trace(_)));
    }

    #[test]
    fn wrong_arity_call_is_an_arity_error() {
        let mut ctx = Context::new();
        let err = ctx.exec(source("((lambda (a b) a) 1)")).expect_err("missing an argument should fail");
        assert!(matches!(err, crate::vm::context::ExecError::Trace(_)));
    }
}
