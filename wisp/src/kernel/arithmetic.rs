//! Arithmetic builtins, grounded on `examples/original_source/runtime/builtins.cpp`'s
//! identically-named functions. `+ - * /` widen across the numeric
//! tower (Integer -> Float -> Complex); `f+ f- f* f/` are fixed-type
//! float arithmetic that reject anything but a `Float` argument.

use std::rc::Rc;

use crate::kernel::inject::argument;
use crate::vm::context::Context;
use crate::vm::heap::{Heap, Tag};
use crate::vm::trace::Trace;
use crate::vm::Pointer;

#[derive(Clone, Copy)]
enum Num {
    Int(i32),
    Float(f64),
    Complex(f64, f64),
}

fn read_num(heap: &Heap, ptr: Pointer) -> Result<Num, Trace> {
    match heap.tag(ptr) {
        Tag::Integer => Ok(Num::Int(heap.read_integer(ptr))),
        Tag::Float => Ok(Num::Float(heap.read_float(ptr))),
        Tag::Complex => {
            let (re, im) = heap.read_complex(ptr);
            Ok(Num::Complex(re, im))
        }
        _ => Err(Trace::type_error("Number", "arithmetic expects a number")),
    }
}

fn read_nums(ctx: &Context, base: usize, argc: usize) -> Result<Vec<Num>, Trace> {
    (0..argc).map(|i| read_num(ctx.heap(), ctx.arg(base, i))).collect()
}

fn as_float(n: Num) -> f64 {
    match n {
        Num::Int(i) => i as f64,
        Num::Float(f) => f,
        Num::Complex(re, _) => re,
    }
}

fn as_complex(n: Num) -> (f64, f64) {
    match n {
        Num::Int(i) => (i as f64, 0.0),
        Num::Float(f) => (f, 0.0),
        Num::Complex(re, im) => (re, im),
    }
}

#[derive(PartialEq, PartialOrd)]
enum Width {
    Integer,
    Float,
    Complex,
}

fn widen(nums: &[Num]) -> Width {
    let mut width = Width::Integer;
    for n in nums {
        let this = match n {
            Num::Int(_) => Width::Integer,
            Num::Float(_) => Width::Float,
            Num::Complex(..) => Width::Complex,
        };
        if this > width {
            width = this;
        }
    }
    width
}

fn add(ctx: &mut Context, base: usize, argc: usize) -> Result<Pointer, Trace> {
    let nums = read_nums(ctx, base, argc)?;
    match widen(&nums) {
        Width::Complex => {
            let (re, im) = nums.into_iter().map(as_complex).fold((0.0, 0.0), |(ar, ai), (br, bi)| (ar + br, ai + bi));
            Ok(ctx.heap_mut().alloc_complex(re, im))
        }
        Width::Float => {
            let sum: f64 = nums.into_iter().map(as_float).sum();
            Ok(ctx.heap_mut().alloc_float(sum))
        }
        Width::Integer => {
            let mut acc: i32 = 0;
            for n in &nums {
                let Num::Int(i) = n else { unreachable!() };
                match acc.checked_add(*i) {
                    Some(v) => acc = v,
                    None => {
                        let sum: f64 = nums.into_iter().map(as_float).sum();
                        return Ok(ctx.heap_mut().alloc_float(sum));
                    }
                }
            }
            Ok(ctx.heap_mut().alloc_integer(acc))
        }
    }
}

fn negate(ctx: &mut Context, n: Num) -> Result<Pointer, Trace> {
    match n {
        Num::Int(i) => match i.checked_neg() {
            Some(v) => Ok(ctx.heap_mut().alloc_integer(v)),
            None => Ok(ctx.heap_mut().alloc_float(-(i as f64))),
        },
        Num::Float(f) => Ok(ctx.heap_mut().alloc_float(-f)),
        Num::Complex(re, im) => Ok(ctx.heap_mut().alloc_complex(-re, -im)),
    }
}

fn subtract(ctx: &mut Context, base: usize, argc: usize) -> Result<Pointer, Trace> {
    let nums = read_nums(ctx, base, argc)?;
    if nums.len() == 1 {
        return negate(ctx, nums[0]);
    }
    match widen(&nums) {
        Width::Complex => {
            let mut iter = nums.into_iter().map(as_complex);
            let (mut re, mut im) = iter.next().unwrap();
            for (r, i) in iter {
                re -= r;
                im -= i;
            }
            Ok(ctx.heap_mut().alloc_complex(re, im))
        }
        Width::Float => {
            let mut iter = nums.into_iter().map(as_float);
            let mut acc = iter.next().unwrap();
            for f in iter {
                acc -= f;
            }
            Ok(ctx.heap_mut().alloc_float(acc))
        }
        Width::Integer => {
            let mut iter = nums.iter();
            let Num::Int(first) = iter.next().unwrap() else { unreachable!() };
            let mut acc = *first;
            for n in iter {
                let Num::Int(i) = n else { unreachable!() };
                match acc.checked_sub(*i) {
                    Some(v) => acc = v,
                    None => {
                        let mut acc = *first as f64;
                        for n in &nums[1..] {
                            acc -= as_float(*n);
                        }
                        return Ok(ctx.heap_mut().alloc_float(acc));
                    }
                }
            }
            Ok(ctx.heap_mut().alloc_integer(acc))
        }
    }
}

fn multiply(ctx: &mut Context, base: usize, argc: usize) -> Result<Pointer, Trace> {
    let nums = read_nums(ctx, base, argc)?;
    match widen(&nums) {
        Width::Complex => {
            let (re, im) = nums.into_iter().map(as_complex).fold((1.0, 0.0), |(ar, ai), (br, bi)| {
                (ar * br - ai * bi, ar * bi + ai * br)
            });
            Ok(ctx.heap_mut().alloc_complex(re, im))
        }
        Width::Float => {
            let product: f64 = nums.into_iter().map(as_float).product();
            Ok(ctx.heap_mut().alloc_float(product))
        }
        Width::Integer => {
            let mut acc: i32 = 1;
            for n in &nums {
                let Num::Int(i) = n else { unreachable!() };
                match acc.checked_mul(*i) {
                    Some(v) => acc = v,
                    None => {
                        let product: f64 = nums.into_iter().map(as_float).product();
                        return Ok(ctx.heap_mut().alloc_float(product));
                    }
                }
            }
            Ok(ctx.heap_mut().alloc_integer(acc))
        }
    }
}

fn divide(ctx: &mut Context, base: usize, argc: usize) -> Result<Pointer, Trace> {
    let nums = read_nums(ctx, base, argc)?;
    let complex = widen(&nums) == Width::Complex;

    if nums.len() == 1 {
        if complex {
            let (re, im) = as_complex(nums[0]);
            let denom = re * re + im * im;
            if denom == 0.0 {
                return Err(Trace::division_by_zero());
            }
            return Ok(ctx.heap_mut().alloc_complex(re / denom, -im / denom));
        }
        let f = as_float(nums[0]);
        if f == 0.0 {
            return Err(Trace::division_by_zero());
        }
        return Ok(ctx.heap_mut().alloc_float(1.0 / f));
    }

    if complex {
        let mut iter = nums.into_iter().map(as_complex);
        let (mut re, mut im) = iter.next().unwrap();
        for (br, bi) in iter {
            let denom = br * br + bi * bi;
            if denom == 0.0 {
                return Err(Trace::division_by_zero());
            }
            let (nr, ni) = (re * br + im * bi, im * br - re * bi);
            re = nr / denom;
            im = ni / denom;
        }
        return Ok(ctx.heap_mut().alloc_complex(re, im));
    }

    let mut iter = nums.into_iter().map(as_float);
    let mut acc = iter.next().unwrap();
    for f in iter {
        if f == 0.0 {
            return Err(Trace::division_by_zero());
        }
        acc /= f;
    }
    Ok(ctx.heap_mut().alloc_float(acc))
}

/// The mathematically intended `a mod b`: always takes the sign of
/// `b`, unlike Rust's `%`. spec.md §9 names the original's `mod` as
/// buggy; this is the fix.
fn modulo(ctx: &mut Context, base: usize, _argc: usize) -> Result<Pointer, Trace> {
    let a: i32 = argument(ctx, base, 0)?;
    let b: i32 = argument(ctx, base, 1)?;
    if b == 0 {
        return Err(Trace::division_by_zero());
    }
    let result = ((a % b) + b) % b;
    Ok(ctx.heap_mut().alloc_integer(result))
}

macro_rules! fixed_float_op {
    ($name:ident, $op:tt) => {
        fn $name(ctx: &mut Context, base: usize, _argc: usize) -> Result<Pointer, Trace> {
            let a: f64 = argument(ctx, base, 0)?;
            let b: f64 = argument(ctx, base, 1)?;
            Ok(ctx.heap_mut().alloc_float(a $op b))
        }
    };
}

fixed_float_op!(float_add, +);
fixed_float_op!(float_sub, -);
fixed_float_op!(float_mul, *);

fn float_div(ctx: &mut Context, base: usize, _argc: usize) -> Result<Pointer, Trace> {
    let a: f64 = argument(ctx, base, 0)?;
    let b: f64 = argument(ctx, base, 1)?;
    if b == 0.0 {
        return Err(Trace::division_by_zero());
    }
    Ok(ctx.heap_mut().alloc_float(a / b))
}

fn incr(ctx: &mut Context, base: usize, _argc: usize) -> Result<Pointer, Trace> {
    let n: i32 = argument(ctx, base, 0)?;
    match n.checked_add(1) {
        Some(v) => Ok(ctx.heap_mut().alloc_integer(v)),
        None => Ok(ctx.heap_mut().alloc_float(n as f64 + 1.0)),
    }
}

fn decr(ctx: &mut Context, base: usize, _argc: usize) -> Result<Pointer, Trace> {
    let n: i32 = argument(ctx, base, 0)?;
    match n.checked_sub(1) {
        Some(v) => Ok(ctx.heap_mut().alloc_integer(v)),
        None => Ok(ctx.heap_mut().alloc_float(n as f64 - 1.0)),
    }
}

fn ordering_chain(ctx: &mut Context, base: usize, argc: usize, cmp: fn(f64, f64) -> bool) -> Result<Pointer, Trace> {
    let nums = read_nums(ctx, base, argc)?;
    for n in &nums {
        if let Num::Complex(..) = n {
            return Err(Trace::type_error("Integer or Float", "complex numbers have no total order"));
        }
    }
    let ordered = nums.windows(2).all(|pair| cmp(as_float(pair[0]), as_float(pair[1])));
    Ok(ctx.boolean(ordered))
}

fn numeric_equal(ctx: &mut Context, base: usize, argc: usize) -> Result<Pointer, Trace> {
    let nums = read_nums(ctx, base, argc)?;
    let equal = nums.windows(2).all(|pair| as_complex(pair[0]) == as_complex(pair[1]));
    Ok(ctx.boolean(equal))
}

pub(super) fn register(ctx: &mut Context) {
    ctx.define_native_variadic("+", 0, Rc::new(add));
    ctx.define_native_variadic("-", 1, Rc::new(subtract));
    ctx.define_native_variadic("*", 0, Rc::new(multiply));
    ctx.define_native_variadic("/", 1, Rc::new(divide));
    ctx.define_native("mod", 2, Rc::new(modulo));
    ctx.define_native("f+", 2, Rc::new(float_add));
    ctx.define_native("f-", 2, Rc::new(float_sub));
    ctx.define_native("f*", 2, Rc::new(float_mul));
    ctx.define_native("f/", 2, Rc::new(float_div));
    ctx.define_native("incr", 1, Rc::new(incr));
    ctx.define_native("decr", 1, Rc::new(decr));
    ctx.define_native_variadic(
        "<",
        2,
        Rc::new(|ctx: &mut Context, base: usize, argc: usize| ordering_chain(ctx, base, argc, |a, b| a < b)),
    );
    ctx.define_native_variadic(
        ">",
        2,
        Rc::new(|ctx: &mut Context, base: usize, argc: usize| ordering_chain(ctx, base, argc, |a, b| a > b)),
    );
    ctx.define_native_variadic(
        "<=",
        2,
        Rc::new(|ctx: &mut Context, base: usize, argc: usize| ordering_chain(ctx, base, argc, |a, b| a <= b)),
    );
    ctx.define_native_variadic(
        ">=",
        2,
        Rc::new(|ctx: &mut Context, base: usize, argc: usize| ordering_chain(ctx, base, argc, |a, b| a >= b)),
    );
    ctx.define_native_variadic("=", 2, Rc::new(numeric_equal));
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use wisp_common::Source;

    use super::*;

    fn context() -> Context {
        let mut ctx = Context::new();
        register(&mut ctx);
        ctx
    }

    #[test]
    fn addition_stays_integer_when_every_argument_is() {
        let mut ctx = context();
        let result = ctx.exec(Source::source("(+ 1 2 3)")).unwrap();
        assert_eq!(ctx.heap().tag(result), Tag::Integer);
        assert_eq!(ctx.heap().read_integer(result), 6);
    }

    #[test]
    fn addition_widens_to_float_when_any_argument_is_float() {
        let mut ctx = context();
        let result = ctx.exec(Source::source("(+ 1 2.5)")).unwrap();
        assert_eq!(ctx.heap().tag(result), Tag::Float);
        assert_eq!(ctx.heap().read_float(result), 3.5);
    }

    #[test]
    fn division_always_widens_even_for_two_integers() {
        let mut ctx = context();
        let result = ctx.exec(Source::source("(/ 1 4)")).unwrap();
        assert_eq!(ctx.heap().tag(result), Tag::Float);
        assert_eq!(ctx.heap().read_float(result), 0.25);
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let mut ctx = context();
        assert!(ctx.exec(Source::source("(/ 1 0)")).is_err());
    }

    #[test]
    fn mod_takes_the_sign_of_the_divisor() {
        let mut ctx = context();
        let result = ctx.exec(Source::source("(mod -1 3)")).unwrap();
        assert_eq!(ctx.heap().read_integer(result), 2);
    }

    #[test]
    fn unary_minus_negates() {
        let mut ctx = context();
        let result = ctx.exec(Source::source("(- 5)")).unwrap();
        assert_eq!(ctx.heap().read_integer(result), -5);
    }

    #[test]
    fn ordering_chain_checks_every_pair() {
        let mut ctx = context();
        let result = ctx.exec(Source::source("(< 1 2 3)")).unwrap();
        assert!(ctx.heap().read_boolean(result));
        let failing = ctx.exec(Source::source("(< 1 3 2)")).unwrap();
        assert!(!ctx.heap().read_boolean(failing));
    }
}
