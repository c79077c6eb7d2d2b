// ABOUTME: Stack-frame virtual machine executing sprig bytecode

use crate::bytecode::{Code, Instr};
use crate::error::RuntimeError;
use crate::gc::Gc;
use crate::heap::{HeapObj, Proc, RuntimeMap};
use crate::scope::{Macro, Scope};
use crate::value::{Value, LIST_TAG, MAP_TAG, STRING_TAG, VECTOR_TAG};
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

pub const OP_STACK_SIZE: usize = 64;
pub const FRAME_STACK_SIZE: usize = 1024;
pub const MAX_LOCALS: usize = 16;

/// Per-call state: a bounded operand stack and named local bindings
/// partitioned into nested scopes by `let`.
#[derive(Debug, Default)]
pub struct Frame {
    stack: Vec<Value>,
    locals: Vec<(Value, Value)>,
    scope_marks: Vec<usize>,
}

impl Frame {
    fn new() -> Self {
        Frame::default()
    }

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.stack.len() >= OP_STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    pub fn peek(&self) -> Option<Value> {
        self.stack.last().copied()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn add_local(&mut self, name: Value, value: Value) -> Result<(), RuntimeError> {
        if self.locals.len() >= MAX_LOCALS {
            return Err(RuntimeError::TooManyLocals);
        }
        self.locals.push((name, value));
        Ok(())
    }

    /// Innermost binding wins, so rebinding shadows.
    fn get_local(&self, name: Value) -> Option<Value> {
        self.locals
            .iter()
            .rev()
            .find(|(n, _)| n.bits() == name.bits())
            .map(|(_, v)| *v)
    }

    fn push_scope(&mut self) {
        self.scope_marks.push(self.locals.len());
    }

    fn pop_scope(&mut self) {
        if let Some(mark) = self.scope_marks.pop() {
            self.locals.truncate(mark);
        }
    }
}

#[derive(Clone, Copy)]
enum Arith {
    Add,
    Sub,
    Mul,
    Div,
}

/// The virtual machine. Two instances exist per pipeline: the main VM
/// running the top-level program, and the macro VM the compiler uses
/// to evaluate macro bodies. Both share one heap.
pub struct Vm {
    frames: Vec<Frame>,
    pub gc: Rc<RefCell<Gc>>,
    out: Box<dyn Write>,
}

impl Vm {
    pub fn new(gc: Rc<RefCell<Gc>>) -> Self {
        Self::with_output(gc, Box::new(std::io::stdout()))
    }

    pub fn with_output(gc: Rc<RefCell<Gc>>, out: Box<dyn Write>) -> Self {
        Vm {
            frames: vec![Frame::new()],
            gc,
            out,
        }
    }

    fn frame(&self) -> &Frame {
        self.frames.last().expect("frame stack is never empty")
    }

    fn frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("frame stack is never empty")
    }

    /// Pop an operand from the current frame. Natives use this to
    /// fetch their arguments.
    pub fn pop_value(&mut self) -> Result<Value, RuntimeError> {
        self.frame_mut().pop()
    }

    pub fn push_value(&mut self, value: Value) -> Result<(), RuntimeError> {
        self.frame_mut().push(value)
    }

    /// Depth of the current frame's operand stack.
    pub fn stack_depth(&self) -> usize {
        self.frame().depth()
    }

    pub fn peek_top(&self) -> Option<Value> {
        self.frame().peek()
    }

    /// Every value the collector must treat as live: operand stacks
    /// and locals of every frame.
    pub fn roots(&self) -> Vec<Value> {
        let mut roots = Vec::new();
        for frame in &self.frames {
            roots.extend(frame.stack.iter().copied());
            for (name, value) in &frame.locals {
                roots.push(*name);
                roots.push(*value);
            }
        }
        roots
    }

    pub fn write_out(&mut self, text: &str) -> Result<(), RuntimeError> {
        self.out
            .write_all(text.as_bytes())
            .and_then(|_| self.out.flush())
            .map_err(|e| RuntimeError::Io(e.to_string()))
    }

    /// Execute `code` from `start` until the buffer ends or a RET is
    /// reached. The scope handle resolves procedure names at CALL and
    /// GET_LOCAL dispatch.
    pub fn run(
        &mut self,
        code: &Rc<RefCell<Code>>,
        start: usize,
        scope: &Rc<Scope>,
    ) -> Result<(), RuntimeError> {
        let mut ip = start;
        loop {
            let instr = {
                let code_ref = code.borrow();
                match code_ref.get(ip) {
                    Some(instr) => instr.clone(),
                    None => break,
                }
            };
            ip += 1;

            match instr {
                Instr::Push(value) => self.frame_mut().push(value)?,
                Instr::Pop(n) => {
                    for _ in 0..n {
                        self.frame_mut().pop()?;
                    }
                }
                Instr::GetLocal(name) => {
                    let value = self
                        .frame()
                        .get_local(name)
                        .or_else(|| scope.get_proc(name));
                    match value {
                        Some(v) => self.frame_mut().push(v)?,
                        None => {
                            return Err(RuntimeError::UnboundName {
                                name: self.name_string(name),
                            })
                        }
                    }
                }
                Instr::AddLocal(name) => {
                    let value = self.frame_mut().pop()?;
                    self.frame_mut().add_local(name, value)?;
                }
                Instr::PushScope(_) => self.frame_mut().push_scope(),
                Instr::PopScope => self.frame_mut().pop_scope(),
                Instr::Call { name, nargs } => self.call_named(name, nargs, scope)?,
                Instr::Ret => break,
                Instr::Jz(label) => {
                    let value = self.frame_mut().pop()?;
                    if value.is_falsy() {
                        ip = label.target();
                    }
                }
                Instr::Jnz(label) => {
                    let value = self.frame_mut().pop()?;
                    if !value.is_falsy() {
                        ip = label.target();
                    }
                }
                Instr::Branch(label) => ip = label.target(),
                Instr::Add(n) => self.arithmetic(Arith::Add, n)?,
                Instr::Sub(n) => self.arithmetic(Arith::Sub, n)?,
                Instr::Mul(n) => self.arithmetic(Arith::Mul, n)?,
                Instr::Div(n) => self.arithmetic(Arith::Div, n)?,
                Instr::Cmp => {
                    let rhs = self.frame_mut().pop()?;
                    let lhs = self.frame_mut().pop()?;
                    let (Some(a), Some(b)) = (lhs.as_number(), rhs.as_number()) else {
                        let got = if lhs.as_number().is_none() { lhs } else { rhs };
                        return Err(RuntimeError::type_mismatch("number", got.type_name()));
                    };
                    self.frame_mut().push(Value::from_int(numeric_cmp(a, b)))?;
                }
                Instr::Eq(k) => {
                    let value = self.frame_mut().pop()?;
                    let result = value.as_number() == Some(k as f64);
                    self.frame_mut().push(Value::from_bool(result))?;
                }
                Instr::Neq(k) => {
                    let value = self.frame_mut().pop()?;
                    let result = value.as_number() != Some(k as f64);
                    self.frame_mut().push(Value::from_bool(result))?;
                }
                Instr::Alloc { tag, count } => {
                    let value = self.alloc_empty(tag, count)?;
                    self.frame_mut().push(value)?;
                }
            }
        }
        Ok(())
    }

    fn call_named(&mut self, name: Value, nargs: u16, scope: &Rc<Scope>) -> Result<(), RuntimeError> {
        // Locals holding a procedure value shadow the proc table; a
        // local of any other type falls through to it.
        let callee = self
            .frame()
            .get_local(name)
            .filter(|v| v.is_proc())
            .or_else(|| scope.get_proc(name));
        let Some(callee) = callee else {
            return Err(RuntimeError::UnboundName {
                name: self.name_string(name),
            });
        };

        let proc = match self.gc.borrow().get(callee) {
            Some(HeapObj::Proc(p)) => p.clone(),
            _ => {
                return Err(RuntimeError::type_mismatch(
                    "procedure",
                    callee.type_name(),
                ))
            }
        };

        match proc {
            Proc::Bytecode {
                params,
                code,
                label,
            } => {
                if usize::from(nargs) != params.len() {
                    return Err(RuntimeError::arity(
                        &self.name_string(name),
                        params.len().to_string(),
                        usize::from(nargs),
                    ));
                }
                if self.frames.len() >= FRAME_STACK_SIZE {
                    return Err(RuntimeError::FrameOverflow);
                }

                // Arguments come off the caller's stack last-first.
                let mut frame = Frame::new();
                for param in params.names.iter().rev() {
                    let value = self.frame_mut().pop()?;
                    frame.add_local(*param, value)?;
                }
                self.frames.push(frame);

                match self.run(&code, label, scope) {
                    Ok(()) => {
                        let ret = self.frame_mut().pop().unwrap_or(Value::NIL);
                        self.frames.pop();
                        self.frame_mut().push(ret)
                    }
                    Err(err) => {
                        self.frames.pop();
                        Err(err)
                    }
                }
            }
            Proc::Native { func, .. } => {
                let ret = func(self, nargs)?;
                self.frame_mut().push(ret)
            }
        }
    }

    /// Run a macro body to completion with the reified argument
    /// expressions bound as its locals; returns the result value.
    pub fn call_macro(
        &mut self,
        macro_def: &Macro,
        args: &[Value],
        code: &Rc<RefCell<Code>>,
        scope: &Rc<Scope>,
    ) -> Result<Value, RuntimeError> {
        if args.len() != macro_def.params.len() {
            return Err(RuntimeError::arity(
                "macro",
                macro_def.params.len().to_string(),
                args.len(),
            ));
        }
        if self.frames.len() >= FRAME_STACK_SIZE {
            return Err(RuntimeError::FrameOverflow);
        }

        let mut frame = Frame::new();
        for (param, value) in macro_def.params.names.iter().zip(args) {
            frame.add_local(*param, *value)?;
        }
        self.frames.push(frame);

        match self.run(code, macro_def.label, scope) {
            Ok(()) => {
                let ret = self.frame_mut().pop().unwrap_or(Value::NIL);
                self.frames.pop();
                Ok(ret)
            }
            Err(err) => {
                self.frames.pop();
                Err(err)
            }
        }
    }

    fn arithmetic(&mut self, op: Arith, n: usize) -> Result<(), RuntimeError> {
        let mut operands = Vec::with_capacity(n);
        for _ in 0..n {
            operands.push(self.frame_mut().pop()?);
        }
        operands.reverse();

        for v in &operands {
            if v.as_number().is_none() {
                return Err(RuntimeError::type_mismatch("number", v.type_name()));
            }
        }
        let all_int = operands.iter().all(|v| v.is_int());

        let result = match op {
            Arith::Add if all_int => {
                int_result(operands.iter().map(|v| i64::from(v.as_int())).sum())
            }
            Arith::Add => Value::from_f64(operands.iter().filter_map(|v| v.as_number()).sum()),
            Arith::Mul if all_int => {
                int_result(operands.iter().map(|v| i64::from(v.as_int())).product())
            }
            Arith::Mul => Value::from_f64(
                operands
                    .iter()
                    .filter_map(|v| v.as_number())
                    .product(),
            ),
            Arith::Sub => {
                if operands.is_empty() {
                    Value::from_int(0)
                } else if all_int {
                    let first = i64::from(operands[0].as_int());
                    int_result(
                        operands[1..]
                            .iter()
                            .fold(first, |acc, v| acc - i64::from(v.as_int())),
                    )
                } else {
                    let mut acc = operands[0].as_number().unwrap_or(0.0);
                    for v in &operands[1..] {
                        acc -= v.as_number().unwrap_or(0.0);
                    }
                    Value::from_f64(acc)
                }
            }
            // Division always produces a double; dividing by zero
            // follows IEEE-754 rather than raising.
            Arith::Div => {
                if operands.is_empty() {
                    Value::from_f64(f64::NAN)
                } else {
                    let mut acc = operands[0].as_number().unwrap_or(f64::NAN);
                    for v in &operands[1..] {
                        acc /= v.as_number().unwrap_or(f64::NAN);
                    }
                    Value::from_f64(acc)
                }
            }
        };

        self.frame_mut().push(result)
    }

    fn alloc_empty(&mut self, tag: u16, count: usize) -> Result<Value, RuntimeError> {
        let obj = match tag {
            STRING_TAG => HeapObj::Str(String::new()),
            VECTOR_TAG => HeapObj::Vector(Vec::with_capacity(count)),
            LIST_TAG => HeapObj::List(vec![Value::NIL; count]),
            MAP_TAG => HeapObj::Map(RuntimeMap::with_capacity(count)),
            _ => {
                return Err(RuntimeError::type_mismatch(
                    "an allocatable tag",
                    "procedure",
                ))
            }
        };
        Ok(self.gc.borrow_mut().alloc(obj))
    }

    fn name_string(&self, name: Value) -> String {
        match self.gc.borrow().get(name) {
            Some(HeapObj::Str(s)) => s.clone(),
            _ => format!("#{:x}", name.bits()),
        }
    }
}

fn int_result(value: i64) -> Value {
    match i32::try_from(value) {
        Ok(i) => Value::from_int(i),
        Err(_) => Value::from_f64(value as f64),
    }
}

/// Three-way numeric comparison. Both-NaN compares equal; a single
/// NaN compares greater than anything, matching the canonical NaN's
/// position in the total order.
fn numeric_cmp(a: f64, b: f64) -> i32 {
    if a == b || (a.is_nan() && b.is_nan()) {
        0
    } else if a.is_nan() {
        1
    } else if b.is_nan() {
        -1
    } else if a < b {
        -1
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Label;
    use crate::heap::Params;

    fn run_code(code: Vec<Instr>) -> (Vm, Rc<Scope>) {
        let scope = Scope::root();
        let mut vm = Vm::new(scope.gc.clone());
        let code = Rc::new(RefCell::new(code));
        vm.run(&code, 0, &scope).expect("vm run failed");
        (vm, scope)
    }

    fn run_expect_err(code: Vec<Instr>) -> RuntimeError {
        let scope = Scope::root();
        let mut vm = Vm::new(scope.gc.clone());
        let code = Rc::new(RefCell::new(code));
        vm.run(&code, 0, &scope).expect_err("expected an error")
    }

    #[test]
    fn test_push_and_pop() {
        let (vm, _) = run_code(vec![
            Instr::Push(Value::from_int(1)),
            Instr::Push(Value::from_int(2)),
            Instr::Pop(1),
        ]);
        assert_eq!(vm.peek_top(), Some(Value::from_int(1)));
        assert_eq!(vm.stack_depth(), 1);
    }

    #[test]
    fn test_int_arithmetic() {
        let (vm, _) = run_code(vec![
            Instr::Push(Value::from_int(1)),
            Instr::Push(Value::from_int(2)),
            Instr::Push(Value::from_int(3)),
            Instr::Add(3),
        ]);
        assert_eq!(vm.peek_top(), Some(Value::from_int(6)));
    }

    #[test]
    fn test_mixed_arithmetic_promotes_to_double() {
        let (vm, _) = run_code(vec![
            Instr::Push(Value::from_int(1)),
            Instr::Push(Value::from_f64(2.5)),
            Instr::Add(2),
        ]);
        let top = vm.peek_top().expect("empty stack");
        assert!(top.is_double());
        assert_eq!(top.as_f64(), 3.5);
    }

    #[test]
    fn test_sub_is_left_to_right() {
        let (vm, _) = run_code(vec![
            Instr::Push(Value::from_int(10)),
            Instr::Push(Value::from_int(3)),
            Instr::Push(Value::from_int(2)),
            Instr::Sub(3),
        ]);
        assert_eq!(vm.peek_top(), Some(Value::from_int(5)));
    }

    #[test]
    fn test_arithmetic_identities() {
        let (vm, _) = run_code(vec![Instr::Add(0)]);
        assert_eq!(vm.peek_top(), Some(Value::from_int(0)));

        let (vm, _) = run_code(vec![Instr::Mul(0)]);
        assert_eq!(vm.peek_top(), Some(Value::from_int(1)));

        let (vm, _) = run_code(vec![Instr::Sub(0)]);
        assert_eq!(vm.peek_top(), Some(Value::from_int(0)));

        let (vm, _) = run_code(vec![Instr::Div(0)]);
        let top = vm.peek_top().expect("empty stack");
        assert!(top.as_f64().is_nan());
    }

    #[test]
    fn test_division_is_always_double() {
        let (vm, _) = run_code(vec![
            Instr::Push(Value::from_int(7)),
            Instr::Push(Value::from_int(2)),
            Instr::Div(2),
        ]);
        let top = vm.peek_top().expect("empty stack");
        assert!(top.is_double());
        assert_eq!(top.as_f64(), 3.5);
    }

    #[test]
    fn test_divide_by_zero_is_not_an_error() {
        let (vm, _) = run_code(vec![
            Instr::Push(Value::from_f64(0.0)),
            Instr::Push(Value::from_int(0)),
            Instr::Div(2),
        ]);
        assert!(vm.peek_top().expect("empty stack").as_f64().is_nan());
    }

    #[test]
    fn test_arithmetic_type_error_is_fatal() {
        let err = run_expect_err(vec![Instr::Push(Value::NIL), Instr::Add(1)]);
        assert!(matches!(err, RuntimeError::TypeMismatch { .. }));
    }

    #[test]
    fn test_cmp_orderings() {
        for (a, b, expected) in [(1.0, 2.0, -1), (2.0, 1.0, 1), (2.0, 2.0, 0)] {
            let (vm, _) = run_code(vec![
                Instr::Push(Value::from_f64(a)),
                Instr::Push(Value::from_f64(b)),
                Instr::Cmp,
            ]);
            assert_eq!(vm.peek_top(), Some(Value::from_int(expected)), "{a} vs {b}");
        }
    }

    #[test]
    fn test_nan_compares_equal_to_nan() {
        let (vm, _) = run_code(vec![
            Instr::Push(Value::from_f64(f64::NAN)),
            Instr::Push(Value::from_f64(f64::NAN)),
            Instr::Cmp,
            Instr::Eq(0),
        ]);
        assert_eq!(vm.peek_top(), Some(Value::TRUE));
    }

    #[test]
    fn test_eq_and_neq_against_operand() {
        let (vm, _) = run_code(vec![
            Instr::Push(Value::from_int(-1)),
            Instr::Eq(-1),
        ]);
        assert_eq!(vm.peek_top(), Some(Value::TRUE));

        let (vm, _) = run_code(vec![
            Instr::Push(Value::from_int(1)),
            Instr::Neq(-1),
        ]);
        assert_eq!(vm.peek_top(), Some(Value::TRUE));
    }

    #[test]
    fn test_jz_consumes_and_jumps_on_falsy() {
        // Compiled shape of (if cond 10 20).
        let alt = Label::new();
        let end = Label::new();
        alt.link(4);
        end.link(5);
        let build = |cond: Value| {
            vec![
                Instr::Push(cond),
                Instr::Jz(alt.clone()),
                Instr::Push(Value::from_int(10)),
                Instr::Branch(end.clone()),
                Instr::Push(Value::from_int(20)),
            ]
        };

        let (vm, _) = run_code(build(Value::TRUE));
        assert_eq!(vm.peek_top(), Some(Value::from_int(10)));
        assert_eq!(vm.stack_depth(), 1);

        let (vm, _) = run_code(build(Value::NIL));
        assert_eq!(vm.peek_top(), Some(Value::from_int(20)));

        let (vm, _) = run_code(build(Value::FALSE));
        assert_eq!(vm.peek_top(), Some(Value::from_int(20)));
    }

    #[test]
    fn test_jnz_jumps_on_truthy() {
        let end = Label::new();
        end.link(3);
        let (vm, _) = run_code(vec![
            Instr::Push(Value::from_int(0)),
            Instr::Jnz(end.clone()),
            Instr::Push(Value::from_int(7)),
            Instr::Push(Value::from_int(9)),
        ]);
        // Zero is truthy, so the jump skips the push of 7.
        assert_eq!(vm.stack_depth(), 1);
        assert_eq!(vm.peek_top(), Some(Value::from_int(9)));
    }

    #[test]
    fn test_locals_and_scopes() {
        let scope = Scope::root();
        let x = scope.intern("x");
        let code = vec![
            Instr::Push(Value::from_int(1)),
            Instr::AddLocal(x),
            Instr::PushScope(1),
            Instr::Push(Value::from_int(2)),
            Instr::AddLocal(x),
            Instr::GetLocal(x),
            Instr::PopScope,
            Instr::GetLocal(x),
        ];
        let mut vm = Vm::new(scope.gc.clone());
        let code = Rc::new(RefCell::new(code));
        vm.run(&code, 0, &scope).expect("vm run failed");
        // Inner scope saw the shadowing binding, outer sees the original.
        assert_eq!(vm.pop_value().ok(), Some(Value::from_int(1)));
        assert_eq!(vm.pop_value().ok(), Some(Value::from_int(2)));
    }

    #[test]
    fn test_get_local_unbound_is_an_error() {
        let scope = Scope::root();
        let ghost = scope.intern("ghost");
        let mut vm = Vm::new(scope.gc.clone());
        let code = Rc::new(RefCell::new(vec![Instr::GetLocal(ghost)]));
        let err = vm.run(&code, 0, &scope).expect_err("expected an error");
        assert!(matches!(err, RuntimeError::UnboundName { ref name } if name == "ghost"));
    }

    #[test]
    fn test_get_local_falls_back_to_proc_table() {
        let scope = Scope::root();
        let name = scope.intern("print");
        let (vm, _) = {
            let mut vm = Vm::new(scope.gc.clone());
            let code = Rc::new(RefCell::new(vec![Instr::GetLocal(name)]));
            vm.run(&code, 0, &scope).expect("vm run failed");
            (vm, ())
        };
        assert!(vm.peek_top().expect("empty stack").is_proc());
    }

    #[test]
    fn test_call_bytecode_proc() {
        let scope = Scope::root();
        let x = scope.intern("x");
        let double = scope.intern("double");
        {
            let mut proc_code = scope.proc_code.borrow_mut();
            proc_code.push(Instr::GetLocal(x));
            proc_code.push(Instr::GetLocal(x));
            proc_code.push(Instr::Add(2));
            proc_code.push(Instr::Ret);
        }
        let proc_value = scope.gc.borrow_mut().alloc_pinned(HeapObj::Proc(Proc::Bytecode {
            params: Params::new(vec![x]),
            code: scope.proc_code.clone(),
            label: 0,
        }));
        scope.add_proc(double, proc_value);

        let mut vm = Vm::new(scope.gc.clone());
        let code = Rc::new(RefCell::new(vec![
            Instr::Push(Value::from_int(21)),
            Instr::Call {
                name: double,
                nargs: 1,
            },
        ]));
        vm.run(&code, 0, &scope).expect("vm run failed");
        assert_eq!(vm.peek_top(), Some(Value::from_int(42)));
        assert_eq!(vm.stack_depth(), 1);
    }

    #[test]
    fn test_call_arity_mismatch() {
        let scope = Scope::root();
        let x = scope.intern("x");
        let f = scope.intern("f");
        scope.proc_code.borrow_mut().push(Instr::Ret);
        let proc_value = scope.gc.borrow_mut().alloc_pinned(HeapObj::Proc(Proc::Bytecode {
            params: Params::new(vec![x]),
            code: scope.proc_code.clone(),
            label: 0,
        }));
        scope.add_proc(f, proc_value);

        let mut vm = Vm::new(scope.gc.clone());
        let code = Rc::new(RefCell::new(vec![Instr::Call { name: f, nargs: 0 }]));
        let err = vm.run(&code, 0, &scope).expect_err("expected an error");
        assert!(matches!(err, RuntimeError::ArityMismatch { .. }));
    }

    #[test]
    fn test_operand_stack_overflow() {
        let code: Vec<Instr> = (0..=OP_STACK_SIZE)
            .map(|i| Instr::Push(Value::from_int(i as i32)))
            .collect();
        let err = run_expect_err(code);
        assert!(matches!(err, RuntimeError::StackOverflow));
    }

    #[test]
    fn test_alloc_instruction() {
        let (vm, _) = run_code(vec![Instr::Alloc {
            tag: VECTOR_TAG,
            count: 3,
        }]);
        let top = vm.peek_top().expect("empty stack");
        assert!(top.is_vector());
        assert!(matches!(
            vm.gc.borrow().get(top),
            Some(HeapObj::Vector(items)) if items.is_empty()
        ));
    }

    #[test]
    fn test_int_overflow_spills_to_double() {
        let (vm, _) = run_code(vec![
            Instr::Push(Value::from_int(i32::MAX)),
            Instr::Push(Value::from_int(i32::MAX)),
            Instr::Add(2),
        ]);
        let top = vm.peek_top().expect("empty stack");
        assert!(top.is_double());
        assert_eq!(top.as_f64(), f64::from(i32::MAX) * 2.0);
    }
}
