// ABOUTME: Bytecode instruction set, patchable jump labels, and disassembly

use crate::gc::Gc;
use crate::heap::HeapObj;
use crate::value::Value;
use std::cell::Cell;
use std::fmt::Write as _;
use std::rc::Rc;

pub type Code = Vec<Instr>;

/// A jump target: a mutable offset cell allocated when the jump is
/// emitted and patched once the target offset is known.
#[derive(Debug, Clone, Default)]
pub struct Label(Rc<Cell<usize>>);

impl Label {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(&self, offset: usize) {
        self.0.set(offset);
    }

    pub fn target(&self) -> usize {
        self.0.get()
    }
}

#[derive(Debug, Clone)]
pub enum Instr {
    /// Push a literal value.
    Push(Value),
    /// Pop and discard n values.
    Pop(usize),
    /// Push the local named by the interned operand, falling back to
    /// the procedure table.
    GetLocal(Value),
    /// Pop one value and bind it in the current frame under the name.
    AddLocal(Value),
    /// Enter a nested binding scope expecting n bindings.
    PushScope(usize),
    /// Leave it, discarding its locals.
    PopScope,
    /// Pop nargs values and invoke the named callee.
    Call { name: Value, nargs: u16 },
    /// Return the top of the operand stack to the caller.
    Ret,
    /// Jump if the popped value is falsy.
    Jz(Label),
    /// Jump if the popped value is truthy.
    Jnz(Label),
    /// Unconditional jump.
    Branch(Label),
    /// Pop n numbers, push the accumulated result.
    Add(usize),
    Sub(usize),
    Mul(usize),
    Div(usize),
    /// Pop rhs then lhs, push -1/0/+1 per numeric comparison.
    Cmp,
    /// Pop one value, push TRUE iff it equals the operand.
    Eq(i64),
    /// Pop one value, push TRUE iff it differs from the operand.
    Neq(i64),
    /// Allocate an empty heap object of the tag with room for count
    /// elements, push the boxed pointer.
    Alloc { tag: u16, count: usize },
}

/// Disassemble a code buffer, one instruction per line.
pub fn dump_code(gc: &Gc, code: &[Instr]) -> String {
    let mut out = String::new();
    for (i, instr) in code.iter().enumerate() {
        let _ = write!(out, "[{}] ", i);
        dump_instr(gc, &mut out, instr);
        out.push('\n');
    }
    out
}

fn dump_instr(gc: &Gc, out: &mut String, instr: &Instr) {
    match instr {
        Instr::Push(v) => {
            out.push_str("push ");
            crate::heap::write_value(gc, out, *v);
        }
        Instr::Pop(n) => {
            let _ = write!(out, "pop {}", n);
        }
        Instr::GetLocal(name) => {
            let _ = write!(out, "get_local {}", name_of(gc, *name));
        }
        Instr::AddLocal(name) => {
            let _ = write!(out, "add_local {}", name_of(gc, *name));
        }
        Instr::PushScope(n) => {
            let _ = write!(out, "push_scope {}", n);
        }
        Instr::PopScope => out.push_str("pop_scope"),
        Instr::Call { name, nargs } => {
            let _ = write!(out, "call {} {}", name_of(gc, *name), nargs);
        }
        Instr::Ret => out.push_str("ret"),
        Instr::Jz(label) => {
            let _ = write!(out, "jz {}", label.target());
        }
        Instr::Jnz(label) => {
            let _ = write!(out, "jnz {}", label.target());
        }
        Instr::Branch(label) => {
            let _ = write!(out, "branch {}", label.target());
        }
        Instr::Add(n) => {
            let _ = write!(out, "add {}", n);
        }
        Instr::Sub(n) => {
            let _ = write!(out, "sub {}", n);
        }
        Instr::Mul(n) => {
            let _ = write!(out, "mul {}", n);
        }
        Instr::Div(n) => {
            let _ = write!(out, "div {}", n);
        }
        Instr::Cmp => out.push_str("cmp"),
        Instr::Eq(k) => {
            let _ = write!(out, "eq {}", k);
        }
        Instr::Neq(k) => {
            let _ = write!(out, "neq {}", k);
        }
        Instr::Alloc { tag, count } => {
            let _ = write!(out, "alloc {} {}", tag_name(*tag), count);
        }
    }
}

fn name_of(gc: &Gc, name: Value) -> String {
    match gc.get(name) {
        Some(HeapObj::Str(s)) => s.clone(),
        _ => format!("#{:x}", name.bits()),
    }
}

fn tag_name(tag: u16) -> &'static str {
    match tag {
        crate::value::STRING_TAG => "string",
        crate::value::VECTOR_TAG => "vector",
        crate::value::LIST_TAG => "list",
        crate::value::MAP_TAG => "map",
        crate::value::PROC_TAG => "proc",
        _ => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_starts_at_zero_and_patches() {
        let label = Label::new();
        assert_eq!(label.target(), 0);
        label.link(17);
        assert_eq!(label.target(), 17);

        // A cloned label shares the cell, which is what lets an
        // emitted jump see a later link.
        let alias = label.clone();
        label.link(42);
        assert_eq!(alias.target(), 42);
    }

    #[test]
    fn test_dump_code() {
        let mut gc = Gc::new();
        let name = gc.alloc(HeapObj::Str("print".to_string()));
        let end = Label::new();
        end.link(4);
        let code = vec![
            Instr::Push(Value::from_int(6)),
            Instr::Call { name, nargs: 1 },
            Instr::Branch(end),
            Instr::Cmp,
        ];
        let text = dump_code(&gc, &code);
        assert_eq!(text, "[0] push 6\n[1] call print 1\n[2] branch 4\n[3] cmp\n");
    }
}
