// ABOUTME: Compile-time scope tree holding locals, procedures, macros, and the shared code buffers

use crate::bytecode::{Code, Instr};
use crate::gc::Gc;
use crate::heap::Params;
use crate::intern::StringStore;
use crate::value::Value;
use crate::vm::Vm;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A compile-time macro: its body is compiled into the shared
/// procedure buffer and entered at `label` on the macro VM. Macros
/// are not visible as run-time values.
#[derive(Debug)]
pub struct Macro {
    pub params: Params,
    pub label: usize,
}

/// One node of the compile-time environment tree. The root owns the
/// two code buffers (top-level and procedures), the string store, the
/// heap and the macro VM; children share all of them and differ only
/// in which buffer they write and which locals they see.
pub struct Scope {
    parent: Option<Rc<Scope>>,
    pub gc: Rc<RefCell<Gc>>,
    pub store: Rc<RefCell<StringStore>>,
    pub top_level_code: Rc<RefCell<Code>>,
    pub proc_code: Rc<RefCell<Code>>,
    /// The buffer this scope emits into; one of the two above.
    pub current_code: Rc<RefCell<Code>>,
    pub macro_vm: Rc<RefCell<Vm>>,
    // Procedure values and macros, keyed by the interned name's bits.
    procs: RefCell<HashMap<u64, Value>>,
    macros: RefCell<HashMap<u64, Rc<Macro>>>,
    locals: RefCell<Vec<Value>>,
}

impl Scope {
    /// Create the root scope with the native procedures registered.
    pub fn root() -> Rc<Self> {
        let gc = Rc::new(RefCell::new(Gc::new()));
        let store = Rc::new(RefCell::new(StringStore::new()));
        let top_level_code = Rc::new(RefCell::new(Code::new()));
        let proc_code = Rc::new(RefCell::new(Code::new()));
        let macro_vm = Rc::new(RefCell::new(Vm::new(gc.clone())));

        let scope = Rc::new(Scope {
            parent: None,
            gc,
            store,
            current_code: top_level_code.clone(),
            top_level_code,
            proc_code,
            macro_vm,
            procs: RefCell::new(HashMap::new()),
            macros: RefCell::new(HashMap::new()),
            locals: RefCell::new(Vec::new()),
        });

        crate::natives::register_natives(&scope);
        scope
    }

    fn child(self: &Rc<Self>, current_code: Rc<RefCell<Code>>) -> Rc<Scope> {
        Rc::new(Scope {
            parent: Some(self.clone()),
            gc: self.gc.clone(),
            store: self.store.clone(),
            top_level_code: self.top_level_code.clone(),
            proc_code: self.proc_code.clone(),
            current_code,
            macro_vm: self.macro_vm.clone(),
            procs: RefCell::new(HashMap::new()),
            macros: RefCell::new(HashMap::new()),
            locals: RefCell::new(Vec::new()),
        })
    }

    /// Child scope for a procedure or macro body; emits into the
    /// shared procedure buffer.
    pub fn proc_child(self: &Rc<Self>) -> Rc<Scope> {
        let code = self.proc_code.clone();
        self.child(code)
    }

    /// Child scope for a `let` group; keeps emitting wherever the
    /// parent was emitting.
    pub fn let_child(self: &Rc<Self>) -> Rc<Scope> {
        let code = self.current_code.clone();
        self.child(code)
    }

    pub fn intern(&self, text: &str) -> Value {
        self.store.borrow_mut().intern(&mut self.gc.borrow_mut(), text)
    }

    pub fn emit(&self, instr: Instr) {
        self.current_code.borrow_mut().push(instr);
    }

    /// Offset of the next instruction in the current buffer.
    pub fn code_len(&self) -> usize {
        self.current_code.borrow().len()
    }

    pub fn add_local(&self, name: Value) {
        self.locals.borrow_mut().push(name);
    }

    /// Is the name a local here or in any ancestor scope?
    pub fn is_local(&self, name: Value) -> bool {
        if self.locals.borrow().iter().any(|n| n.bits() == name.bits()) {
            return true;
        }
        match &self.parent {
            Some(parent) => parent.is_local(name),
            None => false,
        }
    }

    pub fn add_proc(&self, name: Value, proc_value: Value) {
        self.procs.borrow_mut().insert(name.bits(), proc_value);
    }

    pub fn get_proc(&self, name: Value) -> Option<Value> {
        if let Some(value) = self.procs.borrow().get(&name.bits()) {
            return Some(*value);
        }
        self.parent.as_ref().and_then(|p| p.get_proc(name))
    }

    pub fn add_macro(&self, name: Value, macro_def: Rc<Macro>) {
        self.macros.borrow_mut().insert(name.bits(), macro_def);
    }

    pub fn get_macro(&self, name: Value) -> Option<Rc<Macro>> {
        if let Some(m) = self.macros.borrow().get(&name.bits()) {
            return Some(m.clone());
        }
        self.parent.as_ref().and_then(|p| p.get_macro(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_has_natives_registered() {
        let root = Scope::root();
        for name in ["print", "make-vec", "make-map", "read-file", "write-file"] {
            let interned = root.intern(name);
            assert!(root.get_proc(interned).is_some(), "missing native {name}");
        }
    }

    #[test]
    fn test_children_share_root_resources() {
        let root = Scope::root();
        let child = root.proc_child();
        assert!(Rc::ptr_eq(&root.gc, &child.gc));
        assert!(Rc::ptr_eq(&root.store, &child.store));
        assert!(Rc::ptr_eq(&child.current_code, &root.proc_code));

        let grandchild = child.let_child();
        assert!(Rc::ptr_eq(&grandchild.current_code, &root.proc_code));

        let let_at_top = root.let_child();
        assert!(Rc::ptr_eq(&let_at_top.current_code, &root.top_level_code));
    }

    #[test]
    fn test_local_lookup_walks_parents() {
        let root = Scope::root();
        let name = root.intern("x");
        root.add_local(name);

        let child = root.proc_child();
        assert!(child.is_local(name));
        let other = root.intern("y");
        assert!(!child.is_local(other));
    }

    #[test]
    fn test_proc_lookup_walks_parents() {
        let root = Scope::root();
        let child = root.proc_child();
        let name = root.intern("helper");
        root.add_proc(name, Value::proc(1));
        assert_eq!(child.get_proc(name), Some(Value::proc(1)));
    }

    #[test]
    fn test_macro_table_separate_from_procs() {
        let root = Scope::root();
        let name = root.intern("twice");
        root.add_macro(
            name,
            Rc::new(Macro {
                params: Params::new(vec![]),
                label: 0,
            }),
        );
        assert!(root.get_macro(name).is_some());
        assert!(root.get_proc(name).is_none());
    }
}
