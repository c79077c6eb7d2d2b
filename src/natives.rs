// ABOUTME: Native procedures callable from sprig code and their registration

use crate::error::RuntimeError;
use crate::heap::{self, HeapObj, Proc, RuntimeMap};
use crate::scope::Scope;
use crate::value::Value;
use crate::vm::Vm;

// ============================================================================
// Native Definition Macro
// ============================================================================
//
// Defines the native function and a matching register_* helper that
// interns the name and drops a pinned procedure value into the
// scope's table.

macro_rules! define_native {
    { $fn_ident:ident, name: $lisp_name:literal, $impl:expr } => {
        pub fn $fn_ident(vm: &mut Vm, nargs: u16) -> Result<Value, RuntimeError> {
            $impl(vm, nargs)
        }

        paste::paste! {
            pub fn [<register_ $fn_ident>](scope: &Scope) {
                let name = scope.intern($lisp_name);
                let proc_value = scope.gc.borrow_mut().alloc_pinned(HeapObj::Proc(Proc::Native {
                    name: $lisp_name,
                    func: $fn_ident,
                }));
                scope.add_proc(name, proc_value);
            }
        }
    };
}

/// Register every native procedure at the (root) scope.
pub fn register_natives(scope: &Scope) {
    register_native_print(scope);
    register_native_make_vec(scope);
    register_native_make_map(scope);
    register_native_list(scope);
    register_native_type(scope);
    register_native_read_file(scope);
    register_native_write_file(scope);
}

/// Pop `nargs` values and return them in source (push) order.
fn pop_args(vm: &mut Vm, nargs: u16) -> Result<Vec<Value>, RuntimeError> {
    let mut args = Vec::with_capacity(usize::from(nargs));
    for _ in 0..nargs {
        args.push(vm.pop_value()?);
    }
    args.reverse();
    Ok(args)
}

fn expect_string(vm: &Vm, value: Value) -> Result<String, RuntimeError> {
    match vm.gc.borrow().get(value) {
        Some(HeapObj::Str(s)) => Ok(s.clone()),
        _ => Err(RuntimeError::type_mismatch("string", value.type_name())),
    }
}

// ============================================================================
// Console
// ============================================================================

define_native! {
    native_print,
    name: "print",
    |vm: &mut Vm, nargs: u16| {
        let args = pop_args(vm, nargs)?;
        let mut line = String::new();
        {
            let gc = vm.gc.borrow();
            for (i, value) in args.iter().enumerate() {
                if i > 0 {
                    line.push(' ');
                }
                heap::write_value(&gc, &mut line, *value);
            }
        }
        line.push('\n');
        vm.write_out(&line)?;
        Ok(Value::NIL)
    }
}

// ============================================================================
// Constructors
// ============================================================================

define_native! {
    native_make_vec,
    name: "make-vec",
    |vm: &mut Vm, nargs: u16| {
        let items = pop_args(vm, nargs)?;
        Ok(vm.gc.borrow_mut().alloc(HeapObj::Vector(items)))
    }
}

define_native! {
    native_make_map,
    name: "make-map",
    |vm: &mut Vm, nargs: u16| {
        if nargs % 2 != 0 {
            return Err(RuntimeError::arity(
                "make-map",
                "an even number of",
                usize::from(nargs),
            ));
        }
        let items = pop_args(vm, nargs)?;
        let map = {
            let mut gc = vm.gc.borrow_mut();
            let map = gc.alloc(HeapObj::Map(RuntimeMap::with_capacity(usize::from(nargs) / 2)));
            for pair in items.chunks(2) {
                heap::map_insert(&mut gc, map, pair[0], pair[1]);
            }
            map
        };
        Ok(map)
    }
}

define_native! {
    native_list,
    name: "list",
    |vm: &mut Vm, nargs: u16| {
        let items = pop_args(vm, nargs)?;
        Ok(vm.gc.borrow_mut().alloc(HeapObj::List(items)))
    }
}

// ============================================================================
// Introspection
// ============================================================================

define_native! {
    native_type,
    name: "type",
    |vm: &mut Vm, nargs: u16| {
        if nargs != 1 {
            return Err(RuntimeError::arity("type", "1", usize::from(nargs)));
        }
        let value = vm.pop_value()?;
        let name = value.type_name();
        Ok(vm.gc.borrow_mut().alloc(HeapObj::Str(name.to_string())))
    }
}

// ============================================================================
// Filesystem
// ============================================================================

define_native! {
    native_read_file,
    name: "read-file",
    |vm: &mut Vm, nargs: u16| {
        if nargs != 1 {
            return Err(RuntimeError::arity("read-file", "1", usize::from(nargs)));
        }
        let path_value = vm.pop_value()?;
        let path = expect_string(vm, path_value)?;
        // IO failures surface as nil, not as runtime errors.
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(vm.gc.borrow_mut().alloc(HeapObj::Str(contents))),
            Err(_) => Ok(Value::NIL),
        }
    }
}

define_native! {
    native_write_file,
    name: "write-file",
    |vm: &mut Vm, nargs: u16| {
        if nargs != 2 {
            return Err(RuntimeError::arity("write-file", "2", usize::from(nargs)));
        }
        let data_value = vm.pop_value()?;
        let path_value = vm.pop_value()?;
        let path = expect_string(vm, path_value)?;
        let data = expect_string(vm, data_value)?;
        match std::fs::write(&path, data.as_bytes()) {
            Ok(()) => Ok(Value::TRUE),
            Err(_) => Ok(Value::FALSE),
        }
    }
}
