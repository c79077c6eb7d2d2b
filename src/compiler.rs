// ABOUTME: Compiler lowering expressions to bytecode, with special forms and compile-time macro expansion

use crate::ast::{Expr, ExprKind};
use crate::bytecode::{Instr, Label};
use crate::error::CompileError;
use crate::gc::Gc;
use crate::heap::{self, HeapObj, Params, Proc, RuntimeMap};
use crate::lexer::Token;
use crate::scope::{Macro, Scope};
use crate::value::Value;
use std::rc::Rc;

const SPECIAL_FORMS: &[&str] = &[
    "var", "let", "proc", "lambda", "macro", "if", "+", "-", "*", "/", "=", "/=", "<", ">", "<=",
    ">=",
];

/// Append bytecode for `expr` to the scope's current buffer.
pub fn compile<'src>(expr: &Expr<'src>, scope: &Rc<Scope>) -> Result<(), CompileError> {
    if expr.quoted {
        let value = quote_value(expr, scope, true)?;
        scope.emit(Instr::Push(value));
        return Ok(());
    }

    match &expr.kind {
        ExprKind::Int(i) => {
            scope.emit(Instr::Push(int_value(*i)));
            Ok(())
        }
        ExprKind::Float(x) => {
            scope.emit(Instr::Push(Value::from_f64(*x)));
            Ok(())
        }
        ExprKind::Str(s) => {
            let value = scope.intern(s);
            scope.emit(Instr::Push(value));
            Ok(())
        }
        ExprKind::Ident(name) => {
            match name.as_str() {
                "true" => scope.emit(Instr::Push(Value::TRUE)),
                "false" => scope.emit(Instr::Push(Value::FALSE)),
                "nil" => scope.emit(Instr::Push(Value::NIL)),
                _ => {
                    let interned = scope.intern(name);
                    scope.emit(Instr::GetLocal(interned));
                }
            }
            Ok(())
        }
        ExprKind::List(items) => compile_list(expr, items, scope),
        ExprKind::Vector(items) => {
            for item in items {
                compile(item, scope)?;
            }
            emit_native_call(scope, "make-vec", items.len());
            Ok(())
        }
        ExprKind::Map { keys, values } => {
            for (key, value) in keys.iter().zip(values.iter()) {
                compile(key, scope)?;
                compile(value, scope)?;
            }
            emit_native_call(scope, "make-map", keys.len() * 2);
            Ok(())
        }
    }
}

fn compile_list<'src>(
    expr: &Expr<'src>,
    items: &[Expr<'src>],
    scope: &Rc<Scope>,
) -> Result<(), CompileError> {
    let Some(head) = items.first() else {
        // An empty form evaluates to nil.
        scope.emit(Instr::Push(Value::NIL));
        return Ok(());
    };
    let args = &items[1..];

    if let Some(name) = head.head_name() {
        if SPECIAL_FORMS.contains(&name) {
            return compile_sform(name, expr, args, scope);
        }

        let interned = scope.intern(name);
        if let Some(macro_def) = scope.get_macro(interned) {
            let expanded = expand_macro(name, &macro_def, expr, args, scope)?;
            return compile(&expanded, scope);
        }

        // Anything else is a call. The head must be known now: a
        // local, a binding added by var/proc, or a registered native.
        if !scope.is_local(interned) && scope.get_proc(interned).is_none() {
            return Err(CompileError::UnboundName {
                name: name.to_string(),
                location: head.token.location.clone(),
            });
        }

        for arg in args {
            compile(arg, scope)?;
        }
        scope.emit(Instr::Call {
            name: interned,
            nargs: args.len() as u16,
        });
        return Ok(());
    }

    Err(CompileError::type_mismatch(
        "an identifier in call position",
        head.type_name(),
        head.token.location.clone(),
    ))
}

// ============================================================================
// Special forms
// ============================================================================

fn compile_sform<'src>(
    name: &str,
    expr: &Expr<'src>,
    args: &[Expr<'src>],
    scope: &Rc<Scope>,
) -> Result<(), CompileError> {
    match name {
        "var" => sform_var(expr, args, scope),
        "let" => sform_let(expr, args, scope),
        "proc" => sform_proc(expr, args, scope),
        "lambda" => sform_lambda(expr, args, scope),
        "macro" => sform_macro(expr, args, scope),
        "if" => sform_if(expr, args, scope),
        "+" => sform_arith(args, scope, Instr::Add(args.len())),
        "-" => sform_arith(args, scope, Instr::Sub(args.len())),
        "*" => sform_arith(args, scope, Instr::Mul(args.len())),
        "/" => sform_arith(args, scope, Instr::Div(args.len())),
        "=" => sform_cmp(name, expr, args, scope, Instr::Eq(0)),
        "/=" => sform_cmp(name, expr, args, scope, Instr::Neq(0)),
        "<" => sform_cmp(name, expr, args, scope, Instr::Eq(-1)),
        ">" => sform_cmp(name, expr, args, scope, Instr::Eq(1)),
        "<=" => sform_cmp(name, expr, args, scope, Instr::Neq(1)),
        ">=" => sform_cmp(name, expr, args, scope, Instr::Neq(-1)),
        _ => unreachable!("not a special form: {name}"),
    }
}

fn sform_var(expr: &Expr<'_>, args: &[Expr<'_>], scope: &Rc<Scope>) -> Result<(), CompileError> {
    if args.len() != 2 {
        return Err(CompileError::arity(
            "var",
            "2",
            args.len(),
            expr.token.location.clone(),
        ));
    }
    let name = expect_ident(&args[0])?;
    compile(&args[1], scope)?;
    let interned = scope.intern(name);
    scope.emit(Instr::AddLocal(interned));
    scope.add_local(interned);
    Ok(())
}

fn sform_let(expr: &Expr<'_>, args: &[Expr<'_>], scope: &Rc<Scope>) -> Result<(), CompileError> {
    if args.is_empty() {
        return Err(CompileError::arity(
            "let",
            "at least 1",
            0,
            expr.token.location.clone(),
        ));
    }
    let ExprKind::List(bindings) = &args[0].kind else {
        return Err(CompileError::type_mismatch(
            "a binding list",
            args[0].type_name(),
            args[0].token.location.clone(),
        ));
    };
    if bindings.len() % 2 != 0 {
        return Err(CompileError::OddMapLiteral {
            location: args[0].token.location.clone(),
        });
    }

    let inner = scope.let_child();
    inner.emit(Instr::PushScope(bindings.len() / 2));

    // Bindings are introduced one at a time, so later binding
    // expressions can already see the earlier names.
    for pair in bindings.chunks(2) {
        let name = expect_ident(&pair[0])?;
        compile(&pair[1], &inner)?;
        let interned = inner.intern(name);
        inner.emit(Instr::AddLocal(interned));
        inner.add_local(interned);
    }

    let body = &args[1..];
    if body.is_empty() {
        inner.emit(Instr::Push(Value::NIL));
    }
    for (i, form) in body.iter().enumerate() {
        compile(form, &inner)?;
        if i + 1 < body.len() && !is_statement(form) {
            inner.emit(Instr::Pop(1));
        }
    }

    inner.emit(Instr::PopScope);
    Ok(())
}

fn sform_proc(expr: &Expr<'_>, args: &[Expr<'_>], scope: &Rc<Scope>) -> Result<(), CompileError> {
    if args.len() < 3 {
        return Err(CompileError::arity(
            "proc",
            "at least 3",
            args.len(),
            expr.token.location.clone(),
        ));
    }
    let name = expect_ident(&args[0])?;
    let interned = scope.intern(name);

    let params = expr_to_params(&args[1], scope)?;
    let (proc_value, _) = compile_proc_body(params, &args[2..], scope, Some(interned))?;

    scope.emit(Instr::Push(proc_value));
    scope.emit(Instr::AddLocal(interned));
    scope.add_local(interned);
    Ok(())
}

fn sform_lambda(expr: &Expr<'_>, args: &[Expr<'_>], scope: &Rc<Scope>) -> Result<(), CompileError> {
    if args.len() < 2 {
        return Err(CompileError::arity(
            "lambda",
            "at least 2",
            args.len(),
            expr.token.location.clone(),
        ));
    }
    let params = expr_to_params(&args[0], scope)?;
    let (proc_value, _) = compile_proc_body(params, &args[1..], scope, None)?;
    scope.emit(Instr::Push(proc_value));
    Ok(())
}

/// Compile a procedure body into the shared procedure buffer and
/// return the pinned procedure value plus its entry label. A named
/// procedure is registered in the defining scope before its body
/// compiles so it can call itself.
fn compile_proc_body(
    params: Params,
    body: &[Expr<'_>],
    scope: &Rc<Scope>,
    name: Option<Value>,
) -> Result<(Value, usize), CompileError> {
    let inner = scope.proc_child();
    for param in &params.names {
        inner.add_local(*param);
    }

    // When the defining scope already emits into the procedure
    // buffer, the new body would land inline; jump over it.
    let guard = if Rc::ptr_eq(&scope.current_code, &scope.proc_code) {
        let skip = Label::new();
        scope.emit(Instr::Branch(skip.clone()));
        Some(skip)
    } else {
        None
    };

    let label = scope.proc_code.borrow().len();
    let proc_value = scope.gc.borrow_mut().alloc_pinned(HeapObj::Proc(Proc::Bytecode {
        params,
        code: scope.proc_code.clone(),
        label,
    }));
    if let Some(interned) = name {
        scope.add_proc(interned, proc_value);
    }

    for (i, form) in body.iter().enumerate() {
        compile(form, &inner)?;
        if i + 1 < body.len() && !is_statement(form) {
            inner.emit(Instr::Pop(1));
        }
    }
    if body.is_empty() {
        inner.emit(Instr::Push(Value::NIL));
    }
    inner.emit(Instr::Ret);

    if let Some(skip) = guard {
        skip.link(scope.proc_code.borrow().len());
    }

    Ok((proc_value, label))
}

fn sform_macro(expr: &Expr<'_>, args: &[Expr<'_>], scope: &Rc<Scope>) -> Result<(), CompileError> {
    if args.len() < 2 {
        return Err(CompileError::arity(
            "macro",
            "at least 2",
            args.len(),
            expr.token.location.clone(),
        ));
    }
    let name = expect_ident(&args[0])?;
    let interned = scope.intern(name);
    let params = expr_to_params(&args[1], scope)?;

    let inner = scope.proc_child();
    for param in &params.names {
        inner.add_local(*param);
    }

    let guard = if Rc::ptr_eq(&scope.current_code, &scope.proc_code) {
        let skip = Label::new();
        scope.emit(Instr::Branch(skip.clone()));
        Some(skip)
    } else {
        None
    };

    // Registered before the body compiles so the macro can recurse.
    let label = scope.proc_code.borrow().len();
    scope.add_macro(interned, Rc::new(Macro { params, label }));

    let body = &args[2..];
    for (i, form) in body.iter().enumerate() {
        compile(form, &inner)?;
        if i + 1 < body.len() && !is_statement(form) {
            inner.emit(Instr::Pop(1));
        }
    }
    if body.is_empty() {
        inner.emit(Instr::Push(Value::NIL));
    }
    inner.emit(Instr::Ret);

    if let Some(skip) = guard {
        skip.link(scope.proc_code.borrow().len());
    }

    Ok(())
}

fn sform_if(expr: &Expr<'_>, args: &[Expr<'_>], scope: &Rc<Scope>) -> Result<(), CompileError> {
    if args.len() != 3 {
        return Err(CompileError::arity(
            "if",
            "3",
            args.len(),
            expr.token.location.clone(),
        ));
    }

    compile(&args[0], scope)?;
    let alt = Label::new();
    scope.emit(Instr::Jz(alt.clone()));

    compile(&args[1], scope)?;
    let end = Label::new();
    scope.emit(Instr::Branch(end.clone()));

    alt.link(scope.code_len());
    compile(&args[2], scope)?;
    end.link(scope.code_len());
    Ok(())
}

fn sform_arith(args: &[Expr<'_>], scope: &Rc<Scope>, op: Instr) -> Result<(), CompileError> {
    for arg in args {
        compile(arg, scope)?;
    }
    scope.emit(op);
    Ok(())
}

fn sform_cmp(
    name: &str,
    expr: &Expr<'_>,
    args: &[Expr<'_>],
    scope: &Rc<Scope>,
    test: Instr,
) -> Result<(), CompileError> {
    if args.len() != 2 {
        return Err(CompileError::arity(
            name,
            "2",
            args.len(),
            expr.token.location.clone(),
        ));
    }
    compile(&args[0], scope)?;
    compile(&args[1], scope)?;
    scope.emit(Instr::Cmp);
    scope.emit(test);
    Ok(())
}

// ============================================================================
// Macro expansion
// ============================================================================

/// Reify the unevaluated argument expressions as data, run the macro
/// body on the macro VM, and interpret the result back into an
/// expression rooted at the call site's token.
fn expand_macro<'src>(
    name: &str,
    macro_def: &Rc<Macro>,
    expr: &Expr<'src>,
    args: &[Expr<'src>],
    scope: &Rc<Scope>,
) -> Result<Expr<'src>, CompileError> {
    if args.len() != macro_def.params.len() {
        return Err(CompileError::arity(
            name,
            macro_def.params.len().to_string(),
            args.len(),
            expr.token.location.clone(),
        ));
    }

    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(quote_value(arg, scope, false)?);
    }

    let result = scope
        .macro_vm
        .borrow_mut()
        .call_macro(macro_def, &values, &scope.proc_code, scope)
        .map_err(|err| CompileError::MacroExpansion {
            message: err.to_string(),
            location: expr.token.location.clone(),
        })?;

    value_to_expr(&scope.gc.borrow(), result, &expr.token)
}

/// Turn a macro's result value back into syntax. Numbers and strings
/// become literals, lists/vectors/maps recurse, the singletons come
/// back through their identifiers. Procedures cannot be spliced into
/// a program.
fn value_to_expr<'src>(
    gc: &Gc,
    value: Value,
    token: &Token<'src>,
) -> Result<Expr<'src>, CompileError> {
    let kind = if value.is_double() {
        ExprKind::Float(value.as_f64())
    } else if value.is_int() {
        ExprKind::Int(i64::from(value.as_int()))
    } else if value.is_true() {
        ExprKind::Ident("true".to_string())
    } else if value.is_false() {
        ExprKind::Ident("false".to_string())
    } else if value.is_nil() {
        ExprKind::Ident("nil".to_string())
    } else {
        match gc.get(value) {
            Some(HeapObj::Str(s)) => ExprKind::Str(s.clone()),
            Some(HeapObj::List(items)) => {
                let exprs = items
                    .iter()
                    .map(|v| value_to_expr(gc, *v, token))
                    .collect::<Result<Vec<_>, _>>()?;
                ExprKind::List(exprs)
            }
            Some(HeapObj::Vector(items)) => {
                let exprs = items
                    .iter()
                    .map(|v| value_to_expr(gc, *v, token))
                    .collect::<Result<Vec<_>, _>>()?;
                ExprKind::Vector(exprs)
            }
            Some(HeapObj::Map(map)) => {
                let mut keys = Vec::with_capacity(map.len());
                let mut vals = Vec::with_capacity(map.len());
                for (k, v) in map.iter() {
                    keys.push(value_to_expr(gc, k, token)?);
                    vals.push(value_to_expr(gc, v, token)?);
                }
                ExprKind::Map { keys, values: vals }
            }
            _ => {
                return Err(CompileError::type_mismatch(
                    "an expression",
                    value.type_name(),
                    token.location.clone(),
                ))
            }
        }
    };

    Ok(Expr::new(token.clone(), kind))
}

// ============================================================================
// Quoted data literals
// ============================================================================

/// Build the runtime value for a quoted expression. Compile-time
/// literals are pinned (they are embedded in bytecode forever);
/// reified macro arguments are ordinary allocations.
fn quote_value(expr: &Expr<'_>, scope: &Rc<Scope>, pin: bool) -> Result<Value, CompileError> {
    let value = match &expr.kind {
        ExprKind::Int(i) => int_value(*i),
        ExprKind::Float(x) => Value::from_f64(*x),
        ExprKind::Str(s) => alloc(scope, HeapObj::Str(s.clone()), pin),
        // Symbols under quote become interned strings.
        ExprKind::Ident(s) => scope.intern(s),
        ExprKind::List(items) => {
            let values = items
                .iter()
                .map(|item| quote_value(item, scope, pin))
                .collect::<Result<Vec<_>, _>>()?;
            alloc(scope, HeapObj::List(values), pin)
        }
        ExprKind::Vector(items) => {
            let values = items
                .iter()
                .map(|item| quote_value(item, scope, pin))
                .collect::<Result<Vec<_>, _>>()?;
            alloc(scope, HeapObj::Vector(values), pin)
        }
        ExprKind::Map { keys, values } => {
            let map = alloc(scope, HeapObj::Map(RuntimeMap::with_capacity(keys.len())), pin);
            for (key, value) in keys.iter().zip(values.iter()) {
                let k = quote_value(key, scope, pin)?;
                let v = quote_value(value, scope, pin)?;
                heap::map_insert(&mut scope.gc.borrow_mut(), map, k, v);
            }
            map
        }
    };
    Ok(value)
}

fn alloc(scope: &Rc<Scope>, obj: HeapObj, pin: bool) -> Value {
    let mut gc = scope.gc.borrow_mut();
    if pin {
        gc.alloc_pinned(obj)
    } else {
        gc.alloc(obj)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Forms that bind rather than evaluate leave nothing on the operand
/// stack, so body sequencing must not pop after them.
fn is_statement(expr: &Expr<'_>) -> bool {
    if expr.quoted {
        return false;
    }
    match &expr.kind {
        ExprKind::List(items) => matches!(
            items.first().and_then(|head| head.head_name()),
            Some("var") | Some("proc") | Some("macro")
        ),
        _ => false,
    }
}

fn int_value(i: i64) -> Value {
    match i32::try_from(i) {
        Ok(v) => Value::from_int(v),
        Err(_) => Value::from_f64(i as f64),
    }
}

fn expect_ident<'a>(expr: &'a Expr<'_>) -> Result<&'a str, CompileError> {
    match &expr.kind {
        ExprKind::Ident(name) => Ok(name),
        _ => Err(CompileError::type_mismatch(
            "an identifier",
            expr.type_name(),
            expr.token.location.clone(),
        )),
    }
}

fn expr_to_params(expr: &Expr<'_>, scope: &Rc<Scope>) -> Result<Params, CompileError> {
    let ExprKind::List(items) = &expr.kind else {
        return Err(CompileError::type_mismatch(
            "a parameter list",
            expr.type_name(),
            expr.token.location.clone(),
        ));
    };
    let mut names = Vec::with_capacity(items.len());
    for item in items {
        let name = expect_ident(item)?;
        names.push(scope.intern(name));
    }
    Ok(Params::new(names))
}

fn emit_native_call(scope: &Rc<Scope>, native: &str, nargs: usize) {
    let name = scope.intern(native);
    scope.emit(Instr::Call {
        name,
        nargs: nargs as u16,
    });
}
