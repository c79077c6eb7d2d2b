// ABOUTME: Compile-and-run session tying the root scope to the main VM

use crate::bytecode::dump_code;
use crate::compiler::compile;
use crate::error::Error;
use crate::heap::value_to_string;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::scope::Scope;
use crate::value::Value;
use crate::vm::Vm;
use std::io::Write;
use std::rc::Rc;

/// A persistent evaluation session: one root scope, one main VM.
/// Top-level bindings and definitions survive across `eval` calls,
/// which is what makes the REPL stateful.
pub struct Engine {
    scope: Rc<Scope>,
    vm: Vm,
    dump_bytecode: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        let scope = Scope::root();
        let vm = Vm::new(scope.gc.clone());
        Engine {
            scope,
            vm,
            dump_bytecode: false,
        }
    }

    /// An engine whose program output (`print`) goes to the given
    /// writer instead of stdout.
    pub fn with_output(out: Box<dyn Write>) -> Self {
        let scope = Scope::root();
        let vm = Vm::with_output(scope.gc.clone(), out);
        Engine {
            scope,
            vm,
            dump_bytecode: false,
        }
    }

    pub fn set_dump_bytecode(&mut self, on: bool) {
        self.dump_bytecode = on;
    }

    /// Compile and run every top-level form in `source`, one at a
    /// time. Returns the value of the last value-producing form, or
    /// `None` when the last form was a statement (`var`, `proc`,
    /// `macro`). Stops at the first failing form.
    pub fn eval(&mut self, source: &str, filename: &str) -> Result<Option<Value>, Error> {
        let mut parser = Parser::new(Lexer::new(source, filename));
        let mut last = None;

        while let Some(expr) = parser.next_expr()? {
            let start = self.scope.top_level_code.borrow().len();
            compile(&expr, &self.scope)?;

            if self.dump_bytecode {
                let gc = self.scope.gc.borrow();
                let code = self.scope.top_level_code.borrow();
                eprint!("{}", dump_code(&gc, &code[start..]));
            }

            let depth_before = self.vm.stack_depth();
            let code = self.scope.top_level_code.clone();
            self.vm.run(&code, start, &self.scope)?;

            last = if self.vm.stack_depth() > depth_before {
                self.vm.peek_top()
            } else {
                None
            };

            self.collect_if_needed();
        }

        Ok(last)
    }

    /// Render a value the way the REPL echoes results.
    pub fn render(&self, value: Value) -> String {
        value_to_string(&self.scope.gc.borrow(), value)
    }

    /// Drop the just-echoed result. The REPL calls this after showing
    /// a value so an interactive session does not accumulate one
    /// operand per line; within a single program the values stay.
    pub fn pop_result(&mut self) {
        let _ = self.vm.pop_value();
    }

    /// End-of-top-level-form collection point. Roots are both VMs'
    /// frames and the interned strings; compile-time data is pinned.
    fn collect_if_needed(&mut self) {
        if !self.scope.gc.borrow().should_collect() {
            return;
        }
        let mut roots = self.vm.roots();
        roots.extend(self.scope.macro_vm.borrow().roots());
        roots.extend(self.scope.store.borrow().values());
        self.scope.gc.borrow_mut().collect(roots);
    }

    #[cfg(test)]
    pub(crate) fn scope(&self) -> &Rc<Scope> {
        &self.scope
    }
}
