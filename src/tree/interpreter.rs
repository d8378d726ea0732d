use std::collections::HashMap;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::RuntimeError;
use crate::tree::ast::*;
use crate::tree::environment::Environment;
use crate::tree::resolver::Depths;
use crate::tree::value::{Class, Function, Instance, NativeFunction, Value};

/// Unwinding signal threaded back up the recursive evaluator. There is no
/// native exception mechanism being borrowed here (§9 allows either); a
/// plain result enum keeps control flow visible in the type signature and
/// keeps every frame's cleanup (e.g. popping a block's scope) running on
/// the way out, since it's ordinary `?`/`match` unwinding rather than a
/// panic.
enum Signal {
    Normal,
    Return(Value),
}

/// Tree-walking evaluator (§4.4). Holds the global frame and the static
/// binding distances produced by the resolver; the "current" environment
/// is threaded through as an explicit parameter on every method instead
/// of being mutable interpreter state, so nested calls can never leave it
/// pointing at the wrong frame after an early return or error.
pub struct Interpreter {
    pub globals: Environment,
    depths: Depths,
}

impl Interpreter {
    pub fn new(depths: Depths) -> Interpreter {
        let globals = Environment::global();
        install_builtins(&globals);
        Interpreter { globals, depths }
    }

    /// Swaps in a fresh resolver output. Used by the REPL, which resolves
    /// each line independently but keeps the same interpreter (and thus
    /// the same global bindings) alive across lines.
    pub fn set_depths(&mut self, depths: Depths) {
        self.depths = depths;
    }

    pub fn run(&mut self, statements: &[Stmt]) -> Result<(), RuntimeError> {
        let env = self.globals.clone();
        for stmt in statements {
            match self.execute(stmt, &env)? {
                Signal::Normal => {},
                Signal::Return(_) => {}, // top-level return rejected by the resolver
            }
        }
        Ok(())
    }

    fn execute_block(&mut self, statements: &[Stmt], env: &Environment) -> Result<Signal, RuntimeError> {
        for stmt in statements {
            match self.execute(stmt, env)? {
                Signal::Normal => {},
                signal @ Signal::Return(_) => return Ok(signal),
            }
        }
        Ok(Signal::Normal)
    }

    fn execute(&mut self, stmt: &Stmt, env: &Environment) -> Result<Signal, RuntimeError> {
        match &stmt.kind {
            StmtKind::Expression(e) => { self.evaluate(e, env)?; Ok(Signal::Normal) },
            StmtKind::Print(e) => {
                let v = self.evaluate(e, env)?;
                println!("{}", v);
                Ok(Signal::Normal)
            },
            StmtKind::Var(name, init) => {
                let value = match init {
                    Some(e) => self.evaluate(e, env)?,
                    None => Value::Nil,
                };
                env.define(name, value);
                Ok(Signal::Normal)
            },
            StmtKind::Block(body) => {
                let inner = Environment::child(env);
                self.execute_block(body, &inner)
            },
            StmtKind::If(cond, then_branch, else_branch) => {
                if self.evaluate(cond, env)?.truthy() {
                    self.execute(then_branch, env)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch, env)
                } else {
                    Ok(Signal::Normal)
                }
            },
            StmtKind::While(cond, body) => {
                while self.evaluate(cond, env)?.truthy() {
                    match self.execute(body, env)? {
                        Signal::Normal => {},
                        signal @ Signal::Return(_) => return Ok(signal),
                    }
                }
                Ok(Signal::Normal)
            },
            StmtKind::Return(value) => {
                let v = match value {
                    Some(e) => self.evaluate(e, env)?,
                    None => Value::Nil,
                };
                Ok(Signal::Return(v))
            },
            StmtKind::Function(decl) => {
                let function = Rc::new(Function { decl: Rc::clone(decl), closure: env.clone(), is_initializer: false });
                env.define(&decl.name, Value::Function(function));
                Ok(Signal::Normal)
            },
            StmtKind::Class(decl) => {
                let superclass = match &decl.superclass {
                    Some(expr) => match self.evaluate(expr, env)? {
                        Value::Class(c) => Some(c),
                        _ => return Err(RuntimeError::new("Superclass must be a class.", stmt.span.line())),
                    },
                    None => None,
                };

                // a scope holding `super`, only pushed when there is one
                let method_env = match &superclass {
                    Some(sup) => {
                        let e = Environment::child(env);
                        e.define("super", Value::Class(Rc::clone(sup)));
                        e
                    },
                    None => env.clone(),
                };

                let mut methods = HashMap::new();
                for method in &decl.methods {
                    let function = Rc::new(Function {
                        decl: Rc::clone(method),
                        closure: method_env.clone(),
                        is_initializer: method.is_initializer,
                    });
                    methods.insert(method.name.clone(), function);
                }

                let class = Rc::new(Class { name: decl.name.clone(), superclass, methods });
                env.define(&decl.name, Value::Class(class));
                Ok(Signal::Normal)
            },
        }
    }

    fn evaluate(&mut self, expr: &Expr, env: &Environment) -> Result<Value, RuntimeError> {
        let line = expr.span.line();

        match &expr.kind {
            ExprKind::Literal(lit) => Ok(match lit {
                Literal::Nil => Value::Nil,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Number(n) => Value::Number(*n),
                Literal::Str(s) => Value::string(s.as_str()),
            }),
            ExprKind::Grouping(inner) => self.evaluate(inner, env),
            ExprKind::Unary(op, right) => {
                let v = self.evaluate(right, env)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!v.truthy())),
                    UnaryOp::Neg => match v {
                        Value::Number(n) => Ok(Value::Number(-n)),
                        _ => Err(RuntimeError::new("Operand must be a number.", line)),
                    },
                }
            },
            ExprKind::Binary(left, op, right) => {
                let l = self.evaluate(left, env)?;
                let r = self.evaluate(right, env)?;
                self.binary(*op, l, r, line)
            },
            ExprKind::Logical(left, op, right) => {
                let l = self.evaluate(left, env)?;
                match op {
                    LogicalOp::Or if l.truthy() => Ok(l),
                    LogicalOp::Or => self.evaluate(right, env),
                    LogicalOp::And if !l.truthy() => Ok(l),
                    LogicalOp::And => self.evaluate(right, env),
                }
            },
            ExprKind::Variable(name) => self.lookup(expr.id, name, env, line),
            ExprKind::Assign(name, value) => {
                let v = self.evaluate(value, env)?;
                match self.depths.get(&expr.id) {
                    Some(&distance) => env.assign_at(distance, name, v.clone()),
                    None => {
                        if !self.globals.assign_global(name, v.clone()) {
                            return Err(RuntimeError::new(format!("Undefined variable '{}'.", name), line));
                        }
                    },
                }
                Ok(v)
            },
            ExprKind::Call(callee, arg_exprs) => {
                let callee_val = self.evaluate(callee, env)?;

                let mut args = Vec::with_capacity(arg_exprs.len());
                for a in arg_exprs { args.push(self.evaluate(a, env)?); }

                self.call(callee_val, args, line)
            },
            ExprKind::Get(object, name) => {
                let obj = self.evaluate(object, env)?;
                match obj {
                    Value::Instance(instance) => self.get_property(&instance, name, line),
                    _ => Err(RuntimeError::new("Only instances have properties.", line)),
                }
            },
            ExprKind::Set(object, name, value) => {
                let obj = self.evaluate(object, env)?;
                let instance = match obj {
                    Value::Instance(instance) => instance,
                    _ => return Err(RuntimeError::new("Only instances have fields.", line)),
                };
                let v = self.evaluate(value, env)?;
                instance.fields.borrow_mut().insert(name.clone(), v.clone());
                Ok(v)
            },
            ExprKind::This => self.lookup(expr.id, "this", env, line),
            ExprKind::Super(method) => {
                let distance = *self.depths.get(&expr.id).expect("resolver always records a distance for 'super'");
                let superclass = match env.get_at(distance, "super") {
                    Value::Class(c) => c,
                    _ => unreachable!("resolver only binds 'super' to a class value"),
                };
                let this = env.get_at(distance - 1, "this");

                match superclass.find_method(method) {
                    Some(m) => Ok(Value::Function(bind(&m, this))),
                    None => Err(RuntimeError::new(format!("Undefined property '{}'.", method), line)),
                }
            },
        }
    }

    fn lookup(&self, id: NodeId, name: &str, env: &Environment, line: usize) -> Result<Value, RuntimeError> {
        match self.depths.get(&id) {
            Some(&distance) => Ok(env.get_at(distance, name)),
            None => self.globals.get_global(name).ok_or_else(|| RuntimeError::new(format!("Undefined variable '{}'.", name), line)),
        }
    }

    fn get_property(&self, instance: &Rc<Instance>, name: &str, line: usize) -> Result<Value, RuntimeError> {
        if let Some(v) = instance.fields.borrow().get(name) {
            return Ok(v.clone());
        }
        if let Some(method) = instance.class.find_method(name) {
            return Ok(Value::Function(bind(&method, Value::Instance(Rc::clone(instance)))));
        }
        Err(RuntimeError::new(format!("Undefined property '{}'.", name), line))
    }

    fn binary(&self, op: BinaryOp, l: Value, r: Value, line: usize) -> Result<Value, RuntimeError> {
        use BinaryOp::*;

        if op == Eq { return Ok(Value::Bool(l == r)); }
        if op == NotEq { return Ok(Value::Bool(l != r)); }

        if op == Add {
            return match (&l, &r) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                (Value::Str(a), Value::Str(b)) => Ok(Value::string(format!("{}{}", a, b))),
                _ => Err(RuntimeError::new("Operands must be two numbers or two strings.", line)),
            };
        }

        let (Value::Number(a), Value::Number(b)) = (&l, &r) else {
            return Err(RuntimeError::new("Operands must be numbers.", line));
        };

        Ok(match op {
            Sub => Value::Number(a - b),
            Mul => Value::Number(a * b),
            Div => Value::Number(a / b),
            Less => Value::Bool(a < b),
            LessEq => Value::Bool(a <= b),
            Greater => Value::Bool(a > b),
            GreaterEq => Value::Bool(a >= b),
            Add | Eq | NotEq => unreachable!("handled above"),
        })
    }

    fn call(&mut self, callee: Value, args: Vec<Value>, line: usize) -> Result<Value, RuntimeError> {
        match callee {
            Value::Function(f) => self.call_function(&f, args, line),
            Value::NativeFunction(nf) => {
                check_arity(nf.arity, args.len(), line)?;
                (nf.func)(&args)
            },
            Value::Class(class) => {
                let instance = Rc::new(Instance { class: Rc::clone(&class), fields: std::cell::RefCell::new(HashMap::new()) });

                if let Some(init) = class.find_method("init") {
                    let bound = bind(&init, Value::Instance(Rc::clone(&instance)));
                    self.call_function(&bound, args, line)?;
                } else {
                    check_arity(0, args.len(), line)?;
                }

                Ok(Value::Instance(instance))
            },
            _ => Err(RuntimeError::new("Can only call functions and classes.", line)),
        }
    }

    fn call_function(&mut self, f: &Rc<Function>, args: Vec<Value>, line: usize) -> Result<Value, RuntimeError> {
        check_arity(f.decl.params.len(), args.len(), line)?;

        let call_env = Environment::child(&f.closure);
        for ((param, _), arg) in f.decl.params.iter().zip(args) {
            call_env.define(param, arg);
        }

        let signal = self.execute_block(&f.decl.body, &call_env)?;

        if f.is_initializer {
            // the receiver, regardless of what (if anything) was returned;
            // the resolver already rejects `return <value>;` inside init.
            return Ok(f.closure.get_at(0, "this"));
        }

        Ok(match signal {
            Signal::Return(v) => v,
            Signal::Normal => Value::Nil,
        })
    }
}

fn check_arity(expected: usize, got: usize, line: usize) -> Result<(), RuntimeError> {
    if expected != got {
        Err(RuntimeError::new(format!("Expected {} arguments but got {}.", expected, got), line))
    } else {
        Ok(())
    }
}

/// Wraps a method in a fresh environment holding `this`, per §3/§4.4:
/// every access produces a *new* bound callable (not cached), so two
/// lookups of the same method are not reference-equal.
fn bind(method: &Rc<Function>, this: Value) -> Rc<Function> {
    let env = Environment::child(&method.closure);
    env.define("this", this);
    Rc::new(Function { decl: Rc::clone(&method.decl), closure: env, is_initializer: method.is_initializer })
}

fn install_builtins(globals: &Environment) {
    globals.define("clock", Value::NativeFunction(Rc::new(NativeFunction {
        name: "clock",
        arity: 0,
        func: |_| {
            let seconds = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64();
            Ok(Value::Number(seconds))
        },
    })));

    // `print` is a reserved keyword bound to the `print` statement
    // (§4.2's grammar), not a callable, so it is deliberately not
    // registered as a builtin here — see SPEC_FULL.md §4.
    globals.define("type", Value::NativeFunction(Rc::new(NativeFunction {
        name: "type",
        arity: 1,
        func: |args| Ok(Value::string(args[0].type_name())),
    })));
}
