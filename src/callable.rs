use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::ast::FunctionDecl;
use crate::environment::{EnvRef, Environment};
use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::interpreter::{Flow, Interpreter};
use crate::scanner::Token;
use crate::value::Value;

pub const THIS: &str = "this";
pub const SUPER: &str = "super";
pub const INIT: &str = "init";

/// Anything a call expression can invoke.
pub trait Callable {
    fn arity(&self) -> usize;
    fn call(&self, interpreter: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError>;
}

/// Role of a user-defined function; decides binding and return behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Function,
    Method,
    Initializer,
    Getter,
    StaticMethod,
    Lambda,
}

pub struct LoxFunction {
    declaration: Rc<FunctionDecl>,
    closure: EnvRef,
    pub kind: FunctionKind,
}

impl LoxFunction {
    pub fn new(declaration: Rc<FunctionDecl>, closure: EnvRef, kind: FunctionKind) -> Self {
        Self {
            declaration,
            closure,
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.declaration.name.lexeme
    }

    /// Wraps the closure in a frame holding `this`. Static methods stay
    /// unbound; their bodies were resolved without that frame.
    pub fn bind(self: &Rc<Self>, instance: Rc<RefCell<LoxInstance>>) -> Rc<LoxFunction> {
        if self.kind == FunctionKind::StaticMethod {
            return Rc::clone(self);
        }
        let environment = Environment::with_enclosing(&self.closure);
        environment
            .borrow_mut()
            .define(THIS, Value::Instance(instance));
        Rc::new(LoxFunction::new(
            Rc::clone(&self.declaration),
            environment,
            self.kind,
        ))
    }

    fn bound_instance(&self) -> Value {
        Environment::get_slot_at(&self.closure, 0, THIS)
    }
}

impl Callable for LoxFunction {
    fn arity(&self) -> usize {
        self.declaration.params.len()
    }

    fn call(&self, interpreter: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let environment = Environment::with_enclosing(&self.closure);
        for (param, arg) in self.declaration.params.iter().zip(args) {
            environment.borrow_mut().define(&param.lexeme, arg);
        }

        let value = match interpreter.execute_block(&self.declaration.body, environment)? {
            Flow::Return(value) => value,
            Flow::Normal => Value::Nil,
            Flow::Loop(control) => {
                interpreter.leak_loop_control(control, self.name());
                Value::Nil
            }
        };

        if self.kind == FunctionKind::Initializer {
            return Ok(self.bound_instance());
        }
        Ok(value)
    }
}

impl fmt::Display for LoxFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            FunctionKind::Lambda => write!(f, "<fn lambda>"),
            _ => write!(f, "<fn {}>", self.name()),
        }
    }
}

// Closures can reach back to themselves through their environment, so only
// the name is printed.
impl fmt::Debug for LoxFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("LoxFunction")
            .field("name", &self.name())
            .field("kind", &self.kind)
            .finish()
    }
}

pub struct LoxClass {
    pub name: String,
    superclass: Option<Rc<LoxClass>>,
    methods: HashMap<String, Rc<LoxFunction>>,
}

impl LoxClass {
    pub fn new(
        name: String,
        superclass: Option<Rc<LoxClass>>,
        methods: HashMap<String, Rc<LoxFunction>>,
    ) -> Self {
        Self {
            name,
            superclass,
            methods,
        }
    }

    pub fn find_method(&self, name: &str) -> Option<Rc<LoxFunction>> {
        match self.methods.get(name) {
            Some(method) => Some(Rc::clone(method)),
            None => self
                .superclass
                .as_ref()
                .and_then(|superclass| superclass.find_method(name)),
        }
    }

    /// Class-level property access: only static methods are visible, unbound.
    pub fn get(&self, name: &Token) -> Result<Value, RuntimeError> {
        match self.find_method(&name.lexeme) {
            Some(method) if method.kind == FunctionKind::StaticMethod => {
                Ok(Value::Function(method))
            }
            _ => Err(RuntimeError::new(
                name,
                RuntimeErrorKind::UndefinedProperty(name.lexeme.clone()),
            )),
        }
    }
}

// Implemented on the `Rc` so the new instance can keep a handle to its class.
impl Callable for Rc<LoxClass> {
    fn arity(&self) -> usize {
        self.find_method(INIT)
            .map(|initializer| initializer.arity())
            .unwrap_or(0)
    }

    fn call(&self, interpreter: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let instance = Rc::new(RefCell::new(LoxInstance::new(Rc::clone(self))));
        if let Some(initializer) = self.find_method(INIT) {
            initializer
                .bind(Rc::clone(&instance))
                .call(interpreter, args)?;
        }
        Ok(Value::Instance(instance))
    }
}

impl fmt::Debug for LoxClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut methods: Vec<_> = self.methods.keys().collect();
        methods.sort();
        f.debug_struct("LoxClass")
            .field("name", &self.name)
            .field("superclass", &self.superclass.as_ref().map(|s| s.name.clone()))
            .field("methods", &methods)
            .finish()
    }
}

pub struct LoxInstance {
    pub class: Rc<LoxClass>,
    fields: HashMap<String, Value>,
}

impl LoxInstance {
    pub fn new(class: Rc<LoxClass>) -> Self {
        Self {
            class,
            fields: HashMap::new(),
        }
    }

    /// Fields shadow methods; a method found on the class is bound to `this_ref`.
    pub fn get(this_ref: &Rc<RefCell<LoxInstance>>, name: &Token) -> Result<Value, RuntimeError> {
        let instance = this_ref.borrow();
        if let Some(value) = instance.fields.get(&name.lexeme) {
            return Ok(value.clone());
        }

        match instance.class.find_method(&name.lexeme) {
            Some(method) => Ok(Value::Function(method.bind(Rc::clone(this_ref)))),
            None => Err(RuntimeError::new(
                name,
                RuntimeErrorKind::UndefinedProperty(name.lexeme.clone()),
            )),
        }
    }

    pub fn set(&mut self, name: &Token, value: Value) {
        self.fields.insert(name.lexeme.clone(), value);
    }
}

impl fmt::Debug for LoxInstance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut fields: Vec<_> = self.fields.keys().collect();
        fields.sort();
        f.debug_struct("LoxInstance")
            .field("class", &self.class.name)
            .field("fields", &fields)
            .finish()
    }
}

/// A built-in implemented in Rust.
pub struct NativeFunction {
    pub name: &'static str,
    pub arity: usize,
    function: fn(&[Value]) -> Value,
}

impl NativeFunction {
    pub fn new(name: &'static str, arity: usize, function: fn(&[Value]) -> Value) -> Self {
        Self {
            name,
            arity,
            function,
        }
    }

    /// Seconds since the Unix epoch.
    pub fn clock() -> Self {
        Self::new("clock", 0, |_| {
            let seconds = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs_f64())
                .unwrap_or(0.0);
            Value::Number(seconds)
        })
    }
}

impl Callable for NativeFunction {
    fn arity(&self) -> usize {
        self.arity
    }

    fn call(&self, _interpreter: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
        Ok((self.function)(&args))
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}
