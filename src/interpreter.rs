use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;

use crate::ast::{ClassDecl, Expr, ExprId, FunctionDecl, LoopControl, Program, Stmt};
use crate::callable::{
    Callable, FunctionKind, LoxClass, LoxFunction, LoxInstance, NativeFunction, INIT, SUPER, THIS,
};
use crate::environment::{EnvRef, Environment};
use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::resolver::Locals;
use crate::scanner::{Token, TokenType};
use crate::value::Value;

/// Divisors closer to zero than this are rejected.
pub const DIVISION_EPSILON: f64 = 1e-10;

/// How a statement finished. Loop control and `return` travel up through the
/// statement executors as values instead of unwinding.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Loop(LoopControl),
    Return(Value),
}

pub struct Interpreter {
    globals: EnvRef,
    environment: EnvRef,
    locals: HashMap<ExprId, usize>,
    output: Box<dyn Write>,
    /// A `break`/`continue` that escaped a function body. It surfaces at the
    /// caller's next statement boundary and is consumed by the caller's loop.
    stray_control: Option<LoopControl>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    pub fn with_output(output: Box<dyn Write>) -> Self {
        let globals = Environment::new();
        globals
            .borrow_mut()
            .define("clock", Value::Native(Rc::new(NativeFunction::clock())));

        Self {
            environment: Rc::clone(&globals),
            globals,
            locals: HashMap::new(),
            output,
            stray_control: None,
        }
    }

    /// Adds resolved distances; ids are process-unique so tables from
    /// separately parsed programs never clash.
    pub fn resolve(&mut self, locals: Locals) {
        self.locals.extend(locals);
    }

    /// Runs a program. A runtime error aborts only the top-level statement it
    /// occurred in; the remaining statements still run.
    #[tracing::instrument(level = "debug", skip_all, fields(statements = program.statements.len()))]
    pub fn interpret(&mut self, program: &Program) -> Vec<RuntimeError> {
        let mut errors = Vec::new();

        for statement in &program.statements {
            match self.execute(statement) {
                Ok(Flow::Normal) => {}
                Ok(Flow::Loop(control)) => {
                    // Nothing at top level consumes the signal, so it drains the rest.
                    tracing::warn!(?control, "loop control reached top level; skipping remaining statements");
                    break;
                }
                Ok(Flow::Return(_)) => {}
                Err(error) => {
                    tracing::debug!(line = error.line(), %error, "runtime error");
                    self.stray_control = None;
                    errors.push(error);
                }
            }
        }

        self.stray_control = None;
        errors
    }

    pub(crate) fn leak_loop_control(&mut self, control: LoopControl, function: &str) {
        tracing::warn!(?control, function, "loop control escaped a function body");
        self.stray_control = Some(control);
    }

    fn execute(&mut self, stmt: &Stmt) -> Result<Flow, RuntimeError> {
        // A pending stray signal turns this statement into a no-op.
        if let Some(control) = self.stray_control.take() {
            return Ok(Flow::Loop(control));
        }

        let flow = self.execute_statement(stmt)?;
        if flow == Flow::Normal {
            if let Some(control) = self.stray_control.take() {
                return Ok(Flow::Loop(control));
            }
        }
        Ok(flow)
    }

    fn execute_statement(&mut self, stmt: &Stmt) -> Result<Flow, RuntimeError> {
        match stmt {
            Stmt::Expression { expr } => {
                self.evaluate(expr)?;
                Ok(Flow::Normal)
            }
            Stmt::Print { expr } | Stmt::Repl { expr } => {
                let value = self.evaluate(expr)?;
                self.emit(&value, expr)?;
                Ok(Flow::Normal)
            }
            Stmt::Var { name, initializer } => {
                match initializer {
                    Some(initializer) => {
                        let value = self.evaluate(initializer)?;
                        self.environment.borrow_mut().define(&name.lexeme, value);
                    }
                    None => self
                        .environment
                        .borrow_mut()
                        .declare_uninitialized(&name.lexeme),
                }
                Ok(Flow::Normal)
            }
            Stmt::Function(declaration) => {
                let function = LoxFunction::new(
                    Rc::clone(declaration),
                    Rc::clone(&self.environment),
                    FunctionKind::Function,
                );
                self.environment
                    .borrow_mut()
                    .define(&declaration.name.lexeme, Value::Function(Rc::new(function)));
                Ok(Flow::Normal)
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Block { statements } => {
                let environment = Environment::with_enclosing(&self.environment);
                self.execute_block(statements, environment)
            }
            Stmt::Class(declaration) => self.define_class(declaration),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While {
                condition,
                body,
                increment,
            } => {
                while self.evaluate(condition)?.is_truthy() {
                    match self.execute(body)? {
                        Flow::Loop(LoopControl::Break) => break,
                        Flow::Loop(LoopControl::Continue) | Flow::Normal => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                    if let Some(increment) = increment {
                        self.evaluate(increment)?;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Logic { control, .. } => Ok(Flow::Loop(*control)),
        }
    }

    /// Runs `statements` in `environment`, restoring the previous environment
    /// afterwards whether or not they succeed.
    pub(crate) fn execute_block(
        &mut self,
        statements: &[Stmt],
        environment: EnvRef,
    ) -> Result<Flow, RuntimeError> {
        let previous = std::mem::replace(&mut self.environment, environment);

        let mut result = Ok(Flow::Normal);
        for statement in statements {
            match self.execute(statement) {
                Ok(Flow::Normal) => {}
                other => {
                    result = other;
                    break;
                }
            }
        }

        self.environment = previous;
        result
    }

    fn define_class(&mut self, declaration: &ClassDecl) -> Result<Flow, RuntimeError> {
        let superclass = match &declaration.superclass {
            Some(expr) => match self.evaluate(expr)? {
                Value::Class(class) => Some(class),
                _ => {
                    let token = match expr {
                        Expr::Variable { name, .. } => name,
                        _ => &declaration.name,
                    };
                    return Err(RuntimeError::new(token, RuntimeErrorKind::NotAClass));
                }
            },
            None => None,
        };

        // Bound early so methods can refer to the class by name.
        self.environment
            .borrow_mut()
            .define(&declaration.name.lexeme, Value::Nil);

        let enclosing = superclass.as_ref().map(|superclass| {
            let environment = Environment::with_enclosing(&self.environment);
            environment
                .borrow_mut()
                .define(SUPER, Value::Class(Rc::clone(superclass)));
            std::mem::replace(&mut self.environment, environment)
        });

        let mut methods = HashMap::new();
        for method in &declaration.methods {
            let kind = if method.name.lexeme == INIT {
                FunctionKind::Initializer
            } else {
                FunctionKind::Method
            };
            self.add_method(&mut methods, method, kind);
        }
        for method in &declaration.statics {
            self.add_method(&mut methods, method, FunctionKind::StaticMethod);
        }
        for method in &declaration.getters {
            self.add_method(&mut methods, method, FunctionKind::Getter);
        }

        let class = LoxClass::new(declaration.name.lexeme.clone(), superclass, methods);

        if let Some(enclosing) = enclosing {
            self.environment = enclosing;
        }

        tracing::trace!(class = %declaration.name.lexeme, "class defined");
        self.environment
            .borrow_mut()
            .assign(&declaration.name, Value::Class(Rc::new(class)))?;
        Ok(Flow::Normal)
    }

    fn add_method(
        &self,
        methods: &mut HashMap<String, Rc<LoxFunction>>,
        declaration: &Rc<FunctionDecl>,
        kind: FunctionKind,
    ) {
        let function = LoxFunction::new(Rc::clone(declaration), Rc::clone(&self.environment), kind);
        methods.insert(declaration.name.lexeme.clone(), Rc::new(function));
    }

    fn emit(&mut self, value: &Value, expr: &Expr) -> Result<(), RuntimeError> {
        writeln!(self.output, "{}", value)
            .and_then(|_| self.output.flush())
            .map_err(|error| {
                RuntimeError::new(
                    &anchor_token(expr),
                    RuntimeErrorKind::Output(error.to_string()),
                )
            })
    }

    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Literal { value } => Ok(value.clone()),
            Expr::Grouping { expr } => self.evaluate(expr),
            Expr::Variable { id, name } => self.look_up_variable(*id, name),
            Expr::This { id, keyword } => self.look_up_variable(*id, keyword),
            Expr::Assign { id, name, value } => {
                let value = self.evaluate(value)?;
                match self.locals.get(id) {
                    Some(&distance) => {
                        Environment::assign_at(&self.environment, distance, name, value.clone())
                    }
                    None => self.globals.borrow_mut().assign(name, value.clone())?,
                }
                Ok(value)
            }
            Expr::Binary {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                binary(operator, left, right)
            }
            Expr::Unary { operator, operand } => {
                let operand = self.evaluate(operand)?;
                match (operator.token_type, operand) {
                    (TokenType::Bang, operand) => Ok(Value::Bool(!operand.is_truthy())),
                    (TokenType::Minus, Value::Number(n)) => Ok(Value::Number(-n)),
                    (TokenType::Plus, Value::Number(n)) => Ok(Value::Number(n)),
                    _ => Err(RuntimeError::new(
                        operator,
                        RuntimeErrorKind::OperandMustBeNumber(operator.lexeme.clone()),
                    )),
                }
            }
            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;
                let short_circuit = match operator.token_type {
                    TokenType::Or => left.is_truthy(),
                    _ => !left.is_truthy(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.evaluate(right)
                }
            }
            Expr::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.evaluate(then_branch)
                } else {
                    self.evaluate(else_branch)
                }
            }
            Expr::Call {
                callee,
                paren,
                args,
            } => {
                let callee = self.evaluate(callee)?;
                let mut arguments = Vec::with_capacity(args.len());
                for arg in args {
                    arguments.push(self.evaluate(arg)?);
                }
                self.call(callee, paren, arguments)
            }
            Expr::Get { object, name } => match self.evaluate(object)? {
                Value::Instance(instance) => {
                    let value = LoxInstance::get(&instance, name)?;
                    self.invoke_if_getter(value, name)
                }
                Value::Class(class) => class.get(name),
                _ => Err(RuntimeError::new(name, RuntimeErrorKind::NotAnInstance)),
            },
            Expr::Set {
                object,
                name,
                value,
            } => {
                let Value::Instance(instance) = self.evaluate(object)? else {
                    return Err(RuntimeError::new(name, RuntimeErrorKind::NoFields));
                };
                let value = self.evaluate(value)?;
                instance.borrow_mut().set(name, value.clone());
                Ok(value)
            }
            Expr::Super {
                id,
                keyword,
                method,
            } => self.evaluate_super(*id, keyword, method),
            Expr::Lambda(declaration) => {
                if declaration.body.is_empty() {
                    return Err(RuntimeError::new(
                        &declaration.name,
                        RuntimeErrorKind::EmptyLambda,
                    ));
                }
                Ok(Value::Function(Rc::new(LoxFunction::new(
                    Rc::clone(declaration),
                    Rc::clone(&self.environment),
                    FunctionKind::Lambda,
                ))))
            }
        }
    }

    fn look_up_variable(&self, id: ExprId, name: &Token) -> Result<Value, RuntimeError> {
        match self.locals.get(&id) {
            Some(&distance) => Environment::get_at(&self.environment, distance, name),
            None => self.globals.borrow().get(name),
        }
    }

    fn evaluate_super(
        &mut self,
        id: ExprId,
        keyword: &Token,
        method: &Token,
    ) -> Result<Value, RuntimeError> {
        let Some(&distance) = self.locals.get(&id) else {
            panic!("interpreter bug: 'super' on line {} was never resolved", keyword.line);
        };
        let Value::Class(superclass) = Environment::get_slot_at(&self.environment, distance, SUPER)
        else {
            panic!("interpreter bug: 'super' slot does not hold a class");
        };
        // The frame holding `this` sits directly inside the one holding `super`.
        let Value::Instance(object) = Environment::get_slot_at(&self.environment, distance - 1, THIS)
        else {
            panic!("interpreter bug: 'this' slot does not hold an instance");
        };

        match superclass.find_method(&method.lexeme) {
            Some(function) => {
                let bound = Value::Function(function.bind(object));
                self.invoke_if_getter(bound, method)
            }
            None => Err(RuntimeError::new(
                method,
                RuntimeErrorKind::UndefinedProperty(method.lexeme.clone()),
            )),
        }
    }

    /// Getters read like fields: a bound getter runs as soon as it is looked up.
    fn invoke_if_getter(&mut self, value: Value, name: &Token) -> Result<Value, RuntimeError> {
        match value {
            Value::Function(function) if function.kind == FunctionKind::Getter => {
                self.call(Value::Function(function), name, Vec::new())
            }
            value => Ok(value),
        }
    }

    fn call(&mut self, callee: Value, paren: &Token, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let callable: &dyn Callable = match &callee {
            Value::Function(function) => &**function,
            Value::Native(native) => &**native,
            Value::Class(class) => class,
            _ => return Err(RuntimeError::new(paren, RuntimeErrorKind::NotCallable)),
        };

        if args.len() != callable.arity() {
            return Err(RuntimeError::new(
                paren,
                RuntimeErrorKind::ArityMismatch {
                    expected: callable.arity(),
                    actual: args.len(),
                },
            ));
        }

        callable.call(self, args)
    }
}

fn binary(operator: &Token, left: Value, right: Value) -> Result<Value, RuntimeError> {
    use TokenType::{
        BangEqual, Comma, EqualEqual, Greater, GreaterEqual, Less, LessEqual, Minus, Plus, Slash,
        Star,
    };

    match (operator.token_type, left, right) {
        (Comma, _, right) => Ok(right),
        (EqualEqual, left, right) => Ok(Value::Bool(left == right)),
        (BangEqual, left, right) => Ok(Value::Bool(left != right)),
        (Plus, Value::Number(l), Value::Number(r)) => Ok(Value::Number(l + r)),
        (Plus, left @ Value::String(_), right) | (Plus, left, right @ Value::String(_)) => {
            Ok(Value::String(format!("{}{}", left, right)))
        }
        (Plus, _, _) => Err(RuntimeError::new(operator, RuntimeErrorKind::InvalidAddition)),
        (Minus, Value::Number(l), Value::Number(r)) => Ok(Value::Number(l - r)),
        (Star, Value::Number(l), Value::Number(r)) => Ok(Value::Number(l * r)),
        (Slash, Value::Number(_), Value::Number(r)) if r.abs() < DIVISION_EPSILON => {
            Err(RuntimeError::new(operator, RuntimeErrorKind::DivisionByZero))
        }
        (Slash, Value::Number(l), Value::Number(r)) => Ok(Value::Number(l / r)),
        (Greater, Value::Number(l), Value::Number(r)) => Ok(Value::Bool(l > r)),
        (GreaterEqual, Value::Number(l), Value::Number(r)) => Ok(Value::Bool(l >= r)),
        (Less, Value::Number(l), Value::Number(r)) => Ok(Value::Bool(l < r)),
        (LessEqual, Value::Number(l), Value::Number(r)) => Ok(Value::Bool(l <= r)),
        _ => Err(RuntimeError::new(
            operator,
            RuntimeErrorKind::OperandsMustBeNumbers(operator.lexeme.clone()),
        )),
    }
}

/// A token to blame when printing fails; the leftmost one in the expression.
fn anchor_token(expr: &Expr) -> Token {
    match expr {
        Expr::Binary { left, .. } | Expr::Logical { left, .. } => anchor_token(left),
        Expr::Call { paren, .. } => paren.clone(),
        Expr::Get { name, .. } | Expr::Set { name, .. } => name.clone(),
        Expr::This { keyword, .. } | Expr::Super { keyword, .. } => keyword.clone(),
        Expr::Lambda(declaration) => declaration.name.clone(),
        Expr::Grouping { expr } => anchor_token(expr),
        Expr::Unary { operator, .. } => operator.clone(),
        Expr::Ternary { condition, .. } => anchor_token(condition),
        Expr::Variable { name, .. } | Expr::Assign { name, .. } => name.clone(),
        Expr::Literal { .. } => Token::new(
            TokenType::Nil,
            String::new(),
            None,
            0,
            crate::error::Span::new(0, 0),
        ),
    }
}
