use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{ClassDecl, Expr, ExprId, FunctionDecl, Program, Stmt};
use crate::callable::{FunctionKind, INIT, SUPER, THIS};
use crate::error::LoxError;
use crate::scanner::Token;

/// Scope distance for every local variable access, keyed by node identity.
/// Accesses missing from the table are globals.
pub type Locals = HashMap<ExprId, usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

/// Static pass computing lexical distances and rejecting misuse of `this`,
/// `super` and `return` before anything runs.
pub struct Resolver {
    /// `false` while a name is declared but its initializer is still being resolved.
    scopes: Vec<HashMap<String, bool>>,
    locals: Locals,
    errors: Vec<LoxError>,
    current_function: Option<FunctionKind>,
    current_class: ClassType,
    /// Set anywhere inside a static method body, nested functions included.
    in_static_method: bool,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            scopes: Vec::new(),
            locals: HashMap::new(),
            errors: Vec::new(),
            current_function: None,
            current_class: ClassType::None,
            in_static_method: false,
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(statements = program.statements.len()))]
    pub fn resolve(mut self, program: &Program) -> (Locals, Vec<LoxError>) {
        self.resolve_statements(&program.statements);
        tracing::debug!(
            locals = self.locals.len(),
            errors = self.errors.len(),
            "resolution complete"
        );
        (self.locals, self.errors)
    }

    fn resolve_statements(&mut self, statements: &[Stmt]) {
        for statement in statements {
            self.resolve_statement(statement);
        }
    }

    fn resolve_statement(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expression { expr } | Stmt::Print { expr } | Stmt::Repl { expr } => {
                self.resolve_expr(expr)
            }
            Stmt::Var { name, initializer } => {
                self.declare(name);
                if let Some(initializer) = initializer {
                    self.resolve_expr(initializer);
                }
                self.define(name);
            }
            Stmt::Function(declaration) => {
                self.declare(&declaration.name);
                self.define(&declaration.name);
                self.resolve_function(declaration, FunctionKind::Function);
            }
            Stmt::Return { keyword, value } => {
                if self.current_function.is_none() {
                    self.error(keyword, "Can't return from top-level code.");
                }
                if let Some(value) = value {
                    if self.current_function == Some(FunctionKind::Initializer) {
                        self.error(keyword, "Can't return a value from an initializer.");
                    }
                    self.resolve_expr(value);
                }
            }
            Stmt::Block { statements } => {
                self.begin_scope();
                self.resolve_statements(statements);
                self.end_scope();
            }
            Stmt::Class(declaration) => self.resolve_class(declaration),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_statement(then_branch);
                if let Some(else_branch) = else_branch {
                    self.resolve_statement(else_branch);
                }
            }
            Stmt::While {
                condition,
                body,
                increment,
            } => {
                self.resolve_expr(condition);
                self.resolve_statement(body);
                if let Some(increment) = increment {
                    self.resolve_expr(increment);
                }
            }
            Stmt::Logic { .. } => {}
        }
    }

    fn resolve_class(&mut self, declaration: &ClassDecl) {
        let enclosing_class = self.current_class;
        self.current_class = ClassType::Class;
        // A class declared inside a static method has its own `this`.
        let enclosing_static = std::mem::replace(&mut self.in_static_method, false);

        self.declare(&declaration.name);
        self.define(&declaration.name);

        if let Some(superclass) = &declaration.superclass {
            if let Expr::Variable { name, .. } = superclass {
                if name.lexeme == declaration.name.lexeme {
                    self.error(name, "A class can't inherit from itself.");
                }
            }
            self.current_class = ClassType::Subclass;
            self.resolve_expr(superclass);

            self.begin_scope();
            self.mark_defined(SUPER);
        }

        // Static methods never see a `this` frame at run time, so they are
        // resolved before that scope exists.
        for method in &declaration.statics {
            if method.name.lexeme == INIT {
                self.error(&method.name, "A static method can't be named 'init'.");
            }
            self.resolve_function(method, FunctionKind::StaticMethod);
        }

        self.begin_scope();
        self.mark_defined(THIS);

        for getter in &declaration.getters {
            if getter.name.lexeme == INIT {
                self.error(&getter.name, "A getter can't be named 'init'.");
            }
            self.resolve_function(getter, FunctionKind::Getter);
        }

        for method in &declaration.methods {
            let kind = if method.name.lexeme == INIT {
                FunctionKind::Initializer
            } else {
                FunctionKind::Method
            };
            self.resolve_function(method, kind);
        }

        self.end_scope();

        if declaration.superclass.is_some() {
            self.end_scope();
        }

        self.current_class = enclosing_class;
        self.in_static_method = enclosing_static;
    }

    fn resolve_function(&mut self, declaration: &Rc<FunctionDecl>, kind: FunctionKind) {
        let enclosing_function = self.current_function.replace(kind);
        let enclosing_static = self.in_static_method;
        if kind == FunctionKind::StaticMethod {
            self.in_static_method = true;
        }

        self.begin_scope();
        for param in &declaration.params {
            self.declare(param);
            self.define(param);
        }
        self.resolve_statements(&declaration.body);
        self.end_scope();

        if kind == FunctionKind::Getter
            && !declaration
                .body
                .iter()
                .any(|stmt| matches!(stmt, Stmt::Return { .. }))
        {
            self.error(&declaration.name, "A getter must have a return statement.");
        }

        self.current_function = enclosing_function;
        self.in_static_method = enclosing_static;
    }

    fn resolve_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Variable { id, name } => {
                // While its initializer runs, a new binding is invisible to it
                // and the name resolves to whatever it shadows.
                let declared_here = self
                    .scopes
                    .last()
                    .is_some_and(|scope| scope.get(&name.lexeme) == Some(&false));
                let skip = usize::from(declared_here);
                self.resolve_local(*id, name, skip);
            }
            Expr::Assign { id, name, value } => {
                self.resolve_expr(value);
                self.resolve_local(*id, name, 0);
            }
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            Expr::Call { callee, args, .. } => {
                self.resolve_expr(callee);
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
            Expr::Get { object, .. } => self.resolve_expr(object),
            Expr::Set { object, value, .. } => {
                self.resolve_expr(value);
                self.resolve_expr(object);
            }
            Expr::This { id, keyword } => {
                if self.current_class == ClassType::None {
                    self.error(keyword, "Can't use 'this' outside of a class.");
                } else if self.in_static_method {
                    self.error(keyword, "Can't use 'this' in a static method.");
                }
                self.resolve_local(*id, keyword, 0);
            }
            Expr::Super { id, keyword, .. } => {
                match self.current_class {
                    ClassType::None => self.error(keyword, "Can't use 'super' outside of a class."),
                    ClassType::Class => {
                        self.error(keyword, "Can't use 'super' in a class with no superclass.")
                    }
                    ClassType::Subclass => {
                        if self.in_static_method {
                            self.error(keyword, "Can't use 'super' in a static method.");
                        }
                    }
                }
                self.resolve_local(*id, keyword, 0);
            }
            Expr::Lambda(declaration) => self.resolve_function(declaration, FunctionKind::Lambda),
            Expr::Grouping { expr } => self.resolve_expr(expr),
            Expr::Literal { .. } => {}
            Expr::Unary { operand, .. } => self.resolve_expr(operand),
            Expr::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_expr(then_branch);
                self.resolve_expr(else_branch);
            }
        }
    }

    /// Records how many frames out `name` lives, ignoring the innermost `skip`
    /// scopes. Names not found in any local scope are left to the globals.
    fn resolve_local(&mut self, id: ExprId, name: &Token, skip: usize) {
        let depth = self.scopes.len().saturating_sub(skip);
        for (index, scope) in self.scopes[..depth].iter().enumerate().rev() {
            if scope.contains_key(&name.lexeme) {
                let distance = self.scopes.len() - 1 - index;
                tracing::trace!(name = %name.lexeme, distance, "resolved local");
                self.locals.insert(id, distance);
                return;
            }
        }
    }

    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &Token) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };
        if scope.contains_key(&name.lexeme) {
            let message = "Already a variable with this name in this scope.";
            self.error(name, message);
            return;
        }
        scope.insert(name.lexeme.clone(), false);
    }

    fn define(&mut self, name: &Token) {
        self.mark_defined(&name.lexeme);
    }

    fn mark_defined(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), true);
        }
    }

    fn error(&mut self, token: &Token, message: &str) {
        self.errors.push(LoxError::resolve_error(token, message));
    }
}
