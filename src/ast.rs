use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::scanner::Token;
use crate::value::Value;

/// Identity of an expression node. Two syntactically identical expressions get
/// different ids, which is what the resolver's distance table is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(pub usize);

static NEXT_EXPR_ID: AtomicUsize = AtomicUsize::new(0);

impl ExprId {
    /// Ids are unique for the whole process so that programs parsed separately
    /// (one REPL line after another) can share one interpreter.
    pub fn fresh() -> Self {
        ExprId(NEXT_EXPR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

/// Which loop-control statement was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Break,
    Continue,
}

/// Shared by named functions, methods, getters and lambdas. Getters have no
/// parameter list, so `params` is empty for them.
#[derive(Debug)]
pub struct FunctionDecl {
    pub name: Token,
    pub params: Vec<Token>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub name: Token,
    /// Always an `Expr::Variable` when present.
    pub superclass: Option<Expr>,
    pub statics: Vec<Rc<FunctionDecl>>,
    pub getters: Vec<Rc<FunctionDecl>>,
    pub methods: Vec<Rc<FunctionDecl>>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expression {
        expr: Expr,
    },
    Function(Rc<FunctionDecl>),
    Return {
        keyword: Token,
        value: Option<Expr>,
    },
    Print {
        expr: Expr,
    },
    Var {
        name: Token,
        initializer: Option<Expr>,
    },
    Block {
        statements: Vec<Stmt>,
    },
    Class(ClassDecl),
    /// A bare expression without a trailing `;`; its value is echoed.
    Repl {
        expr: Expr,
    },
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    /// `for` loops desugar into this; `increment` runs after every iteration,
    /// including ones cut short by `continue`.
    While {
        condition: Expr,
        body: Box<Stmt>,
        increment: Option<Expr>,
    },
    Logic {
        keyword: Token,
        control: LoopControl,
    },
}

#[derive(Debug, Clone)]
pub enum Expr {
    Binary {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        paren: Token,
        args: Vec<Expr>,
    },
    Get {
        object: Box<Expr>,
        name: Token,
    },
    This {
        id: ExprId,
        keyword: Token,
    },
    Super {
        id: ExprId,
        keyword: Token,
        method: Token,
    },
    Set {
        object: Box<Expr>,
        name: Token,
        value: Box<Expr>,
    },
    Lambda(Rc<FunctionDecl>),
    Grouping {
        expr: Box<Expr>,
    },
    Literal {
        value: Value,
    },
    Unary {
        operator: Token,
        operand: Box<Expr>,
    },
    Ternary {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Variable {
        id: ExprId,
        name: Token,
    },
    Assign {
        id: ExprId,
        name: Token,
        value: Box<Expr>,
    },
    Logical {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },
}
