// Lox interpreter library
//
// Scanner -> Parser -> Resolver -> Interpreter, plus the runtime value model
// and the drivers used by the `lox` binary.

pub mod ast;
pub mod callable;
pub mod environment;
pub mod error;
pub mod interpreter;
pub mod parser;
pub mod repl;
pub mod resolver;
pub mod runner;
pub mod scanner;
pub mod value;

pub use ast::{Expr, Program, Stmt};
pub use error::{LoxError, RuntimeError, RuntimeErrorKind, Span};
pub use interpreter::Interpreter;
pub use parser::Parser;
pub use resolver::Resolver;
pub use scanner::{Scanner, Token, TokenType};
pub use value::Value;

pub use repl::start as start_repl;
pub use runner::{run, Outcome, Session};
