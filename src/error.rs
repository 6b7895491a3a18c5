use ariadne::{Color, Fmt, Label, Report, ReportKind, Source};
use std::fmt;
use thiserror::Error;

use crate::scanner::Token;

/// Character range in the source text. Offsets count `char`s, which is what
/// ariadne expects when rendering labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn single(pos: usize) -> Self {
        Self {
            start: pos,
            end: pos + 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    LexError,
    ParseError,
    ResolveError,
    RuntimeError,
}

impl ErrorKind {
    fn label(self) -> &'static str {
        match self {
            ErrorKind::LexError => "Lexical Error",
            ErrorKind::ParseError => "Parse Error",
            ErrorKind::ResolveError => "Resolve Error",
            ErrorKind::RuntimeError => "Runtime Error",
        }
    }

    fn color(self) -> Color {
        match self {
            ErrorKind::LexError => Color::Red,
            ErrorKind::ParseError => Color::Yellow,
            ErrorKind::ResolveError => Color::Blue,
            ErrorKind::RuntimeError => Color::Magenta,
        }
    }
}

/// A diagnostic handed to whoever drives the pipeline.
#[derive(Debug, Clone)]
pub struct LoxError {
    pub kind: ErrorKind,
    pub span: Span,
    pub line: usize,
    pub message: String,
    pub help: Option<String>,
}

impl LoxError {
    pub fn new(kind: ErrorKind, span: Span, line: usize, message: String) -> Self {
        Self {
            kind,
            span,
            line,
            message,
            help: None,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn lex_error(span: Span, line: usize, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LexError, span, line, message.into())
    }

    pub fn parse_error(token: &Token, message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::ParseError,
            token.span.clone(),
            token.line,
            message.into(),
        )
    }

    pub fn resolve_error(token: &Token, message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::ResolveError,
            token.span.clone(),
            token.line,
            message.into(),
        )
    }

    pub fn report(&self, source: &str, filename: Option<&str>) {
        let filename = filename.unwrap_or("<repl>");
        let color = self.kind.color();

        // Tokens at end of input carry an empty span; widen it so the label renders.
        let end = self.span.end.max(self.span.start + 1);

        let mut report_builder = Report::build(ReportKind::Error, filename, self.span.start)
            .with_message(format!("{}: {}", self.kind.label().fg(color), self.message))
            .with_label(
                Label::new((filename, self.span.start..end))
                    .with_message(&self.message)
                    .with_color(color),
            );

        if let Some(ref help_text) = self.help {
            report_builder =
                report_builder.with_note(format!("{}: {}", "help".fg(Color::Cyan), help_text));
        }

        if let Err(error) = report_builder
            .finish()
            .eprint((filename, Source::from(source)))
        {
            eprintln!("{} (could not render diagnostic: {})", self, error);
        }
    }
}

impl fmt::Display for LoxError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[line {}] {}: {}", self.line, self.kind.label(), self.message)
    }
}

impl std::error::Error for LoxError {}

/// Every condition the evaluator can raise while running user code.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeErrorKind {
    #[error("Undefined variable '{0}'.")]
    UndefinedVariable(String),
    #[error("Uninitialized variable '{0}'.")]
    UninitializedVariable(String),
    #[error("Operands of '{0}' must be numbers.")]
    OperandsMustBeNumbers(String),
    #[error("Operand of '{0}' must be a number.")]
    OperandMustBeNumber(String),
    #[error("Operands of '+' must be two numbers or at least one string.")]
    InvalidAddition,
    #[error("Division by zero.")]
    DivisionByZero,
    #[error("Expected {expected} arguments but got {actual}.")]
    ArityMismatch { expected: usize, actual: usize },
    #[error("Can only call functions and classes.")]
    NotCallable,
    #[error("Superclass must be a class.")]
    NotAClass,
    #[error("Only instances have properties.")]
    NotAnInstance,
    #[error("Only instances have fields.")]
    NoFields,
    #[error("Undefined property '{0}'.")]
    UndefinedProperty(String),
    #[error("A lambda must contain at least one statement.")]
    EmptyLambda,
    #[error("Failed to write output: {0}")]
    Output(String),
}

#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct RuntimeError {
    pub token: Token,
    pub kind: RuntimeErrorKind,
}

impl RuntimeError {
    pub fn new(token: &Token, kind: RuntimeErrorKind) -> Self {
        Self {
            token: token.clone(),
            kind,
        }
    }

    pub fn line(&self) -> usize {
        self.token.line
    }
}

impl From<RuntimeError> for LoxError {
    fn from(error: RuntimeError) -> Self {
        let help = match &error.kind {
            RuntimeErrorKind::UninitializedVariable(name) => {
                Some(format!("'{}' was declared without a value; assign it before reading.", name))
            }
            RuntimeErrorKind::DivisionByZero => {
                Some("The divisor is zero (or closer to zero than 1e-10).".to_string())
            }
            RuntimeErrorKind::NotCallable => {
                Some("Only functions, lambdas and classes can be called.".to_string())
            }
            _ => None,
        };
        let lox_error = LoxError::new(
            ErrorKind::RuntimeError,
            error.token.span.clone(),
            error.token.line,
            error.kind.to_string(),
        );
        match help {
            Some(help) => lox_error.with_help(help),
            None => lox_error,
        }
    }
}
