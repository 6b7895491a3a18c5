use std::io::Write;
use std::process::ExitCode;

use crate::ast::Program;
use crate::error::LoxError;
use crate::interpreter::Interpreter;
use crate::parser::Parser;
use crate::resolver::{Locals, Resolver};
use crate::scanner::Scanner;

/// Exit status for source that failed to scan, parse or resolve.
pub const EXIT_COMPILE_ERROR: u8 = 65;
/// Exit status for the file that could not be read.
pub const EXIT_NO_INPUT: u8 = 66;
/// Exit status when any statement raised a runtime error.
pub const EXIT_RUNTIME_ERROR: u8 = 70;

/// Result of running one piece of source through the whole pipeline.
#[derive(Debug)]
pub enum Outcome {
    Success,
    /// Nothing was executed.
    CompileErrors(Vec<LoxError>),
    /// Statements other than the failing ones did run.
    RuntimeErrors(Vec<LoxError>),
}

impl Outcome {
    pub fn errors(&self) -> &[LoxError] {
        match self {
            Outcome::Success => &[],
            Outcome::CompileErrors(errors) | Outcome::RuntimeErrors(errors) => errors.as_slice(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn exit_code(&self) -> ExitCode {
        match self {
            Outcome::Success => ExitCode::SUCCESS,
            Outcome::CompileErrors(_) => ExitCode::from(EXIT_COMPILE_ERROR),
            Outcome::RuntimeErrors(_) => ExitCode::from(EXIT_RUNTIME_ERROR),
        }
    }
}

/// Scans, parses and resolves. Scan errors do not stop the parser, so one
/// call reports everything it can; resolution only runs on a clean parse.
pub fn compile(source: &str) -> Result<(Program, Locals), Vec<LoxError>> {
    let (tokens, mut errors) = Scanner::new(source).scan_tokens();

    let (program, parse_errors) = Parser::new(tokens).parse();
    errors.extend(parse_errors);
    if !errors.is_empty() {
        return Err(errors);
    }

    let (locals, resolve_errors) = Resolver::new().resolve(&program);
    if !resolve_errors.is_empty() {
        return Err(resolve_errors);
    }

    Ok((program, locals))
}

/// One interpreter whose globals survive across `run` calls.
pub struct Session {
    interpreter: Interpreter,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            interpreter: Interpreter::new(),
        }
    }

    /// Sends `print` output and echoed values to `output` instead of stdout.
    pub fn with_output(output: Box<dyn Write>) -> Self {
        Self {
            interpreter: Interpreter::with_output(output),
        }
    }

    pub fn run(&mut self, source: &str) -> Outcome {
        let (program, locals) = match compile(source) {
            Ok(compiled) => compiled,
            Err(errors) => {
                tracing::debug!(errors = errors.len(), "compilation failed");
                return Outcome::CompileErrors(errors);
            }
        };

        self.interpreter.resolve(locals);
        let errors = self.interpreter.interpret(&program);
        if errors.is_empty() {
            Outcome::Success
        } else {
            Outcome::RuntimeErrors(errors.into_iter().map(LoxError::from).collect())
        }
    }
}

/// Runs a whole script in a fresh session and reports every error.
pub fn run(source: &str, filename: Option<&str>) -> Outcome {
    let outcome = Session::new().run(source);
    report(&outcome, source, filename);
    outcome
}

pub fn report(outcome: &Outcome, source: &str, filename: Option<&str>) {
    for error in outcome.errors() {
        error.report(source, filename);
    }
}
