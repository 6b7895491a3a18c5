use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::scanner::Token;
use crate::value::Value;

pub type EnvRef = Rc<RefCell<Environment>>;

/// One scope frame. A binding holding `None` was declared with `var x;` and
/// has not been assigned yet.
#[derive(Debug, Default)]
pub struct Environment {
    values: HashMap<String, Option<Value>>,
    enclosing: Option<EnvRef>,
}

impl Environment {
    pub fn new() -> EnvRef {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn with_enclosing(enclosing: &EnvRef) -> EnvRef {
        Rc::new(RefCell::new(Self {
            values: HashMap::new(),
            enclosing: Some(Rc::clone(enclosing)),
        }))
    }

    /// Insert or overwrite in this frame only.
    pub fn define(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), Some(value));
    }

    pub fn declare_uninitialized(&mut self, name: &str) {
        self.values.insert(name.to_string(), None);
    }

    pub fn get(&self, name: &Token) -> Result<Value, RuntimeError> {
        match self.values.get(&name.lexeme) {
            Some(Some(value)) => Ok(value.clone()),
            Some(None) => Err(RuntimeError::new(
                name,
                RuntimeErrorKind::UninitializedVariable(name.lexeme.clone()),
            )),
            None => match &self.enclosing {
                Some(enclosing) => enclosing.borrow().get(name),
                None => Err(RuntimeError::new(
                    name,
                    RuntimeErrorKind::UndefinedVariable(name.lexeme.clone()),
                )),
            },
        }
    }

    pub fn assign(&mut self, name: &Token, value: Value) -> Result<(), RuntimeError> {
        if let Some(slot) = self.values.get_mut(&name.lexeme) {
            *slot = Some(value);
            return Ok(());
        }

        match &self.enclosing {
            Some(enclosing) => enclosing.borrow_mut().assign(name, value),
            None => Err(RuntimeError::new(
                name,
                RuntimeErrorKind::UndefinedVariable(name.lexeme.clone()),
            )),
        }
    }

    /// Walks exactly `distance` frames up. Running out of frames means the
    /// resolver and the interpreter disagree about scoping, which is a bug in
    /// this crate rather than in the user's program.
    pub fn ancestor(env: &EnvRef, distance: usize) -> EnvRef {
        let mut environment = Rc::clone(env);
        for _ in 0..distance {
            let parent = environment.borrow().enclosing.clone();
            environment = match parent {
                Some(parent) => parent,
                None => panic!(
                    "interpreter bug: no scope frame at distance {} from the current one",
                    distance
                ),
            };
        }
        environment
    }

    pub fn get_at(env: &EnvRef, distance: usize, name: &Token) -> Result<Value, RuntimeError> {
        let frame = Self::ancestor(env, distance);
        let frame = frame.borrow();
        match frame.values.get(&name.lexeme) {
            Some(Some(value)) => Ok(value.clone()),
            Some(None) => Err(RuntimeError::new(
                name,
                RuntimeErrorKind::UninitializedVariable(name.lexeme.clone()),
            )),
            None => panic!(
                "interpreter bug: '{}' resolved to distance {} but is not bound there",
                name.lexeme, distance
            ),
        }
    }

    /// Reads a binding the interpreter itself placed (`this`, `super`).
    pub fn get_slot_at(env: &EnvRef, distance: usize, name: &str) -> Value {
        let frame = Self::ancestor(env, distance);
        let value = frame.borrow().values.get(name).cloned().flatten();
        match value {
            Some(value) => value,
            None => panic!(
                "interpreter bug: '{}' is not bound {} frames up",
                name, distance
            ),
        }
    }

    pub fn assign_at(env: &EnvRef, distance: usize, name: &Token, value: Value) {
        Self::ancestor(env, distance)
            .borrow_mut()
            .values
            .insert(name.lexeme.clone(), Some(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Span;
    use crate::scanner::TokenType;
    use pretty_assertions::assert_eq;

    fn ident(name: &str) -> Token {
        Token::new(TokenType::Identifier, name.to_string(), None, 1, Span::new(0, name.len()))
    }

    #[test]
    fn lookup_searches_enclosing_frames() {
        let globals = Environment::new();
        globals.borrow_mut().define("a", Value::Number(1.0));
        let inner = Environment::with_enclosing(&globals);

        assert_eq!(inner.borrow().get(&ident("a")).unwrap(), Value::Number(1.0));
        inner.borrow_mut().assign(&ident("a"), Value::Number(2.0)).unwrap();
        assert_eq!(globals.borrow().get(&ident("a")).unwrap(), Value::Number(2.0));
    }

    #[test]
    fn undefined_and_uninitialized_are_distinct() {
        let env = Environment::new();
        env.borrow_mut().declare_uninitialized("x");

        let err = env.borrow().get(&ident("x")).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::UninitializedVariable("x".to_string()));

        let err = env.borrow().get(&ident("y")).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::UndefinedVariable("y".to_string()));

        let err = env.borrow_mut().assign(&ident("y"), Value::Nil).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::UndefinedVariable("y".to_string()));
    }

    #[test]
    fn distance_lookup_skips_shadowing_frames() {
        let outer = Environment::new();
        outer.borrow_mut().define("a", Value::Number(1.0));
        let inner = Environment::with_enclosing(&outer);
        inner.borrow_mut().define("a", Value::Number(2.0));

        assert_eq!(Environment::get_at(&inner, 0, &ident("a")).unwrap(), Value::Number(2.0));
        assert_eq!(Environment::get_at(&inner, 1, &ident("a")).unwrap(), Value::Number(1.0));

        Environment::assign_at(&inner, 1, &ident("a"), Value::Bool(true));
        assert_eq!(outer.borrow().get(&ident("a")).unwrap(), Value::Bool(true));
    }

    #[test]
    #[should_panic(expected = "interpreter bug")]
    fn walking_past_the_root_is_an_internal_fault() {
        let env = Environment::new();
        let _ = Environment::get_at(&env, 3, &ident("a"));
    }
}
