use std::rc::Rc;

use crate::ast::{ClassDecl, Expr, ExprId, FunctionDecl, LoopControl, Program, Stmt};
use crate::error::{LoxError, Span};
use crate::scanner::{Literal, Token, TokenType};
use crate::value::Value;

/// Most arguments a call, and most parameters a function, may have.
pub const MAX_ARITY: usize = 255;

type ParseResult<T> = Result<T, LoxError>;

/// Recursive-descent parser. Every error is recorded and parsing resumes at
/// the next statement boundary, so one pass reports as much as it can.
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    errors: Vec<LoxError>,
    /// Off while parsing argument and parameter lists.
    allow_comma: bool,
    /// Nesting depth of `while`/`for` bodies. Function bodies do not reset it.
    loop_depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            errors: Vec::new(),
            allow_comma: true,
            loop_depth: 0,
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(tokens = self.tokens.len()))]
    pub fn parse(mut self) -> (Program, Vec<LoxError>) {
        let mut statements = Vec::new();

        while !self.is_at_end() {
            if let Some(statement) = self.declaration() {
                statements.push(statement);
            }
        }

        tracing::debug!(
            statements = statements.len(),
            errors = self.errors.len(),
            "parse complete"
        );
        (Program { statements }, self.errors)
    }

    fn declaration(&mut self) -> Option<Stmt> {
        let result = if self.match_types(&[TokenType::Class]) {
            self.class_declaration()
        } else if self.check(&TokenType::Fun) && self.check_next(&TokenType::Identifier) {
            self.advance();
            self.function("function").map(Stmt::Function)
        } else if self.match_types(&[TokenType::Var]) {
            self.var_declaration()
        } else {
            self.statement()
        };

        match result {
            Ok(statement) => Some(statement),
            Err(error) => {
                self.errors.push(error);
                self.synchronize();
                None
            }
        }
    }

    fn class_declaration(&mut self) -> ParseResult<Stmt> {
        let name = self.consume(TokenType::Identifier, "Expect class name.")?.clone();

        let superclass = if self.match_types(&[TokenType::Less]) {
            let name = self
                .consume(TokenType::Identifier, "Expect superclass name.")?
                .clone();
            Some(Expr::Variable {
                id: ExprId::fresh(),
                name,
            })
        } else {
            None
        };

        self.consume(TokenType::LeftBrace, "Expect '{' before class body.")?;

        let mut statics = Vec::new();
        let mut getters = Vec::new();
        let mut methods = Vec::new();
        while !self.check(&TokenType::RightBrace) && !self.is_at_end() {
            if self.match_types(&[TokenType::Class]) {
                statics.push(self.function("static method")?);
            } else if self.check_next(&TokenType::LeftParen) {
                methods.push(self.function("method")?);
            } else {
                getters.push(self.getter()?);
            }
        }

        self.consume_with_help(
            TokenType::RightBrace,
            "Expect '}' after class body.",
            "Class bodies hold methods, getters and `class` static methods only.",
        )?;

        Ok(Stmt::Class(ClassDecl {
            name,
            superclass,
            statics,
            getters,
            methods,
        }))
    }

    fn function(&mut self, kind: &str) -> ParseResult<Rc<FunctionDecl>> {
        let name = self
            .consume(TokenType::Identifier, &format!("Expect {} name.", kind))?
            .clone();
        self.consume(
            TokenType::LeftParen,
            &format!("Expect '(' after {} name.", kind),
        )?;
        let params = self.parameters()?;
        self.consume(
            TokenType::LeftBrace,
            &format!("Expect '{{' before {} body.", kind),
        )?;
        let body = self.block()?;
        Ok(Rc::new(FunctionDecl { name, params, body }))
    }

    fn getter(&mut self) -> ParseResult<Rc<FunctionDecl>> {
        let name = self
            .consume(TokenType::Identifier, "Expect getter name.")?
            .clone();
        self.consume_with_help(
            TokenType::LeftBrace,
            "Expect '{' before getter body.",
            "A class member without '(' after its name is a getter: `area { return ...; }`.",
        )?;
        let body = self.block()?;
        Ok(Rc::new(FunctionDecl {
            name,
            params: Vec::new(),
            body,
        }))
    }

    /// Parses `param, ...)` after the opening parenthesis has been consumed.
    fn parameters(&mut self) -> ParseResult<Vec<Token>> {
        let mut params = Vec::new();
        if !self.check(&TokenType::RightParen) {
            loop {
                if params.len() >= MAX_ARITY {
                    let error = LoxError::parse_error(
                        self.peek(),
                        format!("Can't have more than {} parameters.", MAX_ARITY),
                    );
                    self.errors.push(error);
                }
                params.push(
                    self.consume(TokenType::Identifier, "Expect parameter name.")?
                        .clone(),
                );
                if !self.match_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expect ')' after parameters.")?;
        Ok(params)
    }

    fn var_declaration(&mut self) -> ParseResult<Stmt> {
        let name = self
            .consume(TokenType::Identifier, "Expect variable name.")?
            .clone();

        let initializer = if self.match_types(&[TokenType::Equal]) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume_with_help(
            TokenType::Semicolon,
            "Expect ';' after variable declaration.",
            "Declarations end with a semicolon: var name = value;",
        )?;
        Ok(Stmt::Var { name, initializer })
    }

    fn statement(&mut self) -> ParseResult<Stmt> {
        if self.match_types(&[TokenType::For]) {
            self.for_statement()
        } else if self.match_types(&[TokenType::If]) {
            self.if_statement()
        } else if self.match_types(&[TokenType::Print]) {
            self.print_statement()
        } else if self.match_types(&[TokenType::Return]) {
            self.return_statement()
        } else if self.match_types(&[TokenType::While]) {
            self.while_statement()
        } else if self.match_types(&[TokenType::Break, TokenType::Continue]) {
            self.loop_control()
        } else if self.match_types(&[TokenType::LeftBrace]) {
            Ok(Stmt::Block {
                statements: self.block()?,
            })
        } else {
            self.expression_statement()
        }
    }

    fn for_statement(&mut self) -> ParseResult<Stmt> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'for'.")?;

        let initializer = if self.match_types(&[TokenType::Semicolon]) {
            None
        } else if self.match_types(&[TokenType::Var]) {
            Some(self.var_declaration()?)
        } else {
            Some(self.expression_statement()?)
        };

        let condition = if self.check(&TokenType::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(TokenType::Semicolon, "Expect ';' after loop condition.")?;

        let increment = if self.check(&TokenType::RightParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(TokenType::RightParen, "Expect ')' after for clauses.")?;

        let body = self.loop_body()?;
        let condition = condition.unwrap_or(Expr::Literal {
            value: Value::Bool(true),
        });

        let mut desugared = Stmt::While {
            condition,
            body: Box::new(body),
            increment,
        };
        if let Some(initializer) = initializer {
            desugared = Stmt::Block {
                statements: vec![initializer, desugared],
            };
        }
        Ok(desugared)
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        self.consume_with_help(
            TokenType::LeftParen,
            "Expect '(' after 'if'.",
            "If statements require parentheses around the condition: if (condition) ...",
        )?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expect ')' after if condition.")?;

        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_types(&[TokenType::Else]) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn print_statement(&mut self) -> ParseResult<Stmt> {
        let expr = self.expression()?;
        self.consume(TokenType::Semicolon, "Expect ';' after value.")?;
        Ok(Stmt::Print { expr })
    }

    fn return_statement(&mut self) -> ParseResult<Stmt> {
        let keyword = self.previous().clone();
        let value = if self.check(&TokenType::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(TokenType::Semicolon, "Expect ';' after return value.")?;
        Ok(Stmt::Return { keyword, value })
    }

    fn while_statement(&mut self) -> ParseResult<Stmt> {
        self.consume(TokenType::LeftParen, "Expect '(' after 'while'.")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expect ')' after condition.")?;
        let body = self.loop_body()?;

        Ok(Stmt::While {
            condition,
            body: Box::new(body),
            increment: None,
        })
    }

    fn loop_body(&mut self) -> ParseResult<Stmt> {
        self.loop_depth += 1;
        let body = self.statement();
        self.loop_depth -= 1;
        body
    }

    fn loop_control(&mut self) -> ParseResult<Stmt> {
        let keyword = self.previous().clone();
        let control = if keyword.token_type == TokenType::Break {
            LoopControl::Break
        } else {
            LoopControl::Continue
        };

        if self.loop_depth == 0 {
            return Err(LoxError::parse_error(
                &keyword,
                format!("Can't use '{}' outside of a loop.", keyword.lexeme),
            ));
        }

        self.consume(
            TokenType::Semicolon,
            &format!("Expect ';' after '{}'.", keyword.lexeme),
        )?;
        Ok(Stmt::Logic { keyword, control })
    }

    /// Parses declarations up to and including the closing `}`. A lambda body
    /// inside an argument list parses commas normally again.
    fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.with_comma(true, Self::block_statements)
    }

    fn block_statements(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut statements = Vec::new();

        while !self.check(&TokenType::RightBrace) && !self.is_at_end() {
            if let Some(statement) = self.declaration() {
                statements.push(statement);
            }
        }

        self.consume_with_help(
            TokenType::RightBrace,
            "Expect '}' after block.",
            "Blocks must be closed with '}' after the opening '{'.",
        )?;
        Ok(statements)
    }

    /// Without a trailing `;` the expression becomes a statement whose value
    /// is echoed, which is what makes `1 + 2` work at the prompt. This holds
    /// anywhere, so `{ 1 + 2 }` echoes too.
    fn expression_statement(&mut self) -> ParseResult<Stmt> {
        let expr = self.expression()?;
        if self.match_types(&[TokenType::Semicolon]) {
            Ok(Stmt::Expression { expr })
        } else {
            Ok(Stmt::Repl { expr })
        }
    }

    fn expression(&mut self) -> ParseResult<Expr> {
        if self.match_types(&[TokenType::Fun]) {
            return self.lambda();
        }
        self.comma()
    }

    fn lambda(&mut self) -> ParseResult<Expr> {
        let keyword = self.previous().clone();
        self.consume(TokenType::LeftParen, "Expect '(' after 'fun'.")?;

        let params = self.with_comma(false, Self::parameters)?;

        self.consume(TokenType::LeftBrace, "Expect '{' before lambda body.")?;
        let body = self.block()?;
        Ok(Expr::Lambda(Rc::new(FunctionDecl {
            name: keyword,
            params,
            body,
        })))
    }

    /// `a, b` evaluates both and yields `b`.
    fn comma(&mut self) -> ParseResult<Expr> {
        let mut expr = self.ternary()?;

        while self.allow_comma && self.match_types(&[TokenType::Comma]) {
            let operator = self.previous().clone();
            let right = self.ternary()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn assignment(&mut self) -> ParseResult<Expr> {
        let expr = self.or()?;

        if self.match_types(&[TokenType::Equal]) {
            let equals = self.previous().clone();
            let value = Box::new(self.assignment()?);

            return match expr {
                Expr::Variable { name, .. } => Ok(Expr::Assign {
                    id: ExprId::fresh(),
                    name,
                    value,
                }),
                Expr::Get { object, name } => Ok(Expr::Set {
                    object,
                    name,
                    value,
                }),
                _ => Err(LoxError::parse_error(&equals, "Invalid assignment target.")
                    .with_help("Only variables and object properties can be assigned to.")),
            };
        }

        Ok(expr)
    }

    /// Binds looser than assignment, so both arms may assign:
    /// `c ? x = 1 : y = 2`. Arms nest to the right.
    fn ternary(&mut self) -> ParseResult<Expr> {
        let condition = self.assignment()?;

        if self.match_types(&[TokenType::Question]) {
            let then_branch = self.ternary()?;
            self.consume_with_help(
                TokenType::Colon,
                "Expect ':' after then branch of conditional expression.",
                "Conditional expressions take the form: condition ? then : else",
            )?;
            let else_branch = self.ternary()?;
            return Ok(Expr::Ternary {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            });
        }

        Ok(condition)
    }

    fn or(&mut self) -> ParseResult<Expr> {
        let mut expr = self.and()?;

        while self.match_types(&[TokenType::Or]) {
            let operator = self.previous().clone();
            let right = self.and()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn and(&mut self) -> ParseResult<Expr> {
        let mut expr = self.equality()?;

        while self.match_types(&[TokenType::And]) {
            let operator = self.previous().clone();
            let right = self.equality()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[TokenType::BangEqual, TokenType::EqualEqual],
            Self::comparison,
        )
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[
                TokenType::Greater,
                TokenType::GreaterEqual,
                TokenType::Less,
                TokenType::LessEqual,
            ],
            Self::term,
        )
    }

    fn term(&mut self) -> ParseResult<Expr> {
        self.binary_level(&[TokenType::Minus, TokenType::Plus], Self::factor)
    }

    fn factor(&mut self) -> ParseResult<Expr> {
        self.binary_level(&[TokenType::Slash, TokenType::Star], Self::unary)
    }

    /// One left-associative precedence level.
    fn binary_level(
        &mut self,
        operators: &[TokenType],
        operand: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let mut expr = operand(self)?;

        while self.match_types(operators) {
            let operator = self.previous().clone();
            let right = operand(self)?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        if self.match_types(&[TokenType::Bang, TokenType::Minus, TokenType::Plus]) {
            let operator = self.previous().clone();
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                operator,
                operand: Box::new(operand),
            });
        }

        self.call()
    }

    fn call(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;

        loop {
            if self.match_types(&[TokenType::LeftParen]) {
                expr = self.finish_call(expr)?;
            } else if self.match_types(&[TokenType::Dot]) {
                let name = self
                    .consume(TokenType::Identifier, "Expect property name after '.'.")?
                    .clone();
                expr = Expr::Get {
                    object: Box::new(expr),
                    name,
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> ParseResult<Expr> {
        let args = self.with_comma(false, Self::arguments)?;

        let paren = self
            .consume(TokenType::RightParen, "Expect ')' after arguments.")?
            .clone();

        Ok(Expr::Call {
            callee: Box::new(callee),
            paren,
            args,
        })
    }

    fn arguments(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.check(&TokenType::RightParen) {
            loop {
                if args.len() >= MAX_ARITY {
                    let error = LoxError::parse_error(
                        self.peek(),
                        format!("Can't have more than {} arguments.", MAX_ARITY),
                    );
                    self.errors.push(error);
                }
                args.push(self.expression()?);
                if !self.match_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }
        Ok(args)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        if self.match_types(&[TokenType::False]) {
            return Ok(Expr::Literal {
                value: Value::Bool(false),
            });
        }
        if self.match_types(&[TokenType::True]) {
            return Ok(Expr::Literal {
                value: Value::Bool(true),
            });
        }
        if self.match_types(&[TokenType::Nil]) {
            return Ok(Expr::Literal { value: Value::Nil });
        }

        if self.match_types(&[TokenType::Number, TokenType::String]) {
            let value = match &self.previous().literal {
                Some(Literal::Number(n)) => Value::Number(*n),
                Some(Literal::String(s)) => Value::String(s.clone()),
                None => Value::Nil,
            };
            return Ok(Expr::Literal { value });
        }

        if self.match_types(&[TokenType::Super]) {
            let keyword = self.previous().clone();
            self.consume(TokenType::Dot, "Expect '.' after 'super'.")?;
            let method = self
                .consume(TokenType::Identifier, "Expect superclass method name.")?
                .clone();
            return Ok(Expr::Super {
                id: ExprId::fresh(),
                keyword,
                method,
            });
        }

        if self.match_types(&[TokenType::This]) {
            return Ok(Expr::This {
                id: ExprId::fresh(),
                keyword: self.previous().clone(),
            });
        }

        if self.match_types(&[TokenType::Identifier]) {
            return Ok(Expr::Variable {
                id: ExprId::fresh(),
                name: self.previous().clone(),
            });
        }

        if self.match_types(&[TokenType::LeftParen]) {
            let expr = self.with_comma(true, Self::expression)?;
            self.consume_with_help(
                TokenType::RightParen,
                "Expect ')' after expression.",
                "Every opening parenthesis '(' must have a matching closing parenthesis ')'.",
            )?;
            return Ok(Expr::Grouping {
                expr: Box::new(expr),
            });
        }

        Err(LoxError::parse_error(self.peek(), "Expect expression."))
    }

    /// Runs `parse` with comma sequencing switched on or off, restoring the
    /// previous setting afterwards even on error.
    fn with_comma<T>(
        &mut self,
        allow: bool,
        parse: impl FnOnce(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<T> {
        let saved = std::mem::replace(&mut self.allow_comma, allow);
        let result = parse(self);
        self.allow_comma = saved;
        result
    }

    /// Discards tokens until just after a `;` or just before a keyword that
    /// starts a declaration or statement.
    fn synchronize(&mut self) {
        self.advance();

        while !self.is_at_end() {
            if self.previous().token_type == TokenType::Semicolon {
                break;
            }

            match self.peek().token_type {
                TokenType::Class
                | TokenType::Fun
                | TokenType::Var
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Print
                | TokenType::Return => break,
                _ => {
                    self.advance();
                }
            }
        }

        tracing::trace!(line = self.peek().line, "parser resynchronised");
    }

    fn match_types(&mut self, types: &[TokenType]) -> bool {
        for token_type in types {
            if self.check(token_type) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn check(&self, token_type: &TokenType) -> bool {
        if self.is_at_end() {
            false
        } else {
            &self.peek().token_type == token_type
        }
    }

    /// Looks one token past `peek`.
    fn check_next(&self, token_type: &TokenType) -> bool {
        match self.tokens.get(self.current + 1) {
            Some(token) => &token.token_type == token_type,
            None => false,
        }
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().token_type == TokenType::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn consume(&mut self, token_type: TokenType, message: &str) -> ParseResult<&Token> {
        if self.check(&token_type) {
            Ok(self.advance())
        } else {
            Err(self.error_at_current(message))
        }
    }

    fn consume_with_help(
        &mut self,
        token_type: TokenType,
        message: &str,
        help: &str,
    ) -> ParseResult<&Token> {
        if self.check(&token_type) {
            Ok(self.advance())
        } else {
            Err(self.error_at_current(message).with_help(help))
        }
    }

    /// At end of input the error points just past the last real token.
    fn error_at_current(&self, message: &str) -> LoxError {
        let mut error = LoxError::parse_error(self.peek(), message);
        if self.is_at_end() && self.current > 0 {
            let last = &self.tokens[self.current - 1];
            error.span = Span::single(last.span.end);
            error.line = last.line;
        }
        error
    }
}
