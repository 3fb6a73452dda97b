//! Recursive-descent parser producing a [`Program`].

use std::rc::Rc;

use super::ast::*;
use super::error::SandboxError;
use super::lexer::{Keyword, Pos, Punct, Token, TokenKind, tokenize};

/// Maximum syntactic nesting. Bounds the recursion of both the parser and
/// the evaluator.
const MAX_NESTING: usize = 128;

/// Parse script source into a program.
pub fn parse(source: &str) -> Result<Program, SandboxError> {
    let tokens = tokenize(source)?;
    Parser::new(tokens).program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    prev_line: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            prev_line: 1,
        }
    }

    // -------------------------------------------------------------------------
    // Token helpers
    // -------------------------------------------------------------------------

    fn token_at(&self, index: usize) -> &Token {
        // The token list always ends with Eof.
        &self.tokens[index.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        self.token_at(self.pos)
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        self.prev_line = token.pos.line;
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check_punct(&self, punct: Punct) -> bool {
        matches!(self.peek_kind(), TokenKind::Punct(p) if *p == punct)
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        matches!(self.peek_kind(), TokenKind::Keyword(k) if *k == keyword)
    }

    fn eat_punct(&mut self, punct: Punct) -> bool {
        if self.check_punct(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        if self.check_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: Punct) -> Result<Pos, SandboxError> {
        if self.check_punct(punct) {
            Ok(self.advance().pos)
        } else {
            Err(self.error(format!(
                "Expected '{}' but found {}",
                punct.as_str(),
                self.peek_kind().describe()
            )))
        }
    }

    fn expect_ident(&mut self) -> Result<String, SandboxError> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("Expected a name but found {}", other.describe()))),
        }
    }

    /// Property names may be identifiers or keywords (`row.new`, `{ null: 1 }`).
    fn expect_property_name(&mut self) -> Result<String, SandboxError> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            TokenKind::Keyword(keyword) => {
                self.advance();
                Ok(keyword.as_str().to_string())
            }
            other => Err(self.error(format!(
                "Expected a property name but found {}",
                other.describe()
            ))),
        }
    }

    fn error(&self, message: impl Into<String>) -> SandboxError {
        let pos = self.peek().pos;
        SandboxError::Syntax {
            message: message.into(),
            line: pos.line,
            column: pos.column,
        }
    }

    fn unexpected(&self) -> SandboxError {
        self.error(format!("Unexpected {}", self.peek_kind().describe()))
    }

    fn enter(&mut self) -> Result<(), SandboxError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error("Script is nested too deeply"));
        }
        Ok(())
    }

    fn leave(&mut self, levels: usize) {
        self.depth -= levels;
    }

    /// Statements end with `;`, a closing brace, the end of input or a line break.
    fn end_statement(&mut self) -> Result<(), SandboxError> {
        if self.eat_punct(Punct::Semicolon)
            || self.check_punct(Punct::RBrace)
            || matches!(self.peek_kind(), TokenKind::Eof)
            || self.peek().pos.line > self.prev_line
        {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    // -------------------------------------------------------------------------
    // Statements
    // -------------------------------------------------------------------------

    fn program(mut self) -> Result<Program, SandboxError> {
        let mut body = Vec::new();
        while !matches!(self.peek_kind(), TokenKind::Eof) {
            body.push(self.statement()?);
        }
        Ok(Program { body })
    }

    fn statement(&mut self) -> Result<Stmt, SandboxError> {
        self.enter()?;
        let stmt = self.statement_inner()?;
        self.leave(1);
        Ok(stmt)
    }

    fn statement_inner(&mut self) -> Result<Stmt, SandboxError> {
        let line = self.peek().pos.line;
        let kind = match self.peek_kind().clone() {
            TokenKind::Punct(Punct::LBrace) => StmtKind::Block(self.block()?),
            TokenKind::Punct(Punct::Semicolon) => {
                self.advance();
                StmtKind::Empty
            }
            TokenKind::Keyword(Keyword::Let | Keyword::Const | Keyword::Var) => {
                let kind = self.declaration_kind();
                let declarations = self.declarations(kind)?;
                self.end_statement()?;
                StmtKind::Declare { kind, declarations }
            }
            TokenKind::Keyword(Keyword::If) => self.if_statement()?,
            TokenKind::Keyword(Keyword::For) => self.for_statement()?,
            TokenKind::Keyword(Keyword::Return) => {
                self.advance();
                let value = if self.check_punct(Punct::Semicolon)
                    || self.check_punct(Punct::RBrace)
                    || matches!(self.peek_kind(), TokenKind::Eof)
                    || self.peek().pos.line > self.prev_line
                {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.end_statement()?;
                StmtKind::Return(value)
            }
            TokenKind::Keyword(Keyword::Throw) => {
                self.advance();
                let value = self.expression()?;
                self.end_statement()?;
                StmtKind::Throw(value)
            }
            TokenKind::Keyword(Keyword::Function) => {
                return Err(self.error(
                    "function declarations are not supported; use arrow functions",
                ));
            }
            TokenKind::Ident(name) if self.assignment_op_at(self.pos + 1).is_some() => {
                self.advance();
                let op = self.assignment_op_at(self.pos).unwrap_or(AssignOp::Assign);
                self.advance();
                let value = self.expression()?;
                self.end_statement()?;
                StmtKind::Assign {
                    target: name,
                    op,
                    value,
                }
            }
            _ => {
                let expr = self.expression()?;
                if self.assignment_op_at(self.pos).is_some() {
                    return Err(match expr.kind {
                        ExprKind::Member { .. } | ExprKind::Index { .. } => self.error(
                            "Cannot assign to a property: rows and data are read-only",
                        ),
                        _ => self.error("Invalid assignment target"),
                    });
                }
                self.end_statement()?;
                StmtKind::Expr(expr)
            }
        };
        Ok(Stmt { kind, line })
    }

    fn assignment_op_at(&self, index: usize) -> Option<AssignOp> {
        match self.token_at(index).kind {
            TokenKind::Punct(Punct::Assign) => Some(AssignOp::Assign),
            TokenKind::Punct(Punct::PlusAssign) => Some(AssignOp::Add),
            TokenKind::Punct(Punct::MinusAssign) => Some(AssignOp::Sub),
            _ => None,
        }
    }

    fn declaration_kind(&mut self) -> DeclKind {
        match self.advance().kind {
            TokenKind::Keyword(Keyword::Const) => DeclKind::Const,
            _ => DeclKind::Let,
        }
    }

    fn declarations(
        &mut self,
        kind: DeclKind,
    ) -> Result<Vec<(String, Option<Expr>)>, SandboxError> {
        let mut declarations = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let init = if self.eat_punct(Punct::Assign) {
                Some(self.expression()?)
            } else if kind == DeclKind::Const {
                return Err(self.error(format!(
                    "Missing initializer in const declaration of '{name}'"
                )));
            } else {
                None
            };
            declarations.push((name, init));
            if !self.eat_punct(Punct::Comma) {
                return Ok(declarations);
            }
        }
    }

    fn block(&mut self) -> Result<Vec<Stmt>, SandboxError> {
        self.expect_punct(Punct::LBrace)?;
        let mut body = Vec::new();
        while !self.check_punct(Punct::RBrace) {
            if matches!(self.peek_kind(), TokenKind::Eof) {
                return Err(self.error("Expected '}' but found end of script"));
            }
            body.push(self.statement()?);
        }
        self.advance();
        Ok(body)
    }

    fn if_statement(&mut self) -> Result<StmtKind, SandboxError> {
        self.advance();
        self.expect_punct(Punct::LParen)?;
        let test = self.expression()?;
        self.expect_punct(Punct::RParen)?;
        let consequent = Box::new(self.statement()?);
        let alternate = if self.eat_keyword(Keyword::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(StmtKind::If {
            test,
            consequent,
            alternate,
        })
    }

    fn for_statement(&mut self) -> Result<StmtKind, SandboxError> {
        const SHAPE: &str = "Only 'for (const item of items)' loops are supported";

        self.advance();
        self.expect_punct(Punct::LParen)?;
        if !matches!(
            self.peek_kind(),
            TokenKind::Keyword(Keyword::Let | Keyword::Const | Keyword::Var)
        ) {
            return Err(self.error(SHAPE));
        }
        let kind = self.declaration_kind();
        let binding = self.expect_ident()?;
        if !matches!(self.peek_kind(), TokenKind::Ident(word) if word == "of") {
            return Err(self.error(SHAPE));
        }
        self.advance();
        let iterable = self.expression()?;
        self.expect_punct(Punct::RParen)?;
        let body = Box::new(self.statement()?);
        Ok(StmtKind::ForOf {
            kind,
            binding,
            iterable,
            body,
        })
    }

    // -------------------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------------------

    fn expression(&mut self) -> Result<Expr, SandboxError> {
        self.enter()?;
        let expr = self.conditional()?;
        self.leave(1);
        Ok(expr)
    }

    fn conditional(&mut self) -> Result<Expr, SandboxError> {
        let test = self.logical_or()?;
        if !self.eat_punct(Punct::Question) {
            return Ok(test);
        }
        let consequent = self.expression()?;
        self.expect_punct(Punct::Colon)?;
        let alternate = self.expression()?;
        Ok(Expr {
            line: test.line,
            kind: ExprKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
        })
    }

    fn logical_or(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.logical_and()?;
        let mut nested = 0;
        loop {
            let op = if self.eat_punct(Punct::OrOr) {
                LogicalOp::Or
            } else if self.eat_punct(Punct::QuestionQuestion) {
                LogicalOp::Nullish
            } else {
                break;
            };
            self.enter()?;
            nested += 1;
            let right = self.logical_and()?;
            left = logical(op, left, right);
        }
        self.leave(nested);
        Ok(left)
    }

    fn logical_and(&mut self) -> Result<Expr, SandboxError> {
        let mut left = self.equality()?;
        let mut nested = 0;
        while self.eat_punct(Punct::AndAnd) {
            self.enter()?;
            nested += 1;
            let right = self.equality()?;
            left = logical(LogicalOp::And, left, right);
        }
        self.leave(nested);
        Ok(left)
    }

    fn binary_level(
        &mut self,
        operators: &[(Punct, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, SandboxError>,
    ) -> Result<Expr, SandboxError> {
        let mut left = next(self)?;
        let mut nested = 0;
        while let Some(op) = operators
            .iter()
            .find(|(punct, _)| self.check_punct(*punct))
            .map(|(_, op)| *op)
        {
            self.advance();
            self.enter()?;
            nested += 1;
            let right = next(self)?;
            left = Expr {
                line: left.line,
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
        self.leave(nested);
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, SandboxError> {
        self.binary_level(
            &[
                (Punct::StrictEq, BinaryOp::StrictEq),
                (Punct::StrictNotEq, BinaryOp::StrictNotEq),
                (Punct::Eq, BinaryOp::Eq),
                (Punct::NotEq, BinaryOp::NotEq),
            ],
            Self::relational,
        )
    }

    fn relational(&mut self) -> Result<Expr, SandboxError> {
        self.binary_level(
            &[
                (Punct::Lt, BinaryOp::Lt),
                (Punct::LtEq, BinaryOp::LtEq),
                (Punct::Gt, BinaryOp::Gt),
                (Punct::GtEq, BinaryOp::GtEq),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, SandboxError> {
        self.binary_level(
            &[(Punct::Plus, BinaryOp::Add), (Punct::Minus, BinaryOp::Sub)],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> Result<Expr, SandboxError> {
        self.binary_level(
            &[
                (Punct::Star, BinaryOp::Mul),
                (Punct::Slash, BinaryOp::Div),
                (Punct::Percent, BinaryOp::Rem),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr, SandboxError> {
        let op = match self.peek_kind() {
            TokenKind::Punct(Punct::Bang) => UnaryOp::Not,
            TokenKind::Punct(Punct::Minus) => UnaryOp::Neg,
            TokenKind::Punct(Punct::Plus) => UnaryOp::Plus,
            TokenKind::Keyword(Keyword::Typeof) => UnaryOp::Typeof,
            _ => return self.postfix(),
        };
        let line = self.advance().pos.line;
        self.enter()?;
        let operand = self.unary()?;
        self.leave(1);
        Ok(Expr {
            line,
            kind: ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
        })
    }

    fn postfix(&mut self) -> Result<Expr, SandboxError> {
        let mut expr = self.primary()?;
        let mut nested = 0;
        loop {
            let line = self.peek().pos.line;
            let kind = if self.eat_punct(Punct::Dot) {
                ExprKind::Member {
                    object: Box::new(expr),
                    property: self.expect_property_name()?,
                }
            } else if self.eat_punct(Punct::LBracket) {
                let index = self.expression()?;
                self.expect_punct(Punct::RBracket)?;
                ExprKind::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                }
            } else if self.check_punct(Punct::LParen) {
                let args = self.elements(Punct::LParen, Punct::RParen)?;
                ExprKind::Call {
                    callee: Box::new(expr),
                    args,
                }
            } else {
                break;
            };
            self.enter()?;
            nested += 1;
            expr = Expr { kind, line };
        }
        self.leave(nested);
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, SandboxError> {
        let token = self.peek().clone();
        let line = token.pos.line;
        let kind = match token.kind {
            TokenKind::Number(n) => {
                self.advance();
                ExprKind::Number(n)
            }
            TokenKind::Str(s) => {
                self.advance();
                ExprKind::Str(Rc::from(s))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                ExprKind::Bool(true)
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                ExprKind::Bool(false)
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                ExprKind::Null
            }
            TokenKind::Keyword(Keyword::Undefined) => {
                self.advance();
                ExprKind::Undefined
            }
            TokenKind::Keyword(Keyword::New) => {
                // `new Error(msg)` is treated as a plain call.
                self.advance();
                return self.postfix();
            }
            TokenKind::Keyword(Keyword::Function) => {
                return Err(self.error(
                    "function declarations are not supported; use arrow functions",
                ));
            }
            TokenKind::Ident(name) => {
                if matches!(
                    self.token_at(self.pos + 1).kind,
                    TokenKind::Punct(Punct::Arrow)
                ) {
                    self.advance();
                    self.advance();
                    return self.arrow_body(vec![name], line);
                }
                self.advance();
                ExprKind::Ident(name)
            }
            TokenKind::Punct(Punct::LParen) => {
                if self.is_arrow_params() {
                    return self.arrow(line);
                }
                self.advance();
                let inner = self.expression()?;
                self.expect_punct(Punct::RParen)?;
                return Ok(inner);
            }
            TokenKind::Punct(Punct::LBracket) => {
                ExprKind::Array(self.elements(Punct::LBracket, Punct::RBracket)?)
            }
            TokenKind::Punct(Punct::LBrace) => ExprKind::Object(self.object_literal()?),
            _ => return Err(self.unexpected()),
        };
        Ok(Expr { kind, line })
    }

    /// Comma-separated expressions between `open` and `close`, allowing a
    /// trailing comma.
    fn elements(&mut self, open: Punct, close: Punct) -> Result<Vec<Expr>, SandboxError> {
        self.expect_punct(open)?;
        let mut items = Vec::new();
        while !self.check_punct(close) {
            items.push(self.expression()?);
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(close)?;
        Ok(items)
    }

    fn object_literal(&mut self) -> Result<Vec<(String, Expr)>, SandboxError> {
        self.expect_punct(Punct::LBrace)?;
        let mut properties = Vec::new();
        while !self.check_punct(Punct::RBrace) {
            let token = self.peek().clone();
            let key = match &token.kind {
                TokenKind::Str(s) => {
                    self.advance();
                    s.clone()
                }
                TokenKind::Number(n) => {
                    self.advance();
                    crate::utils::format_number(*n)
                }
                _ => self.expect_property_name()?,
            };
            let value = if self.eat_punct(Punct::Colon) {
                self.expression()?
            } else if matches!(token.kind, TokenKind::Ident(_)) {
                Expr {
                    kind: ExprKind::Ident(key.clone()),
                    line: token.pos.line,
                }
            } else {
                return Err(self.error(format!(
                    "Expected ':' but found {}",
                    self.peek_kind().describe()
                )));
            };
            properties.push((key, value));
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::RBrace)?;
        Ok(properties)
    }

    /// Whether the parenthesised group at the cursor is followed by `=>`.
    fn is_arrow_params(&self) -> bool {
        let mut depth = 0usize;
        let mut index = self.pos;
        loop {
            match &self.token_at(index).kind {
                TokenKind::Punct(Punct::LParen) => depth += 1,
                TokenKind::Punct(Punct::RParen) => {
                    depth -= 1;
                    if depth == 0 {
                        return matches!(
                            self.token_at(index + 1).kind,
                            TokenKind::Punct(Punct::Arrow)
                        );
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
            index += 1;
        }
    }

    fn arrow(&mut self, line: usize) -> Result<Expr, SandboxError> {
        self.expect_punct(Punct::LParen)?;
        let mut params = Vec::new();
        while !self.check_punct(Punct::RParen) {
            match self.peek_kind().clone() {
                TokenKind::Ident(name) => {
                    if params.contains(&name) {
                        return Err(self.error(format!("Duplicate parameter name '{name}'")));
                    }
                    self.advance();
                    params.push(name);
                }
                _ => return Err(self.error("Arrow function parameters must be plain names")),
            }
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        self.expect_punct(Punct::RParen)?;
        self.expect_punct(Punct::Arrow)?;
        self.arrow_body(params, line)
    }

    fn arrow_body(&mut self, params: Vec<String>, line: usize) -> Result<Expr, SandboxError> {
        let body = if self.check_punct(Punct::LBrace) {
            self.enter()?;
            let block = self.block()?;
            self.leave(1);
            FunctionBody::Block(block)
        } else {
            FunctionBody::Expr(self.expression()?)
        };
        Ok(Expr {
            kind: ExprKind::Arrow(Rc::new(FunctionDef { params, body })),
            line,
        })
    }
}

fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
    Expr {
        line: left.line,
        kind: ExprKind::Logical {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_expr(source: &str) -> ExprKind {
        let program = parse(source).unwrap();
        match program.body.into_iter().next().map(|s| s.kind) {
            Some(StmtKind::Expr(expr)) => expr.kind,
            other => panic!("expected an expression statement, got {other:?}"),
        }
    }

    #[test]
    fn test_precedence() {
        let ExprKind::Binary { op, right, .. } = single_expr("1 + 2 * 3") else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(
            right.kind,
            ExprKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn test_arrow_forms() {
        assert!(matches!(single_expr("x => x + 1"), ExprKind::Arrow(_)));
        assert!(matches!(single_expr("(a, b) => { return a; }"), ExprKind::Arrow(_)));
        assert!(matches!(single_expr("() => 1"), ExprKind::Arrow(_)));
        // A parenthesised expression is not an arrow.
        assert!(matches!(single_expr("(1 + 2)"), ExprKind::Binary { .. }));
    }

    #[test]
    fn test_call_with_arrow_argument() {
        let ExprKind::Call { callee, args } = single_expr("filter(r => r.age > 30)") else {
            panic!("expected call");
        };
        assert_eq!(callee.kind, ExprKind::Ident("filter".to_string()));
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn test_statements() {
        let program = parse(
            "let total = 0\nfor (const row of data) {\n  if (row.x) total += row.x; else total -= 1\n}\nreturn total",
        )
        .unwrap();
        assert_eq!(program.body.len(), 3);
        assert!(matches!(program.body[1].kind, StmtKind::ForOf { .. }));
        assert_eq!(program.body[2].line, 5);
    }

    #[test]
    fn test_object_literal() {
        let ExprKind::Object(props) = single_expr("({ a: 1, 'b c': 2, d, 7: null })") else {
            panic!("expected object");
        };
        let keys: Vec<&str> = props.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b c", "d", "7"]);
        assert_eq!(props[2].1.kind, ExprKind::Ident("d".to_string()));
    }

    #[test]
    fn test_return_on_next_line_has_no_value() {
        let program = parse("return\n42").unwrap();
        assert_eq!(program.body[0].kind, StmtKind::Return(None));
    }

    #[test]
    fn test_syntax_errors() {
        for source in [
            "let = 1",
            "const x",
            "filter(r => ",
            "a b",
            "row.price = 3",
            "function f() { return 1 }",
            "for (let i = 0; i < 3; i++) {}",
            "{",
            "[...data]",
        ] {
            assert!(
                matches!(parse(source), Err(SandboxError::Syntax { .. })),
                "expected syntax error for {source:?}"
            );
        }
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(500), ")".repeat(500));
        assert!(matches!(parse(&deep), Err(SandboxError::Syntax { .. })));
        let long_chain = vec!["1"; 1000].join(" + ");
        assert!(matches!(parse(&long_chain), Err(SandboxError::Syntax { .. })));
    }
}
