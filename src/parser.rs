use std::collections::BTreeSet;

use tracing::debug;

use crate::ast::{
    Accessor, AssignOperator, BinaryOperator, CastType, ConditionalBranch, Declarator,
    Expression, ExpressionKind, GroupMember, MatchCase, Parameter, Place, Program, Statement,
    StatementKind, UnaryOperator, UpdateOperator,
};
use crate::builtins::BuiltinFunction;
use crate::lexer::Lexed;
use crate::token::{Span, Token, TokenKind};

pub mod error;

pub use error::{ExpectedCategories, ParseResult, SyntaxError};

/// Program recovered from the token stream plus every syntax error met on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub program: Program,
    pub errors: Vec<SyntaxError>,
}

const STATEMENT_STARTS: [TokenKind; 17] = [
    TokenKind::Var,
    TokenKind::Fixed,
    TokenKind::Group,
    TokenKind::Func,
    TokenKind::Show,
    TokenKind::Throw,
    TokenKind::Exit,
    TokenKind::Next,
    TokenKind::Checkif,
    TokenKind::Match,
    TokenKind::Each,
    TokenKind::Repeat,
    TokenKind::Do,
    TokenKind::Identifier,
    TokenKind::Builtin,
    TokenKind::Get,
    TokenKind::EOF,
];

/// Deepest statement and expression nesting accepted, so later stages recurse boundedly.
pub const MAX_NESTING: usize = 100;

const ASSIGN_OPERATORS: [(TokenKind, AssignOperator); 6] = [
    (TokenKind::Assign, AssignOperator::Set),
    (TokenKind::PlusEqual, AssignOperator::Add),
    (TokenKind::MinusEqual, AssignOperator::Sub),
    (TokenKind::StarEqual, AssignOperator::Mul),
    (TokenKind::SlashEqual, AssignOperator::Div),
    (TokenKind::PercentEqual, AssignOperator::Mod),
];

pub struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    position: usize,
    /// Token kinds tested at the current position since the last advance.
    expected: BTreeSet<TokenKind>,
    /// Opening brackets not yet closed.
    delimiters: Vec<TokenKind>,
    /// Statements and expressions currently being parsed inside one another.
    nesting: usize,
    errors: Vec<SyntaxError>,
}

impl<'a> Parser<'a> {
    /// `tokens` must not contain trivia. A trailing EOF is added when missing.
    pub fn new(mut tokens: Vec<Token<'a>>) -> Self {
        if tokens.last().map(|token| token.kind) != Some(TokenKind::EOF) {
            let end = tokens.last().map(|token| token.span).unwrap_or_default();
            tokens.push(Token::new(
                TokenKind::EOF,
                "",
                Span {
                    start: end.end,
                    end: end.end,
                    line: end.line.max(1),
                    column: end.column + (end.end - end.start),
                },
            ));
        }
        Self {
            tokens,
            position: 0,
            expected: BTreeSet::new(),
            delimiters: Vec::new(),
            nesting: 0,
            errors: Vec::new(),
        }
    }

    pub fn parse_program(mut self) -> Parsed {
        let mut statements = Vec::new();
        while !self.at(TokenKind::EOF) {
            if let Some(statement) = self.parse_statement_recovering() {
                statements.push(statement);
            }
        }
        debug!(
            statements = statements.len(),
            errors = self.errors.len(),
            "parsed program"
        );
        Parsed {
            program: Program { statements },
            errors: self.errors,
        }
    }

    /// Parses one statement. On failure the error is recorded and the parser skips to the
    /// next statement boundary.
    fn parse_statement_recovering(&mut self) -> Option<Statement> {
        let start = self.position;
        let depth = self.delimiters.len();
        let error = match self.nested(Self::parse_statement) {
            Ok(statement) => return Some(statement),
            Err(error) => error,
        };
        if error.too_deep {
            let open = self.delimiters.len().saturating_sub(depth);
            self.skip_statement(open);
        } else {
            self.synchronize(depth);
        }
        self.errors.push(error);
        if self.position == start && !self.at(TokenKind::EOF) {
            self.advance();
        }
        self.delimiters.truncate(depth);
        None
    }

    fn synchronize(&mut self, depth: usize) {
        self.delimiters.truncate(depth);
        loop {
            match self.current().kind {
                TokenKind::EOF | TokenKind::RBrace => return,
                TokenKind::Semicolon => {
                    self.advance();
                    return;
                }
                TokenKind::LBrace => {
                    self.skip_balanced_braces();
                    return;
                }
                kind if kind != TokenKind::Identifier
                    && kind != TokenKind::Builtin
                    && kind != TokenKind::Get
                    && STATEMENT_STARTS.contains(&kind) =>
                {
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Skips the rest of an over-nested statement, `open` brackets deep, through its `;` or
    /// through the brace that closes its block.
    fn skip_statement(&mut self, open: usize) {
        let mut balance = open as isize;
        loop {
            match self.current().kind {
                TokenKind::EOF => return,
                TokenKind::Semicolon if balance <= 0 => {
                    self.advance();
                    return;
                }
                TokenKind::RBrace if balance <= 0 => return,
                TokenKind::RBrace => {
                    balance -= 1;
                    self.advance();
                    if balance == 0 {
                        self.eat(TokenKind::Semicolon);
                        return;
                    }
                    continue;
                }
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => balance += 1,
                TokenKind::RParen | TokenKind::RBracket => balance -= 1,
                _ => {}
            }
            self.advance();
        }
    }

    fn skip_balanced_braces(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.current().kind {
                TokenKind::EOF => return,
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        return;
                    }
                }
                _ => {}
            }
            self.advance();
        }
    }

    /// Statements up to (not including) a token for which `stop` holds.
    fn parse_statements_until(&mut self, stop: impl Fn(&mut Self) -> bool) -> Vec<Statement> {
        let mut statements = Vec::new();
        while !stop(self) && !self.at(TokenKind::EOF) {
            if let Some(statement) = self.parse_statement_recovering() {
                statements.push(statement);
            }
        }
        statements
    }

    fn parse_block(&mut self) -> ParseResult<Vec<Statement>> {
        self.expect(TokenKind::LBrace)?;
        let body = self.parse_statements_until(|parser| parser.at(TokenKind::RBrace));
        self.expect(TokenKind::RBrace)?;
        Ok(body)
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        let start = self.current().span;
        let kind = match self.current().kind {
            TokenKind::Var => {
                self.advance();
                let declarators = self.parse_declarators(false)?;
                self.expect(TokenKind::Semicolon)?;
                StatementKind::Var(declarators)
            }
            TokenKind::Fixed => {
                self.advance();
                let declarators = self.parse_declarators(true)?;
                self.expect(TokenKind::Semicolon)?;
                StatementKind::Fixed(declarators)
            }
            TokenKind::Group => self.parse_group_declaration()?,
            TokenKind::Func => self.parse_function()?,
            TokenKind::Show => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let value = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                self.expect(TokenKind::Semicolon)?;
                StatementKind::Show(value)
            }
            TokenKind::Throw => {
                self.advance();
                let value = if self.at(TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.expect(TokenKind::Semicolon)?;
                StatementKind::Throw(value)
            }
            TokenKind::Exit => {
                self.advance();
                self.expect(TokenKind::Semicolon)?;
                StatementKind::Exit
            }
            TokenKind::Next => {
                self.advance();
                self.expect(TokenKind::Semicolon)?;
                StatementKind::Next
            }
            TokenKind::Checkif => self.parse_checkif()?,
            TokenKind::Match => self.parse_match()?,
            TokenKind::Each => self.parse_each()?,
            TokenKind::Repeat => {
                self.advance();
                let condition = self.parse_parenthesized()?;
                let body = self.parse_block()?;
                StatementKind::Repeat { condition, body }
            }
            TokenKind::Do => {
                self.advance();
                let body = self.parse_block()?;
                self.expect(TokenKind::Repeat)?;
                let condition = self.parse_parenthesized()?;
                self.expect(TokenKind::Semicolon)?;
                StatementKind::DoRepeat { body, condition }
            }
            TokenKind::Identifier => {
                let kind = self.parse_simple_statement()?;
                self.expect(TokenKind::Semicolon)?;
                kind
            }
            TokenKind::Builtin | TokenKind::Get => {
                let expression = self.parse_expression()?;
                self.expect(TokenKind::Semicolon)?;
                StatementKind::Expression(expression)
            }
            _ => {
                for kind in STATEMENT_STARTS {
                    self.at(kind);
                }
                return Err(self.error());
            }
        };
        Ok(Statement::new(kind, start.to(self.previous_span())))
    }

    fn parse_declarators(&mut self, require_value: bool) -> ParseResult<Vec<Declarator>> {
        let mut declarators = Vec::new();
        loop {
            let name = self.expect(TokenKind::Identifier)?;
            let value = if require_value {
                self.expect(TokenKind::Assign)?;
                Some(self.parse_expression()?)
            } else if self.eat(TokenKind::Assign) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            declarators.push(Declarator {
                name: name.lexeme.to_string(),
                span: name.span,
                value,
            });
            if !self.eat(TokenKind::Comma) {
                return Ok(declarators);
            }
        }
    }

    fn parse_group_declaration(&mut self) -> ParseResult<StatementKind> {
        self.expect(TokenKind::Group)?;
        let name = self.expect(TokenKind::Identifier)?;
        self.expect(TokenKind::LBrace)?;
        let members = self.parse_group_members()?;
        self.eat(TokenKind::Semicolon);
        Ok(StatementKind::Group {
            name: name.lexeme.to_string(),
            name_span: name.span,
            members,
        })
    }

    /// Members after an opening brace, through the closing brace.
    fn parse_group_members(&mut self) -> ParseResult<Vec<GroupMember>> {
        let mut members = Vec::new();
        while !self.eat(TokenKind::RBrace) {
            let key = self.parse_expression()?;
            self.expect(TokenKind::Colon)?;
            let value = self.parse_expression()?;
            members.push(GroupMember { key, value });
            if !self.eat(TokenKind::Comma) {
                self.expect(TokenKind::RBrace)?;
                break;
            }
        }
        Ok(members)
    }

    fn parse_function(&mut self) -> ParseResult<StatementKind> {
        self.expect(TokenKind::Func)?;
        let name = self.expect(TokenKind::Identifier)?;
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.eat(TokenKind::RParen) {
            loop {
                let param = self.expect(TokenKind::Identifier)?;
                params.push(Parameter {
                    name: param.lexeme.to_string(),
                    span: param.span,
                });
                if !self.eat(TokenKind::Comma) {
                    self.expect(TokenKind::RParen)?;
                    break;
                }
            }
        }
        let body = self.parse_block()?;
        Ok(StatementKind::Function {
            name: name.lexeme.to_string(),
            name_span: name.span,
            params,
            body,
        })
    }

    fn parse_checkif(&mut self) -> ParseResult<StatementKind> {
        self.expect(TokenKind::Checkif)?;
        let mut branches = Vec::new();
        loop {
            let condition = self.parse_parenthesized()?;
            let body = self.parse_block()?;
            branches.push(ConditionalBranch { condition, body });
            if !self.eat(TokenKind::Recheck) {
                break;
            }
        }
        let otherwise = if self.eat(TokenKind::Otherwise) {
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(StatementKind::Checkif {
            branches,
            otherwise,
        })
    }

    fn parse_match(&mut self) -> ParseResult<StatementKind> {
        self.expect(TokenKind::Match)?;
        let subject = self.parse_parenthesized()?;
        self.expect(TokenKind::LBrace)?;
        let mut cases = Vec::new();
        let mut default = None;
        let ends_case = |parser: &mut Self| {
            parser.at(TokenKind::Case) || parser.at(TokenKind::Default) || parser.at(TokenKind::RBrace)
        };
        loop {
            if default.is_none() && self.eat(TokenKind::Case) {
                let value = self.parse_expression()?;
                self.expect(TokenKind::Colon)?;
                let body = self.parse_statements_until(ends_case);
                cases.push(MatchCase { value, body });
            } else if default.is_none() && self.eat(TokenKind::Default) {
                self.expect(TokenKind::Colon)?;
                default = Some(self.parse_statements_until(ends_case));
            } else {
                self.expect(TokenKind::RBrace)?;
                break;
            }
        }
        Ok(StatementKind::Match {
            subject,
            cases,
            default,
        })
    }

    fn parse_each(&mut self) -> ParseResult<StatementKind> {
        self.expect(TokenKind::Each)?;
        self.expect(TokenKind::LParen)?;

        let init_start = self.current().span;
        let init_kind = if self.eat(TokenKind::Var) {
            let name = self.expect(TokenKind::Identifier)?;
            self.expect(TokenKind::Assign)?;
            let value = self.parse_expression()?;
            StatementKind::Var(vec![Declarator {
                name: name.lexeme.to_string(),
                span: name.span,
                value: Some(value),
            }])
        } else {
            let name = self.expect(TokenKind::Identifier)?;
            self.expect(TokenKind::Assign)?;
            let value = self.parse_expression()?;
            StatementKind::Assign {
                target: Place {
                    name: name.lexeme.to_string(),
                    span: name.span,
                    accessor: None,
                },
                op: AssignOperator::Set,
                value,
            }
        };
        let init = Statement::new(init_kind, init_start.to(self.previous_span()));
        self.expect(TokenKind::Semicolon)?;

        let condition = self.parse_expression()?;
        self.expect(TokenKind::Semicolon)?;

        let update_start = self.current().span;
        if !self.at(TokenKind::Identifier) {
            return Err(self.error());
        }
        let update_kind = self.parse_simple_statement()?;
        let update = Statement::new(update_kind, update_start.to(self.previous_span()));
        self.expect(TokenKind::RParen)?;

        let body = self.parse_block()?;
        Ok(StatementKind::Each {
            init: Box::new(init),
            condition,
            update: Box::new(update),
            body,
        })
    }

    /// Assignment, compound assignment, `++`/`--` or a call, without the trailing `;`.
    fn parse_simple_statement(&mut self) -> ParseResult<StatementKind> {
        let name = self.expect(TokenKind::Identifier)?;
        if self.eat(TokenKind::LParen) {
            let args = self.parse_arguments()?;
            let span = name.span.to(self.previous_span());
            return Ok(StatementKind::Expression(Expression::new(
                ExpressionKind::Call {
                    name: name.lexeme.to_string(),
                    name_span: name.span,
                    args,
                },
                span,
            )));
        }

        let accessor = if self.eat(TokenKind::LBracket) {
            let index = self.parse_expression()?;
            self.expect(TokenKind::RBracket)?;
            Some(Accessor::Index(index))
        } else if self.eat(TokenKind::LBrace) {
            let key = self.parse_expression()?;
            self.expect(TokenKind::RBrace)?;
            Some(Accessor::Key(key))
        } else {
            None
        };
        let target = Place {
            name: name.lexeme.to_string(),
            span: name.span,
            accessor,
        };

        if self.eat(TokenKind::PlusPlus) {
            return Ok(StatementKind::Update {
                target,
                op: UpdateOperator::Increment,
            });
        }
        if self.eat(TokenKind::MinusMinus) {
            return Ok(StatementKind::Update {
                target,
                op: UpdateOperator::Decrement,
            });
        }
        for (kind, op) in ASSIGN_OPERATORS {
            if self.eat(kind) {
                let value = self.parse_expression()?;
                return Ok(StatementKind::Assign { target, op, value });
            }
        }
        Err(self.error())
    }

    fn parse_parenthesized(&mut self) -> ParseResult<Expression> {
        self.expect(TokenKind::LParen)?;
        let expression = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        Ok(expression)
    }

    /// Arguments after an opening parenthesis, through the closing parenthesis.
    fn parse_arguments(&mut self) -> ParseResult<Vec<Expression>> {
        let mut args = Vec::new();
        if self.eat(TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            if !self.eat(TokenKind::Comma) {
                self.expect(TokenKind::RParen)?;
                return Ok(args);
            }
        }
    }

    pub fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.nested(Self::parse_or)
    }

    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        if self.nesting >= MAX_NESTING {
            return Err(SyntaxError::too_deep(self.current(), MAX_NESTING));
        }
        self.nesting += 1;
        let result = parse(self);
        self.nesting -= 1;
        result
    }

    /// Rejects trees grown past the limit by operator or accessor chains.
    fn within_height(&self, expression: Expression) -> ParseResult<Expression> {
        if expression.height() > MAX_NESTING {
            return Err(SyntaxError::too_deep(self.current(), MAX_NESTING));
        }
        Ok(expression)
    }

    fn parse_binary_level(
        &mut self,
        operators: &[(TokenKind, BinaryOperator)],
        next: fn(&mut Self) -> ParseResult<Expression>,
    ) -> ParseResult<Expression> {
        let mut expr = next(self)?;
        'outer: loop {
            for &(kind, op) in operators {
                if self.eat(kind) {
                    let right = next(self)?;
                    let span = expr.span.to(right.span);
                    expr = self.within_height(Expression::new(
                        ExpressionKind::Binary {
                            left: Box::new(expr),
                            op,
                            right: Box::new(right),
                        },
                        span,
                    ))?;
                    continue 'outer;
                }
            }
            return Ok(expr);
        }
    }

    fn parse_or(&mut self) -> ParseResult<Expression> {
        self.parse_binary_level(&[(TokenKind::OrOr, BinaryOperator::Or)], Self::parse_and)
    }

    fn parse_and(&mut self) -> ParseResult<Expression> {
        self.parse_binary_level(
            &[(TokenKind::AndAnd, BinaryOperator::And)],
            Self::parse_equality,
        )
    }

    fn parse_equality(&mut self) -> ParseResult<Expression> {
        self.parse_binary_level(
            &[
                (TokenKind::EqualEqual, BinaryOperator::Equal),
                (TokenKind::BangEqual, BinaryOperator::NotEqual),
            ],
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> ParseResult<Expression> {
        self.parse_binary_level(
            &[
                (TokenKind::Less, BinaryOperator::Less),
                (TokenKind::LessEqual, BinaryOperator::LessEqual),
                (TokenKind::Greater, BinaryOperator::Greater),
                (TokenKind::GreaterEqual, BinaryOperator::GreaterEqual),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> ParseResult<Expression> {
        self.parse_binary_level(
            &[
                (TokenKind::Plus, BinaryOperator::Add),
                (TokenKind::Minus, BinaryOperator::Sub),
            ],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expression> {
        self.parse_binary_level(
            &[
                (TokenKind::Star, BinaryOperator::Mul),
                (TokenKind::Slash, BinaryOperator::Div),
                (TokenKind::Percent, BinaryOperator::Mod),
            ],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> ParseResult<Expression> {
        let start = self.current().span;
        let op = if self.eat(TokenKind::Bang) {
            Some(UnaryOperator::Not)
        } else if self.eat(TokenKind::Minus) || self.eat(TokenKind::Tilde) {
            Some(UnaryOperator::Negate)
        } else {
            None
        };
        match op {
            Some(op) => {
                let operand = self.nested(Self::parse_unary)?;
                let span = start.to(operand.span);
                Ok(Expression::new(
                    ExpressionKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    span,
                ))
            }
            None => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_primary()?;
        loop {
            let accessible = matches!(
                expr.kind,
                ExpressionKind::Identifier(_)
                    | ExpressionKind::Index { .. }
                    | ExpressionKind::Member { .. }
                    | ExpressionKind::Call { .. }
                    | ExpressionKind::BuiltinCall { .. }
            );
            if !accessible {
                return Ok(expr);
            }
            if self.eat(TokenKind::LBracket) {
                let index = self.parse_expression()?;
                self.expect(TokenKind::RBracket)?;
                let span = expr.span.to(self.previous_span());
                expr = self.within_height(Expression::new(
                    ExpressionKind::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                ))?;
            } else if self.eat(TokenKind::LBrace) {
                let key = self.parse_expression()?;
                self.expect(TokenKind::RBrace)?;
                let span = expr.span.to(self.previous_span());
                expr = self.within_height(Expression::new(
                    ExpressionKind::Member {
                        target: Box::new(expr),
                        key: Box::new(key),
                    },
                    span,
                ))?;
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        let token = self.current().clone();
        let kind = match token.kind {
            TokenKind::IntegerLiteral => {
                self.advance();
                ExpressionKind::Integer(token.lexeme.parse().unwrap_or_default())
            }
            TokenKind::PointLiteral => {
                self.advance();
                ExpressionKind::Point(token.lexeme.parse().unwrap_or_default())
            }
            TokenKind::TextLiteral => {
                self.advance();
                ExpressionKind::Text(unescape_text(token.lexeme))
            }
            TokenKind::StateLiteral => {
                self.advance();
                ExpressionKind::State(token.lexeme == "YES")
            }
            TokenKind::Empty => {
                self.advance();
                ExpressionKind::Empty
            }
            TokenKind::Identifier => {
                self.advance();
                if self.eat(TokenKind::LParen) {
                    ExpressionKind::Call {
                        name: token.lexeme.to_string(),
                        name_span: token.span,
                        args: self.parse_arguments()?,
                    }
                } else {
                    ExpressionKind::Identifier(token.lexeme.to_string())
                }
            }
            TokenKind::Builtin => {
                self.advance();
                let function = BuiltinFunction::from_name(token.lexeme)
                    .ok_or_else(|| SyntaxError::at(&token, [TokenKind::Builtin], None))?;
                self.expect(TokenKind::LParen)?;
                ExpressionKind::BuiltinCall {
                    function,
                    args: self.parse_arguments()?,
                }
            }
            TokenKind::Get => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                let prompt = if self.eat(TokenKind::RParen) {
                    None
                } else {
                    let prompt = self.parse_expression()?;
                    self.expect(TokenKind::RParen)?;
                    Some(Box::new(prompt))
                };
                ExpressionKind::Input { prompt }
            }
            TokenKind::Integer | TokenKind::Point | TokenKind::State | TokenKind::Text => {
                self.advance();
                let target = match token.kind {
                    TokenKind::Integer => CastType::Integer,
                    TokenKind::Point => CastType::Point,
                    TokenKind::State => CastType::State,
                    _ => CastType::Text,
                };
                let value = self.parse_parenthesized()?;
                ExpressionKind::Cast {
                    target,
                    value: Box::new(value),
                }
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !self.eat(TokenKind::RBracket) {
                    items.push(self.parse_expression()?);
                    if !self.eat(TokenKind::Comma) {
                        self.expect(TokenKind::RBracket)?;
                        break;
                    }
                }
                ExpressionKind::List(items)
            }
            TokenKind::LBrace => {
                self.advance();
                ExpressionKind::Group(self.parse_group_members()?)
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                return Ok(Expression::new(inner.kind, token.span.to(self.previous_span())));
            }
            _ => {
                for kind in [
                    TokenKind::IntegerLiteral,
                    TokenKind::PointLiteral,
                    TokenKind::TextLiteral,
                    TokenKind::StateLiteral,
                    TokenKind::Empty,
                    TokenKind::Identifier,
                    TokenKind::Builtin,
                    TokenKind::Get,
                    TokenKind::Integer,
                    TokenKind::Point,
                    TokenKind::State,
                    TokenKind::Text,
                    TokenKind::LBracket,
                    TokenKind::LBrace,
                    TokenKind::LParen,
                ] {
                    self.at(kind);
                }
                return Err(self.error());
            }
        };
        Ok(Expression::new(kind, token.span.to(self.previous_span())))
    }

    fn current(&self) -> &Token<'a> {
        let last = self.tokens.len() - 1;
        &self.tokens[self.position.min(last)]
    }

    fn previous_span(&self) -> Span {
        match self.position.checked_sub(1) {
            Some(index) => self.tokens[index].span,
            None => self.current().span,
        }
    }

    /// Tests the current token, remembering `kind` as acceptable here.
    fn at(&mut self, kind: TokenKind) -> bool {
        self.expected.insert(kind);
        self.current().kind == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token<'a>> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.error())
        }
    }

    fn advance(&mut self) -> Token<'a> {
        let token = self.current().clone();
        if token.kind != TokenKind::EOF {
            self.position += 1;
        }
        match token.kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => {
                self.delimiters.push(token.kind)
            }
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                let opener = match token.kind {
                    TokenKind::RParen => TokenKind::LParen,
                    TokenKind::RBracket => TokenKind::LBracket,
                    _ => TokenKind::LBrace,
                };
                if self.delimiters.last() == Some(&opener) {
                    self.delimiters.pop();
                }
            }
            _ => {}
        }
        self.expected.clear();
        token
    }

    fn error(&self) -> SyntaxError {
        SyntaxError::at(
            self.current(),
            self.expected.iter().copied(),
            self.delimiters.last().copied(),
        )
    }
}

/// Decodes a text literal token up to its first unescaped closing quote, tolerating a
/// missing one.
pub fn unescape_text(lexeme: &str) -> String {
    let mut chars = lexeme.chars();
    let quote = chars.next();
    let mut text = String::with_capacity(lexeme.len());
    while let Some(ch) = chars.next() {
        if Some(ch) == quote {
            break;
        }
        if ch != '\\' {
            text.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => text.push('\n'),
            Some('t') => text.push('\t'),
            Some('r') => text.push('\r'),
            Some(other) => text.push(other),
            None => text.push('\\'),
        }
    }
    text
}

pub fn parse_tokens(tokens: Vec<Token<'_>>) -> Parsed {
    Parser::new(tokens).parse_program()
}

/// Parses the significant tokens of an already lexed source.
pub fn parse_lexed(lexed: &Lexed<'_>) -> Parsed {
    parse_tokens(lexed.significant())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;
    use indoc::indoc;

    fn parse(input: &str) -> Parsed {
        parse_lexed(&lexer::tokenize(input))
    }

    fn messages(parsed: &Parsed) -> Vec<String> {
        parsed.errors.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn parses_declaration_and_show() {
        let parsed = parse("var x = 1 + 2 * 3; show(x);");
        assert!(parsed.errors.is_empty(), "{:?}", messages(&parsed));
        let statements = &parsed.program.statements;
        assert_eq!(statements.len(), 2);

        let StatementKind::Var(declarators) = &statements[0].kind else {
            panic!("expected var declaration, got {:?}", statements[0].kind);
        };
        let value = declarators[0].value.as_ref().expect("initializer");
        let ExpressionKind::Binary { op, right, .. } = &value.kind else {
            panic!("expected binary expression");
        };
        assert_eq!(*op, BinaryOperator::Add);
        assert!(matches!(
            right.kind,
            ExpressionKind::Binary {
                op: BinaryOperator::Mul,
                ..
            }
        ));
        assert!(matches!(statements[1].kind, StatementKind::Show(_)));
    }

    #[test]
    fn parses_control_flow_constructs() {
        let input = indoc! {r#"
            func area(w, h) {
                throw w * h;
            }
            each(i = 0; i < 3; i++) {
                checkif(i == 1) { next; } recheck(i == 2) { exit; } otherwise { show(i); }
            }
            var n = 0;
            do { n += 2; } repeat(n < 10);
            repeat(n > 0) { n--; }
            match(n) {
                case 0: show("zero");
                case 1: show("one"); show("!");
                default: show("many");
            }
            group person { "name": "Ada", "age": 36 };
            person{"age"} = area(6, 7);
        "#};
        let parsed = parse(input);
        assert!(parsed.errors.is_empty(), "{:?}", messages(&parsed));
        let statements = &parsed.program.statements;
        assert_eq!(statements.len(), 8);
        assert!(matches!(
            &statements[0].kind,
            StatementKind::Function { params, .. } if params.len() == 2
        ));
        assert!(matches!(&statements[1].kind, StatementKind::Each { .. }));
        assert!(matches!(&statements[3].kind, StatementKind::DoRepeat { .. }));
        let StatementKind::Match { cases, default, .. } = &statements[5].kind else {
            panic!("expected match");
        };
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[1].body.len(), 2);
        assert!(default.is_some());
        assert!(matches!(
            &statements[7].kind,
            StatementKind::Assign {
                target: Place {
                    accessor: Some(Accessor::Key(_)),
                    ..
                },
                ..
            }
        ));
    }

    #[test]
    fn recovers_and_reports_each_statement_error() {
        let input = indoc! {"
            var = 5;
            show(1;
            var y = ;
            var ok = 2;
        "};
        let parsed = parse(input);
        assert_eq!(
            messages(&parsed),
            vec![
                "Syntax error at line 1, column 5: unexpected '='",
                "Syntax error at line 2, column 7: unexpected ';'",
                "Syntax error at line 3, column 9: unexpected ';'",
            ]
        );
        assert_eq!(parsed.program.statements.len(), 1);
    }

    #[test]
    fn categorizes_expected_tokens() {
        let parsed = parse("var x = ;");
        let error = &parsed.errors[0];
        let categories = error.categories();
        assert!(categories.literals.contains(&"integer literal".to_string()));
        assert!(categories.keywords.contains(&"get".to_string()));
        assert!(categories.keywords.contains(&"length".to_string()));
        assert!(categories.symbols.contains(&"(".to_string()));
        assert!(categories.others.contains(&"identifier".to_string()));
        assert!(!categories.symbols.contains(&")".to_string()));
    }

    #[test]
    fn reports_missing_closer_at_end_of_input() {
        let parsed = parse("checkif(YES) { show(1);");
        assert_eq!(
            messages(&parsed),
            vec!["Syntax error at line 1, column 24: missing '}'"]
        );
        assert!(parsed.errors[0].end_of_input);
    }

    #[test]
    fn reports_mismatched_closer() {
        let parsed = parse("show(length([1, 2)));");
        assert_eq!(parsed.errors.len(), 1);
        assert!(parsed.errors[0].message.ends_with("missing ']'"));
    }

    #[test]
    fn skips_unbalanced_block_after_bad_header() {
        let parsed = parse("repeat(x > ) { show(1); }\nshow(2);");
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.program.statements.len(), 1);
    }

    #[test]
    fn rejects_deeply_parenthesized_expression_once() {
        let input = format!("show({}1{});\nshow(2);", "(".repeat(10_000), ")".repeat(10_000));
        let parsed = parse(&input);
        assert_eq!(parsed.errors.len(), 1);
        assert!(parsed.errors[0].too_deep);
        assert!(parsed.errors[0].message.ends_with("nesting exceeds 100 levels"));
        assert_eq!(parsed.program.statements.len(), 1);
    }

    #[test]
    fn bounds_operator_chains_and_nested_blocks() {
        let chain = format!("show({}1);", "1 + ".repeat(5_000));
        let parsed = parse(&chain);
        assert_eq!(parsed.errors.len(), 1);
        assert!(parsed.errors[0].too_deep);

        let blocks = format!(
            "{}show(1);{}\nshow(2);",
            "checkif (YES) { ".repeat(200),
            "}".repeat(200)
        );
        let parsed = parse(&blocks);
        assert_eq!(parsed.errors.len(), 1);
        assert!(parsed.errors[0].too_deep);
        assert_eq!(parsed.program.statements.len(), 2);
    }

    #[test]
    fn accepts_nesting_below_the_limit() {
        let input = format!("show({}1{});", "(".repeat(50), ")".repeat(50));
        let parsed = parse(&input);
        assert!(parsed.errors.is_empty());
    }

    #[test]
    fn unescapes_text_literals() {
        assert_eq!(unescape_text(r#""a\nb\"c""#), "a\nb\"c");
        assert_eq!(unescape_text("'it\\'s'"), "it's");
        assert_eq!(unescape_text("\"open"), "open");
        assert_eq!(unescape_text(r#""a\\""#), "a\\");
        assert_eq!(unescape_text(r"'\\'"), "\\");
        assert_eq!(unescape_text(r#""C:\\""#), "C:\\");
    }
}
