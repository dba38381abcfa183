use crate::character::Character;
use crate::scope::Scope;
use log::warn;
use thiserror::Error;

/// Evaluates a prerequisite expression against a character snapshot.
///
/// An empty or whitespace expression is no prerequisite at all and passes.
/// Everything else fails closed: lex, parse, type, arity, and
/// unknown-identifier errors all return `false` (with a warning) rather
/// than propagating.
pub fn evaluate_prerequisite(expr: &str, character: &Character) -> bool {
    if expr.trim().is_empty() {
        return true;
    }
    let scope = Scope::build(character);
    match evaluate(expr, &scope) {
        Ok(Operand::Num(n)) => n != 0.0,
        Ok(Operand::Str(_)) => {
            warn!("Prerequisite {expr:?} evaluated to a string, treating as unmet");
            false
        }
        Err(err) => {
            warn!("Prerequisite evaluation error for {expr:?}: {err}");
            false
        }
    }
}

fn evaluate(expr: &str, scope: &Scope) -> Result<Operand, ExprError> {
    let tokens = lex(expr)?;
    let mut parser = Parser { tokens, pos: 0 };
    let ast = parser.expression()?;
    parser.expect_end()?;
    eval(&ast, scope)
}

#[derive(Debug, Error)]
enum ExprError {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),

    #[error("single '=' is not a comparison; use '=='")]
    Assignment,

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unexpected token {0}")]
    UnexpectedToken(String),

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("{0} expects {1} argument(s)")]
    Arity(&'static str, usize),

    #[error("type error: {0}")]
    Type(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    Comma,
    Bang,
    Plus,
    Minus,
    Star,
    Slash,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    NotEq,
    And,
    Or,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Num(n) => format!("number {n}"),
            Token::Str(s) => format!("string {s:?}"),
            Token::Ident(name) => format!("identifier '{name}'"),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Bang => "'!'".to_string(),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::Lt => "'<'".to_string(),
            Token::Le => "'<='".to_string(),
            Token::Gt => "'>'".to_string(),
            Token::Ge => "'>='".to_string(),
            Token::EqEq => "'=='".to_string(),
            Token::NotEq => "'!='".to_string(),
            Token::And => "'&&'".to_string(),
            Token::Or => "'||'".to_string(),
        }
    }
}

fn lex(expr: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::EqEq);
                } else {
                    return Err(ExprError::Assignment);
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::NotEq);
                } else {
                    tokens.push(Token::Bang);
                }
            }
            '&' => {
                chars.next();
                if chars.peek() == Some(&'&') {
                    chars.next();
                    tokens.push(Token::And);
                } else {
                    return Err(ExprError::UnexpectedChar('&'));
                }
            }
            '|' => {
                chars.next();
                if chars.peek() == Some(&'|') {
                    chars.next();
                    tokens.push(Token::Or);
                } else {
                    return Err(ExprError::UnexpectedChar('|'));
                }
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut literal = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => break,
                        Some(ch) => literal.push(ch),
                        None => return Err(ExprError::UnterminatedString),
                    }
                }
                tokens.push(Token::Str(literal));
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                let mut seen_dot = false;
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_digit() {
                        literal.push(ch);
                        chars.next();
                    } else if ch == '.' && !seen_dot {
                        seen_dot = true;
                        literal.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value: f64 = literal
                    .parse()
                    .map_err(|_| ExprError::UnexpectedChar('.'))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        name.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(name));
            }
            other => return Err(ExprError::UnexpectedChar(other)),
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone)]
enum Ast {
    Num(f64),
    Str(String),
    Var(String),
    Call { name: String, args: Vec<Ast> },
    Not(Box<Ast>),
    Neg(Box<Ast>),
    Binary { op: BinOp, left: Box<Ast>, right: Box<Ast> },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Mul,
    Div,
    Add,
    Sub,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), ExprError> {
        match self.next() {
            Some(found) if found == token => Ok(()),
            Some(found) => Err(ExprError::UnexpectedToken(found.describe())),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn expect_end(&mut self) -> Result<(), ExprError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(ExprError::UnexpectedToken(token.describe())),
        }
    }

    fn expression(&mut self) -> Result<Ast, ExprError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Ast, ExprError> {
        let mut left = self.and_expr()?;
        while self.eat(&Token::Or) {
            let right = self.and_expr()?;
            left = Ast::Binary {
                op: BinOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Ast, ExprError> {
        let mut left = self.equality()?;
        while self.eat(&Token::And) {
            let right = self.equality()?;
            left = Ast::Binary {
                op: BinOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Ast, ExprError> {
        let mut left = self.comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinOp::Eq,
                Some(Token::NotEq) => BinOp::Ne,
                _ => break,
            };
            self.pos += 1;
            let right = self.comparison()?;
            left = Ast::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Ast, ExprError> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinOp::Lt,
                Some(Token::Le) => BinOp::Le,
                Some(Token::Gt) => BinOp::Gt,
                Some(Token::Ge) => BinOp::Ge,
                _ => break,
            };
            self.pos += 1;
            let right = self.additive()?;
            left = Ast::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Ast, ExprError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = Ast::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Ast, ExprError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Ast::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Ast, ExprError> {
        if self.eat(&Token::Bang) {
            return Ok(Ast::Not(Box::new(self.unary()?)));
        }
        if self.eat(&Token::Minus) {
            return Ok(Ast::Neg(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Ast, ExprError> {
        match self.next() {
            Some(Token::Num(n)) => Ok(Ast::Num(n)),
            Some(Token::Str(s)) => Ok(Ast::Str(s)),
            Some(Token::Ident(name)) => {
                if self.eat(&Token::LParen) {
                    let mut args = Vec::new();
                    if !self.eat(&Token::RParen) {
                        loop {
                            args.push(self.expression()?);
                            if self.eat(&Token::Comma) {
                                continue;
                            }
                            self.expect(Token::RParen)?;
                            break;
                        }
                    }
                    Ok(Ast::Call { name, args })
                } else {
                    Ok(Ast::Var(name))
                }
            }
            Some(Token::LParen) => {
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(token) => Err(ExprError::UnexpectedToken(token.describe())),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Num(f64),
    Str(String),
}

impl Operand {
    fn num(self, context: &'static str) -> Result<f64, ExprError> {
        match self {
            Operand::Num(n) => Ok(n),
            Operand::Str(_) => Err(ExprError::Type(context)),
        }
    }
}

fn bool_num(value: bool) -> Operand {
    Operand::Num(if value { 1.0 } else { 0.0 })
}

fn eval(ast: &Ast, scope: &Scope) -> Result<Operand, ExprError> {
    match ast {
        Ast::Num(n) => Ok(Operand::Num(*n)),
        Ast::Str(s) => Ok(Operand::Str(s.clone())),
        Ast::Var(name) => {
            if name == "splat" {
                return Ok(Operand::Str(scope.splat().to_string()));
            }
            scope
                .value(name)
                .map(Operand::Num)
                .ok_or_else(|| ExprError::UnknownIdentifier(name.clone()))
        }
        Ast::Call { name, args } => call(name, args, scope),
        Ast::Not(operand) => {
            let n = eval(operand, scope)?.num("'!' needs a numeric operand")?;
            Ok(bool_num(n == 0.0))
        }
        Ast::Neg(operand) => {
            let n = eval(operand, scope)?.num("'-' needs a numeric operand")?;
            Ok(Operand::Num(-n))
        }
        Ast::Binary { op, left, right } => binary(*op, left, right, scope),
    }
}

fn call(name: &str, args: &[Ast], scope: &Scope) -> Result<Operand, ExprError> {
    match name {
        "merit" => {
            if args.len() != 1 {
                return Err(ExprError::Arity("merit", 1));
            }
            match eval(&args[0], scope)? {
                Operand::Str(merit_name) => Ok(Operand::Num(scope.merit(&merit_name))),
                Operand::Num(_) => Err(ExprError::Type("merit() takes a name string")),
            }
        }
        "has_specialty" => {
            if args.len() != 2 {
                return Err(ExprError::Arity("has_specialty", 2));
            }
            match (eval(&args[0], scope)?, eval(&args[1], scope)?) {
                (Operand::Str(skill), Operand::Str(text)) => {
                    Ok(bool_num(scope.has_specialty(&skill, &text)))
                }
                _ => Err(ExprError::Type("has_specialty() takes two strings")),
            }
        }
        _ => Err(ExprError::UnknownFunction(name.to_string())),
    }
}

fn binary(op: BinOp, left: &Ast, right: &Ast, scope: &Scope) -> Result<Operand, ExprError> {
    // Logical operators short-circuit; everything else is strict.
    if op == BinOp::And {
        let l = eval(left, scope)?.num("'&&' needs numeric operands")?;
        if l == 0.0 {
            return Ok(bool_num(false));
        }
        let r = eval(right, scope)?.num("'&&' needs numeric operands")?;
        return Ok(bool_num(r != 0.0));
    }
    if op == BinOp::Or {
        let l = eval(left, scope)?.num("'||' needs numeric operands")?;
        if l != 0.0 {
            return Ok(bool_num(true));
        }
        let r = eval(right, scope)?.num("'||' needs numeric operands")?;
        return Ok(bool_num(r != 0.0));
    }

    let l = eval(left, scope)?;
    let r = eval(right, scope)?;

    if matches!(op, BinOp::Eq | BinOp::Ne) {
        // Strict equality: mixed types are simply unequal.
        let equal = match (&l, &r) {
            (Operand::Num(a), Operand::Num(b)) => a == b,
            (Operand::Str(a), Operand::Str(b)) => a == b,
            _ => false,
        };
        return Ok(bool_num(if op == BinOp::Eq { equal } else { !equal }));
    }

    let a = l.num("arithmetic and comparison need numeric operands")?;
    let b = r.num("arithmetic and comparison need numeric operands")?;
    let result = match op {
        BinOp::Mul => Operand::Num(a * b),
        BinOp::Div => Operand::Num(a / b),
        BinOp::Add => Operand::Num(a + b),
        BinOp::Sub => Operand::Num(a - b),
        BinOp::Lt => bool_num(a < b),
        BinOp::Le => bool_num(a <= b),
        BinOp::Gt => bool_num(a > b),
        BinOp::Ge => bool_num(a >= b),
        BinOp::Eq | BinOp::Ne | BinOp::And | BinOp::Or => unreachable!("handled above"),
    };
    Ok(result)
}
