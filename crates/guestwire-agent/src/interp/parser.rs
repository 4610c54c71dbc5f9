//! Recursive-descent parser for guest source.

use super::ast::{Const, Expr, FunctionDef, Handler, Param, Stmt, Target};
use super::lexer::{tokenize, Tok, Token};
use crate::error::{GuestError, Result};
use crate::ops::{BinOp, CmpOp};
use std::sync::Arc;

const KEYWORDS: &[&str] = &[
    "and", "as", "break", "class", "continue", "def", "del", "elif", "else", "except", "finally",
    "for", "from", "if", "import", "in", "is", "lambda", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield", "None", "True", "False",
];

/// Parse a sequence of statements.
pub fn parse_module(source: &str) -> Result<Vec<Stmt>> {
    let mut parser = Parser::new(source)?;
    let mut body = Vec::new();
    while !parser.at(&Tok::Eof) {
        if parser.at(&Tok::Indent) {
            return Err(parser.error("unexpected indent"));
        }
        body.push(parser.statement()?);
    }
    Ok(body)
}

/// Parse a single expression (a bare tuple is allowed).
pub fn parse_expression(source: &str) -> Result<Expr> {
    let mut parser = Parser::new(source.trim())?;
    let expr = parser.expr_list()?;
    parser.expect(&Tok::Newline)?;
    if !parser.at(&Tok::Eof) {
        return Err(parser.error("invalid syntax"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(source: &str) -> Result<Self> {
        Ok(Self {
            tokens: tokenize(source)?,
            pos: 0,
        })
    }

    fn peek(&self) -> &Tok {
        self.tokens
            .get(self.pos)
            .map(|t| &t.tok)
            .unwrap_or(&Tok::Eof)
    }

    fn peek_next(&self) -> &Tok {
        self.tokens
            .get(self.pos + 1)
            .map(|t| &t.tok)
            .unwrap_or(&Tok::Eof)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn error(&self, message: impl Into<String>) -> GuestError {
        GuestError::syntax_error(self.line(), message)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, tok: &Tok) -> bool {
        self.peek() == tok
    }

    fn at_op(&self, op: &str) -> bool {
        matches!(self.peek(), Tok::Op(o) if *o == op)
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Tok::Name(n) if n == kw)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.at_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.at_keyword(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok) -> Result<()> {
        if self.at(tok) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error("invalid syntax"))
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{op}'")))
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<()> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{kw}'")))
        }
    }

    fn identifier(&mut self) -> Result<String> {
        match self.peek() {
            Tok::Name(n) if !KEYWORDS.contains(&n.as_str()) => {
                let name = n.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error("expected a name")),
        }
    }

    fn dotted_name(&mut self) -> Result<String> {
        let mut name = self.identifier()?;
        while self.eat_op(".") {
            name.push('.');
            name.push_str(&self.identifier()?);
        }
        Ok(name)
    }

    // Statements

    fn statement(&mut self) -> Result<Stmt> {
        let keyword = match self.peek() {
            Tok::Name(n) => n.clone(),
            _ => return self.simple_line(),
        };
        match keyword.as_str() {
            "def" => self.function_def(),
            "if" => self.if_statement(),
            "for" => {
                self.pos += 1;
                let target = self.for_target()?;
                self.expect_keyword("in")?;
                let iter = self.expr_list()?;
                let body = self.block()?;
                Ok(Stmt::For { target, iter, body })
            }
            "while" => {
                self.pos += 1;
                let cond = self.expr()?;
                let body = self.block()?;
                Ok(Stmt::While { cond, body })
            }
            "with" => {
                self.pos += 1;
                let context = self.expr()?;
                let name = if self.eat_keyword("as") {
                    Some(self.identifier()?)
                } else {
                    None
                };
                let body = self.block()?;
                Ok(Stmt::With {
                    context,
                    name,
                    body,
                })
            }
            "try" => self.try_statement(),
            "class" | "lambda" | "yield" => {
                Err(self.error(format!("'{keyword}' is not supported")))
            }
            _ => self.simple_line(),
        }
    }

    /// One or more `;`-separated simple statements ending the line.
    fn simple_line(&mut self) -> Result<Stmt> {
        let first = self.simple_statement()?;
        if !self.at_op(";") {
            self.expect(&Tok::Newline)?;
            return Ok(first);
        }
        let mut stmts = vec![first];
        while self.eat_op(";") {
            if self.at(&Tok::Newline) {
                break;
            }
            stmts.push(self.simple_statement()?);
        }
        self.expect(&Tok::Newline)?;
        Ok(Stmt::Suite(stmts))
    }

    fn simple_statement(&mut self) -> Result<Stmt> {
        if let Tok::Name(n) = self.peek() {
            match n.as_str() {
                "pass" => {
                    self.pos += 1;
                    return Ok(Stmt::Pass);
                }
                "break" => {
                    self.pos += 1;
                    return Ok(Stmt::Break);
                }
                "continue" => {
                    self.pos += 1;
                    return Ok(Stmt::Continue);
                }
                "return" => {
                    self.pos += 1;
                    if self.at(&Tok::Newline) || self.at_op(";") {
                        return Ok(Stmt::Return(None));
                    }
                    return Ok(Stmt::Return(Some(self.expr_list()?)));
                }
                "del" => {
                    self.pos += 1;
                    let expr = self.expr()?;
                    return Ok(Stmt::Del(self.to_target(expr)?));
                }
                "raise" => {
                    self.pos += 1;
                    return self.raise_statement();
                }
                "import" => {
                    self.pos += 1;
                    let module = self.dotted_name()?;
                    let alias = if self.eat_keyword("as") {
                        Some(self.identifier()?)
                    } else {
                        None
                    };
                    return Ok(Stmt::Import { module, alias });
                }
                "from" => {
                    self.pos += 1;
                    let module = self.dotted_name()?;
                    self.expect_keyword("import")?;
                    let parens = self.eat_op("(");
                    let mut names = Vec::new();
                    loop {
                        let name = self.identifier()?;
                        let alias = if self.eat_keyword("as") {
                            Some(self.identifier()?)
                        } else {
                            None
                        };
                        names.push((name, alias));
                        if !self.eat_op(",") || (parens && self.at_op(")")) {
                            break;
                        }
                    }
                    if parens {
                        self.expect_op(")")?;
                    }
                    return Ok(Stmt::FromImport { module, names });
                }
                _ => {}
            }
        }

        let expr = self.expr_list()?;
        if self.eat_op("=") {
            let target = self.to_target(expr)?;
            let mut value = self.expr_list()?;
            // Chained assignment: a = b = value
            let mut targets = vec![target];
            while self.eat_op("=") {
                targets.push(self.to_target(value)?);
                value = self.expr_list()?;
            }
            if targets.len() == 1 {
                return Ok(Stmt::Assign(targets.remove(0), value));
            }
            let stmts = targets
                .into_iter()
                .map(|t| Stmt::Assign(t, value.clone()))
                .collect();
            return Ok(Stmt::Suite(stmts));
        }

        let aug = match self.peek() {
            Tok::Op("+=") => Some(BinOp::Add),
            Tok::Op("-=") => Some(BinOp::Sub),
            Tok::Op("*=") => Some(BinOp::Mul),
            Tok::Op("/=") => Some(BinOp::Div),
            Tok::Op("//=") => Some(BinOp::FloorDiv),
            _ => None,
        };
        if let Some(op) = aug {
            self.pos += 1;
            let target = self.to_target(expr)?;
            if matches!(target, Target::Unpack(_)) {
                return Err(self.error("illegal expression for augmented assignment"));
            }
            let value = self.expr_list()?;
            return Ok(Stmt::AugAssign(target, op, value));
        }

        Ok(Stmt::Expr(expr))
    }

    fn raise_statement(&mut self) -> Result<Stmt> {
        if self.at(&Tok::Newline) || self.at_op(";") {
            return Ok(Stmt::Raise(None));
        }
        let type_name = self.identifier()?;
        let message = if self.eat_op("(") {
            let message = if self.at_op(")") {
                None
            } else {
                Some(self.expr()?)
            };
            self.expect_op(")")?;
            message
        } else {
            None
        };
        Ok(Stmt::Raise(Some((type_name, message))))
    }

    fn to_target(&self, expr: Expr) -> Result<Target> {
        match expr {
            Expr::Name(name) => Ok(Target::Name(name)),
            Expr::Attr(obj, name) => Ok(Target::Attr(*obj, name)),
            Expr::Tuple(items) | Expr::List(items) => items
                .into_iter()
                .map(|item| match item {
                    Expr::Name(name) => Ok(name),
                    _ => Err(self.error("cannot assign to expression")),
                })
                .collect::<Result<Vec<_>>>()
                .map(Target::Unpack),
            _ => Err(self.error("cannot assign to expression")),
        }
    }

    fn for_target(&mut self) -> Result<Target> {
        let mut names = vec![self.identifier()?];
        while self.eat_op(",") {
            names.push(self.identifier()?);
        }
        if names.len() == 1 {
            Ok(Target::Name(names.remove(0)))
        } else {
            Ok(Target::Unpack(names))
        }
    }

    /// `:` followed by an indented block or statements on the same line.
    fn block(&mut self) -> Result<Vec<Stmt>> {
        self.expect_op(":")?;
        if !self.at(&Tok::Newline) {
            return Ok(vec![self.simple_line()?]);
        }
        self.pos += 1;
        if !self.at(&Tok::Indent) {
            return Err(self.error("expected an indented block"));
        }
        self.pos += 1;
        let mut body = Vec::new();
        while !self.at(&Tok::Dedent) && !self.at(&Tok::Eof) {
            body.push(self.statement()?);
        }
        self.eat_dedent();
        Ok(body)
    }

    fn eat_dedent(&mut self) {
        if self.at(&Tok::Dedent) {
            self.pos += 1;
        }
    }

    fn function_def(&mut self) -> Result<Stmt> {
        self.expect_keyword("def")?;
        let name = self.identifier()?;
        self.expect_op("(")?;
        let mut params: Vec<Param> = Vec::new();
        while !self.at_op(")") {
            let param = self.identifier()?;
            let default = if self.eat_op("=") {
                Some(self.expr()?)
            } else {
                None
            };
            if default.is_none() && params.iter().any(|p| p.default.is_some()) {
                return Err(self.error("non-default argument follows default argument"));
            }
            if params.iter().any(|p| p.name == param) {
                return Err(self.error(format!("duplicate argument '{param}'")));
            }
            params.push(Param {
                name: param,
                default,
            });
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        if self.eat_op("->") {
            self.expr()?;
        }
        let body = self.block()?;
        let doc = match body.first() {
            Some(Stmt::Expr(Expr::Const(Const::Str(doc)))) => Some(doc.clone()),
            _ => None,
        };
        Ok(Stmt::Def(Arc::new(FunctionDef {
            name,
            params,
            body,
            doc,
        })))
    }

    fn if_statement(&mut self) -> Result<Stmt> {
        self.expect_keyword("if")?;
        let cond = self.expr()?;
        let mut branches = vec![(cond, self.block()?)];
        let mut otherwise = Vec::new();
        loop {
            if self.eat_keyword("elif") {
                let cond = self.expr()?;
                branches.push((cond, self.block()?));
            } else if self.eat_keyword("else") {
                otherwise = self.block()?;
                break;
            } else {
                break;
            }
        }
        Ok(Stmt::If {
            branches,
            otherwise,
        })
    }

    fn try_statement(&mut self) -> Result<Stmt> {
        self.expect_keyword("try")?;
        let body = self.block()?;
        let mut handlers = Vec::new();
        while self.eat_keyword("except") {
            let mut types = Vec::new();
            if !self.at_op(":") {
                if self.eat_op("(") {
                    loop {
                        types.push(self.identifier()?);
                        if !self.eat_op(",") {
                            break;
                        }
                    }
                    self.expect_op(")")?;
                } else {
                    types.push(self.identifier()?);
                }
            }
            let name = if self.eat_keyword("as") {
                Some(self.identifier()?)
            } else {
                None
            };
            let body = self.block()?;
            handlers.push(Handler { types, name, body });
        }
        let finally = if self.eat_keyword("finally") {
            self.block()?
        } else {
            Vec::new()
        };
        if handlers.is_empty() && finally.is_empty() {
            return Err(self.error("expected 'except' or 'finally' block"));
        }
        Ok(Stmt::Try {
            body,
            handlers,
            finally,
        })
    }

    // Expressions

    /// Comma-separated expressions; more than one (or a trailing comma)
    /// makes a tuple.
    fn expr_list(&mut self) -> Result<Expr> {
        let first = self.expr()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.ends_expr_list() {
                break;
            }
            items.push(self.expr()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn ends_expr_list(&self) -> bool {
        matches!(self.peek(), Tok::Newline | Tok::Eof)
            || self.at_op("=")
            || self.at_op(")")
            || self.at_op(";")
            || self.at_op(":")
    }

    fn expr(&mut self) -> Result<Expr> {
        let value = self.or_expr()?;
        if self.eat_keyword("if") {
            let cond = self.or_expr()?;
            self.expect_keyword("else")?;
            let otherwise = self.expr()?;
            return Ok(Expr::IfElse {
                cond: Box::new(cond),
                then: Box::new(value),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(value)
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("or") {
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut left = self.not_expr()?;
        while self.eat_keyword("and") {
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr> {
        if self.eat_keyword("not") {
            return Ok(Expr::Not(Box::new(self.not_expr()?)));
        }
        self.comparison()
    }

    fn compare_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek() {
            Tok::Op("==") => CmpOp::Eq,
            Tok::Op("!=") => CmpOp::Ne,
            Tok::Op("<") => CmpOp::Lt,
            Tok::Op("<=") => CmpOp::Le,
            Tok::Op(">") => CmpOp::Gt,
            Tok::Op(">=") => CmpOp::Ge,
            Tok::Name(n) if n == "in" => CmpOp::In,
            Tok::Name(n) if n == "not" && matches!(self.peek_next(), Tok::Name(m) if m == "in") => {
                self.pos += 1;
                CmpOp::NotIn
            }
            Tok::Name(n) if n == "is" => {
                if matches!(self.peek_next(), Tok::Name(m) if m == "not") {
                    self.pos += 1;
                    CmpOp::IsNot
                } else {
                    CmpOp::Is
                }
            }
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    /// Chained comparisons `a < b < c` become `a < b and b < c`.
    fn comparison(&mut self) -> Result<Expr> {
        let first = self.arith()?;
        let mut left = first.clone();
        let mut result: Option<Expr> = None;
        while let Some(op) = self.compare_op() {
            let right = self.arith()?;
            let cmp = Expr::Compare(op, Box::new(left), Box::new(right.clone()));
            result = Some(match result {
                None => cmp,
                Some(prev) => Expr::And(Box::new(prev), Box::new(cmp)),
            });
            left = right;
        }
        Ok(result.unwrap_or(first))
    }

    fn arith(&mut self) -> Result<Expr> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Tok::Op("+") => BinOp::Add,
                Tok::Op("-") => BinOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn term(&mut self) -> Result<Expr> {
        let mut left = self.factor()?;
        loop {
            let op = match self.peek() {
                Tok::Op("*") => BinOp::Mul,
                Tok::Op("/") => BinOp::Div,
                Tok::Op("//") => BinOp::FloorDiv,
                Tok::Op("%") => BinOp::Mod,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.factor()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn factor(&mut self) -> Result<Expr> {
        if self.eat_op("-") {
            let operand = self.factor()?;
            return Ok(match operand {
                Expr::Const(Const::Int(n)) => Expr::Const(Const::Int(-n)),
                Expr::Const(Const::Float(f)) => Expr::Const(Const::Float(-f)),
                other => Expr::Neg(Box::new(other)),
            });
        }
        if self.eat_op("+") {
            return self.factor();
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.atom()?;
        loop {
            if self.eat_op(".") {
                let name = match self.advance() {
                    Tok::Name(n) => n,
                    _ => return Err(self.error("expected attribute name")),
                };
                expr = Expr::Attr(Box::new(expr), name);
            } else if self.eat_op("(") {
                let (args, kwargs) = self.arguments()?;
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                    kwargs,
                };
            } else if self.eat_op("[") {
                expr = self.subscript(expr)?;
            } else {
                return Ok(expr);
            }
        }
    }

    fn subscript(&mut self, target: Expr) -> Result<Expr> {
        let start = if self.at_op(":") {
            None
        } else {
            Some(self.expr()?)
        };
        if self.eat_op(":") {
            let stop = if self.at_op("]") {
                None
            } else {
                Some(Box::new(self.expr()?))
            };
            self.expect_op("]")?;
            return Ok(Expr::Slice {
                target: Box::new(target),
                start: start.map(Box::new),
                stop,
            });
        }
        self.expect_op("]")?;
        let index = start.ok_or_else(|| self.error("invalid syntax"))?;
        Ok(Expr::Index(Box::new(target), Box::new(index)))
    }

    fn arguments(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while !self.at_op(")") {
            let is_keyword = matches!(self.peek(), Tok::Name(_))
                && matches!(self.peek_next(), Tok::Op("="));
            if is_keyword {
                let name = self.identifier()?;
                self.pos += 1;
                if kwargs.iter().any(|(n, _)| *n == name) {
                    return Err(self.error(format!("keyword argument repeated: {name}")));
                }
                kwargs.push((name, self.expr()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.error("positional argument follows keyword argument"));
                }
                args.push(self.expr()?);
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        Ok((args, kwargs))
    }

    fn atom(&mut self) -> Result<Expr> {
        match self.advance() {
            Tok::Int(n) => Ok(Expr::Const(Const::Int(n))),
            Tok::Float(f) => Ok(Expr::Const(Const::Float(f))),
            Tok::Str(s) => Ok(Expr::Const(Const::Str(s))),
            Tok::Name(n) => match n.as_str() {
                "None" => Ok(Expr::Const(Const::None)),
                "True" => Ok(Expr::Const(Const::Bool(true))),
                "False" => Ok(Expr::Const(Const::Bool(false))),
                kw if KEYWORDS.contains(&kw) => Err(GuestError::syntax_error(
                    self.line(),
                    format!("unexpected keyword '{kw}'"),
                )),
                _ => Ok(Expr::Name(n)),
            },
            Tok::Op("(") => {
                if self.eat_op(")") {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                let inner = self.expr_list()?;
                self.expect_op(")")?;
                Ok(inner)
            }
            Tok::Op("[") => {
                let items = self.items("]")?;
                Ok(Expr::List(items))
            }
            Tok::Op("{") => self.brace(),
            Tok::Indent => Err(self.error("unexpected indent")),
            Tok::Newline | Tok::Eof => Err(self.error("unexpected end of input")),
            _ => Err(self.error("invalid syntax")),
        }
    }

    fn items(&mut self, close: &str) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.at_op(close) {
            items.push(self.expr()?);
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(close)?;
        Ok(items)
    }

    fn brace(&mut self) -> Result<Expr> {
        if self.eat_op("}") {
            return Ok(Expr::Dict(Vec::new()));
        }
        let first = self.expr()?;
        if !self.eat_op(":") {
            let mut items = vec![first];
            if self.eat_op(",") {
                items.extend(self.items("}")?);
            } else {
                self.expect_op("}")?;
            }
            return Ok(Expr::Set(items));
        }
        let mut entries = vec![(first, self.expr()?)];
        while self.eat_op(",") {
            if self.at_op("}") {
                break;
            }
            let key = self.expr()?;
            self.expect_op(":")?;
            entries.push((key, self.expr()?));
        }
        self.expect_op("}")?;
        Ok(Expr::Dict(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(n: i64) -> Expr {
        Expr::Const(Const::Int(n))
    }

    fn name(s: &str) -> Expr {
        Expr::Name(s.to_string())
    }

    #[test]
    fn test_precedence() {
        let expr = parse_expression("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinOp::Add,
                Box::new(int(1)),
                Box::new(Expr::Binary(BinOp::Mul, Box::new(int(2)), Box::new(int(3))))
            )
        );
    }

    #[test]
    fn test_bare_tuple() {
        assert_eq!(
            parse_expression("1, 2").unwrap(),
            Expr::Tuple(vec![int(1), int(2)])
        );
        assert_eq!(parse_expression("(1,)").unwrap(), Expr::Tuple(vec![int(1)]));
    }

    #[test]
    fn test_call_with_keywords() {
        let expr = parse_expression("f(1, key=2)").unwrap();
        let Expr::Call { args, kwargs, .. } = expr else {
            panic!("expected call");
        };
        assert_eq!(args, vec![int(1)]);
        assert_eq!(kwargs, vec![("key".to_string(), int(2))]);

        assert!(parse_expression("f(key=1, 2)").is_err());
    }

    #[test]
    fn test_not_in_and_is_not() {
        assert_eq!(
            parse_expression("a not in b").unwrap(),
            Expr::Compare(CmpOp::NotIn, Box::new(name("a")), Box::new(name("b")))
        );
        assert_eq!(
            parse_expression("a is not None").unwrap(),
            Expr::Compare(
                CmpOp::IsNot,
                Box::new(name("a")),
                Box::new(Expr::Const(Const::None))
            )
        );
    }

    #[test]
    fn test_dict_and_set_literals() {
        assert_eq!(
            parse_expression("{'a': 1}").unwrap(),
            Expr::Dict(vec![(Expr::Const(Const::Str("a".into())), int(1))])
        );
        assert_eq!(parse_expression("{1, 2}").unwrap(), Expr::Set(vec![int(1), int(2)]));
        assert_eq!(parse_expression("{}").unwrap(), Expr::Dict(vec![]));
    }

    #[test]
    fn test_function_def_with_docstring() {
        let source = "def greet(name, greeting='hi'):\n    \"\"\"Say hello.\"\"\"\n    return greeting + name\n";
        let body = parse_module(source).unwrap();
        let Stmt::Def(def) = &body[0] else {
            panic!("expected def");
        };
        assert_eq!(def.name, "greet");
        assert_eq!(def.params.len(), 2);
        assert!(def.params[1].default.is_some());
        assert_eq!(def.doc.as_deref(), Some("Say hello."));
        assert_eq!(def.body.len(), 2);
    }

    #[test]
    fn test_compound_statements() {
        let source = concat!(
            "for i, x in items:\n",
            "    if x > 0:\n",
            "        total += x\n",
            "    elif x == 0: continue\n",
            "    else:\n",
            "        break\n",
            "while n: n -= 1\n",
        );
        let body = parse_module(source).unwrap();
        assert_eq!(body.len(), 2);
        assert!(matches!(&body[0], Stmt::For { target: Target::Unpack(names), .. } if names.len() == 2));
        assert!(matches!(&body[1], Stmt::While { .. }));
    }

    #[test]
    fn test_imports() {
        let body = parse_module("import os.path as p\nfrom os import getcwd, sep as s\n").unwrap();
        assert_eq!(
            body[0],
            Stmt::Import {
                module: "os.path".into(),
                alias: Some("p".into())
            }
        );
        assert_eq!(
            body[1],
            Stmt::FromImport {
                module: "os".into(),
                names: vec![("getcwd".into(), None), ("sep".into(), Some("s".into()))]
            }
        );
    }

    #[test]
    fn test_try_and_with() {
        let source = concat!(
            "try:\n",
            "    x = 1 / 0\n",
            "except (ZeroDivisionError, ValueError) as e:\n",
            "    x = 0\n",
            "finally:\n",
            "    done = True\n",
            "with open(p) as f:\n",
            "    data = f.read()\n",
        );
        let body = parse_module(source).unwrap();
        let Stmt::Try { handlers, finally, .. } = &body[0] else {
            panic!("expected try");
        };
        assert_eq!(handlers[0].types, vec!["ZeroDivisionError", "ValueError"]);
        assert_eq!(handlers[0].name.as_deref(), Some("e"));
        assert_eq!(finally.len(), 1);
        assert!(matches!(&body[1], Stmt::With { name: Some(n), .. } if n == "f"));
    }

    #[test]
    fn test_syntax_errors_report_line() {
        let err = parse_module("x = 1\ny = (2 +\n").unwrap_err();
        assert!(err.to_string().starts_with("SyntaxError"));

        let err = parse_module("x = 1\n1 = y\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));

        assert!(parse_module("  x = 1\n").is_err());
        assert!(parse_expression("x = 1").is_err());
        assert!(parse_module("class A:\n    pass\n").is_err());
    }

    #[test]
    fn test_negative_literals_fold() {
        assert_eq!(parse_expression("-5").unwrap(), int(-5));
        assert_eq!(
            parse_expression("-x").unwrap(),
            Expr::Neg(Box::new(name("x")))
        );
    }
}
