//! Parser for free-form Fortran
//!
//! A recursive descent parser that produces an AST from a token stream.
//! Statements end at a newline, a `;` or end of file.

use crate::ast::*;
use crate::diagnostics::{CompileError, SourceFile};
use crate::error::{ErrorRecord, StageResult};
use crate::lexer::{Token, TokenKind};

/// Parse a token stream into an AST
pub fn parse(tokens: &[Token], source: &str) -> StageResult<TranslationUnit> {
    parse_named("input", tokens, source)
}

/// Parse, naming the file in diagnostics
pub fn parse_named(name: &str, tokens: &[Token], source: &str) -> StageResult<TranslationUnit> {
    let mut parser = Parser::new(tokens, SourceFile::new(name, source));
    parser.parse_translation_unit()
}

/// Parser state
struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    source: SourceFile,
    eof: Token,
}

type PResult<T> = StageResult<T>;

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token], source: SourceFile) -> Self {
        let end = source.content.len();
        Self {
            tokens,
            pos: 0,
            source,
            eof: Token {
                kind: TokenKind::Eof,
                span: crate::common::Span::new(end, end),
                text: String::new(),
            },
        }
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&self.eof)
    }

    fn peek(&self) -> TokenKind {
        self.current().kind
    }

    fn peek_n(&self, n: usize) -> TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek() == kind
    }

    fn at_any(&self, kinds: &[TokenKind]) -> bool {
        kinds.contains(&self.peek())
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> PResult<Token> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("'{}'", kind.as_str())))
        }
    }

    fn unexpected(&self, expected: &str) -> ErrorRecord {
        let tok = self.current();
        let src = self.source.to_named_source();
        if tok.kind == TokenKind::Eof {
            return ErrorRecord::parser(CompileError::UnexpectedEof {
                span: tok.span.into(),
                src,
            });
        }
        let found = match tok.kind {
            TokenKind::Newline => "end of line".to_string(),
            _ => format!("'{}'", tok.text),
        };
        ErrorRecord::parser(CompileError::UnexpectedToken {
            expected: expected.to_string(),
            found,
            span: tok.span.into(),
            src,
        })
    }

    fn skip_newlines(&mut self) {
        while self.at_any(&[TokenKind::Newline, TokenKind::Semi]) {
            self.advance();
        }
    }

    /// End of statement; `Eof` is left in place
    fn expect_eos(&mut self) -> PResult<()> {
        match self.peek() {
            TokenKind::Newline | TokenKind::Semi => {
                self.advance();
                Ok(())
            }
            TokenKind::Eof => Ok(()),
            _ => Err(self.unexpected("end of statement")),
        }
    }

    fn at_name(&self) -> bool {
        self.at(TokenKind::Ident) || self.peek().can_be_name()
    }

    fn expect_name(&mut self) -> PResult<String> {
        if self.at_name() {
            Ok(self.advance().text.to_ascii_lowercase())
        } else {
            Err(self.unexpected("a name"))
        }
    }

    // ==================== UNITS ====================

    fn parse_translation_unit(&mut self) -> PResult<TranslationUnit> {
        let mut items = Vec::new();
        self.skip_newlines();
        while !self.at(TokenKind::Eof) {
            items.push(self.parse_item()?);
            self.skip_newlines();
        }
        Ok(TranslationUnit { items })
    }

    fn parse_item(&mut self) -> PResult<Item> {
        match self.peek() {
            TokenKind::Program if !self.is_assignment() => {
                Ok(Item::Program(self.parse_program()?))
            }
            TokenKind::Module if !self.is_assignment() => Ok(Item::Module(self.parse_module()?)),
            TokenKind::Subroutine | TokenKind::Function if !self.is_assignment() => {
                Ok(Item::Procedure(self.parse_procedure(None)?))
            }
            kind if is_type_keyword(kind) && !self.is_assignment() => {
                let ty = self.parse_type_spec()?;
                if self.at(TokenKind::Function) {
                    Ok(Item::Procedure(self.parse_procedure(Some(ty))?))
                } else {
                    Ok(Item::Declaration(self.parse_declaration_rest(ty)?))
                }
            }
            _ if self.at_statement() => Ok(Item::Statement(self.parse_stmt()?)),
            _ => {
                let expr = self.parse_expr()?;
                self.expect_eos()?;
                Ok(Item::Expression(expr))
            }
        }
    }

    fn parse_program(&mut self) -> PResult<ProgramUnit> {
        self.expect(TokenKind::Program)?;
        let name = self.expect_name()?;
        self.expect_eos()?;
        let spec = self.parse_spec_part()?;
        let body = self.parse_block()?;
        let contains = self.parse_contains()?;
        self.parse_end(TokenKind::Program, TokenKind::EndProgram, &name)?;
        Ok(ProgramUnit {
            name,
            spec,
            body,
            contains,
        })
    }

    fn parse_module(&mut self) -> PResult<ModuleUnit> {
        self.expect(TokenKind::Module)?;
        let name = self.expect_name()?;
        self.expect_eos()?;
        let spec = self.parse_spec_part()?;
        let contains = self.parse_contains()?;
        self.parse_end(TokenKind::Module, TokenKind::EndModule, &name)?;
        Ok(ModuleUnit {
            name,
            spec,
            contains,
        })
    }

    fn parse_contains(&mut self) -> PResult<Vec<Procedure>> {
        let mut procs = Vec::new();
        if !self.eat(TokenKind::Contains) {
            return Ok(procs);
        }
        self.expect_eos()?;
        loop {
            self.skip_newlines();
            match self.peek() {
                TokenKind::Subroutine | TokenKind::Function => {
                    procs.push(self.parse_procedure(None)?)
                }
                kind if is_type_keyword(kind) => {
                    let ty = self.parse_type_spec()?;
                    if !self.at(TokenKind::Function) {
                        return Err(self.unexpected("'function'"));
                    }
                    procs.push(self.parse_procedure(Some(ty))?);
                }
                _ => break,
            }
        }
        Ok(procs)
    }

    fn parse_procedure(&mut self, return_type: Option<TypeSpec>) -> PResult<Procedure> {
        let is_function = self.at(TokenKind::Function);
        if is_function {
            self.advance();
        } else {
            self.expect(TokenKind::Subroutine)?;
        }
        let name = self.expect_name()?;

        let mut args = Vec::new();
        if self.eat(TokenKind::LParen) {
            if !self.at(TokenKind::RParen) {
                args.push(self.expect_name()?);
                while self.eat(TokenKind::Comma) {
                    args.push(self.expect_name()?);
                }
            }
            self.expect(TokenKind::RParen)?;
        }

        let kind = if is_function {
            let result = if self.eat(TokenKind::Result) {
                self.expect(TokenKind::LParen)?;
                let r = self.expect_name()?;
                self.expect(TokenKind::RParen)?;
                Some(r)
            } else {
                None
            };
            ProcedureKind::Function {
                return_type,
                result,
            }
        } else {
            ProcedureKind::Subroutine
        };
        self.expect_eos()?;

        let spec = self.parse_spec_part()?;
        let body = self.parse_block()?;
        if is_function {
            self.parse_end(TokenKind::Function, TokenKind::EndFunction, &name)?;
        } else {
            self.parse_end(TokenKind::Subroutine, TokenKind::EndSubroutine, &name)?;
        }
        Ok(Procedure {
            name,
            kind,
            args,
            spec,
            body,
        })
    }

    /// `end`, `end <kind>`, `end <kind> <name>` or the fused spelling
    fn parse_end(&mut self, kind: TokenKind, fused: TokenKind, name: &str) -> PResult<()> {
        self.skip_newlines();
        if !self.eat(fused) {
            self.expect(TokenKind::End)?;
            self.eat(kind);
        }
        if self.at_name() {
            let tok = self.advance();
            let found = tok.text.to_ascii_lowercase();
            if found != name {
                return Err(ErrorRecord::parser(CompileError::MismatchedEnd {
                    expected: name.to_string(),
                    found,
                    span: tok.span.into(),
                    src: self.source.to_named_source(),
                }));
            }
        }
        self.expect_eos()
    }

    // ==================== SPECIFICATIONS ====================

    fn parse_spec_part(&mut self) -> PResult<SpecificationPart> {
        let mut spec = SpecificationPart::default();
        loop {
            self.skip_newlines();
            match self.peek() {
                TokenKind::Use => {
                    self.advance();
                    spec.uses.push(self.expect_name()?);
                    self.expect_eos()?;
                }
                TokenKind::Implicit => {
                    self.advance();
                    self.expect(TokenKind::None)?;
                    self.expect_eos()?;
                    spec.implicit_none = true;
                }
                kind if is_type_keyword(kind)
                    && self.peek_n(1) != TokenKind::Function
                    && !self.is_assignment() =>
                {
                    let ty = self.parse_type_spec()?;
                    spec.decls.push(self.parse_declaration_rest(ty)?);
                }
                _ => break,
            }
        }
        Ok(spec)
    }

    fn parse_type_spec(&mut self) -> PResult<TypeSpec> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::Integer => Ok(TypeSpec::Integer),
            TokenKind::Real => Ok(TypeSpec::Real),
            TokenKind::Logical => Ok(TypeSpec::Logical),
            TokenKind::Character => {
                if !self.eat(TokenKind::LParen) {
                    return Ok(TypeSpec::Character { len: Some(1) });
                }
                if self.at(TokenKind::Ident) && self.current().text.eq_ignore_ascii_case("len") {
                    self.advance();
                    self.expect(TokenKind::Eq)?;
                }
                let len = if self.eat(TokenKind::Star) {
                    None
                } else {
                    let lit = self.expect(TokenKind::IntLit)?;
                    Some(lit.text.parse::<u32>().map_err(|_| {
                        self.pos -= 1;
                        self.unexpected("a character length")
                    })?)
                };
                self.expect(TokenKind::RParen)?;
                Ok(TypeSpec::Character { len })
            }
            _ => {
                self.pos -= 1;
                Err(self.unexpected("a type"))
            }
        }
    }

    fn parse_declaration_rest(&mut self, ty: TypeSpec) -> PResult<Declaration> {
        let mut attrs = Vec::new();
        while self.eat(TokenKind::Comma) {
            if self.eat(TokenKind::Parameter) {
                attrs.push(Attribute::Parameter);
            } else if self.eat(TokenKind::Intent) {
                self.expect(TokenKind::LParen)?;
                let which = self.expect_name()?;
                let intent = match which.as_str() {
                    "in" => Intent::In,
                    "out" => Intent::Out,
                    "inout" => Intent::InOut,
                    _ => {
                        self.pos -= 1;
                        return Err(self.unexpected("'in', 'out' or 'inout'"));
                    }
                };
                self.expect(TokenKind::RParen)?;
                attrs.push(Attribute::Intent(intent));
            } else {
                return Err(self.unexpected("an attribute"));
            }
        }
        self.eat(TokenKind::ColonColon);

        let mut entities = Vec::new();
        loop {
            let name = self.expect_name()?;
            let init = if self.eat(TokenKind::Eq) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            entities.push(Entity { name, init });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect_eos()?;
        Ok(Declaration {
            ty,
            attrs,
            entities,
        })
    }

    // ==================== STATEMENTS ====================

    fn is_assignment(&self) -> bool {
        self.at_name() && self.peek_n(1) == TokenKind::Eq
    }

    fn at_statement(&self) -> bool {
        self.is_assignment()
            || self.at_any(&[
                TokenKind::Print,
                TokenKind::Call,
                TokenKind::If,
                TokenKind::Do,
                TokenKind::Exit,
                TokenKind::Cycle,
                TokenKind::Return,
            ])
    }

    fn at_block_end(&self) -> bool {
        self.at_any(&[
            TokenKind::End,
            TokenKind::EndProgram,
            TokenKind::EndModule,
            TokenKind::EndSubroutine,
            TokenKind::EndFunction,
            TokenKind::EndIf,
            TokenKind::EndDo,
            TokenKind::Else,
            TokenKind::ElseIf,
            TokenKind::Contains,
            TokenKind::Eof,
        ]) && !self.is_assignment()
    }

    fn parse_block(&mut self) -> PResult<Vec<Stmt>> {
        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            if self.at_block_end() {
                break;
            }
            if !self.at_statement() {
                return Err(self.unexpected("a statement"));
            }
            body.push(self.parse_stmt()?);
        }
        Ok(body)
    }

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        if self.is_assignment() {
            let target = self.expect_name()?;
            self.expect(TokenKind::Eq)?;
            let value = self.parse_expr()?;
            self.expect_eos()?;
            return Ok(Stmt::Assignment { target, value });
        }
        match self.peek() {
            TokenKind::Print => {
                self.advance();
                self.expect(TokenKind::Star)?;
                let mut values = Vec::new();
                while self.eat(TokenKind::Comma) {
                    values.push(self.parse_expr()?);
                }
                self.expect_eos()?;
                Ok(Stmt::Print(values))
            }
            TokenKind::Call => {
                self.advance();
                let name = self.expect_name()?;
                let args = if self.at(TokenKind::LParen) {
                    self.parse_args()?
                } else {
                    Vec::new()
                };
                self.expect_eos()?;
                Ok(Stmt::Call { name, args })
            }
            TokenKind::If => self.parse_if(),
            TokenKind::Do => self.parse_do(),
            TokenKind::Exit => self.simple(Stmt::Exit),
            TokenKind::Cycle => self.simple(Stmt::Cycle),
            TokenKind::Return => self.simple(Stmt::Return),
            _ => Err(self.unexpected("a statement")),
        }
    }

    fn simple(&mut self, stmt: Stmt) -> PResult<Stmt> {
        self.advance();
        self.expect_eos()?;
        Ok(stmt)
    }

    fn parse_paren_expr(&mut self) -> PResult<Expr> {
        self.expect(TokenKind::LParen)?;
        let expr = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        Ok(expr)
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        self.expect(TokenKind::If)?;
        let cond = self.parse_paren_expr()?;
        if !self.eat(TokenKind::Then) {
            if matches!(self.peek(), TokenKind::If | TokenKind::Do) || !self.at_statement() {
                return Err(self.unexpected("'then' or a statement"));
            }
            let stmt = self.parse_stmt()?;
            return Ok(Stmt::SingleIf {
                cond,
                stmt: Box::new(stmt),
            });
        }
        self.expect_eos()?;
        let stmt = self.parse_if_tail(cond)?;
        self.skip_newlines();
        if !self.eat(TokenKind::EndIf) {
            self.expect(TokenKind::End)?;
            self.expect(TokenKind::If)?;
        }
        self.expect_eos()?;
        Ok(stmt)
    }

    /// Body and `else` branches; the shared `end if` is left to the caller
    fn parse_if_tail(&mut self, cond: Expr) -> PResult<Stmt> {
        let body = self.parse_block()?;
        let else_if = self.at(TokenKind::ElseIf)
            || (self.at(TokenKind::Else) && self.peek_n(1) == TokenKind::If);
        let orelse = if else_if {
            if !self.eat(TokenKind::ElseIf) {
                self.advance();
                self.advance();
            }
            let cond = self.parse_paren_expr()?;
            self.expect(TokenKind::Then)?;
            self.expect_eos()?;
            vec![self.parse_if_tail(cond)?]
        } else if self.eat(TokenKind::Else) {
            self.expect_eos()?;
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(Stmt::If { cond, body, orelse })
    }

    fn parse_do(&mut self) -> PResult<Stmt> {
        self.expect(TokenKind::Do)?;
        let stmt = if self.eat(TokenKind::While) {
            let cond = self.parse_paren_expr()?;
            self.expect_eos()?;
            let body = self.parse_block()?;
            Stmt::DoWhile { cond, body }
        } else if self.is_assignment() {
            let var = self.expect_name()?;
            self.expect(TokenKind::Eq)?;
            let start = self.parse_expr()?;
            self.expect(TokenKind::Comma)?;
            let end = self.parse_expr()?;
            let step = if self.eat(TokenKind::Comma) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            self.expect_eos()?;
            let body = self.parse_block()?;
            Stmt::DoLoop {
                var,
                start,
                end,
                step,
                body,
            }
        } else {
            self.expect_eos()?;
            let body = self.parse_block()?;
            Stmt::DoForever { body }
        };
        self.skip_newlines();
        if !self.eat(TokenKind::EndDo) {
            self.expect(TokenKind::End)?;
            self.expect(TokenKind::Do)?;
        }
        self.expect_eos()?;
        Ok(stmt)
    }

    // ==================== EXPRESSIONS ====================

    fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> PResult<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(TokenKind::Or) {
            let right = self.parse_and()?;
            left = Expr::BoolOp {
                op: BoolOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let mut left = self.parse_not()?;
        while self.eat(TokenKind::And) {
            let right = self.parse_not()?;
            left = Expr::BoolOp {
                op: BoolOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> PResult<Expr> {
        if self.eat(TokenKind::Not) {
            let operand = self.parse_not()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> PResult<Expr> {
        let left = self.parse_additive()?;
        let op = match self.peek() {
            TokenKind::EqEq => CmpOp::Eq,
            TokenKind::Ne => CmpOp::NotEq,
            TokenKind::Lt => CmpOp::Lt,
            TokenKind::Le => CmpOp::LtE,
            TokenKind::Gt => CmpOp::Gt,
            TokenKind::Ge => CmpOp::GtE,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_additive()?;
        Ok(Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut left = if self.eat(TokenKind::Minus) {
            let operand = self.parse_multiplicative()?;
            Expr::UnaryOp {
                op: UnaryOp::Minus,
                operand: Box::new(operand),
            }
        } else {
            self.eat(TokenKind::Plus);
            self.parse_multiplicative()?
        };
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut left = self.parse_power()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_power()?;
            left = Expr::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_power(&mut self) -> PResult<Expr> {
        let base = self.parse_primary()?;
        if self.eat(TokenKind::StarStar) {
            let exponent = self.parse_power()?;
            return Ok(Expr::BinOp {
                op: BinOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_args(&mut self) -> PResult<Vec<Expr>> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.at(TokenKind::RParen) {
            args.push(self.parse_expr()?);
            while self.eat(TokenKind::Comma) {
                args.push(self.parse_expr()?);
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        match self.peek() {
            TokenKind::IntLit => {
                let text = self.current().text.clone();
                match text.parse::<i64>() {
                    Ok(n) => {
                        self.advance();
                        Ok(Expr::Integer(n))
                    }
                    Err(_) => Err(self.unexpected("an integer that fits in 64 bits")),
                }
            }
            TokenKind::RealLit => Ok(Expr::Real(self.advance().text.to_ascii_lowercase())),
            TokenKind::True => {
                self.advance();
                Ok(Expr::Logical(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Logical(false))
            }
            TokenKind::StringLit => {
                let text = self.advance().text;
                Ok(Expr::Str(unquote(&text)))
            }
            TokenKind::LParen => self.parse_paren_expr(),
            _ if self.at_name() => {
                let name = self.expect_name()?;
                if self.at(TokenKind::LParen) {
                    let args = self.parse_args()?;
                    Ok(Expr::FuncCall { name, args })
                } else {
                    Ok(Expr::Name(name))
                }
            }
            _ => Err(self.unexpected("an expression")),
        }
    }
}

fn is_type_keyword(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Integer | TokenKind::Real | TokenKind::Logical | TokenKind::Character
    )
}

/// Strip the delimiters and collapse doubled quotes
fn unquote(text: &str) -> String {
    let quote = text.chars().next().unwrap_or('\'');
    let inner = &text[1..text.len().saturating_sub(1).max(1)];
    let doubled: String = [quote, quote].iter().collect();
    inner.replace(&doubled, &quote.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_src(src: &str) -> TranslationUnit {
        let tokens = lex(src).expect("lexing failed");
        parse(&tokens, src).expect("parse failed")
    }

    fn parse_err(src: &str) -> ErrorRecord {
        let tokens = lex(src).expect("lexing failed");
        parse(&tokens, src).unwrap_err()
    }

    #[test]
    fn test_print_binop() {
        let unit = parse_src("print *, 1+2");
        assert_eq!(
            unit.items,
            vec![Item::Statement(Stmt::Print(vec![Expr::BinOp {
                op: BinOp::Add,
                left: Box::new(Expr::Integer(1)),
                right: Box::new(Expr::Integer(2)),
            }]))]
        );
    }

    #[test]
    fn test_precedence() {
        let unit = parse_src("a + b * c ** d ** e");
        let Item::Expression(Expr::BinOp { op, right, .. }) = &unit.items[0] else {
            panic!("expected binop");
        };
        assert_eq!(*op, BinOp::Add);
        let Expr::BinOp { op, right, .. } = right.as_ref() else {
            panic!("expected mul");
        };
        assert_eq!(*op, BinOp::Mul);
        let Expr::BinOp { op, right, .. } = right.as_ref() else {
            panic!("expected pow");
        };
        assert_eq!(*op, BinOp::Pow);
        assert!(matches!(right.as_ref(), Expr::BinOp { op: BinOp::Pow, .. }));
    }

    #[test]
    fn test_program_with_contains() {
        let src = "\
program main
    implicit none
    integer :: x
    x = 2
    call show(x)
contains
    subroutine show(a)
        integer, intent(in) :: a
        print *, a
    end subroutine show
end program main
";
        let unit = parse_src(src);
        let Item::Program(p) = &unit.items[0] else {
            panic!("expected program");
        };
        assert_eq!(p.name, "main");
        assert!(p.spec.implicit_none);
        assert_eq!(p.body.len(), 2);
        assert_eq!(p.contains.len(), 1);
        assert_eq!(p.contains[0].spec.decls[0].intent(), Some(Intent::In));
    }

    #[test]
    fn test_else_if_chain() {
        let src = "if (x > 0) then\n y = 1\nelse if (x < 0) then\n y = -1\nelse\n y = 0\nend if\n";
        let unit = parse_src(src);
        let Item::Statement(Stmt::If { orelse, .. }) = &unit.items[0] else {
            panic!("expected if");
        };
        let [Stmt::If { orelse: inner, .. }] = orelse.as_slice() else {
            panic!("expected else-if");
        };
        assert_eq!(inner.len(), 1);
    }

    #[test]
    fn test_do_forms() {
        let unit = parse_src("do i = 1, 10, 2\nprint *, i\nend do\ndo while (i > 0)\ni = i - 1\nenddo\n");
        assert!(matches!(unit.items[0], Item::Statement(Stmt::DoLoop { .. })));
        assert!(matches!(unit.items[1], Item::Statement(Stmt::DoWhile { .. })));
    }

    #[test]
    fn test_typed_function() {
        let unit = parse_src("integer function sq(n) result(r)\ninteger, intent(in) :: n\nr = n*n\nend function\n");
        let Item::Procedure(p) = &unit.items[0] else {
            panic!("expected procedure");
        };
        assert_eq!(
            p.kind,
            ProcedureKind::Function {
                return_type: Some(TypeSpec::Integer),
                result: Some("r".into())
            }
        );
    }

    #[test]
    fn test_mismatched_end_name() {
        let err = parse_err("program a\nend program b\n");
        assert_eq!(err.exit_code(), 2);
        assert!(matches!(err.diagnostic, Some(CompileError::MismatchedEnd { .. })));
    }

    #[test]
    fn test_missing_operand() {
        let err = parse_err("x = 1 +\n");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("'it''s'"), "it's");
        assert_eq!(unquote("\"a\"\"b\""), "a\"b");
        assert_eq!(unquote("''"), "");
    }
}
