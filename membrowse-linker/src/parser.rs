//! Recursive-descent parser over the token stream produced by [`crate::lexer`].
//!
//! Expressions use precedence climbing (a small hand-rolled Pratt parser) rather than nom
//! combinators: GNU ld's expression grammar is a conventional infix grammar with C-like
//! precedence, which a binding-power table expresses far more directly than a combinator
//! chain would.

use crate::ast::{Assignment, AssignOp, BinOp, Expr, MemoryBlockDecl, OutputSectionDecl, Script, Stmt, UnOp};
use crate::error::{LinkerParseError, LinkerParseErrorKind, SourceLoc};
use crate::lexer::{tokenize, Token, TokenKind};

/// Directives this crate recognizes syntactically but deliberately does not act on.
const IGNORED_DIRECTIVES: &[&str] = &[
    "ENTRY",
    "OUTPUT_ARCH",
    "OUTPUT_FORMAT",
    "OUTPUT",
    "INCLUDE",
    "SEARCH_DIR",
    "STARTUP",
    "GROUP",
    "TARGET",
    "FLOAT",
    "NOCROSSREFS",
    "NOCROSSREFS_TO",
    "REGION_ALIAS",
    "ASSERT",
    "EXTERN",
    "VERSION",
];

/// Whether `name` is one of the directives this crate recognizes (and ignores) by name,
/// as opposed to a directive-shaped statement it has no specific handling for.
pub(crate) fn is_known_directive(name: &str) -> bool {
    IGNORED_DIRECTIVES.contains(&name)
}

struct Parser<'a> {
    file: &'a str,
    tokens: &'a [Token],
    pos: usize,
}

type PResult<T> = Result<T, LinkerParseError>;

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn loc(&self) -> SourceLoc {
        let t = self.peek();
        SourceLoc {
            file: self.file.to_string(),
            line: t.line,
            col: t.col,
        }
    }

    fn err(&self, kind: LinkerParseErrorKind) -> LinkerParseError {
        LinkerParseError::new(self.loc(), kind)
    }

    fn expect_punct(&mut self, p: &'static str) -> PResult<()> {
        if self.peek_kind() == &TokenKind::Punct(p) {
            self.bump();
            Ok(())
        } else {
            Err(self.err(LinkerParseErrorKind::UnexpectedToken {
                expected: p,
                found: describe(self.peek_kind()),
            }))
        }
    }

    fn eat_punct(&mut self, p: &'static str) -> bool {
        if self.peek_kind() == &TokenKind::Punct(p) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_ident(&mut self, what: &'static str) -> PResult<String> {
        match self.peek_kind().clone() {
            TokenKind::Ident(s) => {
                self.bump();
                Ok(s)
            }
            other => Err(self.err(LinkerParseErrorKind::UnexpectedToken {
                expected: what,
                found: describe(&other),
            })),
        }
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    /// True when the current identifier is immediately followed by `(`, i.e. this
    /// statement has the shape of a directive call (`NAME(args...)`) rather than an
    /// assignment. Used to recognize directives this crate has no name for at all, so
    /// they can be surfaced as `LinkerWarningKind::UnknownDirective` instead of silently
    /// misparsed as an assignment.
    fn looks_like_directive_call(&self) -> bool {
        matches!(
            self.tokens.get(self.pos + 1).map(|t| &t.kind),
            Some(TokenKind::Punct("("))
        )
    }

    fn parse_script(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while !self.at_eof() {
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        let line = self.peek().line;
        if let TokenKind::Ident(name) = self.peek_kind().clone() {
            match name.as_str() {
                "MEMORY" => return self.parse_memory(),
                "SECTIONS" => return self.parse_sections(),
                "PROVIDE" | "PROVIDE_HIDDEN" => return self.parse_provide(),
                _ if IGNORED_DIRECTIVES.contains(&name.as_str()) => {
                    self.bump();
                    self.skip_directive_tail();
                    return Ok(Stmt::Directive { name, line });
                }
                _ if self.looks_like_directive_call() => {
                    self.bump();
                    self.skip_directive_tail();
                    return Ok(Stmt::Directive { name, line });
                }
                _ => {}
            }
        }
        self.parse_assignment(line)
    }

    /// Consumes whatever follows a recognized-but-ignored directive name up to (and
    /// including) the statement-terminating `;`, honoring balanced parens so that
    /// `OUTPUT_FORMAT(a, b, c)` style calls don't confuse the scanner.
    fn skip_directive_tail(&mut self) {
        let mut depth = 0i32;
        loop {
            match self.peek_kind() {
                TokenKind::Eof => return,
                TokenKind::Punct("(") => {
                    depth += 1;
                    self.bump();
                }
                TokenKind::Punct(")") => {
                    depth -= 1;
                    self.bump();
                }
                TokenKind::Punct(";") if depth <= 0 => {
                    self.bump();
                    return;
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn parse_provide(&mut self) -> PResult<Stmt> {
        let line = self.peek().line;
        let keyword = self.expect_ident("PROVIDE or PROVIDE_HIDDEN")?;
        self.expect_punct("(")?;
        let name = self.expect_ident("symbol name")?;
        self.expect_punct("=")?;
        let value = self.parse_expr(0)?;
        self.expect_punct(")")?;
        self.eat_punct(";");
        debug_assert!(keyword == "PROVIDE" || keyword == "PROVIDE_HIDDEN");
        Ok(Stmt::Assign(Assignment {
            name,
            op: AssignOp::Set,
            value,
            provide: true,
            line,
        }))
    }

    fn parse_assignment(&mut self, line: u32) -> PResult<Stmt> {
        let name = self.expect_ident("identifier")?;
        let op = match self.peek_kind().clone() {
            TokenKind::Punct("=") => AssignOp::Set,
            TokenKind::Punct("+=") => AssignOp::AddSet,
            TokenKind::Punct("-=") => AssignOp::SubSet,
            TokenKind::Punct("*=") => AssignOp::MulSet,
            TokenKind::Punct("/=") => AssignOp::DivSet,
            other => {
                return Err(self.err(LinkerParseErrorKind::UnexpectedToken {
                    expected: "assignment operator",
                    found: describe(&other),
                }))
            }
        };
        self.bump();
        let value = self.parse_expr(0)?;
        self.eat_punct(";");
        Ok(Stmt::Assign(Assignment {
            name,
            op,
            value,
            provide: false,
            line,
        }))
    }

    fn parse_memory(&mut self) -> PResult<Stmt> {
        self.bump();
        self.expect_punct("{")?;
        let mut blocks = Vec::new();
        while !self.eat_punct("}") {
            if self.at_eof() {
                return Err(self.err(LinkerParseErrorKind::UnexpectedEof("'}'")));
            }
            let line = self.peek().line;
            let name = self.expect_ident("region name")?;
            let attrs = if self.eat_punct("(") {
                let mut s = String::new();
                while !self.eat_punct(")") {
                    if let TokenKind::Ident(part) = self.peek_kind().clone() {
                        s.push_str(&part);
                        self.bump();
                    } else if let TokenKind::Punct(p) = *self.peek_kind() {
                        s.push_str(p);
                        self.bump();
                    } else {
                        break;
                    }
                }
                s
            } else {
                String::new()
            };
            self.expect_punct(":")?;
            let origin = self.expect_region_field("ORIGIN", "org")?;
            self.expect_punct(",")?;
            let length = self.expect_region_field("LENGTH", "len")?;
            self.eat_punct(",");
            blocks.push(MemoryBlockDecl {
                name,
                attrs,
                origin,
                length,
                line,
            });
        }
        Ok(Stmt::Memory(blocks))
    }

    fn expect_region_field(&mut self, full: &'static str, abbrev: &'static str) -> PResult<Expr> {
        let name = self.expect_ident(full)?;
        let upper = name.to_ascii_uppercase();
        if upper != full && upper != abbrev.to_ascii_uppercase() {
            return Err(self.err(LinkerParseErrorKind::UnexpectedToken {
                expected: full,
                found: name,
            }));
        }
        self.expect_punct("=")?;
        self.parse_expr(0)
    }

    fn parse_sections(&mut self) -> PResult<Stmt> {
        self.bump();
        self.expect_punct("{")?;
        let mut outputs = Vec::new();
        while !self.eat_punct("}") {
            if self.at_eof() {
                return Err(self.err(LinkerParseErrorKind::UnexpectedEof("'}'")));
            }
            if let TokenKind::Ident(name) = self.peek_kind().clone() {
                if name == "PROVIDE" || name == "PROVIDE_HIDDEN" {
                    self.parse_provide()?;
                    continue;
                }
                if IGNORED_DIRECTIVES.contains(&name.as_str()) {
                    self.bump();
                    self.skip_directive_tail();
                    continue;
                }
            }
            // Either a bare top-level assignment inside SECTIONS, or an output section
            // description `NAME ADDR : [AT(...)] { inputs } [>REGION] [AT>AT_REGION]`.
            if self.looks_like_output_section() {
                outputs.push(self.parse_output_section()?);
            } else {
                let line = self.peek().line;
                self.parse_assignment(line)?;
            }
        }
        Ok(Stmt::Sections(outputs))
    }

    fn looks_like_output_section(&self) -> bool {
        // An assignment is `IDENT ASSIGNOP`; an output section is `IDENT ... :`. Scan ahead
        // to the first `:`, `=`, or `;` at depth 0 to disambiguate without backtracking.
        let mut i = self.pos;
        if !matches!(self.tokens[i].kind, TokenKind::Ident(_)) {
            return false;
        }
        i += 1;
        while i < self.tokens.len() {
            match &self.tokens[i].kind {
                TokenKind::Punct(":") => return true,
                TokenKind::Punct("=")
                | TokenKind::Punct("+=")
                | TokenKind::Punct("-=")
                | TokenKind::Punct("*=")
                | TokenKind::Punct("/=")
                | TokenKind::Punct(";") => return false,
                TokenKind::Eof => return false,
                _ => i += 1,
            }
        }
        false
    }

    fn parse_output_section(&mut self) -> PResult<OutputSectionDecl> {
        let line = self.peek().line;
        let name = self.expect_ident("output section name")?;
        let addr = if self.peek_kind() != &TokenKind::Punct(":") {
            Some(self.parse_expr(0)?)
        } else {
            None
        };
        let mut at_addr = None;
        if let TokenKind::Ident(kw) = self.peek_kind().clone() {
            if kw == "AT" {
                self.bump();
                self.expect_punct("(")?;
                at_addr = Some(self.parse_expr(0)?);
                self.expect_punct(")")?;
            }
        }
        self.expect_punct(":")?;
        self.expect_punct("{")?;
        let mut depth = 1usize;
        let start = self.pos;
        while depth > 0 {
            match self.peek_kind() {
                TokenKind::Punct("{") => depth += 1,
                TokenKind::Punct("}") => depth -= 1,
                TokenKind::Eof => {
                    return Err(self.err(LinkerParseErrorKind::UnexpectedEof("'}'")));
                }
                _ => {}
            }
            if depth > 0 {
                self.bump();
            }
        }
        let inputs_raw = render_tokens(&self.tokens[start..self.pos]);
        self.expect_punct("}")?;

        let mut region = None;
        if self.eat_punct(">") {
            region = Some(self.expect_ident("memory region name")?);
        }
        let mut at_region = None;
        if let TokenKind::Ident(kw) = self.peek_kind().clone() {
            if kw == "AT" {
                self.bump();
                self.expect_punct(">")?;
                at_region = Some(self.expect_ident("memory region name")?);
            }
        }
        self.eat_punct(";");

        Ok(OutputSectionDecl {
            name,
            addr,
            inputs_raw,
            region,
            at_region,
            at_addr,
            line,
        })
    }

    // --- Expressions: precedence-climbing (Pratt) parser ---

    fn parse_expr(&mut self, min_bp: u8) -> PResult<Expr> {
        let mut lhs = self.parse_prefix()?;
        loop {
            let Some((op, lbp, rbp)) = self.peek_binop() else {
                break;
            };
            if lbp < min_bp {
                break;
            }
            self.bump();
            if op == BinOpOrTernary::Ternary {
                let then_branch = self.parse_expr(0)?;
                self.expect_punct(":")?;
                let else_branch = self.parse_expr(rbp)?;
                lhs = Expr::Ternary(Box::new(lhs), Box::new(then_branch), Box::new(else_branch));
                continue;
            }
            let rhs = self.parse_expr(rbp)?;
            lhs = Expr::Binary(op.into_binop(), Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn peek_binop(&self) -> Option<(BinOpOrTernary, u8, u8)> {
        let p = match self.peek_kind() {
            TokenKind::Punct(p) => *p,
            _ => return None,
        };
        // (left binding power, right binding power); higher binds tighter. Right-assoc
        // (ternary) has rbp < lbp at the same tier.
        let triple = match p {
            "?" => (BinOpOrTernary::Ternary, 2, 1),
            "||" => (BinOpOrTernary::Op(BinOp::LogOr), 3, 4),
            "&&" => (BinOpOrTernary::Op(BinOp::LogAnd), 5, 6),
            "|" => (BinOpOrTernary::Op(BinOp::Or), 7, 8),
            "^" => (BinOpOrTernary::Op(BinOp::Xor), 9, 10),
            "&" => (BinOpOrTernary::Op(BinOp::And), 11, 12),
            "==" => (BinOpOrTernary::Op(BinOp::Eq), 13, 14),
            "!=" => (BinOpOrTernary::Op(BinOp::Ne), 13, 14),
            "<" => (BinOpOrTernary::Op(BinOp::Lt), 15, 16),
            "<=" => (BinOpOrTernary::Op(BinOp::Le), 15, 16),
            ">" => (BinOpOrTernary::Op(BinOp::Gt), 15, 16),
            ">=" => (BinOpOrTernary::Op(BinOp::Ge), 15, 16),
            "<<" => (BinOpOrTernary::Op(BinOp::Shl), 17, 18),
            ">>" => (BinOpOrTernary::Op(BinOp::Shr), 17, 18),
            "+" => (BinOpOrTernary::Op(BinOp::Add), 19, 20),
            "-" => (BinOpOrTernary::Op(BinOp::Sub), 19, 20),
            "*" => (BinOpOrTernary::Op(BinOp::Mul), 21, 22),
            "/" => (BinOpOrTernary::Op(BinOp::Div), 21, 22),
            "%" => (BinOpOrTernary::Op(BinOp::Mod), 21, 22),
            _ => return None,
        };
        Some(triple)
    }

    fn parse_prefix(&mut self) -> PResult<Expr> {
        match self.peek_kind().clone() {
            TokenKind::Punct("-") => {
                self.bump();
                Ok(Expr::Unary(UnOp::Neg, Box::new(self.parse_prefix()?)))
            }
            TokenKind::Punct("!") => {
                self.bump();
                Ok(Expr::Unary(UnOp::Not, Box::new(self.parse_prefix()?)))
            }
            TokenKind::Punct("~") => {
                self.bump();
                Ok(Expr::Unary(UnOp::BitNot, Box::new(self.parse_prefix()?)))
            }
            TokenKind::Punct("(") => {
                self.bump();
                let inner = self.parse_expr(0)?;
                self.expect_punct(")")?;
                Ok(inner)
            }
            TokenKind::Number(n) => {
                self.bump();
                Ok(Expr::Num(n))
            }
            TokenKind::Ident(name) => {
                self.bump();
                if self.eat_punct("(") {
                    let mut args = Vec::new();
                    if self.peek_kind() != &TokenKind::Punct(")") {
                        loop {
                            args.push(self.parse_expr(0)?);
                            if !self.eat_punct(",") {
                                break;
                            }
                        }
                    }
                    self.expect_punct(")")?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Sym(name))
                }
            }
            other => Err(self.err(LinkerParseErrorKind::UnexpectedToken {
                expected: "expression",
                found: describe(&other),
            })),
        }
    }
}

#[derive(Clone, Copy, Eq, PartialEq)]
enum BinOpOrTernary {
    Op(BinOp),
    Ternary,
}

impl BinOpOrTernary {
    fn into_binop(self) -> BinOp {
        match self {
            BinOpOrTernary::Op(op) => op,
            BinOpOrTernary::Ternary => unreachable!("ternary handled separately"),
        }
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Ident(s) => format!("identifier {s:?}"),
        TokenKind::Number(n) => format!("number {n}"),
        TokenKind::Str(s) => format!("string {s:?}"),
        TokenKind::Punct(p) => format!("{p:?}"),
        TokenKind::Eof => "end of file".to_string(),
    }
}

fn render_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    for t in tokens {
        if !out.is_empty() {
            out.push(' ');
        }
        match &t.kind {
            TokenKind::Ident(s) => out.push_str(s),
            TokenKind::Number(n) => out.push_str(&n.to_string()),
            TokenKind::Str(s) => {
                out.push('"');
                out.push_str(s);
                out.push('"');
            }
            TokenKind::Punct(p) => out.push_str(p),
            TokenKind::Eof => {}
        }
    }
    out
}

/// Tokenizes and parses a single linker script file.
pub fn parse_script(file: &str, source: &str) -> Result<Script, LinkerParseError> {
    let tokens = tokenize(file, source)?;
    let mut parser = Parser {
        file,
        tokens: &tokens,
        pos: 0,
    };
    let stmts = parser.parse_script()?;
    Ok(Script {
        file: file.to_string(),
        stmts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_memory_block() {
        let script = parse_script(
            "a.ld",
            "MEMORY\n{\n  FLASH (rx) : ORIGIN = 0x08000000, LENGTH = 512K\n  RAM (rwx) : ORIGIN = 0x20000000, LENGTH = 128K\n}\n",
        )
        .unwrap();
        let Stmt::Memory(blocks) = &script.stmts[0] else {
            panic!("expected MEMORY statement");
        };
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].name, "FLASH");
        assert_eq!(blocks[0].origin, Expr::Num(0x0800_0000));
        assert_eq!(blocks[0].length, Expr::Num(512 * 1024));
    }

    #[test]
    fn parses_assignment_with_precedence() {
        let script = parse_script("a.ld", "X = 1 + 2 * 3;").unwrap();
        let Stmt::Assign(a) = &script.stmts[0] else {
            panic!("expected assignment");
        };
        assert_eq!(
            a.value,
            Expr::Binary(
                BinOp::Add,
                Box::new(Expr::Num(1)),
                Box::new(Expr::Binary(BinOp::Mul, Box::new(Expr::Num(2)), Box::new(Expr::Num(3))))
            )
        );
    }

    #[test]
    fn parses_function_calls() {
        let script = parse_script("a.ld", "X = ALIGN(4) + SIZEOF(.text);").unwrap();
        let Stmt::Assign(a) = &script.stmts[0] else {
            panic!("expected assignment");
        };
        assert!(matches!(a.value, Expr::Binary(BinOp::Add, _, _)));
    }

    #[test]
    fn parses_sections_block_with_region() {
        let script = parse_script(
            "a.ld",
            "SECTIONS\n{\n  .text : { *(.text*) } > FLASH\n  .data : AT(LOADADDR(.text)) { *(.data*) } > RAM AT> FLASH\n}\n",
        )
        .unwrap();
        let Stmt::Sections(outs) = &script.stmts[0] else {
            panic!("expected SECTIONS statement");
        };
        assert_eq!(outs.len(), 2);
        assert_eq!(outs[0].name, ".text");
        assert_eq!(outs[0].region.as_deref(), Some("FLASH"));
        assert_eq!(outs[1].at_region.as_deref(), Some("FLASH"));
        assert!(outs[1].at_addr.is_some());
    }

    #[test]
    fn ignores_known_directives() {
        let script = parse_script("a.ld", "ENTRY(Reset_Handler)\nOUTPUT_ARCH(arm)\n").unwrap();
        assert_eq!(script.stmts.len(), 2);
        assert!(matches!(script.stmts[0], Stmt::Directive { .. }));
    }

    #[test]
    fn parses_provide_hidden() {
        let script = parse_script("a.ld", "PROVIDE_HIDDEN(_heap_start = .);").unwrap();
        let Stmt::Assign(a) = &script.stmts[0] else {
            panic!("expected assignment");
        };
        assert!(a.provide);
        assert_eq!(a.name, "_heap_start");
    }

    #[test]
    fn reports_unexpected_token() {
        let err = parse_script("a.ld", "MEMORY { FLASH (rx) ORIGIN = 0 , LENGTH = 1 }").unwrap_err();
        assert!(matches!(err.kind, LinkerParseErrorKind::UnexpectedToken { .. }));
    }
}
