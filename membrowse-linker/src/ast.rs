//! AST node shapes for the (subset of) GNU linker script grammar this crate understands.
//!
//! Kept as a small tagged union rather than one node type per grammar production: the
//! grammar we accept is a narrow slice of real GNU ld syntax (MEMORY, SECTIONS, top-level
//! assignments, PROVIDE/PROVIDE_HIDDEN, and a handful of consumed-but-ignored directives),
//! so a handful of enum variants covers it without a full CST.

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    And,
    Or,
    Xor,
    LogAnd,
    LogOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Expr {
    Num(i64),
    Sym(String),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    /// A function-call-shaped form: `NAME(args...)`, covering both the builtin functions of
    /// §4.2 (`DEFINED`, `SIZEOF`, `ALIGN`, ...) and bare identifiers used like one, which GNU
    /// ld's grammar does not distinguish lexically from a real function call.
    Call(String, Vec<Expr>),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AssignOp {
    /// `=`
    Set,
    /// `+=`
    AddSet,
    /// `-=`
    SubSet,
    /// `*=`
    MulSet,
    /// `/=`
    DivSet,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Assignment {
    pub name: String,
    pub op: AssignOp,
    pub value: Expr,
    /// `PROVIDE`/`PROVIDE_HIDDEN` only bind the symbol if it is not already referenced
    /// elsewhere; we treat them as ordinary assignments (§4.1 notes this distinction does
    /// not affect region resolution) but keep the flag for fidelity in dumps/tests.
    pub provide: bool,
    pub line: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MemoryBlockDecl {
    pub name: String,
    pub attrs: String,
    pub origin: Expr,
    pub length: Expr,
    pub line: u32,
}

#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct OutputSectionDecl {
    pub name: String,
    pub addr: Option<Expr>,
    /// Raw text of the input-section matcher list (`*(.text*)` etc); not parsed further
    /// since §2/§4 attribute byte ranges via ELF section headers, not via this text.
    pub inputs_raw: String,
    pub region: Option<String>,
    pub at_region: Option<String>,
    pub at_addr: Option<Expr>,
    pub line: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Stmt {
    Assign(Assignment),
    Memory(Vec<MemoryBlockDecl>),
    Sections(Vec<OutputSectionDecl>),
    /// A directive this crate recognizes but intentionally does not act on, e.g. `ENTRY(_start)`,
    /// `OUTPUT_ARCH(arm)`, `OUTPUT_FORMAT(...)`, `INCLUDE "..."`.
    Directive { name: String, line: u32 },
}

/// A fully parsed linker script file, in statement order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Script {
    pub file: String,
    pub stmts: Vec<Stmt>,
}
