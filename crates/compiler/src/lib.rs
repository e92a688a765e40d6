//! FullCircle compiler library.
//!
//! FullCircle is a small C-like language with three scalar types (`int`,
//! `float`, `char`), functions, `if/else`, `while`/`for`, and a
//! print-and-return backtick operator. This crate turns source text into
//! stack-machine bytecode; `fc-vm` executes it.
//!
//! The pipeline is exposed seam by seam:
//!
//! ```text
//! lex(source) -> tokens -> parse(tokens) -> ast -> compile(ast) -> bytecode
//! ```
//!
//! `parse` internally splits the token stream into nested statement lists
//! (see [`splitter`]) before building the tree; `compile` validates,
//! generates code and links symbolic jump targets in one call.

pub mod ast;
pub mod codegen;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod splitter;
pub mod token;

pub use ast::Ast;
pub use error::{CompileError, ParseError};
pub use token::{Token, TokenKind};

use fc_core::Instr;

/// Tokenize FullCircle source text.
pub fn lex(source: &str) -> Result<Vec<Token>, ParseError> {
    lexer::Lexer::new(source).lex()
}

/// Parse a token stream into a typed AST rooted at the global block.
pub fn parse(tokens: &[Token]) -> Result<Ast, ParseError> {
    parser::parse(tokens)
}

/// Validate, lower and link a parsed program.
pub fn compile(ast: &mut Ast) -> Result<Vec<Instr>, CompileError> {
    ast.validate()?;
    codegen::generate(ast)
}

/// The whole front half of the toolchain in one call.
pub fn compile_source(source: &str) -> Result<Vec<Instr>, CompileError> {
    let tokens = lex(source)?;
    let mut ast = parse(&tokens)?;
    compile(&mut ast)
}
