//! Hand-rolled scanner for FullCircle source text.
//!
//! Longest-match over a static operator table, conventional identifier and
//! numeric rules, `//` and `/* ... */` comments. Numeric literals follow
//! C89: decimal, `0x` hex, leading-zero octal, and floats marked by a `.`
//! or a trailing `f`. Character constants are delimited by `'` or `"` and
//! must be exactly one byte after escape processing.

use crate::error::ParseError;
use crate::token::{Token, TokenKind};

/// Static operators and punctuation, longest first so `<<=` wins over `<<`
/// and `<<` over `<`.
const OPERATORS: &[(&str, TokenKind)] = &[
    ("<<=", TokenKind::ShlAssign),
    (">>=", TokenKind::ShrAssign),
    ("++", TokenKind::Increment),
    ("--", TokenKind::Decrement),
    ("<<", TokenKind::Shl),
    (">>", TokenKind::Shr),
    ("==", TokenKind::Eq),
    ("!=", TokenKind::Neq),
    (">=", TokenKind::Gte),
    ("<=", TokenKind::Lte),
    ("&&", TokenKind::Land),
    ("||", TokenKind::Lor),
    ("+=", TokenKind::AddAssign),
    ("-=", TokenKind::SubAssign),
    ("*=", TokenKind::MulAssign),
    ("/=", TokenKind::DivAssign),
    ("%=", TokenKind::ModAssign),
    ("&=", TokenKind::BandAssign),
    ("|=", TokenKind::BorAssign),
    ("^=", TokenKind::XorAssign),
    ("->", TokenKind::Arrow),
    ("+", TokenKind::Add),
    ("-", TokenKind::Sub),
    ("*", TokenKind::Mul),
    ("/", TokenKind::Div),
    ("%", TokenKind::Mod),
    ("=", TokenKind::Assign),
    ("&", TokenKind::Band),
    ("|", TokenKind::Bor),
    ("^", TokenKind::Xor),
    ("~", TokenKind::Bnot),
    ("[", TokenKind::LBracket),
    ("]", TokenKind::RBracket),
    (".", TokenKind::Dot),
    (">", TokenKind::Gt),
    ("<", TokenKind::Lt),
    ("`", TokenKind::Backtick),
    ("!", TokenKind::Lnot),
    ("{", TokenKind::LBrace),
    ("}", TokenKind::RBrace),
    ("(", TokenKind::LParen),
    (")", TokenKind::RParen),
    (",", TokenKind::Comma),
    (";", TokenKind::Semicolon),
];

fn keyword(ident: &str) -> Option<TokenKind> {
    let kind = match ident {
        "auto" => TokenKind::Auto,
        "break" => TokenKind::Break,
        "case" => TokenKind::Case,
        "char" => TokenKind::Char,
        "const" => TokenKind::Const,
        "continue" => TokenKind::Continue,
        "default" => TokenKind::Default,
        "do" => TokenKind::Do,
        "double" => TokenKind::Double,
        "else" => TokenKind::Else,
        "enum" => TokenKind::Enum,
        "extern" => TokenKind::Extern,
        "float" => TokenKind::Float,
        "for" => TokenKind::For,
        "goto" => TokenKind::Goto,
        "if" => TokenKind::If,
        "int" => TokenKind::Int,
        "long" => TokenKind::Long,
        "register" => TokenKind::Register,
        "return" => TokenKind::Return,
        "short" => TokenKind::Short,
        "signed" => TokenKind::Signed,
        "sizeof" => TokenKind::Sizeof,
        "static" => TokenKind::Static,
        "struct" => TokenKind::Struct,
        "switch" => TokenKind::Switch,
        "typedef" => TokenKind::Typedef,
        "union" => TokenKind::Union,
        "unsigned" => TokenKind::Unsigned,
        "void" => TokenKind::Void,
        "volatile" => TokenKind::Volatile,
        "while" => TokenKind::While,
        _ => return None,
    };
    Some(kind)
}

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            src: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Tokenize the whole input, halting on the first error.
    pub fn lex(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            if self.at_end() {
                break;
            }
            let (line, column) = (self.line, self.column);
            let c = self.src[self.pos];
            let kind = if c.is_ascii_digit() {
                self.numeric_constant()?
            } else if c == b'\'' || c == b'"' {
                self.char_constant()?
            } else if c == b'_' || c.is_ascii_alphabetic() {
                self.identifier_or_keyword()
            } else if let Some(kind) = self.static_operator() {
                kind
            } else {
                return Err(ParseError::new(
                    format!("unexpected symbol '{}'", c as char),
                    line,
                    column,
                ));
            };
            tokens.push(Token::new(kind, line, column));
        }
        Ok(tokens)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn rest(&self) -> &[u8] {
        &self.src[self.pos..]
    }

    fn bump(&mut self) {
        if self.src[self.pos] == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.pos += 1;
    }

    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            if self.at_end() {
                return Ok(());
            }
            let c = self.src[self.pos];
            if c.is_ascii_whitespace() {
                self.bump();
            } else if self.rest().starts_with(b"//") {
                while !self.at_end() && self.src[self.pos] != b'\n' {
                    self.bump();
                }
            } else if self.rest().starts_with(b"/*") {
                let (line, column) = (self.line, self.column);
                self.bump();
                self.bump();
                loop {
                    if self.at_end() {
                        return Err(ParseError::new(
                            "unterminated block comment",
                            line,
                            column,
                        ));
                    }
                    if self.rest().starts_with(b"*/") {
                        self.bump();
                        self.bump();
                        break;
                    }
                    self.bump();
                }
            } else {
                return Ok(());
            }
        }
    }

    /// Consume a numeric constant. The scan is greedy over the characters
    /// any base may use; classification happens afterwards, so malformed
    /// literals like `1.2.3` or `0x` fail here rather than misparse.
    fn numeric_constant(&mut self) -> Result<TokenKind, ParseError> {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        while !self.at_end() {
            let c = self.src[self.pos].to_ascii_lowercase();
            if c.is_ascii_digit() || (b'a'..=b'f').contains(&c) || c == b'x' || c == b'.' {
                text.push(c as char);
                self.bump();
            } else {
                break;
            }
        }

        let invalid =
            || ParseError::new(format!("invalid numeric literal '{}'", text), line, column);

        if text.contains('.') || (text.ends_with('f') && !text.starts_with("0x")) {
            let digits = text.strip_suffix('f').unwrap_or(&text);
            let value = digits.parse::<f32>().map_err(|_| invalid())?;
            return Ok(TokenKind::FloatConst(value));
        }

        let value = if let Some(hex) = text.strip_prefix("0x") {
            // Accept the full 32-bit range, so 0xffffffff is -1.
            i32::from_str_radix(hex, 16)
                .or_else(|_| u32::from_str_radix(hex, 16).map(|v| v as i32))
                .map_err(|_| invalid())?
        } else if text.len() > 1 && text.starts_with('0') {
            i32::from_str_radix(&text[1..], 8)
                .or_else(|_| u32::from_str_radix(&text[1..], 8).map(|v| v as i32))
                .map_err(|_| invalid())?
        } else {
            text.parse::<i32>().map_err(|_| invalid())?
        };
        Ok(TokenKind::IntConst(value))
    }

    /// Consume a `'…'` or `"…"` constant. The language has no string type:
    /// whatever the delimiter, the constant must boil down to one byte.
    fn char_constant(&mut self) -> Result<TokenKind, ParseError> {
        let (line, column) = (self.line, self.column);
        let delimiter = self.src[self.pos];
        self.bump();

        let unterminated =
            || ParseError::new("unterminated character constant", line, column);

        let mut bytes = Vec::new();
        loop {
            if self.at_end() {
                return Err(unterminated());
            }
            let c = self.src[self.pos];
            if c == delimiter {
                self.bump();
                break;
            }
            if c == b'\\' {
                self.bump();
                if self.at_end() {
                    return Err(unterminated());
                }
                match self.src[self.pos] {
                    // Escaped newline: line continuation, no byte produced.
                    b'\n' => self.bump(),
                    b'\r' => {
                        self.bump();
                        if !self.at_end() && self.src[self.pos] == b'\n' {
                            self.bump();
                        }
                    }
                    b'n' => {
                        bytes.push(b'\n');
                        self.bump();
                    }
                    b't' => {
                        bytes.push(b'\t');
                        self.bump();
                    }
                    b'r' => {
                        bytes.push(b'\r');
                        self.bump();
                    }
                    b'0' => {
                        bytes.push(0);
                        self.bump();
                    }
                    b'\\' | b'\'' | b'"' => {
                        bytes.push(self.src[self.pos]);
                        self.bump();
                    }
                    other => {
                        return Err(ParseError::new(
                            format!("unknown escape sequence '\\{}'", other as char),
                            self.line,
                            self.column,
                        ));
                    }
                }
            } else {
                bytes.push(c);
                self.bump();
            }
        }

        if bytes.len() != 1 {
            return Err(ParseError::new(
                "character constant must be exactly one byte",
                line,
                column,
            ));
        }
        Ok(TokenKind::CharConst(bytes[0]))
    }

    fn identifier_or_keyword(&mut self) -> TokenKind {
        let mut text = String::new();
        while !self.at_end() {
            let c = self.src[self.pos];
            if c == b'_' || c.is_ascii_alphanumeric() {
                text.push(c as char);
                self.bump();
            } else {
                break;
            }
        }
        keyword(&text).unwrap_or(TokenKind::Ident(text))
    }

    fn static_operator(&mut self) -> Option<TokenKind> {
        for (text, kind) in OPERATORS {
            if self.rest().starts_with(text.as_bytes()) {
                for _ in 0..text.len() {
                    self.bump();
                }
                return Some(kind.clone());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .lex()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn keywords_and_identifiers() {
        assert_eq!(
            kinds("int x while whilst"),
            vec![
                TokenKind::Int,
                TokenKind::Ident("x".into()),
                TokenKind::While,
                TokenKind::Ident("whilst".into()),
            ]
        );
    }

    #[test]
    fn numeric_bases() {
        assert_eq!(
            kinds("42 0x2a 052 0"),
            vec![
                TokenKind::IntConst(42),
                TokenKind::IntConst(42),
                TokenKind::IntConst(42),
                TokenKind::IntConst(0),
            ]
        );
        assert_eq!(kinds("0xffffffff"), vec![TokenKind::IntConst(-1)]);
    }

    #[test]
    fn float_literals() {
        assert_eq!(
            kinds("1.5 10f 0.5 2."),
            vec![
                TokenKind::FloatConst(1.5),
                TokenKind::FloatConst(10.0),
                TokenKind::FloatConst(0.5),
                TokenKind::FloatConst(2.0),
            ]
        );
        // 0xff ends in 'f' but is hex, not a float.
        assert_eq!(kinds("0xff"), vec![TokenKind::IntConst(255)]);
    }

    #[test]
    fn malformed_numbers_are_errors() {
        assert!(Lexer::new("1.2.3").lex().is_err());
        assert!(Lexer::new("0x").lex().is_err());
        assert!(Lexer::new("089").lex().is_err());
    }

    #[test]
    fn char_constants_and_escapes() {
        assert_eq!(kinds("'a'"), vec![TokenKind::CharConst(b'a')]);
        assert_eq!(kinds("\"a\""), vec![TokenKind::CharConst(b'a')]);
        assert_eq!(kinds("'\\n'"), vec![TokenKind::CharConst(b'\n')]);
        assert_eq!(kinds("'\\0'"), vec![TokenKind::CharConst(0)]);
        assert_eq!(kinds("'\\''"), vec![TokenKind::CharConst(b'\'')]);
    }

    #[test]
    fn multi_byte_and_unterminated_constants_are_errors() {
        assert!(Lexer::new("'ab'").lex().is_err());
        assert!(Lexer::new("''").lex().is_err());
        assert!(Lexer::new("'a").lex().is_err());
    }

    #[test]
    fn operators_use_longest_match() {
        assert_eq!(
            kinds("a <<= b << c < d"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::ShlAssign,
                TokenKind::Ident("b".into()),
                TokenKind::Shl,
                TokenKind::Ident("c".into()),
                TokenKind::Lt,
                TokenKind::Ident("d".into()),
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("1 // comment\n2 /* multi\nline */ 3"),
            vec![
                TokenKind::IntConst(1),
                TokenKind::IntConst(2),
                TokenKind::IntConst(3),
            ]
        );
        assert!(Lexer::new("/* never closed").lex().is_err());
    }

    #[test]
    fn positions_point_at_the_first_character() {
        let tokens = Lexer::new("int\n  foo").lex().unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
    }

    #[test]
    fn backtick_is_a_token() {
        assert_eq!(
            kinds("`x"),
            vec![TokenKind::Backtick, TokenKind::Ident("x".into())]
        );
    }

    #[test]
    fn unexpected_symbols_are_errors() {
        let err = Lexer::new("int @").lex().unwrap_err();
        assert_eq!((err.line, err.column), (1, 5));
    }
}
