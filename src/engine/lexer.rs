//! Tokenizer for template source.
//!
//! Line-oriented: newlines are statement terminators (the parser decides
//! where they are insignificant). `#` starts a comment running to end of
//! line. Identifiers may contain underscores; leading-underscore names are
//! allowed here and rejected later by the compiler, so the author sees a
//! policy rejection rather than a bogus syntax error.

use super::types::SyntaxDiagnostic;

/// A token with its source position (1-based).
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),

    // Keywords
    If,
    Else,
    While,
    For,
    In,
    Fn,
    Return,
    Break,
    Continue,
    Import,
    And,
    Or,
    Not,
    True,
    False,
    NoneKw,

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Newline,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,

    Eof,
}

impl TokenKind {
    /// Short description for "unexpected token" diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Self::Int(n) => format!("number {}", n),
            Self::Float(x) => format!("number {}", x),
            Self::Str(_) => "string literal".to_string(),
            Self::Ident(name) => format!("'{}'", name),
            Self::Newline => "end of line".to_string(),
            Self::Eof => "end of input".to_string(),
            Self::If => "'if'".to_string(),
            Self::Else => "'else'".to_string(),
            Self::While => "'while'".to_string(),
            Self::For => "'for'".to_string(),
            Self::In => "'in'".to_string(),
            Self::Fn => "'fn'".to_string(),
            Self::Return => "'return'".to_string(),
            Self::Break => "'break'".to_string(),
            Self::Continue => "'continue'".to_string(),
            Self::Import => "'import'".to_string(),
            Self::And => "'and'".to_string(),
            Self::Or => "'or'".to_string(),
            Self::Not => "'not'".to_string(),
            Self::True => "'true'".to_string(),
            Self::False => "'false'".to_string(),
            Self::NoneKw => "'none'".to_string(),
            Self::LParen => "'('".to_string(),
            Self::RParen => "')'".to_string(),
            Self::LBracket => "'['".to_string(),
            Self::RBracket => "']'".to_string(),
            Self::LBrace => "'{'".to_string(),
            Self::RBrace => "'}'".to_string(),
            Self::Comma => "','".to_string(),
            Self::Colon => "':'".to_string(),
            Self::Dot => "'.'".to_string(),
            Self::Plus => "'+'".to_string(),
            Self::Minus => "'-'".to_string(),
            Self::Star => "'*'".to_string(),
            Self::Slash => "'/'".to_string(),
            Self::Percent => "'%'".to_string(),
            Self::Assign => "'='".to_string(),
            Self::PlusAssign => "'+='".to_string(),
            Self::MinusAssign => "'-='".to_string(),
            Self::StarAssign => "'*='".to_string(),
            Self::SlashAssign => "'/='".to_string(),
            Self::PercentAssign => "'%='".to_string(),
            Self::EqEq => "'=='".to_string(),
            Self::NotEq => "'!='".to_string(),
            Self::Lt => "'<'".to_string(),
            Self::Le => "'<='".to_string(),
            Self::Gt => "'>'".to_string(),
            Self::Ge => "'>='".to_string(),
        }
    }
}

/// Tokenize a template source. Consecutive newlines collapse to one token.
pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxDiagnostic> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        column: 1,
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    fn run(&mut self) -> Result<(), SyntaxDiagnostic> {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' => {
                    self.advance();
                }
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                '\n' => {
                    // Collapse runs of blank lines into a single terminator.
                    if !matches!(
                        self.tokens.last().map(|t| &t.kind),
                        Some(TokenKind::Newline) | None
                    ) {
                        self.push(TokenKind::Newline);
                    }
                    self.advance();
                }
                '"' => self.string()?,
                c if c.is_ascii_digit() => self.number()?,
                c if c.is_ascii_alphabetic() || c == '_' => self.ident(),
                _ => self.operator()?,
            }
        }
        // Terminate the last statement even without a trailing newline.
        if !matches!(
            self.tokens.last().map(|t| &t.kind),
            Some(TokenKind::Newline) | None
        ) {
            self.push(TokenKind::Newline);
        }
        self.push(TokenKind::Eof);
        Ok(())
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn push(&mut self, kind: TokenKind) {
        self.tokens.push(Token { kind, line: self.line, column: self.column });
    }

    fn push_at(&mut self, kind: TokenKind, line: usize, column: usize) {
        self.tokens.push(Token { kind, line, column });
    }

    fn error(&self, message: impl Into<String>) -> SyntaxDiagnostic {
        SyntaxDiagnostic {
            message: message.into(),
            line: self.line,
            column: self.column,
        }
    }

    fn string(&mut self) -> Result<(), SyntaxDiagnostic> {
        let (line, column) = (self.line, self.column);
        self.advance(); // opening quote
        let mut out = String::new();
        loop {
            match self.advance() {
                None | Some('\n') => {
                    return Err(SyntaxDiagnostic {
                        message: "unterminated string literal".to_string(),
                        line,
                        column,
                    });
                }
                Some('"') => break,
                Some('\\') => match self.advance() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    Some(other) => {
                        return Err(self.error(format!("unknown escape sequence '\\{}'", other)));
                    }
                    None => {
                        return Err(SyntaxDiagnostic {
                            message: "unterminated string literal".to_string(),
                            line,
                            column,
                        });
                    }
                },
                Some(c) => out.push(c),
            }
        }
        self.push_at(TokenKind::Str(out), line, column);
        Ok(())
    }

    fn number(&mut self) -> Result<(), SyntaxDiagnostic> {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let is_float = self.peek() == Some('.') && self.peek2().is_some_and(|c| c.is_ascii_digit());
        if is_float {
            text.push('.');
            self.advance();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
            let x: f64 = text
                .parse()
                .map_err(|_| self.error(format!("invalid number '{}'", text)))?;
            self.push_at(TokenKind::Float(x), line, column);
        } else {
            let n: i64 = text
                .parse()
                .map_err(|_| self.error(format!("integer literal '{}' out of range", text)))?;
            self.push_at(TokenKind::Int(n), line, column);
        }
        Ok(())
    }

    fn ident(&mut self) {
        let (line, column) = (self.line, self.column);
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let kind = match name.as_str() {
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "in" => TokenKind::In,
            "fn" => TokenKind::Fn,
            "return" => TokenKind::Return,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "import" => TokenKind::Import,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "none" => TokenKind::NoneKw,
            _ => TokenKind::Ident(name),
        };
        self.push_at(kind, line, column);
    }

    fn operator(&mut self) -> Result<(), SyntaxDiagnostic> {
        let (line, column) = (self.line, self.column);
        let c = self.advance().expect("operator lookahead");
        let next_is_eq = self.peek() == Some('=');
        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            ';' => TokenKind::Newline,
            '+' if next_is_eq => {
                self.advance();
                TokenKind::PlusAssign
            }
            '+' => TokenKind::Plus,
            '-' if next_is_eq => {
                self.advance();
                TokenKind::MinusAssign
            }
            '-' => TokenKind::Minus,
            '*' if next_is_eq => {
                self.advance();
                TokenKind::StarAssign
            }
            '*' => TokenKind::Star,
            '/' if next_is_eq => {
                self.advance();
                TokenKind::SlashAssign
            }
            '/' => TokenKind::Slash,
            '%' if next_is_eq => {
                self.advance();
                TokenKind::PercentAssign
            }
            '%' => TokenKind::Percent,
            '=' if next_is_eq => {
                self.advance();
                TokenKind::EqEq
            }
            '=' => TokenKind::Assign,
            '!' if next_is_eq => {
                self.advance();
                TokenKind::NotEq
            }
            '<' if next_is_eq => {
                self.advance();
                TokenKind::Le
            }
            '<' => TokenKind::Lt,
            '>' if next_is_eq => {
                self.advance();
                TokenKind::Ge
            }
            '>' => TokenKind::Gt,
            other => {
                return Err(SyntaxDiagnostic {
                    message: format!("unexpected character '{}'", other),
                    line,
                    column,
                });
            }
        };
        self.push_at(kind, line, column);
        Ok(())
    }
}
