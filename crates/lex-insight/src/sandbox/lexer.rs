//! Tokenizer for the script language.

use super::error::SandboxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Let,
    Const,
    Var,
    If,
    Else,
    For,
    Return,
    Throw,
    True,
    False,
    Null,
    Undefined,
    Typeof,
    New,
    Function,
}

impl Keyword {
    fn from_ident(ident: &str) -> Option<Self> {
        Some(match ident {
            "let" => Self::Let,
            "const" => Self::Const,
            "var" => Self::Var,
            "if" => Self::If,
            "else" => Self::Else,
            "for" => Self::For,
            "return" => Self::Return,
            "throw" => Self::Throw,
            "true" => Self::True,
            "false" => Self::False,
            "null" => Self::Null,
            "undefined" => Self::Undefined,
            "typeof" => Self::Typeof,
            "new" => Self::New,
            "function" => Self::Function,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Let => "let",
            Self::Const => "const",
            Self::Var => "var",
            Self::If => "if",
            Self::Else => "else",
            Self::For => "for",
            Self::Return => "return",
            Self::Throw => "throw",
            Self::True => "true",
            Self::False => "false",
            Self::Null => "null",
            Self::Undefined => "undefined",
            Self::Typeof => "typeof",
            Self::New => "new",
            Self::Function => "function",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Colon,
    Dot,
    Question,
    QuestionQuestion,
    Arrow,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Assign,
    PlusAssign,
    MinusAssign,
    Eq,
    StrictEq,
    NotEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,
}

impl Punct {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::Comma => ",",
            Self::Semicolon => ";",
            Self::Colon => ":",
            Self::Dot => ".",
            Self::Question => "?",
            Self::QuestionQuestion => "??",
            Self::Arrow => "=>",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Bang => "!",
            Self::Assign => "=",
            Self::PlusAssign => "+=",
            Self::MinusAssign => "-=",
            Self::Eq => "==",
            Self::StrictEq => "===",
            Self::NotEq => "!=",
            Self::StrictNotEq => "!==",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
        }
    }
}

// Longest spellings first so that "===" wins over "==" and "=".
const PUNCTUATORS: &[(&str, Punct)] = &[
    ("===", Punct::StrictEq),
    ("!==", Punct::StrictNotEq),
    ("==", Punct::Eq),
    ("!=", Punct::NotEq),
    ("<=", Punct::LtEq),
    (">=", Punct::GtEq),
    ("&&", Punct::AndAnd),
    ("||", Punct::OrOr),
    ("??", Punct::QuestionQuestion),
    ("=>", Punct::Arrow),
    ("+=", Punct::PlusAssign),
    ("-=", Punct::MinusAssign),
    ("(", Punct::LParen),
    (")", Punct::RParen),
    ("[", Punct::LBracket),
    ("]", Punct::RBracket),
    ("{", Punct::LBrace),
    ("}", Punct::RBrace),
    (",", Punct::Comma),
    (";", Punct::Semicolon),
    (":", Punct::Colon),
    (".", Punct::Dot),
    ("?", Punct::Question),
    ("+", Punct::Plus),
    ("-", Punct::Minus),
    ("*", Punct::Star),
    ("/", Punct::Slash),
    ("%", Punct::Percent),
    ("!", Punct::Bang),
    ("=", Punct::Assign),
    ("<", Punct::Lt),
    (">", Punct::Gt),
];

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Str(String),
    Ident(String),
    Keyword(Keyword),
    Punct(Punct),
    Eof,
}

impl TokenKind {
    /// Short description used in syntax errors.
    pub fn describe(&self) -> String {
        match self {
            Self::Number(n) => format!("number {n}"),
            Self::Str(_) => "string".to_string(),
            Self::Ident(name) => format!("identifier '{name}'"),
            Self::Keyword(k) => format!("keyword '{}'", k.as_str()),
            Self::Punct(p) => format!("'{}'", p.as_str()),
            Self::Eof => "end of script".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
}

/// Split a script into tokens, ending with [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, SandboxError> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    source: &'a str,
    offset: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    fn rest(&self) -> &'a str {
        &self.source[self.offset..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn pos(&self) -> Pos {
        Pos {
            line: self.line,
            column: self.column,
        }
    }

    fn error(&self, message: impl Into<String>, pos: Pos) -> SandboxError {
        SandboxError::Syntax {
            message: message.into(),
            line: pos.line,
            column: pos.column,
        }
    }

    fn run(mut self) -> Result<Vec<Token>, SandboxError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let pos = self.pos();
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    pos,
                });
                return Ok(tokens);
            };

            let kind = if c.is_ascii_digit()
                || (c == '.' && self.peek_second().is_some_and(|d| d.is_ascii_digit()))
            {
                self.number(pos)?
            } else if c == '"' || c == '\'' {
                self.string(c, pos)?
            } else if c.is_alphabetic() || c == '_' || c == '$' {
                self.word()
            } else {
                self.punct(pos)?
            };
            tokens.push(Token { kind, pos });
        }
    }

    fn skip_trivia(&mut self) -> Result<(), SandboxError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_second() == Some('/') => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.bump();
                    }
                }
                Some('/') if self.peek_second() == Some('*') => {
                    let start = self.pos();
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('*') if self.peek() == Some('/') => {
                                self.bump();
                                break;
                            }
                            Some(_) => {}
                            None => return Err(self.error("Unterminated comment", start)),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn number(&mut self, pos: Pos) -> Result<TokenKind, SandboxError> {
        let start = self.offset;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') && self.peek_second().is_none_or(|c| c != '.') {
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                self.bump();
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }

        let text = &self.source[start..self.offset];
        if self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            return Err(self.error(format!("Invalid number '{text}'"), pos));
        }
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| self.error(format!("Invalid number '{text}'"), pos))
    }

    fn string(&mut self, quote: char, pos: Pos) -> Result<TokenKind, SandboxError> {
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(TokenKind::Str(value)),
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('0') => '\0',
                        Some(other) => other,
                        None => return Err(self.error("Unterminated string", pos)),
                    };
                    value.push(escaped);
                }
                Some('\n') | None => return Err(self.error("Unterminated string", pos)),
                Some(c) => value.push(c),
            }
        }
    }

    fn word(&mut self) -> TokenKind {
        let start = self.offset;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$')
        {
            self.bump();
        }
        let word = &self.source[start..self.offset];
        Keyword::from_ident(word)
            .map(TokenKind::Keyword)
            .unwrap_or_else(|| TokenKind::Ident(word.to_string()))
    }

    fn punct(&mut self, pos: Pos) -> Result<TokenKind, SandboxError> {
        let rest = self.rest();
        let (text, punct) = PUNCTUATORS
            .iter()
            .find(|(text, _)| rest.starts_with(text))
            .ok_or_else(|| {
                let c = rest.chars().next().unwrap_or(' ');
                self.error(format!("Unexpected character '{c}'"), pos)
            })?;
        for _ in 0..text.len() {
            self.bump();
        }
        Ok(TokenKind::Punct(*punct))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_tokenize_expression() {
        assert_eq!(
            kinds("const x = r.price >= 10.5;"),
            vec![
                TokenKind::Keyword(Keyword::Const),
                TokenKind::Ident("x".to_string()),
                TokenKind::Punct(Punct::Assign),
                TokenKind::Ident("r".to_string()),
                TokenKind::Punct(Punct::Dot),
                TokenKind::Ident("price".to_string()),
                TokenKind::Punct(Punct::GtEq),
                TokenKind::Number(10.5),
                TokenKind::Punct(Punct::Semicolon),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_longest_punctuator_wins() {
        assert_eq!(
            kinds("a === b => !c"),
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::Punct(Punct::StrictEq),
                TokenKind::Ident("b".to_string()),
                TokenKind::Punct(Punct::Arrow),
                TokenKind::Punct(Punct::Bang),
                TokenKind::Ident("c".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "a\nb""#),
            vec![
                TokenKind::Str("it's".to_string()),
                TokenKind::Str("a\nb".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_and_positions() {
        let tokens = tokenize("// header\n/* block\ncomment */ x").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Ident("x".to_string()));
        assert_eq!(tokens[0].pos, Pos { line: 3, column: 12 });
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("1e3 .5")[..2], [TokenKind::Number(1000.0), TokenKind::Number(0.5)]);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            tokenize("'open"),
            Err(SandboxError::Syntax { line: 1, column: 1, .. })
        ));
        assert!(matches!(tokenize("a # b"), Err(SandboxError::Syntax { .. })));
        assert!(matches!(tokenize("12abc"), Err(SandboxError::Syntax { .. })));
        assert!(matches!(tokenize("/* never closed"), Err(SandboxError::Syntax { .. })));
    }
}
