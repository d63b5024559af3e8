//! Tokenizer for the rule script language.

use crate::error::Diagnostic;

/// 1-based source position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn diagnostic(self, message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(self.line, self.column, message)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Int(i64),
    Ident(String),
    Let,
    If,
    Else,
    Return,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Int(n) => format!("number `{n}`"),
            TokenKind::Ident(name) => format!("`{name}`"),
            TokenKind::Eof => "end of rule".to_string(),
            other => format!("`{}`", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::Let => "let",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::Return => "return",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Comma => ",",
            TokenKind::Semi => ";",
            TokenKind::Assign => "=",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::Bang => "!",
            TokenKind::Int(_) | TokenKind::Ident(_) | TokenKind::Eof => "",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    column: u32,
}

impl Lexer<'_> {
    fn span(&self) -> Span {
        Span {
            line: self.line,
            column: self.column,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_line(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }
}

/// Split `source` into tokens, ending with `Eof`. Every lexical error is reported.
pub fn tokenize(source: &str) -> Result<Vec<Token>, Vec<Diagnostic>> {
    let mut lexer = Lexer {
        chars: source.chars().peekable(),
        line: 1,
        column: 1,
    };
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    while let Some(&c) = lexer.chars.peek() {
        let span = lexer.span();

        if c.is_whitespace() {
            lexer.bump();
            continue;
        }
        if c == '#' {
            lexer.skip_line();
            continue;
        }

        if c.is_ascii_digit() {
            let mut value: Option<i64> = Some(0);
            while let Some(&d) = lexer.chars.peek() {
                let Some(digit) = d.to_digit(10) else { break };
                value = value
                    .and_then(|v| v.checked_mul(10))
                    .and_then(|v| v.checked_add(digit as i64));
                lexer.bump();
            }
            match value {
                Some(v) => tokens.push(Token {
                    kind: TokenKind::Int(v),
                    span,
                }),
                None => errors.push(span.diagnostic("integer literal is too large")),
            }
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let mut word = String::new();
            while let Some(&d) = lexer.chars.peek() {
                if !(d.is_ascii_alphanumeric() || d == '_') {
                    break;
                }
                word.push(d);
                lexer.bump();
            }
            let kind = match word.as_str() {
                "let" => TokenKind::Let,
                "if" => TokenKind::If,
                "else" => TokenKind::Else,
                "return" => TokenKind::Return,
                _ => TokenKind::Ident(word),
            };
            tokens.push(Token { kind, span });
            continue;
        }

        lexer.bump();
        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semi,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '%' => TokenKind::Percent,
            '/' if lexer.eat('/') => {
                lexer.skip_line();
                continue;
            }
            '/' => TokenKind::Slash,
            '=' if lexer.eat('=') => TokenKind::EqEq,
            '=' => TokenKind::Assign,
            '!' if lexer.eat('=') => TokenKind::NotEq,
            '!' => TokenKind::Bang,
            '<' if lexer.eat('=') => TokenKind::Le,
            '<' => TokenKind::Lt,
            '>' if lexer.eat('=') => TokenKind::Ge,
            '>' => TokenKind::Gt,
            '&' if lexer.eat('&') => TokenKind::AndAnd,
            '|' if lexer.eat('|') => TokenKind::OrOr,
            '&' | '|' => {
                errors.push(span.diagnostic(format!("expected `{c}{c}`")));
                continue;
            }
            other => {
                errors.push(span.diagnostic(format!("unexpected character `{other}`")));
                continue;
            }
        };
        tokens.push(Token { kind, span });
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    tokens.push(Token {
        kind: TokenKind::Eof,
        span: lexer.span(),
    });
    Ok(tokens)
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
    fn test_operators_and_keywords() {
        assert_eq!(
            kinds("let n = neighbors(1) if n >= 2 && !x { set(0) }"),
            vec![
                TokenKind::Let,
                TokenKind::Ident("n".into()),
                TokenKind::Assign,
                TokenKind::Ident("neighbors".into()),
                TokenKind::LParen,
                TokenKind::Int(1),
                TokenKind::RParen,
                TokenKind::If,
                TokenKind::Ident("n".into()),
                TokenKind::Ge,
                TokenKind::Int(2),
                TokenKind::AndAnd,
                TokenKind::Bang,
                TokenKind::Ident("x".into()),
                TokenKind::LBrace,
                TokenKind::Ident("set".into()),
                TokenKind::LParen,
                TokenKind::Int(0),
                TokenKind::RParen,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("# header\nreturn // trailing\n"),
            vec![TokenKind::Return, TokenKind::Eof]
        );
    }

    #[test]
    fn test_positions_are_one_based() {
        let tokens = tokenize("let a = 1\n  set(a)").unwrap();
        assert_eq!(tokens[0].span, Span { line: 1, column: 1 });
        assert_eq!(tokens[3].span, Span { line: 1, column: 9 });
        assert_eq!(tokens[4].span, Span { line: 2, column: 3 });
    }

    #[test]
    fn test_reports_every_bad_character() {
        let errors = tokenize("set(1) @\n$ & 99999999999999999999").unwrap_err();
        assert_eq!(errors.len(), 4);
        assert_eq!((errors[0].line, errors[0].column), (1, 8));
        assert_eq!((errors[1].line, errors[1].column), (2, 1));
        assert!(errors[2].message.contains("&&"));
        assert!(errors[3].message.contains("too large"));
    }
}
