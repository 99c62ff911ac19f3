use crate::token::errors::LexError;
use crate::token::{Token, TokenKind};

/// Converts source text to tokens.
///
/// Implementations must be pure and deterministic: the rewrite loop re-lexes
/// the whole file after every applied edit and relies on getting the same
/// stream for the same text.
pub trait Lexer {
    /// Split `source` into a lossless token stream.
    fn tokenize(&self, source: &str) -> Result<Vec<Token>, LexError>;

    /// Structural check used by the syntax-error guard.
    fn check(&self, tokens: &[Token]) -> Result<(), LexError> {
        check_delimiters(tokens)
    }

    /// Tokenize and check in one go.
    fn validate(&self, source: &str) -> Result<Vec<Token>, LexError> {
        let tokens = self.tokenize(source)?;
        self.check(&tokens)?;
        Ok(tokens)
    }
}

/// Longest operators first so `===` wins over `==`.
const OPERATORS: &[&str] = &[
    "===", "!==", "<=>", "**=", "...", "<<=", ">>=", "??=", "?->", "==", "!=", "<=", ">=", "&&",
    "||", "++", "--", "+=", "-=", "*=", "/=", ".=", "%=", "&=", "|=", "^=", "->", "=>", "::", "<<",
    ">>", "??", "**",
];

/// Lexer for C-family and PHP-like sources.
///
/// Recognizes identifiers (including `$variables`), numbers, single, double
/// and backtick quoted strings with backslash escapes, `//`, `/* */` and
/// (optionally) `#` comments, whitespace runs and operators. `#[` always
/// starts an attribute, never a comment.
#[derive(Debug, Clone, Copy)]
pub struct CLexer {
    hash_comments: bool,
}

impl Default for CLexer {
    fn default() -> Self {
        Self::new()
    }
}

impl CLexer {
    pub fn new() -> Self {
        Self {
            hash_comments: true,
        }
    }

    /// Treat `#` as an operator instead of a line comment start.
    pub fn without_hash_comments(mut self) -> Self {
        self.hash_comments = false;
        self
    }
}

impl Lexer for CLexer {
    fn tokenize(&self, source: &str) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        let mut cursor = Cursor {
            src: source,
            pos: 0,
        };
        let mut line = 1;

        while let Some(c) = cursor.peek() {
            let start = cursor.pos;
            let kind = if c.is_whitespace() {
                cursor.eat_while(char::is_whitespace);
                TokenKind::Whitespace
            } else if cursor.starts_with("//")
                || (self.hash_comments && c == '#' && !cursor.starts_with("#["))
            {
                cursor.eat_while(|c| c != '\n');
                TokenKind::Comment
            } else if cursor.starts_with("/*") {
                match cursor.rest().find("*/") {
                    Some(idx) => cursor.pos += idx + 2,
                    None => return Err(LexError::UnterminatedComment { line }),
                }
                TokenKind::Comment
            } else if matches!(c, '"' | '\'' | '`') {
                cursor.bump();
                if !cursor.eat_quoted(c) {
                    return Err(LexError::UnterminatedString { line });
                }
                TokenKind::Str
            } else if c.is_ascii_digit() {
                cursor.eat_number();
                TokenKind::Number
            } else if c == '_' || c == '$' || c.is_alphabetic() {
                cursor.bump();
                cursor.eat_while(|c| c == '_' || c.is_alphanumeric());
                TokenKind::Ident
            } else {
                match OPERATORS.iter().find(|op| cursor.starts_with(op)) {
                    Some(op) => cursor.pos += op.len(),
                    None => cursor.bump(),
                }
                TokenKind::Op
            };

            let text = &source[start..cursor.pos];
            tokens.push(Token::new(kind, text, line));
            line += text.matches('\n').count();
        }

        Ok(tokens)
    }
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.rest().starts_with(prefix)
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) {
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    /// Consume up to and including the closing `quote`. False if never closed.
    fn eat_quoted(&mut self, quote: char) -> bool {
        while let Some(c) = self.peek() {
            self.bump();
            if c == '\\' {
                self.bump();
            } else if c == quote {
                return true;
            }
        }
        false
    }

    fn eat_number(&mut self) {
        loop {
            self.eat_while(|c| c == '_' || c.is_ascii_alphanumeric());
            let mut chars = self.rest().chars();
            match (chars.next(), chars.next()) {
                (Some('.'), Some(d)) if d.is_ascii_digit() => self.bump(),
                _ => break,
            }
        }
    }
}

/// Verify that `()`, `[]` and `{}` are balanced and properly nested.
pub fn check_delimiters(tokens: &[Token]) -> Result<(), LexError> {
    let mut stack: Vec<&Token> = Vec::new();
    for token in tokens {
        if token.opens() {
            stack.push(token);
            continue;
        }
        let Some(open) = token.closes() else {
            continue;
        };
        match stack.pop() {
            Some(top) if top.text == open => {}
            Some(top) => {
                return Err(LexError::MismatchedDelimiter {
                    open: top.text.clone(),
                    open_line: top.line,
                    found: token.text.clone(),
                    line: token.line,
                })
            }
            None => {
                return Err(LexError::UnexpectedCloser {
                    found: token.text.clone(),
                    line: token.line,
                })
            }
        }
    }
    match stack.pop() {
        Some(open) => Err(LexError::UnclosedDelimiter {
            open: open.text.clone(),
            line: open.line,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::tokens_to_text;

    fn kinds(src: &str) -> Vec<(TokenKind, String)> {
        CLexer::new()
            .tokenize(src)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn lexes_php_statement() {
        let got = kinds("$x = 'a\\'b' . 42;");
        assert_eq!(
            got,
            vec![
                (TokenKind::Ident, "$x".to_string()),
                (TokenKind::Whitespace, " ".to_string()),
                (TokenKind::Op, "=".to_string()),
                (TokenKind::Whitespace, " ".to_string()),
                (TokenKind::Str, "'a\\'b'".to_string()),
                (TokenKind::Whitespace, " ".to_string()),
                (TokenKind::Op, ".".to_string()),
                (TokenKind::Whitespace, " ".to_string()),
                (TokenKind::Number, "42".to_string()),
                (TokenKind::Op, ";".to_string()),
            ]
        );
    }

    #[test]
    fn longest_operator_wins() {
        let got = kinds("a===b->c");
        assert_eq!(got[1], (TokenKind::Op, "===".to_string()));
        assert_eq!(got[3], (TokenKind::Op, "->".to_string()));
    }

    #[test]
    fn decimal_numbers_stay_whole() {
        let got = kinds("3.14 1..2");
        assert_eq!(got[0], (TokenKind::Number, "3.14".to_string()));
        assert_eq!(got[2], (TokenKind::Number, "1".to_string()));
    }

    #[test]
    fn comments_are_trivia() {
        let tokens = CLexer::new().tokenize("a // x\n# y\n/* z\n */b").unwrap();
        let comments: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Comment)
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(comments, vec!["// x", "# y", "/* z\n */"]);
        assert_eq!(tokens.last().unwrap().line, 4);
    }

    #[test]
    fn hash_can_be_an_operator() {
        let tokens = CLexer::new().without_hash_comments().tokenize("#[x]").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Op);
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn attributes_are_not_comments() {
        let lexer = CLexer::new();
        let tokens = lexer.validate("#[Route('/x')]\n# note\nclass A {}").unwrap();
        let significant: Vec<_> = tokens
            .iter()
            .filter(|t| !t.is_trivia())
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(
            significant,
            vec!["#", "[", "Route", "(", "'/x'", ")", "]", "class", "A", "{", "}"]
        );
        assert!(tokens
            .iter()
            .any(|t| t.kind == TokenKind::Comment && t.text == "# note"));
    }

    #[test]
    fn line_numbers_track_newlines() {
        let tokens = CLexer::new().tokenize("a\nb\n\nc").unwrap();
        let lines: Vec<_> = tokens
            .iter()
            .filter(|t| !t.is_trivia())
            .map(|t| t.line)
            .collect();
        assert_eq!(lines, vec![1, 2, 4]);
    }

    #[test]
    fn unterminated_string_fails() {
        let err = CLexer::new().tokenize("x = \"abc;\n").unwrap_err();
        assert_eq!(err, LexError::UnterminatedString { line: 1 });
    }

    #[test]
    fn unterminated_comment_fails() {
        let err = CLexer::new().tokenize("a\n/* open").unwrap_err();
        assert_eq!(err, LexError::UnterminatedComment { line: 2 });
    }

    #[test]
    fn round_trip_is_lossless() {
        let src = "if ($a) {\n  return foo(1, \"two\"); // done\n}\n";
        let tokens = CLexer::new().tokenize(src).unwrap();
        assert_eq!(tokens_to_text(&tokens), src);
    }

    #[test]
    fn delimiter_check() {
        let lexer = CLexer::new();
        assert!(lexer.validate("f(a[1], {b})").is_ok());
        assert!(matches!(
            lexer.validate("f(a]"),
            Err(LexError::MismatchedDelimiter { .. })
        ));
        assert!(matches!(
            lexer.validate("a)"),
            Err(LexError::UnexpectedCloser { .. })
        ));
        assert!(matches!(
            lexer.validate("{\n"),
            Err(LexError::UnclosedDelimiter { line: 1, .. })
        ));
    }

    #[test]
    fn brackets_inside_strings_are_ignored() {
        assert!(CLexer::new().validate("x = \"(\";").is_ok());
    }
}
