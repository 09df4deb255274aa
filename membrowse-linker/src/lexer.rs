//! Tokenizer for the linker script grammar.
//!
//! Comments (`/* ... */` and `#...` preprocessor-style lines some vendor scripts leave in)
//! and whitespace are stripped here; the parser never sees them. Built with `nom` the same
//! way the expression lexer in this codebase's unwinder evaluator tokenizes its RPN input,
//! just applied to a richer token alphabet.

use membrowse_common::parse_linker_integer;
use nom::bytes::complete::{escaped, is_not, take_while, take_while1};
use nom::character::complete::{char as nom_char, one_of};
use nom::combinator::{map, recognize};
use nom::sequence::delimited;
use nom::IResult;

use crate::error::{LinkerParseError, LinkerParseErrorKind, SourceLoc};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Number(i64),
    Str(String),
    /// Single- or multi-char punctuation/operator, stored verbatim (`{`, `}`, `(`, `)`,
    /// `,`, `;`, `:`, `>`, `=`, `+=`, `<<`, `&&`, ...).
    Punct(&'static str),
    Eof,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub col: u32,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '.' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '$' || c == '-'
}

fn skip_trivia(mut input: &str) -> Result<&str, &str> {
    loop {
        let trimmed = input.trim_start_matches([' ', '\t', '\r', '\n']);
        if let Some(rest) = trimmed.strip_prefix("/*") {
            match rest.find("*/") {
                Some(end) => {
                    input = &rest[end + 2..];
                    continue;
                }
                None => return Err(trimmed),
            }
        }
        if trimmed == input {
            return Ok(trimmed);
        }
        input = trimmed;
    }
}

fn lex_ident(input: &str) -> IResult<&str, TokenKind> {
    map(
        recognize(|i| -> IResult<&str, &str> {
            let (i, _) = take_while1(is_ident_start)(i)?;
            take_while(is_ident_continue)(i)
        }),
        |s: &str| TokenKind::Ident(s.to_string()),
    )(input)
}

/// Scans a numeric literal: an optional `0x`/`0X` prefix, then digits appropriate to the
/// base, then an optional `K`/`M`/`G` size suffix. Returns the raw matched text so the
/// caller can hand it to `parse_linker_integer` for the actual value.
fn lex_number(input: &str) -> Option<(&str, &str)> {
    let is_hex = input.starts_with("0x") || input.starts_with("0X");
    let digits_start = if is_hex { 2 } else { 0 };
    let digit_ok: fn(char) -> bool = if is_hex {
        |c: char| c.is_ascii_hexdigit()
    } else {
        |c: char| c.is_ascii_digit()
    };
    let mut end = digits_start;
    let bytes = input.as_bytes();
    while end < bytes.len() && digit_ok(bytes[end] as char) {
        end += 1;
    }
    if end == digits_start {
        return None;
    }
    if end < bytes.len() && matches!(bytes[end] as char, 'k' | 'K' | 'm' | 'M' | 'g' | 'G') {
        end += 1;
    }
    Some((&input[end..], &input[..end]))
}

fn lex_string(input: &str) -> IResult<&str, TokenKind> {
    map(
        delimited(
            nom_char('"'),
            escaped(is_not("\"\\"), '\\', one_of("\"\\n")),
            nom_char('"'),
        ),
        |s: &str| TokenKind::Str(s.to_string()),
    )(input)
}

const MULTI_PUNCT: &[&str] = &[
    "<<=", ">>=", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "+=", "-=", "*=", "/=",
];
const SINGLE_PUNCT: &[char] = &[
    '{', '}', '(', ')', ',', ';', ':', '>', '<', '=', '+', '-', '*', '/', '%', '&', '|', '^', '!',
    '~', '?',
];

fn lex_punct(input: &str) -> Option<(&str, &'static str)> {
    for p in MULTI_PUNCT {
        if let Some(rest) = input.strip_prefix(p) {
            return Some((rest, p));
        }
    }
    let mut chars = input.chars();
    let c = chars.next()?;
    if SINGLE_PUNCT.contains(&c) {
        let canon = SINGLE_PUNCT.iter().find(|&&s| s == c)?;
        return Some((chars.as_str(), match canon {
            '{' => "{",
            '}' => "}",
            '(' => "(",
            ')' => ")",
            ',' => ",",
            ';' => ";",
            ':' => ":",
            '>' => ">",
            '<' => "<",
            '=' => "=",
            '+' => "+",
            '-' => "-",
            '*' => "*",
            '/' => "/",
            '%' => "%",
            '&' => "&",
            '|' => "|",
            '^' => "^",
            '!' => "!",
            '~' => "~",
            '?' => "?",
            _ => unreachable!(),
        }));
    }
    None
}

struct LineTracker {
    line: u32,
    col: u32,
}

impl LineTracker {
    fn advance(&mut self, consumed: &str) {
        for c in consumed.chars() {
            if c == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
    }
}

/// Tokenizes a whole linker script file, returning tokens in order followed implicitly by
/// an EOF (callers index past the end to discover EOF via `tokens.get`).
pub fn tokenize(file: &str, source: &str) -> Result<Vec<Token>, LinkerParseError> {
    let mut tokens = Vec::new();
    let mut cursor = source;
    let mut tracker = LineTracker { line: 1, col: 1 };

    loop {
        let before_trivia = cursor;
        cursor = match skip_trivia(cursor) {
            Ok(rest) => rest,
            Err(_) => {
                return Err(LinkerParseError::new(
                    SourceLoc {
                        file: file.to_string(),
                        line: tracker.line,
                        col: tracker.col,
                    },
                    LinkerParseErrorKind::UnterminatedComment,
                ))
            }
        };
        tracker.advance(&before_trivia[..before_trivia.len() - cursor.len()]);

        if cursor.is_empty() {
            break;
        }

        let start_line = tracker.line;
        let start_col = tracker.col;
        let first = cursor.chars().next().unwrap();

        if first == '"' {
            match lex_string(cursor) {
                Ok((rest, kind)) => {
                    tracker.advance(&cursor[..cursor.len() - rest.len()]);
                    tokens.push(Token {
                        kind,
                        line: start_line,
                        col: start_col,
                    });
                    cursor = rest;
                    continue;
                }
                Err(_) => {
                    return Err(LinkerParseError::new(
                        SourceLoc {
                            file: file.to_string(),
                            line: start_line,
                            col: start_col,
                        },
                        LinkerParseErrorKind::UnterminatedString,
                    ))
                }
            }
        }

        if first.is_ascii_digit() {
            if let Some((rest, raw)) = lex_number(cursor) {
                let value = parse_linker_integer(raw).ok_or_else(|| {
                    LinkerParseError::new(
                        SourceLoc {
                            file: file.to_string(),
                            line: start_line,
                            col: start_col,
                        },
                        LinkerParseErrorKind::MalformedNumber(raw.to_string()),
                    )
                })?;
                tracker.advance(&cursor[..cursor.len() - rest.len()]);
                tokens.push(Token {
                    kind: TokenKind::Number(value),
                    line: start_line,
                    col: start_col,
                });
                cursor = rest;
                continue;
            }
        }

        if is_ident_start(first) {
            let (rest, kind) = lex_ident(cursor).expect("is_ident_start implies lex_ident succeeds");
            tracker.advance(&cursor[..cursor.len() - rest.len()]);
            tokens.push(Token {
                kind,
                line: start_line,
                col: start_col,
            });
            cursor = rest;
            continue;
        }

        if let Some((rest, punct)) = lex_punct(cursor) {
            tracker.advance(&cursor[..cursor.len() - rest.len()]);
            tokens.push(Token {
                kind: TokenKind::Punct(punct),
                line: start_line,
                col: start_col,
            });
            cursor = rest;
            continue;
        }

        return Err(LinkerParseError::new(
            SourceLoc {
                file: file.to_string(),
                line: start_line,
                col: start_col,
            },
            LinkerParseErrorKind::UnexpectedChar(first),
        ));
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        line: tracker.line,
        col: tracker.col,
    });
    Ok(tokens)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_memory_block() {
        let src = "MEMORY\n{\n  FLASH (rx) : ORIGIN = 0x08000000, LENGTH = 512K\n}\n";
        let tokens = tokenize("a.ld", src).unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(kinds[0], TokenKind::Ident("MEMORY".into()));
        assert_eq!(kinds[1], TokenKind::Punct("{"));
        assert_eq!(kinds[2], TokenKind::Ident("FLASH".into()));
        assert!(kinds.contains(&TokenKind::Number(0x0800_0000)));
        assert!(kinds.contains(&TokenKind::Number(512 * 1024)));
    }

    #[test]
    fn strips_block_comments() {
        let src = "/* hello */ FOO = 1;";
        let tokens = tokenize("a.ld", src).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Ident("FOO".into()));
    }

    #[test]
    fn rejects_unterminated_comment() {
        let err = tokenize("a.ld", "/* nope").unwrap_err();
        assert!(matches!(err.kind, LinkerParseErrorKind::UnterminatedComment));
    }

    #[test]
    fn multi_char_operators_tokenize_greedily() {
        let tokens = tokenize("a.ld", "a <<= b").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Punct("<<="));
    }

    #[test]
    fn line_tracking_across_newlines() {
        let tokens = tokenize("a.ld", "A = 1;\nB = 2;\n").unwrap();
        let b = tokens.iter().find(|t| t.kind == TokenKind::Ident("B".into())).unwrap();
        assert_eq!(b.line, 2);
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn decimal_literal_round_trips(n in 0i64..0x7fff_ffff) {
            let src = format!("X = {n};");
            let tokens = tokenize("a.ld", &src).unwrap();
            prop_assert!(tokens.iter().any(|t| t.kind == TokenKind::Number(n)));
        }

        #[test]
        fn suffixed_literal_scales_by_1024(n in 0i64..0xffff) {
            let src = format!("X = {n}K;");
            let tokens = tokenize("a.ld", &src).unwrap();
            prop_assert!(tokens.iter().any(|t| t.kind == TokenKind::Number(n * 1024)));
        }
    }
}
