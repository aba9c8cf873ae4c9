// The Jakefile lexer (spec §4.1). Produces a flat stream of tokens with source locations; the
// parser consumes them in a single forward pass. Tabs and four spaces are both a single indent
// level; mixing them with fewer than four spaces is an `insufficient indentation` error.

use crate::ast::Location;

const INDENT_WIDTH: usize = 4;

const RESERVED_WORDS: &[&str] = &[
    "task", "file", "as", "if", "elif", "else", "end", "ignore", "cache", "watch", "cd", "shell",
    "needs", "confirm", "each", "require", "export", "launch", "timeout", "pre", "post",
];

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TokenKind {
    Keyword(String),
    Identifier(String),
    String(String),
    Number(u64),
    Glob(String),
    Symbol(char),
    Comment(String),
    Newline,
    Indent,
    Dedent,
    Invalid(char),
    Eof,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: Location,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LexError {
    pub location: Location,
    pub message: String,
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
    tokens: Vec<Token>,
    indent_stack: Vec<usize>,
    at_line_start: bool,
}

// Tokenize Jakefile source text. Returns the complete token stream (terminated by `Eof`) or the
// first lexical error encountered.
pub fn lex(source: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer {
        source,
        bytes: source.as_bytes(),
        pos: 0,
        line: 1,
        column: 1,
        tokens: Vec::new(),
        indent_stack: vec![0],
        at_line_start: true,
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl<'a> Lexer<'a> {
    fn run(&mut self) -> Result<(), LexError> {
        loop {
            if self.at_line_start {
                self.consume_indentation()?;
            }

            match self.peek() {
                None => break,
                Some(b'\r') => {
                    self.advance();
                }
                Some(b'\n') => {
                    self.advance();
                    self.push(TokenKind::Newline);
                    self.at_line_start = true;
                    self.line += 1;
                    self.column = 1;
                }
                Some(b' ' | b'\t') => {
                    self.advance();
                }
                Some(b'#') => self.lex_comment(),
                Some(b'"') => self.lex_string(b'"')?,
                Some(b'\'') => self.lex_string(b'\'')?,
                Some(c) if c.is_ascii_digit() => self.lex_number(),
                Some(c) if is_ident_start(c) => self.lex_word_or_glob(),
                Some(b'*' | b'?' | b'[' | b'/') => self.lex_word_or_glob(),
                Some(b'=' | b':' | b',' | b'|' | b'@' | b'[' | b']' | b'(' | b')' | b'{' | b'}') => {
                    self.lex_symbol_sequence();
                }
                Some(b'-') if self.peek_at(1) == Some(b'>') => {
                    let location = self.location();
                    self.advance();
                    self.advance();
                    self.tokens.push(Token {
                        kind: TokenKind::Symbol('>'), // `->` collapses to a single arrow symbol
                        location,
                    });
                }
                Some(b'-') => {
                    let location = self.location();
                    self.advance();
                    self.tokens.push(Token {
                        kind: TokenKind::Symbol('-'),
                        location,
                    });
                }
                Some(c) => {
                    let location = self.location();
                    self.advance();
                    self.tokens.push(Token {
                        kind: TokenKind::Invalid(c as char),
                        location,
                    });
                }
            }
        }

        // Close out any remaining indentation levels and emit EOF.
        let eof_location = self.location();
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.tokens.push(Token {
                kind: TokenKind::Dedent,
                location: eof_location,
            });
        }
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            location: eof_location,
        });

        Ok(())
    }

    fn consume_indentation(&mut self) -> Result<(), LexError> {
        self.at_line_start = false;

        let start = self.pos;
        let mut spaces = 0usize;
        let mut tabs = 0usize;

        loop {
            match self.peek() {
                Some(b' ') => {
                    spaces += 1;
                    self.advance();
                }
                Some(b'\t') => {
                    tabs += 1;
                    self.advance();
                }
                _ => break,
            }
        }

        // A blank line or a comment-only line doesn't affect indentation.
        if matches!(self.peek(), Some(b'\n') | Some(b'#') | None) {
            return Ok(());
        }

        if spaces > 0 && spaces % INDENT_WIDTH != 0 {
            return Err(LexError {
                location: Location::new(self.line, 1),
                message: format!(
                    "insufficient indentation: expected a multiple of {} spaces or tabs",
                    INDENT_WIDTH
                ),
            });
        }

        let level = tabs + spaces / INDENT_WIDTH;
        let current = *self.indent_stack.last().unwrap();
        let location = Location::new(self.line, self.pos - start + 1);

        if level > current {
            self.indent_stack.push(level);
            self.tokens.push(Token {
                kind: TokenKind::Indent,
                location,
            });
        } else {
            while *self.indent_stack.last().unwrap() > level {
                self.indent_stack.pop();
                self.tokens.push(Token {
                    kind: TokenKind::Dedent,
                    location,
                });
            }
        }

        Ok(())
    }

    fn lex_comment(&mut self) {
        let location = self.location();
        let start = self.pos;
        while !matches!(self.peek(), Some(b'\n') | None) {
            self.advance();
        }
        let text = self.source[start..self.pos].to_owned();
        self.tokens.push(Token {
            kind: TokenKind::Comment(text),
            location,
        });
    }

    fn lex_string(&mut self, quote: u8) -> Result<(), LexError> {
        let location = self.location();
        self.advance(); // opening quote
        let mut value = String::new();

        loop {
            match self.peek() {
                None => {
                    return Err(LexError {
                        location,
                        message: "unterminated string literal".to_owned(),
                    });
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some(b'\\') => {
                    self.advance();
                    match self.peek() {
                        Some(b'n') => {
                            value.push('\n');
                            self.advance();
                        }
                        Some(b'r') => {
                            value.push('\r');
                            self.advance();
                        }
                        Some(b't') => {
                            value.push('\t');
                            self.advance();
                        }
                        Some(b'"') => {
                            value.push('"');
                            self.advance();
                        }
                        Some(b'\'') => {
                            value.push('\'');
                            self.advance();
                        }
                        Some(b'\\') => {
                            value.push('\\');
                            self.advance();
                        }
                        Some(b'$') => {
                            value.push('$');
                            self.advance();
                        }
                        Some(c) => {
                            value.push('\\');
                            value.push(c as char);
                            self.advance();
                        }
                        None => {
                            return Err(LexError {
                                location,
                                message: "unterminated string literal".to_owned(),
                            });
                        }
                    }
                }
                Some(_) => {
                    let ch = self.current_char();
                    value.push(ch);
                    self.advance_char(ch);
                }
            }
        }

        self.tokens.push(Token {
            kind: TokenKind::String(value),
            location,
        });
        Ok(())
    }

    fn lex_number(&mut self) {
        let location = self.location();
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        let text = &self.source[start..self.pos];
        let value = text.parse::<u64>().unwrap_or(0);
        self.tokens.push(Token {
            kind: TokenKind::Number(value),
            location,
        });
    }

    // Consumes an identifier-shaped word. If it contains `*`, `?`, `[`, or `/`, it's a glob atom
    // rather than a plain identifier/keyword.
    fn lex_word_or_glob(&mut self) {
        let location = self.location();
        let start = self.pos;
        let mut is_glob = false;

        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                self.advance();
            } else if matches!(c, b'*' | b'?' | b'[' | b']' | b'/' | b'.') {
                is_glob = true;
                self.advance();
            } else {
                break;
            }
        }

        let text = self.source[start..self.pos].to_owned();

        if is_glob {
            self.tokens.push(Token {
                kind: TokenKind::Glob(text),
                location,
            });
        } else if RESERVED_WORDS.contains(&text.as_str()) {
            self.tokens.push(Token {
                kind: TokenKind::Keyword(text),
                location,
            });
        } else {
            self.tokens.push(Token {
                kind: TokenKind::Identifier(text),
                location,
            });
        }
    }

    fn lex_symbol_sequence(&mut self) {
        let location = self.location();
        let c = self.current_char();
        self.advance_char(c);
        self.tokens.push(Token {
            kind: TokenKind::Symbol(c),
            location,
        });
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn current_char(&self) -> char {
        self.source[self.pos..].chars().next().unwrap_or('\0')
    }

    fn advance(&mut self) {
        self.pos += 1;
        self.column += 1;
    }

    fn advance_char(&mut self, c: char) {
        self.pos += c.len_utf8();
        self.column += 1;
    }

    fn location(&self) -> Location {
        Location::new(self.line, self.column)
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'-'
}
