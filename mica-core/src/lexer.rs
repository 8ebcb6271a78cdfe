//! Lexer for the Mica language.
//!
//! Lexing runs in two passes. The raw pass is a single left-to-right
//! scan that recognizes, in priority order: line and block comments
//! (block comments nest), end-of-line separators (CR, LF and CRLF each
//! count as one), numeric literals, keywords and identifiers,
//! quote-delimited runs, and symbols (longest match first, so `<<=`
//! wins over `<<` which wins over `<`). The second pass is one
//! coalesced rebuild of the token sequence: comment and end-of-line
//! tokens are deleted and each quote-delimited run is rewritten into a
//! single string or char token.
//!
//! Lexer errors are recorded in the shared diagnostic log and lexing
//! continues opportunistically; callers must check the log before
//! handing the tokens to the parser.

use crate::diagnostic::{Diagnostic, DiagnosticLog};
use crate::span::{FileId, Span};

/// Kind of a token produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Eof,

    // Identifiers and literals
    Ident,
    IntLiteral,
    FloatLiteral,
    StringLiteral,
    CharLiteral,

    // Raw-pass tokens, removed or rewritten by the second pass
    LineComment,
    BlockComment,
    Eol,
    DoubleQuote,
    SingleQuote,
    QuotedText,

    // Punctuation
    LParen,   // (
    RParen,   // )
    LBrace,   // {
    RBrace,   // }
    Comma,    // ,
    Semi,     // ;
    Dot,      // .
    Equal,    // =

    // Operators
    Plus,     // +
    Minus,    // -
    Star,     // *
    Slash,    // /
    Percent,  // %
    Amp,      // &
    Bar,      // |
    Caret,    // ^
    Bang,     // !
    Less,     // <
    Greater,  // >

    // Compound operators
    Shl,        // <<
    Shr,        // >>
    LessEq,     // <=
    GreaterEq,  // >=
    EqualEqual, // ==
    BangEqual,  // !=
    PlusEq,     // +=
    MinusEq,    // -=
    StarEq,     // *=
    SlashEq,    // /=
    PercentEq,  // %=
    AmpEq,      // &=
    BarEq,      // |=
    CaretEq,    // ^=
    ShlEq,      // <<=
    ShrEq,      // >>=

    // Keywords
    KwFn,
    KwData,
    KwRet,
    KwBrk,
    KwCnt,
    KwWhile,
    KwIf,
    KwElif,
    KwElse,
    KwSwitch,
    KwCase,
    KwDefault,
    KwDefer,
}

/// A single token. Immutable once produced.
///
/// `line` and `col` are the 1-based position of the token's first
/// character, recorded at scan time so that error display does not
/// have to re-walk the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub line: u32,
    pub col: u32,
}

impl Token {
    /// The literal text of the token.
    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        self.span.text(source)
    }
}

/// Lex a source buffer into tokens.
///
/// Comments and end-of-line tokens never appear in the result; quoted
/// runs come back as single string/char tokens whose span covers the
/// content between the quotes.
pub fn tokenize(file: FileId, source: &str, log: &mut DiagnosticLog) -> Vec<Token> {
    let mut lexer = Lexer {
        file,
        source,
        bytes: source.as_bytes(),
        index: 0,
        line: 1,
        col: 1,
        log,
    };
    let raw = lexer.run();
    let eof_line = lexer.line;
    let eof_col = lexer.col;
    let mut tokens = post_process(raw, log);
    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span::point(file, source.len() as u32),
        line: eof_line,
        col: eof_col,
    });
    tokens
}

struct Lexer<'src, 'log> {
    file: FileId,
    source: &'src str,
    bytes: &'src [u8],
    index: usize,
    line: u32,
    col: u32,
    log: &'log mut DiagnosticLog,
}

impl Lexer<'_, '_> {
    fn run(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek() {
            if ch == b' ' || ch == b'\t' {
                self.bump();
                continue;
            }

            let start = self.mark();
            match ch {
                b'\r' | b'\n' => {
                    // CR, LF and CRLF are each one separator.
                    self.bump();
                    if ch == b'\r' && self.peek() == Some(b'\n') {
                        self.bump();
                    }
                    self.line += 1;
                    self.col = 1;
                    tokens.push(self.finish(TokenKind::Eol, start));
                }
                b'/' if self.peek_next() == Some(b'/') => {
                    while let Some(c) = self.peek() {
                        if c == b'\r' || c == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                    tokens.push(self.finish(TokenKind::LineComment, start));
                }
                b'/' if self.peek_next() == Some(b'*') => {
                    if let Some(tok) = self.lex_block_comment(start) {
                        tokens.push(tok);
                    }
                }
                b'0'..=b'9' => tokens.push(self.lex_number(start)),
                b'"' => self.lex_quoted(b'"', TokenKind::DoubleQuote, start, &mut tokens),
                b'\'' => self.lex_quoted(b'\'', TokenKind::SingleQuote, start, &mut tokens),
                _ => {
                    if is_ident_start(ch) {
                        tokens.push(self.lex_ident_or_keyword(start));
                    } else if let Some(kind) = self.lex_symbol() {
                        tokens.push(self.finish(kind, start));
                    } else {
                        self.bump();
                        let span =
                            Span::new(self.file, start.index as u32, self.index as u32);
                        self.log.push(
                            Diagnostic::error("unexpected character", span)
                                .with_code("E0100"),
                        );
                    }
                }
            }
        }

        tokens
    }

    /// Nested block comment. Consumes to the matching close or, when
    /// unbalanced, to the end of input with one diagnostic.
    fn lex_block_comment(&mut self, start: Mark) -> Option<Token> {
        self.bump(); // '/'
        self.bump(); // '*'
        let mut depth = 1u32;
        while let Some(c) = self.peek() {
            match c {
                b'/' if self.peek_next() == Some(b'*') => {
                    self.bump();
                    self.bump();
                    depth += 1;
                }
                b'*' if self.peek_next() == Some(b'/') => {
                    self.bump();
                    self.bump();
                    depth -= 1;
                    if depth == 0 {
                        return Some(self.finish(TokenKind::BlockComment, start));
                    }
                }
                b'\r' | b'\n' => {
                    self.bump();
                    if c == b'\r' && self.peek() == Some(b'\n') {
                        self.bump();
                    }
                    self.line += 1;
                    self.col = 1;
                }
                _ => {
                    self.bump();
                }
            }
        }
        let span = Span::new(self.file, start.index as u32, self.index as u32);
        self.log
            .push(Diagnostic::error("unterminated block comment", span).with_code("E0101"));
        None
    }

    /// Decimal integer or float with at most one decimal point.
    /// A trailing decimal point is an error.
    fn lex_number(&mut self, start: Mark) -> Token {
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.bump();
        }
        let kind = if self.peek() == Some(b'.') {
            if matches!(self.peek_next(), Some(b'0'..=b'9')) {
                self.bump(); // '.'
                while matches!(self.peek(), Some(b'0'..=b'9')) {
                    self.bump();
                }
                TokenKind::FloatLiteral
            } else {
                self.bump(); // '.'
                let tok = self.finish(TokenKind::IntLiteral, start);
                self.log.push(
                    Diagnostic::error("numeric literal ends with a decimal point", tok.span)
                        .with_code("E0102"),
                );
                return tok;
            }
        } else {
            TokenKind::IntLiteral
        };
        self.finish(kind, start)
    }

    /// Quote-delimited run: open quote token, one raw text token for
    /// the content (greedy to the matching unescaped quote), close
    /// quote token. A missing closing quote is an error; the run is
    /// then left open for the second pass to discard.
    fn lex_quoted(
        &mut self,
        quote: u8,
        quote_kind: TokenKind,
        start: Mark,
        tokens: &mut Vec<Token>,
    ) {
        self.bump();
        tokens.push(self.finish(quote_kind, start));

        let content = self.mark();
        while let Some(c) = self.peek() {
            if c == quote {
                tokens.push(self.finish(TokenKind::QuotedText, content));
                let close = self.mark();
                self.bump();
                tokens.push(self.finish(quote_kind, close));
                return;
            }
            match c {
                b'\\' => {
                    self.bump();
                    if self.peek().is_some() {
                        self.bump();
                    }
                }
                b'\r' | b'\n' => {
                    self.bump();
                    if c == b'\r' && self.peek() == Some(b'\n') {
                        self.bump();
                    }
                    self.line += 1;
                    self.col = 1;
                }
                _ => {
                    self.bump();
                }
            }
        }

        tokens.push(self.finish(TokenKind::QuotedText, content));
        let span = Span::new(self.file, start.index as u32, self.index as u32);
        let what = if quote == b'"' { "string" } else { "char" };
        self.log.push(
            Diagnostic::error(format!("unterminated {what} literal"), span).with_code("E0103"),
        );
    }

    fn lex_ident_or_keyword(&mut self, start: Mark) -> Token {
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.source[start.index..self.index];
        let kind = match text {
            "fn" => TokenKind::KwFn,
            "data" => TokenKind::KwData,
            "ret" => TokenKind::KwRet,
            "brk" => TokenKind::KwBrk,
            "cnt" => TokenKind::KwCnt,
            "while" => TokenKind::KwWhile,
            "if" => TokenKind::KwIf,
            "elif" => TokenKind::KwElif,
            "else" => TokenKind::KwElse,
            "switch" => TokenKind::KwSwitch,
            "case" => TokenKind::KwCase,
            "default" => TokenKind::KwDefault,
            "defer" => TokenKind::KwDefer,
            _ => TokenKind::Ident,
        };
        self.finish(kind, start)
    }

    /// Multi-character operators are matched greedily before
    /// single-character ones.
    fn lex_symbol(&mut self) -> Option<TokenKind> {
        use TokenKind::*;

        const THREE: &[(&[u8], TokenKind)] = &[(b"<<=", ShlEq), (b">>=", ShrEq)];
        const TWO: &[(&[u8], TokenKind)] = &[
            (b"<<", Shl),
            (b">>", Shr),
            (b"<=", LessEq),
            (b">=", GreaterEq),
            (b"==", EqualEqual),
            (b"!=", BangEqual),
            (b"+=", PlusEq),
            (b"-=", MinusEq),
            (b"*=", StarEq),
            (b"/=", SlashEq),
            (b"%=", PercentEq),
            (b"&=", AmpEq),
            (b"|=", BarEq),
            (b"^=", CaretEq),
        ];

        for (text, kind) in THREE {
            if self.bytes[self.index..].starts_with(text) {
                self.bump_n(3);
                return Some(*kind);
            }
        }
        for (text, kind) in TWO {
            if self.bytes[self.index..].starts_with(text) {
                self.bump_n(2);
                return Some(*kind);
            }
        }

        let kind = match self.peek()? {
            b'(' => LParen,
            b')' => RParen,
            b'{' => LBrace,
            b'}' => RBrace,
            b',' => Comma,
            b';' => Semi,
            b'.' => Dot,
            b'=' => Equal,
            b'+' => Plus,
            b'-' => Minus,
            b'*' => Star,
            b'/' => Slash,
            b'%' => Percent,
            b'&' => Amp,
            b'|' => Bar,
            b'^' => Caret,
            b'!' => Bang,
            b'<' => Less,
            b'>' => Greater,
            _ => return None,
        };
        self.bump();
        Some(kind)
    }

    fn mark(&self) -> Mark {
        Mark {
            index: self.index,
            line: self.line,
            col: self.col,
        }
    }

    fn finish(&self, kind: TokenKind, start: Mark) -> Token {
        Token {
            kind,
            span: Span::new(self.file, start.index as u32, self.index as u32),
            line: start.line,
            col: start.col,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.bytes.get(self.index + 1).copied()
    }

    fn bump(&mut self) {
        if self.index < self.bytes.len() {
            self.index += 1;
            self.col += 1;
        }
    }

    fn bump_n(&mut self, n: usize) {
        for _ in 0..n {
            self.bump();
        }
    }
}

#[derive(Clone, Copy)]
struct Mark {
    index: usize,
    line: u32,
    col: u32,
}

/// Second pass: one coalesced rebuild over the raw stream.
///
/// Comment and end-of-line tokens are dropped; each quote-delimited
/// run is rewritten into a single string/char token carrying the span
/// of the content between the quotes. Runs left unterminated by the
/// raw pass (which already diagnosed them) are discarded.
fn post_process(raw: Vec<Token>, log: &mut DiagnosticLog) -> Vec<Token> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let tok = raw[i];
        match tok.kind {
            TokenKind::LineComment | TokenKind::BlockComment | TokenKind::Eol => {
                i += 1;
            }
            TokenKind::DoubleQuote | TokenKind::SingleQuote => {
                let literal = if tok.kind == TokenKind::DoubleQuote {
                    TokenKind::StringLiteral
                } else {
                    TokenKind::CharLiteral
                };
                // Raw pass always emits [open, text] or [open, text, close].
                let text = raw[i + 1];
                debug_assert_eq!(text.kind, TokenKind::QuotedText);
                let closed = raw.get(i + 2).is_some_and(|t| t.kind == tok.kind);
                if closed {
                    out.push(Token {
                        kind: literal,
                        span: text.span,
                        line: tok.line,
                        col: tok.col,
                    });
                    i += 3;
                } else {
                    i += 2;
                }
            }
            TokenKind::QuotedText => {
                // Never produced outside a quote run by the raw pass.
                log.push(Diagnostic::error("stray quoted text", tok.span).with_code("E0103"));
                i += 1;
            }
            _ => {
                out.push(tok);
                i += 1;
            }
        }
    }
    out
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}
