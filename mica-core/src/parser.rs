//! Recursive-descent parser for the Mica language.
//!
//! One parsing function per grammar production. The parser builds the
//! AST arena directly from the token stream and creates the lexical
//! scope for every `{ ... }` block as it goes; symbol registration
//! into those scopes happens later, in the resolver.
//!
//! Expressions use a five-tier precedence chain (tightest to loosest:
//! multiplicative, additive, bitwise, shift, relational). Each tier is
//! at most a single binary application, never a left-associative fold;
//! `a + b + c` needs parentheses. This is a deliberate grammar
//! restriction.
//!
//! Every parse function short-circuits to the placeholder node as soon
//! as the diagnostic log is non-empty, so one failure does not cascade
//! into misleading downstream errors.

use crate::ast::{Ast, BinOp, NodeId, NodeKind, UnaryOp};
use crate::diagnostic::{Diagnostic, DiagnosticLog};
use crate::lexer::{Token, TokenKind};
use crate::span::Span;
use crate::types::{ScopeArena, ScopeId};

/// Parse a token stream into an AST.
///
/// Returns the arena and the root scope node. Callers must check the
/// diagnostic log before trusting the result.
pub fn parse(
    source: &str,
    tokens: &[Token],
    scopes: &mut ScopeArena,
    log: &mut DiagnosticLog,
) -> (Ast, NodeId) {
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        ast: Ast::new(),
        scopes,
        scope_stack: vec![ScopeArena::ROOT],
        log,
    };
    let root = parser.parse_unit();
    (parser.ast, root)
}

struct Parser<'a> {
    source: &'a str,
    tokens: &'a [Token],
    pos: usize,
    ast: Ast,
    scopes: &'a mut ScopeArena,
    scope_stack: Vec<ScopeId>,
    log: &'a mut DiagnosticLog,
}

impl Parser<'_> {
    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_unit(&mut self) -> NodeId {
        let start = self.peek().span;
        let mut stmts = Vec::new();
        while !self.at(TokenKind::Eof) && !self.log.has_errors() {
            let stmt = self.parse_statement();
            if stmt != Ast::EMPTY {
                stmts.push(stmt);
            }
        }
        self.ast.push(
            NodeKind::Scope {
                scope: ScopeArena::ROOT,
                stmts,
            },
            start,
        )
    }

    fn parse_statement(&mut self) -> NodeId {
        if self.log.has_errors() {
            return Ast::EMPTY;
        }
        match self.peek().kind {
            TokenKind::KwFn => self.parse_fn(),
            TokenKind::KwData => self.parse_data(),
            TokenKind::KwRet => self.parse_ret(),
            TokenKind::KwBrk => {
                let span = self.advance().span;
                self.expect_semi();
                self.ast.push(NodeKind::Brk, span)
            }
            TokenKind::KwCnt => {
                let span = self.advance().span;
                self.expect_semi();
                self.ast.push(NodeKind::Cnt, span)
            }
            TokenKind::KwWhile => self.parse_while(),
            TokenKind::KwIf => self.parse_if(),
            TokenKind::KwSwitch => self.parse_switch(),
            TokenKind::KwDefer => self.parse_defer(),
            TokenKind::LBrace => {
                let scope = self.parse_block_scope();
                self.eat(TokenKind::Semi);
                scope
            }
            TokenKind::Ident => self.parse_ident_statement(),
            _ => {
                let tok = self.peek();
                self.error_at("unexpected token at start of statement", tok.span, "E0200");
                Ast::EMPTY
            }
        }
    }

    /// Statements introduced by a bare identifier: call, declaration,
    /// or assignment (which may implicitly declare).
    fn parse_ident_statement(&mut self) -> NodeId {
        match self.peek_next().kind {
            TokenKind::LParen => {
                let call = self.parse_call_expr();
                self.expect_semi();
                call
            }
            TokenKind::Ident | TokenKind::Star => self.parse_decl(false),
            TokenKind::Equal | TokenKind::Dot => self.parse_assign(),
            _ => {
                let tok = self.peek_next();
                self.error_at("unexpected token after identifier", tok.span, "E0201");
                Ast::EMPTY
            }
        }
    }

    fn parse_fn(&mut self) -> NodeId {
        let start = self.advance().span; // fn
        let name_tok = self.expect(TokenKind::Ident, "function name");
        let name = name_tok.text(self.source).to_string();

        self.expect(TokenKind::LParen, "'('");
        let mut params = Vec::new();
        while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) && !self.log.has_errors() {
            let param = self.parse_field_decl("parameter");
            if param != Ast::EMPTY {
                params.push(param);
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'");

        let ret_ty = if self.at(TokenKind::Ident) || self.at(TokenKind::Star) {
            Some(self.parse_type_expr())
        } else {
            None
        };

        let body = if self.at(TokenKind::LBrace) {
            let body = self.parse_block_scope();
            self.eat(TokenKind::Semi);
            body
        } else {
            // Bare prototype.
            self.expect_semi();
            Ast::EMPTY
        };

        self.ast.push(
            NodeKind::FnDef {
                name,
                params,
                ret_ty,
                body,
            },
            start.merge(name_tok.span),
        )
    }

    fn parse_data(&mut self) -> NodeId {
        let start = self.advance().span; // data
        let name_tok = self.expect(TokenKind::Ident, "struct name");
        let name = name_tok.text(self.source).to_string();

        self.expect(TokenKind::LParen, "'('");
        let mut fields = Vec::new();
        while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) && !self.log.has_errors() {
            let field = self.parse_field_decl("field");
            if field != Ast::EMPTY {
                fields.push(field);
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'");
        self.expect_semi();

        self.ast
            .push(NodeKind::DataDef { name, fields }, start.merge(name_tok.span))
    }

    /// `name type` with no initializer; used for parameters and struct
    /// fields, which never enter the enclosing scope's variable table.
    fn parse_field_decl(&mut self, what: &str) -> NodeId {
        if self.log.has_errors() {
            return Ast::EMPTY;
        }
        let name_tok = self.expect(TokenKind::Ident, what);
        let name = name_tok.text(self.source).to_string();
        let ty = self.parse_type_expr();
        self.ast.push(
            NodeKind::Decl {
                name,
                ty,
                init: None,
                suppress: true,
            },
            name_tok.span,
        )
    }

    fn parse_decl(&mut self, suppress: bool) -> NodeId {
        let name_tok = self.advance();
        let name = name_tok.text(self.source).to_string();
        let ty = self.parse_type_expr();
        let init = if self.eat(TokenKind::Equal) {
            Some(self.parse_expr())
        } else {
            None
        };
        self.expect_semi();
        self.ast.push(
            NodeKind::Decl {
                name,
                ty,
                init,
                suppress,
            },
            name_tok.span,
        )
    }

    fn parse_type_expr(&mut self) -> NodeId {
        if self.log.has_errors() {
            return Ast::EMPTY;
        }
        let start = self.peek().span;
        let mut indirection = 0u32;
        while self.eat(TokenKind::Star) {
            indirection += 1;
        }
        let name_tok = self.expect(TokenKind::Ident, "type name");
        let name = name_tok.text(self.source).to_string();
        self.ast.push(
            NodeKind::TypeExpr { name, indirection },
            start.merge(name_tok.span),
        )
    }

    fn parse_assign(&mut self) -> NodeId {
        let target = self.parse_ident_chain();
        self.expect(TokenKind::Equal, "'='");
        let value = self.parse_expr();
        self.expect_semi();
        let span = self.ast.node(target).span;
        self.ast.push(NodeKind::Assign { target, value }, span)
    }

    fn parse_ret(&mut self) -> NodeId {
        let span = self.advance().span; // ret
        let value = if self.at(TokenKind::Semi) {
            None
        } else {
            Some(self.parse_expr())
        };
        self.expect_semi();
        self.ast.push(NodeKind::Ret { value }, span)
    }

    fn parse_while(&mut self) -> NodeId {
        let span = self.advance().span; // while
        let cond = self.parse_expr();
        let body = self.parse_block_scope();
        self.eat(TokenKind::Semi);
        self.ast.push(NodeKind::While { cond, body }, span)
    }

    fn parse_if(&mut self) -> NodeId {
        let span = self.advance().span; // if
        let cond = self.parse_expr();
        let then = self.parse_block_scope();
        let mut elifs = Vec::new();
        while self.at(TokenKind::KwElif) && !self.log.has_errors() {
            self.advance();
            let elif_cond = self.parse_expr();
            let elif_body = self.parse_block_scope();
            elifs.push((elif_cond, elif_body));
        }
        let els = if self.at(TokenKind::KwElse) {
            self.advance();
            Some(self.parse_block_scope())
        } else {
            None
        };
        self.eat(TokenKind::Semi);
        self.ast.push(
            NodeKind::If {
                cond,
                then,
                elifs,
                els,
            },
            span,
        )
    }

    /// Parsed for completeness; resolution and code generation of
    /// switch statements are unimplemented downstream.
    fn parse_switch(&mut self) -> NodeId {
        let span = self.advance().span; // switch
        let scrutinee = self.parse_expr();
        self.expect(TokenKind::LBrace, "'{'");
        let mut cases = Vec::new();
        let mut default = None;
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) && !self.log.has_errors() {
            if self.eat(TokenKind::KwCase) {
                let value = self.parse_expr();
                let body = self.parse_block_scope();
                cases.push((value, body));
            } else if self.eat(TokenKind::KwDefault) {
                default = Some(self.parse_block_scope());
            } else {
                let tok = self.peek();
                self.error_at("expected 'case' or 'default'", tok.span, "E0202");
            }
        }
        self.expect(TokenKind::RBrace, "'}'");
        self.eat(TokenKind::Semi);
        self.ast.push(
            NodeKind::Switch {
                scrutinee,
                cases,
                default,
            },
            span,
        )
    }

    /// `defer` wraps exactly a return, call or assignment; anything
    /// else is rejected at parse time.
    fn parse_defer(&mut self) -> NodeId {
        let span = self.advance().span; // defer
        let stmt = self.parse_statement();
        if !self.log.has_errors()
            && !matches!(
                self.ast.kind(stmt),
                NodeKind::Ret { .. } | NodeKind::Call { .. } | NodeKind::Assign { .. }
            )
        {
            self.error_at(
                "defer must wrap a return, call or assignment",
                self.ast.node(stmt).span,
                "E0209",
            );
            return Ast::EMPTY;
        }
        self.ast.push(NodeKind::Defer { stmt }, span)
    }

    fn parse_block_scope(&mut self) -> NodeId {
        if self.log.has_errors() {
            return Ast::EMPTY;
        }
        let open = self.expect(TokenKind::LBrace, "'{'");
        let scope = self.scopes.push_scope(self.current_scope());
        self.scope_stack.push(scope);
        let mut stmts = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) && !self.log.has_errors() {
            let stmt = self.parse_statement();
            if stmt != Ast::EMPTY {
                stmts.push(stmt);
            }
        }
        self.expect(TokenKind::RBrace, "'}'");
        self.scope_stack.pop();
        self.ast.push(NodeKind::Scope { scope, stmts }, open.span)
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn parse_expr(&mut self) -> NodeId {
        self.parse_e5()
    }

    /// Relational/equality tier (loosest).
    fn parse_e5(&mut self) -> NodeId {
        let lhs = self.parse_e4();
        let op = match self.peek().kind {
            TokenKind::Less => BinOp::Lt,
            TokenKind::Greater => BinOp::Gt,
            TokenKind::LessEq => BinOp::Le,
            TokenKind::GreaterEq => BinOp::Ge,
            TokenKind::EqualEqual => BinOp::Eq,
            TokenKind::BangEqual => BinOp::Ne,
            _ => return lhs,
        };
        self.binary_tail(op, lhs, Self::parse_e4)
    }

    /// Shift tier.
    fn parse_e4(&mut self) -> NodeId {
        let lhs = self.parse_e3();
        let op = match self.peek().kind {
            TokenKind::Shl => BinOp::Shl,
            TokenKind::Shr => BinOp::Shr,
            _ => return lhs,
        };
        self.binary_tail(op, lhs, Self::parse_e3)
    }

    /// Bitwise tier.
    fn parse_e3(&mut self) -> NodeId {
        let lhs = self.parse_e2();
        let op = match self.peek().kind {
            TokenKind::Amp => BinOp::BitAnd,
            TokenKind::Bar => BinOp::BitOr,
            TokenKind::Caret => BinOp::BitXor,
            _ => return lhs,
        };
        self.binary_tail(op, lhs, Self::parse_e2)
    }

    /// Additive tier.
    fn parse_e2(&mut self) -> NodeId {
        let lhs = self.parse_e1();
        let op = match self.peek().kind {
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            _ => return lhs,
        };
        self.binary_tail(op, lhs, Self::parse_e1)
    }

    /// Multiplicative tier (tightest binary tier).
    fn parse_e1(&mut self) -> NodeId {
        let lhs = self.parse_e0();
        let op = match self.peek().kind {
            TokenKind::Star => BinOp::Mul,
            TokenKind::Slash => BinOp::Div,
            TokenKind::Percent => BinOp::Mod,
            _ => return lhs,
        };
        self.binary_tail(op, lhs, Self::parse_e0)
    }

    /// One binary application: the operator token has already been
    /// matched but not consumed. The node's span is the operator's, so
    /// type-mismatch diagnostics point at it.
    fn binary_tail(
        &mut self,
        op: BinOp,
        lhs: NodeId,
        next_tier: fn(&mut Self) -> NodeId,
    ) -> NodeId {
        let op_span = self.advance().span;
        let rhs = next_tier(self);
        if self.log.has_errors() {
            return Ast::EMPTY;
        }
        self.ast.push(NodeKind::Binary { op, lhs, rhs }, op_span)
    }

    /// Base tier: literals, identifier chains, parenthesized
    /// expressions, calls, and unary operators.
    fn parse_e0(&mut self) -> NodeId {
        if self.log.has_errors() {
            return Ast::EMPTY;
        }
        let tok = self.peek();
        match tok.kind {
            TokenKind::IntLiteral => {
                self.advance();
                let value = match tok.text(self.source).parse::<u64>() {
                    Ok(v) => v,
                    Err(_) => {
                        self.error_at("integer literal too large", tok.span, "E0105");
                        0
                    }
                };
                self.ast.push(NodeKind::IntLit { value }, tok.span)
            }
            TokenKind::FloatLiteral => {
                self.advance();
                let value = tok.text(self.source).parse::<f64>().unwrap_or(0.0);
                self.ast.push(NodeKind::FloatLit { value }, tok.span)
            }
            TokenKind::StringLiteral => {
                self.advance();
                let value = tok.text(self.source).to_string();
                self.ast.push(NodeKind::StrLit { value }, tok.span)
            }
            TokenKind::CharLiteral => {
                self.advance();
                let value = match char_value(tok.text(self.source)) {
                    Some(v) => v,
                    None => {
                        self.error_at("invalid char literal", tok.span, "E0104");
                        0
                    }
                };
                self.ast.push(NodeKind::CharLit { value }, tok.span)
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr();
                self.expect(TokenKind::RParen, "')'");
                inner
            }
            TokenKind::Star => self.unary(UnaryOp::Deref),
            TokenKind::Amp => self.unary(UnaryOp::AddrOf),
            TokenKind::Minus => self.unary(UnaryOp::Neg),
            TokenKind::Bang => self.unary(UnaryOp::Not),
            TokenKind::Ident => match self.peek_next().kind {
                TokenKind::LParen => self.parse_call_expr(),
                TokenKind::Dot => self.parse_ident_chain(),
                _ => {
                    self.advance();
                    let name = tok.text(self.source).to_string();
                    self.ast.push(NodeKind::Ident { name }, tok.span)
                }
            },
            _ => {
                self.error_at("expected expression", tok.span, "E0203");
                Ast::EMPTY
            }
        }
    }

    fn unary(&mut self, op: UnaryOp) -> NodeId {
        let span = self.advance().span;
        let operand = self.parse_e0();
        if self.log.has_errors() {
            return Ast::EMPTY;
        }
        self.ast.push(NodeKind::Unary { op, operand }, span)
    }

    fn parse_call_expr(&mut self) -> NodeId {
        let name_tok = self.advance();
        let callee = name_tok.text(self.source).to_string();
        self.expect(TokenKind::LParen, "'('");
        let mut args = Vec::new();
        while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) && !self.log.has_errors() {
            args.push(self.parse_expr());
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'");
        self.ast.push(NodeKind::Call { callee, args }, name_tok.span)
    }

    /// An identifier or a dotted chain (`point.x`).
    fn parse_ident_chain(&mut self) -> NodeId {
        let first = self.advance();
        let mut segments = vec![first.text(self.source).to_string()];
        let mut span = first.span;
        while self.eat(TokenKind::Dot) {
            let seg = self.expect(TokenKind::Ident, "field name");
            segments.push(seg.text(self.source).to_string());
            span = span.merge(seg.span);
        }
        if segments.len() == 1 {
            let name = segments.pop().unwrap();
            self.ast.push(NodeKind::Ident { name }, span)
        } else {
            self.ast.push(NodeKind::IdentChain { segments }, span)
        }
    }

    // ------------------------------------------------------------------
    // Token plumbing
    // ------------------------------------------------------------------

    fn peek(&self) -> Token {
        self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_next(&self) -> Token {
        self.tokens[(self.pos + 1).min(self.tokens.len() - 1)]
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            return true;
        }
        false
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Token {
        let tok = self.peek();
        if tok.kind == kind {
            return self.advance();
        }
        if !self.log.has_errors() {
            self.error_at(format!("expected {what}"), tok.span, "E0204");
        }
        tok
    }

    fn expect_semi(&mut self) {
        self.expect(TokenKind::Semi, "';'");
    }

    fn error_at(&mut self, message: impl Into<String>, span: Span, code: &'static str) {
        self.log.push(Diagnostic::error(message, span).with_code(code));
    }

    fn current_scope(&self) -> ScopeId {
        *self.scope_stack.last().unwrap()
    }
}

/// Value of a char literal's raw text, handling the basic escapes.
fn char_value(text: &str) -> Option<u8> {
    let bytes = text.as_bytes();
    match bytes {
        [b] => Some(*b),
        [b'\\', e] => Some(match e {
            b'n' => b'\n',
            b't' => b'\t',
            b'r' => b'\r',
            b'0' => 0,
            other => *other,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::span::FileId;

    fn parse_source(src: &str) -> (Ast, NodeId, ScopeArena, DiagnosticLog) {
        let mut log = DiagnosticLog::new();
        let tokens = tokenize(FileId(0), src, &mut log);
        assert!(!log.has_errors(), "lexing failed: {:?}", log.diagnostics());
        let mut scopes = ScopeArena::new();
        let (ast, root) = parse(src, &tokens, &mut scopes, &mut log);
        (ast, root, scopes, log)
    }

    fn root_stmts(ast: &Ast, root: NodeId) -> Vec<NodeId> {
        match ast.kind(root) {
            NodeKind::Scope { stmts, .. } => stmts.clone(),
            other => panic!("root is not a scope: {other:?}"),
        }
    }

    #[test]
    fn parses_the_scenario_function() {
        let src = "fn Main() { x u32 = 2; y u32 = 3; z u32 = x + y; ret z; }";
        let (ast, root, _, log) = parse_source(src);
        assert!(!log.has_errors(), "{:?}", log.diagnostics());
        let stmts = root_stmts(&ast, root);
        assert_eq!(stmts.len(), 1);
        let NodeKind::FnDef { name, params, body, .. } = ast.kind(stmts[0]) else {
            panic!("expected a function definition");
        };
        assert_eq!(name, "Main");
        assert!(params.is_empty());
        let NodeKind::Scope { stmts: body_stmts, .. } = ast.kind(*body) else {
            panic!("expected a body scope");
        };
        assert_eq!(body_stmts.len(), 4);
        assert!(matches!(ast.kind(body_stmts[3]), NodeKind::Ret { value: Some(_) }));
    }

    #[test]
    fn parses_struct_declarations() {
        let (ast, root, _, log) = parse_source("data Point(x s32, y s32);");
        assert!(!log.has_errors());
        let stmts = root_stmts(&ast, root);
        let NodeKind::DataDef { name, fields } = ast.kind(stmts[0]) else {
            panic!("expected a data declaration");
        };
        assert_eq!(name, "Point");
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn each_tier_is_a_single_application() {
        // `a + b + c` is rejected; the grammar requires parentheses.
        let (_, _, _, log) = parse_source("fn F() { x u32 = a + b + c; }");
        assert!(log.has_errors());

        let (ast, root, _, log) = parse_source("fn F() { x u32 = (a + b) + c; }");
        assert!(!log.has_errors(), "{:?}", log.diagnostics());
        let _ = root_stmts(&ast, root);
    }

    #[test]
    fn multiplicative_binds_tighter_than_additive() {
        let (ast, root, _, log) = parse_source("fn F() { x u32 = a + b * c; }");
        assert!(!log.has_errors());
        let stmts = root_stmts(&ast, root);
        let NodeKind::FnDef { body, .. } = ast.kind(stmts[0]) else { panic!() };
        let NodeKind::Scope { stmts, .. } = ast.kind(*body) else { panic!() };
        let NodeKind::Decl { init: Some(init), .. } = ast.kind(stmts[0]) else { panic!() };
        let NodeKind::Binary { op, rhs, .. } = ast.kind(*init) else {
            panic!("expected a binary initializer");
        };
        assert_eq!(*op, BinOp::Add);
        assert!(matches!(ast.kind(*rhs), NodeKind::Binary { op: BinOp::Mul, .. }));
    }

    #[test]
    fn relational_is_the_loosest_tier() {
        let (ast, root, _, log) = parse_source("fn F() { b bool = x + y < z * w; }");
        assert!(!log.has_errors());
        let stmts = root_stmts(&ast, root);
        let NodeKind::FnDef { body, .. } = ast.kind(stmts[0]) else { panic!() };
        let NodeKind::Scope { stmts, .. } = ast.kind(*body) else { panic!() };
        let NodeKind::Decl { init: Some(init), .. } = ast.kind(stmts[0]) else { panic!() };
        assert!(matches!(ast.kind(*init), NodeKind::Binary { op: BinOp::Lt, .. }));
    }

    #[test]
    fn unary_operators_nest_in_the_base_tier() {
        let (ast, root, _, log) = parse_source("fn F() { p *u32 = &x; v u32 = *p; n s32 = -1; }");
        assert!(!log.has_errors(), "{:?}", log.diagnostics());
        let _ = root_stmts(&ast, root);
    }

    #[test]
    fn dotted_chains_parse_as_ident_chains() {
        let (ast, root, _, log) = parse_source("fn F() { a s32 = p.x; }");
        assert!(!log.has_errors());
        let stmts = root_stmts(&ast, root);
        let NodeKind::FnDef { body, .. } = ast.kind(stmts[0]) else { panic!() };
        let NodeKind::Scope { stmts, .. } = ast.kind(*body) else { panic!() };
        let NodeKind::Decl { init: Some(init), .. } = ast.kind(stmts[0]) else { panic!() };
        let NodeKind::IdentChain { segments } = ast.kind(*init) else {
            panic!("expected an identifier chain");
        };
        assert_eq!(segments, &["p", "x"]);
    }

    #[test]
    fn defer_accepts_only_return_call_or_assignment() {
        let (_, _, _, log) = parse_source("fn F() { defer cleanup(); }");
        assert!(!log.has_errors(), "{:?}", log.diagnostics());

        let (_, _, _, log) = parse_source("fn F() { defer brk; }");
        assert!(log.has_errors());
        assert_eq!(log.diagnostics()[0].code, Some("E0209"));
    }

    #[test]
    fn first_error_stops_further_statement_parsing() {
        // The bad statement produces exactly one diagnostic even with
        // more statements (also broken) behind it.
        let (_, _, _, log) = parse_source("fn F() { x u32 = ; y u32 = ; }");
        assert_eq!(log.error_count(), 1);
    }

    #[test]
    fn control_flow_forms_parse() {
        let src = "fn F() {\
                     while x < y { x = x + 1; };\
                     if x == y { ret; } elif x > y { ret; } else { ret; };\
                     switch x { case 1 { ret; } default { ret; } };\
                   }";
        let (_, _, _, log) = parse_source(src);
        assert!(!log.has_errors(), "{:?}", log.diagnostics());
    }

    #[test]
    fn block_scopes_nest_in_the_scope_arena() {
        let (_, _, scopes, log) = parse_source("fn F() { { x u32 = 1; } }");
        assert!(!log.has_errors());
        // Root + function body + inner block.
        let inner = ScopeId(2);
        assert_eq!(scopes.scope(inner).parent, Some(ScopeId(1)));
        assert_eq!(scopes.scope(ScopeId(1)).parent, Some(ScopeArena::ROOT));
    }
}
