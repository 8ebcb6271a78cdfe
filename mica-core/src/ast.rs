//! AST for the Mica language.
//!
//! Nodes live in an index-stable arena and are addressed by
//! [`NodeId`]; node-to-node links are handles into the same arena,
//! never references. After construction a node is only ever mutated to
//! narrow its candidate type set or to attach a layout computed by a
//! later pass.

use crate::layout::Layout;
use crate::span::Span;
use crate::types::{ScopeId, TypeRef};

/// Stable handle to a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(pub u32);

/// Unary operators of the base expression tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `*p`
    Deref,
    /// `&x`
    AddrOf,
    /// `-x`
    Neg,
    /// `!x`
    Not,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Deref => "*",
            UnaryOp::AddrOf => "&",
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        }
    }
}

/// Binary operators across the five precedence tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

/// Operator families; each corresponds to one precedence tier and one
/// narrowing rule in the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinFamily {
    Multiplicative,
    Additive,
    Bitwise,
    Shift,
    Relational,
}

impl BinOp {
    pub fn family(self) -> BinFamily {
        match self {
            BinOp::Mul | BinOp::Div | BinOp::Mod => BinFamily::Multiplicative,
            BinOp::Add | BinOp::Sub => BinFamily::Additive,
            BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => BinFamily::Bitwise,
            BinOp::Shl | BinOp::Shr => BinFamily::Shift,
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge | BinOp::Eq | BinOp::Ne => {
                BinFamily::Relational
            }
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
        }
    }
}

/// One tagged variant per grammar production.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Placeholder returned by parse functions once the diagnostic log
    /// is non-empty; also node 0 of every arena.
    Empty,

    /// `{ stmt; ... }` with its own symbol tables.
    Scope { scope: ScopeId, stmts: Vec<NodeId> },

    /// `fn name(params) [ret] { body }`; `body` is [`Ast::EMPTY`] for
    /// a bare prototype.
    FnDef {
        name: String,
        params: Vec<NodeId>,
        ret_ty: Option<NodeId>,
        body: NodeId,
    },

    /// `data name(field type, ...)`.
    DataDef { name: String, fields: Vec<NodeId> },

    /// `name type [= init]`. `suppress` marks struct fields and
    /// function parameters, which must not pollute the enclosing
    /// scope's variable table.
    Decl {
        name: String,
        ty: NodeId,
        init: Option<NodeId>,
        suppress: bool,
    },

    /// Type annotation: `*...*name`.
    TypeExpr { name: String, indirection: u32 },

    /// `target = value`; the target may be a bare identifier (possibly
    /// an implicit declaration) or a dotted chain.
    Assign { target: NodeId, value: NodeId },

    /// `callee(args...)`, as a statement or an expression.
    Call { callee: String, args: Vec<NodeId> },

    /// `ret [expr]`.
    Ret { value: Option<NodeId> },

    /// `brk`.
    Brk,
    /// `cnt`.
    Cnt,

    /// `while cond { body }`.
    While { cond: NodeId, body: NodeId },

    /// `if cond { } [elif cond { }]* [else { }]`.
    If {
        cond: NodeId,
        then: NodeId,
        elifs: Vec<(NodeId, NodeId)>,
        els: Option<NodeId>,
    },

    /// `switch expr { case expr { } ... [default { }] }`. Parsed but
    /// not resolved or generated.
    Switch {
        scrutinee: NodeId,
        cases: Vec<(NodeId, NodeId)>,
        default: Option<NodeId>,
    },

    /// `defer stmt` where stmt is a return, call or assignment.
    Defer { stmt: NodeId },

    /// A single identifier.
    Ident { name: String },

    /// A dotted chain, e.g. `point.x`.
    IdentChain { segments: Vec<String> },

    IntLit { value: u64 },
    FloatLit { value: f64 },
    StrLit { value: String },
    CharLit { value: u8 },

    Unary { op: UnaryOp, operand: NodeId },
    Binary { op: BinOp, lhs: NodeId, rhs: NodeId },
}

/// An AST node plus the results later passes attach to it.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    /// Still-possible resolved types; narrowed during resolution.
    pub candidates: Vec<TypeRef>,
    /// Concrete layout, attached during code generation.
    pub layout: Option<Layout>,
}

/// Arena owning every node of one compilation unit. Nodes are
/// allocated once and never freed individually.
#[derive(Debug)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    /// The shared placeholder node.
    pub const EMPTY: NodeId = NodeId(0);

    pub fn new() -> Ast {
        Ast {
            nodes: vec![Node {
                kind: NodeKind::Empty,
                span: Span::new(crate::span::FileId(0), 0, 0),
                candidates: Vec::new(),
                layout: None,
            }],
        }
    }

    pub fn push(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            span,
            candidates: Vec::new(),
            layout: None,
        });
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn candidates(&self, id: NodeId) -> &[TypeRef] {
        &self.node(id).candidates
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }
}

impl Default for Ast {
    fn default() -> Self {
        Ast::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::FileId;

    #[test]
    fn arena_handles_are_stable_across_pushes() {
        let mut ast = Ast::new();
        let span = Span::new(FileId(0), 0, 0);
        let a = ast.push(NodeKind::IntLit { value: 1 }, span);
        let b = ast.push(
            NodeKind::Unary {
                op: UnaryOp::Neg,
                operand: a,
            },
            span,
        );
        for _ in 0..100 {
            ast.push(NodeKind::Brk, span);
        }
        assert_eq!(ast.kind(a), &NodeKind::IntLit { value: 1 });
        assert!(matches!(ast.kind(b), NodeKind::Unary { operand, .. } if *operand == a));
    }

    #[test]
    fn node_zero_is_the_placeholder() {
        let ast = Ast::new();
        assert_eq!(ast.kind(Ast::EMPTY), &NodeKind::Empty);
    }

    #[test]
    fn operator_families_match_the_precedence_tiers() {
        assert_eq!(BinOp::Mul.family(), BinFamily::Multiplicative);
        assert_eq!(BinOp::Sub.family(), BinFamily::Additive);
        assert_eq!(BinOp::BitXor.family(), BinFamily::Bitwise);
        assert_eq!(BinOp::Shr.family(), BinFamily::Shift);
        assert_eq!(BinOp::Ne.family(), BinFamily::Relational);
    }
}
