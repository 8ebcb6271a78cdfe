//! Type resolution over candidate sets.
//!
//! Every expression node carries a set of still-possible type handles.
//! Resolution seeds literal nodes with every type wide enough to hold
//! them, then narrows the sets pairwise under convertibility as it
//! walks the tree. Narrowed results are written back onto BOTH
//! operands of a binary node, recursively down to the leaves, because
//! code generation only reads leaf candidate sets.
//!
//! Errors are per-node and non-fatal; resolution keeps going so one
//! run can report several independent type errors. The caller gates
//! later passes on the diagnostic log.

use crate::ast::{Ast, BinFamily, BinOp, NodeId, NodeKind, UnaryOp};
use crate::diagnostic::{Diagnostic, DiagnosticLog};
use crate::span::Span;
use crate::types::{Prim, ScopeArena, ScopeId, TypeDef, TypeRef, VarEntry};

/// Resolve every expression node reachable from `root`, mutating
/// candidate sets in place and registering `fn`/`data` declarations in
/// the scope tables.
pub fn resolve(ast: &mut Ast, root: NodeId, scopes: &mut ScopeArena, log: &mut DiagnosticLog) {
    let mut resolver = Resolver {
        ast,
        scopes,
        log,
        fn_stack: Vec::new(),
        loop_depth: 0,
    };
    resolver.resolve_stmt(root, ScopeArena::ROOT);
}

/// Per-function state for the return-set intersection rule.
struct FnCtx {
    declared_ret: Option<TypeRef>,
    /// `None` until the first `ret`; `Some(vec![])` once a bare `ret`
    /// has been seen.
    returns: Option<Vec<TypeRef>>,
}

struct Resolver<'a> {
    ast: &'a mut Ast,
    scopes: &'a mut ScopeArena,
    log: &'a mut DiagnosticLog,
    fn_stack: Vec<FnCtx>,
    /// Nesting depth of `while` bodies within the current function.
    loop_depth: u32,
}

impl Resolver<'_> {
    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn resolve_stmt(&mut self, id: NodeId, scope: ScopeId) {
        match self.ast.kind(id).clone() {
            NodeKind::Empty => {}
            NodeKind::Brk | NodeKind::Cnt => {
                if self.loop_depth == 0 {
                    let keyword =
                        if matches!(self.ast.kind(id), NodeKind::Brk) { "brk" } else { "cnt" };
                    let span = self.ast.node(id).span;
                    self.error(format!("'{keyword}' outside of a loop"), span, "E0315");
                }
            }
            NodeKind::Scope { scope: inner, stmts } => {
                self.register_declarations(&stmts, inner);
                for stmt in stmts {
                    self.resolve_stmt(stmt, inner);
                }
            }
            NodeKind::FnDef { params, ret_ty, body, .. } => {
                self.resolve_fn_body(id, &params, ret_ty, body, scope);
            }
            // Registered up front; nothing left to do per statement.
            NodeKind::DataDef { .. } => {}
            NodeKind::Decl { name, ty, init, suppress } => {
                self.resolve_decl(id, &name, ty, init, suppress, scope);
            }
            NodeKind::Assign { target, value } => {
                self.resolve_assign(target, value, scope);
            }
            NodeKind::Call { .. } => {
                self.resolve_expr(id, scope);
            }
            NodeKind::Ret { value } => {
                self.resolve_ret(id, value, scope);
            }
            NodeKind::While { cond, body } => {
                self.resolve_condition(cond, scope);
                self.loop_depth += 1;
                self.resolve_stmt(body, scope);
                self.loop_depth -= 1;
            }
            NodeKind::If { cond, then, elifs, els } => {
                self.resolve_condition(cond, scope);
                self.resolve_stmt(then, scope);
                for (elif_cond, elif_body) in elifs {
                    self.resolve_condition(elif_cond, scope);
                    self.resolve_stmt(elif_body, scope);
                }
                if let Some(els) = els {
                    self.resolve_stmt(els, scope);
                }
            }
            // Deliberately left unresolved; code generation rejects it.
            NodeKind::Switch { .. } => {}
            NodeKind::Defer { stmt } => {
                self.resolve_stmt(stmt, scope);
            }
            other => {
                let span = self.ast.node(id).span;
                self.error(format!("statement kind not resolvable: {other:?}"), span, "E0399");
            }
        }
    }

    /// First pass over a scope's statements: bind `data` type names,
    /// then `fn` signatures, so bodies can reference either regardless
    /// of declaration order.
    fn register_declarations(&mut self, stmts: &[NodeId], scope: ScopeId) {
        for &stmt in stmts {
            if let NodeKind::DataDef { name, fields } = self.ast.kind(stmt).clone() {
                let span = self.ast.node(stmt).span;
                let mut resolved = Vec::with_capacity(fields.len());
                for field in fields {
                    let NodeKind::Decl { name: fname, ty, .. } = self.ast.kind(field).clone()
                    else {
                        continue;
                    };
                    if let Some(fty) = self.resolve_type_expr(ty, scope) {
                        resolved.push((fname, fty));
                    }
                }
                if self.scopes.lookup_type(scope, &name).is_some() {
                    self.error(format!("type '{name}' is already defined"), span, "E0311");
                    continue;
                }
                self.scopes.add_type(
                    scope,
                    Some(&name),
                    TypeDef::Struct { name: name.clone(), fields: resolved },
                );
            }
        }
        for &stmt in stmts {
            if let NodeKind::FnDef { name, params, ret_ty, .. } = self.ast.kind(stmt).clone() {
                let span = self.ast.node(stmt).span;
                let mut param_tys = Vec::with_capacity(params.len());
                for param in params {
                    let NodeKind::Decl { ty, .. } = self.ast.kind(param).clone() else {
                        continue;
                    };
                    if let Some(pty) = self.resolve_type_expr(ty, scope) {
                        param_tys.push(pty);
                    }
                }
                let ret = ret_ty.and_then(|t| self.resolve_type_expr(t, scope));
                let fn_ty = self.scopes.add_type(
                    scope,
                    None,
                    TypeDef::Func { params: param_tys, ret },
                );
                if !self.scopes.declare_var(scope, &name, VarEntry::with_candidates(vec![fn_ty])) {
                    self.error(format!("'{name}' is already declared in this scope"), span, "E0311");
                }
            }
        }
    }

    fn resolve_fn_body(
        &mut self,
        id: NodeId,
        params: &[NodeId],
        ret_ty: Option<NodeId>,
        body: NodeId,
        scope: ScopeId,
    ) {
        if body == Ast::EMPTY {
            return; // bare prototype
        }
        let NodeKind::Scope { scope: body_scope, stmts } = self.ast.kind(body).clone() else {
            return;
        };
        for &param in params {
            let NodeKind::Decl { name, ty, .. } = self.ast.kind(param).clone() else {
                continue;
            };
            let span = self.ast.node(param).span;
            let Some(pty) = self.resolve_type_expr(ty, scope) else {
                continue;
            };
            self.ast.node_mut(param).candidates = vec![pty];
            if !self.scopes.declare_var(body_scope, &name, VarEntry::with_candidates(vec![pty])) {
                self.error(format!("parameter '{name}' is declared twice"), span, "E0311");
            }
        }
        let declared_ret = ret_ty.and_then(|t| self.resolve_type_expr(t, scope));
        self.fn_stack.push(FnCtx { declared_ret, returns: None });
        let saved_depth = std::mem::replace(&mut self.loop_depth, 0);
        self.register_declarations(&stmts, body_scope);
        for stmt in stmts {
            self.resolve_stmt(stmt, body_scope);
        }
        self.loop_depth = saved_depth;
        if let Some(ctx) = self.fn_stack.pop() {
            // A declared return type with no `ret` anywhere in the body
            // would leave the caller reading uninitialized result bytes.
            if ctx.declared_ret.is_some() && ctx.returns.is_none() {
                let span = self.ast.node(id).span;
                self.error(
                    "function declares a return type but never returns a value".to_string(),
                    span,
                    "E0316",
                );
            }
        }
    }

    fn resolve_decl(
        &mut self,
        id: NodeId,
        name: &str,
        ty: NodeId,
        init: Option<NodeId>,
        suppress: bool,
        scope: ScopeId,
    ) {
        let span = self.ast.node(id).span;
        let Some(declared) = self.resolve_type_expr(ty, scope) else {
            return;
        };
        if let Some(init) = init {
            self.resolve_expr(init, scope);
            let init_c = self.ast.candidates(init).to_vec();
            // No relaxation: the annotation must survive narrowing
            // against the initializer.
            if !init_c.is_empty() && !init_c.iter().any(|c| c.convertible(&declared)) {
                self.error(
                    format!("initializer is not convertible to '{}'", self.type_name(&declared)),
                    span,
                    "E0305",
                );
            } else {
                self.narrow_node(init, &[declared], scope);
            }
        }
        self.ast.node_mut(id).candidates = vec![declared];
        if !suppress
            && !self.scopes.declare_var(scope, name, VarEntry::with_candidates(vec![declared]))
        {
            self.error(format!("'{name}' is already declared in this scope"), span, "E0311");
        }
    }

    fn resolve_assign(&mut self, target: NodeId, value: NodeId, scope: ScopeId) {
        self.resolve_expr(value, scope);
        let value_c = self.ast.candidates(value).to_vec();
        if let NodeKind::Ident { name } = self.ast.kind(target).clone() {
            if self.scopes.lookup_var(scope, &name).is_none() {
                // Implicit declaration: the target adopts the value's
                // whole candidate set.
                self.scopes
                    .declare_var(scope, &name, VarEntry::with_candidates(value_c.clone()));
                self.ast.node_mut(target).candidates = value_c;
                return;
            }
        }
        self.resolve_expr(target, scope);
        let target_c = self.ast.candidates(target).to_vec();
        let common: Vec<TypeRef> = target_c
            .iter()
            .filter(|t| value_c.iter().any(|v| v.convertible(t)))
            .copied()
            .collect();
        if common.is_empty() {
            if !target_c.is_empty() && !value_c.is_empty() {
                let span = self.ast.node(target).span;
                self.error("assigned value has an incompatible type", span, "E0305");
            }
            return;
        }
        self.narrow_node(target, &common, scope);
        self.narrow_node(value, &common, scope);
    }

    fn resolve_ret(&mut self, id: NodeId, value: Option<NodeId>, scope: ScopeId) {
        let span = self.ast.node(id).span;
        let Some(ctx_index) = self.fn_stack.len().checked_sub(1) else {
            self.error("'ret' outside of a function", span, "E0312");
            return;
        };
        let mut value_c = Vec::new();
        if let Some(value) = value {
            self.resolve_expr(value, scope);
            if let Some(declared) = self.fn_stack[ctx_index].declared_ret {
                let c = self.ast.candidates(value).to_vec();
                if !c.is_empty() && !c.iter().any(|v| v.convertible(&declared)) {
                    self.error(
                        format!(
                            "return value is not convertible to '{}'",
                            self.type_name(&declared)
                        ),
                        span,
                        "E0313",
                    );
                    return;
                }
                self.narrow_node(value, &[declared], scope);
            }
            value_c = self.ast.candidates(value).to_vec();
        } else if self.fn_stack[ctx_index].declared_ret.is_some() {
            self.error("function declares a return type but 'ret' has no value", span, "E0313");
            return;
        }
        // Scope-wide intersection: the first return establishes the
        // set, every later return must narrow it, never contradict it.
        let ctx = &mut self.fn_stack[ctx_index];
        match &mut ctx.returns {
            None => ctx.returns = Some(value_c),
            Some(established) => {
                if established.is_empty() != value_c.is_empty() {
                    self.error(
                        "return disagrees with earlier returns about returning a value",
                        span,
                        "E0312",
                    );
                    return;
                }
                let narrowed: Vec<TypeRef> = established
                    .iter()
                    .filter(|e| value_c.iter().any(|v| v.convertible(e)))
                    .copied()
                    .collect();
                if narrowed.is_empty() && !established.is_empty() {
                    self.error("return type conflicts with earlier returns", span, "E0312");
                    return;
                }
                *established = narrowed;
            }
        }
    }

    fn resolve_condition(&mut self, cond: NodeId, scope: ScopeId) {
        self.resolve_expr(cond, scope);
        let c = self.ast.candidates(cond).to_vec();
        let b = self.scopes.prim(Prim::Bool);
        if !c.is_empty() && !c.iter().any(|t| t.convertible(&b)) {
            let span = self.ast.node(cond).span;
            self.error("condition must be boolean", span, "E0314");
            return;
        }
        self.narrow_node(cond, &[b], scope);
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn resolve_expr(&mut self, id: NodeId, scope: ScopeId) {
        let span = self.ast.node(id).span;
        match self.ast.kind(id).clone() {
            NodeKind::Empty => {}
            NodeKind::IntLit { value } => {
                self.ast.node_mut(id).candidates = self.int_candidates(value);
            }
            NodeKind::FloatLit { .. } => {
                self.ast.node_mut(id).candidates =
                    vec![self.scopes.prim(Prim::F32), self.scopes.prim(Prim::F64)];
            }
            NodeKind::CharLit { .. } => {
                self.ast.node_mut(id).candidates = vec![self.scopes.prim(Prim::U8)];
            }
            NodeKind::StrLit { .. } => {
                self.ast.node_mut(id).candidates = vec![self.scopes.prim(Prim::U8).pointer_to()];
            }
            NodeKind::Ident { name } => {
                let Some((_, entry)) = self.scopes.lookup_var(scope, &name) else {
                    self.error(format!("unknown identifier '{name}'"), span, "E0301");
                    return;
                };
                self.ast.node_mut(id).candidates = entry.candidates.clone();
            }
            NodeKind::IdentChain { segments } => {
                self.resolve_chain(id, &segments, scope, span);
            }
            NodeKind::Unary { op, operand } => {
                self.resolve_unary(id, op, operand, scope, span);
            }
            NodeKind::Binary { op, lhs, rhs } => {
                self.resolve_binary(id, op, lhs, rhs, scope, span);
            }
            NodeKind::Call { callee, args } => {
                self.resolve_call(id, &callee, &args, scope, span);
            }
            other => {
                self.error(format!("expression kind not resolvable: {other:?}"), span, "E0399");
            }
        }
    }

    /// Candidate set of an integer literal: every primitive wide
    /// enough to represent the value. `0` gets the zero-literal marker
    /// (null-convertible); `0` and `1` are additionally `bool`.
    fn int_candidates(&self, value: u64) -> Vec<TypeRef> {
        let mut out = Vec::new();
        let mut push = |prim: Prim| {
            let mut t = self.scopes.prim(prim);
            t.zero_lit = value == 0;
            out.push(t);
        };
        if value <= u8::MAX as u64 {
            push(Prim::U8);
        }
        if value <= u16::MAX as u64 {
            push(Prim::U16);
        }
        if value <= u32::MAX as u64 {
            push(Prim::U32);
        }
        push(Prim::U64);
        if value <= i8::MAX as u64 {
            push(Prim::S8);
        }
        if value <= i16::MAX as u64 {
            push(Prim::S16);
        }
        if value <= i32::MAX as u64 {
            push(Prim::S32);
        }
        if value <= i64::MAX as u64 {
            push(Prim::S64);
            push(Prim::Int);
        }
        push(Prim::Uint);
        if value <= 1 {
            push(Prim::Bool);
        }
        out
    }

    fn resolve_unary(&mut self, id: NodeId, op: UnaryOp, operand: NodeId, scope: ScopeId, span: Span) {
        self.resolve_expr(operand, scope);
        let c = self.ast.candidates(operand).to_vec();
        if c.is_empty() {
            return; // already diagnosed below us
        }
        match op {
            UnaryOp::Deref => {
                let derefs: Vec<TypeRef> = c.iter().filter_map(|t| t.deref()).collect();
                if derefs.is_empty() {
                    self.error("cannot dereference a non-pointer", span, "E0304");
                    return;
                }
                self.ast.node_mut(id).candidates = derefs;
            }
            UnaryOp::AddrOf => {
                self.ast.node_mut(id).candidates = c.iter().map(|t| t.pointer_to()).collect();
            }
            UnaryOp::Neg => {
                let signed: Vec<TypeRef> = c
                    .iter()
                    .filter(|t| {
                        self.prim_of(t).is_some_and(|p| {
                            p.is_numeric() && !matches!(p, Prim::U8 | Prim::U16 | Prim::U32 | Prim::U64 | Prim::Uint)
                        })
                    })
                    .copied()
                    .collect();
                if signed.is_empty() {
                    self.error("cannot negate this operand", span, "E0305");
                    return;
                }
                self.narrow_node(operand, &signed, scope);
                self.ast.node_mut(id).candidates = signed;
            }
            UnaryOp::Not => {
                let b = self.scopes.prim(Prim::Bool);
                if !c.iter().any(|t| t.convertible(&b)) {
                    self.error("'!' requires a boolean operand", span, "E0305");
                    return;
                }
                self.narrow_node(operand, &[b], scope);
                self.ast.node_mut(id).candidates = vec![b];
            }
        }
    }

    fn resolve_binary(
        &mut self,
        id: NodeId,
        op: BinOp,
        lhs: NodeId,
        rhs: NodeId,
        scope: ScopeId,
        span: Span,
    ) {
        self.resolve_expr(lhs, scope);
        self.resolve_expr(rhs, scope);
        let lhs_c = self.ast.candidates(lhs).to_vec();
        let rhs_c = self.ast.candidates(rhs).to_vec();
        if lhs_c.is_empty() || rhs_c.is_empty() {
            return; // already diagnosed below us
        }
        let family = op.family();

        let pair_ok = |a: &TypeRef, b: &TypeRef| -> bool {
            match family {
                BinFamily::Relational => a.convertible(b),
                BinFamily::Additive => {
                    (a.convertible(b) && self.is_numeric(a) && self.is_numeric(b))
                        || (a.is_pointer() && self.is_integer(b))
                        || (self.is_integer(a) && b.is_pointer())
                }
                _ => a.convertible(b) && self.is_numeric(a) && self.is_numeric(b),
            }
        };

        let lhs_new: Vec<TypeRef> = lhs_c
            .iter()
            .filter(|a| rhs_c.iter().any(|b| pair_ok(a, b)))
            .copied()
            .collect();
        let rhs_new: Vec<TypeRef> = rhs_c
            .iter()
            .filter(|b| lhs_c.iter().any(|a| pair_ok(a, b)))
            .copied()
            .collect();
        if lhs_new.is_empty() || rhs_new.is_empty() {
            self.error(
                format!("no common type for the operands of '{}'", op.symbol()),
                span,
                "E0305",
            );
            return;
        }

        let mut result: Vec<TypeRef> = Vec::new();
        for a in &lhs_new {
            for b in &rhs_new {
                if !pair_ok(a, b) {
                    continue;
                }
                let r = if a.is_pointer() {
                    *a
                } else if b.is_pointer() {
                    *b
                } else if a.zero_lit {
                    *b
                } else {
                    *a
                };
                if !result.contains(&r) {
                    result.push(r);
                }
            }
        }

        self.narrow_node(lhs, &lhs_new, scope);
        self.narrow_node(rhs, &rhs_new, scope);
        self.ast.node_mut(id).candidates = if family == BinFamily::Relational {
            vec![self.scopes.prim(Prim::Bool)]
        } else {
            result
        };
    }

    fn resolve_call(&mut self, id: NodeId, callee: &str, args: &[NodeId], scope: ScopeId, span: Span) {
        let Some((_, entry)) = self.scopes.lookup_var(scope, callee) else {
            self.error(format!("unknown function '{callee}'"), span, "E0301");
            return;
        };
        let fn_candidates: Vec<TypeRef> = entry
            .candidates
            .iter()
            .filter(|t| matches!(self.scopes.type_def(t), TypeDef::Func { .. }))
            .copied()
            .collect();
        if fn_candidates.len() != 1 {
            self.error(
                format!("'{callee}' does not name exactly one function"),
                span,
                "E0306",
            );
            return;
        }
        let fn_ty = fn_candidates[0];
        let TypeDef::Func { params, ret } = self.scopes.type_def(&fn_ty).clone() else {
            unreachable!("filtered to function candidates above");
        };
        if args.len() != params.len() {
            self.error(
                format!("'{callee}' expects {} argument(s), got {}", params.len(), args.len()),
                span,
                "E0307",
            );
            return;
        }
        // One argument at a time; ambiguity is an error, never guessed
        // away.
        for (arg, param) in args.iter().zip(&params) {
            self.resolve_expr(*arg, scope);
            let c = self.ast.candidates(*arg).to_vec();
            if c.is_empty() {
                continue;
            }
            let mut matches: Vec<TypeRef> =
                c.iter().filter(|t| t.convertible(param)).copied().collect();
            // A null literal matches every pointer through all of its
            // width candidates at once; that is one conversion, not an
            // ambiguity.
            if param.is_pointer() && !matches.is_empty() && matches.iter().all(|m| m.zero_lit) {
                matches = vec![*param];
            }
            matches.dedup();
            match matches.len() {
                0 => {
                    let arg_span = self.ast.node(*arg).span;
                    self.error(
                        format!("argument is not convertible to '{}'", self.type_name(param)),
                        arg_span,
                        "E0308",
                    );
                }
                1 => self.narrow_node(*arg, &[*param], scope),
                _ => {
                    let arg_span = self.ast.node(*arg).span;
                    self.error(
                        "argument type is ambiguous; more than one candidate converts",
                        arg_span,
                        "E0309",
                    );
                }
            }
        }
        self.ast.node_mut(id).candidates = ret.into_iter().collect();
    }

    /// Dotted access narrows across at most two segments. The second
    /// segment must name a field of some single-struct candidate of
    /// the first; every field match found is kept as an alternative.
    fn resolve_chain(&mut self, id: NodeId, segments: &[String], scope: ScopeId, span: Span) {
        if segments.len() > 2 {
            self.error("chained field access is unsupported", span, "E0302");
            return;
        }
        let base = &segments[0];
        let field = &segments[1];
        let Some((_, entry)) = self.scopes.lookup_var(scope, base) else {
            self.error(format!("unknown identifier '{base}'"), span, "E0301");
            return;
        };
        let base_c = entry.candidates.clone();
        let mut out = Vec::new();
        for t in &base_c {
            if t.is_pointer() {
                continue;
            }
            if let TypeDef::Struct { fields, .. } = self.scopes.type_def(t) {
                for (fname, fty) in fields {
                    if fname == field && !out.contains(fty) {
                        out.push(*fty);
                    }
                }
            }
        }
        if out.is_empty() {
            self.error(
                format!("no struct candidate of '{base}' has a field '{field}'"),
                span,
                "E0303",
            );
            return;
        }
        self.ast.node_mut(id).candidates = out;
    }

    // ------------------------------------------------------------------
    // Narrowing write-back
    // ------------------------------------------------------------------

    /// Project `basis` onto a node's candidate set and push the result
    /// down to the leaves. A projection that would empty an already
    /// consistent set is skipped; conflicts are reported where they
    /// are first detected, not during write-back.
    fn narrow_node(&mut self, id: NodeId, basis: &[TypeRef], scope: ScopeId) {
        let old = self.ast.candidates(id).to_vec();
        if old.is_empty() {
            return;
        }
        let narrowed: Vec<TypeRef> = basis
            .iter()
            .filter(|n| old.iter().any(|o| o.convertible(n)))
            .copied()
            .collect();
        if narrowed.is_empty() {
            return;
        }
        self.ast.node_mut(id).candidates = narrowed.clone();
        match self.ast.kind(id).clone() {
            NodeKind::Ident { name } => {
                // Uses narrow the variable itself; this is how
                // implicitly declared variables settle on one type.
                if let Some(entry) = self.scopes.lookup_var_mut(scope, &name) {
                    let kept: Vec<TypeRef> = narrowed
                        .iter()
                        .filter(|n| entry.candidates.iter().any(|o| o.convertible(n)))
                        .copied()
                        .collect();
                    if !kept.is_empty() {
                        entry.candidates = kept;
                    }
                }
            }
            NodeKind::Binary { op, lhs, rhs } => {
                if op.family() != BinFamily::Relational && !narrowed.iter().any(|t| t.is_pointer())
                {
                    self.narrow_node(lhs, &narrowed, scope);
                    self.narrow_node(rhs, &narrowed, scope);
                }
            }
            NodeKind::Unary { op: UnaryOp::Neg, operand } => {
                self.narrow_node(operand, &narrowed, scope);
            }
            NodeKind::Unary { op: UnaryOp::AddrOf, operand } => {
                let inner: Vec<TypeRef> = narrowed.iter().filter_map(|t| t.deref()).collect();
                self.narrow_node(operand, &inner, scope);
            }
            NodeKind::Unary { op: UnaryOp::Deref, operand } => {
                let outer: Vec<TypeRef> = narrowed.iter().map(|t| t.pointer_to()).collect();
                self.narrow_node(operand, &outer, scope);
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn resolve_type_expr(&mut self, id: NodeId, scope: ScopeId) -> Option<TypeRef> {
        let NodeKind::TypeExpr { name, indirection } = self.ast.kind(id).clone() else {
            return None;
        };
        let span = self.ast.node(id).span;
        let Some(mut ty) = self.scopes.lookup_type(scope, &name) else {
            self.error(format!("unknown type '{name}'"), span, "E0310");
            return None;
        };
        for _ in 0..indirection {
            ty = ty.pointer_to();
        }
        self.ast.node_mut(id).candidates = vec![ty];
        Some(ty)
    }

    fn prim_of(&self, ty: &TypeRef) -> Option<Prim> {
        if ty.is_pointer() {
            return None;
        }
        match self.scopes.type_def(ty) {
            TypeDef::Prim(p) => Some(*p),
            _ => None,
        }
    }

    fn is_numeric(&self, ty: &TypeRef) -> bool {
        self.prim_of(ty).is_some_and(Prim::is_numeric)
    }

    fn is_integer(&self, ty: &TypeRef) -> bool {
        self.prim_of(ty).is_some_and(Prim::is_integer)
    }

    fn type_name(&self, ty: &TypeRef) -> String {
        let base = match self.scopes.type_def(ty) {
            TypeDef::Prim(p) => p.name().to_string(),
            TypeDef::Struct { name, .. } => name.clone(),
            TypeDef::Func { .. } => "fn".to_string(),
        };
        format!("{}{}", "*".repeat(ty.indirection as usize), base)
    }

    fn error(&mut self, message: impl Into<String>, span: Span, code: &'static str) {
        self.log.push(Diagnostic::error(message, span).with_code(code));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::span::FileId;

    fn resolve_source(src: &str) -> (Ast, NodeId, ScopeArena, DiagnosticLog) {
        let mut log = DiagnosticLog::new();
        let tokens = tokenize(FileId(0), src, &mut log);
        let mut scopes = ScopeArena::new();
        let (mut ast, root) = parse(src, &tokens, &mut scopes, &mut log);
        assert!(!log.has_errors(), "parse failed: {:?}", log.diagnostics());
        resolve(&mut ast, root, &mut scopes, &mut log);
        (ast, root, scopes, log)
    }

    /// Candidate primitives of a bare integer literal, read off the
    /// literal node after resolving an implicit declaration (which
    /// does not narrow the seeded set).
    fn int_candidates_of(value: u64) -> Vec<Prim> {
        let (ast, _, scopes, log) = resolve_source(&format!("fn F() {{ x = {value}; }}"));
        assert!(!log.has_errors(), "{:?}", log.diagnostics());
        let mut prims = Vec::new();
        for i in 0..ast.len() {
            if let NodeKind::IntLit { .. } = ast.kind(NodeId(i as u32)) {
                for c in ast.candidates(NodeId(i as u32)) {
                    if let TypeDef::Prim(p) = scopes.type_def(c) {
                        prims.push(*p);
                    }
                }
            }
        }
        prims
    }

    #[test]
    fn literal_candidates_follow_representable_ranges() {
        let c = int_candidates_of(255);
        assert!(c.contains(&Prim::U8));
        assert!(!c.contains(&Prim::S8));
        let c = int_candidates_of(256);
        assert!(!c.contains(&Prim::U8));
        assert!(c.contains(&Prim::U16));
        let c = int_candidates_of(127);
        assert!(c.contains(&Prim::S8));
        let c = int_candidates_of(128);
        assert!(!c.contains(&Prim::S8));
        assert!(c.contains(&Prim::U8));
        let c = int_candidates_of(1u64 << 40);
        assert!(!c.contains(&Prim::U32));
        assert!(c.contains(&Prim::U64));
        assert!(c.contains(&Prim::Int));
        assert!(c.contains(&Prim::Uint));
    }

    #[test]
    fn zero_and_one_are_bool_candidates() {
        assert!(int_candidates_of(1).contains(&Prim::Bool));
        assert!(int_candidates_of(0).contains(&Prim::Bool));
        assert!(!int_candidates_of(2).contains(&Prim::Bool));
    }

    #[test]
    fn the_scenario_narrows_z_to_u32() {
        let src = "fn Main() { x u32 = 2; y u32 = 3; z u32 = x + y; ret z; }";
        let (ast, _, scopes, log) = resolve_source(src);
        assert!(!log.has_errors(), "{:?}", log.diagnostics());
        for i in 0..ast.len() {
            let id = NodeId(i as u32);
            if let NodeKind::Binary { .. } = ast.kind(id) {
                assert_eq!(ast.candidates(id), &[scopes.prim(Prim::U32)]);
            }
        }
    }

    #[test]
    fn mixed_width_addition_is_a_mismatch_at_the_operator() {
        let src = "fn F() { x u32 = 1; y s8 = -1; z = x + y; }";
        let (_, _, _, log) = resolve_source(src);
        assert_eq!(log.error_count(), 1);
        let diag = &log.diagnostics()[0];
        assert_eq!(diag.code, Some("E0305"));
        // The diagnostic points at the `+` token.
        assert_eq!(diag.span.text(src), "+");
    }

    #[test]
    fn narrowing_reaches_the_leaves_of_both_operands() {
        let src = "fn F() { x u16 = 1; y u16 = x + 3; }";
        let (ast, _, scopes, log) = resolve_source(src);
        assert!(!log.has_errors(), "{:?}", log.diagnostics());
        for i in 0..ast.len() {
            let id = NodeId(i as u32);
            if let NodeKind::IntLit { value: 3 } = ast.kind(id) {
                assert_eq!(ast.candidates(id), &[scopes.prim(Prim::U16)]);
            }
        }
    }

    #[test]
    fn zero_literal_assigns_to_pointers() {
        let src = "fn F() { x u32 = 1; p *u32 = &x; q *u32 = 0; }";
        let (_, _, _, log) = resolve_source(src);
        assert!(!log.has_errors(), "{:?}", log.diagnostics());

        let src = "fn F() { x u32 = 1; p *u32 = 5; }";
        let (_, _, _, log) = resolve_source(src);
        assert!(log.has_errors());
    }

    #[test]
    fn pointer_plus_integer_keeps_the_pointer_type() {
        let src = "fn F() { x u32 = 1; p *u32 = &x; q *u32 = p + 4; }";
        let (_, _, _, log) = resolve_source(src);
        assert!(!log.has_errors(), "{:?}", log.diagnostics());
    }

    #[test]
    fn relational_results_are_boolean() {
        let src = "fn F() { x u32 = 1; b bool = x < 2; }";
        let (_, _, _, log) = resolve_source(src);
        assert!(!log.has_errors(), "{:?}", log.diagnostics());

        let src = "fn F() { x u32 = 1; b u32 = x < 2; }";
        let (_, _, _, log) = resolve_source(src);
        assert!(log.has_errors());
    }

    #[test]
    fn calls_check_arity_and_argument_types() {
        let src = "fn Add(a u32, b u32) u32 { ret a + b; } fn F() { x u32 = Add(1, 2); }";
        let (_, _, _, log) = resolve_source(src);
        assert!(!log.has_errors(), "{:?}", log.diagnostics());

        let src = "fn Add(a u32, b u32) u32 { ret a + b; } fn F() { x u32 = Add(1); }";
        let (_, _, _, log) = resolve_source(src);
        assert_eq!(log.diagnostics()[0].code, Some("E0307"));

        let src = "fn G(p *u32) { ret; } fn F() { x f32 = 1.0; G(x); }";
        let (_, _, _, log) = resolve_source(src);
        assert_eq!(log.diagnostics()[0].code, Some("E0308"));
    }

    #[test]
    fn unknown_names_are_reported_and_resolution_continues() {
        let src = "fn F() { a u32 = nope; b u7 = 1; }";
        let (_, _, _, log) = resolve_source(src);
        // Both independent errors surface in one run.
        assert_eq!(log.error_count(), 2);
    }

    #[test]
    fn struct_fields_resolve_through_dotted_access() {
        let src = "data Point(x s32, y s32); fn F(p Point) { a s32 = p.x; }";
        let (_, _, _, log) = resolve_source(src);
        assert!(!log.has_errors(), "{:?}", log.diagnostics());

        let src = "data Point(x s32, y s32); fn F(p Point) { a s32 = p.z; }";
        let (_, _, _, log) = resolve_source(src);
        assert_eq!(log.diagnostics()[0].code, Some("E0303"));
    }

    #[test]
    fn chains_longer_than_two_segments_are_rejected() {
        let src = "data P(x s32, y s32); data Q(p P, t s32); fn F(q Q) { a s32 = q.p.x; }";
        let (_, _, _, log) = resolve_source(src);
        assert_eq!(log.diagnostics()[0].code, Some("E0302"));
    }

    #[test]
    fn later_returns_intersect_with_earlier_ones() {
        let src = "fn F(c bool) { if c { ret 1; }; ret; }";
        let (_, _, _, log) = resolve_source(src);
        assert_eq!(log.diagnostics()[0].code, Some("E0312"));
    }

    #[test]
    fn redeclaration_is_an_error() {
        let src = "fn F() { x u32 = 1; x u32 = 2; }";
        let (_, _, _, log) = resolve_source(src);
        assert_eq!(log.diagnostics()[0].code, Some("E0311"));
    }

    #[test]
    fn implicit_declarations_adopt_the_value_type() {
        let src = "fn F() { x u32 = 1; z = x + 1; y u32 = z; }";
        let (_, _, _, log) = resolve_source(src);
        assert!(!log.has_errors(), "{:?}", log.diagnostics());
    }

    #[test]
    fn brk_and_cnt_outside_a_loop_are_reported() {
        let (_, _, _, log) = resolve_source("fn F() { brk; }");
        assert_eq!(log.error_count(), 1);
        assert_eq!(log.diagnostics()[0].code, Some("E0315"));

        // An `if` does not make a loop context.
        let (_, _, _, log) = resolve_source("fn F(c bool) { if c { cnt; }; }");
        assert_eq!(log.error_count(), 1);
        assert_eq!(log.diagnostics()[0].code, Some("E0315"));

        let (_, _, _, log) =
            resolve_source("fn F(c bool) { while c { if c { brk; }; cnt; }; }");
        assert!(!log.has_errors(), "{:?}", log.diagnostics());
    }

    #[test]
    fn a_declared_return_type_requires_a_return() {
        let (_, _, _, log) = resolve_source("fn F() u32 { x u32 = 1; }");
        assert_eq!(log.error_count(), 1);
        assert_eq!(log.diagnostics()[0].code, Some("E0316"));

        // A return inside a branch satisfies the check.
        let (_, _, _, log) = resolve_source("fn F(c bool) u32 { if c { ret 1; }; ret 2; }");
        assert!(!log.has_errors(), "{:?}", log.diagnostics());
    }
}
