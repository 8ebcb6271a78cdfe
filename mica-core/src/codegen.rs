//! Code generation: lowers a resolved AST to the flat instruction
//! list.
//!
//! The generator walks scopes the same way the resolver did, assigning
//! frame-relative byte offsets to every data variable as each scope is
//! entered and materializing every expression sub-result in a fresh
//! temporary slot. Control flow lowers to `Jump`/`JumpIfZero` with
//! back-patched targets. Deferred statements are buffered per function
//! and replayed before every `ret` and at the end of the body.
//!
//! Code generation runs only against a clean diagnostic log, so any
//! inconsistency found here is an implementation invariant violation
//! and panics; the one user-facing failure is a missing entry
//! function, which surfaces as [`CoreError::MissingEntry`].

use crate::ast::{Ast, NodeId, NodeKind};
use crate::error::CoreError;
use crate::ir::{Instr, Local, Program};
use crate::layout::{layout_of, Layout, LayoutKind};
use crate::types::{ScopeArena, ScopeId, TypeDef, TypeRef};

/// Name every program must define: a function taking no parameters.
pub const ENTRY_FUNCTION: &str = "Main";

/// Lower the resolved AST rooted at `root` to a [`Program`].
pub fn generate(
    ast: &Ast,
    root: NodeId,
    scopes: &mut ScopeArena,
    pointer_bits: u32,
) -> Result<Program, CoreError> {
    let mut generator = Generator {
        ast,
        scopes,
        pointer_bits,
        instrs: Vec::new(),
        next_id: 0,
        frame_size: 0,
        defers: Vec::new(),
        replaying: false,
        loops: Vec::new(),
        fixups: Vec::new(),
    };
    generator.generate(root)
}

/// Patch lists for the innermost loop.
struct LoopCtx {
    continue_target: usize,
    breaks: Vec<usize>,
}

struct Generator<'a> {
    ast: &'a Ast,
    scopes: &'a mut ScopeArena,
    pointer_bits: u32,
    instrs: Vec<Instr>,
    /// Debug-id counter for locals; threaded through the context, not
    /// global.
    next_id: u32,
    /// Running byte offset within the current function's frame.
    frame_size: u32,
    /// Deferred statements of the current function, in textual order.
    defers: Vec<NodeId>,
    /// True while the buffer is being re-emitted; a deferred `ret`
    /// must not trigger another replay.
    replaying: bool,
    loops: Vec<LoopCtx>,
    /// Call sites that referenced a function before its body was
    /// generated; patched at the end.
    fixups: Vec<(usize, String)>,
}

impl Generator<'_> {
    fn generate(&mut self, root: NodeId) -> Result<Program, CoreError> {
        let NodeKind::Scope { scope: root_scope, stmts } = self.ast.kind(root) else {
            panic!("code generation root must be a scope");
        };
        let root_scope = *root_scope;
        for &stmt in stmts {
            match self.ast.kind(stmt) {
                NodeKind::FnDef { .. } => self.gen_function(stmt, root_scope),
                NodeKind::DataDef { .. } | NodeKind::Empty => {}
                other => panic!("top-level statement must be a function or data definition: {other:?}"),
            }
        }

        for (ip, name) in std::mem::take(&mut self.fixups) {
            let target = self
                .scopes
                .lookup_var(root_scope, &name)
                .and_then(|(_, entry)| entry.code_offset)
                .unwrap_or_else(|| panic!("call target '{name}' was never generated"));
            let Instr::Call { target: slot, .. } = &mut self.instrs[ip] else {
                panic!("fixup {ip} does not point at a call");
            };
            *slot = target;
        }

        let Some(main_offset) = self
            .scopes
            .lookup_var(root_scope, ENTRY_FUNCTION)
            .and_then(|(_, entry)| entry.code_offset)
        else {
            return Err(CoreError::MissingEntry(ENTRY_FUNCTION.to_string()));
        };
        // The entry function's result lands at the bottom of the
        // stack: the synthetic call runs with frame base 0.
        let main_ty = self
            .scopes
            .lookup_var(root_scope, ENTRY_FUNCTION)
            .and_then(|(_, entry)| entry.candidates.first().copied());
        let main_ret = main_ty.and_then(|fn_ty| match self.scopes.type_def(&fn_ty) {
            TypeDef::Func { ret, .. } => *ret,
            _ => None,
        });
        let exit = main_ret.map(|ret_ty| {
            let layout = self.layout(&ret_ty);
            Local { id: self.fresh_id(), layout, offset: 0 }
        });

        let entry = self.instrs.len();
        self.instrs.push(Instr::Call {
            name: ENTRY_FUNCTION.to_string(),
            target: main_offset,
            args: Vec::new(),
            dst: exit.clone(),
        });
        Ok(Program { instrs: std::mem::take(&mut self.instrs), entry, exit })
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    fn gen_function(&mut self, id: NodeId, enclosing: ScopeId) {
        let NodeKind::FnDef { name, params, body, .. } = self.ast.kind(id) else {
            unreachable!("gen_function on a non-function node");
        };
        let (name, params, body) = (name.clone(), params.clone(), *body);
        if body == Ast::EMPTY {
            return; // bare prototype
        }
        let NodeKind::Scope { scope: body_scope, stmts } = self.ast.kind(body).clone() else {
            panic!("function body must be a scope");
        };

        let prologue_ip = self.instrs.len();
        self.instrs.push(Instr::Prologue {
            name: name.clone(),
            params: Vec::new(),
            frame_size: 0,
        });
        if let Some(entry) = self.scopes.lookup_var_mut(enclosing, &name) {
            entry.code_offset = Some(prologue_ip);
        }

        self.frame_size = 0;
        self.defers.clear();
        let declared = self.enter_scope(body_scope);

        // Parameter slots are the first declared variables of the body
        // scope, matched back by name for the prologue.
        let mut param_locals = Vec::with_capacity(params.len());
        for &param in &params {
            let NodeKind::Decl { name: pname, .. } = self.ast.kind(param) else {
                continue;
            };
            let local = declared
                .iter()
                .find(|(n, _)| n == pname)
                .map(|(_, l)| l.clone())
                .unwrap_or_else(|| panic!("parameter '{pname}' has no slot"));
            param_locals.push(local);
        }

        let mut ends_with_ret = false;
        for &stmt in &stmts {
            self.gen_stmt(stmt, body_scope);
            ends_with_ret = matches!(self.ast.kind(stmt), NodeKind::Ret { .. });
        }
        if !ends_with_ret {
            // Defers fire on the implicit exit path too.
            self.replay_defers(body_scope);
        }
        self.instrs.push(Instr::Epilogue);

        let frame_size = self.frame_size;
        let Instr::Prologue { params: slot, frame_size: size_slot, .. } =
            &mut self.instrs[prologue_ip]
        else {
            unreachable!("prologue index is stable");
        };
        *slot = param_locals;
        *size_slot = frame_size;
    }

    /// Assign a frame slot to every data variable declared directly in
    /// `scope`, in declaration order, and emit the `declare` markers.
    fn enter_scope(&mut self, scope: ScopeId) -> Vec<(String, Local)> {
        let mut pending: Vec<(String, TypeRef)> = Vec::new();
        for (name, entry) in self.scopes.scope(scope).vars_in_order() {
            let Some(ty) = entry.candidates.first() else {
                continue;
            };
            if matches!(self.scopes.type_def(ty), TypeDef::Func { .. }) {
                continue;
            }
            pending.push((name.to_string(), *ty));
        }
        let mut declared = Vec::with_capacity(pending.len());
        for (name, ty) in pending {
            let layout = self.layout(&ty);
            let local = self.alloc(layout);
            self.scopes
                .scope_mut(scope)
                .var_mut(&name)
                .unwrap_or_else(|| panic!("variable '{name}' vanished from its scope"))
                .slot = Some(local.offset);
            self.instrs.push(Instr::DeclareLocal {
                name: name.clone(),
                local: local.clone(),
            });
            declared.push((name, local));
        }
        declared
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn gen_stmt(&mut self, id: NodeId, scope: ScopeId) {
        match self.ast.kind(id).clone() {
            NodeKind::Empty | NodeKind::DataDef { .. } => {}
            NodeKind::Scope { scope: inner, stmts } => {
                self.enter_scope(inner);
                for stmt in stmts {
                    self.gen_stmt(stmt, inner);
                }
            }
            NodeKind::Decl { name, init, .. } => {
                if let Some(init) = init {
                    let src = self.gen_expr(init, scope);
                    let dst = self.var_local(scope, &name);
                    self.instrs.push(Instr::Move { dst, src });
                }
            }
            NodeKind::Assign { target, value } => {
                let src = self.gen_expr(value, scope);
                let dst = self.lvalue_local(target, scope);
                self.instrs.push(Instr::Move { dst, src });
            }
            NodeKind::Call { .. } => {
                self.gen_call(id, scope, false);
            }
            NodeKind::Ret { value } => {
                self.replay_defers(scope);
                let src = value.map(|v| self.gen_expr(v, scope));
                self.instrs.push(Instr::Ret { src });
            }
            NodeKind::Brk => {
                let ip = self.push_jump_placeholder();
                self.loops
                    .last_mut()
                    .unwrap_or_else(|| panic!("'brk' outside of a loop"))
                    .breaks
                    .push(ip);
            }
            NodeKind::Cnt => {
                let target = self
                    .loops
                    .last()
                    .unwrap_or_else(|| panic!("'cnt' outside of a loop"))
                    .continue_target;
                self.instrs.push(Instr::Jump { target });
            }
            NodeKind::While { cond, body } => {
                let cond_ip = self.instrs.len();
                let cond_local = self.gen_expr(cond, scope);
                let exit_jump = self.instrs.len();
                self.instrs.push(Instr::JumpIfZero { cond: cond_local, target: 0 });
                self.loops.push(LoopCtx { continue_target: cond_ip, breaks: Vec::new() });
                self.gen_stmt(body, scope);
                self.instrs.push(Instr::Jump { target: cond_ip });
                let end = self.instrs.len();
                self.patch_jump(exit_jump, end);
                let ctx = self.loops.pop().unwrap();
                for b in ctx.breaks {
                    self.patch_jump(b, end);
                }
            }
            NodeKind::If { cond, then, elifs, els } => {
                let mut arms = vec![(cond, then)];
                arms.extend(elifs);
                let mut end_jumps = Vec::new();
                for (arm_cond, arm_body) in arms {
                    let cond_local = self.gen_expr(arm_cond, scope);
                    let skip = self.instrs.len();
                    self.instrs.push(Instr::JumpIfZero { cond: cond_local, target: 0 });
                    self.gen_stmt(arm_body, scope);
                    end_jumps.push(self.push_jump_placeholder());
                    let next = self.instrs.len();
                    self.patch_jump(skip, next);
                }
                if let Some(els) = els {
                    self.gen_stmt(els, scope);
                }
                let end = self.instrs.len();
                for j in end_jumps {
                    self.patch_jump(j, end);
                }
            }
            NodeKind::Defer { stmt } => {
                self.defers.push(stmt);
            }
            NodeKind::Switch { .. } => {
                panic!("switch statements are not implemented in code generation")
            }
            NodeKind::FnDef { name, .. } => {
                panic!("nested function definitions are not supported: '{name}'")
            }
            other => panic!("statement kind not generatable: {other:?}"),
        }
    }

    /// Re-emit every buffered deferred statement in textual order.
    fn replay_defers(&mut self, scope: ScopeId) {
        if self.replaying {
            return;
        }
        self.replaying = true;
        for stmt in self.defers.clone() {
            self.gen_stmt(stmt, scope);
        }
        self.replaying = false;
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn gen_expr(&mut self, id: NodeId, scope: ScopeId) -> Local {
        match self.ast.kind(id).clone() {
            NodeKind::IntLit { value } => {
                let layout = self.node_layout(id);
                let bytes = value.to_le_bytes()[..layout.size_bytes() as usize].to_vec();
                self.emit_imm(layout, bytes)
            }
            NodeKind::FloatLit { value } => {
                let layout = self.node_layout(id);
                let bytes = match layout.bits {
                    32 => (value as f32).to_le_bytes().to_vec(),
                    _ => value.to_le_bytes().to_vec(),
                };
                self.emit_imm(layout, bytes)
            }
            NodeKind::CharLit { value } => {
                let layout = self.node_layout(id);
                self.emit_imm(layout, vec![value])
            }
            NodeKind::StrLit { .. } => {
                panic!("string literals are not implemented in code generation")
            }
            NodeKind::Ident { name } => self.var_local(scope, &name),
            NodeKind::IdentChain { .. } => self.lvalue_local(id, scope),
            NodeKind::Unary { op, operand } => {
                let src = self.gen_expr(operand, scope);
                let layout = self.node_layout(id);
                let dst = self.alloc(layout);
                self.instrs.push(Instr::Unary { op, dst: dst.clone(), src });
                dst
            }
            NodeKind::Binary { op, lhs, rhs } => {
                let lhs = self.gen_expr(lhs, scope);
                let rhs = self.gen_expr(rhs, scope);
                let layout = self.node_layout(id);
                let dst = self.alloc(layout);
                self.instrs.push(Instr::Binary { op, dst: dst.clone(), lhs, rhs });
                dst
            }
            NodeKind::Call { .. } => self
                .gen_call(id, scope, true)
                .unwrap_or_else(|| panic!("call used as a value returns nothing")),
            other => panic!("expression kind not generatable: {other:?}"),
        }
    }

    /// Emit a call; returns the destination slot when `want_value` and
    /// the callee returns one.
    fn gen_call(&mut self, id: NodeId, scope: ScopeId, want_value: bool) -> Option<Local> {
        let NodeKind::Call { callee, args } = self.ast.kind(id).clone() else {
            unreachable!("gen_call on a non-call node");
        };
        let arg_locals: Vec<Local> = args.iter().map(|&a| self.gen_expr(a, scope)).collect();
        let dst = if want_value && !self.ast.candidates(id).is_empty() {
            let layout = self.node_layout(id);
            Some(self.alloc(layout))
        } else {
            None
        };
        let target = self
            .scopes
            .lookup_var(scope, &callee)
            .and_then(|(_, entry)| entry.code_offset);
        let ip = self.instrs.len();
        self.instrs.push(Instr::Call {
            name: callee.clone(),
            target: target.unwrap_or(usize::MAX),
            args: arg_locals,
            dst: dst.clone(),
        });
        if target.is_none() {
            self.fixups.push((ip, callee));
        }
        dst
    }

    /// Slot of an assignable place: a variable or a dotted field.
    fn lvalue_local(&mut self, id: NodeId, scope: ScopeId) -> Local {
        match self.ast.kind(id).clone() {
            NodeKind::Ident { name } => self.var_local(scope, &name),
            NodeKind::IdentChain { segments } => {
                let base = self.var_local(scope, &segments[0]);
                let (_, entry) = self
                    .scopes
                    .lookup_var(scope, &segments[0])
                    .unwrap_or_else(|| panic!("unknown base '{}'", segments[0]));
                let base_ty = entry.candidates[0];
                let TypeDef::Struct { fields, .. } = self.scopes.type_def(&base_ty) else {
                    panic!("field access on a non-struct base '{}'", segments[0]);
                };
                let index = fields
                    .iter()
                    .position(|(n, _)| n == &segments[1])
                    .unwrap_or_else(|| panic!("no field '{}' on '{}'", segments[1], segments[0]));
                let field_offset = base.layout.field_offset_bytes(index);
                let field_layout = base.layout.fields[index].layout.clone();
                Local {
                    id: self.fresh_id(),
                    layout: field_layout,
                    offset: base.offset + field_offset,
                }
            }
            other => panic!("not an assignable place: {other:?}"),
        }
    }

    // ------------------------------------------------------------------
    // Slot allocation
    // ------------------------------------------------------------------

    fn var_local(&mut self, scope: ScopeId, name: &str) -> Local {
        let (_, entry) = self
            .scopes
            .lookup_var(scope, name)
            .unwrap_or_else(|| panic!("unknown variable '{name}' in code generation"));
        let ty = *entry
            .candidates
            .first()
            .unwrap_or_else(|| panic!("variable '{name}' has no resolved type"));
        let offset = entry
            .slot
            .unwrap_or_else(|| panic!("variable '{name}' has no stack slot"));
        let layout = self.layout(&ty);
        Local { id: self.fresh_id(), layout, offset }
    }

    fn alloc(&mut self, layout: Layout) -> Local {
        let align = layout.align_bytes();
        let offset = self.frame_size.div_ceil(align) * align;
        self.frame_size = offset + layout.size_bytes();
        Local { id: self.fresh_id(), layout, offset }
    }

    fn emit_imm(&mut self, layout: Layout, bytes: Vec<u8>) -> Local {
        let dst = self.alloc(layout);
        self.instrs.push(Instr::MoveImm { dst: dst.clone(), bytes });
        dst
    }

    fn fresh_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // ------------------------------------------------------------------
    // Jump patching
    // ------------------------------------------------------------------

    fn push_jump_placeholder(&mut self) -> usize {
        let ip = self.instrs.len();
        self.instrs.push(Instr::Jump { target: usize::MAX });
        ip
    }

    fn patch_jump(&mut self, ip: usize, target: usize) {
        match &mut self.instrs[ip] {
            Instr::Jump { target: slot } | Instr::JumpIfZero { target: slot, .. } => {
                *slot = target;
            }
            other => panic!("instruction {ip} is not patchable: {other:?}"),
        }
    }

    // ------------------------------------------------------------------
    // Layout helpers
    // ------------------------------------------------------------------

    fn node_layout(&self, id: NodeId) -> Layout {
        let ty = self
            .ast
            .candidates(id)
            .first()
            .unwrap_or_else(|| panic!("node {id:?} reached code generation unresolved"));
        self.layout(ty)
    }

    fn layout(&self, ty: &TypeRef) -> Layout {
        let layout = layout_of(ty, self.scopes, self.pointer_bits);
        assert!(layout.kind != LayoutKind::None, "data slot with no layout");
        layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::DiagnosticLog;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::resolve::resolve;
    use crate::span::FileId;

    fn generate_source(src: &str) -> Result<Program, CoreError> {
        let mut log = DiagnosticLog::new();
        let tokens = tokenize(FileId(0), src, &mut log);
        let mut scopes = ScopeArena::new();
        let (mut ast, root) = parse(src, &tokens, &mut scopes, &mut log);
        resolve(&mut ast, root, &mut scopes, &mut log);
        assert!(!log.has_errors(), "front end failed: {:?}", log.diagnostics());
        generate(&ast, root, &mut scopes, 64)
    }

    #[test]
    fn scenario_locals_get_sequential_slots() {
        let src = "fn Main() { x u32 = 2; y u32 = 3; z u32 = x + y; ret z; }";
        let program = generate_source(src).unwrap();
        let mut slots = Vec::new();
        for instr in &program.instrs {
            if let Instr::DeclareLocal { name, local } = instr {
                slots.push((name.clone(), local.offset));
            }
        }
        assert_eq!(
            slots,
            vec![("x".to_string(), 0), ("y".to_string(), 4), ("z".to_string(), 8)]
        );
        // The synthetic entry call is the very last instruction; this
        // Main declares no return type, so it has no result slot.
        assert_eq!(program.entry, program.instrs.len() - 1);
        assert!(matches!(
            &program.instrs[program.entry],
            Instr::Call { name, dst: None, .. } if name == "Main"
        ));
        assert!(program.exit.is_none());
    }

    #[test]
    fn missing_entry_function_is_a_core_error() {
        let err = generate_source("fn Helper() { ret; }").unwrap_err();
        assert!(matches!(err, CoreError::MissingEntry(name) if name == "Main"));
    }

    #[test]
    fn forward_calls_are_patched_to_the_callee_prologue() {
        let src = "fn Main() u32 { ret Late(); } fn Late() u32 { ret 7; }";
        let program = generate_source(src).unwrap();
        let late_prologue = program
            .instrs
            .iter()
            .position(|i| matches!(i, Instr::Prologue { name, .. } if name == "Late"))
            .unwrap();
        for instr in &program.instrs {
            if let Instr::Call { name, target, .. } = instr {
                if name == "Late" {
                    assert_eq!(*target, late_prologue);
                }
            }
        }
    }

    #[test]
    fn while_loops_lower_to_backward_jumps() {
        let src = "fn Main() { i u32 = 0; while i < 3 { i = i + 1; }; ret; }";
        let program = generate_source(src).unwrap();
        let mut saw_backward = false;
        for (ip, instr) in program.instrs.iter().enumerate() {
            match instr {
                Instr::Jump { target } => {
                    assert!(*target < program.instrs.len());
                    saw_backward |= *target < ip;
                }
                Instr::JumpIfZero { target, .. } => assert!(*target <= program.instrs.len()),
                _ => {}
            }
        }
        assert!(saw_backward, "loop must jump back to its condition");
    }

    #[test]
    fn defers_replay_before_the_return() {
        let src = "fn Tick() { ret; } fn Main() { defer Tick(); x u32 = 1; ret; }";
        let program = generate_source(src).unwrap();
        let main_prologue = program
            .instrs
            .iter()
            .position(|i| matches!(i, Instr::Prologue { name, .. } if name == "Main"))
            .unwrap();
        let tick_call = program.instrs[main_prologue..]
            .iter()
            .position(|i| matches!(i, Instr::Call { name, .. } if name == "Tick"))
            .unwrap();
        let ret = program.instrs[main_prologue..]
            .iter()
            .position(|i| matches!(i, Instr::Ret { .. }))
            .unwrap();
        assert!(tick_call < ret, "deferred call must precede the return");
    }

    #[test]
    fn a_deferred_return_does_not_replay_itself() {
        let src = "fn Main() { x u32 = 1; defer ret; ret; }";
        let program = generate_source(src).unwrap();
        // The deferred return is emitted once ahead of the explicit
        // one; nothing loops.
        let rets = program
            .instrs
            .iter()
            .filter(|i| matches!(i, Instr::Ret { .. }))
            .count();
        assert_eq!(rets, 2);
    }

    #[test]
    fn temporaries_are_aligned_to_their_layout() {
        let src = "fn Main() { a u8 = 1; b u64 = 2; c u64 = b + 3; ret; }";
        let program = generate_source(src).unwrap();
        for instr in &program.instrs {
            let locals: Vec<&Local> = match instr {
                Instr::Move { dst, src } => vec![dst, src],
                Instr::MoveImm { dst, .. } => vec![dst],
                Instr::Binary { dst, lhs, rhs, .. } => vec![dst, lhs, rhs],
                _ => vec![],
            };
            for local in locals {
                assert_eq!(local.offset % local.layout.align_bytes(), 0, "{local}");
            }
        }
    }
}
