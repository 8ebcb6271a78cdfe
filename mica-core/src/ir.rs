//! Linear instruction list handed from code generation to the
//! interpreter.
//!
//! Instructions address data through [`Local`] records: a debug id, a
//! concrete layout, and a frame-relative byte offset. The list is flat;
//! control flow is expressed with absolute instruction indices.

use std::fmt;

use crate::ast::{BinOp, UnaryOp};
use crate::layout::Layout;

/// One stack slot within a function frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Local {
    /// Debug id, unique across the whole program.
    pub id: u32,
    pub layout: Layout,
    /// Byte offset from the frame base.
    pub offset: u32,
}

impl fmt::Display for Local {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}:{}@{}", self.id, self.layout.describe(), self.offset)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /// Marks a named source variable's slot; no runtime effect.
    DeclareLocal { name: String, local: Local },
    /// First instruction of every function. `frame_size` is the byte
    /// span of the whole frame; `params` are the slots the caller's
    /// `Call` copies arguments into.
    Prologue {
        name: String,
        params: Vec<Local>,
        frame_size: u32,
    },
    /// Last instruction of every function body; a fallthrough return.
    Epilogue,
    /// `target` is the callee prologue's instruction index. `args` are
    /// caller-frame sources; `dst`, if present, receives the callee's
    /// return value.
    Call {
        name: String,
        target: usize,
        args: Vec<Local>,
        dst: Option<Local>,
    },
    /// Byte-exact copy of `src.layout` bytes between frame slots.
    Move { dst: Local, src: Local },
    /// Byte-exact store of an immediate into a frame slot.
    MoveImm { dst: Local, bytes: Vec<u8> },
    Ret { src: Option<Local> },
    Jump { target: usize },
    /// Falls through when `cond` holds a non-zero byte.
    JumpIfZero { cond: Local, target: usize },
    Binary {
        op: BinOp,
        dst: Local,
        lhs: Local,
        rhs: Local,
    },
    Unary { op: UnaryOp, dst: Local, src: Local },
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::DeclareLocal { name, local } => write!(f, "declare {name} {local}"),
            Instr::Prologue { name, params, frame_size } => {
                write!(f, "prologue {name} frame={frame_size} params=[")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, "]")
            }
            Instr::Epilogue => write!(f, "epilogue"),
            Instr::Call { name, target, args, dst } => {
                write!(f, "call {name}@{target} args=[")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, "]")?;
                if let Some(dst) = dst {
                    write!(f, " -> {dst}")?;
                }
                Ok(())
            }
            Instr::Move { dst, src } => write!(f, "move {dst} <- {src}"),
            Instr::MoveImm { dst, bytes } => {
                write!(f, "movei {dst} <- 0x")?;
                for b in bytes.iter().rev() {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            Instr::Ret { src: Some(src) } => write!(f, "ret {src}"),
            Instr::Ret { src: None } => write!(f, "ret"),
            Instr::Jump { target } => write!(f, "jump {target}"),
            Instr::JumpIfZero { cond, target } => write!(f, "jumpz {cond} {target}"),
            Instr::Binary { op, dst, lhs, rhs } => {
                write!(f, "bin {} {dst} <- {lhs}, {rhs}", op.symbol())
            }
            Instr::Unary { op, dst, src } => write!(f, "un {} {dst} <- {src}", op.symbol()),
        }
    }
}

/// The generated program: the instruction list, the index of the
/// synthetic entry call, and the entry function's result slot (at an
/// absolute stack position) if it returns a value.
#[derive(Debug)]
pub struct Program {
    pub instrs: Vec<Instr>,
    pub entry: usize,
    pub exit: Option<Local>,
}

impl Program {
    /// Human-readable dump, one line per instruction.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (i, instr) in self.instrs.iter().enumerate() {
            out.push_str(&format!("{i:4}: {instr}\n"));
        }
        out
    }
}
