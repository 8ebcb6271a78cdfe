//! Stack-machine interpreter for the generated instruction list.
//!
//! The machine owns one fixed-capacity byte stack (no growth; a
//! documented limitation) and three registers: the instruction
//! pointer, the stack pointer (first free byte) and the current frame
//! base. A call writes a 24-byte control record (saved stack pointer,
//! saved frame base, return address) just below the callee's frame,
//! copies arguments into the callee's parameter slots, and jumps; a
//! return restores the record and resumes. Execution starts at the
//! synthetic entry call (the last instruction) and terminates when the
//! instruction pointer runs past the end of the list.
//!
//! There is no recoverable runtime-error channel: any situation the
//! resolver should have ruled out aborts with a panic.

use crate::ast::{BinOp, UnaryOp};
use crate::ir::{Instr, Local, Program};
use crate::layout::LayoutKind;

/// Fixed stack capacity in bytes.
pub const STACK_BYTES: usize = 1 << 20;

/// Saved stack pointer, saved frame base, return address: 3 x u64.
pub const CONTROL_RECORD_BYTES: u32 = 24;

/// Machine state, returned after execution for inspection.
pub struct Machine {
    pub stack: Vec<u8>,
    pub ip: usize,
    pub sp: u32,
    pub frame_top: u32,
}

/// Run `program` to completion and return the final machine state.
pub fn execute(program: &Program) -> Machine {
    let mut machine = Machine {
        stack: vec![0; STACK_BYTES],
        ip: program.entry,
        sp: 0,
        frame_top: 0,
    };
    machine.run(program);
    machine
}

impl Machine {
    fn run(&mut self, program: &Program) {
        let instrs = &program.instrs;
        while self.ip < instrs.len() {
            match &instrs[self.ip] {
                Instr::DeclareLocal { .. } | Instr::Prologue { .. } => {
                    self.ip += 1;
                }
                Instr::Call { target, args, .. } => {
                    self.call(instrs, *target, args);
                }
                Instr::Ret { src } => {
                    self.ret(instrs, src.as_ref());
                }
                Instr::Epilogue => {
                    self.ret(instrs, None);
                }
                Instr::Move { dst, src } => {
                    let size = src.layout.size_bytes() as usize;
                    let from = (self.frame_top + src.offset) as usize;
                    let to = (self.frame_top + dst.offset) as usize;
                    self.stack.copy_within(from..from + size, to);
                    self.ip += 1;
                }
                Instr::MoveImm { dst, bytes } => {
                    let to = (self.frame_top + dst.offset) as usize;
                    self.stack[to..to + bytes.len()].copy_from_slice(bytes);
                    self.ip += 1;
                }
                Instr::Jump { target } => {
                    self.ip = *target;
                }
                Instr::JumpIfZero { cond, target } => {
                    let size = cond.layout.size_bytes() as usize;
                    let at = (self.frame_top + cond.offset) as usize;
                    if self.stack[at..at + size].iter().all(|b| *b == 0) {
                        self.ip = *target;
                    } else {
                        self.ip += 1;
                    }
                }
                Instr::Binary { op, dst, lhs, rhs } => {
                    self.binary(*op, dst, lhs, rhs);
                    self.ip += 1;
                }
                Instr::Unary { op, dst, src } => {
                    self.unary(*op, dst, src);
                    self.ip += 1;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Call protocol
    // ------------------------------------------------------------------

    fn call(&mut self, instrs: &[Instr], target: usize, args: &[Local]) {
        let Instr::Prologue { params, frame_size, .. } = &instrs[target] else {
            panic!("call target {target} is not a prologue");
        };
        let record = self.sp.div_ceil(8) * 8;
        let new_frame = record + CONTROL_RECORD_BYTES;
        let new_sp = new_frame + *frame_size;
        assert!((new_sp as usize) <= STACK_BYTES, "stack overflow");

        self.write_u64(record, self.sp as u64);
        self.write_u64(record + 8, self.frame_top as u64);
        self.write_u64(record + 16, (self.ip + 1) as u64);

        for (arg, param) in args.iter().zip(params) {
            let size = arg.layout.size_bytes() as usize;
            let from = (self.frame_top + arg.offset) as usize;
            let to = (new_frame + param.offset) as usize;
            self.stack.copy_within(from..from + size, to);
        }

        self.frame_top = new_frame;
        self.sp = new_sp;
        self.ip = target;
    }

    fn ret(&mut self, instrs: &[Instr], src: Option<&Local>) {
        let record = self.frame_top - CONTROL_RECORD_BYTES;
        let saved_sp = self.read_u64(record) as u32;
        let saved_frame = self.read_u64(record + 8) as u32;
        let ret_ip = self.read_u64(record + 16) as usize;

        // The instruction before the return address is the call that
        // got us here; its dst names the caller-frame result slot.
        if let Some(src) = src {
            if let Instr::Call { dst: Some(dst), .. } = &instrs[ret_ip - 1] {
                let size = src.layout.size_bytes() as usize;
                let from = (self.frame_top + src.offset) as usize;
                let to = (saved_frame + dst.offset) as usize;
                self.stack.copy_within(from..from + size, to);
            }
        }

        self.frame_top = saved_frame;
        self.sp = saved_sp;
        self.ip = ret_ip;
    }

    // ------------------------------------------------------------------
    // Typed dispatch
    // ------------------------------------------------------------------

    fn binary(&mut self, op: BinOp, dst: &Local, lhs: &Local, rhs: &Local) {
        use BinOp::*;
        match op {
            BitAnd | BitOr | BitXor | Shl | Shr => {
                panic!("bitwise and shift operators are not implemented in the interpreter")
            }
            Eq | Ne | Lt | Gt | Le | Ge => {
                let r = self.compare(op, lhs, rhs);
                let to = (self.frame_top + dst.offset) as usize;
                self.stack[to] = r as u8;
            }
            Add | Sub if lhs.layout.kind == LayoutKind::Pointer
                || rhs.layout.kind == LayoutKind::Pointer =>
            {
                let (ptr, int) = if lhs.layout.kind == LayoutKind::Pointer {
                    (lhs, rhs)
                } else {
                    (rhs, lhs)
                };
                let base = self.load_unsigned(ptr) as i64;
                let delta = self.load_signed(int);
                let r = match op {
                    Add => base + delta,
                    _ => base - delta,
                };
                self.store_bits(dst, r as u64);
            }
            Add | Sub | Mul | Div | Mod => {
                let r = self.arith(op, lhs, rhs);
                let bytes_len = dst.layout.size_bytes() as usize;
                let to = (self.frame_top + dst.offset) as usize;
                self.stack[to..to + bytes_len].copy_from_slice(&r[..bytes_len]);
            }
        }
    }

    /// Arithmetic on matching-kind operands; result little-endian,
    /// padded to 8 bytes.
    fn arith(&self, op: BinOp, lhs: &Local, rhs: &Local) -> [u8; 8] {
        use LayoutKind::*;
        match (lhs.layout.kind, lhs.layout.bits) {
            (Unsigned, _) => {
                let a = self.load_unsigned(lhs);
                let b = self.load_unsigned(rhs);
                let r = match op {
                    BinOp::Add => a.wrapping_add(b),
                    BinOp::Sub => a.wrapping_sub(b),
                    BinOp::Mul => a.wrapping_mul(b),
                    BinOp::Div => a / b,
                    BinOp::Mod => a % b,
                    _ => unreachable!("non-arithmetic op in arith"),
                };
                r.to_le_bytes()
            }
            (Signed, _) => {
                let a = self.load_signed(lhs);
                let b = self.load_signed(rhs);
                let r = match op {
                    BinOp::Add => a.wrapping_add(b),
                    BinOp::Sub => a.wrapping_sub(b),
                    BinOp::Mul => a.wrapping_mul(b),
                    BinOp::Div => a / b,
                    BinOp::Mod => a % b,
                    _ => unreachable!("non-arithmetic op in arith"),
                };
                (r as u64).to_le_bytes()
            }
            (Float, 32) => {
                let a = f32::from_bits(self.load_unsigned(lhs) as u32);
                let b = f32::from_bits(self.load_unsigned(rhs) as u32);
                let r = match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Mod => a % b,
                    _ => unreachable!("non-arithmetic op in arith"),
                };
                (r.to_bits() as u64).to_le_bytes()
            }
            (Float, _) => {
                let a = f64::from_bits(self.load_unsigned(lhs));
                let b = f64::from_bits(self.load_unsigned(rhs));
                let r = match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Mod => a % b,
                    _ => unreachable!("non-arithmetic op in arith"),
                };
                r.to_bits().to_le_bytes()
            }
            (kind, bits) => panic!("arithmetic on unsupported layout {kind:?}/{bits}"),
        }
    }

    fn compare(&self, op: BinOp, lhs: &Local, rhs: &Local) -> bool {
        use std::cmp::Ordering;
        let ordering = match lhs.layout.kind {
            LayoutKind::Unsigned | LayoutKind::Pointer => {
                self.load_unsigned(lhs).cmp(&self.load_unsigned(rhs))
            }
            LayoutKind::Signed => self.load_signed(lhs).cmp(&self.load_signed(rhs)),
            LayoutKind::Float => {
                let (a, b) = if lhs.layout.bits == 32 {
                    (
                        f32::from_bits(self.load_unsigned(lhs) as u32) as f64,
                        f32::from_bits(self.load_unsigned(rhs) as u32) as f64,
                    )
                } else {
                    (
                        f64::from_bits(self.load_unsigned(lhs)),
                        f64::from_bits(self.load_unsigned(rhs)),
                    )
                };
                match a.partial_cmp(&b) {
                    Some(o) => o,
                    None => return matches!(op, BinOp::Ne), // NaN
                }
            }
            // Aggregates compare byte-exact.
            LayoutKind::Aggregate => {
                let size = lhs.layout.size_bytes() as usize;
                let a = (self.frame_top + lhs.offset) as usize;
                let b = (self.frame_top + rhs.offset) as usize;
                self.stack[a..a + size].cmp(&self.stack[b..b + size])
            }
            LayoutKind::None => panic!("comparison on a layout-less operand"),
        };
        match op {
            BinOp::Eq => ordering == Ordering::Equal,
            BinOp::Ne => ordering != Ordering::Equal,
            BinOp::Lt => ordering == Ordering::Less,
            BinOp::Le => ordering != Ordering::Greater,
            BinOp::Gt => ordering == Ordering::Greater,
            BinOp::Ge => ordering != Ordering::Less,
            _ => unreachable!("non-relational op in compare"),
        }
    }

    fn unary(&mut self, op: UnaryOp, dst: &Local, src: &Local) {
        match op {
            UnaryOp::Neg => {
                let r = match src.layout.kind {
                    LayoutKind::Signed => (-self.load_signed(src)) as u64,
                    LayoutKind::Float if src.layout.bits == 32 => {
                        (-f32::from_bits(self.load_unsigned(src) as u32)).to_bits() as u64
                    }
                    LayoutKind::Float => (-f64::from_bits(self.load_unsigned(src))).to_bits(),
                    kind => panic!("negation on unsupported layout {kind:?}"),
                };
                self.store_bits(dst, r);
            }
            UnaryOp::Not => {
                let r = (self.load_unsigned(src) == 0) as u64;
                self.store_bits(dst, r);
            }
            UnaryOp::AddrOf => {
                // Addresses are absolute positions in the byte stack.
                let addr = (self.frame_top + src.offset) as u64;
                self.store_bits(dst, addr);
            }
            UnaryOp::Deref => {
                let addr = self.load_unsigned(src) as usize;
                let size = dst.layout.size_bytes() as usize;
                let to = (self.frame_top + dst.offset) as usize;
                self.stack.copy_within(addr..addr + size, to);
            }
        }
    }

    // ------------------------------------------------------------------
    // Raw access
    // ------------------------------------------------------------------

    /// Zero-extended scalar load from a frame slot.
    fn load_unsigned(&self, local: &Local) -> u64 {
        let size = local.layout.size_bytes() as usize;
        let at = (self.frame_top + local.offset) as usize;
        let mut buf = [0u8; 8];
        buf[..size].copy_from_slice(&self.stack[at..at + size]);
        u64::from_le_bytes(buf)
    }

    /// Sign-extended scalar load from a frame slot.
    fn load_signed(&self, local: &Local) -> i64 {
        let bits = local.layout.bits;
        let raw = self.load_unsigned(local);
        if bits >= 64 || local.layout.kind != LayoutKind::Signed {
            return raw as i64;
        }
        let shift = 64 - bits;
        ((raw << shift) as i64) >> shift
    }

    fn store_bits(&mut self, local: &Local, value: u64) {
        let size = local.layout.size_bytes() as usize;
        let to = (self.frame_top + local.offset) as usize;
        self.stack[to..to + size].copy_from_slice(&value.to_le_bytes()[..size]);
    }

    fn read_u64(&self, at: u32) -> u64 {
        let at = at as usize;
        u64::from_le_bytes(self.stack[at..at + 8].try_into().unwrap())
    }

    fn write_u64(&mut self, at: u32, value: u64) {
        let at = at as usize;
        self.stack[at..at + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// Absolute scalar read, sign- or zero-extended per the layout;
    /// used for the entry function's result slot. Aggregates wider
    /// than eight bytes yield their leading eight bytes.
    pub fn scalar_at(&self, local: &Local) -> i64 {
        let size = (local.layout.size_bytes() as usize).min(8);
        let at = local.offset as usize;
        let mut buf = [0u8; 8];
        buf[..size].copy_from_slice(&self.stack[at..at + size]);
        let raw = u64::from_le_bytes(buf);
        if local.layout.kind == LayoutKind::Signed && local.layout.bits < 64 {
            let shift = 64 - local.layout.bits;
            ((raw << shift) as i64) >> shift
        } else {
            raw as i64
        }
    }

    /// Absolute little-endian u32 read; test helper.
    pub fn read_u32_at(&self, at: u32) -> u32 {
        let at = at as usize;
        u32::from_le_bytes(self.stack[at..at + 4].try_into().unwrap())
    }
}
