//! Function builder and the finalization pipeline.
//!
//! A `Function` is the construction surface: catalog methods append
//! instructions to its scoped stream, label and loop helpers manage the
//! label arena, and the virtual-register helpers hand out fresh operands.
//! `finalize` freezes the stream and runs the whole pipeline: argument
//! binding for the chosen ABI, liveness analysis, register allocation with
//! spilling, pseudo-instruction lowering, and prologue/epilogue insertion.
//! The result can be encoded to machine bytes or formatted as a listing.

use hashbrown::HashMap;
use log::debug;

use crate::core::error::{AsmError, AsmResult};
use crate::core::liveness::{self, FlowKind, InstEffects};
use crate::core::regalloc::{self, BankOrder, Constraints, Outcome};
use crate::core::stream::{LabelArena, LabelId, StreamStack};
use crate::x64::abi::{Abi, AbiFlavor};
use crate::x64::inst::{
    branch_len, describe_forms, encode_branch, encode_normal, select_form, Cond, Form, Inst,
    InstKind,
};
use crate::x64::isa::IsaTarget;
use crate::x64::literal::{ConstantPool, Relocation};
use crate::x64::operand::{mem, Operand, Size};
use crate::x64::registers::{Reg, RegClass, RegId, RegKey, VirtRegAllocator, RSP};

/// Scalar value types of function arguments and results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    S8,
    U8,
    S16,
    U16,
    S32,
    U32,
    S64,
    U64,
    Ptr,
    F32,
    F64,
}

impl ValueType {
    pub const fn size(self) -> u8 {
        match self {
            ValueType::S8 | ValueType::U8 => 1,
            ValueType::S16 | ValueType::U16 => 2,
            ValueType::S32 | ValueType::U32 | ValueType::F32 => 4,
            ValueType::S64 | ValueType::U64 | ValueType::Ptr | ValueType::F64 => 8,
        }
    }

    pub const fn is_signed(self) -> bool {
        matches!(self, ValueType::S8 | ValueType::S16 | ValueType::S32 | ValueType::S64)
    }

    pub const fn is_float(self) -> bool {
        matches!(self, ValueType::F32 | ValueType::F64)
    }

    pub const fn go_name(self) -> &'static str {
        match self {
            ValueType::S8 => "int8",
            ValueType::U8 => "uint8",
            ValueType::S16 => "int16",
            ValueType::U16 => "uint16",
            ValueType::S32 => "int32",
            ValueType::U32 => "uint32",
            ValueType::S64 => "int64",
            ValueType::U64 => "uint64",
            ValueType::Ptr => "uintptr",
            ValueType::F32 => "float32",
            ValueType::F64 => "float64",
        }
    }
}

/// A declared function argument.
#[derive(Debug, Clone)]
pub struct Argument {
    pub name: String,
    pub ty: ValueType,
}

impl Argument {
    pub fn new(name: impl Into<String>, ty: ValueType) -> Argument {
        Argument {
            name: name.into(),
            ty,
        }
    }
}

/// Where an argument lives at function entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgLocation {
    Register(Reg),
    /// Byte offset from the frame-pointer pseudo (first argument at 0).
    Stack(i32),
}

fn valid_label_name(name: &str) -> bool {
    if name.is_empty() || name.starts_with("__") {
        return false;
    }
    let mut first_of_part = true;
    for c in name.chars() {
        if first_of_part {
            if !(c.is_ascii_alphabetic() || c == '_') {
                return false;
            }
            first_of_part = false;
        } else if c == '.' {
            first_of_part = true;
        } else if !(c.is_ascii_alphanumeric() || c == '_') {
            return false;
        }
    }
    !first_of_part
}

/// Loop label pair handed to `Function::loop_` bodies.
#[derive(Debug, Clone, Copy)]
pub struct LoopLabels {
    pub begin: LabelId,
    pub end: LabelId,
}

/// The instruction-construction surface and owner of all per-function
/// state.
#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub(crate) args: Vec<Argument>,
    pub(crate) result: Option<ValueType>,
    pub(crate) stream: StreamStack<Inst>,
    pub(crate) labels: LabelArena,
    pub(crate) vregs: VirtRegAllocator,
    pub(crate) pool: ConstantPool,
    pub(crate) isa: IsaTarget,
}

impl Function {
    pub fn new(name: impl Into<String>, args: Vec<Argument>, result: Option<ValueType>) -> Function {
        Function {
            name: name.into(),
            args,
            result,
            stream: StreamStack::new(),
            labels: LabelArena::new(),
            vregs: VirtRegAllocator::new(),
            pool: ConstantPool::new(),
            isa: IsaTarget::baseline(),
        }
    }

    pub fn with_isa(mut self, isa: IsaTarget) -> Function {
        self.isa = isa;
        self
    }

    pub fn isa(&self) -> IsaTarget {
        self.isa
    }

    // virtual register construction

    pub fn gp8(&mut self) -> Reg {
        self.vregs.gp8()
    }

    pub fn gp16(&mut self) -> Reg {
        self.vregs.gp16()
    }

    pub fn gp32(&mut self) -> Reg {
        self.vregs.gp32()
    }

    pub fn gp64(&mut self) -> Reg {
        self.vregs.gp64()
    }

    pub fn vxmm(&mut self) -> Reg {
        self.vregs.xmm()
    }

    pub fn vymm(&mut self) -> Reg {
        self.vregs.ymm()
    }

    /// The constant pool of this function.
    pub fn constants(&mut self) -> &mut ConstantPool {
        &mut self.pool
    }

    // labels and scoping

    /// Create an unbound label.
    pub fn label(&mut self, name: &str) -> AsmResult<LabelId> {
        if !valid_label_name(name) {
            return Err(AsmError::InvalidOperand {
                reason: format!("invalid label name {name:?}"),
            });
        }
        Ok(self.labels.create(name))
    }

    /// Bind a label at the current stream position.
    pub fn bind(&mut self, label: LabelId) -> AsmResult<()> {
        // position placeholder; real positions are assigned when the
        // stream is frozen
        self.labels.bind(label, 0)?;
        self.stream.append(Inst {
            mnemonic: "label",
            operands: Vec::new(),
            form: None,
            implicit_in: &[],
            implicit_out: &[],
            kind: InstKind::Bind(label),
        });
        Ok(())
    }

    /// Run `body` inside a nested scope spliced into the stream when the
    /// closure returns, on success and error alike.
    pub fn scoped<T>(
        &mut self,
        body: impl FnOnce(&mut Function) -> AsmResult<T>,
    ) -> AsmResult<T> {
        self.stream.push_scope();
        let result = body(self);
        self.stream.pop_scope()?;
        result
    }

    /// Structured loop: binds `name.begin` at entry and `name.end` after
    /// the body. The body emits its own back-edge branch, which may
    /// reference both labels before the loop closes.
    pub fn loop_<T>(
        &mut self,
        name: &str,
        body: impl FnOnce(&mut Function, LoopLabels) -> AsmResult<T>,
    ) -> AsmResult<T> {
        let begin = self.label(&format!("{name}.begin"))?;
        let end = self.label(&format!("{name}.end"))?;
        let labels = LoopLabels { begin, end };
        let result = self.scoped(|f| {
            f.bind(begin)?;
            body(f, labels)
        });
        self.bind(end)?;
        result
    }

    /// Pad with multi-byte NOPs to a 2/4/8/16/32-byte boundary.
    pub fn align(&mut self, boundary: u8) -> AsmResult<()> {
        if !matches!(boundary, 2 | 4 | 8 | 16 | 32) {
            return Err(AsmError::InvalidOperand {
                reason: format!("alignment boundary {boundary} is not 2, 4, 8, 16, or 32"),
            });
        }
        self.stream.append(Inst {
            mnemonic: "align",
            operands: Vec::new(),
            form: None,
            implicit_in: &[],
            implicit_out: &[],
            kind: InstKind::Align(boundary),
        });
        Ok(())
    }

    // control flow

    pub(crate) fn emit_branch(&mut self, mnemonic: &'static str, cond: Option<Cond>, target: LabelId) {
        self.stream.append(Inst {
            mnemonic,
            operands: Vec::new(),
            form: None,
            implicit_in: &[],
            implicit_out: &[],
            kind: InstKind::Branch { cond, target },
        });
    }

    /// Plain RET with no ABI involvement.
    pub fn ret(&mut self) {
        self.stream.append(Inst {
            mnemonic: "ret",
            operands: Vec::new(),
            form: None,
            implicit_in: &[],
            implicit_out: &[],
            kind: InstKind::Ret,
        });
    }

    /// Return pseudo: binds the value (if any) to the ABI's return
    /// convention during finalization.
    pub fn return_value(&mut self, value: impl Into<Operand>) {
        self.stream.append(Inst {
            mnemonic: "return",
            operands: vec![value.into()],
            form: None,
            implicit_in: &[],
            implicit_out: &[],
            kind: InstKind::Return,
        });
    }

    /// Return with no value.
    pub fn return_void(&mut self) {
        self.stream.append(Inst {
            mnemonic: "return",
            operands: Vec::new(),
            form: None,
            implicit_in: &[],
            implicit_out: &[],
            kind: InstKind::Return,
        });
    }

    /// Argument-load pseudo: materialize argument `index` into `dst`,
    /// lowered to the right move during ABI binding.
    pub fn load_argument(&mut self, dst: Reg, index: usize) -> AsmResult<()> {
        let arg = self.args.get(index).ok_or_else(|| AsmError::InvalidOperand {
            reason: format!("argument index {index} out of range"),
        })?;
        let ok = match arg.ty {
            t if t.is_float() => matches!(dst.class, RegClass::Xmm),
            t => dst.class == RegClass::Gp && dst.size >= t.size(),
        };
        if !ok {
            return Err(AsmError::InvalidOperand {
                reason: format!(
                    "argument {:?} of type {:?} can not be loaded into {dst}",
                    arg.name, arg.ty
                ),
            });
        }
        self.stream.append(Inst {
            mnemonic: "load.argument",
            operands: vec![Operand::Reg(dst)],
            form: None,
            implicit_in: &[],
            implicit_out: &[],
            kind: InstKind::LoadArg { arg: index as u8 },
        });
        Ok(())
    }

    /// Shared dispatch path for every catalog constructor: find the first
    /// matching form, gate it on the target ISA, tag untyped memory
    /// operands with the form's width, and append.
    pub(crate) fn emit(
        &mut self,
        mnemonic: &'static str,
        forms: &'static [Form],
        mut ops: Vec<Operand>,
    ) -> AsmResult<()> {
        let form = match select_form(forms, &ops) {
            Some(f) => f,
            None => {
                let rendered = ops
                    .iter()
                    .map(|o| o.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(AsmError::NoMatchingForm {
                    mnemonic,
                    operands: rendered,
                    forms: describe_forms(forms),
                });
            }
        };
        if let Some(ext) = form.isa {
            if !self.isa.has(ext) {
                return Err(AsmError::IsaExtensionDisabled {
                    mnemonic,
                    extension: ext.name(),
                });
            }
        }
        for (kind, op) in form.sig.iter().zip(ops.iter_mut()) {
            if let (Some(size), Operand::Mem(m)) = (kind.mem_size(), op) {
                if m.size.is_none() {
                    *m = m.with_size(size);
                }
            }
        }
        self.stream.append(Inst::normal(mnemonic, ops, form));
        Ok(())
    }

    /// Freeze the stream and bind it to an ABI.
    pub fn finalize(self, abi: &'static Abi) -> AsmResult<FinalizedFunction> {
        Pipeline::run(self, abi)
    }
}

/// Argument locations per the ABI's parameter-passing rule.
fn assign_arg_locations(abi: &Abi, args: &[Argument]) -> (Vec<ArgLocation>, i32) {
    match abi.flavor {
        AbiFlavor::Go => {
            // Plan-9: everything on the stack, 8-byte slots
            let mut offset = 0i32;
            let locs = args
                .iter()
                .map(|_| {
                    let loc = ArgLocation::Stack(offset);
                    offset += 8;
                    loc
                })
                .collect();
            (locs, offset)
        }
        AbiFlavor::Native => {
            let gp_regs: Vec<Reg> = abi
                .argument_registers
                .iter()
                .filter(|r| r.class == RegClass::Gp)
                .copied()
                .collect();
            let fp_regs: Vec<Reg> = abi
                .argument_registers
                .iter()
                .filter(|r| r.class == RegClass::Xmm)
                .copied()
                .collect();
            let mut next_gp = 0;
            let mut next_fp = 0;
            let mut stack = 0i32;
            let locs = args
                .iter()
                .map(|arg| {
                    if arg.ty.is_float() {
                        if next_fp < fp_regs.len() {
                            next_fp += 1;
                            ArgLocation::Register(fp_regs[next_fp - 1])
                        } else {
                            stack += 8;
                            ArgLocation::Stack(stack - 8)
                        }
                    } else if next_gp < gp_regs.len() {
                        next_gp += 1;
                        ArgLocation::Register(gp_regs[next_gp - 1].with_size(8))
                    } else {
                        stack += 8;
                        ArgLocation::Stack(stack - 8)
                    }
                })
                .collect();
            (locs, stack)
        }
    }
}

struct Pipeline;

impl Pipeline {
    fn run(func: Function, abi: &'static Abi) -> AsmResult<FinalizedFunction> {
        let Function {
            name,
            args,
            result,
            stream,
            mut labels,
            mut vregs,
            pool,
            isa: _,
        } = func;

        let mut insts = stream.finish()?;
        labels.check_all_bound()?;
        let (arg_locs, args_size) = assign_arg_locations(abi, &args);

        // allocation loop: analyze, attempt, spill, retry
        let order = bank_order(abi);
        let mut next_slot = 0i32;
        let mut rounds = 0usize;
        let max_rounds = vregs.count() as usize + 2;
        let assignment = loop {
            let (effects, label_positions) = build_effects(&insts, abi, &arg_locs);
            liveness::check_instruction_pressure(&effects)?;
            let analysis = liveness::analyze(&effects, &label_positions)?;
            let constraints = gather_constraints(&insts, &arg_locs);
            match regalloc::allocate(&analysis, &constraints, &order)? {
                Outcome::Assigned(map) => break map,
                Outcome::Spill { blocked, victim } => {
                    rounds += 1;
                    if rounds > max_rounds {
                        return Err(AsmError::RegisterAllocation {
                            reason: format!(
                                "register demand for virtual register {blocked} can not be \
                                 satisfied even after spilling"
                            ),
                        });
                    }
                    next_slot = spill_virtual(&mut insts, &mut vregs, victim, next_slot)?;
                }
            }
        };

        // rewrite every virtual register to its physical assignment
        for inst in &mut insts {
            inst.rewrite_regs(&mut |r| match r.id {
                RegId::Virt(v) => Reg {
                    class: r.class,
                    size: r.size,
                    id: RegId::Phys(assignment[&v]),
                },
                RegId::Phys(_) => r,
            });
        }

        // frame layout
        let used_callee_saves: Vec<Reg> = abi
            .callee_save_registers
            .iter()
            .filter(|cs| {
                assignment
                    .values()
                    .any(|&phys| cs.phys() == Some(phys) && cs.class == RegClass::Gp)
            })
            .copied()
            .collect();
        let spill_size = next_slot;
        let frame_size = align_frame(abi, spill_size, used_callee_saves.len());

        lower_pseudos(
            &mut insts,
            &mut labels,
            abi,
            &args,
            result,
            &arg_locs,
            args_size,
            frame_size,
            &used_callee_saves,
        )?;

        debug!(
            "finalized {name} for {}: {} instructions, frame {frame_size}",
            abi.name,
            insts.len()
        );

        Ok(FinalizedFunction {
            name,
            args,
            result,
            abi,
            insts,
            labels,
            pool,
            frame_size,
            args_size,
            saved_registers: used_callee_saves,
        })
    }
}

fn bank_order(abi: &Abi) -> BankOrder {
    let mut order: BankOrder = Default::default();
    for reg in abi.allocation_order() {
        let bank = reg.class.bank() as usize;
        if let Some(phys) = reg.phys() {
            // rsp is never a candidate
            if bank == 0 && phys == 4 {
                continue;
            }
            if !order[bank].contains(&phys) {
                order[bank].push(phys);
            }
        }
    }
    order
}

/// Reduce the stream to dataflow effects and collect bound-label
/// positions from the Bind markers.
fn build_effects(
    insts: &[Inst],
    abi: &Abi,
    arg_locs: &[ArgLocation],
) -> (Vec<InstEffects>, Vec<usize>) {
    let mut positions: HashMap<LabelId, usize> = HashMap::new();
    for (i, inst) in insts.iter().enumerate() {
        if let InstKind::Bind(id) = inst.kind {
            positions.insert(id, i);
        }
    }
    let mut label_positions: Vec<usize> = positions.values().copied().collect();
    label_positions.sort_unstable();

    let volatile_keys: Vec<RegKey> = abi
        .volatile_registers
        .iter()
        .map(Reg::live_key)
        .collect();

    let effects = insts
        .iter()
        .map(|inst| {
            let mut uses: Vec<RegKey> = inst.input_regs().iter().map(Reg::live_key).collect();
            let mut defs: Vec<RegKey> = inst.output_regs().iter().map(Reg::live_key).collect();
            let flow = match inst.kind {
                InstKind::Branch { cond, target } => FlowKind::Branch {
                    target: positions.get(&target).copied().unwrap_or(usize::MAX),
                    conditional: cond.is_some(),
                },
                InstKind::Ret | InstKind::Return => FlowKind::Stop,
                _ => FlowKind::Fall,
            };
            match inst.kind {
                InstKind::LoadArg { arg } => {
                    if let Some(ArgLocation::Register(r)) = arg_locs.get(arg as usize) {
                        uses.push(r.live_key());
                    }
                }
                // a call clobbers every volatile register, whether its
                // target is a label or a register
                InstKind::CallLabel { .. } => {
                    defs.extend(volatile_keys.iter().copied());
                }
                InstKind::Normal if inst.mnemonic == "call" => {
                    defs.extend(volatile_keys.iter().copied());
                }
                _ => {}
            }
            InstEffects { uses, defs, flow }
        })
        .collect();
    (effects, label_positions)
}

fn gather_constraints(insts: &[Inst], arg_locs: &[ArgLocation]) -> Constraints {
    let mut constraints = Constraints::default();
    for inst in insts {
        for (v, reg) in inst.fixed_bindings() {
            if let Some(phys) = reg.phys() {
                constraints.fixed.insert(v, phys);
            }
        }
        if let InstKind::LoadArg { arg } = inst.kind {
            if let (Some(Operand::Reg(dst)), Some(ArgLocation::Register(src))) =
                (inst.operands.first(), arg_locs.get(arg as usize))
            {
                if let (RegId::Virt(v), Some(phys)) = (dst.id, src.phys()) {
                    if dst.class.bank() == src.class.bank() {
                        constraints.preferred.insert(v, phys);
                    }
                }
            }
        }
    }
    constraints
}

/// Rewrite the stream so `victim` lives in a stack slot: a store follows
/// each definition and a fresh short-lived virtual register feeds each
/// use. Returns the frame offset past the slot.
fn spill_virtual(
    insts: &mut Vec<Inst>,
    vregs: &mut VirtRegAllocator,
    victim: u32,
    slot_base: i32,
) -> AsmResult<i32> {
    use crate::x64::catalog::spill_forms;

    let is_victim = |r: &Reg| matches!(r.id, RegId::Virt(v) if v == victim);
    let class = insts
        .iter()
        .flat_map(|i| i.operands.iter())
        .flat_map(Operand::regs)
        .find(|r| is_victim(r))
        .map(|r| r.class)
        .unwrap_or(RegClass::Gp);
    let (width, size) = match class {
        RegClass::Ymm => (32, Size::Hword),
        RegClass::Xmm => (16, Size::Oword),
        _ => (8, Size::Qword),
    };
    let slot = (slot_base + width - 1) & !(width - 1);
    let slot_mem = mem(RSP + slot)
        .map_err(|_| AsmError::Finalization {
            reason: "spill slot address out of range".to_string(),
        })?
        .with_size(size);

    let mut out: Vec<Inst> = Vec::with_capacity(insts.len() + 8);
    let drained: Vec<Inst> = std::mem::take(insts);

    for mut inst in drained {
        let reads = inst.input_regs().iter().any(is_victim);
        let writes = inst.output_regs().iter().any(is_victim);
        let addr_use = inst.operands.iter().any(|op| match op {
            Operand::Mem(m) => m.regs().any(|r| is_victim(&r)),
            _ => false,
        });

        if reads || writes || addr_use {
            let temp = match class {
                RegClass::Xmm => vregs.xmm(),
                RegClass::Ymm => vregs.ymm(),
                RegClass::Mmx => vregs.mmx(),
                _ => vregs.gp64(),
            };
            if reads || addr_use {
                out.push(spill_forms::reload(temp, slot_mem));
            }
            inst.rewrite_regs(&mut |r| {
                if is_victim(&r) {
                    temp.with_size(r.size)
                } else {
                    r
                }
            });
            let store_after = writes;
            out.push(inst);
            if store_after {
                out.push(spill_forms::store(slot_mem, temp));
            }
        } else {
            out.push(inst);
        }
    }

    *insts = out;
    Ok(slot + width)
}

fn align_frame(abi: &Abi, spill_size: i32, saved_count: usize) -> i32 {
    if spill_size == 0 {
        return 0;
    }
    let alignment = abi.stack_alignment as i32;
    if alignment <= 8 {
        return (spill_size + 7) & !7;
    }
    // at entry rsp % 16 == 8; pushes plus the frame must restore 16-byte
    // alignment
    let pushed = 8 * saved_count as i32 + 8;
    let mut frame = (spill_size + 7) & !7;
    if (pushed + frame) % alignment != 0 {
        frame += 8;
    }
    frame
}

#[allow(clippy::too_many_arguments)]
fn lower_pseudos(
    insts: &mut Vec<Inst>,
    labels: &mut LabelArena,
    abi: &'static Abi,
    args: &[Argument],
    result: Option<ValueType>,
    arg_locs: &[ArgLocation],
    args_size: i32,
    frame_size: i32,
    saved: &[Reg],
) -> AsmResult<()> {
    use crate::x64::catalog::lowering;

    let ret_offset = args_size;
    let drained: Vec<Inst> = std::mem::take(insts);
    let mut out: Vec<Inst> = Vec::with_capacity(drained.len() + 8);

    lowering::emit_prologue(&mut out, abi, saved, frame_size)?;

    for inst in drained {
        match inst.kind {
            InstKind::LoadArg { arg } => {
                let dst = match inst.operands.first() {
                    Some(Operand::Reg(r)) => *r,
                    _ => unreachable!("argument load without register destination"),
                };
                lowering::emit_arg_load(
                    &mut out,
                    abi,
                    dst,
                    arg,
                    &args[arg as usize],
                    arg_locs[arg as usize],
                    frame_size,
                    saved.len(),
                )?;
            }
            InstKind::Return => {
                lowering::emit_return(
                    &mut out,
                    abi,
                    result,
                    inst.operands.first().copied(),
                    ret_offset,
                    frame_size,
                    saved,
                )?;
            }
            InstKind::Ret => {
                lowering::emit_epilogue(&mut out, abi, saved, frame_size)?;
                out.push(inst);
            }
            _ => out.push(inst),
        }
    }

    // re-derive label positions after insertion
    for (i, inst) in out.iter().enumerate() {
        if let InstKind::Bind(id) = inst.kind {
            labels.rebind(id, i);
        }
    }
    *insts = out;
    Ok(())
}

/// An allocated, lowered, ABI-bound function ready for encoding or
/// formatting.
#[derive(Debug)]
pub struct FinalizedFunction {
    pub name: String,
    pub args: Vec<Argument>,
    pub result: Option<ValueType>,
    pub abi: &'static Abi,
    pub(crate) insts: Vec<Inst>,
    pub(crate) labels: LabelArena,
    pub(crate) pool: ConstantPool,
    pub frame_size: i32,
    pub args_size: i32,
    pub saved_registers: Vec<Reg>,
}

/// Encoded artifact: machine code, relocation records, and the constant
/// pool appended after the code.
#[derive(Debug)]
pub struct EncodedFunction {
    pub code: Vec<u8>,
    pub relocations: Vec<Relocation>,
    /// Offset of the constant pool inside `code`, if any constants exist.
    pub pool_offset: Option<u32>,
}

impl FinalizedFunction {
    /// Instruction view for listings and tests.
    pub fn instructions(&self) -> &[Inst] {
        &self.insts
    }

    /// Serialize to machine code. Backward branches use the short rel8
    /// form when in reach; forward branches are encoded long and patched.
    pub fn encode(&self) -> AsmResult<EncodedFunction> {
        let mut code: Vec<u8> = Vec::new();
        let mut label_addrs: HashMap<LabelId, usize> = HashMap::new();
        // forward fixups: (field offset, branch end offset, target)
        let mut fixups: Vec<(usize, usize, LabelId)> = Vec::new();
        let mut relocations: Vec<Relocation> = Vec::new();

        for inst in &self.insts {
            match inst.kind {
                InstKind::Bind(id) => {
                    label_addrs.insert(id, code.len());
                }
                InstKind::Align(boundary) => {
                    let boundary = boundary as usize;
                    let mut pad = (boundary - code.len() % boundary) % boundary;
                    while pad > 0 {
                        let chunk = pad.min(15);
                        code.extend_from_slice(crate::x64::encoding::nop(chunk));
                        pad -= chunk;
                    }
                }
                InstKind::Branch { cond, target } => {
                    match label_addrs.get(&target) {
                        Some(&addr) => {
                            let short_disp =
                                addr as i64 - (code.len() + branch_len(cond, true)) as i64;
                            if (-128..=127).contains(&short_disp) {
                                code.extend_from_slice(&encode_branch(
                                    cond,
                                    short_disp as i32,
                                    true,
                                ));
                            } else {
                                let disp =
                                    addr as i64 - (code.len() + branch_len(cond, false)) as i64;
                                code.extend_from_slice(&encode_branch(cond, disp as i32, false));
                            }
                        }
                        None => {
                            // forward reference: encode long, patch later
                            let bytes = encode_branch(cond, 0, false);
                            let field = code.len() + bytes.len() - 4;
                            code.extend_from_slice(&bytes);
                            fixups.push((field, code.len(), target));
                        }
                    }
                }
                InstKind::CallLabel { target } => {
                    code.push(0xE8);
                    let field = code.len();
                    code.extend_from_slice(&[0; 4]);
                    match label_addrs.get(&target) {
                        Some(&addr) => {
                            let disp = addr as i64 - code.len() as i64;
                            code[field..field + 4]
                                .copy_from_slice(&(disp as i32).to_le_bytes());
                        }
                        None => fixups.push((field, code.len(), target)),
                    }
                }
                InstKind::Ret => code.push(0xC3),
                InstKind::ArgSlotLoad { .. } | InstKind::ResultStore { .. } => {
                    let concrete = crate::x64::catalog::lowering::materialize_fp_access(
                        inst,
                        &self.args,
                        self.result,
                        self.frame_size,
                    )?;
                    let encoded = encode_normal(&concrete);
                    code.extend_from_slice(&encoded.bytes);
                }
                InstKind::Return | InstKind::LoadArg { .. } => {
                    unreachable!("pseudo-instruction {} survived lowering", inst.mnemonic)
                }
                InstKind::Normal => {
                    let encoded = encode_normal(inst);
                    let start = code.len();
                    code.extend_from_slice(&encoded.bytes);
                    if let Some((from_end, constant, width)) = encoded.reloc {
                        relocations.push(Relocation {
                            offset: (code.len() - from_end as usize) as u32,
                            program_counter: (start + encoded.bytes.len()) as u32,
                            constant,
                            field_width: width,
                        });
                    }
                }
            }
        }

        for (field, end, target) in fixups {
            let addr = match label_addrs.get(&target) {
                Some(&a) => a,
                None => {
                    return Err(AsmError::UndefinedLabel {
                        name: self.labels.name(target).to_string(),
                    })
                }
            };
            let disp = addr as i64 - end as i64;
            code[field..field + 4].copy_from_slice(&(disp as i32).to_le_bytes());
        }

        // constant pool after the code, 16-byte aligned
        let pool_offset = if self.pool.is_empty() {
            None
        } else {
            let mut pool = self.pool.clone();
            pool.layout();
            while code.len() % 16 != 0 {
                code.push(0x00);
            }
            let base = code.len() as u32;
            pool.emit(&mut code);
            for reloc in &relocations {
                let target = base + pool.offset(reloc.constant);
                let disp = target as i64 - reloc.program_counter as i64;
                let at = reloc.offset as usize;
                code[at..at + 4].copy_from_slice(&(disp as i32).to_le_bytes());
            }
            Some(base)
        };

        Ok(EncodedFunction {
            code,
            relocations,
            pool_offset,
        })
    }
}
