//! A subset of the RV32I base instruction set, enough to run small
//! programs: register and immediate arithmetic, LUI / AUIPC, jumps,
//! conditional branches, loads and stores.
//!
//! Each of the six RV32I encodings is a form module (`rv32-r`,
//! `rv32-i`, `rv32-s`, `rv32-b`, `rv32-u`, `rv32-j`), taking the name
//! of its register file from the `register-file` setting.  Each group
//! of instructions sharing an opcode is a functor module.  Functors
//! which change control flow write the CPU's program counter directly.
use std::sync::Arc;

use base::Settings;
use cpu::{InstructionForm, InstructionFunctor};

use super::error::ModuleError;
use super::modules::{CpuContext, ModuleRegistry};

pub mod encode;
mod forms;
mod functors;

pub use forms::{Layout, Rv32Form};
pub use functors::{Auipc, Branch, Jal, Jalr, Load, Lui, Op, OpImm, Store};

/// The primary opcodes of the supported instruction groups.
pub mod opcode {
    use base::Opcode;

    pub const LOAD: Opcode = 0x03;
    pub const OP_IMM: Opcode = 0x13;
    pub const AUIPC: Opcode = 0x17;
    pub const STORE: Opcode = 0x23;
    pub const OP: Opcode = 0x33;
    pub const LUI: Opcode = 0x37;
    pub const BRANCH: Opcode = 0x63;
    pub const JALR: Opcode = 0x67;
    pub const JAL: Opcode = 0x6f;
}

fn form(
    layout: Layout,
    ctx: &CpuContext,
    settings: &Settings,
) -> Result<Arc<dyn InstructionForm>, ModuleError> {
    let file = ctx.register_file(settings.string("register-file")?)?;
    Ok(Arc::new(Rv32Form::new(layout, Arc::clone(&ctx.bank), file)))
}

fn make_r(ctx: &CpuContext, s: &Settings) -> Result<Arc<dyn InstructionForm>, ModuleError> {
    form(Layout::R, ctx, s)
}

fn make_i(ctx: &CpuContext, s: &Settings) -> Result<Arc<dyn InstructionForm>, ModuleError> {
    form(Layout::I, ctx, s)
}

fn make_s(ctx: &CpuContext, s: &Settings) -> Result<Arc<dyn InstructionForm>, ModuleError> {
    form(Layout::S, ctx, s)
}

fn make_b(ctx: &CpuContext, s: &Settings) -> Result<Arc<dyn InstructionForm>, ModuleError> {
    form(Layout::B, ctx, s)
}

fn make_u(ctx: &CpuContext, s: &Settings) -> Result<Arc<dyn InstructionForm>, ModuleError> {
    form(Layout::U, ctx, s)
}

fn make_j(ctx: &CpuContext, s: &Settings) -> Result<Arc<dyn InstructionForm>, ModuleError> {
    form(Layout::J, ctx, s)
}

fn make_op(_: &CpuContext, _: &Settings) -> Result<Arc<dyn InstructionFunctor>, ModuleError> {
    Ok(Arc::new(Op))
}

fn make_op_imm(_: &CpuContext, _: &Settings) -> Result<Arc<dyn InstructionFunctor>, ModuleError> {
    Ok(Arc::new(OpImm))
}

fn make_lui(_: &CpuContext, _: &Settings) -> Result<Arc<dyn InstructionFunctor>, ModuleError> {
    Ok(Arc::new(Lui))
}

fn make_auipc(ctx: &CpuContext, _: &Settings) -> Result<Arc<dyn InstructionFunctor>, ModuleError> {
    Ok(Arc::new(Auipc::new(ctx.pc.clone())))
}

fn make_jal(ctx: &CpuContext, _: &Settings) -> Result<Arc<dyn InstructionFunctor>, ModuleError> {
    Ok(Arc::new(Jal::new(ctx.pc.clone())))
}

fn make_jalr(ctx: &CpuContext, _: &Settings) -> Result<Arc<dyn InstructionFunctor>, ModuleError> {
    Ok(Arc::new(Jalr::new(ctx.pc.clone())))
}

fn make_branch(ctx: &CpuContext, _: &Settings) -> Result<Arc<dyn InstructionFunctor>, ModuleError> {
    Ok(Arc::new(Branch::new(ctx.pc.clone())))
}

fn make_load(ctx: &CpuContext, _: &Settings) -> Result<Arc<dyn InstructionFunctor>, ModuleError> {
    Ok(Arc::new(Load::new(Arc::clone(&ctx.port))))
}

fn make_store(ctx: &CpuContext, _: &Settings) -> Result<Arc<dyn InstructionFunctor>, ModuleError> {
    Ok(Arc::new(Store::new(Arc::clone(&ctx.port))))
}

pub(crate) fn register_modules(modules: &mut ModuleRegistry) {
    modules.add_form("rv32-r", make_r);
    modules.add_form("rv32-i", make_i);
    modules.add_form("rv32-s", make_s);
    modules.add_form("rv32-b", make_b);
    modules.add_form("rv32-u", make_u);
    modules.add_form("rv32-j", make_j);

    modules.add_functor("rv32-op", make_op);
    modules.add_functor("rv32-op-imm", make_op_imm);
    modules.add_functor("rv32-lui", make_lui);
    modules.add_functor("rv32-auipc", make_auipc);
    modules.add_functor("rv32-jal", make_jal);
    modules.add_functor("rv32-jalr", make_jalr);
    modules.add_functor("rv32-branch", make_branch);
    modules.add_functor("rv32-load", make_load);
    modules.add_functor("rv32-store", make_store);
}
