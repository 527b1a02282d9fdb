//! Target descriptions.
//!
//! Everything the builders need to know about a target's register file, calling convention, and
//! instruction encodings is supplied by an implementation of [TargetT]. Where the two ARM targets
//! need a different number or kind of scratch registers for the same operation, [TargetT] exposes
//! a hook with a default that the target may override: builders never branch on [Arch] directly.

use crate::{
    CompilationError,
    config::{Config, TargetOpts},
    lir::{Helper, Ty},
    regs::{RegClass, RegMask, RegT},
};
use std::fmt::Debug;
use strum::{Display, EnumString};

pub mod arm32;
pub mod arm64;

#[derive(Clone, Copy, Debug, Display, EnumString, Eq, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum Arch {
    Arm32,
    Arm64,
}

/// The block operations that may be unrolled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnrollKind {
    Memset,
    Memcpy,
    Memmove,
}

pub trait TargetT: Debug {
    type Reg: RegT;
    const ARCH: Arch;

    fn opts(&self) -> &TargetOpts;

    /// The width, in bytes, of a general purpose register.
    fn reg_size(&self) -> u32;

    /// The width, in bytes, of a floating point / vector register.
    fn fp_reg_size(&self) -> u32;

    /// All general purpose registers available to the allocator.
    fn all_int_regs(&self) -> RegMask<Self::Reg>;

    /// All floating point registers available to the allocator.
    fn all_float_regs(&self) -> RegMask<Self::Reg>;

    /// The registers a value of type `ty` can live in.
    fn regs_for_ty(&self, ty: Ty) -> RegMask<Self::Reg> {
        match ty.reg_class() {
            RegClass::Int => self.all_int_regs(),
            RegClass::Float => self.all_float_regs(),
        }
    }

    /// The candidates for a floating point internal register.
    fn internal_float_regs(&self) -> RegMask<Self::Reg> {
        self.all_float_regs()
    }

    fn int_callee_trash(&self) -> RegMask<Self::Reg>;

    fn float_callee_trash(&self) -> RegMask<Self::Reg>;

    fn callee_trash(&self) -> RegMask<Self::Reg> {
        self.int_callee_trash() | self.float_callee_trash()
    }

    /// The integer argument registers, in argument order.
    fn int_arg_regs(&self) -> &'static [Self::Reg];

    fn int_ret_reg(&self) -> Self::Reg;

    fn float_ret_reg(&self) -> Self::Reg;

    /// The registers a 64-bit integer is returned in.
    fn long_ret_regs(&self) -> &'static [Self::Reg];

    /// The link register.
    fn lr(&self) -> Self::Reg;

    /// The registers used to check the stack security cookie in a tail call epilog.
    fn gs_cookie_tmps(&self) -> RegMask<Self::Reg>;

    /// The register the write barrier helper expects the destination address in.
    fn write_barrier_dst(&self) -> Self::Reg;

    /// The register the write barrier helper expects the stored reference in.
    fn write_barrier_src(&self) -> Self::Reg;

    /// The register the by-reference write barrier helper expects the destination address in.
    fn byref_dst(&self) -> Self::Reg;

    /// The register the by-reference write barrier helper expects the source address in.
    fn byref_src(&self) -> Self::Reg;

    /// The registers trashed by a call to `helper`.
    fn helper_kill_set(&self, helper: Helper) -> RegMask<Self::Reg>;

    /// If `helper` returns its result in a non-standard register, return that register.
    fn helper_ret_reg(&self, _helper: Helper) -> Option<Self::Reg> {
        None
    }

    /// Can a load or store of `size` bytes encode `offset` as an immediate displacement?
    fn valid_ldst_offset(&self, offset: i64, size: u32) -> bool;

    /// The largest block, in bytes, that is unrolled for `kind`. `0` means that `kind` is never
    /// unrolled on this target.
    fn unroll_limit(&self, kind: UnrollKind) -> u32;

    fn supports_simd(&self) -> bool {
        self.opts().simd
    }

    /// Does this target copy blocks with paired loads/stores of two general purpose registers?
    fn uses_paired_copies(&self) -> bool {
        false
    }

    /// How many general purpose scratch registers an unaligned floating point load or store of
    /// type `ty` needs.
    fn unaligned_fp_indir_temps(&self, _ty: Ty) -> usize {
        0
    }

    /// How many general purpose scratch registers copying a struct onto the outgoing argument area
    /// needs.
    fn putarg_stk_copy_temps(&self) -> usize;

    /// Does materializing a call's target address need a scratch register?
    fn call_target_needs_temp(&self) -> bool {
        false
    }

    /// Does an explicit null check of a call's `this` argument need a scratch register?
    fn call_null_check_needs_temp(&self) -> bool {
        false
    }

    /// If the thread-local-storage address helper must be called with a relocation-patchable
    /// instruction sequence, return the two registers that sequence uses and the register the
    /// call target is held in.
    fn tls_get_addr_regs(&self) -> Option<([Self::Reg; 2], Self::Reg)> {
        None
    }

    /// Does a cast from `src` to `dst` need to be staged through a floating point scratch
    /// register?
    fn cast_needs_float_temp(&self, _src: Ty, _dst: Ty) -> bool {
        false
    }
}

/// Return the options from `config` for a target of architecture `T`.
fn config_opts<T: TargetT>(config: &Config) -> Result<TargetOpts, CompilationError> {
    if config.arch != T::ARCH {
        return Err(CompilationError::UnsupportedTarget(format!(
            "configured for {} but building for {}",
            config.arch,
            T::ARCH
        )));
    }
    Ok(config.opts.clone())
}
