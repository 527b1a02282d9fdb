//! The ARM32 (Thumb-2) target.

use super::{Arch, TargetT, UnrollKind};
use crate::{
    CompilationError,
    config::{Config, TargetOpts},
    lir::{Helper, Ty},
    regs::{RegClass, RegIdx, RegMask, RegT},
};
use static_assertions::const_assert;
use std::str::FromStr;
use strum::{Display, EnumCount, EnumString, FromRepr};

#[derive(Clone, Copy, Debug, Display, EnumCount, EnumString, Eq, FromRepr, Hash, PartialEq)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum Reg {
    R0 = 0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    R8,
    R9,
    R10,
    FP,
    R12,
    SP,
    LR,
    PC,

    // A double occupies an even/odd pair of single precision registers and is named by the even
    // one.
    S0,
    S1,
    S2,
    S3,
    S4,
    S5,
    S6,
    S7,
    S8,
    S9,
    S10,
    S11,
    S12,
    S13,
    S14,
    S15,
    S16,
    S17,
    S18,
    S19,
    S20,
    S21,
    S22,
    S23,
    S24,
    S25,
    S26,
    S27,
    S28,
    S29,
    S30,
    S31,
}

const_assert!(Reg::COUNT <= 64);

impl Reg {
    /// The register the p/invoke frame helper returns the thread control block in.
    pub const PINVOKE_TCB: Reg = Reg::R10;
    /// The scratch register trashed by the p/invoke frame helper.
    pub const PINVOKE_SCRATCH: Reg = Reg::R4;
}

impl RegT for Reg {
    const MAX_REGIDX: RegIdx = RegIdx::from_usize_unchecked(Reg::COUNT);

    fn from_regidx(idx: RegIdx) -> Self {
        Reg::from_repr(idx.raw()).unwrap()
    }

    fn regidx(&self) -> RegIdx {
        RegIdx::from_raw(*self as u8)
    }

    fn class(&self) -> RegClass {
        if (*self as u8) < (Reg::S0 as u8) {
            RegClass::Int
        } else {
            RegClass::Float
        }
    }

    fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "r11" => Some(Reg::FP),
            "r13" => Some(Reg::SP),
            "r14" => Some(Reg::LR),
            x => Reg::from_str(x).ok(),
        }
    }
}

static INT_ARG_REGS: [Reg; 4] = [Reg::R0, Reg::R1, Reg::R2, Reg::R3];

static LONG_RET_REGS: [Reg; 2] = [Reg::R0, Reg::R1];

fn callee_trash_nogc() -> RegMask<Reg> {
    RegMask::from_regs(&[Reg::R2, Reg::R3, Reg::R12, Reg::LR])
}

fn float_regs(step: usize) -> RegMask<Reg> {
    (Reg::S0 as u8..=Reg::S31 as u8)
        .step_by(step)
        .map(|x| Reg::from_regidx(RegIdx::from_raw(x)))
        .fold(RegMask::none(), |m, r| m.with(r))
}

#[derive(Debug)]
pub struct Arm32 {
    opts: TargetOpts,
}

impl Arm32 {
    pub fn new(opts: TargetOpts) -> Self {
        Self { opts }
    }

    pub fn from_config(config: &Config) -> Result<Self, CompilationError> {
        Ok(Self::new(super::config_opts::<Self>(config)?))
    }
}

impl TargetT for Arm32 {
    type Reg = Reg;
    const ARCH: Arch = Arch::Arm32;

    fn opts(&self) -> &TargetOpts {
        &self.opts
    }

    fn reg_size(&self) -> u32 {
        4
    }

    fn fp_reg_size(&self) -> u32 {
        8
    }

    fn all_int_regs(&self) -> RegMask<Reg> {
        (Reg::R0 as u8..=Reg::R10 as u8)
            .map(|x| Reg::from_regidx(RegIdx::from_raw(x)))
            .fold(RegMask::from_regs(&[Reg::R12, Reg::LR]), |m, r| m.with(r))
    }

    fn all_float_regs(&self) -> RegMask<Reg> {
        float_regs(1)
    }

    fn regs_for_ty(&self, ty: Ty) -> RegMask<Reg> {
        match ty {
            Ty::F64 => float_regs(2),
            _ if ty.reg_class() == RegClass::Float => self.all_float_regs(),
            _ => self.all_int_regs(),
        }
    }

    fn int_callee_trash(&self) -> RegMask<Reg> {
        RegMask::from_regs(&INT_ARG_REGS)
            .with(Reg::R12)
            .with(Reg::LR)
    }

    fn float_callee_trash(&self) -> RegMask<Reg> {
        (Reg::S0 as u8..=Reg::S15 as u8)
            .map(|x| Reg::from_regidx(RegIdx::from_raw(x)))
            .fold(RegMask::none(), |m, r| m.with(r))
    }

    fn int_arg_regs(&self) -> &'static [Reg] {
        &INT_ARG_REGS
    }

    fn int_ret_reg(&self) -> Reg {
        Reg::R0
    }

    fn float_ret_reg(&self) -> Reg {
        Reg::S0
    }

    fn long_ret_regs(&self) -> &'static [Reg] {
        &LONG_RET_REGS
    }

    fn lr(&self) -> Reg {
        Reg::LR
    }

    fn gs_cookie_tmps(&self) -> RegMask<Reg> {
        RegMask::from_regs(&[Reg::R12, Reg::LR])
    }

    fn write_barrier_dst(&self) -> Reg {
        Reg::R0
    }

    fn write_barrier_src(&self) -> Reg {
        Reg::R1
    }

    fn byref_dst(&self) -> Reg {
        Reg::R0
    }

    fn byref_src(&self) -> Reg {
        Reg::R1
    }

    fn helper_kill_set(&self, helper: Helper) -> RegMask<Reg> {
        match helper {
            Helper::AssignRef | Helper::CheckedAssignRef => {
                callee_trash_nogc().with(self.write_barrier_dst())
            }
            Helper::AssignByRef => callee_trash_nogc()
                .with(self.byref_dst())
                .with(self.byref_src()),
            Helper::InitPInvokeFrame => self
                .callee_trash()
                .with(Reg::PINVOKE_TCB)
                .with(Reg::PINVOKE_SCRATCH),
            Helper::ValidateIndirectCall => {
                self.int_callee_trash() - RegMask::from_regs(&INT_ARG_REGS)
            }
            Helper::MemCpy | Helper::MemSet | Helper::Other => self.callee_trash(),
        }
    }

    fn helper_ret_reg(&self, helper: Helper) -> Option<Reg> {
        match helper {
            Helper::InitPInvokeFrame => Some(Reg::PINVOKE_TCB),
            _ => None,
        }
    }

    fn valid_ldst_offset(&self, offset: i64, _size: u32) -> bool {
        (-255..=4095).contains(&offset)
    }

    fn unroll_limit(&self, kind: UnrollKind) -> u32 {
        match kind {
            UnrollKind::Memset | UnrollKind::Memcpy => 32,
            UnrollKind::Memmove => 0,
        }
    }

    fn supports_simd(&self) -> bool {
        false
    }

    fn unaligned_fp_indir_temps(&self, ty: Ty) -> usize {
        // Unaligned floating point values are moved through integer registers.
        match ty {
            Ty::F32 => 1,
            Ty::F64 => 2,
            _ => 0,
        }
    }

    fn putarg_stk_copy_temps(&self) -> usize {
        1
    }

    fn call_target_needs_temp(&self) -> bool {
        // Loading the target into a low register gives a shorter encoding than using ip.
        true
    }

    fn call_null_check_needs_temp(&self) -> bool {
        true
    }

    fn cast_needs_float_temp(&self, src: Ty, dst: Ty) -> bool {
        src.is_float() && !dst.is_float()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn arm32() -> Arm32 {
        Arm32::new(TargetOpts::default())
    }

    #[test]
    fn reg_names() {
        assert_eq!(Reg::from_name("r12"), Some(Reg::R12));
        assert_eq!(Reg::from_name("r14"), Some(Reg::LR));
        assert_eq!(Reg::from_name("s3"), Some(Reg::S3));
        assert_eq!(Reg::from_name("x0"), None);
        assert_eq!(Reg::FP.to_string(), "fp");
    }

    #[test]
    fn from_config() {
        let t = Arm32::from_config(&Config::from_str("arm32-linux").unwrap()).unwrap();
        assert!(!t.supports_simd());
        assert!(matches!(
            Arm32::from_config(&Config::from_str("arm64-linux").unwrap()),
            Err(CompilationError::UnsupportedTarget(_))
        ));
    }

    #[test]
    fn doubles_use_even_regs() {
        let t = arm32();
        let d = t.regs_for_ty(Ty::F64);
        assert_eq!(d.count(), 16);
        assert!(d.is_set(Reg::S0) && !d.is_set(Reg::S1));
        assert_eq!(t.regs_for_ty(Ty::F32).count(), 32);
        assert_eq!(t.regs_for_ty(Ty::I32), t.all_int_regs());
    }

    #[test]
    fn callee_trash() {
        let t = arm32();
        assert_eq!(t.int_callee_trash().count(), 6);
        assert!(t.int_callee_trash().is_subset_of(t.all_int_regs()));
        assert!(!t.all_int_regs().is_set(Reg::SP));
        assert!(!t.all_int_regs().is_set(Reg::FP));
        assert!(!t.supports_simd());
        let pinv = t.helper_kill_set(Helper::InitPInvokeFrame);
        assert!(pinv.is_set(Reg::PINVOKE_TCB));
        assert_eq!(t.helper_ret_reg(Helper::InitPInvokeFrame), Some(Reg::R10));
    }

    #[test]
    fn ldst_offsets() {
        let t = arm32();
        assert!(t.valid_ldst_offset(4095, 4));
        assert!(!t.valid_ldst_offset(4096, 4));
        assert!(t.valid_ldst_offset(-255, 4));
        assert!(!t.valid_ldst_offset(-256, 4));
    }
}
