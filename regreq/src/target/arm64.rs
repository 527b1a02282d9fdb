//! The ARM64 target.

use super::{Arch, TargetT, UnrollKind};
use crate::{
    CompilationError,
    config::{Abi, Config, TargetOpts},
    lir::Helper,
    regs::{RegClass, RegIdx, RegMask, RegT},
};
use static_assertions::const_assert;
use std::str::FromStr;
use strum::{Display, EnumCount, EnumString, FromRepr};

#[derive(Clone, Copy, Debug, Display, EnumCount, EnumString, Eq, FromRepr, Hash, PartialEq)]
#[strum(serialize_all = "lowercase")]
// If the `repr` changes from `u8`, the `as` in the `Reg::regidx()` function will also need
// updating.
#[repr(u8)]
pub enum Reg {
    X0 = 0,
    X1,
    X2,
    X3,
    X4,
    X5,
    X6,
    X7,
    X8,
    X9,
    X10,
    X11,
    X12,
    X13,
    X14,
    X15,
    X16,
    X17,
    // The platform register: never allocated.
    X18,
    X19,
    X20,
    X21,
    X22,
    X23,
    X24,
    X25,
    X26,
    X27,
    X28,
    FP,
    LR,

    V0,
    V1,
    V2,
    V3,
    V4,
    V5,
    V6,
    V7,
    V8,
    V9,
    V10,
    V11,
    V12,
    V13,
    V14,
    V15,
    V16,
    V17,
    V18,
    V19,
    V20,
    V21,
    V22,
    V23,
    V24,
    V25,
    V26,
    V27,
    V28,
    V29,
    V30,
    V31,
}

const_assert!(Reg::COUNT <= 64);

impl Reg {
    /// The first intra-procedure-call scratch register.
    pub const IP0: Reg = Reg::X16;
    /// The second intra-procedure-call scratch register.
    pub const IP1: Reg = Reg::X17;
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
        if (*self as u8) < (Reg::V0 as u8) {
            RegClass::Int
        } else {
            RegClass::Float
        }
    }

    fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ip0" => Some(Reg::IP0),
            "ip1" => Some(Reg::IP1),
            x => Reg::from_str(x).ok(),
        }
    }
}

static INT_ARG_REGS: [Reg; 8] = [
    Reg::X0,
    Reg::X1,
    Reg::X2,
    Reg::X3,
    Reg::X4,
    Reg::X5,
    Reg::X6,
    Reg::X7,
];

static LONG_RET_REGS: [Reg; 1] = [Reg::X0];

/// Registers trashed by the write barrier helpers in addition to their address registers.
fn callee_trash_nogc() -> RegMask<Reg> {
    RegMask::from_regs(&[Reg::X12, Reg::X15, Reg::IP0, Reg::IP1])
}

#[derive(Debug)]
pub struct Arm64 {
    opts: TargetOpts,
}

impl Arm64 {
    pub fn new(opts: TargetOpts) -> Self {
        Self { opts }
    }

    pub fn from_config(config: &Config) -> Result<Self, CompilationError> {
        Ok(Self::new(super::config_opts::<Self>(config)?))
    }
}

impl TargetT for Arm64 {
    type Reg = Reg;
    const ARCH: Arch = Arch::Arm64;

    fn opts(&self) -> &TargetOpts {
        &self.opts
    }

    fn reg_size(&self) -> u32 {
        8
    }

    fn fp_reg_size(&self) -> u32 {
        16
    }

    fn all_int_regs(&self) -> RegMask<Reg> {
        (Reg::X0 as u8..=Reg::LR as u8)
            .map(|x| Reg::from_regidx(RegIdx::from_raw(x)))
            .filter(|r| !matches!(r, Reg::X18 | Reg::FP))
            .fold(RegMask::none(), |m, r| m.with(r))
    }

    fn all_float_regs(&self) -> RegMask<Reg> {
        (Reg::V0 as u8..=Reg::V31 as u8)
            .map(|x| Reg::from_regidx(RegIdx::from_raw(x)))
            .fold(RegMask::none(), |m, r| m.with(r))
    }

    fn int_callee_trash(&self) -> RegMask<Reg> {
        (Reg::X0 as u8..=Reg::X17 as u8)
            .map(|x| Reg::from_regidx(RegIdx::from_raw(x)))
            .fold(RegMask::from(Reg::LR), |m, r| m.with(r))
    }

    fn float_callee_trash(&self) -> RegMask<Reg> {
        // v8-v15 are callee saved (strictly: only their bottom 64 bits are).
        self.all_float_regs()
            - (Reg::V8 as u8..=Reg::V15 as u8)
                .map(|x| Reg::from_regidx(RegIdx::from_raw(x)))
                .fold(RegMask::none(), |m, r| m.with(r))
    }

    fn int_arg_regs(&self) -> &'static [Reg] {
        &INT_ARG_REGS
    }

    fn int_ret_reg(&self) -> Reg {
        Reg::X0
    }

    fn float_ret_reg(&self) -> Reg {
        Reg::V0
    }

    fn long_ret_regs(&self) -> &'static [Reg] {
        &LONG_RET_REGS
    }

    fn lr(&self) -> Reg {
        Reg::LR
    }

    fn gs_cookie_tmps(&self) -> RegMask<Reg> {
        RegMask::from_regs(&[Reg::IP0, Reg::IP1])
    }

    fn write_barrier_dst(&self) -> Reg {
        Reg::X14
    }

    fn write_barrier_src(&self) -> Reg {
        Reg::X15
    }

    fn byref_dst(&self) -> Reg {
        Reg::X14
    }

    fn byref_src(&self) -> Reg {
        Reg::X13
    }

    fn helper_kill_set(&self, helper: Helper) -> RegMask<Reg> {
        match helper {
            Helper::AssignRef | Helper::CheckedAssignRef => {
                callee_trash_nogc().with(self.write_barrier_dst())
            }
            Helper::AssignByRef => callee_trash_nogc()
                .with(self.byref_dst())
                .with(self.byref_src()),
            Helper::ValidateIndirectCall => {
                // The validator preserves the argument registers and the indirection cell.
                self.int_callee_trash()
                    - RegMask::from_regs(&INT_ARG_REGS)
                    - RegMask::from_regs(&[Reg::X8, Reg::X15])
            }
            Helper::InitPInvokeFrame | Helper::MemCpy | Helper::MemSet | Helper::Other => {
                self.callee_trash()
            }
        }
    }

    fn valid_ldst_offset(&self, offset: i64, size: u32) -> bool {
        if offset == 0 {
            return true;
        }
        // Unsigned, 12-bit, scaled by the access size.
        let scale = size.max(1).trailing_zeros();
        if offset > 0 && offset & ((1 << scale) - 1) == 0 && (offset >> scale) < 0x1000 {
            return true;
        }
        // Signed, 9-bit, unscaled.
        (-256..=255).contains(&offset)
    }

    fn unroll_limit(&self, _kind: UnrollKind) -> u32 {
        128
    }

    fn uses_paired_copies(&self) -> bool {
        true
    }

    fn putarg_stk_copy_temps(&self) -> usize {
        // ldp/stp
        2
    }

    fn tls_get_addr_regs(&self) -> Option<([Reg; 2], Reg)> {
        if self.opts.abi == Abi::NativeAot && self.opts.os.is_unix() {
            Some(([Reg::X0, Reg::X1], Reg::X2))
        } else {
            None
        }
    }
}
