//! Kill sets: the registers whose contents do not survive an operation.
//!
//! Kill sets may be conservative: killing a register that an operation in fact preserves costs
//! at most a spill, whereas failing to kill a register the operation trashes is a miscompilation.

use crate::{
    lir::{BlkOpKind, Call, Helper, Ty},
    regs::{RegClass, RegMask},
    target::TargetT,
};
use smallvec::{SmallVec, smallvec};

/// The registers `call`, whose type is `ty`, returns its value in, in the order the value's parts
/// are returned.
pub(crate) fn call_ret_regs<T: TargetT>(
    target: &T,
    call: &Call<T::Reg>,
    ty: Ty,
) -> SmallVec<[T::Reg; 4]> {
    if ty == Ty::Void {
        SmallVec::new()
    } else if let Some(regs) = &call.multi_ret {
        regs.clone()
    } else if let Some(reg) = call.helper().and_then(|h| target.helper_ret_reg(h)) {
        smallvec![reg]
    } else if ty.reg_class() == RegClass::Float {
        smallvec![target.float_ret_reg()]
    } else if ty == Ty::I64 {
        SmallVec::from_slice(target.long_ret_regs())
    } else {
        smallvec![target.int_ret_reg()]
    }
}

/// The registers killed by `call`, whose type is `ty`. `float_used` says whether the method has
/// any floating point values that could be live across the call.
pub fn kill_set_for_call<T: TargetT>(
    target: &T,
    float_used: bool,
    call: &Call<T::Reg>,
    ty: Ty,
) -> RegMask<T::Reg> {
    let mut kills = match call.helper() {
        Some(h) => target.helper_kill_set(h),
        None => target.callee_trash(),
    };
    let ret = RegMask::from_regs(&call_ret_regs(target, call, ty));
    if !float_used && ret.of_class(RegClass::Float).is_empty() {
        // No floating point values can be live across the call.
        kills = kills - kills.of_class(RegClass::Float);
    }
    // The return registers are written by the call whatever the helper's kill set says.
    kills | ret
}

/// The registers killed by a block store performed with strategy `kind`.
pub fn kill_set_for_block_store<T: TargetT>(
    target: &T,
    kind: BlkOpKind,
    init: bool,
) -> RegMask<T::Reg> {
    match kind {
        BlkOpKind::CpObjUnroll => target.helper_kill_set(Helper::AssignByRef),
        BlkOpKind::Helper if init => target.helper_kill_set(Helper::MemSet),
        BlkOpKind::Helper => target.helper_kill_set(Helper::MemCpy),
        BlkOpKind::Unroll | BlkOpKind::UnrollMemmove | BlkOpKind::Loop => RegMask::none(),
    }
}

/// The registers killed by an indirect store.
pub fn kill_set_for_store_ind<T: TargetT>(target: &T, write_barrier: bool) -> RegMask<T::Reg> {
    if write_barrier {
        target.helper_kill_set(Helper::AssignRef)
    } else {
        RegMask::none()
    }
}
