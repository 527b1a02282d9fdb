//! Block copies and inits.
//!
//! A block store is performed with one of several strategies ([BlkOpKind]). Lowering normally
//! chooses the strategy; if it has not, [select_blk_kind] does. The internal registers each
//! strategy needs are a pure function of the store's [BlkShape], computed by
//! [blk_internal_reqs].

use super::RefBuilder;
use crate::{
    CompilationError,
    kill::kill_set_for_block_store,
    lir::{BlkOpKind, NodeIdx, Op},
    refpos::NodeReqs,
    regs::{RegClass, RegMask},
    target::{TargetT, UnrollKind},
};
use smallvec::SmallVec;

/// Choose a strategy for a block store of `size` bytes. `dynamic_size` means that `size` is only
/// known at run-time; `gc` that the destination may contain GC references; and `overlap` that
/// the source and destination of a copy may overlap.
pub fn select_blk_kind<T: TargetT>(
    target: &T,
    init: bool,
    size: u32,
    dynamic_size: bool,
    gc: bool,
    overlap: bool,
) -> BlkOpKind {
    if dynamic_size {
        BlkOpKind::Helper
    } else if init {
        if size <= target.unroll_limit(UnrollKind::Memset) {
            BlkOpKind::Unroll
        } else if gc {
            // The helper is not GC safe.
            BlkOpKind::Loop
        } else {
            BlkOpKind::Helper
        }
    } else if gc {
        BlkOpKind::CpObjUnroll
    } else if overlap {
        if size > 0 && size <= target.unroll_limit(UnrollKind::Memmove) {
            BlkOpKind::UnrollMemmove
        } else {
            BlkOpKind::Helper
        }
    } else if size <= target.unroll_limit(UnrollKind::Memcpy) {
        BlkOpKind::Unroll
    } else {
        BlkOpKind::Helper
    }
}

/// The facts about a block store that determine which internal registers it needs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BlkShape {
    pub kind: BlkOpKind,
    pub init: bool,
    pub size: u32,
    pub dynamic_size: bool,
    /// Is the destination address folded into the store?
    pub dst_contained: bool,
    /// Is the destination the address of a local?
    pub dst_local: bool,
    /// Is the source of a copy a local, or addressed via the address of a local?
    pub src_local: bool,
    /// Is the source address of a copy folded into the store?
    pub src_addr_contained: bool,
}

/// An internal register a block store needs. If `candidates` is `None`, any register of `class`
/// not otherwise reserved will do.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InternalReq<Reg> {
    pub class: RegClass,
    pub candidates: Option<RegMask<Reg>>,
}

/// The internal registers, in reservation order, that a block store of shape `shape` needs.
pub fn blk_internal_reqs<T: TargetT>(
    target: &T,
    shape: &BlkShape,
) -> Result<SmallVec<[InternalReq<T::Reg>; 4]>, CompilationError> {
    let int = |candidates| InternalReq {
        class: RegClass::Int,
        candidates,
    };
    let float = InternalReq {
        class: RegClass::Float,
        candidates: Some(target.internal_float_regs()),
    };
    let size = shape.size;
    let mut reqs = SmallVec::new();
    match (shape.init, shape.kind) {
        (true, BlkOpKind::Unroll) => {
            if target.uses_paired_copies() {
                if shape.dst_contained {
                    reqs.push(int(None));
                }
                if size > target.fp_reg_size() {
                    reqs.push(float);
                }
            }
        }
        (true, BlkOpKind::Loop) => reqs.push(int(Some(target.all_int_regs()))),
        (false, BlkOpKind::CpObjUnroll) => {
            let candidates = target.all_int_regs()
                - RegMask::from_regs(&[target.byref_dst(), target.byref_src()]);
            reqs.push(int(Some(candidates)));
            if size >= 2 * target.reg_size() {
                reqs.push(int(Some(candidates)));
            }
            if size >= 4 * target.reg_size() && target.supports_simd() {
                reqs.push(float);
                reqs.push(float);
            }
        }
        (false, BlkOpKind::Unroll) => {
            reqs.push(int(None));
            if target.uses_paired_copies() {
                if size >= 2 * target.reg_size() {
                    reqs.push(int(None));
                }
                if size >= 2 * target.fp_reg_size() {
                    reqs.push(float);
                    reqs.push(float);
                }
                // Both addresses may need to be computed into registers.
                if (shape.src_local || shape.src_addr_contained)
                    && (shape.dst_local || shape.dst_contained)
                {
                    reqs.push(int(None));
                }
            }
        }
        (false, BlkOpKind::UnrollMemmove) => {
            if target.unroll_limit(UnrollKind::Memmove) == 0 {
                return Err(CompilationError::UnsupportedTarget(format!(
                    "overlapping block copies can not be unrolled on {}",
                    T::ARCH
                )));
            }
            if size == 0 {
                return Err(CompilationError::UnreachableShape(
                    "empty overlapping block copy".to_owned(),
                ));
            }
            // The whole source is loaded before any of the destination is stored.
            let vec_size = target.fp_reg_size();
            if size >= vec_size {
                for _ in 0..size.div_ceil(vec_size) {
                    reqs.push(float);
                }
            } else if size.is_power_of_two() {
                reqs.push(int(Some(target.all_int_regs())));
            } else {
                reqs.push(int(Some(target.all_int_regs())));
                reqs.push(int(Some(target.all_int_regs())));
            }
        }
        (_, BlkOpKind::Helper) => {
            if !shape.dynamic_size {
                // The constant size is materialized in the helper's size argument register.
                let [_, _, size_reg] = helper_arg_regs(target)?;
                reqs.push(int(Some(RegMask::from(size_reg))));
            }
        }
        (init, kind) => {
            let op = if init { "init" } else { "copy" };
            return Err(CompilationError::UnreachableShape(format!(
                "{kind} is not a block {op} strategy"
            )));
        }
    }
    Ok(reqs)
}

/// The registers the memcpy/memset helpers take their destination, source (or fill value), and
/// size in.
fn helper_arg_regs<T: TargetT>(target: &T) -> Result<[T::Reg; 3], CompilationError> {
    match target.int_arg_regs() {
        [a0, a1, a2, ..] => Ok([*a0, *a1, *a2]),
        _ => Err(CompilationError::AbiInconsistency(
            "block helpers need three argument registers".to_owned(),
        )),
    }
}

impl<T: TargetT> RefBuilder<'_, T> {
    pub(super) fn build_block_store(
        &mut self,
        idx: NodeIdx,
    ) -> Result<NodeReqs<T::Reg>, CompilationError> {
        let lir = self.lir;
        let target = self.target;
        let Op::StoreBlk(sb) = &lir.node(idx).op else {
            unreachable!()
        };
        let kind = sb.kind.unwrap_or_else(|| {
            select_blk_kind(
                target,
                sb.init,
                sb.size,
                sb.size_node.is_some(),
                sb.gc,
                sb.overlap,
            )
        });
        if sb.size_node.is_some() && kind != BlkOpKind::Helper {
            return Err(self.shape_err(idx, "dynamically sized block store must use the helper"));
        }

        let dst = lir.node(sb.addr);
        // For a copy, the source address (if the source isn't a local); for an init, the fill
        // value.
        let (src, src_local) = if sb.init {
            match lir.node(sb.data).op {
                Op::InitVal { val } => (Some(val), false),
                _ => (Some(sb.data), false),
            }
        } else {
            let data = lir.node(sb.data);
            if !data.contained {
                return Err(self.shape_err(idx, "block copy source must be contained"));
            }
            match data.op {
                Op::Ind { addr, .. } | Op::Blk { addr, .. } => {
                    (Some(addr), matches!(lir.node(addr).op, Op::LclAddr { .. }))
                }
                Op::LclVar { .. } => (None, true),
                _ => return Err(self.shape_err(idx, "unexpected block copy source")),
            }
        };
        let src_contained = src.is_some_and(|x| lir.node(x).contained);
        let shape = BlkShape {
            kind,
            init: sb.init,
            size: sb.size,
            dynamic_size: sb.size_node.is_some(),
            dst_contained: dst.contained,
            dst_local: matches!(dst.op, Op::LclAddr { .. }),
            src_local,
            src_addr_contained: !sb.init && src_contained,
        };

        let mut reqs = NodeReqs::default();
        for ireq in blk_internal_reqs(target, &shape)? {
            match ireq.class {
                RegClass::Int => self.internal_int_def(idx, &mut reqs, ireq.candidates),
                RegClass::Float => self.internal_float_def(idx, &mut reqs, ireq.candidates),
            }
        }

        let (dst_mask, src_mask, size_mask) = match kind {
            BlkOpKind::CpObjUnroll => (
                Some(RegMask::from(target.byref_dst())),
                Some(RegMask::from(target.byref_src())),
                None,
            ),
            BlkOpKind::Helper => {
                let [a0, a1, a2] = helper_arg_regs(target)?;
                (
                    Some(RegMask::from(a0)),
                    Some(RegMask::from(a1)),
                    Some(RegMask::from(a2)),
                )
            }
            _ => (None, None, None),
        };
        if dst_mask.is_some() && dst.contained {
            return Err(self.shape_err(idx, "block store destination must be in a register"));
        }
        if kind == BlkOpKind::CpObjUnroll && src_contained {
            return Err(self.shape_err(idx, "block copy source must be in a register"));
        }

        self.build_blk_addr_uses(idx, sb.addr, dst_mask)?;
        if let Some(src) = src {
            self.build_blk_addr_uses(idx, src, src_mask)?;
        }
        if let Some(size_node) = sb.size_node {
            self.build_operand_uses(idx, size_node, size_mask)?;
        }
        self.build_internal_uses(idx, &reqs);
        self.build_kills(idx, kill_set_for_block_store(target, kind, sb.init));
        Ok(reqs)
    }

    /// Record the uses of a block store's address (or fill value) `addr`. Only the base of a
    /// contained address mode is used: the store computes the rest of the address itself.
    fn build_blk_addr_uses(
        &mut self,
        idx: NodeIdx,
        addr: NodeIdx,
        candidates: Option<RegMask<T::Reg>>,
    ) -> Result<(), CompilationError> {
        let lir = self.lir;
        let anode = lir.node(addr);
        if !anode.contained {
            self.build_use(idx, addr, candidates, 0)?;
        } else if let Op::Lea { base: Some(base), .. } = anode.op {
            self.build_addr_uses(idx, base, None)?;
        }
        Ok(())
    }
}
