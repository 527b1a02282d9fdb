//! Outgoing arguments passed wholly or partly on the stack.

use super::RefBuilder;
use crate::{
    CompilationError,
    lir::{NodeIdx, Op, Ty},
    refpos::NodeReqs,
    regs::RegMask,
    target::TargetT,
};
use smallvec::SmallVec;

impl<T: TargetT> RefBuilder<'_, T> {
    /// Store an argument to the outgoing argument area.
    pub(super) fn build_putarg_stk(
        &mut self,
        idx: NodeIdx,
    ) -> Result<NodeReqs<T::Reg>, CompilationError> {
        let lir = self.lir;
        let target = self.target;
        let Op::PutArgStk {
            data,
            stack_byte_size,
        } = lir.node(idx).op
        else {
            unreachable!()
        };
        let dnode = lir.node(data);
        let mut reqs = NodeReqs::default();
        if dnode.ty == Ty::Struct {
            match &dnode.op {
                Op::FieldList { fields } => {
                    for &f in fields {
                        let fty = lir.node(f).ty;
                        if fty == Ty::Simd12 {
                            // Written as an 8 byte and a 4 byte store, assembled in a scratch
                            // register.
                            self.internal_int_def(idx, &mut reqs, None);
                            reqs.store_widths.extend([8, 4]);
                        } else {
                            reqs.store_widths.push(fty.size());
                        }
                    }
                    for &f in fields {
                        self.build_use(idx, f, None, 0)?;
                    }
                }
                Op::Blk { addr, .. } => {
                    for _ in 0..target.putarg_stk_copy_temps() {
                        self.internal_int_def(idx, &mut reqs, None);
                    }
                    self.build_addr_uses(idx, *addr, None)?;
                }
                Op::LclVar { .. } => {
                    for _ in 0..target.putarg_stk_copy_temps() {
                        self.internal_int_def(idx, &mut reqs, None);
                    }
                }
                _ => return Err(self.shape_err(idx, "unexpected struct argument source")),
            }
        } else {
            if dnode.contained {
                return Err(self.shape_err(idx, "stack argument must be in a register"));
            }
            if dnode.ty == Ty::Simd12 && stack_byte_size == 12 {
                // Only the Apple ABI packs a 12 byte vector into 12 bytes of stack; the others
                // write all 16 bytes with one store.
                if !target.opts().is_apple_abi() {
                    return Err(CompilationError::AbiInconsistency(format!(
                        "12 byte stack slot for a vector: {}",
                        lir.display_node(idx)
                    )));
                }
                self.internal_int_def(idx, &mut reqs, None);
                reqs.store_widths.extend([8, 4]);
            } else {
                reqs.store_widths.push(dnode.ty.size());
            }
            self.build_operand_uses(idx, data, None)?;
        }
        self.build_internal_uses(idx, &reqs);
        Ok(reqs)
    }

    /// Place an argument that is passed partly in registers and partly on the stack.
    pub(super) fn build_putarg_split(
        &mut self,
        idx: NodeIdx,
    ) -> Result<NodeReqs<T::Reg>, CompilationError> {
        let lir = self.lir;
        let target = self.target;
        let Op::PutArgSplit {
            data,
            first_reg,
            num_regs,
        } = lir.node(idx).op
        else {
            unreachable!()
        };
        let regs = self.split_arg_regs(idx, first_reg, num_regs)?;
        let arg_mask = RegMask::from_regs(&regs);
        let dnode = lir.node(data);
        let mut reqs = NodeReqs::default();
        match &dnode.op {
            Op::FieldList { fields } => {
                // Compute the register pieces directly into their argument registers.
                for (i, &f) in fields.iter().enumerate() {
                    match regs.get(i) {
                        Some(&reg) => {
                            self.build_use(idx, f, Some(RegMask::from(reg)), 0)?;
                            self.placed_arg_regs.set(reg);
                        }
                        None => {
                            self.build_use(idx, f, None, 0)?;
                            reqs.store_widths.push(lir.node(f).ty.size());
                        }
                    }
                }
                if fields.len() < regs.len() {
                    return Err(self.shape_err(idx, "fewer pieces than argument registers"));
                }
            }
            Op::Blk { addr, .. } => {
                if num_regs == 1 {
                    // The address may be in the one argument register being loaded.
                    let candidates = target.all_int_regs() - arg_mask;
                    self.internal_int_def(idx, &mut reqs, Some(candidates));
                }
                self.build_addr_uses(idx, *addr, None)?;
            }
            Op::LclVar { .. } => (),
            _ => return Err(self.shape_err(idx, "unexpected split argument source")),
        }
        if !dnode.contained {
            return Err(self.shape_err(idx, "split argument source must be contained"));
        }
        self.build_internal_uses(idx, &reqs);
        self.build_fixed_defs(idx, &regs);
        Ok(reqs)
    }

    /// The `num_regs` consecutive argument registers, starting at `first_reg`, that the split
    /// argument `idx` is passed in.
    pub(super) fn split_arg_regs(
        &self,
        idx: NodeIdx,
        first_reg: T::Reg,
        num_regs: u8,
    ) -> Result<SmallVec<[T::Reg; 4]>, CompilationError> {
        let arg_regs = self.target.int_arg_regs();
        arg_regs
            .iter()
            .position(|r| *r == first_reg)
            .and_then(|i| arg_regs.get(i..i + usize::from(num_regs)))
            .filter(|regs| !regs.is_empty())
            .map(SmallVec::from_slice)
            .ok_or_else(|| {
                CompilationError::AbiInconsistency(format!(
                    "{num_regs} argument registers from {first_reg} do not exist: {}",
                    self.lir.display_node(idx)
                ))
            })
    }
}
