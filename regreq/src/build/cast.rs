//! Numeric conversions.

use super::RefBuilder;
use crate::{
    CompilationError,
    lir::{NodeIdx, Op},
    refpos::NodeReqs,
    target::TargetT,
};

impl<T: TargetT> RefBuilder<'_, T> {
    pub(super) fn build_cast(
        &mut self,
        idx: NodeIdx,
    ) -> Result<NodeReqs<T::Reg>, CompilationError> {
        let lir = self.lir;
        let node = lir.node(idx);
        let Op::Cast { src } = node.op else {
            unreachable!()
        };
        let mut reqs = NodeReqs::default();
        if self.target.cast_needs_float_temp(lir.node(src).ty, node.ty) {
            // The conversion is staged through a floating point register which is read after the
            // result is written.
            let candidates = self.target.all_float_regs();
            self.internal_float_def(idx, &mut reqs, Some(candidates));
            reqs.delay_free = true;
        }
        self.build_operand_uses(idx, src, None)?;
        self.build_internal_uses(idx, &reqs);
        self.build_def(idx, None, 0);
        Ok(reqs)
    }
}
