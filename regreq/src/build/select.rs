//! Conditional selects.

use super::RefBuilder;
use crate::{
    CompilationError,
    lir::{NodeIdx, Op},
    refpos::NodeReqs,
    target::TargetT,
};

impl<T: TargetT> RefBuilder<'_, T> {
    /// A conditional select, which maps to a single `csel`-like instruction and so needs no
    /// scratch registers.
    pub(super) fn build_select(
        &mut self,
        idx: NodeIdx,
    ) -> Result<NodeReqs<T::Reg>, CompilationError> {
        let Op::Select { cond, op1, op2 } = self.lir.node(idx).op else {
            unreachable!()
        };
        if let Some(cond) = cond {
            self.build_operand_uses(idx, cond, None)?;
        }
        self.build_operand_uses(idx, op1, None)?;
        self.build_operand_uses(idx, op2, None)?;
        self.build_def(idx, None, 0);
        Ok(NodeReqs::default())
    }
}
