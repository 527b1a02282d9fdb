//! Calls and register argument placement.

use super::RefBuilder;
use crate::{
    CompilationError,
    kill::{call_ret_regs, kill_set_for_call},
    lir::{Call, CallKind, NodeIdx, Op, Ty},
    refpos::NodeReqs,
    regs::RegMask,
    target::TargetT,
};

impl<T: TargetT> RefBuilder<'_, T> {
    /// Place an argument in its register: the argument is computed directly into that register,
    /// which is then busy until the call consumes it.
    pub(super) fn build_putarg_reg(
        &mut self,
        idx: NodeIdx,
    ) -> Result<NodeReqs<T::Reg>, CompilationError> {
        let Op::PutArgReg { op, reg } = self.lir.node(idx).op else {
            unreachable!()
        };
        let m = RegMask::from(reg);
        self.build_operand_uses(idx, op, Some(m))?;
        self.build_def(idx, Some(m), 0);
        self.placed_arg_regs.set(reg);
        Ok(NodeReqs::default())
    }

    pub(super) fn build_call(
        &mut self,
        idx: NodeIdx,
    ) -> Result<NodeReqs<T::Reg>, CompilationError> {
        let lir = self.lir;
        let target = self.target;
        let node = lir.node(idx);
        let Op::Call(call) = &node.op else {
            unreachable!()
        };
        if call.kind == CallKind::Indirect && call.ctrl.is_none() {
            return Err(self.shape_err(idx, "indirect call has no target"));
        }
        if node.ty == Ty::Struct && call.multi_ret.is_none() {
            return Err(self.shape_err(idx, "struct-typed call has no return registers"));
        }
        if let Some(regs) = &call.multi_ret
            && regs.is_empty()
            && node.is_value()
        {
            return Err(CompilationError::AbiInconsistency(format!(
                "multi-register return has no registers: {}",
                lir.display_node(idx)
            )));
        }

        let mut reqs = NodeReqs::default();
        let null_check_temp = call.needs_null_check && target.call_null_check_needs_temp();
        let mut ctrl_candidates = None;
        if call.ctrl.is_some() {
            if call.fast_tail_call {
                // The target must survive the epilog, which restores the callee-saved registers
                // and the link register.
                let mut m = target.all_int_regs() & target.int_callee_trash();
                m.unset(target.lr());
                if lir.info().needs_gs_cookie {
                    m = m - target.gs_cookie_tmps();
                }
                assert!(!m.is_empty());
                ctrl_candidates = Some(m);
            }
        } else if call.relative_indir && call.fast_tail_call {
            // The target address is loaded from its indirection cell after the epilog.
            let mut m = target.all_int_regs() & target.int_callee_trash();
            if null_check_temp {
                // The null check's temporary gets the link register.
                m = m.without(target.lr());
            }
            self.internal_int_def(idx, &mut reqs, Some(m));
        } else if target.call_target_needs_temp() {
            self.internal_int_def(idx, &mut reqs, None);
        }
        if null_check_temp {
            let candidates = call.fast_tail_call.then(|| RegMask::from(target.lr()));
            self.internal_int_def(idx, &mut reqs, candidates);
        }

        let ret_regs = call_ret_regs(target, call, node.ty);
        self.build_call_arg_uses(idx, call)?;
        if let Some(ctrl) = call.ctrl {
            if call.tls_get_addr
                && call.args.is_empty()
                && let Some(([r0, r1], tgt)) = target.tls_get_addr_regs()
            {
                // The TLS access sequence is patched by the linker and uses fixed registers.
                self.build_fixed_reg(idx, r0);
                self.build_fixed_reg(idx, r1);
                ctrl_candidates = Some(RegMask::from(tgt));
            }
            self.build_operand_uses(idx, ctrl, ctrl_candidates)?;
        }
        self.build_internal_uses(idx, &reqs);
        self.build_kills(idx, kill_set_for_call(target, self.float_used, call, node.ty));
        self.build_fixed_defs(idx, &ret_regs);

        // The call has consumed every placed argument.
        self.placed_arg_regs = RegMask::none();
        Ok(reqs)
    }

    /// Record the uses of `call`'s arguments in the registers they were placed in.
    fn build_call_arg_uses(
        &mut self,
        idx: NodeIdx,
        call: &Call<T::Reg>,
    ) -> Result<(), CompilationError> {
        let lir = self.lir;
        for &arg in &call.args {
            let anode = lir.node(arg);
            match &anode.op {
                Op::PutArgReg { reg, .. } => {
                    self.build_use(idx, arg, Some(RegMask::from(*reg)), 0)?;
                }
                Op::PutArgSplit {
                    first_reg,
                    num_regs,
                    ..
                } => {
                    for (i, reg) in self
                        .split_arg_regs(arg, *first_reg, *num_regs)?
                        .into_iter()
                        .enumerate()
                    {
                        let i = u8::try_from(i).unwrap();
                        self.build_use(idx, arg, Some(RegMask::from(reg)), i)?;
                    }
                }
                Op::FieldList { fields } if anode.contained => {
                    for &f in fields {
                        let Op::PutArgReg { reg, .. } = lir.node(f).op else {
                            return Err(self.shape_err(f, "call argument has not been placed"));
                        };
                        self.build_use(idx, f, Some(RegMask::from(reg)), 0)?;
                    }
                }
                // Stack arguments have already been stored.
                Op::PutArgStk { .. } => (),
                _ => return Err(self.shape_err(arg, "call argument has not been placed")),
            }
        }
        Ok(())
    }
}
