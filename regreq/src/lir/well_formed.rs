//! Check that a [Lir] is in the shape the builders expect.
//!
//! The builders rely on each of the following properties, all of which earlier phases are meant
//! to guarantee:
//!
//! 1. Every operand is defined before (in execution order) its user.
//! 2. No value is used more than once.
//! 3. Only nodes that produce a value are used, with the exception of calls, which refer to their
//!    stack argument placements.
//! 4. Every contained node has a user.
//! 5. A value without a user is marked `unused`, and a value with a user is not.
//! 6. Contained nodes are never marked `unused`.

use super::{Lir, NodeIdx, Op};
use crate::{CompilationError, regs::RegT};
use vob::Vob;

impl<Reg: RegT> Lir<Reg> {
    pub fn check_well_formed(&self) -> Result<(), CompilationError> {
        let mut defined = Vob::from_elem(false, self.nodes_len());
        let mut used = Vob::from_elem(false, self.nodes_len());
        for idx in self.iter() {
            let node = self.node(idx);
            for opidx in node.op.operands() {
                if !defined[usize::from(opidx)] {
                    return Err(
                        self.shape_err(idx, &format!("{opidx} is used before it is defined"))
                    );
                }
                if used[usize::from(opidx)] {
                    return Err(self.shape_err(idx, &format!("{opidx} is used more than once")));
                }
                let op = self.node(opidx);
                if !op.is_value()
                    && !(matches!(node.op, Op::Call(_)) && matches!(op.op, Op::PutArgStk { .. }))
                {
                    return Err(self.shape_err(idx, &format!("{opidx} does not produce a value")));
                }
                used.set(usize::from(opidx), true);
            }
            defined.set(usize::from(idx), true);
        }

        for idx in self.iter() {
            let node = self.node(idx);
            let is_used = used[usize::from(idx)];
            if node.contained {
                if !is_used {
                    return Err(self.shape_err(idx, "contained node has no user"));
                }
                if node.unused {
                    return Err(self.shape_err(idx, "contained node is marked unused"));
                }
            } else if node.is_value() {
                if !is_used && !node.unused {
                    return Err(self.shape_err(idx, "value has no user but is not marked unused"));
                }
                if is_used && node.unused {
                    return Err(self.shape_err(idx, "value has a user but is marked unused"));
                }
            }
        }
        Ok(())
    }

    fn shape_err(&self, idx: NodeIdx, msg: &str) -> CompilationError {
        CompilationError::UnreachableShape(format!("{msg}: {}", self.display_node(idx)))
    }
}
