//! Build a method's register demand events.
//!
//! [RefBuilder] walks a [Lir] once, in execution order, asking the builder for each node's kind to
//! describe that node's register demands. Every builder follows the same pattern:
//!
//! 1. Reserve internal (scratch) registers, recording them in the node's [NodeReqs].
//! 2. Record uses of the node's (non-contained) operands.
//! 3. Record the internal registers' uses, which end their reservation.
//! 4. Record kills and then defs at the node's def location.
//!
//! Contained nodes generate no demands themselves: their user generates demands on their behalf.
//! Builders never inspect the target architecture directly, only [TargetT]'s hooks.

use crate::{
    CompilationError,
    lir::{Lir, NodeIdx, Op, Ty},
    refpos::{InternalReg, Location, NodeReqs, RefKind, RefPosition, RefPositions},
    regs::{RegClass, RegMask, RegT},
    target::TargetT,
};
use index_vec::{IndexVec, index_vec};

mod blk;
mod call;
mod cast;
mod indir;
mod putarg;
mod select;

pub use blk::{BlkShape, blk_internal_reqs, select_blk_kind};

pub struct RefBuilder<'a, T: TargetT> {
    target: &'a T,
    lir: &'a Lir<T::Reg>,
    refs: Vec<RefPosition<T::Reg>>,
    reqs: IndexVec<NodeIdx, NodeReqs<T::Reg>>,
    /// The use location of the node currently being built.
    cur_loc: Location,
    /// Argument registers that have been placed but not yet consumed by a call.
    placed_arg_regs: RegMask<T::Reg>,
    /// Can floating point values be live across a call?
    float_used: bool,
}

impl<'a, T: TargetT> RefBuilder<'a, T> {
    pub fn new(target: &'a T, lir: &'a Lir<T::Reg>) -> Self {
        Self {
            target,
            lir,
            refs: Vec::new(),
            reqs: index_vec![NodeReqs::default(); lir.nodes_len()],
            cur_loc: Location::use_loc(0),
            placed_arg_regs: RegMask::none(),
            float_used: lir.float_used(),
        }
    }

    pub fn build(mut self) -> Result<RefPositions<T::Reg>, CompilationError> {
        let lir = self.lir;
        lir.check_well_formed()?;
        for (pos, idx) in lir.iter().enumerate() {
            self.cur_loc = Location::use_loc(pos);
            let start = self.refs.len();
            let mut reqs = self.build_node(idx)?;
            for rp in &self.refs[start..] {
                match rp.kind {
                    RefKind::Use => reqs.src_count += 1,
                    RefKind::Def => reqs.dst_count += 1,
                    _ => (),
                }
            }
            self.reqs[idx] = reqs;
        }
        Ok(RefPositions::new(self.refs, self.reqs))
    }

    fn build_node(&mut self, idx: NodeIdx) -> Result<NodeReqs<T::Reg>, CompilationError> {
        let lir = self.lir;
        let node = lir.node(idx);
        if node.contained {
            return Ok(NodeReqs::default());
        }
        match &node.op {
            Op::Blk { .. } | Op::FieldList { .. } | Op::InitVal { .. } | Op::LongPair { .. } => {
                return Err(self.shape_err(idx, "node must be contained"));
            }
            Op::PutArgSplit { .. } | Op::Call(_) => (),
            _ if node.ty == Ty::Struct => {
                return Err(self.shape_err(idx, "struct-typed value must be contained"));
            }
            _ => (),
        }

        match &node.op {
            Op::Ind { .. } | Op::NullCheck { .. } => self.build_indir(idx),
            Op::StoreInd {
                write_barrier: true,
                ..
            } => self.build_gc_write_barrier(idx),
            Op::StoreInd { .. } => self.build_indir(idx),
            Op::StoreBlk(_) => self.build_block_store(idx),
            Op::Cast { .. } => self.build_cast(idx),
            Op::Select { .. } => self.build_select(idx),
            Op::PutArgReg { .. } => self.build_putarg_reg(idx),
            Op::PutArgStk { .. } => self.build_putarg_stk(idx),
            Op::PutArgSplit { .. } => self.build_putarg_split(idx),
            Op::Call(_) => self.build_call(idx),
            Op::LclVar { .. }
            | Op::LclAddr { .. }
            | Op::Const { .. }
            | Op::Lea { .. }
            | Op::BinOp { .. }
            | Op::Cmp { .. }
            | Op::Return { .. } => self.build_simple(idx),
            Op::Blk { .. } | Op::FieldList { .. } | Op::InitVal { .. } | Op::LongPair { .. } => {
                unreachable!()
            }
        }
    }

    /// Build a node that uses each of its operands in any register and, if it produces a value,
    /// defines it in any register.
    fn build_simple(&mut self, idx: NodeIdx) -> Result<NodeReqs<T::Reg>, CompilationError> {
        let lir = self.lir;
        let node = lir.node(idx);
        if let Op::Return { val: Some(val) } = node.op {
            // A returned value is consumed in the return register.
            let vnode = lir.node(val);
            let candidates = if vnode.contained {
                None
            } else if vnode.ty.reg_class() == RegClass::Float {
                Some(RegMask::from(self.target.float_ret_reg()))
            } else {
                Some(RegMask::from(self.target.int_ret_reg()))
            };
            self.build_operand_uses(idx, val, candidates)?;
        } else {
            for opidx in node.op.operands() {
                self.build_operand_uses(idx, opidx, None)?;
            }
        }
        if node.is_value() {
            self.build_def(idx, None, 0);
        }
        Ok(NodeReqs::default())
    }

    fn shape_err(&self, idx: NodeIdx, msg: &str) -> CompilationError {
        CompilationError::UnreachableShape(format!("{msg}: {}", self.lir.display_node(idx)))
    }

    /// The register class of, and candidate registers for, a value of type `ty`, optionally
    /// restricted to `candidates`.
    fn class_and_candidates(
        &self,
        ty: Ty,
        candidates: Option<RegMask<T::Reg>>,
    ) -> (RegClass, RegMask<T::Reg>) {
        match candidates {
            Some(m) => {
                let mut classes = m.iter().map(|r| r.class());
                let class = classes.next().expect("empty candidate set");
                assert!(
                    classes.all(|c| c == class),
                    "candidate set {m} mixes register classes"
                );
                (class, m)
            }
            None => (ty.reg_class(), self.target.regs_for_ty(ty)),
        }
    }

    /// Record that `user` reads register `multi_reg_idx` of the value `opidx`, optionally
    /// restricted to `candidates`.
    fn build_use(
        &mut self,
        user: NodeIdx,
        opidx: NodeIdx,
        candidates: Option<RegMask<T::Reg>>,
        multi_reg_idx: u8,
    ) -> Result<(), CompilationError> {
        let lir = self.lir;
        let opnode = lir.node(opidx);
        if opnode.contained || !opnode.is_value() {
            return Err(self.shape_err(
                user,
                &format!("{opidx} cannot be used as a register operand"),
            ));
        }
        let (class, candidates) = self.class_and_candidates(opnode.ty, candidates);
        self.refs.push(RefPosition {
            kind: RefKind::Use,
            node: user,
            value: Some(opidx),
            loc: self.cur_loc,
            class,
            candidates,
            multi_reg_idx,
            delay_free: false,
        });
        Ok(())
    }

    /// Record that `idx` writes register `multi_reg_idx` of its value, optionally restricted to
    /// `candidates`.
    fn build_def(&mut self, idx: NodeIdx, candidates: Option<RegMask<T::Reg>>, multi_reg_idx: u8) {
        let (class, candidates) = self.class_and_candidates(self.lir.node(idx).ty, candidates);
        self.refs.push(RefPosition {
            kind: RefKind::Def,
            node: idx,
            value: Some(idx),
            loc: self.cur_loc.def_loc(),
            class,
            candidates,
            multi_reg_idx,
            delay_free: false,
        });
    }

    /// Record that `idx` writes one register of its value to each of `regs`, in order.
    ///
    /// # Panics
    ///
    /// If any register appears more than once in `regs`.
    fn build_fixed_defs(&mut self, idx: NodeIdx, regs: &[T::Reg]) {
        let mut seen = RegMask::none();
        for (i, reg) in regs.iter().enumerate() {
            assert!(!seen.is_set(*reg), "{reg} is defined twice by {idx}");
            seen.set(*reg);
            self.build_def(idx, Some(RegMask::from(*reg)), u8::try_from(i).unwrap());
        }
    }

    /// Record that `idx` kills `kills`, one event per register class.
    fn build_kills(&mut self, idx: NodeIdx, kills: RegMask<T::Reg>) {
        for class in [RegClass::Int, RegClass::Float] {
            let candidates = kills.of_class(class);
            if !candidates.is_empty() {
                self.refs.push(RefPosition {
                    kind: RefKind::Kill,
                    node: idx,
                    value: None,
                    loc: self.cur_loc.def_loc(),
                    class,
                    candidates,
                    multi_reg_idx: 0,
                    delay_free: false,
                });
            }
        }
    }

    /// Record that `reg` is busy at `idx` without holding any value.
    fn build_fixed_reg(&mut self, idx: NodeIdx, reg: T::Reg) {
        self.refs.push(RefPosition {
            kind: RefKind::FixedReg,
            node: idx,
            value: None,
            loc: self.cur_loc,
            class: reg.class(),
            candidates: RegMask::from(reg),
            multi_reg_idx: 0,
            delay_free: false,
        });
    }

    fn build_internal_def(
        &mut self,
        idx: NodeIdx,
        reqs: &mut NodeReqs<T::Reg>,
        class: RegClass,
        candidates: RegMask<T::Reg>,
    ) {
        assert!(
            !candidates.is_empty(),
            "no candidates for {class} internal register of {idx}"
        );
        reqs.internals.push(InternalReg { class, candidates });
        self.refs.push(RefPosition {
            kind: RefKind::InternalDef,
            node: idx,
            value: None,
            loc: self.cur_loc,
            class,
            candidates,
            multi_reg_idx: 0,
            delay_free: false,
        });
    }

    /// Reserve an integer internal register for `idx`. By default this avoids argument registers
    /// that have already been placed, so that a scratch register never clobbers an outgoing
    /// argument.
    fn internal_int_def(
        &mut self,
        idx: NodeIdx,
        reqs: &mut NodeReqs<T::Reg>,
        candidates: Option<RegMask<T::Reg>>,
    ) {
        let candidates = candidates.unwrap_or_else(|| {
            let all = self.target.all_int_regs();
            let free = all - self.placed_arg_regs;
            if free.is_empty() { all } else { free }
        });
        self.build_internal_def(idx, reqs, RegClass::Int, candidates);
    }

    /// Reserve a floating point internal register for `idx`.
    fn internal_float_def(
        &mut self,
        idx: NodeIdx,
        reqs: &mut NodeReqs<T::Reg>,
        candidates: Option<RegMask<T::Reg>>,
    ) {
        let candidates = candidates.unwrap_or_else(|| self.target.internal_float_regs());
        self.build_internal_def(idx, reqs, RegClass::Float, candidates);
    }

    /// Record the end of each of `idx`'s internal register reservations.
    fn build_internal_uses(&mut self, idx: NodeIdx, reqs: &NodeReqs<T::Reg>) {
        for ireg in &reqs.internals {
            self.refs.push(RefPosition {
                kind: RefKind::InternalUse,
                node: idx,
                value: None,
                loc: self.cur_loc,
                class: ireg.class,
                candidates: ireg.candidates,
                multi_reg_idx: 0,
                delay_free: reqs.delay_free,
            });
        }
    }

    /// Record the uses `user` makes of operand `opidx`, which may be contained. Returns how many
    /// uses were recorded.
    fn build_operand_uses(
        &mut self,
        user: NodeIdx,
        opidx: NodeIdx,
        candidates: Option<RegMask<T::Reg>>,
    ) -> Result<usize, CompilationError> {
        let lir = self.lir;
        let opnode = lir.node(opidx);
        if !opnode.contained {
            self.build_use(user, opidx, candidates, 0)?;
            return Ok(1);
        }
        match opnode.op {
            Op::Ind { addr, .. } | Op::Blk { addr, .. } => {
                self.build_addr_uses(user, addr, candidates)
            }
            Op::Lea { .. } => self.build_addr_uses(user, opidx, candidates),
            Op::LongPair { lo, hi } => {
                self.build_use(user, lo, None, 0)?;
                self.build_use(user, hi, None, 0)?;
                Ok(2)
            }
            Op::InitVal { val } => self.build_operand_uses(user, val, candidates),
            _ => Ok(0),
        }
    }

    /// Record the uses `user` makes of the address `addr`, which may be a contained address
    /// mode. Returns how many uses were recorded.
    fn build_addr_uses(
        &mut self,
        user: NodeIdx,
        addr: NodeIdx,
        candidates: Option<RegMask<T::Reg>>,
    ) -> Result<usize, CompilationError> {
        let lir = self.lir;
        let anode = lir.node(addr);
        if !anode.contained {
            self.build_use(user, addr, candidates, 0)?;
            return Ok(1);
        }
        let mut n = 0;
        if let Op::Lea { base, index, .. } = anode.op {
            for x in base.into_iter().chain(index) {
                if !lir.node(x).contained {
                    self.build_use(user, x, candidates, 0)?;
                    n += 1;
                }
            }
        }
        Ok(n)
    }
}
