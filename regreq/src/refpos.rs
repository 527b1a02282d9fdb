//! Register demand events ("ref positions") and the per-node summaries the builders produce.

use crate::{
    lir::NodeIdx,
    regs::{RegClass, RegMask, RegT},
};
use index_vec::IndexVec;
use smallvec::SmallVec;
use std::fmt::{self, Display, Formatter};

/// A point in a method's execution order. The `n`th node (counting from zero) in execution order
/// reads its operands and internal registers at `2n` and writes its results and kills registers
/// at `2n + 1`.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct Location(u32);

impl Location {
    /// The location at which the node at `pos` in execution order reads its operands.
    pub fn use_loc(pos: usize) -> Self {
        Self(u32::try_from(pos * 2).unwrap())
    }

    /// The location at which this node writes its results.
    pub fn def_loc(&self) -> Self {
        Self(self.0 | 1)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RefKind {
    /// A value is read.
    Use,
    /// A value is written.
    Def,
    /// A scratch register is reserved for the duration of a node.
    InternalDef,
    /// The end of a scratch register's reservation.
    InternalUse,
    /// The contents of the candidate registers do not survive the node.
    Kill,
    /// A specific register is busy at this location, though no value is associated with it.
    FixedReg,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RefPosition<Reg> {
    pub kind: RefKind,
    /// The node at which this event occurs.
    pub node: NodeIdx,
    /// For uses and defs, the value being read or written.
    pub value: Option<NodeIdx>,
    pub loc: Location,
    pub class: RegClass,
    pub candidates: RegMask<Reg>,
    /// For values held in multiple registers, which of those registers this event refers to.
    pub multi_reg_idx: u8,
    /// Must this register remain unallocated until after the node's results are written?
    pub delay_free: bool,
}

impl<Reg: RegT> RefPosition<Reg> {
    /// The last location at which the register this event refers to is busy.
    pub fn busy_until(&self) -> Location {
        if self.delay_free {
            self.loc.def_loc().next()
        } else {
            self.loc
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self.kind, RefKind::InternalDef | RefKind::InternalUse)
    }
}

impl<Reg: RegT> Display for RefPosition<Reg> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            RefKind::Use => "use",
            RefKind::Def => "def",
            RefKind::InternalDef => "idef",
            RefKind::InternalUse => "iuse",
            RefKind::Kill => "kill",
            RefKind::FixedReg => "fixed",
        };
        write!(f, "{} {} {kind}", self.loc, self.node)?;
        if let Some(v) = self.value {
            write!(f, " {v}")?;
            if self.multi_reg_idx != 0 {
                write!(f, ".{}", self.multi_reg_idx)?;
            }
        }
        write!(f, " {} {}", self.class, self.candidates)?;
        if self.delay_free {
            write!(f, " delay")?;
        }
        Ok(())
    }
}

/// A scratch register reservation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InternalReg<Reg> {
    pub class: RegClass,
    pub candidates: RegMask<Reg>,
}

/// A summary of the register requirements of a single node.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeReqs<Reg> {
    /// How many registers the node reads.
    pub src_count: usize,
    /// How many registers the node writes.
    pub dst_count: usize,
    /// The node's scratch registers, in the order they were reserved.
    pub internals: SmallVec<[InternalReg<Reg>; 4]>,
    /// Must the scratch registers stay reserved until after the node's results are written?
    pub delay_free: bool,
    /// For nodes that store a value to the stack, the width of each store instruction needed.
    pub store_widths: SmallVec<[u32; 2]>,
}

impl<Reg> Default for NodeReqs<Reg> {
    fn default() -> Self {
        Self {
            src_count: 0,
            dst_count: 0,
            internals: SmallVec::new(),
            delay_free: false,
            store_widths: SmallVec::new(),
        }
    }
}

impl<Reg: RegT> NodeReqs<Reg> {
    pub fn internal_count(&self, class: RegClass) -> usize {
        self.internals.iter().filter(|x| x.class == class).count()
    }
}

/// The demand events of a method, in the order the allocator must process them.
#[derive(Debug)]
pub struct RefPositions<Reg> {
    refs: Vec<RefPosition<Reg>>,
    reqs: IndexVec<NodeIdx, NodeReqs<Reg>>,
}

impl<Reg: RegT> RefPositions<Reg> {
    pub(crate) fn new(refs: Vec<RefPosition<Reg>>, reqs: IndexVec<NodeIdx, NodeReqs<Reg>>) -> Self {
        Self { refs, reqs }
    }

    pub fn iter(&self) -> impl Iterator<Item = &RefPosition<Reg>> {
        self.refs.iter()
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// The events that occur at node `idx`.
    pub fn for_node(&self, idx: NodeIdx) -> impl Iterator<Item = &RefPosition<Reg>> {
        self.refs.iter().filter(move |x| x.node == idx)
    }

    /// The register requirements of node `idx`.
    pub fn reqs(&self, idx: NodeIdx) -> &NodeReqs<Reg> {
        &self.reqs[idx]
    }

    /// Check that every use of a value (or, for multi-register values, of each of its registers)
    /// is preceded by exactly one definition of it.
    pub fn check_defs_precede_uses(&self) -> Result<(), String> {
        let mut defs = Vec::new();
        for rp in &self.refs {
            let Some(v) = rp.value else { continue };
            let key = (v, rp.multi_reg_idx);
            match rp.kind {
                RefKind::Def => {
                    if defs.contains(&key) {
                        return Err(format!("{v}.{} is defined more than once", rp.multi_reg_idx));
                    }
                    defs.push(key);
                }
                RefKind::Use => {
                    if !defs.contains(&key) {
                        return Err(format!("{rp}: use without a prior definition"));
                    }
                }
                _ => (),
            }
        }
        Ok(())
    }
}

impl<Reg: RegT> Display for RefPositions<Reg> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for rp in &self.refs {
            writeln!(f, "{rp}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::target::arm64::Reg;

    fn rp(kind: RefKind, node: usize, value: Option<usize>, loc: usize) -> RefPosition<Reg> {
        RefPosition {
            kind,
            node: NodeIdx::from_usize(node),
            value: value.map(NodeIdx::from_usize),
            loc: Location::use_loc(loc),
            class: RegClass::Int,
            candidates: RegMask::from(Reg::X0),
            multi_reg_idx: 0,
            delay_free: false,
        }
    }

    #[test]
    fn locations() {
        let l = Location::use_loc(3);
        assert_eq!(l.raw(), 6);
        assert_eq!(l.def_loc().raw(), 7);
        assert_eq!(l.def_loc().def_loc(), l.def_loc());
        assert!(l < l.def_loc());
    }

    #[test]
    fn delay_free_outlives_def() {
        let mut r = rp(RefKind::InternalUse, 2, None, 2);
        assert_eq!(r.busy_until(), r.loc);
        r.delay_free = true;
        assert!(r.busy_until() > r.loc.def_loc());
    }

    #[test]
    fn display() {
        let mut r = rp(RefKind::Def, 1, Some(1), 1);
        r.loc = r.loc.def_loc();
        r.multi_reg_idx = 1;
        assert_eq!(r.to_string(), "@3 %1 def %1.1 int {x0}");
        let mut r = rp(RefKind::InternalUse, 4, None, 4);
        r.delay_free = true;
        assert_eq!(r.to_string(), "@8 %4 iuse int {x0} delay");
    }

    #[test]
    fn defs_precede_uses() {
        let mut refs = vec![
            rp(RefKind::Def, 0, Some(0), 0),
            rp(RefKind::Use, 1, Some(0), 1),
        ];
        let reqs = IndexVec::from_vec(vec![NodeReqs::default(), NodeReqs::default()]);
        assert!(RefPositions::new(refs.clone(), reqs.clone()).check_defs_precede_uses().is_ok());
        refs.swap(0, 1);
        assert!(RefPositions::new(refs.clone(), reqs.clone()).check_defs_precede_uses().is_err());
        refs.push(rp(RefKind::Def, 0, Some(0), 2));
        refs.push(rp(RefKind::Def, 0, Some(0), 3));
        assert!(RefPositions::new(refs, reqs).check_defs_precede_uses().is_err());
    }
}
