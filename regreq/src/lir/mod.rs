//! The low-level IR (LIR) consumed by the builders.
//!
//! A [Lir] is an arena of [Node]s together with an execution order over (a subset of) them.
//! Instruction selection has already run: addressing modes have been folded into their users and
//! marked as `contained`, multi-register shapes are explicit, and outgoing arguments have been
//! placed. Nodes refer to their operands by [NodeIdx].
//!
//! The textual form of each node is `[%<idx>: <ty> = ]<op> <operands> [<attrs>]`, and is
//! what the test parser in [parser] accepts.

use crate::regs::{RegClass, RegT};
use index_vec::IndexVec;
use smallvec::SmallVec;
use std::fmt::{self, Display, Formatter};
use strum::EnumString;

#[cfg(test)]
pub(crate) mod parser;
mod range;
mod well_formed;

use range::Range;

index_vec::define_index_type! {
    pub struct NodeIdx = u32;
    DISPLAY_FORMAT = "%{}";
}

#[derive(Clone, Copy, Debug, EnumString, Eq, Hash, PartialEq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Ty {
    Void,
    I8,
    I16,
    I32,
    I64,
    /// A GC reference.
    Ref,
    /// A pointer that may point into the GC heap.
    ByRef,
    F32,
    F64,
    Simd8,
    Simd12,
    Simd16,
    Struct,
}

impl Ty {
    /// The size of a value of this type in bytes. Structs have no intrinsic size.
    pub fn size(&self) -> u32 {
        match self {
            Ty::Void | Ty::Struct => 0,
            Ty::I8 => 1,
            Ty::I16 => 2,
            Ty::I32 | Ty::F32 => 4,
            Ty::I64 | Ty::Ref | Ty::ByRef | Ty::F64 | Ty::Simd8 => 8,
            Ty::Simd12 => 12,
            Ty::Simd16 => 16,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Ty::F32 | Ty::F64)
    }

    pub fn is_simd(&self) -> bool {
        matches!(self, Ty::Simd8 | Ty::Simd12 | Ty::Simd16)
    }

    /// The register class a value of this type lives in.
    pub fn reg_class(&self) -> RegClass {
        if self.is_float() || self.is_simd() {
            RegClass::Float
        } else {
            RegClass::Int
        }
    }
}

#[derive(Clone, Copy, Debug, EnumString, Eq, PartialEq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
}

/// The runtime helpers whose calls the builders treat specially.
#[derive(Clone, Copy, Debug, EnumString, Eq, PartialEq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Helper {
    AssignRef,
    CheckedAssignRef,
    AssignByRef,
    #[strum(serialize = "memcpy")]
    MemCpy,
    #[strum(serialize = "memset")]
    MemSet,
    #[strum(serialize = "init_pinvoke_frame")]
    InitPInvokeFrame,
    ValidateIndirectCall,
    Other,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CallKind {
    /// A call to a user function, optionally through a control expression.
    User,
    /// A call to a runtime helper.
    Helper(Helper),
    /// A call through an address computed in the LIR.
    Indirect,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Call<Reg> {
    pub kind: CallKind,
    /// The node computing the call target. Mandatory for [CallKind::Indirect] calls.
    pub ctrl: Option<NodeIdx>,
    /// The placed arguments: [Op::PutArgReg], [Op::PutArgSplit], [Op::PutArgStk] or field lists
    /// of register placements.
    pub args: SmallVec<[NodeIdx; 4]>,
    /// If the return value is returned in multiple registers, the ABI's layout of them.
    pub multi_ret: Option<SmallVec<[Reg; 4]>>,
    pub fast_tail_call: bool,
    /// Must `this` be explicitly null checked before the call?
    pub needs_null_check: bool,
    /// Is the target reached through a ready-to-run or virtual stub relative indirection cell?
    pub relative_indir: bool,
    /// Is this a call of the thread-local-storage address helper?
    pub tls_get_addr: bool,
}

impl<Reg> Call<Reg> {
    pub fn new(kind: CallKind) -> Self {
        Self {
            kind,
            ctrl: None,
            args: SmallVec::new(),
            multi_ret: None,
            fast_tail_call: false,
            needs_null_check: false,
            relative_indir: false,
            tls_get_addr: false,
        }
    }

    pub fn helper(&self) -> Option<Helper> {
        match self.kind {
            CallKind::Helper(h) => Some(h),
            _ => None,
        }
    }
}

/// The ways a block store can be performed.
#[derive(Clone, Copy, Debug, EnumString, Eq, PartialEq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum BlkOpKind {
    /// A straight-line sequence of loads and stores.
    Unroll,
    /// Load the entire source into registers before storing any of it, so that the source and
    /// destination may overlap.
    #[strum(serialize = "memmove")]
    UnrollMemmove,
    /// A copy of a block containing GC references, via the by-reference write barrier helper.
    #[strum(serialize = "cpobj")]
    CpObjUnroll,
    /// A loop zeroing the destination.
    Loop,
    /// A call to the memcpy/memset helper.
    Helper,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoreBlk {
    pub addr: NodeIdx,
    /// For a copy, the source (a contained indirection or a local); for an init, the fill
    /// value (possibly wrapped in a contained [Op::InitVal]).
    pub data: NodeIdx,
    pub size: u32,
    /// If the size is only known at run-time, the node computing it.
    pub size_node: Option<NodeIdx>,
    pub init: bool,
    /// May the destination contain GC references?
    pub gc: bool,
    /// May the source and destination overlap?
    pub overlap: bool,
    /// The strategy chosen by lowering. If `None`, one is chosen by
    /// [crate::build::select_blk_kind].
    pub kind: Option<BlkOpKind>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Op<Reg> {
    LclVar {
        lcl: u32,
    },
    LclAddr {
        lcl: u32,
    },
    Const {
        val: i64,
    },
    /// An address mode `base + index * scale + offset`.
    Lea {
        base: Option<NodeIdx>,
        index: Option<NodeIdx>,
        scale: u8,
        offset: i32,
    },
    /// A 64-bit value held in two 32-bit registers.
    LongPair {
        lo: NodeIdx,
        hi: NodeIdx,
    },
    BinOp {
        binop: BinOp,
        lhs: NodeIdx,
        rhs: NodeIdx,
    },
    /// Compare two values, setting the condition flags.
    Cmp {
        lhs: NodeIdx,
        rhs: NodeIdx,
    },
    Ind {
        addr: NodeIdx,
        unaligned: bool,
    },
    StoreInd {
        addr: NodeIdx,
        data: NodeIdx,
        unaligned: bool,
        /// Does this store a GC reference into the heap (and thus need a write barrier)?
        write_barrier: bool,
    },
    NullCheck {
        addr: NodeIdx,
    },
    /// A struct-typed indirection. Only valid as a contained operand.
    Blk {
        addr: NodeIdx,
        size: u32,
    },
    StoreBlk(StoreBlk),
    /// The fill value of a block init. Only valid as a contained operand.
    InitVal {
        val: NodeIdx,
    },
    /// Convert `src` to this node's type.
    Cast {
        src: NodeIdx,
    },
    /// `cond ? op1 : op2`. If `cond` is `None`, the condition is in the flags.
    Select {
        cond: Option<NodeIdx>,
        op1: NodeIdx,
        op2: NodeIdx,
    },
    /// The pieces of a struct, in order. Only valid as a contained operand.
    FieldList {
        fields: SmallVec<[NodeIdx; 4]>,
    },
    PutArgReg {
        op: NodeIdx,
        reg: Reg,
    },
    PutArgStk {
        data: NodeIdx,
        /// The number of bytes this argument occupies in the outgoing argument area.
        stack_byte_size: u32,
    },
    /// An argument passed partly in `num_regs` consecutive registers starting at `first_reg`
    /// and partly on the stack.
    PutArgSplit {
        data: NodeIdx,
        first_reg: Reg,
        num_regs: u8,
    },
    Call(Box<Call<Reg>>),
    Return {
        val: Option<NodeIdx>,
    },
}

impl<Reg: RegT> Op<Reg> {
    /// The operands of this operation, in evaluation order.
    pub fn operands(&self) -> SmallVec<[NodeIdx; 4]> {
        let mut ops = SmallVec::new();
        match self {
            Op::LclVar { .. } | Op::LclAddr { .. } | Op::Const { .. } => (),
            Op::Lea { base, index, .. } => ops.extend(base.iter().chain(index.iter()).copied()),
            Op::LongPair { lo: a, hi: b }
            | Op::BinOp { lhs: a, rhs: b, .. }
            | Op::Cmp { lhs: a, rhs: b }
            | Op::StoreInd {
                addr: a, data: b, ..
            } => {
                ops.push(*a);
                ops.push(*b);
            }
            Op::Ind { addr: a, .. }
            | Op::NullCheck { addr: a }
            | Op::Blk { addr: a, .. }
            | Op::InitVal { val: a }
            | Op::Cast { src: a }
            | Op::PutArgReg { op: a, .. }
            | Op::PutArgStk { data: a, .. }
            | Op::PutArgSplit { data: a, .. } => ops.push(*a),
            Op::StoreBlk(sb) => {
                ops.push(sb.addr);
                ops.push(sb.data);
                ops.extend(sb.size_node);
            }
            Op::Select { cond, op1, op2 } => {
                ops.extend(*cond);
                ops.push(*op1);
                ops.push(*op2);
            }
            Op::FieldList { fields } => ops.extend(fields.iter().copied()),
            Op::Call(call) => {
                ops.extend(call.args.iter().copied());
                ops.extend(call.ctrl);
            }
            Op::Return { val } => ops.extend(*val),
        }
        ops
    }

    /// The name of this operation in the textual LIR format.
    pub fn name(&self) -> &'static str {
        match self {
            Op::LclVar { .. } => "lclvar",
            Op::LclAddr { .. } => "lcladdr",
            Op::Const { .. } => "const",
            Op::Lea { .. } => "lea",
            Op::LongPair { .. } => "long",
            Op::BinOp { binop, .. } => match binop {
                BinOp::Add => "add",
                BinOp::Sub => "sub",
                BinOp::Mul => "mul",
                BinOp::And => "and",
                BinOp::Or => "or",
                BinOp::Xor => "xor",
            },
            Op::Cmp { .. } => "cmp",
            Op::Ind { .. } => "ind",
            Op::StoreInd { .. } => "storeind",
            Op::NullCheck { .. } => "nullcheck",
            Op::Blk { .. } => "blk",
            Op::StoreBlk(_) => "storeblk",
            Op::InitVal { .. } => "initval",
            Op::Cast { .. } => "cast",
            Op::Select { cond: Some(_), .. } => "select",
            Op::Select { cond: None, .. } => "selectcc",
            Op::FieldList { .. } => "fieldlist",
            Op::PutArgReg { .. } => "putarg_reg",
            Op::PutArgStk { .. } => "putarg_stk",
            Op::PutArgSplit { .. } => "putarg_split",
            Op::Call(_) => "call",
            Op::Return { .. } => "ret",
        }
    }

    /// The attributes of this operation (excluding those common to all nodes) in the textual
    /// LIR format.
    fn attrs(&self) -> Vec<String> {
        let mut attrs = Vec::new();
        match self {
            Op::Lea {
                base,
                index,
                scale,
                offset,
            } => {
                if let Some(x) = base {
                    attrs.push(format!("base={x}"));
                }
                if let Some(x) = index {
                    attrs.push(format!("index={x}"));
                }
                if *scale != 1 {
                    attrs.push(format!("scale={scale}"));
                }
                if *offset != 0 {
                    attrs.push(format!("offset={offset}"));
                }
            }
            Op::Ind { unaligned, .. } => {
                if *unaligned {
                    attrs.push("unaligned".to_owned());
                }
            }
            Op::StoreInd {
                unaligned,
                write_barrier,
                ..
            } => {
                if *unaligned {
                    attrs.push("unaligned".to_owned());
                }
                if *write_barrier {
                    attrs.push("wb".to_owned());
                }
            }
            Op::Blk { size, .. } => attrs.push(format!("size={size}")),
            Op::StoreBlk(sb) => {
                attrs.push(format!("size={}", sb.size));
                if let Some(x) = sb.size_node {
                    attrs.push(format!("sizenode={x}"));
                }
                if sb.init {
                    attrs.push("init".to_owned());
                }
                if sb.gc {
                    attrs.push("gc".to_owned());
                }
                if sb.overlap {
                    attrs.push("overlap".to_owned());
                }
                if let Some(k) = sb.kind {
                    attrs.push(format!("kind={k}"));
                }
            }
            Op::PutArgReg { reg, .. } => attrs.push(format!("reg={reg}")),
            Op::PutArgStk {
                stack_byte_size, ..
            } => attrs.push(format!("size={stack_byte_size}")),
            Op::PutArgSplit {
                first_reg,
                num_regs,
                ..
            } => {
                attrs.push(format!("reg={first_reg}"));
                attrs.push(format!("regs={num_regs}"));
            }
            Op::Call(call) => {
                match call.kind {
                    CallKind::User => (),
                    CallKind::Helper(h) => attrs.push(format!("helper={h}")),
                    CallKind::Indirect => attrs.push("indirect".to_owned()),
                }
                if let Some(x) = call.ctrl {
                    attrs.push(format!("target={x}"));
                }
                for (flag, name) in [
                    (call.fast_tail_call, "tail"),
                    (call.needs_null_check, "nullcheck"),
                    (call.relative_indir, "relindir"),
                    (call.tls_get_addr, "tls"),
                ] {
                    if flag {
                        attrs.push(name.to_owned());
                    }
                }
                if let Some(regs) = &call.multi_ret {
                    if regs.is_empty() {
                        attrs.push("multireg".to_owned());
                    }
                    attrs.extend(regs.iter().map(|r| format!("ret={r}")));
                }
            }
            _ => (),
        }
        attrs
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node<Reg> {
    pub op: Op<Reg>,
    pub ty: Ty,
    /// Is this node folded into its user, generating no code (and no register demand) itself?
    pub contained: bool,
    /// Is this node's value never used?
    pub unused: bool,
}

impl<Reg: RegT> Node<Reg> {
    pub fn new(ty: Ty, op: Op<Reg>) -> Self {
        Self {
            op,
            ty,
            contained: false,
            unused: false,
        }
    }

    /// Does this node produce a value?
    pub fn is_value(&self) -> bool {
        self.ty != Ty::Void
    }
}

/// Facts about the method being compiled that earlier phases have established.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MethodInfo {
    /// Does the method's frame contain a stack security cookie that its epilog checks?
    pub needs_gs_cookie: bool,
    /// Does the method use floating point at all? Floating point typed nodes imply this whatever
    /// its value.
    pub float_used: bool,
}

/// A method's LIR.
#[derive(Debug)]
pub struct Lir<Reg> {
    nodes: IndexVec<NodeIdx, Node<Reg>>,
    range: Range,
    info: MethodInfo,
}

impl<Reg: RegT> Lir<Reg> {
    pub fn new(info: MethodInfo) -> Self {
        Self {
            nodes: IndexVec::new(),
            range: Range::new(),
            info,
        }
    }

    pub fn info(&self) -> &MethodInfo {
        &self.info
    }

    /// Does this method use floating point? True if earlier phases said so or if any node has a
    /// floating point type.
    pub fn float_used(&self) -> bool {
        self.info.float_used
            || self
                .nodes
                .iter()
                .any(|n| n.ty.reg_class() == RegClass::Float)
    }

    pub fn with_info(mut self, info: MethodInfo) -> Self {
        self.info = info;
        self
    }

    pub fn node(&self, idx: NodeIdx) -> &Node<Reg> {
        &self.nodes[idx]
    }

    /// How many nodes have been created (whether or not they are still in the execution order)?
    pub fn nodes_len(&self) -> usize {
        self.nodes.len()
    }

    fn alloc(&mut self, node: Node<Reg>) -> NodeIdx {
        let idx = self.nodes.push(node);
        self.range.grow(self.nodes.len());
        idx
    }

    /// Append `node` to the end of the execution order.
    pub fn push(&mut self, node: Node<Reg>) -> NodeIdx {
        let idx = self.alloc(node);
        self.range.link_last(idx);
        idx
    }

    pub fn insert_at_beginning(&mut self, node: Node<Reg>) -> NodeIdx {
        let idx = self.alloc(node);
        self.range.link_first(idx);
        idx
    }

    /// Insert `node` immediately before `before` in the execution order.
    ///
    /// # Panics
    ///
    /// If `before` is not in the execution order.
    pub fn insert_before(&mut self, before: NodeIdx, node: Node<Reg>) -> NodeIdx {
        assert!(self.range.contains(before));
        let idx = self.alloc(node);
        self.range.link_before(idx, before);
        idx
    }

    /// Insert `node` immediately after `after` in the execution order.
    ///
    /// # Panics
    ///
    /// If `after` is not in the execution order.
    pub fn insert_after(&mut self, after: NodeIdx, node: Node<Reg>) -> NodeIdx {
        assert!(self.range.contains(after));
        let idx = self.alloc(node);
        self.range.link_after(idx, after);
        idx
    }

    /// Remove `idx` from the execution order. The node remains accessible via [Self::node].
    pub fn remove(&mut self, idx: NodeIdx) {
        self.range.unlink(idx);
    }

    pub fn contains(&self, idx: NodeIdx) -> bool {
        self.range.contains(idx)
    }

    pub fn first(&self) -> Option<NodeIdx> {
        self.range.first()
    }

    pub fn last(&self) -> Option<NodeIdx> {
        self.range.last()
    }

    /// How many nodes are in the execution order?
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.len() == 0
    }

    /// Iterate over the nodes in execution order.
    pub fn iter(&self) -> impl Iterator<Item = NodeIdx> + '_ {
        self.range.iter()
    }

    /// Iterate over the nodes in reverse execution order.
    pub fn iter_rev(&self) -> impl Iterator<Item = NodeIdx> + '_ {
        self.range.iter_rev()
    }

    pub fn display_node(&self, idx: NodeIdx) -> String {
        let node = &self.nodes[idx];
        let mut s = String::new();
        if node.is_value() {
            s.push_str(&format!("{idx}: {} = ", node.ty));
        }
        s.push_str(node.op.name());
        let args = match &node.op {
            Op::LclVar { lcl } | Op::LclAddr { lcl } => vec![lcl.to_string()],
            Op::Const { val } => vec![val.to_string()],
            // Address modes list their operands as attributes as either may be absent.
            Op::Lea { .. } => Vec::new(),
            Op::Call(call) => call.args.iter().map(|x| x.to_string()).collect(),
            op => op.operands().iter().map(|x| x.to_string()).collect(),
        };
        if !args.is_empty() {
            s.push(' ');
            s.push_str(&args.join(", "));
        }
        let mut attrs = node.op.attrs();
        if node.contained {
            attrs.push("contained".to_owned());
        }
        if node.unused {
            attrs.push("unused".to_owned());
        }
        if !attrs.is_empty() {
            s.push_str(&format!(" [{}]", attrs.join(", ")));
        }
        s
    }
}

impl<Reg: RegT> Display for Lir<Reg> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for idx in self.iter() {
            writeln!(f, "{}", self.display_node(idx))?;
        }
        Ok(())
    }
}
