//! Loads, stores, and null checks.

use super::RefBuilder;
use crate::{
    CompilationError,
    kill::kill_set_for_store_ind,
    lir::{NodeIdx, Op, Ty},
    refpos::NodeReqs,
    regs::RegMask,
    target::TargetT,
};

impl<T: TargetT> RefBuilder<'_, T> {
    pub(super) fn build_indir(
        &mut self,
        idx: NodeIdx,
    ) -> Result<NodeReqs<T::Reg>, CompilationError> {
        let lir = self.lir;
        let target = self.target;
        let node = lir.node(idx);
        let (addr, data, unaligned) = match node.op {
            Op::Ind { addr, unaligned } => (addr, None, unaligned),
            Op::StoreInd {
                addr,
                data,
                unaligned,
                ..
            } => (addr, Some(data), unaligned),
            Op::NullCheck { addr } => {
                // The load's result is discarded into the zero register.
                if node.is_value() {
                    return Err(self.shape_err(idx, "null checks do not produce a value"));
                }
                (addr, None, false)
            }
            _ => unreachable!(),
        };
        // The type of the value moved to or from memory.
        let ty = match data {
            Some(data) => lir.node(data).ty,
            None => node.ty,
        };
        if ty == Ty::Struct {
            return Err(self.shape_err(idx, "struct-typed indirections must be contained"));
        }

        let mut reqs = NodeReqs::default();
        if unaligned && ty.is_float() {
            // The value is staged through integer registers.
            for _ in 0..target.unaligned_fp_indir_temps(ty) {
                self.internal_int_def(idx, &mut reqs, None);
            }
        }

        let anode = lir.node(addr);
        if anode.contained
            && let Op::Lea { index, offset, .. } = anode.op
        {
            // No addressing mode combines an index with a displacement.
            if (index.is_some() && offset != 0)
                || !target.valid_ldst_offset(i64::from(offset), ty.size())
            {
                self.internal_int_def(idx, &mut reqs, None);
            }
        }

        if ty == Ty::Simd12 {
            // A 12 byte vector is moved as an 8 byte and a 4 byte part.
            if anode.contained {
                return Err(self.shape_err(idx, "12 byte vector address must be in a register"));
            }
            self.internal_int_def(idx, &mut reqs, None);
        }

        self.build_addr_uses(idx, addr, None)?;
        if let Some(data) = data {
            self.build_operand_uses(idx, data, None)?;
        }
        self.build_internal_uses(idx, &reqs);
        if matches!(node.op, Op::Ind { .. }) {
            self.build_def(idx, None, 0);
        }
        Ok(reqs)
    }

    /// A store of a GC reference into the heap, which is performed by the write barrier helper.
    pub(super) fn build_gc_write_barrier(
        &mut self,
        idx: NodeIdx,
    ) -> Result<NodeReqs<T::Reg>, CompilationError> {
        let lir = self.lir;
        let target = self.target;
        let Op::StoreInd { addr, data, .. } = lir.node(idx).op else {
            unreachable!()
        };
        if lir.node(addr).contained {
            return Err(self.shape_err(idx, "write barrier address must be in a register"));
        }
        self.build_use(idx, addr, Some(RegMask::from(target.write_barrier_dst())), 0)?;
        self.build_use(idx, data, Some(RegMask::from(target.write_barrier_src())), 0)?;
        self.build_kills(idx, kill_set_for_store_ind(target, true));
        Ok(NodeReqs::default())
    }
}

#[cfg(test)]
mod test {
    use crate::{
        CompilationError,
        build::test::{arm32, arm64, build, build_and_test},
        lir::{MethodInfo, NodeIdx},
        refpos::RefKind,
        regs::RegClass,
        target::TargetT,
    };

    /// Build a load of `ty` through an address mode `base [+ index * 8] + offset` and return how
    /// many internal registers it reserves.
    fn lea_internals<T: TargetT>(target: &T, index: bool, offset: i32, ty: &str) -> usize {
        let (index_flags, index_attr) = if index {
            ("", ", index=%1, scale=8")
        } else {
            (" [unused]", "")
        };
        let s = format!(
            "
            %0: byref = lclvar 0
            %1: i64 = lclvar 1{index_flags}
            %2: byref = lea [base=%0{index_attr}, offset={offset}] [contained]
            %3: {ty} = ind %2
            ret %3
            "
        );
        let (_, refs) = build(target, &s, MethodInfo::default());
        refs.unwrap().reqs(NodeIdx::from_usize(3)).internals.len()
    }

    #[test]
    fn address_mode_internals() {
        let t = arm64();
        assert_eq!(lea_internals(&t, false, 8, "i64"), 0);
        assert_eq!(lea_internals(&t, false, 32760, "i64"), 0);
        assert_eq!(lea_internals(&t, false, 32768, "i64"), 1);
        assert_eq!(lea_internals(&t, false, 260, "i64"), 1);
        assert_eq!(lea_internals(&t, false, 260, "i32"), 0);
        assert_eq!(lea_internals(&t, false, -256, "i64"), 0);
        assert_eq!(lea_internals(&t, false, -257, "i64"), 1);
        assert_eq!(lea_internals(&t, true, 0, "i64"), 0);
        assert_eq!(lea_internals(&t, true, 8, "i64"), 1);
        let t = arm32();
        assert_eq!(lea_internals(&t, false, 4095, "i32"), 0);
        assert_eq!(lea_internals(&t, false, 4096, "i32"), 1);
        assert_eq!(lea_internals(&t, true, 4, "i32"), 1);
    }

    #[test]
    fn loads_and_stores() {
        build_and_test(
            &arm64(),
            "
            %0: byref = lclvar 0
            %1: byref = lclvar 1
            %2: i64 = lea [base=%1, offset=16] [contained]
            %3: i64 = ind %2
            storeind %0, %3
            ",
            3,
            "
            @6 %3 use %1 int ...
            @7 %3 def %3 int ...
            ",
        );
        build_and_test(
            &arm64(),
            "
            %0: byref = lclvar 0
            %1: f32 = lclvar 1
            storeind %0, %1
            ",
            2,
            "
            @4 %2 use %0 int ...
            @4 %2 use %1 float ...
            ",
        );
        build_and_test(
            &arm64(),
            "
            %0: byref = lclvar 0
            nullcheck %0
            ",
            1,
            "@2 %1 use %0 int ...",
        );
    }

    #[test]
    fn null_checks() {
        let (_, refs) = build(
            &arm64(),
            "
            %0: byref = lclvar 0
            %1: byref = lea [base=%0, offset=65536] [contained]
            nullcheck %1
            ",
            MethodInfo::default(),
        );
        let refs = refs.unwrap();
        let nc = NodeIdx::from_usize(2);
        assert!(refs.for_node(nc).all(|rp| rp.kind != RefKind::Def));
        let reqs = refs.reqs(nc);
        assert_eq!((reqs.src_count, reqs.dst_count), (1, 0));
        assert_eq!(reqs.internals.len(), 1);

        let (_, refs) = build(
            &arm64(),
            "
            %0: byref = lclvar 0
            %1: i64 = nullcheck %0 [unused]
            ",
            MethodInfo::default(),
        );
        assert!(matches!(refs, Err(CompilationError::UnreachableShape(_))));
    }

    #[test]
    fn simd12() {
        let (_, refs) = build(
            &arm64(),
            "
            %0: byref = lclvar 0
            %1: simd12 = ind %0
            ret %1
            ",
            MethodInfo::default(),
        );
        let reqs = refs.unwrap().reqs(NodeIdx::from_usize(1)).clone();
        assert_eq!(reqs.internal_count(RegClass::Int), 1);
        let (_, refs) = build(
            &arm64(),
            "
            %0: byref = lclvar 0
            %1: byref = lea [base=%0, offset=8] [contained]
            %2: simd12 = ind %1
            ret %2
            ",
            MethodInfo::default(),
        );
        assert!(refs.is_err());
    }

    #[test]
    fn unaligned_floats() {
        let s = "
            %0: byref = lclvar 0
            %1: f64 = ind %0 [unaligned]
            ret %1
            ";
        let (_, refs) = build(&arm32(), s, MethodInfo::default());
        let refs = refs.unwrap();
        assert_eq!(
            refs.reqs(NodeIdx::from_usize(1))
                .internal_count(RegClass::Int),
            2
        );
        let (_, refs) = build(&arm64(), s, MethodInfo::default());
        assert!(refs.unwrap().reqs(NodeIdx::from_usize(1)).internals.is_empty());
        build_and_test(
            &arm32(),
            "
            %0: byref = lclvar 0
            %1: f32 = lclvar 1
            storeind %0, %1 [unaligned]
            ",
            2,
            "
            @4 %2 idef int ...
            @4 %2 use %0 int ...
            @4 %2 use %1 float ...
            @4 %2 iuse int ...
            ",
        );
    }

    #[test]
    fn write_barrier() {
        build_and_test(
            &arm64(),
            "
            %0: byref = lclvar 0
            %1: ref = lclvar 1
            storeind %0, %1 [wb]
            ",
            2,
            "
            @4 %2 use %0 int {x14}
            @4 %2 use %1 int {x15}
            @5 %2 kill int {x12,x14,x15,x16,x17}
            ",
        );
        build_and_test(
            &arm32(),
            "
            %0: byref = lclvar 0
            %1: ref = lclvar 1
            storeind %0, %1 [wb]
            ",
            2,
            "
            @4 %2 use %0 int {r0}
            @4 %2 use %1 int {r1}
            @5 %2 kill int ...
            ",
        );
    }
}
