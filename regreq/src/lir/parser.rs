//! A LIR parser, suitable for creating [Lir]s for testing purposes.
//!
//! The parser accepts the output of [Lir::display_node] as input, one node per line, with the
//! following rules:
//!
//! 1. Nodes are numbered in the order they appear, including nodes which do not define a value.
//!    A value-defining node `%<n>: <ty> = ...` must therefore have `n` equal to its position.
//! 2. Operands may refer to nodes later in the input, so that malformed LIR can be expressed.
//! 3. Every node may carry the attributes `contained` and `unused`.
//! 4. Attributes may be split over several bracketed lists, so `lea [base=%0] [contained]` is
//!    equivalent to `lea [base=%0, contained]`.

use super::{
    BinOp, BlkOpKind, Call, CallKind, Helper, Lir, MethodInfo, Node, NodeIdx, Op, StoreBlk, Ty,
};
use crate::regs::RegT;
use lrlex::{DefaultLexerTypes, LRNonStreamingLexer, lrlex_mod};
use lrpar::{NonStreamingLexer, Span, lrpar_mod};
use smallvec::SmallVec;
use std::str::FromStr;

lrlex_mod!("lir/lir.l");
lrpar_mod!("lir/lir.y");
type StorageT = u16;

struct LirParser<'lexer, 'input: 'lexer, Reg: RegT> {
    lexer: &'lexer LRNonStreamingLexer<'lexer, 'input, DefaultLexerTypes<StorageT>>,
    lir: Lir<Reg>,
    /// Every operand reference, so that forward references can be checked once all nodes have
    /// been seen.
    refs: Vec<(NodeIdx, Span)>,
}

impl<'lexer, 'input: 'lexer, Reg: RegT> LirParser<'lexer, 'input, Reg> {
    fn build(mut self, astnodes: Vec<AstNode>) -> Lir<Reg> {
        for AstNode {
            def,
            op,
            args,
            attrs,
        } in astnodes
        {
            let ty = match def {
                Some((local, ty)) => {
                    self.p_def_local(local);
                    self.p_ty(ty)
                }
                None => Ty::Void,
            };
            let mut attrs = attrs;
            let contained = self.take_flag(&mut attrs, "contained");
            let unused = self.take_flag(&mut attrs, "unused");
            let name = self.lexer.span_str(op);
            let op = match name {
                "lclvar" => Op::LclVar {
                    lcl: self.p_lcl(op, &args),
                },
                "lcladdr" => Op::LclAddr {
                    lcl: self.p_lcl(op, &args),
                },
                "const" => match &args[..] {
                    [AstArg::Int(span)] => Op::Const {
                        val: self.p_int(*span),
                    },
                    _ => self.err_span(op, "Expected a single integer"),
                },
                "lea" => {
                    self.p_locals::<Vec<_>>(op, &args, 0);
                    let base = self.take_local(&mut attrs, "base");
                    let index = self.take_local(&mut attrs, "index");
                    let scale = self.take_int(&mut attrs, "scale").unwrap_or(1);
                    let offset = self.take_int(&mut attrs, "offset").unwrap_or(0);
                    Op::Lea {
                        base,
                        index,
                        scale: u8::try_from(scale)
                            .unwrap_or_else(|_| self.err_span(op, "Scale out of range")),
                        offset: i32::try_from(offset)
                            .unwrap_or_else(|_| self.err_span(op, "Offset out of range")),
                    }
                }
                "long" => {
                    let [lo, hi] = self.p_n_locals(op, &args);
                    Op::LongPair { lo, hi }
                }
                "cmp" => {
                    let [lhs, rhs] = self.p_n_locals(op, &args);
                    Op::Cmp { lhs, rhs }
                }
                "ind" => {
                    let [addr] = self.p_n_locals(op, &args);
                    Op::Ind {
                        addr,
                        unaligned: self.take_flag(&mut attrs, "unaligned"),
                    }
                }
                "storeind" => {
                    let [addr, data] = self.p_n_locals(op, &args);
                    Op::StoreInd {
                        addr,
                        data,
                        unaligned: self.take_flag(&mut attrs, "unaligned"),
                        write_barrier: self.take_flag(&mut attrs, "wb"),
                    }
                }
                "nullcheck" => {
                    let [addr] = self.p_n_locals(op, &args);
                    Op::NullCheck { addr }
                }
                "blk" => {
                    let [addr] = self.p_n_locals(op, &args);
                    Op::Blk {
                        addr,
                        size: self.take_size(&mut attrs, op, "size"),
                    }
                }
                "storeblk" => {
                    let [addr, data] = self.p_n_locals(op, &args);
                    let size = match self.take_int(&mut attrs, "size") {
                        Some(x) => {
                            u32::try_from(x).unwrap_or_else(|_| self.err_span(op, "Bad size"))
                        }
                        None => 0,
                    };
                    let kind = self.take_id(&mut attrs, "kind").map(|(s, span)| {
                        BlkOpKind::from_str(s)
                            .unwrap_or_else(|_| self.err_span(span, "Unknown block op kind"))
                    });
                    Op::StoreBlk(StoreBlk {
                        addr,
                        data,
                        size,
                        size_node: self.take_local(&mut attrs, "sizenode"),
                        init: self.take_flag(&mut attrs, "init"),
                        gc: self.take_flag(&mut attrs, "gc"),
                        overlap: self.take_flag(&mut attrs, "overlap"),
                        kind,
                    })
                }
                "initval" => {
                    let [val] = self.p_n_locals(op, &args);
                    Op::InitVal { val }
                }
                "cast" => {
                    let [src] = self.p_n_locals(op, &args);
                    Op::Cast { src }
                }
                "select" => {
                    let [cond, op1, op2] = self.p_n_locals(op, &args);
                    Op::Select {
                        cond: Some(cond),
                        op1,
                        op2,
                    }
                }
                "selectcc" => {
                    let [op1, op2] = self.p_n_locals(op, &args);
                    Op::Select {
                        cond: None,
                        op1,
                        op2,
                    }
                }
                "fieldlist" => Op::FieldList {
                    fields: self.p_locals(op, &args, usize::MAX),
                },
                "putarg_reg" => {
                    let [opnd] = self.p_n_locals(op, &args);
                    Op::PutArgReg {
                        op: opnd,
                        reg: self
                            .take_reg(&mut attrs, "reg")
                            .unwrap_or_else(|| self.err_span(op, "Missing reg")),
                    }
                }
                "putarg_stk" => {
                    let [data] = self.p_n_locals(op, &args);
                    Op::PutArgStk {
                        data,
                        stack_byte_size: self.take_size(&mut attrs, op, "size"),
                    }
                }
                "putarg_split" => {
                    let [data] = self.p_n_locals(op, &args);
                    let first_reg = self
                        .take_reg(&mut attrs, "reg")
                        .unwrap_or_else(|| self.err_span(op, "Missing reg"));
                    let num_regs = u8::try_from(self.take_size(&mut attrs, op, "regs"))
                        .unwrap_or_else(|_| self.err_span(op, "Too many regs"));
                    Op::PutArgSplit {
                        data,
                        first_reg,
                        num_regs,
                    }
                }
                "call" => {
                    let kind = if let Some((s, span)) = self.take_id(&mut attrs, "helper") {
                        CallKind::Helper(
                            Helper::from_str(s)
                                .unwrap_or_else(|_| self.err_span(span, "Unknown helper")),
                        )
                    } else if self.take_flag(&mut attrs, "indirect") {
                        CallKind::Indirect
                    } else {
                        CallKind::User
                    };
                    let mut call = Call::new(kind);
                    call.args = self.p_locals(op, &args, usize::MAX);
                    call.ctrl = self.take_local(&mut attrs, "target");
                    call.fast_tail_call = self.take_flag(&mut attrs, "tail");
                    call.needs_null_check = self.take_flag(&mut attrs, "nullcheck");
                    call.relative_indir = self.take_flag(&mut attrs, "relindir");
                    call.tls_get_addr = self.take_flag(&mut attrs, "tls");
                    let multireg = self.take_flag(&mut attrs, "multireg");
                    let mut regs = SmallVec::new();
                    while let Some(reg) = self.take_reg(&mut attrs, "ret") {
                        regs.push(reg);
                    }
                    if multireg || !regs.is_empty() {
                        call.multi_ret = Some(regs);
                    }
                    Op::Call(Box::new(call))
                }
                "ret" => match &args[..] {
                    [] => Op::Return { val: None },
                    _ => {
                        let [val] = self.p_n_locals(op, &args);
                        Op::Return { val: Some(val) }
                    }
                },
                x => match BinOp::from_str(x) {
                    Ok(binop) => {
                        let [lhs, rhs] = self.p_n_locals(op, &args);
                        Op::BinOp { binop, lhs, rhs }
                    }
                    Err(_) => self.err_span(op, "Unknown operation"),
                },
            };
            if let Some(AstAttr { name, .. }) = attrs.first() {
                self.err_span(*name, "Unknown or duplicate attribute");
            }
            let mut node = Node::new(ty, op);
            node.contained = contained;
            node.unused = unused;
            self.lir.push(node);
        }

        for (idx, span) in &self.refs {
            if usize::from(*idx) >= self.lir.nodes_len() {
                self.err_span(*span, "Reference to a non-existent node");
            }
        }
        self.lir
    }

    fn err_span(&self, span: Span, msg: &str) -> ! {
        let ((line_off, col), _) = self.lexer.line_col(span);
        let code = self
            .lexer
            .span_lines_str(span)
            .split('\n')
            .next()
            .unwrap()
            .trim();
        panic!(
            "Line {}, column {}:\n  {}\n{}",
            line_off,
            col,
            code,
            msg
        );
    }

    fn p_def_local(&mut self, span: Span) {
        let s = self.lexer.span_str(span);
        let idx = s[1..s.len() - 1]
            .parse::<usize>()
            .unwrap_or_else(|_| self.err_span(span, "Invalid local"));
        if idx != self.lir.nodes_len() {
            self.err_span(
                span,
                &format!("Expected %{}: nodes are numbered by position", self.lir.nodes_len()),
            );
        }
    }

    fn p_local(&mut self, span: Span) -> NodeIdx {
        let idx = self.lexer.span_str(span)[1..]
            .parse::<usize>()
            .unwrap_or_else(|_| self.err_span(span, "Invalid local"));
        let idx = NodeIdx::from_usize(idx);
        self.refs.push((idx, span));
        idx
    }

    fn p_ty(&self, span: Span) -> Ty {
        match Ty::from_str(self.lexer.span_str(span)) {
            Ok(Ty::Void) | Err(_) => self.err_span(span, "Invalid type"),
            Ok(ty) => ty,
        }
    }

    fn p_int(&self, span: Span) -> i64 {
        self.lexer
            .span_str(span)
            .parse::<i64>()
            .unwrap_or_else(|e| self.err_span(span, &e.to_string()))
    }

    fn p_lcl(&self, op: Span, args: &[AstArg]) -> u32 {
        match args {
            [AstArg::Int(span)] => u32::try_from(self.p_int(*span))
                .unwrap_or_else(|_| self.err_span(*span, "Invalid local number")),
            _ => self.err_span(op, "Expected a local number"),
        }
    }

    /// Parse `args` as locals. If `n != usize::MAX`, there must be exactly `n` of them.
    fn p_locals<T: FromIterator<NodeIdx>>(&mut self, op: Span, args: &[AstArg], n: usize) -> T {
        if n != usize::MAX && args.len() != n {
            self.err_span(op, &format!("Expected {n} operands"));
        }
        args.iter()
            .map(|x| match x {
                AstArg::Local(span) => self.p_local(*span),
                AstArg::Int(span) => self.err_span(*span, "Expected a local"),
            })
            .collect()
    }

    fn p_n_locals<const N: usize>(&mut self, op: Span, args: &[AstArg]) -> [NodeIdx; N] {
        let locals = self.p_locals::<Vec<_>>(op, args, N);
        <[NodeIdx; N]>::try_from(locals).unwrap()
    }

    fn take_attr(&self, attrs: &mut Vec<AstAttr>, name: &str) -> Option<AstAttr> {
        attrs
            .iter()
            .position(|x| self.lexer.span_str(x.name) == name)
            .map(|i| attrs.remove(i))
    }

    fn take_flag(&self, attrs: &mut Vec<AstAttr>, name: &str) -> bool {
        match self.take_attr(attrs, name) {
            Some(AstAttr { val: None, .. }) => true,
            Some(AstAttr { name, val: Some(_) }) => self.err_span(name, "Flags take no value"),
            None => false,
        }
    }

    fn take_val(&self, attrs: &mut Vec<AstAttr>, name: &str) -> Option<AstAttrVal> {
        match self.take_attr(attrs, name) {
            Some(AstAttr { val: Some(v), .. }) => Some(v),
            Some(AstAttr { name, val: None }) => self.err_span(name, "Expected a value"),
            None => None,
        }
    }

    fn take_int(&self, attrs: &mut Vec<AstAttr>, name: &str) -> Option<i64> {
        self.take_val(attrs, name).map(|v| match v {
            AstAttrVal::Int(span) => self.p_int(span),
            AstAttrVal::Id(span) | AstAttrVal::Local(span) => {
                self.err_span(span, "Expected an integer")
            }
        })
    }

    fn take_size(&self, attrs: &mut Vec<AstAttr>, op: Span, name: &str) -> u32 {
        let x = self
            .take_int(attrs, name)
            .unwrap_or_else(|| self.err_span(op, &format!("Missing {name}")));
        u32::try_from(x).unwrap_or_else(|_| self.err_span(op, &format!("Invalid {name}")))
    }

    fn take_local(&mut self, attrs: &mut Vec<AstAttr>, name: &str) -> Option<NodeIdx> {
        match self.take_val(attrs, name)? {
            AstAttrVal::Local(span) => Some(self.p_local(span)),
            AstAttrVal::Id(span) | AstAttrVal::Int(span) => {
                self.err_span(span, "Expected a local")
            }
        }
    }

    fn take_id(&self, attrs: &mut Vec<AstAttr>, name: &str) -> Option<(&'input str, Span)> {
        match self.take_val(attrs, name)? {
            AstAttrVal::Id(span) => Some((self.lexer.span_str(span), span)),
            AstAttrVal::Int(span) | AstAttrVal::Local(span) => {
                self.err_span(span, "Expected a name")
            }
        }
    }

    fn take_reg(&self, attrs: &mut Vec<AstAttr>, name: &str) -> Option<Reg> {
        self.take_id(attrs, name).map(|(s, span)| {
            Reg::from_name(s).unwrap_or_else(|| self.err_span(span, "Unknown register"))
        })
    }
}

pub(crate) fn str_to_lir<Reg: RegT>(s: &str) -> Lir<Reg> {
    let lexerdef = lir_l::lexerdef();
    let lexer = lexerdef.lexer(s);
    let (res, errs) = lir_y::parse(&lexer);
    if !errs.is_empty() {
        for e in errs {
            eprintln!("{}", e.pp(&lexer, &lir_y::token_epp));
        }
        panic!("Could not parse input");
    }

    let Some(Ok(astnodes)) = res else {
        panic!("No AST produced")
    };

    let lp = LirParser {
        lexer: &lexer,
        lir: Lir::new(MethodInfo::default()),
        refs: Vec::new(),
    };
    lp.build(astnodes)
}

struct AstNode {
    /// The `%<n>:` and type spans of a value-defining node.
    def: Option<(Span, Span)>,
    op: Span,
    args: Vec<AstArg>,
    attrs: Vec<AstAttr>,
}

enum AstArg {
    Local(Span),
    Int(Span),
}

struct AstAttr {
    name: Span,
    val: Option<AstAttrVal>,
}

enum AstAttrVal {
    Id(Span),
    Int(Span),
    Local(Span),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::target::{arm32, arm64};

    #[test]
    fn parse_nodes() {
        let lir = str_to_lir::<arm64::Reg>(
            "
            %0: ref = lclvar 0
            %1: i64 = const -16 [contained]
            %2: ref = lea [base=%0, offset=-16] [contained]
            %3: simd12 = ind %2 [unaligned]
            %4: ref = lclvar 1
            storeind %4, %3 [wb]
            %6: i64 = lclvar 2
            %7: i64 = putarg_reg %6 [reg=x1]
            %8: struct = call %7 [helper=assign_ref, tail, ret=x0, ret=x1]
            ",
        );
        assert_eq!(lir.len(), 9);
        let n = lir.node(NodeIdx::from_usize(1));
        assert_eq!(n.op, Op::Const { val: -16 });
        assert!(n.contained);
        assert_eq!(
            lir.node(NodeIdx::from_usize(2)).op,
            Op::Lea {
                base: Some(NodeIdx::from_usize(0)),
                index: None,
                scale: 1,
                offset: -16
            }
        );
        assert_eq!(lir.node(NodeIdx::from_usize(5)).ty, Ty::Void);
        match &lir.node(NodeIdx::from_usize(8)).op {
            Op::Call(call) => {
                assert_eq!(call.kind, CallKind::Helper(Helper::AssignRef));
                assert!(call.fast_tail_call);
                assert_eq!(
                    call.multi_ret.as_ref().unwrap().as_slice(),
                    &[arm64::Reg::X0, arm64::Reg::X1]
                );
            }
            _ => panic!(),
        }
    }

    #[test]
    fn parse_arm32_regs() {
        let lir = str_to_lir::<arm32::Reg>(
            "
            %0: struct = lclvar 0 [contained]
            %1: struct = putarg_split %0 [reg=r2, regs=2]
            ",
        );
        assert_eq!(
            lir.node(NodeIdx::from_usize(1)).op,
            Op::PutArgSplit {
                data: NodeIdx::from_usize(0),
                first_reg: arm32::Reg::R2,
                num_regs: 2
            }
        );
    }

    #[test]
    #[should_panic(expected = "nodes are numbered by position")]
    fn misnumbered_def() {
        str_to_lir::<arm64::Reg>(
            "
            %0: i64 = lclvar 0
            %2: i64 = lclvar 1
            ",
        );
    }

    #[test]
    #[should_panic(expected = "Unknown or duplicate attribute")]
    fn unknown_attr() {
        str_to_lir::<arm64::Reg>("%0: i64 = lclvar 0 [wibble]");
    }

    #[test]
    #[should_panic(expected = "Reference to a non-existent node")]
    fn dangling_ref() {
        str_to_lir::<arm64::Reg>("ret %3");
    }
}
