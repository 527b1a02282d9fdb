//! Register requirement analysis for the ARM and ARM64 linear scan register allocator.
//!
//! Given a method's low-level IR ([lir::Lir]), in which instruction selection has already decided
//! which nodes are folded into their users, this crate describes every register demand the method
//! makes as a sequence of [refpos::RefPosition]s: which values are read and written where, which
//! scratch registers each node needs, which registers each node trashes, and which registers the
//! ABI fixes. The allocator proper consumes that sequence.

#![allow(clippy::upper_case_acronyms)]

pub mod build;
pub mod config;
pub mod kill;
pub mod lir;
pub mod log;
pub mod refpos;
pub mod regs;
pub mod target;

use crate::{
    build::RefBuilder,
    lir::Lir,
    log::{IRPhase, Log, Verbosity, log_ir, should_log_ir},
    refpos::RefPositions,
    target::TargetT,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompilationError {
    /// The LIR has a shape that lowering should never produce. This is a bug in an earlier phase.
    #[error("Unreachable shape: {0}")]
    UnreachableShape(String),
    /// The LIR asks for something the target can not do.
    #[error("Unsupported on target: {0}")]
    UnsupportedTarget(String),
    /// The ABI information attached to the LIR contradicts itself.
    #[error("ABI inconsistency: {0}")]
    AbiInconsistency(String),
}

/// Build the demand events for the method `lir` on `target`.
pub fn build_method<T: TargetT>(
    target: &T,
    lir: &Lir<T::Reg>,
    log: &Log,
) -> Result<RefPositions<T::Reg>, CompilationError> {
    log.log(
        Verbosity::MethodEvent,
        &format!("start building ({} nodes, {})", lir.len(), T::ARCH),
    );
    if should_log_ir(IRPhase::Lir) {
        log_ir(&format!("--- Begin lir ---\n{lir}--- End lir ---\n"));
    }
    match RefBuilder::new(target, lir).build() {
        Ok(refs) => {
            if should_log_ir(IRPhase::Refs) {
                log_ir(&format!("--- Begin refs ---\n{refs}--- End refs ---\n"));
            }
            log.log(
                Verbosity::MethodEvent,
                &format!("stop building ({} ref positions)", refs.len()),
            );
            Ok(refs)
        }
        Err(e) => {
            log.log(Verbosity::Error, &e.to_string());
            Err(e)
        }
    }
}
