//! Registers and register masks.
//!
//! Each target defines its own register `enum` which implements [RegT]. Registers are then
//! grouped into [RegMask]s, which are used both for the candidate registers of a demand event and
//! for the set of registers an operation kills.

use std::{
    fmt::{self, Debug, Display, Formatter},
    hash::Hash,
    marker::PhantomData,
    ops::{BitAnd, BitOr, Sub},
};

index_vec::define_index_type! {
    pub struct RegIdx = u8;
}

/// The register class a value, or an internal register, must be allocated from.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum RegClass {
    Int,
    Float,
}

pub trait RegT: Clone + Copy + Debug + Display + Eq + Hash + PartialEq + Send + Sync + 'static {
    /// How many registers are available in this system?
    const MAX_REGIDX: RegIdx;
    /// Make a `Reg` from a `RegIdx`.
    fn from_regidx(idx: RegIdx) -> Self;
    /// What is this register's index?
    fn regidx(&self) -> RegIdx;
    /// Which register class does this register belong to?
    fn class(&self) -> RegClass;
    /// Return the register named `s` (e.g. `x14` or `lr`), if there is one.
    fn from_name(s: &str) -> Option<Self>;
}

/// A set of registers.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct RegMask<Reg>(u64, PhantomData<Reg>);

impl<Reg: RegT> RegMask<Reg> {
    /// Return an empty mask.
    pub const fn none() -> Self {
        Self(0, PhantomData)
    }

    pub fn from_regs(regs: &[Reg]) -> Self {
        let mut m = Self::none();
        for r in regs {
            m.set(*r);
        }
        m
    }

    pub fn is_set(&self, reg: Reg) -> bool {
        self.0 & (1 << usize::from(reg.regidx())) != 0
    }

    pub fn set(&mut self, reg: Reg) {
        self.0 |= 1 << usize::from(reg.regidx());
    }

    pub fn unset(&mut self, reg: Reg) {
        self.0 &= !(1 << usize::from(reg.regidx()));
    }

    /// Return a copy of this mask with `reg` set.
    pub fn with(mut self, reg: Reg) -> Self {
        self.set(reg);
        self
    }

    /// Return a copy of this mask with `reg` unset.
    pub fn without(mut self, reg: Reg) -> Self {
        self.unset(reg);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn count(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// If this mask contains exactly one register, return it.
    pub fn single_reg(&self) -> Option<Reg> {
        if self.0.count_ones() == 1 {
            Some(Reg::from_regidx(RegIdx::from_raw(self.0.trailing_zeros() as u8)))
        } else {
            None
        }
    }

    pub fn is_subset_of(&self, other: Self) -> bool {
        self.0 & !other.0 == 0
    }

    /// Return the subset of this mask whose registers belong to `class`.
    pub fn of_class(&self, class: RegClass) -> Self {
        self.iter()
            .filter(|r| r.class() == class)
            .fold(Self::none(), |m, r| m.with(r))
    }

    /// Iterate over the registers in this mask in [RegIdx] order.
    pub fn iter(&self) -> impl Iterator<Item = Reg> + use<Reg> {
        let bits = self.0;
        (0..usize::from(Reg::MAX_REGIDX))
            .filter(move |i| bits & (1 << i) != 0)
            .map(|i| Reg::from_regidx(RegIdx::from_usize(i)))
    }
}

impl<Reg: RegT> Default for RegMask<Reg> {
    fn default() -> Self {
        Self::none()
    }
}

impl<Reg: RegT> From<Reg> for RegMask<Reg> {
    fn from(reg: Reg) -> Self {
        Self::none().with(reg)
    }
}

impl<Reg: RegT> BitOr for RegMask<Reg> {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0, PhantomData)
    }
}

impl<Reg: RegT> BitAnd for RegMask<Reg> {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0, PhantomData)
    }
}

impl<Reg: RegT> Sub for RegMask<Reg> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 & !rhs.0, PhantomData)
    }
}

impl<Reg> Debug for RegMask<Reg> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "RegMask({:#x})", self.0)
    }
}

impl<Reg: RegT> Display for RegMask<Reg> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(",")
        )
    }
}
