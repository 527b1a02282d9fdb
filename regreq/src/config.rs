//! The implementation of the `REGREQ_TARGET` environment variable.
//!
//! `REGREQ_TARGET` has the format `<arch>[-<os>][-<abi>][-nosimd]`, e.g. `arm64-linux`,
//! `arm64-apple`, `arm64-linux-nativeaot` or `arm32-linux`. If it is not set, `arm64-linux` is
//! used.

use crate::target::Arch;
use std::{env, error::Error, str::FromStr};
use strum::{Display, EnumString};

#[derive(Clone, Copy, Debug, Default, Display, EnumString, Eq, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum TargetOs {
    #[default]
    Linux,
    Apple,
    Windows,
}

impl TargetOs {
    pub fn is_unix(&self) -> bool {
        matches!(self, TargetOs::Linux | TargetOs::Apple)
    }
}

#[derive(Clone, Copy, Debug, Default, Display, EnumString, Eq, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum Abi {
    #[default]
    Default,
    NativeAot,
}

/// The facts about a target that vary within a single architecture.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TargetOpts {
    pub os: TargetOs,
    pub abi: Abi,
    /// Is the baseline SIMD instruction set available?
    pub simd: bool,
}

impl TargetOpts {
    /// Does this target use Apple's variant of the ARM64 ABI (which, amongst other things, packs
    /// stack arguments to their natural alignment)?
    pub fn is_apple_abi(&self) -> bool {
        self.os == TargetOs::Apple
    }
}

impl Default for TargetOpts {
    fn default() -> Self {
        Self {
            os: TargetOs::default(),
            abi: Abi::default(),
            simd: true,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    pub arch: Arch,
    pub opts: TargetOpts,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn Error>> {
        match env::var("REGREQ_TARGET") {
            Ok(s) => Self::from_str(&s),
            Err(_) => Ok(Self {
                arch: Arch::Arm64,
                opts: TargetOpts::default(),
            }),
        }
    }
}

impl FromStr for Config {
    type Err = Box<dyn Error>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('-');
        let arch = parts
            .next()
            .filter(|x| !x.is_empty())
            .ok_or("REGREQ_TARGET must be of the format `<arch>[-<os>][-<abi>][-nosimd]`")?;
        let arch =
            Arch::from_str(arch).map_err(|_| format!("Unknown REGREQ_TARGET arch '{arch}'"))?;
        let mut opts = TargetOpts {
            simd: arch == Arch::Arm64,
            ..TargetOpts::default()
        };
        for part in parts {
            if part == "nosimd" {
                opts.simd = false;
            } else if let Ok(os) = TargetOs::from_str(part) {
                opts.os = os;
            } else if let Ok(abi) = Abi::from_str(part) {
                opts.abi = abi;
            } else {
                return Err(format!("Unknown REGREQ_TARGET component '{part}' in '{s}'").into());
            }
        }
        Ok(Self { arch, opts })
    }
}
