//! The implementation of the `REGREQ_LOG*` environment variables.
//!
//! Note that IR dumping is only available when the `regreq_dump` feature is enabled: otherwise we
//! expose no-op functions.

use std::{env, error::Error, fs::File, io::Write, path::PathBuf};
use strum::{EnumCount, FromRepr};

/// How verbose should normal logging be?
#[repr(u8)]
#[derive(Copy, Clone, Debug, EnumCount, FromRepr, PartialEq, PartialOrd)]
pub enum Verbosity {
    /// Disable logging entirely.
    Disabled,
    /// Log errors.
    Error,
    /// Log warnings.
    Warning,
    /// Log the start and end of building each method.
    MethodEvent,
}

#[derive(Debug)]
pub struct Log {
    /// The requested [Verbosity] level for logging.
    level: Verbosity,
    /// The path to write to. A value of `None` means stderr.
    path: Option<PathBuf>,
}

impl Log {
    /// Create a [Log] configured by the `REGREQ_LOG` environment variable.
    pub fn new() -> Result<Self, Box<dyn Error>> {
        Self::from_setting(env::var("REGREQ_LOG").ok().as_deref())
    }

    /// Create a [Log] from a `REGREQ_LOG`-formatted string, or, if `setting` is `None`, one that
    /// logs only errors.
    pub fn from_setting(setting: Option<&str>) -> Result<Self, Box<dyn Error>> {
        let Some(s) = setting else {
            return Ok(Self {
                path: None,
                level: Verbosity::Error,
            });
        };
        let (path, level) = match s.split(':').collect::<Vec<_>>()[..] {
            [path, level] => {
                if path == "-" {
                    (None, level)
                } else {
                    let path = PathBuf::from(path);
                    // Truncate any existing log so that appends don't follow a previous run.
                    File::create(&path).ok();
                    (Some(path), level)
                }
            }
            [level] => (None, level),
            [..] => return Err("REGREQ_LOG must be of the format `[<path|->:]<level>".into()),
        };
        let level = level
            .parse::<u8>()
            .map_err(|e| format!("Invalid REGREQ_LOG level '{s}': {e}"))?;
        // This unwrap can only fail if the types are wrong statically.
        let max_level = u8::try_from(Verbosity::COUNT).unwrap() - 1;
        let level = Verbosity::from_repr(level)
            .ok_or_else(|| format!("REGREQ_LOG level {level} exceeds maximum {max_level}"))?;
        Ok(Self { path, level })
    }

    pub fn level(&self) -> Verbosity {
        self.level
    }

    /// Log `msg` with the [Verbosity] level `level`.
    ///
    /// # Panics
    ///
    /// If `level == Verbosity::Disabled`.
    pub fn log(&self, level: Verbosity, msg: &str) {
        if level <= self.level {
            let prefix = match level {
                Verbosity::Disabled => panic!(),
                Verbosity::Error => "regreq-error",
                Verbosity::Warning => "regreq-warning",
                Verbosity::MethodEvent => "regreq-method-event",
            };
            match &self.path {
                Some(p) => {
                    let s = format!("{prefix}: {msg}\n");
                    File::options()
                        .append(true)
                        .open(p)
                        .map(|mut x| x.write(s.as_bytes()))
                        .ok();
                }
                None => {
                    eprintln!("{prefix}: {msg}");
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum IRPhase {
    /// The LIR handed to the builders.
    Lir,
    /// The demand events built from the LIR.
    Refs,
}

#[cfg(not(feature = "regreq_dump"))]
mod internals {
    use super::IRPhase;
    pub(crate) fn should_log_ir(_: IRPhase) -> bool {
        false
    }
    pub(crate) fn log_ir(_: &str) {}
}

#[cfg(feature = "regreq_dump")]
mod internals {
    use super::IRPhase;
    use std::{collections::HashSet, env, error::Error, fs::File, io::Write, sync::LazyLock};

    static LOG_IR: LazyLock<Option<(String, HashSet<IRPhase>)>> = LazyLock::new(|| {
        let mut log_phases = HashSet::new();
        if let Ok(x) = env::var("REGREQ_LOG_IR") {
            let (path, phases) = match x.split(':').collect::<Vec<_>>().as_slice() {
                [path, phases] => (*path, *phases),
                [phases] => ("-", *phases),
                _ => panic!(
                    "REGREQ_LOG_IR must be of the format '[<path>:]<phase_1>[,...,<phase_n>]'"
                ),
            };
            for x in phases.split(',') {
                log_phases.insert(IRPhase::from_str(x).unwrap());
            }
            if path != "-" {
                File::create(path).ok();
            }
            Some((path.to_string(), log_phases))
        } else {
            None
        }
    });

    impl IRPhase {
        fn from_str(s: &str) -> Result<Self, Box<dyn Error>> {
            match s {
                "lir" => Ok(Self::Lir),
                "refs" => Ok(Self::Refs),
                _ => Err(format!("Invalid REGREQ_LOG_IR value: {s}").into()),
            }
        }
    }

    pub(crate) fn should_log_ir(phase: IRPhase) -> bool {
        LOG_IR
            .as_ref()
            .is_some_and(|(_, phases)| phases.contains(&phase))
    }

    pub(crate) fn log_ir(s: &str) {
        match LOG_IR.as_ref().map(|(p, _)| p.as_str()) {
            Some("-") => eprint!("{s}"),
            Some(x) => {
                File::options()
                    .append(true)
                    .open(x)
                    .map(|mut x| x.write(s.as_bytes()))
                    .ok();
            }
            None => (),
        }
    }
}

pub(crate) use internals::{log_ir, should_log_ir};
