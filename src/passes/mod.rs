//! ASR to ASR transformations
//!
//! Passes are looked up by name in a fixed registry and applied in the
//! order the caller lists them. Every pass rewrites the unit in place and
//! leaves already-transformed input unchanged, so running one twice is the
//! same as running it once.

mod do_loops;
mod global_stmts;

pub use do_loops::DoLoops;
pub use global_stmts::GlobalStmts;

use crate::asr::TranslationUnit;
use crate::error::{ErrorRecord, StageResult};
use std::fmt;
use std::str::FromStr;

/// An IR rewrite
pub trait Pass {
    fn name(&self) -> &'static str;

    fn run(&self, tu: &mut TranslationUnit) -> StageResult<()>;
}

/// Names accepted by `--pass`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    DoLoops,
    GlobalStmts,
}

impl PassKind {
    pub const ALL: [PassKind; 2] = [PassKind::DoLoops, PassKind::GlobalStmts];

    pub fn name(self) -> &'static str {
        match self {
            PassKind::DoLoops => "do_loops",
            PassKind::GlobalStmts => "global_stmts",
        }
    }

    /// Instantiate with default options
    pub fn instantiate(self) -> Box<dyn Pass> {
        match self {
            PassKind::DoLoops => Box::new(DoLoops),
            PassKind::GlobalStmts => Box::new(GlobalStmts::default()),
        }
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PassKind {
    type Err = ErrorRecord;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PassKind::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = PassKind::ALL.iter().map(|p| p.name()).collect();
                ErrorRecord::unsupported(format!(
                    "Pass '{}' is not supported; available passes: {}",
                    s,
                    known.join(", ")
                ))
            })
    }
}

/// Resolve `--pass` values, each of which may be a comma separated list
pub fn resolve<S: AsRef<str>>(names: &[S]) -> StageResult<Vec<PassKind>> {
    names
        .iter()
        .flat_map(|n| n.as_ref().split(','))
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(PassKind::from_str)
        .collect()
}

/// Apply `passes` in order
pub fn run_passes(tu: &mut TranslationUnit, passes: &[PassKind]) -> StageResult<()> {
    for kind in passes {
        let pass = kind.instantiate();
        tracing::debug!("applying pass {}", pass.name());
        pass.run(tu)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_resolve_comma_list() {
        let passes = resolve(&["do_loops,global_stmts"]).unwrap();
        assert_eq!(passes, vec![PassKind::DoLoops, PassKind::GlobalStmts]);
    }

    #[test]
    fn test_order_is_kept() {
        let passes = resolve(&["global_stmts", "do_loops"]).unwrap();
        assert_eq!(passes, vec![PassKind::GlobalStmts, PassKind::DoLoops]);
    }

    #[test]
    fn test_unknown_pass() {
        let err = resolve(&["inline"]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unsupported);
        assert_eq!(err.exit_code(), 1);
        assert!(err.message.contains("do_loops"));
    }
}
