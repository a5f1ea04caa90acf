//! `logmesh mock`: append random lines to files.

use std::time::Duration;

use anyhow::{Context, Result};

use super::args::MockArgs;
use crate::core::Cancellation;
use crate::log;

pub fn run_mock(args: &MockArgs, cancel: &Cancellation) -> Result<()> {
    let interval = Duration::try_from_secs_f64(args.interval)
        .with_context(|| format!("invalid interval `{}`", args.interval))?;

    log!("mock"; "writing random entries every {:?} to:", interval);
    for file in &args.files {
        eprintln!("- {}", file.display());
    }

    crate::mock::write_logfiles(&args.files, interval, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_interval_rejected() {
        let args = MockArgs {
            files: vec!["a.log".into()],
            interval: -1.0,
            common: Default::default(),
        };
        assert!(run_mock(&args, &Cancellation::new()).is_err());
    }
}
