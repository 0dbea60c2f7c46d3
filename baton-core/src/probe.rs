/*!
Capability probe: can this program re-invoke itself?

The probing side runs the original command line with the sentinel argument
appended and expects the sentinel answer back on stdout, byte for byte. The
probed side recognizes the sentinel, prints the answer and stops before any
normal work.
*/

use std::io::{self, Write};

use tracing::{debug, error};

use crate::config::ProbeConfig;
use crate::launcher::ProcessLauncher;
use crate::{BatonError, Result};

/// Whether `invocation` (program followed by arguments) carries the probe sentinel
pub fn is_probe_invocation(invocation: &[String], probe: &ProbeConfig) -> bool {
    invocation.iter().skip(1).any(|arg| *arg == probe.key)
}

/// Write the probe answer to `out`
pub fn answer<W: Write>(probe: &ProbeConfig, out: &mut W) -> io::Result<()> {
    out.write_all(probe.answer.as_bytes())?;
    out.flush()
}

/// Answer the probe on stdout if `invocation` is a probe
///
/// Returns `true` if the probe was answered; the caller must then stop
/// without touching any state. Binaries whose argument parser would reject
/// the sentinel should call this before parsing.
pub fn respond_if_probed(invocation: &[String], probe: &ProbeConfig) -> Result<bool> {
    if !is_probe_invocation(invocation, probe) {
        return Ok(false);
    }

    answer(probe, &mut io::stdout().lock())?;
    Ok(true)
}

/// Verify that `launcher` can re-invoke `invocation`
///
/// # Errors
/// [`BatonError::RestartCapabilityUnavailable`] if the subordinate's output
/// differs from the expected answer or it could not be run at all
pub fn verify<L>(probe: &ProbeConfig, launcher: &L, invocation: &[String]) -> Result<()>
where
    L: ProcessLauncher + ?Sized,
{
    let mut argv = invocation.to_vec();
    argv.push(probe.key.clone());

    let actual = launcher
        .run_capture(&argv)
        .unwrap_or_else(|e| format!("<launch failed: {e}>"));

    if actual == probe.answer {
        debug!(argv = ?argv, "Restart capability verified");
        Ok(())
    } else {
        error!(expected = %probe.answer, actual = %actual, "Restart capability probe failed");
        Err(BatonError::RestartCapabilityUnavailable {
            expected: probe.answer.clone(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingLauncher;

    fn invocation(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sentinel_anywhere_in_arguments() {
        let probe = ProbeConfig::default();

        assert!(is_probe_invocation(
            &invocation(&["job", "--fast", "baton_check_exec", "input.csv"]),
            &probe
        ));
        assert!(!is_probe_invocation(&invocation(&["job", "input.csv"]), &probe));
    }

    #[test]
    fn test_program_name_is_not_an_argument() {
        let probe = ProbeConfig::default();

        assert!(!is_probe_invocation(&invocation(&["baton_check_exec"]), &probe));
    }

    #[test]
    fn test_answer_is_exact() {
        let probe = ProbeConfig::default();
        let mut out = Vec::new();

        answer(&probe, &mut out).unwrap();

        assert_eq!(out, b"baton_check_exec_ok");
    }

    #[test]
    fn test_verify_appends_sentinel_to_original_invocation() {
        let probe = ProbeConfig::default();
        let launcher = RecordingLauncher::answering("baton_check_exec_ok");

        verify(&probe, &launcher, &invocation(&["job", "--items", "10"])).unwrap();

        assert_eq!(
            launcher.captured(),
            vec![invocation(&["job", "--items", "10", "baton_check_exec"])]
        );
        assert!(launcher.spawned().is_empty());
    }

    #[test]
    fn test_verify_rejects_mismatched_output() {
        let probe = ProbeConfig::default();

        for output in ["", "baton_check_exec_ok\n", "usage: job [OPTIONS]"] {
            let launcher = RecordingLauncher::answering(output);
            let result = verify(&probe, &launcher, &invocation(&["job"]));

            match result {
                Err(BatonError::RestartCapabilityUnavailable { expected, actual }) => {
                    assert_eq!(expected, "baton_check_exec_ok");
                    assert_eq!(actual, output);
                }
                other => panic!("expected capability error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_verify_treats_launch_failure_as_unavailable() {
        let probe = ProbeConfig::default();
        let launcher = RecordingLauncher::failing();

        let result = verify(&probe, &launcher, &invocation(&["job"]));

        assert!(matches!(
            result,
            Err(BatonError::RestartCapabilityUnavailable { .. })
        ));
    }
}
