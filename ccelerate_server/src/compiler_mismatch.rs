#![deny(clippy::unwrap_used)]

//! Mismatch detection between the compiler a request named and the one
//! that actually ran (§7 "Mismatch" error kind). A wrapped invocation
//! resolves its compiler from `$PATH` at call time and the coordinator
//! resolves it again independently when the request is handled, so the
//! two can legitimately disagree (PATH changed, a symlink was repointed,
//! a build finished mid-compile). `hermetic` mode treats that as fatal;
//! otherwise it's a warning gated by `command_check_level`.

use ccelerate_shared::CommandSpec;

use crate::compiler_info::CompilerInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandCheckLevel {
    Version,
    Checksum,
    #[default]
    Off,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MismatchPolicy {
    pub hermetic: bool,
    pub hermetic_fallback: bool,
    pub command_check_level: CommandCheckLevel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MismatchOutcome {
    /// No mismatch, or checking is disabled.
    Match,
    /// Mismatched, but only worth logging.
    Warn(String),
    /// Mismatched in hermetic mode with no fallback: reject the request.
    Reject(String),
    /// Mismatched in hermetic mode with fallback allowed.
    Fallback(String),
}

/// Compares the compiler spec a caller named (`expected`, typically empty
/// fields the client couldn't cheaply determine without invoking the
/// compiler itself) against the one the coordinator actually resolved.
pub fn check(
    policy: MismatchPolicy,
    expected: &CommandSpec,
    actual: &CompilerInfo,
    actual_name: &str,
) -> MismatchOutcome {
    let level = if policy.hermetic {
        CommandCheckLevel::Checksum
    } else {
        policy.command_check_level
    };
    if level == CommandCheckLevel::Off {
        return MismatchOutcome::Match;
    }

    let name_diff = !expected.name.is_empty() && expected.name != actual_name;
    let checksum_diff = level == CommandCheckLevel::Checksum
        && !expected.binary_hash.is_empty()
        && expected.binary_hash != actual.compiler_hash.as_str();
    if !name_diff && !checksum_diff {
        return MismatchOutcome::Match;
    }

    let message = format!(
        "compiler mismatch: expected {} ({}), got {} ({})",
        expected.name, expected.binary_hash, actual_name, actual.compiler_hash
    );
    if policy.hermetic {
        if policy.hermetic_fallback {
            MismatchOutcome::Fallback(message)
        } else {
            MismatchOutcome::Reject(message)
        }
    } else {
        MismatchOutcome::Warn(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_hash::ContentHash;

    fn compiler_info(hash: &str) -> CompilerInfo {
        CompilerInfo {
            real_compiler_path: "/usr/bin/gcc".into(),
            version: "13.2.0".to_string(),
            target: "x86_64-linux-gnu".to_string(),
            system_include_dirs: Vec::new(),
            predefined_macros: Vec::new(),
            compiler_hash: ContentHash::from_hex(hash),
        }
    }

    #[test]
    fn off_never_flags_a_mismatch() {
        let policy = MismatchPolicy {
            command_check_level: CommandCheckLevel::Off,
            ..Default::default()
        };
        let expected = CommandSpec {
            name: "clang".to_string(),
            binary_hash: "deadbeef".to_string(),
            ..Default::default()
        };
        assert_eq!(
            check(policy, &expected, &compiler_info("cafe"), "gcc"),
            MismatchOutcome::Match
        );
    }

    #[test]
    fn checksum_level_warns_on_differing_hash() {
        let policy = MismatchPolicy {
            command_check_level: CommandCheckLevel::Checksum,
            ..Default::default()
        };
        let expected = CommandSpec {
            name: "gcc".to_string(),
            binary_hash: "deadbeef".to_string(),
            ..Default::default()
        };
        let outcome = check(policy, &expected, &compiler_info("cafe"), "gcc");
        assert!(matches!(outcome, MismatchOutcome::Warn(_)));
    }

    #[test]
    fn hermetic_without_fallback_rejects() {
        let policy = MismatchPolicy {
            hermetic: true,
            hermetic_fallback: false,
            ..Default::default()
        };
        let expected = CommandSpec {
            name: "gcc".to_string(),
            binary_hash: "deadbeef".to_string(),
            ..Default::default()
        };
        let outcome = check(policy, &expected, &compiler_info("cafe"), "gcc");
        assert!(matches!(outcome, MismatchOutcome::Reject(_)));
    }

    #[test]
    fn hermetic_with_fallback_falls_back_instead_of_rejecting() {
        let policy = MismatchPolicy {
            hermetic: true,
            hermetic_fallback: true,
            ..Default::default()
        };
        let expected = CommandSpec {
            name: "gcc".to_string(),
            binary_hash: "deadbeef".to_string(),
            ..Default::default()
        };
        let outcome = check(policy, &expected, &compiler_info("cafe"), "gcc");
        assert!(matches!(outcome, MismatchOutcome::Fallback(_)));
    }

    #[test]
    fn matching_hash_is_never_a_mismatch_even_in_hermetic_mode() {
        let policy = MismatchPolicy {
            hermetic: true,
            ..Default::default()
        };
        let expected = CommandSpec {
            name: "gcc".to_string(),
            binary_hash: "cafe".to_string(),
            ..Default::default()
        };
        assert_eq!(
            check(policy, &expected, &compiler_info("cafe"), "gcc"),
            MismatchOutcome::Match
        );
    }
}
