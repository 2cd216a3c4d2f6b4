//! Master passphrase policy.
//!
//! Baseline rules, applied in order:
//! 1. at least [`MIN_LENGTH`] characters;
//! 2. not a well-known weak password;
//! 3. not a single repeated character;
//! 4. no monotonic run of five or more characters (`abcde`, `54321`) and no
//!    keyboard walk (`qwerty`, `asdf`, ...);
//! 5. at least three of: lowercase, uppercase, digit, symbol.
//!
//! A [`StrengthEstimator`] may replace rules 2-5 with its own verdict; the
//! length rule always applies.

use crate::error::{Result, VaultError};

/// Minimum passphrase length in characters.
pub const MIN_LENGTH: usize = 12;

const MIN_CHAR_CLASSES: usize = 3;
const MIN_SEQUENCE_RUN: usize = 5;

const COMMON_WEAK: &[&str] = &[
    "123456",
    "123456789",
    "12345",
    "1234",
    "password",
    "passwort",
    "111111",
    "123123",
    "iloveyou",
    "admin",
    "welcome",
    "letmein",
    "monkey",
    "dragon",
    "abc123",
    "1q2w3e4r",
    "000000",
    "asdfgh",
    "chatvault",
    "passwordpassword",
    "password1234",
    "administrator",
];

const KEYBOARD_WALKS: &[&str] = &[
    "qwerty", "qwer", "qwert", "qwertz", "asdf", "asdfg", "asdfgh", "zxcv", "azerty", "yxcv",
    "yxcvb", "yxcvbn",
];

/// A pluggable strength estimator (e.g. a zxcvbn-style scorer).
pub trait StrengthEstimator {
    /// Return `Ok(())` to accept, or a human-readable reason to reject.
    fn assess(&self, passphrase: &str) -> std::result::Result<(), String>;
}

/// Check a passphrase against the baseline policy.
pub fn validate_passphrase(passphrase: &str) -> Result<()> {
    validate_passphrase_with(passphrase, None)
}

/// Check a passphrase, letting `estimator` override the heuristic rules.
pub fn validate_passphrase_with(
    passphrase: &str,
    estimator: Option<&dyn StrengthEstimator>,
) -> Result<()> {
    if passphrase.chars().count() < MIN_LENGTH {
        return Err(weak(format!("shorter than {MIN_LENGTH} characters")));
    }

    if let Some(estimator) = estimator {
        return estimator.assess(passphrase).map_err(weak);
    }

    let folded = passphrase.to_lowercase();
    if COMMON_WEAK.contains(&folded.as_str()) {
        return Err(weak("a well-known weak password".into()));
    }

    let mut chars = passphrase.chars();
    if let Some(first) = chars.next() {
        if chars.all(|c| c == first) {
            return Err(weak("all characters are identical".into()));
        }
    }

    if looks_sequential(&folded) || KEYBOARD_WALKS.iter().any(|walk| folded.contains(walk)) {
        return Err(weak("contains a simple sequence or keyboard walk".into()));
    }

    if char_classes(passphrase) < MIN_CHAR_CLASSES {
        return Err(weak(
            "use at least 3 of: lowercase, uppercase, digits, symbols".into(),
        ));
    }

    Ok(())
}

fn weak(reason: String) -> VaultError {
    VaultError::WeakPassphrase(reason)
}

fn char_classes(s: &str) -> usize {
    let lower = s.chars().any(char::is_lowercase);
    let upper = s.chars().any(char::is_uppercase);
    let digit = s.chars().any(char::is_numeric);
    let symbol = s.chars().any(|c| !c.is_alphanumeric());
    [lower, upper, digit, symbol].into_iter().filter(|&b| b).count()
}

/// A strictly ascending or descending run of `MIN_SEQUENCE_RUN` code points.
fn looks_sequential(s: &str) -> bool {
    let codes: Vec<i64> = s.chars().map(|c| c as i64).collect();
    if codes.len() < MIN_SEQUENCE_RUN {
        return false;
    }
    [1i64, -1].into_iter().any(|step| {
        let mut run = 1;
        codes.windows(2).any(|w| {
            if w[1] - w[0] == step {
                run += 1;
            } else {
                run = 1;
            }
            run >= MIN_SEQUENCE_RUN
        })
    })
}
