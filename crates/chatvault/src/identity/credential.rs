//! Decrypted credentials and display redaction.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use zeroize::Zeroizing;

/// Secret shapes masked by [`mask_secrets`], with their replacements.
const SECRET_PATTERNS: &[(&str, &str)] = &[
    // Provider API keys: sk-..., sk-live-..., sk-proj-...
    (r"\bsk-[A-Za-z0-9_-]{16,}", "sk-***"),
    // Sealed vault and journal tokens.
    (r"\bA[Q-Za-f][A-Za-z0-9_-]{37,}", "TOKEN-***"),
];

fn secret_patterns() -> &'static [(Regex, &'static str)] {
    static COMPILED: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        SECRET_PATTERNS
            .iter()
            .filter_map(|(pattern, replacement)| {
                Regex::new(pattern).ok().map(|re| (re, *replacement))
            })
            .collect()
    })
}

/// Replace API keys and sealed tokens inside free text, e.g. before it is
/// logged or echoed.
pub fn mask_secrets(text: &str) -> String {
    let mut out = text.to_string();
    for (re, replacement) in secret_patterns() {
        out = re.replace_all(&out, *replacement).into_owned();
    }
    out
}

/// Keep the first `keep` characters of `s` and replace the rest with `…`.
///
/// ```
/// use chatvault::identity::redact;
/// assert_eq!(redact("sk-1234567890abcdef", 4), "sk-1…");
/// assert_eq!(redact("abc", 4), "abc");
/// ```
pub fn redact(s: &str, keep: usize) -> String {
    if s.chars().count() <= keep {
        return s.to_string();
    }
    let mut out: String = s.chars().take(keep).collect();
    out.push('…');
    out
}

/// A decrypted API credential.
///
/// The plaintext is wiped on drop and never shown by `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Zeroizing<String>);

impl Credential {
    pub fn new(secret: String) -> Self {
        Self(Zeroizing::new(secret))
    }

    /// Borrow the plaintext.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    /// Redacted form for display.
    pub fn redacted(&self) -> String {
        redact(self.expose(), 4)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.redacted()).finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}
