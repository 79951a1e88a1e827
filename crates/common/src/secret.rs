//! Redaction helpers for client secrets and OAuth tokens

use std::fmt;
use zeroize::Zeroize;

/// Longest prefix `mask_token` will reveal.
const MASK_PREFIX_CHARS: usize = 8;

/// Sensitive value (client secret, refresh token) - redacted in Debug/Display
/// and zeroed on drop.
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Borrow the inner value. Only call this at the point the value goes on
    /// the wire.
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// True when the wrapped string is empty or only whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<String> for Secret<String> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

/// Render a token for logs: a short prefix plus its length.
///
/// The prefix never exceeds a quarter of the token, so short tokens reveal
/// little or nothing.
pub fn mask_token(token: &str) -> String {
    let len = token.chars().count();
    let shown = (len / 4).min(MASK_PREFIX_CHARS);
    let prefix: String = token.chars().take(shown).collect();
    format!("{prefix}...(len={len})")
}
