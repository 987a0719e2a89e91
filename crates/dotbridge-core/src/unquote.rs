//! Cleanup of debugger-evaluator string formatting.
//!
//! When a debugger evaluates an in-process expression that yields a string,
//! it prints the value the way a source literal would look: wrapped in one
//! layer of `"` quotes, with newlines as `\n` and interior quotes as `\"`.
//! The relay wants the raw payload, so that layer has to come back off
//! before the text goes on the wire.

/// Strip one enclosing layer of `"` quotes and un-escape `\n`, `\"` and
/// `\\` sequences.
///
/// Input that is not wrapped in quotes is assumed to be raw already and is
/// returned unchanged (surrounding whitespace included). An unknown escape
/// sequence inside a quoted value is kept verbatim, backslash and all.
#[must_use]
pub fn clean_evaluator_output(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(inner) = trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return raw.to_owned();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            // Trailing lone backslash: keep it.
            None => out.push('\\'),
        }
    }
    out
}
