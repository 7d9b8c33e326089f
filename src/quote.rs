//! Shell-style rendering of command lines for diagnostics.

use std::fmt;

use crate::argv::ArgVec;

/// Characters that make a word need quoting when pasted into a shell.
const SHELL_SPECIAL: &[char] = &[
    ' ', '\t', '\n', '!', '"', '#', '$', '&', '\'', '(', ')', '*', ',', ';', '<', '=', '>',
    '?', '[', '\\', ']', '^', '`', '{', '|', '}', '~',
];

/// Quotes one word so a POSIX shell reads it back unchanged.
pub fn quote(word: &str) -> String {
    if !word.contains(SHELL_SPECIAL) {
        return word.to_string();
    }
    let mut out = String::with_capacity(word.len() + 2);
    out.push('\'');
    for c in word.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

/// Displays an argument vector as a copy-pasteable command line.
pub struct CommandLine<'a>(pub &'a ArgVec);

impl fmt::Display for CommandLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(&quote(&arg.to_string_lossy()))?;
        }
        Ok(())
    }
}
