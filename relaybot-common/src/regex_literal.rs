//! Parsing of user- and database-supplied regular expressions.
//!
//! Patterns may be written bare (`foo.*bar`) or as a slash literal with
//! trailing flags (`/foo.*bar/i`). Flags understood: `i`, `m`, `s`, `x`.
//! `g`, `u`, `y` and `d` are accepted for compatibility and have no effect.

use regex::{Regex, RegexBuilder};
use crate::Error;

const KNOWN_FLAGS: &str = "gimsuyxd";

/// Compilation knobs.
#[derive(Debug, Clone, Copy)]
pub struct RegexOptions {
    /// Rewrite case-insensitive patterns into explicit character classes and
    /// compile them under a bounded program size.
    pub linear: bool,
    /// Upper bound on the compiled program size in linear mode, in bytes.
    pub size_limit: usize,
}

impl Default for RegexOptions {
    fn default() -> Self {
        Self {
            linear: false,
            size_limit: 1 << 20,
        }
    }
}

/// Splits `/pattern/flags` into its parts; anything else is a bare pattern.
pub fn split_literal(input: &str) -> (&str, &str) {
    if input.len() >= 2 && input.starts_with('/') {
        if let Some(end) = input.rfind('/') {
            if end > 0 {
                let flags = &input[end + 1..];
                if flags.chars().all(|c| KNOWN_FLAGS.contains(c)) {
                    return (&input[1..end], flags);
                }
            }
        }
    }
    (input, "")
}

pub fn compile(input: &str, options: &RegexOptions) -> Result<Regex, Error> {
    let (pattern, flags) = split_literal(input);
    compile_with_flags(pattern, flags, options)
}

pub fn compile_with_flags(pattern: &str, flags: &str, options: &RegexOptions) -> Result<Regex, Error> {
    let case_insensitive = flags.contains('i');

    let built = if options.linear {
        let source = if case_insensitive {
            expand_case_classes(pattern)
        } else {
            pattern.to_string()
        };
        RegexBuilder::new(&source)
            .case_insensitive(false)
            .multi_line(flags.contains('m'))
            .dot_matches_new_line(flags.contains('s'))
            .ignore_whitespace(flags.contains('x'))
            .size_limit(options.size_limit)
            .dfa_size_limit(options.size_limit)
            .build()
    } else {
        RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .multi_line(flags.contains('m'))
            .dot_matches_new_line(flags.contains('s'))
            .ignore_whitespace(flags.contains('x'))
            .build()
    };

    built.map_err(|e| Error::Parse(format!("Invalid regular expression /{}/{}: {}", pattern, flags, e)))
}

/// Turns every cased letter outside of escapes and group headers into an
/// explicit class, e.g. `ab\d` becomes `[aA][bB]\d`. Letters inside an
/// existing class get their other case appended in place.
pub fn expand_case_classes(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 4);
    let mut in_class = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                out.push(c);
                if let Some(&next) = chars.get(i + 1) {
                    out.push(next);
                    i += 1;
                    // \p{Greek}, \x{1F600} and friends carry letters that must stay as-is
                    if matches!(next, 'p' | 'P' | 'x' | 'u') && chars.get(i + 1) == Some(&'{') {
                        while i + 1 < chars.len() {
                            i += 1;
                            out.push(chars[i]);
                            if chars[i] == '}' {
                                break;
                            }
                        }
                    }
                }
            }
            '[' if !in_class => {
                in_class = true;
                out.push(c);
                if chars.get(i + 1) == Some(&'^') {
                    out.push('^');
                    i += 1;
                }
                if chars.get(i + 1) == Some(&']') {
                    out.push(']');
                    i += 1;
                }
            }
            ']' if in_class => {
                in_class = false;
                out.push(c);
            }
            '(' if !in_class && chars.get(i + 1) == Some(&'?') => {
                out.push(c);
                while i + 1 < chars.len() {
                    i += 1;
                    out.push(chars[i]);
                    if matches!(chars[i], ':' | ')' | '>') {
                        break;
                    }
                }
            }
            c if in_class
                && c.is_alphabetic()
                && chars.get(i + 1) == Some(&'-')
                && chars.get(i + 2).is_some_and(|e| e.is_alphabetic()) =>
            {
                let end = chars[i + 2];
                out.push(c);
                out.push('-');
                out.push(end);
                if let (Some(lo), Some(hi)) = (swap_case(c), swap_case(end)) {
                    out.push(lo);
                    out.push('-');
                    out.push(hi);
                }
                i += 2;
            }
            c if c.is_alphabetic() => {
                let lower: Vec<char> = c.to_lowercase().collect();
                let upper: Vec<char> = c.to_uppercase().collect();
                if lower.len() == 1 && upper.len() == 1 && lower[0] != upper[0] {
                    if in_class {
                        out.push(lower[0]);
                        out.push(upper[0]);
                    } else {
                        out.push('[');
                        out.push(lower[0]);
                        out.push(upper[0]);
                        out.push(']');
                    }
                } else {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
        i += 1;
    }

    out
}

fn swap_case(c: char) -> Option<char> {
    let swapped: Vec<char> = if c.is_lowercase() {
        c.to_uppercase().collect()
    } else {
        c.to_lowercase().collect()
    };
    match swapped.as_slice() {
        [s] if *s != c => Some(*s),
        _ => None,
    }
}
