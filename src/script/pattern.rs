//! Backtracking cost guard for the Lua pattern functions.
//!
//! `string.find`, `match`, `gmatch` and `gsub` run their matcher in C, where
//! the instruction hook never fires. A call is refused up front when its
//! worst-case backtracking estimate exceeds [`MAX_COST_BITS`].
//!
//! The estimate looks for runs of quantified items that can match the same
//! characters. Each such item multiplies the work by up to the subject
//! length, and so does every start position of an unanchored search. Runs
//! of one item are never refused.

use mlua::{Result as LuaResult, Value, Variadic};

/// Largest accepted estimate, as a base-2 logarithm of matcher steps.
const MAX_COST_BITS: f64 = 30.0;

/// Length assumed for a number passed where a string is expected.
const NUMBER_TEXT_LEN: usize = 32;

type CharSet = [bool; 256];

/// Which of the guarded functions is being called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PatternFn {
    Find,
    Match,
    Gmatch,
    Gsub,
}

impl PatternFn {
    pub(crate) const ALL: [PatternFn; 4] = [
        PatternFn::Find,
        PatternFn::Match,
        PatternFn::Gmatch,
        PatternFn::Gsub,
    ];

    /// Key in the `string` library.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            PatternFn::Find => "find",
            PatternFn::Match => "match",
            PatternFn::Gmatch => "gmatch",
            PatternFn::Gsub => "gsub",
        }
    }

    /// `gmatch` ignores a leading `^`.
    fn honors_anchor(&self) -> bool {
        !matches!(self, PatternFn::Gmatch)
    }
}

/// Refuse a call whose pattern could backtrack past the budget.
///
/// `args` are the call arguments after the subject and pattern.
pub(crate) fn check_call(
    function: PatternFn,
    subject: &Value,
    pattern: &Value,
    args: &Variadic<Value>,
) -> LuaResult<()> {
    // find(s, pattern, init, plain) with plain set does no matching.
    if function == PatternFn::Find && args.get(1).is_some_and(is_truthy) {
        return Ok(());
    }

    let subject_len = match subject {
        Value::String(s) => s.as_bytes().len(),
        Value::Integer(_) | Value::Number(_) => NUMBER_TEXT_LEN,
        _ => return Ok(()),
    };
    let Value::String(pattern) = pattern else {
        return Ok(());
    };

    let bits = cost_bits(&pattern.as_bytes(), subject_len, function.honors_anchor());
    if bits > MAX_COST_BITS {
        return Err(mlua::Error::RuntimeError(format!(
            "string.{}: pattern too complex for a {}-byte subject",
            function.name(),
            subject_len
        )));
    }
    Ok(())
}

fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Nil | Value::Boolean(false))
}

/// Worst-case matcher steps for `pattern` over `subject_len` bytes, in bits.
pub(crate) fn cost_bits(pattern: &[u8], subject_len: usize, honors_anchor: bool) -> f64 {
    let anchored = honors_anchor && pattern.first() == Some(&b'^');
    let run = longest_run(pattern, anchored);
    if run < 2 {
        return 0.0;
    }

    let factor = if anchored { run } else { run + 1 };
    (subject_len as f64 + 1.0).log2() * factor as f64
}

/// Longest chain of quantified items whose character sets overlap.
fn longest_run(pattern: &[u8], anchored: bool) -> usize {
    let mut run = 0;
    let mut longest = 0;
    let mut union: CharSet = [false; 256];
    let mut prev_may_be_empty = false;

    let mut i = usize::from(anchored);
    while i < pattern.len() {
        match pattern[i] {
            b'(' | b')' => {
                i += 1;
                continue;
            }
            b'$' if i + 1 == pattern.len() => break,
            b'%' if pattern.get(i + 1) == Some(&b'b') => {
                // Balanced match: scans forward without backtracking.
                run = 0;
                union = [false; 256];
                prev_may_be_empty = false;
                i += 4;
                continue;
            }
            b'%' if pattern.get(i + 1) == Some(&b'f') => {
                // Frontier: zero-width.
                i = class_end(pattern, i + 2);
                continue;
            }
            b'%' if pattern.get(i + 1).is_some_and(u8::is_ascii_digit) => {
                run = 0;
                union = [false; 256];
                prev_may_be_empty = false;
                i += 2;
                continue;
            }
            _ => {}
        }

        let end = class_end(pattern, i);
        let set = class_set(&pattern[i..end]);
        let quantifier = pattern.get(end).copied();

        match quantifier {
            Some(b'*' | b'+' | b'-' | b'?') => {
                if run > 0 && overlaps(&union, &set) {
                    run += 1;
                    merge(&mut union, &set);
                } else if run > 0 && prev_may_be_empty {
                    merge(&mut union, &set);
                } else {
                    run = 1;
                    union = set;
                }
                prev_may_be_empty = quantifier != Some(b'+');
                longest = longest.max(run);
                i = end + 1;
            }
            _ => {
                if run > 0 && !overlaps(&union, &set) {
                    run = 0;
                    union = [false; 256];
                }
                prev_may_be_empty = false;
                i = end;
            }
        }
    }

    longest
}

/// Index just past the single-character class starting at `start`.
fn class_end(pattern: &[u8], start: usize) -> usize {
    let mut i = start;
    match pattern.get(i) {
        None => start,
        Some(b'%') => (i + 2).min(pattern.len()),
        Some(b'[') => {
            i += 1;
            if pattern.get(i) == Some(&b'^') {
                i += 1;
            }
            // The first character of a set is literal, even a `]`.
            loop {
                match pattern.get(i) {
                    None => return pattern.len(),
                    Some(b'%') => i += 2,
                    Some(_) => i += 1,
                }
                if pattern.get(i) == Some(&b']') {
                    return i + 1;
                }
            }
        }
        Some(_) => i + 1,
    }
}

/// Bytes matched by one single-character class.
fn class_set(class: &[u8]) -> CharSet {
    let mut set = [false; 256];
    match class {
        [b'.'] => set = [true; 256],
        [b'%', letter] => {
            for c in 0..=255u8 {
                set[c as usize] = matches_class(c, *letter);
            }
        }
        [b'[', body @ ..] => {
            let body = body.strip_suffix(b"]").unwrap_or(body);
            let (negate, body) = match body.split_first() {
                Some((b'^', rest)) => (true, rest),
                _ => (false, body),
            };
            for c in 0..=255u8 {
                set[c as usize] = matches_set(c, body) != negate;
            }
        }
        [literal, ..] => set[*literal as usize] = true,
        [] => {}
    }
    set
}

fn matches_set(c: u8, body: &[u8]) -> bool {
    let mut i = 0;
    while i < body.len() {
        if body[i] == b'%' && i + 1 < body.len() {
            if matches_class(c, body[i + 1]) {
                return true;
            }
            i += 2;
        } else if body.get(i + 1) == Some(&b'-') && i + 2 < body.len() {
            if (body[i]..=body[i + 2]).contains(&c) {
                return true;
            }
            i += 3;
        } else {
            if body[i] == c {
                return true;
            }
            i += 1;
        }
    }
    false
}

/// Lua's `%x` classes in the C locale.
fn matches_class(c: u8, letter: u8) -> bool {
    let matched = match letter.to_ascii_lowercase() {
        b'a' => c.is_ascii_alphabetic(),
        b'c' => c.is_ascii_control(),
        b'd' => c.is_ascii_digit(),
        b'g' => c.is_ascii_graphic(),
        b'l' => c.is_ascii_lowercase(),
        b'p' => c.is_ascii_punctuation(),
        b's' => matches!(c, b' ' | b'\t'..=b'\r'),
        b'u' => c.is_ascii_uppercase(),
        b'w' => c.is_ascii_alphanumeric(),
        b'x' => c.is_ascii_hexdigit(),
        _ => return c == letter,
    };
    if letter.is_ascii_uppercase() {
        !matched
    } else {
        matched
    }
}

fn overlaps(a: &CharSet, b: &CharSet) -> bool {
    a.iter().zip(b).any(|(x, y)| *x && *y)
}

fn merge(into: &mut CharSet, other: &CharSet) {
    for (slot, add) in into.iter_mut().zip(other) {
        *slot |= *add;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_of(pattern: &str) -> usize {
        longest_run(pattern.as_bytes(), pattern.starts_with('^'))
    }

    #[test]
    fn test_overlapping_quantifiers_form_a_run() {
        assert_eq!(run_of(&"a*".repeat(40)), 40);
        assert_eq!(run_of(".*.*x"), 2);
        assert_eq!(run_of("a?a?a?aaa"), 3);
    }

    #[test]
    fn test_disjoint_quantifiers_do_not_compound() {
        assert_eq!(run_of(r#""id":%s*(%d+)"#), 1);
        assert_eq!(run_of("^(%w+)%s*=%s*(%w+)$"), 1);
        assert_eq!(run_of("[%a_][%w_]*"), 1);
        assert_eq!(run_of("%s+"), 1);
        assert_eq!(run_of("hello"), 0);
    }

    #[test]
    fn test_optional_items_are_transparent() {
        // b* may match nothing, so the a* items still chain.
        assert_eq!(run_of("a*b*a*b*a*c"), 4);
    }

    #[test]
    fn test_balanced_and_backreference_break_runs() {
        assert_eq!(run_of("a*%b()a*"), 1);
        assert_eq!(run_of("(a*)%1a*"), 1);
    }

    #[test]
    fn test_class_sets() {
        let digits = class_set(b"%d");
        assert!(digits[b'7' as usize]);
        assert!(!digits[b'a' as usize]);

        let not_space = class_set(b"%S");
        assert!(!not_space[b' ' as usize]);
        assert!(not_space[b'x' as usize]);

        let range = class_set(b"[a-c_]");
        assert!(range[b'b' as usize]);
        assert!(range[b'_' as usize]);
        assert!(!range[b'd' as usize]);

        let negated = class_set(b"[^%d]");
        assert!(!negated[b'1' as usize]);
        assert!(negated[b'z' as usize]);

        let escaped = class_set(b"%.");
        assert!(escaped[b'.' as usize]);
        assert!(!escaped[b'a' as usize]);
    }

    #[test]
    fn test_class_end_handles_sets() {
        assert_eq!(class_end(b"[]]x", 0), 3);
        assert_eq!(class_end(b"[^]]x", 0), 4);
        assert_eq!(class_end(b"[%]]x", 0), 4);
        assert_eq!(class_end(b"%ax", 0), 2);
        assert_eq!(class_end(b"[abc", 0), 4);
    }

    #[test]
    fn test_cost_bounds() {
        let catastrophic = format!("{}b", "a*".repeat(40));
        assert!(cost_bits(catastrophic.as_bytes(), 40, true) > MAX_COST_BITS);
        assert!(cost_bits(b"a*a*b", 10, true) <= MAX_COST_BITS);
        assert!(cost_bits(b"%s+", 1 << 20, true) == 0.0);
        assert!(cost_bits(b".*(%d+)", 1000, true) <= MAX_COST_BITS);
    }

    #[test]
    fn test_anchor_lowers_cost() {
        let anchored = cost_bits(b"^a*a*", 1000, true);
        let unanchored = cost_bits(b"a*a*", 1000, true);
        assert!(anchored < unanchored);
        assert_eq!(cost_bits(b"^a*a*", 1000, false), unanchored);
    }
}
