// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 the ain-vm developers

//! Character-oriented string helpers.
//!
//! VM strings are owned UTF-8 buffers, but the language counts and
//! indexes *characters*, not bytes: a multi-byte character is one unit
//! for length, indexing, push/pop and erase. Only `S_LENGTHBYTE` looks at
//! bytes.

#[cfg(test)]
mod strings_test;

/// Character count.
#[must_use]
pub fn count_chars(s: &str) -> i32 {
    s.chars().count() as i32
}

/// Character at index `i` as a codepoint, or 0 when out of range.
#[must_use]
pub fn get_char(s: &str, i: i32) -> i32 {
    if i < 0 {
        return 0;
    }
    s.chars().nth(i as usize).map_or(0, |c| c as i32)
}

/// Overwrite the character at index `i`. Out-of-range indices and
/// invalid codepoints are ignored.
pub fn set_char(s: &mut String, i: i32, c: i32) {
    if i < 0 {
        return;
    }
    let Some(c) = u32::try_from(c).ok().and_then(char::from_u32) else {
        return;
    };
    let mut chars: Vec<char> = s.chars().collect();
    let Some(target) = chars.get_mut(i as usize) else {
        return;
    };
    *target = c;
    *s = chars.into_iter().collect();
}

/// Append one character. Invalid codepoints are ignored.
pub fn push_back_char(s: &mut String, c: i32) {
    if let Some(c) = u32::try_from(c).ok().and_then(char::from_u32) {
        s.push(c);
    }
}

/// Drop the last character.
pub fn pop_back_char(s: &mut String) {
    s.pop();
}

/// Erase the character at index `i`. Out-of-range indices are ignored.
pub fn erase_char(s: &mut String, i: i32) {
    if i < 0 {
        return;
    }
    if let Some((at, c)) = s.char_indices().nth(i as usize) {
        s.drain(at..at + c.len_utf8());
    }
}

/// Character index of the first occurrence of `needle`, or -1.
#[must_use]
pub fn find(haystack: &str, needle: &str) -> i32 {
    match haystack.find(needle) {
        Some(byte) => haystack[..byte].chars().count() as i32,
        None => -1,
    }
}

/// Substring of `len` characters starting at character `index`, clamped
/// to the string.
#[must_use]
pub fn copy_part(s: &str, index: i32, len: i32) -> String {
    if index < 0 || len <= 0 {
        return String::new();
    }
    s.chars().skip(index as usize).take(len as usize).collect()
}

/// Leading-integer parse: optional whitespace, optional sign, digits.
/// Anything else (including empty input) parses as 0; overflow saturates.
#[must_use]
pub fn to_integer(s: &str) -> i32 {
    let s = s.trim_start();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let mut n: i64 = 0;
    for c in digits.chars() {
        let Some(d) = c.to_digit(10) else { break };
        n = (n * 10 + i64::from(d)).min(i64::from(i32::MAX) + 1);
    }
    if negative { -n } else { n }.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Map ASCII digits and numeric punctuation to their full-width forms.
#[must_use]
pub fn to_fullwidth(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '0'..='9' => char::from_u32('０' as u32 + (c as u32 - '0' as u32)).unwrap_or(c),
            '-' => '－',
            '+' => '＋',
            '.' => '．',
            ' ' => '　',
            other => other,
        })
        .collect()
}

/// Render an integer with the given field width and padding.
#[must_use]
pub fn int_to_string(v: i32, padding: usize, zero_pad: bool, fullwidth: bool) -> String {
    let s = if zero_pad {
        format!("{v:0padding$}")
    } else {
        format!("{v:padding$}")
    };
    if fullwidth { to_fullwidth(&s) } else { s }
}

/// Render a float with the given field width, padding and precision.
#[must_use]
pub fn float_to_string(
    v: f32,
    padding: usize,
    zero_pad: bool,
    precision: usize,
    fullwidth: bool,
) -> String {
    let s = if zero_pad {
        format!("{v:0padding$.precision$}")
    } else {
        format!("{v:padding$.precision$}")
    };
    if fullwidth { to_fullwidth(&s) } else { s }
}
