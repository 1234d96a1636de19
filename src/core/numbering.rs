//! Hierarchical position numbers.
//!
//! Numbers are dot-separated two-digit segments (`"99.10.01"`), optionally
//! followed by a follow-up letter (`"99.10.01A"`). Incrementing bumps the
//! letter first and only touches the digits when the letter rolls over.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LetterIncrement {
    pub next_char: char,
    pub carry: bool,
}

/// `A -> B`, ..., `Y -> Z`, `Z -> A` with carry. Lowercase works the same;
/// anything else comes back unchanged without carry.
pub fn increment_letter(c: char) -> LetterIncrement {
    match c {
        'Z' => LetterIncrement { next_char: 'A', carry: true },
        'z' => LetterIncrement { next_char: 'a', carry: true },
        'A'..='Y' | 'a'..='y' => LetterIncrement {
            next_char: (c as u8 + 1) as char,
            carry: false,
        },
        _ => LetterIncrement { next_char: c, carry: false },
    }
}

/// Digit string plus one, `None` when every digit is `9` (or there are none).
fn increment_digits(digits: &str) -> Option<String> {
    let mut bytes = digits.as_bytes().to_vec();
    for b in bytes.iter_mut().rev() {
        if *b == b'9' {
            *b = b'0';
        } else {
            *b += 1;
            return String::from_utf8(bytes).ok();
        }
    }
    None
}

fn leading_digits(part: &str) -> &str {
    let part = part.trim();
    let end = part.find(|c: char| !c.is_ascii_digit()).unwrap_or(part.len());
    &part[..end]
}

/// Adds one to the rightmost segment when `carry` is set and propagates
/// overflow leftwards.
///
/// Segments are counted as digit strings, so they keep their width and never
/// overflow an integer type: `"09"` becomes `"10"`, `"99"` wraps to `"00"` and
/// carries, `"999"` wraps to `"000"`. A one-digit segment grows instead of
/// wrapping. A carry past the leftmost segment prepends a new `"1"` segment.
pub fn propagate_numeric_carry(parts: &[&str], carry: bool) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(parts.len() + 1);
    let mut carry = carry;

    for part in parts.iter().rev() {
        let digits = leading_digits(part);
        if !carry {
            out.push(if digits.is_empty() { "0".to_string() } else { digits.to_string() });
            continue;
        }
        match increment_digits(digits) {
            Some(next) => {
                out.push(next);
                carry = false;
            }
            None if digits.is_empty() => {
                out.push("1".to_string());
                carry = false;
            }
            None if digits.len() == 1 => {
                out.push("10".to_string());
                carry = false;
            }
            None => out.push("0".repeat(digits.len())),
        }
    }

    if carry {
        out.push("1".to_string());
    }
    out.reverse();
    out
}

/// Next number after `current_nr`.
///
/// `"99.10.01A" -> "99.10.01B"`, `"99.10.01Z" -> "99.10.02"`,
/// `"99.10.09" -> "99.10.10"`, `"01.99" -> "02.00"`, `"" -> "1"`.
pub fn generate_next_nr(current_nr: &str) -> String {
    let current = current_nr.trim();
    if current.is_empty() {
        return "1".to_string();
    }

    let numeric = current.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    let letters = &current[numeric.len()..];

    if let Some(last) = letters.chars().last() {
        let step = increment_letter(last);
        if !step.carry {
            let head = &letters[..letters.len() - 1];
            return format!("{numeric}{head}{}", step.next_char);
        }
    }

    let numeric = numeric.trim_end_matches('.');
    if numeric.is_empty() {
        return "1".to_string();
    }
    let parts: Vec<&str> = numeric.split('.').collect();
    propagate_numeric_carry(&parts, true).join(".")
}

/// Integer value of the leading digits, `"03A" -> 3`, `"A" -> None`.
pub fn leading_number(s: &str) -> Option<u32> {
    let digits: String = s.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Zero-padded two-digit rendering used for LG/ULG/Grundtext numbers.
pub fn pad_two(n: u32) -> String {
    format!("{n:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_cycle() {
        assert_eq!(increment_letter('B'), LetterIncrement { next_char: 'C', carry: false });
        assert_eq!(increment_letter('Z'), LetterIncrement { next_char: 'A', carry: true });
        assert_eq!(increment_letter('y'), LetterIncrement { next_char: 'z', carry: false });
        assert_eq!(increment_letter('z'), LetterIncrement { next_char: 'a', carry: true });
        assert_eq!(increment_letter('7'), LetterIncrement { next_char: '7', carry: false });
    }

    #[test]
    fn next_nr_digits() {
        assert_eq!(generate_next_nr("09"), "10");
        assert_eq!(generate_next_nr("99.10.09"), "99.10.10");
        assert_eq!(generate_next_nr("01.99"), "02.00");
        assert_eq!(generate_next_nr("01.99.99"), "02.00.00");
        assert_eq!(generate_next_nr("5"), "6");
    }

    #[test]
    fn carry_past_leftmost_prepends_segment() {
        assert_eq!(generate_next_nr("99"), "1.00");
        assert_eq!(generate_next_nr("99.99"), "1.00.00");
    }

    #[test]
    fn next_nr_letters() {
        assert_eq!(generate_next_nr("99.10.01A"), "99.10.01B");
        assert_eq!(generate_next_nr("99.10.01Z"), "99.10.02");
        assert_eq!(generate_next_nr("A"), "B");
        assert_eq!(generate_next_nr("01a"), "01b");
    }

    #[test]
    fn empty_input() {
        assert_eq!(generate_next_nr(""), "1");
        assert_eq!(generate_next_nr("   "), "1");
    }

    #[test]
    fn wider_segments_keep_their_width() {
        assert_eq!(propagate_numeric_carry(&["001"], true), vec!["002"]);
        assert_eq!(propagate_numeric_carry(&["01", "999"], true), vec!["02", "000"]);
        assert_eq!(propagate_numeric_carry(&["01", "07"], false), vec!["01", "07"]);
    }

    #[test]
    fn long_segments_do_not_overflow() {
        assert_eq!(generate_next_nr("4294967295"), "4294967296");
        assert_eq!(generate_next_nr("99999999999"), "1.00000000000");
        assert_eq!(generate_next_nr("01.18446744073709551615"), "01.18446744073709551616");
        assert_eq!(generate_next_nr("9"), "10");
    }

    #[test]
    fn leading_number_is_permissive() {
        assert_eq!(leading_number("03A"), Some(3));
        assert_eq!(leading_number("01"), Some(1));
        assert_eq!(leading_number("A"), None);
    }
}
