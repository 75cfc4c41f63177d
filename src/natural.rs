// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;

/// Case-insensitive alphanumeric ordering: digit runs compare by value, so
/// `file2` sorts before `file10`. Names equal under that rule fall back to a
/// plain comparison to keep the order total.
pub fn compare(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let l_run = take_digits(&mut left);
                let r_run = take_digits(&mut right);
                let ord = compare_digit_runs(&l_run, &r_run);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(l), Some(r)) => {
                left.next();
                right.next();
                let ord = l.to_lowercase().cmp(r.to_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        run.push(c);
        chars.next();
    }
    run
}

fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a_trimmed = a.trim_start_matches('0');
    let b_trimmed = b.trim_start_matches('0');
    a_trimmed
        .len()
        .cmp(&b_trimmed.len())
        .then_with(|| a_trimmed.cmp(b_trimmed))
        .then_with(|| a.len().cmp(&b.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(mut names: Vec<&str>) -> Vec<&str> {
        names.sort_by(|a, b| compare(a, b));
        names
    }

    #[test]
    fn test_numbers_compare_by_value() {
        assert_eq!(
            sorted(vec!["file10.txt", "file2.txt", "file1.txt"]),
            vec!["file1.txt", "file2.txt", "file10.txt"]
        );
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(
            sorted(vec!["beta", "Alpha", "alpha2", "Gamma"]),
            vec!["Alpha", "alpha2", "beta", "Gamma"]
        );
    }

    #[test]
    fn test_leading_zeros_and_ties_are_total() {
        assert_eq!(compare("a01", "a1"), Ordering::Greater);
        assert_eq!(compare("a1", "a01"), Ordering::Less);
        assert_ne!(compare("A", "a"), Ordering::Equal);
        assert_eq!(compare("same", "same"), Ordering::Equal);
    }

    #[test]
    fn test_prefix_sorts_first() {
        assert_eq!(compare("disc", "disc 2"), Ordering::Less);
        assert_eq!(compare("", "a"), Ordering::Less);
    }
}
