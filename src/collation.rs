use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;
use unicode_normalization::UnicodeNormalization;

/// Total order over media names used when rebuilding an album index by name.
///
/// Hosts with a platform collation service can plug it in here.
pub trait NameCollator: Send + Sync {
    fn compare(&self, a: &str, b: &str) -> Ordering;
}

/// Portable "natural" order: case-insensitive after NFKC normalisation,
/// with runs of digits compared by numeric value (`img2` < `img10`).
#[derive(Debug, Default, Clone, Copy)]
pub struct NaturalCollator;

impl NameCollator for NaturalCollator {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        let left = fold(a);
        let right = fold(b);
        compare_natural(&left, &right).then_with(|| a.cmp(b))
    }
}

fn fold(s: &str) -> String {
    s.nfkc().flat_map(char::to_lowercase).collect()
}

fn compare_natural(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();
    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let ord = compare_numbers(&take_digits(&mut left), &take_digits(&mut right));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.next_if(char::is_ascii_digit) {
        digits.push(c);
    }
    digits
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    let a_trimmed = a.trim_start_matches('0');
    let b_trimmed = b.trim_start_matches('0');
    a_trimmed.len().cmp(&b_trimmed.len())
        .then_with(|| a_trimmed.cmp(b_trimmed))
        .then_with(|| a.len().cmp(&b.len()))
}
