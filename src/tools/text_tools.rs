use std::cmp::Ordering;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref CHUNKS: Regex = Regex::new(r"\d+|\D+").expect("static regex");
}

/// Numeric aware, case insensitive comparison: "img2.jpg" sorts before "img10.jpg".
pub fn compare_natural(a: &str, b: &str) -> Ordering {
    let mut left = CHUNKS.find_iter(a).map(|m| m.as_str());
    let mut right = CHUNKS.find_iter(b).map(|m| m.as_str());
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let ordering = compare_chunk(l, r);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

fn compare_chunk(l: &str, r: &str) -> Ordering {
    let l_digit = l.starts_with(|c: char| c.is_ascii_digit());
    let r_digit = r.starts_with(|c: char| c.is_ascii_digit());
    if l_digit && r_digit {
        let l_trim = l.trim_start_matches('0');
        let r_trim = r.trim_start_matches('0');
        // longer digit run is the larger number, no overflow on huge runs
        l_trim.len().cmp(&r_trim.len()).then_with(|| l_trim.cmp(r_trim))
    } else {
        l.to_lowercase().cmp(&r.to_lowercase())
    }
}

pub fn sort_natural<T, F>(elements: &mut [T], key: F) where F: Fn(&T) -> &str {
    elements.sort_by(|a, b| compare_natural(key(a), key(b)));
}
