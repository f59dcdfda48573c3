//! Debian-style version ordering
//!
//! Follows the dpkg rules: an optional numeric `epoch:` prefix, then the
//! upstream part, then an optional `-revision` after the last dash. Each part
//! is compared as alternating non-digit and digit runs. In non-digit runs `~`
//! sorts before everything (even the end of the string) and letters sort
//! before other symbols. Digit runs compare numerically, so missing or extra
//! leading zeros make no difference.

use super::VersionComparator;
use std::cmp::Ordering;

/// Default comparator used when a module registers no override
#[derive(Debug, Clone, Copy, Default)]
pub struct DebianComparator;

impl VersionComparator for DebianComparator {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        compare_versions(a, b)
    }

    fn name(&self) -> &'static str {
        "debian"
    }
}

/// Compare two version strings under the Debian rules.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let a = Parts::split(a);
    let b = Parts::split(b);

    a.epoch
        .cmp(&b.epoch)
        .then_with(|| verrevcmp(a.upstream, b.upstream))
        .then_with(|| verrevcmp(a.revision, b.revision))
}

struct Parts<'a> {
    epoch: u64,
    upstream: &'a str,
    revision: &'a str,
}

impl<'a> Parts<'a> {
    fn split(version: &'a str) -> Self {
        let version = strip_tag_prefix(version.trim());

        let (epoch, rest) = match version.split_once(':') {
            Some((e, rest)) if !e.is_empty() && e.bytes().all(|c| c.is_ascii_digit()) => {
                (e.parse().unwrap_or(u64::MAX), rest)
            }
            _ => (0, version),
        };

        let (upstream, revision) = rest.rsplit_once('-').unwrap_or((rest, ""));

        Self {
            epoch,
            upstream,
            revision,
        }
    }
}

/// Tags are commonly written `v1.2.3`; treat that the same as `1.2.3`.
fn strip_tag_prefix(version: &str) -> &str {
    let bytes = version.as_bytes();
    if bytes.len() > 1 && matches!(bytes[0], b'v' | b'V') && bytes[1].is_ascii_digit() {
        &version[1..]
    } else {
        version
    }
}

fn order(c: Option<u8>) -> i32 {
    match c {
        None => 0,
        Some(c) if c.is_ascii_digit() => 0,
        Some(c) if c.is_ascii_alphabetic() => i32::from(c),
        Some(b'~') => -1,
        Some(c) => i32::from(c) + 256,
    }
}

fn verrevcmp(a: &str, b: &str) -> Ordering {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let (mut i, mut j) = (0, 0);

    let is_digit = |s: &[u8], k: usize| s.get(k).is_some_and(u8::is_ascii_digit);

    while i < a.len() || j < b.len() {
        while (i < a.len() && !is_digit(a, i)) || (j < b.len() && !is_digit(b, j)) {
            let ac = order(a.get(i).copied());
            let bc = order(b.get(j).copied());
            if ac != bc {
                return ac.cmp(&bc);
            }
            i += 1;
            j += 1;
        }

        while a.get(i) == Some(&b'0') {
            i += 1;
        }
        while b.get(j) == Some(&b'0') {
            j += 1;
        }

        let mut first_diff = Ordering::Equal;
        while is_digit(a, i) && is_digit(b, j) {
            if first_diff == Ordering::Equal {
                first_diff = a[i].cmp(&b[j]);
            }
            i += 1;
            j += 1;
        }

        if is_digit(a, i) {
            return Ordering::Greater;
        }
        if is_digit(b, j) {
            return Ordering::Less;
        }
        if first_diff != Ordering::Equal {
            return first_diff;
        }
    }

    Ordering::Equal
}
