//! Loose version ordering for kernel releases and Node.js versions.
//!
//! A version is `release[-suffix]`. The release is dot-separated numbers,
//! compared numerically with missing components treated as zero. The suffix is
//! dash-separated and compared piecewise: numbers numerically, anything else
//! as text, and mixed pairs as text.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use itertools::{EitherOrBoth, Itertools};

use crate::error::FabError;

#[derive(Debug, Clone)]
enum Part {
    Num(u64),
    Text(String),
}

impl Part {
    fn parse(s: &str) -> Self {
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = s.parse() {
                return Part::Num(n);
            }
        }
        Part::Text(s.to_string())
    }

    fn cmp_mixed(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Part::Num(a), Part::Num(b)) => a.cmp(b),
            (Part::Text(a), Part::Text(b)) => a.cmp(b),
            (a, b) => a.to_string().cmp(&b.to_string()),
        }
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Part::Num(n) => write!(f, "{}", n),
            Part::Text(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    release: Vec<u64>,
    suffix: Vec<Part>,
}

impl Version {
    pub fn parse(ver: &str) -> Result<Self, FabError> {
        let trimmed = ver.trim();
        let stripped = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let (release, suffix) = stripped.split_once('-').unwrap_or((stripped, ""));

        let release = release
            .split('.')
            .map(|part| {
                if part.is_empty() {
                    Ok(0)
                } else {
                    part.parse::<u64>()
                        .map_err(|_| FabError::InvalidVersion(ver.to_string()))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        let suffix = suffix.split('-').map(Part::parse).collect();

        Ok(Self {
            raw: trimmed.to_string(),
            release,
            suffix,
        })
    }
}

impl FromStr for Version {
    type Err = FabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        for pair in self.release.iter().zip_longest(other.release.iter()) {
            let ordering = match pair {
                EitherOrBoth::Both(a, b) => a.cmp(b),
                EitherOrBoth::Left(a) => a.cmp(&0),
                EitherOrBoth::Right(b) => 0.cmp(b),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        let zero = Part::Num(0);
        for pair in self.suffix.iter().zip_longest(other.suffix.iter()) {
            let ordering = match pair {
                EitherOrBoth::Both(a, b) => a.cmp_mixed(b),
                EitherOrBoth::Left(a) => a.cmp_mixed(&zero),
                EitherOrBoth::Right(b) => zero.cmp_mixed(b),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_kernel_release_against_minimum() {
        assert!(v("4.19.0-18-amd64") > v("4.9"));
        assert!(v("6.1.0-18-cloud-amd64") > v("4.9"));
        assert!(v("4.4.0-21-generic") < v("4.9"));
        assert!(v("3.16.0-4-amd64") < v("4.9"));
    }

    #[test]
    fn test_missing_components_are_zero() {
        assert_eq!(v("4.9"), v("4.9.0"));
        assert!(v("4.9.1") > v("4.9"));
    }

    #[test]
    fn test_suffix_ordering() {
        assert!(v("1.0-2") < v("1.0-10"));
        assert!(v("1.0.0-rc1") < v("1.0.0-rc2"));
        // A bare release has an empty text suffix, which sorts before a number.
        assert!(v("1.0") < v("1.0-1"));
    }

    #[test]
    fn test_node_style_versions() {
        assert!(v("v20.11.1") > v("v18.19.0"));
        assert!(v("v20.11.1") > v("v20.9.0"));
        assert_eq!(v("v20.11.1").to_string(), "v20.11.1");
    }

    #[test]
    fn test_empty_release_parts() {
        assert_eq!(v(""), v("0"));
        assert!(v("") < v("4.9"));
    }

    #[test]
    fn test_invalid_release() {
        assert!(matches!(
            Version::parse("four.nine"),
            Err(FabError::InvalidVersion(_))
        ));
    }
}
