//! npm-style version ranges
//!
//! Supports:
//! - `1.2.3`, `=1.2.3` - exact match
//! - `1`, `1.2`, `1.x`, `1.2.*`, `*`, `x` - X-ranges (a partial version is a range)
//! - `^1.2.3` - compatible with version (>=1.2.3 <2.0.0, with 0.x special cases)
//! - `~1.2.3` - approximately equivalent (>=1.2.3 <1.3.0)
//! - `>=1.2.3`, `>1.2.3`, `<=1.2.3`, `<1.2.3` - comparison operators
//! - `1.2.3 - 2.3.4` - hyphen ranges
//! - `>=1.0.0 <2.0.0` - AND (whitespace separated)
//! - `^1.0.0 || ^2.0.0` - OR
//!
//! Every comparator is lowered to a pair of bounds, so satisfaction is two
//! comparisons per comparator.

use semver::{BuildMetadata, Prerelease, Version};

/// Parsed range: a union of intersections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    sets: Vec<Vec<Bounds>>,
}

impl VersionRange {
    /// Parse a range expression, returning None if any part is malformed
    pub fn parse(spec: &str) -> Option<Self> {
        let sets = spec
            .split("||")
            .map(parse_intersection)
            .collect::<Option<Vec<_>>>()?;
        Some(Self { sets })
    }

    pub fn satisfies(&self, version: &Version) -> bool {
        self.sets
            .iter()
            .any(|set| set.iter().all(|bounds| bounds.contains(version)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Bound {
    Unbounded,
    Inclusive(Version),
    Exclusive(Version),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Bounds {
    lower: Bound,
    upper: Bound,
}

impl Bounds {
    const ANY: Bounds = Bounds {
        lower: Bound::Unbounded,
        upper: Bound::Unbounded,
    };

    fn contains(&self, version: &Version) -> bool {
        let above = match &self.lower {
            Bound::Unbounded => true,
            Bound::Inclusive(v) => version >= v,
            Bound::Exclusive(v) => version > v,
        };
        let below = match &self.upper {
            Bound::Unbounded => true,
            Bound::Inclusive(v) => version <= v,
            Bound::Exclusive(v) => version < v,
        };
        above && below
    }
}

/// Version with optional (wildcard) minor and patch components
#[derive(Debug, Clone, PartialEq, Eq)]
struct Partial {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
    pre: Prerelease,
}

impl Partial {
    fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let input = input.strip_prefix('v').unwrap_or(input);
        if input.is_empty() {
            return None;
        }

        // Build metadata never affects ranges
        let input = input.split_once('+').map_or(input, |(core, _)| core);
        let (core, pre) = match input.split_once('-') {
            Some((core, pre)) => (core, Prerelease::new(pre).ok()?),
            None => (input, Prerelease::EMPTY),
        };

        let mut parts = core.split('.');
        let major = parse_component(parts.next()?)?;
        let minor = parts.next().map(parse_component).unwrap_or(Some(None))?;
        let patch = parts.next().map(parse_component).unwrap_or(Some(None))?;
        if parts.next().is_some() {
            return None;
        }

        // Anything after a wildcard is a wildcard too (1.x.3 == 1.x)
        let minor = major.and(minor);
        let patch = minor.and(patch);
        if patch.is_none() && !pre.is_empty() {
            return None;
        }

        Some(Self {
            major,
            minor,
            patch,
            pre,
        })
    }

    fn is_full(&self) -> bool {
        self.patch.is_some()
    }

    /// Smallest version matched by this partial
    fn floor(&self) -> Version {
        Version {
            major: self.major.unwrap_or(0),
            minor: self.minor.unwrap_or(0),
            patch: self.patch.unwrap_or(0),
            pre: self.pre.clone(),
            build: BuildMetadata::EMPTY,
        }
    }

    /// Upper bound just past the versions matched by this partial
    ///
    /// Unbounded for `*`; None when a component cannot be incremented.
    fn ceiling(&self) -> Option<Bound> {
        let ceiling = match (self.major, self.minor, self.patch) {
            (None, _, _) => return Some(Bound::Unbounded),
            (Some(major), None, _) => Version::new(major.checked_add(1)?, 0, 0),
            (Some(major), Some(minor), None) => Version::new(major, minor.checked_add(1)?, 0),
            (Some(major), Some(minor), Some(patch)) => {
                Version::new(major, minor, patch.checked_add(1)?)
            }
        };
        Some(Bound::Exclusive(ceiling))
    }

    fn exact(&self) -> Option<Bounds> {
        if self.is_full() {
            let v = self.floor();
            return Some(Bounds {
                lower: Bound::Inclusive(v.clone()),
                upper: Bound::Inclusive(v),
            });
        }
        self.x_range()
    }

    fn x_range(&self) -> Option<Bounds> {
        let bounds = match self.ceiling()? {
            Bound::Unbounded => Bounds::ANY,
            upper => Bounds {
                lower: Bound::Inclusive(self.floor()),
                upper,
            },
        };
        Some(bounds)
    }

    fn caret(&self) -> Option<Bounds> {
        let Some(major) = self.major else {
            return Some(Bounds::ANY);
        };
        // ^1.2.3 -> <2.0.0, ^0.2.3 -> <0.3.0, ^0.0.3 -> <0.0.4, ^0.0 -> <0.1.0
        let upper = match (major, self.minor, self.patch) {
            (0, Some(0), Some(patch)) => Version::new(0, 0, patch.checked_add(1)?),
            (0, Some(minor), _) => Version::new(0, minor.checked_add(1)?, 0),
            _ => Version::new(major.checked_add(1)?, 0, 0),
        };
        Some(Bounds {
            lower: Bound::Inclusive(self.floor()),
            upper: Bound::Exclusive(upper),
        })
    }

    fn tilde(&self) -> Option<Bounds> {
        let Some(major) = self.major else {
            return Some(Bounds::ANY);
        };
        let upper = match self.minor {
            Some(minor) => Version::new(major, minor.checked_add(1)?, 0),
            None => Version::new(major.checked_add(1)?, 0, 0),
        };
        Some(Bounds {
            lower: Bound::Inclusive(self.floor()),
            upper: Bound::Exclusive(upper),
        })
    }

    fn greater_than(&self) -> Option<Bounds> {
        if self.is_full() {
            return Some(Bounds {
                lower: Bound::Exclusive(self.floor()),
                upper: Bound::Unbounded,
            });
        }
        // >1.2 means >=1.3.0, >* matches nothing
        let bounds = match self.ceiling()? {
            Bound::Exclusive(ceiling) | Bound::Inclusive(ceiling) => Bounds {
                lower: Bound::Inclusive(ceiling),
                upper: Bound::Unbounded,
            },
            Bound::Unbounded => Bounds {
                lower: Bound::Unbounded,
                upper: Bound::Exclusive(Version::new(0, 0, 0)),
            },
        };
        Some(bounds)
    }

    fn at_least(&self) -> Bounds {
        Bounds {
            lower: Bound::Inclusive(self.floor()),
            upper: Bound::Unbounded,
        }
    }

    fn less_than(&self) -> Bounds {
        Bounds {
            lower: Bound::Unbounded,
            upper: Bound::Exclusive(self.floor()),
        }
    }

    fn at_most(&self) -> Option<Bounds> {
        if self.is_full() {
            return Some(Bounds {
                lower: Bound::Unbounded,
                upper: Bound::Inclusive(self.floor()),
            });
        }
        // <=1.2 means <1.3.0
        Some(Bounds {
            lower: Bound::Unbounded,
            upper: self.ceiling()?,
        })
    }
}

/// `Some(None)` for a wildcard, `Some(Some(n))` for a number, None if malformed
fn parse_component(part: &str) -> Option<Option<u64>> {
    match part {
        "x" | "X" | "*" => Some(None),
        _ if !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()) => {
            part.parse().ok().map(Some)
        }
        _ => None,
    }
}

fn parse_intersection(spec: &str) -> Option<Vec<Bounds>> {
    let tokens = tokenize(spec);
    if tokens.is_empty() {
        // An empty set (e.g. `1.0.0 || `) matches anything, as in npm
        return Some(vec![Bounds::ANY]);
    }

    // Hyphen range: A - B
    if tokens.len() == 3 && tokens[1] == "-" {
        let from = Partial::parse(&tokens[0])?;
        let to = Partial::parse(&tokens[2])?;
        let upper = if to.is_full() {
            Bound::Inclusive(to.floor())
        } else {
            to.ceiling()?
        };
        return Some(vec![Bounds {
            lower: Bound::Inclusive(from.floor()),
            upper,
        }]);
    }

    tokens.iter().map(|token| parse_comparator(token)).collect()
}

/// Split on whitespace, gluing a bare operator to the version after it
fn tokenize(spec: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut pending_op: Option<&str> = None;

    for word in spec.split_whitespace() {
        if let Some(op) = pending_op.take() {
            tokens.push(format!("{}{}", op, word));
        } else if matches!(word, ">" | ">=" | "<" | "<=" | "=" | "^" | "~" | "~>") {
            pending_op = Some(word);
        } else {
            tokens.push(word.to_string());
        }
    }
    if let Some(op) = pending_op {
        tokens.push(op.to_string());
    }

    tokens
}

fn parse_comparator(token: &str) -> Option<Bounds> {
    if let Some(rest) = token.strip_prefix(">=") {
        Partial::parse(rest).map(|p| p.at_least())
    } else if let Some(rest) = token.strip_prefix('>') {
        Partial::parse(rest).and_then(|p| p.greater_than())
    } else if let Some(rest) = token.strip_prefix("<=") {
        Partial::parse(rest).and_then(|p| p.at_most())
    } else if let Some(rest) = token.strip_prefix('<') {
        Partial::parse(rest).map(|p| p.less_than())
    } else if let Some(rest) = token.strip_prefix('^') {
        Partial::parse(rest).and_then(|p| p.caret())
    } else if let Some(rest) = token.strip_prefix("~>").or_else(|| token.strip_prefix('~')) {
        Partial::parse(rest).and_then(|p| p.tilde())
    } else if let Some(rest) = token.strip_prefix('=') {
        Partial::parse(rest).and_then(|p| p.exact())
    } else {
        Partial::parse(token).and_then(|p| p.exact())
    }
}
