//! npm-style version range parsing and range intersection.
//!
//! A range is a `||`-separated union of comparator sets. Every comparator set is reduced to
//! a single interval, so two ranges overlap when any pair of their intervals intersects.

use std::cmp::Ordering;
use std::str::FromStr;

use semver::{BuildMetadata, Prerelease, Version};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("invalid version '{input}' in range")]
    InvalidVersion { input: String },
    #[error("unsupported range syntax '{input}'")]
    Unsupported { input: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    alternatives: Vec<Interval>,
}

impl VersionRange {
    pub fn parse(raw: &str) -> Result<Self, RangeError> {
        let alternatives = raw
            .split("||")
            .map(parse_comparator_set)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { alternatives })
    }

    /// True when at least one version satisfies both ranges.
    pub fn intersects(&self, other: &VersionRange) -> bool {
        self.alternatives.iter().any(|left| {
            other
                .alternatives
                .iter()
                .any(|right| !left.intersect(right).is_empty())
        })
    }
}

impl FromStr for VersionRange {
    type Err = RangeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}

/// Range-intersection check used to classify installed peers.
///
/// Unparseable input on either side reports no overlap.
pub fn ranges_overlap(installed: &str, required: &str) -> bool {
    match (VersionRange::parse(installed), VersionRange::parse(required)) {
        (Ok(installed), Ok(required)) => installed.intersects(&required),
        (Err(err), _) | (_, Err(err)) => {
            tracing::debug!("treating '{installed}' vs '{required}' as disjoint: {err}");
            false
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Bound {
    version: Version,
    inclusive: bool,
}

impl Bound {
    fn inclusive(version: Version) -> Self {
        Self {
            version,
            inclusive: true,
        }
    }

    fn exclusive(version: Version) -> Self {
        Self {
            version,
            inclusive: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Interval {
    lower: Bound,
    upper: Option<Bound>,
}

impl Interval {
    fn unbounded() -> Self {
        Self {
            lower: Bound::inclusive(lowest_version()),
            upper: None,
        }
    }

    fn nothing() -> Self {
        Self {
            lower: Bound::inclusive(lowest_version()),
            upper: Some(Bound::exclusive(lowest_version())),
        }
    }

    fn at_least(lower: Bound) -> Self {
        Self { lower, upper: None }
    }

    fn until(upper: Bound) -> Self {
        Self {
            lower: Bound::inclusive(lowest_version()),
            upper: Some(upper),
        }
    }

    fn between(lower: Bound, upper: Bound) -> Self {
        Self {
            lower,
            upper: Some(upper),
        }
    }

    fn intersect(&self, other: &Interval) -> Interval {
        let lower = tighter_lower(&self.lower, &other.lower).clone();
        let upper = match (&self.upper, &other.upper) {
            (Some(left), Some(right)) => Some(tighter_upper(left, right).clone()),
            (Some(bound), None) | (None, Some(bound)) => Some(bound.clone()),
            (None, None) => None,
        };
        Interval { lower, upper }
    }

    fn is_empty(&self) -> bool {
        let Some(upper) = &self.upper else {
            return false;
        };
        match self.lower.version.cmp(&upper.version) {
            Ordering::Less => false,
            Ordering::Equal => !(self.lower.inclusive && upper.inclusive),
            Ordering::Greater => true,
        }
    }
}

fn tighter_lower<'a>(left: &'a Bound, right: &'a Bound) -> &'a Bound {
    match left.version.cmp(&right.version) {
        Ordering::Greater => left,
        Ordering::Less => right,
        Ordering::Equal if left.inclusive => right,
        Ordering::Equal => left,
    }
}

fn tighter_upper<'a>(left: &'a Bound, right: &'a Bound) -> &'a Bound {
    match left.version.cmp(&right.version) {
        Ordering::Less => left,
        Ordering::Greater => right,
        Ordering::Equal if left.inclusive => right,
        Ordering::Equal => left,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Exact,
    Greater,
    GreaterEq,
    Less,
    LessEq,
    Caret,
    Tilde,
}

// Longer prefixes first so `>=` is not read as `>`.
const OPERATORS: [(&str, Operator); 8] = [
    (">=", Operator::GreaterEq),
    ("<=", Operator::LessEq),
    ("~>", Operator::Tilde),
    (">", Operator::Greater),
    ("<", Operator::Less),
    ("=", Operator::Exact),
    ("^", Operator::Caret),
    ("~", Operator::Tilde),
];

/// Version with wildcard or missing components (`1`, `1.2`, `1.x`, `*`).
#[derive(Debug, Clone, PartialEq, Eq)]
struct PartialVersion {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
    pre: Prerelease,
}

impl PartialVersion {
    fn is_wildcard(&self) -> bool {
        self.major.is_none()
    }

    fn full(&self) -> Option<Version> {
        Some(Version {
            major: self.major?,
            minor: self.minor?,
            patch: self.patch?,
            pre: self.pre.clone(),
            build: BuildMetadata::EMPTY,
        })
    }

    /// Lowest version matched, with missing components as zero.
    fn floor(&self) -> Version {
        Version {
            major: self.major.unwrap_or(0),
            minor: self.minor.unwrap_or(0),
            patch: self.patch.unwrap_or(0),
            pre: self.pre.clone(),
            build: BuildMetadata::EMPTY,
        }
    }

    /// First release past the partial prefix: `1` -> `2.0.0`, `1.2` -> `1.3.0`.
    fn next_release(&self, raw: &str) -> Result<Option<Version>, RangeError> {
        let Some(major) = self.major else {
            return Ok(None);
        };
        let version = match (self.minor, self.patch) {
            (None, _) => release(checked_bump(major, raw)?, 0, 0),
            (Some(minor), None) => release(major, checked_bump(minor, raw)?, 0),
            (Some(_), Some(_)) => return Ok(None),
        };
        Ok(Some(version))
    }
}

fn parse_comparator_set(raw: &str) -> Result<Interval, RangeError> {
    let tokens = raw.split_whitespace().collect::<Vec<_>>();
    if tokens.is_empty() {
        return Ok(Interval::unbounded());
    }

    if let [from, "-", to] = tokens.as_slice() {
        let lower = comparator_interval(Operator::GreaterEq, from)?;
        let upper = comparator_interval(Operator::LessEq, to)?;
        return Ok(lower.intersect(&upper));
    }

    let mut interval = Interval::unbounded();
    let mut index = 0;
    while index < tokens.len() {
        let token = tokens[index];
        if token == "-" {
            return Err(RangeError::Unsupported {
                input: raw.trim().to_string(),
            });
        }

        // Operators may be separated from their version by whitespace (`>= 1.2.3`).
        let (operator, version) = if is_bare_operator(token) {
            let Some(next) = tokens.get(index + 1) else {
                return Err(RangeError::Unsupported {
                    input: raw.trim().to_string(),
                });
            };
            index += 1;
            split_operator(&format!("{token}{next}"))?
        } else {
            split_operator(token)?
        };

        interval = interval.intersect(&comparator_interval(operator, &version)?);
        index += 1;
    }

    Ok(interval)
}

fn is_bare_operator(token: &str) -> bool {
    OPERATORS.iter().any(|(symbol, _)| *symbol == token)
}

fn split_operator(token: &str) -> Result<(Operator, String), RangeError> {
    for (symbol, operator) in OPERATORS {
        if let Some(rest) = token.strip_prefix(symbol) {
            if rest.is_empty() {
                return Err(RangeError::Unsupported {
                    input: token.to_string(),
                });
            }
            return Ok((operator, rest.to_string()));
        }
    }
    Ok((Operator::Exact, token.to_string()))
}

fn comparator_interval(operator: Operator, raw: &str) -> Result<Interval, RangeError> {
    let partial = parse_partial(raw)?;
    if partial.is_wildcard() {
        return Ok(match operator {
            Operator::Greater | Operator::Less => Interval::nothing(),
            _ => Interval::unbounded(),
        });
    }

    let floor = partial.floor();
    let interval = match operator {
        Operator::Exact => match partial.full() {
            Some(version) => Interval::between(
                Bound::inclusive(version.clone()),
                Bound::inclusive(version),
            ),
            None => Interval::between(Bound::inclusive(floor), upper_before_next(&partial, raw)?),
        },
        Operator::GreaterEq => Interval::at_least(Bound::inclusive(floor)),
        Operator::Greater => match partial.full() {
            Some(version) => Interval::at_least(Bound::exclusive(version)),
            None => match partial.next_release(raw)? {
                Some(next) => Interval::at_least(Bound::inclusive(next)),
                None => Interval::nothing(),
            },
        },
        Operator::Less => match partial.full() {
            Some(version) => Interval::until(Bound::exclusive(version)),
            None => Interval::until(Bound::exclusive(with_zero_pre(floor))),
        },
        Operator::LessEq => match partial.full() {
            Some(version) => Interval::until(Bound::inclusive(version)),
            None => Interval::until(upper_before_next(&partial, raw)?),
        },
        Operator::Caret => Interval::between(Bound::inclusive(floor), caret_upper(&partial, raw)?),
        Operator::Tilde => Interval::between(Bound::inclusive(floor), tilde_upper(&partial, raw)?),
    };
    Ok(interval)
}

fn upper_before_next(partial: &PartialVersion, raw: &str) -> Result<Bound, RangeError> {
    match partial.next_release(raw)? {
        Some(next) => Ok(Bound::exclusive(with_zero_pre(next))),
        None => Err(RangeError::Unsupported {
            input: raw.to_string(),
        }),
    }
}

fn caret_upper(partial: &PartialVersion, raw: &str) -> Result<Bound, RangeError> {
    let major = partial.major.unwrap_or(0);
    let upper = if major > 0 {
        release(checked_bump(major, raw)?, 0, 0)
    } else {
        match (partial.minor, partial.patch) {
            (None, _) => release(1, 0, 0),
            (Some(0), None) => release(0, 1, 0),
            (Some(0), Some(patch)) => release(0, 0, checked_bump(patch, raw)?),
            (Some(minor), _) => release(0, checked_bump(minor, raw)?, 0),
        }
    };
    Ok(Bound::exclusive(with_zero_pre(upper)))
}

fn tilde_upper(partial: &PartialVersion, raw: &str) -> Result<Bound, RangeError> {
    let major = partial.major.unwrap_or(0);
    let upper = match partial.minor {
        None => release(checked_bump(major, raw)?, 0, 0),
        Some(minor) => release(major, checked_bump(minor, raw)?, 0),
    };
    Ok(Bound::exclusive(with_zero_pre(upper)))
}

fn parse_partial(raw: &str) -> Result<PartialVersion, RangeError> {
    let invalid = || RangeError::InvalidVersion {
        input: raw.to_string(),
    };

    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    let without_build = trimmed.split_once('+').map_or(trimmed, |(core, _)| core);
    let (core, pre) = match without_build.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (without_build, None),
    };

    let parts = core.split('.').collect::<Vec<_>>();
    if core.is_empty() || parts.len() > 3 {
        return Err(invalid());
    }

    let mut components = [None; 3];
    for (slot, part) in components.iter_mut().zip(parts.iter()) {
        if matches!(*part, "x" | "X" | "*") {
            break;
        }
        *slot = Some(part.parse::<u64>().map_err(|_| invalid())?);
    }

    let pre = match pre {
        Some(pre) if components.iter().all(Option::is_some) => {
            Prerelease::new(pre).map_err(|_| invalid())?
        }
        Some(_) => return Err(invalid()),
        None => Prerelease::EMPTY,
    };

    let [major, minor, patch] = components;
    Ok(PartialVersion {
        major,
        minor,
        patch,
        pre,
    })
}

fn release(major: u64, minor: u64, patch: u64) -> Version {
    Version::new(major, minor, patch)
}

fn checked_bump(component: u64, raw: &str) -> Result<u64, RangeError> {
    component
        .checked_add(1)
        .ok_or_else(|| RangeError::Unsupported {
            input: raw.to_string(),
        })
}

/// `X.Y.Z-0` sorts before every prerelease of `X.Y.Z`, making it a tight exclusive bound.
fn with_zero_pre(mut version: Version) -> Version {
    version.pre = zero_prerelease();
    version
}

fn lowest_version() -> Version {
    with_zero_pre(Version::new(0, 0, 0))
}

fn zero_prerelease() -> Prerelease {
    Prerelease::new("0").unwrap_or(Prerelease::EMPTY)
}
