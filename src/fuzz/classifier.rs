//! Response classification: probe outcome to Hit / Miss / Error.
//!
//! The decision itself is the pure function [`classify_status`]. Rules apply
//! in this order:
//!
//! 1. transport failure: Error
//! 2. status in the exclude-set: Miss
//! 3. include-set non-empty: Hit if the status is in it, otherwise Miss
//! 4. include-set empty: 3xx is a Miss, 404 is a Miss, anything else is a Hit

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use super::client::ProbeResponse;
use super::error::{ConfigError, TransportError};

/// Status code treated as uninteresting when no include-set is configured.
pub const DEFAULT_UNINTERESTING_STATUS: u16 = 404;

/// Result of one probe, as handed to the classifier.
#[derive(Debug)]
pub enum ProbeOutcome {
    /// An HTTP response was received.
    Response(ProbeResponse),
    /// No response: the transport failed after all retries.
    Transport(TransportError),
    /// The run was cancelled before the outcome was finalized.
    Cancelled,
}

/// Three-valued classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictKind {
    /// A discovered endpoint.
    Hit,
    /// Not interesting.
    Miss,
    /// The probe failed at the transport level.
    Error,
}

impl VerdictKind {
    /// Lower-case label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which rule produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    /// No response was received.
    TransportFailure,
    /// Status is in the exclude-set.
    ExcludedStatus,
    /// Status is in the include-set.
    IncludedStatus,
    /// Include-set is non-empty and does not contain the status.
    NotIncluded,
    /// Redirect status without an explicit include.
    RedirectNotIncluded,
    /// The default uninteresting status (404).
    DefaultUninteresting,
    /// Any other status with an empty include-set.
    DefaultInteresting,
}

/// Classification of one probe outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verdict {
    /// Hit, miss or error.
    pub kind: VerdictKind,
    /// Deciding status code, absent for transport failures.
    pub status: Option<u16>,
    /// The rule that decided.
    pub rule: MatchRule,
}

impl Verdict {
    /// Whether this verdict is a hit.
    #[must_use]
    pub fn is_hit(&self) -> bool {
        self.kind == VerdictKind::Hit
    }
}

/// Classifies a status code (or a transport failure) against include and exclude sets.
#[must_use]
pub fn classify_status(
    status: Option<u16>,
    transport_failed: bool,
    include: &BTreeSet<u16>,
    exclude: &BTreeSet<u16>,
) -> Verdict {
    let Some(code) = status.filter(|_| !transport_failed) else {
        return Verdict {
            kind: VerdictKind::Error,
            status: None,
            rule: MatchRule::TransportFailure,
        };
    };
    let verdict = |kind, rule| Verdict {
        kind,
        status: Some(code),
        rule,
    };

    if exclude.contains(&code) {
        return verdict(VerdictKind::Miss, MatchRule::ExcludedStatus);
    }
    if !include.is_empty() {
        return if include.contains(&code) {
            verdict(VerdictKind::Hit, MatchRule::IncludedStatus)
        } else {
            verdict(VerdictKind::Miss, MatchRule::NotIncluded)
        };
    }
    if (300..400).contains(&code) {
        return verdict(VerdictKind::Miss, MatchRule::RedirectNotIncluded);
    }
    if code == DEFAULT_UNINTERESTING_STATUS {
        return verdict(VerdictKind::Miss, MatchRule::DefaultUninteresting);
    }
    verdict(VerdictKind::Hit, MatchRule::DefaultInteresting)
}

/// Validated include and exclude status sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusFilter {
    include: BTreeSet<u16>,
    exclude: BTreeSet<u16>,
}

impl StatusFilter {
    /// Builds a filter.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidStatusCode`] for codes outside 100..=599.
    pub fn new(
        include: impl IntoIterator<Item = u16>,
        exclude: impl IntoIterator<Item = u16>,
    ) -> Result<Self, ConfigError> {
        let include = validate_codes(include)?;
        let exclude = validate_codes(exclude)?;
        Ok(Self { include, exclude })
    }

    /// Classifies a probe outcome. Cancelled outcomes have no verdict.
    #[must_use]
    pub fn classify(&self, outcome: &ProbeOutcome) -> Option<Verdict> {
        match outcome {
            ProbeOutcome::Response(response) => Some(self.classify_status(response.status)),
            ProbeOutcome::Transport(_) => Some(classify_status(
                None,
                true,
                &self.include,
                &self.exclude,
            )),
            ProbeOutcome::Cancelled => None,
        }
    }

    /// Classifies a received status code.
    #[must_use]
    pub fn classify_status(&self, status: u16) -> Verdict {
        classify_status(Some(status), false, &self.include, &self.exclude)
    }

    /// The include-set.
    #[must_use]
    pub fn include(&self) -> &BTreeSet<u16> {
        &self.include
    }

    /// The exclude-set.
    #[must_use]
    pub fn exclude(&self) -> &BTreeSet<u16> {
        &self.exclude
    }
}

fn validate_codes(codes: impl IntoIterator<Item = u16>) -> Result<BTreeSet<u16>, ConfigError> {
    codes
        .into_iter()
        .map(|code| {
            if (100..=599).contains(&code) {
                Ok(code)
            } else {
                Err(ConfigError::InvalidStatusCode { code })
            }
        })
        .collect()
}
