//! Artifact identity and cache fingerprints.
//!
//! Persisted key layout:
//!
//! ```text
//! {prefix}:sculpture:{season}:{round}:{session}:{participant}
//! {prefix}:comparison:{season}:{round}:{session}:{A+B+...}
//! {prefix}:session:{season}:{round}:{session}:{metadata|participants|loaded}
//! {prefix}:session:{season}:schedule
//! ```
//!
//! Comparison sets are normalized (upper-cased, sorted, de-duplicated) at
//! construction so every permutation of the same set shares one entry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::session::SessionCode;

/// Hard limit on participants in one compare job.
pub const MAX_COMPARISON_PARTICIPANTS: usize = 5;

/// A comparison needs at least two distinct participants.
pub const MIN_COMPARISON_PARTICIPANTS: usize = 2;

/// Earliest season the upstream provider serves.
pub const MIN_SEASON: i32 = 1950;

/// Upper bound guarding against garbage input.
pub const MAX_SEASON: i32 = 2100;

const MIN_CODE_LEN: usize = 2;
const MAX_CODE_LEN: usize = 4;

/// Delimiter joining members of a comparison set inside a fingerprint.
const SET_DELIMITER: char = '+';

// ---------------------------------------------------------------------------
// Namespaces
// ---------------------------------------------------------------------------

/// Logical cache namespaces sharing one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheNamespace {
    Sculpture,
    Comparison,
    Session,
}

impl CacheNamespace {
    pub const ALL: [CacheNamespace; 3] = [
        CacheNamespace::Sculpture,
        CacheNamespace::Comparison,
        CacheNamespace::Session,
    ];

    pub fn segment(self) -> &'static str {
        match self {
            CacheNamespace::Sculpture => "sculpture",
            CacheNamespace::Comparison => "comparison",
            CacheNamespace::Session => "session",
        }
    }

    /// Key prefix covering every entry of this namespace.
    pub fn key_prefix(self, prefix: &str) -> String {
        format!("{prefix}:{}:", self.segment())
    }
}

impl FromStr for CacheNamespace {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CacheNamespace::ALL
            .into_iter()
            .find(|ns| ns.segment() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown cache namespace: \"{s}\"")))
    }
}

// ---------------------------------------------------------------------------
// ArtifactKey
// ---------------------------------------------------------------------------

/// Who an artifact is computed for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "participants", rename_all = "snake_case")]
pub enum Subject {
    Single(String),
    Comparison(Vec<String>),
}

/// Identity of one computed artifact. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    season: i32,
    event_round: u32,
    session: SessionCode,
    subject: Subject,
}

impl ArtifactKey {
    /// Key for a single participant's artifact.
    pub fn single(
        season: i32,
        event_round: u32,
        session: SessionCode,
        participant: &str,
    ) -> Result<Self, CoreError> {
        validate_event(season, event_round)?;
        Ok(Self {
            season,
            event_round,
            session,
            subject: Subject::Single(normalize_code(participant)?),
        })
    }

    /// Key for a comparison across `participants`.
    ///
    /// More than [`MAX_COMPARISON_PARTICIPANTS`] codes are rejected before
    /// de-duplication, so a request naming six codes never slips through.
    pub fn comparison<S: AsRef<str>>(
        season: i32,
        event_round: u32,
        session: SessionCode,
        participants: &[S],
    ) -> Result<Self, CoreError> {
        validate_event(season, event_round)?;
        if participants.len() > MAX_COMPARISON_PARTICIPANTS {
            return Err(CoreError::Validation(format!(
                "Maximum {MAX_COMPARISON_PARTICIPANTS} participants allowed for comparison, got {}",
                participants.len()
            )));
        }

        let mut codes = participants
            .iter()
            .map(|p| normalize_code(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        codes.sort();
        codes.dedup();

        if codes.len() < MIN_COMPARISON_PARTICIPANTS {
            return Err(CoreError::Validation(format!(
                "A comparison needs at least {MIN_COMPARISON_PARTICIPANTS} distinct participants"
            )));
        }

        Ok(Self {
            season,
            event_round,
            session,
            subject: Subject::Comparison(codes),
        })
    }

    pub fn season(&self) -> i32 {
        self.season
    }

    pub fn event_round(&self) -> u32 {
        self.event_round
    }

    pub fn session(&self) -> SessionCode {
        self.session
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn is_comparison(&self) -> bool {
        matches!(self.subject, Subject::Comparison(_))
    }

    /// Participants covered by this key, in normalized order.
    pub fn participants(&self) -> &[String] {
        match &self.subject {
            Subject::Single(code) => std::slice::from_ref(code),
            Subject::Comparison(codes) => codes,
        }
    }

    /// The namespace this key's artifact lives in.
    pub fn namespace(&self) -> CacheNamespace {
        match self.subject {
            Subject::Single(_) => CacheNamespace::Sculpture,
            Subject::Comparison(_) => CacheNamespace::Comparison,
        }
    }

    /// The session this artifact is derived from.
    pub fn session_key(&self) -> SessionKey {
        SessionKey {
            season: self.season,
            event_round: self.event_round,
            session: self.session,
        }
    }

    /// Stable cache key under `prefix`.
    pub fn fingerprint(&self, prefix: &str) -> String {
        let subject = match &self.subject {
            Subject::Single(code) => code.clone(),
            Subject::Comparison(codes) => {
                let mut joined = String::new();
                for (i, code) in codes.iter().enumerate() {
                    if i > 0 {
                        joined.push(SET_DELIMITER);
                    }
                    joined.push_str(code);
                }
                joined
            }
        };
        format!(
            "{}{}:{}:{}:{}",
            self.namespace().key_prefix(prefix),
            self.season,
            self.event_round,
            self.session,
            subject
        )
    }

    /// Single-participant keys for every member, used when a compare job
    /// also populates the per-participant entries.
    pub fn single_keys(&self) -> Vec<ArtifactKey> {
        self.participants()
            .iter()
            .map(|code| ArtifactKey {
                season: self.season,
                event_round: self.event_round,
                session: self.session,
                subject: Subject::Single(code.clone()),
            })
            .collect()
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} R{} {} [{}]",
            self.season,
            self.event_round,
            self.session,
            self.participants().join(",")
        )
    }
}

// ---------------------------------------------------------------------------
// SessionKey
// ---------------------------------------------------------------------------

/// The facets of cached session metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFacet {
    Metadata,
    Participants,
    Loaded,
}

impl SessionFacet {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionFacet::Metadata => "metadata",
            SessionFacet::Participants => "participants",
            SessionFacet::Loaded => "loaded",
        }
    }
}

/// Identity of one upstream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub season: i32,
    pub event_round: u32,
    pub session: SessionCode,
}

impl SessionKey {
    pub fn new(season: i32, event_round: u32, session: SessionCode) -> Result<Self, CoreError> {
        validate_event(season, event_round)?;
        Ok(Self {
            season,
            event_round,
            session,
        })
    }

    pub fn cache_key(&self, prefix: &str, facet: SessionFacet) -> String {
        format!(
            "{}{}:{}:{}:{}",
            CacheNamespace::Session.key_prefix(prefix),
            self.season,
            self.event_round,
            self.session,
            facet.as_str()
        )
    }
}

/// Cache key of a season's event schedule (session namespace).
pub fn schedule_cache_key(prefix: &str, season: i32) -> String {
    format!(
        "{}{season}:schedule",
        CacheNamespace::Session.key_prefix(prefix)
    )
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_event(season: i32, event_round: u32) -> Result<(), CoreError> {
    if !(MIN_SEASON..=MAX_SEASON).contains(&season) {
        return Err(CoreError::Validation(format!(
            "Season must be between {MIN_SEASON} and {MAX_SEASON}, got {season}"
        )));
    }
    if event_round == 0 {
        return Err(CoreError::Validation(
            "Event round must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Upper-case and validate a participant code.
pub fn normalize_code(code: &str) -> Result<String, CoreError> {
    let code = code.trim();
    if code.len() < MIN_CODE_LEN || code.len() > MAX_CODE_LEN {
        return Err(CoreError::Validation(format!(
            "Participant code must be {MIN_CODE_LEN}-{MAX_CODE_LEN} characters, got \"{code}\""
        )));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(CoreError::Validation(format!(
            "Participant code may only contain letters and digits, got \"{code}\""
        )));
    }
    Ok(code.to_ascii_uppercase())
}
