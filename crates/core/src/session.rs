//! Session codes and upstream session descriptors.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// One timed session of a race weekend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SessionCode {
    FP1,
    FP2,
    FP3,
    SQ,
    S,
    Q,
    R,
}

impl SessionCode {
    pub const ALL: [SessionCode; 7] = [
        SessionCode::FP1,
        SessionCode::FP2,
        SessionCode::FP3,
        SessionCode::SQ,
        SessionCode::S,
        SessionCode::Q,
        SessionCode::R,
    ];

    /// The code as it appears in cache keys and URLs.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionCode::FP1 => "FP1",
            SessionCode::FP2 => "FP2",
            SessionCode::FP3 => "FP3",
            SessionCode::SQ => "SQ",
            SessionCode::S => "S",
            SessionCode::Q => "Q",
            SessionCode::R => "R",
        }
    }

    /// Label shown to users in progress messages.
    pub fn display_name(self) -> &'static str {
        match self {
            SessionCode::FP1 => "Free Practice 1",
            SessionCode::FP2 => "Free Practice 2",
            SessionCode::FP3 => "Free Practice 3",
            SessionCode::SQ => "Sprint Qualifying",
            SessionCode::S => "Sprint",
            SessionCode::Q => "Qualifying",
            SessionCode::R => "Race",
        }
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        SessionCode::ALL
            .into_iter()
            .find(|code| code.as_str() == upper)
            .ok_or_else(|| CoreError::Validation(format!("Unknown session code: \"{s}\"")))
    }
}

/// A loaded session as reported by the upstream provider.
///
/// This is the `SessionHandle` the executor threads from the session
/// load stage into participant extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub season: i32,
    pub event_round: u32,
    pub session: SessionCode,
    pub event_name: String,
    pub session_date: Option<NaiveDate>,
    /// Participant codes that took part in the session.
    pub participants: Vec<String>,
}

impl SessionInfo {
    pub fn session_label(&self) -> &'static str {
        self.session.display_name()
    }

    pub fn has_participant(&self, code: &str) -> bool {
        self.participants.iter().any(|p| p.eq_ignore_ascii_case(code))
    }
}

/// One entry of a season's event schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    pub round: u32,
    pub name: String,
    pub date: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parses_codes_case_insensitively() {
        assert_eq!("q".parse::<SessionCode>().unwrap(), SessionCode::Q);
        assert_eq!(" fp2 ".parse::<SessionCode>().unwrap(), SessionCode::FP2);
        assert_eq!("SQ".parse::<SessionCode>().unwrap(), SessionCode::SQ);
    }

    #[test]
    fn rejects_unknown_code() {
        assert_matches!("FP4".parse::<SessionCode>(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn display_names_match_codes() {
        assert_eq!(SessionCode::Q.display_name(), "Qualifying");
        assert_eq!(SessionCode::SQ.display_name(), "Sprint Qualifying");
        assert_eq!(SessionCode::R.to_string(), "R");
    }

    #[test]
    fn serde_uses_the_bare_code() {
        let json = serde_json::to_string(&SessionCode::FP1).unwrap();
        assert_eq!(json, "\"FP1\"");
    }

    #[test]
    fn has_participant_ignores_case() {
        let info = SessionInfo {
            season: 2024,
            event_round: 1,
            session: SessionCode::Q,
            event_name: "Bahrain Grand Prix".into(),
            session_date: None,
            participants: vec!["VER".into(), "HAM".into()],
        };
        assert!(info.has_participant("ver"));
        assert!(!info.has_participant("LEC"));
    }
}
