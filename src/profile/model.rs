//! User profile data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{EditField, FindPartnerStep, OnboardingStep};
use crate::error::ValidationError;

/// External (Telegram) user id.
pub type UserId = i64;

/// Opaque reference to a stored photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(pub i64);

impl std::fmt::Display for MediaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Self-reported English level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnglishLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl EnglishLevel {
    pub const ALL: [EnglishLevel; 3] = [Self::Beginner, Self::Intermediate, Self::Advanced];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "Beginner",
            Self::Intermediate => "Intermediate",
            Self::Advanced => "Advanced",
        }
    }
}

impl std::str::FromStr for EnglishLevel {
    type Err = ValidationError;

    /// Exact, case-sensitive match on the canonical labels.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Beginner" => Ok(Self::Beginner),
            "Intermediate" => Ok(Self::Intermediate),
            "Advanced" => Ok(Self::Advanced),
            other => Err(ValidationError::InvalidEnglishLevel(other.to_string())),
        }
    }
}

impl std::fmt::Display for EnglishLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }
}

impl std::str::FromStr for Gender {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Self::Male),
            "female" => Ok(Self::Female),
            other => Err(ValidationError::InvalidGender(other.to_string())),
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gender predicate of a partner search. `Any` disables the predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenderFilter {
    Only(Gender),
    Any,
}

impl GenderFilter {
    /// Canonical token for the wildcard.
    pub const ANY_TOKEN: &'static str = "no matter";

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Only(g) => g.as_str(),
            Self::Any => Self::ANY_TOKEN,
        }
    }

    pub fn gender(&self) -> Option<Gender> {
        match self {
            Self::Only(g) => Some(*g),
            Self::Any => None,
        }
    }

    pub fn accepts(&self, gender: Option<Gender>) -> bool {
        match self {
            Self::Any => true,
            Self::Only(wanted) => gender == Some(*wanted),
        }
    }
}

impl std::str::FromStr for GenderFilter {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == Self::ANY_TOKEN {
            return Ok(Self::Any);
        }
        s.parse::<Gender>()
            .map(Self::Only)
            .map_err(|_| ValidationError::InvalidGenderFilter(s.to_string()))
    }
}

impl std::fmt::Display for GenderFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One bot user, including the persisted session cursors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub telegram_id: UserId,
    /// Public handle (Telegram username), refreshed from inbound events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub name: String,
    /// `None` when the user chose not to share a number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_number: Option<String>,
    pub english_level: Option<EnglishLevel>,
    pub gender: Option<Gender>,
    pub photo: Option<MediaId>,
    pub onboarding: OnboardingStep,
    pub editing: EditField,
    pub find_partner: FindPartnerStep,
    pub last_english_filter: Option<EnglishLevel>,
    pub last_gender_filter: Option<GenderFilter>,
    pub view_window_start: Option<DateTime<Utc>>,
    pub views_in_window: u32,
    /// Index into the cached match list; only meaningful while that list exists.
    pub browse_cursor: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// A brand-new profile at the start of onboarding.
    pub fn new(telegram_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            telegram_id,
            username: None,
            name: String::new(),
            mobile_number: None,
            english_level: None,
            gender: None,
            photo: None,
            onboarding: OnboardingStep::default(),
            editing: EditField::default(),
            find_partner: FindPartnerStep::default(),
            last_english_filter: None,
            last_gender_filter: None,
            view_window_start: None,
            views_in_window: 0,
            browse_cursor: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.onboarding.is_terminal()
    }

    /// Snapshot of the fields a requester sees while browsing.
    pub fn to_candidate(&self) -> CandidateSnapshot {
        CandidateSnapshot {
            telegram_id: self.telegram_id,
            name: self.name.clone(),
            english_level: self.english_level,
            gender: self.gender,
            photo: self.photo,
        }
    }

    /// Contact details revealed once a follow request is accepted.
    pub fn contact(&self) -> Contact {
        if let Some(handle) = self.username.as_deref().filter(|h| !h.is_empty()) {
            return Contact::Handle(handle.to_string());
        }
        match self.mobile_number.as_deref().filter(|m| !m.is_empty()) {
            Some(mobile) => Contact::Mobile(mobile.to_string()),
            None => Contact::Unavailable,
        }
    }
}

/// Denormalized candidate data stored in the match cache.
///
/// May go stale relative to the source profile until the next search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSnapshot {
    pub telegram_id: UserId,
    pub name: String,
    pub english_level: Option<EnglishLevel>,
    pub gender: Option<Gender>,
    pub photo: Option<MediaId>,
}

/// How to reach a user after an accepted follow request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contact {
    Handle(String),
    Mobile(String),
    Unavailable,
}
