//! Conversation cursors: onboarding, profile editing, and the find-partner
//! dialogue. Each is a tagged enum with an explicit transition table.

use serde::{Deserialize, Serialize};

/// Onboarding questions, asked in order.
///
/// Progresses linearly: AwaitingName → AwaitingMobile → AwaitingEnglishLevel →
/// AwaitingPhoto → AwaitingGender → Registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    AwaitingName,
    AwaitingMobile,
    AwaitingEnglishLevel,
    AwaitingPhoto,
    AwaitingGender,
    Registered,
}

impl OnboardingStep {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: OnboardingStep) -> bool {
        use OnboardingStep::*;
        matches!(
            (self, target),
            (AwaitingName, AwaitingMobile)
                | (AwaitingMobile, AwaitingEnglishLevel)
                | (AwaitingEnglishLevel, AwaitingPhoto)
                | (AwaitingPhoto, AwaitingGender)
                | (AwaitingGender, Registered)
        )
    }

    /// Whether onboarding is finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Registered)
    }

    /// Get the next step in the linear progression, if any.
    pub fn next(&self) -> Option<OnboardingStep> {
        use OnboardingStep::*;
        match self {
            AwaitingName => Some(AwaitingMobile),
            AwaitingMobile => Some(AwaitingEnglishLevel),
            AwaitingEnglishLevel => Some(AwaitingPhoto),
            AwaitingPhoto => Some(AwaitingGender),
            AwaitingGender => Some(Registered),
            Registered => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingName => "awaiting_name",
            Self::AwaitingMobile => "awaiting_mobile",
            Self::AwaitingEnglishLevel => "awaiting_english_level",
            Self::AwaitingPhoto => "awaiting_photo",
            Self::AwaitingGender => "awaiting_gender",
            Self::Registered => "registered",
        }
    }

    /// Decode a persisted value. Unknown values restart onboarding.
    pub fn from_db(s: &str) -> Self {
        match s {
            "awaiting_mobile" => Self::AwaitingMobile,
            "awaiting_english_level" => Self::AwaitingEnglishLevel,
            "awaiting_photo" => Self::AwaitingPhoto,
            "awaiting_gender" => Self::AwaitingGender,
            "registered" => Self::Registered,
            _ => Self::AwaitingName,
        }
    }
}

impl Default for OnboardingStep {
    fn default() -> Self {
        Self::AwaitingName
    }
}

impl std::fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which profile field the user is editing, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditField {
    Idle,
    Name,
    EnglishLevel,
    Gender,
    Photo,
}

impl EditField {
    /// Edits start from `Idle` and always return to it.
    pub fn can_transition_to(&self, target: EditField) -> bool {
        use EditField::*;
        match (self, target) {
            (Idle, Idle) => false,
            (Idle, _) | (_, Idle) => true,
            // Picking another field from the edit menu mid-edit.
            (from, to) => *from != to,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Name => "name",
            Self::EnglishLevel => "english_level",
            Self::Gender => "gender",
            Self::Photo => "photo",
        }
    }

    /// Decode a persisted value. Unknown values mean no edit in progress.
    pub fn from_db(s: &str) -> Self {
        match s {
            "name" => Self::Name,
            "english_level" => Self::EnglishLevel,
            "gender" => Self::Gender,
            "photo" => Self::Photo,
            _ => Self::Idle,
        }
    }
}

impl Default for EditField {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for EditField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position in the find-partner dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindPartnerStep {
    Idle,
    AwaitingEnglishFilter,
    AwaitingGenderFilter,
    Browsing,
}

impl FindPartnerStep {
    pub fn can_transition_to(&self, target: FindPartnerStep) -> bool {
        use FindPartnerStep::*;
        matches!(
            (self, target),
            // "Find partner" may restart the dialogue from anywhere.
            (_, AwaitingEnglishFilter)
                | (AwaitingEnglishFilter, AwaitingGenderFilter)
                | (AwaitingGenderFilter, Browsing)
                // Empty search result.
                | (AwaitingGenderFilter, Idle)
                | (Browsing, Idle)
                | (AwaitingEnglishFilter, Idle)
        )
    }

    /// Whether the next free-text answer is a filter value.
    pub fn awaits_filter(&self) -> bool {
        matches!(self, Self::AwaitingEnglishFilter | Self::AwaitingGenderFilter)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingEnglishFilter => "awaiting_english_filter",
            Self::AwaitingGenderFilter => "awaiting_gender_filter",
            Self::Browsing => "browsing",
        }
    }

    /// Decode a persisted value. Unknown values mean the dialogue is idle.
    pub fn from_db(s: &str) -> Self {
        match s {
            "awaiting_english_filter" => Self::AwaitingEnglishFilter,
            "awaiting_gender_filter" => Self::AwaitingGenderFilter,
            "browsing" => Self::Browsing,
            _ => Self::Idle,
        }
    }
}

impl Default for FindPartnerStep {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for FindPartnerStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STEPS: [OnboardingStep; 6] = [
        OnboardingStep::AwaitingName,
        OnboardingStep::AwaitingMobile,
        OnboardingStep::AwaitingEnglishLevel,
        OnboardingStep::AwaitingPhoto,
        OnboardingStep::AwaitingGender,
        OnboardingStep::Registered,
    ];

    #[test]
    fn onboarding_only_advances_one_step() {
        for from in ALL_STEPS {
            for to in ALL_STEPS {
                let expected = from.next() == Some(to);
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "{from} -> {to} should be {expected}"
                );
            }
        }
    }

    #[test]
    fn next_walks_all_steps() {
        let mut current = OnboardingStep::default();
        let mut seen = vec![current];
        while let Some(next) = current.next() {
            current = next;
            seen.push(current);
        }
        assert_eq!(seen, ALL_STEPS.to_vec());
        assert!(current.is_terminal());
    }

    #[test]
    fn display_matches_serde() {
        for step in ALL_STEPS {
            let json = serde_json::to_string(&step).unwrap();
            assert_eq!(format!("\"{step}\""), json);
        }
        for field in [
            EditField::Idle,
            EditField::Name,
            EditField::EnglishLevel,
            EditField::Gender,
            EditField::Photo,
        ] {
            let json = serde_json::to_string(&field).unwrap();
            assert_eq!(format!("\"{field}\""), json);
        }
        for step in [
            FindPartnerStep::Idle,
            FindPartnerStep::AwaitingEnglishFilter,
            FindPartnerStep::AwaitingGenderFilter,
            FindPartnerStep::Browsing,
        ] {
            let json = serde_json::to_string(&step).unwrap();
            assert_eq!(format!("\"{step}\""), json);
        }
    }

    #[test]
    fn db_roundtrip_and_unknown_fallbacks() {
        for step in ALL_STEPS {
            assert_eq!(OnboardingStep::from_db(step.as_str()), step);
        }
        assert_eq!(OnboardingStep::from_db("42"), OnboardingStep::AwaitingName);
        assert_eq!(EditField::from_db("empty"), EditField::Idle);
        assert_eq!(EditField::from_db("profile_photo"), EditField::Idle);
        assert_eq!(FindPartnerStep::from_db("1002"), FindPartnerStep::Idle);
    }

    #[test]
    fn edit_transitions() {
        assert!(EditField::Idle.can_transition_to(EditField::Name));
        assert!(EditField::Name.can_transition_to(EditField::Idle));
        assert!(EditField::Name.can_transition_to(EditField::Gender));
        assert!(!EditField::Idle.can_transition_to(EditField::Idle));
        assert!(!EditField::Photo.can_transition_to(EditField::Photo));
        assert!(EditField::Photo.is_active());
        assert!(!EditField::Idle.is_active());
    }

    #[test]
    fn find_partner_transitions() {
        use FindPartnerStep::*;
        assert!(Idle.can_transition_to(AwaitingEnglishFilter));
        assert!(Browsing.can_transition_to(AwaitingEnglishFilter));
        assert!(AwaitingEnglishFilter.can_transition_to(AwaitingGenderFilter));
        assert!(AwaitingGenderFilter.can_transition_to(Browsing));
        assert!(!Idle.can_transition_to(Browsing));
        assert!(!Idle.can_transition_to(AwaitingGenderFilter));
        assert!(!AwaitingEnglishFilter.can_transition_to(Browsing));
        assert!(AwaitingGenderFilter.awaits_filter());
        assert!(!Browsing.awaits_filter());
    }
}
