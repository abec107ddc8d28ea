//! User profiles: data model, conversation cursors, and answer validation.

pub mod model;
pub mod state;
pub mod validation;

pub use model::{
    CandidateSnapshot, Contact, EnglishLevel, Gender, GenderFilter, MediaId, UserId, UserProfile,
};
pub use state::{EditField, FindPartnerStep, OnboardingStep};
