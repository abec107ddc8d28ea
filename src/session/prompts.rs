//! User-facing texts for the partner bot.

use crate::channels::{Keyboard, OutgoingMessage};
use crate::error::ValidationError;
use crate::profile::{CandidateSnapshot, Contact, EditField, OnboardingStep, UserId, UserProfile};
use crate::rate_limit::format_remaining;

pub const WELCOME: &str = "Welcome to the English Partner Bot! 🇬🇧👥\n\n\
    Nice to meet you. This bot helps you find a partner at your English level \
    to practice with. Complete the registration steps to build your profile, \
    then start searching. Your mobile number stays private; only your \
    Telegram username and profile photo are shown to others.";

pub const WELCOME_BACK: &str = "🤗 Welcome back! 👋";

pub const REGISTRATION_COMPLETE: &str =
    "Thank you for completing the registration! You are now a registered user.";

pub const REGISTER_FIRST: &str = "Please complete the registration first.";

pub const MAIN_MENU_HINT: &str = "Please choose one of the options from the menu below.";

pub const MOBILE_SKIP_NOT_EXPECTED: &str = "Your registration is already complete.";

pub const TRY_AGAIN_LATER: &str = "Something went wrong on our side. Please try again later.";

pub const PHOTO_UPLOAD_FAILED: &str =
    "We could not save your photo. Please upload it again.";

// ── Edit profile ────────────────────────────────────────────────────

pub const EDIT_MENU: &str = "Choose one of the options below:";

pub fn edit_prompt(field: EditField) -> &'static str {
    match field {
        EditField::Name => "Please Type Your Name:",
        EditField::EnglishLevel => "Please Select Your English Level:",
        EditField::Gender => "Please Select Your Gender:",
        EditField::Photo | EditField::Idle => "Please Upload Your Profile Photo:",
    }
}

pub fn edit_keyboard(field: EditField) -> Keyboard {
    match field {
        EditField::EnglishLevel => Keyboard::EditEnglishLevel,
        EditField::Gender => Keyboard::EditGender,
        _ => Keyboard::EditMenu,
    }
}

pub fn edit_confirmation(field: EditField) -> &'static str {
    match field {
        EditField::Name => "Your name has been edited successfully",
        EditField::EnglishLevel => "Your English Level has been edited successfully",
        EditField::Gender => "Your Gender has been edited successfully",
        EditField::Photo | EditField::Idle => "Your Profile Photo has been updated successfully",
    }
}

// ── Onboarding ──────────────────────────────────────────────────────

/// The question for an onboarding step, with its keyboard.
pub fn question(user: UserId, step: OnboardingStep) -> OutgoingMessage {
    let (text, keyboard) = match step {
        OnboardingStep::AwaitingName => ("What's your name?", Keyboard::Remove),
        OnboardingStep::AwaitingMobile => ("What's your mobile number?", Keyboard::SkipMobile),
        OnboardingStep::AwaitingEnglishLevel => {
            ("What's your English level?", Keyboard::EnglishLevels)
        }
        OnboardingStep::AwaitingPhoto => ("Upload your profile photo.", Keyboard::Remove),
        OnboardingStep::AwaitingGender => ("What is your gender?", Keyboard::Genders),
        OnboardingStep::Registered => (WELCOME_BACK, Keyboard::MainMenu),
    };
    OutgoingMessage::text(user, text).with_keyboard(keyboard)
}

/// Re-prompt text for an answer that failed validation.
pub fn validation_message(err: &ValidationError) -> String {
    match err {
        ValidationError::EmptyName => "Please type your name.".to_string(),
        ValidationError::NameTooLong { max } => {
            format!("That name is too long. Please use at most {max} characters.")
        }
        ValidationError::InvalidMobile => {
            "Invalid mobile number. Please enter a valid 11-digit mobile number.".to_string()
        }
        ValidationError::InvalidEnglishLevel(_) => {
            "Invalid English level. Please select from Beginner, Intermediate, or Advanced."
                .to_string()
        }
        ValidationError::InvalidGender(_) => {
            "Invalid Gender. Please select from Male or Female.".to_string()
        }
        ValidationError::InvalidGenderFilter(_) => {
            "Invalid gender option. Please select from Male, Female, or Does Not Matter."
                .to_string()
        }
        ValidationError::MissingPhoto => "Please upload your profile photo.".to_string(),
        ValidationError::ExpectedText => "Please answer with text.".to_string(),
    }
}

// ── Find partner ────────────────────────────────────────────────────

pub const ASK_ENGLISH_FILTER: &str =
    "What's the preferred English level of your potential partner?";
pub const ASK_GENDER_FILTER: &str = "What's the preferred gender of your potential partner?";
pub const NO_MATCHES: &str = "No matching partners found. Try adjusting your preferences.";
pub const NO_MORE_CANDIDATES: &str =
    "There are no other partners for you right now. Try another search later.";
pub const SEARCH_EXPIRED: &str = "Your search results have expired. Let's search again.";
pub const BROWSE_HINT: &str = "Please ✅ Follow or Watch ➡️ Next Partner...";
pub const FOLLOW_NOT_SHOWN: &str =
    "Find a partner first, then follow the one you are looking at.";

pub fn cooldown(remaining: std::time::Duration) -> String {
    format!(
        "🔒⏰ You need to wait {} before finding the next partner.",
        format_remaining(remaining)
    )
}

pub fn candidate_card(candidate: &CandidateSnapshot) -> String {
    format!(
        "👥 Partner Details:\nName: {}\nEnglish Level: {}\n\n{BROWSE_HINT}",
        candidate.name,
        display_or_dash(candidate.english_level.map(|l| l.as_str())),
    )
}

// ── Profile ─────────────────────────────────────────────────────────

pub fn profile_card(profile: &UserProfile) -> String {
    format!(
        "🧑‍💼 User Profile Details:\nName: {}\nMobile Number: {}\nEnglish Level: {}\nGender: {}",
        profile.name,
        display_or_dash(profile.mobile_number.as_deref()),
        display_or_dash(profile.english_level.map(|l| l.as_str())),
        display_or_dash(profile.gender.map(|g| g.as_str())),
    )
}

fn display_or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

// ── Follow requests ─────────────────────────────────────────────────

pub const FOLLOW_SENT: &str = "Your follow request has been sent!";
pub const FOLLOW_ALREADY_SENT: &str = "You have already sent a follow request to this partner.";
pub const NO_REQUEST_TO_ACCEPT: &str = "No follow request found to Accept.";
pub const NO_REQUEST_TO_DECLINE: &str = "No follow request found to delete.";
pub const YOU_DECLINED: &str = "You have declined the follow request.";

pub fn follow_request_card(requester: &UserProfile) -> String {
    format!(
        "{} is requesting to follow you. ✅ Accept or ❌ Decline?\nEnglish Level: {}\n",
        requester.name,
        display_or_dash(requester.english_level.map(|l| l.as_str())),
    )
}

/// Sent to the requester: how to reach the target who accepted.
pub fn accepted_for_requester(target: &UserProfile) -> String {
    match target.contact() {
        Contact::Handle(handle) => format!(
            "{} has accepted your follow request! 🎉\nAccepted username: @{handle}",
            target.name
        ),
        Contact::Mobile(mobile) => format!(
            "{} has accepted your follow request! 🎉\nAccepted Mobile Number: {mobile}",
            target.name
        ),
        Contact::Unavailable => format!(
            "{} has accepted your follow request! 🎉\nThey have not shared any contact details yet.",
            target.name
        ),
    }
}

/// Sent to the target: how to reach the requester they accepted.
pub fn accepted_for_target(requester: &UserProfile) -> String {
    match requester.contact() {
        Contact::Handle(handle) => {
            format!("You have accepted the follow request\nusername: @{handle}")
        }
        Contact::Mobile(mobile) => {
            format!("You have accepted the follow request\nMobile Number: {mobile}")
        }
        Contact::Unavailable => format!(
            "You have accepted the follow request from {}.\nThey have not shared any contact details yet.",
            requester.name
        ),
    }
}

pub fn declined_for_requester(target: &UserProfile) -> String {
    format!("{} has declined your follow request. 😔", target.name)
}
