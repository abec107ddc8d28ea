//! Reply keyboards, button captions, and decoding of button presses back
//! into canonical inbound values.

use serde_json::{Value, json};

use super::types::{FollowDecision, Inbound, MenuCommand};
use crate::profile::{EditField, EnglishLevel, Gender, GenderFilter, UserId};

// ── Button captions ─────────────────────────────────────────────────

pub const FIND_PARTNER: &str = "🤜🤛👥 Find Partner";
pub const SHOW_PROFILE: &str = "🧑‍💼 Show Profile";
pub const EDIT_PROFILE: &str = "🧑‍💼🛠️ Edit Profile";

pub const MALE: &str = "👨 Male";
pub const FEMALE: &str = "👩 Female";
pub const NO_MATTER: &str = "🤷‍♂️ Does Not Matter";

pub const FOLLOW_PARTNER: &str = "✅ Follow Partner";
pub const NEXT_PARTNER: &str = "➡️ Next Partner";
pub const BACK_HOME: &str = "🏠 Back To Home Menu";
pub const SKIP_MOBILE: &str = "⏭️ I do not want to enter mobile number";

pub const EDIT_NAME: &str = "👤 Edit Name";
pub const EDIT_ENGLISH_LEVEL: &str = "🗣️🌍 Edit English Level";
pub const EDIT_GENDER: &str = "👫 Edit Gender";
pub const EDIT_PHOTO: &str = "🖼️ Edit Profile Photo";

pub const ACCEPT: &str = "✅ Accept";
pub const DECLINE: &str = "❌ Decline";

const ACCEPT_PREFIX: &str = "accept_follow:";
const DECLINE_PREFIX: &str = "decline_follow:";

/// Keyboards attached to outgoing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyboard {
    MainMenu,
    EnglishLevels,
    Genders,
    GenderFilter,
    Browse,
    BackHome,
    SkipMobile,
    EditMenu,
    EditEnglishLevel,
    EditGender,
    /// Inline accept/decline buttons for a pending follow request.
    FollowResponse { requester_id: UserId },
    /// Hide any reply keyboard.
    Remove,
}

fn level_row() -> Vec<&'static str> {
    EnglishLevel::ALL.iter().map(EnglishLevel::as_str).collect()
}

fn edit_menu_rows() -> Vec<Vec<&'static str>> {
    vec![
        vec![EDIT_NAME, EDIT_ENGLISH_LEVEL],
        vec![EDIT_GENDER, EDIT_PHOTO],
    ]
}

impl Keyboard {
    /// Button captions, row by row. Empty for inline and removal markups.
    pub fn rows(&self) -> Vec<Vec<&'static str>> {
        match self {
            Self::MainMenu => vec![vec![FIND_PARTNER], vec![SHOW_PROFILE, EDIT_PROFILE]],
            Self::EnglishLevels => vec![level_row()],
            Self::Genders => vec![vec![MALE, FEMALE]],
            Self::GenderFilter => vec![vec![MALE, FEMALE], vec![NO_MATTER]],
            Self::Browse => vec![vec![FOLLOW_PARTNER, NEXT_PARTNER], vec![BACK_HOME]],
            Self::BackHome => vec![vec![BACK_HOME]],
            Self::SkipMobile => vec![vec![SKIP_MOBILE]],
            Self::EditMenu => {
                let mut rows = edit_menu_rows();
                rows.push(vec![BACK_HOME]);
                rows
            }
            Self::EditEnglishLevel => {
                let mut rows = vec![level_row()];
                rows.extend(edit_menu_rows());
                rows.push(vec![BACK_HOME]);
                rows
            }
            Self::EditGender => {
                let mut rows = vec![vec![MALE, FEMALE]];
                rows.extend(edit_menu_rows());
                rows.push(vec![BACK_HOME]);
                rows
            }
            Self::FollowResponse { .. } | Self::Remove => Vec::new(),
        }
    }

    /// Telegram `reply_markup` for this keyboard.
    pub fn reply_markup(&self) -> Value {
        match self {
            Self::Remove => json!({ "remove_keyboard": true }),
            Self::FollowResponse { requester_id } => json!({
                "inline_keyboard": [[
                    { "text": ACCEPT, "callback_data": format!("{ACCEPT_PREFIX}{requester_id}") },
                    { "text": DECLINE, "callback_data": format!("{DECLINE_PREFIX}{requester_id}") },
                ]]
            }),
            _ => {
                let keyboard: Vec<Vec<Value>> = self
                    .rows()
                    .into_iter()
                    .map(|row| row.into_iter().map(|text| json!({ "text": text })).collect())
                    .collect();
                json!({ "keyboard": keyboard, "resize_keyboard": true })
            }
        }
    }
}

/// Decode a text message, mapping button captions to commands or canonical
/// answer tokens.
pub fn decode_text(text: &str) -> Inbound {
    let trimmed = text.trim();
    let command = match trimmed {
        "/start" => return Inbound::Start,
        FIND_PARTNER => MenuCommand::FindPartner,
        SHOW_PROFILE => MenuCommand::ShowProfile,
        EDIT_PROFILE => MenuCommand::EditProfile,
        EDIT_NAME => MenuCommand::Edit(EditField::Name),
        EDIT_ENGLISH_LEVEL => MenuCommand::Edit(EditField::EnglishLevel),
        EDIT_GENDER => MenuCommand::Edit(EditField::Gender),
        EDIT_PHOTO => MenuCommand::Edit(EditField::Photo),
        NEXT_PARTNER => MenuCommand::NextPartner,
        FOLLOW_PARTNER => MenuCommand::FollowPartner,
        BACK_HOME => MenuCommand::BackToHome,
        SKIP_MOBILE => MenuCommand::SkipMobile,
        MALE => return Inbound::Text(Gender::Male.as_str().to_string()),
        FEMALE => return Inbound::Text(Gender::Female.as_str().to_string()),
        NO_MATTER => return Inbound::Text(GenderFilter::ANY_TOKEN.to_string()),
        // Bot commands with a @botname suffix.
        other if other.starts_with("/start@") => return Inbound::Start,
        _ => return Inbound::Text(text.to_string()),
    };
    Inbound::Command(command)
}

/// Decode inline-button callback data.
pub fn decode_callback(data: &str) -> Option<Inbound> {
    let (decision, id) = if let Some(id) = data.strip_prefix(ACCEPT_PREFIX) {
        (FollowDecision::Accept, id)
    } else if let Some(id) = data.strip_prefix(DECLINE_PREFIX) {
        (FollowDecision::Decline, id)
    } else {
        return None;
    };
    let requester_id = id.trim().parse::<UserId>().ok()?;
    Some(Inbound::FollowDecision {
        decision,
        requester_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_captions_decode_to_commands() {
        assert_eq!(decode_text("/start"), Inbound::Start);
        assert_eq!(decode_text("/start@partner_bot"), Inbound::Start);
        assert_eq!(
            decode_text(FIND_PARTNER),
            Inbound::Command(MenuCommand::FindPartner)
        );
        assert_eq!(
            decode_text(EDIT_PHOTO),
            Inbound::Command(MenuCommand::Edit(EditField::Photo))
        );
        assert_eq!(
            decode_text(BACK_HOME),
            Inbound::Command(MenuCommand::BackToHome)
        );
    }

    #[test]
    fn gender_captions_decode_to_tokens() {
        assert_eq!(decode_text(MALE), Inbound::Text("male".into()));
        assert_eq!(decode_text(FEMALE), Inbound::Text("female".into()));
        assert_eq!(decode_text(NO_MATTER), Inbound::Text("no matter".into()));
    }

    #[test]
    fn free_text_passes_through() {
        assert_eq!(decode_text("Alice"), Inbound::Text("Alice".into()));
        assert_eq!(decode_text("Beginner"), Inbound::Text("Beginner".into()));
    }

    #[test]
    fn callbacks() {
        assert_eq!(
            decode_callback("accept_follow:42"),
            Some(Inbound::FollowDecision {
                decision: FollowDecision::Accept,
                requester_id: 42
            })
        );
        assert_eq!(
            decode_callback("decline_follow:7"),
            Some(Inbound::FollowDecision {
                decision: FollowDecision::Decline,
                requester_id: 7
            })
        );
        assert_eq!(decode_callback("accept_follow:abc"), None);
        assert_eq!(decode_callback("something_else"), None);
    }

    #[test]
    fn reply_markup_shapes() {
        let main = Keyboard::MainMenu.reply_markup();
        assert_eq!(main["resize_keyboard"], true);
        assert_eq!(main["keyboard"][0][0]["text"], FIND_PARTNER);

        assert_eq!(
            Keyboard::Remove.reply_markup(),
            json!({ "remove_keyboard": true })
        );

        let inline = Keyboard::FollowResponse { requester_id: 9 }.reply_markup();
        assert_eq!(inline["inline_keyboard"][0][0]["callback_data"], "accept_follow:9");
        assert_eq!(inline["inline_keyboard"][0][1]["callback_data"], "decline_follow:9");
    }

    #[test]
    fn every_reply_caption_round_trips() {
        for keyboard in [
            Keyboard::MainMenu,
            Keyboard::Browse,
            Keyboard::EditEnglishLevel,
            Keyboard::EditGender,
            Keyboard::SkipMobile,
        ] {
            for caption in keyboard.rows().into_iter().flatten() {
                // Level names are answers, everything else is a command or token.
                let decoded = decode_text(caption);
                if EnglishLevel::ALL.iter().any(|l| l.as_str() == caption) {
                    assert_eq!(decoded, Inbound::Text(caption.to_string()));
                } else {
                    assert!(
                        !matches!(decoded, Inbound::Text(ref t) if t == caption),
                        "caption {caption:?} decoded as raw text"
                    );
                }
            }
        }
    }
}
