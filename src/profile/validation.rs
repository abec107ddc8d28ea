//! Answer validation: pure functions that normalize one answer each.

use crate::error::ValidationError;

use super::model::{EnglishLevel, Gender, GenderFilter};

/// Longest accepted display name, in characters.
pub const MAX_NAME_CHARS: usize = 64;

/// Digits in a valid mobile number.
const MOBILE_DIGITS: usize = 11;

/// Trim and bound a display name.
pub fn validate_name(input: &str) -> Result<String, ValidationError> {
    let name = input.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(ValidationError::NameTooLong {
            max: MAX_NAME_CHARS,
        });
    }
    Ok(name.to_string())
}

/// Strip spaces, hyphens, and underscores; the rest must be exactly 11 digits.
pub fn validate_mobile(input: &str) -> Result<String, ValidationError> {
    let normalized: String = input
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .collect();

    if normalized.len() == MOBILE_DIGITS && normalized.chars().all(|c| c.is_ascii_digit()) {
        Ok(normalized)
    } else {
        Err(ValidationError::InvalidMobile)
    }
}

pub fn validate_english_level(input: &str) -> Result<EnglishLevel, ValidationError> {
    input.parse()
}

pub fn validate_gender(input: &str) -> Result<Gender, ValidationError> {
    input.parse()
}

pub fn validate_gender_filter(input: &str) -> Result<GenderFilter, ValidationError> {
    input.parse()
}

/// A photo answer must actually carry a photo.
pub fn validate_photo<T>(photo: Option<T>) -> Result<T, ValidationError> {
    photo.ok_or(ValidationError::MissingPhoto)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mobile_accepts_eleven_digits_with_separators() {
        assert_eq!(validate_mobile("09121234567").unwrap(), "09121234567");
        assert_eq!(validate_mobile("0912 123 4567").unwrap(), "09121234567");
        assert_eq!(validate_mobile("0912-123-4567").unwrap(), "09121234567");
        assert_eq!(validate_mobile("0912_123_45 67").unwrap(), "09121234567");
    }

    #[test]
    fn mobile_rejects_everything_else() {
        for bad in [
            "",
            "0912123456",
            "091212345678",
            "0912123456a",
            "+9891212345",
            "0912.123.4567",
            "٠٩١٢١٢٣٤٥٦٧",
            "           ",
        ] {
            assert_eq!(
                validate_mobile(bad),
                Err(ValidationError::InvalidMobile),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn english_level_is_exact() {
        assert_eq!(validate_english_level("Beginner").unwrap(), EnglishLevel::Beginner);
        assert_eq!(
            validate_english_level("Intermediate").unwrap(),
            EnglishLevel::Intermediate
        );
        assert_eq!(validate_english_level("Advanced").unwrap(), EnglishLevel::Advanced);
        for bad in ["", "beginner", "ADVANCED", " Advanced", "Expert"] {
            assert!(validate_english_level(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn gender_answers() {
        assert_eq!(validate_gender("male").unwrap(), Gender::Male);
        assert_eq!(validate_gender("female").unwrap(), Gender::Female);
        assert!(validate_gender("no matter").is_err());
        assert!(validate_gender("👨 Male").is_err());
        assert_eq!(validate_gender_filter("no matter").unwrap(), GenderFilter::Any);
    }

    #[test]
    fn name_is_trimmed_and_bounded() {
        assert_eq!(validate_name("  Sara ").unwrap(), "Sara");
        assert_eq!(validate_name("   "), Err(ValidationError::EmptyName));
        let long = "a".repeat(MAX_NAME_CHARS + 1);
        assert!(matches!(
            validate_name(&long),
            Err(ValidationError::NameTooLong { .. })
        ));
    }

    #[test]
    fn photo_presence() {
        assert_eq!(validate_photo(Some("file-1")).unwrap(), "file-1");
        assert_eq!(
            validate_photo::<&str>(None),
            Err(ValidationError::MissingPhoto)
        );
    }
}
