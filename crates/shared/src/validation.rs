//! Common validation utilities.

use validator::ValidationError;

/// Maximum number of tags on a group.
pub const MAX_TAGS: usize = 20;

/// Maximum length of a single tag.
pub const MAX_TAG_LENGTH: usize = 64;

/// Validates that a display string contains no control characters and is not blank.
pub fn validate_display_text(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        return Err(err);
    }
    if value.chars().any(|c| c.is_control()) {
        let mut err = ValidationError::new("control_characters");
        err.message = Some("Value must not contain control characters".into());
        return Err(err);
    }
    Ok(())
}

/// Validates a list of group tags.
pub fn validate_tags(tags: &[String]) -> Result<(), ValidationError> {
    if tags.len() > MAX_TAGS {
        let mut err = ValidationError::new("too_many_tags");
        err.message = Some(format!("At most {} tags are allowed", MAX_TAGS).into());
        return Err(err);
    }
    for tag in tags {
        let len = tag.trim().chars().count();
        if len == 0 || len > MAX_TAG_LENGTH {
            let mut err = ValidationError::new("tag_length");
            err.message =
                Some(format!("Tags must be between 1 and {} characters", MAX_TAG_LENGTH).into());
            return Err(err);
        }
    }
    Ok(())
}

/// Validates membership questions: each one non-blank, no duplicates.
pub fn validate_questions(questions: &[String]) -> Result<(), ValidationError> {
    let mut seen = std::collections::HashSet::new();
    for question in questions {
        validate_display_text(question)?;
        if !seen.insert(question.trim().to_lowercase()) {
            let mut err = ValidationError::new("duplicate_question");
            err.message = Some("Membership questions must be unique".into());
            return Err(err);
        }
    }
    Ok(())
}
