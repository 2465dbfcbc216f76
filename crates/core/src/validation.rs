//! Field validators and upload limits.

use once_cell::sync::Lazy;
use regex::Regex;
use seventv_common::{AppError, AppResult};

/// Emote names: 2 to 100 characters of letters, digits and `-_():`.
pub static EMOTE_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[-_A-Za-z():0-9]{2,100}$").unwrap()
});

/// Emote tags: 3 to 30 lowercase letters or digits.
pub static EMOTE_TAG_REGEX: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[0-9a-z]{3,30}$").unwrap()
});

/// Tags per emote.
pub const MAX_TAGS: usize = 6;

/// Frames per uploaded image.
pub const MAX_FRAME_COUNT: i32 = 750;

/// Width of an uploaded image.
pub const MAX_WIDTH: i32 = 1000;

/// Height of an uploaded image.
pub const MAX_HEIGHT: i32 = 1000;

/// Emote sets per owner.
pub const MAX_EMOTE_SETS: u64 = 10;

/// Capacity of a new emote set.
pub const DEFAULT_SET_CAPACITY: i32 = 250;

/// Editors per user.
pub const MAX_EDITORS: usize = 15;

/// Pending ownership claims per emote.
pub const MAX_CLAIMANTS: usize = 10;

/// Check an emote or active emote name.
pub fn emote_name(name: &str) -> AppResult<()> {
    if EMOTE_NAME_REGEX.is_match(name) {
        Ok(())
    } else {
        Err(AppError::invalid("Bad Emote Name").with_field("NAME", name))
    }
}

/// Check tags and de-duplicate them, keeping the first occurrence.
pub fn emote_tags(tags: &[String]) -> AppResult<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        if !EMOTE_TAG_REGEX.is_match(tag) {
            return Err(AppError::invalid("Bad Emote Tag").with_field("TAG", tag.as_str()));
        }
        if !out.contains(tag) {
            out.push(tag.clone());
        }
    }

    if out.len() > MAX_TAGS {
        return Err(AppError::invalid(format!("Too Many Tags ({MAX_TAGS})")));
    }
    Ok(out)
}

/// Longest accepted version description, in characters.
pub const MAX_DESCRIPTION_LENGTH: usize = 100;

/// Check a version description.
pub fn emote_description(description: &str) -> AppResult<()> {
    if description.chars().count() <= MAX_DESCRIPTION_LENGTH {
        Ok(())
    } else {
        Err(AppError::invalid(format!(
            "Description too long ({MAX_DESCRIPTION_LENGTH})"
        )))
    }
}

/// Check an emote set name.
pub fn emote_set_name(name: &str) -> AppResult<()> {
    let len = name.chars().count();
    if (1..=40).contains(&len) {
        Ok(())
    } else {
        Err(AppError::invalid("Bad Emote Set Name").with_field("NAME", name))
    }
}

/// Check probed image dimensions against the upload limits.
pub fn image_metrics(width: i32, height: i32, frame_count: i32) -> AppResult<()> {
    if frame_count > MAX_FRAME_COUNT {
        return Err(AppError::invalid(format!(
            "Too many frames. Got {frame_count}, max {MAX_FRAME_COUNT}"
        )));
    }
    if width <= 0 || width > MAX_WIDTH {
        return Err(AppError::invalid(format!(
            "Bad input width. Got {width}, max {MAX_WIDTH}"
        )));
    }
    if height <= 0 || height > MAX_HEIGHT {
        return Err(AppError::invalid(format!(
            "Bad input height. Got {height}, max {MAX_HEIGHT}"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_emote_names() {
        assert!(emote_name("PagMan").is_ok());
        assert!(emote_name("D:").is_ok());
        assert!(emote_name("(ditto)").is_ok());
        assert!(emote_name("x").is_err());
        assert!(emote_name("has space").is_err());
        assert!(emote_name(&"a".repeat(101)).is_err());
    }

    #[test]
    fn test_tags_are_deduplicated() {
        let tags = vec!["pog".to_string(), "frog".to_string(), "pog".to_string()];
        assert_eq!(emote_tags(&tags).unwrap(), vec!["pog", "frog"]);
    }

    #[test]
    fn test_tags_are_checked() {
        assert!(emote_tags(&["Pog".to_string()]).is_err());
        assert!(emote_tags(&["ab".to_string()]).is_err());

        let seven: Vec<String> = (0..7).map(|i| format!("tag{i}")).collect();
        assert!(emote_tags(&seven).is_err());
    }

    #[test]
    fn test_frame_limit_boundary() {
        assert!(image_metrics(512, 512, 750).is_ok());
        assert!(image_metrics(512, 512, 751).is_err());
    }

    #[test]
    fn test_dimension_limits() {
        assert!(image_metrics(1000, 1000, 1).is_ok());
        assert!(image_metrics(0, 32, 1).is_err());
        assert!(image_metrics(32, 1001, 1).is_err());
    }

    #[test]
    fn test_set_name_length() {
        assert!(emote_set_name("Channel Emotes").is_ok());
        assert!(emote_set_name("").is_err());
        assert!(emote_set_name(&"a".repeat(41)).is_err());
    }
}
