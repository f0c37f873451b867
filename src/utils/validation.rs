use anyhow::{anyhow, Result};

/// Smallest notice horizon a user may choose, in weeks.
pub const MIN_WEEK: u32 = 1;
/// Largest notice horizon a user may choose, in weeks.
pub const MAX_WEEK: u32 = 3;

/// What a horizon reply turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizonInput {
    /// A week count inside `[MIN_WEEK, MAX_WEEK]`.
    Weeks(u32),
    /// An integer outside the accepted range.
    OutOfRange(i64),
    /// The "no automatic updates" choice.
    NoAutoUpdate,
    /// Anything that does not start with an integer.
    NotNumeric,
}

/// Reads a horizon reply. The leading integer is taken as a week count, so
/// both `2` and the button text `2 שבוע/ות לפני` are accepted.
pub fn parse_horizon(text: &str, no_update_label: &str) -> HorizonInput {
    let text = text.trim();
    if text == no_update_label {
        return HorizonInput::NoAutoUpdate;
    }

    let Some(first) = text.split_whitespace().next() else {
        return HorizonInput::NotNumeric;
    };
    match first.parse::<i64>() {
        Ok(weeks) if (i64::from(MIN_WEEK)..=i64::from(MAX_WEEK)).contains(&weeks) => {
            HorizonInput::Weeks(weeks as u32)
        }
        Ok(weeks) => HorizonInput::OutOfRange(weeks),
        Err(_) => HorizonInput::NotNumeric,
    }
}

/// Pattern an admin-typed user id must match.
pub const USER_ID_PATTERN: &str = r"^\d{6,10}$";

/// Validates a Telegram user id typed by an admin.
pub fn validate_user_id(input: &str) -> Result<u64> {
    let input = input.trim();
    if !(6..=10).contains(&input.len()) || !input.bytes().all(|b| b.is_ascii_digit()) {
        return Err(anyhow!("User id must be 6 to 10 digits"));
    }
    input
        .parse::<u64>()
        .map_err(|_| anyhow!("User id '{}' is not a number", input))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_UPDATE: &str = "ללא עדכונים";

    #[test]
    fn test_parse_horizon_accepts_range() {
        for weeks in MIN_WEEK..=MAX_WEEK {
            let input = parse_horizon(&weeks.to_string(), NO_UPDATE);
            assert_eq!(input, HorizonInput::Weeks(weeks));
        }
    }

    #[test]
    fn test_parse_horizon_rejects_out_of_range() {
        assert_eq!(parse_horizon("0", NO_UPDATE), HorizonInput::OutOfRange(0));
        assert_eq!(parse_horizon("4", NO_UPDATE), HorizonInput::OutOfRange(4));
        assert_eq!(parse_horizon("-2", NO_UPDATE), HorizonInput::OutOfRange(-2));
    }

    #[test]
    fn test_parse_horizon_button_text() {
        assert_eq!(parse_horizon("2 שבוע/ות לפני", NO_UPDATE), HorizonInput::Weeks(2));
        assert_eq!(parse_horizon(NO_UPDATE, NO_UPDATE), HorizonInput::NoAutoUpdate);
    }

    #[test]
    fn test_parse_horizon_non_numeric() {
        assert_eq!(parse_horizon("שבועיים", NO_UPDATE), HorizonInput::NotNumeric);
        assert_eq!(parse_horizon("", NO_UPDATE), HorizonInput::NotNumeric);
        assert_eq!(parse_horizon("2.5", NO_UPDATE), HorizonInput::NotNumeric);
    }

    #[test]
    fn test_validate_user_id() {
        assert_eq!(validate_user_id("123456").unwrap(), 123456);
        assert_eq!(validate_user_id(" 1234567890 ").unwrap(), 1234567890);
        assert!(validate_user_id("12345").is_err());
        assert!(validate_user_id("12345678901").is_err());
        assert!(validate_user_id("12a456").is_err());
    }
}
