//! Topic name and topic filter validation.
//!
//! ```
//! use seismq_core::topic::{validate_filter, validate_name};
//!
//! assert!(validate_name("sensors/quake").is_ok());
//! assert!(validate_name("sensors/+").is_err());
//! assert!(validate_filter("sensors/+/magnitude").is_ok());
//! assert!(validate_filter("sensors/#/magnitude").is_err());
//! ```

use thiserror::Error;

/// Maximum topic name/filter length in bytes (UTF-8 encoded).
pub const MAX_TOPIC_LENGTH: usize = 65535;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopicError {
    #[error("topic cannot be empty")]
    Empty,

    #[error("topic exceeds 65535 bytes")]
    TooLong,

    #[error("topic cannot contain the null character")]
    NullChar,

    #[error("wildcards (+, #) are not allowed in topic names")]
    WildcardInName,

    #[error("'+' must occupy a whole topic level")]
    SingleLevelWildcard,

    #[error("'#' must be the last level and occupy it entirely")]
    MultiLevelWildcard,
}

/// Validate a topic name used for publishing.
pub fn validate_name(topic: &str) -> Result<(), TopicError> {
    check_length_and_chars(topic)?;

    if topic.contains(&['+', '#'][..]) {
        return Err(TopicError::WildcardInName);
    }

    Ok(())
}

/// Validate a topic filter used for subscribing.
pub fn validate_filter(filter: &str) -> Result<(), TopicError> {
    check_length_and_chars(filter)?;

    let mut levels = filter.split('/').peekable();

    while let Some(level) = levels.next() {
        if level.contains('+') && level != "+" {
            return Err(TopicError::SingleLevelWildcard);
        }

        if level.contains('#') && (level != "#" || levels.peek().is_some()) {
            return Err(TopicError::MultiLevelWildcard);
        }
    }

    Ok(())
}

fn check_length_and_chars(topic: &str) -> Result<(), TopicError> {
    if topic.is_empty() {
        return Err(TopicError::Empty);
    }

    if topic.len() > MAX_TOPIC_LENGTH {
        return Err(TopicError::TooLong);
    }

    if topic.contains('\0') {
        return Err(TopicError::NullChar);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        for ok in ["a", "sensors/quake", "/leading", "trailing/", "$SYS/uptime"] {
            assert!(validate_name(ok).is_ok(), "{}", ok);
        }

        assert_eq!(validate_name(""), Err(TopicError::Empty));
        assert_eq!(validate_name("a\0b"), Err(TopicError::NullChar));
        assert_eq!(validate_name("sensors/#"), Err(TopicError::WildcardInName));
        assert_eq!(
            validate_name(&"a".repeat(MAX_TOPIC_LENGTH + 1)),
            Err(TopicError::TooLong)
        );
    }

    #[test]
    fn test_filters() {
        for ok in ["#", "+", "+/+/#", "sensors/+/quake", "/", "/#", "bmkg/weather/forecast/#"] {
            assert!(validate_filter(ok).is_ok(), "{}", ok);
        }

        assert_eq!(
            validate_filter("sensors/quake+"),
            Err(TopicError::SingleLevelWildcard)
        );
        assert_eq!(
            validate_filter("sensors/#/quake"),
            Err(TopicError::MultiLevelWildcard)
        );
        assert_eq!(validate_filter("sensors#"), Err(TopicError::MultiLevelWildcard));
    }
}
