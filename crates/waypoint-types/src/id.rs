//! Conversation and continuation identifiers.
//!
//! Both ids wrap a random UUIDv4 (122 random bits) and render in simple form:
//! exactly 32 lowercase hex digits, no hyphens. Parsing accepts only that form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Length of an encoded id in characters.
pub const ENCODED_ID_LEN: usize = 32;

/// Errors produced when parsing an encoded id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("id is empty")]
    Empty,

    #[error("id must be 32 characters, got {0}")]
    Length(usize),

    #[error("id contains invalid character '{0}'")]
    InvalidChar(char),
}

fn parse_simple(encoded: &str) -> Result<Uuid, IdError> {
    if encoded.is_empty() {
        return Err(IdError::Empty);
    }
    if let Some(c) = encoded
        .chars()
        .find(|c| !matches!(c, '0'..='9' | 'a'..='f'))
    {
        return Err(IdError::InvalidChar(c));
    }
    if encoded.len() != ENCODED_ID_LEN {
        return Err(IdError::Length(encoded.len()));
    }
    Uuid::try_parse(encoded).map_err(|_| IdError::Length(encoded.len()))
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random id.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse the 32-hex-digit simple form.
            pub fn parse(encoded: &str) -> Result<Self, IdError> {
                parse_simple(encoded).map(Self)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.simple())
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::parse(&s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.to_string()
            }
        }
    };
}

define_id!(
    /// Identifies one conversation: a logical user interaction spanning many
    /// requests.
    ConversationId
);

define_id!(
    /// Identifies one continuation (one saved snapshot) within a conversation.
    ContinuationId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_as_32_lowercase_hex() {
        let id = ConversationId::generate();
        let encoded = id.to_string();
        assert_eq!(encoded.len(), ENCODED_ID_LEN);
        assert!(encoded.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(ConversationId::parse(&encoded).unwrap(), id);
    }

    #[test]
    fn generated_ids_are_version_4() {
        let id = ContinuationId::generate();
        assert_eq!(id.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn generated_ids_differ() {
        let a = ContinuationId::generate();
        let b = ContinuationId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(ConversationId::parse(""), Err(IdError::Empty));
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(ConversationId::parse("abc123"), Err(IdError::Length(6)));
    }

    #[test]
    fn rejects_hyphenated_and_uppercase_forms() {
        let id = Uuid::new_v4();
        assert_eq!(
            ConversationId::parse(&id.hyphenated().to_string()),
            Err(IdError::InvalidChar('-'))
        );
        let upper = id.simple().to_string().to_uppercase();
        assert!(matches!(
            ContinuationId::parse(&upper),
            Err(IdError::InvalidChar(_))
        ));
    }

    #[test]
    fn rejects_non_ascii() {
        let forged = format!("{}é", "a".repeat(30));
        assert_eq!(
            ContinuationId::parse(&forged),
            Err(IdError::InvalidChar('é'))
        );
    }

    #[test]
    fn serde_uses_encoded_form() {
        let id = ConversationId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: ConversationId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<ConversationId>("\"nope\"").is_err());
    }
}
