//! Branded ID newtypes for type safety.
//!
//! Every entity in the Fable engine has a distinct ID type implemented as a
//! newtype wrapper around `String`. This prevents accidentally passing a
//! world ID where a session ID is expected.
//!
//! Freshly minted IDs are UUID v7 (time-ordered) via [`uuid::Uuid::now_v7`];
//! IDs loaded from documents keep whatever string the document of record
//! assigned.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Generate a new UUID v7 string (time-ordered).
fn new_v7() -> String {
    Uuid::now_v7().to_string()
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(new_v7())
            }

            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Unique identifier for a player session.
    SessionId
}

branded_id! {
    /// Unique identifier for a world document.
    WorldId
}

branded_id! {
    /// Unique identifier for an adventure document.
    AdventureId
}

branded_id! {
    /// Unique identifier for an NPC document.
    NpcId
}

branded_id! {
    /// Unique identifier for a scene within an adventure.
    SceneId
}

branded_id! {
    /// Unique identifier for a single turn.
    TurnId
}

branded_id! {
    /// Unique identifier for a ruleset document.
    RulesetId
}

branded_id! {
    /// Unique identifier for a scenario (adventure start) document.
    ScenarioId
}
