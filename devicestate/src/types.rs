//! Identifier and category types.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps the given string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Stable internal device identifier, derived from the hardware id.
    DeviceKey
);

string_id!(
    /// Externally visible device identifier.
    LogicalId
);

/// Independent axis of device state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Periodic status report (battery, signal, ...).
    Status,
    /// Authentication / login event.
    Login,
    /// Location fix.
    Gps,
}

impl Category {
    /// All categories, in store order.
    pub const ALL: [Category; 3] = [Category::Status, Category::Login, Category::Gps];

    /// Returns the lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Status => "status",
            Category::Login => "login",
            Category::Gps => "gps",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Category::Status => 0,
            Category::Login => 1,
            Category::Gps => 2,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "status" => Ok(Category::Status),
            "login" => Ok(Category::Login),
            "gps" => Ok(Category::Gps),
            other => Err(Error::UnknownCategory(other.to_string())),
        }
    }
}
