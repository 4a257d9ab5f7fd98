// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ID generation abstractions.

/// Trait for truncating identifiers to a short prefix (for log lines).
pub trait ShortId {
    /// Returns a string slice truncated to at most `n` characters.
    fn short(&self, n: usize) -> &str;
}

impl ShortId for str {
    fn short(&self, n: usize) -> &str {
        if self.len() <= n {
            self
        } else {
            &self[..n]
        }
    }
}

/// Define a newtype ID wrapper around `String`, generated with a random hex
/// suffix by default.
///
/// Generates `new()`, `generate()`, `as_str()`, `short()`, `Display`,
/// `From<String>`, `From<&str>`, `PartialEq<str>`, `PartialEq<&str>` impls.
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Wrap an existing id string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a fresh, opaque id.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().simple().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns a string slice truncated to at most `n` characters.
            pub fn short(&self, n: usize) -> &str {
                if self.0.len() <= n {
                    &self.0
                } else {
                    &self.0[..n]
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::define_id! {
        pub struct TestId;
    }

    #[test]
    fn generated_ids_are_distinct() {
        let a = TestId::generate();
        let b = TestId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn short_truncates() {
        let id = TestId::new("abcdefgh");
        assert_eq!(id.short(4), "abcd");
        assert_eq!(id.short(100), "abcdefgh");
    }

    #[test]
    fn display_matches_inner_string() {
        let id = TestId::new("session-1");
        assert_eq!(id.to_string(), "session-1");
    }
}
