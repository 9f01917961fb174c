// Identifier newtypes for the rules/workflow domain.
//
// ## Rust Learning Notes:
//
// ### Why newtypes instead of bare `String`
// Every identifier in this service (`NamespaceId`, `FieldId`, ...) is
// structurally a string, but they are not interchangeable: passing a
// `FieldId` where a `RuleId` is expected should be a compile error, not a
// runtime surprise. Wrapping each in its own tuple struct buys that for
// free — the compiler will not let you hand a `FieldId` to a function that
// wants a `RuleId`, even though both are `String` underneath.
//
// ### Shared shape
// Every id type below exposes the same small surface: `new`, `as_str`,
// `From<&str>`, `From<String>`, and `Display`. This mirrors the
// `StateId`/`ActivityId` pattern — one shape, repeated for every identifier
// the domain needs, rather than a single stringly-typed field scattered
// across every struct.

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Build an identifier from any string-like input.
            pub fn new<S: Into<String>>(id: S) -> Self {
                $name(id.into())
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(NamespaceId, "Identifies a tenant isolation boundary.");
id_type!(FieldId, "Identifies a typed field in a namespace's schema.");
id_type!(FunctionId, "Identifies a logical function (versioned) in a namespace.");
id_type!(RuleId, "Identifies a logical rule (versioned) in a namespace.");
id_type!(WorkflowId, "Identifies a logical workflow (versioned) in a namespace.");
id_type!(TerminalId, "Identifies a terminal sink of a workflow graph.");
id_type!(StepName, "Identifies a step within a single workflow's step map.");

/// Validates the shared identifier grammar: 1-50 chars of
/// `[A-Za-z0-9_-]`, not starting or ending with `-` or `_`.
pub fn is_valid_identifier(s: &str) -> bool {
    let len = s.chars().count();
    if len < 1 || len > 50 {
        return false;
    }
    if !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return false;
    }
    let first = s.chars().next().unwrap();
    let last = s.chars().last().unwrap();
    !(first == '-' || first == '_' || last == '-' || last == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_roundtrip() {
        let a = NamespaceId::from("acme");
        let b = NamespaceId::new("acme".to_string());
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "acme");
        assert_eq!(a.to_string(), "acme");
    }

    #[test]
    fn identifier_boundaries() {
        assert!(is_valid_identifier("a"));
        assert!(is_valid_identifier(&"a".repeat(50)));
        assert!(!is_valid_identifier(&"a".repeat(51)));
        assert!(!is_valid_identifier("-leading"));
        assert!(!is_valid_identifier("trailing_"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("has space"));
        assert!(is_valid_identifier("mixed-Case_123"));
    }
}
