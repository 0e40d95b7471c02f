//! Error types for the unival runtime

use std::fmt;

/// Result type for runtime operations
pub type VarResult<T> = Result<T, VarError>;

/// Runtime error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum VarError {
    /// A value was accessed as a type it does not hold
    #[error("cannot treat a {found} value as {expected}")]
    TypeMismatch {
        /// Requested type name
        expected: String,
        /// Actual type name
        found: String,
    },

    /// No conversion route between two types
    #[error("unable to convert {from} to {to}")]
    Cast {
        /// Source type name
        from: String,
        /// Target type name
        to: String,
    },

    /// A named member was not found on a class or any of its parents
    #[error("class {class} has no member {name}{detail}")]
    Attribute {
        /// Class name searched
        class: String,
        /// Member name requested
        name: String,
        /// Accumulated parent failures, empty when none
        detail: String,
    },

    /// Every overload of a function rejected the supplied arguments
    #[error("{0}")]
    Overload(Box<OverloadError>),

    /// Malformed JSON input
    #[error("parse error at byte {offset}: {message}")]
    Parse {
        /// Byte offset into the input
        offset: usize,
        /// Failure description
        message: String,
    },

    /// A container operation was applied to a non-container value
    #[error("{op} is not supported on a {found} value")]
    ContainerType {
        /// Operation name
        op: String,
        /// Actual kind name
        found: String,
    },

    /// Free-form runtime error
    #[error("{0}")]
    Custom(String),
}

impl VarError {
    /// Shorthand for a [`VarError::Custom`] error.
    pub fn custom(msg: impl Into<String>) -> Self {
        VarError::Custom(msg.into())
    }

    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        VarError::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn cast(from: impl Into<String>, to: impl Into<String>) -> Self {
        VarError::Cast {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl From<String> for VarError {
    fn from(s: String) -> Self {
        VarError::Custom(s)
    }
}

impl From<&str> for VarError {
    fn from(s: &str) -> Self {
        VarError::Custom(s.to_string())
    }
}

/// Details of a failed overload resolution.
///
/// Carries the rendered call expression, every candidate signature in
/// declaration order, and the reason each candidate was rejected.
#[derive(Debug, Clone)]
pub struct OverloadError {
    /// Rendered call, e.g. `add(int, str)`
    pub call: String,
    /// Candidate signatures in chain order
    pub candidates: Vec<String>,
    /// Rejection reason per candidate, aligned with `candidates`
    pub failures: Vec<String>,
}

impl fmt::Display for OverloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "no overload matched call {}", self.call)?;
        writeln!(f, "candidates:")?;
        for (sig, why) in self.candidates.iter().zip(self.failures.iter()) {
            writeln!(f, "  {sig}: {why}")?;
        }
        Ok(())
    }
}

impl From<OverloadError> for VarError {
    fn from(e: OverloadError) -> Self {
        VarError::Overload(Box::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        let e = VarError::type_mismatch("int", "str");
        assert_eq!(e.to_string(), "cannot treat a str value as int");

        let e = VarError::cast("dict", "int");
        assert_eq!(e.to_string(), "unable to convert dict to int");

        let e = VarError::Parse {
            offset: 12,
            message: "unexpected ','".into(),
        };
        assert!(e.to_string().contains("byte 12"));
    }

    #[test]
    fn overload_error_lists_candidates() {
        let e = OverloadError {
            call: "add(str)".into(),
            candidates: vec!["add(arg0: int) -> int".into()],
            failures: vec!["cannot treat a str value as int".into()],
        };
        let msg = VarError::from(e).to_string();
        assert!(msg.contains("no overload matched call add(str)"));
        assert!(msg.contains("add(arg0: int) -> int"));
    }
}
