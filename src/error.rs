//! Error types shared by the panel components.
//!
//! Every user action ends in one of these kinds. Pages catch them at the
//! command boundary and report them to the host; nothing here is meant to
//! bubble past a page.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PanelError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PanelError {
    /// The host refused a load/unload, or faulted while doing it.
    #[error("{operation} failed: {details}")]
    OperationFailed {
        operation: &'static str,
        details: String,
    },
    /// A boot list edit would break one of the tree invariants.
    #[error("{message}")]
    Validation { message: String },
    /// The command is not allowed for this addin or catalog entry.
    #[error("{message}")]
    NotPermitted { message: String },
    #[error("profile key `{key}`: {details}")]
    Profile { key: String, details: String },
    #[error("page `{page}` is not registered")]
    UnknownPage { page: String },
}

impl PanelError {
    pub fn operation_failed(operation: &'static str, details: impl Into<String>) -> Self {
        Self::OperationFailed {
            operation,
            details: details.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_permitted(message: impl Into<String>) -> Self {
        Self::NotPermitted {
            message: message.into(),
        }
    }

    pub fn profile(key: impl Into<String>, details: impl std::fmt::Display) -> Self {
        Self::Profile {
            key: key.into(),
            details: details.to_string(),
        }
    }

    pub fn unknown_page(page: impl std::fmt::Debug) -> Self {
        Self::UnknownPage {
            page: format!("{page:?}"),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    pub fn is_not_permitted(&self) -> bool {
        matches!(self, Self::NotPermitted { .. })
    }

    pub fn is_operation_failed(&self) -> bool {
        matches!(self, Self::OperationFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_failed_message_carries_host_text() {
        let err = PanelError::operation_failed("unload", "addin is busy");
        assert_eq!(err.to_string(), "unload failed: addin is busy");
        assert!(err.is_operation_failed());
    }

    #[test]
    fn unknown_page_uses_debug_name() {
        #[derive(Debug)]
        enum Kind {
            Hotkeys,
        }
        let err = PanelError::unknown_page(Kind::Hotkeys);
        assert_eq!(err.to_string(), "page `Hotkeys` is not registered");
    }
}
