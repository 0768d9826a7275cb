#![forbid(unsafe_code)]

//! Error types shared across Catcher crates.

use std::io;

use thiserror::Error;

use crate::index_path::IndexPath;

/// A batch edit that is wrong on its own terms, independent of what the data
/// source reports.
///
/// These are caller programming errors (bad indices, repeated edits). They are
/// never routed through a recovery policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("cannot delete section {section}: surface has {sections} sections")]
    DeleteSectionOutOfRange { section: usize, sections: usize },

    #[error("section {section} appears more than once in a single batch")]
    DuplicateSectionEdit { section: usize },

    #[error("cannot {action} item {path}: section holds {count} items")]
    ItemOutOfRange {
        action: EditAction,
        path: IndexPath,
        count: usize,
    },

    #[error("cannot {action} item {path}: section {} does not exist", .path.section)]
    SectionMissing { action: EditAction, path: IndexPath },

    #[error("item {path} is deleted or moved more than once in a single batch")]
    DuplicateItemEdit { path: IndexPath },

    #[error("cannot {action} item {path}: section {} is deleted in the same batch", .path.section)]
    EditInDeletedSection { action: EditAction, path: IndexPath },

    #[error("item {path} is inserted or moved into more than once in a single batch")]
    DuplicateInsertion { path: IndexPath },
}

/// Which kind of edit referenced an invalid index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditAction {
    Delete,
    Reload,
    Move,
}

impl std::fmt::Display for EditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Delete => "delete",
            Self::Reload => "reload",
            Self::Move => "move",
        })
    }
}

/// Errors that can occur when loading or validating a [`CatcherConfig`](crate::config::CatcherConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[cfg(feature = "policy-config")]
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[cfg(feature = "policy-config")]
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation errors: {}", .0.join("; "))]
    Validation(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_error_messages_name_the_path() {
        let err = EditError::ItemOutOfRange {
            action: EditAction::Delete,
            path: IndexPath::new(1, 4),
            count: 2,
        };
        assert_eq!(err.to_string(), "cannot delete item [1, 4]: section holds 2 items");

        let err = EditError::SectionMissing {
            action: EditAction::Reload,
            path: IndexPath::new(7, 0),
        };
        assert_eq!(err.to_string(), "cannot reload item [7, 0]: section 7 does not exist");
    }

    #[test]
    fn deleted_section_and_duplicate_insert_messages() {
        let err = EditError::EditInDeletedSection {
            action: EditAction::Delete,
            path: IndexPath::new(0, 0),
        };
        assert_eq!(
            err.to_string(),
            "cannot delete item [0, 0]: section 0 is deleted in the same batch"
        );

        let err = EditError::DuplicateInsertion {
            path: IndexPath::new(0, 3),
        };
        assert_eq!(
            err.to_string(),
            "item [0, 3] is inserted or moved into more than once in a single batch"
        );
    }

    #[test]
    fn validation_error_joins_messages() {
        let err = ConfigError::Validation(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "validation errors: a; b");
    }
}
