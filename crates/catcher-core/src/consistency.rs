#![forbid(unsafe_code)]

//! Structural consistency checking for batch updates.
//!
//! A sectioned display caches how many items each section held the last time
//! it was loaded. A batch update claims a set of structural edits; once the
//! edits are applied, the cached counts must line up exactly with what the
//! data source reports. When they do not, the display is in a state it
//! cannot animate into and the batch is rejected with a
//! [`ConsistencyFailure`].
//!
//! # Coordinates
//!
//! - Deletions, reloads and move sources address the **old** layout.
//! - Insertions and move destinations address the **new** layout.
//! - Section insertions use new indices, section deletions old indices.
//!
//! # Check order
//!
//! 1. Section count: `old + inserted - deleted == new`.
//! 2. Each surviving old section is paired in order with a non-inserted new
//!    section. A section touched by item edits must satisfy
//!    `old + inserted - deleted == new`; an untouched section must keep its
//!    count.
//! 3. Every inserted section and item must exist in the new layout.
//!
//! [`validate`] runs before [`check`] and rejects edits that are wrong
//! regardless of the data source: out-of-range or repeated edits, and item
//! edits inside a section the same batch deletes. Those are [`EditError`]s,
//! not consistency failures.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::error::{EditAction, EditError};
use crate::index_path::{IndexPath, section_histogram};

/// Anything that can report a sectioned item count.
pub trait ItemAndSection {
    /// Number of sections.
    fn number_of_sections(&self) -> usize;
    /// Number of items in `section`. Out-of-range sections report zero.
    fn number_of_items(&self, section: usize) -> usize;
}

impl ItemAndSection for [usize] {
    fn number_of_sections(&self) -> usize {
        self.len()
    }

    fn number_of_items(&self, section: usize) -> usize {
        self.get(section).copied().unwrap_or(0)
    }
}

impl ItemAndSection for Vec<usize> {
    fn number_of_sections(&self) -> usize {
        self.as_slice().number_of_sections()
    }

    fn number_of_items(&self, section: usize) -> usize {
        self.as_slice().number_of_items(section)
    }
}

impl<const N: usize> ItemAndSection for [usize; N] {
    fn number_of_sections(&self) -> usize {
        N
    }

    fn number_of_items(&self, section: usize) -> usize {
        self.as_slice().number_of_items(section)
    }
}

/// Snapshot the per-section counts of any [`ItemAndSection`].
#[must_use]
pub fn section_counts(source: &(impl ItemAndSection + ?Sized)) -> Vec<usize> {
    (0..source.number_of_sections())
        .map(|section| source.number_of_items(section))
        .collect()
}

/// The structural edits claimed by one batch update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchDelta {
    /// Inserted items, new coordinates.
    pub inserted_items: Vec<IndexPath>,
    /// Deleted items, old coordinates.
    pub deleted_items: Vec<IndexPath>,
    /// Reloaded items, old coordinates.
    pub reloaded_items: Vec<IndexPath>,
    /// Moved items as `(old, new)` pairs.
    pub moved_items: Vec<(IndexPath, IndexPath)>,
    /// Inserted sections, new indices.
    pub inserted_sections: Vec<usize>,
    /// Deleted sections, old indices.
    pub deleted_sections: Vec<usize>,
}

impl BatchDelta {
    /// Create an empty delta.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim insertion of items at the given new-layout paths.
    pub fn insert_items(&mut self, paths: impl IntoIterator<Item = IndexPath>) -> &mut Self {
        self.inserted_items.extend(paths);
        self
    }

    /// Claim deletion of items at the given old-layout paths.
    pub fn delete_items(&mut self, paths: impl IntoIterator<Item = IndexPath>) -> &mut Self {
        self.deleted_items.extend(paths);
        self
    }

    /// Claim content reloads for items at the given old-layout paths.
    pub fn reload_items(&mut self, paths: impl IntoIterator<Item = IndexPath>) -> &mut Self {
        self.reloaded_items.extend(paths);
        self
    }

    /// Claim a single item move.
    pub fn move_item(&mut self, from: IndexPath, to: IndexPath) -> &mut Self {
        self.moved_items.push((from, to));
        self
    }

    /// Claim insertion of a section at a new-layout index.
    pub fn insert_section(&mut self, section: usize) -> &mut Self {
        self.inserted_sections.push(section);
        self
    }

    /// Claim deletion of a section at an old-layout index.
    pub fn delete_section(&mut self, section: usize) -> &mut Self {
        self.deleted_sections.push(section);
        self
    }

    /// True when the delta claims no edits at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserted_items.is_empty()
            && self.deleted_items.is_empty()
            && self.reloaded_items.is_empty()
            && self.moved_items.is_empty()
            && self.inserted_sections.is_empty()
            && self.deleted_sections.is_empty()
    }

    /// Total number of claimed edits.
    #[must_use]
    pub fn edit_count(&self) -> usize {
        self.inserted_items.len()
            + self.deleted_items.len()
            + self.reloaded_items.len()
            + self.moved_items.len()
            + self.inserted_sections.len()
            + self.deleted_sections.len()
    }
}

/// Why a batch delta disagrees with the data source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyFailure {
    #[error(
        "invalid number of sections: had {old_sections}, batch implies {expected_sections}, data source reports {new_sections}"
    )]
    SectionCountMismatch {
        old_sections: usize,
        new_sections: usize,
        expected_sections: usize,
    },

    #[error(
        "invalid number of items in section {section}: had {old_count}, inserted {inserted}, deleted {deleted}, data source reports {new_count}"
    )]
    ModifiedSectionMismatch {
        section: usize,
        old_count: usize,
        new_count: usize,
        inserted: usize,
        deleted: usize,
    },

    #[error(
        "invalid number of items in untouched section {section}: had {old_count}, data source reports {new_count}"
    )]
    UnmodifiedSectionMismatch {
        section: usize,
        old_count: usize,
        new_count: usize,
    },

    #[error("inserted section {section} does not exist after the update ({new_sections} sections)")]
    SectionInsertionOutOfBounds { section: usize, new_sections: usize },

    #[error("inserted item {path} does not exist after the update ({new_count} items in section)")]
    ItemInsertionOutOfBounds { path: IndexPath, new_count: usize },
}

impl ConsistencyFailure {
    /// Section the failure was detected in, if it is section-local.
    #[must_use]
    pub fn section(&self) -> Option<usize> {
        match self {
            Self::SectionCountMismatch { .. } => None,
            Self::ModifiedSectionMismatch { section, .. }
            | Self::UnmodifiedSectionMismatch { section, .. }
            | Self::SectionInsertionOutOfBounds { section, .. } => Some(*section),
            Self::ItemInsertionOutOfBounds { path, .. } => Some(path.section),
        }
    }
}

/// Reject edits that are invalid against the old layout alone.
pub fn validate(old: &(impl ItemAndSection + ?Sized), delta: &BatchDelta) -> Result<(), EditError> {
    let old_sections = old.number_of_sections();

    let mut seen_deleted_sections = BTreeSet::new();
    for &section in &delta.deleted_sections {
        if section >= old_sections {
            return Err(EditError::DeleteSectionOutOfRange {
                section,
                sections: old_sections,
            });
        }
        if !seen_deleted_sections.insert(section) {
            return Err(EditError::DuplicateSectionEdit { section });
        }
    }

    let mut seen_inserted_sections = BTreeSet::new();
    for &section in &delta.inserted_sections {
        if !seen_inserted_sections.insert(section) {
            return Err(EditError::DuplicateSectionEdit { section });
        }
    }

    let check_old_path = |action: EditAction, path: IndexPath| -> Result<(), EditError> {
        if path.section >= old_sections {
            return Err(EditError::SectionMissing { action, path });
        }
        if seen_deleted_sections.contains(&path.section) {
            return Err(EditError::EditInDeletedSection { action, path });
        }
        let count = old.number_of_items(path.section);
        if path.item >= count {
            return Err(EditError::ItemOutOfRange {
                action,
                path,
                count,
            });
        }
        Ok(())
    };

    let mut vacated = BTreeSet::new();
    let sources = delta
        .deleted_items
        .iter()
        .map(|path| (EditAction::Delete, *path))
        .chain(delta.moved_items.iter().map(|(from, _)| (EditAction::Move, *from)));
    for (action, path) in sources {
        check_old_path(action, path)?;
        if !vacated.insert(path) {
            return Err(EditError::DuplicateItemEdit { path });
        }
    }

    for path in &delta.reloaded_items {
        check_old_path(EditAction::Reload, *path)?;
    }

    let mut filled = BTreeSet::new();
    let destinations = delta
        .inserted_items
        .iter()
        .chain(delta.moved_items.iter().map(|(_, to)| to));
    for path in destinations {
        if !filled.insert(*path) {
            return Err(EditError::DuplicateInsertion { path: *path });
        }
    }

    Ok(())
}

/// Verify that applying `delta` to `old` yields exactly the counts in `new`.
pub fn check(
    old: &(impl ItemAndSection + ?Sized),
    new: &(impl ItemAndSection + ?Sized),
    delta: &BatchDelta,
) -> Result<(), ConsistencyFailure> {
    let old_sections = old.number_of_sections();
    let new_sections = new.number_of_sections();

    let deleted_sections: BTreeSet<usize> = delta.deleted_sections.iter().copied().collect();
    let inserted_sections: BTreeSet<usize> = delta.inserted_sections.iter().copied().collect();

    let expected_sections =
        (old_sections + inserted_sections.len()).saturating_sub(deleted_sections.len());
    if expected_sections != new_sections {
        return Err(ConsistencyFailure::SectionCountMismatch {
            old_sections,
            new_sections,
            expected_sections,
        });
    }

    if let Some(&section) = inserted_sections.iter().find(|&&s| s >= new_sections) {
        return Err(ConsistencyFailure::SectionInsertionOutOfBounds {
            section,
            new_sections,
        });
    }

    let inserted_into = section_histogram(
        delta
            .inserted_items
            .iter()
            .chain(delta.moved_items.iter().map(|(_, to)| to)),
    );
    let deleted_from = section_histogram(
        delta
            .deleted_items
            .iter()
            .chain(delta.moved_items.iter().map(|(from, _)| from)),
    );

    let surviving_old = (0..old_sections).filter(|s| !deleted_sections.contains(s));
    let surviving_new = (0..new_sections).filter(|s| !inserted_sections.contains(s));
    for (old_section, new_section) in surviving_old.zip(surviving_new) {
        verify_section(old, new, old_section, new_section, &inserted_into, &deleted_from)?;
    }

    for path in delta
        .inserted_items
        .iter()
        .chain(delta.moved_items.iter().map(|(_, to)| to))
    {
        let new_count = new.number_of_items(path.section);
        if path.section >= new_sections || path.item >= new_count {
            return Err(ConsistencyFailure::ItemInsertionOutOfBounds {
                path: *path,
                new_count,
            });
        }
    }

    Ok(())
}

fn verify_section(
    old: &(impl ItemAndSection + ?Sized),
    new: &(impl ItemAndSection + ?Sized),
    old_section: usize,
    new_section: usize,
    inserted_into: &BTreeMap<usize, usize>,
    deleted_from: &BTreeMap<usize, usize>,
) -> Result<(), ConsistencyFailure> {
    let old_count = old.number_of_items(old_section);
    let new_count = new.number_of_items(new_section);
    let inserted = inserted_into.get(&new_section).copied().unwrap_or(0);
    let deleted = deleted_from.get(&old_section).copied().unwrap_or(0);

    if inserted + deleted > 0 {
        let pass = (old_count + inserted).checked_sub(deleted) == Some(new_count);
        tracing::trace!(
            target: "catcher.consistency",
            section = new_section,
            old_count,
            new_count,
            inserted,
            deleted,
            pass,
            "modified section checked"
        );
        if !pass {
            return Err(ConsistencyFailure::ModifiedSectionMismatch {
                section: new_section,
                old_count,
                new_count,
                inserted,
                deleted,
            });
        }
    } else {
        let pass = old_count == new_count;
        tracing::trace!(
            target: "catcher.consistency",
            section = new_section,
            old_count,
            new_count,
            pass,
            "unmodified section checked"
        );
        if !pass {
            return Err(ConsistencyFailure::UnmodifiedSectionMismatch {
                section: new_section,
                old_count,
                new_count,
            });
        }
    }
    Ok(())
}

/// Run [`validate`] and [`check`] ahead of a batch update.
///
/// A caller that gets `Err` back can skip the batch and reload instead, so
/// the display never sees an inconsistent update.
pub fn preflight(
    old: &(impl ItemAndSection + ?Sized),
    new: &(impl ItemAndSection + ?Sized),
    delta: &BatchDelta,
) -> Result<(), PreflightError> {
    validate(old, delta)?;
    check(old, new, delta)?;
    Ok(())
}

/// Reason a [`preflight`] rejected a delta.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreflightError {
    #[error(transparent)]
    Edit(#[from] EditError),
    #[error(transparent)]
    Inconsistent(#[from] ConsistencyFailure),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ip(section: usize, item: usize) -> IndexPath {
        IndexPath::new(section, item)
    }

    #[test]
    fn empty_delta_with_unchanged_counts_passes() {
        assert_eq!(check(&[3usize, 2], &[3usize, 2], &BatchDelta::new()), Ok(()));
    }

    #[test]
    fn claimed_delete_with_unchanged_source_is_modified_mismatch() {
        let mut delta = BatchDelta::new();
        delta.delete_items([ip(0, 0)]);
        assert_eq!(
            check(&[3usize, 2], &[3usize, 2], &delta),
            Err(ConsistencyFailure::ModifiedSectionMismatch {
                section: 0,
                old_count: 3,
                new_count: 3,
                inserted: 0,
                deleted: 1,
            })
        );
    }

    #[test]
    fn matching_delete_passes() {
        let mut delta = BatchDelta::new();
        delta.delete_items([ip(0, 0)]);
        assert_eq!(check(&[3usize, 2], &[2usize, 2], &delta), Ok(()));
    }

    #[test]
    fn silent_change_is_unmodified_mismatch() {
        assert_eq!(
            check(&[3usize, 2], &[3usize, 4], &BatchDelta::new()),
            Err(ConsistencyFailure::UnmodifiedSectionMismatch {
                section: 1,
                old_count: 2,
                new_count: 4,
            })
        );
    }

    #[test]
    fn section_count_checked_first() {
        let mut delta = BatchDelta::new();
        delta.delete_items([ip(0, 0)]);
        assert_eq!(
            check(&[3usize, 2], &[3usize], &delta),
            Err(ConsistencyFailure::SectionCountMismatch {
                old_sections: 2,
                new_sections: 1,
                expected_sections: 2,
            })
        );
    }

    #[test]
    fn section_insert_and_delete_remap_survivors() {
        // old: [A=3, B=2]; delete A, insert new section at 1 → new: [B=2, C=5]
        let mut delta = BatchDelta::new();
        delta.delete_section(0).insert_section(1);
        assert_eq!(check(&[3usize, 2], &[2usize, 5], &delta), Ok(()));
        assert_eq!(
            check(&[3usize, 2], &[5usize, 2], &delta),
            Err(ConsistencyFailure::UnmodifiedSectionMismatch {
                section: 0,
                old_count: 2,
                new_count: 5,
            })
        );
    }

    #[test]
    fn move_across_sections_balances() {
        let mut delta = BatchDelta::new();
        delta.move_item(ip(0, 2), ip(1, 0));
        assert_eq!(check(&[3usize, 2], &[2usize, 3], &delta), Ok(()));
        assert!(check(&[3usize, 2], &[3usize, 2], &delta).is_err());
    }

    #[test]
    fn insertion_past_new_end_is_rejected() {
        let mut delta = BatchDelta::new();
        delta.insert_items([ip(0, 4)]);
        assert_eq!(
            check(&[3usize], &[4usize], &delta),
            Err(ConsistencyFailure::ItemInsertionOutOfBounds {
                path: ip(0, 4),
                new_count: 4,
            })
        );
    }

    #[test]
    fn validate_rejects_out_of_range_delete() {
        let mut delta = BatchDelta::new();
        delta.delete_items([ip(0, 3)]);
        assert_eq!(
            validate(&[3usize, 2], &delta),
            Err(EditError::ItemOutOfRange {
                action: EditAction::Delete,
                path: ip(0, 3),
                count: 3,
            })
        );
    }

    #[test]
    fn validate_rejects_duplicate_vacate() {
        let mut delta = BatchDelta::new();
        delta.delete_items([ip(1, 0)]).move_item(ip(1, 0), ip(0, 0));
        assert_eq!(
            validate(&[3usize, 2], &delta),
            Err(EditError::DuplicateItemEdit { path: ip(1, 0) })
        );
    }

    #[test]
    fn validate_rejects_missing_section() {
        let mut delta = BatchDelta::new();
        delta.reload_items([ip(4, 0)]);
        assert_eq!(
            validate(&[3usize, 2], &delta),
            Err(EditError::SectionMissing {
                action: EditAction::Reload,
                path: ip(4, 0),
            })
        );
        let mut delta = BatchDelta::new();
        delta.delete_section(2);
        assert_eq!(
            validate(&[3usize, 2], &delta),
            Err(EditError::DeleteSectionOutOfRange {
                section: 2,
                sections: 2,
            })
        );
    }

    #[test]
    fn validate_rejects_item_edit_inside_deleted_section() {
        let mut delta = BatchDelta::new();
        delta.delete_section(0).delete_items([ip(0, 0)]);
        assert_eq!(
            validate(&[3usize, 2], &delta),
            Err(EditError::EditInDeletedSection {
                action: EditAction::Delete,
                path: ip(0, 0),
            })
        );
        assert!(matches!(
            preflight(&[3usize, 2], &[2usize], &delta),
            Err(PreflightError::Edit(_))
        ));

        let mut delta = BatchDelta::new();
        delta.delete_section(1).move_item(ip(1, 1), ip(0, 0));
        assert_eq!(
            validate(&[3usize, 2], &delta),
            Err(EditError::EditInDeletedSection {
                action: EditAction::Move,
                path: ip(1, 1),
            })
        );
    }

    #[test]
    fn validate_rejects_repeated_destination() {
        let mut delta = BatchDelta::new();
        delta.insert_items([ip(0, 3), ip(0, 3)]);
        assert_eq!(
            validate(&[3usize, 2], &delta),
            Err(EditError::DuplicateInsertion { path: ip(0, 3) })
        );

        let mut delta = BatchDelta::new();
        delta
            .insert_items([ip(0, 0)])
            .move_item(ip(1, 0), ip(0, 0));
        assert_eq!(
            validate(&[3usize, 2], &delta),
            Err(EditError::DuplicateInsertion { path: ip(0, 0) })
        );
    }

    #[test]
    fn preflight_distinguishes_error_classes() {
        let mut bad_edit = BatchDelta::new();
        bad_edit.delete_items([ip(0, 9)]);
        assert!(matches!(
            preflight(&[3usize], &[2usize], &bad_edit),
            Err(PreflightError::Edit(_))
        ));

        let mut inconsistent = BatchDelta::new();
        inconsistent.delete_items([ip(0, 0)]);
        assert!(matches!(
            preflight(&[3usize], &[3usize], &inconsistent),
            Err(PreflightError::Inconsistent(_))
        ));
    }

    #[test]
    fn failure_reports_section() {
        let failure = ConsistencyFailure::ItemInsertionOutOfBounds {
            path: ip(2, 0),
            new_count: 0,
        };
        assert_eq!(failure.section(), Some(2));
    }

    /// Old counts plus an honest set of deletions and appended insertions.
    fn honest_batch() -> impl Strategy<Value = (Vec<usize>, Vec<usize>, BatchDelta)> {
        prop::collection::vec((0usize..6, 0usize..4, 0usize..4), 1..5).prop_map(|sections| {
            let mut old = Vec::new();
            let mut new = Vec::new();
            let mut delta = BatchDelta::new();
            for (section, (count, dels, ins)) in sections.into_iter().enumerate() {
                let dels = dels.min(count);
                let new_count = count - dels + ins;
                delta.delete_items((0..dels).map(|item| IndexPath::new(section, item)));
                delta.insert_items(
                    (new_count - ins..new_count).map(|item| IndexPath::new(section, item)),
                );
                old.push(count);
                new.push(new_count);
            }
            (old, new, delta)
        })
    }

    proptest! {
        #[test]
        fn honest_batches_pass((old, new, delta) in honest_batch()) {
            prop_assert_eq!(preflight(&old, &new, &delta), Ok(()));
        }

        #[test]
        fn drifted_source_fails((old, mut new, delta) in honest_batch(), bump in 0usize..8) {
            let section = bump % new.len();
            new[section] += 1;
            prop_assert!(check(&old, &new, &delta).is_err());
        }
    }
}
