//! Merge engine for local and remote attempt history.
//!
//! Rows are collapsed on [`AttemptKey`] (kind, category, sub-level, UTC day)
//! rather than on id, because a fallback row and a remote row for the same
//! logical attempt never share an id. Every input gets a [`Verdict`] so the
//! merge can be inspected independently of storage.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::model::{AttemptId, AttemptIndexEntry, AttemptKey, AttemptRecord};

//
// ─── INPUTS ───────────────────────────────────────────────────────────────────
//

/// Where a candidate row was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Fallback bucket or attempt journal on this device.
    Local,
    Remote,
}

impl Origin {
    fn precedence(self) -> u8 {
        match self {
            Origin::Local => 1,
            Origin::Remote => 0,
        }
    }
}

/// One input to [`reconcile`].
#[derive(Debug, Clone, PartialEq)]
pub enum Candidate {
    Row {
        origin: Origin,
        record: AttemptRecord,
    },
    /// Index entry whose detail record is missing or invalid.
    Orphan(AttemptIndexEntry),
}

impl Candidate {
    #[must_use]
    pub fn local(record: AttemptRecord) -> Self {
        Candidate::Row {
            origin: Origin::Local,
            record,
        }
    }

    #[must_use]
    pub fn remote(record: AttemptRecord) -> Self {
        Candidate::Row {
            origin: Origin::Remote,
            record,
        }
    }
}

//
// ─── OUTPUTS ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Kept,
    DroppedAsDuplicate,
    OrphanPruned,
    /// Survived dedup but fell outside the requested limit.
    Truncated,
}

/// Per-candidate result, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub id: AttemptId,
    pub origin: Option<Origin>,
    pub outcome: ReconcileOutcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Surviving rows, newest first.
    pub rows: Vec<AttemptRecord>,
    pub verdicts: Vec<Verdict>,
}

impl Reconciliation {
    #[must_use]
    pub fn count(&self, outcome: ReconcileOutcome) -> usize {
        self.verdicts.iter().filter(|v| v.outcome == outcome).count()
    }

    /// Ids of index entries that should be removed from the journal.
    pub fn pruned_orphans(&self) -> impl Iterator<Item = &AttemptId> {
        self.verdicts
            .iter()
            .filter(|v| v.outcome == ReconcileOutcome::OrphanPruned)
            .map(|v| &v.id)
    }
}

//
// ─── MERGE ────────────────────────────────────────────────────────────────────
//

/// Whether `new` should replace `held` for the same key.
///
/// Local beats remote; within one origin the newer row wins and ties keep
/// the row seen first.
fn supersedes(new_origin: Origin, new: &AttemptRecord, held_origin: Origin, held: &AttemptRecord) -> bool {
    match new_origin.precedence().cmp(&held_origin.precedence()) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => new.created_at > held.created_at,
    }
}

/// Deduplicates, orders (newest first) and caps candidate rows.
#[must_use]
pub fn reconcile(candidates: Vec<Candidate>, limit: usize) -> Reconciliation {
    let mut verdicts = Vec::with_capacity(candidates.len());
    let mut winners: HashMap<AttemptKey, (usize, Origin, AttemptRecord)> = HashMap::new();

    for candidate in candidates {
        let (origin, record) = match candidate {
            Candidate::Orphan(entry) => {
                verdicts.push(Verdict {
                    id: entry.id,
                    origin: None,
                    outcome: ReconcileOutcome::OrphanPruned,
                });
                continue;
            }
            Candidate::Row { origin, record } => (origin, record),
        };

        let idx = verdicts.len();
        verdicts.push(Verdict {
            id: record.id.clone(),
            origin: Some(origin),
            outcome: ReconcileOutcome::Kept,
        });

        match winners.entry(record.key()) {
            Entry::Vacant(slot) => {
                slot.insert((idx, origin, record));
            }
            Entry::Occupied(mut slot) => {
                let (held_idx, held_origin, held) = slot.get();
                if supersedes(origin, &record, *held_origin, held) {
                    verdicts[*held_idx].outcome = ReconcileOutcome::DroppedAsDuplicate;
                    slot.insert((idx, origin, record));
                } else {
                    verdicts[idx].outcome = ReconcileOutcome::DroppedAsDuplicate;
                }
            }
        }
    }

    let mut kept: Vec<(usize, AttemptRecord)> = winners
        .into_values()
        .map(|(idx, _, record)| (idx, record))
        .collect();
    kept.sort_by(|(_, a), (_, b)| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    for (idx, _) in kept.iter().skip(limit) {
        verdicts[*idx].outcome = ReconcileOutcome::Truncated;
    }
    kept.truncate(limit);

    Reconciliation {
        rows: kept.into_iter().map(|(_, record)| record).collect(),
        verdicts,
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
