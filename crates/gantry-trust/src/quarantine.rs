//! Quarantine episodes: entry, probation transition, release.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrustError};
use crate::ledger::{ReaderId, ViolationKind};

/// Identifier of a quarantine episode.
pub type QuarantineId = u64;

/// Lifecycle of one quarantine episode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodeStatus {
    /// Reader is blocked; probation not yet started.
    Active,
    /// Probation challenges issued and being graded.
    Probation,
    /// Restoration succeeded.
    Released,
    /// Episode administratively closed without restoration.
    Expired,
}

/// One quarantine episode.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuarantineRecord {
    /// Episode id, assigned monotonically and never reused.
    pub id: QuarantineId,
    /// Quarantined reader.
    pub reader_id: ReaderId,
    /// Violation that triggered the episode.
    pub reason: ViolationKind,
    /// Severity level, 1..=3. Harsher quarantines demand more probation.
    pub severity: u8,
    /// Lifecycle state.
    pub status: EpisodeStatus,
    /// When quarantine was entered.
    pub entered_at: DateTime<Utc>,
    /// When probation began, if it has.
    pub probation_started_at: Option<DateTime<Utc>>,
    /// When the episode was released, if it has been.
    pub released_at: Option<DateTime<Utc>>,
    /// Trust score at the moment of entry.
    pub score_at_entry: u8,
}

/// All quarantine episodes, open and closed.
#[derive(Clone, Debug, Default)]
pub struct QuarantineLog {
    episodes: BTreeMap<QuarantineId, QuarantineRecord>,
    next_id: QuarantineId,
}

impl QuarantineLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new episode and return its id.
    ///
    /// Severity is clamped to 1..=3. Callers must ensure the reader has no
    /// open episode first; the invariant is one Active/Probation episode
    /// per reader.
    pub fn open(
        &mut self,
        reader: &str,
        reason: ViolationKind,
        severity: u8,
        score_at_entry: u8,
        now: DateTime<Utc>,
    ) -> QuarantineId {
        self.next_id += 1;
        let id = self.next_id;
        self.episodes.insert(
            id,
            QuarantineRecord {
                id,
                reader_id: reader.to_string(),
                reason,
                severity: severity.clamp(1, 3),
                status: EpisodeStatus::Active,
                entered_at: now,
                probation_started_at: None,
                released_at: None,
                score_at_entry,
            },
        );
        id
    }

    /// Look up an episode by id.
    #[must_use]
    pub fn get(&self, id: QuarantineId) -> Option<&QuarantineRecord> {
        self.episodes.get(&id)
    }

    /// The reader's open (Active or Probation) episode, if any.
    ///
    /// Latest entry wins if historical data ever contained duplicates.
    #[must_use]
    pub fn open_for(&self, reader: &str) -> Option<&QuarantineRecord> {
        self.episodes
            .values()
            .rev()
            .find(|e| {
                e.reader_id == reader
                    && matches!(e.status, EpisodeStatus::Active | EpisodeStatus::Probation)
            })
    }

    /// Move an Active episode into Probation.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::UnknownQuarantine`] for a missing id, or
    /// [`TrustError::NoActiveQuarantine`] if the episode is not Active.
    pub fn begin_probation(&mut self, id: QuarantineId, now: DateTime<Utc>) -> Result<()> {
        let episode = self
            .episodes
            .get_mut(&id)
            .ok_or(TrustError::UnknownQuarantine(id))?;
        if episode.status != EpisodeStatus::Active {
            return Err(TrustError::NoActiveQuarantine(episode.reader_id.clone()));
        }
        episode.status = EpisodeStatus::Probation;
        episode.probation_started_at = Some(now);
        Ok(())
    }

    /// Close a Probation episode as Released.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::UnknownQuarantine`] for a missing id.
    pub fn release(&mut self, id: QuarantineId, now: DateTime<Utc>) -> Result<()> {
        let episode = self
            .episodes
            .get_mut(&id)
            .ok_or(TrustError::UnknownQuarantine(id))?;
        episode.status = EpisodeStatus::Released;
        episode.released_at = Some(now);
        Ok(())
    }

    /// All episodes, oldest first.
    pub fn episodes(&self) -> impl Iterator<Item = &QuarantineRecord> {
        self.episodes.values()
    }
}
