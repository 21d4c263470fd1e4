//! Ordered eligibility gates.
//!
//! 1. Watermark: id must exceed the session baseline and everything seen so far
//! 2. Interference: a foreign reaction already on the item
//! 3. Structural: numeric tag present and not a reserved boundary value
//! 3b. Duplicate: `tag|contact` not completed recently
//! 4. Sampling: rotating every-Nth skip
//! 5. Probability: uniform draw against `action_probability`
//!
//! Gates 2–3b are deterministic and are re-run whenever an item leaves the
//! backlog or its cooldown fires. Gates 1, 4 and 5 run exactly once per item.

use std::fmt;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;
use tracing::trace;

use super::extract::ItemTags;
use super::history::CompletionLog;
use super::sampler::{Sampler, SamplingRange};
use crate::model::{ItemId, ItemSnapshot, Settings, Stats};

/// An item that passed every gate and is waiting for the dispatch slot.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub item: ItemSnapshot,
    pub tag: u32,
    pub contact: Option<String>,
    /// When the watcher first saw the item. Cooldowns count from here.
    pub detected_at: Instant,
}

impl Candidate {
    pub fn id(&self) -> ItemId {
        self.item.id
    }

    pub fn dedup_key(&self) -> Option<String> {
        ItemTags {
            tag: Some(self.tag),
            contact: self.contact.clone(),
        }
        .dedup_key()
    }
}

/// Why an item was classified as ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The accessor no longer knows the item.
    Vanished,
    /// Someone else reacted first.
    Interference,
    MissingTag,
    ReservedTag(u32),
    /// Same `tag|contact` was already completed.
    Duplicate(String),
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vanished => write!(f, "item vanished"),
            Self::Interference => write!(f, "foreign reaction present"),
            Self::MissingTag => write!(f, "no numeric tag"),
            Self::ReservedTag(tag) => write!(f, "reserved tag {tag}"),
            Self::Duplicate(key) => write!(f, "already completed {key}"),
        }
    }
}

/// Outcome of gates 2–5.
#[derive(Debug, Clone)]
pub enum Verdict {
    Ignored(IgnoreReason),
    SkippedBySampling,
    SkippedByProbability,
    Accepted(Candidate),
}

impl Verdict {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ignored(_) => "ignored",
            Self::SkippedBySampling => "skipped_by_sampling",
            Self::SkippedByProbability => "skipped_by_probability",
            Self::Accepted(_) => "accepted",
        }
    }

    /// Bump the counter this verdict belongs to. Accepted items are only
    /// counted once the action actually completes.
    pub fn count(&self, stats: &mut Stats) {
        match self {
            Self::Ignored(_) => stats.ignored_by_policy += 1,
            Self::SkippedBySampling => stats.skipped_by_sampling += 1,
            Self::SkippedByProbability => stats.skipped_by_probability += 1,
            Self::Accepted(_) => {}
        }
    }
}

/// Stateful gate chain: owns the watermark, the sampler and the RNG.
#[derive(Debug)]
pub struct Eligibility {
    baseline: Option<ItemId>,
    watermark: Option<ItemId>,
    reserved_tags: Vec<u32>,
    sampler: Sampler,
    rng: StdRng,
}

impl Eligibility {
    pub fn new(
        baseline: Option<ItemId>,
        reserved_tags: Vec<u32>,
        sampling: Option<SamplingRange>,
        seed: Option<u64>,
    ) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let sampler = Sampler::new(sampling, &mut rng);
        Self {
            baseline,
            watermark: baseline,
            reserved_tags,
            sampler,
            rng,
        }
    }

    pub fn baseline(&self) -> Option<ItemId> {
        self.baseline
    }

    pub fn watermark(&self) -> Option<ItemId> {
        self.watermark
    }

    /// Gate 1. Advances the watermark when the id is new.
    pub fn admit(&mut self, id: ItemId) -> bool {
        let beyond = |floor: Option<ItemId>| floor.is_none_or(|f| id > f);
        if beyond(self.baseline) && beyond(self.watermark) {
            self.watermark = Some(id);
            true
        } else {
            false
        }
    }

    /// Gates 2–5 for an item that was just admitted.
    pub fn classify(
        &mut self,
        item: ItemSnapshot,
        detected_at: Instant,
        completions: &CompletionLog,
        settings: &Settings,
    ) -> Verdict {
        let (tag, contact) = match self.screen(&item, completions) {
            Ok(fields) => fields,
            Err(reason) => return Verdict::Ignored(reason),
        };

        // A sampling skip ends evaluation before the probability draw.
        if self.sampler.should_skip(&mut self.rng) {
            return Verdict::SkippedBySampling;
        }

        let roll: f64 = self.rng.gen_range(0.0..1.0);
        let threshold = f64::from(settings.action_probability) / 100.0;
        if roll >= threshold {
            trace!(item_id = item.id, roll, threshold, "Probability gate rejected item");
            return Verdict::SkippedByProbability;
        }

        Verdict::Accepted(Candidate {
            item,
            tag,
            contact,
            detected_at,
        })
    }

    /// Gates 2, 3 and 3b against a fresh snapshot.
    pub fn screen(
        &self,
        item: &ItemSnapshot,
        completions: &CompletionLog,
    ) -> Result<(u32, Option<String>), IgnoreReason> {
        if is_interfered(item, completions) {
            return Err(IgnoreReason::Interference);
        }

        let tags = ItemTags::extract(&item.text);
        let tag = tags.tag.ok_or(IgnoreReason::MissingTag)?;
        if self.reserved_tags.contains(&tag) {
            return Err(IgnoreReason::ReservedTag(tag));
        }

        if let Some(key) = tags.dedup_key()
            && completions.contains_key(&key, Utc::now())
        {
            return Err(IgnoreReason::Duplicate(key));
        }

        Ok((tag, tags.contact))
    }
}

/// A visible reaction that did not come from one of our own completions.
pub fn is_interfered(item: &ItemSnapshot, completions: &CompletionLog) -> bool {
    item.has_visible_reaction && !completions.is_own(item.id)
}
