use std::collections::HashMap;

use ethereum_hashing::hash32_concat;
use itertools::Either;
use log::error;
use tree_hash::TreeHash as _;
use types::{
    phase0::{
        containers::AttestationData,
        primitives::{CommitteeIndex, Slot, H256},
    },
    preset::Preset,
};

use helper_functions::misc;

use crate::entry::AttestationEntry;

/// Identifies a phase0 vote.
#[must_use]
pub fn phase0_fingerprint(data: &AttestationData) -> H256 {
    data.tree_hash_root()
}

/// Identifies a post-Electra vote together with the committee it came from.
/// The on-wire `index` is zeroed before hashing; two committees voting for the
/// same payload map to two distinct fingerprints.
#[must_use]
pub fn electra_fingerprint(data: &AttestationData, committee_index: CommitteeIndex) -> H256 {
    let mut data = *data;
    data.index = 0;
    electra_fingerprint_from_root(data.tree_hash_root(), committee_index)
}

/// Like `electra_fingerprint`, for callers that already hold the root of the
/// zeroed vote payload, as aggregation requests on the API do.
#[must_use]
pub fn electra_fingerprint_from_root(data_root: H256, committee_index: CommitteeIndex) -> H256 {
    H256::from(hash32_concat(
        data_root.as_slice(),
        committee_index.tree_hash_root().as_slice(),
    ))
}

/// A fixed-size ring of slot buckets, each holding the candidate entries for
/// one slot keyed by vote fingerprint.
///
/// A slot is resident iff `starting_slot <= slot < starting_slot + lookback`.
/// Buckets are reset wholesale when time advances past them; entries are never
/// deleted individually.
pub struct CandidateRing<P: Preset> {
    buckets: Vec<HashMap<H256, AttestationEntry<P>>>,
    starting_slot: Slot,
}

impl<P: Preset> Default for CandidateRing<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Preset> CandidateRing<P> {
    #[must_use]
    pub fn new() -> Self {
        let length = usize::try_from(misc::attestation_lookback::<P>())
            .expect("attestation lookback fits in usize");

        Self {
            buckets: (0..length).map(|_| HashMap::new()).collect(),
            starting_slot: 0,
        }
    }

    #[must_use]
    pub const fn starting_slot(&self) -> Slot {
        self.starting_slot
    }

    #[must_use]
    pub fn candidate_index(&self, slot: Slot) -> Option<usize> {
        let lookback = misc::attestation_lookback::<P>();

        (self.starting_slot..self.starting_slot + lookback)
            .contains(&slot)
            .then(|| usize::try_from(slot % lookback).expect("bucket index fits in usize"))
    }

    /// Moves the window so that `wall_slot` is its newest resident slot,
    /// discarding the buckets that fall out of it. A no-op until genesis has
    /// filled the ring. Going backwards in time is refused.
    pub fn advance(&mut self, wall_slot: Slot) {
        let lookback = misc::attestation_lookback::<P>();

        let Some(new_starting_slot) = (wall_slot + 1).checked_sub(lookback) else {
            return;
        };

        if new_starting_slot < self.starting_slot {
            error!(
                "attestation candidates cannot be rewound from slot {} to slot \
                 {new_starting_slot}; the wall clock appears to have regressed",
                self.starting_slot,
            );
            return;
        }

        if new_starting_slot == self.starting_slot {
            return;
        }

        if new_starting_slot - self.starting_slot >= lookback {
            for bucket in &mut self.buckets {
                bucket.clear();
            }
        } else {
            for slot in self.starting_slot..new_starting_slot {
                let index = usize::try_from(slot % lookback).expect("bucket index fits in usize");
                self.buckets[index].clear();
            }
        }

        self.starting_slot = new_starting_slot;
    }

    /// The entry for `fingerprint` at `slot`, created lazily on first use.
    /// `None` iff `slot` is outside the window.
    pub fn find_or_insert(
        &mut self,
        slot: Slot,
        fingerprint: H256,
        data: AttestationData,
        committee_len: usize,
    ) -> Option<&mut AttestationEntry<P>> {
        let index = self.candidate_index(slot)?;

        Some(
            self.buckets[index]
                .entry(fingerprint)
                .or_insert_with(|| AttestationEntry::new(data, committee_len)),
        )
    }

    pub fn get_mut(&mut self, slot: Slot, fingerprint: H256) -> Option<&mut AttestationEntry<P>> {
        let index = self.candidate_index(slot)?;
        self.buckets[index].get_mut(&fingerprint)
    }

    pub fn entries(&self, slot: Slot) -> impl Iterator<Item = &AttestationEntry<P>> {
        match self.candidate_index(slot) {
            Some(index) => Either::Left(self.buckets[index].values()),
            None => Either::Right(core::iter::empty()),
        }
    }

    pub fn entries_mut(&mut self, slot: Slot) -> impl Iterator<Item = &mut AttestationEntry<P>> {
        match self.candidate_index(slot) {
            Some(index) => Either::Left(self.buckets[index].values_mut()),
            None => Either::Right(core::iter::empty()),
        }
    }
}
