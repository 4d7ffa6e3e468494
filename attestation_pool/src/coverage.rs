use std::collections::{hash_map::Entry as HashMapEntry, HashMap};

use anyhow::{anyhow, Result};
use ssz_types::BitList;
use types::{
    nonstandard::AttestationEpoch,
    phase0::{
        consts::GENESIS_EPOCH,
        containers::AttestationData,
        primitives::{CommitteeIndex, Slot},
    },
    preset::Preset,
    traits::BeaconState,
};

use helper_functions::misc;

/// Voters already credited by the attestations reflected in the proposing
/// state, keyed by slot and committee.
///
/// Post-Altair states only record participation flags per validator. Any
/// nonzero flag marks the voter as fully counted; distinguishing the flags
/// would change which attestations look profitable and thereby inclusion
/// behavior, so the conflation is kept.
pub struct CoverageCache<P: Preset> {
    bits: HashMap<(Slot, CommitteeIndex), BitList<P::MaxValidatorsPerCommittee>>,
}

impl<P: Preset> CoverageCache<P> {
    pub fn build(state: &impl BeaconState<P>) -> Result<Self> {
        let mut cache = Self {
            bits: HashMap::new(),
        };

        if !state.is_post_altair() {
            for attestation in state
                .previous_epoch_attestations()
                .iter()
                .chain(state.current_epoch_attestations())
            {
                cache.add(attestation.data, &attestation.aggregation_bits);
            }

            return Ok(cache);
        }

        let current_epoch = misc::compute_epoch_at_slot::<P>(state.slot());
        let previous_epoch = current_epoch.saturating_sub(1).max(GENESIS_EPOCH);

        for attestation_epoch in [AttestationEpoch::Previous, AttestationEpoch::Current] {
            let (epoch, participation) = match attestation_epoch {
                AttestationEpoch::Previous => (previous_epoch, state.previous_epoch_participation()),
                AttestationEpoch::Current => (current_epoch, state.current_epoch_participation()),
            };

            for slot in misc::slots_in_epoch::<P>(epoch) {
                for committee_index in 0..state.committee_count_at_slot(slot) {
                    let committee = state.beacon_committee(slot, committee_index)?;

                    let mut bits = BitList::with_capacity(committee.len()).map_err(|error| {
                        anyhow!("committee does not fit in an aggregation bit list: {error:?}")
                    })?;

                    for (position, validator_index) in committee.iter().enumerate() {
                        let index = usize::try_from(*validator_index)?;
                        let participation_flags =
                            participation.get(index).copied().unwrap_or_default();

                        if participation_flags != 0 {
                            bits.set(position, true)
                                .expect("positions are within the committee");
                        }
                    }

                    cache.bits.insert((slot, committee_index), bits);
                }
            }
        }

        Ok(cache)
    }

    /// Credits the voters of an attestation selected for the block being built.
    pub fn add(&mut self, data: AttestationData, bits: &BitList<P::MaxValidatorsPerCommittee>) {
        match self.bits.entry((data.slot, data.index)) {
            HashMapEntry::Occupied(occupied) => {
                let covered = occupied.into_mut();
                debug_assert_eq!(covered.len(), bits.len());
                *covered = covered.union(bits);
            }
            HashMapEntry::Vacant(vacant) => {
                vacant.insert(bits.clone());
            }
        }
    }

    /// Number of voters in `bits` not yet credited for this vote's slot and
    /// committee.
    #[must_use]
    pub fn score(&self, data: AttestationData, bits: &BitList<P::MaxValidatorsPerCommittee>) -> usize {
        match self.bits.get(&(data.slot, data.index)) {
            Some(covered) => bits.difference(covered).num_set_bits(),
            None => bits.num_set_bits(),
        }
    }
}
