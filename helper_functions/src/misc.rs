use core::{cmp::min, ops::Range};

use ssz_types::BitVector;
use typenum::Unsigned as _;
use types::{
    phase0::{
        consts::{GENESIS_EPOCH, GENESIS_SLOT},
        primitives::{CommitteeIndex, Epoch, Slot},
    },
    preset::Preset,
};

#[must_use]
pub fn compute_epoch_at_slot<P: Preset>(slot: Slot) -> Epoch {
    slot / P::SlotsPerEpoch::U64
}

#[must_use]
pub fn compute_start_slot_at_epoch<P: Preset>(epoch: Epoch) -> Slot {
    epoch.saturating_mul(P::SlotsPerEpoch::U64)
}

#[must_use]
pub fn is_epoch_start<P: Preset>(slot: Slot) -> bool {
    slots_since_epoch_start::<P>(slot) == 0
}

#[must_use]
pub fn slots_since_epoch_start<P: Preset>(slot: Slot) -> u64 {
    slot - compute_start_slot_at_epoch::<P>(compute_epoch_at_slot::<P>(slot))
}

#[must_use]
pub fn slots_in_epoch<P: Preset>(epoch: Epoch) -> Range<Slot> {
    compute_start_slot_at_epoch::<P>(epoch)..compute_start_slot_at_epoch::<P>(epoch + 1)
}

/// The slot whose block seeds the attester shuffling at `epoch`.
#[must_use]
pub fn attester_dependent_slot<P: Preset>(epoch: Epoch) -> Slot {
    if epoch == GENESIS_EPOCH {
        GENESIS_SLOT
    } else {
        compute_start_slot_at_epoch::<P>(epoch) - 1
    }
}

/// Number of slots the pool keeps candidates for.
///
/// A block may include attestations no older than an epoch, though in practice
/// attestations stop being useful well before that. The extra inclusion delay
/// keeps the newest packable slot inside the window.
#[must_use]
pub fn attestation_lookback<P: Preset>() -> u64 {
    min(24, P::SlotsPerEpoch::U64) + P::MIN_ATTESTATION_INCLUSION_DELAY.get()
}

pub fn get_committee_indices<P: Preset>(
    committee_bits: &BitVector<P::MaxCommitteesPerSlot>,
) -> impl Iterator<Item = CommitteeIndex> + '_ {
    committee_bits
        .iter()
        .enumerate()
        .filter(|(_, bit)| *bit)
        .map(|(committee_index, _)| committee_index as CommitteeIndex)
}
