use anyhow::Result;

use crate::{
    altair::primitives::ParticipationFlags,
    nonstandard::Phase,
    phase0::{
        containers::PendingAttestation,
        primitives::{CommitteeIndex, Epoch, Slot, ValidatorIndex, H256},
    },
    preset::Preset,
};

/// The view of a beacon state consumed by the attestation pool.
///
/// Pre-Altair states answer participation queries with empty slices, while
/// post-Altair states answer the pending attestation queries with empty
/// slices. `phase` determines which of the two applies.
pub trait BeaconState<P: Preset> {
    fn slot(&self) -> Slot;

    fn phase(&self) -> Phase;

    fn committee_count_at_slot(&self, slot: Slot) -> u64;

    fn beacon_committee(&self, slot: Slot, committee_index: CommitteeIndex)
        -> Result<Vec<ValidatorIndex>>;

    fn previous_epoch_attestations(&self) -> &[PendingAttestation<P>];

    fn current_epoch_attestations(&self) -> &[PendingAttestation<P>];

    fn previous_epoch_participation(&self) -> &[ParticipationFlags];

    fn current_epoch_participation(&self) -> &[ParticipationFlags];

    /// Root of the block whose RANDAO mix seeds the attester shuffling
    /// at `epoch`, as seen from this state's chain.
    fn dependent_root(&self, epoch: Epoch) -> Result<H256>;

    fn is_post_altair(&self) -> bool {
        self.phase() >= Phase::Altair
    }

    fn is_post_electra(&self) -> bool {
        self.phase() >= Phase::Electra
    }
}
