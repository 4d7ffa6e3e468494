use derive_more::From;

use crate::{
    electra::containers::Attestation as ElectraAttestation,
    phase0::containers::{Attestation as Phase0Attestation, AttestationData},
    phase0::primitives::Slot,
    preset::Preset,
};

/// An attestation of either schema, as handed to the pool by network ingress.
#[derive(Clone, PartialEq, Eq, Debug, From)]
pub enum Attestation<P: Preset> {
    Phase0(Phase0Attestation<P>),
    Electra(ElectraAttestation<P>),
}

impl<P: Preset> Attestation<P> {
    #[must_use]
    pub const fn data(&self) -> AttestationData {
        match self {
            Self::Phase0(attestation) => attestation.data,
            Self::Electra(attestation) => attestation.data,
        }
    }

    #[must_use]
    pub const fn slot(&self) -> Slot {
        self.data().slot
    }

    #[must_use]
    pub fn count_ones(&self) -> usize {
        match self {
            Self::Phase0(attestation) => attestation.aggregation_bits.num_set_bits(),
            Self::Electra(attestation) => attestation.aggregation_bits.num_set_bits(),
        }
    }
}
