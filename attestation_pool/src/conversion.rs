use ssz_types::{BitList, BitVector};
use thiserror::Error;
use types::{
    electra::containers::Attestation as ElectraAttestation,
    phase0::primitives::CommitteeIndex,
    preset::Preset,
};

use helper_functions::misc;

#[derive(Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error("aggregation bits do not fit in a single committee")]
    AggregationBitsTooLong,
    #[error("committee index {committee_index} is out of range")]
    CommitteeIndexOutOfRange { committee_index: CommitteeIndex },
    #[error("attestation has no committee bits set")]
    MissingCommitteeIndex,
    #[error("attestation has multiple committee bits set")]
    MultipleCommitteeIndices,
}

/// Extracts the committee index from an attestation whose `committee_bits`
/// must be a singleton. Aggregation over subnets never crosses committees.
pub fn committee_index<P: Preset>(
    attestation: &ElectraAttestation<P>,
) -> Result<CommitteeIndex, Error> {
    let mut committee_indices = misc::get_committee_indices::<P>(&attestation.committee_bits);

    let committee_index = committee_indices
        .next()
        .ok_or(Error::MissingCommitteeIndex)?;

    if committee_indices.next().is_some() {
        return Err(Error::MultipleCommitteeIndices);
    }

    Ok(committee_index)
}

/// Reinterprets the aggregation bits of a single-committee attestation as a
/// committee-sized bit list.
pub fn narrow_aggregation_bits<P: Preset>(
    aggregation_bits: &BitList<P::MaxAttestersPerSlot>,
) -> Result<BitList<P::MaxValidatorsPerCommittee>, Error> {
    let mut narrowed = BitList::with_capacity(aggregation_bits.len())
        .map_err(|_| Error::AggregationBitsTooLong)?;

    for (index, bit) in aggregation_bits.iter().enumerate() {
        if bit {
            narrowed
                .set(index, true)
                .expect("the narrowed bit list has the same length");
        }
    }

    Ok(narrowed)
}

/// The inverse of `narrow_aggregation_bits`. Committee-sized bit lists always
/// fit in the per-slot limit.
#[must_use]
pub fn widen_aggregation_bits<P: Preset>(
    aggregation_bits: &BitList<P::MaxValidatorsPerCommittee>,
) -> BitList<P::MaxAttestersPerSlot> {
    let mut widened = BitList::with_capacity(aggregation_bits.len())
        .expect("a committee bit list fits in the per-slot bit list");

    for (index, bit) in aggregation_bits.iter().enumerate() {
        if bit {
            widened
                .set(index, true)
                .expect("the widened bit list has the same length");
        }
    }

    widened
}

pub fn singleton_committee_bits<P: Preset>(
    committee_index: CommitteeIndex,
) -> Result<BitVector<P::MaxCommitteesPerSlot>, Error> {
    let mut committee_bits = BitVector::new();

    let index = usize::try_from(committee_index)
        .map_err(|_| Error::CommitteeIndexOutOfRange { committee_index })?;

    committee_bits
        .set(index, true)
        .map_err(|_| Error::CommitteeIndexOutOfRange { committee_index })?;

    Ok(committee_bits)
}
