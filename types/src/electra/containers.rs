use bls::AggregateSignatureBytes;
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::{BitList, BitVector};
use tree_hash_derive::TreeHash;

use crate::{phase0::containers::AttestationData, preset::Preset};

/// A post-Electra attestation.
///
/// `data.index` is zero on the wire. The committees covered by the aggregate
/// are carried in `committee_bits`, and `aggregation_bits` spans the covered
/// committees in ascending committee order.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize, Encode, Decode, TreeHash)]
#[serde(bound = "", deny_unknown_fields)]
pub struct Attestation<P: Preset> {
    pub aggregation_bits: BitList<P::MaxAttestersPerSlot>,
    pub data: AttestationData,
    pub signature: AggregateSignatureBytes,
    pub committee_bits: BitVector<P::MaxCommitteesPerSlot>,
}
