use core::{fmt::Debug, hash::Hash, num::NonZeroU64};

use nonzero_ext::nonzero;
use typenum::{NonZero, Unsigned, U128, U131072, U2048, U32, U4, U64, U8, U8192};

/// Compile-time configuration variables.
///
/// See [presets in `consensus-specs`](https://github.com/ethereum/consensus-specs/tree/dev/presets).
/// Only the variables consumed by the attestation pool are carried here.
pub trait Preset: Copy + Eq + Ord + Hash + Default + Debug + Send + Sync + 'static {
    type SlotsPerEpoch: Unsigned + NonZero + Eq + Debug + Send + Sync;
    type MaxAttestations: Unsigned + Eq + Debug + Send + Sync;
    type MaxAttestationsElectra: Unsigned + Eq + Debug + Send + Sync;
    type MaxCommitteesPerSlot: Unsigned + NonZero + Clone + Eq + Debug + Send + Sync;
    type MaxValidatorsPerCommittee: Unsigned + NonZero + Clone + Eq + Debug + Send + Sync;
    /// Upper bound on attesters covered by a single on-chain aggregate.
    /// Equals `MaxValidatorsPerCommittee × MaxCommitteesPerSlot`.
    type MaxAttestersPerSlot: Unsigned + NonZero + Clone + Eq + Debug + Send + Sync;

    const MIN_ATTESTATION_INCLUSION_DELAY: NonZeroU64 = nonzero!(1_u64);
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Mainnet;

impl Preset for Mainnet {
    type SlotsPerEpoch = U32;
    type MaxAttestations = U128;
    type MaxAttestationsElectra = U8;
    type MaxCommitteesPerSlot = U64;
    type MaxValidatorsPerCommittee = U2048;
    type MaxAttestersPerSlot = U131072;
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Minimal;

impl Preset for Minimal {
    type SlotsPerEpoch = U8;
    type MaxAttestations = U128;
    type MaxAttestationsElectra = U8;
    type MaxCommitteesPerSlot = U4;
    type MaxValidatorsPerCommittee = U2048;
    type MaxAttestersPerSlot = U8192;
}
