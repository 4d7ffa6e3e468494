pub use crate::{
    candidates::CandidateRing,
    coverage::CoverageCache,
    entry::{AttestationEntry, Validation},
    packer::compute_on_chain_aggregate,
    pool::{AttestationPool, NextAttestationEpochs},
    traits::{BeaconHead, BlockRef, ChainDag, ForkChoice, Quarantine, UnrealizedFinality},
};

pub mod conversion;

mod candidates;
mod coverage;
mod entry;
mod packer;
mod pool;
mod traits;

#[cfg(test)]
mod test_utils;
