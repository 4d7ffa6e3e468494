use anyhow::Result;
use clock::Tick;
use types::{
    electra::containers::Attestation as ElectraAttestation,
    phase0::{
        containers::{Attestation, Checkpoint},
        primitives::{ExecutionBlockHash, Slot, ValidatorIndex, H256},
    },
    preset::Preset,
    traits::BeaconState,
};

/// A block known to the chain DAG, identified by root and slot.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BlockRef {
    pub root: H256,
    pub slot: Slot,
}

/// Justification and finality a block would reach if epoch processing ran on
/// top of it, as computed by the block processor ahead of time.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct UnrealizedFinality {
    pub justified: Option<Checkpoint>,
    pub finalized: Option<Checkpoint>,
}

/// The head selected by fork choice along with the execution block hashes
/// the execution layer needs to follow it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BeaconHead {
    pub block_ref: BlockRef,
    pub safe_execution_block_hash: ExecutionBlockHash,
    pub finalized_execution_block_hash: ExecutionBlockHash,
}

/// The view of the block and state store consumed by the attestation pool.
/// The store is shared and read-only from the pool's perspective.
pub trait ChainDag<P: Preset> {
    type State: BeaconState<P>;

    fn heads(&self) -> Vec<BlockRef>;

    fn finalized_block_ref(&self) -> BlockRef;

    fn get_block_ref(&self, block_root: H256) -> Option<BlockRef>;

    /// The ancestor of `block_ref` at `slot`, or `block_ref` itself when its
    /// slot is not later than `slot`.
    fn at_slot(&self, block_ref: BlockRef, slot: Slot) -> Option<BlockRef>;

    fn load_execution_block_hash(&self, block_ref: BlockRef) -> Option<ExecutionBlockHash>;

    /// Full protocol-level validation of an attestation against `state`.
    /// Signature verification is skipped when `skip_bls` is set; the pool only
    /// holds attestations whose signatures were verified on ingress.
    fn check_attestation(
        &self,
        state: &Self::State,
        attestation: &Attestation<P>,
        skip_bls: bool,
    ) -> Result<()>;

    fn check_attestation_electra(
        &self,
        state: &Self::State,
        attestation: &ElectraAttestation<P>,
        skip_bls: bool,
    ) -> Result<()>;
}

/// The fork choice store. Owned and mutated by the pool; its internal scoring
/// is a black box.
pub trait ForkChoice<P: Preset, D: ChainDag<P>> {
    type Block;
    type EpochRef;

    fn process_block(
        &mut self,
        dag: &D,
        epoch_ref: &Self::EpochRef,
        block_ref: BlockRef,
        unrealized: UnrealizedFinality,
        block: &Self::Block,
        tick: Tick,
    ) -> Result<()>;

    fn on_attestation(
        &mut self,
        dag: &D,
        slot: Slot,
        beacon_block_root: H256,
        attesting_indices: &[ValidatorIndex],
        tick: Tick,
    ) -> Result<()>;

    fn get_head(&self, dag: &D, tick: Tick) -> Result<H256>;

    fn get_safe_beacon_block_root(&self) -> H256;

    fn prune(&mut self) -> Result<()>;
}

/// Collects roots of blocks referenced before their arrival. Append-only.
pub trait Quarantine {
    fn add_missing(&self, block_root: H256);
}
