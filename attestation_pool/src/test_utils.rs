use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    sync::Arc,
};

use anyhow::{anyhow, bail, Result};
use bls::{SecretKey, Signature};
use clock::Tick;
use ssz_types::BitList;
use tree_hash::TreeHash as _;
use types::{
    altair::primitives::ParticipationFlags,
    config::Config,
    electra::containers::Attestation as ElectraAttestation,
    nonstandard::Phase,
    phase0::{
        containers::{Attestation, AttestationData, Checkpoint, PendingAttestation},
        primitives::{CommitteeIndex, Epoch, ExecutionBlockHash, Slot, ValidatorIndex, H256},
    },
    preset::{Minimal, Preset},
    traits::BeaconState,
};

use crate::{
    pool::AttestationPool,
    traits::{BlockRef, ChainDag, ForkChoice, Quarantine, UnrealizedFinality},
};

pub const MESSAGE: &[u8] = b"attestation pool test message";

pub type TestPool = AttestationPool<Minimal, TestDag, TestForkChoice, TestQuarantine>;

pub fn secret_key(seed: u64) -> SecretKey {
    let mut ikm = [0; 32];
    ikm[..8].copy_from_slice(&seed.to_le_bytes());
    SecretKey::key_gen(&ikm).expect("32 bytes of keying material are sufficient")
}

pub fn signature(seed: u64) -> Signature {
    secret_key(seed).sign(MESSAGE)
}

pub fn aggregation_bits(
    committee_len: usize,
    voters: &[usize],
) -> BitList<<Minimal as Preset>::MaxValidatorsPerCommittee> {
    let mut bits = BitList::with_capacity(committee_len).expect("committee length is in bounds");

    for voter in voters {
        bits.set(*voter, true).expect("voters are in the committee");
    }

    bits
}

pub fn attestation_data(slot: Slot, index: CommitteeIndex, beacon_block_root: H256) -> AttestationData {
    AttestationData {
        slot,
        index,
        beacon_block_root,
        source: Checkpoint::default(),
        target: Checkpoint {
            epoch: helper_functions::misc::compute_epoch_at_slot::<Minimal>(slot),
            root: beacon_block_root,
        },
    }
}

pub fn phase0_attestation(
    data: AttestationData,
    committee_len: usize,
    voters: &[usize],
) -> (Attestation<Minimal>, Signature) {
    let signature = signature(voters.first().copied().unwrap_or_default() as u64);

    let attestation = Attestation {
        aggregation_bits: aggregation_bits(committee_len, voters),
        data,
        signature: signature.into(),
    };

    (attestation, signature)
}

pub fn electra_attestation(
    data: AttestationData,
    committee_index: CommitteeIndex,
    committee_len: usize,
    voters: &[usize],
) -> (ElectraAttestation<Minimal>, Signature) {
    let signature = signature(voters.first().copied().unwrap_or_default() as u64);

    let attestation = ElectraAttestation {
        aggregation_bits: crate::conversion::widen_aggregation_bits::<Minimal>(&aggregation_bits(
            committee_len,
            voters,
        )),
        data: AttestationData { index: 0, ..data },
        signature: signature.into(),
        committee_bits: crate::conversion::singleton_committee_bits::<Minimal>(committee_index)
            .expect("test committee indices are in range"),
    };

    (attestation, signature)
}

#[derive(Default)]
pub struct TestState {
    pub slot: Slot,
    pub phase_override: Option<Phase>,
    pub committees: HashMap<(Slot, CommitteeIndex), Vec<ValidatorIndex>>,
    pub previous_epoch_attestations: Vec<PendingAttestation<Minimal>>,
    pub current_epoch_attestations: Vec<PendingAttestation<Minimal>>,
    pub previous_epoch_participation: Vec<ParticipationFlags>,
    pub current_epoch_participation: Vec<ParticipationFlags>,
    pub dependent_roots: HashMap<Epoch, H256>,
}

impl BeaconState<Minimal> for TestState {
    fn slot(&self) -> Slot {
        self.slot
    }

    fn phase(&self) -> Phase {
        self.phase_override.unwrap_or(Phase::Electra)
    }

    fn committee_count_at_slot(&self, slot: Slot) -> u64 {
        self.committees
            .keys()
            .filter(|(committee_slot, _)| *committee_slot == slot)
            .count() as u64
    }

    fn beacon_committee(
        &self,
        slot: Slot,
        committee_index: CommitteeIndex,
    ) -> Result<Vec<ValidatorIndex>> {
        self.committees
            .get(&(slot, committee_index))
            .cloned()
            .ok_or_else(|| anyhow!("no committee at slot {slot} with index {committee_index}"))
    }

    fn previous_epoch_attestations(&self) -> &[PendingAttestation<Minimal>] {
        &self.previous_epoch_attestations
    }

    fn current_epoch_attestations(&self) -> &[PendingAttestation<Minimal>] {
        &self.current_epoch_attestations
    }

    fn previous_epoch_participation(&self) -> &[ParticipationFlags] {
        &self.previous_epoch_participation
    }

    fn current_epoch_participation(&self) -> &[ParticipationFlags] {
        &self.current_epoch_participation
    }

    fn dependent_root(&self, epoch: Epoch) -> Result<H256> {
        self.dependent_roots
            .get(&epoch)
            .copied()
            .ok_or_else(|| anyhow!("no dependent root for epoch {epoch}"))
    }
}

pub struct TestDag {
    pub heads: Vec<BlockRef>,
    pub finalized: BlockRef,
    pub blocks: HashMap<H256, BlockRef>,
    pub ancestors: HashMap<(H256, Slot), BlockRef>,
    pub execution_block_hashes: HashMap<H256, ExecutionBlockHash>,
    pub rejected_data_roots: HashSet<H256>,
}

impl Default for TestDag {
    fn default() -> Self {
        let genesis = BlockRef {
            root: H256::ZERO,
            slot: 0,
        };

        Self {
            heads: vec![genesis],
            finalized: genesis,
            blocks: HashMap::from([(genesis.root, genesis)]),
            ancestors: HashMap::new(),
            execution_block_hashes: HashMap::new(),
            rejected_data_roots: HashSet::new(),
        }
    }
}

impl TestDag {
    /// Registers a block along with the ancestor answering shuffling queries
    /// for `epoch` from any state that agrees with `dependent_root`.
    pub fn add_block_with_dependent(
        &mut self,
        block_ref: BlockRef,
        epoch: Epoch,
        dependent_root: H256,
    ) {
        self.blocks.insert(block_ref.root, block_ref);

        let dependent_slot = helper_functions::misc::attester_dependent_slot::<Minimal>(epoch);

        self.ancestors.insert(
            (block_ref.root, dependent_slot),
            BlockRef {
                root: dependent_root,
                slot: dependent_slot,
            },
        );
    }
}

impl ChainDag<Minimal> for TestDag {
    type State = TestState;

    fn heads(&self) -> Vec<BlockRef> {
        self.heads.clone()
    }

    fn finalized_block_ref(&self) -> BlockRef {
        self.finalized
    }

    fn get_block_ref(&self, block_root: H256) -> Option<BlockRef> {
        self.blocks.get(&block_root).copied()
    }

    fn at_slot(&self, block_ref: BlockRef, slot: Slot) -> Option<BlockRef> {
        if block_ref.slot <= slot {
            return Some(block_ref);
        }

        self.ancestors.get(&(block_ref.root, slot)).copied()
    }

    fn load_execution_block_hash(&self, block_ref: BlockRef) -> Option<ExecutionBlockHash> {
        self.execution_block_hashes.get(&block_ref.root).copied()
    }

    fn check_attestation(
        &self,
        _state: &Self::State,
        attestation: &Attestation<Minimal>,
        _skip_bls: bool,
    ) -> Result<()> {
        if self
            .rejected_data_roots
            .contains(&attestation.data.tree_hash_root())
        {
            bail!("attestation failed state validation");
        }

        Ok(())
    }

    fn check_attestation_electra(
        &self,
        _state: &Self::State,
        attestation: &ElectraAttestation<Minimal>,
        _skip_bls: bool,
    ) -> Result<()> {
        if self
            .rejected_data_roots
            .contains(&attestation.data.tree_hash_root())
        {
            bail!("attestation failed state validation");
        }

        Ok(())
    }
}

#[derive(Default)]
pub struct TestForkChoice {
    pub head: H256,
    pub safe_block_root: H256,
    pub reject_attestations: bool,
    pub attestation_events: Vec<(Slot, H256, Vec<ValidatorIndex>)>,
    pub block_events: Vec<H256>,
    pub pruned: bool,
}

impl ForkChoice<Minimal, TestDag> for TestForkChoice {
    type Block = ();
    type EpochRef = ();

    fn process_block(
        &mut self,
        _dag: &TestDag,
        _epoch_ref: &Self::EpochRef,
        block_ref: BlockRef,
        _unrealized: UnrealizedFinality,
        _block: &Self::Block,
        _tick: Tick,
    ) -> Result<()> {
        self.block_events.push(block_ref.root);
        Ok(())
    }

    fn on_attestation(
        &mut self,
        _dag: &TestDag,
        slot: Slot,
        beacon_block_root: H256,
        attesting_indices: &[ValidatorIndex],
        _tick: Tick,
    ) -> Result<()> {
        if self.reject_attestations {
            bail!("the fork choice store rejected the vote");
        }

        self.attestation_events
            .push((slot, beacon_block_root, attesting_indices.to_vec()));

        Ok(())
    }

    fn get_head(&self, _dag: &TestDag, _tick: Tick) -> Result<H256> {
        Ok(self.head)
    }

    fn get_safe_beacon_block_root(&self) -> H256 {
        self.safe_block_root
    }

    fn prune(&mut self) -> Result<()> {
        self.pruned = true;
        Ok(())
    }
}

#[derive(Default)]
pub struct TestQuarantine {
    pub missing: RefCell<Vec<H256>>,
}

impl Quarantine for TestQuarantine {
    fn add_missing(&self, block_root: H256) {
        self.missing.borrow_mut().push(block_root);
    }
}

pub fn pool_with(dag: TestDag, fork_choice: TestForkChoice) -> (TestPool, Arc<TestQuarantine>) {
    let quarantine = Arc::new(TestQuarantine::default());

    let pool = AttestationPool::new(
        Arc::new(Config::minimal()),
        Arc::new(dag),
        quarantine.clone(),
        fork_choice,
        None,
    )
    .expect("the test DAG has a single head");

    (pool, quarantine)
}
