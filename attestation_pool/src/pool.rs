use std::{collections::HashMap, sync::Arc};

use anyhow::{ensure, Result};
use log::{debug, error, info, trace, warn};
use ssz_types::VariableList;
use types::{
    combined::Attestation as CombinedAttestation,
    config::Config,
    electra::containers::Attestation as ElectraAttestation,
    phase0::{
        containers::Attestation,
        primitives::{CommitteeIndex, Epoch, Slot, ValidatorIndex, H256},
    },
    preset::Preset,
};

use bls::Signature;
use clock::Tick;
use helper_functions::misc;
use prometheus_metrics::Metrics;

use crate::{
    candidates::{self, CandidateRing},
    conversion, packer,
    traits::{BeaconHead, BlockRef, ChainDag, ForkChoice, Quarantine, UnrealizedFinality},
};

type OnAttestationAdded<A> = Box<dyn FnMut(&A)>;

/// Epochs up to which a validator's broadcast duties are already covered.
/// External dutying code uses these to deduplicate broadcasts.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct NextAttestationEpochs {
    pub subnet: Epoch,
    pub aggregate: Epoch,
}

/// The attestation pool.
///
/// Sits between network ingress and block production. Every attestation handed
/// to `add_attestation` must already be validated cryptographically and
/// semantically; the pool only deduplicates, aggregates and selects.
///
/// The pool is owned by a single task. All operations run to completion with
/// no suspension points, so packing always sees a consistent snapshot.
pub struct AttestationPool<P, D, F, Q>
where
    P: Preset,
    D: ChainDag<P>,
    F: ForkChoice<P, D>,
    Q: Quarantine,
{
    config: Arc<Config>,
    dag: Arc<D>,
    quarantine: Arc<Q>,
    fork_choice: F,
    phase0_candidates: CandidateRing<P>,
    electra_candidates: CandidateRing<P>,
    next_attestation_epochs: HashMap<ValidatorIndex, NextAttestationEpochs>,
    on_phase0_attestation_added: Option<OnAttestationAdded<Attestation<P>>>,
    on_electra_attestation_added: Option<OnAttestationAdded<ElectraAttestation<P>>>,
    metrics: Option<Arc<Metrics>>,
}

impl<P, D, F, Q> AttestationPool<P, D, F, Q>
where
    P: Preset,
    D: ChainDag<P>,
    F: ForkChoice<P, D>,
    Q: Quarantine,
{
    pub fn new(
        config: Arc<Config>,
        dag: Arc<D>,
        quarantine: Arc<Q>,
        fork_choice: F,
        metrics: Option<Arc<Metrics>>,
    ) -> Result<Self> {
        ensure!(
            dag.heads().len() == 1,
            "the chain DAG must have a single head when the attestation pool is initialized",
        );

        info!(
            "attestation pool initialized with a lookback of {} slots",
            misc::attestation_lookback::<P>(),
        );

        Ok(Self {
            config,
            dag,
            quarantine,
            fork_choice,
            phase0_candidates: CandidateRing::new(),
            electra_candidates: CandidateRing::new(),
            next_attestation_epochs: HashMap::new(),
            on_phase0_attestation_added: None,
            on_electra_attestation_added: None,
            metrics,
        })
    }

    #[must_use]
    pub const fn fork_choice(&self) -> &F {
        &self.fork_choice
    }

    pub fn set_on_phase0_attestation_added(
        &mut self,
        callback: impl FnMut(&Attestation<P>) + 'static,
    ) {
        self.on_phase0_attestation_added = Some(Box::new(callback));
    }

    pub fn set_on_electra_attestation_added(
        &mut self,
        callback: impl FnMut(&ElectraAttestation<P>) + 'static,
    ) {
        self.on_electra_attestation_added = Some(Box::new(callback));
    }

    /// Moves both candidate windows forward to `wall_slot`, discarding buckets
    /// that fall out of them.
    pub fn advance(&mut self, wall_slot: Slot) {
        self.phase0_candidates.advance(wall_slot);
        self.electra_candidates.advance(wall_slot);
    }

    /// Adds a fully validated attestation to the pool.
    ///
    /// Votes that add no new information are dropped without notifying fork
    /// choice a second time. Nothing is returned; failures here are either
    /// benign (stale or duplicate votes) or recoverable by fork choice later.
    pub fn add_attestation(
        &mut self,
        attestation: &CombinedAttestation<P>,
        attesting_indices: &[ValidatorIndex],
        signature: Signature,
        tick: Tick,
    ) {
        match attestation {
            CombinedAttestation::Phase0(attestation) => {
                self.add_phase0_attestation(attestation, attesting_indices, signature, tick);
            }
            CombinedAttestation::Electra(attestation) => {
                self.add_electra_attestation(attestation, attesting_indices, signature, tick);
            }
        }
    }

    fn add_phase0_attestation(
        &mut self,
        attestation: &Attestation<P>,
        attesting_indices: &[ValidatorIndex],
        signature: Signature,
        tick: Tick,
    ) {
        self.advance(tick.slot);

        let data = attestation.data;
        let fingerprint = candidates::phase0_fingerprint(&data);
        let committee_len = attestation.aggregation_bits.len();

        let Some(entry) =
            self.phase0_candidates
                .find_or_insert(data.slot, fingerprint, data, committee_len)
        else {
            debug!("attestation is too old for the candidate window: {data:?}");
            return;
        };

        if !entry.insert(&attestation.aggregation_bits, signature) {
            trace!("attestation is already known to the pool: {data:?}");
            return;
        }

        debug!("attestation added to the pool: {data:?}");

        if let Some(metrics) = self.metrics.as_ref() {
            metrics.register_attestation("phase0");
        }

        self.notify_fork_choice(data.slot, data.beacon_block_root, attesting_indices, tick);

        if let Some(on_attestation_added) = self.on_phase0_attestation_added.as_mut() {
            on_attestation_added(attestation);
        }
    }

    fn add_electra_attestation(
        &mut self,
        attestation: &ElectraAttestation<P>,
        attesting_indices: &[ValidatorIndex],
        signature: Signature,
        tick: Tick,
    ) {
        self.advance(tick.slot);

        let committee_index = match conversion::committee_index(attestation) {
            Ok(committee_index) => committee_index,
            Err(error) => {
                debug!("ignoring attestation with unusable committee bits: {error}");
                return;
            }
        };

        let aggregation_bits =
            match conversion::narrow_aggregation_bits::<P>(&attestation.aggregation_bits) {
                Ok(aggregation_bits) => aggregation_bits,
                Err(error) => {
                    debug!("ignoring attestation with unusable aggregation bits: {error}");
                    return;
                }
            };

        let mut data = attestation.data;
        data.index = committee_index;

        let fingerprint = candidates::electra_fingerprint(&data, committee_index);
        let committee_len = aggregation_bits.len();

        let Some(entry) =
            self.electra_candidates
                .find_or_insert(data.slot, fingerprint, data, committee_len)
        else {
            debug!("attestation is too old for the candidate window: {data:?}");
            return;
        };

        if !entry.insert(&aggregation_bits, signature) {
            trace!("attestation is already known to the pool: {data:?}");
            return;
        }

        debug!("attestation added to the pool: {data:?}");

        if let Some(metrics) = self.metrics.as_ref() {
            metrics.register_attestation("electra");
        }

        self.notify_fork_choice(data.slot, data.beacon_block_root, attesting_indices, tick);

        if let Some(on_attestation_added) = self.on_electra_attestation_added.as_mut() {
            on_attestation_added(attestation);
        }
    }

    /// Packs attestations for a block proposed on top of `state`.
    pub fn attestations_for_block(
        &mut self,
        state: &D::State,
    ) -> Result<VariableList<Attestation<P>, P::MaxAttestations>> {
        packer::pack_attestations_phase0(
            self.dag.as_ref(),
            &mut self.phase0_candidates,
            state,
            self.metrics.as_deref(),
        )
    }

    pub fn attestations_for_block_electra(
        &mut self,
        state: &D::State,
    ) -> Result<VariableList<ElectraAttestation<P>, P::MaxAttestationsElectra>> {
        packer::pack_attestations_electra(
            &self.config,
            self.dag.as_ref(),
            &mut self.electra_candidates,
            state,
            self.metrics.as_deref(),
        )
    }

    /// The best aggregate known for the vote with the given data root.
    pub fn aggregate_attestation(
        &mut self,
        slot: Slot,
        attestation_data_root: H256,
    ) -> Option<Attestation<P>> {
        let entry = self.phase0_candidates.get_mut(slot, attestation_data_root)?;

        entry.update_aggregates();

        let best = entry
            .aggregates()
            .iter()
            .max_by_key(|validation| validation.aggregation_bits.num_set_bits())?;

        Some(entry.to_phase0_attestation(best))
    }

    /// The best aggregate across all votes from one committee at `slot`.
    pub fn aggregate_attestation_by_committee(
        &mut self,
        slot: Slot,
        committee_index: CommitteeIndex,
    ) -> Option<Attestation<P>> {
        for entry in self.phase0_candidates.entries_mut(slot) {
            if entry.data().index == committee_index {
                entry.update_aggregates();
            }
        }

        self.phase0_candidates
            .entries(slot)
            .filter(|entry| entry.data().index == committee_index)
            .flat_map(|entry| {
                entry
                    .aggregates()
                    .iter()
                    .map(move |validation| (entry, validation))
            })
            .max_by_key(|(_, validation)| validation.aggregation_bits.num_set_bits())
            .map(|(entry, validation)| entry.to_phase0_attestation(validation))
    }

    /// Like `aggregate_attestation`, for post-Electra votes. The result covers
    /// a single committee; only block packing merges committees.
    pub fn electra_aggregate_attestation(
        &mut self,
        slot: Slot,
        attestation_data_root: H256,
        committee_index: CommitteeIndex,
    ) -> Option<ElectraAttestation<P>> {
        let fingerprint =
            candidates::electra_fingerprint_from_root(attestation_data_root, committee_index);

        let entry = self.electra_candidates.get_mut(slot, fingerprint)?;

        entry.update_aggregates();

        let best = entry
            .aggregates()
            .iter()
            .max_by_key(|validation| validation.aggregation_bits.num_set_bits())?;

        match entry.to_electra_attestation(best) {
            Ok(attestation) => Some(attestation),
            Err(error) => {
                warn!("unable to materialize pool aggregate: {error}");
                None
            }
        }
    }

    /// All phase0 votes in the window matching the filters, one synthetic
    /// attestation per single vote followed by the aggregates of each entry.
    pub fn phase0_attestations(
        &self,
        slot_filter: Option<Slot>,
        committee_filter: Option<CommitteeIndex>,
    ) -> Vec<Attestation<P>> {
        let mut attestations = vec![];

        for slot in self.filtered_slots(&self.phase0_candidates, slot_filter) {
            for entry in self.phase0_candidates.entries(slot) {
                if committee_filter.is_some_and(|index| entry.data().index != index) {
                    continue;
                }

                for (index, signature) in entry.singles() {
                    attestations.push(entry.to_single_phase0_attestation(index, signature));
                }

                for validation in entry.aggregates() {
                    attestations.push(entry.to_phase0_attestation(validation));
                }
            }
        }

        attestations
    }

    pub fn electra_attestations(
        &self,
        slot_filter: Option<Slot>,
        committee_filter: Option<CommitteeIndex>,
    ) -> Vec<ElectraAttestation<P>> {
        let mut attestations = vec![];

        for slot in self.filtered_slots(&self.electra_candidates, slot_filter) {
            for entry in self.electra_candidates.entries(slot) {
                if committee_filter.is_some_and(|index| entry.data().index != index) {
                    continue;
                }

                for (index, signature) in entry.singles() {
                    match entry.to_single_electra_attestation(index, signature) {
                        Ok(attestation) => attestations.push(attestation),
                        Err(error) => warn!("unable to materialize pool attestation: {error}"),
                    }
                }

                for validation in entry.aggregates() {
                    match entry.to_electra_attestation(validation) {
                        Ok(attestation) => attestations.push(attestation),
                        Err(error) => warn!("unable to materialize pool aggregate: {error}"),
                    }
                }
            }
        }

        attestations
    }

    /// Forwards a new block to the fork choice store. Errors are logged and
    /// swallowed; fork choice is expected to heal when later data arrives.
    pub fn add_fork_choice(
        &mut self,
        epoch_ref: &F::EpochRef,
        block_ref: BlockRef,
        unrealized: UnrealizedFinality,
        block: &F::Block,
        tick: Tick,
    ) {
        if let Err(error) = self.fork_choice.process_block(
            self.dag.as_ref(),
            epoch_ref,
            block_ref,
            unrealized,
            block,
            tick,
        ) {
            error!(
                "fork choice rejected block {} at slot {}: {error:?}",
                block_ref.root, block_ref.slot,
            );
        }
    }

    /// Forwards votes that reached the pool outside of ingestion, such as
    /// those unpacked from blocks.
    pub fn add_fork_choice_votes(
        &mut self,
        slot: Slot,
        attesting_indices: &[ValidatorIndex],
        beacon_block_root: H256,
        tick: Tick,
    ) {
        self.notify_fork_choice(slot, beacon_block_root, attesting_indices, tick);
    }

    /// Asks fork choice for the canonical head and resolves it to a block the
    /// DAG knows. An unknown head is quarantined and reported as `None`.
    pub fn select_head(&mut self, tick: Tick) -> Option<BeaconHead> {
        let head_root = match self.fork_choice.get_head(self.dag.as_ref(), tick) {
            Ok(head_root) => head_root,
            Err(error) => {
                error!("fork choice failed to select a head: {error:?}");
                return None;
            }
        };

        let Some(head) = self.dag.get_block_ref(head_root) else {
            warn!("fork choice selected head {head_root} missing from the chain DAG");
            self.quarantine.add_missing(head_root);
            return None;
        };

        let finalized_execution_block_hash = self
            .dag
            .load_execution_block_hash(self.dag.finalized_block_ref())
            .unwrap_or_default();

        let safe_execution_block_hash = self
            .dag
            .get_block_ref(self.fork_choice.get_safe_beacon_block_root())
            .and_then(|block_ref| self.dag.load_execution_block_hash(block_ref))
            .unwrap_or(finalized_execution_block_hash);

        info!("head selected: {head_root} at slot {}", head.slot);

        Some(BeaconHead {
            block_ref: head,
            safe_execution_block_hash,
            finalized_execution_block_hash,
        })
    }

    pub fn prune(&mut self) {
        if let Err(error) = self.fork_choice.prune() {
            error!("pruning fork choice failed: {error:?}");
        }
    }

    #[must_use]
    pub fn next_attestation_epochs(&self, validator_index: ValidatorIndex) -> NextAttestationEpochs {
        self.next_attestation_epochs
            .get(&validator_index)
            .copied()
            .unwrap_or_default()
    }

    /// Records that a subnet attestation for `epoch` has been broadcast on
    /// behalf of `validator_index`.
    pub fn note_subnet_attestation(&mut self, validator_index: ValidatorIndex, epoch: Epoch) {
        let epochs = self.next_attestation_epochs.entry(validator_index).or_default();
        epochs.subnet = epochs.subnet.max(epoch + 1);
    }

    /// Records that an aggregate for `epoch` has been broadcast on behalf of
    /// `validator_index`.
    pub fn note_aggregate_attestation(&mut self, validator_index: ValidatorIndex, epoch: Epoch) {
        let epochs = self.next_attestation_epochs.entry(validator_index).or_default();
        epochs.aggregate = epochs.aggregate.max(epoch + 1);
    }

    fn notify_fork_choice(
        &mut self,
        slot: Slot,
        beacon_block_root: H256,
        attesting_indices: &[ValidatorIndex],
        tick: Tick,
    ) {
        if let Err(error) = self.fork_choice.on_attestation(
            self.dag.as_ref(),
            slot,
            beacon_block_root,
            attesting_indices,
            tick,
        ) {
            error!("fork choice rejected attestation votes: {error:?}");
        }
    }

    fn filtered_slots(
        &self,
        ring: &CandidateRing<P>,
        slot_filter: Option<Slot>,
    ) -> Vec<Slot> {
        match slot_filter {
            Some(slot) => vec![slot],
            None => {
                let starting_slot = ring.starting_slot();
                (starting_slot..starting_slot + misc::attestation_lookback::<P>()).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use itertools::Itertools as _;
    use tree_hash::TreeHash as _;
    use types::phase0::primitives::ExecutionBlockHash;

    use crate::test_utils::{
        attestation_data, electra_attestation, phase0_attestation, pool_with, TestDag,
        TestForkChoice, TestPool,
    };

    use super::*;

    fn default_pool() -> (TestPool, Arc<crate::test_utils::TestQuarantine>) {
        pool_with(TestDag::default(), TestForkChoice::default())
    }

    fn ingest_phase0(pool: &mut TestPool, slot: Slot, voters: &[usize]) {
        let data = attestation_data(slot, 0, H256::repeat_byte(1));
        let (attestation, signature) = phase0_attestation(data, 8, voters);

        pool.add_attestation(
            &CombinedAttestation::Phase0(attestation),
            &[7],
            signature,
            Tick::start_of_slot(slot),
        );
    }

    #[test]
    fn duplicate_votes_notify_fork_choice_once() {
        let (mut pool, _quarantine) = default_pool();

        let added = Rc::new(Cell::new(0));
        let observed = added.clone();

        pool.set_on_phase0_attestation_added(move |_| observed.set(observed.get() + 1));

        ingest_phase0(&mut pool, 10, &[5]);
        ingest_phase0(&mut pool, 10, &[5]);

        assert_eq!(pool.fork_choice().attestation_events.len(), 1);
        assert_eq!(added.get(), 1);
    }

    #[test]
    fn fork_choice_rejections_are_swallowed() {
        let fork_choice = TestForkChoice {
            reject_attestations: true,
            ..TestForkChoice::default()
        };

        let (mut pool, _quarantine) = pool_with(TestDag::default(), fork_choice);

        ingest_phase0(&mut pool, 10, &[5]);

        // The vote is still in the pool even though fork choice rejected it.
        assert_eq!(pool.phase0_attestations(Some(10), None).len(), 1);
    }

    #[test]
    fn stale_attestations_are_dropped() {
        let (mut pool, _quarantine) = default_pool();

        // Slot 100 pushes the window past slot 10.
        pool.advance(100);

        ingest_phase0(&mut pool, 10, &[5]);

        assert!(pool.fork_choice().attestation_events.is_empty());
        assert!(pool.phase0_attestations(None, None).is_empty());
    }

    #[test]
    fn eviction_discards_old_votes() {
        let (mut pool, _quarantine) = default_pool();

        ingest_phase0(&mut pool, 10, &[5]);
        assert_eq!(pool.phase0_attestations(None, None).len(), 1);

        pool.advance(100);

        assert!(pool.phase0_attestations(None, None).is_empty());
    }

    #[test]
    fn electra_votes_with_multiple_committee_bits_are_ignored() {
        let (mut pool, _quarantine) = default_pool();

        let data = attestation_data(10, 0, H256::repeat_byte(1));
        let (mut attestation, signature) = electra_attestation(data, 1, 8, &[3]);

        attestation
            .committee_bits
            .set(2, true)
            .expect("index is in bounds");

        pool.add_attestation(
            &CombinedAttestation::Electra(attestation),
            &[7],
            signature,
            Tick::start_of_slot(10),
        );

        assert!(pool.fork_choice().attestation_events.is_empty());
        assert!(pool.electra_attestations(None, None).is_empty());
    }

    #[test]
    fn electra_votes_are_keyed_by_committee() {
        let (mut pool, _quarantine) = default_pool();

        let data = attestation_data(10, 1, H256::repeat_byte(1));
        let (attestation, signature) = electra_attestation(data, 1, 8, &[3, 4]);

        pool.add_attestation(
            &CombinedAttestation::Electra(attestation),
            &[7],
            signature,
            Tick::start_of_slot(10),
        );

        let mut zeroed = data;
        zeroed.index = 0;

        let aggregate = pool
            .electra_aggregate_attestation(10, zeroed.tree_hash_root(), 1)
            .expect("the vote is in the pool");

        assert_eq!(
            misc::get_committee_indices::<types::preset::Minimal>(&aggregate.committee_bits)
                .collect_vec(),
            [1],
        );
        assert_eq!(aggregate.data.index, 0);

        // No entry is keyed under a committee that did not vote.
        assert_eq!(
            pool.electra_aggregate_attestation(10, zeroed.tree_hash_root(), 2),
            None,
        );
    }

    #[test]
    fn aggregation_queries_fold_in_singles() {
        let (mut pool, _quarantine) = default_pool();

        ingest_phase0(&mut pool, 10, &[2]);
        ingest_phase0(&mut pool, 10, &[5]);
        ingest_phase0(&mut pool, 10, &[1, 3]);

        let data = attestation_data(10, 0, H256::repeat_byte(1));

        let aggregate = pool
            .aggregate_attestation(10, data.tree_hash_root())
            .expect("the votes are in the pool");

        assert_eq!(aggregate.aggregation_bits.num_set_bits(), 4);

        let by_committee = pool
            .aggregate_attestation_by_committee(10, 0)
            .expect("the votes are in the pool");

        assert_eq!(by_committee.aggregation_bits.num_set_bits(), 4);
        assert_eq!(pool.aggregate_attestation_by_committee(10, 3), None);
    }

    #[test]
    fn iteration_yields_singles_then_aggregates() {
        let (mut pool, _quarantine) = default_pool();

        ingest_phase0(&mut pool, 10, &[2]);
        ingest_phase0(&mut pool, 10, &[1, 3]);

        let attestations = pool.phase0_attestations(Some(10), Some(0));

        assert_eq!(attestations.len(), 2);
        assert_eq!(attestations[0].aggregation_bits.num_set_bits(), 1);
        assert_eq!(attestations[1].aggregation_bits.num_set_bits(), 2);

        assert!(pool.phase0_attestations(Some(10), Some(1)).is_empty());
        assert_eq!(pool.phase0_attestations(None, None).len(), 2);
    }

    #[test]
    fn unknown_heads_are_quarantined() {
        let missing_root = H256::repeat_byte(0xee);

        let fork_choice = TestForkChoice {
            head: missing_root,
            ..TestForkChoice::default()
        };

        let (mut pool, quarantine) = pool_with(TestDag::default(), fork_choice);

        assert_eq!(pool.select_head(Tick::start_of_slot(1)), None);
        assert_eq!(quarantine.missing.borrow().as_slice(), [missing_root]);
    }

    #[test]
    fn head_selection_falls_back_to_the_finalized_execution_hash() {
        let head_root = H256::repeat_byte(0x01);
        let finalized_hash = ExecutionBlockHash::repeat_byte(0x0f);

        let mut dag = TestDag::default();
        dag.blocks.insert(
            head_root,
            BlockRef {
                root: head_root,
                slot: 3,
            },
        );
        dag.execution_block_hashes
            .insert(dag.finalized.root, finalized_hash);

        let fork_choice = TestForkChoice {
            head: head_root,
            safe_block_root: H256::repeat_byte(0x5a),
            ..TestForkChoice::default()
        };

        let (mut pool, _quarantine) = pool_with(dag, fork_choice);

        let head = pool
            .select_head(Tick::start_of_slot(4))
            .expect("the head is known to the DAG");

        assert_eq!(head.block_ref.root, head_root);
        assert_eq!(head.block_ref.slot, 3);

        // The safe block is unknown, so its hash falls back to the finalized one.
        assert_eq!(head.safe_execution_block_hash, finalized_hash);
        assert_eq!(head.finalized_execution_block_hash, finalized_hash);
    }

    #[test]
    fn pruning_is_forwarded_to_fork_choice() {
        let (mut pool, _quarantine) = default_pool();

        pool.prune();

        assert!(pool.fork_choice().pruned);
    }

    #[test]
    fn broadcast_epochs_only_move_forward() {
        let (mut pool, _quarantine) = default_pool();

        assert_eq!(pool.next_attestation_epochs(7), NextAttestationEpochs::default());

        pool.note_subnet_attestation(7, 4);
        pool.note_aggregate_attestation(7, 2);
        pool.note_subnet_attestation(7, 3);

        let epochs = pool.next_attestation_epochs(7);

        assert_eq!(epochs.subnet, 5);
        assert_eq!(epochs.aggregate, 3);
    }
}
