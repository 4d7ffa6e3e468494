use std::time::Instant;

use anyhow::{anyhow, Result};
use itertools::Itertools as _;
use log::{debug, warn};
use ssz_types::{BitList, BitVector, VariableList};
use typenum::Unsigned as _;
use types::{
    config::Config,
    electra::containers::Attestation as ElectraAttestation,
    phase0::{
        containers::{Attestation, AttestationData},
        primitives::{CommitteeIndex, Slot},
    },
    preset::Preset,
    traits::BeaconState,
};

use bls::AggregateSignature;
use helper_functions::misc;
use prometheus_metrics::Metrics;

use crate::{
    candidates::CandidateRing, coverage::CoverageCache, entry::AttestationEntry, traits::ChainDag,
};

// Picking the best attestations is a greedy approximation of the maximum
// coverage problem, which is NP-hard. See:
// <https://en.wikipedia.org/wiki/Maximum_coverage_problem>

struct PackingCandidate<'ring, P: Preset> {
    score: usize,
    slot: Slot,
    committee_index: CommitteeIndex,
    entry: &'ring AttestationEntry<P>,
    validation_index: usize,
}

impl<P: Preset> PackingCandidate<'_, P> {
    fn aggregation_bits(&self) -> &BitList<P::MaxValidatorsPerCommittee> {
        &self.entry.aggregates()[self.validation_index].aggregation_bits
    }
}

pub fn pack_attestations_phase0<P: Preset, D: ChainDag<P>>(
    dag: &D,
    ring: &mut CandidateRing<P>,
    state: &D::State,
    metrics: Option<&Metrics>,
) -> Result<VariableList<Attestation<P>, P::MaxAttestations>> {
    let started_at = Instant::now();

    let Some(max_attestation_slot) = state
        .slot()
        .checked_sub(P::MIN_ATTESTATION_INCLUSION_DELAY.get())
    else {
        return Ok(VariableList::default());
    };

    let mut coverage = CoverageCache::build(state)?;

    update_ring_aggregates(ring, max_attestation_slot);

    let mut candidates = vec![];

    for slot in packable_slots::<P>(max_attestation_slot) {
        for entry in ring.entries(slot) {
            for (validation_index, validation) in entry.aggregates().iter().enumerate() {
                let attestation = entry.to_phase0_attestation(validation);

                if !is_attestation_compatible(dag, state, entry.data()) {
                    continue;
                }

                if dag.check_attestation(state, &attestation, true).is_err() {
                    continue;
                }

                let score = coverage.score(entry.data(), &validation.aggregation_bits);

                if score == 0 {
                    continue;
                }

                candidates.push(PackingCandidate {
                    score,
                    slot,
                    committee_index: entry.data().index,
                    entry,
                    validation_index,
                });
            }
        }
    }

    let max_attestations = P::MaxAttestations::USIZE;
    let candidate_count = candidates.len();
    let mut attestations = vec![];

    while !candidates.is_empty() && attestations.len() < max_attestations {
        let index = if candidates.len() < max_attestations {
            // Every remaining candidate fits, so the argmax scan is pointless.
            candidates.len() - 1
        } else {
            candidates
                .iter()
                .position_max_by_key(|candidate| (candidate.score, candidate.slot))
                .expect("candidates were checked to be nonempty")
        };

        let candidate = candidates.swap_remove(index);
        let validation = &candidate.entry.aggregates()[candidate.validation_index];

        coverage.add(candidate.entry.data(), &validation.aggregation_bits);
        attestations.push(candidate.entry.to_phase0_attestation(validation));

        rescore_same_vote(&mut candidates, &coverage, candidate.slot, candidate.committee_index);
    }

    let attestations = VariableList::new(attestations)
        .expect("the selection loop limits the number of attestations");

    if let Some(metrics) = metrics {
        metrics.set_attestation_packing_time(started_at.elapsed());
    }

    debug!(
        "packed {} of {candidate_count} candidate attestations for a block at slot {}",
        attestations.len(),
        state.slot(),
    );

    Ok(attestations)
}

pub fn pack_attestations_electra<P: Preset, D: ChainDag<P>>(
    config: &Config,
    dag: &D,
    ring: &mut CandidateRing<P>,
    state: &D::State,
    metrics: Option<&Metrics>,
) -> Result<VariableList<ElectraAttestation<P>, P::MaxAttestationsElectra>> {
    let started_at = Instant::now();

    let Some(max_attestation_slot) = state
        .slot()
        .checked_sub(P::MIN_ATTESTATION_INCLUSION_DELAY.get())
    else {
        return Ok(VariableList::default());
    };

    let mut coverage = CoverageCache::build(state)?;

    update_ring_aggregates(ring, max_attestation_slot);

    let mut candidates = vec![];

    for slot in packable_slots::<P>(max_attestation_slot) {
        // Attestations signed before the fork have a different signing root
        // and would make the block invalid.
        if misc::compute_epoch_at_slot::<P>(slot) < config.electra_fork_epoch {
            continue;
        }

        for entry in ring.entries(slot) {
            for (validation_index, validation) in entry.aggregates().iter().enumerate() {
                let attestation = match entry.to_electra_attestation(validation) {
                    Ok(attestation) => attestation,
                    Err(error) => {
                        warn!("unable to materialize pool aggregate: {error}");
                        continue;
                    }
                };

                if !is_attestation_compatible(dag, state, entry.data()) {
                    continue;
                }

                if dag
                    .check_attestation_electra(state, &attestation, true)
                    .is_err()
                {
                    continue;
                }

                let score = coverage.score(entry.data(), &validation.aggregation_bits);

                if score == 0 {
                    continue;
                }

                candidates.push(PackingCandidate {
                    score,
                    slot,
                    committee_index: entry.data().index,
                    entry,
                    validation_index,
                });
            }
        }
    }

    // Up to a committee count's worth of selections can consolidate into a
    // single on-chain attestation.
    let intermediate_limit = P::MaxAttestationsElectra::USIZE * P::MaxCommitteesPerSlot::USIZE;
    let candidate_count = candidates.len();

    candidates.sort_by_key(|candidate| (candidate.score, candidate.slot));

    let mut selected = vec![];

    while selected.len() < intermediate_limit {
        let Some(candidate) = candidates.pop() else {
            break;
        };

        let validation = &candidate.entry.aggregates()[candidate.validation_index];

        coverage.add(candidate.entry.data(), &validation.aggregation_bits);

        match candidate.entry.to_electra_attestation(validation) {
            Ok(attestation) => selected.push((candidate.committee_index, attestation)),
            Err(error) => {
                warn!("unable to materialize pool aggregate: {error}");
                continue;
            }
        }

        // Rescoring invalidates the sort order the pops rely on.
        if rescore_same_vote(&mut candidates, &coverage, candidate.slot, candidate.committee_index)
        {
            candidates.sort_by_key(|other| (other.score, other.slot));
        }
    }

    let attestations = consolidate_aggregates(selected);

    let attestations = VariableList::new(attestations)
        .expect("consolidation limits the number of attestations");

    if let Some(metrics) = metrics {
        metrics.set_attestation_packing_time(started_at.elapsed());
    }

    debug!(
        "packed {} of {candidate_count} candidate attestations for a block at slot {}",
        attestations.len(),
        state.slot(),
    );

    Ok(attestations)
}

/// Merges single-committee aggregates for the same vote into cross-committee
/// on-chain attestations, dropping groups the primitive rejects.
fn consolidate_aggregates<P: Preset>(
    selected: Vec<(CommitteeIndex, ElectraAttestation<P>)>,
) -> Vec<ElectraAttestation<P>> {
    let mut groups: Vec<(AttestationData, Vec<CommitteeIndex>, Vec<ElectraAttestation<P>>)> =
        vec![];

    for (committee_index, attestation) in selected {
        if let Some((_, committee_indices, attestations)) =
            groups.iter_mut().find(|(data, committee_indices, _)| {
                *data == attestation.data && !committee_indices.contains(&committee_index)
            })
        {
            committee_indices.push(committee_index);
            attestations.push(attestation);
        } else {
            groups.push((attestation.data, vec![committee_index], vec![attestation]));
        }
    }

    groups
        .into_iter()
        .filter_map(
            |(_, _, attestations)| match compute_on_chain_aggregate(attestations) {
                Ok(aggregate) => Some(aggregate),
                Err(error) => {
                    warn!("unable to compute on-chain aggregate: {error:?}");
                    None
                }
            },
        )
        .take(P::MaxAttestationsElectra::USIZE)
        .collect_vec()
}

/// Merges aggregates from disjoint committees voting for the same payload.
/// Aggregation bits are laid out per committee in ascending committee order.
pub fn compute_on_chain_aggregate<P: Preset>(
    attestations: Vec<ElectraAttestation<P>>,
) -> Result<ElectraAttestation<P>> {
    let aggregates = attestations
        .into_iter()
        .sorted_by_key(|attestation| {
            misc::get_committee_indices::<P>(&attestation.committee_bits).next()
        })
        .collect_vec();

    let data = aggregates
        .first()
        .map(|attestation| attestation.data)
        .ok_or_else(|| anyhow!("no attestations for block aggregate"))?;

    let total_bits = aggregates
        .iter()
        .map(|attestation| attestation.aggregation_bits.len())
        .sum::<usize>();

    let mut aggregation_bits = BitList::with_capacity(total_bits)
        .map_err(|error| anyhow!("aggregate does not fit in the per-slot bit list: {error:?}"))?;

    let mut committee_bits = BitVector::new();
    let mut signature = AggregateSignature::default();
    let mut offset = 0;

    for aggregate in &aggregates {
        for committee_index in misc::get_committee_indices::<P>(&aggregate.committee_bits) {
            let index = usize::try_from(committee_index)?;

            committee_bits
                .set(index, true)
                .map_err(|error| anyhow!("committee index is out of range: {error:?}"))?;
        }

        for (bit_index, bit) in aggregate.aggregation_bits.iter().enumerate() {
            if bit {
                aggregation_bits
                    .set(offset + bit_index, true)
                    .expect("offsets add up to the length of the merged bit list");
            }
        }

        offset += aggregate.aggregation_bits.len();

        signature.aggregate_in_place(aggregate.signature.try_into()?);
    }

    Ok(ElectraAttestation {
        aggregation_bits,
        data,
        signature: signature.into(),
        committee_bits,
    })
}

fn update_ring_aggregates<P: Preset>(ring: &mut CandidateRing<P>, max_attestation_slot: Slot) {
    for slot in packable_slots::<P>(max_attestation_slot) {
        for entry in ring.entries_mut(slot) {
            entry.update_aggregates();
        }
    }
}

fn packable_slots<P: Preset>(max_attestation_slot: Slot) -> impl Iterator<Item = Slot> {
    (0..misc::attestation_lookback::<P>())
        .map_while(move |offset| max_attestation_slot.checked_sub(offset))
}

/// Returns `true` iff any candidate was rescored or dropped.
fn rescore_same_vote<P: Preset>(
    candidates: &mut Vec<PackingCandidate<'_, P>>,
    coverage: &CoverageCache<P>,
    slot: Slot,
    committee_index: CommitteeIndex,
) -> bool {
    let mut rescored = false;

    candidates.retain_mut(|other| {
        if other.slot == slot && other.committee_index == committee_index {
            other.score = coverage.score(other.entry.data(), other.aggregation_bits());
            rescored = true;
            other.score > 0
        } else {
            true
        }
    });

    rescored
}

/// True iff the shuffling the attesters were drawn from matches the proposing
/// state's view of the same epoch. The block referenced by the attestation's
/// target determines the shuffling; its ancestor at the dependent slot must be
/// the block the state derives its own shuffling from.
fn is_attestation_compatible<P: Preset, D: ChainDag<P>>(
    dag: &D,
    state: &D::State,
    data: AttestationData,
) -> bool {
    let dependent_slot = misc::attester_dependent_slot::<P>(data.target.epoch);

    let Some(target_block) = dag.get_block_ref(data.target.root) else {
        return false;
    };

    let Some(dependent_block) = dag.at_slot(target_block, dependent_slot) else {
        return false;
    };

    let Ok(dependent_root) = state.dependent_root(data.target.epoch) else {
        return false;
    };

    dependent_block.root == dependent_root
}
