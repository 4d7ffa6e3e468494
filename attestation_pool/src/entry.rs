use std::collections::{btree_map::Entry as BTreeMapEntry, BTreeMap};

use bls::{AggregateSignature, Signature};
use ssz_types::BitList;
use typenum::Unsigned;
use types::{
    electra::containers::Attestation as ElectraAttestation,
    phase0::containers::{Attestation, AttestationData},
    preset::Preset,
};

use crate::conversion;

/// An attestation aggregate and the committee members it covers.
#[derive(Clone, Debug)]
pub struct Validation<P: Preset> {
    pub aggregation_bits: BitList<P::MaxValidatorsPerCommittee>,
    pub aggregate_signature: AggregateSignature,
}

/// All votes known for a single distinct vote payload.
///
/// `data.index` always carries the committee index, including for post-Electra
/// votes whose on-wire `index` is zeroed.
///
/// Single-voter attestations observed on subnets are kept separately in
/// `singles` so that aggregates arriving later can still be topped up with
/// them. `singles` is never cleared; its size is bounded by the committee.
///
/// No aggregate's bits are ever a subset of another's. Aggregating a signature
/// with itself is not idempotent, so overlapping aggregates can never be
/// merged, only kept side by side until one makes the other redundant.
#[derive(Debug)]
pub struct AttestationEntry<P: Preset> {
    data: AttestationData,
    committee_len: usize,
    singles: BTreeMap<usize, Signature>,
    aggregates: Vec<Validation<P>>,
}

impl<P: Preset> AttestationEntry<P> {
    #[must_use]
    pub fn new(data: AttestationData, committee_len: usize) -> Self {
        assert!(
            committee_len <= P::MaxValidatorsPerCommittee::USIZE,
            "committee length is bounded by the preset",
        );

        Self {
            data,
            committee_len,
            singles: BTreeMap::new(),
            aggregates: vec![],
        }
    }

    #[must_use]
    pub const fn data(&self) -> AttestationData {
        self.data
    }

    #[must_use]
    pub const fn committee_len(&self) -> usize {
        self.committee_len
    }

    #[must_use]
    pub fn aggregates(&self) -> &[Validation<P>] {
        &self.aggregates
    }

    pub fn singles(&self) -> impl Iterator<Item = (usize, Signature)> + '_ {
        self.singles
            .iter()
            .map(|(index, signature)| (*index, *signature))
    }

    /// Records a vote. Returns `true` iff the vote added new information.
    pub fn insert(
        &mut self,
        aggregation_bits: &BitList<P::MaxValidatorsPerCommittee>,
        signature: Signature,
    ) -> bool {
        debug_assert_eq!(aggregation_bits.len(), self.committee_len);

        if aggregation_bits.is_zero() {
            return false;
        }

        if let Some(index) = single_bit_index(aggregation_bits) {
            return match self.singles.entry(index) {
                BTreeMapEntry::Occupied(_) => false,
                BTreeMapEntry::Vacant(vacant) => {
                    vacant.insert(signature);
                    true
                }
            };
        }

        if self.covers(aggregation_bits) {
            return false;
        }

        self.aggregates
            .retain(|validation| !is_subset(&validation.aggregation_bits, aggregation_bits));

        self.aggregates.push(Validation {
            aggregation_bits: aggregation_bits.clone(),
            aggregate_signature: signature,
        });

        true
    }

    /// True iff some aggregate already covers every voter in `aggregation_bits`.
    #[must_use]
    pub fn covers(&self, aggregation_bits: &BitList<P::MaxValidatorsPerCommittee>) -> bool {
        self.aggregates
            .iter()
            .any(|validation| is_subset(aggregation_bits, &validation.aggregation_bits))
    }

    /// Folds `singles` into the aggregates.
    ///
    /// Every aggregate absorbs the single votes it is missing. When there are
    /// no aggregates yet, one is formed out of all the singles.
    pub fn update_aggregates(&mut self) {
        if self.singles.is_empty() {
            return;
        }

        if self.aggregates.is_empty() {
            let mut aggregation_bits = BitList::with_capacity(self.committee_len)
                .expect("committee length is validated on entry creation");
            let mut aggregate_signature: Option<AggregateSignature> = None;

            for (&index, single) in &self.singles {
                aggregation_bits
                    .set(index, true)
                    .expect("singles are indexed within the committee");

                aggregate_signature = match aggregate_signature {
                    Some(signature) => Some(signature.aggregate(*single)),
                    None => Some(*single),
                };
            }

            let aggregate_signature =
                aggregate_signature.expect("singles were checked to be nonempty");

            self.aggregates.push(Validation {
                aggregation_bits,
                aggregate_signature,
            });

            return;
        }

        let mut updated = false;

        for validation in &mut self.aggregates {
            for (&index, single) in &self.singles {
                if !validation.aggregation_bits.get(index).unwrap_or(false) {
                    validation
                        .aggregation_bits
                        .set(index, true)
                        .expect("singles are indexed within the committee");
                    validation.aggregate_signature.aggregate_in_place(*single);
                    updated = true;
                }
            }
        }

        // Topping up can turn one aggregate into a subset of another.
        if updated {
            self.prune_redundant_aggregates();
        }
    }

    pub fn to_phase0_attestation(&self, validation: &Validation<P>) -> Attestation<P> {
        Attestation {
            aggregation_bits: validation.aggregation_bits.clone(),
            data: self.data,
            signature: validation.aggregate_signature.into(),
        }
    }

    pub fn to_electra_attestation(
        &self,
        validation: &Validation<P>,
    ) -> Result<ElectraAttestation<P>, conversion::Error> {
        let mut data = self.data;
        data.index = 0;

        Ok(ElectraAttestation {
            aggregation_bits: conversion::widen_aggregation_bits::<P>(&validation.aggregation_bits),
            data,
            signature: validation.aggregate_signature.into(),
            committee_bits: conversion::singleton_committee_bits::<P>(self.data.index)?,
        })
    }

    pub fn to_single_phase0_attestation(&self, index: usize, signature: Signature) -> Attestation<P> {
        Attestation {
            aggregation_bits: self.single_bit(index),
            data: self.data,
            signature: signature.into(),
        }
    }

    pub fn to_single_electra_attestation(
        &self,
        index: usize,
        signature: Signature,
    ) -> Result<ElectraAttestation<P>, conversion::Error> {
        let mut data = self.data;
        data.index = 0;

        Ok(ElectraAttestation {
            aggregation_bits: conversion::widen_aggregation_bits::<P>(&self.single_bit(index)),
            data,
            signature: signature.into(),
            committee_bits: conversion::singleton_committee_bits::<P>(self.data.index)?,
        })
    }

    fn single_bit(&self, index: usize) -> BitList<P::MaxValidatorsPerCommittee> {
        let mut aggregation_bits = BitList::with_capacity(self.committee_len)
            .expect("committee length is validated on entry creation");

        aggregation_bits
            .set(index, true)
            .expect("singles are indexed within the committee");

        aggregation_bits
    }

    fn prune_redundant_aggregates(&mut self) {
        let mut index = 0;

        while index < self.aggregates.len() {
            let aggregation_bits = self.aggregates[index].aggregation_bits.clone();

            let redundant = self
                .aggregates
                .iter()
                .enumerate()
                .any(|(other_index, other)| {
                    other_index != index && is_subset(&aggregation_bits, &other.aggregation_bits)
                });

            if redundant {
                self.aggregates.swap_remove(index);
            } else {
                index += 1;
            }
        }
    }
}

fn single_bit_index<N: Unsigned + Clone>(aggregation_bits: &BitList<N>) -> Option<usize> {
    (aggregation_bits.num_set_bits() == 1).then(|| {
        aggregation_bits
            .highest_set_bit()
            .expect("a bit list with one set bit has a highest set bit")
    })
}

fn is_subset<N: Unsigned + Clone>(lhs: &BitList<N>, rhs: &BitList<N>) -> bool {
    lhs.difference(rhs).is_zero()
}
