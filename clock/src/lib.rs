//! Wall-clock time expressed in beacon chain slots.
//!
//! Times before genesis saturate to the genesis slot. The pool never needs to
//! distinguish pre-genesis instants from the start of slot 0.

use helper_functions::misc;
use types::{
    config::Config,
    phase0::{
        consts::{GENESIS_SLOT, INTERVALS_PER_SLOT},
        primitives::{Epoch, Slot, UnixSeconds},
    },
    preset::Preset,
};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Tick {
    pub slot: Slot,
    pub kind: TickKind,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum TickKind {
    Propose,
    Attest,
    Aggregate,
}

impl Tick {
    #[must_use]
    pub const fn start_of_slot(slot: Slot) -> Self {
        Self {
            slot,
            kind: TickKind::Propose,
        }
    }

    #[must_use]
    pub fn at_time(config: &Config, time: UnixSeconds, genesis_time: UnixSeconds) -> Self {
        let seconds_per_slot = config.seconds_per_slot.get();
        let seconds_since_genesis = time.saturating_sub(genesis_time);

        let slot = GENESIS_SLOT + seconds_since_genesis / seconds_per_slot;
        let intervals_since_slot =
            seconds_since_genesis % seconds_per_slot * INTERVALS_PER_SLOT.get() / seconds_per_slot;

        let kind = match intervals_since_slot {
            0 => TickKind::Propose,
            1 => TickKind::Attest,
            _ => TickKind::Aggregate,
        };

        Self { slot, kind }
    }

    #[must_use]
    pub fn epoch<P: Preset>(self) -> Epoch {
        misc::compute_epoch_at_slot::<P>(self.slot)
    }

    #[must_use]
    pub const fn is_start_of_slot(self) -> bool {
        matches!(self.kind, TickKind::Propose)
    }
}
