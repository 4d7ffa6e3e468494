use core::num::NonZeroU64;

use nonzero_ext::nonzero;
use typenum::U16;

use crate::phase0::primitives::{Epoch, Slot};

pub const GENESIS_EPOCH: Epoch = 0;
pub const GENESIS_SLOT: Slot = 0;
pub const INTERVALS_PER_SLOT: NonZeroU64 = nonzero!(3_u64);

pub type TargetAggregatorsPerCommittee = U16;
