use core::num::NonZeroU64;
use std::borrow::Cow;

use nonzero_ext::nonzero;
use serde::{Deserialize, Serialize};

use crate::phase0::primitives::Epoch;

/// Runtime configuration variables.
///
/// Only the variables consumed by the attestation pool are carried here.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    pub config_name: Cow<'static, str>,
    pub electra_fork_epoch: Epoch,
    pub seconds_per_slot: NonZeroU64,
}

impl Default for Config {
    fn default() -> Self {
        Self::mainnet()
    }
}

impl Config {
    #[must_use]
    pub const fn mainnet() -> Self {
        Self {
            config_name: Cow::Borrowed("mainnet"),
            electra_fork_epoch: 364_032,
            seconds_per_slot: nonzero!(12_u64),
        }
    }

    #[must_use]
    pub const fn minimal() -> Self {
        Self {
            config_name: Cow::Borrowed("minimal"),
            electra_fork_epoch: 0,
            seconds_per_slot: nonzero!(6_u64),
        }
    }
}
