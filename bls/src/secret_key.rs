use core::fmt::{Debug, Formatter, Result as FmtResult};

use blst::min_pk::SecretKey as RawSecretKey;

use crate::{consts::DOMAIN_SEPARATION_TAG, error::Error, public_key::PublicKey, signature::Signature};

pub struct SecretKey(RawSecretKey);

// Redact the key material in case the formatted value ends up in logs.
impl Debug for SecretKey {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        formatter.write_str("SecretKey(<redacted>)")
    }
}

impl SecretKey {
    /// Derives a secret key from at least 32 bytes of keying material.
    pub fn key_gen(ikm: &[u8]) -> Result<Self, Error> {
        RawSecretKey::key_gen(ikm, &[])
            .map(Self)
            .map_err(|_| Error::InvalidSecretKey)
    }

    #[must_use]
    pub fn to_public_key(&self) -> PublicKey {
        self.0.sk_to_pk().into()
    }

    #[must_use]
    pub fn sign(&self, message: impl AsRef<[u8]>) -> Signature {
        self.0
            .sign(message.as_ref(), DOMAIN_SEPARATION_TAG, &[])
            .into()
    }
}
