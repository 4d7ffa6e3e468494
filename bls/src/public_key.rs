use blst::min_pk::PublicKey as RawPublicKey;
use derive_more::From;

use crate::error::Error;

#[derive(Clone, Copy, PartialEq, Eq, Debug, From)]
pub struct PublicKey(RawPublicKey);

impl PublicKey {
    pub fn uncompress(bytes: &[u8]) -> Result<Self, Error> {
        RawPublicKey::uncompress(bytes)
            .map(Self)
            .map_err(|_| Error::InvalidPublicKey)
    }

    #[must_use]
    pub fn compress(&self) -> [u8; 48] {
        self.0.compress()
    }

    #[must_use]
    pub(crate) const fn as_raw(&self) -> &RawPublicKey {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use crate::secret_key::SecretKey;

    use super::*;

    #[test]
    fn public_keys_survive_a_compression_round_trip() {
        let public_key = SecretKey::key_gen(&[9; 32])
            .expect("32 bytes of keying material are sufficient")
            .to_public_key();

        assert_eq!(PublicKey::uncompress(&public_key.compress()), Ok(public_key));
    }

    #[test]
    fn uncompressing_garbage_fails() {
        assert_eq!(PublicKey::uncompress(&[0xab; 48]), Err(Error::InvalidPublicKey));
    }
}
