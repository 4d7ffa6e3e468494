pub mod consts;
pub mod error;

mod public_key;
mod secret_key;
mod signature;
mod signature_bytes;

pub use crate::{
    error::Error, public_key::PublicKey, secret_key::SecretKey, signature::Signature,
    signature_bytes::SignatureBytes,
};

pub type AggregateSignature = Signature;
pub type AggregateSignatureBytes = SignatureBytes;
