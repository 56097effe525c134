//! in-toto attestation data model for the Provenant policy verifier.
//!
//! `provenant-attest` reads DSSE envelopes, decodes the in-toto v1
//! statements they carry, and parses the public keys that functionaries
//! sign with. It performs no policy decisions of its own; those live in
//! `provenant-verify`.

pub mod envelope;
pub mod error;
pub mod keys;
pub mod link;
pub mod statement;

pub use envelope::{Envelope, EnvelopeSignature};
pub use error::AttestationError;
pub use keys::{KeyVerifier, Scheme};
pub use statement::{ResourceDescriptor, Statement};
