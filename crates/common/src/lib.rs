// docgate-common: document identity, fingerprints and list filters shared by
// the gateway and its tests.

pub mod document;
pub mod filter;
pub mod fingerprint;
pub mod id;
