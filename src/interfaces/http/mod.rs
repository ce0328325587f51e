//! Loopback HTTP endpoint for the OAuth consent redirect.

pub mod consent_callback;
