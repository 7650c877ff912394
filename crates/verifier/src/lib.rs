//! Relay circuit verification.
//!
//! A [`Scenario`] names a relay and two leaves. [`CircuitVerifier::verify`]
//! connects both leaves to the relay, has leaf A reach leaf B by identifier
//! alone, stores a [`TransferPayload`] at leaf B, fetches it from leaf A and
//! compares the bytes. The returned [`ScenarioReport`] records the last step
//! reached, the route of the leaf-to-leaf connection and, on failure, the
//! failing step with its cause.

mod payload;
mod scenario;
mod verifier;

pub use payload::TransferPayload;
pub use scenario::{Role, Scenario, ScenarioError, ScenarioFailure, ScenarioReport, ScenarioStep};
pub use verifier::{CircuitVerifier, VerifierConfig};
