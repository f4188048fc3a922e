// THEORY:
// The `refinement` layer sits on top of the pixel pipeline and is the only part of
// the crate that suspends. Each submodule owns one concern of talking to the
// analysis collaborator:
//
// - `analyzer`: the collaborator seam and its HTTP implementation.
// - `transport`: downscaling and encoding images for the wire.
// - `prompts`: the fixed instructions for every step.
// - `response`: turning collaborator text into typed results.
// - `resilience`: retrying transient failures with exponential backoff.
// - `annotate`: the numbered preview used by the annotated mapping strategy.
// - `orchestrator`: the state machine tying it all together.

pub mod analyzer;
pub mod annotate;
pub mod orchestrator;
pub mod prompts;
pub mod resilience;
pub mod response;
pub mod transport;
