// ============================================================================
// trellis-reactive - Reactivity
// Dependency sets, the dependency store, and the track/trigger protocol
// ============================================================================

pub mod dep;
pub mod tracking;
