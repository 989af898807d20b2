// ============================================================================
// trellis-reactive - Primitives
// Effects, computed values, and effect scopes
// ============================================================================

pub mod computed;
pub mod effect;
pub mod scope;
