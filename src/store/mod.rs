// ============================================================================
// Reference Store
// ============================================================================
//
// An in-memory `SessionSource` with staged multi-document writes, write
// conflict detection and fault injection. Used for embedding and tests.
//
// ============================================================================

pub mod memory;

pub use memory::{MemorySession, MemoryStore, StoreOp, StoreStats};
