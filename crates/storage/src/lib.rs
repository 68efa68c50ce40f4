pub mod memory;

pub use memory::{MemoryClient, MemoryItem};
