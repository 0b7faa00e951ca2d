mod fs;
mod memory;

pub use fs::FsContentStore;
pub use memory::{MemoryContentStore, StaticUsageCountProvider};
