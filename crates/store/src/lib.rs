//! In-process backing store for customers, orders, segments, receipts and
//! communication logs.

pub mod memory;
pub mod seed;

pub use memory::MemoryStore;
pub use seed::seed_demo_data;
