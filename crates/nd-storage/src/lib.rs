//! Newsdesk storage layer: the mention sorted set, the seen-id set and the flag set.

pub mod memory;
pub mod store;
pub mod upstash;

pub use memory::MemoryStore;
pub use store::{FlagStore, MentionStore, RawMember, Store};
pub use upstash::UpstashStore;
