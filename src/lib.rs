//! Bill feed client core: feed refresh synchronization, optimistic likes,
//! header snap-scroll control and the collaborators they run against.

pub mod config;
pub mod model;
pub mod network;
pub mod session;
pub mod snap;
pub mod storage;
pub mod sync;
