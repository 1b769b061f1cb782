//! Common test utilities for warc-pipeline E2E tests

#[allow(dead_code)]
pub mod coordinator;
#[allow(dead_code)]
pub mod events;
#[allow(dead_code)]
pub mod fixtures;

#[allow(unused_imports)]
pub use coordinator::*;
#[allow(unused_imports)]
pub use events::*;
#[allow(unused_imports)]
pub use fixtures::*;
