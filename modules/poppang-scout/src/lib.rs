pub mod enricher;
pub mod extractor;
pub mod fetcher;
pub mod moderator;
pub mod notifier;
pub mod persister;
pub mod retry;
pub mod run_log;
pub mod scout;
pub mod state;
pub mod stats;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
