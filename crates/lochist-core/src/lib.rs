//! Location provider abstraction and subscription lifecycle for lochist.
//!
//! - [`LocationProvider`]: async trait for anything that produces fixes
//! - [`MockProvider`]: a provider for tests and demos
//! - [`FlagStore`]: persisted booleans ([`FileFlagStore`], [`MemoryFlagStore`])
//! - [`SubscriptionController`]: start/stop with the intent persisted across restarts
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use lochist_core::{MemoryFlagStore, MockProvider, SubscriptionController, update_channel};
//! use lochist_types::LocationRequest;
//!
//! #[tokio::main]
//! async fn main() -> lochist_core::Result<()> {
//!     let (sink, _updates) = update_channel(16);
//!     let mut controller = SubscriptionController::new(
//!         Arc::new(MockProvider::default()),
//!         Arc::new(MemoryFlagStore::new()),
//!         sink,
//!     );
//!
//!     let request = LocationRequest::default();
//!     if controller.check_availability(&request).await.is_available() {
//!         controller.start(&request).await?;
//!     }
//!     assert!(controller.state()?.is_active);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod flags;
pub mod mock;
pub mod provider;
pub mod subscription;

pub use error::{Error, Result};
pub use flags::{FileFlagStore, FlagStore, FlagStoreError, MemoryFlagStore};
pub use mock::MockProvider;
pub use provider::{
    LocationProvider, SubscriptionHandle, UpdateReceiver, UpdateSink, update_channel,
};
pub use subscription::{REQUESTING_FLAG, SubscriptionController};
