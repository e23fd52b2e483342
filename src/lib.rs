//! Courier: Reactive Request Orchestration
//!
//! Issues requests described by a [`Method`], caches their responses, deduplicates and
//! debounces repeated invocations and keeps externally owned state containers in sync
//! through a pluggable [`StateAdapter`].

pub mod cache;
pub mod config;
pub mod context;
pub mod courier;
pub mod debounce;
pub mod error;
pub mod events;
pub mod key;
pub mod logging;
pub mod method;
pub mod orchestrator;
pub mod state;
pub mod transport;

pub use cache::{ResponseCache, SledCacheStorage};
pub use config::{ConfigLoader, CourierConfig};
pub use courier::Courier;
pub use debounce::DebounceDelay;
pub use error::{CourierError, RequestError, StorageError};
pub use events::{CompleteEvent, CompleteStatus, ErrorEvent, SuccessEvent};
pub use key::KeyGenerator;
pub use method::{CacheMode, CachePolicy, Method, MethodSource, RequestKind};
pub use orchestrator::{ForceRequest, HookConfig, RequestExposure, RequestOrchestrator};
pub use state::{MemoryState, MemoryStateAdapter, StateAdapter, StatePatch, StateValue};
pub use transport::{RawResponse, ReqwestTransport, Transport};
