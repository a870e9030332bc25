//! Behavior units and the standard real-time REST pipeline.
//!
//! A [`Behavior`] wraps the connection built so far in a new layer. The
//! composer applies behaviors strictly left to right and uses the declared
//! capabilities to reject orderings in which a layer would call into
//! something that is never installed.

use std::sync::Arc;

use crate::{
    config::ModelConfig,
    connection::{Capability, Connection, Operation},
};

mod callbacks_once;
mod construction;
mod data_callbacks;
mod data_url;
mod identity_store;
mod map_binding;
mod parse;
mod real_time;

pub use callbacks_once::CallbacksOnce;
pub use construction::Construction;
pub use data_callbacks::DataCallbacks;
pub use data_url::DataUrl;
pub use identity_store::IdentityStore;
pub use map_binding::MapBinding;
pub use parse::Parse;
pub use real_time::RealTime;

/// A composable layer adding one capability to a connection.
pub trait Behavior: Send + Sync {
    /// Stable behavior name, used in logs and errors.
    fn name(&self) -> &'static str;

    /// Capabilities this behavior installs.
    fn provides(&self) -> &'static [Capability];

    /// Capabilities that must be installed by an earlier behavior.
    fn requires(&self) -> &'static [Capability] { &[] }

    /// Capabilities the finished composition must contain.
    ///
    /// These are reached through the late-bound `this` connection, so they
    /// may be installed after this behavior.
    fn expects(&self) -> &'static [Capability] { &[] }

    /// Operations this behavior implements or overrides.
    fn operations(&self) -> &'static [Operation];

    /// Wrap `base` in this behavior's layer.
    fn apply(&self, base: Box<dyn Connection>, config: &Arc<ModelConfig>) -> Box<dyn Connection>;
}

/// The fixed behavior order of a real-time REST model.
///
/// construction, map-binding, identity-store, data-callbacks, parse, url,
/// real-time, callbacks-once.
#[must_use]
pub fn realtime_rest_behaviors() -> Vec<Box<dyn Behavior>> {
    vec![
        Box::new(Construction),
        Box::new(MapBinding),
        Box::new(IdentityStore),
        Box::new(DataCallbacks),
        Box::new(Parse),
        Box::new(DataUrl),
        Box::new(RealTime),
        Box::new(CallbacksOnce),
    ]
}
