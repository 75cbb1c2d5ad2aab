//! Application layer: the conversation store and the conversation
//! controller.
//!
//! The store owns every in-memory conversation for the client session and
//! writes through to an injected snapshot port; the controller drives the
//! active-conversation state machine over the store, the dispatcher, the
//! model catalog, and the history repository.

mod controller;
mod store;

pub use controller::{
    ControllerState, ConversationController, DISPATCH_FAILURE_NOTICE, SendError,
};
pub use store::ConversationStore;
