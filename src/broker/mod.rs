//! The `broker` module is the core of the pub/sub system.
//!
//! `TopicRegistry` owns the topic → subscriber mapping and performs fan-out;
//! `Broker` is the process-wide façade over it, serving calls locally or
//! delegating them to a remote cluster in proxy mode.

pub mod engine;
pub mod topic;

pub use engine::{Broker, SubscriptionStream};
pub use topic::{SubscriberId, Subscription, TopicRegistry};

#[cfg(test)]
mod tests;
