//! Denormalized relationship indices.
//!
//! - [`SubscriptionIndex`]: which delivery points each subscriber uses, with
//!   reference-counted deletion of delivery points nobody uses anymore
//! - [`AssignmentIndex`]: which providers belong to a service and which
//!   provider serves each delivery point

mod assignment;
mod subscription;

pub use assignment::AssignmentIndex;
pub use subscription::SubscriptionIndex;
