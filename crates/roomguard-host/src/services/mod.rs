//! Background services started next to the module chain.

pub mod provisioner;

pub use provisioner::{ProvisionJob, ProvisionOutcome, ProvisionQueue, Provisioner};
