pub mod adapter;
pub mod channel;
pub mod communicator;
pub mod config;
pub mod termination;

pub use communicator::GpibCommunicator;
