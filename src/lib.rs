pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod job;
pub mod logging;
pub mod probe;
pub mod queue;
pub mod transfer;
pub mod util;
pub mod workers;

pub use client::TransferClient;
pub use config::{RemoteCredentials, TransferConfig};
pub use error::{RemoteFault, TransferError, error_chain_text};
pub use events::{EventHub, TransferEvent, TransferObserver};
pub use probe::ProbeReport;
