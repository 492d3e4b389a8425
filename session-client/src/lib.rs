pub mod backend;
pub mod client;
pub mod clock;
pub mod config;
pub mod detector;
pub mod headers;
pub mod notifications;
pub mod rest;
pub mod session;
pub mod storage;
pub mod sweeper;
pub mod token_store;
pub mod verifier;

pub use client::{Backend, ClientParts, SessionClient, SessionStatus};
pub use headers::{AuthHeaders, HeaderProducer};
pub use session::{ClassSession, SessionState};
pub use sweeper::{ExpirySweeper, SweepReport, SweeperHandle};
pub use token_store::{ActiveClasses, TokenStore};
