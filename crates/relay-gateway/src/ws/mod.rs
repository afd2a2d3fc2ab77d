//! The real-time fan-out surface: `GET /ws/{u}` upgrades to a full-duplex
//! channel of ciphertext envelopes, routed through the [`crate::hub::Hub`].

pub mod handler;

pub use handler::run_session;
