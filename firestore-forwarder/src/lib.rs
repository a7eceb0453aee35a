//! # Firestore Request Forwarder
//!
//! Forwards webhook requests captured in a Firestore collection to a fixed HTTP
//! endpoint, either live as they arrive or by replaying a single stored request.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐  runQuery   ┌─────────────────┐   HTTP    ┌─────────────────┐
//! │    Firestore    │◄────────────│    Forwarder    │──────────►│ Target endpoint │
//! │  (requests/*)   │────────────►│  (This crate)   │           │     (--url)     │
//! └─────────────────┘  documents  └─────────────────┘           └─────────────────┘
//!         ▲                               │
//!         │ OAuth2 bearer token           │ JWT bearer grant
//!         └───────────── token_uri ◄──────┘
//! ```
//!
//! ## Modes
//!
//! - `--requestId` replays one stored request and exits.
//! - Without it, the forwarder follows a standing query for requests added
//!   since start-up for one webhook, forwarding each change as it is seen.
//!
//! Every forward goes to the configured URL; the document only supplies the
//! method, headers, query parameters and body.

pub mod config;
pub mod credentials;
pub mod error;
pub mod firestore;
pub mod forward;
pub mod listener;
pub mod model;
pub mod service;
pub mod value;

pub use config::{ForwarderArgs, ForwarderConfig};
pub use error::{ForwardError, ForwarderError, Result};
pub use service::ForwarderService;
