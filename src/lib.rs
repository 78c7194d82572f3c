#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::unused_async)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::redundant_closure_for_method_calls)]

//! smsgate library: the building blocks of the SMS gateway.
//!
//! - `routes`: REST handlers and the router
//! - `auth`: Basic auth middleware
//! - `config`: configuration loading
//! - `outbox`: validation, permissions and fan-out of send requests
//! - `encoder`: alphabet selection and segment counting
//! - `spool`: atomic writes into smsd's outgoing directory
//! - `modem`, `lock`, `status`: AT queries over the serial port
//! - `health`, `reset`: modem health check and rate-limited reset
//! - `smsd`: smsd liveness from its pid file

pub mod auth;
pub mod config;
pub mod encoder;
pub mod error;
pub mod health;
pub mod lock;
pub mod modem;
pub mod outbox;
pub mod permissions;
pub mod reset;
pub mod routes;
pub mod smsd;
pub mod spool;
pub mod state;
pub mod status;

pub use config::Config;
pub use state::AppState;
