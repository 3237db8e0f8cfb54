//! # flingr-core
//!
//! Pure logic for Flingr (no I/O, instant tests).
//!
//! This crate implements the request signer, the external tools' output
//! contracts and the connection state machine without any network, process
//! or disk I/O.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. The one exception is [`RequestSigner::sign`], which
//! reads the clock once; [`RequestSigner::sign_at`] is the deterministic form.
//!
//! The actual I/O (HTTP, child processes, config files) is performed by
//! `flingr-client`, which interprets the actions produced by the state
//! machine.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod rendezvous;
pub mod service;
pub mod sigv4;
pub mod sshd_config;
pub mod state;
pub mod upnpc;

pub use rendezvous::PayloadError;
pub use service::{CommandTemplate, Placeholders, ServiceCommands};
pub use sigv4::{
    CredentialProvider, Credentials, EnvCredentials, RequestSigner, SignError, SignedRequest,
    SigningConfig, StaticCredentials,
};
pub use sshd_config::{ConfigValues, Directive, RenderedConfig, DEFAULT_TEMPLATE};
pub use state::{Action, ConnectionState, Event, Notice, Registration};
