//! # flingr-types
//!
//! Data model for the Flingr connectivity subsystem.
//!
//! This crate provides the foundational types used across all Flingr crates:
//! - [`Endpoint`] - The local/external address pair being exposed
//! - [`Protocol`], [`PortMapping`], [`MappingResult`] - NAT gateway mappings
//! - [`RegistrationId`], [`RegistrationRecord`], [`LookupRecord`] - Rendezvous records
//! - [`FlingrError`] - Error taxonomy surfaced to collaborators

#![warn(missing_docs)]
#![warn(clippy::all)]

mod endpoint;
mod error;
mod mapping;
mod record;

pub use endpoint::{random_external_port, Endpoint};
pub use error::FlingrError;
pub use mapping::{MappingOutcome, MappingResult, MappingState, PortMapping, Protocol};
pub use record::{LookupRecord, RegistrationId, RegistrationRecord};
