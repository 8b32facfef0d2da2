// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The error results used by this library.

use std::net::IpAddr;

use lpm::prefix::{Prefix, PrefixError};
use thiserror::Error;

use crate::client::VrfId;

/// Error returned by the user-supplied apply callback when a forwarding
/// snapshot could not be handed to the hardware programmer.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("{0}")]
pub struct ApplyError(pub String);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RibError {
    #[error("VRF {0} is not configured")]
    NoSuchVrf(VrfId),

    #[error("Invalid prefix: {0}")]
    InvalidPrefix(String),

    #[error("Next-hop {0} is link-local but carries no interface scope")]
    LinkLocalNoScope(IpAddr),

    #[error("Invalid next-hop set: {0}")]
    InvalidNextHops(String),

    #[error("MPLS label {0} exceeds the 20-bit label space")]
    InvalidLabel(u32),

    #[error("Route for {0} has not been resolved")]
    NotResolved(Prefix),

    #[error("Failed to apply forwarding state: {0}")]
    Apply(String),
}

impl From<PrefixError> for RibError {
    fn from(e: PrefixError) -> Self {
        RibError::InvalidPrefix(e.to_string())
    }
}

impl From<ApplyError> for RibError {
    fn from(e: ApplyError) -> Self {
        RibError::Apply(e.0)
    }
}
