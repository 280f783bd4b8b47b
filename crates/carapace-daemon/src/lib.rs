// SPDX-License-Identifier: MIT OR Apache-2.0
//! Wiring for the host-side broker daemon: builds the catalog,
//! collaborators, and [`carapace_router::RequestRouter`] from a
//! [`carapace_config::RouterConfig`].

pub mod intrinsics;
pub mod wiring;

pub use wiring::{build_router, BuiltRouter};
