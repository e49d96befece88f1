//! Async helpers that don't belong to any single crate.
//!
//! Currently only [`Paced`], a stream adaptor that yields control back to the
//! executor every N items so a fast producer can't run arbitrarily far ahead
//! of whatever is consuming it.

mod paced;

pub use crate::paced::{Paced, PacedExt};
