//! WebDriver-backed implementation of the sweep DOM capability.
//!
//! - [`browser::driver::SweepDriver`]: session setup, navigation and teardown
//! - [`browser::dom::WebDom`]: [`sweep_core::Dom`] over a live page
pub mod browser;

pub use browser::dom::{WebDom, WebNode};
pub use browser::driver::SweepDriver;
