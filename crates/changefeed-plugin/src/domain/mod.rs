//! Domain definitions owned by the plugin.

pub mod collection;
