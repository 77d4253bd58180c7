//! Third-party crates reached through the kernel registration macros.

/// The map behind the kernel registry, from [hashbrown](https://docs.rs/hashbrown/latest/hashbrown/).
pub type HashMap<K, V> = hashbrown::HashMap<K, V>;

pub use inventory;
