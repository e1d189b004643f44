// mod.rs - Storage module exports

mod archetype;
mod bitmask;
mod buffer;

pub use archetype::{Archetype, ComponentRow};
pub use bitmask::{Bitmask, Ones};
pub(crate) use buffer::ErasedBuffer;
