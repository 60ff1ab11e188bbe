#[macro_use]
pub mod macros;
pub mod entity_collection;
pub mod file_format;
pub mod float_ext;
pub mod log_setup;
pub mod serde;
pub mod shared;

pub use entity_collection::{EntityCollection, EntityKey};
pub use file_format::FileFormat;
pub use shared::Shared;

pub const EPSILON: f64 = 1e-6;

pub fn is_debug() -> bool {
    cfg!(debug_assertions)
}
