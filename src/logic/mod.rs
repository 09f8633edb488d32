pub mod diff;
pub mod overlay;
pub mod staging;
pub mod validate;

pub use diff::diff;
pub use overlay::{apply, apply_page};
pub use staging::*;
pub use validate::*;
