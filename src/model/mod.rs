pub mod attribute;
pub mod common;
pub mod entity;
pub mod page;
pub mod plan;
pub mod schema;
pub mod staged_change;
pub mod zone;

pub use attribute::*;
pub use common::*;
pub use entity::*;
pub use page::*;
pub use plan::*;
pub use schema::*;
pub use staged_change::*;
pub use zone::*;
