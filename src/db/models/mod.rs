//! Domain records stored in SQLite.

pub mod event;
pub mod routine;
pub mod task;
pub mod user;

pub use self::event::*;
pub use self::routine::*;
pub use self::task::*;
pub use self::user::*;
