pub mod item;
pub mod profile;
pub mod user;

pub use item::{Item, NewItem, Priority, RowRange};
pub use profile::{Profile, ProfileUpdate};
pub use user::{NewAccount, Session, SessionUser};
