//! Member lifecycle handlers.

mod create_member;
mod destroy_member;
mod product_grants;
mod update_member;

pub use create_member::{CreateMemberCommand, CreateMemberHandler, CreateMemberResult};
pub use destroy_member::{DestroyMemberCommand, DestroyMemberHandler, DestroyMemberResult};
pub use update_member::{UpdateMemberCommand, UpdateMemberHandler, UpdateMemberResult};
