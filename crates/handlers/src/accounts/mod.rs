// SPDX-License-Identifier: MIT

//! Account management: users, groups, roles, and the RBAC read side.

pub mod groups;
pub mod query;
pub mod users;
pub mod validate;

pub use groups::{GroupHandler, GroupOp, RoleHandler, RoleOp};
pub use users::{UserHandler, UserOp};
