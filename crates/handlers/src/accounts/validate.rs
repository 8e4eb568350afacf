// SPDX-License-Identifier: MIT

//! Account input validation: name patterns, id ranges, RBAC list shapes.

pub const MAX_NAME_LEN: usize = 32;
pub const MAX_ID: i64 = 2_147_483_647;
/// Ids at or below this are conventionally reserved for system accounts.
pub const SYSTEM_ID_MAX: i64 = 99;

/// Usernames and role names: `^[a-z_][a-z0-9_-]*$`, at most 32 chars.
pub fn validate_username(name: &str) -> Result<(), String> {
    validate_name(name, false).map_err(|e| format!("invalid username: {e}"))
}

pub fn validate_rolename(name: &str) -> Result<(), String> {
    validate_name(name, false).map_err(|e| format!("invalid role name: {e}"))
}

/// Group names additionally accept mixed case: `^[a-zA-Z_][a-zA-Z0-9_-]*$`.
pub fn validate_groupname(name: &str) -> Result<(), String> {
    validate_name(name, true).map_err(|e| format!("invalid group name: {e}"))
}

fn validate_name(name: &str, allow_upper: bool) -> Result<(), String> {
    if name.is_empty() {
        return Err("name is empty".to_string());
    }
    if name.len() > MAX_NAME_LEN {
        return Err(format!("name exceeds {MAX_NAME_LEN} characters"));
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or('_');
    let first_ok = first == '_' || first.is_ascii_lowercase() || (allow_upper && first.is_ascii_uppercase());
    if !first_ok {
        return Err(format!("must start with a letter or underscore, got {first:?}"));
    }
    for c in chars {
        let ok = c == '_'
            || c == '-'
            || c.is_ascii_digit()
            || c.is_ascii_lowercase()
            || (allow_upper && c.is_ascii_uppercase());
        if !ok {
            return Err(format!("invalid character {c:?}"));
        }
    }
    Ok(())
}

/// UID range check. Valid ids inside the system range come back with a
/// warning rather than an error.
pub fn validate_uid(uid: i64) -> Result<Option<String>, String> {
    validate_id(uid, "UID")
}

pub fn validate_gid(gid: i64) -> Result<Option<String>, String> {
    validate_id(gid, "GID")
}

fn validate_id(id: i64, kind: &str) -> Result<Option<String>, String> {
    if id < 0 {
        return Err(format!("{kind} cannot be negative"));
    }
    if id > MAX_ID {
        return Err(format!("{kind} exceeds {MAX_ID}"));
    }
    if id <= SYSTEM_ID_MAX {
        return Ok(Some(format!(
            "{kind} {id} is in the system range (0-{SYSTEM_ID_MAX})"
        )));
    }
    Ok(None)
}

/// The two ZFS home-directory flags are mutually exclusive.
pub fn validate_zfs_flags(force_zfs: bool, prevent_zfs: bool) -> Result<(), String> {
    if force_zfs && prevent_zfs {
        return Err("force_zfs and prevent_zfs are mutually exclusive".to_string());
    }
    Ok(())
}

/// RBAC arrays are joined with commas on the command line, so entries
/// must be non-empty and comma-free.
pub fn validate_rbac_list(kind: &str, entries: &[String]) -> Result<(), String> {
    for entry in entries {
        if entry.trim().is_empty() {
            return Err(format!("{kind} list contains an empty entry"));
        }
        if entry.contains(',') {
            return Err(format!("{kind} entry {entry:?} contains a comma"));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
