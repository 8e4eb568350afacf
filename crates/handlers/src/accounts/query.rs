// SPDX-License-Identifier: MIT

//! Read-side account queries: `getent` output and the RBAC databases
//! (`/etc/user_attr`, `/etc/security/auth_attr`, `/etc/security/prof_attr`).

use serde::Serialize;
use std::collections::HashMap;
use warden_adapters::{sh_quote, CommandRunner};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PasswdEntry {
    pub username: String,
    pub uid: i64,
    pub gid: i64,
    pub comment: String,
    pub home: String,
    pub shell: String,
}

/// Parse `getent passwd` lines (`name:x:uid:gid:comment:home:shell`).
pub fn parse_passwd(output: &str) -> Vec<PasswdEntry> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(':').collect();
            if fields.len() < 7 {
                return None;
            }
            Some(PasswdEntry {
                username: fields[0].to_string(),
                uid: fields[2].parse().ok()?,
                gid: fields[3].parse().ok()?,
                comment: fields[4].to_string(),
                home: fields[5].to_string(),
                shell: fields[6].to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupEntry {
    pub groupname: String,
    pub gid: i64,
    pub members: Vec<String>,
}

/// Parse `getent group` lines (`name:x:gid:member,member`).
pub fn parse_group(output: &str) -> Vec<GroupEntry> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(':').collect();
            if fields.len() < 4 {
                return None;
            }
            Some(GroupEntry {
                groupname: fields[0].to_string(),
                gid: fields[2].parse().ok()?,
                members: fields[3]
                    .split(',')
                    .filter(|m| !m.is_empty())
                    .map(str::to_string)
                    .collect(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserAttrEntry {
    pub name: String,
    /// Key/value attributes from the fifth field (`k=v` joined by `;`).
    pub attributes: HashMap<String, String>,
}

impl UserAttrEntry {
    pub fn attribute_list(&self, key: &str) -> Vec<String> {
        self.attributes
            .get(key)
            .map(|v| v.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn entry_type(&self) -> Option<&str> {
        self.attributes.get("type").map(String::as_str)
    }
}

/// Parse `/etc/user_attr` (`name:qualifier:res1:res2:attr`).
pub fn parse_user_attr(output: &str) -> Vec<UserAttrEntry> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(':').collect();
            let name = (*fields.first()?).to_string();
            if name.is_empty() {
                return None;
            }
            let attributes = fields
                .get(4)
                .map(|attrs| {
                    attrs
                        .split(';')
                        .filter_map(|pair| {
                            let (key, value) = pair.split_once('=')?;
                            Some((key.trim().to_string(), value.trim().to_string()))
                        })
                        .collect()
                })
                .unwrap_or_default();
            Some(UserAttrEntry { name, attributes })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthAttrEntry {
    pub name: String,
    pub short_desc: String,
    pub long_desc: String,
}

/// Parse `/etc/security/auth_attr`
/// (`name:res1:res2:short_desc:long_desc:attr`).
pub fn parse_auth_attr(output: &str) -> Vec<AuthAttrEntry> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(':').collect();
            let name = (*fields.first()?).to_string();
            if name.is_empty() {
                return None;
            }
            Some(AuthAttrEntry {
                name,
                short_desc: fields.get(3).unwrap_or(&"").to_string(),
                long_desc: fields.get(4).unwrap_or(&"").to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfAttrEntry {
    pub name: String,
    pub description: String,
    pub attributes: HashMap<String, String>,
}

/// Parse `/etc/security/prof_attr` (`name:res1:res2:desc:attr`).
pub fn parse_prof_attr(output: &str) -> Vec<ProfAttrEntry> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(':').collect();
            let name = (*fields.first()?).to_string();
            if name.is_empty() {
                return None;
            }
            let attributes = fields
                .get(4)
                .map(|attrs| {
                    attrs
                        .split(';')
                        .filter_map(|pair| {
                            let (key, value) = pair.split_once('=')?;
                            Some((key.trim().to_string(), value.trim().to_string()))
                        })
                        .collect()
                })
                .unwrap_or_default();
            Some(ProfAttrEntry {
                name,
                description: fields.get(3).unwrap_or(&"").to_string(),
                attributes,
            })
        })
        .collect()
}

pub async fn list_users(runner: &CommandRunner) -> Result<Vec<PasswdEntry>, String> {
    let result = runner.run("getent passwd").await;
    if result.success {
        Ok(parse_passwd(&result.output))
    } else {
        Err(format!("getent passwd failed: {}", result.error))
    }
}

pub async fn get_user(runner: &CommandRunner, username: &str) -> Result<Option<PasswdEntry>, String> {
    let result = runner.run(&format!("getent passwd {}", sh_quote(username))).await;
    if result.success {
        Ok(parse_passwd(&result.output).into_iter().next())
    } else {
        // getent exits 2 when the key is unknown.
        Ok(None)
    }
}

pub async fn list_groups(runner: &CommandRunner) -> Result<Vec<GroupEntry>, String> {
    let result = runner.run("getent group").await;
    if result.success {
        Ok(parse_group(&result.output))
    } else {
        Err(format!("getent group failed: {}", result.error))
    }
}

pub async fn get_group(runner: &CommandRunner, groupname: &str) -> Result<Option<GroupEntry>, String> {
    let result = runner.run(&format!("getent group {}", sh_quote(groupname))).await;
    if result.success {
        Ok(parse_group(&result.output).into_iter().next())
    } else {
        Ok(None)
    }
}

pub async fn user_attributes(
    runner: &CommandRunner,
    username: &str,
) -> Result<Option<UserAttrEntry>, String> {
    let result = runner.run("cat /etc/user_attr").await;
    if !result.success {
        return Err(format!("failed to read user_attr: {}", result.error));
    }
    Ok(parse_user_attr(&result.output).into_iter().find(|entry| entry.name == username))
}

/// Accounts declared `type=role` in `user_attr`.
pub async fn list_roles(runner: &CommandRunner) -> Result<Vec<UserAttrEntry>, String> {
    let result = runner.run("cat /etc/user_attr").await;
    if !result.success {
        return Err(format!("failed to read user_attr: {}", result.error));
    }
    Ok(parse_user_attr(&result.output)
        .into_iter()
        .filter(|entry| entry.entry_type() == Some("role"))
        .collect())
}

pub async fn list_authorizations(runner: &CommandRunner) -> Result<Vec<AuthAttrEntry>, String> {
    let result = runner.run("cat /etc/security/auth_attr").await;
    if !result.success {
        return Err(format!("failed to read auth_attr: {}", result.error));
    }
    Ok(parse_auth_attr(&result.output))
}

pub async fn list_profiles(runner: &CommandRunner) -> Result<Vec<ProfAttrEntry>, String> {
    let result = runner.run("cat /etc/security/prof_attr").await;
    if !result.success {
        return Err(format!("failed to read prof_attr: {}", result.error));
    }
    Ok(parse_prof_attr(&result.output))
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
