// SPDX-License-Identifier: MIT

//! Group and role executors.

use super::validate;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use warden_adapters::{sh_quote, CommandRunner};
use warden_core::TaskOutcome;
use warden_queue::{TaskContext, TaskHandler};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupParams {
    pub groupname: String,
    #[serde(default)]
    pub gid: Option<i64>,
    #[serde(default)]
    pub new_groupname: Option<String>,
}

pub fn build_groupadd(params: &GroupParams) -> Result<(String, Vec<String>), String> {
    validate::validate_groupname(&params.groupname)?;
    let mut warnings = Vec::new();
    let mut command = String::from("pfexec groupadd");
    if let Some(gid) = params.gid {
        if let Some(warning) = validate::validate_gid(gid)? {
            warnings.push(warning);
        }
        command.push_str(&format!(" -g {gid}"));
    }
    command.push_str(&format!(" {}", sh_quote(&params.groupname)));
    Ok((command, warnings))
}

pub fn build_groupmod(params: &GroupParams) -> Result<(String, Vec<String>), String> {
    validate::validate_groupname(&params.groupname)?;
    let mut warnings = Vec::new();
    let mut command = String::from("pfexec groupmod");
    let mut changes = 0;
    if let Some(gid) = params.gid {
        if let Some(warning) = validate::validate_gid(gid)? {
            warnings.push(warning);
        }
        command.push_str(&format!(" -g {gid}"));
        changes += 1;
    }
    if let Some(new_groupname) = &params.new_groupname {
        validate::validate_groupname(new_groupname)?;
        command.push_str(&format!(" -n {}", sh_quote(new_groupname)));
        changes += 1;
    }
    if changes == 0 {
        return Err("no changes requested".to_string());
    }
    command.push_str(&format!(" {}", sh_quote(&params.groupname)));
    Ok((command, warnings))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOp {
    Create,
    Modify,
    Delete,
}

pub struct GroupHandler {
    runner: CommandRunner,
    op: GroupOp,
}

impl GroupHandler {
    pub fn new(runner: CommandRunner, op: GroupOp) -> Self {
        Self { runner, op }
    }
}

#[async_trait]
impl TaskHandler for GroupHandler {
    async fn run(&self, ctx: TaskContext) -> TaskOutcome {
        let params: GroupParams = match serde_json::from_value(ctx.task.metadata.clone()) {
            Ok(params) => params,
            Err(e) => return TaskOutcome::fail(format!("invalid group metadata: {e}")),
        };

        let (command, verb, warnings) = match self.op {
            GroupOp::Create => match build_groupadd(&params) {
                Ok((command, warnings)) => (command, "created", warnings),
                Err(e) => return TaskOutcome::fail(e),
            },
            GroupOp::Modify => match build_groupmod(&params) {
                Ok((command, warnings)) => (command, "modified", warnings),
                Err(e) => return TaskOutcome::fail(e),
            },
            GroupOp::Delete => {
                if let Err(e) = validate::validate_groupname(&params.groupname) {
                    return TaskOutcome::fail(e);
                }
                (format!("pfexec groupdel {}", sh_quote(&params.groupname)), "deleted", Vec::new())
            }
        };

        let result = self.runner.run(&command).await;
        if result.success {
            let message = format!("{verb} group {}", params.groupname);
            if warnings.is_empty() {
                TaskOutcome::ok(message)
            } else {
                TaskOutcome::ok_with(message, json!({"warnings": warnings}))
            }
        } else {
            TaskOutcome::fail(result.error)
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleParams {
    pub rolename: String,
    #[serde(default)]
    pub uid: Option<i64>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub authorizations: Vec<String>,
    #[serde(default)]
    pub profiles: Vec<String>,
    #[serde(default)]
    pub remove_home: bool,
}

pub fn build_roleadd(params: &RoleParams) -> Result<(String, Vec<String>), String> {
    validate::validate_rolename(&params.rolename)?;
    validate::validate_rbac_list("authorizations", &params.authorizations)?;
    validate::validate_rbac_list("profiles", &params.profiles)?;

    let mut warnings = Vec::new();
    let mut command = String::from("pfexec roleadd -m");
    if let Some(uid) = params.uid {
        if let Some(warning) = validate::validate_uid(uid)? {
            warnings.push(warning);
        }
        command.push_str(&format!(" -u {uid}"));
    }
    if let Some(comment) = &params.comment {
        command.push_str(&format!(" -c {}", sh_quote(comment)));
    }
    if !params.authorizations.is_empty() {
        command.push_str(&format!(" -A {}", sh_quote(&params.authorizations.join(","))));
    }
    if !params.profiles.is_empty() {
        command.push_str(&format!(" -P {}", sh_quote(&params.profiles.join(","))));
    }
    command.push_str(&format!(" {}", sh_quote(&params.rolename)));
    Ok((command, warnings))
}

pub fn build_rolemod(params: &RoleParams) -> Result<(String, Vec<String>), String> {
    validate::validate_rolename(&params.rolename)?;
    let mut warnings = Vec::new();
    let mut command = String::from("pfexec rolemod");
    let mut changes = 0;
    if let Some(uid) = params.uid {
        if let Some(warning) = validate::validate_uid(uid)? {
            warnings.push(warning);
        }
        command.push_str(&format!(" -u {uid}"));
        changes += 1;
    }
    if let Some(comment) = &params.comment {
        command.push_str(&format!(" -c {}", sh_quote(comment)));
        changes += 1;
    }
    if !params.authorizations.is_empty() {
        validate::validate_rbac_list("authorizations", &params.authorizations)?;
        command.push_str(&format!(" -A {}", sh_quote(&params.authorizations.join(","))));
        changes += 1;
    }
    if !params.profiles.is_empty() {
        validate::validate_rbac_list("profiles", &params.profiles)?;
        command.push_str(&format!(" -P {}", sh_quote(&params.profiles.join(","))));
        changes += 1;
    }
    if changes == 0 {
        return Err("no changes requested".to_string());
    }
    command.push_str(&format!(" {}", sh_quote(&params.rolename)));
    Ok((command, warnings))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleOp {
    Create,
    Modify,
    Delete,
}

pub struct RoleHandler {
    runner: CommandRunner,
    op: RoleOp,
}

impl RoleHandler {
    pub fn new(runner: CommandRunner, op: RoleOp) -> Self {
        Self { runner, op }
    }
}

#[async_trait]
impl TaskHandler for RoleHandler {
    async fn run(&self, ctx: TaskContext) -> TaskOutcome {
        let params: RoleParams = match serde_json::from_value(ctx.task.metadata.clone()) {
            Ok(params) => params,
            Err(e) => return TaskOutcome::fail(format!("invalid role metadata: {e}")),
        };

        let (command, verb, warnings) = match self.op {
            RoleOp::Create => match build_roleadd(&params) {
                Ok((command, warnings)) => (command, "created", warnings),
                Err(e) => return TaskOutcome::fail(e),
            },
            RoleOp::Modify => match build_rolemod(&params) {
                Ok((command, warnings)) => (command, "modified", warnings),
                Err(e) => return TaskOutcome::fail(e),
            },
            RoleOp::Delete => {
                if let Err(e) = validate::validate_rolename(&params.rolename) {
                    return TaskOutcome::fail(e);
                }
                let flag = if params.remove_home { "-r " } else { "" };
                (format!("pfexec roledel {flag}{}", sh_quote(&params.rolename)), "deleted", Vec::new())
            }
        };

        let result = self.runner.run(&command).await;
        if result.success {
            let message = format!("{verb} role {}", params.rolename);
            if warnings.is_empty() {
                TaskOutcome::ok(message)
            } else {
                TaskOutcome::ok_with(message, json!({"warnings": warnings}))
            }
        } else {
            TaskOutcome::fail(result.error)
        }
    }
}

#[cfg(test)]
#[path = "groups_tests.rs"]
mod tests;
