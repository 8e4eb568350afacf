// SPDX-License-Identifier: MIT

//! User management executors over `useradd`/`usermod`/`userdel`/`passwd`.

use super::validate;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use warden_adapters::{sh_quote, CommandRunner};
use warden_core::TaskOutcome;
use warden_queue::{TaskContext, TaskHandler};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserCreateParams {
    pub username: String,
    #[serde(default)]
    pub uid: Option<i64>,
    #[serde(default)]
    pub gid: Option<i64>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub home_directory: Option<String>,
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default = "default_true")]
    pub create_home: bool,
    #[serde(default)]
    pub force_zfs: bool,
    #[serde(default)]
    pub prevent_zfs: bool,
    #[serde(default)]
    pub authorizations: Vec<String>,
    #[serde(default)]
    pub profiles: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub project: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Validate and build the `useradd` invocation. Returns the command plus
/// any non-fatal warnings (system-range ids).
pub fn build_useradd(params: &UserCreateParams) -> Result<(String, Vec<String>), String> {
    validate::validate_username(&params.username)?;
    validate::validate_zfs_flags(params.force_zfs, params.prevent_zfs)?;
    validate::validate_rbac_list("authorizations", &params.authorizations)?;
    validate::validate_rbac_list("profiles", &params.profiles)?;
    validate::validate_rbac_list("roles", &params.roles)?;

    let mut warnings = Vec::new();
    let mut command = String::from("pfexec useradd");
    if let Some(uid) = params.uid {
        if let Some(warning) = validate::validate_uid(uid)? {
            warnings.push(warning);
        }
        command.push_str(&format!(" -u {uid}"));
    }
    if let Some(gid) = params.gid {
        if let Some(warning) = validate::validate_gid(gid)? {
            warnings.push(warning);
        }
        command.push_str(&format!(" -g {gid}"));
    }
    if !params.groups.is_empty() {
        for group in &params.groups {
            validate::validate_groupname(group)?;
        }
        command.push_str(&format!(" -G {}", sh_quote(&params.groups.join(","))));
    }
    if let Some(comment) = &params.comment {
        command.push_str(&format!(" -c {}", sh_quote(comment)));
    }
    if let Some(home) = &params.home_directory {
        command.push_str(&format!(" -d {}", sh_quote(home)));
    }
    if let Some(shell) = &params.shell {
        command.push_str(&format!(" -s {}", sh_quote(shell)));
    }
    if params.create_home {
        command.push_str(" -m");
        if params.force_zfs {
            command.push_str(" -z");
        }
        if params.prevent_zfs {
            command.push_str(" -Z");
        }
    }
    if !params.authorizations.is_empty() {
        command.push_str(&format!(" -A {}", sh_quote(&params.authorizations.join(","))));
    }
    if !params.profiles.is_empty() {
        command.push_str(&format!(" -P {}", sh_quote(&params.profiles.join(","))));
    }
    if !params.roles.is_empty() {
        command.push_str(&format!(" -R {}", sh_quote(&params.roles.join(","))));
    }
    if let Some(project) = &params.project {
        command.push_str(&format!(" -p {}", sh_quote(project)));
    }
    command.push_str(&format!(" {}", sh_quote(&params.username)));
    Ok((command, warnings))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserModifyParams {
    pub username: String,
    #[serde(default)]
    pub new_username: Option<String>,
    #[serde(default)]
    pub uid: Option<i64>,
    #[serde(default)]
    pub gid: Option<i64>,
    #[serde(default)]
    pub groups: Option<Vec<String>>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub home_directory: Option<String>,
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default)]
    pub authorizations: Option<Vec<String>>,
    #[serde(default)]
    pub profiles: Option<Vec<String>>,
    #[serde(default)]
    pub roles: Option<Vec<String>>,
}

pub fn build_usermod(params: &UserModifyParams) -> Result<(String, Vec<String>), String> {
    validate::validate_username(&params.username)?;
    let mut warnings = Vec::new();
    let mut command = String::from("pfexec usermod");
    let mut changes = 0;

    if let Some(new_username) = &params.new_username {
        validate::validate_username(new_username)?;
        command.push_str(&format!(" -l {}", sh_quote(new_username)));
        changes += 1;
    }
    if let Some(uid) = params.uid {
        if let Some(warning) = validate::validate_uid(uid)? {
            warnings.push(warning);
        }
        command.push_str(&format!(" -u {uid}"));
        changes += 1;
    }
    if let Some(gid) = params.gid {
        if let Some(warning) = validate::validate_gid(gid)? {
            warnings.push(warning);
        }
        command.push_str(&format!(" -g {gid}"));
        changes += 1;
    }
    if let Some(groups) = &params.groups {
        for group in groups {
            validate::validate_groupname(group)?;
        }
        command.push_str(&format!(" -G {}", sh_quote(&groups.join(","))));
        changes += 1;
    }
    if let Some(comment) = &params.comment {
        command.push_str(&format!(" -c {}", sh_quote(comment)));
        changes += 1;
    }
    if let Some(home) = &params.home_directory {
        command.push_str(&format!(" -d {}", sh_quote(home)));
        changes += 1;
    }
    if let Some(shell) = &params.shell {
        command.push_str(&format!(" -s {}", sh_quote(shell)));
        changes += 1;
    }
    if let Some(authorizations) = &params.authorizations {
        validate::validate_rbac_list("authorizations", authorizations)?;
        command.push_str(&format!(" -A {}", sh_quote(&authorizations.join(","))));
        changes += 1;
    }
    if let Some(profiles) = &params.profiles {
        validate::validate_rbac_list("profiles", profiles)?;
        command.push_str(&format!(" -P {}", sh_quote(&profiles.join(","))));
        changes += 1;
    }
    if let Some(roles) = &params.roles {
        validate::validate_rbac_list("roles", roles)?;
        command.push_str(&format!(" -R {}", sh_quote(&roles.join(","))));
        changes += 1;
    }

    if changes == 0 {
        return Err("no changes requested".to_string());
    }
    command.push_str(&format!(" {}", sh_quote(&params.username)));
    Ok((command, warnings))
}

#[derive(Debug, Deserialize)]
struct UserDeleteParams {
    username: String,
    #[serde(default)]
    remove_home: bool,
}

#[derive(Debug, Deserialize)]
struct SetPasswordParams {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct LockParams {
    username: String,
}

/// Which user operation a handler instance performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOp {
    Create,
    Modify,
    Delete,
    SetPassword,
    Lock,
    Unlock,
}

pub struct UserHandler {
    runner: CommandRunner,
    op: UserOp,
}

impl UserHandler {
    pub fn new(runner: CommandRunner, op: UserOp) -> Self {
        Self { runner, op }
    }

    async fn execute(&self, command: &str, success_message: String, warnings: Vec<String>) -> TaskOutcome {
        let result = self.runner.run(command).await;
        if result.success {
            if warnings.is_empty() {
                TaskOutcome::ok(success_message)
            } else {
                TaskOutcome::ok_with(success_message, json!({"warnings": warnings}))
            }
        } else {
            TaskOutcome::fail(result.error)
        }
    }
}

#[async_trait]
impl TaskHandler for UserHandler {
    async fn run(&self, ctx: TaskContext) -> TaskOutcome {
        let metadata = ctx.task.metadata.clone();
        match self.op {
            UserOp::Create => {
                let params: UserCreateParams = match serde_json::from_value(metadata) {
                    Ok(params) => params,
                    Err(e) => return TaskOutcome::fail(format!("invalid user metadata: {e}")),
                };
                let (command, warnings) = match build_useradd(&params) {
                    Ok(built) => built,
                    Err(e) => return TaskOutcome::fail(e),
                };
                self.execute(&command, format!("created user {}", params.username), warnings).await
            }
            UserOp::Modify => {
                let params: UserModifyParams = match serde_json::from_value(metadata) {
                    Ok(params) => params,
                    Err(e) => return TaskOutcome::fail(format!("invalid user metadata: {e}")),
                };
                let (command, warnings) = match build_usermod(&params) {
                    Ok(built) => built,
                    Err(e) => return TaskOutcome::fail(e),
                };
                self.execute(&command, format!("modified user {}", params.username), warnings).await
            }
            UserOp::Delete => {
                let params: UserDeleteParams = match serde_json::from_value(metadata) {
                    Ok(params) => params,
                    Err(e) => return TaskOutcome::fail(format!("invalid user metadata: {e}")),
                };
                if let Err(e) = validate::validate_username(&params.username) {
                    return TaskOutcome::fail(e);
                }
                let flag = if params.remove_home { "-r " } else { "" };
                let command = format!("pfexec userdel {flag}{}", sh_quote(&params.username));
                self.execute(&command, format!("deleted user {}", params.username), Vec::new()).await
            }
            UserOp::SetPassword => {
                let params: SetPasswordParams = match serde_json::from_value(metadata) {
                    Ok(params) => params,
                    Err(e) => return TaskOutcome::fail(format!("invalid password metadata: {e}")),
                };
                if let Err(e) = validate::validate_username(&params.username) {
                    return TaskOutcome::fail(e);
                }
                if params.password.is_empty() {
                    return TaskOutcome::fail("password is empty");
                }
                // Non-interactive set: feed the prompt twice via stdin.
                let command = format!(
                    "printf '%s\\n%s\\n' {p} {p} | pfexec passwd {u}",
                    p = sh_quote(&params.password),
                    u = sh_quote(&params.username)
                );
                self.execute(&command, format!("password set for {}", params.username), Vec::new())
                    .await
            }
            UserOp::Lock | UserOp::Unlock => {
                let params: LockParams = match serde_json::from_value(metadata) {
                    Ok(params) => params,
                    Err(e) => return TaskOutcome::fail(format!("invalid user metadata: {e}")),
                };
                if let Err(e) = validate::validate_username(&params.username) {
                    return TaskOutcome::fail(e);
                }
                let (flag, verb) = if self.op == UserOp::Lock { ("-l", "locked") } else { ("-u", "unlocked") };
                let command = format!("pfexec passwd {flag} {}", sh_quote(&params.username));
                self.execute(&command, format!("{verb} user {}", params.username), Vec::new()).await
            }
        }
    }
}

#[cfg(test)]
#[path = "users_tests.rs"]
mod tests;
