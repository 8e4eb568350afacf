// SPDX-License-Identifier: MIT

//! IP address executors over `ipadm`.
//!
//! Interface objects represent interfaces, not individual addresses: the
//! underlying IP interface is removed only when the last address object
//! referencing it is deleted.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use warden_adapters::{sh_quote, CommandRunner};
use warden_core::TaskOutcome;
use warden_queue::{TaskContext, TaskHandler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    Static,
    Dhcp,
    Addrconf,
}

#[derive(Debug, Deserialize)]
struct IpCreateParams {
    interface: String,
    #[serde(default)]
    addrobj: Option<String>,
    address_type: AddressType,
    /// CIDR literal, static addresses only.
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    temporary: bool,
}

fn default_addrobj(interface: &str, address_type: AddressType) -> String {
    match address_type {
        AddressType::Addrconf => format!("{interface}/v6"),
        _ => format!("{interface}/v4"),
    }
}

fn build_create_command(params: &IpCreateParams) -> Result<String, String> {
    if params.interface.is_empty() {
        return Err("interface is required".to_string());
    }
    let addrobj = params
        .addrobj
        .clone()
        .unwrap_or_else(|| default_addrobj(&params.interface, params.address_type));

    let mut command = String::from("pfexec ipadm create-addr");
    if params.temporary {
        command.push_str(" -t");
    }
    match params.address_type {
        AddressType::Static => {
            let Some(address) = &params.address else {
                return Err("address is required for static address objects".to_string());
            };
            command.push_str(&format!(" -T static -a local={}", sh_quote(address)));
        }
        AddressType::Dhcp => command.push_str(" -T dhcp"),
        AddressType::Addrconf => command.push_str(" -T addrconf"),
    }
    command.push_str(&format!(" {}", sh_quote(&addrobj)));
    Ok(command)
}

/// Address objects from `ipadm show-addr -p -o addrobj` output.
fn parse_addrobjs(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn interface_of(addrobj: &str) -> &str {
    addrobj.split('/').next().unwrap_or(addrobj)
}

pub struct IpAddressCreateHandler {
    runner: CommandRunner,
}

impl IpAddressCreateHandler {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl TaskHandler for IpAddressCreateHandler {
    async fn run(&self, ctx: TaskContext) -> TaskOutcome {
        let params: IpCreateParams = match serde_json::from_value(ctx.task.metadata.clone()) {
            Ok(params) => params,
            Err(e) => return TaskOutcome::fail(format!("invalid ipaddr metadata: {e}")),
        };
        let command = match build_create_command(&params) {
            Ok(command) => command,
            Err(e) => return TaskOutcome::fail(e),
        };

        // The interface may not exist yet; create-if is idempotent enough
        // to try first and ignore an already-exists failure.
        let create_if =
            self.runner.run(&format!("pfexec ipadm create-if {}", sh_quote(&params.interface))).await;
        if !create_if.success && !create_if.error.contains("already exists") {
            tracing::debug!(
                interface = %params.interface,
                error = %create_if.error,
                "ipadm create-if failed; continuing to create-addr"
            );
        }

        let result = self.runner.run(&command).await;
        if result.success {
            TaskOutcome::ok(format!("created address on {}", params.interface))
        } else {
            TaskOutcome::fail(result.error)
        }
    }
}

#[derive(Debug, Deserialize)]
struct IpDeleteParams {
    addrobj: String,
    /// Release a DHCP lease instead of dropping it.
    #[serde(default)]
    release: bool,
}

pub struct IpAddressDeleteHandler {
    runner: CommandRunner,
}

impl IpAddressDeleteHandler {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl TaskHandler for IpAddressDeleteHandler {
    async fn run(&self, ctx: TaskContext) -> TaskOutcome {
        let params: IpDeleteParams = match serde_json::from_value(ctx.task.metadata.clone()) {
            Ok(params) => params,
            Err(e) => return TaskOutcome::fail(format!("invalid ipaddr metadata: {e}")),
        };
        if params.addrobj.is_empty() {
            return TaskOutcome::fail("addrobj is required");
        }

        let flag = if params.release { " -r" } else { "" };
        let delete =
            self.runner.run(&format!("pfexec ipadm delete-addr{flag} {}", sh_quote(&params.addrobj))).await;
        if !delete.success {
            return TaskOutcome::fail(delete.error);
        }

        if ctx.is_cancelled() {
            return TaskOutcome::ok(format!("deleted {}", params.addrobj));
        }

        // Interface GC: drop the IP interface once nothing references it.
        let interface = interface_of(&params.addrobj).to_string();
        let remaining = self.runner.run("ipadm show-addr -p -o addrobj").await;
        let mut interface_removed = false;
        if remaining.success {
            let still_used = parse_addrobjs(&remaining.output)
                .iter()
                .any(|obj| interface_of(obj) == interface);
            if !still_used {
                let delete_if =
                    self.runner.run(&format!("pfexec ipadm delete-if {}", sh_quote(&interface))).await;
                interface_removed = delete_if.success;
                if !delete_if.success {
                    tracing::warn!(
                        interface = %interface,
                        error = %delete_if.error,
                        "failed to remove unreferenced interface"
                    );
                }
            }
        }

        TaskOutcome::ok_with(
            format!("deleted {}", params.addrobj),
            json!({"interface": interface, "interface_removed": interface_removed}),
        )
    }
}

#[cfg(test)]
#[path = "ipaddr_tests.rs"]
mod tests;
