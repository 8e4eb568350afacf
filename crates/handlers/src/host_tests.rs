// SPDX-License-Identifier: MIT

use super::*;

#[yare::parameterized(
    zero    = { 0, true },
    typical = { 60, true },
    max     = { 7200, true },
    over    = { 7201, false },
    huge    = { 99999, false },
    negative = { -1, false },
)]
fn grace_period_bounds(seconds: i64, ok: bool) {
    assert_eq!(validate_grace_period(seconds).is_ok(), ok);
}

#[test]
fn grace_period_error_names_the_cap() {
    let err = validate_grace_period(99999).unwrap_err();
    assert_eq!(err, "Grace period cannot exceed 2 hours");
}

#[test]
fn message_quotes_are_stripped() {
    assert_eq!(sanitize_message(r#"maint 'window' "tonight" `soon`"#).unwrap(), "maint window tonight soon");
}

#[test]
fn message_length_cap() {
    let long = "x".repeat(201);
    assert!(sanitize_message(&long).is_err());
    assert!(sanitize_message(&"x".repeat(200)).is_ok());
}

#[yare::parameterized(
    zero  = { "0", true },
    six   = { "6", true },
    s     = { "s", true },
    big_s = { "S", true },
    seven = { "7", false },
    word  = { "single", false },
)]
fn runlevel_validation(runlevel: &str, ok: bool) {
    assert_eq!(validate_runlevel(runlevel).is_ok(), ok);
}

#[test]
fn restart_uses_shutdown_i6() {
    let command = build_command(HostAction::Restart, 60, "maint", None).unwrap();
    assert_eq!(command, "pfexec shutdown -y -i6 -g 60 maint");
}

#[test]
fn shutdown_uses_i5_and_quotes_message() {
    let command = build_command(HostAction::Shutdown, 120, "maintenance window", None).unwrap();
    assert_eq!(command, "pfexec shutdown -y -i5 -g 120 'maintenance window'");
}

#[test]
fn empty_message_omits_argument() {
    let command = build_command(HostAction::Shutdown, 0, "", None).unwrap();
    assert_eq!(command, "pfexec shutdown -y -i5 -g 0");
}

#[yare::parameterized(
    reboot      = { HostAction::Reboot, "pfexec reboot" },
    fast_reboot = { HostAction::FastReboot, "pfexec reboot -f" },
    poweroff    = { HostAction::Poweroff, "pfexec poweroff" },
    halt        = { HostAction::Halt, "pfexec halt" },
    multi_user  = { HostAction::MultiUser, "pfexec init 3" },
)]
fn immediate_actions(action: HostAction, expected: &str) {
    assert_eq!(build_command(action, 0, "", None).unwrap(), expected);
}

#[test]
fn runlevel_change_requires_and_validates_level() {
    assert_eq!(build_command(HostAction::RunlevelChange, 0, "", Some("3")).unwrap(), "pfexec init 3");
    assert!(build_command(HostAction::RunlevelChange, 0, "", None).is_err());
    assert!(build_command(HostAction::RunlevelChange, 0, "", Some("9")).is_err());
}

#[test]
fn single_user_goes_through_shutdown() {
    assert_eq!(
        build_command(HostAction::SingleUser, 30, "", None).unwrap(),
        "pfexec shutdown -y -i s -g 30"
    );
}

#[test]
fn only_halt_requires_emergency() {
    for action in [
        HostAction::Restart,
        HostAction::Reboot,
        HostAction::FastReboot,
        HostAction::Shutdown,
        HostAction::Poweroff,
        HostAction::RunlevelChange,
        HostAction::SingleUser,
        HostAction::MultiUser,
    ] {
        assert!(!action.requires_emergency(), "{action} must not require emergency");
    }
    assert!(HostAction::Halt.requires_emergency());
}

#[test]
fn orchestration_plan_deserializes_with_defaults() {
    let plan: ZoneOrchestration = serde_json::from_value(serde_json::json!({
        "enabled": true,
        "strategy": "parallel_by_priority",
        "failure_action": "skip_stuck",
    }))
    .unwrap();
    assert!(plan.enabled);
    assert_eq!(plan.strategy, OrchestrationStrategy::ParallelByPriority);
    assert_eq!(plan.failure_action, FailureAction::SkipStuck);
    assert_eq!(plan.zone_timeout, 60);
}

#[test]
fn orchestration_defaults_are_safe() {
    let plan: ZoneOrchestration = serde_json::from_value(serde_json::json!({})).unwrap();
    assert!(!plan.enabled);
    assert_eq!(plan.strategy, OrchestrationStrategy::Sequential);
    assert_eq!(plan.failure_action, FailureAction::Abort);
}
