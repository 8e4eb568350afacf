// SPDX-License-Identifier: MIT

use super::*;

#[yare::parameterized(
    created = { LogSessionStatus::Created, false },
    active  = { LogSessionStatus::Active,  false },
    closed  = { LogSessionStatus::Closed,  true },
    error   = { LogSessionStatus::Error,   true },
    stopped = { LogSessionStatus::Stopped, true },
)]
fn terminal_states(status: LogSessionStatus, expected: bool) {
    assert_eq!(status.is_terminal(), expected);
}

#[test]
fn status_parse_round_trip() {
    for status in [
        LogSessionStatus::Created,
        LogSessionStatus::Active,
        LogSessionStatus::Closed,
        LogSessionStatus::Error,
        LogSessionStatus::Stopped,
    ] {
        assert_eq!(LogSessionStatus::parse(status.as_str()), Some(status));
    }
    assert_eq!(LogSessionStatus::parse("paused"), None);
}

#[test]
fn session_id_prefix() {
    assert!(LogSessionId::new().as_str().starts_with("lgs-"));
}
