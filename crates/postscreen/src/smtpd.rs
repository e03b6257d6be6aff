//! postscreen's built-in SMTP dummy (§4.8).
//!
//! Grounded on `postscreen/postscreen_smtpd.c`. The engine never
//! announces PIPELINING; any client that sends a command before reading
//! the previous response has shown itself to be a bot, not an
//! RFC-compliant client. Three independent per-session tests
//! (non-SMTP command, pipelining, bare LF) each carry a TODO/PASS/FAIL/
//! SKIP state and a configured action taken the first time they trigger.

use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Close the connection immediately with a 521.
    Drop,
    /// Reject with 550 for the remainder of the session.
    Enforce,
    /// Temporarily whitelist the client for `min_ttl` seconds.
    Ignore,
}

/// TODO is the implicit state: none of the three bits set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestFlags {
    pass: bool,
    fail: bool,
    skip: bool,
}

impl TestFlags {
    pub fn is_todo(&self) -> bool {
        !self.pass && !self.fail && !self.skip
    }
    pub fn is_pass(&self) -> bool {
        self.pass
    }
    pub fn is_fail(&self) -> bool {
        self.fail
    }
    pub fn is_skip(&self) -> bool {
        self.skip
    }
    fn set_pass(&mut self) {
        self.pass = true;
    }
    fn set_fail(&mut self) {
        self.fail = true;
    }
    fn set_skip(&mut self) {
        self.skip = true;
    }
    fn unpass(&mut self) {
        self.pass = false;
    }
    fn unfail(&mut self) {
        self.fail = false;
    }
}

/// No expiry; used for `barlf_stamp`/`nsmtp_stamp`/`pipel_stamp` when a
/// test has just failed and its temporary-whitelist clock is not
/// running.
pub const TIME_STAMP_DISABLED: Option<u64> = None;

#[derive(Debug, Clone, Copy)]
pub enum TestOutcome {
    Dropped,
    Enforced,
    IgnoredUntil(u64),
    NoTrigger,
}

pub struct SmtpdConfig {
    pub barlf_action: Action,
    pub nsmtp_action: Action,
    pub pipelining_action: Action,
    pub min_ttl: u64,
    pub command_count_limit: u32,
    pub recognized_commands: HashSet<&'static str>,
}

impl Default for SmtpdConfig {
    fn default() -> Self {
        SmtpdConfig {
            barlf_action: Action::Ignore,
            nsmtp_action: Action::Drop,
            pipelining_action: Action::Enforce,
            min_ttl: 100,
            command_count_limit: 20,
            recognized_commands: [
                "HELO", "EHLO", "XCLIENT", "XFORWARD", "AUTH", "MAIL", "RCPT", "DATA", "RSET",
                "NOOP", "VRFY", "ETRN", "QUIT",
            ]
            .into_iter()
            .collect(),
        }
    }
}

/// Commands that always succeed so that a probe can't distinguish this
/// dummy from a real server by watching for a 5xx.
const FAKE_OUT_COMMANDS: &[&str] = &["AUTH", "XCLIENT", "XFORWARD"];

#[derive(Default)]
pub struct SessionState {
    pub barlf: TestFlags,
    pub nsmtp: TestFlags,
    pub pipelining: TestFlags,
    pub barlf_stamp: Option<u64>,
    pub nsmtp_stamp: Option<u64>,
    pub pipel_stamp: Option<u64>,
    pub command_count: u32,
    pub reached_rcpt: bool,
    pub enforced: bool,
}

fn apply_action(
    flags: &mut TestFlags,
    stamp: &mut Option<u64>,
    action: Action,
    now: u64,
    min_ttl: u64,
) -> TestOutcome {
    match action {
        Action::Drop => TestOutcome::Dropped,
        Action::Enforce => TestOutcome::Enforced,
        Action::Ignore => {
            flags.unfail();
            flags.set_pass();
            *stamp = Some(now + min_ttl);
            TestOutcome::IgnoredUntil(now + min_ttl)
        }
    }
}

/// Bare-LF test (§4.8, Open Question 3). The disabled-stamp assignment
/// happens unconditionally when the test fires; the IGNORE branch then
/// overwrites it with a real expiry. This ordering - disable first,
/// conditionally re-enable - is load-bearing and must not be
/// reordered or short-circuited.
pub fn barlf_test(state: &mut SessionState, config: &SmtpdConfig, now: u64) -> TestOutcome {
    if !state.barlf.is_todo() {
        return TestOutcome::NoTrigger;
    }
    state.barlf.set_fail();
    state.barlf.unpass();
    state.barlf_stamp = TIME_STAMP_DISABLED;
    state.barlf.set_skip();

    apply_action(
        &mut state.barlf,
        &mut state.barlf_stamp,
        config.barlf_action,
        now,
        config.min_ttl,
    )
}

pub fn non_smtp_test(
    state: &mut SessionState,
    config: &SmtpdConfig,
    command_name: &str,
    looks_like_header_or_listed: bool,
    now: u64,
) -> TestOutcome {
    let recognized = config.recognized_commands.contains(command_name);
    if !state.nsmtp.is_todo() || recognized || !looks_like_header_or_listed {
        return TestOutcome::NoTrigger;
    }
    state.nsmtp.set_fail();
    state.nsmtp.unpass();
    state.nsmtp_stamp = TIME_STAMP_DISABLED;
    state.nsmtp.set_skip();

    apply_action(
        &mut state.nsmtp,
        &mut state.nsmtp_stamp,
        config.nsmtp_action,
        now,
        config.min_ttl,
    )
}

pub fn pipelining_test(
    state: &mut SessionState,
    config: &SmtpdConfig,
    unread_data_pending: bool,
    now: u64,
) -> TestOutcome {
    if !state.pipelining.is_todo() || !unread_data_pending {
        return TestOutcome::NoTrigger;
    }
    state.pipelining.set_fail();
    state.pipelining.unpass();
    state.pipel_stamp = TIME_STAMP_DISABLED;
    state.pipelining.set_skip();

    apply_action(
        &mut state.pipelining,
        &mut state.pipel_stamp,
        config.pipelining_action,
        now,
        config.min_ttl,
    )
}

/// Returns whether this command reaching completion grants PASS to
/// every still-TODO test - only true once for RCPT TO, the earliest
/// point where a well-behaved client has exercised the whole path.
pub fn mark_rcpt_reached(state: &mut SessionState) {
    if state.reached_rcpt {
        return;
    }
    state.reached_rcpt = true;
    for flags in [&mut state.barlf, &mut state.nsmtp, &mut state.pipelining] {
        if flags.is_todo() {
            flags.set_pass();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandVerdict {
    Ok250,
    Enforced550,
    CommandCountExceeded421,
    Continue,
}

/// Applies the per-session command cap and the always-250 fake-out
/// rule. Call after the triggered tests above have already updated
/// `state.enforced`.
pub fn command_verdict(state: &mut SessionState, config: &SmtpdConfig, command_name: &str) -> CommandVerdict {
    state.command_count += 1;
    if state.command_count > config.command_count_limit {
        return CommandVerdict::CommandCountExceeded421;
    }
    if FAKE_OUT_COMMANDS.contains(&command_name) {
        return CommandVerdict::Ok250;
    }
    if state.enforced {
        return CommandVerdict::Enforced550;
    }
    CommandVerdict::Continue
}
