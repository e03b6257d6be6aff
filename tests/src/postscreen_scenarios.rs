use postscreen::smtpd::{command_verdict, pipelining_test, Action, CommandVerdict, SessionState, SmtpdConfig, TestOutcome};

#[test]
fn s7_postscreen_pipelining() {
    // Client wrote "EHLO x\r\nMAIL FROM:<a>\r\nRCPT TO:<b>\r\n" in one
    // shot; the reader consumes only the EHLO line, leaving MAIL/RCPT
    // sitting unread in the buffer.
    let mut state = SessionState::default();
    let config = SmtpdConfig {
        pipelining_action: Action::Enforce,
        ..SmtpdConfig::default()
    };

    let buffer_non_empty_after_ehlo = true;
    let outcome = pipelining_test(&mut state, &config, buffer_non_empty_after_ehlo, 1000);
    assert!(matches!(outcome, TestOutcome::Enforced));
    assert!(state.pipelining.is_fail());
    assert!(!state.pipelining.is_pass());
    state.enforced = true;

    for command in ["MAIL", "RCPT", "DATA"] {
        assert_eq!(command_verdict(&mut state, &config, command), CommandVerdict::Enforced550);
    }
}
