//! Login state machine
//!
//! Table-driven FSM over (status, verb, reply class). Handlers for USER, PASS
//! and ACCT produce a reply; the dispatcher feeds that reply back here to move
//! the session forward.

use crate::auth::Principal;

/// Login progress of a control connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthorizationStatus {
    #[default]
    Unauthenticated,
    NeedPassword,
    NeedAccount,
    /// A login step failed; the client may restart negotiation with USER.
    Authenticated,
    Authorized,
}

struct Transition {
    /// `None` matches any current status.
    from: Option<AuthorizationStatus>,
    verb: &'static str,
    class: u8,
    to: AuthorizationStatus,
}

const fn rule(
    from: Option<AuthorizationStatus>,
    verb: &'static str,
    class: u8,
    to: AuthorizationStatus,
) -> Transition {
    Transition {
        from,
        verb,
        class,
        to,
    }
}

use AuthorizationStatus::*;

const TRANSITIONS: &[Transition] = &[
    rule(None, "USER", 2, Authorized),
    rule(None, "USER", 3, NeedPassword),
    rule(None, "USER", 4, Authenticated),
    rule(None, "USER", 5, Authenticated),
    rule(Some(NeedPassword), "PASS", 2, Authorized),
    rule(Some(NeedPassword), "PASS", 3, NeedAccount),
    rule(Some(NeedPassword), "PASS", 4, Authenticated),
    rule(Some(NeedPassword), "PASS", 5, Authenticated),
    rule(Some(NeedAccount), "ACCT", 2, Authorized),
    rule(Some(NeedAccount), "ACCT", 4, Authenticated),
    rule(Some(NeedAccount), "ACCT", 5, Authenticated),
];

/// Looks up the transition for `verb` answered with `code` while in `current`.
pub fn next_status(
    current: AuthorizationStatus,
    verb: &str,
    code: u16,
) -> Option<AuthorizationStatus> {
    let class = (code / 100) as u8;
    TRANSITIONS
        .iter()
        .find(|t| {
            t.class == class
                && t.verb.eq_ignore_ascii_case(verb)
                && t.from.is_none_or(|from| from == current)
        })
        .map(|t| t.to)
}

/// Per-session login state: FSM status plus who is logging in.
#[derive(Debug, Default)]
pub struct AuthorizationState {
    status: AuthorizationStatus,
    username: Option<String>,
    principal: Option<Principal>,
}

impl AuthorizationState {
    pub fn status(&self) -> AuthorizationStatus {
        self.status
    }

    pub fn is_authorized(&self) -> bool {
        self.status == AuthorizationStatus::Authorized
    }

    /// Advances the FSM with the reply a login handler produced. Verbs without
    /// a matching transition leave the status unchanged.
    pub fn apply(&mut self, verb: &str, code: u16) -> AuthorizationStatus {
        if let Some(next) = next_status(self.status, verb, code) {
            if next != AuthorizationStatus::Authorized {
                self.principal = None;
            }
            self.status = next;
        }
        self.status
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn set_username(&mut self, username: Option<String>) {
        self.username = username;
        self.principal = None;
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn set_principal(&mut self, principal: Principal) {
        self.principal = Some(principal);
    }

    /// Back to the initial state (REIN).
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
