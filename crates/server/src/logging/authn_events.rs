use std::fmt::Display;
use std::net::IpAddr;
use tracing::{Level, Span, field};

use crate::messages::MessageCode;

/// AuthnEvent - one structured record per authentication attempt.
///
/// All attributes live on a single `authn` span so every log line emitted while handling the
/// attempt carries them, and the final outcome is emitted as one event on that span.
///
/// ```rust,ignore
/// let evt = AuthnEvent::new("alpha", client_ip);
/// evt.add("account", "alice");
/// evt.failure("wrong_password", MessageCode::IncorrectCredentials);
/// ```
#[derive(Clone)]
pub struct AuthnEvent {
    span: Span,
}

impl AuthnEvent {
    /// Fields must be declared up front for `Span::record` to take effect.
    pub fn new(cell: &str, client_ip: IpAddr) -> Self {
        let span = tracing::span!(
            Level::INFO,
            "authn",
            cell = %cell,
            client_ip = %client_ip,
            account = field::Empty,
            flow = field::Empty,
            outcome = field::Empty,
            reason = field::Empty,
            code = field::Empty,
        );
        AuthnEvent { span }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Record an attribute declared in `new`. Unknown keys are silently ignored by tracing.
    pub fn add<V: Display>(&self, key: &'static str, value: V) {
        self.span.record(key, field::display(value));
    }

    pub fn success(&self, token_kind: &'static str) {
        self.add("outcome", "success");
        self.span
            .in_scope(|| tracing::info!(token_kind, "authentication succeeded"));
    }

    /// Authentication failures are expected traffic, so they log at INFO.
    pub fn failure(&self, reason: &'static str, code: MessageCode) {
        self.add("outcome", "failure");
        self.add("reason", reason);
        self.add("code", code);
        self.span
            .in_scope(|| tracing::info!("authentication failed"));
    }

    pub fn error(&self, err: &dyn std::error::Error, code: MessageCode) {
        self.add("outcome", "error");
        self.add("code", code);
        self.span
            .in_scope(|| tracing::error!(error = %err, "authentication aborted"));
    }
}
