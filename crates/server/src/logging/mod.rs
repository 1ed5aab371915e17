pub mod authn_events;

pub use authn_events::AuthnEvent;
