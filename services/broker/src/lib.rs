//! # kauth broker
//!
//! A cluster-resident authentication broker. A small CLI on the user's
//! workstation calls `/start-login`, opens the returned provider URL in a
//! browser, and waits on `/watch` (Server-Sent Events) for the outcome. The
//! provider redirects the browser to `/callback` on *any* replica; the
//! callback exchanges the authorization code (PKCE), verifies the identity
//! token, renders a kubeconfig and writes the terminal outcome onto a
//! cluster-wide `OAuthSession` record. A watch-driven notifier on every
//! replica wakes the local `/watch` streams, so the callback almost never
//! needs to land on the replica that started the flow.
//!
//! Refreshes are stateless: the client holds an encrypted, MAC'd envelope
//! carrying the upstream refresh token. `/refresh` re-runs the upstream
//! grant, re-verifies the identity token, pins the subject to the envelope's
//! email, and hands back a new envelope with an incremented rotation
//! counter.
//!
//! The broker never stores long-lived user credentials and never issues
//! identity tokens of its own; everything a kubeconfig ends up trusting
//! originates from the upstream OIDC provider.

pub mod api;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod kubeconfig;
pub mod listeners;
pub mod notifier;
pub mod oidc;
pub mod rate_limit;
pub mod tls;
