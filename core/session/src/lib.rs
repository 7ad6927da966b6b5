//! Session handoff for seed transfer between devices.
//!
//! A short-lived "session" is a server-side rendezvous record addressed by
//! an id both devices can derive from a small shared entropy string (shown
//! as a QR code or link). The established device encrypts the real vault
//! seed under a key derived from that entropy and posts it as a share; the
//! new device polls until the share appears and decrypts it.

pub mod handoff;

pub use handoff::{session_id, Recovery, Session, SessionHandoff, SESSION_ENTROPY_LENGTH};
