//! Entitlement and usage tracking core for the resume platform.
//!
//! Reconciles a principal's plan tier, trial lifecycle, and per-feature
//! quotas against the server-side usage API, and enforces small local caps
//! for guests before any network involvement. The server stays the
//! authority on real limits; this layer caches its answers and turns them
//! into allow/deny decisions the UI can render.

pub mod client;
pub mod config;
pub mod errors;
pub mod gate;
pub mod guest;
pub mod identity;
pub mod models;
pub mod state;
pub mod store;
pub mod trial;

pub use client::EntitlementClient;
pub use config::Config;
pub use errors::EntitlementError;
pub use gate::{check_feature_availability, FeatureDecision};
pub use guest::{GuestAction, GuestActionLimiter};
pub use identity::{IdentityProvider, LocalIdentity, Principal};
pub use state::Entitlements;
pub use store::{FileStore, GuestStore, MemoryStore};
pub use trial::{derive_trial_state, StartTrialOutcome, TrialManager, TrialState};
