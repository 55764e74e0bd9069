//! Rule management for the Wallarm Cloud API.
//!
//! Provides the request point model, the condition wire codec, order-independent
//! condition comparison, the rule endpoints client, and a [`Reconciler`] that
//! aligns locally declared rules with the server's records.

#![deny(missing_docs)]

pub mod blocks;
pub mod canonical;
pub mod client;
pub mod codec;
pub mod models;
pub mod point;
pub mod reconciler;

pub use blocks::{
    AdvancedCondition, ArbitraryCondition, EnumeratedParameters, EnumeratedPoint, Reaction,
    Threshold,
};
pub use canonical::{canonical_hash, dedup, sets_equal, ConditionSet};
pub use client::{RuleApi, RulesClient};
pub use codec::{decode_condition, decode_point_location, encode_condition, encode_point_location};
pub use point::{Arity, Comparison, Condition, Point, PointTag};
pub use reconciler::{ReadOutcome, Reconciler, Rule, RuleIdentity};

/// Convenient result alias that reuses the shared Wallarm error type.
pub type Result<T> = wallarm_core::Result<T>;
