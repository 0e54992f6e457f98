#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Geometry normalization and `GeoJSON` feature assembly.
//!
//! The flood-modelling tables store geometry in three different JSON
//! shapes. [`normalize`] coerces each into a canonical `GeoJSON` geometry,
//! and [`assemble`] pairs it with the per-dataset property projection.
//! Rows that fail are dropped and counted; they never fail a request.

pub mod assemble;
pub mod models3d;
pub mod normalize;

pub use assemble::{
    Assembly, DatasetRow, ProtectionRange, SkipReason, assemble, assemble_flood_damage,
    assemble_row,
};
pub use normalize::{NormalizeError, StoredShape};
