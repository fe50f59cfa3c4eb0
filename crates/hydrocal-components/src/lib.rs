//! Storage networks and flux laws of the hydrocal catchment models
//!
//! A cell is a network of four storages draining into an outlet. Cells are
//! integrated day by day with [`simulation::run_unit`], and
//! [`model::CatchmentModel`] ties the cells of a catchment together into a
//! parameter-to-discharge mapping.

pub mod flux;
pub mod model;
pub mod network;
pub mod pet;
pub mod simulation;
pub mod spatial;
