//! Ichnos - workflow carbon footprint estimator with temporal shift analysis
//!
//! This library estimates the operational and embodied carbon footprint of
//! computational workflow executions from their task traces, using the Cloud
//! Carbon Footprint methodology against time-varying grid carbon intensity,
//! and explores how much a workflow could have saved by running at a
//! different time.

pub mod cli;
pub mod config;
pub mod embodied;
pub mod energy;
pub mod error;
pub mod intensity;
pub mod interval;
pub mod power;
pub mod record;
pub mod report;
pub mod shift;
pub mod trace;
