//! # Web API Handlers

pub mod health;
pub mod leases;
pub mod tasks;
