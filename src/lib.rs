//! Dispatch optimisation of energy storage devices with piecewise-linearised efficiency curves.
#![warn(missing_docs)]
pub mod breakpoints;
pub mod cli;
pub mod efficiency;
pub mod energy_system;
pub mod input;
pub mod linearisation;
pub mod log;
pub mod optimisation;
pub mod output;
pub mod settings;
pub mod simulation;
pub mod storage;
pub mod timesteps;

#[cfg(test)]
mod fixture;
