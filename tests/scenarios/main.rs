//! Scenario tests running the demo game document against a scripted runtime

mod helpers;

mod failure_handling;
mod notification;
mod release_flow;
mod round_trip;
mod secrets;
mod trigger_gating;
