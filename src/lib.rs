//! Vision-driven navigation of game menus.
//!
//! A [`workflow::WorkflowGraph`] describes the screens of a game and how to
//! move between them. The [`engine::DecisionEngine`] repeatedly captures the
//! SUT's screen, asks a [`detector::Detector`] what is on it, recognises the
//! current screen and sends the matching input through an [`sut::Executor`]
//! until the target screen shows up.

pub mod cli;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod sut;
pub mod ui;
pub mod workflow;
