//! agentq — per-project task queue bot.
//!
//! Chat messages become tasks on per-project FIFO queues; each active
//! project gets one worker that feeds tasks to an agent CLI running in
//! that project's directory.

pub mod bot;
pub mod channels;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod registry;
pub mod session;
pub mod task;
pub mod worker;
pub mod workspace;
