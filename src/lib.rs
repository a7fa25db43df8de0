//! Community chat client for MiSemestre: a sync engine that mirrors a
//! remote message store into a local ordered list, counts unread messages
//! while the chat is hidden, and an egui front end on top of it.

pub mod common;
pub mod config;
pub mod error;
pub mod storage;
pub mod sync;
pub mod ui;
