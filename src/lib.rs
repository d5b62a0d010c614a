//! Multi-file upload kit: a per-field upload lifecycle engine on the client
//! side, an HTTP receiver that stores the files on the server side, and the
//! wire plumbing between them.

pub mod sys_field;
pub mod sys_filehost;
pub mod sys_pathutil;
pub mod sys_receiver;
pub mod sys_registry;
pub mod sys_render;
pub mod sys_server;
pub mod sys_wire;
