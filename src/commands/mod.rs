pub mod chat;
pub mod completions;
pub mod personas;
