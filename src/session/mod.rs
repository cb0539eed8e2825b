//! 会话层：按会话 id 累积各步输出

pub mod store;

pub use store::{create_session_store, MemorySessionStore, SessionRecord, SessionStore};
