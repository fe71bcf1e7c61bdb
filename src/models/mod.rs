pub mod session;

pub use session::{ChatMessage, Message, Role, Session};
