mod handler;
mod message;
mod session;

pub use handler::{split_socket, ws_handler, WsSink};
pub use message::{delivery_text, parse_welcome_id, welcome_text, Envelope};
pub use session::run_session;
