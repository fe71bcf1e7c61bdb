pub mod server;

pub use server::{router, GatewayServer, GatewayState};
