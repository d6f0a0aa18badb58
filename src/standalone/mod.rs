//! MCP surface for Cartographer: the rmcp server handler and the peer
//! notifier that forwards store changes to connected clients.

pub mod notify;
pub mod server;

pub use notify::{PeerList, PeerNotifier};
pub use server::CartographerMcpServer;
