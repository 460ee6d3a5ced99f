pub mod client;
pub mod server;

pub use client::TransferClient;
pub use server::TransferServer;
