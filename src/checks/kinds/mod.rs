//! Built-in probe kinds

pub mod dns;
pub mod https;
pub mod redir;
pub mod tcp;

pub use dns::DnsProbe;
pub use https::HttpsProbe;
pub use redir::RedirectProbe;
pub use tcp::TcpPortProbe;
