pub mod client;
pub mod paper;
pub mod rest;
pub mod session;
pub mod websocket;

pub use client::BrokerClient;
pub use paper::PaperBroker;
pub use rest::RestBroker;
pub use session::SessionToken;
pub use websocket::PriceStream;
