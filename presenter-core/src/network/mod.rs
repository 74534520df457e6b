pub mod connection;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use connection::{Connection, DEFAULT_RECEIVE_TIMEOUT, INLINE_RECEIVE_BUFFER};
pub use transport::{
    DEFAULT_CONNECT_TIMEOUT, StreamTransport, TcpTransport, TcpTransportFactory, Transport,
    TransportFactory,
};
