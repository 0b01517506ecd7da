//! Authenticated connections.

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};

use crate::{NodeAddress, PublicKey};

/// A bidirectional byte stream a transport hands out after authentication.
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> ByteStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Boxed stream type carried by [`AuthenticatedConnection`].
pub type BoxedStream = Box<dyn ByteStream>;

/// A stream whose remote side has proven ownership of [`remote_key`](Self::remote_key).
pub struct AuthenticatedConnection {
    stream: BoxedStream,
    remote_key: PublicKey,
    remote_endpoint: String,
}

impl fmt::Debug for AuthenticatedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedConnection")
            .field("remote_key", &self.remote_key)
            .field("remote_endpoint", &self.remote_endpoint)
            .finish_non_exhaustive()
    }
}

impl AuthenticatedConnection {
    pub fn new(
        stream: impl ByteStream,
        remote_key: PublicKey,
        remote_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            stream: Box::new(stream),
            remote_key,
            remote_endpoint: remote_endpoint.into(),
        }
    }

    pub fn remote_key(&self) -> &PublicKey {
        &self.remote_key
    }

    pub fn remote_endpoint(&self) -> &str {
        &self.remote_endpoint
    }

    /// The remote node, named by its authenticated key.
    pub fn remote_address(&self) -> NodeAddress {
        NodeAddress::new(self.remote_key, self.remote_endpoint.clone())
    }

    /// Split into independently owned read and write halves.
    pub fn into_split(self) -> (ReadHalf<BoxedStream>, WriteHalf<BoxedStream>) {
        tokio::io::split(self.stream)
    }

    pub fn into_stream(self) -> BoxedStream {
        self.stream
    }
}
