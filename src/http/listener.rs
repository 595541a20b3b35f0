//! Listener binding for TCP and Unix domain sockets.
//!
//! An address with the `unix:` prefix binds a Unix socket at the remaining
//! path; anything else is handed to tokio as a `host:port` TCP address. The
//! prefix match is case-sensitive.

use std::fmt;
use std::io;
use std::net::SocketAddr;
#[cfg(unix)]
use std::path::Path;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

use crate::error::Error;

/// Address prefix selecting a Unix domain socket.
pub const UNIX_PREFIX: &str = "unix:";

/// A bound listening socket.
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixSocket),
}

/// Unix listener that unlinks its socket file when dropped.
#[cfg(unix)]
#[derive(Debug)]
pub struct UnixSocket {
    listener: UnixListener,
    path: PathBuf,
}

#[cfg(unix)]
impl Drop for UnixSocket {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove socket file");
            }
        }
    }
}

impl Listener {
    /// Bind a listener for `address`. Failures are returned as-is, never retried.
    pub async fn bind(address: &str) -> Result<Self, Error> {
        if let Some(path) = address.strip_prefix(UNIX_PREFIX) {
            return Self::bind_unix(address, path);
        }

        let listener = TcpListener::bind(address).await.map_err(|source| Error::Bind {
            address: address.to_string(),
            source,
        })?;
        Ok(Self::Tcp(listener))
    }

    #[cfg(unix)]
    fn bind_unix(address: &str, path: &str) -> Result<Self, Error> {
        if path.is_empty() {
            return Err(Error::InvalidAddress(address.to_string()));
        }

        let listener = UnixListener::bind(Path::new(path)).map_err(|source| Error::Bind {
            address: address.to_string(),
            source,
        })?;
        Ok(Self::Unix(UnixSocket {
            listener,
            path: PathBuf::from(path),
        }))
    }

    #[cfg(not(unix))]
    fn bind_unix(address: &str, _path: &str) -> Result<Self, Error> {
        Err(Error::Bind {
            address: address.to_string(),
            source: io::Error::new(
                io::ErrorKind::Unsupported,
                "Unix domain sockets are not supported on this platform",
            ),
        })
    }

    pub fn local_addr(&self) -> io::Result<LocalAddr> {
        match self {
            Self::Tcp(listener) => listener.local_addr().map(LocalAddr::Tcp),
            #[cfg(unix)]
            Self::Unix(socket) => Ok(LocalAddr::Unix(socket.path.clone())),
        }
    }

    /// Accept the next connection. Cancel safe.
    pub async fn accept(&self) -> io::Result<(Stream, Peer)> {
        match self {
            Self::Tcp(listener) => {
                let (stream, addr) = listener.accept().await?;
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!(peer = %addr, error = %e, "Failed to set TCP_NODELAY");
                }
                Ok((Stream::Tcp(stream), Peer::Tcp(addr)))
            }
            #[cfg(unix)]
            Self::Unix(socket) => {
                let (stream, _) = socket.listener.accept().await?;
                Ok((Stream::Unix(stream), Peer::Unix))
            }
        }
    }
}

/// Address a listener ended up bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalAddr {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl LocalAddr {
    pub fn tcp(&self) -> Option<SocketAddr> {
        match self {
            Self::Tcp(addr) => Some(*addr),
            Self::Unix(_) => None,
        }
    }
}

impl fmt::Display for LocalAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "{addr}"),
            Self::Unix(path) => write!(f, "{UNIX_PREFIX}{}", path.display()),
        }
    }
}

/// Remote end of an accepted connection, for logging.
#[derive(Debug, Clone, Copy)]
pub enum Peer {
    Tcp(SocketAddr),
    Unix,
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "{addr}"),
            Self::Unix => f.write_str("unix"),
        }
    }
}

/// An accepted byte stream of either socket family.
#[derive(Debug)]
pub enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_write_vectored(cx, bufs),
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_write_vectored(cx, bufs),
        }
    }

    fn is_write_vectored(&self) -> bool {
        match self {
            Self::Tcp(s) => s.is_write_vectored(),
            #[cfg(unix)]
            Self::Unix(s) => s.is_write_vectored(),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tcp_address_binds_tcp_listener() {
        let listener = Listener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(matches!(listener, Listener::Tcp(_)));
        assert!(addr.tcp().is_some_and(|a| a.ip().is_loopback() && a.port() != 0));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_prefix_binds_at_stripped_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.sock");
        let address = format!("unix:{}", path.display());

        let listener = Listener::bind(&address).await.unwrap();
        assert_eq!(listener.local_addr().unwrap(), LocalAddr::Unix(path.clone()));
        assert!(path.exists());

        drop(listener);
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_prefix_is_case_sensitive() {
        // Not a Unix address, so it goes to the TCP resolver and fails there.
        let err = Listener::bind("UNIX:/tmp/gracehold-case.sock").await.unwrap_err();
        assert!(matches!(err, Error::Bind { .. }));
        assert!(!Path::new("/tmp/gracehold-case.sock").exists());
    }

    #[tokio::test]
    async fn test_empty_unix_path_is_invalid() {
        let err = Listener::bind("unix:").await.unwrap_err();
        if cfg!(unix) {
            assert!(matches!(err, Error::InvalidAddress(_)));
        } else {
            assert!(matches!(err, Error::Bind { .. }));
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_path_in_missing_directory_fails_to_bind() {
        let dir = tempfile::tempdir().unwrap();
        let address = format!("unix:{}", dir.path().join("missing/svc.sock").display());
        let err = Listener::bind(&address).await.unwrap_err();
        match err {
            Error::Bind { address: reported, .. } => assert_eq!(reported, address),
            other => panic!("expected bind error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_occupied_port_fails_to_bind() {
        let first = Listener::bind("127.0.0.1:0").await.unwrap();
        let addr = first.local_addr().unwrap().to_string();
        let err = Listener::bind(&addr).await.unwrap_err();
        match err {
            Error::Bind { source, .. } => assert_eq!(source.kind(), io::ErrorKind::AddrInUse),
            other => panic!("expected bind error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_accept_yields_tcp_stream() {
        let listener = Listener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().tcp().unwrap();

        let client = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (stream, peer) = listener.accept().await.unwrap();
        let _client = client.await.unwrap();

        assert!(matches!(stream, Stream::Tcp(_)));
        assert!(matches!(peer, Peer::Tcp(_)));
    }
}
