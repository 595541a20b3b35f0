//! Service endpoint descriptor.

use std::path::{Path, PathBuf};

use crate::error::Error;

/// Where to listen and whether to terminate TLS.
///
/// Empty certificate or key paths count as absent, so values taken straight
/// from configuration strings behave the same as `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    address: String,
    cert_path: Option<PathBuf>,
    key_path: Option<PathBuf>,
}

/// Transport security chosen for an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Security {
    Plain,
    Tls { cert: PathBuf, key: PathBuf },
}

impl Endpoint {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            cert_path: None,
            key_path: None,
        }
    }

    pub fn with_tls(mut self, cert: impl AsRef<Path>, key: impl AsRef<Path>) -> Self {
        self.cert_path = non_empty(cert.as_ref());
        self.key_path = non_empty(key.as_ref());
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Plain when neither path is set, TLS when both are.
    ///
    /// A lone certificate or key is rejected rather than guessed at.
    pub fn security(&self) -> Result<Security, Error> {
        match (&self.cert_path, &self.key_path) {
            (None, None) => Ok(Security::Plain),
            (Some(cert), Some(key)) => Ok(Security::Tls {
                cert: cert.clone(),
                key: key.clone(),
            }),
            (cert, key) => Err(Error::IncompleteTls {
                cert: cert.clone(),
                key: key.clone(),
            }),
        }
    }
}

fn non_empty(path: &Path) -> Option<PathBuf> {
    (!path.as_os_str().is_empty()).then(|| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_paths_is_plain() {
        let endpoint = Endpoint::new("127.0.0.1:8080").with_tls("", "");
        assert_eq!(endpoint.security().unwrap(), Security::Plain);
    }

    #[test]
    fn test_both_paths_is_tls() {
        let endpoint = Endpoint::new("127.0.0.1:8443").with_tls("cert.pem", "key.pem");
        assert_eq!(
            endpoint.security().unwrap(),
            Security::Tls {
                cert: PathBuf::from("cert.pem"),
                key: PathBuf::from("key.pem"),
            }
        );
    }

    #[test]
    fn test_lone_certificate_is_rejected() {
        let endpoint = Endpoint::new("127.0.0.1:8443").with_tls("cert.pem", "");
        match endpoint.security() {
            Err(Error::IncompleteTls { cert, key }) => {
                assert_eq!(cert, Some(PathBuf::from("cert.pem")));
                assert_eq!(key, None);
            }
            other => panic!("expected IncompleteTls, got {other:?}"),
        }
    }

    #[test]
    fn test_lone_key_is_rejected() {
        let endpoint = Endpoint::new("127.0.0.1:8443").with_tls("", "key.pem");
        assert!(matches!(endpoint.security(), Err(Error::IncompleteTls { .. })));
    }
}
