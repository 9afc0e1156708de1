use crate::{CoreError, Result};
use std::fmt;
use std::str::FromStr;

/// Database connection in `user/password@host[:port]/service` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: Option<u16>,
    pub service: String,
}

impl ConnectionDescriptor {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
        port: Option<u16>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            host: host.into(),
            port,
            service: service.into(),
        }
    }

    /// Connection for an instance account, reusing this descriptor's service.
    pub fn for_account(
        &self,
        username: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self::new(username, password, host, Some(port), self.service.clone())
    }
}

impl FromStr for ConnectionDescriptor {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| {
            CoreError::InvalidConnection(format!(
                "{reason}; expected user/password@host[:port]/service"
            ))
        };

        let (username, rest) = s.split_once('/').ok_or_else(|| invalid("missing '/'"))?;
        let (credentials_host, service) = rest
            .rsplit_once('/')
            .ok_or_else(|| invalid("missing service"))?;
        let (password, address) = credentials_host
            .rsplit_once('@')
            .ok_or_else(|| invalid("missing '@'"))?;

        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| invalid(&format!("invalid port '{port}'")))?;
                (host, Some(port))
            }
            None => (address, None),
        };

        if username.is_empty() || host.is_empty() || service.is_empty() {
            return Err(invalid("user, host and service must be non-empty"));
        }

        Ok(Self::new(username, password, host, port, service))
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.username, self.password, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        write!(f, "/{}", self.service)
    }
}
