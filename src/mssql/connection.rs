use tiberius::{Client, Config};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::util::{Result, SyncError};

pub type MssqlClient = Client<Compat<TcpStream>>;

/// Where and how to reach the target database. Credentials are optional;
/// without them the connection falls back to integrated security.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub server: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub trust_cert: bool,
}

impl ConnectionInfo {
    /// ADO.NET-style connection string tiberius parses directly.
    pub fn ado_string(&self) -> String {
        let mut parts = vec![
            format!("Server={}", self.server),
            format!("Database={}", self.database),
        ];
        match (&self.username, &self.password) {
            (Some(user), Some(password)) => {
                parts.push(format!("User Id={user}"));
                parts.push(format!("Password={password}"));
            }
            _ => parts.push("Integrated Security=true".to_string()),
        }
        if self.trust_cert {
            parts.push("TrustServerCertificate=true".to_string());
        }
        parts.join(";")
    }

    pub fn connection_error(&self, message: impl ToString) -> SyncError {
        SyncError::Connection {
            server: self.server.clone(),
            database: self.database.clone(),
            message: message.to_string(),
        }
    }
}

/// Opens a TDS session against `info`. Every failure along the way maps to
/// [`SyncError::Connection`] so callers see one error shape.
pub async fn connect(info: &ConnectionInfo) -> Result<MssqlClient> {
    let config =
        Config::from_ado_string(&info.ado_string()).map_err(|e| info.connection_error(e))?;
    let tcp = TcpStream::connect(config.get_addr())
        .await
        .map_err(|e| info.connection_error(e))?;
    tcp.set_nodelay(true)
        .map_err(|e| info.connection_error(e))?;
    Client::connect(config, tcp.compat_write())
        .await
        .map_err(|e| info.connection_error(e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ado_string_with_credentials() {
        let info = ConnectionInfo {
            server: "sql01".into(),
            database: "Northwind".into(),
            username: Some("deploy".into()),
            password: Some("s3cret".into()),
            trust_cert: false,
        };
        assert_eq!(
            info.ado_string(),
            "Server=sql01;Database=Northwind;User Id=deploy;Password=s3cret"
        );
    }

    #[test]
    fn ado_string_without_credentials_uses_integrated_security() {
        let info = ConnectionInfo {
            server: "sql01".into(),
            database: "Northwind".into(),
            username: None,
            password: None,
            trust_cert: true,
        };
        assert_eq!(
            info.ado_string(),
            "Server=sql01;Database=Northwind;Integrated Security=true;TrustServerCertificate=true"
        );
    }
}
