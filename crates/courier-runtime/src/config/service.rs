//! Validated service descriptor.
//!
//! The `service` section of the configuration is free-form; a
//! [`ServiceConfigBuilder`] turns it into a [`ServiceInfo`] whose required
//! fields are known to be present.
//!
//! ```rust,ignore
//! let info = ServiceConfigBuilder::new()
//!     .name("reports")
//!     .port(8080)
//!     .address("10.0.0.5")
//!     .build()?;
//! ```

use uuid::Uuid;

use super::error::{ConfigError, ConfigResult};
use super::schema::ServiceConfig;

/// Identity and location of a running service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    /// Service name.
    pub name: String,
    /// Listening port, never zero.
    pub port: u16,
    /// Reachable address.
    pub address: String,
    /// Node label, if any.
    pub node: Option<String>,
    /// Instance id.
    pub id: String,
    /// Service version, possibly empty.
    pub version: String,
}

/// Builder for [`ServiceInfo`].
#[derive(Debug, Clone, Default)]
pub struct ServiceConfigBuilder {
    name: Option<String>,
    port: Option<u16>,
    address: Option<String>,
    node: Option<String>,
    id: Option<String>,
    version: Option<String>,
}

impl ServiceConfigBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from the `service` configuration section.
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            name: Some(config.name.clone()),
            port: Some(config.port),
            address: Some(config.address.clone()),
            node: config.node.clone(),
            id: Some(config.id.clone()),
            version: Some(config.version.clone()),
        }
    }

    /// Sets the service name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the listening port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the reachable address.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Sets the node label.
    pub fn node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    /// Sets the instance id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the service version.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Validates and builds the descriptor.
    ///
    /// Name and address must be non-blank and the port must be non-zero. A
    /// blank id is replaced by a random UUID; a missing version becomes empty.
    pub fn build(self) -> ConfigResult<ServiceInfo> {
        let name = non_blank(self.name).ok_or_else(|| ConfigError::missing_field("service.name"))?;

        let port = match self.port {
            None => return Err(ConfigError::missing_field("service.port")),
            Some(0) => return Err(ConfigError::InvalidPort(0)),
            Some(port) => port,
        };

        let address =
            non_blank(self.address).ok_or_else(|| ConfigError::missing_field("service.address"))?;

        let id = non_blank(self.id).unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(ServiceInfo {
            name,
            port,
            address,
            node: non_blank(self.node),
            id,
            version: self.version.unwrap_or_default(),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_fills_defaults() {
        let info = ServiceConfigBuilder::new()
            .name("reports")
            .port(8080)
            .address("10.0.0.5")
            .build()
            .unwrap();

        assert_eq!(info.name, "reports");
        assert_eq!(info.version, "");
        assert!(info.node.is_none());
        assert!(Uuid::parse_str(&info.id).is_ok());
    }

    #[test]
    fn test_build_rejects_missing_fields() {
        let err = ServiceConfigBuilder::new()
            .name("  ")
            .port(8080)
            .address("a")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref field } if field == "service.name"));

        let err = ServiceConfigBuilder::new()
            .name("svc")
            .port(0)
            .address("a")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort(0)));

        let err = ServiceConfigBuilder::new().name("svc").port(1).build().unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { .. }));
    }

    #[test]
    fn test_from_config_keeps_explicit_id() {
        let config = ServiceConfig {
            name: "svc".into(),
            port: 9000,
            address: "host".into(),
            node: Some("node-1".into()),
            id: "fixed".into(),
            version: "1.2.0".into(),
        };
        let info = ServiceConfigBuilder::from_config(&config).build().unwrap();
        assert_eq!(info.id, "fixed");
        assert_eq!(info.node.as_deref(), Some("node-1"));
        assert_eq!(info.version, "1.2.0");
    }
}
