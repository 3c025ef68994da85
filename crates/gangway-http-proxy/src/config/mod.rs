//! Configuration types for the Gangway proxy.

mod listen;
mod pool;
mod route;

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub use listen::{ListenConfig, MetricsConfig};
pub use pool::ConnectionPoolConfig;
pub use route::{ExcludePattern, RouteConfig};

use crate::route::{RouteOptions, ALL_METHODS};
use crate::router::Router;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub listen: ListenConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,
    /// Proxy routes, tried in file order.
    pub routes: Vec<RouteConfig>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    ///
    /// Route entries are validated by actually compiling them, so a
    /// malformed target or exclusion pattern fails startup rather than the
    /// first matching request.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.routes.is_empty() {
            anyhow::bail!("config must define at least one route");
        }
        self.build_router().map(|_| ())
    }

    /// Compile the route entries into registration calls, in file order.
    pub fn build_router(&self) -> Result<Router, anyhow::Error> {
        let mut router = Router::new();
        for entry in &self.routes {
            let mut exclude_paths = Vec::with_capacity(entry.exclude_paths.len());
            for pattern in &entry.exclude_paths {
                exclude_paths.push(pattern.compile().with_context(|| {
                    format!("invalid exclude pattern in route '{}'", entry.path)
                })?);
            }
            let options = RouteOptions {
                path_mode: entry.path_mode,
                exclude_paths,
                redirect: entry.redirect,
            };
            let methods = entry
                .methods
                .clone()
                .unwrap_or_else(|| ALL_METHODS.to_vec());
            router = router
                .register(methods, &entry.path, &entry.target, options)
                .with_context(|| format!("route '{}'", entry.path))?;
        }
        Ok(router)
    }
}
