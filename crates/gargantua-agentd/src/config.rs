//! Process configuration read from the environment.
use std::{net::SocketAddr, path::PathBuf, str::FromStr};

use gargantua_controllers::{CostConfigError, CostTarget, ControllerConfig, load_targets};
use gargantua_core::{error::CoreError, shard::Shard};
use gargantua_observe::{LogConfig, LogError};
use thiserror::Error;

const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:9090";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}={value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set")]
    Missing(&'static str),

    #[error(transparent)]
    Cost(#[from] CostConfigError),

    #[error(transparent)]
    Shard(#[from] CoreError),

    #[error(transparent)]
    Log(#[from] LogError),
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub controllers: ControllerConfig,
    pub cost_targets: Vec<CostTarget>,
    pub metrics_addr: SocketAddr,
    pub log: LogConfig,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the config from `lookup`; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let mut controllers = ControllerConfig::default();
        if let Some(ns) = get("GARGANTUA_NAMESPACE") {
            controllers.namespace = ns;
        }
        if let Some(prefix) = get("BASENAME_SCHEDULED_PREFIX") {
            controllers.scheduled_prefix = prefix;
        }
        if let Some(prefix) = get("BASENAME_DYNAMIC_PREFIX") {
            controllers.dynamic_prefix = prefix;
        }
        if let Some(workers) = get("GARGANTUA_WORKERS") {
            controllers.workers = parse("GARGANTUA_WORKERS", &workers)?;
            if controllers.workers == 0 {
                return Err(invalid("GARGANTUA_WORKERS", &workers, "must be positive"));
            }
        }

        let replicas: u32 = match get("GARGANTUA_REPLICAS") {
            Some(v) => parse("GARGANTUA_REPLICAS", &v)?,
            None => 1,
        };
        controllers.shard = if replicas <= 1 {
            Shard::single()
        } else {
            let host = get("HOSTNAME").ok_or(ConfigError::Missing("HOSTNAME"))?;
            Shard::from_instance_name(&host, replicas)?
        };

        let cost_targets = match get("COST_RESOURCES_PATH") {
            Some(path) => load_targets(&PathBuf::from(path))?,
            None => Vec::new(),
        };

        let metrics_addr = parse(
            "METRICS_ADDR",
            &get("METRICS_ADDR").unwrap_or_else(|| DEFAULT_METRICS_ADDR.to_string()),
        )?;

        let mut log = LogConfig::default();
        if let Some(filter) = get("LOG_LEVEL") {
            log.filter = filter.parse()?;
        }
        if let Some(format) = get("LOG_FORMAT") {
            log.format = format.parse()?;
        }

        Ok(Self {
            controllers,
            cost_targets,
            metrics_addr,
            log,
        })
    }
}

fn invalid(var: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    value.trim().parse().map_err(|e: T::Err| invalid(var, value, e))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use gargantua_observe::LogFormat;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<AgentConfig, ConfigError> {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AgentConfig::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.controllers.scheduled_prefix, "scheduled");
        assert_eq!(cfg.controllers.dynamic_prefix, "dynamic");
        assert_eq!(cfg.controllers.shard, Shard::single());
        assert!(cfg.cost_targets.is_empty());
        assert_eq!(cfg.metrics_addr.port(), 9090);
        assert_eq!(cfg.log.format, LogFormat::Text);
    }

    #[test]
    fn reads_prefixes_workers_and_log_settings() {
        let cfg = config(&[
            ("BASENAME_SCHEDULED_PREFIX", "lab"),
            ("BASENAME_DYNAMIC_PREFIX", "burst"),
            ("GARGANTUA_NAMESPACE", "workshops"),
            ("GARGANTUA_WORKERS", "8"),
            ("LOG_LEVEL", "gargantua_controllers=debug,info"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();
        assert_eq!(cfg.controllers.scheduled_prefix, "lab");
        assert_eq!(cfg.controllers.dynamic_prefix, "burst");
        assert_eq!(cfg.controllers.namespace, "workshops");
        assert_eq!(cfg.controllers.workers, 8);
        assert_eq!(cfg.log.format, LogFormat::Json);
    }

    #[test]
    fn shard_comes_from_hostname_suffix() {
        let cfg = config(&[("GARGANTUA_REPLICAS", "3"), ("HOSTNAME", "gargantua-2")]).unwrap();
        assert_eq!(cfg.controllers.shard.ordinal(), 2);

        assert!(matches!(
            config(&[("GARGANTUA_REPLICAS", "3")]),
            Err(ConfigError::Missing("HOSTNAME"))
        ));
        assert!(matches!(
            config(&[("GARGANTUA_REPLICAS", "2"), ("HOSTNAME", "gargantua-5")]),
            Err(ConfigError::Shard(_))
        ));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            config(&[("GARGANTUA_WORKERS", "many")]),
            Err(ConfigError::Invalid { var: "GARGANTUA_WORKERS", .. })
        ));
        assert!(matches!(
            config(&[("GARGANTUA_WORKERS", "0")]),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            config(&[("METRICS_ADDR", "not-an-addr")]),
            Err(ConfigError::Invalid { var: "METRICS_ADDR", .. })
        ));
        assert!(matches!(config(&[("LOG_FORMAT", "xml")]), Err(ConfigError::Log(_))));
    }

    #[test]
    fn unreadable_cost_list_is_fatal() {
        let res = config(&[("COST_RESOURCES_PATH", "/nonexistent/gargantua/costs.json")]);
        assert!(matches!(res, Err(ConfigError::Cost(CostConfigError::Read { .. }))));
    }
}
