//! 进程配置：启动时从环境变量 (及 `.env`) 读取一次。

use std::net::SocketAddr;

use anyhow::{bail, Context};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub store: StoreBackend,
    pub identity_header: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 与 `from_env` 相同的解析规则，键值来源可替换
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse::<SocketAddr>()
            .context("BIND_ADDR 格式错误")?;
        let database_url = get("DATABASE_URL");
        let max_connections = match get("DB_MAX_CONNECTIONS") {
            Some(v) => v.parse::<u32>().context("DB_MAX_CONNECTIONS 必须是正整数")?,
            None => 5,
        };
        let store = match get("STORE_BACKEND").map(|v| v.to_lowercase()).as_deref() {
            Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory,
            Some(other) => bail!("未知的 STORE_BACKEND: {other}"),
            None if database_url.is_some() => StoreBackend::Postgres,
            None => StoreBackend::Memory,
        };
        if store == StoreBackend::Postgres && database_url.is_none() {
            bail!("STORE_BACKEND=postgres 需要设置 DATABASE_URL");
        }
        let identity_header = get("IDENTITY_HEADER").unwrap_or_else(|| "x-user-id".to_string());

        Ok(Self {
            bind_addr,
            database_url,
            max_connections,
            store,
            identity_header,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_defaults_to_memory() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.store, StoreBackend::Memory);
        assert_eq!(cfg.bind_addr, "0.0.0.0:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.max_connections, 5);
        assert_eq!(cfg.identity_header, "x-user-id");
    }

    #[test]
    fn test_database_url_selects_postgres() {
        let cfg = config(&[
            ("DATABASE_URL", "postgres://localhost/plaza"),
            ("DB_MAX_CONNECTIONS", "12"),
        ])
        .unwrap();
        assert_eq!(cfg.store, StoreBackend::Postgres);
        assert_eq!(cfg.max_connections, 12);

        let cfg = config(&[
            ("DATABASE_URL", "postgres://localhost/plaza"),
            ("STORE_BACKEND", "Memory"),
        ])
        .unwrap();
        assert_eq!(cfg.store, StoreBackend::Memory);
    }

    #[test]
    fn test_invalid_values() {
        assert!(config(&[("STORE_BACKEND", "postgres")]).is_err());
        assert!(config(&[("STORE_BACKEND", "redis")]).is_err());
        assert!(config(&[("DB_MAX_CONNECTIONS", "many")]).is_err());
        assert!(config(&[("BIND_ADDR", "localhost")]).is_err());
    }
}
