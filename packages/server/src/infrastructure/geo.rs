//! IP アドレスからの地理情報の解決とキャッシュ

use std::{collections::HashMap, net::IpAddr, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::{GeoDetails, GeoResolver};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeoLookupError {
    #[error("geo lookup failed: {0}")]
    Lookup(String),
}

/// 地理情報データベースへの問い合わせ
#[async_trait]
pub trait GeoLookup: Send + Sync {
    async fn lookup(&self, ip_address: IpAddr) -> Result<Option<GeoDetails>, GeoLookupError>;
}

/// 結果を IP ごとにキャッシュする解決器
///
/// ループバックアドレスは問い合わせずに固定のレコードを返す。
/// 問い合わせ先がなければ解決は行わない。
pub struct CachingGeoResolver {
    cache: RwLock<HashMap<String, GeoDetails>>,
    lookup: Option<Arc<dyn GeoLookup>>,
}

impl CachingGeoResolver {
    pub fn new(lookup: Arc<dyn GeoLookup>) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            lookup: Some(lookup),
        }
    }

    /// 地理情報データベースなしで動かす
    pub fn disabled() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            lookup: None,
        }
    }
}

fn is_loopback(ip_address: &str) -> bool {
    ip_address == "localhost"
        || ip_address
            .parse::<IpAddr>()
            .is_ok_and(|ip| ip.is_loopback())
}

#[async_trait]
impl GeoResolver for CachingGeoResolver {
    async fn cached(&self, ip_address: &str) -> Option<GeoDetails> {
        if is_loopback(ip_address) {
            return Some(GeoDetails::localhost());
        }
        self.cache.read().await.get(ip_address).cloned()
    }

    async fn resolve(&self, ip_address: &str) -> Option<GeoDetails> {
        if let Some(details) = self.cached(ip_address).await {
            return Some(details);
        }
        let lookup = self.lookup.as_ref()?;
        let ip = match ip_address.parse::<IpAddr>() {
            Ok(ip) => ip,
            Err(_) => {
                tracing::debug!("Not a valid IP address for geo lookup: '{}'", ip_address);
                return None;
            }
        };

        match lookup.lookup(ip).await {
            Ok(Some(details)) => {
                self.cache
                    .write()
                    .await
                    .insert(ip_address.to_string(), details.clone());
                Some(details)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("{}", e);
                None
            }
        }
    }
}
