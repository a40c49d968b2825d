//! セッション単位のメッセージレート制限（トークンバケット）

use std::{num::NonZeroU32, time::Duration};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use thiserror::Error;

/// 1 秒あたりの補充トークン数
pub const DEFAULT_MESSAGES_PER_SECOND: f64 = 0.6;

/// バケットの容量
pub const DEFAULT_BURST: u32 = 5;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RateLimitConfigError {
    #[error("rate must be a positive finite number, got {0}")]
    InvalidRate(f64),

    #[error("burst must be at least 1")]
    ZeroBurst,
}

/// レート制限の設定値
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitSettings {
    pub messages_per_second: f64,
    pub burst: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            messages_per_second: DEFAULT_MESSAGES_PER_SECOND,
            burst: DEFAULT_BURST,
        }
    }
}

impl RateLimitSettings {
    /// governor の Quota に変換する
    pub fn quota(&self) -> Result<Quota, RateLimitConfigError> {
        let rate = self.messages_per_second;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(RateLimitConfigError::InvalidRate(rate));
        }
        let burst = NonZeroU32::new(self.burst).ok_or(RateLimitConfigError::ZeroBurst)?;
        let period = Duration::try_from_secs_f64(1.0 / rate)
            .map_err(|_| RateLimitConfigError::InvalidRate(rate))?;
        let quota = Quota::with_period(period).ok_or(RateLimitConfigError::InvalidRate(rate))?;
        Ok(quota.allow_burst(burst))
    }
}

/// 読み込みループが所有するレートリミッタ
pub struct SessionRateLimiter {
    limiter: DefaultDirectRateLimiter,
}

impl SessionRateLimiter {
    /// 満タンのバケットで開始する
    pub fn new(quota: Quota) -> Self {
        Self {
            limiter: RateLimiter::direct(quota),
        }
    }

    /// トークンを 1 つ消費できれば true
    pub fn allow(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_quota_allows_burst_then_denies() {
        // テスト項目: 既定の設定ではバースト 5 件まで許可し、6 件目を拒否する
        // given (前提条件):
        let quota = RateLimitSettings::default().quota().unwrap();
        let limiter = SessionRateLimiter::new(quota);

        // when (操作):
        let results: Vec<bool> = (0..6).map(|_| limiter.allow()).collect();

        // then (期待する結果):
        assert_eq!(results, vec![true, true, true, true, true, false]);
    }

    #[test]
    fn test_quota_refills_at_configured_rate() {
        // テスト項目: 補充間隔は 1 / rate 秒になる
        // given (前提条件):
        let settings = RateLimitSettings {
            messages_per_second: 0.5,
            burst: 3,
        };

        // when (操作):
        let quota = settings.quota().unwrap();

        // then (期待する結果):
        assert_eq!(quota.replenish_interval(), Duration::from_secs(2));
        assert_eq!(quota.burst_size().get(), 3);
    }

    #[test]
    fn test_limiter_recovers_after_refill_interval() {
        // テスト項目: 補充間隔が経過すると再び許可される
        // given (前提条件):
        let settings = RateLimitSettings {
            messages_per_second: 50.0,
            burst: 1,
        };
        let limiter = SessionRateLimiter::new(settings.quota().unwrap());
        assert!(limiter.allow());
        assert!(!limiter.allow());

        // when (操作):
        std::thread::sleep(Duration::from_millis(60));

        // then (期待する結果):
        assert!(limiter.allow());
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        // テスト項目: 0 以下のレートや 0 のバーストは設定エラーになる
        // given (前提条件):
        let zero_rate = RateLimitSettings {
            messages_per_second: 0.0,
            burst: 5,
        };
        let zero_burst = RateLimitSettings {
            messages_per_second: 1.0,
            burst: 0,
        };

        // when (操作) / then (期待する結果):
        assert_eq!(
            zero_rate.quota().unwrap_err(),
            RateLimitConfigError::InvalidRate(0.0)
        );
        assert_eq!(zero_burst.quota().unwrap_err(), RateLimitConfigError::ZeroBurst);
    }
}
