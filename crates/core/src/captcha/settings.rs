use serde::{Deserialize, Serialize};

/// Operator-tunable pool sizing. Every field is clamped to at least 1 on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptchaPoolSettings {
    /// Lead time before the earliest rush deadline at which the pool activates.
    #[serde(default = "default_warmup")]
    pub warmup_seconds: i64,
    /// Number of tokens the maintainer keeps ready.
    #[serde(default = "default_pool_size")]
    pub pool_size: i64,
    /// Lifetime of a solved token.
    #[serde(default = "default_item_ttl")]
    pub item_ttl_seconds: i64,
}

fn default_warmup() -> i64 {
    30
}

fn default_pool_size() -> i64 {
    2
}

fn default_item_ttl() -> i64 {
    120
}

impl Default for CaptchaPoolSettings {
    fn default() -> Self {
        Self {
            warmup_seconds: default_warmup(),
            pool_size: default_pool_size(),
            item_ttl_seconds: default_item_ttl(),
        }
    }
}

impl CaptchaPoolSettings {
    pub fn normalized(self) -> Self {
        Self {
            warmup_seconds: self.warmup_seconds.max(1),
            pool_size: self.pool_size.max(1),
            item_ttl_seconds: self.item_ttl_seconds.max(1),
        }
    }

    pub fn warmup_ms(&self) -> i64 {
        self.warmup_seconds.saturating_mul(1000)
    }

    pub fn ttl_ms(&self) -> i64 {
        self.item_ttl_seconds.saturating_mul(1000)
    }

    pub fn desired_size(&self) -> usize {
        usize::try_from(self.pool_size.max(1)).unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = CaptchaPoolSettings::default();
        assert_eq!(settings.warmup_seconds, 30);
        assert_eq!(settings.pool_size, 2);
        assert_eq!(settings.item_ttl_seconds, 120);
    }

    #[test]
    fn test_normalize_clamps_every_field() {
        let inputs = [
            (0, 0, 0),
            (-5, -1, -100),
            (i64::MIN, 3, 0),
            (10, i64::MIN, 7),
            (45, 4, 300),
        ];
        for (warmup, size, ttl) in inputs {
            let settings = CaptchaPoolSettings {
                warmup_seconds: warmup,
                pool_size: size,
                item_ttl_seconds: ttl,
            }
            .normalized();
            assert!(settings.warmup_seconds >= 1);
            assert!(settings.pool_size >= 1);
            assert!(settings.item_ttl_seconds >= 1);
        }
    }

    #[test]
    fn test_normalize_keeps_valid_values() {
        let settings = CaptchaPoolSettings {
            warmup_seconds: 45,
            pool_size: 4,
            item_ttl_seconds: 300,
        };
        assert_eq!(settings.normalized(), settings);
        assert_eq!(settings.warmup_ms(), 45_000);
        assert_eq!(settings.desired_size(), 4);
    }

    #[test]
    fn test_partial_deserialize() {
        let settings: CaptchaPoolSettings = serde_json::from_str(r#"{"pool_size": 5}"#).unwrap();
        assert_eq!(settings.pool_size, 5);
        assert_eq!(settings.warmup_seconds, 30);
    }
}
