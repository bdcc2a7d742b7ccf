//! Admission control: keyed token buckets per (principal, endpoint class).

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use tracing::warn;

use lclip_models::PrincipalId;

use crate::config::ApiConfig;
use crate::error::ApiError;

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Endpoint classes with independent rate buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    Submit,
    Progress,
    Status,
    Results,
    Admin,
}

impl EndpointClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::Submit => "submit",
            EndpointClass::Progress => "progress",
            EndpointClass::Status => "status",
            EndpointClass::Results => "results",
            EndpointClass::Admin => "admin",
        }
    }
}

/// Token buckets per endpoint class, keyed by principal.
pub struct QuotaGate {
    limiters: HashMap<EndpointClass, (u32, Arc<KeyedLimiter>)>,
    clock: DefaultClock,
}

impl QuotaGate {
    pub fn new(config: &ApiConfig) -> Self {
        let classes = [
            (EndpointClass::Submit, config.rate_limit_submit_per_minute),
            (EndpointClass::Progress, config.rate_limit_progress_per_minute),
            (EndpointClass::Status, config.rate_limit_status_per_minute),
            (EndpointClass::Results, config.rate_limit_results_per_minute),
            (EndpointClass::Admin, config.rate_limit_admin_per_minute),
        ];

        let mut limiters = HashMap::new();
        for (class, per_minute) in classes {
            let rate = NonZeroU32::new(per_minute.max(1)).expect("nonzero rate");
            limiters.insert(
                class,
                (
                    per_minute,
                    Arc::new(RateLimiter::keyed(Quota::per_minute(rate))),
                ),
            );
        }

        Self {
            limiters,
            clock: DefaultClock::default(),
        }
    }

    /// Admit or reject one request.
    pub fn check(&self, class: EndpointClass, principal: &PrincipalId) -> Result<(), ApiError> {
        let (limit, limiter) = self
            .limiters
            .get(&class)
            .expect("every endpoint class has a limiter");

        match limiter.check_key(&principal.as_str().to_string()) {
            Ok(()) => Ok(()),
            Err(not_until) => {
                let retry_after_secs = not_until
                    .wait_time_from(self.clock.now())
                    .as_secs()
                    .max(1);
                warn!(
                    principal = %principal,
                    class = class.as_str(),
                    "Rate limit exceeded"
                );
                crate::metrics::record_rate_limit_hit(class.as_str());
                Err(ApiError::RateLimited {
                    limit: *limit,
                    retry_after_secs,
                    detail: format!(
                        "Rate limit exceeded for {} requests. Please try again later.",
                        class.as_str()
                    ),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(submit_per_minute: u32) -> QuotaGate {
        let config = ApiConfig {
            rate_limit_submit_per_minute: submit_per_minute,
            ..ApiConfig::default()
        };
        QuotaGate::new(&config)
    }

    #[test]
    fn test_bucket_exhaustion_yields_429() {
        let gate = gate(2);
        let principal = PrincipalId::new("user-1");

        assert!(gate.check(EndpointClass::Submit, &principal).is_ok());
        assert!(gate.check(EndpointClass::Submit, &principal).is_ok());

        let err = gate.check(EndpointClass::Submit, &principal).unwrap_err();
        match err {
            ApiError::RateLimited {
                limit,
                retry_after_secs,
                ..
            } => {
                assert_eq!(limit, 2);
                assert!(retry_after_secs >= 1);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_buckets_isolated_by_principal() {
        let gate = gate(1);
        let a = PrincipalId::new("user-a");
        let b = PrincipalId::new("user-b");

        assert!(gate.check(EndpointClass::Submit, &a).is_ok());
        assert!(gate.check(EndpointClass::Submit, &a).is_err());
        // A different principal still has its own budget
        assert!(gate.check(EndpointClass::Submit, &b).is_ok());
    }

    #[test]
    fn test_buckets_isolated_by_class() {
        let gate = gate(1);
        let principal = PrincipalId::new("user-1");

        assert!(gate.check(EndpointClass::Submit, &principal).is_ok());
        assert!(gate.check(EndpointClass::Submit, &principal).is_err());
        // The status class bucket is untouched
        assert!(gate.check(EndpointClass::Status, &principal).is_ok());
    }
}
