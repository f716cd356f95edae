// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Structured logging of cache lifecycle events.
//!
//! Every event is emitted as a `tracing` event named `cache.event` with the cache name, the
//! activity and the entry generation it applies to.

use tracing::Level;
use vigil_outcome::Fault;

/// Type alias for cache names used in telemetry.
pub type CacheName = &'static str;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheActivity {
    Computing,
    Settled,
    Discarded,
    Cancelled,
    Faulted,
    Installed,
    Expired,
    ExpiredAll,
    Reclaimed,
}

impl CacheActivity {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Computing => "cache.computing",
            Self::Settled => "cache.settled",
            Self::Discarded => "cache.discarded",
            Self::Cancelled => "cache.cancelled",
            Self::Faulted => "cache.faulted",
            Self::Installed => "cache.installed",
            Self::Expired => "cache.expired",
            Self::ExpiredAll => "cache.expired_all",
            Self::Reclaimed => "cache.reclaimed",
        }
    }

    pub(crate) fn level(self) -> Level {
        match self {
            Self::Computing | Self::Settled | Self::Discarded | Self::Cancelled | Self::Reclaimed => Level::DEBUG,
            Self::Installed | Self::Expired | Self::ExpiredAll => Level::INFO,
            Self::Faulted => Level::ERROR,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CacheTelemetry {
    name: CacheName,
    logs_enabled: bool,
}

impl CacheTelemetry {
    pub(crate) fn new(name: CacheName, logs_enabled: bool) -> Self {
        Self { name, logs_enabled }
    }

    pub(crate) fn name(&self) -> CacheName {
        self.name
    }

    pub(crate) fn record(&self, activity: CacheActivity, generation: u64) {
        if !self.logs_enabled {
            return;
        }

        let cache_name = self.name;
        let activity_name = activity.as_str();

        // The level of a tracing event must be a constant.
        macro_rules! emit_event {
            ($level:ident) => {
                tracing::$level!(
                    cache.name = cache_name,
                    cache.activity = activity_name,
                    cache.generation = generation,
                    "cache.event"
                )
            };
        }

        match activity.level() {
            Level::ERROR => emit_event!(error),
            Level::INFO => emit_event!(info),
            _ => emit_event!(debug),
        }
    }

    pub(crate) fn record_fault(&self, generation: u64, fault: &Fault) {
        if !self.logs_enabled {
            return;
        }

        tracing::error!(
            cache.name = self.name,
            cache.activity = CacheActivity::Faulted.as_str(),
            cache.generation = generation,
            cache.fault = %fault,
            "cache.event"
        );
    }

    pub(crate) fn record_expired_all(&self, count: usize) {
        if !self.logs_enabled {
            return;
        }

        tracing::info!(
            cache.name = self.name,
            cache.activity = CacheActivity::ExpiredAll.as_str(),
            cache.entries = count,
            "cache.event"
        );
    }
}
