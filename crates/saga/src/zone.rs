//! Zone and integration-mode resolution with default-zone fallback.

use common::ZoneCode;
use domain::{IntegrationMode, Target, ZoneConfig};
use store::ZoneRepository;

/// A resolved value and whether it came from a fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    pub value: T,
    pub fallback: bool,
}

impl<T> Resolved<T> {
    fn direct(value: T) -> Self {
        Self {
            value,
            fallback: false,
        }
    }

    fn fallback(value: T) -> Self {
        Self {
            value,
            fallback: true,
        }
    }
}

/// Resolves agents to zones and zones to per-target modes.
///
/// Never fails: lookup errors, unknown agents, inactive rows, and missing
/// configs all resolve through the default zone. If the default zone itself
/// has no config, every target resolves to ASYNC.
#[derive(Clone)]
pub struct ZoneResolver<S> {
    store: S,
    default_zone: ZoneCode,
}

impl<S: ZoneRepository> ZoneResolver<S> {
    pub fn new(store: S, default_zone: ZoneCode) -> Self {
        Self {
            store,
            default_zone,
        }
    }

    pub fn default_zone(&self) -> &ZoneCode {
        &self.default_zone
    }

    #[tracing::instrument(skip(self))]
    pub async fn resolve_zone(&self, agent_hrno: Option<&str>) -> Resolved<ZoneCode> {
        let Some(hrno) = agent_hrno else {
            return Resolved::direct(self.default_zone.clone());
        };

        match self.store.agent_zone(hrno).await {
            Ok(Some(agent)) if agent.is_active => Resolved::direct(agent.zone_code),
            Ok(_) => {
                tracing::warn!(agent_hrno = hrno, default_zone = %self.default_zone, "unknown agent, using default zone");
                self.count_fallback("agent");
                Resolved::fallback(self.default_zone.clone())
            }
            Err(e) => {
                tracing::warn!(agent_hrno = hrno, error = %e, "agent lookup failed, using default zone");
                self.count_fallback("agent");
                Resolved::fallback(self.default_zone.clone())
            }
        }
    }

    #[tracing::instrument(skip(self, zone_code), fields(zone_code = %zone_code))]
    pub async fn resolve_config(&self, zone_code: &ZoneCode) -> Resolved<ZoneConfig> {
        if let Some(config) = self.active_config(zone_code).await {
            return Resolved::direct(config);
        }

        if zone_code != &self.default_zone {
            tracing::warn!(default_zone = %self.default_zone, "no zone config, using default zone");
            self.count_fallback("config");
            if let Some(config) = self.active_config(&self.default_zone).await {
                return Resolved::fallback(config);
            }
        }

        tracing::warn!(default_zone = %self.default_zone, "default zone has no config, routing everything ASYNC");
        self.count_fallback("builtin");
        Resolved::fallback(ZoneConfig::uniform(
            self.default_zone.clone(),
            IntegrationMode::Async,
        ))
    }

    pub async fn resolve_mode(&self, zone_code: &ZoneCode, target: Target) -> Resolved<IntegrationMode> {
        let config = self.resolve_config(zone_code).await;
        Resolved {
            value: config.value.mode_for(target),
            fallback: config.fallback,
        }
    }

    async fn active_config(&self, zone_code: &ZoneCode) -> Option<ZoneConfig> {
        match self.store.zone_config(zone_code).await {
            Ok(Some(config)) if config.is_active => Some(config),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(zone_code = %zone_code, error = %e, "zone config lookup failed");
                None
            }
        }
    }

    fn count_fallback(&self, kind: &'static str) {
        metrics::counter!("zone_fallback_total", "kind" => kind).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    use domain::AgentZone;
    use store::InMemoryStore;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn zone(code: &str) -> ZoneCode {
        ZoneCode::parse(code).unwrap()
    }

    fn resolver(store: InMemoryStore) -> ZoneResolver<InMemoryStore> {
        ZoneResolver::new(store, zone("NORTH"))
    }

    #[tokio::test]
    async fn test_known_agent_resolves_directly() {
        let r = resolver(InMemoryStore::with_demo_zones());
        let resolved = r.resolve_zone(Some("HR002")).await;
        assert_eq!(resolved.value, zone("SOUTH"));
        assert!(!resolved.fallback);
    }

    #[tokio::test]
    async fn test_unknown_or_inactive_agent_falls_back() {
        let store = InMemoryStore::with_demo_zones();
        store
            .put_agent(AgentZone {
                hrno: "HR010".into(),
                agent_name: "Retired".into(),
                zone_code: zone("SOUTH"),
                is_active: false,
            })
            .await;
        let r = resolver(store);

        let unknown = r.resolve_zone(Some("HR999")).await;
        assert_eq!(unknown.value, zone("NORTH"));
        assert!(unknown.fallback);

        let inactive = r.resolve_zone(Some("HR010")).await;
        assert_eq!(inactive.value, zone("NORTH"));
        assert!(inactive.fallback);
    }

    #[tokio::test]
    async fn test_walk_in_uses_default_zone_without_fallback() {
        let r = resolver(InMemoryStore::with_demo_zones());
        let resolved = r.resolve_zone(None).await;
        assert_eq!(resolved.value, zone("NORTH"));
        assert!(!resolved.fallback);
    }

    #[tokio::test]
    async fn test_missing_config_uses_default_zone_modes() {
        let r = resolver(InMemoryStore::with_demo_zones());
        let mode = r.resolve_mode(&zone("EAST"), Target::PreAct).await;
        assert_eq!(mode.value, IntegrationMode::Sync);
        assert!(mode.fallback);

        let mode = r.resolve_mode(&zone("SOUTH"), Target::PreAct).await;
        assert_eq!(mode.value, IntegrationMode::Async);
        assert!(!mode.fallback);
    }

    #[tokio::test]
    async fn test_missing_default_config_routes_async() {
        let r = resolver(InMemoryStore::new());
        for target in Target::ALL {
            let mode = r.resolve_mode(&zone("NORTH"), target).await;
            assert_eq!(mode.value, IntegrationMode::Async);
            assert!(mode.fallback);
        }
    }

    #[tokio::test]
    async fn test_default_zone_skips_zone_fallback() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        let _default = tracing::subscriber::set_default(subscriber);

        let r = resolver(InMemoryStore::new());
        r.resolve_config(&zone("NORTH")).await;
        let text = logs.text();
        assert!(text.contains("routing everything ASYNC"));
        assert!(!text.contains("using default zone"));

        r.resolve_config(&zone("EAST")).await;
        assert!(logs.text().contains("no zone config, using default zone"));
    }
}
