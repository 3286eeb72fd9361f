//! Test doubles and common utilities for engine contract tests
//!
//! The fakes keep their state behind shared handles so a test can hand one
//! copy to the engine and inspect the other afterwards.

#![allow(dead_code)]

use fwsync_core::config::{EngineConfig, FirewallConfig, ProviderConfig};
use fwsync_core::engine::FirewallSelector;
use fwsync_core::error::{Error, Result};
use fwsync_core::traits::{Firewall, FirewallProvider, FirewallProviderFactory, IpSource};
use fwsync_core::{FirewallSyncEngine, MemoryConfigStore, ProviderRegistry};
use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Provider tag the fake cloud registers under
pub const FAKE_PROVIDER: &str = "fake";

/// An IP source whose answer the test controls
#[derive(Clone)]
pub struct ScriptedIpSource {
    ip: Arc<Mutex<Option<IpAddr>>>,
    calls: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl ScriptedIpSource {
    /// Always answer with `ip`
    pub fn new(ip: &str) -> Self {
        Self {
            ip: Arc::new(Mutex::new(Some(ip.parse().unwrap()))),
            calls: Arc::new(AtomicUsize::new(0)),
            delay: None,
        }
    }

    /// Always fail, as if the echo service were unreachable
    pub fn unreachable() -> Self {
        Self {
            ip: Arc::new(Mutex::new(None)),
            calls: Arc::new(AtomicUsize::new(0)),
            delay: None,
        }
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Change the answer for subsequent calls
    pub fn set_ip(&self, ip: &str) {
        *self.ip.lock().unwrap() = Some(ip.parse().unwrap());
    }

    /// Number of discovery calls made
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IpSource for ScriptedIpSource {
    async fn current(&self) -> Result<IpAddr> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let ip = *self.ip.lock().unwrap();
        ip.ok_or_else(|| Error::discovery("connection refused"))
    }
}

/// Shared state of an in-memory cloud
#[derive(Clone, Default)]
pub struct FakeCloud {
    firewalls: Arc<Mutex<Vec<Firewall>>>,
    updates: Arc<Mutex<Vec<(String, Vec<String>)>>>,
    list_calls: Arc<AtomicUsize>,
    get_calls: Arc<AtomicUsize>,
    fail_updates: Arc<AtomicBool>,
    hidden_from_get: Arc<Mutex<Vec<String>>>,
    update_delay: Arc<Mutex<Option<Duration>>>,
}

impl FakeCloud {
    /// A cloud holding firewalls with the given names and no addresses
    pub fn with_firewalls(names: &[&str]) -> Self {
        let cloud = Self::default();
        {
            let mut firewalls = cloud.firewalls.lock().unwrap();
            for (id, name) in names.iter().enumerate() {
                firewalls.push(
                    Firewall::new(*name, Vec::new()).with_metadata("id", id as u64 + 100),
                );
            }
        }
        cloud
    }

    /// Make every subsequent update fail
    pub fn fail_updates(&self) {
        self.fail_updates.store(true, Ordering::SeqCst);
    }

    /// Let updates succeed again
    pub fn heal(&self) {
        self.fail_updates.store(false, Ordering::SeqCst);
    }

    /// Keep listing `name` but answer `get` with not-found
    pub fn hide_from_get(&self, name: &str) {
        self.hidden_from_get.lock().unwrap().push(name.to_string());
    }

    /// Sleep inside every update
    pub fn delay_updates(&self, delay: Duration) {
        *self.update_delay.lock().unwrap() = Some(delay);
    }

    /// Overwrite a firewall's addresses out of band
    pub fn set_addresses(&self, name: &str, addresses: &[&str]) {
        let mut firewalls = self.firewalls.lock().unwrap();
        for fw in firewalls.iter_mut().filter(|fw| fw.name == name) {
            fw.allowed_addresses = addresses.iter().map(|a| a.to_string()).collect();
        }
    }

    /// Addresses currently on `name`
    pub fn addresses(&self, name: &str) -> Vec<String> {
        self.firewalls
            .lock()
            .unwrap()
            .iter()
            .find(|fw| fw.name == name)
            .map(|fw| fw.allowed_addresses.clone())
            .unwrap_or_default()
    }

    /// Every `update` call received, in order
    pub fn updates(&self) -> Vec<(String, Vec<String>)> {
        self.updates.lock().unwrap().clone()
    }

    /// Number of `update` calls received
    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    /// Number of `list` calls received
    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of `get` calls received
    pub fn get_count(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Factory to register with a [`ProviderRegistry`]
    pub fn factory(&self) -> Box<dyn FirewallProviderFactory> {
        Box::new(FakeCloudFactory {
            cloud: self.clone(),
        })
    }
}

struct FakeCloudFactory {
    cloud: FakeCloud,
}

impl FirewallProviderFactory for FakeCloudFactory {
    fn create(&self, _config: &ProviderConfig) -> Result<Box<dyn FirewallProvider>> {
        Ok(Box::new(FakeFirewallProvider {
            cloud: self.cloud.clone(),
        }))
    }
}

/// Provider backed by a [`FakeCloud`]
pub struct FakeFirewallProvider {
    cloud: FakeCloud,
}

#[async_trait::async_trait]
impl FirewallProvider for FakeFirewallProvider {
    async fn list(&self) -> Result<Vec<Firewall>> {
        self.cloud.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.cloud.firewalls.lock().unwrap().clone())
    }

    async fn get(&self, name: &str) -> Result<Firewall> {
        self.cloud.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.cloud.hidden_from_get.lock().unwrap().iter().any(|n| n == name) {
            return Err(Error::not_found(name));
        }
        let matches: Vec<Firewall> = self
            .cloud
            .firewalls
            .lock()
            .unwrap()
            .iter()
            .filter(|fw| fw.name == name)
            .cloned()
            .collect();
        match matches.len() {
            0 => Err(Error::not_found(name)),
            1 => Ok(matches.into_iter().next().unwrap()),
            _ => Err(Error::ambiguous(name)),
        }
    }

    async fn update(&self, name: &str, source_addresses: &[String]) -> Result<()> {
        let delay = *self.cloud.update_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.cloud
            .updates
            .lock()
            .unwrap()
            .push((name.to_string(), source_addresses.to_vec()));

        if self.cloud.fail_updates.load(Ordering::SeqCst) {
            return Err(Error::provider(FAKE_PROVIDER, "backend unavailable"));
        }

        let mut firewalls = self.cloud.firewalls.lock().unwrap();
        let fw = firewalls
            .iter_mut()
            .find(|fw| fw.name == name)
            .ok_or_else(|| Error::not_found(name))?;
        fw.allowed_addresses = source_addresses.to_vec();
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        FAKE_PROVIDER
    }
}

/// Selector that replays a fixed list of answers
#[derive(Default)]
pub struct ScriptedSelector {
    answers: VecDeque<usize>,
    pub offered: Vec<Vec<String>>,
    pub vanished: Vec<String>,
}

impl ScriptedSelector {
    pub fn new(answers: &[usize]) -> Self {
        Self {
            answers: answers.iter().copied().collect(),
            ..Self::default()
        }
    }
}

impl FirewallSelector for ScriptedSelector {
    fn select(&mut self, firewalls: &[Firewall]) -> Result<usize> {
        self.offered
            .push(firewalls.iter().map(|fw| fw.name.clone()).collect());
        self.answers
            .pop_front()
            .ok_or_else(|| Error::invalid_input("selector ran out of answers"))
    }

    fn not_found(&mut self, name: &str) {
        self.vanished.push(name.to_string());
    }
}

/// A record pointing at the fake provider
pub fn fake_record(name: &str, ips: &[&str]) -> FirewallConfig {
    FirewallConfig::new()
        .with_provider(FAKE_PROVIDER)
        .with_firewall(name)
        .with_source_ips(ips.iter().copied())
}

/// Registry with the fake cloud registered
pub fn registry_for(cloud: &FakeCloud) -> ProviderRegistry {
    let registry = ProviderRegistry::new();
    registry.register_provider(FAKE_PROVIDER, cloud.factory());
    registry
}

/// Engine over a memory store, a scripted IP source and a fake cloud
pub fn engine_with(
    store: &MemoryConfigStore,
    ip_source: &ScriptedIpSource,
    cloud: &FakeCloud,
) -> FirewallSyncEngine {
    FirewallSyncEngine::new(
        Box::new(store.clone()),
        Box::new(ip_source.clone()),
        registry_for(cloud),
        EngineConfig::default(),
    )
}

/// Same as [`engine_with`] with a custom per-call timeout
pub fn engine_with_timeout(
    store: &MemoryConfigStore,
    ip_source: &ScriptedIpSource,
    cloud: &FakeCloud,
    timeout: Duration,
) -> FirewallSyncEngine {
    FirewallSyncEngine::new(
        Box::new(store.clone()),
        Box::new(ip_source.clone()),
        registry_for(cloud),
        EngineConfig {
            call_timeout_secs: timeout.as_secs(),
        },
    )
}

/// Owned copies of `items`, for comparing against address lists
pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
