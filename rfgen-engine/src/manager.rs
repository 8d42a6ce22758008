//! Process-wide registry of running generators.

use anyhow::{Result, anyhow};
use log::{info, warn};
use std::collections::BTreeMap;
use std::thread::JoinHandle;

use crate::{Engine, EngineConfig, GeneratorCore, GeneratorHandle};

/// Identifier handed out by a [`GeneratorManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GeneratorId(pub u64);

impl std::fmt::Display for GeneratorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "generator-{}", self.0)
    }
}

struct Managed {
    handle: GeneratorHandle,
    join: JoinHandle<()>,
}

/// Owns every generator engine in the process and the counter used to name
/// them. Ids are never reused.
#[derive(Default)]
pub struct GeneratorManager {
    generators: BTreeMap<GeneratorId, Managed>,
    next_id: u64,
}

impl GeneratorManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an engine for `core` and register it.
    pub fn spawn(&mut self, core: GeneratorCore, config: EngineConfig) -> Result<GeneratorId> {
        let id = GeneratorId(self.next_id);
        let (handle, join) = Engine::spawn(core, config, &id.to_string())?;
        self.next_id += 1;
        self.generators.insert(id, Managed { handle, join });
        info!("Registered {}", id);
        Ok(id)
    }

    pub fn handle(&self, id: GeneratorId) -> Option<&GeneratorHandle> {
        self.generators.get(&id).map(|m| &m.handle)
    }

    pub fn ids(&self) -> Vec<GeneratorId> {
        self.generators.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    /// Stop a generator's engine and wait for it to finish.
    pub fn remove(&mut self, id: GeneratorId) -> Result<()> {
        let managed = self
            .generators
            .remove(&id)
            .ok_or_else(|| anyhow!("Unknown generator: {}", id))?;
        managed.handle.stop();
        managed
            .join
            .join()
            .map_err(|_| anyhow!("Engine thread of {} panicked", id))?;
        info!("Removed {}", id);
        Ok(())
    }

    /// Stop every generator. Reports the first failure after trying all.
    pub fn shutdown_all(&mut self) -> Result<()> {
        let mut first_err = None;
        for id in self.ids() {
            if let Err(e) = self.remove(id) {
                warn!("{}", e);
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl Drop for GeneratorManager {
    fn drop(&mut self) {
        let _ = self.shutdown_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ModelProfile, PortDescriptor, SimulatedLink, Uncalibrated};

    fn core() -> GeneratorCore {
        let (link, _device) = SimulatedLink::new();
        GeneratorCore::new(
            Box::new(ModelProfile::rfg60()),
            Box::new(link),
            Box::new(Uncalibrated),
        )
    }

    #[test]
    fn test_spawn_assigns_fresh_ids() {
        let mut manager = GeneratorManager::new();
        let a = manager.spawn(core(), EngineConfig::default()).unwrap();
        let b = manager.spawn(core(), EngineConfig::default()).unwrap();
        assert_ne!(a, b);
        assert_eq!(manager.ids(), vec![a, b]);

        manager.remove(a).unwrap();
        let c = manager.spawn(core(), EngineConfig::default()).unwrap();
        assert!(c != a && c != b);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_handles_reach_their_engine() {
        let mut manager = GeneratorManager::new();
        let id = manager.spawn(core(), EngineConfig::default()).unwrap();
        let handle = manager.handle(id).unwrap().clone();

        handle
            .connect(PortDescriptor::new("sim0", 0x0483, 0x5740))
            .unwrap();
        assert!(handle.snapshot().unwrap().connected);

        manager.remove(id).unwrap();
        assert!(manager.handle(id).is_none());
        assert!(handle.snapshot().is_err());
    }

    #[test]
    fn test_remove_unknown_id_fails() {
        let mut manager = GeneratorManager::new();
        assert!(manager.remove(GeneratorId(7)).is_err());
        assert_eq!(GeneratorId(7).to_string(), "generator-7");
    }

    #[test]
    fn test_shutdown_all() {
        let mut manager = GeneratorManager::new();
        for _ in 0..3 {
            manager.spawn(core(), EngineConfig::default()).unwrap();
        }
        manager.shutdown_all().unwrap();
        assert!(manager.is_empty());
    }
}
