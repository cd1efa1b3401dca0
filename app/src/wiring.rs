//! Constructs and starts every core service in the dependency order of
//! spec §2's table, and tears them down in reverse.

use std::sync::Arc;

use cantina_audio_coord::AudioCoordinator;
use cantina_bus::{EventBus, Registry};
use cantina_dispatch::Dispatcher;
use cantina_dj::DjCoordinator;
use cantina_memory::MemoryStore;
use cantina_mode::ModeManager;
use cantina_service::{start_service, ServiceHandle};
use cantina_timeline::TimelineExecutor;

use crate::config::Config;

/// A running core: the bus plus every service handle, kept so `shutdown`
/// can stop them in reverse start order.
pub struct Core {
    pub bus: Arc<EventBus>,
    pub memory: Arc<MemoryStore>,
    pub mode_manager: Arc<ModeManager>,
    pub dj: Arc<DjCoordinator>,
    pub audio: Arc<AudioCoordinator>,
    handles: Vec<ServiceHandle>,
}

impl Core {
    /// Stop every service in reverse start order, then let the memory
    /// store snapshot on its own `on_stop` hook.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        for handle in self.handles.into_iter().rev() {
            handle.stop().await?;
        }
        Ok(())
    }
}

pub async fn start(config: &Config) -> anyhow::Result<Core> {
    let bus = EventBus::shared(Arc::new(Registry::build()));
    let mut handles = Vec::new();

    let memory = match &config.memory_snapshot_path {
        Some(path) => Arc::new(MemoryStore::with_snapshot(path.clone())),
        None => Arc::new(MemoryStore::in_memory()),
    };
    handles.push(start_service(memory.clone(), bus.clone()).await?);

    let mode_manager = ModeManager::new();
    handles.push(start_service(mode_manager.clone(), bus.clone()).await?);

    let dispatcher = Dispatcher::new();
    handles.push(start_service(dispatcher, bus.clone()).await?);

    let timeline_executor = TimelineExecutor::new();
    handles.push(start_service(timeline_executor, bus.clone()).await?);

    let dj = DjCoordinator::new(config.track_library.clone(), memory.clone());
    handles.push(start_service(dj.clone(), bus.clone()).await?);

    let audio = AudioCoordinator::new();
    handles.push(start_service(audio.clone(), bus.clone()).await?);

    Ok(Core { bus, memory, mode_manager, dj, audio, handles })
}
