/// Runtime - owns the device context, the swapchain and every loaded scene
///
/// Typical frame:
///
/// ```no_run
/// # use ember_engine::ember::{Runtime, Result};
/// # fn frame(runtime: &mut Runtime) -> Result<()> {
/// runtime.process_inspector()?;
/// let stats = runtime.render()?;
/// # let _ = stats;
/// # Ok(())
/// # }
/// ```
///
/// `render` completes finished asynchronous computes of every loaded scene,
/// flushes the active scene's dirty uniforms, then draws and presents it. An
/// out-of-date swapchain is recreated transparently.

use std::sync::Arc;
use slotmap::{new_key_type, SlotMap};

use crate::commands::{ComputeRequest, ComputeRunner, DispatchOutcome};
use crate::compiler::{DataScene, FrameStats};
use crate::config::Config;
use crate::device::{Device, Swapchain};
use crate::error::{Error, Result};
use crate::frame::{FrameDriver, FrameOutcome};
use crate::inspector::{
    apply_update, inspector_channel, InspectorClient, InspectorEvent, InspectorLink, InspectorRequest,
    SceneSnapshot,
};
use crate::engine::Engine;
use crate::memory::GpuContext;
use crate::scene::Scene;
use crate::{engine_info, engine_warn};

const SOURCE: &str = "ember::Runtime";

new_key_type! {
    /// Identifies a loaded scene
    pub struct SceneHandle;
}

struct LoadedScene {
    scene: Scene,
    data: DataScene,
    computes: ComputeRunner,
}

struct AttachedInspector {
    link: InspectorLink,
    scene: SceneHandle,
}

pub struct Runtime {
    ctx: Arc<GpuContext>,
    swapchain: Box<dyn Swapchain>,
    frames: FrameDriver,
    scenes: SlotMap<SceneHandle, LoadedScene>,
    active: Option<SceneHandle>,
    inspector: Option<AttachedInspector>,
    stats: FrameStats,
}

impl Runtime {
    pub fn new(device: Arc<dyn Device>, swapchain: Box<dyn Swapchain>, config: Config) -> Result<Self> {
        Engine::set_log_level(config.log_level);
        let frames = FrameDriver::new(device.clone(), &config, swapchain.image_count())?;
        let ctx = Arc::new(GpuContext::new(device, config));
        engine_info!(SOURCE, "Runtime ready for '{}' ({} swapchain images)",
            ctx.config.app_name, swapchain.image_count());
        Ok(Self {
            ctx,
            swapchain,
            frames,
            scenes: SlotMap::with_key(),
            active: None,
            inspector: None,
            stats: FrameStats::default(),
        })
    }

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    pub fn swapchain(&self) -> &dyn Swapchain {
        self.swapchain.as_ref()
    }

    // ===== SCENES =====

    /// Compile `scene` and keep it loaded; the first loaded scene becomes active
    pub fn load(&mut self, mut scene: Scene) -> Result<SceneHandle> {
        let data = DataScene::setup(
            self.ctx.clone(),
            &mut scene,
            self.swapchain.render_pass(),
            self.swapchain.image_count(),
        )?;
        if let Some(hook) = scene.take_initialized_hook() {
            hook(&mut scene);
        }

        let name = scene.name.clone();
        let computes = ComputeRunner::new(self.ctx.device.clone());
        let handle = self.scenes.insert(LoadedScene { scene, data, computes });
        if self.active.is_none() {
            self.active = Some(handle);
        }
        engine_info!(SOURCE, "Loaded scene '{}'", name);
        Ok(handle)
    }

    pub fn activate(&mut self, handle: SceneHandle) -> Result<()> {
        if !self.scenes.contains_key(handle) {
            return Err(Error::SceneNotLoaded);
        }
        self.active = Some(handle);
        Ok(())
    }

    pub fn active(&self) -> Option<SceneHandle> {
        self.active
    }

    /// Release every device resource of a scene and give the scene back
    pub fn unload(&mut self, handle: SceneHandle) -> Result<Scene> {
        let mut entry = self.scenes.remove(handle).ok_or(Error::SceneNotLoaded)?;
        if self.active == Some(handle) {
            self.active = None;
        }
        if self.inspector.as_ref().is_some_and(|i| i.scene == handle) {
            self.inspector = None;
        }

        let finished = entry.computes.wait_all(&mut entry.data, &mut entry.scene);
        entry.computes.destroy();
        entry.data.destroy();
        entry.scene.untrack_all();
        finished?;

        engine_info!(SOURCE, "Unloaded scene '{}'", entry.scene.name);
        Ok(entry.scene)
    }

    pub fn scene(&self, handle: SceneHandle) -> Option<&Scene> {
        self.scenes.get(handle).map(|e| &e.scene)
    }

    pub fn scene_mut(&mut self, handle: SceneHandle) -> Option<&mut Scene> {
        self.scenes.get_mut(handle).map(|e| &mut e.scene)
    }

    pub fn data(&self, handle: SceneHandle) -> Option<&DataScene> {
        self.scenes.get(handle).map(|e| &e.data)
    }

    // ===== FRAME =====

    /// Flush, draw and present the active scene
    pub fn render(&mut self) -> Result<FrameStats> {
        let handle = self.active.ok_or(Error::SceneNotLoaded)?;
        for (_, entry) in self.scenes.iter_mut() {
            entry.computes.poll(&mut entry.data, &mut entry.scene)?;
        }

        let LoadedScene { scene, data, .. } = self.scenes.get_mut(handle).ok_or(Error::SceneNotLoaded)?;
        data.update(scene)?;
        let outcome = self.frames.draw_frame(self.swapchain.as_mut(), |index, target| {
            data.record(scene, index, target)
        })?;
        self.stats = data.stats();

        if outcome == FrameOutcome::OutOfDate {
            let extent = self.swapchain.extent();
            self.resize(extent.width, extent.height)?;
        }
        Ok(self.stats)
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let image_count = self.frames.resize(self.swapchain.as_mut(), width, height)?;
        for (_, entry) in self.scenes.iter_mut() {
            entry.data.resize_targets(image_count)?;
        }
        Ok(())
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn frame_count(&self) -> u64 {
        self.frames.frame_count()
    }

    // ===== COMPUTE =====

    pub fn compute(&mut self, handle: SceneHandle, request: ComputeRequest) -> Result<DispatchOutcome> {
        let entry = self.scenes.get_mut(handle).ok_or(Error::SceneNotLoaded)?;
        entry.computes.dispatch(&mut entry.data, &mut entry.scene, request)
    }

    // ===== INSPECTOR =====

    /// Connect a debug inspector to a loaded scene; it receives a snapshot first
    pub fn attach_inspector(&mut self, handle: SceneHandle) -> Result<InspectorClient> {
        let entry = self.scenes.get(handle).ok_or(Error::SceneNotLoaded)?;
        let (link, client) = inspector_channel();
        link.send(InspectorEvent::Scene(SceneSnapshot::capture(&entry.scene)));
        self.inspector = Some(AttachedInspector { link, scene: handle });
        Ok(client)
    }

    /// Apply pending inspector requests; returns the number of accepted updates
    pub fn process_inspector(&mut self) -> Result<usize> {
        let Some(attached) = &self.inspector else {
            return Ok(0);
        };
        let (requests, connected) = attached.link.drain();
        let mut applied = 0;

        if let Some(entry) = self.scenes.get_mut(attached.scene) {
            for request in requests {
                let event = match request {
                    InspectorRequest::Snapshot => InspectorEvent::Scene(SceneSnapshot::capture(&entry.scene)),
                    InspectorRequest::UpdateUniform { component_type, id, uniform, field, value } => {
                        match apply_update(&mut entry.scene, &entry.data, component_type, id, &uniform, &field, &value) {
                            Ok(()) => {
                                applied += 1;
                                InspectorEvent::Applied { component_type, id, uniform, field }
                            }
                            Err(e) => {
                                engine_warn!(SOURCE, "Inspector update rejected: {}", e);
                                InspectorEvent::Rejected { reason: e.to_string() }
                            }
                        }
                    }
                };
                attached.link.send(event);
            }
        }

        if !connected {
            engine_info!(SOURCE, "Inspector disconnected");
            self.inspector = None;
        }
        Ok(applied)
    }

    // ===== SHUTDOWN =====

    /// Unload every scene and release the frame resources
    pub fn shutdown(&mut self) {
        let handles: Vec<SceneHandle> = self.scenes.keys().collect();
        for handle in handles {
            if let Err(e) = self.unload(handle) {
                engine_warn!(SOURCE, "Scene teardown reported: {}", e);
            }
        }
        self.frames.destroy();
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
