//! A recording backend and materials that draw nothing.
//!
//! Used by the viewer when no GPU is requested and by tests: every backend
//! and material call is appended to a shared [`DrawLog`] so the submission
//! order of a frame can be inspected.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rustc_hash::FxHashMap;

use crate::material::{
    Material, MaterialId, MaterialKind, MaterialLibrary, ShadowMapMaterial, ShadowMapMode,
    TextureId, ViewMatrices,
};
use crate::primitive::RenderItem;
use crate::render_frame::FrameBackend;
use crate::sequence::RenderPrimitiveSequence;

/// One recorded call.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawEvent {
    BeginShadowMap(usize),
    EndShadowMap(usize),
    BlurShadowMap(usize),
    ShadowState(ShadowMapMode),
    ShadowRender { mode: ShadowMapMode, items: usize },
    ShadowReset,
    BeginMain,
    BeginSequence { sequence: RenderPrimitiveSequence, distant: bool },
    ClearDepth,
    EndMain,
    SetState { material: String, previous: Option<String> },
    Render { material: String, items: usize, sort_indices: Vec<i32> },
    ResetState { material: String },
}

/// Shared, append-only list of [`DrawEvent`]s.
#[derive(Clone, Debug, Default)]
pub struct DrawLog {
    events: Arc<Mutex<Vec<DrawEvent>>>,
}

impl DrawLog {
    fn lock(&self) -> MutexGuard<'_, Vec<DrawEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, event: DrawEvent) {
        self.lock().push(event);
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<DrawEvent> {
        std::mem::take(&mut *self.lock())
    }

    /// Copy of everything recorded so far.
    pub fn snapshot(&self) -> Vec<DrawEvent> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// [`FrameBackend`] that only records.
#[derive(Clone, Debug, Default)]
pub struct RecordingBackend {
    log: DrawLog,
}

impl RecordingBackend {
    pub fn new(log: DrawLog) -> Self {
        Self { log }
    }

    pub fn log(&self) -> &DrawLog {
        &self.log
    }
}

impl FrameBackend for RecordingBackend {
    fn begin_shadow_map(&mut self, cascade: usize) {
        self.log.push(DrawEvent::BeginShadowMap(cascade));
    }

    fn end_shadow_map(&mut self, cascade: usize) {
        self.log.push(DrawEvent::EndShadowMap(cascade));
    }

    fn blur_shadow_map(&mut self, cascade: usize) {
        self.log.push(DrawEvent::BlurShadowMap(cascade));
    }

    fn begin_main(&mut self) {
        self.log.push(DrawEvent::BeginMain);
    }

    fn begin_sequence(&mut self, sequence: RenderPrimitiveSequence, distant: bool) {
        self.log.push(DrawEvent::BeginSequence { sequence, distant });
    }

    fn clear_depth(&mut self) {
        self.log.push(DrawEvent::ClearDepth);
    }

    fn end_main(&mut self) {
        self.log.push(DrawEvent::EndMain);
    }
}

/// A material that records its calls.
#[derive(Debug)]
pub struct HeadlessMaterial {
    id: MaterialId,
    name: String,
    kind: MaterialKind,
    blending: bool,
    shadow_texture: Option<TextureId>,
    log: DrawLog,
}

impl HeadlessMaterial {
    pub fn new(id: MaterialId, name: &str, kind: MaterialKind, blending: bool, log: DrawLog) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind,
            blending,
            shadow_texture: None,
            log,
        }
    }

    /// Attach the texture the shadow pass samples for alpha testing.
    pub fn with_shadow_texture(mut self, texture: TextureId) -> Self {
        self.shadow_texture = Some(texture);
        self
    }
}

impl Material for HeadlessMaterial {
    fn id(&self) -> MaterialId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> MaterialKind {
        self.kind
    }

    fn blending(&self) -> bool {
        self.blending
    }

    fn set_state(&self, previous: Option<&dyn Material>) {
        self.log.push(DrawEvent::SetState {
            material: self.name.clone(),
            previous: previous.map(|m| m.name().to_string()),
        });
    }

    fn render(&self, items: &[RenderItem], _matrices: &ViewMatrices) {
        self.log.push(DrawEvent::Render {
            material: self.name.clone(),
            items: items.len(),
            sort_indices: items.iter().map(|i| i.primitive.sort_index()).collect(),
        });
    }

    fn reset_state(&self) {
        self.log.push(DrawEvent::ResetState {
            material: self.name.clone(),
        });
    }

    fn shadow_texture(&self) -> Option<TextureId> {
        self.shadow_texture
    }
}

/// Shadow material that records the bound mode with every render.
#[derive(Debug, Default)]
pub struct HeadlessShadowMapMaterial {
    mode: Mutex<Option<ShadowMapMode>>,
    log: DrawLog,
}

impl HeadlessShadowMapMaterial {
    pub fn new(log: DrawLog) -> Self {
        Self {
            mode: Mutex::new(None),
            log,
        }
    }

    fn mode(&self) -> MutexGuard<'_, Option<ShadowMapMode>> {
        self.mode.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ShadowMapMaterial for HeadlessShadowMapMaterial {
    fn set_state(&self, mode: ShadowMapMode) {
        *self.mode() = Some(mode);
        self.log.push(DrawEvent::ShadowState(mode));
    }

    fn render(&self, items: &[RenderItem], _matrices: &ViewMatrices) {
        let mode = self.mode().unwrap_or(ShadowMapMode::Normal);
        self.log.push(DrawEvent::ShadowRender {
            mode,
            items: items.len(),
        });
    }

    fn reset_state(&self) {
        *self.mode() = None;
        self.log.push(DrawEvent::ShadowReset);
    }
}

type MaterialKey = (MaterialKind, String, bool);

/// Deduplicating [`MaterialLibrary`] handing out [`HeadlessMaterial`]s.
#[derive(Debug, Default)]
pub struct HeadlessMaterialLibrary {
    log: DrawLog,
    next_id: AtomicU64,
    materials: Mutex<FxHashMap<MaterialKey, Arc<HeadlessMaterial>>>,
}

impl HeadlessMaterialLibrary {
    pub fn new(log: DrawLog) -> Self {
        Self {
            log,
            next_id: AtomicU64::new(1),
            materials: Mutex::new(FxHashMap::default()),
        }
    }

    /// Number of distinct materials created so far.
    pub fn len(&self) -> usize {
        self.materials
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MaterialLibrary for HeadlessMaterialLibrary {
    fn material(&self, kind: MaterialKind, name: &str, blending: bool) -> Arc<dyn Material> {
        let mut materials = self
            .materials
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = materials
            .entry((kind, name.to_string(), blending))
            .or_insert_with(|| {
                let id = MaterialId(self.next_id.fetch_add(1, Ordering::Relaxed));
                Arc::new(HeadlessMaterial::new(id, name, kind, blending, self.log.clone()))
            });
        Arc::clone(entry) as Arc<dyn Material>
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_deduplicates() {
        let library = HeadlessMaterialLibrary::new(DrawLog::default());
        let a = library.material(MaterialKind::Scenery, "brick.ace", false);
        let b = library.material(MaterialKind::Scenery, "brick.ace", false);
        let c = library.material(MaterialKind::Scenery, "brick.ace", true);
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert_eq!(library.len(), 2);
    }

    #[test]
    fn test_log_take_empties() {
        let log = DrawLog::default();
        let mut backend = RecordingBackend::new(log.clone());
        backend.begin_main();
        backend.end_main();
        assert_eq!(log.take(), vec![DrawEvent::BeginMain, DrawEvent::EndMain]);
        assert!(log.is_empty());
    }

    #[test]
    fn test_shadow_material_records_mode() {
        let log = DrawLog::default();
        let shadow = HeadlessShadowMapMaterial::new(log.clone());
        shadow.set_state(ShadowMapMode::Forest);
        shadow.render(&[], &ViewMatrices::default());
        shadow.reset_state();
        assert_eq!(
            log.snapshot(),
            vec![
                DrawEvent::ShadowState(ShadowMapMode::Forest),
                DrawEvent::ShadowRender {
                    mode: ShadowMapMode::Forest,
                    items: 0
                },
                DrawEvent::ShadowReset,
            ]
        );
    }
}
