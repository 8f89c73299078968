//! Renderable scenery objects built from placement records.

use std::fmt;
use std::sync::{Arc, Mutex};

use glam::{Mat4, Vec3};
use railview_coords::{TileCoord, WorldPosition};
use railview_render::{
    Material, MaterialKind, MaterialLibrary, RenderFrame, RenderPrimitive, RenderPrimitiveGroup,
    ShapeFlags,
};
use railview_track::TrackMesh;

use crate::context::{ControlState, MeshPrimitive, SceneryContext, SharedShape, SignalState};
use crate::error::SceneryObjectError;
use crate::record::Placement;

/// Something a world file draws every frame.
pub trait SceneryObject: Send + Sync + fmt::Debug {
    fn prepare_frame(&self, frame: &mut RenderFrame, elapsed: f64);

    /// Short name of the object type, for logs and counts.
    fn name(&self) -> &'static str;

    /// Shape the object draws, if it draws one.
    fn shape(&self) -> Option<&Arc<SharedShape>> {
        None
    }
}

/// Position on `tile` without re-homing it, so tile-local transforms stay valid.
pub(crate) fn tile_position(tile: TileCoord, location: Vec3) -> WorldPosition {
    WorldPosition { tile, location }
}

fn shadow_flags(placement: &Placement) -> ShapeFlags {
    if placement.casts_shadow {
        ShapeFlags::SHADOW_CASTER
    } else {
        ShapeFlags::empty()
    }
}

/// A shape drawn where it was placed.
#[derive(Debug)]
pub struct StaticShape {
    shape: Arc<SharedShape>,
    location: WorldPosition,
    transform: Mat4,
    flags: ShapeFlags,
    view_distance: f32,
}

impl StaticShape {
    pub fn new(shape: Arc<SharedShape>, tile: TileCoord, placement: &Placement, viewing_distance: f32) -> Self {
        Self {
            shape,
            location: tile_position(tile, placement.position),
            transform: placement.transform(),
            flags: shadow_flags(placement),
            view_distance: placement.view_distance.unwrap_or(viewing_distance),
        }
    }

    pub fn location(&self) -> &WorldPosition {
        &self.location
    }

    /// Tile-local placement transform.
    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    pub fn flags(&self) -> ShapeFlags {
        self.flags
    }

    pub fn view_distance(&self) -> f32 {
        self.view_distance
    }

    fn draw(&self, frame: &mut RenderFrame, pose: impl Fn(usize) -> Mat4) {
        for (index, part) in self.shape.parts.iter().enumerate() {
            frame.add_auto_primitive(
                &self.location,
                self.shape.radius,
                self.view_distance,
                &part.material,
                &part.primitive,
                RenderPrimitiveGroup::World,
                &(self.transform * pose(index)),
                self.flags,
            );
        }
    }
}

impl SceneryObject for StaticShape {
    fn prepare_frame(&self, frame: &mut RenderFrame, _elapsed: f64) {
        self.draw(frame, |index| self.shape.parts[index].transform);
    }

    fn name(&self) -> &'static str {
        "static"
    }

    fn shape(&self) -> Option<&Arc<SharedShape>> {
        Some(&self.shape)
    }
}

/// A shape whose animated parts loop over their keyframes.
#[derive(Debug)]
pub struct AnimatedShape {
    inner: StaticShape,
    frame_rate: f32,
    name: &'static str,
}

impl AnimatedShape {
    pub fn new(inner: StaticShape, frame_rate: f32) -> Self {
        Self {
            inner,
            frame_rate,
            name: "animated",
        }
    }

    /// Same object under another name, e.g. for hazards.
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Keyframe position of a part with `keyframes` poses at `elapsed` seconds.
    pub fn keyframe_at(&self, keyframes: usize, elapsed: f64) -> f32 {
        if keyframes < 2 {
            return 0.0;
        }
        let span = (keyframes - 1) as f64;
        (elapsed * self.frame_rate as f64).rem_euclid(span) as f32
    }
}

impl SceneryObject for AnimatedShape {
    fn prepare_frame(&self, frame: &mut RenderFrame, elapsed: f64) {
        let parts = &self.inner.shape.parts;
        self.inner.draw(frame, |index| {
            let part = &parts[index];
            part.transform_at(self.keyframe_at(part.keyframes.len(), elapsed))
        });
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn shape(&self) -> Option<&Arc<SharedShape>> {
        Some(&self.inner.shape)
    }
}

/// What a [`ControlledShape`] is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlKind {
    Switch,
    LevelCrossing,
    Pickup,
}

impl ControlKind {
    /// Seconds to travel between the two positions.
    pub const fn travel_time(self) -> f32 {
        match self {
            ControlKind::Switch => 1.0,
            ControlKind::LevelCrossing => 8.0,
            ControlKind::Pickup => 2.0,
        }
    }
}

#[derive(Debug, Default)]
struct Motion {
    position: f32,
    last_elapsed: Option<f64>,
}

/// A shape animated between two positions by live simulation state.
///
/// The animated parts play from their first keyframe (released) to their
/// last (engaged), moving toward the commanded state at a fixed rate.
#[derive(Debug)]
pub struct ControlledShape {
    inner: StaticShape,
    state: Arc<ControlState>,
    kind: ControlKind,
    motion: Mutex<Motion>,
}

impl ControlledShape {
    pub fn new(inner: StaticShape, state: Arc<ControlState>, kind: ControlKind) -> Self {
        let position = if state.is_engaged() { 1.0 } else { 0.0 };
        Self {
            inner,
            state,
            kind,
            motion: Mutex::new(Motion {
                position,
                last_elapsed: None,
            }),
        }
    }

    pub fn kind(&self) -> ControlKind {
        self.kind
    }

    /// Current position between released (0) and engaged (1).
    pub fn position(&self) -> f32 {
        self.motion.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).position
    }

    fn advance(&self, elapsed: f64) -> f32 {
        let mut motion = self.motion.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let dt = motion.last_elapsed.map_or(0.0, |last| (elapsed - last).max(0.0)) as f32;
        motion.last_elapsed = Some(elapsed);
        let target = if self.state.is_engaged() { 1.0 } else { 0.0 };
        let step = dt / self.kind.travel_time();
        motion.position = if target > motion.position {
            (motion.position + step).min(target)
        } else {
            (motion.position - step).max(target)
        };
        motion.position
    }
}

impl SceneryObject for ControlledShape {
    fn prepare_frame(&self, frame: &mut RenderFrame, elapsed: f64) {
        let position = self.advance(elapsed);
        let parts = &self.inner.shape.parts;
        self.inner.draw(frame, |index| {
            let part = &parts[index];
            let last = part.keyframes.len().saturating_sub(1) as f32;
            part.transform_at(position * last)
        });
    }

    fn name(&self) -> &'static str {
        match self.kind {
            ControlKind::Switch => "switch",
            ControlKind::LevelCrossing => "level crossing",
            ControlKind::Pickup => "pickup",
        }
    }

    fn shape(&self) -> Option<&Arc<SharedShape>> {
        Some(&self.inner.shape)
    }
}

/// A signal post whose lit heads glow in the light pass.
#[derive(Debug)]
pub struct SignalShape {
    inner: StaticShape,
    heads: Vec<usize>,
    state: Option<Arc<SignalState>>,
    light: Arc<dyn Material>,
}

impl SignalShape {
    /// Fails if a head names a part the shape does not have.
    pub fn new(
        inner: StaticShape,
        heads: &[u32],
        state: Option<Arc<SignalState>>,
        materials: &dyn MaterialLibrary,
    ) -> Result<Self, SceneryObjectError> {
        let parts = inner.shape.parts.len();
        let heads = heads
            .iter()
            .map(|&head| {
                if (head as usize) < parts {
                    Ok(head as usize)
                } else {
                    Err(SceneryObjectError::InvalidSignalHead {
                        path: inner.shape.path.clone(),
                        head,
                        parts,
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            inner,
            heads,
            state,
            light: materials.material(MaterialKind::Other, "signal-light", true),
        })
    }

    pub fn heads(&self) -> &[usize] {
        &self.heads
    }
}

impl SceneryObject for SignalShape {
    fn prepare_frame(&self, frame: &mut RenderFrame, elapsed: f64) {
        self.inner.prepare_frame(frame, elapsed);
        let Some(state) = &self.state else {
            return;
        };
        for (index, &head) in self.heads.iter().enumerate() {
            if !state.is_lit(index) {
                continue;
            }
            let part = &self.inner.shape.parts[head];
            frame.add_auto_primitive(
                &self.inner.location,
                self.inner.shape.radius,
                self.inner.view_distance,
                &self.light,
                &part.primitive,
                RenderPrimitiveGroup::Lights,
                &(self.inner.transform * part.transform),
                ShapeFlags::empty(),
            );
        }
    }

    fn name(&self) -> &'static str {
        "signal"
    }

    fn shape(&self) -> Option<&Arc<SharedShape>> {
        Some(&self.inner.shape)
    }
}

/// A textured quad laid flat on the ground.
#[derive(Debug)]
pub struct TransferDecal {
    location: WorldPosition,
    transform: Mat4,
    radius: f32,
    view_distance: f32,
    material: Arc<dyn Material>,
    primitive: Arc<dyn RenderPrimitive>,
}

impl TransferDecal {
    pub fn new(
        tile: TileCoord,
        placement: &Placement,
        texture: &str,
        width: f32,
        height: f32,
        context: &SceneryContext,
    ) -> Result<Self, SceneryObjectError> {
        if width <= 0.0 || height <= 0.0 {
            return Err(SceneryObjectError::EmptyGeometry { what: "transfer" });
        }
        let (hw, hh) = (width * 0.5, height * 0.5);
        let mut mesh = TrackMesh::default();
        mesh.append_quad(
            [
                Vec3::new(-hw, 0.0, -hh),
                Vec3::new(hw, 0.0, -hh),
                Vec3::new(hw, 0.0, hh),
                Vec3::new(-hw, 0.0, hh),
            ],
            Vec3::Y,
        );
        let buffer = mesh.upload(context.allocator.as_ref(), texture);
        Ok(Self {
            location: tile_position(tile, placement.position),
            transform: placement.transform(),
            radius: hw.hypot(hh),
            view_distance: placement.view_distance.unwrap_or(context.settings.viewing_distance),
            material: context.materials.material(MaterialKind::Scenery, texture, true),
            primitive: Arc::new(MeshPrimitive::new(buffer)),
        })
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }
}

impl SceneryObject for TransferDecal {
    fn prepare_frame(&self, frame: &mut RenderFrame, _elapsed: f64) {
        frame.add_auto_primitive(
            &self.location,
            self.radius,
            self.view_distance,
            &self.material,
            &self.primitive,
            RenderPrimitiveGroup::World,
            &self.transform,
            ShapeFlags::AUTO_Z_BIAS,
        );
    }

    fn name(&self) -> &'static str {
        "transfer"
    }
}

/// Text drawn by the label material.
#[derive(Debug)]
pub struct LabelPrimitive {
    pub text: String,
}

impl RenderPrimitive for LabelPrimitive {}

/// Floating text: siding and platform names, speed limits.
#[derive(Debug)]
pub struct TextLabel {
    location: WorldPosition,
    primitive: Arc<LabelPrimitive>,
    material: Arc<dyn Material>,
    view_distance: f32,
}

impl TextLabel {
    pub fn new(
        location: WorldPosition,
        text: impl Into<String>,
        materials: &dyn MaterialLibrary,
        view_distance: f32,
    ) -> Self {
        Self {
            location,
            primitive: Arc::new(LabelPrimitive { text: text.into() }),
            material: materials.material(MaterialKind::Other, "labels", true),
            view_distance,
        }
    }

    pub fn text(&self) -> &str {
        &self.primitive.text
    }

    pub fn location(&self) -> &WorldPosition {
        &self.location
    }
}

impl SceneryObject for TextLabel {
    fn prepare_frame(&self, frame: &mut RenderFrame, _elapsed: f64) {
        let primitive: Arc<dyn RenderPrimitive> = Arc::clone(&self.primitive) as Arc<dyn RenderPrimitive>;
        frame.add_auto_primitive(
            &self.location,
            1.0,
            self.view_distance,
            &self.material,
            &primitive,
            RenderPrimitiveGroup::Labels,
            &Mat4::from_translation(self.location.location),
            ShapeFlags::empty(),
        );
    }

    fn name(&self) -> &'static str {
        "label"
    }
}

/// Height of the first limit label above the post origin, meters.
const SPEED_LABEL_HEIGHT: f32 = 3.0;
const SPEED_LABEL_SPACING: f32 = 0.6;

/// A speed post with its limits written above it.
#[derive(Debug)]
pub struct SpeedPostShape {
    inner: StaticShape,
    labels: Vec<TextLabel>,
}

impl SpeedPostShape {
    pub fn new(inner: StaticShape, limits: &[f32], materials: &dyn MaterialLibrary) -> Self {
        let labels = limits
            .iter()
            .enumerate()
            .map(|(index, limit)| {
                let height = SPEED_LABEL_HEIGHT + index as f32 * SPEED_LABEL_SPACING;
                let location = tile_position(
                    inner.location.tile,
                    inner.location.location + Vec3::Y * height,
                );
                TextLabel::new(location, format!("{limit:.0}"), materials, inner.view_distance)
            })
            .collect();
        Self { inner, labels }
    }

    pub fn labels(&self) -> &[TextLabel] {
        &self.labels
    }
}

impl SceneryObject for SpeedPostShape {
    fn prepare_frame(&self, frame: &mut RenderFrame, elapsed: f64) {
        self.inner.prepare_frame(frame, elapsed);
        for label in &self.labels {
            label.prepare_frame(frame, elapsed);
        }
    }

    fn name(&self) -> &'static str {
        "speed post"
    }

    fn shape(&self) -> Option<&Arc<SharedShape>> {
        Some(&self.inner.shape)
    }
}

/// Road traffic source; the simulation spawns cars from it.
#[derive(Clone, Debug, PartialEq)]
pub struct CarSpawnerDef {
    pub uid: u32,
    pub location: WorldPosition,
    pub list: String,
    /// Cars per minute.
    pub frequency: f32,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::context::{
        MemoryTrackDatabase, NullSoundSink, PlaceholderShapeLibrary, ScenerySettings, ShapeLibrary,
    };
    use railview_render::{
        Camera, DrawLog, FrameSettings, HeadlessMaterialLibrary, HeadlessShadowMapMaterial,
        HostBufferAllocator, RenderPrimitiveSequence,
    };

    pub(crate) fn context(log: &DrawLog) -> SceneryContext {
        let materials: Arc<dyn MaterialLibrary> = Arc::new(HeadlessMaterialLibrary::new(log.clone()));
        let allocator = Arc::new(HostBufferAllocator);
        SceneryContext {
            settings: ScenerySettings::default(),
            shapes: Arc::new(PlaceholderShapeLibrary::new(Arc::clone(&materials), allocator.clone())),
            tracks: Arc::new(MemoryTrackDatabase::new()),
            sounds: Arc::new(NullSoundSink),
            materials,
            allocator,
            terrain: None,
        }
    }

    /// A frame looking north across the origin of tile (0, 0).
    pub(crate) fn frame(log: &DrawLog) -> RenderFrame {
        let mut frame = RenderFrame::new(
            FrameSettings::default(),
            Arc::new(HeadlessShadowMapMaterial::new(log.clone())),
        );
        let camera = Camera::looking_at(
            WorldPosition::new(TileCoord::new(0, 0), Vec3::new(0.0, 20.0, 200.0)),
            Vec3::new(0.0, -0.1, -1.0),
        );
        frame.set_camera(&camera);
        frame.prepare_frame(0.0, Vec3::new(0.3, 1.0, 0.2));
        frame
    }

    fn static_shape(context: &SceneryContext, path: &str) -> StaticShape {
        let shape = context.shapes.shape(path).unwrap();
        StaticShape::new(shape, TileCoord::new(0, 0), &Placement::new(1, Vec3::ZERO), 2000.0)
    }

    #[test]
    fn test_static_shape_registers_every_part() {
        let log = DrawLog::default();
        let context = context(&log);
        let mut frame = frame(&log);
        static_shape(&context, "hut.s").prepare_frame(&mut frame, 0.0);
        let parts = context.shapes.shape("hut.s").unwrap().parts.len();
        assert_eq!(frame.stats().total_items(), parts);
    }

    #[test]
    fn test_animated_shape_loops() {
        let log = DrawLog::default();
        let context = context(&log);
        let animated = AnimatedShape::new(static_shape(&context, "mill.s"), 2.0);
        assert_eq!(animated.keyframe_at(1, 10.0), 0.0);
        assert!((animated.keyframe_at(3, 0.25) - 0.5).abs() < 1e-6);
        // Two keyframe spans at two frames per second wrap every second.
        assert!((animated.keyframe_at(3, 1.25) - 0.5).abs() < 1e-6);
        assert_eq!(animated.named("hazard").name(), "hazard");
    }

    #[test]
    fn test_controlled_shape_travels_toward_state() {
        let log = DrawLog::default();
        let context = context(&log);
        let state = Arc::new(ControlState::new(false));
        let switch = ControlledShape::new(static_shape(&context, "points.s"), Arc::clone(&state), ControlKind::Switch);
        let mut frame = frame(&log);
        switch.prepare_frame(&mut frame, 0.0);
        assert_eq!(switch.position(), 0.0);

        state.set_engaged(true);
        switch.prepare_frame(&mut frame, 0.5);
        assert!((switch.position() - 0.5).abs() < 1e-6);
        switch.prepare_frame(&mut frame, 3.0);
        assert_eq!(switch.position(), 1.0);

        state.set_engaged(false);
        switch.prepare_frame(&mut frame, 3.25);
        assert!((switch.position() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_signal_rejects_unknown_head() {
        let log = DrawLog::default();
        let context = context(&log);
        let result = SignalShape::new(static_shape(&context, "sig.s"), &[1, 9], None, context.materials.as_ref());
        assert!(matches!(
            result,
            Err(SceneryObjectError::InvalidSignalHead { head: 9, .. })
        ));
    }

    #[test]
    fn test_lit_heads_draw_in_light_pass() {
        let log = DrawLog::default();
        let context = context(&log);
        let state = Arc::new(SignalState::new(0b01));
        let signal = SignalShape::new(
            static_shape(&context, "sig.s"),
            &[1, 2],
            Some(state),
            context.materials.as_ref(),
        )
        .unwrap();
        let mut frame = frame(&log);
        signal.prepare_frame(&mut frame, 0.0);
        assert_eq!(frame.blended_items(RenderPrimitiveSequence::Lights).len(), 1);
    }

    #[test]
    fn test_transfer_is_z_biased_and_blended() {
        let log = DrawLog::default();
        let context = context(&log);
        let decal = TransferDecal::new(
            TileCoord::new(0, 0),
            &Placement::new(4, Vec3::ZERO),
            "platform.ace",
            6.0,
            8.0,
            &context,
        )
        .unwrap();
        assert!((decal.radius() - 5.0).abs() < 1e-5);
        let mut frame = frame(&log);
        decal.prepare_frame(&mut frame, 0.0);
        let blended = frame.blended_items(RenderPrimitiveSequence::WorldBlended);
        assert_eq!(blended.len(), 1);
        assert!(blended[0].flags.contains(ShapeFlags::AUTO_Z_BIAS));

        assert!(matches!(
            TransferDecal::new(TileCoord::new(0, 0), &Placement::new(5, Vec3::ZERO), "x", 0.0, 1.0, &context),
            Err(SceneryObjectError::EmptyGeometry { .. })
        ));
    }

    #[test]
    fn test_speed_post_labels_stack_upward() {
        let log = DrawLog::default();
        let context = context(&log);
        let post = SpeedPostShape::new(static_shape(&context, "post.s"), &[80.0, 120.0], context.materials.as_ref());
        let texts: Vec<_> = post.labels().iter().map(TextLabel::text).collect();
        assert_eq!(texts, ["80", "120"]);
        assert!(post.labels()[1].location().location.y > post.labels()[0].location().location.y);

        let mut frame = frame(&log);
        post.prepare_frame(&mut frame, 0.0);
        assert_eq!(frame.blended_items(RenderPrimitiveSequence::Labels).len(), 2);
    }
}
