use crate::transform::TransformComponent;
use bitflags::bitflags;
use glam::{Quat, Vec3};
use lumen_common::Entity;
use lumen_ecs::{ComponentManager, EntityMap, RemapEntities};
use serde::{Deserialize, Serialize};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct AnimationFlags: u32 {
        const PLAYING = 1 << 0;
        const LOOPED = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AnimationPath {
    #[default]
    Translation,
    Rotation,
    Scale,
}

impl AnimationPath {
    /// Floats per keyframe value.
    pub fn stride(self) -> usize {
        match self {
            AnimationPath::Translation | AnimationPath::Scale => 3,
            AnimationPath::Rotation => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SamplerMode {
    #[default]
    Linear,
    Step,
}

/// Binds one sampler to one property of a target entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnimationChannel {
    pub target: Entity,
    pub sampler_index: u32,
    pub path: AnimationPath,
}

/// Keyframes live in a separate [`AnimationDataComponent`] entity so that
/// clips can share them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnimationSampler {
    pub data: Entity,
    pub mode: SamplerMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationComponent {
    pub flags: AnimationFlags,
    pub start: f32,
    pub end: f32,
    pub timer: f32,
    /// Blend weight against the target's current pose.
    pub amount: f32,
    pub speed: f32,
    pub channels: Vec<AnimationChannel>,
    pub samplers: Vec<AnimationSampler>,
}

impl Default for AnimationComponent {
    fn default() -> Self {
        Self {
            flags: AnimationFlags::LOOPED,
            start: 0.0,
            end: 0.0,
            timer: 0.0,
            amount: 1.0,
            speed: 1.0,
            channels: Vec::new(),
            samplers: Vec::new(),
        }
    }
}

impl AnimationComponent {
    pub fn is_playing(&self) -> bool {
        self.flags.contains(AnimationFlags::PLAYING)
    }

    pub fn is_looped(&self) -> bool {
        self.flags.contains(AnimationFlags::LOOPED)
    }

    pub fn play(&mut self) {
        self.flags.insert(AnimationFlags::PLAYING);
    }

    pub fn pause(&mut self) {
        self.flags.remove(AnimationFlags::PLAYING);
    }

    /// Pause and rewind to `start`.
    pub fn stop(&mut self) {
        self.pause();
        self.timer = self.start;
    }

    pub fn set_looped(&mut self, value: bool) {
        self.flags.set(AnimationFlags::LOOPED, value);
    }

    /// Set `start`/`end` to the keyframe time range of every sampler.
    pub fn update_range(&mut self, datas: &ComponentManager<AnimationDataComponent>) {
        let mut start = f32::MAX;
        let mut end = f32::MIN;
        for sampler in &self.samplers {
            let Some(data) = datas.get(sampler.data) else {
                continue;
            };
            if let (Some(first), Some(last)) = (data.keyframe_times.first(), data.keyframe_times.last()) {
                start = start.min(*first);
                end = end.max(*last);
            }
        }
        if start <= end {
            self.start = start;
            self.end = end;
        }
    }

    /// Advance the timer by `dt`, wrapping or clamping at `end`.
    pub fn advance(&mut self, dt: f32) {
        if !self.is_playing() {
            return;
        }
        self.timer += dt * self.speed;
        if self.timer > self.end {
            if self.is_looped() {
                self.timer = self.start;
            } else {
                self.timer = self.end;
                self.pause();
            }
        }
    }
}

impl RemapEntities for AnimationComponent {
    fn remap_entities(&mut self, map: &mut EntityMap) {
        for channel in &mut self.channels {
            channel.target = map.get_or_create(channel.target);
        }
        for sampler in &mut self.samplers {
            sampler.data = map.get_or_create(sampler.data);
        }
    }
}

/// Keyframe times with their flattened values (3 floats for translation
/// and scale, 4 for rotation).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimationDataComponent {
    pub keyframe_times: Vec<f32>,
    pub keyframe_data: Vec<f32>,
}

impl RemapEntities for AnimationDataComponent {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelValue {
    Translation(Vec3),
    Rotation(Quat),
    Scale(Vec3),
}

/// One sampled channel, waiting to be applied to its target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationSample {
    pub target: Entity,
    pub value: ChannelValue,
}

/// Sample `data` at `time`. `None` when there are no keys or the value
/// array is too short for the path.
pub fn sample_channel(
    data: &AnimationDataComponent,
    path: AnimationPath,
    mode: SamplerMode,
    time: f32,
) -> Option<ChannelValue> {
    let times = &data.keyframe_times;
    let last = times.len().checked_sub(1)?;
    let stride = path.stride();
    if data.keyframe_data.len() < times.len() * stride {
        return None;
    }

    let (left, right, t) = if times.len() == 1 || time <= times[0] {
        (0, 0, 0.0)
    } else if time >= times[last] {
        (last, last, 0.0)
    } else {
        let right = times.partition_point(|&k| k <= time);
        let left = right - 1;
        let span = times[right] - times[left];
        let t = if span > 0.0 { (time - times[left]) / span } else { 0.0 };
        (left, right, t)
    };
    let (left, right, t) = match mode {
        SamplerMode::Step => (left, left, 0.0),
        SamplerMode::Linear => (left, right, t),
    };

    let key = |i: usize| &data.keyframe_data[i * stride..(i + 1) * stride];
    let value = match path {
        AnimationPath::Translation | AnimationPath::Scale => {
            let a = Vec3::from_slice(key(left));
            let b = Vec3::from_slice(key(right));
            let v = a.lerp(b, t);
            if path == AnimationPath::Translation {
                ChannelValue::Translation(v)
            } else {
                ChannelValue::Scale(v)
            }
        }
        AnimationPath::Rotation => {
            let a = Quat::from_slice(key(left)).normalize();
            let b = Quat::from_slice(key(right)).normalize();
            ChannelValue::Rotation(a.slerp(b, t).normalize())
        }
    };
    Some(value)
}

/// Sample every channel of `animation` at its current timer.
pub fn sample_animation(
    animation: &AnimationComponent,
    datas: &ComponentManager<AnimationDataComponent>,
) -> Vec<AnimationSample> {
    animation
        .channels
        .iter()
        .filter_map(|channel| {
            let sampler = animation.samplers.get(channel.sampler_index as usize)?;
            let data = datas.get(sampler.data)?;
            let value = sample_channel(data, channel.path, sampler.mode, animation.timer)?;
            Some(AnimationSample {
                target: channel.target,
                value,
            })
        })
        .collect()
}

/// Blend `value` into the locals of `transform` by `amount`.
pub fn apply_sample(transform: &mut TransformComponent, value: ChannelValue, amount: f32) {
    let amount = amount.clamp(0.0, 1.0);
    match value {
        ChannelValue::Translation(v) => {
            transform.translation_local = transform.translation_local.lerp(v, amount);
        }
        ChannelValue::Rotation(q) => {
            transform.rotation_local = transform.rotation_local.slerp(q, amount).normalize();
        }
        ChannelValue::Scale(v) => {
            transform.scale_local = transform.scale_local.lerp(v, amount);
        }
    }
    transform.set_dirty(true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn translation_keys() -> AnimationDataComponent {
        AnimationDataComponent {
            keyframe_times: vec![0.0, 1.0, 3.0],
            keyframe_data: vec![0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 10.0, 20.0, 0.0],
        }
    }

    fn expect_translation(value: Option<ChannelValue>) -> Vec3 {
        match value {
            Some(ChannelValue::Translation(v)) => v,
            other => panic!("expected translation, got {other:?}"),
        }
    }

    #[test]
    fn linear_sampling_interpolates_and_clamps() {
        let data = translation_keys();
        let at = |time| {
            expect_translation(sample_channel(&data, AnimationPath::Translation, SamplerMode::Linear, time))
        };
        assert_eq!(at(-1.0), Vec3::ZERO);
        assert_eq!(at(0.5), Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(at(2.0), Vec3::new(10.0, 10.0, 0.0));
        assert_eq!(at(99.0), Vec3::new(10.0, 20.0, 0.0));
    }

    #[test]
    fn step_sampling_holds_left_key() {
        let data = translation_keys();
        let v = expect_translation(sample_channel(&data, AnimationPath::Translation, SamplerMode::Step, 0.9));
        assert_eq!(v, Vec3::ZERO);
    }

    #[test]
    fn single_key_and_empty_data() {
        let single = AnimationDataComponent {
            keyframe_times: vec![2.0],
            keyframe_data: vec![1.0, 2.0, 3.0],
        };
        let v = expect_translation(sample_channel(&single, AnimationPath::Translation, SamplerMode::Linear, 0.0));
        assert_eq!(v, Vec3::new(1.0, 2.0, 3.0));
        let empty = AnimationDataComponent::default();
        assert!(sample_channel(&empty, AnimationPath::Scale, SamplerMode::Linear, 0.0).is_none());
        // Too few floats for a rotation key.
        assert!(sample_channel(&single, AnimationPath::Rotation, SamplerMode::Linear, 0.0).is_none());
    }

    #[test]
    fn rotation_uses_slerp() {
        let q = Quat::from_rotation_y(FRAC_PI_2);
        let mut keyframe_data = Quat::IDENTITY.to_array().to_vec();
        keyframe_data.extend_from_slice(&q.to_array());
        let data = AnimationDataComponent {
            keyframe_times: vec![0.0, 1.0],
            keyframe_data,
        };
        match sample_channel(&data, AnimationPath::Rotation, SamplerMode::Linear, 0.5) {
            Some(ChannelValue::Rotation(r)) => {
                assert!(r.abs_diff_eq(Quat::from_rotation_y(FRAC_PI_2 * 0.5), 1e-5));
            }
            other => panic!("expected rotation, got {other:?}"),
        }
    }

    #[test]
    fn timer_wraps_or_clamps() {
        let mut anim = AnimationComponent {
            end: 1.0,
            ..Default::default()
        };
        anim.advance(0.5);
        assert_eq!(anim.timer, 0.0, "paused animations do not advance");

        anim.play();
        anim.advance(1.5);
        assert_eq!(anim.timer, anim.start);
        assert!(anim.is_playing());

        anim.set_looped(false);
        anim.advance(1.5);
        assert_eq!(anim.timer, 1.0);
        assert!(!anim.is_playing());

        anim.stop();
        assert_eq!(anim.timer, 0.0);
    }

    #[test]
    fn range_spans_all_samplers() {
        let mut datas = ComponentManager::new();
        let a = Entity::create();
        let b = Entity::create();
        datas.insert(a, translation_keys());
        datas.insert(
            b,
            AnimationDataComponent {
                keyframe_times: vec![-1.0, 0.5],
                keyframe_data: vec![0.0; 6],
            },
        );
        let mut anim = AnimationComponent::default();
        anim.samplers = vec![
            AnimationSampler { data: a, mode: SamplerMode::Linear },
            AnimationSampler { data: b, mode: SamplerMode::Step },
        ];
        anim.update_range(&datas);
        assert_eq!((anim.start, anim.end), (-1.0, 3.0));
    }

    #[test]
    fn samples_blend_by_amount() {
        let mut t = TransformComponent::default();
        t.update_transform();
        apply_sample(&mut t, ChannelValue::Translation(Vec3::new(4.0, 0.0, 0.0)), 0.25);
        assert_eq!(t.translation_local, Vec3::new(1.0, 0.0, 0.0));
        assert!(t.is_dirty());
    }
}
