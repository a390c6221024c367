//! Keyframe animation clips and a mixer that plays them on a scene graph.
//!
//! Clips come out of the glTF loader targeting nodes of the loaded model; once the
//! model is grafted into a gallery they are [remapped](AnimationClip::remap) to the
//! gallery's node ids. A [`AnimationMixer`] is usually driven from an animate
//! callback:
//!
//! ```ignore
//! let mut mixer = AnimationMixer::new();
//! mixer.clip_action(&robot.animations[0]).set_duration(5.0).play();
//! gallery.add_animate(move |dt, graph| mixer.update(dt.as_secs_f32(), graph));
//! ```

use std::collections::HashMap;

use cgmath::{InnerSpace, Quaternion, Vector3, VectorSpace};

use crate::data_structures::{
    scene_graph::{NodeId, SceneGraph},
    skin::update_skins,
};

#[derive(Clone, Debug, PartialEq)]
pub enum Keyframes {
    Translation(Vec<Vector3<f32>>),
    Rotation(Vec<Quaternion<f32>>),
    Scale(Vec<Vector3<f32>>),
    /// Morph target weights, not played back.
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Interpolation {
    #[default]
    Linear,
    Step,
}

/// Keyframes for one property of one node.
#[derive(Clone, Debug, PartialEq)]
pub struct Channel {
    pub target: NodeId,
    pub timestamps: Vec<f32>,
    pub keyframes: Keyframes,
    pub interpolation: Interpolation,
}

/// A named animation with keyframes and timing.
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    /// Seconds, the last keyframe of the longest channel.
    pub duration: f32,
    pub channels: Vec<Channel>,
}

impl AnimationClip {
    pub fn new(name: &str, channels: Vec<Channel>) -> Self {
        let duration = channels
            .iter()
            .filter_map(|c| c.timestamps.last().copied())
            .fold(0.0, f32::max);
        Self {
            name: name.to_string(),
            duration,
            channels,
        }
    }

    /// The same clip targeting other node ids. Channels whose target is not in
    /// `mapping` are dropped.
    pub fn remap(&self, mapping: &HashMap<NodeId, NodeId>) -> Self {
        Self {
            name: self.name.clone(),
            duration: self.duration,
            channels: self
                .channels
                .iter()
                .filter_map(|c| {
                    mapping.get(&c.target).map(|&target| Channel {
                        target,
                        ..c.clone()
                    })
                })
                .collect(),
        }
    }

    /// Pose every targeted node as it is at `time` seconds.
    pub fn apply(&self, time: f32, graph: &mut SceneGraph) {
        for channel in &self.channels {
            if !graph.contains(channel.target) {
                continue;
            }
            let Some((i, j, t)) =
                keyframe_span(&channel.timestamps, time, channel.interpolation)
            else {
                continue;
            };
            let local = &mut graph.node_mut(channel.target).local;
            match &channel.keyframes {
                Keyframes::Translation(v) => {
                    if let (Some(a), Some(b)) = (v.get(i), v.get(j)) {
                        local.position = a.lerp(*b, t);
                    }
                }
                Keyframes::Rotation(q) => {
                    if let (Some(a), Some(b)) = (q.get(i), q.get(j)) {
                        let b = if a.dot(*b) < 0.0 { -*b } else { *b };
                        local.rotation = a.slerp(b, t).normalize();
                    }
                }
                Keyframes::Scale(v) => {
                    if let (Some(a), Some(b)) = (v.get(i), v.get(j)) {
                        local.scale = a.lerp(*b, t);
                    }
                }
                Keyframes::Other => {}
            }
        }
    }
}

/// Indices of the keyframes around `time` and the blend factor between them.
fn keyframe_span(
    timestamps: &[f32],
    time: f32,
    interpolation: Interpolation,
) -> Option<(usize, usize, f32)> {
    let last = timestamps.len().checked_sub(1)?;
    if time <= timestamps[0] {
        return Some((0, 0, 0.0));
    }
    if time >= timestamps[last] {
        return Some((last, last, 0.0));
    }
    let next = timestamps.partition_point(|&t| t <= time);
    let prev = next - 1;
    if interpolation == Interpolation::Step {
        return Some((prev, prev, 0.0));
    }
    let span = timestamps[next] - timestamps[prev];
    let t = if span > 0.0 { (time - timestamps[prev]) / span } else { 0.0 };
    Some((prev, next, t))
}

/// Playback state of one clip.
#[derive(Clone, Debug)]
pub struct AnimationAction {
    clip: AnimationClip,
    time: f32,
    time_scale: f32,
    playing: bool,
    looping: bool,
}

impl AnimationAction {
    fn new(clip: AnimationClip) -> Self {
        Self {
            clip,
            time: 0.0,
            time_scale: 1.0,
            playing: false,
            looping: true,
        }
    }

    pub fn play(&mut self) -> &mut Self {
        self.playing = true;
        self
    }

    pub fn stop(&mut self) -> &mut Self {
        self.playing = false;
        self.time = 0.0;
        self
    }

    /// Stretch the clip so one cycle takes `seconds`.
    pub fn set_duration(&mut self, seconds: f32) -> &mut Self {
        if seconds > 0.0 && self.clip.duration > 0.0 {
            self.time_scale = self.clip.duration / seconds;
        }
        self
    }

    pub fn set_loop(&mut self, looping: bool) -> &mut Self {
        self.looping = looping;
        self
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn clip(&self) -> &AnimationClip {
        &self.clip
    }

    fn advance(&mut self, dt: f32) {
        if !self.playing {
            return;
        }
        self.time += dt * self.time_scale;
        let duration = self.clip.duration;
        if self.time > duration {
            if self.looping && duration > 0.0 {
                self.time %= duration;
            } else {
                self.time = duration;
                self.playing = false;
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct AnimationMixer {
    actions: Vec<AnimationAction>,
}

impl AnimationMixer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The action for `clip`, created on first use. Clips are told apart by name.
    pub fn clip_action(&mut self, clip: &AnimationClip) -> &mut AnimationAction {
        let index = match self.actions.iter().position(|a| a.clip.name == clip.name) {
            Some(index) => index,
            None => {
                self.actions.push(AnimationAction::new(clip.clone()));
                self.actions.len() - 1
            }
        };
        &mut self.actions[index]
    }

    /// Advance every playing action by `dt` seconds and pose the graph, skinned
    /// meshes included.
    pub fn update(&mut self, dt: f32, graph: &mut SceneGraph) {
        for action in self.actions.iter_mut().filter(|a| a.playing) {
            action.advance(dt);
            action.clip.apply(action.time, graph);
        }
        update_skins(graph);
    }
}
