//! Resource-state tracking for render targets.
//!
//! Passes declare the state they need a target in; the tracker compares it
//! with the state it last recorded and produces the transition. Recorded
//! states persist across frames, so a shadow map left in `ShaderRead` at the
//! end of one frame is transitioned from `ShaderRead` at the start of the
//! next.

use std::collections::HashMap;
use std::fmt;

/// Every render target the frame pipeline writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetId {
    /// The acquired swapchain image.
    Backbuffer,
    SceneDepth,
    /// Shadow map of one shadow slot.
    Shadow(usize),
    /// One face of the reflection cube map.
    ReflectionCube(usize),
    CubeDepth,
    /// View-space normals and depth for ambient occlusion.
    NormalMap,
    /// Ambient occlusion ping-pong maps 0 and 1.
    AmbientMap(usize),
    /// Albedo, normal, position and material targets of the G-buffer.
    GBuffer(usize),
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetId::Backbuffer => write!(f, "backbuffer"),
            TargetId::SceneDepth => write!(f, "scene depth"),
            TargetId::Shadow(i) => write!(f, "shadow map {i}"),
            TargetId::ReflectionCube(face) => write!(f, "reflection cube face {face}"),
            TargetId::CubeDepth => write!(f, "cube depth"),
            TargetId::NormalMap => write!(f, "normal map"),
            TargetId::AmbientMap(i) => write!(f, "ambient map {i}"),
            TargetId::GBuffer(i) => write!(f, "G-buffer {i}"),
        }
    }
}

/// How a target is being used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Contents are undefined (just created, or discarded).
    Undefined,
    RenderTarget,
    DepthWrite,
    ShaderRead,
    Present,
}

/// A state transition of one target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Barrier {
    pub target: TargetId,
    pub from: ResourceState,
    pub to: ResourceState,
}

/// Last known state of every target.
#[derive(Debug, Default, Clone)]
pub struct StateTracker {
    states: HashMap<TargetId, ResourceState>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, target: TargetId) -> ResourceState {
        self.states
            .get(&target)
            .copied()
            .unwrap_or(ResourceState::Undefined)
    }

    /// Records that `target` must be in `state` from now on and returns the
    /// transition, or `None` if it already is.
    pub fn require(&mut self, target: TargetId, state: ResourceState) -> Option<Barrier> {
        let from = self.state(target);
        if from == state {
            return None;
        }
        self.states.insert(target, state);
        Some(Barrier {
            target,
            from,
            to: state,
        })
    }

    /// [`require`](StateTracker::require) for several targets at once.
    pub fn require_all(&mut self, requests: &[(TargetId, ResourceState)]) -> Vec<Barrier> {
        requests
            .iter()
            .filter_map(|&(target, state)| self.require(target, state))
            .collect()
    }

    /// Forgets the contents of `target`, e.g. after it was recreated.
    pub fn discard(&mut self, target: TargetId) {
        self.states.remove(&target);
    }

    /// Forgets every target matching `predicate`.
    pub fn discard_where(&mut self, mut predicate: impl FnMut(TargetId) -> bool) {
        self.states.retain(|&target, _| !predicate(target));
    }
}
