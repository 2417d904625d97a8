//! The fluid's published outputs.
//!
//! The fluid stage writes the latest velocity and density into a
//! [`FlowMapSlot`] once per frame; consumers (the particle simulation reads
//! velocity, the particle renderer reads density) take a [`FlowMapSnapshot`]
//! afterwards. Each snapshot carries the frame it was published on so a
//! consumer can tell whether it is looking at this frame's fluid.

/// Velocity and density handles published for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowMapSnapshot<T> {
    pub frame: u64,
    pub velocity: T,
    pub density: T,
}

/// Single-producer slot holding the most recent fluid outputs.
///
/// `T` is whatever handle the backend hands out: a cloned [`Field`] on the
/// CPU path, a shared texture view on the GPU path.
///
/// [`Field`]: crate::target::Field
#[derive(Debug, Clone)]
pub struct FlowMapSlot<T> {
    current: Option<FlowMapSnapshot<T>>,
}

impl<T> Default for FlowMapSlot<T> {
    fn default() -> Self {
        Self { current: None }
    }
}

impl<T: Clone> FlowMapSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the published outputs.
    ///
    /// Frame numbers are not required to increase: the frame clock may be
    /// realigned when a new animation is bound.
    pub fn publish(&mut self, frame: u64, velocity: T, density: T) {
        self.current = Some(FlowMapSnapshot {
            frame,
            velocity,
            density,
        });
    }

    /// The latest published outputs, if any.
    pub fn snapshot(&self) -> Option<FlowMapSnapshot<T>> {
        self.current.clone()
    }

    /// The latest outputs only if they were published on `frame`.
    pub fn snapshot_for(&self, frame: u64) -> Option<FlowMapSnapshot<T>> {
        self.current.as_ref().filter(|s| s.frame == frame).cloned()
    }

    pub fn latest_frame(&self) -> Option<u64> {
        self.current.as_ref().map(|s| s.frame)
    }

    /// Drop the published outputs, e.g. after the fluid targets were reallocated.
    pub fn clear(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_slot_has_no_snapshot() {
        let slot: FlowMapSlot<u32> = FlowMapSlot::new();
        assert!(slot.snapshot().is_none());
        assert!(slot.latest_frame().is_none());
    }

    #[test]
    fn test_publish_replaces_snapshot() {
        let mut slot = FlowMapSlot::new();
        slot.publish(1, "v1", "d1");
        slot.publish(2, "v2", "d2");
        let snap = slot.snapshot().unwrap();
        assert_eq!(snap.frame, 2);
        assert_eq!(snap.velocity, "v2");
        assert_eq!(snap.density, "d2");
    }

    #[test]
    fn test_publish_after_clock_realignment() {
        let mut slot = FlowMapSlot::new();
        slot.publish(5, 5, 5);
        slot.publish(1, 1, 1);
        assert_eq!(slot.latest_frame(), Some(1));
    }

    #[test]
    fn test_snapshot_for_frame() {
        let mut slot = FlowMapSlot::new();
        slot.publish(3, 'v', 'd');
        assert!(slot.snapshot_for(3).is_some());
        assert!(slot.snapshot_for(4).is_none());
        slot.clear();
        assert!(slot.snapshot_for(3).is_none());
    }
}
