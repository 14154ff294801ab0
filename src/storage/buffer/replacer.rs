use super::descriptor::FrameDescriptor;
use std::fmt::Debug;

pub type FrameId = u32;

/// A frame picked by a `Replacer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Victim {
    /// The frame holds no page and can be used as is.
    Free(FrameId),
    /// The frame holds an unpinned page that has to be evicted first.
    Evict(FrameId),
}

impl Victim {
    pub fn frame_id(&self) -> FrameId {
        match *self {
            Victim::Free(frame_id) | Victim::Evict(frame_id) => frame_id,
        }
    }
}

pub trait Replacer: Send + Debug {
    /// Pick a frame to reuse. Returns None if every frame is pinned.
    ///
    /// Only reference bits can be changed through `frames`. The pool rejects a
    /// `Free` frame that holds a page and an `Evict` frame that is not evictable.
    fn select_victim(&mut self, frames: &mut [FrameDescriptor]) -> Option<Victim>;
}

/// Second-chance replacement over a circular sweep of the frame table.
///
/// A referenced frame has its bit cleared and is skipped once; a pinned frame
/// is always skipped. The search gives up after two full turns of the hand.
#[derive(Debug, Default)]
pub struct ClockReplacer {
    hand: usize,
}

impl ClockReplacer {
    pub fn new() -> Self {
        Self { hand: 0 }
    }

    fn advance(&mut self, num_frames: usize) {
        self.hand = (self.hand + 1) % num_frames;
    }
}

impl Replacer for ClockReplacer {
    fn select_victim(&mut self, frames: &mut [FrameDescriptor]) -> Option<Victim> {
        let num_frames = frames.len();
        if num_frames == 0 {
            return None;
        }
        self.hand %= num_frames;

        let mut steps = 0;
        while steps < 2 * num_frames {
            let frame = &mut frames[self.hand];
            let frame_id = frame.frame_id();

            if !frame.is_valid() {
                self.advance(num_frames);
                return Some(Victim::Free(frame_id));
            }

            if frame.is_evictable() {
                self.advance(num_frames);
                return Some(Victim::Evict(frame_id));
            }
            frame.clear_reference();

            self.advance(num_frames);
            steps += 1;
        }

        None
    }
}
