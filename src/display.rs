//! Display hand-off: the tracking loop publishes each processed frame to a
//! sink, fire-and-forget.

use crossbeam_channel::{Receiver, Sender};

use crate::camera::Frame;

/// Consumer of processed frames. No backpressure contract: a sink that
/// cannot keep up drops frames, it never stalls the tracking loop.
pub trait DisplaySink: Send {
    fn update_image(&self, frame: Frame);
}

/// Sink forwarding frames over a bounded channel, dropping when full.
pub struct ChannelSink {
    tx: Sender<Frame>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, Receiver<Frame>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self { tx }, rx)
    }
}

impl DisplaySink for ChannelSink {
    fn update_image(&self, frame: Frame) {
        let _ = self.tx.try_send(frame);
    }
}

/// Sink that discards every frame.
pub struct NullSink;

impl DisplaySink for NullSink {
    fn update_image(&self, _frame: Frame) {}
}
