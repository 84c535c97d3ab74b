use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use super::channel_mapper::ChannelRouting;
use super::types::SoundEvent;

/// Processing callback supplied by the application.
///
/// Receives the interleaved stereo block captured from the device and leaves
/// the block to play back in the same buffer.
pub type ProcessCallback = Box<dyn FnMut(&mut [i16]) + Send + 'static>;

struct BridgeState {
    callback: ProcessCallback,
    routing: Option<ChannelRouting>,
    stereo: Vec<i16>,
    frames: usize,
}

/// Hand-off point between the backend's realtime thread and the application.
///
/// The realtime side only ever calls [`RealtimeBridge::process`], which never
/// blocks: if the control thread holds the lock to reconfigure, the block is
/// rendered as silence and counted as skipped.
pub struct RealtimeBridge {
    active: AtomicBool,
    state: Mutex<BridgeState>,
    events: Sender<SoundEvent>,
    callbacks: AtomicU64,
    skipped: AtomicU64,
}

impl RealtimeBridge {
    pub fn new(callback: ProcessCallback, events: Sender<SoundEvent>) -> Self {
        Self {
            active: AtomicBool::new(false),
            state: Mutex::new(BridgeState {
                callback,
                routing: None,
                stereo: Vec::new(),
                frames: 0,
            }),
            events,
            callbacks: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    /// Size the stereo buffer and install routing. Control thread only.
    pub fn configure(&self, frames: usize, routing: ChannelRouting) {
        let mut state = self.state.lock();
        state.stereo.clear();
        state.stereo.resize(frames * 2, 0);
        state.frames = frames;
        state.routing = Some(routing);
    }

    /// Swap routing without touching the buffer size
    pub fn set_routing(&self, routing: ChannelRouting) {
        self.state.lock().routing = Some(routing);
    }

    pub fn activate(&self) {
        self.active.store(true, Ordering::Release);
    }

    /// Once this returns no processing callback is running or will run
    pub fn deactivate(&self) {
        let _state = self.state.lock();
        self.active.store(false, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Frames per block the bridge expects
    pub fn frames(&self) -> usize {
        self.state.lock().frames
    }

    /// Run one block: device input -> stereo -> callback -> device output.
    ///
    /// `input` holds `frames * input_channels` interleaved samples and `output`
    /// `frames * output_channels`. Returns false when the block was rendered as
    /// silence instead.
    pub fn process(&self, input: &[i16], output: &mut [i16]) -> bool {
        if !self.active.load(Ordering::Acquire) {
            output.fill(0);
            return false;
        }

        let mut guard = match self.state.try_lock() {
            Some(guard) => guard,
            None => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                output.fill(0);
                return false;
            }
        };

        // deactivate() flips the flag under the lock
        if !self.active.load(Ordering::Acquire) {
            output.fill(0);
            return false;
        }

        let state = &mut *guard;
        let routing = match &state.routing {
            Some(routing) => routing,
            None => {
                output.fill(0);
                return false;
            }
        };

        if input.len() != state.frames * routing.input_channels
            || output.len() != state.frames * routing.output_channels
        {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            output.fill(0);
            return false;
        }

        routing.capture(input, &mut state.stereo);
        (state.callback)(&mut state.stereo);
        routing.render(&state.stereo, output);

        self.callbacks.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Forward an event to the control thread; never blocks
    pub fn notify(&self, event: SoundEvent) {
        let _ = self.events.try_send(event);
    }

    /// Blocks handed to the processing callback so far
    pub fn callbacks(&self) -> u64 {
        self.callbacks.load(Ordering::Relaxed)
    }

    /// Blocks rendered as silence because of contention or size mismatch
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}
