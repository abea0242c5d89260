// Gapless FIFO playback of AI speech with barge-in support
//
// `PlaybackQueue` is the pure state machine: it decides when a speaking
// episode starts and ends. `PlaybackScheduler` runs it on a task against an
// `AudioSink`, one segment at a time, and reports transitions back over a
// channel.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::sink::AudioSink;

/// Speaking transitions reported by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// First segment of an episode began playing
    SpeakingStarted,
    /// Queue drained naturally after the last segment
    SpeakingEnded,
    /// Episode was cut short and the queue discarded
    Interrupted,
}

/// FIFO of decoded segments plus the "currently playing" flag
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    segments: VecDeque<Vec<f32>>,
    playing: bool,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a segment. Returns true if this starts a new speaking episode.
    pub fn enqueue(&mut self, samples: Vec<f32>) -> bool {
        self.segments.push_back(samples);
        if self.playing {
            false
        } else {
            self.playing = true;
            true
        }
    }

    /// Take the next segment to play
    pub fn next_segment(&mut self) -> Option<Vec<f32>> {
        self.segments.pop_front()
    }

    /// Mark the current segment done. Returns true if the episode just ended.
    pub fn segment_finished(&mut self) -> bool {
        if self.playing && self.segments.is_empty() {
            self.playing = false;
            true
        } else {
            false
        }
    }

    /// Drop everything queued. Returns true if an episode was in progress.
    pub fn interrupt(&mut self) -> bool {
        self.segments.clear();
        std::mem::replace(&mut self.playing, false)
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

enum PlaybackCommand {
    Enqueue(Vec<f32>),
    Interrupt,
    Shutdown,
}

/// Handle to the playback task
pub struct PlaybackScheduler {
    commands: mpsc::UnboundedSender<PlaybackCommand>,
    playing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl PlaybackScheduler {
    pub fn spawn(
        sink: Box<dyn AudioSink>,
        sample_rate: u32,
        events: mpsc::UnboundedSender<PlaybackEvent>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let playing = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run_playback(
            sink,
            sample_rate,
            rx,
            events,
            Arc::clone(&playing),
        ));

        Self {
            commands: tx,
            playing,
            task: Some(task),
        }
    }

    pub fn enqueue(&self, samples: Vec<f32>) {
        if samples.is_empty() {
            return;
        }
        // Flag flips here so callers see it before the task wakes up
        self.playing.store(true, Ordering::SeqCst);
        let _ = self.commands.send(PlaybackCommand::Enqueue(samples));
    }

    /// Stop the current segment and discard the rest of the queue
    pub fn interrupt(&self) {
        let _ = self.commands.send(PlaybackCommand::Interrupt);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    /// Stop playback and wait for the sink to be finalized
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(PlaybackCommand::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Playback task panicked: {}", e);
            }
        }
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        let _ = self.commands.send(PlaybackCommand::Shutdown);
    }
}

async fn run_playback(
    mut sink: Box<dyn AudioSink>,
    sample_rate: u32,
    mut commands: mpsc::UnboundedReceiver<PlaybackCommand>,
    events: mpsc::UnboundedSender<PlaybackEvent>,
    playing: Arc<AtomicBool>,
) {
    let mut queue = PlaybackQueue::new();

    'outer: loop {
        let segment = match queue.next_segment() {
            Some(segment) => segment,
            None => match commands.recv().await {
                Some(PlaybackCommand::Enqueue(samples)) => {
                    if queue.enqueue(samples) {
                        playing.store(true, Ordering::SeqCst);
                        let _ = events.send(PlaybackEvent::SpeakingStarted);
                    }
                    continue;
                }
                Some(PlaybackCommand::Interrupt) => continue,
                Some(PlaybackCommand::Shutdown) | None => break,
            },
        };

        let mut interrupted = false;
        let mut shutdown = false;
        {
            let play = sink.play(&segment, sample_rate);
            tokio::pin!(play);

            loop {
                tokio::select! {
                    result = &mut play => {
                        if let Err(e) = result {
                            warn!("Playback of segment failed: {}", e);
                        }
                        break;
                    }
                    command = commands.recv() => match command {
                        Some(PlaybackCommand::Enqueue(samples)) => {
                            queue.enqueue(samples);
                        }
                        Some(PlaybackCommand::Interrupt) => {
                            interrupted = true;
                            break;
                        }
                        Some(PlaybackCommand::Shutdown) | None => {
                            shutdown = true;
                            break;
                        }
                    },
                }
            }
        }

        if interrupted || shutdown {
            let was_playing = queue.interrupt();
            playing.store(false, Ordering::SeqCst);
            if interrupted && was_playing {
                debug!("Playback interrupted");
                let _ = events.send(PlaybackEvent::Interrupted);
            }
            if shutdown {
                break 'outer;
            }
            continue;
        }

        if queue.segment_finished() {
            playing.store(false, Ordering::SeqCst);
            let _ = events.send(PlaybackEvent::SpeakingEnded);
        }
    }

    if let Err(e) = sink.finish().await {
        warn!("Failed to finish {} sink: {}", sink.name(), e);
    }
}
