use crate::geometry::JogDirection;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    W,
    A,
    S,
    D,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub shift: bool,
}

impl KeyEvent {
    pub fn new(key: Key) -> KeyEvent {
        KeyEvent { key, shift: false }
    }

    pub fn with_shift(key: Key) -> KeyEvent {
        KeyEvent { key, shift: true }
    }

    /// Arrows and WASD move in the deck plane, shift with up/down arrows moves z
    pub fn direction(&self) -> JogDirection {
        match (self.key, self.shift) {
            (Key::Up, true) => JogDirection::Up,
            (Key::Down, true) => JogDirection::Down,
            (Key::Up | Key::W, _) => JogDirection::Back,
            (Key::Down | Key::S, _) => JogDirection::Forward,
            (Key::Left | Key::A, _) => JogDirection::Left,
            (Key::Right | Key::D, _) => JogDirection::Right,
        }
    }
}

/// Device polled for jog input, such as a gamepad
pub trait InputSource: Send + 'static {
    fn poll(&mut self) -> Option<JogDirection>;
}

/// Background task polling an [`InputSource`]
///
/// Directions are only handed over through the channel, the owner
/// of the session applies them.
pub struct InputPoller {
    receiver: mpsc::Receiver<JogDirection>,
    keep_running: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

pub fn spawn_input_poller<S: InputSource>(mut source: S, period: Duration) -> InputPoller {
    let (sender, receiver) = mpsc::channel(32);
    let keep_running = Arc::new(AtomicBool::new(true));
    let task = tokio::spawn({
        let keep_running = Arc::clone(&keep_running);
        async move {
            let mut interval = tokio::time::interval(period);
            while keep_running.load(Ordering::Acquire) {
                interval.tick().await;
                if let Some(direction) = source.poll() {
                    trace!(%direction, "input polled");
                    if sender.send(direction).await.is_err() {
                        break;
                    }
                }
            }
            debug!("input poller stopped");
        }
    });
    InputPoller {
        receiver,
        keep_running,
        task: Some(task),
    }
}

impl InputPoller {
    /// `None` once the poller stopped and every direction was taken
    pub async fn next(&mut self) -> Option<JogDirection> {
        self.receiver.recv().await
    }

    pub fn try_next(&mut self) -> Option<JogDirection> {
        self.receiver.try_recv().ok()
    }

    pub fn stop(&self) {
        self.keep_running.store(false, Ordering::Release);
    }
}

impl Drop for InputPoller {
    fn drop(&mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct ScriptedInput(VecDeque<Option<JogDirection>>);

    impl InputSource for ScriptedInput {
        fn poll(&mut self) -> Option<JogDirection> {
            self.0.pop_front().flatten()
        }
    }

    #[test]
    fn keys_map_to_directions() {
        assert_eq!(KeyEvent::new(Key::W).direction(), JogDirection::Back);
        assert_eq!(KeyEvent::new(Key::Up).direction(), JogDirection::Back);
        assert_eq!(KeyEvent::new(Key::S).direction(), JogDirection::Forward);
        assert_eq!(KeyEvent::new(Key::A).direction(), JogDirection::Left);
        assert_eq!(KeyEvent::new(Key::Right).direction(), JogDirection::Right);
        assert_eq!(KeyEvent::with_shift(Key::Up).direction(), JogDirection::Up);
        assert_eq!(KeyEvent::with_shift(Key::Down).direction(), JogDirection::Down);
        assert_eq!(KeyEvent::with_shift(Key::W).direction(), JogDirection::Back);
    }

    #[tokio::test]
    async fn poller_forwards_directions_in_order() {
        let source = ScriptedInput(VecDeque::from(vec![
            Some(JogDirection::Left),
            None,
            Some(JogDirection::Up),
        ]));
        let mut poller = spawn_input_poller(source, Duration::from_millis(1));

        assert_eq!(poller.next().await, Some(JogDirection::Left));
        assert_eq!(poller.next().await, Some(JogDirection::Up));
        poller.stop();
        assert_eq!(poller.next().await, None);
    }
}
