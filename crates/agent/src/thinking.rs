//! The "thinking" indicator shown while the model has nothing to say yet.
//!
//! Purely presentational. It is off while content streams, and comes back
//! after a quiet period. The re-arm timer lives in the same `select!` as the
//! delta receive, so it can never fire while a delta is being handled.

use std::pin::Pin;
use std::time::Duration;
use tokio::time::{Instant, Sleep};

use crate::stream_event::AgentStreamEvent;

pub struct ThinkingIndicator {
    active: bool,
    step: Option<String>,
    idle: Duration,
    rearm: Pin<Box<Sleep>>,
    rearm_pending: bool,
}

impl ThinkingIndicator {
    pub fn new(idle: Duration) -> Self {
        Self {
            active: false,
            step: None,
            idle,
            rearm: Box::pin(tokio::time::sleep(idle)),
            rearm_pending: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_rearm_pending(&self) -> bool {
        self.rearm_pending
    }

    /// Turn on, optionally with a step label. `None` if nothing changed.
    pub fn start(&mut self, step: Option<String>) -> Option<AgentStreamEvent> {
        self.rearm_pending = false;
        if self.active && self.step == step {
            return None;
        }
        self.active = true;
        self.step = step;
        Some(self.event())
    }

    /// Content arrived: turn off and schedule the re-arm.
    pub fn on_content(&mut self) -> Option<AgentStreamEvent> {
        self.rearm.as_mut().reset(Instant::now() + self.idle);
        self.rearm_pending = true;
        self.off()
    }

    /// Turn off without re-arming.
    pub fn stop(&mut self) -> Option<AgentStreamEvent> {
        self.rearm_pending = false;
        self.off()
    }

    /// Resolves when the quiet period after the last content runs out.
    /// Only meaningful while [`is_rearm_pending`](Self::is_rearm_pending).
    pub async fn rearm_elapsed(&mut self) {
        self.rearm.as_mut().await;
    }

    /// The quiet period ran out.
    pub fn rearm(&mut self) -> Option<AgentStreamEvent> {
        self.rearm_pending = false;
        self.start(None)
    }

    fn off(&mut self) -> Option<AgentStreamEvent> {
        if !self.active {
            return None;
        }
        self.active = false;
        self.step = None;
        Some(self.event())
    }

    fn event(&self) -> AgentStreamEvent {
        AgentStreamEvent::Thinking {
            active: self.active,
            step: self.step.clone(),
        }
    }
}

/// Label for the calls being streamed in.
pub fn preparing_label(count: usize, first_name: Option<&str>) -> String {
    match (count, first_name) {
        (1, Some(name)) => format!("Preparing {name}"),
        (1, None) => "Preparing tool".to_string(),
        (n, _) => format!("Preparing {n} tools"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(event: Option<AgentStreamEvent>) -> Option<(bool, Option<String>)> {
        event.map(|e| match e {
            AgentStreamEvent::Thinking { active, step } => (active, step),
            other => panic!("unexpected event {other:?}"),
        })
    }

    #[tokio::test]
    async fn transitions_only_emit_on_change() {
        let mut t = ThinkingIndicator::new(Duration::from_millis(500));
        assert_eq!(state(t.start(None)), Some((true, None)));
        assert_eq!(state(t.start(None)), None);
        assert_eq!(
            state(t.start(Some("Preparing pinChat".into()))),
            Some((true, Some("Preparing pinChat".into())))
        );
        assert_eq!(state(t.stop()), Some((false, None)));
        assert_eq!(state(t.stop()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn rearms_after_quiet_period() {
        let mut t = ThinkingIndicator::new(Duration::from_millis(500));
        t.start(None);
        assert_eq!(state(t.on_content()), Some((false, None)));
        assert!(t.is_rearm_pending());

        let before = Instant::now();
        t.rearm_elapsed().await;
        assert!(before.elapsed() >= Duration::from_millis(500));
        assert_eq!(state(t.rearm()), Some((true, None)));
        assert!(!t.is_rearm_pending());
    }

    #[test]
    fn preparing_labels() {
        assert_eq!(preparing_label(1, Some("sendMessage")), "Preparing sendMessage");
        assert_eq!(preparing_label(1, None), "Preparing tool");
        assert_eq!(preparing_label(3, Some("pinChat")), "Preparing 3 tools");
    }
}
