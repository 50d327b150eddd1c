use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::models::{NegotiationOutcome, Speaker};

/// Human-readable status updates emitted while a run progresses
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    RunStarted { mentors: usize, mentees: usize },
    MenteeStarted { mentee: String, candidates: Vec<String> },
    SessionStarted { mentor: String, mentee: String, score: f64 },
    /// First chunk of a streamed turn is about to follow
    TurnStarted { speaker: Speaker },
    /// Streamed text with reasoning markers withheld; whitespace is as generated
    TurnDelta { text: String },
    TurnFinished,
    /// A complete, non-streamed turn
    Turn { speaker: Speaker, text: String },
    SessionConcluded { mentor: String, outcome: NegotiationOutcome, summary: String },
    Decision { mentee: String, mentor: String, reasoning: Option<String>, fallback: bool },
    Assigned { mentee: String, mentor: String, score: f64 },
    Unmatched { mentee: String },
    RunFinished { matched: usize, unmatched: usize },
    /// The run could not start or was cut short
    Failed { message: String },
}

impl ProgressEvent {
    /// Wire form. Line events end in a newline; streamed deltas do not, so
    /// a line-buffering reader reassembles each streamed turn into one line.
    pub fn render(&self) -> String {
        match self {
            ProgressEvent::RunStarted { mentors, mentees } => {
                format!("=== MATCHING {} MENTEES AGAINST {} MENTORS ===\n", mentees, mentors)
            }
            ProgressEvent::MenteeStarted { mentee, candidates } => format!(
                "=== PROCESSING MENTEE: {} ===\nPotential mentors: {}\n",
                mentee,
                if candidates.is_empty() { "none".to_string() } else { candidates.join(", ") }
            ),
            ProgressEvent::SessionStarted { mentor, score, .. } => {
                format!("Negotiating with {} (Compatibility: {:.1}%)\n", mentor, score * 100.0)
            }
            ProgressEvent::TurnStarted { speaker } => format!("{}: ", speaker.label()),
            ProgressEvent::TurnDelta { text } => text.clone(),
            ProgressEvent::TurnFinished => "\n".to_string(),
            ProgressEvent::Turn { speaker, text } => format!("{}: {}\n", speaker.label(), text),
            ProgressEvent::SessionConcluded { summary, .. } => {
                format!("=== NEGOTIATION (summary) ===\n{}\n", summary)
            }
            ProgressEvent::Decision { mentor, reasoning, fallback, .. } => match (fallback, reasoning) {
                (true, _) => format!("ℹ️ Mentee could not decide; defaulting to {}\n", mentor),
                (false, Some(reason)) => format!("✓ MENTEE CHOSE: {}\nMENTEE'S REASONING: {}\n", mentor, reason),
                (false, None) => format!("✓ MATCHED WITH: {}\n", mentor),
            },
            ProgressEvent::Assigned { mentee, mentor, score } => format!(
                "✓ SUCCESSFUL MATCH: {} matched with {} (Score: {:.1}%)\n",
                mentee,
                mentor,
                score * 100.0
            ),
            ProgressEvent::Unmatched { mentee } => format!("✗ No suitable mentor found for {}\n", mentee),
            ProgressEvent::RunFinished { matched, unmatched } => format!(
                "=== FINAL MATCHING SUMMARY ===\n{} matched, {} unmatched\n",
                matched, unmatched
            ),
            ProgressEvent::Failed { message } => format!("✗ Error: {}\n", message),
        }
    }
}

/// Non-blocking sink for progress events.
///
/// Emission never waits: when the buffer is full the event is dropped and
/// counted; when the receiver is gone events are discarded.
#[derive(Clone, Default)]
pub struct ProgressSink {
    sender: Option<mpsc::Sender<ProgressEvent>>,
    dropped: Arc<AtomicU64>,
}

impl ProgressSink {
    /// Sink plus the receiving end, buffered to `capacity` events
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender: Some(sender),
                dropped: Arc::new(AtomicU64::new(0)),
            },
            receiver,
        )
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: ProgressEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!("Progress buffer full, dropped {:?} (total dropped: {})", event, dropped);
            }
            Err(TrySendError::Closed(_)) => {
                tracing::trace!("Progress receiver closed");
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_buffer_drops_instead_of_blocking() {
        let (sink, mut rx) = ProgressSink::channel(1);

        sink.emit(ProgressEvent::Unmatched { mentee: "A".into() });
        sink.emit(ProgressEvent::Unmatched { mentee: "B".into() });

        assert_eq!(sink.dropped(), 1);
        assert_eq!(rx.try_recv().unwrap(), ProgressEvent::Unmatched { mentee: "A".into() });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_receiver_is_ignored() {
        let (sink, rx) = ProgressSink::channel(4);
        drop(rx);
        sink.emit(ProgressEvent::TurnFinished);
        assert_eq!(sink.dropped(), 0);
    }

    #[test]
    fn test_disabled_sink_is_noop() {
        ProgressSink::disabled().emit(ProgressEvent::TurnFinished);
    }

    #[test]
    fn test_streamed_turn_renders_as_one_line() {
        let wire: String = [
            ProgressEvent::TurnStarted { speaker: Speaker::Mentor },
            ProgressEvent::TurnDelta { text: "Hello ".into() },
            ProgressEvent::TurnDelta { text: "there".into() },
            ProgressEvent::TurnFinished,
        ]
        .iter()
        .map(ProgressEvent::render)
        .collect();

        let complete = ProgressEvent::Turn {
            speaker: Speaker::Mentor,
            text: "Hello there".into(),
        }
        .render();

        assert_eq!(wire, complete);
    }
}
