//! The results channel between a pipeline and its single consumer.

use crossbeam_channel as chan;
use pkgqa_core::Finding;

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultsMessage {
    Findings(Vec<Finding>),
    /// End of stream; sent once, after every batch.
    Done,
}

#[derive(Debug, Clone)]
pub struct ResultsSender {
    tx: chan::Sender<ResultsMessage>,
}

impl ResultsSender {
    /// Push one batch; empty batches are dropped.
    pub fn push(&self, batch: Vec<Finding>) -> Result<(), PipelineError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.tx
            .send(ResultsMessage::Findings(batch))
            .map_err(|_| PipelineError::ResultsClosed)
    }

    pub fn done(&self) -> Result<(), PipelineError> {
        self.tx
            .send(ResultsMessage::Done)
            .map_err(|_| PipelineError::ResultsClosed)
    }
}

#[derive(Debug)]
pub struct ResultsReceiver {
    rx: chan::Receiver<ResultsMessage>,
}

impl ResultsReceiver {
    /// Next batch, or `None` at the end marker or when every sender is gone.
    pub fn recv(&self) -> Option<Vec<Finding>> {
        match self.rx.recv() {
            Ok(ResultsMessage::Findings(batch)) => Some(batch),
            Ok(ResultsMessage::Done) | Err(_) => None,
        }
    }

    /// Drain every batch up to the end marker.
    ///
    /// Fails with [`PipelineError::Truncated`] when the senders vanish
    /// before sending it, e.g. because the scan failed.
    pub fn collect(self) -> Result<Vec<Finding>, PipelineError> {
        let mut findings = Vec::new();
        loop {
            match self.rx.recv() {
                Ok(ResultsMessage::Findings(batch)) => findings.extend(batch),
                Ok(ResultsMessage::Done) => return Ok(findings),
                Err(_) => return Err(PipelineError::Truncated),
            }
        }
    }

    /// Raw messages, for consumers that need batch boundaries.
    pub fn messages(&self) -> chan::Iter<'_, ResultsMessage> {
        self.rx.iter()
    }
}

/// An unbounded results channel.
#[must_use]
pub fn results_channel() -> (ResultsSender, ResultsReceiver) {
    let (tx, rx) = chan::unbounded();
    (ResultsSender { tx }, ResultsReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkgqa_core::{Severity, Target};

    fn finding(kind: &str) -> Finding {
        Finding::new(Target::Repository, kind, Severity::Info, "msg")
    }

    #[test]
    fn collects_until_done() {
        let (tx, rx) = results_channel();
        tx.push(vec![finding("A")]).unwrap();
        tx.push(Vec::new()).unwrap();
        tx.push(vec![finding("B"), finding("C")]).unwrap();
        tx.done().unwrap();
        let kinds: Vec<String> = rx.collect().unwrap().into_iter().map(|f| f.kind).collect();
        assert_eq!(kinds, ["A", "B", "C"]);
    }

    #[test]
    fn missing_end_marker_is_truncation() {
        let (tx, rx) = results_channel();
        tx.push(vec![finding("A")]).unwrap();
        drop(tx);
        assert!(matches!(rx.collect(), Err(PipelineError::Truncated)));
    }

    #[test]
    fn push_after_receiver_dropped_fails() {
        let (tx, rx) = results_channel();
        drop(rx);
        assert!(matches!(tx.push(vec![finding("A")]), Err(PipelineError::ResultsClosed)));
    }
}
