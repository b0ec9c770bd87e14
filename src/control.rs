//! Out-of-band control channel from the hosting application.
//!
//! Two recognized wire messages: `SKIP_WAITING` forces the waiting version
//! to activate immediately, `PURGE_CACHES` deletes every partition
//! regardless of version. Anything else is ignored. Posting is
//! fire-and-forget; senders get no reply and observe effects on the next
//! request.

use tokio::sync::mpsc;
use tracing::debug;

pub const SKIP_WAITING: &str = "SKIP_WAITING";
pub const PURGE_CACHES: &str = "PURGE_CACHES";

/// A recognized control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
  SkipWaiting,
  PurgeCaches,
}

impl ControlMessage {
  /// Parse a wire message. Unknown messages yield `None` and are dropped.
  pub fn parse(raw: &str) -> Option<Self> {
    match raw {
      SKIP_WAITING => Some(ControlMessage::SkipWaiting),
      PURGE_CACHES => Some(ControlMessage::PurgeCaches),
      _ => None,
    }
  }
}

/// Sender half handed to the hosting application.
#[derive(Clone)]
pub struct ControlHandle {
  tx: mpsc::UnboundedSender<ControlMessage>,
}

impl ControlHandle {
  /// Post a raw wire message. Unrecognized or undeliverable messages are
  /// silently dropped.
  pub fn post(&self, raw: &str) {
    match ControlMessage::parse(raw) {
      Some(message) => {
        let _ = self.tx.send(message);
      }
      None => debug!(message = raw, "ignoring unrecognized control message"),
    }
  }
}

/// Receiver half drained by the worker loop.
pub struct ControlChannel {
  rx: mpsc::UnboundedReceiver<ControlMessage>,
}

impl ControlChannel {
  pub fn new() -> (ControlHandle, Self) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ControlHandle { tx }, Self { rx })
  }

  /// Receive the next command. `None` once all handles are dropped.
  pub async fn next(&mut self) -> Option<ControlMessage> {
    self.rx.recv().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_recognized_messages() {
    assert_eq!(
      ControlMessage::parse("SKIP_WAITING"),
      Some(ControlMessage::SkipWaiting)
    );
    assert_eq!(
      ControlMessage::parse("PURGE_CACHES"),
      Some(ControlMessage::PurgeCaches)
    );
  }

  #[test]
  fn test_unknown_messages_are_ignored() {
    assert_eq!(ControlMessage::parse("skip_waiting"), None);
    assert_eq!(ControlMessage::parse("RELOAD"), None);
    assert_eq!(ControlMessage::parse(""), None);
  }

  #[tokio::test]
  async fn test_post_and_drain() {
    let (handle, mut channel) = ControlChannel::new();

    handle.post("PURGE_CACHES");
    handle.post("bogus");
    handle.post("SKIP_WAITING");
    drop(handle);

    assert_eq!(channel.next().await, Some(ControlMessage::PurgeCaches));
    assert_eq!(channel.next().await, Some(ControlMessage::SkipWaiting));
    assert_eq!(channel.next().await, None);
  }
}
