//! Message types exchanged with the remote console.

use std::fmt;

/// An inbound message from the remote console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// `broadcast "<token>"`: one or more command tokens.
    Broadcast(Vec<String>),
    /// `sensor-update "<key>" <value> ...`: echoed key/value pairs, in order.
    SensorUpdate(Vec<(String, String)>),
    /// Any other message kind. Carries the kind word.
    Unknown(String),
}

impl Message {
    /// Returns the message kind as it appears on the wire.
    pub fn kind(&self) -> &str {
        match self {
            Message::Broadcast(_) => "broadcast",
            Message::SensorUpdate(_) => "sensor-update",
            Message::Unknown(kind) => kind,
        }
    }
}

/// An outbound batched key/value report, sent as one `sensor-update` frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorReport {
    pairs: Vec<(String, String)>,
}

impl SensorReport {
    /// Creates an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pair. Later pairs with the same key are kept; the console
    /// applies them in order.
    pub fn push(&mut self, key: impl Into<String>, value: impl ToString) {
        self.pairs.push((key.into(), value.to_string()));
    }

    /// Builder form of [`SensorReport::push`].
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.push(key, value);
        self
    }

    /// Returns the value of the first pair with `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl fmt::Display for SensorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        f.write_str("{")?;
        for (k, v) in &self.pairs {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{}={}", k, v)?;
        }
        f.write_str("}")
    }
}
