use serde::Deserialize;
use tm_monitor_types::{Block, Header};

/// Event topics the monitor subscribes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    /// A new block header was committed.
    NewBlockHeader,

    /// A new block was committed, delivered in full.
    NewBlock,
}

impl Topic {
    /// Both topics, in subscription order.
    pub const ALL: [Self; 2] = [Self::NewBlockHeader, Self::NewBlock];

    /// The Tendermint event query for this topic.
    #[must_use]
    pub const fn query(&self) -> &'static str {
        match self {
            Self::NewBlockHeader => "tm.event='NewBlockHeader'",
            Self::NewBlock => "tm.event='NewBlock'",
        }
    }

    /// Parses an event query back into a topic.
    #[must_use]
    pub fn from_query(query: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|topic| topic.query() == query)
    }
}

/// A decoded event delivered to subscribers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Payload of [`Topic::NewBlockHeader`].
    NewBlockHeader(Header),

    /// Payload of [`Topic::NewBlock`].
    NewBlock(Block),
}

#[derive(Deserialize)]
#[serde(tag = "type", content = "value")]
enum EventData {
    #[serde(rename = "tendermint/event/NewBlockHeader")]
    NewBlockHeader { header: Header },

    #[serde(rename = "tendermint/event/NewBlock")]
    NewBlock { block: Block },
}

impl Event {
    /// The topic this event is delivered on.
    #[must_use]
    pub const fn topic(&self) -> Topic {
        match self {
            Self::NewBlockHeader(_) => Topic::NewBlockHeader,
            Self::NewBlock(_) => Topic::NewBlock,
        }
    }

    /// Decodes the `data` member of a subscription result.
    ///
    /// # Errors
    ///
    /// Fails if the payload is not a header or block event.
    pub fn decode(data: serde_json::Value) -> Result<Self, serde_json::Error> {
        Ok(match serde_json::from_value(data)? {
            EventData::NewBlockHeader { header } => Self::NewBlockHeader(header),
            EventData::NewBlock { block } => Self::NewBlock(block),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_query_round_trip() {
        for topic in Topic::ALL {
            assert_eq!(Topic::from_query(topic.query()), Some(topic));
        }
        assert_eq!(Topic::from_query("tm.event='Tx'"), None);
    }

    #[test]
    fn test_decode_header_event() {
        let data = json!({
            "type": "tendermint/event/NewBlockHeader",
            "value": {"header": {"height": "100", "num_txs": "3"}}
        });

        let event = Event::decode(data).unwrap();

        assert_eq!(event.topic(), Topic::NewBlockHeader);
        match event {
            Event::NewBlockHeader(header) => assert_eq!(header.height, 100),
            Event::NewBlock(_) => panic!("expected header"),
        }
    }

    #[test]
    fn test_decode_unknown_event_fails() {
        let data = json!({"type": "tendermint/event/Tx", "value": {}});

        assert!(Event::decode(data).is_err());
    }
}
