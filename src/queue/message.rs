//! Message Types for the Mayhem Pipeline
//!
//! A [`Message`] describes one simulated host instance that needs its state
//! saved and the host restarted. Identity fields are fixed at construction;
//! progress flags only ever move from `false` to `true`.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// Domain suffix appended to every instance name to form its hostname
pub const HOST_DOMAIN: &str = "example.net";

/// Prefix used for generated instance names
const INSTANCE_PREFIX: &str = "cattle";

/// Number of random characters in a generated instance name
const INSTANCE_ID_LEN: usize = 4;

/// Characters an instance name suffix is drawn from, each equally likely
const INSTANCE_ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Header information recorded when a message is created
#[derive(Debug, Clone)]
pub struct MessageHeader {
    /// Globally unique message identifier
    pub message_id: Uuid,
    /// Identifier of the producer that created this message
    pub producer_id: String,
    /// Timestamp when the message was created
    pub timestamp: DateTime<Utc>,
}

/// One unit of work flowing through the pipeline
///
/// Ownership moves producer -> queue -> dispatcher -> handler. The handler runs
/// its two sub-operations concurrently against a shared `&Message`, so the
/// progress flags are atomics that can be raised through a shared reference.
///
/// # Example
///
/// ```rust
/// use mayhem::queue::Message;
///
/// let message = Message::with_instance_name("producer-1", "cattle-ab12");
/// assert_eq!(message.hostname(), "cattle-ab12.example.net");
/// assert!(!message.is_acknowledged());
/// ```
#[derive(Debug)]
pub struct Message {
    header: MessageHeader,
    instance_name: String,
    hostname: String,
    saved: AtomicBool,
    restarted: AtomicBool,
    acknowledged: AtomicBool,
}

impl Message {
    /// Create a message for a randomly named instance
    pub fn new(producer_id: impl Into<String>) -> Self {
        Self::with_instance_name(producer_id, random_instance_name())
    }

    /// Create a message for a specific instance name
    pub fn with_instance_name(producer_id: impl Into<String>, instance_name: impl Into<String>) -> Self {
        let instance_name = instance_name.into();
        let hostname = format!("{instance_name}.{HOST_DOMAIN}");
        Self {
            header: MessageHeader {
                message_id: Uuid::new_v4(),
                producer_id: producer_id.into(),
                timestamp: Utc::now(),
            },
            instance_name,
            hostname,
            saved: AtomicBool::new(false),
            restarted: AtomicBool::new(false),
            acknowledged: AtomicBool::new(false),
        }
    }

    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    pub fn message_id(&self) -> Uuid {
        self.header.message_id
    }

    pub fn producer_id(&self) -> &str {
        &self.header.producer_id
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn is_saved(&self) -> bool {
        self.saved.load(Ordering::Acquire)
    }

    pub fn is_restarted(&self) -> bool {
        self.restarted.load(Ordering::Acquire)
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged.load(Ordering::Acquire)
    }

    /// Record a successful save. Returns `false` if the flag was already set.
    pub fn mark_saved(&self) -> bool {
        raise(&self.saved)
    }

    /// Record a successful restart. Returns `false` if the flag was already set.
    pub fn mark_restarted(&self) -> bool {
        raise(&self.restarted)
    }

    /// Record acknowledgement. Returns `false` if the flag was already set.
    pub fn mark_acknowledged(&self) -> bool {
        raise(&self.acknowledged)
    }
}

// Monotonic false -> true; a second raise is reported, never applied twice
fn raise(flag: &AtomicBool) -> bool {
    flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Message(instance_name={}, id={})",
            self.instance_name, self.header.message_id
        )
    }
}

/// Generate an instance label of the form `cattle-xxxx`
pub fn random_instance_name() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..INSTANCE_ID_LEN)
        .filter_map(|_| INSTANCE_ID_CHARSET.choose(&mut rng))
        .map(|&c| c as char)
        .collect();
    format!("{INSTANCE_PREFIX}-{suffix}")
}
