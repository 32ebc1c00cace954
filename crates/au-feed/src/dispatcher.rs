//! Inbound frame routing.
//!
//! One handler per [`MessageTag`], held in an explicit map; binding a tag
//! again replaces its handler. Frames are parsed and dispatched synchronously
//! in the order the channel delivers them.

use ahash::AHashMap;

use au_core::error::SyncError;
use au_core::types::{Message, MessageTag};
use tracing::{debug, trace};

/// Handler for one message tag.
pub type Handler = Box<dyn FnMut(&Message) + Send>;

#[derive(Default)]
pub struct Dispatcher {
    handlers: AHashMap<MessageTag, Handler>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `tag`, returning `true` if it replaced an existing one.
    pub fn bind(&mut self, tag: MessageTag, handler: Handler) -> bool {
        self.handlers.insert(tag, handler).is_some()
    }

    pub fn unbind(&mut self, tag: MessageTag) -> bool {
        self.handlers.remove(&tag).is_some()
    }

    pub fn is_bound(&self, tag: MessageTag) -> bool {
        self.handlers.contains_key(&tag)
    }

    /// Parse one raw frame and invoke the handler bound to its tag.
    ///
    /// Returns the parsed message, or [`SyncError::ProtocolViolation`] for an
    /// unparsable frame or unknown tag. The caller logs and drops on error.
    pub fn dispatch(&mut self, raw: &str) -> Result<Message, SyncError> {
        let msg = Message::parse(raw)?;
        match self.handlers.get_mut(&msg.tag) {
            Some(handler) => {
                trace!("[dispatch] {} frame", msg.tag);
                handler(&msg);
            }
            None => debug!("[dispatch] no handler bound for {}", msg.tag),
        }
        Ok(msg)
    }
}
