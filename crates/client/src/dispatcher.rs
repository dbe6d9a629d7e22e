//! Routes decoded inbound envelopes to handlers by type tag.

use std::collections::HashMap;

use tracing::{trace, warn};

use relaychat_protocol::{Event, MessageType};

/// Handler invoked with the dispatch context and the decoded event.
pub type Handler<C> = Box<dyn FnMut(&mut C, &Event) + Send>;

/// Tag-keyed handler table with one optional wildcard.
///
/// At most one handler is registered per tag; registering again replaces
/// it. The wildcard sees every decoded event, before the tag handler.
pub struct Dispatcher<C> {
    handlers: HashMap<MessageType, Handler<C>>,
    wildcard: Option<Handler<C>>,
}

impl<C> Default for Dispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Dispatcher<C> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            wildcard: None,
        }
    }

    /// Registers the handler for `tag`, returning the one it replaces.
    pub fn on<F>(&mut self, tag: MessageType, handler: F) -> Option<Handler<C>>
    where
        F: FnMut(&mut C, &Event) + Send + 'static,
    {
        self.handlers.insert(tag, Box::new(handler))
    }

    /// Registers the wildcard handler, returning the one it replaces.
    pub fn on_any<F>(&mut self, handler: F) -> Option<Handler<C>>
    where
        F: FnMut(&mut C, &Event) + Send + 'static,
    {
        self.wildcard.replace(Box::new(handler))
    }

    pub fn off(&mut self, tag: &MessageType) -> Option<Handler<C>> {
        self.handlers.remove(tag)
    }

    pub fn has_handler(&self, tag: &MessageType) -> bool {
        self.handlers.contains_key(tag)
    }

    /// Decodes one raw frame and routes it.
    ///
    /// Frames that fail to decode are dropped with a warning and yield
    /// `None`; no handler runs.
    pub fn dispatch(&mut self, ctx: &mut C, raw: &str) -> Option<Event> {
        match Event::from_json(raw) {
            Ok(event) => {
                self.dispatch_event(ctx, &event);
                Some(event)
            }
            Err(e) => {
                warn!(len = raw.len(), "dropping inbound envelope: {e}");
                None
            }
        }
    }

    /// Routes an already decoded event.
    pub fn dispatch_event(&mut self, ctx: &mut C, event: &Event) {
        let tag = event.msg_type();
        trace!(%tag, "dispatching");

        if let Some(wildcard) = self.wildcard.as_mut() {
            wildcard(ctx, event);
        }
        if let Some(handler) = self.handlers.get_mut(&tag) {
            handler(ctx, event);
        } else if self.wildcard.is_none() {
            trace!(%tag, "no handler registered");
        }
    }
}
