//! Typed event sink: a callback registry keyed by event kind, replacing
//! a flat dynamic-listener list so a subscriber only ever pays for the
//! kinds it cares about. Listeners run synchronously on the main
//! thread, in subscription order.

use std::collections::HashMap;

use mapengine_protocol::MapEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Update,
    Render,
    AfterRender,
    FirstRender,
    FrameComplete,
    ThemeLoaded,
    AnimationStarted,
    AnimationFinished,
    MovementStarted,
    MovementFinished,
    DatasourceConnect,
    CopyrightChanged,
    ContextLost,
    ContextRestored,
}

fn event_kind(event: &MapEvent) -> EventKind {
    match event {
        MapEvent::Update => EventKind::Update,
        MapEvent::Render => EventKind::Render,
        MapEvent::AfterRender => EventKind::AfterRender,
        MapEvent::FirstRender => EventKind::FirstRender,
        MapEvent::FrameComplete => EventKind::FrameComplete,
        MapEvent::ThemeLoaded => EventKind::ThemeLoaded,
        MapEvent::AnimationStarted => EventKind::AnimationStarted,
        MapEvent::AnimationFinished => EventKind::AnimationFinished,
        MapEvent::MovementStarted => EventKind::MovementStarted,
        MapEvent::MovementFinished => EventKind::MovementFinished,
        MapEvent::DatasourceConnect { .. } => EventKind::DatasourceConnect,
        MapEvent::CopyrightChanged => EventKind::CopyrightChanged,
        MapEvent::ContextLost => EventKind::ContextLost,
        MapEvent::ContextRestored => EventKind::ContextRestored,
    }
}

pub type EventCallback = Box<dyn Fn(&MapEvent)>;

#[derive(Default)]
pub struct MapEventSink {
    listeners: HashMap<EventKind, Vec<EventCallback>>,
}

impl MapEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, kind: EventKind, callback: EventCallback) {
        self.listeners.entry(kind).or_default().push(callback);
    }

    pub fn dispatch(&self, event: &MapEvent) {
        if let Some(callbacks) = self.listeners.get(&event_kind(event)) {
            for callback in callbacks {
                callback(event);
            }
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map(Vec::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn dispatch_only_invokes_listeners_for_that_kind() {
        let mut sink = MapEventSink::new();
        let movement_fired = Rc::new(RefCell::new(0));
        let render_fired = Rc::new(RefCell::new(0));

        let movement_counter = movement_fired.clone();
        sink.subscribe(
            EventKind::MovementStarted,
            Box::new(move |_| *movement_counter.borrow_mut() += 1),
        );
        let render_counter = render_fired.clone();
        sink.subscribe(
            EventKind::Render,
            Box::new(move |_| *render_counter.borrow_mut() += 1),
        );

        sink.dispatch(&MapEvent::MovementStarted);

        assert_eq!(*movement_fired.borrow(), 1);
        assert_eq!(*render_fired.borrow(), 0);
    }

    #[test]
    fn datasource_connect_carries_payload_to_listener() {
        let mut sink = MapEventSink::new();
        let seen = Rc::new(RefCell::new(None));
        let seen_write = seen.clone();
        sink.subscribe(
            EventKind::DatasourceConnect,
            Box::new(move |event| {
                if let MapEvent::DatasourceConnect { name } = event {
                    *seen_write.borrow_mut() = Some(name.clone());
                }
            }),
        );

        sink.dispatch(&MapEvent::DatasourceConnect { name: "roads".into() });
        assert_eq!(seen.borrow().as_deref(), Some("roads"));
    }
}
