//! Consumer-side event stream and filtering

use futures::Stream;
use rtcbridge_core::BridgeEvent;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TryRecvError};

/// Ordered stream of bridge events
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<BridgeEvent>,
}

impl EventStream {
    /// Wrap the receiving half of the bridge event channel
    pub fn new(receiver: mpsc::UnboundedReceiver<BridgeEvent>) -> Self {
        Self { receiver }
    }

    /// Wait for the next event; `None` once every sender is gone
    pub async fn next(&mut self) -> Option<BridgeEvent> {
        self.receiver.recv().await
    }

    /// Next queued event, if any; fails once the channel is disconnected
    pub fn try_next(&mut self) -> Result<Option<BridgeEvent>, TryRecvError> {
        match self.receiver.try_recv() {
            Err(TryRecvError::Empty) => Ok(None),
            other => other.map(Some),
        }
    }

    /// Drain every event that is already queued
    pub fn drain(&mut self) -> Vec<BridgeEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Stop receiving; queued events can still be drained
    pub fn close(&mut self) {
        self.receiver.close();
    }

    /// Whether the channel is closed
    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }
}

impl Stream for EventStream {
    type Item = BridgeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Selects which bridge events a [`FilteredEventStream`] yields
#[derive(Debug, Clone)]
pub struct EventFilter {
    /// Session state, ICE and renegotiation events
    pub include_session_events: bool,
    /// Remote track, dimension, mute and track-ended events
    pub include_track_events: bool,
    /// Data channel open, state, message and buffered-amount events
    pub include_data_channel_events: bool,
    /// Only events of this session (events without a session are dropped)
    pub session_id: Option<i32>,
    /// Wire event names to accept; overrides the categories when set
    pub specific_event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Accept everything
    pub fn all() -> Self {
        Self {
            include_session_events: true,
            include_track_events: true,
            include_data_channel_events: true,
            session_id: None,
            specific_event_types: None,
        }
    }

    /// Session and ICE events only
    pub fn session_only() -> Self {
        Self {
            include_track_events: false,
            include_data_channel_events: false,
            ..Self::all()
        }
    }

    /// Track events only
    pub fn tracks_only() -> Self {
        Self {
            include_session_events: false,
            include_data_channel_events: false,
            ..Self::all()
        }
    }

    /// Data channel events only
    pub fn data_channel_only() -> Self {
        Self {
            include_session_events: false,
            include_track_events: false,
            ..Self::all()
        }
    }

    /// Only the given wire event names
    pub fn events_named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            specific_event_types: Some(names.into_iter().map(Into::into).collect()),
            ..Self::all()
        }
    }

    /// Restrict the filter to one session
    pub fn for_session(mut self, session_id: i32) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Whether `event` passes the session scope and the selection
    pub fn should_include(&self, event: &BridgeEvent) -> bool {
        if let Some(session_id) = self.session_id {
            if event.session_id() != Some(session_id) {
                return false;
            }
        }

        if let Some(names) = &self.specific_event_types {
            return names.iter().any(|name| name == event.event_type());
        }

        (self.include_session_events && event.is_session_event())
            || (self.include_track_events && event.is_track_event())
            || (self.include_data_channel_events && event.is_data_channel_event())
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// [`EventStream`] that skips events rejected by an [`EventFilter`]
#[derive(Debug)]
pub struct FilteredEventStream {
    stream: EventStream,
    filter: EventFilter,
}

impl FilteredEventStream {
    /// Apply `filter` to `stream`
    pub fn new(stream: EventStream, filter: EventFilter) -> Self {
        Self { stream, filter }
    }

    /// Wait for the next accepted event
    pub async fn next(&mut self) -> Option<BridgeEvent> {
        loop {
            let event = self.stream.next().await?;
            if self.filter.should_include(&event) {
                return Some(event);
            }
        }
    }

    /// Next accepted event that is already queued
    pub fn try_next(&mut self) -> Result<Option<BridgeEvent>, TryRecvError> {
        while let Some(event) = self.stream.try_next()? {
            if self.filter.should_include(&event) {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    /// Replace the filter for subsequent reads
    pub fn set_filter(&mut self, filter: EventFilter) {
        self.filter = filter;
    }

    /// Filter in use
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}
