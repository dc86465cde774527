//! EventEmitter - commit-then-dispatch buffer for member events.
//!
//! A transactional emitter collects events while a unit of work runs and
//! hands them to the event bus only after the unit of work has committed.
//! If it rolls back, the events are dropped. A standalone emitter has no
//! transaction to wait for and dispatches on `emit`.

use std::sync::Arc;

use crate::domain::foundation::{DomainEvent, EventEnvelope, SerializableDomainEvent};
use crate::domain::membership::{MemberEvent, MembershipError};
use crate::ports::{EventPublisher, MemberUnitOfWork};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmitMode {
    Transactional,
    Standalone,
}

/// Ordered event buffer bound to one unit of work.
pub struct EventEmitter {
    publisher: Arc<dyn EventPublisher>,
    mode: EmitMode,
    buffer: Vec<MemberEvent>,
}

impl EventEmitter {
    /// Emitter whose events wait for `commit`.
    pub fn transactional(publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            publisher,
            mode: EmitMode::Transactional,
            buffer: Vec::new(),
        }
    }

    /// Emitter that dispatches every event as soon as it is emitted.
    pub fn standalone(publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            publisher,
            mode: EmitMode::Standalone,
            buffer: Vec::new(),
        }
    }

    pub fn is_transactional(&self) -> bool {
        self.mode == EmitMode::Transactional
    }

    /// Buffers the event, or dispatches it right away when standalone.
    pub async fn emit(&mut self, event: MemberEvent) {
        match self.mode {
            EmitMode::Transactional => self.buffer.push(event),
            EmitMode::Standalone => {
                self.dispatch(vec![event]).await;
            }
        }
    }

    /// Events waiting for commit, in emission order.
    pub fn pending(&self) -> &[MemberEvent] {
        &self.buffer
    }

    /// Dispatches buffered events in emission order and clears the buffer.
    ///
    /// Call only after the owning transaction committed. Dispatch failures
    /// are logged: the state the events describe is already durable.
    pub async fn commit(&mut self) -> Vec<MemberEvent> {
        let events = std::mem::take(&mut self.buffer);
        if events.is_empty() {
            return events;
        }
        self.dispatch(events).await
    }

    /// Drops buffered events without dispatching. Returns how many were dropped.
    pub fn discard(&mut self) -> usize {
        let dropped = self.buffer.len();
        self.buffer.clear();
        if dropped > 0 {
            tracing::debug!(dropped, "Discarded buffered member events");
        }
        dropped
    }

    async fn dispatch(&self, events: Vec<MemberEvent>) -> Vec<MemberEvent> {
        let mut envelopes: Vec<EventEnvelope> = Vec::with_capacity(events.len());
        for event in &events {
            match event.to_envelope() {
                Ok(envelope) => envelopes.push(envelope),
                Err(e) => tracing::error!(
                    event_type = event.event_type(),
                    member_id = %event.member_id,
                    error = %e,
                    "Failed to build event envelope"
                ),
            }
        }

        if let Err(e) = self.publisher.publish_all(envelopes).await {
            tracing::error!(
                count = events.len(),
                error = %e,
                "Failed to dispatch member events after commit"
            );
        }

        events
    }
}

/// Closes a unit of work and its emitter according to `outcome`.
///
/// On success the storage transaction commits first and the emitter
/// dispatches afterwards. If the storage commit fails, or `outcome` is an
/// error, buffered events are discarded and nothing is dispatched.
pub async fn complete<T>(
    uow: Box<dyn MemberUnitOfWork>,
    emitter: &mut EventEmitter,
    outcome: Result<T, MembershipError>,
) -> Result<(T, Vec<MemberEvent>), MembershipError> {
    match outcome {
        Ok(value) => {
            if let Err(e) = uow.commit().await {
                emitter.discard();
                return Err(e.into());
            }
            let events = emitter.commit().await;
            Ok((value, events))
        }
        Err(err) => {
            emitter.discard();
            if let Err(rollback_err) = uow.rollback().await {
                tracing::warn!(error = %rollback_err, "Rollback failed after aborted operation");
            }
            Err(err)
        }
    }
}
