//! One client session: event loop, channel attachment and lifetime.
//!
//! A [`Scope`] is the owning handle. Dropping it (or calling
//! [`Scope::destroy`]) detaches the channel and stops the event loop; the
//! loop worker then tears down every component on its own thread.
//!
//! Inbound message flow:
//! 1. The channel calls the subscribed handler with raw bytes
//! 2. [`Scope::handle_message`] decodes them, extends the lifetime and posts
//!    the event to the loop
//! 3. It ticks, handing the batch to the worker (blocks only until accepted)
//! 4. The worker dispatches, renders invalidated components and publishes

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use chrono_tz::Tz;
use metrics::counter;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};
use weft_core::{PtrAllocator, RequestId, ScopeId};
use weft_protocol::{ClientEvent, ServerEvent, WindowInfo, decode, encode};
use weft_settings::{ApplicationSettings, RuntimeSettings, ScopeSettings};

use crate::channel::{Channel, MessageHandler, Subscription};
use crate::component::Factories;
use crate::dispatch::ScopeState;
use crate::errors::RuntimeError;
use crate::event_loop::EventLoop;
use crate::subject::Subject;

/// Session-wide values shared by every window of a scope.
pub(crate) struct Session {
    pub(crate) subject: Arc<dyn Subject>,
    pub(crate) locale: String,
    pub(crate) timezone: Tz,
    pub(crate) window_info: WindowInfo,
}

struct Attached {
    channel: Arc<dyn Channel>,
    subscription: Subscription,
}

/// Scope internals shared with windows, the channel handler and the pump.
pub(crate) struct ScopeCore {
    pub(crate) id: ScopeId,
    pub(crate) settings: ScopeSettings,
    pub(crate) application: ApplicationSettings,
    pub(crate) ptrs: PtrAllocator,
    pub(crate) event_loop: EventLoop<ScopeState>,
    pub(crate) session: RwLock<Session>,
    channel: Mutex<Option<Attached>>,
    eol: Mutex<Instant>,
    destroyed: AtomicBool,
    render_requested: AtomicBool,
    full_render_requested: AtomicBool,
}

impl ScopeCore {
    /// Encode and send an event. Failures are logged, never returned.
    pub(crate) fn publish(&self, event: &ServerEvent) {
        let channel = self.channel.lock().as_ref().map(|a| a.channel.clone());
        let Some(channel) = channel else {
            debug!(scope_id = %self.id, kind = event.kind(), "no channel attached, event dropped");
            return;
        };
        let bytes = match encode(event) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(scope_id = %self.id, kind = event.kind(), error = %e, "failed to encode event");
                return;
            }
        };
        if let Err(e) = channel.publish(&bytes) {
            counter!("channel_publish_errors_total").increment(1);
            warn!(scope_id = %self.id, kind = event.kind(), error = %e, "publish failed");
        }
    }

    #[instrument(skip_all, fields(scope_id = %self.id, len = bytes.len()))]
    pub(crate) fn handle_message(&self, bytes: &[u8]) -> Result<(), RuntimeError> {
        if self.is_destroyed() {
            return Err(RuntimeError::ScopeDestroyed);
        }
        let event: ClientEvent = match decode(bytes) {
            Ok(event) => event,
            Err(e) => {
                let err = RuntimeError::from(e);
                counter!("scope_decode_errors_total").increment(1);
                warn!(error = %err, "undecodable message");
                self.publish(&err.to_event(RequestId::default()));
                return Err(err);
            }
        };
        self.touch();
        debug!(kind = event.kind(), request_id = %event.request_id(), "event received");
        self.event_loop.post(move |state| state.handle(event));
        self.event_loop.tick();
        Ok(())
    }

    /// Push the end of life one lifetime into the future.
    pub(crate) fn touch(&self) {
        *self.eol.lock() = Instant::now() + self.settings.lifetime();
    }

    pub(crate) fn request_render(&self) {
        self.render_requested.store(true, Ordering::Release);
    }

    pub(crate) fn request_full_render(&self) {
        self.full_render_requested.store(true, Ordering::Release);
        self.request_render();
    }

    pub(crate) fn take_render_request(&self) -> bool {
        self.render_requested.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn take_full_render_request(&self) -> bool {
        self.full_render_requested.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub(crate) fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let attached = self.channel.lock().take();
        if let Some(attached) = attached {
            attached.subscription.unsubscribe();
        }
        self.event_loop.destroy();
        info!(scope_id = %self.id, "scope destroyed");
    }
}

/// Owning handle of a client session.
pub struct Scope {
    core: Arc<ScopeCore>,
}

impl Scope {
    /// Create a scope and start its event loop (and pump, if enabled).
    pub fn new(
        id: ScopeId,
        factories: Arc<Factories>,
        settings: &RuntimeSettings,
        subject: Arc<dyn Subject>,
    ) -> Result<Self, RuntimeError> {
        let loop_name: String = id.as_str().chars().take(8).collect();
        let core = Arc::new(ScopeCore {
            id,
            settings: settings.scope.clone(),
            application: settings.application.clone(),
            ptrs: PtrAllocator::new(),
            event_loop: EventLoop::new(loop_name),
            session: RwLock::new(Session {
                subject,
                locale: settings.application.default_locale.clone(),
                timezone: Tz::UTC,
                window_info: WindowInfo::default(),
            }),
            channel: Mutex::new(None),
            eol: Mutex::new(Instant::now() + settings.scope.lifetime()),
            destroyed: AtomicBool::new(false),
            render_requested: AtomicBool::new(false),
            full_render_requested: AtomicBool::new(false),
        });

        let state_core = core.clone();
        core.event_loop
            .start(move || ScopeState::new(state_core, factories))?;
        if let Some(interval) = core.settings.frame_interval() {
            if let Err(e) = spawn_pump(&core, interval) {
                core.destroy();
                return Err(e);
            }
        }
        info!(scope_id = %core.id, "scope created");
        Ok(Self { core })
    }

    /// Session id.
    pub fn id(&self) -> &ScopeId {
        &self.core.id
    }

    #[cfg(test)]
    pub(crate) fn core(&self) -> &Arc<ScopeCore> {
        &self.core
    }

    /// Attach a channel, detaching the previous one first.
    ///
    /// After this returns, the old channel's messages no longer reach the
    /// scope. Connecting a destroyed scope is logged and ignored.
    pub fn connect(&self, channel: Arc<dyn Channel>) {
        if self.is_destroyed() {
            warn!(scope_id = %self.core.id, "connect on destroyed scope ignored");
            return;
        }
        let mut slot = self.core.channel.lock();
        if let Some(previous) = slot.take() {
            previous.subscription.unsubscribe();
            debug!(scope_id = %self.core.id, "previous channel detached");
        }
        let weak: Weak<ScopeCore> = Arc::downgrade(&self.core);
        let handler: MessageHandler = Arc::new(move |bytes: &[u8]| match weak.upgrade() {
            Some(core) => core.handle_message(bytes),
            None => Err(RuntimeError::ScopeDestroyed),
        });
        let subscription = channel.subscribe(handler);
        *slot = Some(Attached { channel, subscription });
        drop(slot);
        self.core.touch();
        debug!(scope_id = %self.core.id, "channel attached");
    }

    /// Whether a channel is attached.
    pub fn is_connected(&self) -> bool {
        self.core.channel.lock().is_some()
    }

    /// Decode and enqueue one inbound message, then tick.
    ///
    /// Undecodable bytes are answered with an `INVALID_MESSAGE` error event
    /// and returned as an error.
    pub fn handle_message(&self, bytes: &[u8]) -> Result<(), RuntimeError> {
        self.core.handle_message(bytes)
    }

    /// Send an event to the attached channel.
    pub fn publish(&self, event: &ServerEvent) {
        self.core.publish(event);
    }

    /// Extend the lifetime and drain the event loop.
    pub fn tick(&self) {
        self.core.touch();
        self.core.event_loop.tick();
    }

    /// Instant after which the scope counts as expired.
    pub fn eol(&self) -> Instant {
        *self.core.eol.lock()
    }

    /// Whether `now` is past the end of life.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.eol()
    }

    /// Principal the scope acts for.
    pub fn subject(&self) -> Arc<dyn Subject> {
        self.core.session.read().subject.clone()
    }

    /// Detach the channel and stop the loop. Idempotent and non-blocking.
    pub fn destroy(&self) {
        self.core.destroy();
    }

    /// Finish queued work, then destroy.
    pub fn shutdown(&self) {
        self.core.event_loop.shutdown();
        self.core.destroy();
    }

    /// Block until the loop worker has torn down every component.
    pub fn join(&self) {
        self.core.event_loop.join();
    }

    /// Whether the scope was destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.core.is_destroyed()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.core.destroy();
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.core.id)
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}

/// Tick the loop every frame so work posted from inside it (or pending
/// invalidations) is not stranded until the next client message. The pump
/// does not extend the scope's lifetime.
fn spawn_pump(core: &Arc<ScopeCore>, interval: Duration) -> Result<(), RuntimeError> {
    let weak = Arc::downgrade(core);
    let dispatch = tracing::dispatcher::get_default(Clone::clone);
    let _ = thread::Builder::new()
        .name(format!("weft-pump-{}", core.event_loop.name()))
        .spawn(move || {
            tracing::dispatcher::with_default(&dispatch, || {
                loop {
                    thread::sleep(interval);
                    let Some(core) = weak.upgrade() else {
                        break;
                    };
                    if core.is_destroyed() {
                        break;
                    }
                    if core.take_render_request() {
                        core.event_loop
                            .post(|state| state.render_invalidated(RequestId::default()));
                    }
                    if core.event_loop.has_pending() {
                        core.event_loop.tick();
                    }
                }
                debug!("pump stopped");
            });
        })?;
    Ok(())
}
