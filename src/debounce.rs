use std::{marker::PhantomData, time::Duration};

use calloop::{
    LoopHandle, RegistrationToken,
    timer::{TimeoutAction, Timer},
};

use crate::DaemonError;

/// A cancellable one-shot timer with restart semantics: arming while a timer
/// is live cancels it first, so at most one firing is ever pending and the
/// deadline is always measured from the most recent arm.
///
/// Timer callbacks run on the event-loop thread, same as arm/cancel, so an
/// armed timer and its firing cannot race.
pub struct DebounceHandle<T> {
    token: Option<RegistrationToken>,
    _data: PhantomData<fn(&mut T)>,
}

impl<T> Default for DebounceHandle<T> {
    fn default() -> Self {
        Self {
            token: None,
            _data: PhantomData,
        }
    }
}

impl<T: 'static> DebounceHandle<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the timer. `slot` must return this handle back out of the loop
    /// data so the firing can mark itself expired before `action` runs.
    pub fn arm(
        &mut self,
        loop_handle: &LoopHandle<'static, T>,
        delay: Duration,
        slot: fn(&mut T) -> &mut DebounceHandle<T>,
        action: fn(&mut T),
    ) -> Result<(), DaemonError> {
        self.cancel(loop_handle);

        let token = loop_handle
            .insert_source(Timer::from_duration(delay), move |_, _, data| {
                slot(data).token = None;
                action(data);
                TimeoutAction::Drop
            })
            .map_err(|err| {
                DaemonError::EventLoop(format!("failed to arm debounce timer: {err}"))
            })?;

        self.token = Some(token);
        Ok(())
    }

    /// Cancels any pending firing. No-op when not armed.
    pub fn cancel(&mut self, loop_handle: &LoopHandle<'static, T>) {
        if let Some(token) = self.token.take() {
            loop_handle.remove(token);
        }
    }

    pub fn is_armed(&self) -> bool {
        self.token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calloop::EventLoop;
    use std::time::Instant;

    struct Counter {
        loop_handle: LoopHandle<'static, Counter>,
        timer: DebounceHandle<Counter>,
        fired: u32,
    }

    fn timer_slot(counter: &mut Counter) -> &mut DebounceHandle<Counter> {
        &mut counter.timer
    }

    fn bump(counter: &mut Counter) {
        counter.fired += 1;
    }

    fn dispatch_for(event_loop: &mut EventLoop<'static, Counter>, counter: &mut Counter, total: Duration) {
        let deadline = Instant::now() + total;
        while Instant::now() < deadline {
            event_loop
                .dispatch(Some(Duration::from_millis(5)), counter)
                .unwrap();
        }
    }

    fn setup() -> (EventLoop<'static, Counter>, Counter) {
        let event_loop = EventLoop::try_new().unwrap();
        let counter = Counter {
            loop_handle: event_loop.handle(),
            timer: DebounceHandle::new(),
            fired: 0,
        };
        (event_loop, counter)
    }

    #[test]
    fn fires_exactly_once_per_arm() {
        let (mut event_loop, mut counter) = setup();
        let handle = counter.loop_handle.clone();
        counter
            .timer
            .arm(&handle, Duration::from_millis(10), timer_slot, bump)
            .unwrap();
        assert!(counter.timer.is_armed());

        dispatch_for(&mut event_loop, &mut counter, Duration::from_millis(60));
        assert_eq!(counter.fired, 1);
        assert!(!counter.timer.is_armed());
    }

    #[test]
    fn rearm_restarts_instead_of_doubling() {
        let (mut event_loop, mut counter) = setup();
        let handle = counter.loop_handle.clone();
        counter
            .timer
            .arm(&handle, Duration::from_millis(30), timer_slot, bump)
            .unwrap();
        counter
            .timer
            .arm(&handle, Duration::from_millis(30), timer_slot, bump)
            .unwrap();

        // Only the second arm's deadline counts, and only once.
        dispatch_for(&mut event_loop, &mut counter, Duration::from_millis(100));
        assert_eq!(counter.fired, 1);
    }

    #[test]
    fn restart_deadline_counts_from_last_arm() {
        let (mut event_loop, mut counter) = setup();
        let handle = counter.loop_handle.clone();
        counter
            .timer
            .arm(&handle, Duration::from_millis(50), timer_slot, bump)
            .unwrap();
        dispatch_for(&mut event_loop, &mut counter, Duration::from_millis(30));
        assert_eq!(counter.fired, 0);

        let rearmed_at = Instant::now();
        counter
            .timer
            .arm(&handle, Duration::from_millis(50), timer_slot, bump)
            .unwrap();
        while counter.fired == 0 && rearmed_at.elapsed() < Duration::from_secs(2) {
            event_loop
                .dispatch(Some(Duration::from_millis(5)), &mut counter)
                .unwrap();
        }
        assert_eq!(counter.fired, 1);
        // The original deadline (20 ms away at re-arm time) must not survive.
        assert!(rearmed_at.elapsed() >= Duration::from_millis(45));

        // A fired handle can be armed again.
        counter
            .timer
            .arm(&handle, Duration::from_millis(10), timer_slot, bump)
            .unwrap();
        dispatch_for(&mut event_loop, &mut counter, Duration::from_millis(60));
        assert_eq!(counter.fired, 2);
    }

    #[test]
    fn cancel_suppresses_firing_and_is_idempotent() {
        let (mut event_loop, mut counter) = setup();
        let handle = counter.loop_handle.clone();
        counter
            .timer
            .arm(&handle, Duration::from_millis(10), timer_slot, bump)
            .unwrap();
        counter.timer.cancel(&handle);
        counter.timer.cancel(&handle);
        assert!(!counter.timer.is_armed());

        dispatch_for(&mut event_loop, &mut counter, Duration::from_millis(40));
        assert_eq!(counter.fired, 0);
    }
}
