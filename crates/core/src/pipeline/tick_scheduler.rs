//! Timer-driven host for the frame loop.
//!
//! Two independent timers: a one-shot refresh timer re-armed after each
//! tick completes (so a slow tick delays the next one instead of queueing
//! up), and a fixed-period counter for elapsed time. Cancelling a timer
//! swaps it for a channel that never fires.

use std::time::{Duration, Instant};

use crossbeam_channel::{never, select, Receiver};

/// Imperative input from the host (keyboard, UI).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostCommand {
    Start,
    Quit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// A refresh is due. The refresh timer is disarmed until re-armed.
    Refresh(Instant),
    /// One counter period elapsed.
    Counter(Instant),
    Control(HostCommand),
    /// The control channel closed; no further commands will arrive.
    Disconnected,
}

pub struct TickScheduler {
    refresh_period: Duration,
    counter_period: Duration,
    refresh: Receiver<Instant>,
    counter: Receiver<Instant>,
    control: Receiver<HostCommand>,
    refresh_armed: bool,
    counter_running: bool,
}

impl TickScheduler {
    pub fn new(refresh_hz: u32, counter_period: Duration, control: Receiver<HostCommand>) -> Self {
        Self {
            refresh_period: Duration::from_secs_f64(1.0 / refresh_hz.max(1) as f64),
            counter_period,
            refresh: never(),
            counter: never(),
            control,
            refresh_armed: false,
            counter_running: false,
        }
    }

    pub fn refresh_period(&self) -> Duration {
        self.refresh_period
    }

    /// Schedule the next refresh one period from now. Replaces any pending one.
    pub fn arm_refresh(&mut self) {
        self.refresh = crossbeam_channel::at(Instant::now() + self.refresh_period);
        self.refresh_armed = true;
    }

    pub fn cancel_refresh(&mut self) {
        self.refresh = never();
        self.refresh_armed = false;
    }

    /// Start the counter if it is not already running.
    pub fn start_counter(&mut self) {
        if !self.counter_running {
            self.counter = crossbeam_channel::tick(self.counter_period);
            self.counter_running = true;
        }
    }

    pub fn stop_counter(&mut self) {
        self.counter = never();
        self.counter_running = false;
    }

    pub fn cancel_all(&mut self) {
        self.cancel_refresh();
        self.stop_counter();
    }

    pub fn is_refresh_armed(&self) -> bool {
        self.refresh_armed
    }

    pub fn is_counter_running(&self) -> bool {
        self.counter_running
    }

    /// Block until the next event. Blocks forever if nothing is armed and
    /// the control channel has been reported disconnected.
    pub fn next_event(&mut self) -> SchedulerEvent {
        let fired = select! {
            recv(self.refresh) -> at => Fired::Refresh(at.ok()),
            recv(self.counter) -> at => Fired::Counter(at.ok()),
            recv(self.control) -> cmd => Fired::Control(cmd.ok()),
        };
        self.settle(fired)
    }

    /// As [`next_event`](Self::next_event) but gives up after `timeout`.
    pub fn next_event_timeout(&mut self, timeout: Duration) -> Option<SchedulerEvent> {
        let fired = select! {
            recv(self.refresh) -> at => Fired::Refresh(at.ok()),
            recv(self.counter) -> at => Fired::Counter(at.ok()),
            recv(self.control) -> cmd => Fired::Control(cmd.ok()),
            default(timeout) => return None,
        };
        Some(self.settle(fired))
    }

    fn settle(&mut self, fired: Fired) -> SchedulerEvent {
        match fired {
            Fired::Refresh(at) => {
                self.cancel_refresh();
                SchedulerEvent::Refresh(at.unwrap_or_else(Instant::now))
            }
            Fired::Counter(at) => SchedulerEvent::Counter(at.unwrap_or_else(Instant::now)),
            Fired::Control(Some(cmd)) => SchedulerEvent::Control(cmd),
            Fired::Control(None) => {
                self.control = never();
                SchedulerEvent::Disconnected
            }
        }
    }
}

enum Fired {
    Refresh(Option<Instant>),
    Counter(Option<Instant>),
    Control(Option<HostCommand>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    const SHORT: Duration = Duration::from_millis(150);

    fn scheduler(hz: u32, counter_ms: u64) -> (TickScheduler, crossbeam_channel::Sender<HostCommand>) {
        let (tx, rx) = unbounded();
        (TickScheduler::new(hz, Duration::from_millis(counter_ms), rx), tx)
    }

    #[test]
    fn test_nothing_fires_when_unarmed() {
        let (mut s, _tx) = scheduler(100, 10);
        assert_eq!(s.next_event_timeout(SHORT), None);
    }

    #[test]
    fn test_refresh_fires_once_per_arm() {
        let (mut s, _tx) = scheduler(200, 10);
        s.arm_refresh();
        assert!(matches!(s.next_event_timeout(SHORT), Some(SchedulerEvent::Refresh(_))));
        assert!(!s.is_refresh_armed());
        // Not re-armed: no second refresh
        assert_eq!(s.next_event_timeout(SHORT), None);
    }

    #[test]
    fn test_refresh_waits_one_period_after_arming() {
        let (mut s, _tx) = scheduler(20, 10);
        let armed_at = Instant::now();
        s.arm_refresh();
        let Some(SchedulerEvent::Refresh(at)) = s.next_event_timeout(Duration::from_secs(1)) else {
            panic!("expected refresh");
        };
        assert!(at.duration_since(armed_at) >= Duration::from_millis(49));
    }

    #[test]
    fn test_cancelled_refresh_never_fires() {
        let (mut s, _tx) = scheduler(200, 10);
        s.arm_refresh();
        s.cancel_refresh();
        assert_eq!(s.next_event_timeout(SHORT), None);
    }

    #[test]
    fn test_counter_is_periodic_and_stoppable() {
        let (mut s, _tx) = scheduler(1, 10);
        s.start_counter();
        for _ in 0..3 {
            assert!(matches!(s.next_event_timeout(SHORT), Some(SchedulerEvent::Counter(_))));
        }
        s.stop_counter();
        assert_eq!(s.next_event_timeout(SHORT), None);
    }

    #[test]
    fn test_cancel_all_silences_both_timers() {
        let (mut s, _tx) = scheduler(200, 10);
        s.arm_refresh();
        s.start_counter();
        s.cancel_all();
        assert!(!s.is_counter_running());
        assert_eq!(s.next_event_timeout(SHORT), None);
    }

    #[test]
    fn test_control_commands_are_delivered() {
        let (mut s, tx) = scheduler(1, 1000);
        tx.send(HostCommand::Start).unwrap();
        tx.send(HostCommand::Quit).unwrap();
        assert_eq!(s.next_event_timeout(SHORT), Some(SchedulerEvent::Control(HostCommand::Start)));
        assert_eq!(s.next_event_timeout(SHORT), Some(SchedulerEvent::Control(HostCommand::Quit)));
    }

    #[test]
    fn test_disconnect_reported_once() {
        let (mut s, tx) = scheduler(1, 1000);
        drop(tx);
        assert_eq!(s.next_event_timeout(SHORT), Some(SchedulerEvent::Disconnected));
        assert_eq!(s.next_event_timeout(SHORT), None);
    }

    #[test]
    fn test_refresh_hz_zero_is_clamped() {
        let (s, _tx) = scheduler(0, 100);
        assert_eq!(s.refresh_period(), Duration::from_secs(1));
    }
}
