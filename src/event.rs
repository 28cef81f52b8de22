//! Interrupt-to-main-loop event bridge (spec.md 3, 4.3).
//!
//! A fixed-capacity ring buffer is the only object legitimately touched
//! from both ISR and main-loop context. `post` is the producer (called
//! with interrupts already masked by the calling handler); `poll` is the
//! sole consumer, called only from the main loop. Overflow drops the
//! oldest event so the newest input is never lost, matching spec.md 4.3
//! and the error taxonomy in spec.md 7.
//!
//! Modeled on the original `event_t` shape in
//! `original_source/pozitron_os/include/core/event.h`, widened with the
//! 64-entry ring discipline instead of the original fixed-size static
//! array which did not distinguish "full" from "empty" by a separate
//! count field.

/// Default ring capacity per spec.md 2 "Event queue".
pub const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    None,
    KeyPress,
    KeyRelease,
    MouseMove,
    MouseClick,
    MouseRelease,
    TimerTick,
    Quit,
}

/// A single queued event: kind, two payload words, and the tick count at
/// post time. For mouse events `data1`/`data2` encode `(x, y)` with the
/// button index folded into the high byte of `data2` by the caller; for
/// keys `data1` carries the raw scancode and `data2` the ASCII
/// translation (kept, not overwritten — see spec.md 9 open question 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub data1: u32,
    pub data2: u32,
    pub timestamp: u64,
}

impl Event {
    pub const NONE: Event = Event {
        kind: EventKind::None,
        data1: 0,
        data2: 0,
        timestamp: 0,
    };

    pub fn new(kind: EventKind, data1: u32, data2: u32) -> Event {
        Event {
            kind,
            data1,
            data2,
            timestamp: 0,
        }
    }
}

/// Single-producer/single-consumer ring buffer of fixed capacity `N`.
///
/// No atomics are modeled here: the producer runs with interrupts masked
/// (the ISR calling convention spec.md 5 mandates), and the consumer runs
/// only from the main loop after interrupts are enabled between ticks, so
/// the two sides never race within this type itself — the mutual
/// exclusion is "at most one of {ISR, main loop} executing at a time",
/// which the interrupt-masking discipline already provides.
pub struct EventQueue<const N: usize> {
    buf: [Event; N],
    head: usize,
    tail: usize,
    count: usize,
    ticks: u64,
}

impl<const N: usize> EventQueue<N> {
    pub const fn new() -> EventQueue<N> {
        EventQueue {
            buf: [Event::NONE; N],
            head: 0,
            tail: 0,
            count: 0,
            ticks: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == N
    }

    /// Records the current tick count used to stamp posted events. Called
    /// by the PIT handler once per tick.
    pub fn set_ticks(&mut self, ticks: u64) {
        self.ticks = ticks;
    }

    /// Producer side: called from ISR context. Drops the oldest event on
    /// overflow (spec.md 4.3, 7).
    pub fn post(&mut self, mut event: Event) {
        event.timestamp = self.ticks;
        if self.count == N {
            self.head = (self.head + 1) % N;
            self.count -= 1;
        }
        self.buf[self.tail] = event;
        self.tail = (self.tail + 1) % N;
        self.count += 1;
    }

    /// Consumer side: called only from the main loop. Returns `true` and
    /// writes the popped event into `out` if one was available.
    pub fn poll(&mut self, out: &mut Event) -> bool {
        if self.count == 0 {
            return false;
        }
        *out = self.buf[self.head];
        self.head = (self.head + 1) % N;
        self.count -= 1;
        true
    }
}

impl<const N: usize> Default for EventQueue<N> {
    fn default() -> Self {
        EventQueue::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_preserved() {
        let mut q: EventQueue<4> = EventQueue::new();
        q.post(Event::new(EventKind::KeyPress, 0x1E, 0));
        q.post(Event::new(EventKind::KeyRelease, 0x1E, 0));
        let mut out = Event::NONE;
        assert!(q.poll(&mut out));
        assert_eq!(out.kind, EventKind::KeyPress);
        assert!(q.poll(&mut out));
        assert_eq!(out.kind, EventKind::KeyRelease);
        assert!(!q.poll(&mut out));
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut q: EventQueue<2> = EventQueue::new();
        q.post(Event::new(EventKind::KeyPress, 1, 0));
        q.post(Event::new(EventKind::KeyPress, 2, 0));
        q.post(Event::new(EventKind::KeyPress, 3, 0));
        assert_eq!(q.len(), 2);
        let mut out = Event::NONE;
        assert!(q.poll(&mut out));
        assert_eq!(out.data1, 2, "oldest (1) must have been dropped");
        assert!(q.poll(&mut out));
        assert_eq!(out.data1, 3);
    }

    #[test]
    fn bounded_at_capacity() {
        let mut q: EventQueue<3> = EventQueue::new();
        for i in 0..10u32 {
            q.post(Event::new(EventKind::TimerTick, i, 0));
        }
        assert_eq!(q.len(), 3);
        assert!(q.is_full());
    }

    #[test]
    fn timestamp_stamped_at_post_time() {
        let mut q: EventQueue<4> = EventQueue::new();
        q.set_ticks(42);
        q.post(Event::new(EventKind::TimerTick, 0, 0));
        q.set_ticks(43);
        let mut out = Event::NONE;
        q.poll(&mut out);
        assert_eq!(out.timestamp, 42);
    }
}
