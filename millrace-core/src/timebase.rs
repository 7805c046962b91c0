//! Monotonic time base
//!
//! Time is derived from a free-running PWM counter: the wrap interrupt
//! counts periods and the live counter gives the position inside the
//! current period. Elapsed time is accumulated in clock cycles, so changing
//! the PWM frequency only starts a new epoch; it never moves the clock.
//!
//! ```text
//! cycles = base_cycles + ((overflows - base_overflows) * period + counter) * divider
//! ```
//!
//! The wrap tally is a wrapping `u32`. Before the distance from the epoch
//! base can approach that range the epoch is folded forward.

use millrace_hal::pwm::TickSource;

/// Elapsed wraps after which the epoch base is moved forward
pub const FOLD_THRESHOLD: u32 = 1 << 30;

/// Counter settings and reference point of the current epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
struct Epoch {
    divider: u32,
    /// Counts per wrap (top + 1)
    period: u32,
    base_overflows: u32,
    base_cycles: u64,
}

impl Epoch {
    fn cycles_at(&self, overflows: u32, counter: u16) -> u64 {
        let wraps = overflows.wrapping_sub(self.base_overflows) as u64;
        let counts = wraps * self.period as u64 + counter as u64;
        self.base_cycles + counts * self.divider as u64
    }
}

/// Convert clock cycles to microseconds without overflowing the product
pub fn cycles_to_us(cycles: u64, clock_hz: u32) -> u64 {
    let clock = clock_hz.max(1) as u64;
    (cycles / clock) * 1_000_000 + (cycles % clock) * 1_000_000 / clock
}

/// Millisecond/microsecond clock over a [`TickSource`]
pub struct TimeBase<T: TickSource> {
    ticks: T,
    clock_hz: u32,
    epoch: Epoch,
    /// Zero point of [`TimeBase::elapsed_ms`]
    origin_us: u64,
}

impl<T: TickSource> TimeBase<T> {
    /// Create a time base for a counter currently running with `divider`
    /// and `top`, clocked at `clock_hz`
    pub fn new(ticks: T, clock_hz: u32, divider: u8, top: u16) -> Self {
        let base_overflows = ticks.overflows();
        Self {
            ticks,
            clock_hz,
            epoch: Epoch {
                divider: divider.max(1) as u32,
                period: top as u32 + 1,
                base_overflows,
                base_cycles: 0,
            },
            origin_us: 0,
        }
    }

    /// Counter input clock in Hz
    pub fn clock_hz(&self) -> u32 {
        self.clock_hz
    }

    /// Read the wrap tally and counter as one consistent pair
    ///
    /// Must run with the wrap interrupt masked. A wrap that has happened
    /// but not been counted yet is added here, and the counter is re-read
    /// so it belongs to the new period.
    fn sample(&self) -> (u32, u16) {
        let overflows = self.ticks.overflows();
        let counter = self.ticks.counter();
        if self.ticks.wrap_pending() {
            (overflows.wrapping_add(1), self.ticks.counter())
        } else {
            (overflows, counter)
        }
    }

    fn fold(&mut self, overflows: u32) {
        if overflows.wrapping_sub(self.epoch.base_overflows) >= FOLD_THRESHOLD {
            self.epoch.base_cycles = self.epoch.cycles_at(overflows, 0);
            self.epoch.base_overflows = overflows;
        }
    }

    /// Clock cycles since the time base was created
    pub fn now_cycles(&mut self) -> u64 {
        critical_section::with(|_| {
            let (overflows, counter) = self.sample();
            self.fold(overflows);
            self.epoch.cycles_at(overflows, counter)
        })
    }

    pub fn now_us(&mut self) -> u64 {
        cycles_to_us(self.now_cycles(), self.clock_hz)
    }

    pub fn now_ms(&mut self) -> u64 {
        self.now_us() / 1000
    }

    /// Milliseconds since the last [`TimeBase::reset_epoch`]
    pub fn elapsed_ms(&mut self) -> u64 {
        self.now_us().saturating_sub(self.origin_us) / 1000
    }

    /// Restart the elapsed-time origin at the current instant
    pub fn reset_epoch(&mut self) {
        self.origin_us = self.now_us();
    }

    /// Switch the counter to a new divider and top without losing time
    ///
    /// `reprogram` must restart the counter from zero with the new settings.
    /// It runs inside the same critical section as the final sample of the
    /// old epoch, so no wrap can be lost or counted twice.
    pub fn begin_epoch<R: FnOnce()>(&mut self, divider: u8, top: u16, reprogram: R) {
        critical_section::with(|_| {
            let (overflows, counter) = self.sample();
            let cycles = self.epoch.cycles_at(overflows, counter);

            reprogram();
            // Any pending wrap was already counted by the sample above
            self.ticks.acknowledge_wrap();

            self.epoch = Epoch {
                divider: divider.max(1) as u32,
                period: top as u32 + 1,
                base_overflows: self.ticks.overflows(),
                base_cycles: cycles,
            };
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use proptest::prelude::*;

    const CLOCK_HZ: u32 = 125_000_000;

    /// Counter whose registers the test pokes directly
    struct SimCounter {
        counter: Cell<u16>,
        overflows: Cell<u32>,
        pending: Cell<bool>,
        top: Cell<u16>,
    }

    impl SimCounter {
        fn new() -> Self {
            Self {
                counter: Cell::new(0),
                overflows: Cell::new(0),
                pending: Cell::new(false),
                top: Cell::new(u16::MAX),
            }
        }

        /// Run the wrap interrupt if it is pending
        fn service(&self) {
            if self.pending.replace(false) {
                self.overflows.set(self.overflows.get().wrapping_add(1));
            }
        }

        /// Let the counter run `counts` steps, less than one period; a wrap
        /// raises the interrupt flag, and the interrupt gets to run first if
        /// a second wrap would otherwise go unserviced
        fn advance(&self, counts: u16) {
            let period = self.top.get() as u32 + 1;
            let next = self.counter.get() as u32 + counts as u32 % period;
            if next >= period {
                self.service();
                self.pending.set(true);
            }
            self.counter.set((next % period) as u16);
        }
    }

    #[derive(Debug, Clone)]
    enum Step {
        Advance(u16),
        Interrupt,
        Reprogram { divider: u8, top: u16 },
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            4 => any::<u16>().prop_map(Step::Advance),
            2 => Just(Step::Interrupt),
            1 => (1u8..=255, 1u16..=u16::MAX)
                .prop_map(|(divider, top)| Step::Reprogram { divider, top }),
        ]
    }

    impl TickSource for &SimCounter {
        fn counter(&self) -> u16 {
            self.counter.get()
        }

        fn wrap_pending(&self) -> bool {
            self.pending.get()
        }

        fn overflows(&self) -> u32 {
            self.overflows.get()
        }

        fn acknowledge_wrap(&mut self) {
            self.pending.set(false);
        }
    }

    #[test]
    fn test_cycles_to_us() {
        assert_eq!(cycles_to_us(125, CLOCK_HZ), 1);
        assert_eq!(cycles_to_us(125_000_000, CLOCK_HZ), 1_000_000);
        // Large values do not overflow the intermediate product
        assert_eq!(cycles_to_us(u64::MAX / 2, CLOCK_HZ) / 1_000_000, u64::MAX / 2 / 125_000_000);
    }

    #[test]
    fn test_time_from_tally_and_counter() {
        let sim = SimCounter::new();
        // 2 kHz period: 62500 counts at divider 1 = 500 µs
        let mut tb = TimeBase::new(&sim, CLOCK_HZ, 1, 62_499);

        sim.overflows.set(3);
        sim.counter.set(12_500);
        assert_eq!(tb.now_cycles(), 3 * 62_500 + 12_500);
        assert_eq!(tb.now_us(), 1600);
    }

    #[test]
    fn test_pending_wrap_counted_once() {
        let sim = SimCounter::new();
        let mut tb = TimeBase::new(&sim, CLOCK_HZ, 1, 62_499);

        sim.overflows.set(3);
        sim.counter.set(10);
        sim.pending.set(true);
        assert_eq!(tb.now_cycles(), 4 * 62_500 + 10);

        // The interrupt runs and counts the wrap itself
        sim.pending.set(false);
        sim.overflows.set(4);
        assert_eq!(tb.now_cycles(), 4 * 62_500 + 10);
    }

    #[test]
    fn test_new_epoch_keeps_time_continuous() {
        let sim = SimCounter::new();
        let mut tb = TimeBase::new(&sim, CLOCK_HZ, 1, 62_499);

        sim.overflows.set(7);
        sim.counter.set(30_000);
        sim.pending.set(true);
        let before = tb.now_cycles();

        tb.begin_epoch(20, 62_499, || sim.counter.set(0));
        assert!(!sim.pending.get());
        assert_eq!(tb.now_cycles(), before);

        // One wrap in the new epoch is 62500 counts at divider 20
        sim.overflows.set(8);
        sim.counter.set(5);
        assert_eq!(tb.now_cycles(), before + (62_500 + 5) * 20);
    }

    #[test]
    fn test_epoch_fold_preserves_time() {
        let sim = SimCounter::new();
        let mut tb = TimeBase::new(&sim, CLOCK_HZ, 2, 999);

        sim.overflows.set(FOLD_THRESHOLD + 5);
        sim.counter.set(17);
        let expected = ((FOLD_THRESHOLD as u64 + 5) * 1000 + 17) * 2;
        assert_eq!(tb.now_cycles(), expected);
        // Second read runs against the folded base
        assert_eq!(tb.now_cycles(), expected);

        sim.overflows.set(FOLD_THRESHOLD + 6);
        assert_eq!(tb.now_cycles(), expected + 2000);
    }

    #[test]
    fn test_tally_wraparound() {
        let sim = SimCounter::new();
        sim.overflows.set(u32::MAX - 1);
        let mut tb = TimeBase::new(&sim, CLOCK_HZ, 1, 124);

        sim.overflows.set(2);
        // MAX-1 -> MAX -> 0 -> 1 -> 2 is four wraps of one microsecond
        assert_eq!(tb.now_us(), 4);
    }

    #[test]
    fn test_elapsed_restarts_on_reset() {
        let sim = SimCounter::new();
        // 1 ms per wrap
        let mut tb = TimeBase::new(&sim, CLOCK_HZ, 125, 999);

        sim.overflows.set(1500);
        assert_eq!(tb.elapsed_ms(), 1500);

        tb.reset_epoch();
        assert_eq!(tb.elapsed_ms(), 0);

        sim.overflows.set(1742);
        assert_eq!(tb.elapsed_ms(), 242);
        assert_eq!(tb.now_ms(), 1742);
    }

    proptest! {
        #[test]
        fn prop_time_never_goes_backwards(steps in prop::collection::vec(step(), 1..300)) {
            let sim = SimCounter::new();
            sim.top.set(62_499);
            let mut tb = TimeBase::new(&sim, CLOCK_HZ, 1, 62_499);
            let mut last = tb.now_cycles();

            for step in steps {
                let before = tb.now_cycles();
                prop_assert!(before >= last);
                match step {
                    Step::Advance(counts) => sim.advance(counts),
                    Step::Interrupt => {
                        sim.service();
                        // Counting a wrap already seen as pending moves nothing
                        prop_assert_eq!(tb.now_cycles(), before);
                    }
                    Step::Reprogram { divider, top } => {
                        tb.begin_epoch(divider, top, || {
                            sim.top.set(top);
                            sim.counter.set(0);
                        });
                        prop_assert!(!sim.pending.get());
                        prop_assert_eq!(tb.now_cycles(), before);
                    }
                }
                last = tb.now_cycles();
                prop_assert!(last >= before);
            }
        }
    }
}
