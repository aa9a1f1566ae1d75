//! Time types for the ringrange protocol.
//!
//! Two distinct notions of time are used:
//!
//! - [`Timestamp`] / [`Duration`]: host time in nanoseconds, used for
//!   receive timeouts and the inter-exchange delay. All time values are
//!   passed explicitly, enabling deterministic simulation.
//! - [`DeviceTime`]: the transceiver's free-running 40-bit timestamp counter,
//!   one tick = 1 / (499.2 MHz × 128) ≈ 15.65 ps. It wraps, so all
//!   arithmetic on it is modular.

use core::ops::{Add, AddAssign, Mul, Sub, SubAssign};

/// Nanoseconds per UWB microsecond (512 / 499.2 µs), scaled by 1000.
const UUS_TO_NANOS_X1000: u64 = 1_025_641;

/// Host timestamp in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Zero timestamp (boot).
    pub const ZERO: Timestamp = Timestamp(0);

    /// Maximum timestamp.
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    /// Create a timestamp from nanoseconds.
    #[inline]
    pub const fn from_nanos(ns: u64) -> Self {
        Timestamp(ns)
    }

    /// Create a timestamp from microseconds.
    #[inline]
    pub const fn from_micros(us: u64) -> Self {
        Timestamp(us.saturating_mul(1_000))
    }

    /// Create a timestamp from milliseconds.
    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Timestamp(ms.saturating_mul(1_000_000))
    }

    /// Create a timestamp from seconds.
    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Timestamp(secs.saturating_mul(1_000_000_000))
    }

    /// Get the timestamp as nanoseconds.
    #[inline]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Get the timestamp as microseconds (truncated).
    #[inline]
    pub const fn as_micros(self) -> u64 {
        self.0 / 1_000
    }

    /// Get the timestamp as milliseconds (truncated).
    #[inline]
    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Saturating addition of a duration.
    #[inline]
    pub const fn saturating_add(self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_add(duration.0))
    }

    /// Saturating subtraction of another timestamp, returning a duration.
    #[inline]
    pub const fn saturating_sub(self, other: Timestamp) -> Duration {
        Duration(self.0.saturating_sub(other.0))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 + rhs.0)
    }
}

impl AddAssign<Duration> for Timestamp {
    #[inline]
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs.0;
    }
}

impl Sub for Timestamp {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Timestamp) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

/// Duration in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(u64);

impl Duration {
    /// Zero duration.
    pub const ZERO: Duration = Duration(0);

    /// Maximum duration.
    pub const MAX: Duration = Duration(u64::MAX);

    /// Create a duration from nanoseconds.
    #[inline]
    pub const fn from_nanos(ns: u64) -> Self {
        Duration(ns)
    }

    /// Create a duration from microseconds.
    #[inline]
    pub const fn from_micros(us: u64) -> Self {
        Duration(us.saturating_mul(1_000))
    }

    /// Create a duration from milliseconds.
    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Duration(ms.saturating_mul(1_000_000))
    }

    /// Create a duration from seconds.
    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Duration(secs.saturating_mul(1_000_000_000))
    }

    /// Create a duration from UWB microseconds (1 UUS = 512 / 499.2 µs).
    ///
    /// The transceiver's receive timeouts and turnaround delays are
    /// specified in this unit.
    #[inline]
    pub const fn from_uus(uus: u32) -> Self {
        Duration((uus as u64).saturating_mul(UUS_TO_NANOS_X1000) / 1_000)
    }

    /// Get the duration as nanoseconds.
    #[inline]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Get the duration as microseconds (truncated).
    #[inline]
    pub const fn as_micros(self) -> u64 {
        self.0 / 1_000
    }

    /// Get the duration as milliseconds (truncated).
    #[inline]
    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Saturating addition.
    #[inline]
    pub const fn saturating_add(self, other: Duration) -> Self {
        Duration(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction.
    #[inline]
    pub const fn saturating_sub(self, other: Duration) -> Self {
        Duration(self.0.saturating_sub(other.0))
    }
}

impl Add for Duration {
    type Output = Duration;

    #[inline]
    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0 + rhs.0)
    }
}

impl AddAssign for Duration {
    #[inline]
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs.0;
    }
}

impl Sub for Duration {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Duration) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

impl SubAssign for Duration {
    #[inline]
    fn sub_assign(&mut self, rhs: Duration) {
        self.0 -= rhs.0;
    }
}

impl Mul<u64> for Duration {
    type Output = Duration;

    #[inline]
    fn mul(self, rhs: u64) -> Duration {
        Duration(self.0 * rhs)
    }
}

/// Transceiver timestamp: a 40-bit wrapping tick counter.
///
/// Values are always kept reduced modulo 2^40.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Hash, Default)]
pub struct DeviceTime(u64);

impl DeviceTime {
    /// Width of the hardware counter.
    pub const BITS: u32 = 40;

    /// Mask selecting the valid counter bits.
    pub const MASK: u64 = (1 << Self::BITS) - 1;

    /// Counter value zero.
    pub const ZERO: DeviceTime = DeviceTime(0);

    /// Create a device time from a raw tick count (reduced modulo 2^40).
    #[inline]
    pub const fn from_ticks(ticks: u64) -> Self {
        DeviceTime(ticks & Self::MASK)
    }

    /// Raw 40-bit tick count.
    #[inline]
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// Low 32 bits, as carried in ranging frames.
    #[inline]
    pub const fn lo32(self) -> u32 {
        self.0 as u32
    }

    /// Bits 39..8, the value written to the delayed-transmit register.
    #[inline]
    pub const fn hi32(self) -> u32 {
        (self.0 >> 8) as u32
    }

    /// Add a tick count, wrapping at 2^40.
    #[inline]
    pub const fn wrapping_add_ticks(self, ticks: u64) -> Self {
        DeviceTime(self.0.wrapping_add(ticks) & Self::MASK)
    }

    /// Ticks from `earlier` to `self`, modulo 2^40.
    #[inline]
    pub const fn wrapping_ticks_since(self, earlier: DeviceTime) -> u64 {
        self.0.wrapping_sub(earlier.0) & Self::MASK
    }
}
