//! Ground traffic bookkeeping, free of signals and timers.

use airfield_config::{Config, ARRIVAL_BATCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficLimits {
    /// Takeoffs after which traffic stops for good
    pub cap: u32,
    /// Planes the ground holds at most
    pub planes_limit: u32,
    /// Planes at which the runway is reported overloaded
    pub overload_threshold: u32,
    /// Arrival signals sent to the radio over the whole run
    pub max_arrival_signals: u32,
}

impl TrafficLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cap: config.airfield.total_takeoffs,
            planes_limit: config.ground.planes_limit,
            overload_threshold: config.ground.overload_threshold,
            max_arrival_signals: config.ground.max_arrival_signals,
        }
    }
}

impl Default for TrafficLimits {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Whether new planes were announced to the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Announce {
    /// Send one arrival signal now
    Send,
    /// No radio pid recorded yet
    NoRadio,
    /// Signal budget already spent
    LimitReached,
}

/// What one traffic tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tick {
    /// Overload newly crossed on this tick
    pub overload_reported: bool,
    pub added: u32,
    /// `None` when no planes were added
    pub announce: Option<Announce>,
}

#[derive(Debug, Clone)]
pub struct GroundTraffic {
    limits: TrafficLimits,
    planes: u32,
    takeoffs: u32,
    overloaded: bool,
    arrivals_sent: u32,
}

impl GroundTraffic {
    pub fn new(limits: TrafficLimits) -> Self {
        Self {
            limits,
            planes: 0,
            takeoffs: 0,
            overloaded: false,
            arrivals_sent: 0,
        }
    }

    pub fn planes(&self) -> u32 {
        self.planes
    }

    pub fn takeoffs(&self) -> u32 {
        self.takeoffs
    }

    pub fn arrivals_sent(&self) -> u32 {
        self.arrivals_sent
    }

    pub fn is_overloaded(&self) -> bool {
        self.overloaded
    }

    /// Traffic stops once every takeoff has been observed.
    pub fn stopped(&self) -> bool {
        self.takeoffs >= self.limits.cap
    }

    /// One period of traffic: check overload, then top up the queue and
    /// decide whether the radio hears about it.
    pub fn tick(&mut self, radio_known: bool) -> Tick {
        if self.stopped() {
            return Tick::default();
        }

        let mut tick = Tick::default();
        if self.planes >= self.limits.overload_threshold {
            tick.overload_reported = !self.overloaded;
            self.overloaded = true;
        } else {
            self.overloaded = false;
        }

        let room = self.limits.planes_limit.saturating_sub(self.planes);
        let added = room.min(ARRIVAL_BATCH);
        if added == 0 {
            return tick;
        }
        self.planes += added;
        tick.added = added;

        tick.announce = Some(if !radio_known {
            Announce::NoRadio
        } else if self.arrivals_sent >= self.limits.max_arrival_signals {
            Announce::LimitReached
        } else {
            self.arrivals_sent += 1;
            Announce::Send
        });
        tick
    }

    /// A batch of takeoffs was confirmed. Returns true when this batch
    /// stopped the traffic.
    pub fn batch_completed(&mut self) -> bool {
        let was_stopped = self.stopped();
        self.takeoffs += ARRIVAL_BATCH;
        self.planes = self.planes.saturating_sub(ARRIVAL_BATCH);
        if self.planes < self.limits.overload_threshold {
            self.overloaded = false;
        }
        !was_stopped && self.stopped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_tick_announces_five_planes() {
        let mut ground = GroundTraffic::new(TrafficLimits::default());
        let tick = ground.tick(true);

        assert_eq!(tick.added, 5);
        assert_eq!(tick.announce, Some(Announce::Send));
        assert!(!tick.overload_reported);
        assert_eq!(ground.planes(), 5);
        assert_eq!(ground.arrivals_sent(), 1);
    }

    #[test]
    fn test_without_radio_planes_pile_up_unannounced() {
        let mut ground = GroundTraffic::new(TrafficLimits::default());
        let ticks: Vec<Tick> = (0..5).map(|_| ground.tick(false)).collect();

        assert!(ticks[..4]
            .iter()
            .all(|t| t.announce == Some(Announce::NoRadio)));
        // Limit of 20 reached: nothing more to add
        assert_eq!(ticks[4].added, 0);
        assert_eq!(ticks[4].announce, None);
        assert_eq!(ground.planes(), 20);
        assert_eq!(ground.arrivals_sent(), 0);
    }

    #[test]
    fn test_overload_reported_once_per_crossing() {
        let mut ground = GroundTraffic::new(TrafficLimits::default());
        ground.tick(true); // 5
        ground.tick(true); // 10

        assert!(ground.tick(true).overload_reported); // 15, overloaded
        assert!(!ground.tick(true).overload_reported); // still overloaded
        assert!(ground.is_overloaded());

        ground.batch_completed(); // 15
        ground.batch_completed(); // 10
        ground.batch_completed(); // 5, back below threshold
        assert!(!ground.is_overloaded());

        ground.tick(true); // 10
        assert!(ground.tick(true).overload_reported);
    }

    #[test]
    fn test_arrival_signals_are_capped() {
        let limits = TrafficLimits {
            max_arrival_signals: 2,
            ..TrafficLimits::default()
        };
        let mut ground = GroundTraffic::new(limits);

        assert_eq!(ground.tick(true).announce, Some(Announce::Send));
        assert_eq!(ground.tick(true).announce, Some(Announce::Send));
        assert_eq!(ground.tick(true).announce, Some(Announce::LimitReached));
        assert_eq!(ground.arrivals_sent(), 2);
    }

    #[test]
    fn test_traffic_stops_after_last_batch() {
        let mut ground = GroundTraffic::new(TrafficLimits::default());
        for _ in 0..4 {
            ground.tick(true);
        }

        assert!(!ground.batch_completed());
        assert!(!ground.batch_completed());
        assert!(!ground.batch_completed());
        assert!(ground.batch_completed());
        assert!(ground.stopped());
        assert_eq!(ground.takeoffs(), 20);
        assert_eq!(ground.planes(), 0);

        // Stopped traffic adds nothing
        assert_eq!(ground.tick(true), Tick::default());
        assert!(!ground.batch_completed());
    }

    #[test]
    fn test_batch_never_drives_planes_negative() {
        let mut ground = GroundTraffic::new(TrafficLimits::default());
        ground.batch_completed();
        assert_eq!(ground.planes(), 0);
        assert_eq!(ground.takeoffs(), 5);
    }
}
