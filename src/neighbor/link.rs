//! Link quality estimation from received signal strength.

/// Largest meaningful route cost; anything at or above is unreachable.
pub const MAX_ROUTE_COST: u8 = 16;

/// Default receiver noise floor used to turn RSS into link margin.
pub const DEFAULT_NOISE_FLOOR_DBM: i8 = -100;

const MARGIN_LQ3: u8 = 20;
const MARGIN_LQ2: u8 = 10;
const MARGIN_LQ1: u8 = 2;

/// Map link margin (dB above noise floor) to a link quality 0..=3.
pub fn link_quality_from_margin(margin: u8) -> u8 {
    match margin {
        m if m > MARGIN_LQ3 => 3,
        m if m > MARGIN_LQ2 => 2,
        m if m > MARGIN_LQ1 => 1,
        _ => 0,
    }
}

/// One-hop cost of a link of the given quality.
pub fn link_quality_to_cost(link_quality: u8) -> u8 {
    match link_quality {
        3 => 1,
        2 => 2,
        1 => 4,
        _ => MAX_ROUTE_COST,
    }
}

/// Received-signal statistics for one neighbor link.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkInfo {
    /// Exponentially weighted RSS average in 1/8 dBm units.
    average_x8: Option<i32>,
    last_rss: Option<i8>,
    noise_floor: i8,
}

impl LinkInfo {
    pub fn new(noise_floor: i8) -> Self {
        Self {
            average_x8: None,
            last_rss: None,
            noise_floor,
        }
    }

    /// Fold in a new RSS sample with weight 1/8.
    pub fn add_rss(&mut self, rss: i8) {
        let sample = (rss as i32) * 8;
        self.average_x8 = Some(match self.average_x8 {
            None => sample,
            Some(avg) => avg + (sample - avg) / 8,
        });
        self.last_rss = Some(rss);
    }

    pub fn clear(&mut self) {
        self.average_x8 = None;
        self.last_rss = None;
    }

    pub fn average_rss(&self) -> Option<i8> {
        self.average_x8
            .map(|avg| (avg / 8).clamp(i8::MIN as i32, i8::MAX as i32) as i8)
    }

    pub fn last_rss(&self) -> Option<i8> {
        self.last_rss
    }

    /// Link margin in dB, zero when nothing has been heard.
    pub fn link_margin(&self) -> u8 {
        self.average_rss()
            .map(|rss| (rss as i16 - self.noise_floor as i16).clamp(0, u8::MAX as i16) as u8)
            .unwrap_or(0)
    }

    /// Inbound link quality 0..=3.
    pub fn link_quality_in(&self) -> u8 {
        link_quality_from_margin(self.link_margin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_margin_thresholds() {
        assert_eq!(link_quality_from_margin(0), 0);
        assert_eq!(link_quality_from_margin(2), 0);
        assert_eq!(link_quality_from_margin(3), 1);
        assert_eq!(link_quality_from_margin(11), 2);
        assert_eq!(link_quality_from_margin(21), 3);
        assert_eq!(link_quality_from_margin(255), 3);
    }

    #[test]
    fn test_costs() {
        assert_eq!(link_quality_to_cost(3), 1);
        assert_eq!(link_quality_to_cost(2), 2);
        assert_eq!(link_quality_to_cost(1), 4);
        assert_eq!(link_quality_to_cost(0), MAX_ROUTE_COST);
    }

    #[test]
    fn test_rss_averaging() {
        let mut link = LinkInfo::new(DEFAULT_NOISE_FLOOR_DBM);
        assert_eq!(link.link_margin(), 0);
        assert_eq!(link.link_quality_in(), 0);

        link.add_rss(-60);
        assert_eq!(link.average_rss(), Some(-60));
        assert_eq!(link.link_margin(), 40);
        assert_eq!(link.link_quality_in(), 3);

        // A single weak sample only moves the average by 1/8.
        link.add_rss(-92);
        assert_eq!(link.average_rss(), Some(-64));
        assert_eq!(link.last_rss(), Some(-92));
    }

    #[test]
    fn test_margin_never_negative() {
        let mut link = LinkInfo::new(-90);
        link.add_rss(-110);
        assert_eq!(link.link_margin(), 0);
    }
}
