//! Booking prices and payment splits, all in integer cents.

/// Upper bound for a provider's hourly rate (EUR 100,000 per hour).
pub const MAX_HOURLY_RATE_CENTS: i64 = 10_000_000;

/// `rate_cents_per_hour × minutes / 60`, rounded half up to the cent.
/// `None` when the product does not fit in an `i64`.
pub fn price_cents(hourly_rate_cents: i64, duration_minutes: i64) -> Option<i64> {
    hourly_rate_cents
        .checked_mul(duration_minutes)?
        .checked_add(30)
        .map(|scaled| scaled.div_euclid(60))
}

/// Platform share of `amount_cents` at `bps` basis points, floored.
pub fn commission_cents(amount_cents: i64, bps: u32) -> i64 {
    let fee = (i128::from(amount_cents) * i128::from(bps)).div_euclid(10_000);
    i64::try_from(fee).unwrap_or(i64::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitAmounts {
    pub director: i64,
    pub venue: i64,
    pub platform: i64,
}

impl SplitAmounts {
    pub fn total(&self) -> i64 {
        self.director + self.venue + self.platform
    }
}

/// Commission is taken from each side separately; the three parts always add
/// up to `director_amount + venue_amount`.
pub fn split_amounts(director_amount_cents: i64, venue_amount_cents: i64, bps: u32) -> SplitAmounts {
    let director_fee = commission_cents(director_amount_cents, bps);
    let venue_fee = commission_cents(venue_amount_cents, bps);

    SplitAmounts {
        director: director_amount_cents - director_fee,
        venue: venue_amount_cents - venue_fee,
        platform: director_fee + venue_fee,
    }
}
