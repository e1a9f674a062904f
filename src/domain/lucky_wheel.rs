//! Lucky-wheel promotion rules: spin eligibility and weighted prize selection.
//!
//! Everything here is pure. The caller loads the wheel, its prizes and the
//! spin history, supplies the clock and a uniform roll in `[0, 1)`, and
//! persists whatever comes back.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrizeType {
    PercentageDiscount,
    FixedDiscount,
    FreeShipping,
    Gift,
    NoPrize,
}

impl PrizeType {
    pub fn parse(s: &str) -> Result<Self, WheelError> {
        match s {
            "percentage_discount" => Ok(Self::PercentageDiscount),
            "fixed_discount" => Ok(Self::FixedDiscount),
            "free_shipping" => Ok(Self::FreeShipping),
            "gift" => Ok(Self::Gift),
            "no_prize" => Ok(Self::NoPrize),
            other => Err(WheelError::InvalidPrizeType(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PercentageDiscount => "percentage_discount",
            Self::FixedDiscount => "fixed_discount",
            Self::FreeShipping => "free_shipping",
            Self::Gift => "gift",
            Self::NoPrize => "no_prize",
        }
    }

    /// Coupon discount type for prizes redeemed at checkout.
    pub fn coupon_discount_type(&self) -> Option<&'static str> {
        match self {
            Self::PercentageDiscount => Some("percentage"),
            Self::FixedDiscount => Some("fixed"),
            Self::FreeShipping => Some("free_shipping"),
            Self::Gift | Self::NoPrize => None,
        }
    }
}

/// Wheel settings that gate who may spin and when.
#[derive(Clone, Debug, PartialEq)]
pub struct WheelRules {
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub cooldown_hours: i32,
    /// 0 means unlimited.
    pub max_spins_per_user: i32,
    /// 0 means unlimited.
    pub max_spins_per_fingerprint: i32,
    pub require_login: bool,
}

/// Prior spins for the requesting customer and device on this wheel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpinHistory {
    pub user_spins: i64,
    pub user_last_spin: Option<DateTime<Utc>>,
    pub fingerprint_spins: i64,
    pub fingerprint_last_spin: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PrizeCandidate {
    pub id: Uuid,
    pub probability: f64,
    pub stock: Option<i32>,
    pub is_active: bool,
}

impl PrizeCandidate {
    pub fn is_eligible(&self) -> bool {
        self.is_active
            && self.probability.is_finite()
            && self.probability > 0.0
            && self.stock.map_or(true, |s| s > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WheelError {
    #[error("lucky wheel is not active")]
    Inactive,
    #[error("lucky wheel has not started yet")]
    NotStarted,
    #[error("lucky wheel has ended")]
    Ended,
    #[error("login required to spin")]
    LoginRequired,
    #[error("already spun, try again later")]
    Cooldown { next_eligible_at: DateTime<Utc> },
    #[error("spin limit reached")]
    QuotaExceeded,
    #[error("no prizes available")]
    NoPrizesAvailable,
    #[error("unknown prize type '{0}'")]
    InvalidPrizeType(String),
}

/// Guard clauses run before a spin is allowed.
pub fn check_eligibility(
    rules: &WheelRules,
    logged_in: bool,
    history: &SpinHistory,
    now: DateTime<Utc>,
) -> Result<(), WheelError> {
    if !rules.is_active {
        return Err(WheelError::Inactive);
    }
    if rules.starts_at.is_some_and(|s| now < s) {
        return Err(WheelError::NotStarted);
    }
    if rules.ends_at.is_some_and(|e| now >= e) {
        return Err(WheelError::Ended);
    }
    if rules.require_login && !logged_in {
        return Err(WheelError::LoginRequired);
    }

    if rules.max_spins_per_user > 0 && logged_in && history.user_spins >= i64::from(rules.max_spins_per_user) {
        return Err(WheelError::QuotaExceeded);
    }
    if rules.max_spins_per_fingerprint > 0
        && history.fingerprint_spins >= i64::from(rules.max_spins_per_fingerprint)
    {
        return Err(WheelError::QuotaExceeded);
    }

    if rules.cooldown_hours > 0 {
        let cooldown = Duration::hours(i64::from(rules.cooldown_hours));
        let last = history.user_last_spin.max(history.fingerprint_last_spin);
        if let Some(last) = last {
            let next_eligible_at = last + cooldown;
            if now < next_eligible_at {
                return Err(WheelError::Cooldown { next_eligible_at });
            }
        }
    }
    Ok(())
}

/// Cumulative-sum selection. `roll` must be uniform in `[0, 1)`; it is
/// clamped so an out-of-range value still lands on a prize.
pub fn pick_prize(prizes: &[PrizeCandidate], roll: f64) -> Result<Uuid, WheelError> {
    let eligible: Vec<&PrizeCandidate> = prizes.iter().filter(|p| p.is_eligible()).collect();
    let total: f64 = eligible.iter().map(|p| p.probability).sum();
    let last = eligible.last().ok_or(WheelError::NoPrizesAvailable)?;

    let target = roll.clamp(0.0, 1.0) * total;
    let mut cumulative = 0.0;
    for prize in &eligible {
        cumulative += prize.probability;
        if target < cumulative {
            return Ok(prize.id);
        }
    }
    // Only reachable through float rounding at the upper edge.
    Ok(last.id)
}

/// Single-use coupon code handed out for a winning spin.
pub fn coupon_code() -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let suffix: String = (0..6)
        .map(|_| ALPHABET[rand::random::<usize>() % ALPHABET.len()] as char)
        .collect();
    format!("WHEEL-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> WheelRules {
        WheelRules {
            is_active: true,
            starts_at: None,
            ends_at: None,
            cooldown_hours: 24,
            max_spins_per_user: 0,
            max_spins_per_fingerprint: 0,
            require_login: false,
        }
    }

    fn prize(probability: f64, stock: Option<i32>) -> PrizeCandidate {
        PrizeCandidate { id: Uuid::new_v4(), probability, stock, is_active: true }
    }

    #[test]
    fn first_spin_is_allowed() {
        assert_eq!(check_eligibility(&rules(), false, &SpinHistory::default(), Utc::now()), Ok(()));
    }

    #[test]
    fn inactive_and_out_of_window_wheels_refuse() {
        let now = Utc::now();
        let mut r = rules();
        r.is_active = false;
        assert_eq!(check_eligibility(&r, false, &SpinHistory::default(), now), Err(WheelError::Inactive));

        let mut r = rules();
        r.starts_at = Some(now + Duration::minutes(1));
        assert_eq!(check_eligibility(&r, false, &SpinHistory::default(), now), Err(WheelError::NotStarted));

        let mut r = rules();
        r.ends_at = Some(now);
        assert_eq!(check_eligibility(&r, false, &SpinHistory::default(), now), Err(WheelError::Ended));
    }

    #[test]
    fn login_requirement_is_enforced() {
        let mut r = rules();
        r.require_login = true;
        let now = Utc::now();
        assert_eq!(check_eligibility(&r, false, &SpinHistory::default(), now), Err(WheelError::LoginRequired));
        assert_eq!(check_eligibility(&r, true, &SpinHistory::default(), now), Ok(()));
    }

    #[test]
    fn cooldown_uses_latest_of_user_and_fingerprint() {
        let now = Utc::now();
        let history = SpinHistory {
            user_spins: 1,
            user_last_spin: Some(now - Duration::hours(30)),
            fingerprint_spins: 1,
            fingerprint_last_spin: Some(now - Duration::hours(2)),
        };
        let err = check_eligibility(&rules(), true, &history, now).unwrap_err();
        assert_eq!(err, WheelError::Cooldown { next_eligible_at: now + Duration::hours(22) });

        let later = now + Duration::hours(22);
        assert_eq!(check_eligibility(&rules(), true, &history, later), Ok(()));
    }

    #[test]
    fn quotas_apply_per_user_and_per_fingerprint() {
        let now = Utc::now();
        let mut r = rules();
        r.cooldown_hours = 0;
        r.max_spins_per_user = 2;
        r.max_spins_per_fingerprint = 3;

        let user_capped = SpinHistory { user_spins: 2, fingerprint_spins: 0, ..SpinHistory::default() };
        assert_eq!(check_eligibility(&r, true, &user_capped, now), Err(WheelError::QuotaExceeded));
        // Anonymous spinners are only counted by fingerprint.
        assert_eq!(check_eligibility(&r, false, &user_capped, now), Ok(()));

        let device_capped = SpinHistory { fingerprint_spins: 3, ..SpinHistory::default() };
        assert_eq!(check_eligibility(&r, false, &device_capped, now), Err(WheelError::QuotaExceeded));
    }

    #[test]
    fn roll_maps_onto_cumulative_weights() {
        let a = prize(1.0, None);
        let b = prize(3.0, None);
        let prizes = vec![a.clone(), b.clone()];
        assert_eq!(pick_prize(&prizes, 0.0).unwrap(), a.id);
        assert_eq!(pick_prize(&prizes, 0.2499).unwrap(), a.id);
        assert_eq!(pick_prize(&prizes, 0.25).unwrap(), b.id);
        assert_eq!(pick_prize(&prizes, 0.9999).unwrap(), b.id);
        assert_eq!(pick_prize(&prizes, 1.0).unwrap(), b.id);
    }

    #[test]
    fn ineligible_prizes_are_skipped() {
        let out_of_stock = prize(10.0, Some(0));
        let zero_weight = prize(0.0, None);
        let mut inactive = prize(10.0, None);
        inactive.is_active = false;
        let winner = prize(0.5, Some(1));
        let prizes = vec![out_of_stock, zero_weight, inactive, winner.clone()];
        for roll in [0.0, 0.5, 0.99] {
            assert_eq!(pick_prize(&prizes, roll).unwrap(), winner.id);
        }
    }

    #[test]
    fn no_eligible_prizes_is_an_error() {
        assert_eq!(pick_prize(&[], 0.5), Err(WheelError::NoPrizesAvailable));
        assert_eq!(pick_prize(&[prize(1.0, Some(0))], 0.5), Err(WheelError::NoPrizesAvailable));
    }

    #[test]
    fn selection_frequency_tracks_weights() {
        let common = prize(9.0, None);
        let rare = prize(1.0, None);
        let prizes = vec![common.clone(), rare.clone()];
        let rare_hits = (0..1000)
            .map(|i| f64::from(i) / 1000.0)
            .filter(|roll| pick_prize(&prizes, *roll).unwrap() == rare.id)
            .count();
        assert_eq!(rare_hits, 100);
    }

    #[test]
    fn coupon_codes_avoid_ambiguous_characters() {
        let code = coupon_code();
        assert!(code.starts_with("WHEEL-"));
        assert_eq!(code.len(), 12);
        assert!(!code[6..].contains(['0', 'O', '1', 'I']));
    }

    #[test]
    fn prize_types_round_trip() {
        for t in ["percentage_discount", "fixed_discount", "free_shipping", "gift", "no_prize"] {
            assert_eq!(PrizeType::parse(t).unwrap().as_str(), t);
        }
        assert!(PrizeType::Gift.coupon_discount_type().is_none());
        assert_eq!(PrizeType::FreeShipping.coupon_discount_type(), Some("free_shipping"));
    }
}
