use crate::models::{BoundingBox, MatchPolicy, User, UserId};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::fmt;

/// Locality tier a partner was chosen from, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    /// Same city, or "stay mysterious" (no city declared); only while the wait is short
    SameCity,
    /// Within the nearby radius; only once the short wait has elapsed
    Nearby,
    Regional,
    /// Anyone compatible, with or without location data
    Fallback,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::SameCity => "same_city",
            Tier::Nearby => "nearby",
            Tier::Regional => "regional",
            Tier::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The partner picked for a seeker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    pub partner_id: UserId,
    pub tier: Tier,
    pub distance_km: Option<f64>,
}

/// Stage 3 of the pipeline: time-gated locality windows
///
/// Pure. Given compatible candidates, returns the first non-empty tier's
/// best candidate. Ties go to whoever has waited longest.
#[derive(Debug, Clone, Copy)]
pub struct PriorityWindowEvaluator {
    locality_window_secs: f64,
    nearby_radius_km: f64,
    regional_radius_km: f64,
}

impl PriorityWindowEvaluator {
    pub fn new(policy: &MatchPolicy) -> Self {
        Self {
            locality_window_secs: policy.locality_window_secs,
            nearby_radius_km: policy.nearby_radius_km,
            regional_radius_km: policy.regional_radius_km,
        }
    }

    pub fn select(&self, seeker: &User, candidates: &[&User], now: DateTime<Utc>) -> Option<Selection> {
        if candidates.is_empty() {
            return None;
        }

        let wait = seeker.wait_secs(now);

        if wait <= self.locality_window_secs {
            if let Some(partner) = self.same_city(seeker, candidates) {
                return Some(Selection {
                    partner_id: partner.user_id,
                    tier: Tier::SameCity,
                    distance_km: None,
                });
            }
        } else if let Some((partner, distance)) = self.closest_within(seeker, candidates, self.nearby_radius_km) {
            return Some(Selection {
                partner_id: partner.user_id,
                tier: Tier::Nearby,
                distance_km: Some(distance),
            });
        }

        if let Some((partner, distance)) = self.closest_within(seeker, candidates, self.regional_radius_km) {
            return Some(Selection {
                partner_id: partner.user_id,
                tier: Tier::Regional,
                distance_km: Some(distance),
            });
        }

        longest_waiting(candidates.iter().copied()).map(|partner| Selection {
            partner_id: partner.user_id,
            tier: Tier::Fallback,
            distance_km: None,
        })
    }

    fn same_city<'a>(&self, seeker: &User, candidates: &[&'a User]) -> Option<&'a User> {
        match seeker.city.as_deref() {
            Some(city) => longest_waiting(
                candidates
                    .iter()
                    .copied()
                    .filter(|c| c.city.as_deref() == Some(city)),
            )
            .or_else(|| longest_waiting(candidates.iter().copied().filter(|c| c.city.is_none()))),
            None => longest_waiting(candidates.iter().copied()),
        }
    }

    fn closest_within<'a>(
        &self,
        seeker: &User,
        candidates: &[&'a User],
        radius_km: f64,
    ) -> Option<(&'a User, f64)> {
        let origin = seeker.coordinates()?;
        let bbox = BoundingBox::around(origin, radius_km);

        candidates
            .iter()
            .copied()
            .filter_map(|candidate| {
                let point = candidate.coordinates()?;
                if !bbox.contains(&point) {
                    return None;
                }
                let distance = origin.distance_km(&point);
                (distance <= radius_km).then_some((candidate, distance))
            })
            .min_by(|(a, da), (b, db)| {
                da.partial_cmp(db)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| wait_order(a, b))
            })
    }
}

impl Default for PriorityWindowEvaluator {
    fn default() -> Self {
        Self::new(&MatchPolicy::default())
    }
}

/// Earliest `search_start_time` first; users without one go last
pub fn wait_order(a: &User, b: &User) -> Ordering {
    match (a.search_start_time, b.search_start_time) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.user_id.cmp(&b.user_id))
}

fn longest_waiting<'a>(candidates: impl Iterator<Item = &'a User>) -> Option<&'a User> {
    candidates.min_by(|a, b| wait_order(a, b))
}
