//! Provider candidate selection

use crate::db::Provider;

use super::location::{location_components, KnownLocation};
use super::normalize::normalize;

pub const DEFAULT_CANDIDATE_LIMIT: usize = 5;

/// Active providers offering `service_type` in `location`, best first.
///
/// Providers whose primary (first) location component is the requested
/// location rank ahead of those that merely list it; ties break on name,
/// then handle.
pub fn match_providers<'a>(
    providers: &'a [Provider],
    service_type: &str,
    location: &KnownLocation,
    limit: usize,
) -> Vec<&'a Provider> {
    let service = normalize(service_type);
    let mut ranked: Vec<(bool, &Provider)> = providers
        .iter()
        .filter(|p| p.is_active() && normalize(&p.service_type) == service)
        .filter_map(|p| {
            let mut components = location_components(&p.location).map(normalize);
            let primary = components.next()?;
            if primary == location.key {
                Some((true, p))
            } else if components.any(|c| c == location.key) {
                Some((false, p))
            } else {
                None
            }
        })
        .collect();

    ranked.sort_by(|(a_primary, a), (b_primary, b)| {
        b_primary
            .cmp(a_primary)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.handle.cmp(&b.handle))
    });
    ranked.into_iter().take(limit).map(|(_, p)| p).collect()
}
