//! Location resolution against the locations providers actually serve

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::db::Provider;

use super::normalize::{find_phrase, normalize, words};

const FUZZY_THRESHOLD: f64 = 0.88;
const MIN_PARTIAL_LEN: usize = 3;

/// Cities recognized when shaping a geocoder address
const CITIES: &[&str] = &[
    "harare",
    "chitungwiza",
    "bulawayo",
    "mutare",
    "gweru",
    "kwekwe",
    "masvingo",
    "kadoma",
    "marondera",
];

/// A location at least one provider record names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownLocation {
    /// Normalized form used for matching
    pub key: String,
    /// As first written in a provider record
    pub display: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(KnownLocation),
    /// Display names of the equally good candidates
    Ambiguous(Vec<String>),
    NotFound,
}

/// Comma-separated parts of a provider location worth matching on. Parts
/// containing digits are street addresses and are skipped.
pub fn location_components(location: &str) -> impl Iterator<Item = &str> {
    location
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty() && !part.chars().any(|c| c.is_ascii_digit()))
}

#[derive(Debug, Clone, Default)]
pub struct LocationResolver {
    /// Sorted by key
    known: Vec<KnownLocation>,
}

impl LocationResolver {
    /// Known set from the active providers' location components
    pub fn from_providers(providers: &[Provider]) -> Self {
        Self::from_names(
            providers
                .iter()
                .filter(|p| p.is_active())
                .flat_map(|p| location_components(&p.location)),
        )
    }

    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut by_key: BTreeMap<String, String> = BTreeMap::new();
        for name in names {
            let key = normalize(name);
            if key.is_empty() {
                continue;
            }
            by_key.entry(key).or_insert_with(|| name.trim().to_string());
        }
        Self {
            known: by_key
                .into_iter()
                .map(|(key, display)| KnownLocation { key, display })
                .collect(),
        }
    }

    pub fn known(&self) -> &[KnownLocation] {
        &self.known
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Resolve free text against the known set
    pub fn resolve_text(&self, text: &str) -> Resolution {
        let query = normalize(text);
        if query.is_empty() || self.known.is_empty() {
            return Resolution::NotFound;
        }

        if let Some(hit) = self.known.iter().find(|k| k.key == query) {
            return Resolution::Resolved(hit.clone());
        }

        if let Some(hit) = self.contained_in(&query) {
            return Resolution::Resolved(hit.clone());
        }

        if query.chars().count() >= MIN_PARTIAL_LEN {
            let partial: Vec<&KnownLocation> =
                self.known.iter().filter(|k| k.key.contains(&query)).collect();
            match partial.as_slice() {
                [] => {}
                [only] => return Resolution::Resolved((*only).clone()),
                many => return Resolution::Ambiguous(displays(many)),
            }
        }

        self.fuzzy(&query)
    }

    /// Resolve a shared pin. Out-of-bounds coordinates never resolve;
    /// otherwise the geocoder's answer, if any, goes through the text path.
    pub fn resolve_coordinates(
        &self,
        bounds: &GeoBounds,
        latitude: f64,
        longitude: f64,
        geocoded: Option<&str>,
    ) -> Resolution {
        if !bounds.contains(latitude, longitude) {
            return Resolution::NotFound;
        }
        match geocoded {
            Some(place) => self.resolve_text(place),
            None => Resolution::NotFound,
        }
    }

    /// Earliest known location named inside the query, longest on ties
    fn contained_in(&self, query: &str) -> Option<&KnownLocation> {
        let hay = words(query);
        self.known
            .iter()
            .filter_map(|k| {
                let phrase = words(&k.key);
                find_phrase(&hay, &phrase, false).map(|pos| (pos, phrase.len(), k))
            })
            .min_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)).then(a.2.key.cmp(&b.2.key)))
            .map(|(_, _, k)| k)
    }

    fn fuzzy(&self, query: &str) -> Resolution {
        let hay = words(query);
        let mut best_score = 0.0_f64;
        let mut best: Vec<&KnownLocation> = Vec::new();

        for known in &self.known {
            let width = words(&known.key).len();
            let mut score = strsim::jaro_winkler(query, &known.key);
            if width <= hay.len() {
                for window in hay.windows(width) {
                    score = score.max(strsim::jaro_winkler(&window.join(" "), &known.key));
                }
            }
            if score < FUZZY_THRESHOLD {
                continue;
            }
            if (score - best_score).abs() < 1e-9 {
                best.push(known);
            } else if score > best_score {
                best_score = score;
                best = vec![known];
            }
        }

        match best.as_slice() {
            [] => Resolution::NotFound,
            [only] => Resolution::Resolved((*only).clone()),
            many => Resolution::Ambiguous(displays(many)),
        }
    }
}

fn displays(locations: &[&KnownLocation]) -> Vec<String> {
    locations.iter().map(|k| k.display.clone()).collect()
}

// ============================================================================
// Bounds
// ============================================================================

/// Rectangle of acceptable coordinates, in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBounds {
    pub south: f64,
    pub north: f64,
    pub west: f64,
    pub east: f64,
}

impl Default for GeoBounds {
    /// Zimbabwe
    fn default() -> Self {
        Self {
            south: -22.5,
            north: -8.0,
            west: 25.0,
            east: 33.0,
        }
    }
}

impl GeoBounds {
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.south..=self.north).contains(&latitude) && (self.west..=self.east).contains(&longitude)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid bounds {0:?}, expected \"south,north,west,east\"")]
pub struct InvalidBounds(pub String);

impl FromStr for GeoBounds {
    type Err = InvalidBounds;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| InvalidBounds(s.to_string()))?;
        match parts.as_slice() {
            [south, north, west, east] if south <= north && west <= east => Ok(Self {
                south: *south,
                north: *north,
                west: *west,
                east: *east,
            }),
            _ => Err(InvalidBounds(s.to_string())),
        }
    }
}

// ============================================================================
// Geocoder address shaping
// ============================================================================

/// Reduce a full geocoder address to "Suburb, City". The trailing country
/// is dropped, the suburb is the first non-street component and the city
/// is the last component naming a recognized city.
pub fn shape_address(address: &str) -> String {
    let mut parts: Vec<&str> = address
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts
        .last()
        .is_some_and(|last| last.eq_ignore_ascii_case("zimbabwe"))
    {
        parts.pop();
    }

    let city = parts.iter().rev().copied().find(|part| {
        let norm = normalize(part);
        let hay = words(&norm);
        CITIES.iter().any(|city| find_phrase(&hay, &[city], false).is_some())
    });
    let suburb = parts
        .iter()
        .copied()
        .find(|part| !part.chars().any(|c| c.is_ascii_digit()));

    match (suburb, city) {
        (Some(suburb), Some(city)) if suburb != city => format!("{suburb}, {city}"),
        (_, Some(city)) => city.to_string(),
        (Some(suburb), None) => suburb.to_string(),
        (None, None) => address.trim().to_string(),
    }
}
