//! Builds the series / season / episode tree from a flat key listing.
//!
//! Naming is the only structural signal an object store offers, so the
//! builder is a pure function of the keys and the caller-selected mode.

use crate::models::{
    catalog::{
        BucketMode, Catalog, CatalogEntry, FLAT_SEASON_LABEL, HIDDEN_MARKER, MOVIE_SEASON_LABEL,
        PATH_SEPARATOR, SYSTEM_PREFIX,
    },
    object::ObjectDescriptor,
};
use std::cmp::Ordering;
use tracing::debug;

/// Group `objects` into a catalog according to `mode`.
pub fn build_catalog(objects: &[ObjectDescriptor], mode: BucketMode) -> Catalog {
    let mut catalog = Catalog::empty();

    for object in objects.iter().filter(|object| is_catalog_key(&object.key)) {
        let placed = match mode {
            BucketMode::Hierarchical => place_hierarchical(object),
            BucketMode::Flat => Some(place_flat(object)),
        };

        match placed {
            Some((series, season, entry)) => catalog.insert(series, season, entry),
            None => debug!(key = %object.key, "skipping unclassifiable key"),
        }
    }

    catalog
}

/// False for hidden keys, keys under the system prefix and folder placeholders.
pub fn is_catalog_key(key: &str) -> bool {
    if key
        .split(PATH_SEPARATOR)
        .any(|segment| segment.starts_with(HIDDEN_MARKER))
    {
        return false;
    }
    if key.starts_with(SYSTEM_PREFIX) {
        return false;
    }
    !key.ends_with(PATH_SEPARATOR)
}

fn place_hierarchical(object: &ObjectDescriptor) -> Option<(String, String, CatalogEntry)> {
    // The episode name keeps every segment past the season, separators included.
    let parts: Vec<&str> = object.key.splitn(3, PATH_SEPARATOR).collect();

    let (series, season, name) = match parts.as_slice() {
        [series, season, rest] => (series.to_string(), season.to_string(), rest.to_string()),
        [series, episode] => (
            series.to_string(),
            FLAT_SEASON_LABEL.to_string(),
            episode.to_string(),
        ),
        // Root-level files carry no series information.
        _ => return None,
    };

    let entry = CatalogEntry {
        name,
        key: object.key.clone(),
        size: object.size,
        last_modified: object.last_modified,
        is_movie: false,
    };
    Some((series, season, entry))
}

fn place_flat(object: &ObjectDescriptor) -> (String, String, CatalogEntry) {
    let entry = CatalogEntry {
        name: object.key.clone(),
        key: object.key.clone(),
        size: object.size,
        last_modified: object.last_modified,
        is_movie: true,
    };
    (
        strip_extension(&object.key).to_string(),
        MOVIE_SEASON_LABEL.to_string(),
        entry,
    )
}

/// Drop the last dot-delimited suffix of the final path segment, if any.
pub fn strip_extension(key: &str) -> &str {
    match key.rfind('.') {
        Some(idx) if idx + 1 < key.len() && !key[idx + 1..].contains(PATH_SEPARATOR) => {
            &key[..idx]
        }
        _ => key,
    }
}

#[derive(Debug, Clone, Copy)]
enum Chunk<'a> {
    Digits(&'a str),
    Text(&'a str),
}

fn next_chunk(s: &str) -> Option<(Chunk<'_>, &str)> {
    let first = s.chars().next()?;
    let is_digit = first.is_ascii_digit();
    let end = s
        .char_indices()
        .find(|(_, c)| c.is_ascii_digit() != is_digit)
        .map(|(idx, _)| idx)
        .unwrap_or(s.len());
    let (head, tail) = s.split_at(end);
    let chunk = if is_digit {
        Chunk::Digits(head)
    } else {
        Chunk::Text(head)
    };
    Some((chunk, tail))
}

fn cmp_digits(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn cmp_text(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

/// Punctuation and whitespace sort before digits, digits before letters.
fn digits_vs_text(text: &str) -> Ordering {
    match text.chars().next() {
        Some(c) if c.is_alphabetic() => Ordering::Less,
        _ => Ordering::Greater,
    }
}

/// Case-insensitive comparison that orders digit runs by numeric value,
/// so `Season 2` sorts before `Season 10`.
///
/// Strings that compare equal chunk by chunk fall back to byte order, which
/// keeps the result a total order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (mut left, mut right) = (a, b);
    loop {
        match (next_chunk(left), next_chunk(right)) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some((lc, lrest)), Some((rc, rrest))) => {
                let ord = match (lc, rc) {
                    (Chunk::Digits(l), Chunk::Digits(r)) => cmp_digits(l, r),
                    (Chunk::Text(l), Chunk::Text(r)) => cmp_text(l, r),
                    (Chunk::Digits(_), Chunk::Text(r)) => digits_vs_text(r),
                    (Chunk::Text(l), Chunk::Digits(_)) => digits_vs_text(l).reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
                left = lrest;
                right = rrest;
            }
        }
    }
}

impl Catalog {
    /// Season names of `series` in natural order.
    pub fn sorted_seasons(&self, series: &str) -> Option<Vec<&str>> {
        let mut seasons: Vec<&str> = self.seasons(series)?.keys().map(String::as_str).collect();
        seasons.sort_by(|a, b| natural_cmp(a, b));
        Some(seasons)
    }

    /// Entries of a season in natural order of their display name.
    pub fn sorted_entries(&self, series: &str, season: &str) -> Option<Vec<&CatalogEntry>> {
        let mut entries: Vec<&CatalogEntry> = self.entries(series, season)?.iter().collect();
        entries.sort_by(|a, b| natural_cmp(&a.name, &b.name));
        Some(entries)
    }
}
