//! Filtering, sorting and placement of media items.

use crate::config::{Filters, PlaceOnTop, Preferences, SortOrder};
use crate::media::MediaItem;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use std::cmp::Ordering;

/// Below this many items a sequential sort is faster than fanning out to rayon
const PARALLEL_SORT_THRESHOLD: usize = 4096;

/// Filter, sort and place `items` according to `prefs`.
///
/// The result is a subset of the input; every kept item satisfies every active predicate.
/// For any order but [`SortOrder::Random`] the output is a pure function of the input set.
pub fn apply(items: Vec<MediaItem>, prefs: &Preferences, search: Option<&str>) -> Vec<MediaItem> {
    let needle = search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    let mut kept: Vec<MediaItem> = items
        .into_iter()
        .filter(|item| matches_filters(item, &prefs.filters))
        .filter(|item| match &needle {
            Some(needle) => item.name().to_lowercase().contains(needle.as_str()),
            None => true,
        })
        .collect();

    sort_items(&mut kept, prefs.sort_order, prefs.descend_sorting);
    place_items(kept, prefs.place_on_top)
}

/// Whether an item passes the kind, media type and visibility filters
pub fn matches_filters(item: &MediaItem, filters: &Filters) -> bool {
    let kind = if item.is_album() {
        filters.albums
    } else {
        filters.files
    };

    let media = match (item.media_type(), item.counts()) {
        (Some(media_type), _) => filters.includes_type(media_type),
        (None, Some(counts)) => {
            (filters.images && counts.images > 0)
                || (filters.videos && counts.videos > 0)
                || (filters.gifs && counts.gifs > 0)
        }
        (None, None) => false,
    };

    let visibility = if item.is_hidden() {
        filters.hidden
    } else {
        filters.unhidden
    };

    kind && media && visibility
}

fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn compare_items(a: &MediaItem, b: &MediaItem, order: SortOrder) -> Ordering {
    let primary = match order {
        SortOrder::Name => compare_names(a.name(), b.name()),
        SortOrder::Size => a.size().cmp(&b.size()),
        SortOrder::CreationDate => a.creation_date().cmp(&b.creation_date()),
        SortOrder::ModificationDate => a.modification_date().cmp(&b.modification_date()),
        SortOrder::Extension => a
            .extension()
            .to_lowercase()
            .cmp(&b.extension().to_lowercase()),
        SortOrder::Random => Ordering::Equal,
    };
    primary.then_with(|| a.path().cmp(b.path()))
}

/// Sort in place; descending reverses the whole comparator, tie-break included
pub fn sort_items(items: &mut [MediaItem], order: SortOrder, descending: bool) {
    if order == SortOrder::Random {
        items.shuffle(&mut rand::rng());
        return;
    }

    let comparator = |a: &MediaItem, b: &MediaItem| {
        let ordering = compare_items(a, b, order);
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    };

    if items.len() >= PARALLEL_SORT_THRESHOLD {
        items.par_sort_by(comparator);
    } else {
        items.sort_by(comparator);
    }
}

/// Stable partition of albums and files
pub fn place_items(items: Vec<MediaItem>, placement: PlaceOnTop) -> Vec<MediaItem> {
    let albums_first = match placement {
        PlaceOnTop::None => return items,
        PlaceOnTop::AlbumsOnTop => true,
        PlaceOnTop::FilesOnTop => false,
    };

    let (albums, files): (Vec<_>, Vec<_>) = items.into_iter().partition(MediaItem::is_album);
    if albums_first {
        albums.into_iter().chain(files).collect()
    } else {
        files.into_iter().chain(albums).collect()
    }
}
