use super::catalog::GenreGraph;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlindSpotReason {
    /// Neighbour of a genre the listener already plays
    Adjacent,
    /// Sampled from the catalog at random
    Untouched,
}

/// A genre the listener has not been seen playing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlindSpot {
    pub genre: String,
    pub reason: BlindSpotReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjacent_to: Option<String>,
}

/// Suggest unexplored genres: adjacent ones first, then random catalog fill.
///
/// Known genres are visited most-frequent first, so the strongest tastes
/// get their neighbours suggested first.
pub fn find_blind_spots<R: Rng + ?Sized>(
    genre_frequency: &BTreeMap<String, u32>,
    graph: &GenreGraph,
    limit: usize,
    rng: &mut R,
) -> Vec<BlindSpot> {
    let mut known: Vec<(&String, &u32)> = genre_frequency.iter().collect();
    known.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    let mut suggested = BTreeSet::new();
    let mut spots = Vec::new();

    'outer: for (genre, _) in &known {
        for neighbor in graph.neighbors(genre) {
            if spots.len() >= limit {
                break 'outer;
            }
            if genre_frequency.contains_key(neighbor)
                || !graph.in_catalog(neighbor)
                || !suggested.insert(neighbor.clone())
            {
                continue;
            }
            spots.push(BlindSpot {
                genre: neighbor.clone(),
                reason: BlindSpotReason::Adjacent,
                adjacent_to: Some((*genre).clone()),
            });
        }
    }

    let mut untouched: Vec<&String> = graph
        .catalog()
        .iter()
        .filter(|g| !genre_frequency.contains_key(*g) && !suggested.contains(*g))
        .collect();
    untouched.shuffle(rng);

    let remaining = limit.saturating_sub(spots.len());
    spots.extend(untouched.into_iter().take(remaining).map(|genre| BlindSpot {
        genre: genre.clone(),
        reason: BlindSpotReason::Untouched,
        adjacent_to: None,
    }));

    spots
}
