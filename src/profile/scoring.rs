use serde::Serialize;
use std::collections::BTreeMap;

/// Genre count at which breadth stops adding to the explorer score
const BREADTH_SATURATION: f64 = 30.0;
const EVENNESS_WEIGHT: f64 = 0.6;
const BREADTH_WEIGHT: f64 = 0.4;

/// One axis of the genre radar
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarPoint {
    pub genre: String,
    pub count: u32,
    /// Relative to the most frequent genre, in (0, 1]
    pub weight: f64,
}

/// Diversity of a listener's genre spread
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerScore {
    pub score: u32,
    pub label: String,
    pub entropy: f64,
    pub evenness: f64,
    pub genre_count: usize,
}

/// Scoring over genre frequency distributions
pub struct GenreScoring;

impl GenreScoring {
    /// Top genres by frequency, weighted against the single most frequent one
    pub fn radar(genre_frequency: &BTreeMap<String, u32>, size: usize) -> Vec<RadarPoint> {
        let mut genres: Vec<(&String, &u32)> = genre_frequency
            .iter()
            .filter(|(_, count)| **count > 0)
            .collect();
        genres.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        genres.truncate(size);

        let max = genres.first().map(|(_, count)| **count).unwrap_or(0);
        if max == 0 {
            return Vec::new();
        }

        genres
            .into_iter()
            .map(|(genre, count)| RadarPoint {
                genre: genre.clone(),
                count: *count,
                weight: *count as f64 / max as f64,
            })
            .collect()
    }

    /// Shannon entropy in bits over the distribution
    pub fn entropy(genre_frequency: &BTreeMap<String, u32>) -> f64 {
        let total: u32 = genre_frequency.values().sum();
        if total == 0 {
            return 0.0;
        }

        let mut entropy = 0.0;
        for &count in genre_frequency.values() {
            let probability = count as f64 / total as f64;
            if probability > 0.0 {
                entropy -= probability * probability.log2();
            }
        }
        entropy
    }

    /// Explorer score: 60% evenness, 40% breadth
    pub fn explorer(genre_frequency: &BTreeMap<String, u32>) -> ExplorerScore {
        let total: u32 = genre_frequency.values().sum();
        let genre_count = genre_frequency.values().filter(|c| **c > 0).count();

        if total == 0 {
            return ExplorerScore {
                score: 0,
                label: "No data yet".to_string(),
                entropy: 0.0,
                evenness: 0.0,
                genre_count: 0,
            };
        }

        // log2(1) is zero, evenness is undefined
        if genre_count == 1 {
            return ExplorerScore {
                score: 5,
                label: "Laser-Focused".to_string(),
                entropy: 0.0,
                evenness: 0.0,
                genre_count,
            };
        }

        let entropy = Self::entropy(genre_frequency);
        let evenness = (entropy / (genre_count as f64).log2()).clamp(0.0, 1.0);
        let breadth = (genre_count as f64 / BREADTH_SATURATION).min(1.0);
        let raw = (EVENNESS_WEIGHT * evenness + BREADTH_WEIGHT * breadth).clamp(0.0, 1.0);
        let score = (100.0 * raw).round() as u32;

        ExplorerScore {
            score,
            label: Self::explorer_label(score).to_string(),
            entropy,
            evenness,
            genre_count,
        }
    }

    pub fn explorer_label(score: u32) -> &'static str {
        match score {
            80.. => "Sonic Nomad",
            65..=79 => "Adventurous Ear",
            45..=64 => "Curious Listener",
            25..=44 => "Comfort Cruiser",
            _ => "Deep Specialist",
        }
    }
}
