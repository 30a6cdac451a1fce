use std::collections::BTreeMap;

/// Canonical genre labels probed and suggested by the analysis
pub const GENRE_CATALOG: &[&str] = &[
    "pop",
    "rock",
    "hip hop",
    "rap",
    "r&b",
    "soul",
    "funk",
    "disco",
    "jazz",
    "blues",
    "country",
    "folk",
    "singer-songwriter",
    "indie",
    "alternative",
    "punk",
    "emo",
    "grunge",
    "metal",
    "hard rock",
    "shoegaze",
    "dream pop",
    "electronic",
    "house",
    "techno",
    "drum and bass",
    "ambient",
    "trap",
    "reggae",
    "latin",
    "k-pop",
    "classical",
    "gospel",
    "lo-fi",
];

const ADJACENCY: &[(&str, &[&str])] = &[
    ("pop", &["dream pop", "k-pop", "disco", "r&b", "indie"]),
    ("rock", &["hard rock", "grunge", "alternative", "punk", "blues"]),
    ("hip hop", &["rap", "trap", "r&b", "funk", "lo-fi"]),
    ("rap", &["hip hop", "trap", "r&b"]),
    ("r&b", &["soul", "hip hop", "funk", "gospel"]),
    ("soul", &["r&b", "funk", "gospel", "blues", "jazz"]),
    ("funk", &["soul", "disco", "jazz", "hip hop"]),
    ("disco", &["funk", "house", "pop"]),
    ("jazz", &["blues", "soul", "funk", "classical", "lo-fi"]),
    ("blues", &["jazz", "rock", "soul", "country"]),
    ("country", &["folk", "blues", "singer-songwriter"]),
    ("folk", &["singer-songwriter", "country", "indie"]),
    ("singer-songwriter", &["folk", "indie", "pop"]),
    ("indie", &["alternative", "dream pop", "shoegaze", "folk"]),
    ("alternative", &["indie", "grunge", "rock", "emo"]),
    ("punk", &["emo", "grunge", "hard rock", "rock"]),
    ("emo", &["punk", "alternative", "indie"]),
    ("grunge", &["alternative", "punk", "hard rock", "metal"]),
    ("metal", &["hard rock", "grunge", "punk"]),
    ("hard rock", &["metal", "rock", "grunge"]),
    ("shoegaze", &["dream pop", "indie", "ambient"]),
    ("dream pop", &["shoegaze", "indie", "pop", "ambient"]),
    ("electronic", &["house", "techno", "ambient", "drum and bass"]),
    ("house", &["techno", "disco", "electronic"]),
    ("techno", &["house", "electronic", "drum and bass"]),
    ("drum and bass", &["electronic", "techno"]),
    ("ambient", &["electronic", "classical", "lo-fi", "shoegaze"]),
    ("trap", &["hip hop", "rap"]),
    ("reggae", &["latin", "hip hop"]),
    ("latin", &["reggae", "pop"]),
    ("k-pop", &["pop", "r&b"]),
    ("classical", &["ambient", "jazz"]),
    ("gospel", &["soul", "r&b"]),
    ("lo-fi", &["hip hop", "jazz", "ambient"]),
];

/// Genre catalog plus "neighbouring genre" edges. Read-only reference data.
#[derive(Debug, Clone)]
pub struct GenreGraph {
    catalog: Vec<String>,
    adjacency: BTreeMap<String, Vec<String>>,
}

impl GenreGraph {
    pub fn new(catalog: Vec<String>, adjacency: BTreeMap<String, Vec<String>>) -> Self {
        Self { catalog, adjacency }
    }

    pub fn catalog(&self) -> &[String] {
        &self.catalog
    }

    pub fn in_catalog(&self, genre: &str) -> bool {
        self.catalog.iter().any(|g| g == genre)
    }

    pub fn neighbors(&self, genre: &str) -> &[String] {
        self.adjacency
            .get(genre)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl Default for GenreGraph {
    fn default() -> Self {
        let catalog = GENRE_CATALOG.iter().map(|g| g.to_string()).collect();
        let adjacency = ADJACENCY
            .iter()
            .map(|(genre, neighbors)| {
                (
                    genre.to_string(),
                    neighbors.iter().map(|n| n.to_string()).collect(),
                )
            })
            .collect();
        Self::new(catalog, adjacency)
    }
}
