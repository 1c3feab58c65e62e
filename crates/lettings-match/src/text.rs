//! Address and free-text normalisation shared by the signal library.

use std::collections::{BTreeSet, HashMap};

use lettings_core::{ListingKey, Postcode};

const UNIT_WORDS: &[&str] = &[
    "flat", "apartment", "apt", "unit", "room", "studio", "floor", "maisonette",
];

const STREET_SUFFIXES: &[&str] = &[
    "street", "road", "avenue", "lane", "drive", "court", "place", "square", "crescent",
    "gardens", "grove", "terrace", "close", "park", "way", "walk", "row", "hill", "mews",
    "parade", "rise", "vale", "gate", "green", "yard", "wharf", "highway", "broadway",
];

/// Localities that show up as trailing address segments. Stripped only
/// when a whole segment (or the tail of the street segment) consists of them.
const LOCALITIES: &[&str] = &[
    "london", "barking", "dagenham", "barnet", "bexley", "brent", "bromley", "camden",
    "croydon", "ealing", "enfield", "greenwich", "hackney", "hammersmith", "fulham",
    "haringey", "harrow", "havering", "hillingdon", "hounslow", "islington", "kensington",
    "chelsea", "kingston", "lambeth", "lewisham", "merton", "newham", "redbridge",
    "richmond", "southwark", "sutton", "tower", "hamlets", "waltham", "forest",
    "wandsworth", "westminster", "city", "of", "upon", "thames", "and", "greater",
];

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "the", "of", "in", "on", "to", "for", "with", "at", "by", "is", "this",
    "that", "from", "or", "be", "are", "it", "as", "our", "your", "we", "has", "have",
];

fn expand_abbreviation(token: &str) -> &str {
    match token {
        "rd" => "road",
        "st" | "str" => "street",
        "ave" | "av" => "avenue",
        "ln" => "lane",
        "dr" => "drive",
        "ct" => "court",
        "pl" => "place",
        "sq" => "square",
        "cres" | "cresc" => "crescent",
        "gdns" | "gdn" => "gardens",
        "gr" | "grv" => "grove",
        "tce" | "terr" => "terrace",
        "cl" => "close",
        "pk" => "park",
        "hse" => "house",
        "mt" => "mount",
        "sth" => "south",
        "nth" => "north",
        other => other,
    }
}

fn is_postcode_token(token: &str) -> bool {
    let chars: Vec<char> = token.chars().collect();
    let incode = matches!(chars.as_slice(), [d, a, b] if d.is_ascii_digit() && a.is_ascii_alphabetic() && b.is_ascii_alphabetic());
    incode || Postcode::parse(token).is_some()
}

fn is_number_token(token: &str) -> bool {
    token.chars().next().is_some_and(|c| c.is_ascii_digit())
}

/// Lowercased comma-separated segments, each split into alphanumeric tokens.
fn segments(address: &str) -> Vec<Vec<String>> {
    address
        .to_lowercase()
        .split(',')
        .map(|segment| {
            segment
                .chars()
                .map(|c| if c.is_alphanumeric() || c == '-' { c } else { ' ' })
                .collect::<String>()
                .split_whitespace()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .filter(|tokens| !tokens.is_empty())
        .collect()
}

/// Drops unit words with their number, house numbers and postcode tokens,
/// and expands abbreviations.
fn clean_segment(tokens: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut skip_next = false;
    for (i, token) in tokens.iter().enumerate() {
        if skip_next {
            skip_next = false;
            if is_number_token(token) || token.len() == 1 {
                continue;
            }
        }
        if UNIT_WORDS.contains(&token.as_str()) {
            skip_next = true;
            continue;
        }
        if is_number_token(token) || is_postcode_token(token) {
            continue;
        }
        let expanded = if token == "st" && i + 1 < tokens.len() && out.is_empty() {
            "saint"
        } else {
            expand_abbreviation(token)
        };
        out.push(expanded.to_string());
    }
    out
}

fn is_locality(tokens: &[String]) -> bool {
    tokens.iter().all(|t| LOCALITIES.contains(&t.as_str()))
}

/// Street name with unit numbers, house numbers, localities and postcodes
/// removed, abbreviations expanded. Empty when nothing street-like remains.
pub fn normalize_street(address: &str) -> String {
    let cleaned: Vec<Vec<String>> = segments(address)
        .iter()
        .map(|s| clean_segment(s))
        .filter(|s| !s.is_empty() && !is_locality(s))
        .collect();

    let chosen = cleaned
        .iter()
        .find(|s| s.iter().skip(1).any(|t| STREET_SUFFIXES.contains(&t.as_str())))
        .or_else(|| cleaned.first());
    let Some(tokens) = chosen else {
        return String::new();
    };

    let mut street: Vec<&str> = tokens.iter().map(String::as_str).collect();
    if let Some(pos) = street
        .iter()
        .skip(1)
        .position(|t| STREET_SUFFIXES.contains(t))
    {
        street.truncate(pos + 2);
    } else {
        while street.len() > 1 && street.last().is_some_and(|t| LOCALITIES.contains(t)) {
            street.pop();
        }
    }
    street.join(" ")
}

/// First house number in the address, skipping flat/unit numbers and
/// postcode fragments. Keeps a letter suffix ("12a") or range ("12-14").
pub fn house_number(address: &str) -> Option<String> {
    for tokens in segments(address) {
        let mut skip_next = false;
        for token in &tokens {
            if skip_next {
                skip_next = false;
                continue;
            }
            if UNIT_WORDS.contains(&token.as_str()) {
                skip_next = true;
                continue;
            }
            if is_number_token(token) && !is_postcode_token(token) {
                return Some(token.clone());
            }
        }
    }
    None
}

/// The whole address lowercased with postcodes removed and abbreviations
/// expanded, for edit-distance comparison.
pub fn normalize_address(address: &str) -> String {
    segments(address)
        .iter()
        .flat_map(|tokens| tokens.iter())
        .filter(|t| !is_postcode_token(t))
        .map(|t| expand_abbreviation(t).to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1 && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of the token sets. `None` when either side has no tokens.
pub fn jaccard(a: &[String], b: &[String]) -> Option<f64> {
    let sa: BTreeSet<&str> = a.iter().map(String::as_str).collect();
    let sb: BTreeSet<&str> = b.iter().map(String::as_str).collect();
    if sa.is_empty() || sb.is_empty() {
        return None;
    }
    let inter = sa.intersection(&sb).count();
    let union = sa.union(&sb).count();
    Some(inter as f64 / union as f64)
}

/// TF-IDF vectors over the descriptions of one batch.
#[derive(Debug, Default)]
pub struct TfidfIndex {
    vectors: HashMap<ListingKey, HashMap<String, f64>>,
}

impl TfidfIndex {
    pub fn build<'a>(documents: impl IntoIterator<Item = (ListingKey, &'a str)>) -> Self {
        let docs: Vec<(ListingKey, Vec<String>)> = documents
            .into_iter()
            .map(|(key, text)| (key, tokenize(text)))
            .filter(|(_, tokens)| !tokens.is_empty())
            .collect();

        let mut df: HashMap<&str, usize> = HashMap::new();
        for (_, tokens) in &docs {
            let unique: BTreeSet<&str> = tokens.iter().map(String::as_str).collect();
            for term in unique {
                *df.entry(term).or_default() += 1;
            }
        }
        let n = docs.len() as f64;
        let idf = |term: &str| ((1.0 + n) / (1.0 + df.get(term).copied().unwrap_or(0) as f64)).ln() + 1.0;

        let mut vectors = HashMap::new();
        for (key, tokens) in &docs {
            let mut tf: HashMap<String, f64> = HashMap::new();
            for token in tokens {
                *tf.entry(token.clone()).or_default() += 1.0;
            }
            let len = tokens.len() as f64;
            for (term, weight) in tf.iter_mut() {
                *weight = (*weight / len) * idf(term);
            }
            let norm = tf.values().map(|w| w * w).sum::<f64>().sqrt();
            if norm > 0.0 {
                tf.values_mut().for_each(|w| *w /= norm);
                vectors.insert(key.clone(), tf);
            }
        }
        Self { vectors }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn similarity(&self, a: &ListingKey, b: &ListingKey) -> Option<f64> {
        let va = self.vectors.get(a)?;
        let vb = self.vectors.get(b)?;
        let (small, large) = if va.len() <= vb.len() { (va, vb) } else { (vb, va) };
        let dot: f64 = small
            .iter()
            .filter_map(|(term, w)| large.get(term).map(|o| w * o))
            .sum();
        Some(dot.clamp(0.0, 1.0))
    }
}
