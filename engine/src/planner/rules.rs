//! Lexical rule tables for goal, ambiguity and vertical classification
//!
//! Each table is an ordered list of `(predicate, result)` rules. The first
//! rule whose predicate holds wins, so ties are broken by declaration order.
//! Predicates operate on [`QueryFeatures`], a normalized view of the query.

use regex::Regex;
use sdk::envelope::Capability;
use std::sync::OnceLock;

use super::types::{Ambiguity, Budget, Filters, Goal};

/// Normalized view of a query
#[derive(Debug, Clone)]
pub struct QueryFeatures<'a> {
    pub raw: &'a str,
    /// Lowercased tokens with punctuation removed (`$`, `'` and `.` kept)
    pub words: Vec<String>,
    padded: String,
}

impl<'a> QueryFeatures<'a> {
    pub fn new(raw: &'a str) -> Self {
        let lowered: String = raw
            .to_lowercase()
            .chars()
            .map(|c| match c {
                '\u{2019}' => '\'',
                c if c.is_alphanumeric() || matches!(c, '$' | '\'' | '.') => c,
                _ => ' ',
            })
            .collect();

        let words: Vec<String> = lowered
            .split_whitespace()
            .map(|w| w.trim_matches(|c| c == '.' || c == '\'').to_string())
            .filter(|w| !w.is_empty())
            .collect();
        let padded = format!(" {} ", words.join(" "));

        Self { raw, words, padded }
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Normalized text, single-space separated
    pub fn normalized(&self) -> &str {
        self.padded.trim()
    }

    /// Whole-word phrase match
    pub fn has_phrase(&self, phrase: &str) -> bool {
        self.padded.contains(&format!(" {} ", phrase))
    }

    pub fn has_any(&self, phrases: &[&str]) -> bool {
        phrases.iter().any(|p| self.has_phrase(p))
    }

    fn count_hits(&self, phrases: &[&str]) -> usize {
        phrases.iter().filter(|p| self.has_phrase(p)).count()
    }

    /// Whether the query names something specific enough to search for
    pub fn has_concrete_token(&self) -> bool {
        let lexical = self.words.iter().any(|w| {
            w.starts_with('$')
                || w.chars().any(|c| c.is_ascii_digit())
                || ATTRIBUTE_WORDS.contains(&w.as_str())
        });
        if lexical {
            return true;
        }

        let proper_noun = self
            .raw
            .split_whitespace()
            .skip(1)
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .any(|w| w != "I" && w.chars().next().is_some_and(char::is_uppercase));
        if proper_noun {
            return true;
        }

        find_display(self, BRANDS).is_some()
            || find_display(self, CATEGORIES).is_some()
            || VERTICAL_KEYWORDS
                .iter()
                .any(|(_, keywords)| self.has_any(keywords))
    }
}

/// One entry of an ordered rule table
pub struct Rule<T> {
    pub name: &'static str,
    pub applies: fn(&QueryFeatures<'_>) -> bool,
    pub result: T,
}

/// First rule whose predicate holds
pub fn first_match<'r, T>(rules: &'r [Rule<T>], features: &QueryFeatures<'_>) -> Option<&'r Rule<T>> {
    rules.iter().find(|rule| (rule.applies)(features))
}

/// Goal rules in priority order; `browse` is the catch-all
pub static GOAL_RULES: &[Rule<Goal>] = &[
    Rule {
        name: "comparison",
        applies: |f| {
            f.has_any(&[
                "vs",
                "versus",
                "compare",
                "comparison",
                "difference between",
                "better than",
            ])
        },
        result: Goal::Compare,
    },
    Rule {
        name: "decision",
        applies: |f| {
            f.has_any(&[
                "should i",
                "is it worth",
                "worth it",
                "worth buying",
                "do i need",
                "good idea",
            ])
        },
        result: Goal::Decide,
    },
    Rule {
        name: "selection",
        applies: |f| {
            f.has_any(&[
                "which",
                "recommend",
                "recommendation",
                "recommendations",
                "best",
                "top",
                "suggest",
            ])
        },
        result: Goal::Choose,
    },
    Rule {
        name: "explanation",
        applies: |f| {
            f.has_any(&[
                "what is",
                "what are",
                "how does",
                "how do",
                "why",
                "explain",
                "tell me about",
            ])
        },
        result: Goal::Learn,
    },
    Rule {
        name: "location",
        applies: |f| f.has_any(&["where", "near me", "nearby", "closest", "directions to"]),
        result: Goal::Locate,
    },
    Rule {
        name: "default",
        applies: |_| true,
        result: Goal::Browse,
    },
];

pub fn classify_goal(features: &QueryFeatures<'_>) -> Goal {
    first_match(GOAL_RULES, features)
        .map(|rule| rule.result)
        .unwrap_or(Goal::Browse)
}

/// Why a query was judged ambiguous; selects the clarification template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmbiguityCue {
    Empty,
    Pronoun,
    Generic,
    TooShort,
    Vague,
    Clear,
}

/// Ambiguity rules in priority order
pub static AMBIGUITY_RULES: &[Rule<(Ambiguity, AmbiguityCue)>] = &[
    Rule {
        name: "empty",
        applies: |f| f.word_count() == 0,
        result: (Ambiguity::High, AmbiguityCue::Empty),
    },
    Rule {
        name: "only_references",
        applies: |f| {
            f.words.iter().any(|w| REFERENCE_WORDS.contains(&w.as_str()))
                && f.words.iter().all(|w| is_reference_or_filler(w))
        },
        result: (Ambiguity::High, AmbiguityCue::Pronoun),
    },
    Rule {
        name: "only_generic_nouns",
        applies: |f| {
            f.words.iter().any(|w| GENERIC_NOUNS.contains(&w.as_str()))
                && f.words
                    .iter()
                    .all(|w| is_reference_or_filler(w) || GENERIC_NOUNS.contains(&w.as_str()))
        },
        result: (Ambiguity::High, AmbiguityCue::Generic),
    },
    Rule {
        name: "too_short",
        applies: |f| f.word_count() < 4,
        result: (Ambiguity::High, AmbiguityCue::TooShort),
    },
    Rule {
        name: "no_concrete_attribute",
        applies: |f| f.word_count() < 6 && !f.has_concrete_token(),
        result: (Ambiguity::Medium, AmbiguityCue::Vague),
    },
    Rule {
        name: "default",
        applies: |_| true,
        result: (Ambiguity::Low, AmbiguityCue::Clear),
    },
];

pub fn classify_ambiguity(features: &QueryFeatures<'_>) -> (Ambiguity, AmbiguityCue) {
    first_match(AMBIGUITY_RULES, features)
        .map(|rule| rule.result)
        .unwrap_or((Ambiguity::Low, AmbiguityCue::Clear))
}

const REFERENCE_WORDS: &[&str] = &[
    "it", "its", "that", "this", "those", "these", "them", "they", "one", "ones", "there", "he",
    "she", "him", "her",
];

const GENERIC_NOUNS: &[&str] = &[
    "thing", "things", "stuff", "item", "items", "product", "products", "something", "anything",
    "options", "option", "place", "places", "deal", "deals", "results", "recommendations",
];

const FILLER_WORDS: &[&str] = &[
    "a", "an", "the", "me", "my", "show", "find", "get", "give", "some", "any", "more", "of",
    "for", "please", "i", "want", "need", "to", "like", "about", "what", "is", "are", "and",
    "so", "again", "with", "on", "can", "you", "good", "nice", "other", "else", "see", "look",
    "at", "how", "do", "just", "all", "now", "too", "also", "ok", "okay", "yes", "no", "hmm",
];

fn is_reference_or_filler(word: &str) -> bool {
    REFERENCE_WORDS.contains(&word) || FILLER_WORDS.contains(&word)
}

/// Words that make a query specific even without a proper noun
const ATTRIBUTE_WORDS: &[&str] = &[
    "cheap", "cheaper", "cheapest", "affordable", "budget", "inexpensive", "luxury", "upscale",
    "premium", "waterproof", "wireless", "bluetooth", "lightweight", "leather", "organic",
    "vegan", "men's", "mens", "women's", "womens", "kids", "red", "blue", "black", "white",
    "green", "pink", "gray", "grey", "brown", "large", "small", "nonstop", "direct", "imax",
    "3d", "pool", "spa", "breakfast", "pet", "tonight", "tomorrow", "weekend", "rating", "rated",
];

/// Flag attributes copied into filters: `(phrase, flag)`
const ATTRIBUTE_FLAGS: &[(&str, &str)] = &[
    ("waterproof", "waterproof"),
    ("wireless", "wireless"),
    ("bluetooth", "bluetooth"),
    ("noise cancelling", "noise_cancelling"),
    ("lightweight", "lightweight"),
    ("leather", "leather"),
    ("organic", "organic"),
    ("vegan", "vegan"),
    ("pet friendly", "pet_friendly"),
    ("free breakfast", "free_breakfast"),
    ("pool", "pool"),
    ("spa", "spa"),
    ("nonstop", "nonstop"),
    ("imax", "imax"),
];

/// Keyword cues per vertical, in tie-break order
pub static VERTICAL_KEYWORDS: &[(Capability, &[&str])] = &[
    (
        Capability::HotelSearch,
        &[
            "hotel",
            "hotels",
            "motel",
            "motels",
            "resort",
            "resorts",
            "bed and breakfast",
            "vacation rental",
            "vacation rentals",
            "inn",
            "lodging",
            "hostel",
            "hostels",
            "airbnb",
            "place to stay",
            "places to stay",
            "accommodation",
            "accommodations",
        ],
    ),
    (
        Capability::FlightSearch,
        &[
            "flight",
            "flights",
            "fly",
            "flying",
            "airfare",
            "airline",
            "airlines",
            "plane ticket",
            "plane tickets",
        ],
    ),
    (
        Capability::MovieSearch,
        &[
            "movie",
            "movies",
            "showtime",
            "showtimes",
            "cinema",
            "theater",
            "theaters",
            "theatre",
            "film",
            "films",
        ],
    ),
    (
        Capability::WeatherSearch,
        &[
            "weather", "forecast", "rain", "raining", "rainy", "sunny", "temperature", "snow",
        ],
    ),
    (
        Capability::ProductSearch,
        &["buy", "shop", "shopping", "price", "prices", "deal on", "order"],
    ),
];

/// Detect the vertical with the most keyword hits, ties by table order
///
/// Product category words count toward product search. Returns `None` when
/// the query names no vertical at all.
pub fn detect_vertical(features: &QueryFeatures<'_>) -> Option<Capability> {
    let mut best: Option<(Capability, usize)> = None;
    for (capability, keywords) in VERTICAL_KEYWORDS {
        let mut hits = features.count_hits(keywords);
        if *capability == Capability::ProductSearch {
            hits += usize::from(find_display(features, CATEGORIES).is_some());
            hits += usize::from(find_display(features, BRANDS).is_some());
        }
        if hits > 0 && best.map_or(true, |(_, top)| hits > top) {
            best = Some((*capability, hits));
        }
    }
    best.map(|(capability, _)| capability)
}

/// Number of distinct verticals the query names
pub fn vertical_mentions(features: &QueryFeatures<'_>) -> usize {
    VERTICAL_KEYWORDS
        .iter()
        .filter(|(capability, keywords)| {
            features.has_any(keywords)
                || (*capability == Capability::ProductSearch
                    && find_display(features, CATEGORIES).is_some())
        })
        .count()
}

/// Known brands: `(normalized phrase, display name)`
const BRANDS: &[(&str, &str)] = &[
    ("new balance", "New Balance"),
    ("north face", "The North Face"),
    ("under armour", "Under Armour"),
    ("nike", "Nike"),
    ("adidas", "Adidas"),
    ("puma", "Puma"),
    ("reebok", "Reebok"),
    ("asics", "Asics"),
    ("hoka", "Hoka"),
    ("brooks", "Brooks"),
    ("apple", "Apple"),
    ("samsung", "Samsung"),
    ("sony", "Sony"),
    ("bose", "Bose"),
    ("lg", "LG"),
    ("dell", "Dell"),
    ("hp", "HP"),
    ("lenovo", "Lenovo"),
    ("patagonia", "Patagonia"),
    ("levi's", "Levi's"),
    ("zara", "Zara"),
    ("canon", "Canon"),
    ("nikon", "Nikon"),
    ("dyson", "Dyson"),
];

/// Product categories, longest phrases first
const CATEGORIES: &[(&str, &str)] = &[
    ("running shoes", "running shoes"),
    ("hiking boots", "hiking boots"),
    ("rain jacket", "rain jacket"),
    ("winter coat", "winter coat"),
    ("smart watch", "smartwatch"),
    ("shoes", "shoes"),
    ("sneakers", "sneakers"),
    ("boots", "boots"),
    ("sandals", "sandals"),
    ("headphones", "headphones"),
    ("earbuds", "earbuds"),
    ("laptop", "laptops"),
    ("laptops", "laptops"),
    ("phone", "phones"),
    ("phones", "phones"),
    ("tv", "tvs"),
    ("camera", "cameras"),
    ("smartwatch", "smartwatch"),
    ("watch", "watches"),
    ("jacket", "jackets"),
    ("jackets", "jackets"),
    ("coat", "coats"),
    ("dress", "dresses"),
    ("dresses", "dresses"),
    ("shirt", "shirts"),
    ("shirts", "shirts"),
    ("jeans", "jeans"),
    ("backpack", "backpacks"),
    ("backpacks", "backpacks"),
    ("vacuum", "vacuums"),
];

fn find_display(features: &QueryFeatures<'_>, table: &[(&str, &'static str)]) -> Option<&'static str> {
    table
        .iter()
        .find(|(phrase, _)| features.has_phrase(phrase))
        .map(|(_, display)| *display)
}

/// Phrases marking a turn that refines the previous one
const FOLLOW_UP_CUES: &[&str] = &[
    "what about",
    "how about",
    "cheaper",
    "cheaper ones",
    "more expensive",
    "pricier",
    "other",
    "another",
    "instead",
    "those",
    "these",
    "them",
    "ones",
    "similar",
    "same",
    "also",
];

const FOLLOW_UP_LEADS: &[&str] = &["and", "under", "below", "in", "only", "but", "with", "any"];

pub fn looks_like_follow_up(features: &QueryFeatures<'_>) -> bool {
    features.has_any(FOLLOW_UP_CUES)
        || features
            .words
            .first()
            .is_some_and(|w| FOLLOW_UP_LEADS.contains(&w.as_str()))
}

/// Words that end a place name
const PLACE_TERMINATORS: &[&str] = &[
    "this", "next", "for", "under", "below", "on", "with", "from", "tomorrow", "tonight",
    "today", "if", "then", "and", "or", "during", "over", "around", "between", "by", "in", "to",
    "near", "at", "that", "which", "when", "cheap",
];

/// First words that mean the preposition did not introduce a place
const NON_PLACE_LEADS: &[&str] = &[
    "do", "a", "an", "buy", "find", "see", "go", "stay", "book", "get", "check", "be", "have",
    "watch", "fly", "travel", "visit", "me", "my", "it", "spend", "eat", "try", "know", "use",
];

const MAX_PLACE_WORDS: usize = 4;

/// Extract the place introduced by one of `prepositions`
///
/// Capitalized candidates win over lowercase ones. Returns the place in
/// title case.
pub fn extract_place(raw: &str, prepositions: &[&str]) -> Option<String> {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    let mut fallback: Option<String> = None;

    for (i, token) in tokens.iter().enumerate() {
        let prep = token.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
        if !prepositions.contains(&prep.as_str()) {
            continue;
        }

        let mut words: Vec<&str> = Vec::new();
        for next in &tokens[i + 1..] {
            let word = next.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'');
            let lower = word.to_lowercase();
            if word.is_empty() || PLACE_TERMINATORS.contains(&lower.as_str()) {
                break;
            }
            if words.is_empty() && lower == "the" {
                continue;
            }
            words.push(word);
            if words.len() == MAX_PLACE_WORDS || next.ends_with([',', '.', '?', '!', ';']) {
                break;
            }
        }

        let Some(first) = words.first() else {
            continue;
        };
        let first_lower = first.to_lowercase();
        if NON_PLACE_LEADS.contains(&first_lower.as_str())
            || first.chars().any(|c| c.is_ascii_digit())
            || first.starts_with('$')
        {
            continue;
        }

        let place = title_case(&words.join(" "));
        if first.chars().next().is_some_and(char::is_uppercase) {
            return Some(place);
        }
        if fallback.is_none() {
            fallback = Some(place);
        }
    }

    fallback
}

fn title_case(text: &str) -> String {
    if text.chars().any(char::is_uppercase) {
        return text.to_string();
    }
    text.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

struct FilterPatterns {
    max_price: Regex,
    min_price: Regex,
    price_range: Regex,
    guests: Regex,
    date: Regex,
}

static FILTER_PATTERNS: OnceLock<Option<FilterPatterns>> = OnceLock::new();

fn filter_patterns() -> Option<&'static FilterPatterns> {
    FILTER_PATTERNS
        .get_or_init(|| {
            let build = || -> Result<FilterPatterns, regex::Error> {
                Ok(FilterPatterns {
                    max_price: Regex::new(
                        r"\b(?:under|below|less than|cheaper than|max|up to|within)\s+\$?(\d+(?:\.\d+)?)",
                    )?,
                    min_price: Regex::new(
                        r"\b(?:over|above|more than|at least|from)\s+\$(\d+(?:\.\d+)?)",
                    )?,
                    price_range: Regex::new(
                        r"\bbetween\s+\$?(\d+(?:\.\d+)?)\s+and\s+\$?(\d+(?:\.\d+)?)",
                    )?,
                    guests: Regex::new(
                        r"\b(?:for\s+)?(\d+)\s+(?:guests?|people|persons|adults|travelers)\b",
                    )?,
                    date: Regex::new(
                        r"\b(today|tonight|tomorrow|this weekend|next weekend|this week|next week|\d{4}-\d{2}-\d{2})\b",
                    )?,
                })
            };
            match build() {
                Ok(patterns) => Some(patterns),
                Err(e) => {
                    tracing::error!("Failed to compile filter patterns: {}", e);
                    None
                }
            }
        })
        .as_ref()
}

fn capture_f64(re: &Regex, text: &str, group: usize) -> Option<f64> {
    re.captures(text)?.get(group)?.as_str().parse().ok()
}

/// Extract per-vertical filters from the query
pub fn extract_filters(features: &QueryFeatures<'_>, vertical: Capability) -> Filters {
    let mut filters = Filters::default();
    let text = features.normalized();

    if let Some(patterns) = filter_patterns() {
        if let Some(caps) = patterns.price_range.captures(text) {
            filters.min_price = caps.get(1).and_then(|m| m.as_str().parse().ok());
            filters.max_price = caps.get(2).and_then(|m| m.as_str().parse().ok());
        } else {
            filters.max_price = capture_f64(&patterns.max_price, text, 1);
            filters.min_price = capture_f64(&patterns.min_price, text, 1);
        }
        filters.guests = patterns
            .guests
            .captures(text)
            .and_then(|caps| caps.get(1)?.as_str().parse().ok());
        filters.date = patterns
            .date
            .captures(&features.raw.to_lowercase())
            .and_then(|caps| caps.get(1).map(|m| m.as_str().to_string()));
    }

    if features.has_any(&["cheap", "cheaper", "cheapest", "affordable", "budget", "inexpensive"]) {
        filters.budget = Some(Budget::Low);
    } else if features.has_any(&["luxury", "upscale", "premium", "high end", "5 star"]) {
        filters.budget = Some(Budget::High);
    }

    filters.gender = if features.has_any(&["men's", "mens", "for men", "man's"]) {
        Some("men".to_string())
    } else if features.has_any(&["women's", "womens", "for women", "ladies"]) {
        Some("women".to_string())
    } else if features.has_any(&["kids", "kid's", "children's", "boys", "girls"]) {
        Some("kids".to_string())
    } else {
        None
    };

    filters.attributes = ATTRIBUTE_FLAGS
        .iter()
        .filter(|(phrase, _)| features.has_phrase(phrase))
        .map(|(_, flag)| flag.to_string())
        .collect();

    match vertical {
        Capability::ProductSearch => {
            filters.brand = find_display(features, BRANDS).map(str::to_string);
            filters.category = find_display(features, CATEGORIES).map(str::to_string);
        }
        Capability::FlightSearch => {
            filters.origin = extract_place(features.raw, &["from"]);
            filters.destination = extract_place(features.raw, &["to"])
                .or_else(|| extract_place(features.raw, &["in"]));
        }
        Capability::HotelSearch | Capability::MovieSearch | Capability::WeatherSearch => {
            filters.destination = extract_place(features.raw, &["in", "near", "to"]);
        }
    }

    filters
}

/// Clarification question for a highly ambiguous query
pub fn clarification_question(
    cue: AmbiguityCue,
    features: &QueryFeatures<'_>,
    vertical: Option<Capability>,
) -> String {
    match cue {
        AmbiguityCue::Empty => "What are you looking for? I can search products, hotels, flights, \
             movie showtimes, or the weather."
            .to_string(),
        AmbiguityCue::Pronoun => {
            let word = features
                .words
                .iter()
                .find(|w| REFERENCE_WORDS.contains(&w.as_str()))
                .map(String::as_str)
                .unwrap_or("that");
            format!(
                "Could you tell me what \"{}\" refers to? For example, a product name, a hotel, or a city.",
                word
            )
        }
        AmbiguityCue::Generic => {
            let noun = features
                .words
                .iter()
                .find(|w| GENERIC_NOUNS.contains(&w.as_str()))
                .map(String::as_str)
                .unwrap_or("item");
            format!(
                "What kind of {} are you looking for? A category, brand, or budget would help.",
                noun
            )
        }
        AmbiguityCue::TooShort | AmbiguityCue::Vague | AmbiguityCue::Clear => match vertical {
            Some(Capability::HotelSearch) => {
                "Where would you like to stay, and for which dates?".to_string()
            }
            Some(Capability::FlightSearch) => {
                "Where are you flying from and to, and when?".to_string()
            }
            Some(Capability::MovieSearch) => {
                "Which city should I check showtimes in, and for which movie?".to_string()
            }
            Some(Capability::WeatherSearch) => {
                "Which city would you like the weather for?".to_string()
            }
            Some(Capability::ProductSearch) | None => {
                "Could you add a bit more detail, such as the type of product, a brand, or a budget?"
                    .to_string()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn goal(text: &str) -> Goal {
        classify_goal(&QueryFeatures::new(text))
    }

    fn ambiguity(text: &str) -> Ambiguity {
        classify_ambiguity(&QueryFeatures::new(text)).0
    }

    #[test]
    fn test_normalization() {
        let f = QueryFeatures::new("Men's  Running-Shoes, under $89.99!");
        assert_eq!(f.normalized(), "men's running shoes under $89.99");
        assert_eq!(f.word_count(), 5);
        assert!(f.has_phrase("running shoes"));
        assert!(!f.has_phrase("run"));
    }

    #[test]
    fn test_goal_rules() {
        assert_eq!(goal("Nike vs Adidas running shoes"), Goal::Compare);
        assert_eq!(goal("should I buy the new iPhone this year"), Goal::Decide);
        assert_eq!(goal("which laptop is best for students"), Goal::Choose);
        assert_eq!(goal("what is a mirrorless camera"), Goal::Learn);
        assert_eq!(goal("where can I watch Dune tonight"), Goal::Locate);
        assert_eq!(goal("cheap hotels in Austin"), Goal::Browse);
    }

    #[test]
    fn test_goal_ties_broken_by_declaration_order() {
        // Matches both comparison and selection; comparison is declared first
        assert_eq!(goal("which is better than the other, Sony vs Bose"), Goal::Compare);
        // Matches both decision and selection
        assert_eq!(goal("should i get the best model available"), Goal::Decide);
    }

    #[test]
    fn test_goal_rule_table_ends_with_catch_all() {
        let last = GOAL_RULES.last().unwrap();
        assert_eq!(last.name, "default");
        assert!((last.applies)(&QueryFeatures::new("")));
    }

    #[test]
    fn test_ambiguity_rules() {
        assert_eq!(ambiguity("it"), Ambiguity::High);
        assert_eq!(ambiguity("running shoes"), Ambiguity::High);
        assert_eq!(ambiguity("show me more of those"), Ambiguity::High);
        assert_eq!(ambiguity("find me some good stuff please"), Ambiguity::High);
        assert_eq!(ambiguity("i want a nice gift for my dad"), Ambiguity::Low);
        assert_eq!(ambiguity("looking for a gift idea"), Ambiguity::Medium);
        assert_eq!(ambiguity("cheap hotels in Austin"), Ambiguity::Low);
    }

    #[test]
    fn test_ambiguity_cues() {
        let (_, cue) = classify_ambiguity(&QueryFeatures::new("  "));
        assert_eq!(cue, AmbiguityCue::Empty);
        let (_, cue) = classify_ambiguity(&QueryFeatures::new("that one"));
        assert_eq!(cue, AmbiguityCue::Pronoun);
        let (_, cue) = classify_ambiguity(&QueryFeatures::new("some things"));
        assert_eq!(cue, AmbiguityCue::Generic);
    }

    #[test]
    fn test_detect_vertical() {
        let detect = |t| detect_vertical(&QueryFeatures::new(t));
        assert_eq!(detect("cheap hotels in Austin"), Some(Capability::HotelSearch));
        assert_eq!(detect("bed and breakfast near Napa"), Some(Capability::HotelSearch));
        assert_eq!(detect("flights from Boston to Paris"), Some(Capability::FlightSearch));
        assert_eq!(detect("Dune showtimes tonight"), Some(Capability::MovieSearch));
        assert_eq!(detect("weather in Denver"), Some(Capability::WeatherSearch));
        assert_eq!(detect("Nike running shoes"), Some(Capability::ProductSearch));
        assert_eq!(detect("something fun"), None);
    }

    #[test]
    fn test_extract_place() {
        assert_eq!(
            extract_place("cheap hotels in Austin", &["in"]).as_deref(),
            Some("Austin")
        );
        assert_eq!(
            extract_place("movie showtimes in San Francisco tonight", &["in"]).as_deref(),
            Some("San Francisco")
        );
        assert_eq!(
            extract_place("I want to stay in austin for 2 nights", &["in", "to"]).as_deref(),
            Some("Austin")
        );
        assert_eq!(
            extract_place("check weather in Denver this weekend, then hotels", &["in"]).as_deref(),
            Some("Denver")
        );
        assert_eq!(extract_place("things to do", &["to"]), None);
    }

    #[test]
    fn test_extract_product_filters() {
        let f = QueryFeatures::new("men's waterproof Nike running shoes under $120");
        let filters = extract_filters(&f, Capability::ProductSearch);
        assert_eq!(filters.brand.as_deref(), Some("Nike"));
        assert_eq!(filters.category.as_deref(), Some("running shoes"));
        assert_eq!(filters.max_price, Some(120.0));
        assert_eq!(filters.gender.as_deref(), Some("men"));
        assert_eq!(filters.attributes, vec!["waterproof".to_string()]);
        assert_eq!(filters.destination, None);
    }

    #[test]
    fn test_extract_hotel_filters() {
        let f = QueryFeatures::new("cheap hotels in Austin for 2 guests this weekend");
        let filters = extract_filters(&f, Capability::HotelSearch);
        assert_eq!(filters.destination.as_deref(), Some("Austin"));
        assert_eq!(filters.budget, Some(Budget::Low));
        assert_eq!(filters.guests, Some(2));
        assert_eq!(filters.date.as_deref(), Some("this weekend"));
    }

    #[test]
    fn test_extract_price_range() {
        let f = QueryFeatures::new("headphones between $50 and $150");
        let filters = extract_filters(&f, Capability::ProductSearch);
        assert_eq!(filters.min_price, Some(50.0));
        assert_eq!(filters.max_price, Some(150.0));
    }

    #[test]
    fn test_flight_origin_and_destination() {
        let f = QueryFeatures::new("flights from Boston to Paris next week");
        let filters = extract_filters(&f, Capability::FlightSearch);
        assert_eq!(filters.origin.as_deref(), Some("Boston"));
        assert_eq!(filters.destination.as_deref(), Some("Paris"));
    }

    #[test]
    fn test_clarification_templates_are_non_empty() {
        for text in ["", "it", "some stuff", "hotels"] {
            let f = QueryFeatures::new(text);
            let (_, cue) = classify_ambiguity(&f);
            let question = clarification_question(cue, &f, detect_vertical(&f));
            assert!(!question.is_empty());
            assert!(question.ends_with('?') || question.ends_with('.'));
        }
    }

    #[test]
    fn test_follow_up_cues() {
        assert!(looks_like_follow_up(&QueryFeatures::new("cheaper ones")));
        assert!(looks_like_follow_up(&QueryFeatures::new("under $50")));
        assert!(looks_like_follow_up(&QueryFeatures::new("what about Dallas")));
        assert!(!looks_like_follow_up(&QueryFeatures::new("cheap hotels in Austin")));
    }
}
