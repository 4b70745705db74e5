//! Duplicate collapsing by normalized name and location

use std::collections::HashMap;

use super::rankable::Rankable;
use super::ScoredItem;

/// Case-folded, whitespace-collapsed `name|location` key
pub fn dedup_key(name: &str, location: Option<&str>) -> String {
    let normalize = |s: &str| {
        s.split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    };
    format!("{}|{}", normalize(name), location.map(normalize).unwrap_or_default())
}

/// Keep one item per key, the higher-scored one, at its position
///
/// Ties keep the earlier item.
pub fn dedup<T: Rankable>(items: Vec<ScoredItem<T>>) -> Vec<ScoredItem<T>> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<ScoredItem<T>> = Vec::with_capacity(items.len());

    for candidate in items {
        let (name, location) = candidate.item.identity();
        let key = dedup_key(&name, location.as_deref());

        match positions.get(&key) {
            Some(&pos) => {
                if candidate.score > kept[pos].score {
                    kept[pos] = candidate;
                }
            }
            None => {
                positions.insert(key, kept.len());
                kept.push(candidate);
            }
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::types::Hotel;

    fn hotel(id: &str, name: &str, city: &str, score: f64) -> ScoredItem<Hotel> {
        ScoredItem {
            item: Hotel {
                id: id.to_string(),
                name: name.to_string(),
                city: Some(city.to_string()),
                ..Default::default()
            },
            score,
        }
    }

    #[test]
    fn test_key_normalizes_case_and_whitespace() {
        assert_eq!(
            dedup_key("  Hotel   Van Zandt ", Some("AUSTIN")),
            dedup_key("hotel van zandt", Some("austin"))
        );
        assert_ne!(dedup_key("Hotel", Some("Austin")), dedup_key("Hotel", Some("Dallas")));
    }

    #[test]
    fn test_higher_score_survives() {
        let items = vec![
            hotel("a", "Hotel Van Zandt", "Austin", 0.4),
            hotel("b", "Other Inn", "Austin", 0.5),
            hotel("c", "hotel  van zandt", "austin", 0.9),
        ];

        let kept = dedup(items);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].item.id, "c");
        assert_eq!(kept[0].score, 0.9);
        assert_eq!(kept[1].item.id, "b");
    }

    #[test]
    fn test_tie_keeps_first() {
        let kept = dedup(vec![
            hotel("a", "Inn", "Austin", 0.5),
            hotel("b", "Inn", "Austin", 0.5),
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].item.id, "a");
    }
}
