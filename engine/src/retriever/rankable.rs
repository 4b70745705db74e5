//! Ranking view of the domain item types

use sdk::types::{Flight, Hotel, Product, Showtime};

/// Item the hybrid retriever can score, dedup and cite
pub trait Rankable: Clone + Send + Sync {
    fn item_id(&self) -> &str;

    /// Display title used for snippets
    fn title(&self) -> String;

    /// Text scored lexically and embedded
    fn search_text(&self) -> String;

    /// Name and location parts that identify the same real-world item
    fn identity(&self) -> (String, Option<String>);

    fn url(&self) -> Option<String>;

    /// Snippet excerpt (truncated by the snippet constructor)
    fn excerpt(&self) -> String {
        self.search_text()
    }
}

fn join(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .flatten()
        .filter(|part| !part.trim().is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

impl Rankable for Product {
    fn item_id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> String {
        self.title.clone()
    }

    fn search_text(&self) -> String {
        join(&[
            Some(self.title.as_str()),
            self.brand.as_deref(),
            self.category.as_deref(),
            self.description.as_deref(),
            self.source.as_deref(),
            self.tag.as_deref(),
        ])
    }

    fn identity(&self) -> (String, Option<String>) {
        (self.title.clone(), self.source.clone())
    }

    fn url(&self) -> Option<String> {
        self.link.clone()
    }

    fn excerpt(&self) -> String {
        join(&[
            self.price.as_deref(),
            self.source.as_deref(),
            self.description.as_deref(),
            self.delivery.as_deref(),
        ])
    }
}

impl Rankable for Hotel {
    fn item_id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> String {
        self.name.clone()
    }

    fn search_text(&self) -> String {
        let amenities = self.amenities.join(" ");
        join(&[
            Some(self.name.as_str()),
            self.city.as_deref(),
            self.address.as_deref(),
            self.description.as_deref(),
            Some(amenities.as_str()),
        ])
    }

    fn identity(&self) -> (String, Option<String>) {
        (
            self.name.clone(),
            self.address.clone().or_else(|| self.city.clone()),
        )
    }

    fn url(&self) -> Option<String> {
        self.link.clone()
    }

    fn excerpt(&self) -> String {
        join(&[
            self.price.as_deref(),
            self.address.as_deref(),
            self.description.as_deref(),
        ])
    }
}

impl Rankable for Flight {
    fn item_id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> String {
        format!("{} {} to {}", self.airline, self.origin, self.destination)
    }

    fn search_text(&self) -> String {
        let stops = if self.stops == 0 { "nonstop direct" } else { "" };
        join(&[
            Some(self.airline.as_str()),
            self.flight_number.as_deref(),
            Some(self.origin.as_str()),
            Some(self.destination.as_str()),
            Some(stops),
        ])
    }

    fn identity(&self) -> (String, Option<String>) {
        let name = join(&[Some(self.airline.as_str()), self.flight_number.as_deref()]);
        let when = join(&[Some(self.origin.as_str()), self.departure.as_deref()]);
        (name, Some(when))
    }

    fn url(&self) -> Option<String> {
        self.link.clone()
    }
}

impl Rankable for Showtime {
    fn item_id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> String {
        format!("{} at {}", self.movie, self.theater)
    }

    fn search_text(&self) -> String {
        join(&[
            Some(self.movie.as_str()),
            Some(self.theater.as_str()),
            self.address.as_deref(),
            self.format.as_deref(),
        ])
    }

    fn identity(&self) -> (String, Option<String>) {
        let venue = join(&[Some(self.theater.as_str()), self.starts_at.as_deref()]);
        (self.movie.clone(), Some(venue))
    }

    fn url(&self) -> Option<String> {
        self.link.clone()
    }
}
