//! Navigation deep links
//!
//! Turn-by-turn routing is left to the external maps app; this only builds
//! the link that hands the destination over.

use url::form_urlencoded;

use crate::Coordinate;

const DIRECTIONS_BASE: &str = "https://www.google.com/maps/dir/";

/// Where the courier is heading
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Destination<'a> {
    Coordinate(Coordinate),
    Address(&'a str),
}

impl<'a> Destination<'a> {
    /// Prefer the coordinate; missing or (0, 0) coordinates fall back to the address
    pub fn resolve(coordinate: Option<Coordinate>, address: &'a str) -> Self {
        match coordinate {
            Some(c) if !c.is_null_island() => Self::Coordinate(c),
            _ => Self::Address(address),
        }
    }
}

/// Directions URL for the external maps app
pub fn directions_url(destination: Destination<'_>) -> String {
    let destination = match destination {
        Destination::Coordinate(c) => format!("{},{}", c.latitude, c.longitude),
        Destination::Address(address) => address.to_string(),
    };
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("api", "1")
        .append_pair("destination", &destination)
        .finish();
    format!("{DIRECTIONS_BASE}?{query}")
}
