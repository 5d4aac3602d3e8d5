//! Coordinate text parsing and formatting
//!
//! GML 2 packs tuples into `gml:coordinates` with configurable separators,
//! GML 3 uses whitespace separated `gml:pos` / `gml:posList` values whose
//! tuple size comes from `srsDimension`. Malformed numbers are parse errors;
//! in lax mode the affected tuple is dropped with a warning instead.

use super::Points;
use crate::error::{Error, ParseError, Result};
use crate::limits::Limits;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Separators of a GML 2 `gml:coordinates` element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinateSyntax {
    /// Decimal separator (`decimal`, only `.` is supported)
    pub decimal: String,
    /// Separator between ordinates of one tuple (`cs`)
    pub cs: String,
    /// Separator between tuples (`ts`)
    pub ts: String,
}

impl Default for CoordinateSyntax {
    fn default() -> Self {
        Self {
            decimal: ".".to_string(),
            cs: ",".to_string(),
            ts: " ".to_string(),
        }
    }
}

fn parse_error(message: String) -> Error {
    Error::Parse(ParseError::new(message))
}

fn parse_double(token: &str) -> Result<f64> {
    token
        .trim()
        .parse::<f64>()
        .map_err(|_| parse_error(format!("Value '{}' cannot be parsed as a double.", token.trim())))
}

fn split_tokens<'t>(text: &'t str, separator: &str) -> Vec<&'t str> {
    if separator.trim().is_empty() {
        text.split_whitespace().collect()
    } else {
        text.split(separator)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect()
    }
}

/// Parse the content of a `gml:coordinates` element
pub fn parse_coordinates(
    text: &str,
    syntax: &CoordinateSyntax,
    lax: bool,
    limits: &Limits,
) -> Result<Points> {
    if syntax.decimal != "." {
        return Err(parse_error(
            "Currently, only '.' is supported as decimal separator.".to_string(),
        ));
    }

    let tuples = split_tokens(text, &syntax.ts);
    limits.check_tuples(tuples.len())?;

    let mut points: Option<Points> = None;
    for tuple in tuples {
        let parsed: Result<Vec<f64>> = split_tokens(tuple, &syntax.cs)
            .into_iter()
            .map(parse_double)
            .collect();
        let values = match parsed {
            Ok(values) => values,
            Err(err) if lax => {
                warn!(tuple, error = %err, "skipping malformed coordinate tuple");
                continue;
            }
            Err(err) => return Err(err),
        };

        let points = points.get_or_insert_with(|| Points::new(values.len()));
        if values.len() != points.dimension() {
            let msg = format!(
                "Coordinate tuple '{}' has dimension {}, expected {}.",
                tuple,
                values.len(),
                points.dimension()
            );
            if lax {
                warn!("{}", msg);
                continue;
            }
            return Err(parse_error(msg));
        }
        points.push(&values)?;
    }

    Ok(points.unwrap_or_else(|| Points::new(2)))
}

/// Parse a `gml:pos` (or `gml:coord` assembled) position
pub fn parse_pos(text: &str, dimension: Option<usize>) -> Result<Vec<f64>> {
    let values = text
        .split_whitespace()
        .map(parse_double)
        .collect::<Result<Vec<f64>>>()?;
    if values.is_empty() {
        return Err(parse_error("Empty position.".to_string()));
    }
    if let Some(dim) = dimension {
        if values.len() != dim {
            return Err(parse_error(format!(
                "Position '{}' has {} ordinates, but srsDimension is {}.",
                text,
                values.len(),
                dim
            )));
        }
    }
    Ok(values)
}

/// Parse the content of a `gml:posList` element
pub fn parse_pos_list(text: &str, dimension: usize, lax: bool, limits: &Limits) -> Result<Points> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let dimension = dimension.max(1);
    limits.check_tuples(tokens.len() / dimension)?;

    if tokens.len() % dimension != 0 {
        let msg = format!(
            "gml:posList contains {} values, which is not a multiple of the dimension {}.",
            tokens.len(),
            dimension
        );
        if !lax {
            return Err(parse_error(msg));
        }
        warn!("{}", msg);
    }

    let mut points = Points::new(dimension);
    for chunk in tokens.chunks_exact(dimension) {
        let parsed: Result<Vec<f64>> = chunk.iter().map(|t| parse_double(t)).collect();
        match parsed {
            Ok(values) => points.push(&values)?,
            Err(err) if lax => {
                warn!(tuple = %chunk.join(" "), error = %err, "skipping malformed coordinate tuple");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(points)
}

/// Controls how ordinates are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinateFormatter {
    /// Maximum number of fraction digits; `None` writes the shortest exact form
    pub max_fraction_digits: Option<usize>,
}

impl CoordinateFormatter {
    /// Formatter writing the shortest exact form
    pub fn new() -> Self {
        Self::default()
    }

    /// Formatter rounding to at most `digits` fraction digits
    pub fn with_precision(digits: usize) -> Self {
        Self {
            max_fraction_digits: Some(digits),
        }
    }

    /// Format one ordinate
    pub fn format(&self, value: f64) -> String {
        let mut text = match self.max_fraction_digits {
            Some(digits) => {
                let fixed = format!("{:.*}", digits, value);
                if fixed.contains('.') {
                    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
                } else {
                    fixed
                }
            }
            None => format!("{}", value),
        };
        if text == "-0" {
            text = "0".to_string();
        }
        text
    }

    /// Format a tuple with the given ordinate separator
    pub fn format_tuple(&self, position: &[f64], separator: &str) -> String {
        position
            .iter()
            .map(|v| self.format(*v))
            .collect::<Vec<_>>()
            .join(separator)
    }

    /// Format all tuples GML 2 style (`x,y x,y`)
    pub fn format_coordinates(&self, points: &Points) -> String {
        points
            .iter()
            .map(|p| self.format_tuple(p, ","))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Format all tuples GML 3 style (`x y x y`)
    pub fn format_pos_list(&self, points: &Points) -> String {
        self.format_tuple(points.ordinates(), " ")
    }

    /// Largest error introduced by rounding, zero for exact output
    pub fn tolerance(&self) -> f64 {
        match self.max_fraction_digits {
            Some(digits) => 0.5 * 10f64.powi(-(digits as i32)) + f64::EPSILON,
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coordinates_default_syntax() {
        let points =
            parse_coordinates("10,20 30,40", &CoordinateSyntax::default(), false, &Limits::default())
                .unwrap();
        assert_eq!(points.dimension(), 2);
        assert_eq!(points.ordinates(), &[10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn test_parse_coordinates_custom_separators() {
        let syntax = CoordinateSyntax {
            decimal: ".".to_string(),
            cs: " ".to_string(),
            ts: ";".to_string(),
        };
        let points = parse_coordinates("1 2 3;4 5 6", &syntax, false, &Limits::default()).unwrap();
        assert_eq!(points.dimension(), 3);
        assert_eq!(points.len(), 2);
    }

    #[test]
    fn test_malformed_tuple_strict_and_lax() {
        let syntax = CoordinateSyntax::default();
        let err = parse_coordinates("10,abc", &syntax, false, &Limits::default()).unwrap_err();
        assert!(err.is_parse());
        assert!(err.to_string().contains("'abc' cannot be parsed as a double"));

        let points = parse_coordinates("10,abc 1,2", &syntax, true, &Limits::default()).unwrap();
        assert_eq!(points.ordinates(), &[1.0, 2.0]);
    }

    #[test]
    fn test_decimal_separator() {
        let syntax = CoordinateSyntax {
            decimal: ",".to_string(),
            ..CoordinateSyntax::default()
        };
        assert!(parse_coordinates("1,2", &syntax, false, &Limits::default()).is_err());
    }

    #[test]
    fn test_pos_list() {
        let points = parse_pos_list("1 2 3 4 5 6", 3, false, &Limits::default()).unwrap();
        assert_eq!(points.len(), 2);
        assert!(parse_pos_list("1 2 3", 2, false, &Limits::default()).is_err());
        let points = parse_pos_list("1 2 x 4 5 6", 2, true, &Limits::default()).unwrap();
        assert_eq!(points.ordinates(), &[1.0, 2.0, 5.0, 6.0]);
    }

    #[test]
    fn test_tuple_limit() {
        let limits = Limits {
            max_tuples: 1,
            ..Limits::default()
        };
        assert!(matches!(
            parse_pos_list("1 2 3 4", 2, false, &limits),
            Err(Error::LimitExceeded(_))
        ));
    }

    #[test]
    fn test_pos_dimension_check() {
        assert_eq!(parse_pos("1 2 3", None).unwrap(), vec![1.0, 2.0, 3.0]);
        assert!(parse_pos("1 2", Some(3)).is_err());
    }

    #[test]
    fn test_formatter() {
        let exact = CoordinateFormatter::new();
        assert_eq!(exact.format(10.0), "10");
        assert_eq!(exact.format(10.25), "10.25");

        let rounded = CoordinateFormatter::with_precision(2);
        assert_eq!(rounded.format(1.23456), "1.23");
        assert_eq!(rounded.format(7.0), "7");
        assert_eq!(rounded.format(-0.001), "0");
        assert_eq!(
            rounded.format_coordinates(&Points::from_positions(&[[1.0, 2.5], [3.0, 4.0]]).unwrap()),
            "1,2.5 3,4"
        );
    }
}
