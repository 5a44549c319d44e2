//! Plate geometry: well labels to absolute stage coordinates.
//!
//! Coordinates are millimetres in the stage frame. Column index grows along
//! +X, row index grows along +Y, and the A1 center sits at the configured
//! origin.

use std::fmt;
use std::iter::FusedIterator;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use crate::error::GeometryError;
use crate::util::{read_lock, write_lock};

/// Fraction of the well radius used for edge and corner targets.
pub const EDGE_OFFSET_FRACTION: f64 = 0.7;

/// Longest accepted row label. Seven letters already exceed `u32` rows.
const MAX_ROW_LETTERS: usize = 6;

/// Absolute stage coordinate in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Xy {
    pub x: f64,
    pub y: f64,
}

impl Xy {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Xy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}

/// Physical layout of a well plate plus the calibrated A1 origin.
///
/// Treated as an immutable value: changes build a new config and swap it in.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateConfig {
    pub rows: u32,
    pub cols: u32,
    pub well_spacing_x: f64,
    pub well_spacing_y: f64,
    pub well_diameter: f64,
    pub origin_x: f64,
    pub origin_y: f64,
}

impl PlateConfig {
    pub const STANDARD_96_WELL: PlateConfig = PlateConfig {
        rows: 8,
        cols: 12,
        well_spacing_x: 9.0,
        well_spacing_y: 9.0,
        well_diameter: 6.4,
        origin_x: 0.0,
        origin_y: 0.0,
    };

    pub const STANDARD_384_WELL: PlateConfig = PlateConfig {
        rows: 16,
        cols: 24,
        well_spacing_x: 4.5,
        well_spacing_y: 4.5,
        well_diameter: 3.3,
        origin_x: 0.0,
        origin_y: 0.0,
    };

    pub const STANDARD_24_WELL: PlateConfig = PlateConfig {
        rows: 4,
        cols: 6,
        well_spacing_x: 19.3,
        well_spacing_y: 19.3,
        well_diameter: 15.6,
        origin_x: 0.0,
        origin_y: 0.0,
    };

    /// Display name such as `"96-well plate"`.
    pub fn name(&self) -> String {
        format!("{}-well plate", self.well_count())
    }

    pub fn well_count(&self) -> u64 {
        u64::from(self.rows) * u64::from(self.cols)
    }

    /// Per-axis offset applied for edge and corner positions.
    pub fn edge_offset(&self) -> f64 {
        EDGE_OFFSET_FRACTION * self.well_diameter / 2.0
    }

    /// Same plate, new A1 origin.
    pub fn with_origin(&self, x: f64, y: f64) -> Self {
        Self {
            origin_x: x,
            origin_y: y,
            ..self.clone()
        }
    }

    /// Structural checks. Well diameter is not compared against spacing.
    pub fn validate(&self) -> Result<(), GeometryError> {
        let bad = |msg: &str| Err(GeometryError::InvalidConfig(msg.to_string()));
        if self.rows == 0 {
            return bad("rows must be >= 1");
        }
        if self.cols == 0 {
            return bad("cols must be >= 1");
        }
        for (name, v) in [
            ("well_spacing_x", self.well_spacing_x),
            ("well_spacing_y", self.well_spacing_y),
            ("well_diameter", self.well_diameter),
        ] {
            if !(v.is_finite() && v > 0.0) {
                return Err(GeometryError::InvalidConfig(format!(
                    "{name} must be a positive number (got {v})"
                )));
            }
        }
        if !(self.origin_x.is_finite() && self.origin_y.is_finite()) {
            return bad("origin must be finite");
        }
        Ok(())
    }

    /// Parse `label` and check it against this plate's bounds.
    pub fn parse_well(&self, label: &str) -> Result<WellId, GeometryError> {
        let id = WellId::from_str(label)?;
        if id.row > self.rows {
            return Err(invalid_well(
                label,
                format!("row {} is beyond the {} rows of a {}", id.row_label(), self.rows, self.name()),
            ));
        }
        if id.col > self.cols {
            return Err(invalid_well(
                label,
                format!("column {} is beyond the {} columns of a {}", id.col, self.cols, self.name()),
            ));
        }
        Ok(id)
    }

    pub fn contains(&self, id: &WellId) -> bool {
        (1..=self.rows).contains(&id.row) && (1..=self.cols).contains(&id.col)
    }

    /// Center of `id`, without a bounds check.
    pub fn center_of(&self, id: &WellId) -> Xy {
        Xy::new(
            self.origin_x + f64::from(id.col - 1) * self.well_spacing_x,
            self.origin_y + f64::from(id.row - 1) * self.well_spacing_y,
        )
    }

    /// Target coordinate for `position` inside `id`, without a bounds check.
    pub fn locate(&self, id: &WellId, position: WellPosition) -> Xy {
        let c = self.center_of(id);
        let (sx, sy) = position.signs();
        let off = self.edge_offset();
        Xy::new(c.x + sx * off, c.y + sy * off)
    }
}

impl Default for PlateConfig {
    fn default() -> Self {
        Self::STANDARD_96_WELL
    }
}

fn invalid_well(label: &str, reason: impl Into<String>) -> GeometryError {
    GeometryError::InvalidWell {
        label: label.to_string(),
        reason: reason.into(),
    }
}

/// Row and column of a well, both 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WellId {
    pub row: u32,
    pub col: u32,
}

impl WellId {
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Spreadsheet-style row letters: 1 → "A", 26 → "Z", 27 → "AA".
    pub fn row_label(&self) -> String {
        let mut n = self.row;
        let mut letters = Vec::new();
        while n > 0 {
            let rem = (n - 1) % 26;
            letters.push(b'A' + rem as u8);
            n = (n - 1) / 26;
        }
        letters.reverse();
        String::from_utf8_lossy(&letters).into_owned()
    }
}

impl fmt::Display for WellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row_label(), self.col)
    }
}

impl FromStr for WellId {
    type Err = GeometryError;

    /// Syntax only: `LETTERS DIGITS`, trimmed and case-insensitive.
    fn from_str(label: &str) -> Result<Self, Self::Err> {
        let s = label.trim();
        let split = s.find(|c: char| !c.is_ascii_alphabetic()).unwrap_or(s.len());
        let (letters, digits) = s.split_at(split);
        if letters.is_empty() {
            return Err(invalid_well(label, "expected row letters followed by a column number"));
        }
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid_well(label, "expected row letters followed by a column number"));
        }
        if letters.len() > MAX_ROW_LETTERS {
            return Err(invalid_well(label, "row label too long"));
        }
        let row = letters
            .bytes()
            .fold(0u32, |acc, b| acc * 26 + u32::from(b.to_ascii_uppercase() - b'A' + 1));
        let col = digits
            .parse::<u32>()
            .map_err(|_| invalid_well(label, "column number out of range"))?;
        if col == 0 {
            return Err(invalid_well(label, "columns start at 1"));
        }
        Ok(WellId { row, col })
    }
}

/// Target point inside a well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WellPosition {
    #[default]
    Center,
    Top,
    Bottom,
    Left,
    Right,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl WellPosition {
    pub const ALL: [WellPosition; 9] = [
        WellPosition::Center,
        WellPosition::Top,
        WellPosition::Bottom,
        WellPosition::Left,
        WellPosition::Right,
        WellPosition::TopLeft,
        WellPosition::TopRight,
        WellPosition::BottomLeft,
        WellPosition::BottomRight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WellPosition::Center => "center",
            WellPosition::Top => "top",
            WellPosition::Bottom => "bottom",
            WellPosition::Left => "left",
            WellPosition::Right => "right",
            WellPosition::TopLeft => "top_left",
            WellPosition::TopRight => "top_right",
            WellPosition::BottomLeft => "bottom_left",
            WellPosition::BottomRight => "bottom_right",
        }
    }

    /// Comma-separated list of every accepted name.
    pub fn names() -> String {
        Self::ALL.map(Self::as_str).join(", ")
    }

    /// Unit direction per axis. "top" is toward row A (-Y), "left" toward column 1 (-X).
    pub fn signs(self) -> (f64, f64) {
        match self {
            WellPosition::Center => (0.0, 0.0),
            WellPosition::Top => (0.0, -1.0),
            WellPosition::Bottom => (0.0, 1.0),
            WellPosition::Left => (-1.0, 0.0),
            WellPosition::Right => (1.0, 0.0),
            WellPosition::TopLeft => (-1.0, -1.0),
            WellPosition::TopRight => (1.0, -1.0),
            WellPosition::BottomLeft => (-1.0, 1.0),
            WellPosition::BottomRight => (1.0, 1.0),
        }
    }
}

impl fmt::Display for WellPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WellPosition {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == norm)
            .ok_or_else(|| GeometryError::InvalidPosition(s.to_string()))
    }
}

/// Row-major iterator over every well of one plate snapshot.
#[derive(Debug, Clone)]
pub struct Wells {
    cols: u32,
    next: u64,
    end: u64,
}

impl Wells {
    fn new(config: &PlateConfig) -> Self {
        Self {
            cols: config.cols,
            next: 0,
            end: config.well_count(),
        }
    }
}

impl Iterator for Wells {
    type Item = WellId;

    fn next(&mut self) -> Option<WellId> {
        if self.next >= self.end {
            return None;
        }
        let cols = u64::from(self.cols);
        // both quotient and remainder are bounded by u32 rows/cols
        let row = (self.next / cols) as u32 + 1;
        let col = (self.next % cols) as u32 + 1;
        self.next += 1;
        Some(WellId { row, col })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = usize::try_from(self.end - self.next).unwrap_or(usize::MAX);
        (left, Some(left))
    }
}

impl ExactSizeIterator for Wells {}
impl FusedIterator for Wells {}

/// Shared, atomically swappable plate geometry.
///
/// Readers take an `Arc` snapshot under a short read lock and compute on it,
/// so a concurrent `set_origin` or `reconfigure` is seen either entirely or
/// not at all.
#[derive(Debug)]
pub struct PlateGeometry {
    config: RwLock<Arc<PlateConfig>>,
}

impl PlateGeometry {
    pub fn new(config: PlateConfig) -> Result<Self, GeometryError> {
        config.validate()?;
        Ok(Self {
            config: RwLock::new(Arc::new(config)),
        })
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<PlateConfig> {
        Arc::clone(&read_lock(&self.config))
    }

    pub fn parse_well(&self, label: &str) -> Result<WellId, GeometryError> {
        self.config().parse_well(label)
    }

    /// Absolute coordinate of `position` inside the well named by `label`.
    pub fn resolve(&self, label: &str, position: WellPosition) -> Result<Xy, GeometryError> {
        let cfg = self.config();
        let id = cfg.parse_well(label)?;
        Ok(cfg.locate(&id, position))
    }

    pub fn resolve_well(&self, id: &WellId, position: WellPosition) -> Result<Xy, GeometryError> {
        let cfg = self.config();
        if !cfg.contains(id) {
            return Err(invalid_well(&id.to_string(), format!("not on a {}", cfg.name())));
        }
        Ok(cfg.locate(id, position))
    }

    /// Move the A1 origin. Returns the origin now in effect.
    pub fn set_origin(&self, x: f64, y: f64) -> Xy {
        let mut guard = write_lock(&self.config);
        let next = guard.with_origin(x, y);
        *guard = Arc::new(next);
        tracing::info!(origin_x = x, origin_y = y, "plate origin updated");
        Xy::new(x, y)
    }

    /// Replace the whole configuration after validating it.
    pub fn reconfigure(&self, config: PlateConfig) -> Result<(), GeometryError> {
        config.validate()?;
        tracing::info!(plate = %config.name(), "plate reconfigured");
        *write_lock(&self.config) = Arc::new(config);
        Ok(())
    }

    pub fn list_wells(&self) -> Wells {
        Wells::new(&self.config())
    }

    /// Well whose center is nearest to (x, y), if the point lies inside it.
    pub fn well_at(&self, x: f64, y: f64) -> Option<WellId> {
        let cfg = self.config();
        let col = ((x - cfg.origin_x) / cfg.well_spacing_x).round() + 1.0;
        let row = ((y - cfg.origin_y) / cfg.well_spacing_y).round() + 1.0;
        if !(col >= 1.0 && row >= 1.0 && col <= f64::from(cfg.cols) && row <= f64::from(cfg.rows)) {
            return None;
        }
        let id = WellId::new(row as u32, col as u32);
        let c = cfg.center_of(&id);
        ((x - c.x).hypot(y - c.y) <= cfg.well_diameter / 2.0).then_some(id)
    }
}

impl Default for PlateGeometry {
    fn default() -> Self {
        Self {
            config: RwLock::new(Arc::new(PlateConfig::STANDARD_96_WELL)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("A1", 1, 1)]
    #[case(" h12 ", 8, 12)]
    #[case("Z3", 26, 3)]
    #[case("AA1", 27, 1)]
    #[case("AZ2", 52, 2)]
    #[case("BA10", 53, 10)]
    fn parses_spreadsheet_rows(#[case] label: &str, #[case] row: u32, #[case] col: u32) {
        assert_eq!(label.parse::<WellId>().unwrap(), WellId::new(row, col));
    }

    #[rstest]
    #[case("")]
    #[case("12")]
    #[case("A")]
    #[case("A0")]
    #[case("1A")]
    #[case("A1B")]
    #[case("A-1")]
    #[case("A 1")]
    #[case("ÄB1")]
    #[case("AAAAAAA1")]
    #[case("A99999999999")]
    fn rejects_malformed_labels(#[case] label: &str) {
        assert!(matches!(
            label.parse::<WellId>(),
            Err(GeometryError::InvalidWell { .. })
        ));
    }

    #[test]
    fn display_round_trips_row_letters() {
        for row in [1, 26, 27, 52, 53, 702, 703] {
            let id = WellId::new(row, 4);
            assert_eq!(id.to_string().parse::<WellId>().unwrap(), id);
        }
        assert_eq!(WellId::new(27, 12).to_string(), "AA12");
    }

    #[test]
    fn positions_parse_loosely() {
        assert_eq!("Top-Left".parse::<WellPosition>().unwrap(), WellPosition::TopLeft);
        assert_eq!("BOTTOM_RIGHT".parse::<WellPosition>().unwrap(), WellPosition::BottomRight);
        assert!("middle".parse::<WellPosition>().is_err());
    }

    #[test]
    fn out_of_range_label_is_reported_verbatim() {
        let geo = PlateGeometry::default();
        match geo.resolve("z99", WellPosition::Center) {
            Err(GeometryError::InvalidWell { label, .. }) => assert_eq!(label, "z99"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn wells_iterator_is_exact_and_restartable() {
        let wells = PlateGeometry::default().list_wells();
        assert_eq!(wells.len(), 96);
        let again = wells.clone();
        let labels: Vec<String> = wells.map(|w| w.to_string()).collect();
        assert_eq!(labels.first().map(String::as_str), Some("A1"));
        assert_eq!(labels.get(12).map(String::as_str), Some("B1"));
        assert_eq!(labels.last().map(String::as_str), Some("H12"));
        assert_eq!(again.count(), 96);
    }

    #[test]
    fn diameter_larger_than_spacing_is_accepted() {
        let cfg = PlateConfig {
            well_diameter: 12.0,
            ..PlateConfig::STANDARD_96_WELL
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn well_at_misses_between_wells() {
        let geo = PlateGeometry::default();
        assert_eq!(geo.well_at(4.5, 0.0), None);
        assert_eq!(geo.well_at(-20.0, 0.0), None);
        assert_eq!(geo.well_at(9.5, 0.5), Some(WellId::new(1, 2)));
    }
}
